use serde::{Deserialize, Serialize};

use super::phase::{Counters, Phase};

/// How long a persisted snapshot stays eligible for restoration.
pub const SNAPSHOT_MAX_AGE_MS: u64 = 24 * 60 * 60 * 1000;

/// The engine's only mutable entity.
///
/// `remaining_ms == 0` while in `Initial` and never started means the phase
/// has not been initialized yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub phase: Phase,
    pub remaining_ms: u64,
    pub current_set: u32,
    pub current_cycle: u32,
    pub total_elapsed_ms: u64,
    pub running: bool,
    pub paused: bool,
    #[serde(default)]
    pub started_at_ms: Option<u64>,
    #[serde(default)]
    pub paused_at_ms: Option<u64>,
}

impl RunState {
    pub fn counters(&self) -> Counters {
        Counters {
            set: self.current_set,
            cycle: self.current_cycle,
        }
    }

    pub(crate) fn set_counters(&mut self, counters: Counters) {
        self.current_set = counters.set;
        self.current_cycle = counters.cycle;
    }

    /// Neither running nor paused.
    pub fn is_idle(&self) -> bool {
        !self.running && !self.paused
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            phase: Phase::Initial,
            remaining_ms: 0,
            current_set: 1,
            current_cycle: 1,
            total_elapsed_ms: 0,
            running: false,
            paused: false,
            started_at_ms: None,
            paused_at_ms: None,
        }
    }
}

/// A [`RunState`] stamped with the wall-clock time it was captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub state: RunState,
    pub captured_at_ms: u64,
}

impl Snapshot {
    pub fn new(state: RunState, captured_at_ms: u64) -> Self {
        Self {
            state,
            captured_at_ms,
        }
    }

    /// Milliseconds between capture and `now_ms`, zero if captured "later".
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.captured_at_ms)
    }

    /// A snapshot older than [`SNAPSHOT_MAX_AGE_MS`] is treated as absent.
    pub fn is_fresh(&self, now_ms: u64) -> bool {
        self.age_ms(now_ms) < SNAPSHOT_MAX_AGE_MS
            && self.captured_at_ms.saturating_sub(now_ms) < SNAPSHOT_MAX_AGE_MS
    }
}
