//! Restoring a run from a persisted snapshot.
//!
//! A running snapshot is fast-forwarded by the wall time that passed since it
//! was captured. The deficit is paid off phase by phase, each advance
//! crediting the full duration of the phase it enters, so counters and
//! remaining time come out exactly as if the run had kept ticking. Paused or
//! stopped snapshots are restored as-is.

use tracing::{debug, info, warn};

use super::engine::{ChangeFlags, TimerEngine};
use super::phase::Phase;
use super::state::Snapshot;

/// Why a stored snapshot was not restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotRejection {
    /// Older than the freshness window, or stamped implausibly far ahead.
    Stale,
    /// Already finished.
    Completed,
    /// Counters do not fit the current workout configuration.
    CountersOutOfRange,
    /// Both running and paused.
    ConflictingFlags,
}

impl SnapshotRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotRejection::Stale => "stale",
            SnapshotRejection::Completed => "completed",
            SnapshotRejection::CountersOutOfRange => "counters out of range",
            SnapshotRejection::ConflictingFlags => "conflicting running/paused flags",
        }
    }
}

impl TimerEngine {
    /// Load the stored snapshot and bring the engine up to date with it.
    pub(super) fn restore(&mut self) {
        let snapshot = match self.store.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "unreadable timer snapshot; starting fresh");
                self.clear_snapshot();
                return;
            }
        };

        let now = self.clock.now_ms();
        if let Err(reason) = self.check_snapshot(&snapshot, now) {
            info!(reason = reason.as_str(), "discarding timer snapshot");
            self.clear_snapshot();
            return;
        }

        if snapshot.state.running {
            self.catch_up(snapshot, now);
        } else {
            debug!(phase = %snapshot.state.phase, "restoring idle or paused timer");
            self.state = snapshot.state;
        }
    }

    /// Validate a snapshot against the freshness window and the current
    /// configuration.
    pub fn check_snapshot(&self, snapshot: &Snapshot, now_ms: u64) -> Result<(), SnapshotRejection> {
        if !snapshot.is_fresh(now_ms) {
            return Err(SnapshotRejection::Stale);
        }
        let state = &snapshot.state;
        if state.phase == Phase::Complete {
            return Err(SnapshotRejection::Completed);
        }
        if state.running && state.paused {
            return Err(SnapshotRejection::ConflictingFlags);
        }
        let set_ok = (1..=self.config.sets).contains(&state.current_set);
        let cycle_ok = (1..=self.config.cycles).contains(&state.current_cycle);
        if !set_ok || !cycle_ok {
            return Err(SnapshotRejection::CountersOutOfRange);
        }
        Ok(())
    }

    fn catch_up(&mut self, snapshot: Snapshot, now: u64) {
        let gap = snapshot.age_ms(now);
        let from = snapshot.state.phase;
        self.state = snapshot.state;
        self.state.total_elapsed_ms = self.state.total_elapsed_ms.saturating_add(gap);

        let balance = self.state.remaining_ms as i64 - gap as i64;
        self.state.remaining_ms = balance.max(0) as u64;

        self.catching_up = true;
        self.run_transitions(balance);
        self.catching_up = false;

        info!(
            gap_ms = gap,
            from = %from,
            to = %self.state.phase,
            set = self.state.current_set,
            cycle = self.state.current_cycle,
            remaining_ms = self.state.remaining_ms,
            "reconciled timer snapshot"
        );

        if self.state.phase.is_terminal() {
            return;
        }
        self.last_tick_ms = Some(now);
        self.driver.start();
        self.persist(true);
        self.emit_state_change(ChangeFlags::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventLog, SoundCue};
    use crate::timer::clock::ManualClock;
    use crate::timer::driver::{SharedDriver, TickDriver};
    use crate::timer::phase::Counters;
    use crate::timer::state::{RunState, SNAPSHOT_MAX_AGE_MS};
    use crate::timer::store::{MemorySnapshotStore, MemoryWorkoutLog};
    use crate::timer::workout::WorkoutConfig;

    const NOW: u64 = 1_700_000_000_000;

    fn config() -> WorkoutConfig {
        WorkoutConfig {
            initial_countdown: 20,
            warmup: 0,
            exercise: 30,
            rest: 10,
            sets: 2,
            recovery: 0,
            cycles: 2,
            cooldown: 0,
            halfway_beep: false,
        }
    }

    fn running(phase: Phase, remaining_ms: u64, set: u32, cycle: u32, total: u64) -> RunState {
        RunState {
            phase,
            remaining_ms,
            current_set: set,
            current_cycle: cycle,
            total_elapsed_ms: total,
            running: true,
            paused: false,
            started_at_ms: Some(NOW - 3_600_000),
            paused_at_ms: None,
        }
    }

    struct Restored {
        engine: TimerEngine,
        store: MemorySnapshotStore,
        workouts: MemoryWorkoutLog,
        log: EventLog,
        driver: SharedDriver,
    }

    fn restore(config: WorkoutConfig, snapshot: Snapshot) -> Restored {
        let store = MemorySnapshotStore::with_snapshot(snapshot);
        let workouts = MemoryWorkoutLog::new();
        let log = EventLog::new();
        let driver = SharedDriver::new();
        let engine = TimerEngine::builder(config)
            .clock(ManualClock::new(NOW))
            .store(store.clone())
            .recorder(workouts.clone())
            .driver(driver.clone())
            .subscribe(log.clone())
            .build()
            .unwrap();
        Restored {
            engine,
            store,
            workouts,
            log,
            driver,
        }
    }

    #[test]
    fn gap_inside_current_phase_only_shortens_it() {
        let snap = Snapshot::new(running(Phase::Exercise, 20_000, 1, 1, 40_000), NOW - 5_000);
        let r = restore(config(), snap);
        let state = r.engine.state();
        assert_eq!(state.phase, Phase::Exercise);
        assert_eq!(state.remaining_ms, 15_000);
        assert_eq!(state.total_elapsed_ms, 45_000);
        assert!(state.running);
        assert!(r.driver.is_active());
        assert_eq!(r.store.current().unwrap().captured_at_ms, NOW);
    }

    #[test]
    fn deficit_carries_into_next_phase() {
        // 5s left of a 10s exercise, captured 12s ago: the exercise ended 7s
        // ago, so 3s of the 10s rest remain.
        let cfg = WorkoutConfig {
            exercise: 10,
            ..config()
        };
        let snap = Snapshot::new(running(Phase::Exercise, 5_000, 1, 1, 25_000), NOW - 12_000);
        let r = restore(cfg, snap);
        let state = r.engine.state();
        assert_eq!(state.phase, Phase::Rest);
        assert_eq!(state.remaining_ms, 3_000);
        assert_eq!(state.counters(), Counters::FIRST);
        assert_eq!(state.total_elapsed_ms, 37_000);
    }

    #[test]
    fn deficit_spanning_several_phases_lands_exactly() {
        // Initial (5s left) + Exercise 30s + Rest 10s + 4s into set 2.
        let snap = Snapshot::new(running(Phase::Initial, 5_000, 1, 1, 15_000), NOW - 49_000);
        let r = restore(config(), snap);
        let state = r.engine.state();
        assert_eq!(state.phase, Phase::Exercise);
        assert_eq!(state.counters(), Counters { set: 2, cycle: 1 });
        assert_eq!(state.remaining_ms, 26_000);
        assert!(r.workouts.records().is_empty());
    }

    #[test]
    fn deficit_crossing_a_cycle_boundary_updates_cycle() {
        // Exercise set 2 (1s left) then exercise set 1 of cycle 2 (30s),
        // then 2s into the rest.
        let snap = Snapshot::new(running(Phase::Exercise, 1_000, 2, 1, 90_000), NOW - 33_000);
        let r = restore(config(), snap);
        let state = r.engine.state();
        assert_eq!(state.phase, Phase::Rest);
        assert_eq!(state.counters(), Counters { set: 1, cycle: 2 });
        assert_eq!(state.remaining_ms, 8_000);
    }

    #[test]
    fn exact_phase_boundary_advances() {
        let snap = Snapshot::new(running(Phase::Rest, 4_000, 1, 1, 56_000), NOW - 4_000);
        let r = restore(config(), snap);
        assert_eq!(r.engine.phase(), Phase::Exercise);
        assert_eq!(r.engine.state().remaining_ms, 30_000);
        assert_eq!(r.engine.state().current_set, 2);
    }

    #[test]
    fn catch_up_to_completion_records_once() {
        let snap = Snapshot::new(running(Phase::Exercise, 1_000, 2, 2, 150_000), NOW - 5_000);
        let r = restore(config(), snap);
        assert_eq!(r.engine.phase(), Phase::Complete);
        assert!(!r.engine.is_running() && !r.engine.is_paused());
        assert!(!r.driver.is_active());
        assert!(r.store.current().is_none());
        // The workout ended 4s before now.
        assert_eq!(r.workouts.records(), vec![(151_000, config())]);
        let completes: Vec<Event> = r
            .log
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::Complete { .. }))
            .collect();
        assert_eq!(
            completes,
            vec![Event::Complete {
                total_time_ms: 151_000,
                total_cycles: 2,
                total_sets: 2,
            }]
        );
    }

    #[test]
    fn long_gap_across_many_phases_completes_once() {
        let snap = Snapshot::new(running(Phase::Initial, 20_000, 1, 1, 0), NOW - 3_600_000);
        let r = restore(config(), snap);
        assert_eq!(r.engine.phase(), Phase::Complete);
        assert_eq!(r.workouts.records().len(), 1);
        assert_eq!(r.workouts.records()[0].0, 160_000);
        assert_eq!(r.log.sounds(), vec![SoundCue::WorkoutComplete]);
    }

    #[test]
    fn catch_up_suppresses_stale_cues_but_reports_phases() {
        let snap = Snapshot::new(running(Phase::Initial, 5_000, 1, 1, 15_000), NOW - 49_000);
        let r = restore(config(), snap);
        assert!(r.log.sounds().is_empty());
        let phases: Vec<Phase> = r
            .log
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::PhaseChange { phase, .. } => Some(*phase),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![Phase::Exercise, Phase::Rest, Phase::Exercise, Phase::Exercise]
        );
    }

    #[test]
    fn restored_run_keeps_ticking() {
        let clock = ManualClock::new(NOW);
        let store = MemorySnapshotStore::with_snapshot(Snapshot::new(
            running(Phase::Exercise, 20_000, 1, 1, 40_000),
            NOW - 5_000,
        ));
        let mut engine = TimerEngine::builder(config())
            .clock(clock.clone())
            .store(store)
            .build()
            .unwrap();
        clock.advance(1_000);
        engine.tick();
        assert_eq!(engine.state().remaining_ms, 14_000);
    }

    #[test]
    fn paused_snapshot_is_restored_verbatim() {
        let mut state = running(Phase::Rest, 7_000, 1, 2, 100_000);
        state.running = false;
        state.paused = true;
        state.paused_at_ms = Some(NOW - 600_000);
        let snap = Snapshot::new(state.clone(), NOW - 600_000);
        let r = restore(config(), snap);
        assert_eq!(r.engine.state(), &state);
        assert!(!r.driver.is_active());
        assert!(r.log.events().is_empty());
    }

    #[test]
    fn stale_snapshot_is_discarded() {
        let snap = Snapshot::new(
            running(Phase::Exercise, 20_000, 1, 1, 40_000),
            NOW - SNAPSHOT_MAX_AGE_MS,
        );
        let r = restore(config(), snap);
        assert_eq!(r.engine.state(), &RunState::default());
        assert!(r.store.current().is_none());
        assert!(r.workouts.records().is_empty());
    }

    #[test]
    fn snapshot_from_a_larger_workout_is_discarded() {
        let snap = Snapshot::new(running(Phase::Exercise, 20_000, 5, 1, 40_000), NOW - 1_000);
        let r = restore(config(), snap);
        assert_eq!(r.engine.state(), &RunState::default());
        assert!(r.store.current().is_none());
    }

    #[test]
    fn completed_snapshot_is_discarded() {
        let mut state = running(Phase::Complete, 0, 2, 2, 160_000);
        state.running = false;
        let r = restore(config(), Snapshot::new(state, NOW - 1_000));
        assert_eq!(r.engine.state(), &RunState::default());
    }
}
