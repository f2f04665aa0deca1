//! Timer engine implementation.
//!
//! The timer engine is a wall-clock-based state machine over [`Phase`]. It
//! does not use internal threads - an external driver calls `tick()`
//! periodically while the [`TickDriver`] handle is active.
//!
//! ## State Transitions
//!
//! ```text
//! Initial -> [Warmup] -> Exercise -> [Rest] -> ... -> [Recovery] -> Exercise ...
//!         -> [Cooldown] -> Complete
//! ```
//!
//! Remaining time is always derived from clock deltas, never from counting
//! ticks, so a late or missing tick only delays events; it never skews the
//! timeline.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::builder(config).store(db.clone()).build()?;
//! engine.start();
//! // While the driver is active:
//! engine.tick();
//! ```

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::clock::{Clock, SystemClock};
use super::driver::{SharedDriver, TickDriver};
use super::phase::{predecessor, step_bound, successor, ColorTag, Phase, PhaseGraph};
use super::state::{RunState, Snapshot};
use super::store::{MemorySnapshotStore, SnapshotStore, WorkoutRecorder};
use super::workout::WorkoutConfig;
use crate::error::{ConfigError, Result};
use crate::events::{Event, EventSink, SoundCue};

/// Tunables that do not affect the phase graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Minimum spacing of snapshot writes while ticking.
    pub snapshot_interval_ms: u64,
    /// Master switch for `Sound` events.
    pub sound_enabled: bool,
    /// Emit the 3-2-1 countdown cue.
    pub countdown_cue: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            snapshot_interval_ms: 1000,
            sound_enabled: true,
            countdown_cue: true,
        }
    }
}

/// Read-only view of the engine for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerStatus {
    pub phase: Phase,
    pub label: &'static str,
    pub color: ColorTag,
    pub remaining_ms: u64,
    pub remaining: String,
    pub current_set: u32,
    pub current_cycle: u32,
    pub sets: u32,
    pub cycles: u32,
    pub total_elapsed_ms: u64,
    pub running: bool,
    pub paused: bool,
    pub phase_progress_pct: f64,
    pub workout_progress_pct: f64,
    pub planned_total_ms: u64,
}

/// Flags carried by a state-change `PhaseChange` event.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct ChangeFlags {
    pub paused: Option<bool>,
    pub reset: bool,
    pub stopped: bool,
}

/// Core timer engine.
///
/// Owns the authoritative [`RunState`]. All collaborators are injected
/// through [`TimerEngineBuilder`].
pub struct TimerEngine {
    pub(super) config: WorkoutConfig,
    pub(super) state: RunState,
    pub(super) options: EngineOptions,
    pub(super) clock: Box<dyn Clock>,
    pub(super) store: Box<dyn SnapshotStore>,
    pub(super) recorder: Option<Box<dyn WorkoutRecorder>>,
    pub(super) driver: Box<dyn TickDriver>,
    sinks: Vec<Box<dyn EventSink>>,
    /// Wall-clock reading of the previous tick while running.
    pub(super) last_tick_ms: Option<u64>,
    last_persist_ms: Option<u64>,
    /// Last whole second announced by the countdown cue in this phase.
    last_countdown_sec: Option<u64>,
    halfway_fired: bool,
    /// Suppresses sound cues while catching up after a restore.
    pub(super) catching_up: bool,
}

/// Collects collaborators, then restores any persisted run in `build()`.
pub struct TimerEngineBuilder {
    config: WorkoutConfig,
    options: EngineOptions,
    clock: Box<dyn Clock>,
    store: Box<dyn SnapshotStore>,
    recorder: Option<Box<dyn WorkoutRecorder>>,
    driver: Box<dyn TickDriver>,
    sinks: Vec<Box<dyn EventSink>>,
}

impl TimerEngineBuilder {
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn store(mut self, store: impl SnapshotStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn recorder(mut self, recorder: impl WorkoutRecorder + 'static) -> Self {
        self.recorder = Some(Box::new(recorder));
        self
    }

    pub fn driver(mut self, driver: impl TickDriver + 'static) -> Self {
        self.driver = Box::new(driver);
        self
    }

    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Subscribers added here also observe events produced by restoration.
    pub fn subscribe(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Validate the configuration, construct the engine and reconcile it
    /// against the stored snapshot, if any.
    ///
    /// # Errors
    /// Returns an error if the workout configuration is out of range.
    pub fn build(self) -> Result<TimerEngine> {
        self.config.validate()?;
        let mut engine = TimerEngine {
            config: self.config,
            state: RunState::default(),
            options: self.options,
            clock: self.clock,
            store: self.store,
            recorder: self.recorder,
            driver: self.driver,
            sinks: self.sinks,
            last_tick_ms: None,
            last_persist_ms: None,
            last_countdown_sec: None,
            halfway_fired: false,
            catching_up: false,
        };
        engine.restore();
        Ok(engine)
    }
}

impl TimerEngine {
    pub fn builder(config: WorkoutConfig) -> TimerEngineBuilder {
        TimerEngineBuilder {
            config,
            options: EngineOptions::default(),
            clock: Box::new(SystemClock),
            store: Box::new(MemorySnapshotStore::new()),
            recorder: None,
            driver: Box::new(SharedDriver::new()),
            sinks: Vec::new(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn config(&self) -> &WorkoutConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn driver_active(&self) -> bool {
        self.driver.is_active()
    }

    /// Phase graph resolved against the current counters.
    pub fn phase_graph(&self) -> PhaseGraph {
        PhaseGraph::resolve(&self.config, self.state.counters())
    }

    pub fn total_planned_ms(&self) -> u64 {
        self.config.total_planned_ms()
    }

    /// Remaining time as a user would see it: a never-started `Initial`
    /// shows its full countdown rather than the uninitialized zero.
    pub fn display_remaining_ms(&self) -> u64 {
        if self.state.phase == Phase::Initial
            && self.state.remaining_ms == 0
            && self.state.started_at_ms.is_none()
        {
            return Phase::Initial.duration_ms(&self.config);
        }
        self.state.remaining_ms
    }

    /// 0.0 .. 100.0 progress within the current phase.
    pub fn phase_progress_pct(&self) -> f64 {
        let total = self.state.phase.duration_ms(&self.config);
        if total == 0 {
            return 0.0;
        }
        let elapsed = total.saturating_sub(self.display_remaining_ms());
        (elapsed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// 0.0 .. 100.0 progress across the whole workout.
    pub fn workout_progress_pct(&self) -> f64 {
        if self.state.phase == Phase::Complete {
            return 100.0;
        }
        let planned = self.total_planned_ms();
        if planned == 0 {
            return 0.0;
        }
        (self.state.total_elapsed_ms as f64 / planned as f64 * 100.0).min(100.0)
    }

    pub fn status(&self) -> TimerStatus {
        let remaining_ms = self.display_remaining_ms();
        TimerStatus {
            phase: self.state.phase,
            label: self.state.phase.label(),
            color: self.state.phase.color(),
            remaining_ms,
            remaining: format_duration(remaining_ms),
            current_set: self.state.current_set,
            current_cycle: self.state.current_cycle,
            sets: self.config.sets,
            cycles: self.config.cycles,
            total_elapsed_ms: self.state.total_elapsed_ms,
            running: self.state.running,
            paused: self.state.paused,
            phase_progress_pct: self.phase_progress_pct(),
            workout_progress_pct: self.workout_progress_pct(),
            planned_total_ms: self.total_planned_ms(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start the run. No-op while running; resumes when paused; starts a
    /// fresh run once the previous one has completed.
    pub fn start(&mut self) {
        if self.state.running {
            return;
        }
        if self.state.paused {
            self.resume();
            return;
        }
        if self.state.phase == Phase::Complete {
            self.reset();
        }

        let now = self.clock.now_ms();
        match (self.state.started_at_ms, self.state.paused_at_ms.take()) {
            (None, _) => self.state.started_at_ms = Some(now),
            // Restarting after stop(): the stopped interval does not count.
            (Some(started), Some(stopped_at)) => {
                self.state.started_at_ms = Some(started + now.saturating_sub(stopped_at));
            }
            (Some(_), None) => {}
        }
        self.state.running = true;
        self.state.paused = false;
        self.last_tick_ms = Some(now);
        self.driver.start();

        if self.state.phase == Phase::Initial && self.state.remaining_ms == 0 {
            let balance = self.enter_phase(Phase::Initial, 0);
            self.run_transitions(balance);
        }

        self.persist(true);
        if self.state.running {
            self.emit_state_change(ChangeFlags::default());
        }
    }

    pub fn pause(&mut self) {
        if !self.state.running {
            return;
        }
        let now = self.clock.now_ms();
        self.consume_elapsed(now);
        if self.state.phase.is_terminal() {
            return;
        }
        self.driver.stop();
        self.state.paused_at_ms = Some(now);
        self.state.running = false;
        self.state.paused = true;
        self.last_tick_ms = None;
        self.persist(true);
        self.emit_state_change(ChangeFlags {
            paused: Some(true),
            ..ChangeFlags::default()
        });
    }

    pub fn resume(&mut self) {
        if !self.state.paused {
            return;
        }
        let now = self.clock.now_ms();
        if let (Some(started), Some(paused_at)) =
            (self.state.started_at_ms, self.state.paused_at_ms.take())
        {
            self.state.started_at_ms = Some(started + now.saturating_sub(paused_at));
        }
        self.state.running = true;
        self.state.paused = false;
        self.last_tick_ms = Some(now);
        self.driver.start();
        self.persist(true);
        self.emit_state_change(ChangeFlags {
            paused: Some(false),
            ..ChangeFlags::default()
        });
    }

    /// Halt the run without discarding position. The persisted snapshot is
    /// cleared, so a reload starts idle at the same phase.
    pub fn stop(&mut self) {
        if self.state.running {
            let now = self.clock.now_ms();
            self.consume_elapsed(now);
            if self.state.phase.is_terminal() {
                return;
            }
            self.state.paused_at_ms = Some(now);
        }
        self.driver.stop();
        self.state.running = false;
        self.state.paused = false;
        self.last_tick_ms = None;
        self.clear_snapshot();
        self.emit_state_change(ChangeFlags {
            stopped: true,
            ..ChangeFlags::default()
        });
    }

    /// Discard the run and go back to an uninitialized `Initial`.
    pub fn reset(&mut self) {
        self.driver.stop();
        self.state = RunState::default();
        self.last_tick_ms = None;
        self.last_persist_ms = None;
        self.reset_phase_cues();
        self.clear_snapshot();
        self.emit_state_change(ChangeFlags {
            reset: true,
            ..ChangeFlags::default()
        });
    }

    /// Replace the workout configuration.
    ///
    /// # Errors
    /// Fails if the configuration is out of range or a run is active.
    pub fn set_config(&mut self, config: WorkoutConfig) -> Result<()> {
        config.validate()?;
        if !self.state.is_idle() {
            return Err(ConfigError::RunInProgress.into());
        }
        self.config = config;
        self.reset();
        Ok(())
    }

    /// Called periodically by the driver.
    ///
    /// Consumes the wall-clock time since the previous tick. If that exhausts
    /// the phase, the overshoot carries into the following phases and no
    /// `Tick` event is emitted for this call.
    pub fn tick(&mut self) {
        if !self.state.running {
            return;
        }
        let now = self.clock.now_ms();
        if self.consume_elapsed(now) {
            self.persist(true);
            return;
        }

        self.check_sound_cues();
        let event = Event::Tick {
            remaining_ms: self.state.remaining_ms,
            phase: self.state.phase,
            current_set: self.state.current_set,
            current_cycle: self.state.current_cycle,
            total_elapsed_ms: self.state.total_elapsed_ms,
            progress_pct: self.phase_progress_pct(),
        };
        self.emit(event);
        self.persist(false);
    }

    /// Advance immediately, regardless of remaining time.
    pub fn skip_to_next_phase(&mut self) {
        if self.state.running {
            let now = self.clock.now_ms();
            self.consume_elapsed(now);
        }
        if self.state.phase.is_terminal() {
            debug!("skip requested on a completed workout");
            return;
        }
        let balance = self.advance_to_next_phase(0);
        self.run_transitions(balance);
        if self.state.running {
            self.last_tick_ms = Some(self.clock.now_ms());
        }
        self.persist(true);
    }

    /// Step back to the phase that statically precedes the current one.
    /// Leaving `Exercise` backwards also rewinds one set.
    ///
    /// No-op once the workout is complete; `start()` begins a fresh run.
    pub fn skip_to_previous_phase(&mut self) {
        if self.state.running {
            let now = self.clock.now_ms();
            self.consume_elapsed(now);
        }
        if self.state.phase.is_terminal() {
            debug!("step back requested on a completed workout");
            return;
        }
        let from = self.state.phase;
        let target = predecessor(from, &self.config);
        let counters = self.state.counters().rewound(from, &self.config);
        self.state.set_counters(counters);
        self.enter_phase(target, 0);
        if self.state.running {
            self.last_tick_ms = Some(self.clock.now_ms());
        }
        self.persist(true);
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Keep advancing while the signed remaining `balance` is exhausted.
    ///
    /// Each advance credits the full duration of the phase entered, so a
    /// deficit spanning several phases lands on the right phase with the
    /// right remaining time.
    pub(super) fn run_transitions(&mut self, mut balance: i64) {
        let bound = step_bound(&self.config);
        let mut steps = 0usize;
        while balance <= 0 && !self.state.phase.is_terminal() {
            if steps >= bound {
                error!(
                    phase = %self.state.phase,
                    steps,
                    "phase graph did not settle; forcing completion"
                );
                self.complete(0);
                return;
            }
            steps += 1;
            balance = self.advance_to_next_phase(balance);
        }
    }

    /// One forward transition. `carry_ms` (≤ 0) is time already spent past
    /// the end of the phase being left. Returns the signed remaining time of
    /// the phase entered.
    fn advance_to_next_phase(&mut self, carry_ms: i64) -> i64 {
        let from = self.state.phase;
        let Some(next) = successor(from, &self.config, self.state.counters()) else {
            error!(phase = %from, "advance requested from a terminal phase");
            return 1;
        };
        let counters = self.state.counters().advanced(from, next, &self.config);
        self.state.set_counters(counters);
        debug!(from = %from, to = %next, set = counters.set, cycle = counters.cycle, "phase advance");

        if next == Phase::Complete {
            self.complete(carry_ms.min(0).unsigned_abs());
            return 1;
        }
        self.enter_phase(next, carry_ms)
    }

    /// Initialize `phase` with its configured duration plus `carry_ms`.
    /// Returns the signed remaining time.
    fn enter_phase(&mut self, phase: Phase, carry_ms: i64) -> i64 {
        let balance = phase.duration_ms(&self.config) as i64 + carry_ms;
        self.state.phase = phase;
        self.state.remaining_ms = balance.max(0) as u64;
        self.reset_phase_cues();

        self.emit(Event::PhaseChange {
            phase,
            remaining_ms: self.state.remaining_ms,
            current_set: self.state.current_set,
            current_cycle: self.state.current_cycle,
            label: phase.label().to_string(),
            color: phase.color(),
            running: self.state.running,
            paused: None,
            reset: false,
            stopped: false,
        });
        self.cue(SoundCue::PhaseChange);
        if phase == Phase::Exercise {
            self.cue(SoundCue::ExerciseBeep);
        }
        balance
    }

    /// Finish the run. `overshoot_ms` is wall time that elapsed after the
    /// workout actually ended and is not counted towards its total.
    fn complete(&mut self, overshoot_ms: u64) {
        self.driver.stop();
        self.state.phase = Phase::Complete;
        self.state.running = false;
        self.state.paused = false;
        self.state.paused_at_ms = None;
        self.state.remaining_ms = 0;
        self.state.total_elapsed_ms = self.state.total_elapsed_ms.saturating_sub(overshoot_ms);
        self.last_tick_ms = None;
        self.clear_snapshot();

        if self.state.started_at_ms.is_some() {
            if let Some(recorder) = &self.recorder {
                if let Err(e) = recorder.record_workout(self.state.total_elapsed_ms, &self.config) {
                    warn!(error = %e, "failed to record completed workout");
                }
            }
        }
        info!(
            total_ms = self.state.total_elapsed_ms,
            cycles = self.state.current_cycle,
            sets = self.state.current_set,
            "workout complete"
        );

        self.emit(Event::Complete {
            total_time_ms: self.state.total_elapsed_ms,
            total_cycles: self.state.current_cycle,
            total_sets: self.state.current_set,
        });
        self.cue_unconditionally(SoundCue::WorkoutComplete);
    }

    /// Consume the wall time since the previous tick while running.
    ///
    /// A gap that exhausts the phase (a late tick, or a host that suspended
    /// the process) is carried through as many phases as it covers. Returns
    /// `true` if at least one transition happened.
    fn consume_elapsed(&mut self, now: u64) -> bool {
        let delta = now.saturating_sub(self.last_tick_ms.unwrap_or(now));
        self.last_tick_ms = Some(now);
        if let Some(started) = self.state.started_at_ms {
            self.state.total_elapsed_ms = now.saturating_sub(started);
        }

        let balance = self.state.remaining_ms as i64 - delta as i64;
        self.state.remaining_ms = balance.max(0) as u64;
        if balance > 0 {
            return false;
        }
        self.run_transitions(balance);
        true
    }

    fn check_sound_cues(&mut self) {
        let remaining = self.state.remaining_ms;
        let whole_secs = remaining.div_ceil(1000);
        if self.options.countdown_cue
            && (1..=3).contains(&whole_secs)
            && self.last_countdown_sec != Some(whole_secs)
        {
            self.last_countdown_sec = Some(whole_secs);
            self.cue(SoundCue::Countdown);
        }

        if self.config.halfway_beep && !self.halfway_fired {
            let total = self.state.phase.duration_ms(&self.config);
            if total > 0 && total.saturating_sub(remaining) >= total / 2 {
                self.halfway_fired = true;
                self.cue(SoundCue::Halfway);
            }
        }
    }

    fn reset_phase_cues(&mut self) {
        self.last_countdown_sec = None;
        self.halfway_fired = false;
    }

    fn cue(&mut self, cue: SoundCue) {
        if self.catching_up {
            return;
        }
        self.cue_unconditionally(cue);
    }

    fn cue_unconditionally(&mut self, cue: SoundCue) {
        if self.options.sound_enabled {
            self.emit(Event::Sound { cue });
        }
    }

    pub(super) fn emit_state_change(&mut self, flags: ChangeFlags) {
        let phase = self.state.phase;
        self.emit(Event::PhaseChange {
            phase,
            remaining_ms: self.display_remaining_ms(),
            current_set: self.state.current_set,
            current_cycle: self.state.current_cycle,
            label: phase.label().to_string(),
            color: phase.color(),
            running: self.state.running,
            paused: flags.paused,
            reset: flags.reset,
            stopped: flags.stopped,
        });
    }

    fn emit(&mut self, event: Event) {
        for sink in &mut self.sinks {
            sink.on_event(&event);
        }
    }

    /// Write a snapshot if a run is active. Unforced writes are throttled to
    /// `snapshot_interval_ms`. Failures are logged and otherwise ignored.
    pub(super) fn persist(&mut self, force: bool) {
        if self.state.is_idle() {
            return;
        }
        let now = self.clock.now_ms();
        if !force {
            if let Some(last) = self.last_persist_ms {
                if now.saturating_sub(last) < self.options.snapshot_interval_ms {
                    return;
                }
            }
        }
        let snapshot = Snapshot::new(self.state.clone(), now);
        match self.store.save(&snapshot) {
            Ok(()) => self.last_persist_ms = Some(now),
            Err(e) => warn!(error = %e, "failed to persist timer snapshot"),
        }
    }

    pub(super) fn clear_snapshot(&mut self) {
        self.last_persist_ms = None;
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear timer snapshot");
        }
    }
}

/// Format milliseconds as `MM:SS`, rounding partial seconds up.
pub fn format_duration(ms: u64) -> String {
    let total_secs = ms.div_ceil(1000);
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}
