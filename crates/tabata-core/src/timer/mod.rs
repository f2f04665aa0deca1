mod clock;
mod driver;
mod engine;
mod phase;
mod reconcile;
mod state;
mod store;
mod workout;

pub use clock::{Clock, ManualClock, SystemClock};
pub use driver::{SharedDriver, TickDriver};
pub use engine::{format_duration, EngineOptions, TimerEngine, TimerEngineBuilder, TimerStatus};
pub use phase::{
    plan, predecessor, step_bound, successor, ColorTag, Counters, Phase, PhaseGraph, PhaseNode,
    PlannedStep,
};
pub use reconcile::SnapshotRejection;
pub use state::{RunState, Snapshot, SNAPSHOT_MAX_AGE_MS};
pub use store::{MemorySnapshotStore, MemoryWorkoutLog, SnapshotStore, WorkoutRecorder};
pub use workout::{WorkoutConfig, MAX_CYCLES, MAX_INTERVAL_SECS, MAX_SETS};
