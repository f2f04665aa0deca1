//! # Tabata Core Library
//!
//! This library provides the core logic for the Tabata interval workout timer.
//! Every operation is reachable from the standalone `tabata` CLI binary, which is
//! a thin layer over the same engine.
//!
//! ## Architecture
//!
//! - **Phase Graph**: Pure function from (phase, configuration, counters) to the
//!   next phase, with explicit counter updates
//! - **Timer Engine**: A wall-clock-based state machine that requires the caller
//!   to periodically invoke `tick()` for progress updates
//! - **Reconciliation**: On construction a persisted snapshot is replayed
//!   against the elapsed wall-clock time, so a run survives the process dying
//! - **Storage**: SQLite-backed snapshot store, workout statistics and presets,
//!   plus TOML-based configuration
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Core timer state machine
//! - [`WorkoutConfig`]: Interval durations and set/cycle counts
//! - [`Database`]: Snapshot, statistics and preset persistence
//! - [`Config`]: Application configuration management

pub mod timer;
pub mod storage;
pub mod events;
pub mod error;

pub use timer::{
    Clock, EngineOptions, ManualClock, Phase, RunState, Snapshot, SnapshotStore, SystemClock,
    TimerEngine, TimerStatus, WorkoutConfig, WorkoutRecorder,
};
pub use storage::{Config, Database, Preset, WorkoutRecord, WorkoutStats};
pub use events::{Event, EventLog, EventSink, SoundCue};
pub use error::{ConfigError, CoreError, StorageError, ValidationError};
