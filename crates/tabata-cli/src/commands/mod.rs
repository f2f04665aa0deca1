pub mod config;
pub mod plan;
pub mod preset;
pub mod stats;
pub mod timer;

use tabata_core::{ConfigError, Database, SnapshotStore};

/// Refuse workout changes while a persisted run is running or paused.
///
/// A snapshot that no longer loads is not an active run; the engine discards
/// it on the next start.
pub(crate) fn ensure_no_active_run(db: &Database) -> Result<(), ConfigError> {
    match SnapshotStore::load(db) {
        Ok(Some(snapshot)) if !snapshot.state.is_idle() => Err(ConfigError::RunInProgress),
        _ => Ok(()),
    }
}
