mod config;
pub mod database;
mod presets;

pub use config::{Config, SoundConfig, TimerConfig};
pub use database::{Database, WorkoutRecord, WorkoutStats, HISTORY_LIMIT, SNAPSHOT_KEY};
pub use presets::Preset;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/tabata[-dev]/` based on TABATA_ENV.
///
/// Set TABATA_ENV=dev to use a development data directory, or TABATA_DATA_DIR
/// to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("TABATA_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("TABATA_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("tabata-dev")
            } else {
                base_dir.join("tabata")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
