use clap::Subcommand;
use tabata_core::{Config, Database};

use super::ensure_no_active_run;

#[derive(Subcommand)]
pub enum PresetAction {
    /// Save the current workout under a name
    Save {
        /// Preset name; an existing preset with this name is replaced
        name: String,
    },
    /// Make a saved preset the current workout
    Load { name: String },
    /// List saved presets
    List,
    /// Delete a preset
    Delete { name: String },
}

pub fn run(action: PresetAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        PresetAction::Save { name } => {
            let config = Config::load()?;
            let preset = db.save_preset(&name, &config.workout)?;
            println!("{}", serde_json::to_string_pretty(&preset)?);
        }
        PresetAction::Load { name } => {
            ensure_no_active_run(&db)?;
            let preset = db.load_preset(&name)?;
            let mut config = Config::load()?;
            config.workout = preset.config;
            config.save()?;
            println!("{}", serde_json::to_string_pretty(&preset)?);
        }
        PresetAction::List => {
            let presets = db.list_presets()?;
            println!("{}", serde_json::to_string_pretty(&presets)?);
        }
        PresetAction::Delete { name } => {
            if !db.delete_preset(&name)? {
                return Err(format!("preset not found: {name}").into());
            }
            println!("deleted {name}");
        }
    }
    Ok(())
}
