use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::database::{encode, format_timestamp, parse_timestamp, text_conversion_error, Database};
use crate::error::{Result, StorageError, ValidationError};
use crate::timer::WorkoutConfig;

/// A named, saved workout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub config: WorkoutConfig,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

type PresetRow = (String, String, String, Option<String>);

fn decode(row: PresetRow) -> Result<Preset, StorageError> {
    let (name, config_json, created_at, last_used) = row;
    let config = serde_json::from_str(&config_json).map_err(|source| StorageError::Corrupt {
        key: format!("presets.{name}"),
        source,
    })?;
    let created_at = parse_timestamp(&created_at).map_err(|e| text_conversion_error(2, e))?;
    let last_used = match last_used {
        Some(ts) => Some(parse_timestamp(&ts).map_err(|e| text_conversion_error(3, e))?),
        None => None,
    };
    Ok(Preset {
        name,
        config,
        created_at,
        last_used,
    })
}

/// Preset names are matched without surrounding whitespace.
fn normalize_name(name: &str) -> &str {
    name.trim()
}

impl Database {
    /// Save `config` under `name`, replacing any preset with the same name.
    ///
    /// # Errors
    /// Returns an error if the name is blank, the configuration is out of
    /// range, or the write fails.
    pub fn save_preset(&self, name: &str, config: &WorkoutConfig) -> Result<Preset> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(ValidationError::Empty("name").into());
        }
        config.validate()?;

        let now = Utc::now();
        let config_json = encode("presets.config_json", config)?;
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO presets (name, config_json, created_at, last_used)
                 VALUES (?1, ?2, ?3, NULL)",
                params![name, config_json, format_timestamp(now)],
            )
            .map_err(StorageError::from)?;

        Ok(Preset {
            name: name.to_string(),
            config: *config,
            created_at: now,
            last_used: None,
        })
    }

    /// Fetch a preset and stamp its `last_used` time.
    pub fn load_preset(&self, name: &str) -> Result<Preset, StorageError> {
        let name = normalize_name(name);
        let now = format_timestamp(Utc::now());
        let updated = self.conn().execute(
            "UPDATE presets SET last_used = ?2 WHERE name = ?1",
            params![name, now],
        )?;
        if updated == 0 {
            return Err(StorageError::PresetNotFound(name.to_string()));
        }

        let row = self
            .conn()
            .query_row(
                "SELECT name, config_json, created_at, last_used FROM presets WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?
            .ok_or_else(|| StorageError::PresetNotFound(name.to_string()))?;
        decode(row)
    }

    /// All presets, most recently used first, then by name.
    pub fn list_presets(&self) -> Result<Vec<Preset>, StorageError> {
        let mut stmt = self.conn().prepare(
            "SELECT name, config_json, created_at, last_used
             FROM presets
             ORDER BY last_used IS NULL, last_used DESC, name ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;

        let mut presets = Vec::new();
        for row in rows {
            presets.push(decode(row?)?);
        }
        Ok(presets)
    }

    /// Returns `false` if no preset had that name.
    pub fn delete_preset(&self, name: &str) -> Result<bool, StorageError> {
        let name = normalize_name(name);
        let deleted = self
            .conn()
            .execute("DELETE FROM presets WHERE name = ?1", params![name])?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    fn short() -> WorkoutConfig {
        WorkoutConfig {
            exercise: 20,
            rest: 10,
            sets: 8,
            cycles: 1,
            ..WorkoutConfig::default()
        }
    }

    #[test]
    fn save_and_load_preset() {
        let db = Database::open_memory().unwrap();
        let saved = db.save_preset("tabata", &short()).unwrap();
        assert!(saved.last_used.is_none());

        let loaded = db.load_preset("tabata").unwrap();
        assert_eq!(loaded.config, short());
        assert!(loaded.last_used.is_some());
    }

    #[test]
    fn saving_same_name_replaces() {
        let db = Database::open_memory().unwrap();
        db.save_preset("mine", &short()).unwrap();
        let longer = WorkoutConfig {
            sets: 12,
            ..short()
        };
        db.save_preset("mine", &longer).unwrap();

        let presets = db.list_presets().unwrap();
        assert_eq!(presets.len(), 1);
        assert_eq!(presets[0].config.sets, 12);
    }

    #[test]
    fn list_puts_recently_used_first() {
        let db = Database::open_memory().unwrap();
        db.save_preset("a", &short()).unwrap();
        db.save_preset("b", &short()).unwrap();
        db.load_preset("b").unwrap();

        let names: Vec<_> = db
            .list_presets()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn missing_preset_is_reported() {
        let db = Database::open_memory().unwrap();
        assert!(matches!(
            db.load_preset("nope"),
            Err(StorageError::PresetNotFound(_))
        ));
        assert!(!db.delete_preset("nope").unwrap());
    }

    #[test]
    fn delete_preset_removes_it() {
        let db = Database::open_memory().unwrap();
        db.save_preset("gone", &short()).unwrap();
        assert!(db.delete_preset("gone").unwrap());
        assert!(db.list_presets().unwrap().is_empty());
    }

    #[test]
    fn names_match_without_surrounding_whitespace() {
        let db = Database::open_memory().unwrap();
        let saved = db.save_preset("  legs ", &short()).unwrap();
        assert_eq!(saved.name, "legs");

        assert_eq!(db.load_preset("legs").unwrap().config, short());
        assert_eq!(db.load_preset("  legs ").unwrap().name, "legs");
        assert!(db.delete_preset(" legs\t").unwrap());
        assert!(db.list_presets().unwrap().is_empty());
    }

    #[test]
    fn invalid_presets_are_rejected() {
        let db = Database::open_memory().unwrap();
        assert!(matches!(
            db.save_preset("  ", &short()),
            Err(CoreError::Validation(ValidationError::Empty("name")))
        ));
        let bad = WorkoutConfig { sets: 0, ..short() };
        assert!(matches!(
            db.save_preset("bad", &bad),
            Err(CoreError::Validation(_))
        ));
    }
}
