//! SQLite-based workout storage and statistics.
//!
//! Provides persistent storage for:
//! - Completed workouts (trimmed to the most recent [`HISTORY_LIMIT`])
//! - Named workout presets
//! - Key-value store for application state, including the timer snapshot

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::{Result, StorageError};
use crate::timer::{Snapshot, SnapshotStore, WorkoutConfig, WorkoutRecorder};

/// Number of completed workouts kept in history.
pub const HISTORY_LIMIT: usize = 100;

/// kv key holding the active run snapshot.
pub const SNAPSHOT_KEY: &str = "timer_state";

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRecord {
    pub id: i64,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub config: WorkoutConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkoutStats {
    pub total_workouts: u64,
    pub total_time_ms: u64,
    pub average_ms: u64,
    pub longest_ms: u64,
    pub last_workout_at: Option<DateTime<Utc>>,
}

/// SQLite database for workout storage.
///
/// Stores completed workouts, presets and the active run snapshot.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/tabata/tabata.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("tabata.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS workouts (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                completed_at TEXT NOT NULL,
                duration_ms  INTEGER NOT NULL,
                config_json  TEXT NOT NULL
            );

            -- Running totals outlive the trimmed history.
            CREATE TABLE IF NOT EXISTS workout_totals (
                id              INTEGER PRIMARY KEY CHECK (id = 1),
                total_workouts  INTEGER NOT NULL DEFAULT 0,
                total_time_ms   INTEGER NOT NULL DEFAULT 0,
                longest_ms      INTEGER NOT NULL DEFAULT 0,
                last_workout_at TEXT
            );
            INSERT OR IGNORE INTO workout_totals (id) VALUES (1);

            CREATE TABLE IF NOT EXISTS presets (
                name        TEXT PRIMARY KEY,
                config_json TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                last_used   TEXT
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_workouts_completed_at ON workouts(completed_at);",
        )?;
        Ok(())
    }

    /// Record a completed workout, fold it into the running totals and trim
    /// history to [`HISTORY_LIMIT`].
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn record_completed(
        &self,
        duration_ms: u64,
        config: &WorkoutConfig,
        completed_at: DateTime<Utc>,
    ) -> Result<i64, StorageError> {
        let config_json = encode("workouts.config_json", config)?;
        let completed_at = format_timestamp(completed_at);
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO workouts (completed_at, duration_ms, config_json)
             VALUES (?1, ?2, ?3)",
            params![completed_at, duration_ms, config_json],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE workout_totals SET
                total_workouts = total_workouts + 1,
                total_time_ms = total_time_ms + ?1,
                longest_ms = MAX(longest_ms, ?1),
                last_workout_at = CASE
                    WHEN last_workout_at IS NULL OR last_workout_at < ?2 THEN ?2
                    ELSE last_workout_at
                END
             WHERE id = 1",
            params![duration_ms, completed_at],
        )?;
        tx.execute(
            "DELETE FROM workouts WHERE id NOT IN (
                SELECT id FROM workouts ORDER BY completed_at DESC, id DESC LIMIT ?1
             )",
            params![HISTORY_LIMIT as i64],
        )?;
        tx.commit()?;
        Ok(id)
    }

    pub fn workout_stats(&self) -> Result<WorkoutStats, StorageError> {
        let (count, total, longest, last) = self.conn.query_row(
            "SELECT total_workouts, total_time_ms, longest_ms, last_workout_at
             FROM workout_totals WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, u64>(1)?,
                    row.get::<_, u64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )?;

        let last_workout_at = match last {
            Some(ts) => Some(parse_timestamp(&ts).map_err(|e| text_conversion_error(3, e))?),
            None => None,
        };

        Ok(WorkoutStats {
            total_workouts: count,
            total_time_ms: total,
            average_ms: if count == 0 { 0 } else { total / count },
            longest_ms: longest,
            last_workout_at,
        })
    }

    /// Most recent workouts first.
    pub fn workout_history(&self, limit: usize) -> Result<Vec<WorkoutRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, completed_at, duration_ms, config_json
             FROM workouts
             ORDER BY completed_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let completed_at = row.get::<_, String>(1)?;
            let config_json = row.get::<_, String>(3)?;
            Ok(WorkoutRecord {
                id: row.get(0)?,
                completed_at: parse_timestamp(&completed_at)
                    .map_err(|e| text_conversion_error(1, e))?,
                duration_ms: row.get(2)?,
                config: serde_json::from_str(&config_json)
                    .map_err(|e| text_conversion_error(3, e))?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Whole days since the last completed workout, rounded up.
    pub fn days_since_last_workout(&self) -> Result<Option<i64>, StorageError> {
        self.days_since_last_workout_at(Utc::now())
    }

    pub fn days_since_last_workout_at(&self, now: DateTime<Utc>) -> Result<Option<i64>, StorageError> {
        let Some(last) = self.workout_stats()?.last_workout_at else {
            return Ok(None);
        };
        let elapsed_ms = (now - last).num_milliseconds().max(0);
        Ok(Some((elapsed_ms + DAY_MS - 1) / DAY_MS))
    }

    /// Delete all workout history and totals. Presets and the run snapshot
    /// are kept.
    pub fn reset_statistics(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "BEGIN;
             DELETE FROM workouts;
             UPDATE workout_totals SET total_workouts = 0, total_time_ms = 0,
                 longest_ms = 0, last_workout_at = NULL WHERE id = 1;
             COMMIT;",
        )?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<(), rusqlite::Error> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl SnapshotStore for Database {
    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let json = encode(SNAPSHOT_KEY, snapshot)?;
        self.kv_set(SNAPSHOT_KEY, &json)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        let Some(json) = self.kv_get(SNAPSHOT_KEY)? else {
            return Ok(None);
        };
        let snapshot = serde_json::from_str(&json).map_err(|source| StorageError::Corrupt {
            key: SNAPSHOT_KEY.to_string(),
            source,
        })?;
        Ok(Some(snapshot))
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.kv_delete(SNAPSHOT_KEY)?;
        Ok(())
    }
}

impl WorkoutRecorder for Database {
    fn record_workout(&self, total_elapsed_ms: u64, config: &WorkoutConfig) -> Result<(), StorageError> {
        self.record_completed(total_elapsed_ms, config, Utc::now())?;
        Ok(())
    }
}

pub(super) fn encode<T: Serialize>(key: &str, value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|source| StorageError::Corrupt {
        key: key.to_string(),
        source,
    })
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
pub(super) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(super) fn parse_timestamp(ts: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(ts).map(|dt| dt.with_timezone(&Utc))
}

pub(super) fn text_conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}
