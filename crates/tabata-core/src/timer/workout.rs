use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Upper bound for any single interval, in seconds.
pub const MAX_INTERVAL_SECS: u32 = 3600;
pub const MAX_SETS: u32 = 100;
pub const MAX_CYCLES: u32 = 1000;

/// Durations and counts that fully determine a workout's phase graph.
///
/// All durations are in seconds. The value is immutable for the duration of a
/// run; the engine refuses to swap it while a run is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkoutConfig {
    pub initial_countdown: u32,
    pub warmup: u32,
    pub exercise: u32,
    pub rest: u32,
    /// Sets per cycle.
    pub sets: u32,
    pub recovery: u32,
    pub cycles: u32,
    pub cooldown: u32,
    /// Emit a cue once each phase crosses its midpoint.
    pub halfway_beep: bool,
}

impl Default for WorkoutConfig {
    fn default() -> Self {
        Self {
            initial_countdown: 20,
            warmup: 0,
            exercise: 180,
            rest: 0,
            sets: 1,
            recovery: 120,
            cycles: 60,
            cooldown: 0,
            halfway_beep: false,
        }
    }
}

impl WorkoutConfig {
    /// Check every field against its allowed range.
    ///
    /// The first offending field is reported; nothing is clamped.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let checks: [(&'static str, u32, u32, u32); 8] = [
            ("initial_countdown", self.initial_countdown, 0, MAX_INTERVAL_SECS),
            ("warmup", self.warmup, 0, MAX_INTERVAL_SECS),
            ("exercise", self.exercise, 1, MAX_INTERVAL_SECS),
            ("rest", self.rest, 0, MAX_INTERVAL_SECS),
            ("sets", self.sets, 1, MAX_SETS),
            ("recovery", self.recovery, 0, MAX_INTERVAL_SECS),
            ("cycles", self.cycles, 1, MAX_CYCLES),
            ("cooldown", self.cooldown, 0, MAX_INTERVAL_SECS),
        ];
        for (field, value, min, max) in checks {
            if value < min || value > max {
                return Err(ValidationError::OutOfRange {
                    field,
                    min,
                    max,
                    value,
                });
            }
        }
        Ok(())
    }

    /// Planned length of the whole workout in milliseconds.
    ///
    /// Rest only sits between sets and recovery only between cycles.
    pub fn total_planned_ms(&self) -> u64 {
        let sets = u64::from(self.sets);
        let cycles = u64::from(self.cycles);
        let secs = u64::from(self.initial_countdown)
            + u64::from(self.warmup)
            + u64::from(self.exercise) * sets * cycles
            + u64::from(self.rest) * sets.saturating_sub(1) * cycles
            + u64::from(self.recovery) * cycles.saturating_sub(1)
            + u64::from(self.cooldown);
        secs.saturating_mul(1000)
    }

    /// Number of exercise intervals in a full run.
    pub fn exercise_count(&self) -> u64 {
        u64::from(self.sets) * u64::from(self.cycles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_config_is_valid() {
        assert!(WorkoutConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_exercise_is_rejected() {
        let cfg = WorkoutConfig {
            exercise: 0,
            ..WorkoutConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ValidationError::OutOfRange {
                field: "exercise",
                min: 1,
                max: MAX_INTERVAL_SECS,
                value: 0,
            })
        );
    }

    #[test]
    fn too_many_sets_is_rejected() {
        let cfg = WorkoutConfig {
            sets: 101,
            ..WorkoutConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ValidationError::OutOfRange { field: "sets", .. })
        ));
    }

    #[test]
    fn total_planned_matches_worked_example() {
        let cfg = WorkoutConfig {
            initial_countdown: 20,
            warmup: 0,
            exercise: 30,
            rest: 10,
            sets: 2,
            recovery: 0,
            cycles: 2,
            cooldown: 0,
            halfway_beep: false,
        };
        assert_eq!(cfg.total_planned_ms(), 160_000);
    }

    #[test]
    fn missing_toml_keys_fall_back_to_defaults() {
        let cfg: WorkoutConfig = toml::from_str("exercise = 45\nsets = 8").unwrap();
        assert_eq!(cfg.exercise, 45);
        assert_eq!(cfg.sets, 8);
        assert_eq!(cfg.initial_countdown, 20);
        assert_eq!(cfg.recovery, 120);
    }

    prop_compose! {
        fn valid_config()(
            initial_countdown in 0u32..=3600,
            warmup in 0u32..=3600,
            exercise in 1u32..=3600,
            rest in 0u32..=3600,
            sets in 1u32..=100,
            recovery in 0u32..=3600,
            cycles in 1u32..=1000,
            cooldown in 0u32..=3600,
        ) -> WorkoutConfig {
            WorkoutConfig {
                initial_countdown,
                warmup,
                exercise,
                rest,
                sets,
                recovery,
                cycles,
                cooldown,
                halfway_beep: false,
            }
        }
    }

    proptest! {
        #[test]
        fn total_planned_is_closed_form(cfg in valid_config()) {
            prop_assert!(cfg.validate().is_ok());
            let s = u64::from(cfg.sets);
            let c = u64::from(cfg.cycles);
            let expected = (u64::from(cfg.initial_countdown)
                + u64::from(cfg.warmup)
                + u64::from(cfg.exercise) * s * c
                + u64::from(cfg.rest) * (s - 1) * c
                + u64::from(cfg.recovery) * (c - 1)
                + u64::from(cfg.cooldown))
                * 1000;
            prop_assert_eq!(cfg.total_planned_ms(), expected);
        }
    }
}
