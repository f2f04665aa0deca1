//! Phase graph resolution.
//!
//! The successor of `Exercise` and `Rest` depends on where the run currently
//! is within its sets and cycles, so the graph is resolved from the live
//! counters every time it is needed rather than cached.

use serde::{Deserialize, Serialize};

use super::workout::WorkoutConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Initial,
    Warmup,
    Exercise,
    Rest,
    Recovery,
    Cooldown,
    Complete,
}

/// Display category of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTag {
    Prepare,
    Exercise,
    Rest,
    Complete,
}

impl Phase {
    /// Every phase that has a duration, in graph order.
    pub const TIMED: [Phase; 6] = [
        Phase::Initial,
        Phase::Warmup,
        Phase::Exercise,
        Phase::Rest,
        Phase::Recovery,
        Phase::Cooldown,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Phase::Initial => "Get Ready",
            Phase::Warmup => "Warm Up",
            Phase::Exercise => "Exercise",
            Phase::Rest => "Rest",
            Phase::Recovery => "Recovery",
            Phase::Cooldown => "Cool Down",
            Phase::Complete => "Complete",
        }
    }

    pub fn color(self) -> ColorTag {
        match self {
            Phase::Initial | Phase::Warmup | Phase::Cooldown => ColorTag::Prepare,
            Phase::Exercise => ColorTag::Exercise,
            Phase::Rest | Phase::Recovery => ColorTag::Rest,
            Phase::Complete => ColorTag::Complete,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Complete
    }

    /// Configured duration in seconds. `Complete` has none.
    pub fn duration_secs(self, config: &WorkoutConfig) -> u32 {
        match self {
            Phase::Initial => config.initial_countdown,
            Phase::Warmup => config.warmup,
            Phase::Exercise => config.exercise,
            Phase::Rest => config.rest,
            Phase::Recovery => config.recovery,
            Phase::Cooldown => config.cooldown,
            Phase::Complete => 0,
        }
    }

    pub fn duration_ms(self, config: &WorkoutConfig) -> u64 {
        u64::from(self.duration_secs(config)) * 1000
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Initial => "initial",
            Phase::Warmup => "warmup",
            Phase::Exercise => "exercise",
            Phase::Rest => "rest",
            Phase::Recovery => "recovery",
            Phase::Cooldown => "cooldown",
            Phase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// 1-based position within the workout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub set: u32,
    pub cycle: u32,
}

impl Counters {
    pub const FIRST: Counters = Counters { set: 1, cycle: 1 };

    pub fn is_last_set(&self, config: &WorkoutConfig) -> bool {
        self.set >= config.sets
    }

    pub fn is_last_cycle(&self, config: &WorkoutConfig) -> bool {
        self.cycle >= config.cycles
    }

    /// Counters after a forward transition from `from` into `to`.
    ///
    /// Only transitions that land on `Exercise` move the counters.
    pub fn advanced(self, from: Phase, to: Phase, config: &WorkoutConfig) -> Counters {
        match (from, to) {
            (Phase::Rest, Phase::Exercise) => Counters {
                set: self.set + 1,
                ..self
            },
            (Phase::Recovery, Phase::Exercise) => Counters {
                set: 1,
                cycle: self.cycle + 1,
            },
            (Phase::Exercise, Phase::Exercise) if self.set < config.sets => Counters {
                set: self.set + 1,
                ..self
            },
            (Phase::Exercise, Phase::Exercise) => Counters {
                set: 1,
                cycle: self.cycle + 1,
            },
            _ => self,
        }
    }

    /// Counters after stepping backwards out of `from`.
    pub fn rewound(self, from: Phase, config: &WorkoutConfig) -> Counters {
        if from != Phase::Exercise {
            return self;
        }
        if self.set > 1 {
            Counters {
                set: self.set - 1,
                ..self
            }
        } else if self.cycle > 1 {
            Counters {
                set: config.sets,
                cycle: self.cycle - 1,
            }
        } else {
            self
        }
    }
}

impl Default for Counters {
    fn default() -> Self {
        Self::FIRST
    }
}

/// Successor of `phase` given the configuration and live counters.
///
/// Returns `None` only for the terminal `Complete` phase.
pub fn successor(phase: Phase, config: &WorkoutConfig, counters: Counters) -> Option<Phase> {
    let next = match phase {
        Phase::Initial if config.warmup > 0 => Phase::Warmup,
        Phase::Initial | Phase::Warmup => Phase::Exercise,
        Phase::Exercise if config.rest > 0 && !counters.is_last_set(config) => Phase::Rest,
        Phase::Exercise => after_exercise(config, counters),
        Phase::Rest if !counters.is_last_set(config) => Phase::Exercise,
        Phase::Rest => after_exercise(config, counters),
        Phase::Recovery if !counters.is_last_cycle(config) => Phase::Exercise,
        Phase::Recovery => finish(config),
        Phase::Cooldown => Phase::Complete,
        Phase::Complete => return None,
    };
    Some(next)
}

/// Where the run goes once an exercise interval (and its rest, if any) is done.
fn after_exercise(config: &WorkoutConfig, counters: Counters) -> Phase {
    let last_set = counters.is_last_set(config);
    let last_cycle = counters.is_last_cycle(config);
    if last_set && config.recovery > 0 && !last_cycle {
        Phase::Recovery
    } else if !(last_set && last_cycle) {
        Phase::Exercise
    } else {
        finish(config)
    }
}

fn finish(config: &WorkoutConfig) -> Phase {
    if config.cooldown > 0 {
        Phase::Cooldown
    } else {
        Phase::Complete
    }
}

/// Fixed reverse map used when stepping backwards.
///
/// Unlike [`successor`] this ignores the counters and only looks at which
/// durations are configured.
pub fn predecessor(phase: Phase, config: &WorkoutConfig) -> Phase {
    match phase {
        Phase::Exercise if config.warmup > 0 => Phase::Warmup,
        Phase::Rest => Phase::Exercise,
        Phase::Recovery if config.rest > 0 => Phase::Rest,
        Phase::Recovery => Phase::Exercise,
        Phase::Cooldown if config.recovery > 0 => Phase::Recovery,
        Phase::Cooldown if config.rest > 0 => Phase::Rest,
        Phase::Cooldown => Phase::Exercise,
        Phase::Initial | Phase::Warmup | Phase::Exercise | Phase::Complete => Phase::Initial,
    }
}

/// One resolved node of the phase graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseNode {
    pub phase: Phase,
    pub duration_secs: u32,
    pub label: &'static str,
    pub color: ColorTag,
    pub next: Option<Phase>,
}

/// The phase graph as seen from a particular point in the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseGraph {
    pub counters: Counters,
    pub nodes: Vec<PhaseNode>,
}

impl PhaseGraph {
    pub fn resolve(config: &WorkoutConfig, counters: Counters) -> Self {
        let nodes = Phase::TIMED
            .iter()
            .map(|&phase| PhaseNode {
                phase,
                duration_secs: phase.duration_secs(config),
                label: phase.label(),
                color: phase.color(),
                next: successor(phase, config, counters),
            })
            .collect();
        Self { counters, nodes }
    }

    pub fn node(&self, phase: Phase) -> Option<&PhaseNode> {
        self.nodes.iter().find(|n| n.phase == phase)
    }
}

/// A phase the run stops in, with the counters it is entered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub phase: Phase,
    pub duration_secs: u32,
    pub set: u32,
    pub cycle: u32,
}

/// Walk the graph from `Initial` to `Complete`, listing every timed phase
/// entered along the way.
///
/// The walk is bounded by `2 * sets * cycles + 8` steps; a graph that fails to
/// terminate within it is truncated.
pub fn plan(config: &WorkoutConfig) -> Vec<PlannedStep> {
    let bound = step_bound(config);
    let mut steps = Vec::new();
    let mut phase = Phase::Initial;
    let mut counters = Counters::FIRST;
    while !phase.is_terminal() && steps.len() < bound {
        steps.push(PlannedStep {
            phase,
            duration_secs: phase.duration_secs(config),
            set: counters.set,
            cycle: counters.cycle,
        });
        let Some(next) = successor(phase, config, counters) else {
            break;
        };
        counters = counters.advanced(phase, next, config);
        phase = next;
    }
    steps
}

/// Upper bound on forward transitions in a single run.
pub fn step_bound(config: &WorkoutConfig) -> usize {
    let exercises = usize::try_from(config.exercise_count()).unwrap_or(usize::MAX);
    exercises.saturating_mul(2).saturating_add(8)
}
