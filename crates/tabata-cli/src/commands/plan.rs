use serde::Serialize;
use tabata_core::timer::{format_duration, plan, PlannedStep};
use tabata_core::Config;

#[derive(Serialize)]
struct PlanOutput {
    steps: Vec<PlannedStep>,
    exercises: u64,
    total_ms: u64,
    total: String,
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let workout = config.workout;
    let total_ms = workout.total_planned_ms();
    let output = PlanOutput {
        steps: plan(&workout),
        exercises: workout.exercise_count(),
        total_ms,
        total: format_duration(total_ms),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
