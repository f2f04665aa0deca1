use clap::Subcommand;
use serde_json::json;
use tabata_core::Database;

#[derive(Subcommand)]
pub enum StatsAction {
    /// All-time totals
    Show,
    /// Most recent completed workouts
    History {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Delete all workout history
    Reset,
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        StatsAction::Show => {
            let stats = db.workout_stats()?;
            let days = db.days_since_last_workout()?;
            let output = json!({
                "stats": stats,
                "days_since_last_workout": days,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        StatsAction::History { limit } => {
            let history = db.workout_history(limit)?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        StatsAction::Reset => {
            db.reset_statistics()?;
            println!("statistics reset");
        }
    }
    Ok(())
}
