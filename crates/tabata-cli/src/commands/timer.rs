use std::rc::Rc;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use clap::Subcommand;
use tabata_core::timer::{SharedDriver, TickDriver};
use tabata_core::{Config, Database, Event, TimerEngine};
use tokio::time::MissedTickBehavior;

/// Shortest driver period accepted from configuration.
const MIN_TICK_INTERVAL_MS: u64 = 10;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a run, or resume a paused one
    Start,
    /// Pause the running timer
    Pause,
    /// Resume a paused timer
    Resume,
    /// Halt the run, keeping the current phase
    Stop,
    /// Discard the run and go back to the initial countdown
    Reset,
    /// Skip to the next phase
    Next,
    /// Go back to the previous phase
    Prev,
    /// Print current timer state as JSON
    Status,
    /// Drive the timer in the foreground, printing events as JSON lines.
    /// Ctrl-C pauses the run and exits.
    Run {
        /// Do not print per-tick events
        #[arg(long)]
        no_ticks: bool,
    },
}

fn build_engine(
    db: &Rc<Database>,
    config: &Config,
    driver: SharedDriver,
) -> Result<(TimerEngine, Receiver<Event>), Box<dyn std::error::Error>> {
    let (tx, rx) = mpsc::channel();
    let engine = TimerEngine::builder(config.workout)
        .options(config.engine_options())
        .store(db.clone())
        .recorder(db.clone())
        .driver(driver)
        .subscribe(tx)
        .build()?;
    Ok((engine, rx))
}

fn print_events(rx: &Receiver<Event>, show_ticks: bool) -> Result<(), serde_json::Error> {
    for event in rx.try_iter() {
        if !show_ticks && matches!(event, Event::Tick { .. }) {
            continue;
        }
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Rc::new(Database::open()?);
    let driver = SharedDriver::new();
    let (mut engine, rx) = build_engine(&db, &config, driver.clone())?;

    match action {
        TimerAction::Start => engine.start(),
        TimerAction::Pause => engine.pause(),
        TimerAction::Resume => engine.resume(),
        TimerAction::Stop => engine.stop(),
        TimerAction::Reset => engine.reset(),
        TimerAction::Next => engine.skip_to_next_phase(),
        TimerAction::Prev => engine.skip_to_previous_phase(),
        TimerAction::Status => engine.tick(),
        TimerAction::Run { no_ticks } => {
            return drive(&mut engine, &driver, &rx, &config, !no_ticks);
        }
    }

    // One-shot commands report the resulting state only.
    println!("{}", serde_json::to_string_pretty(&engine.status())?);
    Ok(())
}

fn drive(
    engine: &mut TimerEngine,
    driver: &SharedDriver,
    rx: &Receiver<Event>,
    config: &Config,
    show_ticks: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    engine.start();
    print_events(rx, show_ticks)?;

    let period = Duration::from_millis(config.timer.tick_interval_ms.max(MIN_TICK_INTERVAL_MS));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        while driver.is_active() {
            tokio::select! {
                _ = interval.tick() => {
                    engine.tick();
                    print_events(rx, show_ticks)?;
                }
                _ = &mut ctrl_c => {
                    tracing::info!("interrupted; pausing timer");
                    engine.pause();
                    print_events(rx, show_ticks)?;
                    break;
                }
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    println!("{}", serde_json::to_string(&engine.status())?);
    Ok(())
}
