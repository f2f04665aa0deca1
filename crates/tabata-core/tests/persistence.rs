//! End-to-end runs against the SQLite store, simulating the process going
//! away between engine instances.

use std::rc::Rc;

use tabata_core::storage::SNAPSHOT_KEY;
use tabata_core::timer::{SharedDriver, TickDriver};
use tabata_core::{
    Database, Event, EventLog, ManualClock, Phase, SnapshotStore, SoundCue, TimerEngine,
    WorkoutConfig,
};

const T0: u64 = 1_700_000_000_000;

fn worked_example() -> WorkoutConfig {
    WorkoutConfig {
        initial_countdown: 20,
        warmup: 0,
        exercise: 30,
        rest: 10,
        sets: 2,
        recovery: 0,
        cycles: 2,
        cooldown: 0,
        halfway_beep: false,
    }
}

fn engine(db: &Rc<Database>, clock: &ManualClock) -> TimerEngine {
    TimerEngine::builder(worked_example())
        .clock(clock.clone())
        .store(db.clone())
        .recorder(db.clone())
        .build()
        .unwrap()
}

fn run_for(engine: &mut TimerEngine, clock: &ManualClock, ms: u64) {
    for _ in 0..ms / 100 {
        clock.advance(100);
        engine.tick();
    }
}

#[test]
fn run_resumes_after_restart_at_the_right_point() {
    let db = Rc::new(Database::open_memory().unwrap());
    let clock = ManualClock::new(T0);

    let mut first = engine(&db, &clock);
    first.start();
    run_for(&mut first, &clock, 25_000);
    assert_eq!(first.phase(), Phase::Exercise);
    drop(first);

    clock.advance(20_000);
    let second = engine(&db, &clock);
    let state = second.state();
    assert_eq!(state.phase, Phase::Exercise);
    assert_eq!(state.remaining_ms, 5_000);
    assert_eq!((state.current_set, state.current_cycle), (1, 1));
    assert_eq!(state.total_elapsed_ms, 45_000);
    assert!(state.running);
    assert!(second.driver_active());
}

#[test]
fn completion_during_downtime_is_recorded_once() {
    let db = Rc::new(Database::open_memory().unwrap());
    let clock = ManualClock::new(T0);

    let mut first = engine(&db, &clock);
    first.start();
    run_for(&mut first, &clock, 1_000);
    drop(first);

    clock.advance(500_000);
    let log = EventLog::new();
    let second = TimerEngine::builder(worked_example())
        .clock(clock.clone())
        .store(db.clone())
        .recorder(db.clone())
        .subscribe(log.clone())
        .build()
        .unwrap();

    assert_eq!(second.phase(), Phase::Complete);
    assert!(!second.is_running());
    assert_eq!(second.state().total_elapsed_ms, 160_000);
    assert_eq!(log.sounds(), vec![SoundCue::WorkoutComplete]);
    let completions = log
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Complete { .. }))
        .count();
    assert_eq!(completions, 1);

    let stats = db.workout_stats().unwrap();
    assert_eq!(stats.total_workouts, 1);
    assert_eq!(stats.total_time_ms, 160_000);
    assert!(SnapshotStore::load(&*db).unwrap().is_none());

    // A further restart has nothing left to resume.
    drop(second);
    let third = engine(&db, &clock);
    assert_eq!(third.phase(), Phase::Initial);
    assert_eq!(db.workout_stats().unwrap().total_workouts, 1);
}

#[test]
fn paused_run_survives_reopening_the_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tabata.db");
    let clock = ManualClock::new(T0);

    {
        let db = Rc::new(Database::open_at(&path).unwrap());
        let mut first = engine(&db, &clock);
        first.start();
        run_for(&mut first, &clock, 5_000);
        first.pause();
    }

    clock.advance(60 * 60 * 1000);
    let db = Rc::new(Database::open_at(&path).unwrap());
    let second = engine(&db, &clock);
    let state = second.state();
    assert_eq!(state.phase, Phase::Initial);
    assert_eq!(state.remaining_ms, 15_000);
    assert!(state.paused);
    assert!(!state.running);
    assert!(!second.driver_active());
}

#[test]
fn stopped_run_is_not_resumed() {
    let db = Rc::new(Database::open_memory().unwrap());
    let clock = ManualClock::new(T0);

    let mut first = engine(&db, &clock);
    first.start();
    run_for(&mut first, &clock, 3_000);
    first.stop();
    assert_eq!(first.phase(), Phase::Initial);
    drop(first);

    let second = engine(&db, &clock);
    assert!(second.state().is_idle());
    assert_eq!(second.display_remaining_ms(), 20_000);
}

#[test]
fn day_old_snapshot_is_discarded() {
    let db = Rc::new(Database::open_memory().unwrap());
    let clock = ManualClock::new(T0);

    let mut first = engine(&db, &clock);
    first.start();
    first.pause();
    drop(first);

    clock.advance(25 * 60 * 60 * 1000);
    let second = engine(&db, &clock);
    assert!(second.state().is_idle());
    assert!(db.kv_get(SNAPSHOT_KEY).unwrap().is_none());
}

#[test]
fn corrupt_snapshot_starts_fresh() {
    let db = Rc::new(Database::open_memory().unwrap());
    db.kv_set(SNAPSHOT_KEY, "{\"phase\": 7").unwrap();
    let clock = ManualClock::new(T0);

    let mut engine = engine(&db, &clock);
    assert!(engine.state().is_idle());
    assert!(db.kv_get(SNAPSHOT_KEY).unwrap().is_none());

    engine.start();
    assert_eq!(engine.phase(), Phase::Initial);
    assert!(db.kv_get(SNAPSHOT_KEY).unwrap().is_some());
}

#[test]
fn shared_driver_follows_the_engine() {
    let db = Rc::new(Database::open_memory().unwrap());
    let clock = ManualClock::new(T0);
    let driver = SharedDriver::new();

    let mut engine = TimerEngine::builder(worked_example())
        .clock(clock.clone())
        .store(db.clone())
        .driver(driver.clone())
        .build()
        .unwrap();
    engine.start();
    assert!(driver.is_active());
    engine.pause();
    assert!(!driver.is_active());
    engine.resume();
    assert!(driver.is_active());
    engine.reset();
    assert!(!driver.is_active());
}

#[test]
fn preset_drives_a_new_engine() {
    let db = Rc::new(Database::open_memory().unwrap());
    db.save_preset("worked", &worked_example()).unwrap();

    let preset = db.load_preset("worked").unwrap();
    let engine = TimerEngine::builder(preset.config)
        .clock(ManualClock::new(T0))
        .store(db.clone())
        .build()
        .unwrap();
    assert_eq!(engine.total_planned_ms(), 160_000);
}
