//! Persistence ports used by the engine.
//!
//! Both traits take `&self`; implementations own their interior mutability so
//! one backing store (see `storage::Database`) can serve several ports.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::state::Snapshot;
use super::workout::WorkoutConfig;
use crate::error::StorageError;

/// Durable blob store for the single active run.
pub trait SnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError>;
    /// `Ok(None)` when nothing is stored.
    fn load(&self) -> Result<Option<Snapshot>, StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

/// Receives one record per completed workout.
pub trait WorkoutRecorder {
    fn record_workout(&self, total_elapsed_ms: u64, config: &WorkoutConfig) -> Result<(), StorageError>;
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for Rc<T> {
    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        (**self).save(snapshot)
    }

    fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        (**self).load()
    }

    fn clear(&self) -> Result<(), StorageError> {
        (**self).clear()
    }
}

impl<T: WorkoutRecorder + ?Sized> WorkoutRecorder for Rc<T> {
    fn record_workout(&self, total_elapsed_ms: u64, config: &WorkoutConfig) -> Result<(), StorageError> {
        (**self).record_workout(total_elapsed_ms, config)
    }
}

/// In-process snapshot store. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    slot: Rc<RefCell<Option<Snapshot>>>,
    fail_writes: Rc<Cell<bool>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::default();
        store.slot.replace(Some(snapshot));
        store
    }

    pub fn current(&self) -> Option<Snapshot> {
        self.slot.borrow().clone()
    }

    /// Make subsequent `save`/`clear` calls fail.
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.set(failing);
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.get() {
            return Err(StorageError::Unavailable("memory store is failing writes".into()));
        }
        Ok(())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        self.check_writable()?;
        self.slot.replace(Some(snapshot.clone()));
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        Ok(self.slot.borrow().clone())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.check_writable()?;
        self.slot.replace(None);
        Ok(())
    }
}

/// In-process workout log. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkoutLog {
    records: Rc<RefCell<Vec<(u64, WorkoutConfig)>>>,
}

impl MemoryWorkoutLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(u64, WorkoutConfig)> {
        self.records.borrow().clone()
    }
}

impl WorkoutRecorder for MemoryWorkoutLog {
    fn record_workout(&self, total_elapsed_ms: u64, config: &WorkoutConfig) -> Result<(), StorageError> {
        self.records.borrow_mut().push((total_elapsed_ms, *config));
        Ok(())
    }
}
