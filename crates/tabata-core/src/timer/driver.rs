//! Periodic tick driver handle.
//!
//! The engine does not own a scheduling primitive. It only toggles the
//! driver's lifecycle: `start()`/`resume()` activate it, every command that
//! stops the run deactivates it before returning. Whatever actually fires
//! ticks (a tokio interval, a UI frame loop, a test) checks
//! [`TickDriver::is_active`] before calling `TimerEngine::tick`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub trait TickDriver {
    /// Begin delivering ticks. Calling it while active is a no-op.
    fn start(&mut self);
    /// Stop delivering ticks. Calling it while stopped is a no-op.
    fn stop(&mut self);
    fn is_active(&self) -> bool;
}

/// Flag-based driver. Clones observe the same state, so the loop that
/// delivers ticks keeps one clone and hands the other to the engine.
#[derive(Debug, Clone, Default)]
pub struct SharedDriver {
    active: Arc<AtomicBool>,
}

impl SharedDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TickDriver for SharedDriver {
    fn start(&mut self) {
        self.active.store(true, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
