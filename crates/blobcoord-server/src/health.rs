//! Liveness and readiness state shared between the boss thread and every
//! worker. Liveness is unconditional once the process is up; readiness
//! flips once the startup latch (see `server.rs`) has confirmed the
//! listener is bound and accepting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cheaply clonable handle workers use to check readiness without taking
/// a lock on every request.
#[derive(Clone)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn mark_not_ready(&self) {
        self.ready.store(false, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_ready_and_flips_once_marked() {
        let state = HealthState::new();
        assert!(!state.is_ready());
        state.mark_ready();
        assert!(state.is_ready());
        state.mark_not_ready();
        assert!(!state.is_ready());
    }

    #[test]
    fn clones_share_the_same_flag() {
        let state = HealthState::new();
        let cloned = state.clone();
        state.mark_ready();
        assert!(cloned.is_ready());
    }
}
