use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Render lifecycle. `Canceled` is reachable from any state; workers
/// poll the flag at tile boundaries and drain cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Idle,
    Preprocessing,
    Rendering,
    Flushing,
    Done,
    Canceled,
}

/// Shared cancel/progress state between the driver, its workers and the
/// host application.
pub struct RenderControl {
    phase: Mutex<RenderPhase>,
    canceled: AtomicBool,
}

impl Default for RenderControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderControl {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(RenderPhase::Idle),
            canceled: AtomicBool::new(false),
        }
    }

    pub fn phase(&self) -> RenderPhase {
        *self.phase.lock()
    }

    pub fn set_phase(&self, phase: RenderPhase) {
        *self.phase.lock() = phase;
    }

    /// Requests cancellation; the driver flushes a valid partial film.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.canceled.store(false, Ordering::SeqCst);
        *self.phase.lock() = RenderPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_from_any_phase() {
        let control = RenderControl::new();
        assert_eq!(control.phase(), RenderPhase::Idle);
        control.set_phase(RenderPhase::Rendering);
        control.cancel();
        assert!(control.is_canceled());
        control.reset();
        assert!(!control.is_canceled());
        assert_eq!(control.phase(), RenderPhase::Idle);
    }
}
