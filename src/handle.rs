//! Cancellation handles for background watches and feeds.

use std::fmt;

/// Owned cancellation token for a subscription or acquisition loop.
///
/// The wrapped action runs at most once: explicit `cancel` calls after the
/// first are no-ops, and dropping an uncancelled handle cancels it. Whoever
/// holds the handle owns the shutdown of the resource behind it.
pub struct CancelHandle {
    action: Option<Box<dyn FnOnce() + Send>>,
}

impl CancelHandle {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    /// Invoke the cancellation action if it has not run yet.
    pub fn cancel(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.action.is_none()
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
