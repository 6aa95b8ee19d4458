//! Cooperative cancellation flag

use crate::RefreshError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
///
/// Clones observe the same flag. Cancellation is sticky: once raised it is
/// never cleared, so a waiter that was interrupted can hand the same token
/// back to its caller and the interruption is not lost.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check whether the flag has been raised
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `Err(RefreshError::Cancelled)` once the flag is raised
    pub fn check(&self) -> Result<(), RefreshError> {
        if self.is_cancelled() {
            Err(RefreshError::Cancelled)
        } else {
            Ok(())
        }
    }
}
