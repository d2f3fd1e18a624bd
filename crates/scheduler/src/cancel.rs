//! Cancellation tokens for queued idle tasks
//!
//! A token is a shared flag checked by the queue when a task is popped.
//! Holders cancel the token to make every task guarded by it evaporate
//! without running.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token shared between a task owner and the idle queue
///
/// Cloning the token shares the same underlying flag, so a single owner-side
/// `cancel()` is observed by every guarded task still sitting in the queue.
///
/// # Example
///
/// ```
/// use sliceview_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let guard = token.clone();
///
/// assert!(!guard.is_cancelled());
/// token.cancel();
/// assert!(guard.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel this token
    ///
    /// All clones observe the cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether `cancel()` has been called on this token or any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Return this token to the non-cancelled state
    ///
    /// All clones are reset with it. Owners that must not revive work already
    /// guarded by the old flag should replace the token instead.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_live() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_observed_by_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();

        token.cancel();
        assert!(token.is_cancelled());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_cancel_idempotent() {
        let token = CancellationToken::new();

        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_reset() {
        let token = CancellationToken::new();

        token.cancel();
        assert!(token.is_cancelled());

        token.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_default() {
        let token = CancellationToken::default();
        assert!(!token.is_cancelled());
    }
}
