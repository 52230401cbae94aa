//! Cooperative cancellation for in-flight generations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A token the decode loop checks at the top of each step.
///
/// Cancellation is cooperative: the loop finishes at most its current step,
/// never starts the next model call, and closes the stream. Nothing already
/// emitted is rolled back.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a new token/handle pair. The token goes to the decode loop;
    /// the handle stays with whoever may want to interrupt it.
    pub fn new() -> (Self, CancellationHandle) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let token = CancellationToken {
            cancelled: cancelled.clone(),
        };
        let handle = CancellationHandle { cancelled };
        (token, handle)
    }

    /// Creates a token that is never cancelled.
    pub fn never() -> Self {
        CancellationToken {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Checks if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for CancellationToken {
    /// Default token is never cancelled.
    fn default() -> Self {
        Self::never()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A handle that can trigger cancellation.
#[derive(Clone)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    /// Signals cancellation to all associated tokens.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Checks if cancellation has already been triggered.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CancellationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_not_cancelled() {
        let (token, _handle) = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_sets_flag() {
        let (token, handle) = CancellationToken::new();
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_multiple_cancels_idempotent() {
        let (token, handle) = CancellationToken::new();
        handle.cancel();
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cloned_tokens_share_state() {
        let (token1, handle) = CancellationToken::new();
        let token2 = token1.clone();
        handle.cancel();
        assert!(token1.is_cancelled());
        assert!(token2.is_cancelled());
    }

    #[test]
    fn test_never_token() {
        assert!(!CancellationToken::never().is_cancelled());
    }
}
