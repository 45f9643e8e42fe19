//! Cancellation tokens for cooperative state machines
//!
//! Long-running work in the panel (progressive thumbnail generation, batch
//! operations over views) runs as a sequence of short steps. A token lets the
//! owner of a step machine stop it between steps without holding a reference
//! to the machine itself.

use std::cell::Cell;
use std::rc::Rc;

/// Cancellation token shared between a step machine and whoever may stop it
///
/// All clones observe the same state. Everything runs on the host's single
/// scheduling thread, so the token is deliberately `!Send`.
///
/// # Example
///
/// ```
/// use docpanel_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let observer = token.clone();
///
/// token.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token and every clone of it
    ///
    /// Idempotent.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    /// Check if `cancel()` has been called on this token or any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Reset to the non-cancelled state so the token can be reused
    pub fn reset(&self) {
        self.cancelled.set(false);
    }

    /// Number of live clones sharing this token's state
    pub fn holders(&self) -> usize {
        Rc::strong_count(&self.cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert_eq!(token.holders(), 2);

        clone.cancel();
        assert!(token.is_cancelled());

        // Idempotent
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_reset() {
        let token = CancellationToken::new();
        token.cancel();
        token.reset();
        assert!(!token.is_cancelled());
    }
}
