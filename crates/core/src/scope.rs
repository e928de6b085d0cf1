//! Scope tokens: "is this async result still relevant?" as a single
//! primitive.
//!
//! Every context switch (active brand or session change) mints a new
//! [`ScopeToken`] from the shared [`ScopeCounter`]. Async work captures
//! the token at start; callbacks apply their result only if the token is
//! still current, otherwise the result is silently discarded. Discarding
//! is expected concurrency behavior, not a fault.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Opaque, strictly increasing context identifier.
///
/// Tokens never decrease or repeat within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeToken(u64);

impl std::fmt::Display for ScopeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mints and validates scope tokens.
///
/// One counter per engine instance, shared via `Arc`. A scope switch
/// calls [`advance`](ScopeCounter::advance) exactly once, before any new
/// fetch is issued.
#[derive(Debug)]
pub struct ScopeCounter {
    current: AtomicU64,
}

impl ScopeCounter {
    pub fn new() -> Self {
        Self {
            current: AtomicU64::new(0),
        }
    }

    /// The token of the active context.
    pub fn current(&self) -> ScopeToken {
        ScopeToken(self.current.load(Ordering::SeqCst))
    }

    /// Mint and return the next token, invalidating all work captured
    /// under earlier tokens.
    pub fn advance(&self) -> ScopeToken {
        ScopeToken(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether `token` still identifies the active context.
    pub fn is_current(&self, token: ScopeToken) -> bool {
        self.current() == token
    }
}

impl Default for ScopeCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_strictly_increasing() {
        let counter = ScopeCounter::new();
        let mut previous = counter.current();
        for _ in 0..100 {
            let next = counter.advance();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn captured_token_goes_stale_after_advance() {
        let counter = ScopeCounter::new();
        let captured = counter.current();
        assert!(counter.is_current(captured));

        counter.advance();
        assert!(!counter.is_current(captured));
        assert!(counter.is_current(counter.current()));
    }

    #[test]
    fn advance_returns_the_new_current_token() {
        let counter = ScopeCounter::new();
        let minted = counter.advance();
        assert_eq!(minted, counter.current());
    }
}
