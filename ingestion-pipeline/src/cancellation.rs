//! A minimal, clonable cancellation flag.
//!
//! Cancellation is edge-triggered and polled (specification section 5): a
//! pipeline observes it at the next suspension point rather than being
//! interrupted mid-flight. This is deliberately simpler than a full
//! `CancellationToken` abstraction since the only thing a document pipeline
//! needs to ask is "should I start another batch?".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled_and_is_sticky_once_cancelled() {
        let flag = CancellationFlag::new();
        assert!(!flag.is_cancelled());
        flag.cancel();
        assert!(flag.is_cancelled());
        let clone = flag.clone();
        assert!(clone.is_cancelled());
    }
}
