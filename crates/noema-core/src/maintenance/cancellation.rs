//! Cooperative cancellation handle.
//!
//! A cheap `Arc<AtomicBool>` flag checked between records by the decay and
//! consolidation loops, and by the scheduler on shutdown. No task is ever
//! killed mid-record; cancellation only takes effect at the next
//! check-point, leaving the store in a consistent state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}
