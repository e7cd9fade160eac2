//! Maintenance Engine.
//!
//! Two independent operations — decay+prune and consolidation — guarded by
//! a single shared mutex so only one maintenance operation runs at a time.
//! The write path does not take this mutex; both loops reload each record
//! fresh before mutating it to tolerate concurrent writes.

mod cancellation;
mod consolidation;
mod decay;

pub use cancellation::Cancellation;
pub use consolidation::{run_consolidation, ConsolidationResult};
pub use decay::{run_decay_prune, DecayResult};

use std::sync::{Mutex, TryLockError};

use crate::error::MaintenanceError;

/// Which maintenance operation currently holds the mutex, surfaced in
/// `MaintenanceBusy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    DecayPrune,
    Consolidation,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::DecayPrune => "decay_prune",
            Operation::Consolidation => "consolidation",
        }
    }
}

/// Serializes maintenance operations. A plain `std::sync::Mutex<()>`
/// accessed via `try_lock` so a busy engine fails immediately instead of
/// queuing.
#[derive(Default)]
pub struct MaintenanceLock {
    inner: Mutex<()>,
}

impl MaintenanceLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to acquire the lock for `op`. Returns `MaintenanceBusy` if
    /// another maintenance operation currently holds it.
    pub fn try_acquire(&self, op: Operation) -> Result<MaintenanceGuard<'_>, MaintenanceError> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(MaintenanceGuard { _guard: guard }),
            Err(TryLockError::WouldBlock) => Err(MaintenanceError::Busy(op.as_str())),
            Err(TryLockError::Poisoned(_)) => Err(MaintenanceError::Busy(op.as_str())),
        }
    }
}

pub struct MaintenanceGuard<'a> {
    _guard: std::sync::MutexGuard<'a, ()>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_held() {
        let lock = MaintenanceLock::new();
        let _guard = lock.try_acquire(Operation::DecayPrune).unwrap();
        let err = lock.try_acquire(Operation::Consolidation).unwrap_err();
        assert!(matches!(err, MaintenanceError::Busy(_)));
    }

    #[test]
    fn acquire_succeeds_after_guard_dropped() {
        let lock = MaintenanceLock::new();
        {
            let _guard = lock.try_acquire(Operation::DecayPrune).unwrap();
        }
        assert!(lock.try_acquire(Operation::Consolidation).is_ok());
    }
}
