use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Held longer than this, a release is logged as slow
const SLOW_HOLD_THRESHOLD: Duration = Duration::from_secs(5);

/// Boolean execution lock owned by the trade executor
///
/// Cloning shares the same flag, so the snapshot cycle can observe whether an
/// order is mid-flight. It guards ledger consistency for readers only and
/// protects no other resource.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLock {
    held: Arc<AtomicBool>,
}

impl ExecutionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the lock; `None` if it is already held
    pub fn try_acquire(&self, operation: &'static str) -> Option<ExecutionGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| {
                trace!(operation, "Execution lock acquired");
                ExecutionGuard {
                    held: self.held.clone(),
                    operation,
                    acquired_at: Instant::now(),
                }
            })
    }

    /// Check if an order is currently executing
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the execution lock on drop, on every exit path
#[derive(Debug)]
pub struct ExecutionGuard {
    held: Arc<AtomicBool>,
    operation: &'static str,
    acquired_at: Instant,
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        let held_for = self.acquired_at.elapsed();
        self.held.store(false, Ordering::Release);
        if held_for > SLOW_HOLD_THRESHOLD {
            warn!(operation = self.operation, ?held_for, "Execution lock held unusually long");
        } else {
            trace!(operation = self.operation, ?held_for, "Execution lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let lock = ExecutionLock::new();
        assert!(!lock.is_held());
        {
            let _guard = lock.try_acquire("buy").unwrap();
            assert!(lock.is_held());
            assert!(lock.try_acquire("sell").is_none());
        }
        assert!(!lock.is_held());
    }

    #[test]
    fn test_clones_share_state() {
        let lock = ExecutionLock::new();
        let observer = lock.clone();
        let guard = lock.try_acquire("buy").unwrap();
        assert!(observer.is_held());
        drop(guard);
        assert!(!observer.is_held());
    }

    #[test]
    fn test_released_on_panic() {
        let lock = ExecutionLock::new();
        let inner = lock.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = inner.try_acquire("buy").unwrap();
            panic!("order blew up");
        });
        assert!(result.is_err());
        assert!(!lock.is_held());
    }
}
