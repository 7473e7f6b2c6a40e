//! Pending-work counter
//!
//! A counting wait-group for an open-ended set of concurrent units. Every
//! unit is registered before it is handed to the pool and reports completion
//! when its [`WorkUnit`] guard drops, so a parent that registers its children
//! while still holding its own guard can never let the count touch zero
//! early. The final drop wakes the waiter directly; there is no polling.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Outstanding-unit counter with a blocking wait for zero
#[derive(Debug, Default)]
pub struct PendingWork {
    outstanding: Mutex<usize>,
    drained: Condvar,
}

impl PendingWork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register one unit of work; completion is reported when the guard drops
    pub fn register(self: &Arc<Self>) -> WorkUnit {
        *self.lock() += 1;
        WorkUnit {
            pending: Arc::clone(self),
        }
    }

    /// Units registered but not yet completed
    pub fn outstanding(&self) -> usize {
        *self.lock()
    }

    /// Block until every registered unit has completed
    pub fn wait(&self) {
        let mut outstanding = self.lock();
        while *outstanding > 0 {
            outstanding = self
                .drained
                .wait(outstanding)
                .unwrap_or_else(|poisoned| {
                    tracing::warn!("pending-work lock poisoned while waiting, re-entering wait");
                    poisoned.into_inner()
                });
        }
    }

    /// Block until drained or `timeout` elapses; returns true when drained
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut outstanding = self.lock();
        while *outstanding > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            outstanding = match self.drained.wait_timeout(outstanding, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => {
                    tracing::warn!("pending-work lock poisoned while waiting, re-entering wait");
                    poisoned.into_inner().0
                }
            };
        }
        true
    }

    fn complete(&self) {
        let mut outstanding = self.lock();
        *outstanding = outstanding.saturating_sub(1);
        if *outstanding == 0 {
            self.drained.notify_all();
        }
    }

    // A panicking unit still holds a valid count, so a poisoned lock is
    // recovered rather than propagated.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Guard for one registered unit of work
#[derive(Debug)]
#[must_use = "dropping the unit immediately reports it complete"]
pub struct WorkUnit {
    pending: Arc<PendingWork>,
}

impl WorkUnit {
    /// Register a sibling unit on the same counter
    pub fn register_child(&self) -> WorkUnit {
        self.pending.register()
    }
}

impl Drop for WorkUnit {
    fn drop(&mut self) {
        self.pending.complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_wait_returns_immediately_when_empty() {
        let pending = PendingWork::new();
        pending.wait();
        assert!(pending.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_drop_reports_completion() {
        let pending = PendingWork::new();
        let a = pending.register();
        let b = a.register_child();
        assert_eq!(pending.outstanding(), 2);
        drop(a);
        assert_eq!(pending.outstanding(), 1);
        drop(b);
        assert_eq!(pending.outstanding(), 0);
    }

    #[test]
    fn test_wait_timeout_reports_undrained() {
        let pending = PendingWork::new();
        let _unit = pending.register();
        assert!(!pending.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_completion_survives_panicking_unit() {
        let pending = PendingWork::new();
        let unit = pending.register();
        let handle = thread::spawn(move || {
            let _unit = unit;
            panic!("unit failed");
        });
        assert!(handle.join().is_err());
        pending.wait();
        assert_eq!(pending.outstanding(), 0);
    }

    #[test]
    fn test_wait_recovers_from_poisoned_lock() {
        let pending = PendingWork::new();
        let unit = pending.register();

        let poisoner = Arc::clone(&pending);
        let result = thread::spawn(move || {
            let _guard = poisoner.outstanding.lock().unwrap();
            panic!("panicked while holding the counter");
        })
        .join();
        assert!(result.is_err());
        assert!(pending.outstanding.is_poisoned());
        assert_eq!(pending.outstanding(), 1);

        let finisher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(unit);
        });
        pending.wait();
        finisher.join().unwrap();

        assert_eq!(pending.outstanding(), 0);
        assert!(pending.wait_timeout(Duration::from_millis(1)));
    }

    /// Each unit spawns children before completing; the waiter must observe
    /// every unit of the whole tree.
    #[test]
    fn test_dynamic_fan_out_is_fully_awaited() {
        fn spawn_tree(unit: WorkUnit, depth: u32, done: Arc<AtomicUsize>) {
            thread::spawn(move || {
                if depth > 0 {
                    for _ in 0..3 {
                        let child = unit.register_child();
                        spawn_tree(child, depth - 1, Arc::clone(&done));
                    }
                }
                thread::sleep(Duration::from_millis(1));
                done.fetch_add(1, Ordering::SeqCst);
                drop(unit);
            });
        }

        let pending = PendingWork::new();
        let done = Arc::new(AtomicUsize::new(0));
        spawn_tree(pending.register(), 4, Arc::clone(&done));
        pending.wait();

        // 1 + 3 + 9 + 27 + 81
        assert_eq!(done.load(Ordering::SeqCst), 121);
        assert_eq!(pending.outstanding(), 0);
    }
}
