//! Scheduler notification contract.
//!
//! The core never dispatches work. Whenever new work *might* be runnable —
//! after an emplacement, after a task becomes ready, after a task is freed —
//! the space calls [`Scheduler::notify`]; the scheduler then pulls ready
//! tasks via [`TaskSpace::pop_ready`](crate::space::TaskSpace::pop_ready)
//! and dispatches them however it likes. Execution policy (work stealing,
//! FIFO, priorities) lives entirely behind this trait.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Receiver of "work may be ready" notifications.
///
/// Passed into [`TaskSpace::new`](crate::space::TaskSpace::new) as an
/// explicit collaborator; there is no process-wide scheduler singleton.
pub trait Scheduler: Send + Sync {
    /// Called whenever new work might exist. Must not block and must not
    /// call back into the notifying space synchronously.
    fn notify(&self);
}

/// A scheduler that ignores notifications.
///
/// Useful for tests and for callers that drive the space from their own
/// loop.
#[derive(Debug, Default)]
pub struct NoopScheduler;

impl Scheduler for NoopScheduler {
    fn notify(&self) {}
}

/// A scheduler that counts notifications.
///
/// Lets embedding code poll "did anything happen since I last looked"
/// without a condition variable; also handy in tests.
#[derive(Debug, Default)]
pub struct CountingScheduler {
    count: AtomicUsize,
}

impl CountingScheduler {
    /// Create a scheduler with a zeroed counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of notifications received so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

impl Scheduler for CountingScheduler {
    fn notify(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_scheduler_counts() {
        let scheduler = CountingScheduler::new();
        assert_eq!(scheduler.count(), 0);
        scheduler.notify();
        scheduler.notify();
        assert_eq!(scheduler.count(), 2);
    }
}
