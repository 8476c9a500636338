//! Emplacement queue.
//!
//! Freshly created tasks are parked here between submission and graph
//! wiring. Any producer thread may push; the draining consumer pops under
//! the space's drain lock. Tasks leave in exactly the order they entered —
//! that FIFO guarantee is what makes the precedence tests against
//! concurrently live tasks deterministic per resource.
//!
//! The queue holds [`TaskKey`]s, not task objects; ownership stays with the
//! arena throughout.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::trace;

use super::arena::TaskKey;

/// FIFO intake queue for freshly emplaced tasks.
#[derive(Default)]
pub struct EmplacementQueue {
    inner: Mutex<VecDeque<TaskKey>>,
}

impl EmplacementQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task at the tail. Never blocks beyond the queue lock.
    pub fn push(&self, key: TaskKey) {
        let mut inner = self.inner.lock();
        inner.push_back(key);
        trace!(?key, len = inner.len(), "emplacement queue push");
    }

    /// Take the task at the head, or `None` when the queue is empty.
    pub fn pop(&self) -> Option<TaskKey> {
        let mut inner = self.inner.lock();
        let key = inner.pop_front();
        if let Some(key) = key {
            trace!(?key, len = inner.len(), "emplacement queue pop");
        }
        key
    }
}
