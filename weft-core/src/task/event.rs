//! One-shot events.
//!
//! Tasks expose two events: completion (the task's work has run) and result
//! consumption (whoever wanted the outcome has taken it). Both are one-shot:
//! once reached they stay reached. Waiters block on a condvar rather than
//! spinning, and events are shared behind `Arc` so a waiter never pins the
//! task's arena slot while blocked.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

/// A one-shot event that threads can wait on.
#[derive(Default)]
pub struct Event {
    reached: AtomicBool,
    lock: Mutex<()>,
    cv: Condvar,
}

impl Event {
    /// Create an event in the not-reached state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether the event has been reached.
    pub fn is_reached(&self) -> bool {
        self.reached.load(Ordering::Acquire)
    }

    /// Mark the event reached and wake all waiters.
    ///
    /// Idempotent; a second notification is a no-op.
    pub fn notify(&self) {
        // The store happens under the lock so a waiter cannot check the flag
        // and block between our store and our wakeup.
        let _guard = self.lock.lock();
        self.reached.store(true, Ordering::Release);
        drop(_guard);
        self.cv.notify_all();
    }

    /// Block until the event is reached.
    ///
    /// Returns immediately if it already was.
    pub fn wait(&self) {
        if self.is_reached() {
            return;
        }
        let mut guard = self.lock.lock();
        while !self.is_reached() {
            self.cv.wait(&mut guard);
        }
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("reached", &self.is_reached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn starts_unreached() {
        let event = Event::new();
        assert!(!event.is_reached());
    }

    #[test]
    fn notify_is_idempotent() {
        let event = Event::new();
        event.notify();
        event.notify();
        assert!(event.is_reached());
        // wait after notification must not block
        event.wait();
    }

    #[test]
    fn wait_wakes_on_notify() {
        let event = Arc::new(Event::new());
        let event_clone = event.clone();

        let waiter = std::thread::spawn(move || {
            event_clone.wait();
            assert!(event_clone.is_reached());
        });

        event.notify();
        waiter.join().unwrap();
    }
}
