//! Blocking bridge from the synchronous world.
//!
//! [`sync_wait`] drives a future to completion on the calling thread,
//! parking between polls, and returns its value — or re-raises its panic
//! — synchronously. It is the entry point examples and tests use to run
//! a tree of tasks without any runtime underneath.
//!
//! # Example
//!
//! ```
//! use mooring::{sync_wait, Task};
//!
//! assert_eq!(sync_wait(Task::new(async { 42 })), 42);
//! ```

use std::future::Future;
use std::sync::{Arc, Condvar, Mutex};

use crate::adapter::{AdapterTask, ReadyHook};

/// One-shot binary event for cross-thread completion signalling.
struct SyncEvent {
    signaled: Mutex<bool>,
    cv: Condvar,
}

impl SyncEvent {
    fn new() -> Self {
        Self {
            signaled: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn set(&self) {
        let mut signaled = self.signaled.lock().expect("sync event poisoned");
        *signaled = true;
        // Notify while still holding the lock: once the waiter observes
        // the flag it may return and destroy this event, so the notify
        // must not touch the condvar after the flag becomes visible.
        self.cv.notify_one();
    }

    fn wait(&self) {
        let mut signaled = self.signaled.lock().expect("sync event poisoned");
        while !*signaled {
            signaled = self.cv.wait(signaled).expect("sync event poisoned");
        }
    }
}

struct SyncHook(Arc<SyncEvent>);

impl ReadyHook for SyncHook {
    fn on_ready(&self, _index: usize, _success: bool) {
        self.0.set();
    }
}

/// Blocks the current thread until `future` completes, returning its
/// value.
///
/// Any suspension inside the future must eventually be resumed from some
/// thread (a timer, an event sender, a pool worker); the completion
/// signal wakes the blocked caller.
///
/// # Panics
///
/// Re-raises the future's panic on the calling thread.
pub fn sync_wait<F>(future: F) -> F::Output
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let event = Arc::new(SyncEvent::new());
    let adapter = AdapterTask::new(future);
    adapter.start(Arc::new(SyncHook(Arc::clone(&event))), 0);
    event.wait();
    match adapter.take_output() {
        Ok(value) => value,
        Err(panic) => panic.resume(),
    }
}
