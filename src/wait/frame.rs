//! Shared per-await frame for the wait combinators.
//!
//! One frame serves both the tuple and the range forms of every
//! combinator. It owns the completion atomics:
//!
//! - `counter` — initialized to the task count, decremented acq_rel on
//!   every completion (and by the skipped count when the sequential
//!   short-circuit fires); the decrement that reaches zero wakes the
//!   parent.
//! - `first_failed` / `first_completed` — CAS'd from the sentinel (task
//!   count) to the reporting task's index; the CAS winner defines the
//!   combinator's failure/winner index.
//!
//! `on_ready` runs on completing tasks' threads, concurrently.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::task::Waker;

use crate::adapter::ReadyHook;
use crate::stop::StopSource;

/// Which completions the frame reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitPolicy {
    /// Fail fast: first failure elected, stop source signalled on it.
    FailFast,
    /// First success elected, stop source signalled on it; failures are
    /// recorded for the all-fail outcome.
    FirstSuccess,
    /// Collect everything; no winner election, no stop signalling.
    Collect,
}

/// The shared completion frame behind one combinator await.
///
/// Exposed only so it can appear in [`WaitSet`](crate::wait::WaitSet)
/// signatures; it has no public operations.
pub struct WaitFrame {
    policy: WaitPolicy,
    /// Task count; doubles as the "no index elected" sentinel.
    invalid: usize,
    counter: AtomicUsize,
    first_failed: AtomicUsize,
    first_completed: AtomicUsize,
    stop: Option<StopSource>,
    parent: Mutex<Option<Waker>>,
}

impl WaitFrame {
    pub(crate) fn new(count: usize, policy: WaitPolicy, stop: Option<StopSource>) -> Self {
        Self {
            policy,
            invalid: count,
            counter: AtomicUsize::new(count),
            first_failed: AtomicUsize::new(count),
            first_completed: AtomicUsize::new(count),
            stop,
            parent: Mutex::new(None),
        }
    }

    /// Stores (or refreshes) the parent's waker. Must happen before the
    /// caller checks [`done`](Self::done), so a completion that lands in
    /// between is never lost.
    pub(crate) fn store_parent(&self, waker: &Waker) {
        let mut parent = self.parent.lock().expect("wait frame waker poisoned");
        *parent = Some(waker.clone());
    }

    /// True once every started (non-skipped) task has completed.
    pub(crate) fn done(&self) -> bool {
        self.counter.load(Ordering::Acquire) == 0
    }

    /// Index of the elected failure, or the sentinel if none failed.
    pub(crate) fn first_failed(&self) -> usize {
        self.first_failed.load(Ordering::Acquire)
    }

    /// Index of the elected winner, or the sentinel if none succeeded.
    pub(crate) fn first_completed(&self) -> usize {
        self.first_completed.load(Ordering::Acquire)
    }

    pub(crate) const fn invalid_index(&self) -> usize {
        self.invalid
    }

    /// Consulted after sequentially starting task `index`: true when a
    /// completion has already been elected at or before `index`, meaning
    /// the remaining tasks need not start at all.
    pub(crate) fn short_circuit_after(&self, index: usize) -> bool {
        match self.policy {
            WaitPolicy::FailFast => self.first_failed.load(Ordering::Acquire) <= index,
            WaitPolicy::FirstSuccess => self.first_completed.load(Ordering::Acquire) <= index,
            WaitPolicy::Collect => false,
        }
    }

    /// Removes `skipped` never-started tasks from the completion count.
    /// Returns true when that adjustment was the last one outstanding
    /// (the parent may resume immediately).
    pub(crate) fn skip_remaining(&self, skipped: usize) -> bool {
        tracing::trace!(skipped, "wait short-circuit: skipping unstarted tasks");
        self.counter.fetch_sub(skipped, Ordering::AcqRel) == skipped
    }

    fn wake_parent(&self) {
        let waker = self
            .parent
            .lock()
            .expect("wait frame waker poisoned")
            .take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl ReadyHook for WaitFrame {
    fn on_ready(&self, index: usize, success: bool) {
        match self.policy {
            WaitPolicy::FailFast => {
                if !success
                    && self
                        .first_failed
                        .compare_exchange(
                            self.invalid,
                            index,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    if let Some(stop) = &self.stop {
                        stop.request_stop();
                    }
                }
            }
            WaitPolicy::FirstSuccess => {
                if success {
                    if self
                        .first_completed
                        .compare_exchange(
                            self.invalid,
                            index,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        if let Some(stop) = &self.stop {
                            stop.request_stop();
                        }
                    }
                } else {
                    let _ = self.first_failed.compare_exchange(
                        self.invalid,
                        index,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                }
            }
            WaitPolicy::Collect => {}
        }

        if self.counter.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.wake_parent();
        }
    }
}
