//! Fail-fast wait-all combinators.
//!
//! [`when_all`] runs every future in the set and completes with all of
//! their values. The policy is fail-fast: the first task to panic is
//! elected the group failure, tasks not yet started are skipped entirely,
//! and once every *started* task has completed the elected panic is
//! re-raised on the awaiter. With a stop source supplied
//! ([`when_all_with`]), the first failure also requests a stop so that
//! cooperative siblings can unwind early.
//!
//! [`try_when_all`] is the `Result`-aware form: a task returning `Err`
//! counts as a failure, and the combinator collapses the set into a
//! single `Result` whose error is the first failure's.
//!
//! # Example
//!
//! ```
//! use mooring::{sync_wait, when_all, Task};
//!
//! let (a, b) = sync_wait(when_all((
//!     Task::new(async { 10 }),
//!     Task::new(async { 20 }),
//! )));
//! assert_eq!((a, b), (10, 20));
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::stop::StopSource;
use crate::wait::frame::{WaitFrame, WaitPolicy};
use crate::wait::list::{IntoTryWaitSet, IntoWaitSet, TryFailure, TryWaitSet, WaitSet};

/// Waits for every future in `list`; the first panic wins and is
/// re-raised once all started tasks have completed.
///
/// `list` is a tuple of futures (arity 1..=5), a `Vec`, or an array. An
/// empty range completes immediately with an empty result.
pub fn when_all<L: IntoWaitSet>(list: L) -> WhenAll<L::Set> {
    WhenAll {
        state: AllState::Idle {
            set: list.into_wait_set(),
            stop: None,
        },
    }
}

/// As [`when_all`], additionally requesting a stop on `stop` when the
/// first failure is observed.
pub fn when_all_with<L: IntoWaitSet>(stop: &StopSource, list: L) -> WhenAll<L::Set> {
    WhenAll {
        state: AllState::Idle {
            set: list.into_wait_set(),
            stop: Some(stop.clone()),
        },
    }
}

/// `Result`-aware [`when_all`]: `Err` outputs count as failures and the
/// group collapses to a single `Result`.
pub fn try_when_all<L: IntoTryWaitSet>(list: L) -> TryWhenAll<L::Set> {
    TryWhenAll {
        state: AllState::Idle {
            set: list.into_try_wait_set(),
            stop: None,
        },
    }
}

/// As [`try_when_all`], with a stop source signalled on first failure.
pub fn try_when_all_with<L: IntoTryWaitSet>(stop: &StopSource, list: L) -> TryWhenAll<L::Set> {
    TryWhenAll {
        state: AllState::Idle {
            set: list.into_try_wait_set(),
            stop: Some(stop.clone()),
        },
    }
}

enum AllState<S> {
    Idle { set: S, stop: Option<StopSource> },
    Running { set: S, frame: Arc<WaitFrame> },
    Done,
}

impl<S: WaitSet> AllState<S> {
    /// Drives the shared fan-out. Returns the set and frame once every
    /// started task has completed, `Pending` otherwise. `Ready(None)`
    /// signals the empty range.
    #[allow(clippy::type_complexity)]
    fn poll_group(&mut self, cx: &mut Context<'_>) -> Poll<Option<(S, Arc<WaitFrame>)>> {
        match std::mem::replace(self, Self::Done) {
            Self::Idle { set, stop } => {
                if set.len() == 0 {
                    return Poll::Ready(None);
                }
                let frame = Arc::new(WaitFrame::new(set.len(), WaitPolicy::FailFast, stop));
                frame.store_parent(cx.waker());
                set.attach(&frame);
                if frame.done() {
                    return Poll::Ready(Some((set, frame)));
                }
                *self = Self::Running { set, frame };
                Poll::Pending
            }
            Self::Running { set, frame } => {
                frame.store_parent(cx.waker());
                if frame.done() {
                    return Poll::Ready(Some((set, frame)));
                }
                *self = Self::Running { set, frame };
                Poll::Pending
            }
            Self::Done => panic!("wait combinator polled after completion"),
        }
    }
}

/// Future returned by [`when_all`] / [`when_all_with`].
#[must_use = "combinators do nothing until awaited"]
pub struct WhenAll<S: WaitSet> {
    state: AllState<S>,
}

impl<S: WaitSet> Future for WhenAll<S> {
    type Output = S::AllOutput;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut().state.poll_group(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => Poll::Ready(S::empty_all()),
            Poll::Ready(Some((set, frame))) => {
                let failed = frame.first_failed();
                if failed < frame.invalid_index() {
                    set.take_failure(failed).resume();
                }
                Poll::Ready(set.collect_all())
            }
        }
    }
}

/// Future returned by [`try_when_all`] / [`try_when_all_with`].
#[must_use = "combinators do nothing until awaited"]
pub struct TryWhenAll<S: TryWaitSet> {
    state: AllState<S>,
}

impl<S: TryWaitSet> Future for TryWhenAll<S> {
    type Output = Result<S::TryAllOutput, S::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut().state.poll_group(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => Poll::Ready(Ok(S::empty_try_all())),
            Poll::Ready(Some((set, frame))) => {
                let failed = frame.first_failed();
                if failed < frame.invalid_index() {
                    match set.take_try_failure(failed) {
                        TryFailure::Error(error) => return Poll::Ready(Err(error)),
                        TryFailure::Panicked(panic) => panic.resume(),
                    }
                }
                Poll::Ready(Ok(set.collect_try_all()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::poll_once;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn ready_tuple_completes_on_first_poll() {
        let mut fut = when_all((async { 1 }, async { 2_u8 }));
        match poll_once(&mut fut) {
            Poll::Ready((a, b)) => assert_eq!((a, b), (1, 2)),
            Poll::Pending => panic!("ready tasks must complete inline"),
        }
    }

    #[test]
    fn empty_vec_is_ready_with_empty_output() {
        let mut fut = when_all(Vec::<std::future::Ready<i32>>::new());
        assert_eq!(poll_once(&mut fut), Poll::Ready(Vec::new()));
    }

    #[test]
    fn failure_prevents_later_tasks_from_starting() {
        let started = Arc::new(AtomicUsize::new(0));
        let observe = |started: &Arc<AtomicUsize>| {
            let started = Arc::clone(started);
            async move {
                started.fetch_add(1, Ordering::SeqCst);
            }
        };
        let never = Arc::clone(&started);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut fut = when_all((
                observe(&started),
                async { panic!("stop here") },
                observe(&never),
            ));
            let _ = poll_once(&mut fut);
        }));
        assert!(result.is_err());
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn try_error_resolves_without_panicking() {
        let mut fut = try_when_all((
            async { Ok::<_, &str>(1) },
            async { Err::<i32, &str>("bad") },
        ));
        assert_eq!(poll_once(&mut fut), Poll::Ready(Err("bad")));
    }

    #[test]
    fn stop_source_untouched_on_success() {
        let stop = StopSource::new();
        let mut fut = when_all_with(&stop, (async { 1 }, async { 2 }));
        assert!(poll_once(&mut fut).is_ready());
        assert!(!stop.stop_requested());
    }
}
