//! First-success wait-any combinators.
//!
//! [`when_any`] completes once the first task succeeds *and* every other
//! started task has reached its final state (so teardown is safe). The
//! winner's index is reported alongside its value; with a stop source
//! supplied ([`when_any_with`]), the winner requests a stop so that the
//! losers can unwind early. If every task fails, the first-failing task's
//! panic is re-raised.
//!
//! Tuples report the winner as a `OneOfN` branch value; ranges report the
//! element value directly.
//!
//! # Example
//!
//! ```
//! use mooring::{sync_wait, when_any, Task};
//!
//! let (index, value) = sync_wait(when_any(vec![
//!     Task::new(async { "a" }),
//!     Task::new(async { "b" }),
//! ]));
//! assert_eq!(index, 0);
//! assert_eq!(value, "a");
//! ```
//!
//! # Panics
//!
//! Waiting on an empty range is a programmer error and panics with
//! "no tasks".

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::stop::StopSource;
use crate::wait::frame::{WaitFrame, WaitPolicy};
use crate::wait::list::{IntoTryWaitSet, IntoWaitSet, TryFailure, TryWaitSet, WaitSet};

/// Waits for the first success among the futures in `list`; resumes only
/// after every started task has completed.
pub fn when_any<L: IntoWaitSet>(list: L) -> WhenAny<L::Set> {
    WhenAny {
        state: AnyState::Idle {
            set: list.into_wait_set(),
            stop: None,
        },
    }
}

/// As [`when_any`], additionally requesting a stop on `stop` as soon as
/// the winner is elected.
pub fn when_any_with<L: IntoWaitSet>(stop: &StopSource, list: L) -> WhenAny<L::Set> {
    WhenAny {
        state: AnyState::Idle {
            set: list.into_wait_set(),
            stop: Some(stop.clone()),
        },
    }
}

/// `Result`-aware [`when_any`]: a task returning `Err` is a loser, and an
/// all-fail group yields `(first_failed_index, Err(error))` instead of
/// panicking.
pub fn try_when_any<L: IntoTryWaitSet>(list: L) -> TryWhenAny<L::Set> {
    TryWhenAny {
        state: AnyState::Idle {
            set: list.into_try_wait_set(),
            stop: None,
        },
    }
}

/// As [`try_when_any`], with a stop source signalled by the winner.
pub fn try_when_any_with<L: IntoTryWaitSet>(stop: &StopSource, list: L) -> TryWhenAny<L::Set> {
    TryWhenAny {
        state: AnyState::Idle {
            set: list.into_try_wait_set(),
            stop: Some(stop.clone()),
        },
    }
}

enum AnyState<S> {
    Idle { set: S, stop: Option<StopSource> },
    Running { set: S, frame: Arc<WaitFrame> },
    Done,
}

impl<S: WaitSet> AnyState<S> {
    #[allow(clippy::type_complexity)]
    fn poll_group(&mut self, cx: &mut Context<'_>) -> Poll<(S, Arc<WaitFrame>)> {
        match std::mem::replace(self, Self::Done) {
            Self::Idle { set, stop } => {
                assert!(set.len() > 0, "no tasks");
                let frame = Arc::new(WaitFrame::new(set.len(), WaitPolicy::FirstSuccess, stop));
                frame.store_parent(cx.waker());
                set.attach(&frame);
                if frame.done() {
                    return Poll::Ready((set, frame));
                }
                *self = Self::Running { set, frame };
                Poll::Pending
            }
            Self::Running { set, frame } => {
                frame.store_parent(cx.waker());
                if frame.done() {
                    return Poll::Ready((set, frame));
                }
                *self = Self::Running { set, frame };
                Poll::Pending
            }
            Self::Done => panic!("wait combinator polled after completion"),
        }
    }
}

/// Future returned by [`when_any`] / [`when_any_with`].
#[must_use = "combinators do nothing until awaited"]
pub struct WhenAny<S: WaitSet> {
    state: AnyState<S>,
}

impl<S: WaitSet> Future for WhenAny<S> {
    type Output = (usize, S::AnyOutput);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut().state.poll_group(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready((set, frame)) => {
                let completed = frame.first_completed();
                if completed == frame.invalid_index() {
                    let failed = frame.first_failed();
                    set.take_failure(failed).resume();
                }
                Poll::Ready((completed, set.collect_any(completed)))
            }
        }
    }
}

/// Future returned by [`try_when_any`] / [`try_when_any_with`].
#[must_use = "combinators do nothing until awaited"]
pub struct TryWhenAny<S: TryWaitSet> {
    state: AnyState<S>,
}

impl<S: TryWaitSet> Future for TryWhenAny<S> {
    type Output = (usize, Result<S::TryAnyOutput, S::Error>);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut().state.poll_group(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready((set, frame)) => {
                let completed = frame.first_completed();
                if completed == frame.invalid_index() {
                    let failed = frame.first_failed();
                    return match set.take_try_failure(failed) {
                        TryFailure::Error(error) => Poll::Ready((failed, Err(error))),
                        TryFailure::Panicked(panic) => panic.resume(),
                    };
                }
                Poll::Ready((completed, Ok(set.collect_try_any(completed))))
            }
        }
    }
}
