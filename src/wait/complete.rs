//! Wait-all-complete: collect every task's outcome, never fail fast.
//!
//! Unlike [`when_all`](crate::when_all), every task is always started and
//! every task's result — value or captured panic — is collected into a
//! per-slot [`AsyncResult`](crate::AsyncResult) record. The combinator
//! itself never panics on behalf of a task; callers inspect the records
//! and decide what partial outcomes to keep.
//!
//! # Example
//!
//! ```
//! use mooring::{sync_wait, when_all_complete, Task};
//!
//! let (a, b) = sync_wait(when_all_complete((
//!     Task::new(async { 1 }),
//!     Task::new(async { panic!("boom") }),
//! )));
//! assert_eq!(a.as_ok(), Some(&1));
//! assert!(!b.has_value());
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::wait::frame::{WaitFrame, WaitPolicy};
use crate::wait::list::{IntoWaitSet, WaitSet};

/// Runs every future in `list` to completion and returns all of their
/// outcomes, success or panic, one record per task.
pub fn when_all_complete<L: IntoWaitSet>(list: L) -> WhenAllComplete<L::Set> {
    WhenAllComplete {
        state: CompleteState::Idle {
            set: list.into_wait_set(),
        },
    }
}

enum CompleteState<S> {
    Idle { set: S },
    Running { set: S, frame: Arc<WaitFrame> },
    Done,
}

/// Future returned by [`when_all_complete`].
#[must_use = "combinators do nothing until awaited"]
pub struct WhenAllComplete<S: WaitSet> {
    state: CompleteState<S>,
}

impl<S: WaitSet> Future for WhenAllComplete<S> {
    type Output = S::CompleteOutput;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let state = &mut self.get_mut().state;
        match std::mem::replace(state, CompleteState::Done) {
            CompleteState::Idle { set } => {
                if set.len() == 0 {
                    return Poll::Ready(S::empty_complete());
                }
                let frame = Arc::new(WaitFrame::new(set.len(), WaitPolicy::Collect, None));
                frame.store_parent(cx.waker());
                set.attach(&frame);
                if frame.done() {
                    return Poll::Ready(set.collect_complete());
                }
                *state = CompleteState::Running { set, frame };
                Poll::Pending
            }
            CompleteState::Running { set, frame } => {
                frame.store_parent(cx.waker());
                if frame.done() {
                    return Poll::Ready(set.collect_complete());
                }
                *state = CompleteState::Running { set, frame };
                Poll::Pending
            }
            CompleteState::Done => panic!("wait combinator polled after completion"),
        }
    }
}
