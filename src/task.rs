//! Single-consumer lazy tasks.
//!
//! A [`Task`] is a named, boxed, move-only future. Like every future it
//! is inert until first polled; unlike a bare `async` block it enforces
//! the single-consumption rule at runtime: polling a task after it has
//! produced its value is a programmer error and panics.
//!
//! # Example
//!
//! ```
//! use mooring::{sync_wait, Task};
//!
//! let task = Task::new(async { 21 * 2 });
//! assert_eq!(sync_wait(task), 42);
//! ```

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::outcome::PanicPayload;

/// A lazy, move-only future with a single-consumption guard.
#[must_use = "a task does nothing until awaited"]
pub struct Task<T> {
    future: Option<Pin<Box<dyn Future<Output = T> + Send + 'static>>>,
}

impl<T> Task<T> {
    /// Wraps a future into a task.
    pub fn new(future: impl Future<Output = T> + Send + 'static) -> Self {
        Self {
            future: Some(Box::pin(future)),
        }
    }

    /// Returns true once the task has produced its value.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.future.is_none()
    }
}

impl<T> Future for Task<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let future = self
            .future
            .as_mut()
            .expect("task polled after it already produced its value");
        match future.as_mut().poll(cx) {
            Poll::Ready(value) => {
                self.future = None;
                Poll::Ready(value)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Future adapter that converts a panicking poll into an `Err` value.
///
/// The inner future's output becomes `Result<T, PanicPayload>`; a panic
/// ends the future. Used wherever a failure must be routed somewhere
/// other than the polling thread (nursery children and bodies).
pub(crate) struct CatchPanic<F> {
    future: Option<F>,
}

impl<F: Future + Unpin> CatchPanic<F> {
    pub(crate) fn new(future: F) -> Self {
        Self {
            future: Some(future),
        }
    }
}

impl<F: Future + Unpin> Future for CatchPanic<F> {
    type Output = Result<F::Output, PanicPayload>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let future = self
            .future
            .as_mut()
            .expect("future polled after completion");
        match catch_unwind(AssertUnwindSafe(|| Pin::new(&mut *future).poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(value)) => {
                self.future = None;
                Poll::Ready(Ok(value))
            }
            Err(payload) => {
                self.future = None;
                Poll::Ready(Err(PanicPayload::new(payload)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::poll_once;

    #[test]
    fn task_is_lazy() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let ran = Arc::new(AtomicBool::new(false));
        let observed = Arc::clone(&ran);
        let mut task = Task::new(async move {
            observed.store(true, Ordering::SeqCst);
        });
        assert!(!ran.load(Ordering::SeqCst));
        assert!(poll_once(&mut task).is_ready());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn task_produces_value_once() {
        let mut task = Task::new(async { "value" });
        match poll_once(&mut task) {
            Poll::Ready(v) => assert_eq!(v, "value"),
            Poll::Pending => panic!("expected ready"),
        }
        assert!(task.is_finished());
    }

    #[test]
    #[should_panic(expected = "task polled after it already produced its value")]
    fn polling_finished_task_panics() {
        let mut task = Task::new(async { 1 });
        let _ = poll_once(&mut task);
        let _ = poll_once(&mut task);
    }

    #[test]
    fn catch_panic_captures_payload() {
        let mut fut = CatchPanic::new(Box::pin(async { panic!("inner") }));
        match poll_once(&mut fut) {
            Poll::Ready(Err(payload)) => assert_eq!(payload.message(), "inner"),
            other => panic!("expected captured panic, got {other:?}"),
        }
    }

    #[test]
    fn catch_panic_passes_value_through() {
        let mut fut = CatchPanic::new(Box::pin(async { 9 }));
        match poll_once(&mut fut) {
            Poll::Ready(Ok(v)) => assert_eq!(v, 9),
            other => panic!("expected value, got {other:?}"),
        }
    }
}
