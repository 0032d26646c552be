//! Nurseries: structured scopes for dynamically spawned work.
//!
//! A nursery guarantees that spawned children cannot outlive their parent
//! scope: the [`NurseryTask`] completes only once its body has returned
//! *and* every child started through the [`Nursery`] handle has reached
//! its final state. The awaiter therefore never observes a result while
//! any child is still running.
//!
//! # Child accounting
//!
//! The child counter counts live children. The parent's own completion
//! performs one extra decrement, so the counter sits at "minus one" only
//! when the body has returned and no child remains; whichever decrement
//! observes zero wakes the awaiter. Children may themselves hold a
//! cloned handle and spawn grandchildren — the counter never reaches the
//! terminal state while any child that could spawn is still alive.
//!
//! # Failure semantics
//!
//! A child's panic is recorded (first one wins) and re-raised on the
//! parent's awaiter after the scope has quiesced. The parent body's own
//! panic takes precedence and is likewise re-raised only after every
//! child has finished. The nursery never cancels children on failure;
//! callers wanting that thread a [`StopSource`](crate::StopSource)
//! through the body and its children.
//!
//! # Example
//!
//! ```
//! use mooring::{nursery, sync_wait};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let hits = Arc::new(AtomicUsize::new(0));
//! let observed = Arc::clone(&hits);
//! sync_wait(nursery(move |n| async move {
//!     for _ in 0..4 {
//!         let hits = Arc::clone(&observed);
//!         n.start(async move {
//!             hits.fetch_add(1, Ordering::SeqCst);
//!         });
//!     }
//! }));
//! assert_eq!(hits.load(Ordering::SeqCst), 4);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::adapter::{AdapterTask, ReadyHook};
use crate::outcome::PanicPayload;
use crate::task::CatchPanic;

struct NurseryCore {
    /// Live-children count; the parent's completion contributes one extra
    /// decrement, making `-1` the quiesced terminal state.
    children: AtomicIsize,
    closed: AtomicBool,
    parent: Mutex<Option<Waker>>,
    first_child_panic: Mutex<Option<PanicPayload>>,
}

impl NurseryCore {
    fn child_started(&self) {
        self.children.fetch_add(1, Ordering::AcqRel);
    }

    /// One child (or the parent body) is done. Observing the counter at
    /// zero means everything else already finished: wake the awaiter.
    /// Returns true in that case.
    fn completed_one(&self) -> bool {
        if self.children.fetch_sub(1, Ordering::AcqRel) == 0 {
            let waker = self.parent.lock().expect("nursery waker poisoned").take();
            if let Some(waker) = waker {
                waker.wake();
            }
            return true;
        }
        false
    }

    fn quiesced(&self) -> bool {
        self.children.load(Ordering::Acquire) == -1
    }

    fn record_child_panic(&self, panic: PanicPayload) {
        let mut slot = self
            .first_child_panic
            .lock()
            .expect("nursery panic slot poisoned");
        if slot.is_none() {
            tracing::trace!(message = panic.message(), "nursery child panicked");
            *slot = Some(panic);
        }
    }
}

impl ReadyHook for NurseryCore {
    fn on_ready(&self, _index: usize, _success: bool) {
        self.completed_one();
    }
}

/// Handle for spawning children into a nursery scope.
///
/// Cloneable and sendable; children may carry a clone and spawn further
/// work while they run.
#[derive(Clone)]
pub struct Nursery {
    core: Arc<NurseryCore>,
}

impl Nursery {
    /// Spawns `future` as a child of this scope and starts it
    /// immediately. The child's value is discarded; its panic, if any, is
    /// recorded and re-raised on the scope's awaiter.
    ///
    /// # Panics
    ///
    /// Panics if the scope has already completed.
    pub fn start<F>(&self, future: F)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        assert!(
            !self.core.closed.load(Ordering::Acquire),
            "child started on a completed nursery"
        );
        self.core.child_started();
        let core = Arc::clone(&self.core);
        let adapter = AdapterTask::new(async move {
            if let Err(panic) = CatchPanic::new(Box::pin(future)).await {
                core.record_child_panic(panic);
            }
        });
        adapter.start(Arc::clone(&self.core) as Arc<dyn ReadyHook>, 0);
    }

    /// Number of children currently alive.
    #[must_use]
    pub fn child_count(&self) -> usize {
        let count = self.core.children.load(Ordering::Acquire);
        usize::try_from(count.max(0)).unwrap_or(0)
    }
}

impl std::fmt::Debug for Nursery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nursery")
            .field("children", &self.child_count())
            .finish()
    }
}

/// Creates a nursery scope: `body` receives the [`Nursery`] handle and
/// runs as the parent; the returned task completes with the body's value
/// once the body and every spawned child have finished.
pub fn nursery<T, F, Fut>(body: F) -> NurseryTask<T>
where
    F: FnOnce(Nursery) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let core = Arc::new(NurseryCore {
        children: AtomicIsize::new(0),
        closed: AtomicBool::new(false),
        parent: Mutex::new(None),
        first_child_panic: Mutex::new(None),
    });
    let handle = Nursery {
        core: Arc::clone(&core),
    };
    let boxed: Pin<Box<dyn Future<Output = T> + Send + 'static>> = Box::pin(body(handle));
    NurseryTask {
        body: Some(CatchPanic::new(boxed)),
        body_result: None,
        core,
    }
}

/// Structured scope task returned by [`nursery`].
///
/// Completes with the body's value after the scope has quiesced.
#[must_use = "a nursery task does nothing until awaited"]
pub struct NurseryTask<T> {
    body: Option<CatchPanic<Pin<Box<dyn Future<Output = T> + Send + 'static>>>>,
    body_result: Option<Result<T, PanicPayload>>,
    core: Arc<NurseryCore>,
}

// The body is boxed and the result is stored by value; nothing is ever
// pinned through `T`.
impl<T> Unpin for NurseryTask<T> {}

impl<T: Send + 'static> Future for NurseryTask<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();

        if let Some(body) = this.body.as_mut() {
            match Pin::new(body).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(result) => {
                    this.body = None;
                    this.body_result = Some(result);
                    if this.core.completed_one() {
                        return Poll::Ready(this.finish());
                    }
                }
            }
        }

        // Body finished; wait for the children to drain. Store the waker
        // before the terminal check so the last child's wake is not lost.
        *this.core.parent.lock().expect("nursery waker poisoned") = Some(cx.waker().clone());
        if this.core.quiesced() {
            return Poll::Ready(this.finish());
        }
        Poll::Pending
    }
}

impl<T> NurseryTask<T> {
    fn finish(&mut self) -> T {
        self.core.closed.store(true, Ordering::Release);
        let body_result = self
            .body_result
            .take()
            .expect("nursery finished without a body result");
        match body_result {
            Err(panic) => panic.resume(),
            Ok(value) => {
                let child_panic = self
                    .core
                    .first_child_panic
                    .lock()
                    .expect("nursery panic slot poisoned")
                    .take();
                if let Some(panic) = child_panic {
                    panic.resume();
                }
                value
            }
        }
    }
}

impl<T> std::fmt::Debug for NurseryTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NurseryTask")
            .field("body_finished", &self.body.is_none())
            .finish()
    }
}
