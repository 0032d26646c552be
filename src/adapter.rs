//! Self-driving adapter tasks (internal).
//!
//! An [`AdapterTask`] wraps any future so that combinators can treat it
//! uniformly: the wrapped future runs to completion on its own (resuming
//! in place on whichever thread wakes it), stores its value or captured
//! panic in a slot, and reports `on_ready(index, success)` to a shared
//! hook exactly once.
//!
//! Combinators never inspect the wrapped future's shape; the hook and the
//! slot are the whole interface.
//!
//! # Drive state machine
//!
//! ```text
//!            start()/wake           poll -> Pending
//!   IDLE ───────────────► RUNNING ───────────────► IDLE
//!                            │  ▲
//!              wake while    │  │ re-run
//!              running       ▼  │
//!                         NOTIFIED
//!                            │ poll -> Ready / panic
//!                            ▼
//!                         COMPLETE  (hook fires once)
//! ```
//!
//! A wake while RUNNING records NOTIFIED instead of re-entering; the
//! running thread observes the flag after its poll and loops. This is
//! what lets completion callbacks arrive from multiple threads without a
//! scheduler underneath.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

use crate::outcome::PanicPayload;

/// Receiver of adapter completion reports.
///
/// `on_ready` is invoked exactly once per adapter, on the thread that
/// completed it; implementations must tolerate concurrent invocations for
/// distinct indices.
pub(crate) trait ReadyHook: Send + Sync + 'static {
    fn on_ready(&self, index: usize, success: bool);
}

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const NOTIFIED: u8 = 2;
const COMPLETE: u8 = 3;

struct AdapterInner<F: Future> {
    future: Option<Pin<Box<F>>>,
    slot: Option<Result<F::Output, PanicPayload>>,
    hook: Option<(Arc<dyn ReadyHook>, usize)>,
}

pub(crate) struct AdapterCore<F: Future> {
    state: AtomicU8,
    /// Whether a stored value counts as success. Fail-fast combinators
    /// over `Result` futures pass `Result::is_ok` here.
    success_of: fn(&F::Output) -> bool,
    inner: Mutex<AdapterInner<F>>,
}

/// Handle to a self-driving adapter. Owning it does not keep the wrapped
/// future alive once complete; pending adapters stay alive through their
/// own wakers.
pub(crate) struct AdapterTask<F: Future> {
    core: Arc<AdapterCore<F>>,
}

impl<F> AdapterTask<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    pub(crate) fn new(future: F) -> Self {
        Self::with_success(future, |_| true)
    }

    /// Wraps a future with an explicit success predicate over its output.
    pub(crate) fn with_success(future: F, success_of: fn(&F::Output) -> bool) -> Self {
        Self {
            core: Arc::new(AdapterCore {
                state: AtomicU8::new(IDLE),
                success_of,
                inner: Mutex::new(AdapterInner {
                    future: Some(Box::pin(future)),
                    slot: None,
                    hook: None,
                }),
            }),
        }
    }

    /// Registers the completion hook and drives the future inline until
    /// it suspends or completes.
    pub(crate) fn start(&self, hook: Arc<dyn ReadyHook>, index: usize) {
        self.setup(hook, index);
        self.run();
    }

    /// Registers the completion hook without driving. The caller runs the
    /// adapter as its own tail action via [`run`](Self::run); this is what
    /// lets a combinator run its last child on the parent's thread instead
    /// of paying a schedule round-trip.
    pub(crate) fn setup(&self, hook: Arc<dyn ReadyHook>, index: usize) {
        let mut inner = self.core.inner.lock().expect("adapter state poisoned");
        debug_assert!(inner.hook.is_none(), "adapter started twice");
        inner.hook = Some((hook, index));
    }

    /// Drives a previously set up adapter inline.
    pub(crate) fn run(&self) {
        if self
            .core
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            AdapterCore::drive(&self.core);
        }
    }

    /// Takes the stored output. Callable once, after the completion hook
    /// has fired (the caller's counter protocol guarantees the ordering).
    pub(crate) fn take_output(&self) -> Result<F::Output, PanicPayload> {
        let mut inner = self.core.inner.lock().expect("adapter state poisoned");
        inner
            .slot
            .take()
            .expect("adapter output taken before completion, or taken twice")
    }
}

impl<F> AdapterCore<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    /// Polls the wrapped future until it suspends without a pending
    /// notification, or completes. Entered only by the thread that moved
    /// the state to RUNNING.
    fn drive(core: &Arc<Self>) {
        let waker = Waker::from(Arc::clone(core));
        let mut cx = Context::from_waker(&waker);
        loop {
            let polled = {
                let mut inner = core.inner.lock().expect("adapter state poisoned");
                let Some(future) = inner.future.as_mut() else {
                    return;
                };
                catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)))
            };
            match polled {
                Ok(Poll::Pending) => {
                    match core.state.compare_exchange(
                        RUNNING,
                        IDLE,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return,
                        // A wake arrived while polling; run again.
                        Err(_) => core.state.store(RUNNING, Ordering::Release),
                    }
                }
                Ok(Poll::Ready(value)) => {
                    let success = (core.success_of)(&value);
                    Self::complete(core, Ok(value), success);
                    return;
                }
                Err(payload) => {
                    Self::complete(core, Err(PanicPayload::new(payload)), false);
                    return;
                }
            }
        }
    }

    fn complete(core: &Arc<Self>, result: Result<F::Output, PanicPayload>, success: bool) {
        let hook = {
            let mut inner = core.inner.lock().expect("adapter state poisoned");
            inner.future = None;
            inner.slot = Some(result);
            inner.hook.take()
        };
        core.state.store(COMPLETE, Ordering::Release);
        if let Some((hook, index)) = hook {
            hook.on_ready(index, success);
        }
    }
}

impl<F> Wake for AdapterCore<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn wake(self: Arc<Self>) {
        Self::wake_core(&self);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        Self::wake_core(self);
    }
}

impl<F> AdapterCore<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn wake_core(core: &Arc<Self>) {
        loop {
            match core.state.load(Ordering::Acquire) {
                IDLE => {
                    if core
                        .state
                        .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        Self::drive(core);
                        return;
                    }
                }
                RUNNING => {
                    if core
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                // NOTIFIED: a re-poll is already owed. COMPLETE: nothing to do.
                _ => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::sleep;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct RecordingHook {
        calls: Mutex<Vec<(usize, bool)>>,
        fired: AtomicUsize,
    }

    impl RecordingHook {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fired: AtomicUsize::new(0),
            })
        }
    }

    impl ReadyHook for RecordingHook {
        fn on_ready(&self, index: usize, success: bool) {
            self.calls.lock().unwrap().push((index, success));
            self.fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn immediate_completion_reports_inline() {
        let hook = RecordingHook::new();
        let adapter = AdapterTask::new(async { 7 });
        adapter.start(hook.clone(), 3);
        assert_eq!(&*hook.calls.lock().unwrap(), &[(3, true)]);
        assert_eq!(adapter.take_output().unwrap(), 7);
    }

    #[test]
    fn panic_reports_failure() {
        let hook = RecordingHook::new();
        let adapter = AdapterTask::new(async { panic!("bad") });
        adapter.start(hook.clone(), 0);
        assert_eq!(&*hook.calls.lock().unwrap(), &[(0, false)]);
        let payload = adapter.take_output().unwrap_err();
        assert_eq!(payload.message(), "bad");
    }

    #[test]
    fn err_result_is_failure_under_try_predicate() {
        let hook = RecordingHook::new();
        let adapter = AdapterTask::with_success(
            async { Err::<i32, &str>("nope") },
            |out| out.is_ok(),
        );
        adapter.start(hook.clone(), 1);
        assert_eq!(&*hook.calls.lock().unwrap(), &[(1, false)]);
        assert_eq!(adapter.take_output().unwrap(), Err("nope"));
    }

    #[test]
    fn setup_then_run_defers_the_first_poll() {
        let hook = RecordingHook::new();
        let adapter = AdapterTask::new(async { 1 });
        adapter.setup(hook.clone(), 0);
        assert_eq!(hook.fired.load(Ordering::SeqCst), 0);
        adapter.run();
        assert_eq!(hook.fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn suspended_adapter_completes_on_waking_thread() {
        let hook = RecordingHook::new();
        let adapter = AdapterTask::new(async {
            sleep(Duration::from_millis(15)).await;
            11
        });
        adapter.start(hook.clone(), 0);
        assert_eq!(hook.fired.load(Ordering::SeqCst), 0);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while hook.fired.load(Ordering::SeqCst) == 0 {
            assert!(std::time::Instant::now() < deadline, "adapter never completed");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(adapter.take_output().unwrap(), 11);
    }
}
