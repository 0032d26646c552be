//! Cooperative cancellation: stop sources, stop tokens and the
//! stop-request awaiter.
//!
//! A [`StopSource`] owns the request side of a cancellation flag; any
//! number of [`StopToken`]s observe it. Cancellation is purely
//! cooperative: nothing is interrupted, willing participants consult the
//! token (or register a callback) and unwind themselves.
//!
//! # Callback semantics
//!
//! - A callback registered before the stop request fires exactly once, on
//!   the thread that requests the stop.
//! - Registering after the stop has been requested runs the callback
//!   inline before `register` returns.
//! - Dropping the [`StopRegistration`] deregisters the callback: it will
//!   not fire afterwards, though a drop that races the stop request may
//!   find the callback already running on the requesting thread.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

type StopCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct StopState {
    stopped: AtomicBool,
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, StopCallback)>>,
}

impl StopState {
    fn request_stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::trace!("stop requested");
        // Drain under the lock so a concurrent `register` either lands
        // before the drain (and is invoked here) or observes the flag and
        // runs inline on its own thread.
        let drained: Vec<(u64, StopCallback)> = {
            let mut callbacks = self.callbacks.lock().expect("stop callbacks poisoned");
            std::mem::take(&mut *callbacks)
        };
        for (_, callback) in drained {
            callback();
        }
        true
    }
}

/// The requesting half of a cancellation flag.
///
/// Cloning yields another handle to the same flag. Requesting a stop is
/// idempotent; the first request wins and runs registered callbacks.
#[derive(Clone, Default)]
pub struct StopSource {
    state: Arc<StopState>,
}

impl StopSource {
    /// Creates a fresh, unrequested stop source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Returns true if this call was the first request.
    pub fn request_stop(&self) -> bool {
        self.state.request_stop()
    }

    /// Returns true once a stop has been requested.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    /// Returns an observing token for this source.
    #[must_use]
    pub fn token(&self) -> StopToken {
        StopToken {
            state: Arc::clone(&self.state),
        }
    }
}

impl std::fmt::Debug for StopSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSource")
            .field("stop_requested", &self.stop_requested())
            .finish()
    }
}

/// The observing half of a cancellation flag.
#[derive(Clone)]
pub struct StopToken {
    state: Arc<StopState>,
}

impl StopToken {
    /// Returns true once a stop has been requested.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    /// Registers a callback to run when a stop is requested.
    ///
    /// If the stop was already requested, the callback runs inline before
    /// this returns. The returned registration deregisters on drop.
    pub fn register(&self, callback: impl FnOnce() + Send + 'static) -> StopRegistration {
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut callbacks = self.state.callbacks.lock().expect("stop callbacks poisoned");
            if !self.state.stopped.load(Ordering::SeqCst) {
                callbacks.push((id, Box::new(callback)));
                return StopRegistration {
                    state: Some((Arc::clone(&self.state), id)),
                };
            }
        }
        // Stop already requested; the drain has run or is running, so our
        // entry would never fire. Invoke here instead.
        callback();
        StopRegistration { state: None }
    }
}

impl std::fmt::Debug for StopToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopToken")
            .field("stop_requested", &self.stop_requested())
            .finish()
    }
}

/// A scoped callback registration. Dropping deregisters.
#[must_use = "dropping the registration immediately deregisters the callback"]
pub struct StopRegistration {
    state: Option<(Arc<StopState>, u64)>,
}

impl Drop for StopRegistration {
    fn drop(&mut self) {
        if let Some((state, id)) = self.state.take() {
            let mut callbacks = state.callbacks.lock().expect("stop callbacks poisoned");
            if let Some(pos) = callbacks.iter().position(|(cb_id, _)| *cb_id == id) {
                callbacks.remove(pos);
            }
        }
    }
}

impl std::fmt::Debug for StopRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopRegistration")
            .field("active", &self.state.is_some())
            .finish()
    }
}

/// Returns a future that completes once `token` has a stop requested.
///
/// Completion is exactly-once even when the stop request races the
/// awaiter's own registration: the waker lands before the callback is
/// armed, and the flag is re-checked after arming closes the window.
pub fn when_stopped(token: StopToken) -> WhenStopped {
    WhenStopped {
        token,
        waker: Arc::new(Mutex::new(None)),
        registration: None,
    }
}

/// Future returned by [`when_stopped`].
pub struct WhenStopped {
    token: StopToken,
    waker: Arc<Mutex<Option<Waker>>>,
    registration: Option<StopRegistration>,
}

impl Future for WhenStopped {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.token.stop_requested() {
            return Poll::Ready(());
        }
        *self.waker.lock().expect("stop waker poisoned") = Some(cx.waker().clone());
        if self.registration.is_none() {
            let slot = Arc::clone(&self.waker);
            let registration = self.token.register(move || {
                let waker = slot.lock().expect("stop waker poisoned").take();
                if let Some(waker) = waker {
                    waker.wake();
                }
            });
            self.registration = Some(registration);
        }
        // The callback may have fired on another thread between the first
        // check and the registration landing; re-check before parking.
        if self.token.stop_requested() {
            return Poll::Ready(());
        }
        Poll::Pending
    }
}

impl std::fmt::Debug for WhenStopped {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhenStopped")
            .field("stop_requested", &self.token.stop_requested())
            .finish()
    }
}
