//! OS signal awaiter (unix).
//!
//! [`when_signal`] completes when either the stop token fires or the
//! process receives the given signal. The signal handler is process-wide
//! state: one awaiter may hold it at a time, guarded by a one-slot
//! reentrancy flag — a second concurrent install fails instead of
//! serializing. The handler itself only stores into an atomic; a helper
//! thread bridges that flag (and the stop token) to the awaiter's waker
//! and restores the previous handler when the wait ends.

use core::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use crate::stop::StopToken;

/// Failures of the signal awaiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    /// Another signal awaiter currently holds the process-wide handler
    /// slot.
    HandlerInstalled,
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandlerInstalled => write!(f, "signal handler already set"),
        }
    }
}

impl std::error::Error for SignalError {}

/// One-slot reentrancy guard for the process-wide handler.
static INSTALLED: AtomicBool = AtomicBool::new(false);
/// Set by the handler; read by the bridge thread.
static SIGNAL_FLAG: AtomicBool = AtomicBool::new(false);

extern "C" fn flag_handler(_sig: libc::c_int) {
    // Only async-signal-safe operations are allowed here.
    SIGNAL_FLAG.store(true, Ordering::Relaxed);
}

struct SignalShared {
    complete: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

/// Returns a future completing when `token` has a stop requested or the
/// OS delivers `signal` to this process.
pub fn when_signal(token: StopToken, signal: libc::c_int) -> WhenSignal {
    WhenSignal {
        token,
        signal,
        shared: None,
    }
}

/// Future returned by [`when_signal`].
#[must_use = "the handler is only installed when the future is awaited"]
pub struct WhenSignal {
    token: StopToken,
    signal: libc::c_int,
    shared: Option<Arc<SignalShared>>,
}

impl Future for WhenSignal {
    type Output = Result<(), SignalError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(shared) = &self.shared {
            if shared.complete.load(Ordering::Acquire) {
                return Poll::Ready(Ok(()));
            }
            *shared.waker.lock().expect("signal waker poisoned") = Some(cx.waker().clone());
            if shared.complete.load(Ordering::Acquire) {
                return Poll::Ready(Ok(()));
            }
            return Poll::Pending;
        }

        if self.token.stop_requested() {
            return Poll::Ready(Ok(()));
        }
        if INSTALLED.swap(true, Ordering::AcqRel) {
            return Poll::Ready(Err(SignalError::HandlerInstalled));
        }
        SIGNAL_FLAG.store(false, Ordering::Relaxed);
        let handler: extern "C" fn(libc::c_int) = flag_handler;
        // SAFETY: the installed handler only performs an atomic store,
        // which is async-signal-safe; the previous disposition is kept and
        // restored by the bridge thread.
        let previous = unsafe { libc::signal(self.signal, handler as libc::sighandler_t) };
        tracing::trace!(signal = self.signal, "signal handler installed");

        let shared = Arc::new(SignalShared {
            complete: AtomicBool::new(false),
            waker: Mutex::new(Some(cx.waker().clone())),
        });
        let bridge_shared = Arc::clone(&shared);
        let token = self.token.clone();
        let signal = self.signal;
        std::thread::Builder::new()
            .name("mooring-signal".into())
            .spawn(move || {
                while !SIGNAL_FLAG.load(Ordering::Relaxed) && !token.stop_requested() {
                    std::thread::sleep(Duration::from_millis(2));
                }
                // SAFETY: restoring the disposition captured at install.
                unsafe { libc::signal(signal, previous) };
                INSTALLED.store(false, Ordering::Release);
                tracing::trace!(signal, "signal handler restored");
                bridge_shared.complete.store(true, Ordering::Release);
                let waker = bridge_shared
                    .waker
                    .lock()
                    .expect("signal waker poisoned")
                    .take();
                if let Some(waker) = waker {
                    waker.wake();
                }
            })
            .expect("failed to spawn signal bridge thread");
        self.shared = Some(shared);
        Poll::Pending
    }
}

impl fmt::Debug for WhenSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhenSignal")
            .field("signal", &self.signal)
            .field("armed", &self.shared.is_some())
            .finish()
    }
}
