//! One-shot cross-task rendezvous.
//!
//! A [`SingleEvent`] carries exactly one value from exactly one sender to
//! at most one awaiter. State is a single atomic byte of independently
//! settable bits; every transition is an acq_rel read-modify-write, and
//! each bit's pre-state tells the mutating side exactly which cell it may
//! touch:
//!
//! - `HAS_SENDER` — set while a sender handle exists. A second attach
//!   fails. Cleared on sender drop; if no value was ever produced the
//!   awaiter is woken to observe `NoSender`.
//! - `HAS_VALUE` — set after the value cell is written. The sender only
//!   reads the waker cell when the pre-state shows `HAS_AWAITER`.
//! - `HAS_AWAITER` — set after the waker cell is written. The awaiter
//!   only re-enters the waker cell after clearing this bit and finding
//!   the pre-state not yet ready.
//! - `CLAIMED` — permanent mark of the first wait future; a second
//!   concurrent waiter fails instead of racing on the waker cell.
//!
//! # Example
//!
//! ```
//! use mooring::{sync_wait, SingleEvent};
//! use std::sync::Arc;
//!
//! let event = Arc::new(SingleEvent::new());
//! let sender = SingleEvent::sender(&event).unwrap();
//! std::thread::spawn(move || sender.send(5));
//! assert_eq!(sync_wait(SingleEvent::wait(&event)).unwrap(), 5);
//! ```

use core::fmt;
use std::cell::UnsafeCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Domain failures of the one-shot rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleEventError {
    /// A sender handle already exists for this event.
    SenderAlreadyAttached,
    /// A wait future already exists for this event.
    AwaiterAlreadyAttached,
    /// The sender was dropped without producing a value.
    NoSender,
}

impl fmt::Display for SingleEventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SenderAlreadyAttached => write!(f, "sender already exists"),
            Self::AwaiterAlreadyAttached => write!(f, "awaiter already exists"),
            Self::NoSender => write!(f, "no sender"),
        }
    }
}

impl std::error::Error for SingleEventError {}

const HAS_SENDER: u8 = 0x1;
const HAS_VALUE: u8 = 0x2;
const HAS_AWAITER: u8 = 0x4;
const CLAIMED: u8 = 0x8;

/// A one-shot typed rendezvous between one sender and one awaiter.
pub struct SingleEvent<T> {
    state: AtomicU8,
    value: UnsafeCell<Option<T>>,
    waker: UnsafeCell<Option<Waker>>,
}

// SAFETY: the value and waker cells are only ever accessed inside the
// exclusive windows established by the acq_rel RMWs on `state` (see the
// module docs); with `T: Send` the event may be shared across threads.
unsafe impl<T: Send> Sync for SingleEvent<T> {}
unsafe impl<T: Send> Send for SingleEvent<T> {}

impl<T> Default for SingleEvent<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleEvent<T> {
    /// Creates an event with no sender and no value.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(0),
            value: UnsafeCell::new(None),
            waker: UnsafeCell::new(None),
        }
    }

    /// Attaches the single sender.
    ///
    /// # Errors
    ///
    /// Fails if a sender already exists (including one that already sent:
    /// the entitlement is never re-issued).
    pub fn sender(event: &Arc<Self>) -> Result<EventSender<T>, SingleEventError> {
        let pre = event.state.fetch_or(HAS_SENDER, Ordering::AcqRel);
        if pre & HAS_SENDER != 0 {
            return Err(SingleEventError::SenderAlreadyAttached);
        }
        Ok(EventSender {
            event: Some(Arc::clone(event)),
        })
    }

    /// Returns the future observing this event.
    ///
    /// At most one wait future may exist; a second one resolves to
    /// [`SingleEventError::AwaiterAlreadyAttached`].
    pub fn wait(event: &Arc<Self>) -> EventFuture<T> {
        EventFuture {
            event: Arc::clone(event),
            claimed: false,
        }
    }

    const fn is_ready(state: u8) -> bool {
        state & HAS_VALUE != 0 || state & HAS_SENDER == 0
    }

    /// Wakes the awaiter if `pre` (the pre-state of the RMW that made the
    /// event ready) shows one is registered.
    fn wake_awaiter(&self, pre: u8) {
        if pre & HAS_AWAITER != 0 {
            // SAFETY: the awaiter published the waker before OR-ing
            // HAS_AWAITER; the RMW that produced `pre` ordered that write
            // before this read, and the awaiter re-enters the cell only
            // after clearing the bit, which it cannot have done between
            // our RMW and now because the event is already ready.
            let waker = unsafe { (*self.waker.get()).take() };
            if let Some(waker) = waker {
                waker.wake();
            }
        }
    }

    fn deposit(&self, value: T) {
        // SAFETY: only the single sender writes this cell, exactly once,
        // before OR-ing HAS_VALUE; the awaiter reads it only after
        // observing HAS_VALUE.
        unsafe { *self.value.get() = Some(value) };
        let pre = self.state.fetch_or(HAS_VALUE, Ordering::AcqRel);
        self.wake_awaiter(pre);
    }

    fn release_sender(&self) {
        let pre = self.state.fetch_and(!HAS_SENDER, Ordering::AcqRel);
        if pre & HAS_VALUE != 0 {
            return;
        }
        tracing::trace!("single event sender dropped without a value");
        self.wake_awaiter(pre);
    }
}

impl<T> fmt::Debug for SingleEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load(Ordering::Acquire);
        f.debug_struct("SingleEvent")
            .field("has_sender", &(state & HAS_SENDER != 0))
            .field("has_value", &(state & HAS_VALUE != 0))
            .field("has_awaiter", &(state & HAS_AWAITER != 0))
            .finish()
    }
}

/// The single send entitlement of a [`SingleEvent`].
///
/// Move-only; moving the sender transfers the entitlement. Sending
/// consumes it, so a double set is unrepresentable. Dropping it unsent
/// surfaces [`SingleEventError::NoSender`] to the awaiter.
#[derive(Debug)]
pub struct EventSender<T> {
    event: Option<Arc<SingleEvent<T>>>,
}

impl<T> EventSender<T> {
    /// Deposits the value and wakes the awaiter, if any.
    pub fn send(mut self, value: T) {
        let event = self.event.take().expect("sender entitlement already used");
        event.deposit(value);
        // The sender bit stays set: a deposited value means "a sender
        // existed and delivered", which is what the awaiter checks.
    }
}

impl<T> Drop for EventSender<T> {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            event.release_sender();
        }
    }
}

/// Future returned by [`SingleEvent::wait`].
#[must_use = "the event is only observed when the future is awaited"]
pub struct EventFuture<T> {
    event: Arc<SingleEvent<T>>,
    claimed: bool,
}

impl<T> EventFuture<T> {
    /// Takes the rendezvous outcome after the event became ready.
    fn conclude(&self) -> Result<T, SingleEventError> {
        let state = self.event.state.load(Ordering::Acquire);
        if state & HAS_VALUE != 0 {
            // SAFETY: HAS_VALUE was observed with acquire ordering, so the
            // sender's write to the cell happened-before this read, and
            // the sender never touches the cell again.
            let value = unsafe { (*self.event.value.get()).take() };
            return value.ok_or(SingleEventError::NoSender);
        }
        Err(SingleEventError::NoSender)
    }
}

impl<T> Future for EventFuture<T> {
    type Output = Result<T, SingleEventError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let state = self.event.state.load(Ordering::Acquire);

        if !self.claimed {
            if state & CLAIMED != 0 {
                return Poll::Ready(Err(SingleEventError::AwaiterAlreadyAttached));
            }
            let pre = self.event.state.fetch_or(CLAIMED, Ordering::AcqRel);
            if pre & CLAIMED != 0 {
                return Poll::Ready(Err(SingleEventError::AwaiterAlreadyAttached));
            }
            self.claimed = true;
        } else {
            if SingleEvent::<T>::is_ready(state) {
                return Poll::Ready(self.conclude());
            }
            // Reclaim the waker cell for update. If the event became
            // ready first, the cell is no longer ours to touch.
            let pre = self.event.state.fetch_and(!HAS_AWAITER, Ordering::AcqRel);
            if SingleEvent::<T>::is_ready(pre) {
                return Poll::Ready(self.conclude());
            }
        }

        // SAFETY: HAS_AWAITER is clear (either never set, or cleared by
        // the RMW above with a not-ready pre-state), so the sender will
        // not read the cell until the OR below republishes it.
        unsafe { *self.event.waker.get() = Some(cx.waker().clone()) };
        let pre = self.event.state.fetch_or(HAS_AWAITER, Ordering::AcqRel);
        if SingleEvent::<T>::is_ready(pre) {
            return Poll::Ready(self.conclude());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync_wait;
    use crate::test_utils::poll_once;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn value_before_wait_is_ready_immediately() {
        let event = Arc::new(SingleEvent::new());
        let sender = SingleEvent::sender(&event).unwrap();
        sender.send(42);
        let mut wait = SingleEvent::wait(&event);
        match poll_once(&mut wait) {
            Poll::Ready(Ok(v)) => assert_eq!(v, 42),
            other => panic!("expected ready value, got {other:?}"),
        }
    }

    #[test]
    fn double_attach_fails() {
        let event: Arc<SingleEvent<i32>> = Arc::new(SingleEvent::new());
        let _sender = SingleEvent::sender(&event).unwrap();
        assert_eq!(
            SingleEvent::sender(&event).unwrap_err(),
            SingleEventError::SenderAlreadyAttached
        );
    }

    #[test]
    fn attach_after_send_fails() {
        let event = Arc::new(SingleEvent::new());
        SingleEvent::sender(&event).unwrap().send(1);
        assert_eq!(
            SingleEvent::sender(&event).unwrap_err(),
            SingleEventError::SenderAlreadyAttached
        );
    }

    #[test]
    fn sender_drop_without_value_raises_no_sender() {
        let event: Arc<SingleEvent<i32>> = Arc::new(SingleEvent::new());
        let sender = SingleEvent::sender(&event).unwrap();
        drop(sender);
        let mut wait = SingleEvent::wait(&event);
        match poll_once(&mut wait) {
            Poll::Ready(Err(SingleEventError::NoSender)) => {}
            other => panic!("expected NoSender, got {other:?}"),
        }
    }

    #[test]
    fn wait_with_no_sender_ever_is_ready() {
        let event: Arc<SingleEvent<i32>> = Arc::new(SingleEvent::new());
        let mut wait = SingleEvent::wait(&event);
        match poll_once(&mut wait) {
            Poll::Ready(Err(SingleEventError::NoSender)) => {}
            other => panic!("expected NoSender, got {other:?}"),
        }
    }

    #[test]
    fn second_waiter_fails() {
        let event: Arc<SingleEvent<i32>> = Arc::new(SingleEvent::new());
        let _sender = SingleEvent::sender(&event).unwrap();
        let mut first = SingleEvent::wait(&event);
        assert!(poll_once(&mut first).is_pending());
        let mut second = SingleEvent::wait(&event);
        match poll_once(&mut second) {
            Poll::Ready(Err(SingleEventError::AwaiterAlreadyAttached)) => {}
            other => panic!("expected AwaiterAlreadyAttached, got {other:?}"),
        }
    }

    #[test]
    fn cross_thread_rendezvous() {
        let event = Arc::new(SingleEvent::new());
        let sender = SingleEvent::sender(&event).unwrap();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(15));
            sender.send("payload");
        });
        let value = sync_wait(SingleEvent::wait(&event)).unwrap();
        assert_eq!(value, "payload");
        producer.join().unwrap();
    }

    #[test]
    fn cross_thread_sender_drop_wakes_waiter() {
        let event: Arc<SingleEvent<i32>> = Arc::new(SingleEvent::new());
        let sender = SingleEvent::sender(&event).unwrap();
        let dropper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(15));
            drop(sender);
        });
        let outcome = sync_wait(SingleEvent::wait(&event));
        assert_eq!(outcome.unwrap_err(), SingleEventError::NoSender);
        dropper.join().unwrap();
    }

    #[test]
    fn moved_sender_keeps_entitlement() {
        let event = Arc::new(SingleEvent::new());
        let sender = SingleEvent::sender(&event).unwrap();
        let moved = sender;
        moved.send(3);
        assert_eq!(sync_wait(SingleEvent::wait(&event)).unwrap(), 3);
    }

    #[test]
    fn error_display() {
        assert_eq!(
            SingleEventError::SenderAlreadyAttached.to_string(),
            "sender already exists"
        );
        assert_eq!(SingleEventError::NoSender.to_string(), "no sender");
    }
}
