//! Lazy synchronous generators.
//!
//! A [`Generator`] is a producer coroutine driven by its consumer's
//! `Iterator::next`: the producer runs until it parks in
//! [`Yielder::emit`], the consumer takes the emitted value, and the next
//! `next()` resumes the producer where it stopped. The producer is built
//! from an `async` closure, but it must suspend *only* at `emit` — a sync
//! generator has no one to wait on.
//!
//! Values are moved into the exchange slot, so the consumer always
//! receives an owned `T` that stays valid regardless of what the producer
//! does next. Dropping the generator cancels the producer mid-body and
//! runs its drop guards.
//!
//! # Example
//!
//! ```
//! use mooring::Generator;
//!
//! let gen = Generator::new(|y| async move {
//!     for i in 0..3 {
//!         y.emit(i * 10).await;
//!     }
//! });
//! assert_eq!(gen.collect::<Vec<_>>(), vec![0, 10, 20]);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use crate::util::noop_waker;

pub(crate) type ExchangeSlot<T> = Arc<Mutex<Option<T>>>;

/// Producer-side handle: the only legal suspension point of a sync
/// generator body.
pub struct Yielder<T> {
    slot: ExchangeSlot<T>,
}

impl<T> Yielder<T> {
    pub(crate) fn for_slot(slot: ExchangeSlot<T>) -> Self {
        Self { slot }
    }

    /// Hands `value` to the consumer and parks the producer until the
    /// consumer asks for the next value.
    pub fn emit(&self, value: T) -> Emit<T> {
        Emit {
            slot: Arc::clone(&self.slot),
            value: Some(value),
        }
    }
}

impl<T> std::fmt::Debug for Yielder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Yielder").finish_non_exhaustive()
    }
}

/// Future returned by [`Yielder::emit`]. Deposits the value on its first
/// poll and suspends exactly once.
pub struct Emit<T> {
    slot: ExchangeSlot<T>,
    value: Option<T>,
}

// The pending value is stored by value and moved out whole; nothing is
// ever pinned through it.
impl<T> Unpin for Emit<T> {}

impl<T> Future for Emit<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match this.value.take() {
            Some(value) => {
                let mut slot = this.slot.lock().expect("generator slot poisoned");
                debug_assert!(slot.is_none(), "emitted over an unconsumed value");
                *slot = Some(value);
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}

impl<T> std::fmt::Debug for Emit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emit")
            .field("deposited", &self.value.is_none())
            .finish()
    }
}

/// A lazy synchronous generator; consume it as an [`Iterator`].
#[must_use = "a generator produces nothing until iterated"]
pub struct Generator<T> {
    producer: Option<Pin<Box<dyn Future<Output = ()> + Send + 'static>>>,
    slot: ExchangeSlot<T>,
}

impl<T: Send + 'static> Generator<T> {
    /// Builds a generator from a producer body. The body receives the
    /// [`Yielder`] and runs lazily: nothing executes until the first
    /// `next()`.
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce(Yielder<T>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let slot: ExchangeSlot<T> = Arc::new(Mutex::new(None));
        let yielder = Yielder {
            slot: Arc::clone(&slot),
        };
        Self {
            producer: Some(Box::pin(body(yielder))),
            slot,
        }
    }
}

impl<T> Iterator for Generator<T> {
    type Item = T;

    /// Resumes the producer until it emits or finishes.
    ///
    /// # Panics
    ///
    /// Propagates the producer's panic, and panics if the producer
    /// suspends on anything other than [`Yielder::emit`].
    fn next(&mut self) -> Option<T> {
        let producer = self.producer.as_mut()?;
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        match producer.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                self.producer = None;
                None
            }
            Poll::Pending => {
                let value = self.slot.lock().expect("generator slot poisoned").take();
                Some(value.expect(
                    "sync generator suspended on a foreign future; only emit().await may suspend",
                ))
            }
        }
    }
}

impl<T> std::fmt::Debug for Generator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("finished", &self.producer.is_none())
            .finish()
    }
}
