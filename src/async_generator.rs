//! Lazy asynchronous generators.
//!
//! Same consumer-driven shape as [`Generator`](crate::Generator), but the
//! producer may await arbitrary futures between yields: the consumer's
//! [`next`](AsyncGenerator::next) forwards its own context into the
//! producer, so a producer parked on a timer or an event wakes the
//! consumer when it can make progress.
//!
//! `next()` resolves to `Some(value)` per yield and `None` once the
//! producer body returns. Dropping the generator cancels the producer.
//!
//! # Example
//!
//! ```
//! use mooring::{sync_wait, AsyncGenerator};
//! use std::time::Duration;
//!
//! let mut gen = AsyncGenerator::new(|y| async move {
//!     for i in 0..3 {
//!         mooring::time::sleep(Duration::from_millis(2)).await;
//!         y.emit(i).await;
//!     }
//! });
//! let values = sync_wait(async move {
//!     let mut out = Vec::new();
//!     while let Some(v) = gen.next().await {
//!         out.push(v);
//!     }
//!     out
//! });
//! assert_eq!(values, vec![0, 1, 2]);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use crate::generator::{ExchangeSlot, Yielder};

/// A lazy asynchronous generator.
#[must_use = "a generator produces nothing until driven"]
pub struct AsyncGenerator<T> {
    producer: Option<Pin<Box<dyn Future<Output = ()> + Send + 'static>>>,
    slot: ExchangeSlot<T>,
}

impl<T: Send + 'static> AsyncGenerator<T> {
    /// Builds a generator from a producer body. The body receives a
    /// [`Yielder`] and may await anything; `emit(v).await` parks it until
    /// the consumer asks for the next value.
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce(Yielder<T>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let slot: ExchangeSlot<T> = Arc::new(Mutex::new(None));
        let yielder = Yielder::for_slot(Arc::clone(&slot));
        Self {
            producer: Some(Box::pin(body(yielder))),
            slot,
        }
    }

    /// Resolves to the next yielded value, or `None` at end of sequence.
    pub fn next(&mut self) -> Next<'_, T> {
        Next { gen: self }
    }
}

impl<T> std::fmt::Debug for AsyncGenerator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncGenerator")
            .field("finished", &self.producer.is_none())
            .finish()
    }
}

/// Future returned by [`AsyncGenerator::next`].
#[must_use = "the producer only advances while next() is awaited"]
pub struct Next<'a, T> {
    gen: &'a mut AsyncGenerator<T>,
}

impl<T> Future for Next<'_, T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let gen = &mut *self.get_mut().gen;
        let Some(producer) = gen.producer.as_mut() else {
            return Poll::Ready(None);
        };
        match producer.as_mut().poll(cx) {
            Poll::Ready(()) => {
                gen.producer = None;
                // A value emitted on the producer's very last poll has
                // already been consumed; finishing always means empty.
                Poll::Ready(None)
            }
            Poll::Pending => {
                let value = gen.slot.lock().expect("generator slot poisoned").take();
                match value {
                    // Parked in emit: a value is ready for us.
                    Some(value) => Poll::Ready(Some(value)),
                    // Parked on a foreign future; it holds our waker.
                    None => Poll::Pending,
                }
            }
        }
    }
}

impl<T> std::fmt::Debug for Next<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}
