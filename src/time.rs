//! Deadline futures: `sleep`, `sleep_until` and `timeout`.
//!
//! A single lazily started driver thread owns a heap of pending
//! deadlines and wakes each sleeper from that thread when its time
//! arrives. This is the delay primitive the tests, benches and examples
//! lean on; it is a consumer of the awaitable model, not part of the
//! combinator core — any reactor that wakes a `Waker` at the right time
//! can take its place.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

struct SleepShared {
    fired: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl SleepShared {
    fn fire(&self) {
        self.fired.store(true, Ordering::Release);
        let waker = self.waker.lock().expect("sleep waker poisoned").take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    waiter: Arc<SleepShared>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

struct DriverShared {
    queue: Mutex<BinaryHeap<Reverse<TimerEntry>>>,
    cv: Condvar,
    seq: AtomicU64,
}

fn driver() -> &'static Arc<DriverShared> {
    static DRIVER: OnceLock<Arc<DriverShared>> = OnceLock::new();
    DRIVER.get_or_init(|| {
        let shared = Arc::new(DriverShared {
            queue: Mutex::new(BinaryHeap::new()),
            cv: Condvar::new(),
            seq: AtomicU64::new(0),
        });
        let for_thread = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("mooring-timer".into())
            .spawn(move || driver_loop(&for_thread))
            .expect("failed to spawn timer thread");
        shared
    })
}

fn driver_loop(shared: &DriverShared) {
    let mut queue = shared.queue.lock().expect("timer queue poisoned");
    loop {
        let now = Instant::now();
        let mut due = Vec::new();
        while queue
            .peek()
            .is_some_and(|Reverse(entry)| entry.deadline <= now)
        {
            let Some(Reverse(entry)) = queue.pop() else {
                break;
            };
            due.push(entry);
        }
        if !due.is_empty() {
            // Fire outside the lock; a woken sleeper may immediately
            // register a new deadline.
            drop(queue);
            for entry in due {
                entry.waiter.fire();
            }
            queue = shared.queue.lock().expect("timer queue poisoned");
            continue;
        }
        let next_deadline = queue.peek().map(|Reverse(entry)| entry.deadline);
        queue = match next_deadline {
            Some(deadline) => {
                let pause = deadline.saturating_duration_since(now);
                shared
                    .cv
                    .wait_timeout(queue, pause)
                    .expect("timer queue poisoned")
                    .0
            }
            None => shared.cv.wait(queue).expect("timer queue poisoned"),
        };
    }
}

fn register(deadline: Instant, waiter: Arc<SleepShared>) {
    let shared = driver();
    let seq = shared.seq.fetch_add(1, Ordering::Relaxed);
    {
        let mut queue = shared.queue.lock().expect("timer queue poisoned");
        queue.push(Reverse(TimerEntry {
            deadline,
            seq,
            waiter,
        }));
    }
    shared.cv.notify_one();
}

/// Completes once `duration` has elapsed.
pub fn sleep(duration: Duration) -> Sleep {
    sleep_until(Instant::now() + duration)
}

/// Completes once `deadline` has passed.
pub fn sleep_until(deadline: Instant) -> Sleep {
    Sleep {
        deadline,
        shared: None,
    }
}

/// Future returned by [`sleep`] / [`sleep_until`].
#[must_use = "a sleep does nothing until awaited"]
pub struct Sleep {
    deadline: Instant,
    shared: Option<Arc<SleepShared>>,
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if let Some(shared) = &self.shared {
            if shared.fired.load(Ordering::Acquire) {
                return Poll::Ready(());
            }
            *shared.waker.lock().expect("sleep waker poisoned") = Some(cx.waker().clone());
            if shared.fired.load(Ordering::Acquire) {
                return Poll::Ready(());
            }
            return Poll::Pending;
        }

        if Instant::now() >= self.deadline {
            return Poll::Ready(());
        }
        let shared = Arc::new(SleepShared {
            fired: AtomicBool::new(false),
            waker: Mutex::new(Some(cx.waker().clone())),
        });
        register(self.deadline, Arc::clone(&shared));
        self.shared = Some(shared);
        Poll::Pending
    }
}

impl std::fmt::Debug for Sleep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sleep")
            .field("deadline", &self.deadline)
            .finish()
    }
}

/// Error returned by [`timeout`] when the deadline fires first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed;

impl std::fmt::Display for Elapsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "deadline elapsed")
    }
}

impl std::error::Error for Elapsed {}

/// Bounds `future` by `duration`; the inner future is dropped if the
/// deadline fires first.
pub fn timeout<F: Future>(duration: Duration, future: F) -> Timeout<F> {
    Timeout {
        future: Box::pin(future),
        sleep: sleep(duration),
    }
}

/// Future returned by [`timeout`].
#[must_use = "a timeout does nothing until awaited"]
pub struct Timeout<F> {
    future: Pin<Box<F>>,
    sleep: Sleep,
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output, Elapsed>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Poll::Ready(value) = self.future.as_mut().poll(cx) {
            return Poll::Ready(Ok(value));
        }
        match Pin::new(&mut self.sleep).poll(cx) {
            Poll::Ready(()) => Poll::Ready(Err(Elapsed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<F> std::fmt::Debug for Timeout<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeout")
            .field("sleep", &self.sleep)
            .finish_non_exhaustive()
    }
}
