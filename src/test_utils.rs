//! Shared helpers for unit and integration tests.
//!
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - Poll-level helpers (`noop_waker`, `poll_once`)
//! - [`TestPool`]: a small fixed-size thread pool implementing
//!   [`Scheduler`], for tests that need work to hop across threads
//!
//! # Example
//! ```
//! use mooring::test_utils::{init_test_logging, poll_once};
//!
//! init_test_logging();
//! let mut fut = std::future::ready(1);
//! assert!(poll_once(&mut fut).is_ready());
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, Once};
use std::task::{Context, Poll, Waker};

use crate::mutex::Scheduler;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .try_init();
    });
}

/// A waker that does nothing, for poll-level tests.
#[must_use]
pub fn noop_waker() -> Waker {
    crate::util::noop_waker()
}

/// Polls a future once with a noop waker.
pub fn poll_once<F>(fut: &mut F) -> Poll<F::Output>
where
    F: Future + Unpin,
{
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    Pin::new(fut).poll(&mut cx)
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

struct PoolInner {
    queue: Mutex<PoolQueue>,
    cv: Condvar,
}

struct PoolQueue {
    wakers: VecDeque<Waker>,
    shutdown: bool,
}

/// A fixed-size thread pool delivering wakeups from its worker threads.
///
/// Implements the mutex's [`Scheduler`] seam and doubles as a way to move
/// test work onto other threads via [`PoolScheduler::run_on`].
pub struct TestPool {
    inner: Arc<PoolInner>,
    workers: Vec<std::thread::JoinHandle<()>>,
}

impl TestPool {
    /// Spawns `size` worker threads.
    #[must_use]
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "pool needs at least one worker");
        let inner = Arc::new(PoolInner {
            queue: Mutex::new(PoolQueue {
                wakers: VecDeque::new(),
                shutdown: false,
            }),
            cv: Condvar::new(),
        });
        let workers = (0..size)
            .map(|index| {
                let inner = Arc::clone(&inner);
                std::thread::Builder::new()
                    .name(format!("mooring-test-pool-{index}"))
                    .spawn(move || worker_loop(&inner))
                    .expect("failed to spawn pool worker")
            })
            .collect();
        Self { inner, workers }
    }

    /// Returns a cloneable scheduler handle onto this pool.
    #[must_use]
    pub fn scheduler(&self) -> PoolScheduler {
        PoolScheduler {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for TestPool {
    fn drop(&mut self) {
        {
            let mut queue = self.inner.queue.lock().expect("pool queue poisoned");
            queue.shutdown = true;
        }
        self.inner.cv.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for TestPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestPool")
            .field("workers", &self.workers.len())
            .finish()
    }
}

fn worker_loop(inner: &PoolInner) {
    let mut queue = inner.queue.lock().expect("pool queue poisoned");
    loop {
        if let Some(waker) = queue.wakers.pop_front() {
            drop(queue);
            waker.wake();
            queue = inner.queue.lock().expect("pool queue poisoned");
            continue;
        }
        if queue.shutdown {
            return;
        }
        queue = inner.cv.wait(queue).expect("pool queue poisoned");
    }
}

/// Cloneable handle scheduling wakeups onto a [`TestPool`].
#[derive(Clone)]
pub struct PoolScheduler {
    inner: Arc<PoolInner>,
}

impl PoolScheduler {
    /// Returns a future that resumes its awaiter on a pool worker thread.
    #[must_use]
    pub fn run_on(&self) -> RunOn {
        RunOn {
            scheduler: self.clone(),
            moved: false,
        }
    }
}

impl Scheduler for PoolScheduler {
    fn schedule(&self, waker: Waker) {
        let mut queue = self.inner.queue.lock().expect("pool queue poisoned");
        if queue.shutdown {
            drop(queue);
            waker.wake();
            return;
        }
        queue.wakers.push_back(waker);
        drop(queue);
        self.inner.cv.notify_one();
    }
}

impl std::fmt::Debug for PoolScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolScheduler").finish_non_exhaustive()
    }
}

/// Future returned by [`PoolScheduler::run_on`].
#[must_use = "nothing moves to the pool until the future is awaited"]
#[derive(Debug)]
pub struct RunOn {
    scheduler: PoolScheduler,
    moved: bool,
}

impl Future for RunOn {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.moved {
            return Poll::Ready(());
        }
        self.moved = true;
        self.scheduler.schedule(cx.waker().clone());
        Poll::Pending
    }
}
