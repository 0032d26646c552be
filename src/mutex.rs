//! Async mutex with a lock-free waiter queue.
//!
//! The entire lock state is one atomic word:
//!
//! - null — unlocked;
//! - address `1` — locked, no waiters;
//! - anything else — locked, pointing at the head of an intrusive LIFO
//!   stack of waiter nodes.
//!
//! An acquirer pushes its node with a CAS loop; observing null in the
//! pre-state means it took the lock without queueing. The holder releases
//! either by handing the lock straight to the successor recorded in its
//! own node's `next` (no CAS), or by swapping the whole stack out of the
//! word. The queue is LIFO in the word and approximates FIFO under the
//! hand-off pattern; fairness is not guaranteed.
//!
//! Unlocking an unlocked mutex is unrecoverable state corruption and
//! aborts the process.
//!
//! Successor wakeups go through a pluggable [`Scheduler`]; the default
//! [`SyncScheduler`] wakes in place on the unlocking thread.
//!
//! # Example
//!
//! ```
//! use mooring::{sync_wait, Mutex};
//! use std::sync::Arc;
//!
//! let counter = Arc::new(Mutex::new(0));
//! let shared = Arc::clone(&counter);
//! sync_wait(async move {
//!     let mut guard = shared.lock().await;
//!     *guard += 1;
//! });
//! assert_eq!(sync_wait(async move { *counter.lock().await }), 1);
//! ```

use std::cell::UnsafeCell;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Mutex as StdMutex;
use std::task::{Context, Poll, Waker};

/// Pluggable target for successor wakeups on unlock.
pub trait Scheduler: Clone + Send + Sync + 'static {
    /// Delivers one wakeup. Threading is opaque to the mutex.
    fn schedule(&self, waker: Waker);
}

/// Default scheduler: wake in place on the unlocking thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncScheduler;

impl Scheduler for SyncScheduler {
    fn schedule(&self, waker: Waker) {
        waker.wake();
    }
}

/// Locked-with-no-waiters sentinel. Never dereferenced.
fn locked_sentinel() -> *mut WaiterNode {
    1 as *mut WaiterNode
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    /// Queued, waiting for a grant.
    Waiting,
    /// The lock has been handed to this node; its future owns the node
    /// again and will reclaim it.
    Granted,
    /// The future was dropped while queued; the next granter reclaims the
    /// node and passes the lock onward.
    Abandoned,
}

struct NodeInner {
    state: NodeState,
    waker: Option<Waker>,
}

/// Heap node representing one queued acquirer.
struct WaiterNode {
    /// Pre-state of the push CAS: the rest of the stack, or the locked
    /// sentinel for the bottommost waiter. Written only before the node
    /// is published; ordering rides on the head CAS.
    next: AtomicPtr<WaiterNode>,
    inner: StdMutex<NodeInner>,
}

/// An async mutex guarding `T`, holdable across suspension points.
pub struct Mutex<T> {
    head: AtomicPtr<WaiterNode>,
    data: UnsafeCell<T>,
}

// SAFETY: the data cell is only reachable through a held `UniqueLock`,
// and the word protocol guarantees a single holder at a time.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates an unlocked mutex.
    pub fn new(value: T) -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            data: UnsafeCell::new(value),
        }
    }

    /// Returns true while the lock is held.
    pub fn is_locked(&self) -> bool {
        !self.head.load(Ordering::Acquire).is_null()
    }

    /// Consumes the mutex, returning the data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    /// Returns the data through exclusive access, without locking.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Acquires the lock, suspending while it is contended.
    pub fn lock(&self) -> LockFuture<'_, T, SyncScheduler> {
        self.lock_with(SyncScheduler)
    }

    /// As [`lock`](Self::lock), delivering the eventual unlock hand-off
    /// through `scheduler`.
    pub fn lock_with<S: Scheduler>(&self, scheduler: S) -> LockFuture<'_, T, S> {
        LockFuture {
            mutex: self,
            scheduler: Some(scheduler),
            state: LockState::Init,
        }
    }

    /// Attempts the uncontended fast path without queueing.
    pub fn try_lock(&self) -> Option<UniqueLock<'_, T, SyncScheduler>> {
        if self
            .head
            .compare_exchange(
                ptr::null_mut(),
                locked_sentinel(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            return Some(UniqueLock {
                mutex: self,
                chain: ptr::null_mut(),
                scheduler: SyncScheduler,
            });
        }
        None
    }

    /// Pushes an acquirer's node, returning the observed pre-state:
    /// null means the caller took the lock and the node was never
    /// published; anything else means the caller is queued as the new
    /// head.
    fn push(&self, node: *mut WaiterNode) -> *mut WaiterNode {
        let mut observed = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: the node is unpublished; this thread still owns it
            // exclusively.
            unsafe { (*node).next.store(observed, Ordering::Relaxed) };
            let replacement = if observed.is_null() {
                locked_sentinel()
            } else {
                node
            };
            match self.head.compare_exchange_weak(
                observed,
                replacement,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return observed,
                Err(current) => observed = current,
            }
        }
    }

    /// Swaps the waiter stack out of the word. Returns the old head: the
    /// locked sentinel means the mutex is now free; anything else is the
    /// stack of waiters whose first node receives the lock.
    ///
    /// Aborts if the word says unlocked: the caller claims to hold a lock
    /// that is not held, and no local recovery is possible.
    fn pop_waiters(&self) -> *mut WaiterNode {
        let mut observed = self.head.load(Ordering::Relaxed);
        loop {
            if observed.is_null() {
                std::process::abort();
            }
            let replacement = if observed == locked_sentinel() {
                ptr::null_mut()
            } else {
                locked_sentinel()
            };
            match self.head.compare_exchange_weak(
                observed,
                replacement,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return observed,
                Err(current) => observed = current,
            }
        }
    }

    /// Releases the lock held with `chain` as the known successor state.
    fn release<S: Scheduler>(&self, chain: *mut WaiterNode, scheduler: &S) {
        if chain.is_null() || chain == locked_sentinel() {
            let waiters = self.pop_waiters();
            if waiters != locked_sentinel() {
                self.grant(waiters, scheduler);
            }
        } else {
            // Direct hand-off to the successor observed at lock time; the
            // head word is left alone.
            tracing::trace!("mutex fast-path hand-off");
            self.grant(chain, scheduler);
        }
    }

    /// Hands the lock to the first live node of `node_ptr`'s chain,
    /// reclaiming abandoned nodes along the way.
    fn grant<S: Scheduler>(&self, mut node_ptr: *mut WaiterNode, scheduler: &S) {
        loop {
            // SAFETY: the node is published and this thread is the unique
            // granter for it; abandoned nodes are freed exactly once here.
            let node = unsafe { &*node_ptr };
            let next = node.next.load(Ordering::Relaxed);
            let mut inner = node.inner.lock().expect("waiter node poisoned");
            match inner.state {
                NodeState::Waiting => {
                    inner.state = NodeState::Granted;
                    let waker = inner.waker.take();
                    drop(inner);
                    if let Some(waker) = waker {
                        scheduler.schedule(waker);
                    }
                    return;
                }
                NodeState::Abandoned => {
                    drop(inner);
                    // SAFETY: the abandoning future gave up ownership and
                    // never touches the node again.
                    drop(unsafe { Box::from_raw(node_ptr) });
                    if next == locked_sentinel() {
                        let waiters = self.pop_waiters();
                        if waiters == locked_sentinel() {
                            return;
                        }
                        node_ptr = waiters;
                    } else {
                        node_ptr = next;
                    }
                }
                NodeState::Granted => {
                    unreachable!("lock granted to a node twice")
                }
            }
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutex")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy)]
enum LockState {
    Init,
    Queued(*mut WaiterNode),
    Done,
}

/// Future returned by [`Mutex::lock`] / [`when_locked`].
#[must_use = "the lock is only acquired when the future is awaited"]
pub struct LockFuture<'a, T, S: Scheduler> {
    mutex: &'a Mutex<T>,
    scheduler: Option<S>,
    state: LockState,
}

// SAFETY: the queued node pointer is either owned by this future (before
// publication, after a grant) or by the queue; the hand-off points are
// synchronized through the node's mutex.
unsafe impl<T: Send, S: Scheduler> Send for LockFuture<'_, T, S> {}

// The node lives on the heap; nothing is pinned through the future's own
// fields.
impl<T, S: Scheduler> Unpin for LockFuture<'_, T, S> {}

impl<'a, T, S: Scheduler> Future for LockFuture<'a, T, S> {
    type Output = UniqueLock<'a, T, S>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.state {
            LockState::Init => {
                let node = Box::into_raw(Box::new(WaiterNode {
                    next: AtomicPtr::new(ptr::null_mut()),
                    inner: StdMutex::new(NodeInner {
                        state: NodeState::Waiting,
                        waker: Some(cx.waker().clone()),
                    }),
                }));
                let observed = self.mutex.push(node);
                if observed.is_null() {
                    // Uncontended: the node was never published.
                    // SAFETY: sole owner of an unpublished node.
                    drop(unsafe { Box::from_raw(node) });
                    self.state = LockState::Done;
                    return Poll::Ready(UniqueLock {
                        mutex: self.mutex,
                        chain: ptr::null_mut(),
                        scheduler: self.scheduler.take().expect("lock future scheduler taken"),
                    });
                }
                self.state = LockState::Queued(node);
                Poll::Pending
            }
            LockState::Queued(node_ptr) => {
                // SAFETY: the node stays allocated until either this
                // future reclaims it (below) or abandons it in drop.
                let node = unsafe { &*node_ptr };
                let mut inner = node.inner.lock().expect("waiter node poisoned");
                match inner.state {
                    NodeState::Granted => {
                        drop(inner);
                        let chain = node.next.load(Ordering::Relaxed);
                        // SAFETY: the grant returned ownership to us.
                        drop(unsafe { Box::from_raw(node_ptr) });
                        self.state = LockState::Done;
                        Poll::Ready(UniqueLock {
                            mutex: self.mutex,
                            chain,
                            scheduler: self.scheduler.take().expect("lock future scheduler taken"),
                        })
                    }
                    NodeState::Waiting => {
                        inner.waker = Some(cx.waker().clone());
                        Poll::Pending
                    }
                    NodeState::Abandoned => {
                        unreachable!("live lock future found its node abandoned")
                    }
                }
            }
            LockState::Done => panic!("lock future polled after completion"),
        }
    }
}

impl<T, S: Scheduler> Drop for LockFuture<'_, T, S> {
    fn drop(&mut self) {
        let LockState::Queued(node_ptr) = self.state else {
            return;
        };
        // SAFETY: node is live; ownership is decided under its mutex.
        let node = unsafe { &*node_ptr };
        let mut inner = node.inner.lock().expect("waiter node poisoned");
        match inner.state {
            NodeState::Waiting => {
                // Leave the node to the queue; the granter reclaims it.
                inner.state = NodeState::Abandoned;
                inner.waker = None;
            }
            NodeState::Granted => {
                // The hand-off won the race against this drop: the lock is
                // ours, so release it onward.
                drop(inner);
                let chain = node.next.load(Ordering::Relaxed);
                // SAFETY: the grant returned ownership to us.
                drop(unsafe { Box::from_raw(node_ptr) });
                let scheduler = self.scheduler.take().expect("lock future scheduler taken");
                self.mutex.release(chain, &scheduler);
            }
            NodeState::Abandoned => unreachable!("lock future abandoned twice"),
        }
    }
}

/// Exclusive lock guard, releasing on drop.
///
/// Holds the successor chain observed at lock time; dropping the guard
/// hands the lock to that successor directly when one is known.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct UniqueLock<'a, T, S: Scheduler = SyncScheduler> {
    mutex: &'a Mutex<T>,
    chain: *mut WaiterNode,
    scheduler: S,
}

// SAFETY: the guard represents exclusive ownership of the data and of the
// successor chain pointer.
unsafe impl<T: Send, S: Scheduler> Send for UniqueLock<'_, T, S> {}
unsafe impl<T: Send + Sync, S: Scheduler> Sync for UniqueLock<'_, T, S> {}

impl<T, S: Scheduler> UniqueLock<'_, T, S> {
    /// Releases the lock now instead of at end of scope.
    pub fn unlock(self) {
        drop(self);
    }
}

impl<T, S: Scheduler> Deref for UniqueLock<'_, T, S> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock; the protocol guarantees a
        // single holder.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T, S: Scheduler> DerefMut for UniqueLock<'_, T, S> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as in `deref`, plus exclusive access through `&mut self`.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T, S: Scheduler> Drop for UniqueLock<'_, T, S> {
    fn drop(&mut self) {
        self.mutex.release(self.chain, &self.scheduler);
    }
}

impl<T: std::fmt::Debug, S: Scheduler> std::fmt::Debug for UniqueLock<'_, T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniqueLock").field("data", &**self).finish()
    }
}

/// Acquires `mutex`, waking the eventual successor in place.
pub fn when_locked<T>(mutex: &Mutex<T>) -> LockFuture<'_, T, SyncScheduler> {
    mutex.lock()
}

/// Acquires `mutex`, delivering unlock hand-offs through `scheduler`.
pub fn when_locked_with<T, S: Scheduler>(mutex: &Mutex<T>, scheduler: S) -> LockFuture<'_, T, S> {
    mutex.lock_with(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync_wait;
    use crate::test_utils::poll_once;
    use std::sync::Arc;

    #[test]
    fn uncontended_lock_is_immediate() {
        let mutex = Mutex::new(5);
        let mut fut = mutex.lock();
        match poll_once(&mut fut) {
            Poll::Ready(guard) => assert_eq!(*guard, 5),
            Poll::Pending => panic!("uncontended lock should be ready"),
        }
    }

    #[test]
    fn guard_gives_mutable_access() {
        let mutex = Mutex::new(1);
        {
            let mut fut = mutex.lock();
            let Poll::Ready(mut guard) = poll_once(&mut fut) else {
                panic!("lock should be ready");
            };
            *guard = 9;
        }
        assert_eq!(mutex.into_inner(), 9);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let mutex = Mutex::new(0);
        let guard = mutex.try_lock().expect("uncontended try_lock");
        assert!(mutex.is_locked());
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(!mutex.is_locked());
    }

    #[test]
    fn contended_lock_queues_and_hands_off() {
        let mutex = Arc::new(Mutex::new(0));
        let guard = mutex.try_lock().expect("first lock");

        let mut waiting = mutex.lock();
        assert!(poll_once(&mut waiting).is_pending());
        assert!(mutex.is_locked());

        drop(guard);
        match poll_once(&mut waiting) {
            Poll::Ready(second) => drop(second),
            Poll::Pending => panic!("hand-off should have granted the lock"),
        }
        assert!(!mutex.is_locked());
    }

    #[test]
    fn dropped_waiter_passes_the_lock_onward() {
        let mutex = Arc::new(Mutex::new(0));
        let guard = mutex.try_lock().expect("first lock");

        let mut abandoned = mutex.lock();
        assert!(poll_once(&mut abandoned).is_pending());
        let mut surviving = mutex.lock();
        assert!(poll_once(&mut surviving).is_pending());

        drop(abandoned);
        drop(guard);

        match poll_once(&mut surviving) {
            Poll::Ready(next) => drop(next),
            Poll::Pending => panic!("lock should skip the abandoned waiter"),
        }
        assert!(!mutex.is_locked());
    }

    #[test]
    fn threads_contending_preserve_every_increment() {
        const THREADS: usize = 4;
        const ITERS: usize = 250;

        let mutex = Arc::new(Mutex::new(0_u64));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                std::thread::spawn(move || {
                    for _ in 0..ITERS {
                        let mutex = Arc::clone(&mutex);
                        sync_wait(async move {
                            let mut guard = mutex.lock().await;
                            *guard += 1;
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker panicked");
        }

        let total = Arc::clone(&mutex);
        assert_eq!(
            sync_wait(async move { *total.lock().await }),
            (THREADS * ITERS) as u64
        );
    }
}
