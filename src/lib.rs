//! Mooring: structured concurrency primitives for async Rust.
//!
//! # Overview
//!
//! Mooring is a lock-light family of awaitables whose lifetimes and
//! failure outcomes compose structurally: tasks are lazy and consumed
//! exactly once, scopes do not complete while children are running, and
//! combinators resume their awaiter only when teardown is safe. The
//! crate owns no threads — a computation resumes on whichever thread
//! invokes its waker, and the blocking bridge, timers and test pool are
//! consumers of that model rather than a runtime underneath it.
//!
//! # Core Guarantees
//!
//! - **Single consumption**: a task's value or panic is taken exactly once
//! - **Structured scope**: a nursery's awaiter never observes completion
//!   while a spawned child is still running
//! - **Fail-fast with safe teardown**: `when_all` elects the first
//!   failure and skips unstarted tasks, but resumes only after every
//!   started task finished; `when_any` does the same around its winner
//! - **No silent drops**: every captured panic is re-raised or surfaced
//!   as a typed record
//! - **Cooperative cancellation**: stop sources are signalled, never
//!   enforced; participants unwind themselves
//!
//! # Module Structure
//!
//! - [`task`]: lazy single-consumer tasks
//! - [`sync_wait`]: blocking bridge from the synchronous world
//! - [`wait`]: `when_all` / `when_all_complete` / `when_any` and their
//!   `try_` variants over tuples and ranges
//! - [`nursery`]: structured scopes for dynamically spawned children
//! - [`event`]: one-shot cross-task rendezvous
//! - [`mutex`]: async mutex with a lock-free waiter queue
//! - [`generator`] / [`async_generator`]: lazy producer coroutines
//! - [`stop`]: stop sources, tokens and the stop awaiter
//! - [`signal`]: OS signal awaiter (unix)
//! - [`time`]: deadline futures backed by a timer-driver thread
//! - [`outcome`]: panic transport and per-task result records
//! - [`test_utils`]: logging init, poll helpers and the test thread pool
//!
//! # Example
//!
//! ```
//! use mooring::{sync_wait, when_all, Task};
//!
//! let (a, b) = sync_wait(when_all((
//!     Task::new(async { 10 }),
//!     Task::new(async { 20 }),
//! )));
//! assert_eq!((a, b), (10, 20));
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod async_generator;
pub mod event;
pub mod generator;
pub mod mutex;
pub mod nursery;
pub mod outcome;
#[cfg(unix)]
pub mod signal;
pub mod stop;
pub mod task;
pub mod test_utils;
pub mod time;
pub mod wait;

mod adapter;
mod sync_wait;
mod util;

pub use async_generator::AsyncGenerator;
pub use event::{EventSender, SingleEvent, SingleEventError};
pub use generator::{Generator, Yielder};
pub use mutex::{when_locked, when_locked_with, Mutex, Scheduler, SyncScheduler, UniqueLock};
pub use nursery::{nursery, Nursery, NurseryTask};
pub use outcome::{AsyncResult, PanicPayload};
#[cfg(unix)]
pub use signal::{when_signal, SignalError, WhenSignal};
pub use stop::{when_stopped, StopRegistration, StopSource, StopToken, WhenStopped};
pub use sync_wait::sync_wait;
pub use task::Task;
pub use wait::{
    try_when_all, try_when_all_with, try_when_any, try_when_any_with, when_all, when_all_complete,
    when_all_with, when_any, when_any_with, Fallible, OneOf2, OneOf3, OneOf4, OneOf5, TryFailure,
};
