//! Fan-out/fan-in wait combinators over tuples and ranges of futures.
//!
//! Three policies, one shared mechanism:
//!
//! - [`when_all`]: fail fast on the first panic (or first `Err`, in the
//!   [`try_when_all`] form); skip tasks that were never started.
//! - [`when_all_complete`]: never fail fast; collect every task's
//!   outcome.
//! - [`when_any`]: first success wins; resumption waits for every started
//!   task so teardown is safe.
//!
//! Each combinator wraps its futures in self-driving adapter tasks,
//! starts all but the last, then runs the last one inline as its own tail
//! action. Completions report into a shared frame whose atomic counter
//! and CAS-elected indices decide when and how the awaiter resumes; the
//! completion that decrements the counter to zero wakes the parent, from
//! whichever thread it happens on.
//!
//! Cancellation is cooperative: the `_with` variants take a
//! [`StopSource`](crate::StopSource) that is signalled at the
//! policy-defined moment (first failure for all, first success for any);
//! tasks willing to cancel observe the token and unwind themselves.

mod all;
mod any;
mod complete;
mod frame;
mod list;

pub use frame::WaitFrame;

pub use all::{try_when_all, try_when_all_with, when_all, when_all_with, TryWhenAll, WhenAll};
pub use any::{try_when_any, try_when_any_with, when_any, when_any_with, TryWhenAny, WhenAny};
pub use complete::{when_all_complete, WhenAllComplete};
pub use list::{
    Fallible, IntoTryWaitSet, IntoWaitSet, OneOf1, OneOf2, OneOf3, OneOf4, OneOf5, TryFailure,
    TryWaitSet, TupleSet1, TupleSet2, TupleSet3, TupleSet4, TupleSet5, VecSet, WaitSet,
};
