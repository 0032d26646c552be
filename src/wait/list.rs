//! Wait-set plumbing: the bridge between user-supplied collections of
//! futures and the combinator state machines.
//!
//! A *wait set* is either a heterogeneous tuple of futures (arity 1..=5)
//! or a homogeneous `Vec`/array. [`WaitSet`] abstracts over both so that
//! `when_all`, `when_any` and `when_all_complete` share one driving
//! implementation; [`TryWaitSet`] adds the `Result`-aware collapse used
//! by the `try_` variants.
//!
//! These traits are implementation plumbing: they cannot be implemented
//! or usefully invoked outside the crate (the set types have no public
//! constructors and the frame has no public operations).

use std::future::Future;
use std::sync::Arc;

use crate::adapter::{AdapterTask, ReadyHook};
use crate::outcome::{AsyncResult, PanicPayload};
use crate::wait::frame::WaitFrame;

/// An output shape the `try_` combinators can collapse: a value-or-error
/// pair with a detectable failure state. Implemented for `Result`.
pub trait Fallible {
    /// The success value.
    type Value;
    /// The failure value.
    type Error;
    /// True when this output counts as success.
    fn is_ok(&self) -> bool;
    /// Splits into the underlying result.
    fn into_result(self) -> Result<Self::Value, Self::Error>;
}

impl<T, E> Fallible for Result<T, E> {
    type Value = T;
    type Error = E;

    fn is_ok(&self) -> bool {
        Result::is_ok(self)
    }

    fn into_result(self) -> Result<T, E> {
        self
    }
}

/// The elected failure of a `try_` combinator: a domain error carried by
/// the failing task's output, or the panic that ended it.
#[derive(Debug)]
pub enum TryFailure<E> {
    /// The task returned `Err`.
    Error(E),
    /// The task panicked.
    Panicked(PanicPayload),
}

/// A collection of adapter tasks a combinator can drive.
///
/// Implemented by the tuple sets (arity 1..=5) and [`VecSet`]. The
/// `collect_*`/`take_*` methods have ordering preconditions (the frame's
/// counter must have reached zero) that only the combinator futures
/// uphold; they are not meant to be called directly.
pub trait WaitSet: Unpin + Send + 'static {
    /// `when_all` result: tuple of values, or `Vec` of values.
    type AllOutput;
    /// `when_any` winner value: `OneOfN` for tuples, the element type for
    /// ranges.
    type AnyOutput;
    /// `when_all_complete` result: per-task [`AsyncResult`] records.
    type CompleteOutput;

    /// Number of tasks in the set.
    fn len(&self) -> usize;

    /// Starts tasks `0..n-1` sequentially, consulting the frame's watch
    /// index after each so that an already-elected completion skips the
    /// rest; then registers and runs the last task as the tail action.
    /// Never called on an empty set.
    fn attach(&self, frame: &Arc<WaitFrame>);

    /// Result for an empty set. Only range sets can be empty.
    fn empty_all() -> Self::AllOutput {
        unreachable!("tuple wait sets are never empty")
    }

    /// Per-task records for an empty set. Only range sets can be empty.
    fn empty_complete() -> Self::CompleteOutput {
        unreachable!("tuple wait sets are never empty")
    }

    /// Takes every task's value. Precondition: no failure was elected.
    fn collect_all(self) -> Self::AllOutput;

    /// Takes the elected failure's panic record.
    fn take_failure(self, index: usize) -> PanicPayload;

    /// Takes the winner's value. Precondition: `index` was elected as the
    /// first success.
    fn collect_any(self, index: usize) -> Self::AnyOutput;

    /// Takes every task's value-or-panic record.
    fn collect_complete(self) -> Self::CompleteOutput;
}

/// A wait set whose task outputs are [`Fallible`] with a shared error
/// type, enabling the `try_` combinators.
pub trait TryWaitSet: WaitSet {
    /// The shared error type of every task in the set.
    type Error;
    /// `try_when_all` success value: tuple or `Vec` of unwrapped values.
    type TryAllOutput;
    /// `try_when_any` winner value.
    type TryAnyOutput;

    /// Success value for an empty set. Only range sets can be empty.
    fn empty_try_all() -> Self::TryAllOutput {
        unreachable!("tuple wait sets are never empty")
    }

    /// Takes every task's unwrapped value. Precondition: no failure was
    /// elected.
    fn collect_try_all(self) -> Self::TryAllOutput;

    /// Takes the elected failure: domain error or panic.
    fn take_try_failure(self, index: usize) -> TryFailure<Self::Error>;

    /// Takes the winner's unwrapped value.
    fn collect_try_any(self, index: usize) -> Self::TryAnyOutput;
}

/// Converts a collection of futures into a [`WaitSet`].
pub trait IntoWaitSet {
    /// The produced set type.
    type Set: WaitSet;
    /// Wraps every future in an adapter task.
    fn into_wait_set(self) -> Self::Set;
}

/// Converts a collection of `Result`-producing futures into a
/// [`TryWaitSet`], arming the failure predicate on each adapter.
pub trait IntoTryWaitSet {
    /// The produced set type.
    type Set: TryWaitSet;
    /// Wraps every future in an adapter task that treats `Err` as
    /// failure.
    fn into_try_wait_set(self) -> Self::Set;
}

fn fallible_is_ok<O: Fallible>(out: &O) -> bool {
    out.is_ok()
}

fn ok_value<O: Fallible>(taken: Result<O, PanicPayload>) -> O::Value {
    match taken {
        Ok(out) => match out.into_result() {
            Ok(value) => value,
            Err(_) => unreachable!("task reported success but holds an error"),
        },
        Err(panic) => panic.resume(),
    }
}

fn failed_outcome<O: Fallible>(taken: Result<O, PanicPayload>) -> TryFailure<O::Error> {
    match taken {
        Ok(out) => match out.into_result() {
            Err(error) => TryFailure::Error(error),
            Ok(_) => unreachable!("elected failure holds a value"),
        },
        Err(panic) => TryFailure::Panicked(panic),
    }
}

// ---------------------------------------------------------------------------
// Range sets
// ---------------------------------------------------------------------------

/// Wait set over a homogeneous range of futures.
pub struct VecSet<F: Future>(Vec<AdapterTask<F>>);

impl<F> WaitSet for VecSet<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    type AllOutput = Vec<F::Output>;
    type AnyOutput = F::Output;
    type CompleteOutput = Vec<AsyncResult<F::Output>>;

    fn len(&self) -> usize {
        self.0.len()
    }

    fn attach(&self, frame: &Arc<WaitFrame>) {
        let count = self.0.len();
        for (index, task) in self.0.iter().enumerate().take(count - 1) {
            task.start(Arc::clone(frame) as Arc<dyn ReadyHook>, index);
            if frame.short_circuit_after(index) {
                frame.skip_remaining(count - index - 1);
                return;
            }
        }
        let last = count - 1;
        self.0[last].setup(Arc::clone(frame) as Arc<dyn ReadyHook>, last);
        self.0[last].run();
    }

    fn empty_all() -> Vec<F::Output> {
        Vec::new()
    }

    fn empty_complete() -> Vec<AsyncResult<F::Output>> {
        Vec::new()
    }

    fn collect_all(self) -> Vec<F::Output> {
        self.0
            .into_iter()
            .map(|task| task.take_output().expect("all tasks reported success"))
            .collect()
    }

    fn take_failure(self, index: usize) -> PanicPayload {
        match self.0[index].take_output() {
            Err(panic) => panic,
            Ok(_) => unreachable!("elected failure holds a value"),
        }
    }

    fn collect_any(self, index: usize) -> F::Output {
        self.0[index]
            .take_output()
            .expect("winner reported success")
    }

    fn collect_complete(self) -> Vec<AsyncResult<F::Output>> {
        self.0
            .into_iter()
            .map(|task| AsyncResult::from(task.take_output()))
            .collect()
    }
}

impl<F> TryWaitSet for VecSet<F>
where
    F: Future + Send + 'static,
    F::Output: Fallible + Send + 'static,
{
    type Error = <F::Output as Fallible>::Error;
    type TryAllOutput = Vec<<F::Output as Fallible>::Value>;
    type TryAnyOutput = <F::Output as Fallible>::Value;

    fn empty_try_all() -> Self::TryAllOutput {
        Vec::new()
    }

    fn collect_try_all(self) -> Self::TryAllOutput {
        self.0
            .into_iter()
            .map(|task| ok_value(task.take_output()))
            .collect()
    }

    fn take_try_failure(self, index: usize) -> TryFailure<Self::Error> {
        failed_outcome(self.0[index].take_output())
    }

    fn collect_try_any(self, index: usize) -> Self::TryAnyOutput {
        ok_value(self.0[index].take_output())
    }
}

impl<F> IntoWaitSet for Vec<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    type Set = VecSet<F>;

    fn into_wait_set(self) -> VecSet<F> {
        VecSet(self.into_iter().map(AdapterTask::new).collect())
    }
}

impl<F, const N: usize> IntoWaitSet for [F; N]
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    type Set = VecSet<F>;

    fn into_wait_set(self) -> VecSet<F> {
        VecSet(self.into_iter().map(AdapterTask::new).collect())
    }
}

impl<F> IntoTryWaitSet for Vec<F>
where
    F: Future + Send + 'static,
    F::Output: Fallible + Send + 'static,
{
    type Set = VecSet<F>;

    fn into_try_wait_set(self) -> VecSet<F> {
        VecSet(
            self.into_iter()
                .map(|future| AdapterTask::with_success(future, fallible_is_ok::<F::Output>))
                .collect(),
        )
    }
}

impl<F, const N: usize> IntoTryWaitSet for [F; N]
where
    F: Future + Send + 'static,
    F::Output: Fallible + Send + 'static,
{
    type Set = VecSet<F>;

    fn into_try_wait_set(self) -> VecSet<F> {
        VecSet(
            self.into_iter()
                .map(|future| AdapterTask::with_success(future, fallible_is_ok::<F::Output>))
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tuple sets
// ---------------------------------------------------------------------------

macro_rules! tuple_wait_set {
    (
        $set:ident, $oneof:ident, $len:expr, $anchor:ident,
        [$(($HF:ident, $hidx:tt, $hvar:ident)),*],
        ($LF:ident, $lidx:tt, $lvar:ident)
    ) => {
        /// The winning branch's value for a `when_any` over a tuple of
        /// this arity.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $oneof<$($HF,)* $LF> {
            $(
                /// Value produced by this branch.
                $hvar($HF),
            )*
            /// Value produced by this branch.
            $lvar($LF),
        }

        /// Wait set over a heterogeneous tuple of futures.
        pub struct $set<$($HF: Future,)* $LF: Future>(
            $(pub(crate) AdapterTask<$HF>,)*
            pub(crate) AdapterTask<$LF>,
        );

        impl<$($HF,)* $LF> WaitSet for $set<$($HF,)* $LF>
        where
            $($HF: Future + Send + 'static, $HF::Output: Send + 'static,)*
            $LF: Future + Send + 'static,
            $LF::Output: Send + 'static,
        {
            type AllOutput = ($($HF::Output,)* $LF::Output,);
            type AnyOutput = $oneof<$($HF::Output,)* $LF::Output>;
            type CompleteOutput = ($(AsyncResult<$HF::Output>,)* AsyncResult<$LF::Output>,);

            fn len(&self) -> usize {
                $len
            }

            fn attach(&self, frame: &Arc<WaitFrame>) {
                $(
                    self.$hidx.start(Arc::clone(frame) as Arc<dyn ReadyHook>, $hidx);
                    if frame.short_circuit_after($hidx) {
                        frame.skip_remaining($len - 1 - $hidx);
                        return;
                    }
                )*
                self.$lidx.setup(Arc::clone(frame) as Arc<dyn ReadyHook>, $lidx);
                self.$lidx.run();
            }

            fn collect_all(self) -> Self::AllOutput {
                (
                    $(self.$hidx.take_output().expect("all tasks reported success"),)*
                    self.$lidx.take_output().expect("all tasks reported success"),
                )
            }

            fn take_failure(self, index: usize) -> PanicPayload {
                match index {
                    $(
                        $hidx => match self.$hidx.take_output() {
                            Err(panic) => panic,
                            Ok(_) => unreachable!("elected failure holds a value"),
                        },
                    )*
                    $lidx => match self.$lidx.take_output() {
                        Err(panic) => panic,
                        Ok(_) => unreachable!("elected failure holds a value"),
                    },
                    _ => unreachable!("failure index out of range"),
                }
            }

            fn collect_any(self, index: usize) -> Self::AnyOutput {
                match index {
                    $(
                        $hidx => $oneof::$hvar(
                            self.$hidx.take_output().expect("winner reported success"),
                        ),
                    )*
                    $lidx => $oneof::$lvar(
                        self.$lidx.take_output().expect("winner reported success"),
                    ),
                    _ => unreachable!("winner index out of range"),
                }
            }

            fn collect_complete(self) -> Self::CompleteOutput {
                (
                    $(AsyncResult::from(self.$hidx.take_output()),)*
                    AsyncResult::from(self.$lidx.take_output()),
                )
            }
        }

        impl<$($HF,)* $LF> TryWaitSet for $set<$($HF,)* $LF>
        where
            $(
                $HF: Future + Send + 'static,
                $HF::Output: Fallible<Error = <$anchor::Output as Fallible>::Error>
                    + Send
                    + 'static,
            )*
            $LF: Future + Send + 'static,
            $LF::Output: Fallible<Error = <$anchor::Output as Fallible>::Error>
                + Send
                + 'static,
        {
            type Error = <$anchor::Output as Fallible>::Error;
            type TryAllOutput = (
                $(<$HF::Output as Fallible>::Value,)*
                <$LF::Output as Fallible>::Value,
            );
            type TryAnyOutput = $oneof<
                $(<$HF::Output as Fallible>::Value,)*
                <$LF::Output as Fallible>::Value,
            >;

            fn collect_try_all(self) -> Self::TryAllOutput {
                (
                    $(ok_value(self.$hidx.take_output()),)*
                    ok_value(self.$lidx.take_output()),
                )
            }

            fn take_try_failure(self, index: usize) -> TryFailure<Self::Error> {
                match index {
                    $($hidx => failed_outcome(self.$hidx.take_output()),)*
                    $lidx => failed_outcome(self.$lidx.take_output()),
                    _ => unreachable!("failure index out of range"),
                }
            }

            fn collect_try_any(self, index: usize) -> Self::TryAnyOutput {
                match index {
                    $($hidx => $oneof::$hvar(ok_value(self.$hidx.take_output())),)*
                    $lidx => $oneof::$lvar(ok_value(self.$lidx.take_output())),
                    _ => unreachable!("winner index out of range"),
                }
            }
        }

        impl<$($HF,)* $LF> IntoWaitSet for ($($HF,)* $LF,)
        where
            $($HF: Future + Send + 'static, $HF::Output: Send + 'static,)*
            $LF: Future + Send + 'static,
            $LF::Output: Send + 'static,
        {
            type Set = $set<$($HF,)* $LF>;

            fn into_wait_set(self) -> Self::Set {
                $set($(AdapterTask::new(self.$hidx),)* AdapterTask::new(self.$lidx))
            }
        }

        impl<$($HF,)* $LF> IntoTryWaitSet for ($($HF,)* $LF,)
        where
            $(
                $HF: Future + Send + 'static,
                $HF::Output: Fallible<Error = <$anchor::Output as Fallible>::Error>
                    + Send
                    + 'static,
            )*
            $LF: Future + Send + 'static,
            $LF::Output: Fallible<Error = <$anchor::Output as Fallible>::Error>
                + Send
                + 'static,
        {
            type Set = $set<$($HF,)* $LF>;

            fn into_try_wait_set(self) -> Self::Set {
                $set(
                    $(AdapterTask::with_success(self.$hidx, fallible_is_ok::<$HF::Output>),)*
                    AdapterTask::with_success(self.$lidx, fallible_is_ok::<$LF::Output>),
                )
            }
        }
    };
}

tuple_wait_set!(TupleSet1, OneOf1, 1, F1, [], (F1, 0, First));
tuple_wait_set!(TupleSet2, OneOf2, 2, F1, [(F1, 0, First)], (F2, 1, Second));
tuple_wait_set!(
    TupleSet3,
    OneOf3,
    3,
    F1,
    [(F1, 0, First), (F2, 1, Second)],
    (F3, 2, Third)
);
tuple_wait_set!(
    TupleSet4,
    OneOf4,
    4,
    F1,
    [(F1, 0, First), (F2, 1, Second), (F3, 2, Third)],
    (F4, 3, Fourth)
);
tuple_wait_set!(
    TupleSet5,
    OneOf5,
    5,
    F1,
    [(F1, 0, First), (F2, 1, Second), (F3, 2, Third), (F4, 3, Fourth)],
    (F5, 4, Fifth)
);
