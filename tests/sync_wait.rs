//! End-to-end scenarios for the blocking bridge, mirroring the library's
//! headline behaviors.

mod common;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use common::{
    delayed_int_task, int_task, never_started_task, panic_message, stoppable_task,
    throwing_int_task,
};
use mooring::test_utils::init_test_logging;
use mooring::{sync_wait, when_all, when_all_with, when_any, StopSource, Task};

#[test]
fn value_task() {
    init_test_logging();
    assert_eq!(sync_wait(int_task(42)), 42);
}

#[test]
fn panicking_task_reraises_with_message() {
    let caught = catch_unwind(AssertUnwindSafe(|| {
        sync_wait(throwing_int_task("e"));
    }))
    .unwrap_err();
    assert_eq!(panic_message(&caught), "e");
}

#[test]
fn when_all_pair() {
    let (a, b) = sync_wait(when_all((int_task(10), int_task(20))));
    assert_eq!((a, b), (10, 20));
}

#[test]
fn fail_fast_skips_the_unstarted_tail() {
    let caught = catch_unwind(AssertUnwindSafe(|| {
        sync_wait(when_all((
            int_task(10),
            throwing_int_task("x"),
            never_started_task(),
        )))
    }))
    .unwrap_err();
    assert_eq!(panic_message(&caught), "x");
}

#[test]
fn stoppable_group_cancels_quickly() {
    let stop = StopSource::new();
    let started = Instant::now();
    let caught = catch_unwind(AssertUnwindSafe(|| {
        sync_wait(when_all_with(
            &stop,
            (
                stoppable_task(stop.token(), 1, Duration::from_millis(100)),
                throwing_int_task("e"),
            ),
        ))
    }))
    .unwrap_err();
    assert_eq!(panic_message(&caught), "e");
    assert!(stop.stop_requested());
    assert!(
        started.elapsed() < Duration::from_millis(60),
        "group did not cancel within the cooperative window"
    );
}

#[test]
fn fastest_delayed_task_wins_when_any() {
    let (index, value) = sync_wait(when_any(vec![
        delayed_int_task(1, Duration::from_millis(25)),
        delayed_int_task(42, Duration::from_millis(5)),
    ]));
    assert_eq!((index, value), (1, 42));
}

#[test]
fn nested_awaits_stay_flat() {
    // A deep chain of awaits must complete without stack growth per
    // level; depth well beyond any plausible stack budget.
    fn chain(depth: u32) -> Task<u64> {
        Task::new(async move {
            let mut total = 0_u64;
            for _ in 0..depth {
                total += sync_level().await;
            }
            total
        })
    }
    async fn sync_level() -> u64 {
        1
    }
    assert_eq!(sync_wait(chain(100_000)), 100_000);
}

#[test]
fn bridge_runs_from_multiple_threads() {
    let handles: Vec<_> = (0..8)
        .map(|i| {
            std::thread::spawn(move || {
                sync_wait(delayed_int_task(i, Duration::from_millis(5)))
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), i32::try_from(i).unwrap());
    }
}
