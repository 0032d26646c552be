//! End-to-end coverage of `when_all` and `try_when_all`.

mod common;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use common::{
    boxed_int_task, delayed_err_task, delayed_int_task, delayed_void_task, err_task, int_task,
    never_started_task, ok_task, panic_message, stoppable_task, string_task, throwing_int_task,
    void_task,
};
use mooring::test_utils::init_test_logging;
use mooring::{sync_wait, try_when_all, try_when_all_with, when_all, when_all_with, StopSource};

#[test]
fn single_int_task() {
    init_test_logging();
    let (value,) = sync_wait(when_all((int_task(42),)));
    assert_eq!(value, 42);
}

#[test]
fn two_int_tasks() {
    let (a, b) = sync_wait(when_all((int_task(10), int_task(20))));
    assert_eq!((a, b), (10, 20));
}

#[test]
fn mixed_types() {
    let (n, s, ()) = sync_wait(when_all((int_task(1), string_task("two"), void_task())));
    assert_eq!(n, 1);
    assert_eq!(s, "two");
}

#[test]
fn move_only_values() {
    let (a, b) = sync_wait(when_all((boxed_int_task(5), boxed_int_task(6))));
    assert_eq!((*a, *b), (5, 6));
}

#[test]
fn five_tasks() {
    let (a, b, c, d, e) = sync_wait(when_all((
        int_task(1),
        int_task(2),
        int_task(3),
        int_task(4),
        int_task(5),
    )));
    assert_eq!((a, b, c, d, e), (1, 2, 3, 4, 5));
}

#[test]
fn async_tasks_run_concurrently() {
    let started = Instant::now();
    let (a, b) = sync_wait(when_all((
        delayed_int_task(1, Duration::from_millis(30)),
        delayed_int_task(2, Duration::from_millis(30)),
    )));
    assert_eq!((a, b), (1, 2));
    let elapsed = started.elapsed();
    assert!(
        elapsed < Duration::from_millis(55),
        "tasks ran sequentially: {elapsed:?}"
    );
}

#[test]
fn range_of_tasks() {
    let tasks: Vec<_> = (0..8).map(int_task).collect();
    let values = sync_wait(when_all(tasks));
    assert_eq!(values, (0..8).collect::<Vec<_>>());
}

#[test]
fn empty_range_completes_immediately() {
    let values = sync_wait(when_all(Vec::<mooring::Task<i32>>::new()));
    assert!(values.is_empty());
}

#[test]
fn array_of_delayed_tasks() {
    let values = sync_wait(when_all([
        delayed_int_task(1, Duration::from_millis(5)),
        delayed_int_task(2, Duration::from_millis(10)),
        delayed_int_task(3, Duration::from_millis(2)),
    ]));
    assert_eq!(values, vec![1, 2, 3]);
}

#[test]
fn first_panic_wins_and_skips_unstarted_tasks() {
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
fn last_task_panic_is_reported() {
    let caught = catch_unwind(AssertUnwindSafe(|| {
        sync_wait(when_all((int_task(10), throwing_int_task("last"))))
    }))
    .unwrap_err();
    assert_eq!(panic_message(&caught), "last");
}

#[test]
fn void_range() {
    let results = sync_wait(when_all(vec![void_task(), void_task(), void_task()]));
    assert_eq!(results.len(), 3);
}

#[test]
fn stop_source_is_signalled_on_failure() {
    init_test_logging();
    mooring::test_phase!("stop_source_is_signalled_on_failure");
    let stop = StopSource::new();
    let started = Instant::now();
    let caught = catch_unwind(AssertUnwindSafe(|| {
        sync_wait(when_all_with(
            &stop,
            (
                stoppable_task(stop.token(), 100, Duration::from_millis(100)),
                throwing_int_task("e"),
            ),
        ))
    }))
    .unwrap_err();
    assert_eq!(panic_message(&caught), "e");
    let requested = stop.stop_requested();
    mooring::assert_with_log!(requested, "stop requested", true, requested);
    // The stoppable task checks its token every ~10ms; the group must
    // resolve well before its full 100ms runtime.
    assert!(
        started.elapsed() < Duration::from_millis(60),
        "cancellation did not short-cut the long task"
    );
    mooring::test_complete!("stop_source_is_signalled_on_failure");
}

#[test]
fn try_all_ok_collapses_to_tuple() {
    let result = sync_wait(try_when_all((ok_task(1), ok_task(2))));
    assert_eq!(result.unwrap(), (1, 2));
}

#[test]
fn try_first_err_wins() {
    let result = sync_wait(try_when_all((
        ok_task(1),
        err_task("bad"),
        ok_task(3),
    )));
    assert_eq!(result.unwrap_err(), "bad");
}

#[test]
fn try_range_collects_values() {
    let tasks: Vec<_> = (0..5).map(ok_task).collect();
    let values = sync_wait(try_when_all(tasks)).unwrap();
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
}

#[test]
fn try_empty_range_is_ok() {
    let result = sync_wait(try_when_all(Vec::<mooring::Task<Result<i32, String>>>::new()));
    assert_eq!(result.unwrap(), Vec::<i32>::new());
}

#[test]
fn try_completion_order_decides_the_error() {
    let result = sync_wait(try_when_all((
        delayed_err_task("slow", Duration::from_millis(40)),
        delayed_err_task("fast", Duration::from_millis(5)),
    )));
    assert_eq!(result.unwrap_err(), "fast");
}

#[test]
fn try_stop_source_cancels_siblings() {
    let stop = StopSource::new();
    let token = stop.token();
    let slow = mooring::Task::new(async move {
        for _ in 0..50 {
            if token.stop_requested() {
                return Err::<i32, String>("cancelled".to_owned());
            }
            mooring::time::sleep(Duration::from_millis(2)).await;
        }
        Ok(7)
    });
    let started = Instant::now();
    let result = sync_wait(try_when_all_with(
        &stop,
        vec![slow, delayed_err_task("root cause", Duration::from_millis(5))],
    ));
    assert_eq!(result.unwrap_err(), "root cause");
    assert!(stop.stop_requested());
    assert!(started.elapsed() < Duration::from_millis(80));
}

#[test]
fn delayed_void_group() {
    let started = Instant::now();
    sync_wait(when_all((
        delayed_void_task(Duration::from_millis(10)),
        delayed_void_task(Duration::from_millis(20)),
    )));
    assert!(started.elapsed() >= Duration::from_millis(20));
}
