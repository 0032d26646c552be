//! End-to-end coverage of the nursery scope.

mod common;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::panic_message;
use mooring::test_utils::init_test_logging;
use mooring::time::sleep;
use mooring::{nursery, sync_wait, StopSource};

#[test]
fn body_value_is_returned() {
    init_test_logging();
    let value = sync_wait(nursery(|_n| async move { 42 }));
    assert_eq!(value, 42);
}

#[test]
fn children_complete_before_the_scope_resolves() {
    let completed = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&completed);
    sync_wait(nursery(move |n| async move {
        for _ in 0..10 {
            let completed = Arc::clone(&observed);
            n.start(async move {
                sleep(Duration::from_millis(10)).await;
                completed.fetch_add(1, Ordering::SeqCst);
            });
        }
    }));
    assert_eq!(completed.load(Ordering::SeqCst), 10);
}

#[test]
fn many_children_run_concurrently() {
    init_test_logging();
    mooring::test_phase!("many_children_run_concurrently");
    let started = Instant::now();
    sync_wait(nursery(|n| async move {
        for _ in 0..100 {
            n.start(async {
                sleep(Duration::from_millis(15)).await;
            });
        }
    }));
    let elapsed = started.elapsed();
    assert!(
        elapsed < Duration::from_millis(300),
        "children ran sequentially: {elapsed:?}"
    );
    mooring::test_complete!("many_children_run_concurrently", elapsed_ms = elapsed.as_millis());
}

#[test]
fn body_may_await_between_spawns() {
    let hits = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&hits);
    sync_wait(nursery(move |n| async move {
        let first = Arc::clone(&observed);
        n.start(async move {
            first.fetch_add(1, Ordering::SeqCst);
        });
        sleep(Duration::from_millis(5)).await;
        let second = Arc::clone(&observed);
        n.start(async move {
            second.fetch_add(1, Ordering::SeqCst);
        });
    }));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn children_may_spawn_grandchildren() {
    let hits = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&hits);
    sync_wait(nursery(move |n| async move {
        let nested = n.clone();
        let counter = Arc::clone(&observed);
        n.start(async move {
            sleep(Duration::from_millis(5)).await;
            for _ in 0..3 {
                let counter = Arc::clone(&counter);
                nested.start(async move {
                    sleep(Duration::from_millis(5)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
    }));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[test]
fn child_panic_is_reraised_after_quiescence() {
    let survivors = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&survivors);
    let caught = catch_unwind(AssertUnwindSafe(|| {
        sync_wait(nursery(move |n| async move {
            n.start(async {
                sleep(Duration::from_millis(2)).await;
                panic!("child failed");
            });
            let survivors = Arc::clone(&observed);
            n.start(async move {
                sleep(Duration::from_millis(20)).await;
                survivors.fetch_add(1, Ordering::SeqCst);
            });
        }))
    }))
    .unwrap_err();
    assert_eq!(panic_message(&caught), "child failed");
    // The sibling still ran to completion before the panic surfaced.
    assert_eq!(survivors.load(Ordering::SeqCst), 1);
}

#[test]
fn body_panic_wins_over_child_panic() {
    let caught = catch_unwind(AssertUnwindSafe(|| {
        sync_wait(nursery(|n| async move {
            n.start(async {
                panic!("child noise");
            });
            sleep(Duration::from_millis(5)).await;
            panic!("body failed");
        }))
    }))
    .unwrap_err();
    assert_eq!(panic_message(&caught), "body failed");
}

#[test]
fn stop_source_pattern_cancels_children() {
    init_test_logging();
    let stop = StopSource::new();
    let cancelled = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&cancelled);
    let source = stop.clone();
    let started = Instant::now();
    sync_wait(nursery(move |n| async move {
        for _ in 0..4 {
            let token = source.token();
            let cancelled = Arc::clone(&observed);
            n.start(async move {
                for _ in 0..100 {
                    if token.stop_requested() {
                        cancelled.fetch_add(1, Ordering::SeqCst);
                        return;
                    }
                    sleep(Duration::from_millis(2)).await;
                }
            });
        }
        sleep(Duration::from_millis(10)).await;
        source.request_stop();
    }));
    assert_eq!(cancelled.load(Ordering::SeqCst), 4);
    assert!(started.elapsed() < Duration::from_millis(150));
}

#[test]
fn scope_value_with_children() {
    let value = sync_wait(nursery(|n| async move {
        n.start(async {
            sleep(Duration::from_millis(5)).await;
        });
        "done"
    }));
    assert_eq!(value, "done");
}
