//! Shared task vocabulary for the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use mooring::time::sleep;
use mooring::{StopToken, Task};

pub fn int_task(value: i32) -> Task<i32> {
    Task::new(async move { value })
}

pub fn void_task() -> Task<()> {
    Task::new(async {})
}

pub fn string_task(value: &str) -> Task<String> {
    let value = value.to_owned();
    Task::new(async move { value })
}

pub fn boxed_int_task(value: i32) -> Task<Box<i32>> {
    Task::new(async move { Box::new(value) })
}

pub fn throwing_int_task(message: &'static str) -> Task<i32> {
    Task::new(async move { panic!("{message}") })
}

pub fn throwing_void_task(message: &'static str) -> Task<()> {
    Task::new(async move { panic!("{message}") })
}

/// A task that must never run; the combinator under test is expected to
/// skip it.
pub fn never_started_task() -> Task<i32> {
    Task::new(async { panic!("task was started but must not be") })
}

pub fn delayed_int_task(value: i32, delay: Duration) -> Task<i32> {
    Task::new(async move {
        sleep(delay).await;
        value
    })
}

pub fn delayed_void_task(delay: Duration) -> Task<()> {
    Task::new(async move {
        sleep(delay).await;
    })
}

pub fn delayed_throwing_int_task(message: &'static str, delay: Duration) -> Task<i32> {
    Task::new(async move {
        sleep(delay).await;
        panic!("{message}")
    })
}

/// Works in ten slices of `total / 10`, checking for a stop request
/// before each; panics with "stopped" when cancelled.
pub fn stoppable_task(token: StopToken, value: i32, total: Duration) -> Task<i32> {
    Task::new(async move {
        for _ in 0..10 {
            assert!(!token.stop_requested(), "stopped");
            sleep(total / 10).await;
        }
        value
    })
}

pub fn ok_task(value: i32) -> Task<Result<i32, String>> {
    Task::new(async move { Ok(value) })
}

pub fn err_task(message: &str) -> Task<Result<i32, String>> {
    let message = message.to_owned();
    Task::new(async move { Err(message) })
}

pub fn delayed_ok_task(value: i32, delay: Duration) -> Task<Result<i32, String>> {
    Task::new(async move {
        sleep(delay).await;
        Ok(value)
    })
}

pub fn delayed_err_task(message: &str, delay: Duration) -> Task<Result<i32, String>> {
    let message = message.to_owned();
    Task::new(async move {
        sleep(delay).await;
        Err(message)
    })
}

/// Message carried by a panic, for asserting on re-raised payloads.
pub fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    payload.downcast_ref::<&str>().map_or_else(
        || {
            payload
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "<non-string panic>".to_owned())
        },
        |s| (*s).to_owned(),
    )
}
