//! Panic transport and per-task result records.
//!
//! Failures inside a task are caught at the poll boundary and carried as a
//! [`PanicPayload`] until a consumer either inspects them
//! ([`AsyncResult`]) or re-raises them on its own thread
//! (`std::panic::resume_unwind`). Nothing is dropped silently: every
//! captured panic is eventually observed exactly once.

use core::fmt;
use std::any::Any;

/// Payload from a caught panic.
///
/// Wraps the panic value for transport across task boundaries. The
/// original boxed payload is preserved so the consumer can re-raise it
/// with full fidelity; a best-effort message is extracted up front for
/// logging and `Display`.
pub struct PanicPayload {
    message: String,
    payload: Box<dyn Any + Send + 'static>,
}

impl PanicPayload {
    /// Wraps a payload captured by `std::panic::catch_unwind`.
    #[must_use]
    pub fn new(payload: Box<dyn Any + Send + 'static>) -> Self {
        let message = payload.downcast_ref::<&'static str>().map_or_else(
            || {
                payload
                    .downcast_ref::<String>()
                    .cloned()
                    .unwrap_or_else(|| "panic of non-string type".to_owned())
            },
            |s| (*s).to_owned(),
        );
        Self { message, payload }
    }

    /// Creates a payload from a plain message, for synthetic failures.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let payload: Box<dyn Any + Send> = Box::new(message.clone());
        Self { message, payload }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Consumes the record, returning the original payload for
    /// `std::panic::resume_unwind`.
    #[must_use]
    pub fn into_any(self) -> Box<dyn Any + Send + 'static> {
        self.payload
    }

    /// Re-raises the captured panic on the current thread.
    pub fn resume(self) -> ! {
        std::panic::resume_unwind(self.payload)
    }
}

impl fmt::Debug for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanicPayload")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

/// The recorded outcome of one task: a value, or the panic that ended it.
///
/// Returned per slot by `when_all_complete`, which never fail-fasts:
/// callers inspect each record and decide what partial results to keep.
#[derive(Debug)]
pub enum AsyncResult<T> {
    /// The task produced a value.
    Ok(T),
    /// The task panicked.
    Panicked(PanicPayload),
}

impl<T> AsyncResult<T> {
    /// Returns true if this record holds a value.
    #[must_use]
    pub const fn has_value(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Returns the value, re-raising the panic otherwise.
    pub fn value(self) -> T {
        match self {
            Self::Ok(v) => v,
            Self::Panicked(p) => p.resume(),
        }
    }

    /// Returns a reference to the value, if present.
    #[must_use]
    pub const fn as_ok(&self) -> Option<&T> {
        match self {
            Self::Ok(v) => Some(v),
            Self::Panicked(_) => None,
        }
    }

    /// Returns the panic record, if the task failed.
    #[must_use]
    pub fn into_panic(self) -> Option<PanicPayload> {
        match self {
            Self::Ok(_) => None,
            Self::Panicked(p) => Some(p),
        }
    }

    /// Converts into a `Result`, keeping the panic record as the error.
    pub fn into_result(self) -> Result<T, PanicPayload> {
        match self {
            Self::Ok(v) => Ok(v),
            Self::Panicked(p) => Err(p),
        }
    }
}

impl<T> From<Result<T, PanicPayload>> for AsyncResult<T> {
    fn from(result: Result<T, PanicPayload>) -> Self {
        match result {
            Ok(v) => Self::Ok(v),
            Err(p) => Self::Panicked(p),
        }
    }
}
