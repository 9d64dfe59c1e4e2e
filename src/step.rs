//! Best-effort vs mandatory pipeline steps.
//!
//! A best-effort step may fail without stopping the run: its error is logged
//! and handed back as a [`Warning`]. A mandatory step's error is logged and
//! propagated as the run's [`FlashError`].

use serde::Serialize;
use std::fmt;

use crate::error::{FlashError, Result};
use crate::events::EventSink;

/// A swallowed failure from a best-effort step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub step: String,
    pub message: String,
}

impl Warning {
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}

/// Run `op`; on failure log a warning and return it instead of the error.
pub fn best_effort<T>(
    sink: &dyn EventSink,
    step: &str,
    op: impl FnOnce() -> Result<T>,
) -> std::result::Result<T, Warning> {
    op().map_err(|e| {
        sink.warn("step", format!("{} failed (continuing): {}", step, e));
        Warning::new(step, e.to_string())
    })
}

/// Run `op`; on failure log an error and propagate it.
pub fn mandatory<T>(sink: &dyn EventSink, step: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
    op().map_err(|e: FlashError| {
        sink.error("step", format!("{} failed: {}", step, e));
        e
    })
}
