//! Structured event channel.
//!
//! Every component takes a `&dyn EventSink` instead of logging through a
//! process-wide logger. The binary wires in [`TracingSink`]; tests use
//! [`MemorySink`] and assert on what was emitted.

use std::fmt;
use std::sync::Mutex;

/// Severity of an emitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A single structured event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub level: Level,
    /// Component that emitted the event (e.g. `"partition"`, `"process"`).
    pub target: &'static str,
    pub message: String,
}

/// Receiver for structured events.
pub trait EventSink {
    fn emit(&self, event: Event);
}

/// Convenience helpers usable on trait objects.
impl dyn EventSink + '_ {
    pub fn debug(&self, target: &'static str, message: impl Into<String>) {
        self.log(Level::Debug, target, message);
    }

    pub fn info(&self, target: &'static str, message: impl Into<String>) {
        self.log(Level::Info, target, message);
    }

    pub fn warn(&self, target: &'static str, message: impl Into<String>) {
        self.log(Level::Warn, target, message);
    }

    pub fn error(&self, target: &'static str, message: impl Into<String>) {
        self.log(Level::Error, target, message);
    }

    pub fn log(&self, level: Level, target: &'static str, message: impl Into<String>) {
        self.emit(Event {
            level,
            target,
            message: message.into(),
        });
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        let Event {
            level,
            target,
            message,
        } = event;
        match level {
            Level::Debug => tracing::debug!(component = target, "{}", message),
            Level::Info => tracing::info!(component = target, "{}", message),
            Level::Warn => tracing::warn!(component = target, "{}", message),
            Level::Error => tracing::error!(component = target, "{}", message),
        }
    }
}

/// Records events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Messages emitted at exactly `level`.
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.message)
            .collect()
    }

    /// True if any event at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.messages_at(level).iter().any(|m| m.contains(needle))
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}
