//! Phase timing.

use std::time::{Duration, Instant};

use crate::events::EventSink;

/// Measures one pipeline phase and reports it through an [`EventSink`].
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    /// Start a new timer with the given phase name.
    pub fn start(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Finish the timer and report the elapsed time.
    pub fn finish(self, sink: &dyn EventSink) {
        sink.info("timing", format_elapsed(&self.name, self.elapsed()));
    }
}

fn format_elapsed(name: &str, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs >= 60.0 {
        format!("[{:.1}m] {}", secs / 60.0, name)
    } else {
        format!("[{:.1}s] {}", secs, name)
    }
}
