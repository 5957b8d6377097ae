//! Event renderers: observers that stream run events to a writer (stderr by default).

mod jsonl;
mod text;

pub use jsonl::JsonlEventRenderer;
pub use text::TextEventRenderer;

use std::io::Write;
use std::sync::Mutex;

/// Shared line sink. Write failures are logged and otherwise ignored.
pub(crate) struct LineSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl LineSink {
    pub(crate) fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub(crate) fn write_line(&self, line: &str) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            tracing::debug!(error = %e, "event renderer write failed");
        }
    }
}
