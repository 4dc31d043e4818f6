//! Buffers formatted `tracing` lines in memory while the CLI runs quiet, and
//! replays them to stderr on failure (`spec.md` §7 "User-visible behavior":
//! "a buffered diagnostic trail ... is replayed to the error stream so users
//! need not re-run with verbose logging").

use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Shared handle to the in-memory line buffer. Cheap to clone.
#[derive(Clone, Default)]
pub struct DiagnosticBuffer {
    lines: Arc<Mutex<Vec<String>>>,
}

impl DiagnosticBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes every buffered line to stderr, oldest first, then clears the
    /// buffer. Called once, after a failed build.
    pub fn replay_to_stderr(&self) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        for line in lines.drain(..) {
            eprintln!("{line}");
        }
    }
}

/// A [`Layer`] that formats each event as `LEVEL target: message` and
/// appends it to a [`DiagnosticBuffer`], instead of writing anything
/// immediately. Installed in place of the normal `fmt` layer whenever the CLI
/// is running `--quiet`/`--json`.
pub struct BufferLayer {
    buffer: DiagnosticBuffer,
}

impl BufferLayer {
    pub fn new(buffer: DiagnosticBuffer) -> Self {
        Self { buffer }
    }
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else if !self.message.is_empty() {
            let _ = write!(self.message, " {}={:?}", field.name(), value);
        } else {
            let _ = write!(self.message, "{}={:?}", field.name(), value);
        }
    }
}

impl<S> Layer<S> for BufferLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor { message: String::new() };
        event.record(&mut visitor);
        let line = format!(
            "{level} {target}: {message}",
            level = event.metadata().level(),
            target = event.metadata().target(),
            message = visitor.message
        );
        self.buffer.lines.lock().unwrap_or_else(|e| e.into_inner()).push(line);
    }
}
