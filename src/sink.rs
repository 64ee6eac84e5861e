//! Log sinks
//!
//! Sinks receive every [`RenderedEvent`] in event order. They are append-only
//! and own their failures: a sink that cannot write logs a warning once and
//! keeps dropping records instead of stopping the trace.

use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::record::RenderedEvent;

pub const HUMAN_LOG: &str = "human.log";
pub const STRUCTURED_LOG: &str = "structured.log";

/// Consumer of rendered events
pub trait LogSink {
    fn write(&mut self, event: &RenderedEvent);

    /// Push buffered output to its destination
    fn flush(&mut self) {}
}

/// Warn once per sink, then stay quiet
#[derive(Debug)]
struct FailureLatch {
    label: String,
    failed: bool,
}

impl FailureLatch {
    fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            failed: false,
        }
    }

    fn check(&mut self, result: io::Result<()>) {
        if let Err(e) = result {
            if !self.failed {
                warn!(sink = %self.label, error = %e, "log sink write failed; dropping further errors");
            }
            self.failed = true;
        }
    }
}

/// Writes one human line per event
pub struct HumanSink<W: Write> {
    out: W,
    latch: FailureLatch,
}

impl<W: Write> HumanSink<W> {
    pub fn new(out: W, label: impl Into<String>) -> Self {
        Self {
            out,
            latch: FailureLatch::new(label),
        }
    }
}

impl HumanSink<io::Stderr> {
    /// Console echo on stderr
    pub fn stderr() -> Self {
        Self::new(io::stderr(), "console")
    }
}

impl<W: Write> LogSink for HumanSink<W> {
    fn write(&mut self, event: &RenderedEvent) {
        let result = writeln!(self.out, "{}", event.human);
        self.latch.check(result);
    }

    fn flush(&mut self) {
        let result = self.out.flush();
        self.latch.check(result);
    }
}

/// Writes one JSON object per line
pub struct JsonLinesSink<W: Write> {
    out: W,
    latch: FailureLatch,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W, label: impl Into<String>) -> Self {
        Self {
            out,
            latch: FailureLatch::new(label),
        }
    }
}

impl<W: Write> LogSink for JsonLinesSink<W> {
    fn write(&mut self, event: &RenderedEvent) {
        let result = serde_json::to_writer(&mut self.out, &event.structured)
            .map_err(io::Error::from)
            .and_then(|()| self.out.write_all(b"\n"));
        self.latch.check(result);
    }

    fn flush(&mut self) {
        let result = self.out.flush();
        self.latch.check(result);
    }
}

/// Keeps events in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<RenderedEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far
    pub fn events(&self) -> Vec<RenderedEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl LogSink for MemorySink {
    fn write(&mut self, event: &RenderedEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Per-session directory `<root>/trace-<pid>-<YYYYmmdd_HHMMSS>`
#[derive(Debug, Clone)]
pub struct SessionLogDir {
    path: PathBuf,
}

impl SessionLogDir {
    pub fn dir_name(pid: i32, started: DateTime<Local>) -> String {
        format!("trace-{}-{}", pid, started.format("%Y%m%d_%H%M%S"))
    }

    /// Create the directory (and missing parents)
    pub fn create(root: &Path, pid: i32, started: DateTime<Local>) -> io::Result<Self> {
        let path = root.join(Self::dir_name(pid, started));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open `human.log` and `structured.log` for appending
    pub fn open_sinks(&self) -> io::Result<Vec<Box<dyn LogSink>>> {
        let open = |name: &str| -> io::Result<BufWriter<File>> {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path.join(name))?;
            Ok(BufWriter::new(file))
        };
        Ok(vec![
            Box::new(HumanSink::new(open(HUMAN_LOG)?, HUMAN_LOG)),
            Box::new(JsonLinesSink::new(open(STRUCTURED_LOG)?, STRUCTURED_LOG)),
        ])
    }
}
