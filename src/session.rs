//! Trace session lifecycle
//!
//! attach → loop { wait → handle → render → sinks → resume } → detach.
//!
//! The loop checks the cancellation flag before every blocking wait, so an
//! event already returned by the port is always fully processed. Detach runs
//! exactly once on every path out of [`TraceSession::run`], and from `Drop`
//! if `run` is never reached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::DecodeConfig;
use crate::error::{AttachError, PortError, SessionError};
use crate::filter::SyscallFilter;
use crate::port::{ProcessControlPort, ProcessMemory, TraceEvent, TracedProcess};
use crate::record::{render, EventRecord};
use crate::sink::LogSink;
use crate::state_machine::SyscallStateMachine;
use crate::stats::StatsTracker;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Attached,
    Terminated,
}

/// Why the event loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The traced process exited with this code
    Exited(i32),
    /// The cancellation flag was observed
    Cancelled,
}

/// Result of a completed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub pid: i32,
    pub termination: Termination,
    /// Records handed to the sinks
    pub records_emitted: u64,
}

pub struct TraceSession<P: ProcessControlPort> {
    port: P,
    process: Option<TracedProcess>,
    state: SessionState,
    machine: SyscallStateMachine,
    decode: DecodeConfig,
    filter: SyscallFilter,
    sinks: Vec<Box<dyn LogSink>>,
    cancel: Arc<AtomicBool>,
    stats: StatsTracker,
    records_emitted: u64,
}

impl<P: ProcessControlPort> TraceSession<P> {
    pub fn new(port: P, decode: DecodeConfig, cancel: Arc<AtomicBool>) -> Self {
        Self {
            port,
            process: None,
            state: SessionState::Idle,
            machine: SyscallStateMachine::new(),
            decode,
            filter: SyscallFilter::all(),
            sinks: Vec::new(),
            cancel,
            stats: StatsTracker::new(),
            records_emitted: 0,
        }
    }

    pub fn with_filter(mut self, filter: SyscallFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn LogSink>) {
        self.sinks.push(sink);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn pid(&self) -> Option<i32> {
        self.process.map(|p| p.pid)
    }

    /// Attach to `pid`; on failure nothing is left behind
    pub fn attach(&mut self, pid: i32) -> Result<(), AttachError> {
        let process = self.port.attach(pid)?;
        info!(pid, "attached");
        self.process = Some(process);
        self.state = SessionState::Attached;
        Ok(())
    }

    /// Trace until the process exits, cancellation, or a port failure
    pub fn run(&mut self) -> Result<SessionSummary, SessionError> {
        let process = match (self.state, self.process) {
            (SessionState::Attached, Some(process)) => process,
            _ => return Err(SessionError::NotAttached),
        };

        let outcome = self.event_loop(&process);
        self.state = SessionState::Terminated;

        // Cleanup failures are logged inside detach and never replace `outcome`
        let _ = self.detach();
        for sink in self.sinks.iter_mut() {
            sink.flush();
        }

        match outcome {
            Ok(termination) => Ok(SessionSummary {
                pid: process.pid,
                termination,
                records_emitted: self.records_emitted,
            }),
            Err(e) => {
                error!(pid = process.pid, error = %e, "tracing aborted");
                Err(SessionError::Port(e))
            }
        }
    }

    fn event_loop(&mut self, process: &TracedProcess) -> Result<Termination, PortError> {
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                info!(pid = process.pid, "cancellation requested, stopping trace");
                return Ok(Termination::Cancelled);
            }

            match self.port.wait_event(process)? {
                TraceEvent::Exited { code } => {
                    let record = self.machine.process_exit_record(process.pid, code);
                    self.dispatch(process, record);
                    info!(pid = process.pid, code, "process exited");
                    return Ok(Termination::Exited(code));
                }
                TraceEvent::SyscallBoundary(regs) => {
                    if let Some(record) = self.machine.handle(process.pid, &regs) {
                        self.dispatch(process, record);
                    }
                    self.port.resume(process)?;
                }
                TraceEvent::Signal { num } => {
                    let record = self.machine.signal_record(process.pid, num);
                    self.dispatch(process, record);
                    self.port.resume(process)?;
                }
            }
        }
    }

    /// Render a record and hand it to every sink, unless it is filtered out
    fn dispatch(&mut self, process: &TracedProcess, record: EventRecord) {
        if let Some(name) = record.syscall_name() {
            if !self.filter.should_trace(&name) {
                return;
            }
        }
        self.stats.observe(&record);
        if self.sinks.is_empty() {
            return;
        }

        let memory = ProcessMemory::new(&self.port, process);
        let rendered = render(&record, &self.decode, &memory);
        for sink in self.sinks.iter_mut() {
            sink.write(&rendered);
        }
        self.records_emitted += 1;
    }

    /// Release the traced process; later calls do nothing
    pub fn detach(&mut self) -> Result<(), PortError> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };
        self.state = SessionState::Terminated;
        match self.port.detach(&mut process) {
            Ok(()) => {
                debug!(pid = process.pid, "detached");
                Ok(())
            }
            Err(e) => {
                warn!(pid = process.pid, error = %e, "detach failed");
                Err(e)
            }
        }
    }
}

impl<P: ProcessControlPort> Drop for TraceSession<P> {
    fn drop(&mut self) {
        let _ = self.detach();
    }
}
