//! Event records and their two renderings
//!
//! An [`EventRecord`] is built once per boundary crossing and never changes.
//! [`render`] turns it into the structured record (one JSON object) and the
//! human line that sinks consume.

use chrono::{DateTime, Local};
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::DecodeConfig;
use crate::decoder::{decode_value, label_argument, Argument};
use crate::port::MemoryReader;
use crate::syscalls::SyscallInfo;

/// Timestamp format of human lines and log directory names
pub const HUMAN_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Syscall phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Enter,
    Exit,
}

/// `event_type` field of the structured record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Enter,
    Exit,
    Signal,
    ExitProcess,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Enter => "ENTER",
            EventType::Exit => "EXIT",
            EventType::Signal => "SIGNAL",
            EventType::ExitProcess => "EXIT_PROCESS",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity shown in the human line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    Info,
    Warning,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Padding applies to the whole level name
        f.pad(match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
        })
    }
}

/// What happened at one boundary crossing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Enter {
        syscall: SyscallInfo,
        arguments: Vec<Argument>,
    },
    Exit {
        syscall: SyscallInfo,
        result_code: i64,
        result_text: String,
        /// Time between ENTER and EXIT
        duration_us: u64,
    },
    Signal {
        signal: i32,
    },
    ExitProcess {
        code: i32,
    },
}

/// Immutable snapshot of one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub pid: i32,
    pub timestamp: DateTime<Local>,
    pub kind: EventKind,
}

impl EventRecord {
    pub fn event_type(&self) -> EventType {
        match self.kind {
            EventKind::Enter { .. } => EventType::Enter,
            EventKind::Exit { .. } => EventType::Exit,
            EventKind::Signal { .. } => EventType::Signal,
            EventKind::ExitProcess { .. } => EventType::ExitProcess,
        }
    }

    /// ENTER/EXIT phase; `None` for phase-neutral records
    pub fn phase(&self) -> Option<Phase> {
        match self.kind {
            EventKind::Enter { .. } => Some(Phase::Enter),
            EventKind::Exit { .. } => Some(Phase::Exit),
            _ => None,
        }
    }

    pub fn syscall(&self) -> Option<&SyscallInfo> {
        match &self.kind {
            EventKind::Enter { syscall, .. } | EventKind::Exit { syscall, .. } => Some(syscall),
            _ => None,
        }
    }

    pub fn syscall_name(&self) -> Option<String> {
        self.syscall().map(|s| s.name().into_owned())
    }

    pub fn level(&self) -> Level {
        match self.kind {
            EventKind::Signal { .. } => Level::Warning,
            _ => Level::Info,
        }
    }
}

/// Argument entry of the structured record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredArgument {
    pub raw_value: u64,
    pub decoded_text: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
}

/// Machine-readable form of an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredRecord {
    pub event_type: EventType,
    pub level: Level,
    pub pid: i32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub syscall_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub syscall_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub arguments: Option<Vec<StructuredArgument>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration_us: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signal: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exit_code: Option<i32>,
    pub timestamp: DateTime<Local>,
    /// Same text as the human line's message
    pub message: String,
}

/// Human-readable form of an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanLine {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub message: String,
}

impl fmt::Display for HumanLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {:<8} | {}",
            self.timestamp.format(HUMAN_TIME_FORMAT),
            self.level,
            self.message
        )
    }
}

/// Both renderings of one record, handed to every sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEvent {
    pub structured: StructuredRecord,
    pub human: HumanLine,
}

fn signal_label(num: i32) -> String {
    match Signal::try_from(num) {
        Ok(sig) => format!("{} ({})", sig.as_str(), num),
        Err(_) => format!("signal {}", num),
    }
}

/// Render a record, decoding ENTER arguments through `memory`
///
/// Must be called while the traced process is still stopped at the event,
/// otherwise pointer arguments may read changed memory.
pub fn render(
    record: &EventRecord,
    config: &DecodeConfig,
    memory: &dyn MemoryReader,
) -> RenderedEvent {
    let event_type = record.event_type();
    let level = record.level();
    let mut structured = StructuredRecord {
        event_type,
        level,
        pid: record.pid,
        syscall_name: record.syscall_name(),
        syscall_id: record.syscall().map(|s| s.number()),
        arguments: None,
        result_code: None,
        result_text: None,
        duration_us: None,
        signal: None,
        exit_code: None,
        timestamp: record.timestamp,
        message: String::new(),
    };

    let message = match &record.kind {
        EventKind::Enter { syscall, arguments } => {
            // One decode per argument feeds both forms, so they cannot disagree
            let mut rendered = Vec::with_capacity(arguments.len());
            let mut structured_args = Vec::with_capacity(arguments.len());
            for arg in arguments {
                let value = decode_value(arg, config, memory);
                rendered.push(label_argument(arg, config, value.clone()));
                structured_args.push(StructuredArgument {
                    raw_value: arg.raw,
                    decoded_text: value,
                    type_name: config
                        .include_types
                        .then(|| arg.type_name())
                        .flatten()
                        .map(str::to_string),
                    name: config
                        .include_argument_names
                        .then(|| arg.name())
                        .flatten()
                        .map(str::to_string),
                });
            }
            structured.arguments = Some(structured_args);
            format!(
                "{}: PID={} | {}({})",
                event_type,
                record.pid,
                syscall.name(),
                rendered.join(", ")
            )
        }
        EventKind::Exit {
            syscall,
            result_code,
            result_text,
            duration_us,
        } => {
            structured.result_code = Some(*result_code);
            structured.result_text = Some(result_text.clone());
            structured.duration_us = Some(*duration_us);
            format!("{}: {} = {}", event_type, syscall.name(), result_text)
        }
        EventKind::Signal { signal } => {
            structured.signal = Some(*signal);
            format!("{}: PID={} | {}", event_type, record.pid, signal_label(*signal))
        }
        EventKind::ExitProcess { code } => {
            structured.exit_code = Some(*code);
            structured.result_code = Some(i64::from(*code));
            format!("{}: PID={} | code={}", event_type, record.pid, code)
        }
    };

    structured.message = message.clone();
    RenderedEvent {
        structured,
        human: HumanLine {
            timestamp: record.timestamp,
            level,
            message,
        },
    }
}
