//! Per-process ENTER/EXIT tracking
//!
//! A process has a [`PendingSyscall`] exactly when its next syscall stop is an
//! exit. Signals and process exits never touch that state, so records for one
//! pid always alternate ENTER, EXIT, ENTER, ...

use chrono::{DateTime, Local};
use nix::errno::Errno;
use std::collections::HashMap;
use tracing::debug;

use crate::decoder::arguments;
use crate::port::{StopHint, SyscallRegs};
use crate::record::{EventKind, EventRecord};
use crate::syscalls::{ReturnType, SyscallInfo};

/// Largest errno the kernel returns as `-errno`
const MAX_ERRNO: i64 = 4095;

/// Syscall captured at ENTER, waiting for its EXIT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSyscall {
    pub syscall: SyscallInfo,
    pub args: Vec<u64>,
    pub entered_at: DateTime<Local>,
}

/// Tracks the syscall phase of every traced pid
#[derive(Debug, Default)]
pub struct SyscallStateMachine {
    pending: HashMap<i32, PendingSyscall>,
}

impl SyscallStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a syscall stop observed now
    pub fn handle(&mut self, pid: i32, regs: &SyscallRegs) -> Option<EventRecord> {
        self.handle_at(pid, regs, Local::now())
    }

    /// Handle a syscall stop observed at `timestamp`
    ///
    /// Returns `None` only for an exit stop of a syscall whose entry happened
    /// before we attached.
    pub fn handle_at(
        &mut self,
        pid: i32,
        regs: &SyscallRegs,
        timestamp: DateTime<Local>,
    ) -> Option<EventRecord> {
        match self.pending.remove(&pid) {
            None => {
                if regs.hint == StopHint::NotEntry {
                    debug!(pid, number = regs.number, "skipping exit of syscall entered before attach");
                    return None;
                }
                Some(self.enter(pid, regs, timestamp))
            }
            Some(pending) => Some(Self::exit(pid, pending, regs.ret, timestamp)),
        }
    }

    fn enter(&mut self, pid: i32, regs: &SyscallRegs, timestamp: DateTime<Local>) -> EventRecord {
        let syscall = SyscallInfo::resolve(regs.number);
        let arguments = arguments(&syscall, &regs.args);
        let args = arguments.iter().map(|arg| arg.raw).collect();

        self.pending.insert(
            pid,
            PendingSyscall {
                syscall,
                args,
                entered_at: timestamp,
            },
        );

        EventRecord {
            pid,
            timestamp,
            kind: EventKind::Enter { syscall, arguments },
        }
    }

    fn exit(pid: i32, pending: PendingSyscall, ret: i64, timestamp: DateTime<Local>) -> EventRecord {
        let duration_us = (timestamp - pending.entered_at)
            .num_microseconds()
            .unwrap_or(0)
            .max(0) as u64;
        EventRecord {
            pid,
            timestamp,
            kind: EventKind::Exit {
                syscall: pending.syscall,
                result_code: ret,
                result_text: format_result(&pending.syscall, ret),
                duration_us,
            },
        }
    }

    /// Record for a signal about to be delivered; pending state is untouched
    pub fn signal_record(&self, pid: i32, signal: i32) -> EventRecord {
        EventRecord {
            pid,
            timestamp: Local::now(),
            kind: EventKind::Signal { signal },
        }
    }

    /// Terminal record for a process that exited; drops its pending syscall
    pub fn process_exit_record(&mut self, pid: i32, code: i32) -> EventRecord {
        if let Some(pending) = self.pending.remove(&pid) {
            debug!(pid, syscall = %pending.syscall.name(), "process exited inside syscall");
        }
        EventRecord {
            pid,
            timestamp: Local::now(),
            kind: EventKind::ExitProcess { code },
        }
    }

    pub fn pending(&self, pid: i32) -> Option<&PendingSyscall> {
        self.pending.get(&pid)
    }

    /// True when the next syscall stop of `pid` is an EXIT
    pub fn expects_exit(&self, pid: i32) -> bool {
        self.pending.contains_key(&pid)
    }
}

/// True for return values in the kernel's `-errno` range
pub fn is_error_return(ret: i64) -> bool {
    (-MAX_ERRNO..=-1).contains(&ret)
}

fn format_errno(ret: i64) -> String {
    let errno = Errno::from_raw((-ret) as i32);
    if errno == Errno::UnknownErrno {
        format!("-1 errno {}", -ret)
    } else {
        format!("-1 {:?} ({})", errno, errno.desc())
    }
}

/// Interpret a return value according to the syscall's semantics
pub fn format_result(syscall: &SyscallInfo, ret: i64) -> String {
    match syscall.return_type() {
        Some(ReturnType::NoReturn) => "?".to_string(),
        Some(_) if is_error_return(ret) => format_errno(ret),
        Some(ReturnType::Addr) => format!("{:#x}", ret as u64),
        Some(ReturnType::Int) => ret.to_string(),
        None => ret.to_string(),
    }
}
