//! Linux ptrace implementation of the process-control port
//!
//! x86_64 only: syscall number in `orig_rax`, arguments in
//! `rdi, rsi, rdx, r10, r8, r9`, return value in `rax`.

use nix::errno::Errno;
use nix::sys::ptrace;
use nix::sys::signal::{kill, Signal};
use nix::sys::uio::{process_vm_readv, RemoteIoVec};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::io::IoSliceMut;
use tracing::{debug, trace, warn};

use crate::error::{AttachError, PortError, ReadError};
use crate::port::{
    AttachStatus, ProcessControlPort, StopHint, SyscallRegs, TraceEvent, TracedProcess,
};

/// The kernel reports `-ENOSYS` in `rax` at every syscall-entry stop
const ENTRY_RAX: i64 = -(libc::ENOSYS as i64);

/// Per-tracee bookkeeping
#[derive(Debug, Default)]
struct Tracee {
    /// Signal to deliver on the next resume
    pending_signal: Option<Signal>,
    /// True between a resume and the next stop
    running: bool,
}

/// Process-control port backed by `ptrace(2)` and `process_vm_readv(2)`
#[derive(Debug, Default)]
pub struct PtracePort {
    tracees: HashMap<i32, Tracee>,
}

impl PtracePort {
    pub fn new() -> Self {
        Self::default()
    }

    fn tracee_mut(&mut self, pid: i32) -> Result<&mut Tracee, PortError> {
        self.tracees.get_mut(&pid).ok_or(PortError::NotAttached)
    }

    /// Stop a running tracee so it can be detached, consuming our SIGSTOP
    fn interrupt(pid: Pid) -> Result<(), PortError> {
        match kill(pid, Signal::SIGSTOP) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Ok(()),
            Err(e) => return Err(PortError::Detach(e.to_string())),
        }
        loop {
            match waitpid(pid, Some(WaitPidFlag::__WALL)) {
                Ok(WaitStatus::Stopped(_, Signal::SIGSTOP)) => return Ok(()),
                Ok(WaitStatus::Stopped(_, sig)) => {
                    trace!(pid = pid.as_raw(), ?sig, "forwarding signal while stopping tracee");
                    cont_ignoring_gone(pid, Some(sig))?;
                }
                Ok(WaitStatus::PtraceSyscall(_)) | Ok(WaitStatus::PtraceEvent(..)) => {
                    cont_ignoring_gone(pid, None)?;
                }
                Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => return Ok(()),
                Ok(_) | Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => return Ok(()),
                Err(e) => return Err(PortError::Detach(e.to_string())),
            }
        }
    }
}

fn cont_ignoring_gone(pid: Pid, sig: Option<Signal>) -> Result<(), PortError> {
    match ptrace::cont(pid, sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(PortError::Detach(e.to_string())),
    }
}

/// `TracerPid` from `/proc/<pid>/status`, if readable
fn tracer_pid(pid: i32) -> Option<i32> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|value| value.trim().parse().ok())
}

fn classify_attach_error(pid: i32, errno: Errno) -> AttachError {
    match errno {
        Errno::ESRCH => AttachError::NotFound { pid },
        Errno::EPERM | Errno::EACCES => match tracer_pid(pid) {
            Some(tracer) if tracer != 0 => AttachError::AlreadyTraced { pid },
            _ => AttachError::PermissionDenied { pid },
        },
        _ => AttachError::PermissionDenied { pid },
    }
}

/// Next step while waiting for the SIGSTOP queued by `PTRACE_ATTACH`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachStop {
    /// The attach stop itself
    Done,
    /// Some other signal stopped the tracee first; continue, injecting this
    Continue(Option<Signal>),
}

/// Classify a signal stop seen before the attach stop
///
/// The first foreign signal is held back in `deferred` and delivered by the
/// first syscall resume; any later one is delivered right away.
fn attach_stop(sig: Signal, deferred: &mut Option<Signal>) -> AttachStop {
    if sig == Signal::SIGSTOP {
        return AttachStop::Done;
    }
    if deferred.is_none() {
        *deferred = Some(sig);
        AttachStop::Continue(None)
    } else {
        AttachStop::Continue(Some(sig))
    }
}

fn read_regs(pid: Pid) -> Result<SyscallRegs, PortError> {
    let regs = ptrace::getregs(pid).map_err(|e| PortError::Registers(e.to_string()))?;
    let ret = regs.rax as i64;
    Ok(SyscallRegs {
        number: regs.orig_rax as i64,
        args: [regs.rdi, regs.rsi, regs.rdx, regs.r10, regs.r8, regs.r9],
        ret,
        hint: if ret == ENTRY_RAX {
            StopHint::Unknown
        } else {
            StopHint::NotEntry
        },
    })
}

impl ProcessControlPort for PtracePort {
    fn attach(&mut self, pid: i32) -> Result<TracedProcess, AttachError> {
        if pid <= 0 {
            return Err(AttachError::NotFound { pid });
        }
        let target = Pid::from_raw(pid);

        ptrace::attach(target).map_err(|e| classify_attach_error(pid, e))?;
        debug!(pid, "PTRACE_ATTACH ok, waiting for attach stop");

        // Anything failing past this point must not leave the process traced
        let settle = || -> Result<(), Errno> {
            let mut deferred = None;
            loop {
                match waitpid(target, Some(WaitPidFlag::__WALL)) {
                    Ok(WaitStatus::Stopped(_, sig)) => match attach_stop(sig, &mut deferred) {
                        AttachStop::Done => break,
                        AttachStop::Continue(inject) => {
                            trace!(pid, ?sig, "signal stop before attach stop");
                            ptrace::cont(target, inject)?;
                        }
                    },
                    Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => {
                        return Err(Errno::ESRCH)
                    }
                    Ok(_) | Err(Errno::EINTR) => continue,
                    Err(e) => return Err(e),
                }
            }
            ptrace::setoptions(
                target,
                ptrace::Options::PTRACE_O_TRACESYSGOOD | ptrace::Options::PTRACE_O_TRACEEXEC,
            )?;
            ptrace::syscall(target, deferred)
        };

        if let Err(errno) = settle() {
            if let Err(e) = ptrace::detach(target, None) {
                debug!(pid, error = %e, "detach after failed attach");
            }
            return Err(match errno {
                Errno::ESRCH | Errno::ECHILD => AttachError::NotFound { pid },
                other => classify_attach_error(pid, other),
            });
        }

        self.tracees.insert(
            pid,
            Tracee {
                pending_signal: None,
                running: true,
            },
        );
        Ok(TracedProcess::attached(pid))
    }

    fn wait_event(&mut self, process: &TracedProcess) -> Result<TraceEvent, PortError> {
        let pid = Pid::from_raw(process.pid);
        loop {
            let status = match waitpid(pid, Some(WaitPidFlag::__WALL)) {
                Ok(status) => status,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(PortError::Wait(e.to_string())),
            };
            trace!(pid = process.pid, ?status, "waitpid");

            match status {
                WaitStatus::PtraceSyscall(_) => {
                    self.tracee_mut(process.pid)?.running = false;
                    return read_regs(pid).map(TraceEvent::SyscallBoundary);
                }
                WaitStatus::Stopped(_, sig) => {
                    let tracee = self.tracee_mut(process.pid)?;
                    tracee.running = false;
                    tracee.pending_signal = Some(sig);
                    return Ok(TraceEvent::Signal { num: sig as i32 });
                }
                WaitStatus::PtraceEvent(..) => {
                    ptrace::syscall(pid, None).map_err(|e| PortError::Resume(e.to_string()))?;
                }
                WaitStatus::Exited(_, code) => {
                    self.tracees.remove(&process.pid);
                    return Ok(TraceEvent::Exited { code });
                }
                WaitStatus::Signaled(_, sig, _) => {
                    self.tracees.remove(&process.pid);
                    return Ok(TraceEvent::Exited {
                        code: 128 + sig as i32,
                    });
                }
                _ => continue,
            }
        }
    }

    fn resume(&mut self, process: &TracedProcess) -> Result<(), PortError> {
        let tracee = self.tracee_mut(process.pid)?;
        let signal = tracee.pending_signal.take();
        ptrace::syscall(Pid::from_raw(process.pid), signal)
            .map_err(|e| PortError::Resume(e.to_string()))?;
        tracee.running = true;
        Ok(())
    }

    fn read_memory(
        &self,
        process: &TracedProcess,
        addr: u64,
        max_len: usize,
    ) -> Result<Vec<u8>, ReadError> {
        let err = ReadError { addr, len: max_len };
        if max_len == 0 {
            return Err(err);
        }
        let mut buf = vec![0u8; max_len];
        let mut local_iov = [IoSliceMut::new(&mut buf)];
        let remote_iov = [RemoteIoVec {
            base: addr as usize,
            len: max_len,
        }];

        let bytes_read = process_vm_readv(Pid::from_raw(process.pid), &mut local_iov, &remote_iov)
            .map_err(|_| err)?;
        if bytes_read == 0 {
            return Err(err);
        }
        buf.truncate(bytes_read);
        Ok(buf)
    }

    fn detach(&mut self, process: &mut TracedProcess) -> Result<(), PortError> {
        if !process.is_attached() {
            return Ok(());
        }
        process.status = AttachStatus::Detached;

        let Some(tracee) = self.tracees.remove(&process.pid) else {
            // Already reaped: nothing left to release
            return Ok(());
        };
        let pid = Pid::from_raw(process.pid);

        let signal = if tracee.running {
            Self::interrupt(pid)?;
            None
        } else {
            tracee.pending_signal
        };

        match ptrace::detach(pid, signal) {
            Ok(()) => {
                debug!(pid = process.pid, "PTRACE_DETACH ok");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                warn!(pid = process.pid, "process vanished before detach");
                Ok(())
            }
            Err(e) => Err(PortError::Detach(e.to_string())),
        }
    }
}
