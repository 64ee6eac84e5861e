//! Process-control port
//!
//! The tracer never talks to ptrace directly. Everything it needs from the
//! operating system goes through [`ProcessControlPort`], which keeps the
//! session loop testable with scripted ports.

use crate::error::{AttachError, PortError, ReadError};

/// Number of argument registers captured per syscall
pub const ARG_REGISTERS: usize = 6;

/// Attachment status of a traced process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachStatus {
    Attached,
    Detached,
}

/// Handle to a process the port is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracedProcess {
    pub pid: i32,
    pub status: AttachStatus,
}

impl TracedProcess {
    pub fn attached(pid: i32) -> Self {
        Self {
            pid,
            status: AttachStatus::Attached,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.status == AttachStatus::Attached
    }
}

/// What the port can tell about the direction of a syscall stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopHint {
    /// No architectural hint, trust the enter/exit toggle
    #[default]
    Unknown,
    /// Registers prove this stop is not a syscall entry
    NotEntry,
}

/// Register snapshot taken at a syscall stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallRegs {
    pub number: i64,
    pub args: [u64; ARG_REGISTERS],
    /// Return register; only meaningful at exit
    pub ret: i64,
    pub hint: StopHint,
}

impl SyscallRegs {
    /// Registers as they look at a syscall entry
    pub fn entry(number: i64, args: [u64; ARG_REGISTERS]) -> Self {
        Self {
            number,
            args,
            ret: 0,
            hint: StopHint::Unknown,
        }
    }

    /// Registers as they look at a syscall exit
    pub fn exit(number: i64, ret: i64) -> Self {
        Self {
            number,
            args: [0; ARG_REGISTERS],
            ret,
            hint: StopHint::Unknown,
        }
    }
}

/// Result of waiting for the traced process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// The process is gone; killed processes report `128 + signal`
    Exited { code: i32 },
    /// The process stopped at a syscall entry or exit
    SyscallBoundary(SyscallRegs),
    /// A signal is about to be delivered to the process
    Signal { num: i32 },
}

/// Read-only access to the traced process's address space
pub trait MemoryReader {
    /// Read up to `max_len` bytes at `addr`
    ///
    /// Short reads are allowed when the range runs into unmapped memory.
    /// Zero readable bytes is an error.
    fn read_memory(&self, addr: u64, max_len: usize) -> Result<Vec<u8>, ReadError>;
}

/// Primitives supplied by the operating system's trace facility
pub trait ProcessControlPort {
    fn attach(&mut self, pid: i32) -> Result<TracedProcess, AttachError>;

    /// Block until the next event of interest
    fn wait_event(&mut self, process: &TracedProcess) -> Result<TraceEvent, PortError>;

    /// Let the process run to its next syscall boundary
    fn resume(&mut self, process: &TracedProcess) -> Result<(), PortError>;

    fn read_memory(
        &self,
        process: &TracedProcess,
        addr: u64,
        max_len: usize,
    ) -> Result<Vec<u8>, ReadError>;

    /// Release the process; calling it on a detached process is a no-op
    fn detach(&mut self, process: &mut TracedProcess) -> Result<(), PortError>;
}

/// Memory view of one traced process through its port
pub struct ProcessMemory<'a, P: ?Sized> {
    port: &'a P,
    process: &'a TracedProcess,
}

impl<'a, P: ProcessControlPort + ?Sized> ProcessMemory<'a, P> {
    pub fn new(port: &'a P, process: &'a TracedProcess) -> Self {
        Self { port, process }
    }
}

impl<P: ProcessControlPort + ?Sized> MemoryReader for ProcessMemory<'_, P> {
    fn read_memory(&self, addr: u64, max_len: usize) -> Result<Vec<u8>, ReadError> {
        self.port.read_memory(self.process, addr, max_len)
    }
}

/// Memory reader that fails every read
///
/// Used where no process is available, e.g. when rendering records after the
/// process has exited.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemory;

impl MemoryReader for NoMemory {
    fn read_memory(&self, addr: u64, max_len: usize) -> Result<Vec<u8>, ReadError> {
        Err(ReadError { addr, len: max_len })
    }
}
