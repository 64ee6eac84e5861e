//! Scripted process-control port shared by the integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use syswatch::error::{AttachError, PortError, ReadError};
use syswatch::port::{
    AttachStatus, ProcessControlPort, SyscallRegs, TraceEvent, TracedProcess, ARG_REGISTERS,
};

/// Port that replays a fixed list of events against a fake address space
#[derive(Default)]
pub struct ScriptedPort {
    pub events: VecDeque<Result<TraceEvent, PortError>>,
    pub attach_error: Option<AttachError>,
    pub detach_error: Option<PortError>,
    memory: BTreeMap<u64, Vec<u8>>,
    /// Set this flag when the wait with this index (0-based) returns
    cancel_on_wait: Option<(usize, Arc<AtomicBool>)>,
    pub waits: usize,
    pub resumes: usize,
    pub detaches: usize,
    /// Detach count that outlives the port
    pub detach_log: Arc<AtomicUsize>,
    pub memory_reads: std::cell::Cell<usize>,
}

impl ScriptedPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(mut self, number: i64, args: &[u64]) -> Self {
        let mut regs = [0u64; ARG_REGISTERS];
        regs[..args.len()].copy_from_slice(args);
        self.events
            .push_back(Ok(TraceEvent::SyscallBoundary(SyscallRegs::entry(number, regs))));
        self
    }

    pub fn exit(mut self, number: i64, ret: i64) -> Self {
        self.events
            .push_back(Ok(TraceEvent::SyscallBoundary(SyscallRegs::exit(number, ret))));
        self
    }

    pub fn signal(mut self, num: i32) -> Self {
        self.events.push_back(Ok(TraceEvent::Signal { num }));
        self
    }

    pub fn process_exit(mut self, code: i32) -> Self {
        self.events.push_back(Ok(TraceEvent::Exited { code }));
        self
    }

    pub fn port_error(mut self, message: &str) -> Self {
        self.events
            .push_back(Err(PortError::Wait(message.to_string())));
        self
    }

    pub fn map(mut self, addr: u64, bytes: &[u8]) -> Self {
        self.memory.insert(addr, bytes.to_vec());
        self
    }

    pub fn map_pointers(self, addr: u64, pointers: &[u64]) -> Self {
        let bytes: Vec<u8> = pointers.iter().flat_map(|p| p.to_ne_bytes()).collect();
        self.map(addr, &bytes)
    }

    pub fn cancel_on_wait(mut self, index: usize, flag: Arc<AtomicBool>) -> Self {
        self.cancel_on_wait = Some((index, flag));
        self
    }
}

impl ProcessControlPort for ScriptedPort {
    fn attach(&mut self, pid: i32) -> Result<TracedProcess, AttachError> {
        match self.attach_error {
            Some(err) => Err(err),
            None => Ok(TracedProcess::attached(pid)),
        }
    }

    fn wait_event(&mut self, _process: &TracedProcess) -> Result<TraceEvent, PortError> {
        let index = self.waits;
        self.waits += 1;
        if let Some((at, flag)) = &self.cancel_on_wait {
            if *at == index {
                flag.store(true, Ordering::SeqCst);
            }
        }
        self.events
            .pop_front()
            .unwrap_or_else(|| Err(PortError::Wait("script exhausted".into())))
    }

    fn resume(&mut self, _process: &TracedProcess) -> Result<(), PortError> {
        self.resumes += 1;
        Ok(())
    }

    fn read_memory(
        &self,
        _process: &TracedProcess,
        addr: u64,
        max_len: usize,
    ) -> Result<Vec<u8>, ReadError> {
        self.memory_reads.set(self.memory_reads.get() + 1);
        let err = ReadError { addr, len: max_len };
        let (base, bytes) = self.memory.range(..=addr).next_back().ok_or(err)?;
        let offset = (addr - base) as usize;
        if offset >= bytes.len() {
            return Err(err);
        }
        let end = (offset + max_len).min(bytes.len());
        Ok(bytes[offset..end].to_vec())
    }

    fn detach(&mut self, process: &mut TracedProcess) -> Result<(), PortError> {
        self.detaches += 1;
        self.detach_log.fetch_add(1, Ordering::SeqCst);
        process.status = AttachStatus::Detached;
        match self.detach_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
