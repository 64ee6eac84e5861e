#![no_main]

use libfuzzer_sys::fuzz_target;
use syswatch::config::DecodeConfig;
use syswatch::error::ReadError;
use syswatch::port::{MemoryReader, SyscallRegs};
use syswatch::record::render;
use syswatch::state_machine::SyscallStateMachine;

const BASE: u64 = 0x1000;

/// Tracee memory made of fuzzer bytes, mapped at `BASE`
struct Bytes<'a>(&'a [u8]);

impl MemoryReader for Bytes<'_> {
    fn read_memory(&self, addr: u64, max_len: usize) -> Result<Vec<u8>, ReadError> {
        let err = ReadError { addr, len: max_len };
        let offset = addr.checked_sub(BASE).ok_or(err)? as usize;
        if offset >= self.0.len() {
            return Err(err);
        }
        let end = offset.saturating_add(max_len).min(self.0.len());
        Ok(self.0[offset..end].to_vec())
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    // First byte picks the syscall, second the string limit
    let number = i64::from(data[0]) + 1;
    let config = DecodeConfig {
        string_max_length: usize::from(data[1]) + 1,
        max_array_count: 4,
        ..Default::default()
    };
    let memory = Bytes(&data[2..]);

    // Arguments point into (or just past) the fuzzed region
    let args = [BASE, BASE + 8, BASE + 16, 0, BASE + 64, u64::MAX];
    let mut machine = SyscallStateMachine::new();
    if let Some(record) = machine.handle(1, &SyscallRegs::entry(number, args)) {
        let _ = render(&record, &config, &memory);
    }
});
