#![no_main]

use libfuzzer_sys::fuzz_target;
use syswatch::filter::SyscallFilter;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing must never panic, and a parsed filter must answer any name
        if let Ok(filter) = SyscallFilter::from_expr(input) {
            let _ = filter.should_trace("openat");
            let _ = filter.should_trace(input);
        }
    }
});
