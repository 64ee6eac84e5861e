//! syswatch - attach to a running process and record its system calls
//!
//! This library provides the syscall state machine, argument decoder and trace
//! session used by the `syswatch` binary. The operating system's trace
//! facility sits behind [`port::ProcessControlPort`], so everything above it
//! can be driven by scripted ports in tests.

pub mod cli;
pub mod config;
pub mod decoder;
pub mod error;
pub mod filter;
pub mod port;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub mod ptrace_port;
pub mod record;
pub mod session;
pub mod sink;
pub mod state_machine;
pub mod stats;
pub mod syscalls;
