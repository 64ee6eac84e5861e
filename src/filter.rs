//! Syscall filtering for -e trace= expressions
//!
//! Supports:
//! - Individual syscalls: -e trace=open,read,write
//! - Syscall classes: -e trace=file, -e trace=network, -e trace=process
//! - Negation: -e trace=!close,!memory
//! - Regex patterns: -e trace=/^open/
//!
//! A syscall is traced when it matches no negated entry and either there are
//! no positive entries or it matches one of them.

use regex::Regex;
use std::collections::HashSet;

use crate::error::FilterError;

const FILE_CLASS: &[&str] = &[
    "open", "openat", "creat", "close", "read", "write", "pread64", "pwrite64", "readv",
    "writev", "lseek", "stat", "fstat", "lstat", "newfstatat", "statx", "access", "faccessat2",
    "mkdir", "rmdir", "unlink", "unlinkat", "rename", "link", "symlink", "readlink",
    "readlinkat", "chmod", "fchmod", "chown", "fchown", "lchown", "truncate", "ftruncate",
    "getdents", "getdents64", "chdir", "fchdir", "getcwd",
];

const NETWORK_CLASS: &[&str] = &[
    "socket", "socketpair", "connect", "accept", "accept4", "bind", "listen", "sendto",
    "recvfrom", "sendmsg", "recvmsg", "shutdown", "setsockopt", "getsockopt", "getsockname",
    "getpeername",
];

const PROCESS_CLASS: &[&str] = &[
    "fork", "vfork", "clone", "clone3", "execve", "execveat", "exit", "exit_group", "wait4",
    "kill",
];

const MEMORY_CLASS: &[&str] = &[
    "mmap", "munmap", "mprotect", "mremap", "msync", "mincore", "madvise", "brk",
];

const SIGNAL_CLASS: &[&str] = &[
    "rt_sigaction", "rt_sigprocmask", "rt_sigreturn", "sigaltstack", "kill", "pause", "alarm",
];

fn class_members(name: &str) -> Option<&'static [&'static str]> {
    match name {
        "file" => Some(FILE_CLASS),
        "network" => Some(NETWORK_CLASS),
        "process" => Some(PROCESS_CLASS),
        "memory" => Some(MEMORY_CLASS),
        "signal" => Some(SIGNAL_CLASS),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
struct Rules {
    names: HashSet<String>,
    patterns: Vec<Regex>,
}

impl Rules {
    fn is_empty(&self) -> bool {
        self.names.is_empty() && self.patterns.is_empty()
    }

    fn matches(&self, name: &str) -> bool {
        self.names.contains(name) || self.patterns.iter().any(|re| re.is_match(name))
    }
}

/// Syscall filter that determines which syscalls to trace
#[derive(Debug, Clone, Default)]
pub struct SyscallFilter {
    include: Rules,
    exclude: Rules,
}

impl SyscallFilter {
    /// Create a filter that includes all syscalls
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a filter expression like "trace=open,read,write" or "trace=file"
    pub fn from_expr(expr: &str) -> Result<Self, FilterError> {
        let spec = expr
            .strip_prefix("trace=")
            .ok_or_else(|| FilterError::InvalidExpression(expr.to_string()))?;

        let mut filter = Self::all();
        for part in spec.split(',') {
            let part = part.trim();
            let (rules, entry) = match part.strip_prefix('!') {
                Some(rest) => (&mut filter.exclude, rest.trim()),
                None => (&mut filter.include, part),
            };

            if entry == "all" {
                continue;
            }
            if let Some(pattern) = entry
                .strip_prefix('/')
                .and_then(|rest| rest.strip_suffix('/'))
            {
                let re = Regex::new(pattern).map_err(|e| FilterError::InvalidRegex {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                })?;
                rules.patterns.push(re);
            } else if let Some(members) = class_members(entry) {
                rules.names.extend(members.iter().map(|s| s.to_string()));
            } else if entry.is_empty() {
                return Err(FilterError::EmptyName);
            } else {
                rules.names.insert(entry.to_string());
            }
        }

        Ok(filter)
    }

    /// Check if a syscall should be traced
    pub fn should_trace(&self, syscall: &str) -> bool {
        if self.exclude.matches(syscall) {
            return false;
        }
        self.include.is_empty() || self.include.matches(syscall)
    }

    /// True when the filter lets every syscall through
    pub fn is_all(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

impl std::str::FromStr for SyscallFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_expr(s)
    }
}
