//! Error types shared across the tracer
//!
//! Attach failures are surfaced before any tracing starts, port failures end a
//! running session, and read failures never leave the decoder.

use thiserror::Error;

/// Reason a process could not be attached to
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachError {
    #[error("process {pid} not found")]
    NotFound { pid: i32 },

    #[error("permission denied attaching to process {pid}")]
    PermissionDenied { pid: i32 },

    #[error("process {pid} is already being traced")]
    AlreadyTraced { pid: i32 },
}

/// Unexpected failure from the process-control layer while tracing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("waitpid failed: {0}")]
    Wait(String),

    #[error("failed to resume process: {0}")]
    Resume(String),

    #[error("failed to read registers: {0}")]
    Registers(String),

    #[error("failed to detach: {0}")]
    Detach(String),

    #[error("process is not attached")]
    NotAttached,
}

/// Memory in the traced process could not be read
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot read {len} bytes at {addr:#x}")]
pub struct ReadError {
    pub addr: u64,
    pub len: usize,
}

/// Rejected decode configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("string_max_length must be between 1 and {max}, got {actual}")]
    StringMaxLength { max: usize, actual: usize },

    #[error("max_array_count must be between 1 and {max}, got {actual}")]
    MaxArrayCount { max: usize, actual: usize },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Rejected `-e trace=` expression
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid filter expression: {0}. Expected format: trace=SPEC")]
    InvalidExpression(String),

    #[error("empty syscall name in filter expression")]
    EmptyName,

    #[error("invalid regex pattern /{pattern}/: {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

/// Session-level failure reported to the caller after cleanup has run
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error("tracing aborted: {0}")]
    Port(#[from] PortError),

    #[error("session is not attached")]
    NotAttached,
}
