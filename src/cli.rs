//! CLI argument parsing for syswatch

use clap::Parser;
use std::path::PathBuf;

use crate::config::DecodeConfig;

#[derive(Parser, Debug)]
#[command(name = "syswatch")]
#[command(version)]
#[command(about = "Attach to a running process and record its system calls", long_about = None)]
pub struct Cli {
    /// Attach to running process by PID
    #[arg(short = 'p', long = "pid", value_name = "PID")]
    pub pid: i32,

    /// Filter syscalls to trace (e.g., -e trace=open,read,write or -e trace=file)
    #[arg(short = 'e', long = "expr", value_name = "EXPR")]
    pub filter: Option<String>,

    /// Maximum bytes read for a string argument
    #[arg(short = 's', long = "string-limit", value_name = "BYTES")]
    pub string_max_length: Option<usize>,

    /// Maximum elements read for an array argument
    #[arg(long = "array-limit", value_name = "COUNT")]
    pub max_array_count: Option<usize>,

    /// Do not prefix arguments with their C type
    #[arg(long = "no-types")]
    pub no_types: bool,

    /// Do not show raw pointers next to decoded strings
    #[arg(long = "no-addresses")]
    pub no_addresses: bool,

    /// Do not prefix arguments with their parameter name
    #[arg(long = "no-arg-names")]
    pub no_arg_names: bool,

    /// TOML file with decode options (flags override it)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory that receives one trace-<pid>-<time> folder per session
    #[arg(long = "log-dir", value_name = "DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Do not echo records to stderr
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Show a per-syscall summary after detaching
    #[arg(short = 'c', long = "summary")]
    pub summary: bool,

    /// Stop tracing after this many seconds
    #[arg(long = "duration", value_name = "SECS")]
    pub duration: Option<u64>,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Apply decode flags on top of `base`
    pub fn decode_config(&self, base: DecodeConfig) -> DecodeConfig {
        DecodeConfig {
            string_max_length: self.string_max_length.unwrap_or(base.string_max_length),
            max_array_count: self.max_array_count.unwrap_or(base.max_array_count),
            include_types: base.include_types && !self.no_types,
            include_addresses: base.include_addresses && !self.no_addresses,
            include_argument_names: base.include_argument_names && !self.no_arg_names,
        }
    }
}
