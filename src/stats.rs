//! Syscall statistics tracking for -c mode

use std::collections::HashMap;
use std::io::{self, Write};

use crate::record::{EventKind, EventRecord};
use crate::state_machine::is_error_return;

/// Statistics for a single syscall type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyscallStats {
    /// Number of completed calls
    pub count: u64,
    /// Number of calls that returned an errno
    pub errors: u64,
    /// Total time between ENTER and EXIT (microseconds)
    pub total_time_us: u64,
}

/// Summary totals for all syscalls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatTotals {
    pub total_calls: u64,
    pub total_errors: u64,
    pub total_time_us: u64,
}

/// Tracks statistics for all syscalls
#[derive(Debug, Default)]
pub struct StatsTracker {
    /// Map from syscall name to statistics
    stats: HashMap<String, SyscallStats>,
    signals: u64,
}

impl StatsTracker {
    /// Create a new statistics tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a syscall execution
    pub fn record(&mut self, syscall_name: &str, result: i64, duration_us: u64) {
        let entry = self.stats.entry(syscall_name.to_string()).or_default();
        entry.count += 1;
        entry.total_time_us += duration_us;
        if is_error_return(result) {
            entry.errors += 1;
        }
    }

    /// Count an event; only EXIT and SIGNAL records contribute
    pub fn observe(&mut self, record: &EventRecord) {
        match &record.kind {
            EventKind::Exit {
                syscall,
                result_code,
                duration_us,
                ..
            } => self.record(&syscall.name(), *result_code, *duration_us),
            EventKind::Signal { .. } => self.signals += 1,
            _ => {}
        }
    }

    pub fn get(&self, syscall_name: &str) -> Option<&SyscallStats> {
        self.stats.get(syscall_name)
    }

    pub fn signals(&self) -> u64 {
        self.signals
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn totals(&self) -> StatTotals {
        self.stats.values().fold(
            StatTotals {
                total_calls: 0,
                total_errors: 0,
                total_time_us: 0,
            },
            |acc, s| StatTotals {
                total_calls: acc.total_calls + s.count,
                total_errors: acc.total_errors + s.errors,
                total_time_us: acc.total_time_us + s.total_time_us,
            },
        )
    }

    /// Syscalls sorted by call count, busiest first, ties by name
    pub fn sorted(&self) -> Vec<(&str, &SyscallStats)> {
        let mut rows: Vec<(&str, &SyscallStats)> =
            self.stats.iter().map(|(k, v)| (k.as_str(), v)).collect();
        rows.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(b.0)));
        rows
    }

    /// Write the summary table
    pub fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let totals = self.totals();
        writeln!(
            out,
            "{:>6} {:>11} {:>9} {:>9} {:<16}",
            "% calls", "usecs", "calls", "errors", "syscall"
        )?;
        writeln!(out, "{}", "-".repeat(56))?;
        for (name, stats) in self.sorted() {
            let share = if totals.total_calls > 0 {
                stats.count as f64 * 100.0 / totals.total_calls as f64
            } else {
                0.0
            };
            let errors = if stats.errors > 0 {
                stats.errors.to_string()
            } else {
                String::new()
            };
            writeln!(
                out,
                "{:>6.2} {:>11} {:>9} {:>9} {:<16}",
                share, stats.total_time_us, stats.count, errors, name
            )?;
        }
        writeln!(out, "{}", "-".repeat(56))?;
        writeln!(
            out,
            "{:>6.2} {:>11} {:>9} {:>9} {:<16}",
            100.0, totals.total_time_us, totals.total_calls, totals.total_errors, "total"
        )?;
        if self.signals > 0 {
            writeln!(out, "signals delivered: {}", self.signals)?;
        }
        Ok(())
    }

    /// Print the summary table to stderr
    pub fn print_summary(&self) {
        let stderr = io::stderr();
        let mut lock = stderr.lock();
        if let Err(e) = self.write_summary(&mut lock) {
            tracing::warn!("failed to print summary: {}", e);
        }
    }
}
