use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use syswatch::cli::Cli;
use syswatch::config::{DecodeConfig, TraceConfig};
use syswatch::filter::SyscallFilter;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Merge the optional config file with CLI flags
fn build_config(args: &Cli) -> Result<TraceConfig> {
    let base = match &args.config {
        Some(path) => DecodeConfig::from_toml_file(path)?,
        None => DecodeConfig::default(),
    };
    let decode = args.decode_config(base);
    decode.validate()?;

    let filter = match &args.filter {
        Some(expr) => SyscallFilter::from_expr(expr)?,
        None => SyscallFilter::all(),
    };

    Ok(TraceConfig {
        decode,
        filter,
        log_dir: args.log_dir.clone(),
        console: !args.quiet,
        summary: args.summary,
        duration: args.duration.map(Duration::from_secs),
    })
}

/// Cancellation flag set by Ctrl-C and, optionally, a timer
fn install_cancellation(duration: Option<Duration>) -> Result<Arc<AtomicBool>> {
    let cancel = Arc::new(AtomicBool::new(false));

    let flag = cancel.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl-C handler")?;

    if let Some(limit) = duration {
        let flag = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(limit);
            flag.store(true, Ordering::SeqCst);
        });
    }

    Ok(cancel)
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn run_tracer(args: &Cli, config: TraceConfig) -> Result<()> {
    use syswatch::ptrace_port::PtracePort;
    use syswatch::session::{TraceSession, Termination};
    use syswatch::sink::{HumanSink, SessionLogDir};

    let cancel = install_cancellation(config.duration)?;
    let mut session =
        TraceSession::new(PtracePort::new(), config.decode, cancel).with_filter(config.filter);

    // Nothing is written to disk until the attach has succeeded
    session
        .attach(args.pid)
        .with_context(|| format!("Failed to attach to PID {}", args.pid))?;

    let log_dir = SessionLogDir::create(&config.log_dir, args.pid, chrono::Local::now())
        .context("Failed to create log directory")?;
    for sink in log_dir
        .open_sinks()
        .context("Failed to open log files")?
    {
        session.add_sink(sink);
    }
    if config.console {
        session.add_sink(Box::new(HumanSink::stderr()));
    }

    eprintln!(
        "[syswatch: Attached to process {}. Press Ctrl-C to stop.]",
        args.pid
    );
    let result = session.run();
    eprintln!("[syswatch: Logs saved to {}]", log_dir.path().display());

    if config.summary {
        session.stats().print_summary();
    }

    match result?.termination {
        Termination::Exited(code) => {
            eprintln!("[syswatch: Process {} exited with code {}]", args.pid, code)
        }
        Termination::Cancelled => {
            eprintln!("[syswatch: Detached from process {}]", args.pid)
        }
    }
    Ok(())
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
fn run_tracer(_args: &Cli, _config: TraceConfig) -> Result<()> {
    anyhow::bail!("syswatch only supports Linux on x86_64");
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = build_config(&args)?;
    run_tracer(&args, config)
}
