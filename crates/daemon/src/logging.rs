//! Structured logging setup, lifted from `oj-daemon::main`'s
//! `setup_logging`: a non-blocking, daily-rolling file appender plus an
//! `EnvFilter` defaulting to `info`. Returns the `WorkerGuard` the caller
//! must keep alive for the life of the process — dropping it flushes and
//! stops the background writer thread.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub fn init(log_dir: &Path) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "phd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_env("PROCESS_HERDER_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .json()
        .init();

    Ok(guard)
}
