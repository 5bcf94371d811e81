//! The Readiness Engine (spec.md §4.3): polls a process's configured
//! port/HTTP/log-pattern probe until it succeeds, times out, the process
//! exits early, or the caller cancels.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use ph_adapters::{matches_pattern, HttpProbe, PortProbe};
use ph_core::{LogEntry, ManagedProcess, ReadinessOutcome, ReadinessResult, ReadinessSpec};
use tokio::sync::{broadcast, watch};

/// Evaluate `spec` against a live process. `log_rx` must be `Some` when
/// `spec` is a log-pattern probe (the caller subscribes to the process's
/// `ProcessHandle::log_tx` before calling); it's ignored for port/HTTP
/// probes.
///
/// `cancel` is a `watch<bool>` the caller flips to `true` to interrupt a
/// probe in progress (e.g. the daemon is shutting down).
pub async fn evaluate(
    process: &Arc<RwLock<ManagedProcess>>,
    spec: &ReadinessSpec,
    port_probe: &dyn PortProbe,
    http_probe: &dyn HttpProbe,
    mut log_rx: Option<broadcast::Receiver<LogEntry>>,
    mut cancel: watch::Receiver<bool>,
) -> ReadinessResult {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(spec.timeout_ms());

    loop {
        if *cancel.borrow() {
            return ReadinessResult::failure(ReadinessOutcome::Cancelled, "readiness cancelled");
        }
        if process.read().state.is_terminal() {
            return ReadinessResult::failure(
                ReadinessOutcome::EarlyExit,
                "process exited before becoming ready",
            );
        }
        if tokio::time::Instant::now() >= deadline {
            return ReadinessResult::failure(ReadinessOutcome::Timeout, "readiness timed out");
        }

        let ready = match spec {
            ReadinessSpec::Port { port, .. } => port_probe.check(*port).await,
            ReadinessSpec::Http { url, .. } => http_probe.check(url).await.unwrap_or(false),
            ReadinessSpec::Log { pattern, .. } => log_rx
                .as_mut()
                .map(|rx| drain_for_match(rx, pattern))
                .unwrap_or(false),
        };
        if ready {
            return ReadinessResult::success();
        }

        let interval_ms = match spec {
            ReadinessSpec::Port { interval_ms, .. } | ReadinessSpec::Http { interval_ms, .. } => {
                *interval_ms
            }
            // Log matching reacts to each new line as it arrives rather
            // than polling, but we still need a bound on how often we
            // re-check the terminal/cancel/deadline conditions above.
            ReadinessSpec::Log { .. } => 100,
        };

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {}
            _ = cancel.changed() => {}
        }
    }
}

/// Drain every log line currently buffered on `rx` and report whether any
/// matched. Lagging (ring overflow on the broadcast channel) is treated
/// as "keep going" rather than a hard failure.
fn drain_for_match(
    rx: &mut broadcast::Receiver<LogEntry>,
    pattern: &ph_core::LogPattern,
) -> bool {
    loop {
        match rx.try_recv() {
            Ok(entry) => {
                if matches_pattern(pattern, &entry.line) {
                    return true;
                }
            }
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return false,
        }
    }
}

#[cfg(test)]
#[path = "readiness_tests.rs"]
mod tests;
