//! Reattach support: probing the OS for a surviving pid (spec.md §4.6).

use chrono::{DateTime, Utc};
use ph_core::{LogEntry, LogRing, LogStream, ManagedProcess, ProcessState};
use sysinfo::{Pid, System};

/// Tolerance on process start-time drift when matching a recorded pid
/// against the live OS process table (spec.md §4.6: "±2 s").
pub const START_TIME_TOLERANCE_SECS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReattachOutcome {
    /// A live process at `pid` was found whose start time matches.
    Matched,
    /// No live process at `pid`, or its start time doesn't match.
    Discarded,
}

/// Probe the OS for a live process at `pid` whose start time is within
/// [`START_TIME_TOLERANCE_SECS`] of `expected_started_at`.
pub fn probe_liveness(
    system: &mut System,
    pid: u32,
    expected_started_at: DateTime<Utc>,
) -> ReattachOutcome {
    let sys_pid = Pid::from_u32(pid);
    system.refresh_process(sys_pid);

    let Some(process) = system.process(sys_pid) else {
        return ReattachOutcome::Discarded;
    };

    // sysinfo reports start time as seconds since the Unix epoch.
    let actual_secs = process.start_time() as i64;
    let expected_secs = expected_started_at.timestamp();
    if (actual_secs - expected_secs).abs() <= START_TIME_TOLERANCE_SECS {
        ReattachOutcome::Matched
    } else {
        ReattachOutcome::Discarded
    }
}

/// Filter a snapshot's processes down to those whose recorded pid is still
/// alive with a matching start time (spec.md §4.6). Survivors are
/// transitioned to `Reattached` and given a fresh log ring carrying a
/// synthetic line recording the reattachment; historical log content is
/// lost by design. Discarded entries are simply dropped — the caller never
/// re-inserts them.
pub fn reattach_processes(processes: Vec<ManagedProcess>, now: DateTime<Utc>) -> Vec<ManagedProcess> {
    let mut system = System::new();
    processes
        .into_iter()
        .filter_map(|mut process| {
            let pid = process.pid?;
            match probe_liveness(&mut system, pid, process.started_at) {
                ReattachOutcome::Matched => {
                    process.state = ProcessState::Reattached;
                    process.log_ring = LogRing::default();
                    process.log_ring.push(LogEntry {
                        stream: LogStream::Stdout,
                        line: "reattached from prior session".to_string(),
                        at: now,
                    });
                    Some(process)
                }
                ReattachOutcome::Discarded => None,
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "reattach_tests.rs"]
mod tests;
