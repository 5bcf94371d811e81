//! The Health Monitor (spec.md §4.4): periodic CPU/RSS sampling per live
//! process, rolled into a 0-100 health score, with `HealthIssue` events
//! raised only on severity transitions so a process stuck at "warn"
//! doesn't spam the event bus every tick.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use ph_adapters::ProcessSampler;
use ph_core::{Clock, Event, HealthSample, LogStream, ManagedProcess, ProcessId, Severity};

/// Samples retained per process for trend inspection (`get-health-summary`).
pub const SAMPLE_HISTORY_CAPACITY: usize = 60;

#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub cpu_warn_pct: f64,
    pub cpu_high_pct: f64,
    pub cpu_critical_pct: f64,
    pub rss_warn_bytes: u64,
    pub rss_high_bytes: u64,
    pub rss_critical_bytes: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            cpu_warn_pct: 70.0,
            cpu_high_pct: 90.0,
            cpu_critical_pct: 98.0,
            rss_warn_bytes: 512 * 1024 * 1024,
            rss_high_bytes: 1024 * 1024 * 1024,
            rss_critical_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

/// 0 (idle) .. 100 (pegged) composite load score; CPU and memory each
/// contribute up to half, whichever is worse dominates the severity call.
fn score_and_severity(sample: &HealthSample, t: &HealthThresholds) -> (u8, Severity) {
    let cpu_component = (sample.cpu_pct / t.cpu_critical_pct.max(1.0) * 50.0).clamp(0.0, 50.0);
    let mem_component =
        (sample.rss_bytes as f64 / t.rss_critical_bytes.max(1) as f64 * 50.0).clamp(0.0, 50.0);
    let score = (cpu_component + mem_component).round().clamp(0.0, 100.0) as u8;

    let severity = if sample.cpu_pct >= t.cpu_critical_pct || sample.rss_bytes >= t.rss_critical_bytes
    {
        Severity::Critical
    } else if sample.cpu_pct >= t.cpu_high_pct || sample.rss_bytes >= t.rss_high_bytes {
        Severity::High
    } else if sample.cpu_pct >= t.cpu_warn_pct || sample.rss_bytes >= t.rss_warn_bytes {
        Severity::Warn
    } else {
        Severity::Info
    };

    (score, severity)
}

struct ProcessHealthState {
    history: VecDeque<HealthSample>,
    last_severity: Severity,
}

impl Default for ProcessHealthState {
    fn default() -> Self {
        Self {
            history: VecDeque::with_capacity(SAMPLE_HISTORY_CAPACITY),
            last_severity: Severity::Info,
        }
    }
}

pub struct HealthMonitor {
    sampler: Arc<dyn ProcessSampler>,
    thresholds: HealthThresholds,
    state: Mutex<BTreeMap<ProcessId, ProcessHealthState>>,
}

impl HealthMonitor {
    pub fn new(sampler: Arc<dyn ProcessSampler>, thresholds: HealthThresholds) -> Self {
        Self {
            sampler,
            thresholds,
            state: Mutex::new(BTreeMap::new()),
        }
    }

    /// Take one sample of `process`, record it, and return the `HealthIssue`
    /// to raise, if severity crossed into (or further within) a worse band
    /// than last time. Returns `None` if the pid is gone or nothing changed.
    pub async fn sample(
        &self,
        process: &Arc<RwLock<ManagedProcess>>,
        clock: &dyn Clock,
    ) -> Option<HealthSample> {
        let (id, pid, started_at) = {
            let p = process.read();
            (p.id.clone(), p.pid?, p.started_at)
        };

        let reading = self.sampler.sample(pid).await?;
        let error_count = process
            .read()
            .log_ring
            .iter()
            .filter(|e| e.stream == LogStream::Stderr)
            .count() as u32;
        let uptime_ms = clock
            .utc_now()
            .signed_duration_since(started_at)
            .num_milliseconds()
            .max(0) as u64;

        let sample = HealthSample {
            cpu_pct: reading.cpu_pct,
            rss_bytes: reading.rss_bytes,
            uptime_ms,
            error_count,
            at: clock.utc_now(),
        };

        let mut state = self.state.lock();
        let entry = state.entry(id).or_default();
        if entry.history.len() >= SAMPLE_HISTORY_CAPACITY {
            entry.history.pop_front();
        }
        entry.history.push_back(sample);

        Some(sample)
    }

    /// Build and record a synthetic sample for a process that has already
    /// gone terminal (exited/crashed) and so has no live pid left to
    /// sample via `ProcessSampler`. CPU/RSS read as zero; `error_count` and
    /// `uptime_ms` are still derived from the process's own record, so a
    /// recovery strategy keyed on error-count thresholds can still fire
    /// against a process's final state (spec.md §4.5: recovery subscribes
    /// to exit events, not just live health ticks).
    pub fn terminal_sample(&self, process: &ManagedProcess, clock: &dyn Clock) -> HealthSample {
        let error_count = process
            .log_ring
            .iter()
            .filter(|e| e.stream == LogStream::Stderr)
            .count() as u32;
        let uptime_ms = process
            .exited_at
            .unwrap_or_else(|| clock.utc_now())
            .signed_duration_since(process.started_at)
            .num_milliseconds()
            .max(0) as u64;

        let sample = HealthSample {
            cpu_pct: 0.0,
            rss_bytes: 0,
            uptime_ms,
            error_count,
            at: clock.utc_now(),
        };

        let mut state = self.state.lock();
        let entry = state.entry(process.id.clone()).or_default();
        if entry.history.len() >= SAMPLE_HISTORY_CAPACITY {
            entry.history.pop_front();
        }
        entry.history.push_back(sample);

        sample
    }

    /// Evaluate severity for the most recent sample taken via `sample`,
    /// returning an `Event::HealthIssueRaised` only on a severity change.
    pub fn issue_for(&self, process_id: &ProcessId, sample: &HealthSample) -> Option<Event> {
        let (score, severity) = score_and_severity(sample, &self.thresholds);

        let mut state = self.state.lock();
        let entry = state.entry(process_id.clone()).or_default();
        if severity == entry.last_severity {
            return None;
        }
        entry.last_severity = severity;

        if severity == Severity::Info {
            return None;
        }

        Some(Event::HealthIssueRaised(ph_core::HealthIssue {
            process_id: process_id.clone(),
            severity,
            score,
            reason: format!(
                "cpu={:.1}% rss={}MiB",
                sample.cpu_pct,
                sample.rss_bytes / (1024 * 1024)
            ),
            at: sample.at,
        }))
    }

    /// The numeric 0-100 score for `sample`, independent of whether it
    /// crosses a severity band — used by the Recovery Controller to
    /// evaluate `Metric::HealthScore` conditions on every tick, not just
    /// on a change `issue_for` would report.
    pub fn score(&self, sample: &HealthSample) -> u8 {
        score_and_severity(sample, &self.thresholds).0
    }

    pub fn history(&self, process_id: &ProcessId) -> Vec<HealthSample> {
        self.state
            .lock()
            .get(process_id)
            .map(|s| s.history.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn forget(&self, process_id: &ProcessId) {
        self.state.lock().remove(process_id);
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
