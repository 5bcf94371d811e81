//! The Recovery Controller (spec.md §4.5): watches health samples against
//! a process's attached `RecoveryStrategy` and fires its actions once all
//! conditions have held continuously for their required duration,
//! respecting cooldown and a max-attempts ceiling.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;
use ph_core::{Clock, ClockInstant, Condition, Event, HealthSample, Metric, ProcessId, RecoveryStrategy};

#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryVerdict {
    /// Conditions aren't (yet, or no longer) all satisfied.
    NotDue,
    /// Still within the hold duration or cooldown window.
    Pending,
    /// Fire this strategy's actions now; this is attempt number `attempt`.
    Fire { attempt: u32 },
    /// `max_attempts` already reached; emit `RecoveryExhausted` and stop
    /// trying until the strategy is reconfigured.
    Exhausted,
}

struct AttemptState {
    attempts: u32,
    held_since: Option<ClockInstant>,
    last_fired_at: Option<ClockInstant>,
    exhausted_notified: bool,
}

impl Default for AttemptState {
    fn default() -> Self {
        Self {
            attempts: 0,
            held_since: None,
            last_fired_at: None,
            exhausted_notified: false,
        }
    }
}

#[derive(Default)]
pub struct RecoveryController {
    state: Mutex<BTreeMap<(ProcessId, String), AttemptState>>,
}

fn metric_value(metric: Metric, sample: &HealthSample, health_score: Option<u8>) -> Option<f64> {
    match metric {
        Metric::CpuPct => Some(sample.cpu_pct),
        Metric::MemoryBytes => Some(sample.rss_bytes as f64),
        Metric::ErrorCount => Some(sample.error_count as f64),
        Metric::HealthScore => health_score.map(f64::from),
        // Not produced by the CPU/RSS sampler; reserved for a future
        // unresponsiveness probe (spec.md §9 leaves this metric unwired).
        Metric::UnresponsiveMs => None,
    }
}

fn all_conditions_hold(conditions: &[Condition], sample: &HealthSample, health_score: Option<u8>) -> bool {
    conditions.iter().all(|c| {
        metric_value(c.metric, sample, health_score)
            .map(|actual| c.op.holds(actual, c.value))
            .unwrap_or(false)
    })
}

impl RecoveryController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `strategy` for `process_id` against the latest `sample`.
    pub fn evaluate(
        &self,
        process_id: &ProcessId,
        strategy: &RecoveryStrategy,
        sample: &HealthSample,
        health_score: Option<u8>,
        clock: &dyn Clock,
    ) -> RecoveryVerdict {
        if !strategy.enabled {
            return RecoveryVerdict::NotDue;
        }

        let key = (process_id.clone(), strategy.name.clone());
        let mut state = self.state.lock();
        let entry = state.entry(key).or_default();

        if entry.attempts >= strategy.max_attempts {
            if !entry.exhausted_notified {
                entry.exhausted_notified = true;
                return RecoveryVerdict::Exhausted;
            }
            return RecoveryVerdict::NotDue;
        }

        if !all_conditions_hold(&strategy.conditions, sample, health_score) {
            entry.held_since = None;
            return RecoveryVerdict::NotDue;
        }

        let now = clock.now();
        let held_since = *entry.held_since.get_or_insert(now);
        let required_hold = strategy
            .conditions
            .iter()
            .map(|c| Duration::from_millis(c.duration_ms))
            .max()
            .unwrap_or(Duration::ZERO);

        if now.duration_since(held_since) < required_hold {
            return RecoveryVerdict::Pending;
        }

        if let Some(last_fired) = entry.last_fired_at {
            if now.duration_since(last_fired) < Duration::from_millis(strategy.cooldown_ms) {
                return RecoveryVerdict::Pending;
            }
        }

        entry.attempts += 1;
        entry.last_fired_at = Some(now);
        entry.held_since = None;
        RecoveryVerdict::Fire {
            attempt: entry.attempts,
        }
    }

    pub fn exhausted_event(process_id: &ProcessId, strategy: &RecoveryStrategy) -> Event {
        Event::RecoveryExhausted {
            process_id: process_id.clone(),
            strategy: strategy.name.clone(),
        }
    }

    pub fn fired_event(process_id: &ProcessId, strategy: &RecoveryStrategy, attempt: u32) -> Event {
        Event::RecoveryFired {
            process_id: process_id.clone(),
            strategy: strategy.name.clone(),
            attempt,
        }
    }

    /// Reset attempt bookkeeping, e.g. once a process has been cleanly
    /// restarted and run healthily past its crash-grace window.
    pub fn reset(&self, process_id: &ProcessId, strategy_name: &str) {
        self.state
            .lock()
            .remove(&(process_id.clone(), strategy_name.to_string()));
    }

    /// `(strategy_name, attempts, exhausted)` for every strategy this
    /// controller has ever evaluated against `process_id` — feeds
    /// `get-health-summary`'s recovery-stats section.
    pub fn stats(&self, process_id: &ProcessId) -> Vec<(String, u32, bool)> {
        self.state
            .lock()
            .iter()
            .filter(|((id, _), _)| id == process_id)
            .map(|((_, name), entry)| (name.clone(), entry.attempts, entry.exhausted_notified))
            .collect()
    }
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
