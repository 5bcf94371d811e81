//! The Event Bus (spec.md §4.8): a broadcast channel every subsystem
//! publishes onto, paired with a bounded in-memory logger so RPC clients
//! can query recent history instead of only streaming live.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ph_core::{Clock, Event, EventCategory, Severity};
use tokio::sync::broadcast;

const DEFAULT_BUS_CAPACITY: usize = 1024;

/// The fan-out channel. Cloning an `EventBus` shares the same underlying
/// channel (it's just a cheap handle), matching the teacher's
/// `oj_core::Event` bus pattern of one sender shared across subsystems.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BUS_CAPACITY);
        Self { tx }
    }

    pub fn sender(&self) -> broadcast::Sender<Event> {
        self.tx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub const DEFAULT_LOGGER_CAPACITY: usize = 10_000;

/// Query parameters for `EventLogger::query`. `None` on a field means
/// "don't filter on it".
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub category: Option<EventCategory>,
    pub min_severity: Option<Severity>,
    pub contains: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

struct LoggedEvent {
    event: Event,
    recorded_at: DateTime<Utc>,
}

/// Bounded ring of every event that has crossed the bus, queryable by
/// category/severity/substring/time-range for `get-health-summary` and
/// similar read-only RPCs. Time-ranges filter on when the logger recorded
/// the event, not a field on `Event` itself — several variants (e.g.
/// `process:reused`) carry no timestamp of their own.
pub struct EventLogger {
    capacity: usize,
    entries: Mutex<VecDeque<LoggedEvent>>,
}

impl EventLogger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, event: Event, recorded_at: DateTime<Utc>) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(LoggedEvent { event, recorded_at });
    }

    /// Spawn a task that drains `rx` into this logger until the bus is
    /// dropped. A lagged receiver just resumes from whatever's next; the
    /// logger's purpose is recent-history inspection, not an audit trail.
    pub fn spawn_recorder(
        self: Arc<Self>,
        mut rx: broadcast::Receiver<Event>,
        clock: Arc<dyn Clock>,
    ) {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => self.record(event, clock.utc_now()),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    pub fn query(&self, query: &EventQuery) -> Vec<Event> {
        let entries = self.entries.lock();
        let mut matches: Vec<Event> = entries
            .iter()
            .filter(|logged| {
                if let Some(category) = query.category {
                    if logged.event.category() != category {
                        return false;
                    }
                }
                if let Some(min_severity) = query.min_severity {
                    if logged.event.severity() < min_severity {
                        return false;
                    }
                }
                if let Some(since) = query.since {
                    if logged.recorded_at < since {
                        return false;
                    }
                }
                if let Some(needle) = &query.contains {
                    let haystack = serde_json::to_string(&logged.event).unwrap_or_default();
                    if !haystack.to_lowercase().contains(&needle.to_lowercase()) {
                        return false;
                    }
                }
                true
            })
            .map(|logged| logged.event.clone())
            .collect();

        if let Some(limit) = query.limit {
            let skip = matches.len().saturating_sub(limit);
            matches = matches.split_off(skip);
        }
        matches
    }
}

impl Default for EventLogger {
    fn default() -> Self {
        Self::new(DEFAULT_LOGGER_CAPACITY)
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
