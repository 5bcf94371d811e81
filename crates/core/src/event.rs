//! Typed events published on the Event Bus (spec.md §4.8).
//!
//! Serializes with `{"type": "category:name", ...fields}`, matching the
//! wire shape RPC responses and the logger ring both consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::health::{HealthIssue, Severity};
use crate::id::{ProcessId, TestRunId};
use crate::log_entry::LogEntry;
use crate::testrun::TestRunState;

/// Category used for event-bus subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Spawn,
    Readiness,
    Health,
    Recovery,
    Testrun,
    Rpc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "process:spawned")]
    ProcessSpawned {
        id: ProcessId,
        pid: u32,
        signature: String,
        at: DateTime<Utc>,
    },

    #[serde(rename = "process:reused")]
    ProcessReused { id: ProcessId, signature: String },

    #[serde(rename = "process:log")]
    ProcessLog { id: ProcessId, entry: LogEntry },

    #[serde(rename = "process:ready")]
    ProcessReady { id: ProcessId, at: DateTime<Utc> },

    #[serde(rename = "process:readiness_failed")]
    ProcessReadinessFailed { id: ProcessId, reason: String },

    #[serde(rename = "process:exited")]
    ProcessExited {
        id: ProcessId,
        exit_code: Option<i32>,
        crashed: bool,
        at: DateTime<Utc>,
    },

    #[serde(rename = "process:reattached")]
    ProcessReattached { id: ProcessId, pid: u32 },

    #[serde(rename = "process:stop_force_failed")]
    ProcessStopForceFailed { id: ProcessId, reason: String },

    #[serde(rename = "health:issue")]
    HealthIssueRaised(HealthIssue),

    #[serde(rename = "recovery:fired")]
    RecoveryFired {
        process_id: ProcessId,
        strategy: String,
        attempt: u32,
    },

    #[serde(rename = "recovery:exhausted")]
    RecoveryExhausted {
        process_id: ProcessId,
        strategy: String,
    },

    #[serde(rename = "testrun:state_changed")]
    TestRunStateChanged {
        id: TestRunId,
        from: TestRunState,
        to: TestRunState,
    },

    #[serde(rename = "rpc:received")]
    RpcReceived { method: String },
}

impl Event {
    pub fn category(&self) -> EventCategory {
        match self {
            Event::ProcessSpawned { .. }
            | Event::ProcessReused { .. }
            | Event::ProcessLog { .. }
            | Event::ProcessExited { .. }
            | Event::ProcessReattached { .. }
            | Event::ProcessStopForceFailed { .. } => EventCategory::Spawn,
            Event::ProcessReady { .. } | Event::ProcessReadinessFailed { .. } => {
                EventCategory::Readiness
            }
            Event::HealthIssueRaised(_) => EventCategory::Health,
            Event::RecoveryFired { .. } | Event::RecoveryExhausted { .. } => {
                EventCategory::Recovery
            }
            Event::TestRunStateChanged { .. } => EventCategory::Testrun,
            Event::RpcReceived { .. } => EventCategory::Rpc,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::HealthIssueRaised(issue) => issue.severity,
            Event::RecoveryExhausted { .. } | Event::ProcessStopForceFailed { .. } => {
                Severity::High
            }
            Event::ProcessReadinessFailed { .. } => Severity::Warn,
            _ => Severity::Info,
        }
    }

    pub fn process_id(&self) -> Option<&ProcessId> {
        match self {
            Event::ProcessSpawned { id, .. }
            | Event::ProcessReused { id, .. }
            | Event::ProcessLog { id, .. }
            | Event::ProcessReady { id, .. }
            | Event::ProcessReadinessFailed { id, .. }
            | Event::ProcessExited { id, .. }
            | Event::ProcessReattached { id, .. }
            | Event::ProcessStopForceFailed { id, .. } => Some(id),
            Event::HealthIssueRaised(issue) => Some(&issue.process_id),
            Event::RecoveryFired { process_id, .. } | Event::RecoveryExhausted { process_id, .. } => {
                Some(process_id)
            }
            Event::TestRunStateChanged { .. } | Event::RpcReceived { .. } => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
