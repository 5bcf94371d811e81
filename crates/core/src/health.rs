//! Health sampling data model (spec.md §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ProcessId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSample {
    pub cpu_pct: f64,
    pub rss_bytes: u64,
    pub uptime_ms: u64,
    pub error_count: u32,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthIssue {
    pub process_id: ProcessId,
    pub severity: Severity,
    pub score: u8,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
