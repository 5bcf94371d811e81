//! Readiness probe specifications (spec.md §3, §4.3).

use serde::{Deserialize, Serialize};

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_interval_ms() -> u64 {
    250
}

/// How a log-pattern readiness probe matches a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum LogPattern {
    /// Case-insensitive substring match.
    Substring(String),
    /// Exact regex match (case-sensitive, as written).
    Regex(String),
}

/// A tagged readiness condition a caller can attach to a `ProcessSpec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadinessSpec {
    #[serde(rename_all = "camelCase")]
    Port {
        port: u16,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
        #[serde(default = "default_interval_ms")]
        interval_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Http {
        url: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
        #[serde(default = "default_interval_ms")]
        interval_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Log {
        pattern: LogPattern,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

impl ReadinessSpec {
    pub fn timeout_ms(&self) -> u64 {
        match self {
            ReadinessSpec::Port { timeout_ms, .. } => *timeout_ms,
            ReadinessSpec::Http { timeout_ms, .. } => *timeout_ms,
            ReadinessSpec::Log { timeout_ms, .. } => *timeout_ms,
        }
    }
}

/// The resolution of one readiness evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessOutcome {
    Success,
    Timeout,
    EarlyExit,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessResult {
    pub outcome: ReadinessOutcome,
    pub reason: Option<String>,
}

impl ReadinessResult {
    pub fn success() -> Self {
        Self {
            outcome: ReadinessOutcome::Success,
            reason: None,
        }
    }

    pub fn failure(outcome: ReadinessOutcome, reason: impl Into<String>) -> Self {
        Self {
            outcome,
            reason: Some(reason.into()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.outcome == ReadinessOutcome::Success
    }
}

#[cfg(test)]
#[path = "readiness_tests.rs"]
mod tests;
