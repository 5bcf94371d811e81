//! Recovery strategy data model (spec.md §3, §4.5).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    ErrorCount,
    MemoryBytes,
    CpuPct,
    HealthScore,
    UnresponsiveMs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Gt,
    Lt,
    Eq,
}

impl Op {
    pub fn holds(&self, actual: f64, threshold: f64) -> bool {
        match self {
            Op::Gt => actual > threshold,
            Op::Lt => actual < threshold,
            // Floating-point equality on externally-sourced metrics is
            // intentionally exact here; strategies that want a tolerance
            // band should express it as two Gt/Lt conditions instead.
            Op::Eq => (actual - threshold).abs() < f64::EPSILON,
        }
    }
}

/// A condition that must hold continuously for `duration_ms` before a
/// strategy fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub metric: Metric,
    pub op: Op,
    pub value: f64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Notify,
    Restart,
    Kill,
    Cleanup,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub delay_ms: u64,
}

/// A named bundle of conditions and remedial actions attached to a process
/// (by name or tag).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryStrategy {
    pub name: String,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub max_attempts: u32,
    pub cooldown_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
