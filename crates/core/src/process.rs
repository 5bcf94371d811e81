//! The `ManagedProcess` data model (spec.md §3).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ProcessId;
use crate::log_entry::LogRing;
use crate::readiness::{ReadinessResult, ReadinessSpec};

/// Role a managed process plays, used for RPC filtering and default
/// readiness inference by `start-task`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Frontend,
    Backend,
    Test,
    E2e,
    Utility,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Frontend => "frontend",
            Role::Backend => "backend",
            Role::Test => "test",
            Role::E2e => "e2e",
            Role::Utility => "utility",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a `ManagedProcess`.
///
/// Forward-only transitions: `Starting -> (Ready -> Running)? -> (Exiting ->
/// Exited | Crashed)`. `Reattached` enters directly as a synthetic `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Starting,
    Ready,
    Running,
    Exiting,
    Exited,
    Crashed,
    Reattached,
}

impl ProcessState {
    /// Whether this state counts toward singleton occupancy
    /// (`{starting, ready, running, reattached}`).
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ProcessState::Starting
                | ProcessState::Ready
                | ProcessState::Running
                | ProcessState::Reattached
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Exited | ProcessState::Crashed)
    }
}

/// Caller-supplied description of a process to spawn. Also used (without a
/// `role`) as the backend/frontend/tests members of a `TestRun`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub readiness: Option<ReadinessSpec>,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_role() -> Role {
    Role::Utility
}

impl ProcessSpec {
    pub fn signature(&self) -> String {
        crate::signature::signature_of(&self.role, &self.command, &self.cwd, &self.args)
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.command.clone())
    }
}

/// One managed child process (spec.md §3's `ManagedProcess`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedProcess {
    pub id: ProcessId,
    pub pid: Option<u32>,
    pub name: String,
    pub role: Role,
    pub tags: BTreeSet<String>,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub env: BTreeMap<String, String>,
    pub signature: String,
    pub state: ProcessState,
    pub started_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub exited_at: Option<DateTime<Utc>>,
    pub restart_count: u32,
    pub last_error: Option<String>,
    pub inferred_ports: BTreeSet<u16>,
    #[serde(skip)]
    pub log_ring: LogRing,
    pub readiness_spec: Option<ReadinessSpec>,
    pub readiness_result: Option<ReadinessResult>,
}

impl ManagedProcess {
    pub fn new(id: ProcessId, spec: &ProcessSpec, pid: Option<u32>, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            pid,
            name: spec.display_name(),
            role: spec.role,
            tags: spec.tags.clone(),
            command: spec.command.clone(),
            args: spec.args.clone(),
            cwd: spec.cwd.clone(),
            env: spec.env.clone(),
            signature: spec.signature(),
            state: ProcessState::Starting,
            started_at,
            ready_at: None,
            exit_code: None,
            exited_at: None,
            restart_count: 0,
            last_error: None,
            inferred_ports: BTreeSet::new(),
            log_ring: LogRing::default(),
            readiness_spec: spec.readiness.clone(),
            readiness_result: None,
        }
    }

    /// Invariant: `ready_at` is set iff `readiness_result = success`.
    pub fn mark_ready(&mut self, at: DateTime<Utc>) {
        self.ready_at = Some(at);
        self.state = ProcessState::Ready;
        self.readiness_result = Some(ReadinessResult::success());
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
