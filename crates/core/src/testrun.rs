//! Test Run Orchestrator data model (spec.md §3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ProcessId, TestRunId};
use crate::process::ProcessSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestRunState {
    Pending,
    Starting,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl TestRunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TestRunState::Completed | TestRunState::Failed | TestRunState::Aborted
        )
    }
}

/// Tracks whether this run spawned a dependency itself, or reused an
/// already-running singleton it must not stop on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOwnership {
    pub owned: bool,
}

impl ProcessOwnership {
    pub fn owned() -> Self {
        Self { owned: true }
    }

    pub fn reused() -> Self {
        Self { owned: false }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestRunPids {
    pub backend: Option<ProcessId>,
    pub frontend: Option<ProcessId>,
    pub tests: Option<ProcessId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub id: TestRunId,
    pub backend: Option<ProcessSpec>,
    pub frontend: Option<ProcessSpec>,
    pub tests: ProcessSpec,
    pub auto_stop: bool,
    pub keep_backends: bool,
    pub state: TestRunState,
    pub pids: TestRunPids,
    #[serde(default)]
    pub backend_ownership: Option<ProcessOwnership>,
    #[serde(default)]
    pub frontend_ownership: Option<ProcessOwnership>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl TestRun {
    pub fn new(id: TestRunId, backend: Option<ProcessSpec>, frontend: Option<ProcessSpec>, tests: ProcessSpec, auto_stop: bool, keep_backends: bool) -> Self {
        Self {
            id,
            backend,
            frontend,
            tests,
            auto_stop,
            keep_backends,
            state: TestRunState::Pending,
            pids: TestRunPids::default(),
            backend_ownership: None,
            frontend_ownership: None,
            started_at: None,
            ended_at: None,
            exit_code: None,
            error: None,
        }
    }
}

#[cfg(test)]
#[path = "testrun_tests.rs"]
mod tests;
