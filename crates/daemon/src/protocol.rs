//! The line-delimited JSON-RPC surface (spec.md §6), one request/response
//! pair per line on stdin/stdout. Shaped like the teacher's
//! `oj-daemon::protocol::Request`/`Response` tagged enums, but framed as
//! newline-delimited JSON over stdio instead of the teacher's
//! length-prefixed Unix-socket wire format — the one deliberate transport
//! departure spec.md §1 calls for.

use ph_core::{ProcessId, ProcessSpec, RecoveryStrategy, Role, TestRunId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTestRunRequest {
    pub backend: Option<ProcessSpec>,
    pub frontend: Option<ProcessSpec>,
    pub tests: ProcessSpec,
    #[serde(default = "default_true")]
    pub auto_stop: bool,
    #[serde(default)]
    pub keep_backends: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum Request {
    StartProcess {
        spec: ProcessSpec,
    },
    StartTask {
        name: String,
        spec: ProcessSpec,
    },
    #[serde(rename_all = "camelCase")]
    StopProcess {
        id: ProcessId,
        #[serde(default)]
        force: bool,
        /// Grace window override, in milliseconds, before escalating to a
        /// forceful kill. `graceMs: 0` is equivalent to `force: true`.
        #[serde(default)]
        grace_ms: Option<u64>,
    },
    RestartProcess {
        id: ProcessId,
    },
    ListProcesses {
        #[serde(default)]
        role: Option<Role>,
        #[serde(default)]
        tag: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GetProcessStatus {
        id: ProcessId,
    },
    StartTestRun {
        #[serde(flatten)]
        run: StartTestRunRequest,
    },
    GetTestRunStatus {
        id: TestRunId,
    },
    #[serde(rename_all = "camelCase")]
    AbortTestRun {
        id: TestRunId,
        #[serde(default)]
        keep_backends: Option<bool>,
    },
    ListTestRuns {},
    ConfigureRecovery {
        id: ProcessId,
        strategy: RecoveryStrategy,
    },
    GetHealthSummary {
        #[serde(default)]
        id: Option<ProcessId>,
    },
}

impl Request {
    /// The request id, if this request names one (used for log fields
    /// and `rpc:received` events). Not all requests name one process/run.
    pub fn subject(&self) -> Option<String> {
        match self {
            Request::StartProcess { .. } | Request::StartTask { .. } => None,
            Request::StopProcess { id, .. }
            | Request::RestartProcess { id }
            | Request::GetProcessStatus { id }
            | Request::ConfigureRecovery { id, .. } => Some(id.to_string()),
            Request::ListProcesses { .. } | Request::ListTestRuns {} => None,
            Request::StartTestRun { .. } => None,
            Request::GetTestRunStatus { id } | Request::AbortTestRun { id, .. } => {
                Some(id.to_string())
            }
            Request::GetHealthSummary { id } => id.as_ref().map(ToString::to_string),
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            Request::StartProcess { .. } => "start-process",
            Request::StartTask { .. } => "start-task",
            Request::StopProcess { .. } => "stop-process",
            Request::RestartProcess { .. } => "restart-process",
            Request::ListProcesses { .. } => "list-processes",
            Request::GetProcessStatus { .. } => "get-process-status",
            Request::StartTestRun { .. } => "start-test-run",
            Request::GetTestRunStatus { .. } => "get-test-run-status",
            Request::AbortTestRun { .. } => "abort-test-run",
            Request::ListTestRuns {} => "list-test-runs",
            Request::ConfigureRecovery { .. } => "configure-recovery",
            Request::GetHealthSummary { .. } => "get-health-summary",
        }
    }
}

/// Closed set of RPC-level failure codes (spec.md §7). Operational
/// failures of a managed *child* (readiness timeout, crash) are never
/// surfaced here — they're folded into a successful response payload
/// describing the process's new state instead.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RpcError {
    #[error("no such process")]
    UnknownProcess,
    #[error("no such test run")]
    UnknownTestRun,
    #[error("process already running under this signature")]
    AlreadyRunning,
    #[error("a test run with this id already exists")]
    DuplicateId,
    #[error("failed to spawn process: {reason}")]
    SpawnFailed { reason: String },
    #[error("test run is not in a state that allows this operation")]
    InvalidTestRunState,
    #[error("malformed request: {reason}")]
    InvalidRequest { reason: String },
    #[error("invalid recovery strategy: {reason}")]
    InvalidStrategy { reason: String },
}

impl From<ph_engine::EngineError> for RpcError {
    fn from(err: ph_engine::EngineError) -> Self {
        match err {
            ph_engine::EngineError::UnknownProcess(_) => RpcError::UnknownProcess,
            ph_engine::EngineError::UnknownTestRun(_) => RpcError::UnknownTestRun,
            ph_engine::EngineError::AlreadyRunning(_, _) => RpcError::AlreadyRunning,
            ph_engine::EngineError::DuplicateTestRun(_) => RpcError::DuplicateId,
            ph_engine::EngineError::InvalidTestRunState(_) => RpcError::InvalidTestRunState,
            ph_engine::EngineError::Spawn(spawn_err) => RpcError::SpawnFailed {
                reason: spawn_err.to_string(),
            },
            ph_engine::EngineError::Io(io_err) => RpcError::SpawnFailed {
                reason: io_err.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "ok")]
    Ok {
        #[serde(flatten)]
        data: serde_json::Value,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(flatten)]
        error: RpcError,
    },
}

impl Response {
    pub fn ok(data: serde_json::Value) -> Self {
        Response::Ok { data }
    }

    pub fn err(error: impl Into<RpcError>) -> Self {
        Response::Error {
            error: error.into(),
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
