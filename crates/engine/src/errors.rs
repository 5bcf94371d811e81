//! Engine-wide error type, surfaced to the daemon's RPC layer as
//! structured failure reasons.

use ph_core::{ProcessId, TestRunId};
use thiserror::Error;

use crate::spawner::SpawnError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no such process: {0}")]
    UnknownProcess(ProcessId),

    #[error("no such test run: {0}")]
    UnknownTestRun(TestRunId),

    #[error("test run {0} already exists")]
    DuplicateTestRun(TestRunId),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error("process {0} is already live under signature {1}")]
    AlreadyRunning(ProcessId, String),

    #[error("test run {0} is not in a state that allows this operation")]
    InvalidTestRunState(TestRunId),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
