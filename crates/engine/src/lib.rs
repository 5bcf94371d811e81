//! ph-engine: the core orchestration logic described in spec.md §4 —
//! Spawner, Registry, Readiness Engine, Health Monitor, Recovery
//! Controller, Test Run Orchestrator, and Event Bus. `ph-daemon` wires
//! these together behind the RPC transport; this crate has no knowledge
//! of stdin/stdout framing.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod errors;
pub mod events;
pub mod health;
pub mod readiness;
pub mod recovery;
pub mod registry;
pub mod restart;
pub mod spawner;
pub mod testrun;

pub use errors::EngineError;
pub use events::{EventBus, EventLogger, EventQuery, DEFAULT_LOGGER_CAPACITY};
pub use health::{HealthMonitor, HealthThresholds, SAMPLE_HISTORY_CAPACITY};
pub use readiness::evaluate as evaluate_readiness;
pub use recovery::{RecoveryController, RecoveryVerdict};
pub use registry::{ProcessFilter, Registry, SignatureReservation};
pub use restart::{restart_process, should_suppress_restart, RestartOutcome};
pub use spawner::{signal_unmanaged, ProcessHandle, Spawner, SpawnError, DEFAULT_STOP_GRACE_MS};
pub use testrun::{await_readiness, ensure_process, TestRunOrchestrator};
