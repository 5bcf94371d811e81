//! ph-core: shared data model for the process-herder orchestration engine.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod clock;
pub mod event;
pub mod health;
pub mod id;
pub mod log_entry;
pub mod process;
pub mod readiness;
pub mod recovery;
pub mod signature;
pub mod testrun;

pub use clock::{Clock, ClockInstant, SystemClock};
pub use event::{Event, EventCategory};
pub use health::{HealthIssue, HealthSample, Severity};
pub use id::{IdGen, ProcessId, ShortId, TestRunId, UuidIdGen};

#[cfg(any(test, feature = "test-support"))]
pub use id::SequentialIdGen;
pub use log_entry::{LogEntry, LogRing, LogStream};
pub use process::{ManagedProcess, ProcessSpec, ProcessState, Role};
pub use readiness::{LogPattern, ReadinessOutcome, ReadinessResult, ReadinessSpec};
pub use recovery::{Action, ActionType, Condition, Metric, Op, RecoveryStrategy};
pub use signature::signature_of;
pub use testrun::{ProcessOwnership, TestRun, TestRunState};

#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
