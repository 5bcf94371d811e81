//! ph-storage: Snapshot persistence and reattach support (spec.md §4.6).

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod reattach;
pub mod snapshot;

pub use reattach::{probe_liveness, reattach_processes, ReattachOutcome};
pub use snapshot::{ProcessRecord, Snapshot, SnapshotError, SnapshotStore, CURRENT_SCHEMA_VERSION};
