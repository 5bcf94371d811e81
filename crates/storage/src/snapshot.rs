//! Snapshot persistence: atomic write, corrupt-file quarantine.
//!
//! Grounded on the teacher's `oj_storage::snapshot::Snapshot` — write to a
//! temp file, `sync_all`, then atomic rename; on load, a file that fails to
//! deserialize (or carries an unrecognized schema version) is rotated aside
//! to a `.bak` file rather than treated as fatal, per spec.md §7's
//! `SnapshotCorrupt` handling.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ph_core::{ManagedProcess, TestRun};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Current schema version this build writes and accepts on load.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The durable subset of the Registry (spec.md §3's `Snapshot`):
/// `ManagedProcess` already skip-serializes its `logRing`, so it doubles
/// directly as the durable process record.
pub type ProcessRecord = ManagedProcess;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub processes: Vec<ProcessRecord>,
    pub test_runs: Vec<TestRun>,
}

impl Snapshot {
    pub fn new(session_id: impl Into<String>, processes: Vec<ProcessRecord>, test_runs: Vec<TestRun>, created_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            session_id: session_id.into(),
            created_at,
            processes,
            test_runs,
        }
    }
}

/// Where snapshots are written and loaded from.
///
/// A trait (rather than a bare struct) so the daemon's periodic checkpoint
/// task and startup-reattach path can be exercised against an in-memory
/// double in tests without touching the filesystem.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError>;
    fn load(&self) -> Result<Option<Snapshot>, SnapshotError>;
}

/// Production store: one JSON file at a fixed path, atomically replaced.
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, snapshot)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>, SnapshotError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        match serde_json::from_reader::<_, Snapshot>(reader) {
            Ok(snapshot) if snapshot.schema_version == CURRENT_SCHEMA_VERSION => {
                Ok(Some(snapshot))
            }
            Ok(snapshot) => {
                warn!(
                    found = snapshot.schema_version,
                    expected = CURRENT_SCHEMA_VERSION,
                    "snapshot schema version mismatch, quarantining",
                );
                self.quarantine()?;
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "corrupt snapshot, quarantining");
                self.quarantine()?;
                Ok(None)
            }
        }
    }
}

const MAX_BAK_FILES: u32 = 3;

impl FileSnapshotStore {
    fn quarantine(&self) -> Result<(), SnapshotError> {
        let bak_path = rotate_bak_path(&self.path);
        fs::rename(&self.path, &bak_path)?;
        Ok(())
    }
}

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    let _ = fs::remove_file(&oldest);

    for n in (1..MAX_BAK_FILES).rev() {
        let from = bak(n);
        if from.exists() {
            let _ = fs::rename(&from, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
