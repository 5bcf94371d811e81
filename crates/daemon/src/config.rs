//! Daemon configuration, loaded from environment variables with documented
//! defaults — mirrors `oj-daemon::lifecycle::Config`. `load()` never
//! panics: a missing or malformed variable falls back to its default and
//! logs a warning rather than aborting startup.

use std::path::PathBuf;

use tracing::warn;

pub const DEFAULT_CRASH_GRACE_MS: u64 = 5_000;
pub const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_HEALTH_SAMPLE_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_STOP_GRACE_MS: u64 = 5_000;
pub const DEFAULT_RETENTION_TTL_MS: u64 = 10 * 60 * 1_000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory `processes.json` and rotated snapshot backups live in.
    pub state_dir: PathBuf,
    /// How long a non-zero exit is held before recovery strategies are
    /// allowed to act on it — absorbs the immediate-exit-on-typo case.
    pub crash_grace_ms: u64,
    pub snapshot_interval_ms: u64,
    pub health_sample_interval_ms: u64,
    pub stop_grace_ms: u64,
    /// How long a terminal (`exited`/`crashed`) process is kept in the
    /// registry after the caller has had a chance to observe it, before
    /// it's garbage-collected.
    pub retention_ttl_ms: u64,
    /// Suppress info-level recovery log lines. Never suppresses the
    /// `RecoveryExhausted` event on the bus.
    pub silent_recovery: bool,
}

impl Config {
    pub fn load() -> Self {
        Self {
            state_dir: env_path("PROCESS_HERDER_STATE_DIR", PathBuf::from(".process-herder")),
            crash_grace_ms: env_u64("PROCESS_HERDER_CRASH_GRACE_MS", DEFAULT_CRASH_GRACE_MS),
            snapshot_interval_ms: env_u64(
                "PROCESS_HERDER_SNAPSHOT_INTERVAL_MS",
                DEFAULT_SNAPSHOT_INTERVAL_MS,
            ),
            health_sample_interval_ms: env_u64(
                "PROCESS_HERDER_HEALTH_INTERVAL_MS",
                DEFAULT_HEALTH_SAMPLE_INTERVAL_MS,
            ),
            stop_grace_ms: env_u64("PROCESS_HERDER_STOP_GRACE_MS", DEFAULT_STOP_GRACE_MS),
            retention_ttl_ms: env_u64("PROCESS_HERDER_RETENTION_TTL_MS", DEFAULT_RETENTION_TTL_MS),
            silent_recovery: env_bool("PROCESS_HERDER_SILENT_RECOVERY", false),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join("processes.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => PathBuf::from(value),
        Ok(_) => default,
        Err(_) => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            warn!(key, value, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(value.as_str(), "1" | "true" | "TRUE" | "yes"),
        Err(_) => default,
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
