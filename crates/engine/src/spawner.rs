//! Child process spawning, stdio streaming, and graceful/forced stop
//! (spec.md §4.1).
//!
//! Grounded on the teacher's `oj-adapters::agent::watcher`: one task per
//! stdio stream forwards lines into a shared sink, a separate task owns
//! `wait()` and the process's terminal transition, and a cancel channel
//! lets an external caller interrupt the wait.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use ph_core::{Clock, Event, LogEntry, LogStream, ManagedProcess, ProcessState};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

/// Default grace window between SIGTERM and SIGKILL for a polite stop.
pub const DEFAULT_STOP_GRACE_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to spawn {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("spawned child reported no pid")]
    MissingPid,
}

struct StopRequest {
    force: bool,
    /// Per-call override of the supervisor's default grace window
    /// (spec.md §6: `stop-process`'s `graceMs` is a per-call input, not a
    /// fixed spawn-time setting). `None` falls back to the default.
    grace_ms: Option<u64>,
    ack_tx: oneshot::Sender<bool>,
}

/// Handle to a live supervised child. The child keeps running (and the
/// supervisor keeps streaming its logs) until `stop` is called or it
/// exits on its own.
pub struct ProcessHandle {
    /// Broadcasts every line as it's read, for readiness log-matching.
    /// Subscribing late misses earlier lines — callers that need the full
    /// history read `ManagedProcess::log_ring` first.
    pub log_tx: broadcast::Sender<LogEntry>,
    stop_tx: Option<oneshot::Sender<StopRequest>>,
    supervisor: Option<JoinHandle<()>>,
}

impl ProcessHandle {
    /// Ask the supervisor to stop the child and wait for it to finish
    /// doing so. `force = true` skips the SIGTERM grace period. `grace_ms`
    /// overrides the supervisor's default wait for this call only (`None`
    /// keeps the default). Returns whether the stop actually escalated to
    /// a forceful kill — either because `force` was requested, or because
    /// the polite grace period elapsed first (spec.md §7: "a stop that
    /// escalated to force yields `forced:true`").
    pub async fn stop(&mut self, force: bool, grace_ms: Option<u64>) -> bool {
        let mut forced = force;
        if let Some(tx) = self.stop_tx.take() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send(StopRequest { force, grace_ms, ack_tx }).is_ok() {
                if let Ok(used_force) = ack_rx.await {
                    forced = used_force;
                }
            }
        }
        if let Some(handle) = self.supervisor.take() {
            let _ = handle.await;
        }
        forced
    }

    /// True once the supervisor task has finished (the child has exited).
    pub fn is_finished(&self) -> bool {
        self.supervisor
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }
}

/// Spawns and supervises child processes. Stateless aside from its
/// configured stop-grace window; one instance is shared across the
/// Registry.
pub struct Spawner {
    pub stop_grace_ms: u64,
}

impl Default for Spawner {
    fn default() -> Self {
        Self {
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
        }
    }
}

impl Spawner {
    pub fn new(stop_grace_ms: u64) -> Self {
        Self { stop_grace_ms }
    }

    /// Launch `process`'s command and take ownership of its lifecycle.
    /// Mutates `process` in place (pid, exit fields) and emits `Event`s
    /// onto `events` as the child's state changes.
    pub fn spawn(
        &self,
        process: Arc<RwLock<ManagedProcess>>,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<Event>,
    ) -> Result<ProcessHandle, SpawnError> {
        let (command, args, cwd, env, signature) = {
            let p = process.read();
            (
                p.command.clone(),
                p.args.clone(),
                p.cwd.clone(),
                p.env.clone(),
                p.signature.clone(),
            )
        };

        let mut cmd = Command::new(&command);
        cmd.args(&args)
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !cwd.is_empty() {
            cmd.current_dir(&cwd);
        }

        let mut child = cmd.spawn().map_err(|source| SpawnError::Io {
            command: command.clone(),
            source,
        })?;
        let pid = child.id().ok_or(SpawnError::MissingPid)?;

        let id = process.read().id.clone();
        {
            let mut p = process.write();
            p.pid = Some(pid);
        }
        let _ = events.send(Event::ProcessSpawned {
            id: id.clone(),
            pid,
            signature,
            at: clock.utc_now(),
        });

        let (log_tx, _rx) = broadcast::channel(256);
        if let Some(out) = child.stdout.take() {
            spawn_reader(
                out,
                LogStream::Stdout,
                process.clone(),
                log_tx.clone(),
                events.clone(),
                clock.clone(),
            );
        }
        if let Some(err) = child.stderr.take() {
            spawn_reader(
                err,
                LogStream::Stderr,
                process.clone(),
                log_tx.clone(),
                events.clone(),
                clock.clone(),
            );
        }

        let (stop_tx, stop_rx) = oneshot::channel::<StopRequest>();
        let default_grace_ms = self.stop_grace_ms;
        let supervisor = tokio::spawn(supervise(
            child, pid, process, clock, events, stop_rx, default_grace_ms,
        ));

        Ok(ProcessHandle {
            log_tx,
            stop_tx: Some(stop_tx),
            supervisor: Some(supervisor),
        })
    }
}

fn spawn_reader<R>(
    reader: R,
    stream: LogStream,
    process: Arc<RwLock<ManagedProcess>>,
    log_tx: broadcast::Sender<LogEntry>,
    events: broadcast::Sender<Event>,
    clock: Arc<dyn Clock>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let id = process.read().id.clone();
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let entry = LogEntry {
                        stream,
                        line,
                        at: clock.utc_now(),
                    };
                    process.write().log_ring.push(entry.clone());
                    let _ = log_tx.send(entry.clone());
                    let _ = events.send(Event::ProcessLog {
                        id: id.clone(),
                        entry,
                    });
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(process_id = %id, error = %err, "log reader error, stopping");
                    break;
                }
            }
        }
    });
}

enum Finish {
    Exited(std::io::Result<std::process::ExitStatus>),
    Stopped(std::io::Result<std::process::ExitStatus>),
}

async fn supervise(
    mut child: Child,
    pid: u32,
    process: Arc<RwLock<ManagedProcess>>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<Event>,
    mut stop_rx: oneshot::Receiver<StopRequest>,
    default_grace_ms: u64,
) {
    let id = process.read().id.clone();

    let finish = tokio::select! {
        status = child.wait() => Finish::Exited(status),
        stop = &mut stop_rx => {
            let (force, grace_ms, ack_tx) = match stop {
                Ok(req) => (req.force, req.grace_ms.unwrap_or(default_grace_ms), Some(req.ack_tx)),
                Err(_) => (true, default_grace_ms, None),
            };
            let (status, used_force) = stop_child(&mut child, pid, force, grace_ms, &id, &events).await;
            if let Some(ack_tx) = ack_tx {
                let _ = ack_tx.send(used_force);
            }
            Finish::Stopped(status)
        }
    };

    let (exit_status, was_stopped) = match finish {
        Finish::Exited(s) => (s, false),
        Finish::Stopped(s) => (s, true),
    };

    let at = clock.utc_now();
    let (exit_code, crashed) = match exit_status {
        // A process we deliberately stopped is never "crashed", even if
        // the OS reports it exited via signal.
        Ok(status) => (status.code(), !was_stopped && !status.success()),
        Err(err) => {
            warn!(process_id = %id, error = %err, "wait() failed after exit");
            (None, !was_stopped)
        }
    };

    {
        let mut p = process.write();
        p.exit_code = exit_code;
        p.exited_at = Some(at);
        p.state = if crashed {
            ProcessState::Crashed
        } else {
            ProcessState::Exited
        };
    }

    let _ = events.send(Event::ProcessExited {
        id,
        exit_code,
        crashed,
        at,
    });
}

/// Stop `child`, returning its exit status and whether the stop escalated
/// to a forceful kill (true if `force` was requested up front, or the
/// polite grace period elapsed before the child exited on its own).
async fn stop_child(
    child: &mut Child,
    pid: u32,
    force: bool,
    grace_ms: u64,
    id: &ph_core::ProcessId,
    events: &broadcast::Sender<Event>,
) -> (std::io::Result<std::process::ExitStatus>, bool) {
    if !force {
        terminate_politely(pid);
        if let Ok(status) =
            tokio::time::timeout(Duration::from_millis(grace_ms), child.wait()).await
        {
            return (status, false);
        }
    }

    if let Err(err) = child.start_kill() {
        warn!(process_id = %id, error = %err, "force-kill failed");
        let _ = events.send(Event::ProcessStopForceFailed {
            id: id.clone(),
            reason: err.to_string(),
        });
    }
    (child.wait().await, true)
}

#[cfg(unix)]
fn terminate_politely(pid: u32) {
    signal_unmanaged(pid, false);
}

#[cfg(not(unix))]
fn terminate_politely(_pid: u32) {}

/// Send a termination signal directly to a pid this engine isn't
/// supervising through a [`ProcessHandle`] — e.g. one reattached from a
/// prior session's snapshot, whose stdio-streaming supervisor task was
/// never (re)started. `force` picks SIGKILL over SIGTERM.
#[cfg(unix)]
pub fn signal_unmanaged(pid: u32, force: bool) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // Workspace policy forbids unsafe code; `nix::sys::signal::kill` is a
    // safe wrapper so the raw `kill(2)` FFI call never appears in this
    // crate directly.
    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    let _ = kill(Pid::from_raw(pid as i32), signal);
}

#[cfg(not(unix))]
pub fn signal_unmanaged(_pid: u32, _force: bool) {}

#[cfg(test)]
#[path = "spawner_tests.rs"]
mod tests;
