//! `phd`: reads line-delimited JSON-RPC requests from stdin, dispatches them
//! onto the `Agent`, writes line-delimited JSON responses to stdout. Mirrors
//! the shape of the teacher's `oj-daemon::main` (config load, logging setup,
//! signal handling, background task spawn) with the Unix-socket listener and
//! WAL-replay loop it doesn't need replaced by a stdio read loop per
//! spec.md §1's transport choice.

mod agent;
mod config;
mod logging;
mod protocol;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use agent::Agent;
use config::Config;
use protocol::{Request, Response, RpcError};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = Config::load();

    let _log_guard = match logging::init(&config.log_dir()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("phd: failed to initialize logging: {err}");
            std::process::exit(1);
        }
    };

    info!(state_dir = %config.state_dir.display(), "process herder starting");

    let session_id = uuid::Uuid::new_v4().to_string();
    let sampler: Arc<dyn ph_adapters::ProcessSampler> = Arc::new(ph_adapters::SysinfoSampler::default());
    let port_probe: Arc<dyn ph_adapters::PortProbe> = Arc::new(ph_adapters::TokioPortProbe);
    let http_probe: Arc<dyn ph_adapters::HttpProbe> = Arc::new(ph_adapters::ReqwestHttpProbe::default());
    let snapshot_store: Arc<dyn ph_storage::SnapshotStore> =
        Arc::new(ph_storage::FileSnapshotStore::new(config.snapshot_path()));
    let clock: Arc<dyn ph_core::Clock> = Arc::new(ph_core::SystemClock);
    let id_gen: Arc<dyn ph_core::IdGen> = Arc::new(ph_core::UuidIdGen);

    let agent = Agent::new(
        config,
        sampler,
        port_probe,
        http_probe,
        snapshot_store,
        clock,
        id_gen,
        session_id,
    );

    agent.reattach_from_snapshot();
    agent.spawn_background_tasks();

    // Signal for the parent process (shells, test harnesses) waiting for
    // startup to finish before piping requests in.
    println!("READY");
    let _ = std::io::Write::flush(&mut std::io::stdout());

    let stdout = Arc::new(AsyncMutex::new(tokio::io::stdout()));
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let agent = agent.clone();
                        let stdout = stdout.clone();
                        tokio::spawn(async move {
                            handle_line(&agent, &stdout, line).await;
                        });
                    }
                    Ok(None) => {
                        info!("stdin closed, shutting down");
                        break;
                    }
                    Err(err) => {
                        error!(error = %err, "error reading stdin");
                        break;
                    }
                }
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    agent.persist_final_snapshot();
    info!("process herder stopped");
    Ok(())
}

/// Parse, dispatch, and write back one request/response line. A line that
/// fails to parse gets an `invalidRequest` error response rather than
/// killing the whole process — one malformed line must not take down every
/// other in-flight request.
async fn handle_line(agent: &Arc<Agent>, stdout: &Arc<AsyncMutex<tokio::io::Stdout>>, line: String) {
    let response = match serde_json::from_str::<Request>(&line) {
        Ok(request) => agent.dispatch(request).await,
        Err(err) => {
            warn!(error = %err, "failed to parse request line");
            Response::err(RpcError::InvalidRequest { reason: err.to_string() })
        }
    };

    let mut payload = match serde_json::to_vec(&response) {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(error = %err, "failed to serialize response");
            return;
        }
    };
    payload.push(b'\n');

    let mut out = stdout.lock().await;
    if let Err(err) = out.write_all(&payload).await {
        error!(error = %err, "failed to write response");
    }
    let _ = out.flush().await;
}
