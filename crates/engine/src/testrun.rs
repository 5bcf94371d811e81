//! The Test Run Orchestrator (spec.md §4.7): brings up an optional
//! backend/frontend dependency pair (reusing a live singleton instead of
//! double-spawning when one already matches), runs the test process to
//! completion, and tears down only what it owns.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use ph_adapters::{HttpProbe, PortProbe};
use ph_core::{
    Clock, Event, IdGen, ManagedProcess, ProcessId, ProcessOwnership, ProcessSpec, TestRun,
    TestRunState,
};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::errors::EngineError;
use crate::readiness;
use crate::registry::{Registry, SignatureReservation};
use crate::spawner::Spawner;

/// Start (or reuse) the process described by `spec`, returning the shared
/// handle to it and whether this call is the one that spawned it.
///
/// Shared by the Test Run Orchestrator and the daemon's `start-process`
/// RPC handler: singleton resolution always goes through the Registry's
/// signature index so both paths see the same live process.
pub async fn ensure_process(
    spec: &ProcessSpec,
    registry: &Registry,
    spawner: &Spawner,
    clock: &Arc<dyn Clock>,
    events: &broadcast::Sender<Event>,
    id_gen: &dyn IdGen,
) -> Result<(Arc<RwLock<ManagedProcess>>, ProcessOwnership), EngineError> {
    let signature = spec.signature();
    if spec.singleton {
        // Reservation and lookup happen under one lock (see
        // `Registry::reserve_or_insert`) so two concurrent callers racing on
        // the same signature can never both observe "no live holder" and
        // both spawn — the first to acquire the lock wins (spec.md §4.2).
        let reservation = registry.reserve_or_insert(&signature, || {
            let id = ProcessId::new(id_gen.next());
            ManagedProcess::new(id, spec, None, clock.utc_now())
        });

        return match reservation {
            SignatureReservation::Existing(existing) => {
                let id = existing.read().id.clone();
                let _ = events.send(Event::ProcessReused {
                    id,
                    signature: signature.clone(),
                });
                Ok((existing, ProcessOwnership::reused()))
            }
            SignatureReservation::Reserved(shared) => {
                let id = shared.read().id.clone();
                let handle = spawner.spawn(shared.clone(), clock.clone(), events.clone())?;
                registry.set_handle(&id, handle);
                Ok((shared, ProcessOwnership::owned()))
            }
        };
    }

    let id = ProcessId::new(id_gen.next());
    let managed = ManagedProcess::new(id.clone(), spec, None, clock.utc_now());
    let shared = registry.insert(managed, None);
    let handle = spawner.spawn(shared.clone(), clock.clone(), events.clone())?;
    registry.set_handle(&id, handle);
    Ok((shared, ProcessOwnership::owned()))
}

/// Poll `process` until it reaches a terminal state, returning its exit
/// code and whether it crashed.
async fn wait_for_terminal(process: &Arc<RwLock<ManagedProcess>>) -> (Option<i32>, bool) {
    loop {
        {
            let p = process.read();
            if p.state.is_terminal() {
                return (p.exit_code, p.state == ph_core::ProcessState::Crashed);
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Run a process's configured readiness probe to resolution, recording
/// the outcome (success or failure) onto the process record. Shared by
/// the Test Run Orchestrator's dependency bring-up and the daemon's
/// `start-process` RPC handler, so both paths observe identical
/// success/timeout/early-exit semantics (spec.md §4.3).
pub async fn await_readiness(
    process: &Arc<RwLock<ManagedProcess>>,
    registry: &Registry,
    port_probe: &dyn PortProbe,
    http_probe: &dyn HttpProbe,
    clock: &Arc<dyn Clock>,
) -> Result<(), String> {
    let spec = process.read().readiness_spec.clone();
    let Some(spec) = spec else {
        return Ok(());
    };
    let id = process.read().id.clone();
    let log_rx = registry.log_sender(&id).map(|tx| tx.subscribe());
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let result = readiness::evaluate(process, &spec, port_probe, http_probe, log_rx, cancel_rx).await;
    if result.is_ready() {
        let mut p = process.write();
        if let ph_core::ReadinessSpec::Port { port, .. } = &spec {
            p.inferred_ports.insert(*port);
        }
        p.mark_ready(clock.utc_now());
        drop(p);
        Ok(())
    } else {
        let reason = result.reason.clone().unwrap_or_else(|| "readiness failed".to_string());
        let mut p = process.write();
        p.last_error = Some(reason.clone());
        p.readiness_result = Some(result);
        Err(reason)
    }
}

pub struct TestRunOrchestrator {
    registry: Arc<Registry>,
    spawner: Arc<Spawner>,
    port_probe: Arc<dyn PortProbe>,
    http_probe: Arc<dyn HttpProbe>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<Event>,
    id_gen: Arc<dyn IdGen>,
}

impl TestRunOrchestrator {
    pub fn new(
        registry: Arc<Registry>,
        spawner: Arc<Spawner>,
        port_probe: Arc<dyn PortProbe>,
        http_probe: Arc<dyn HttpProbe>,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<Event>,
        id_gen: Arc<dyn IdGen>,
    ) -> Self {
        Self {
            registry,
            spawner,
            port_probe,
            http_probe,
            clock,
            events,
            id_gen,
        }
    }

    fn transition(&self, run: &Arc<RwLock<TestRun>>, to: TestRunState) {
        let id = run.read().id.clone();
        let from = run.read().state;
        run.write().state = to;
        let _ = self.events.send(Event::TestRunStateChanged { id, from, to });
    }

    /// Drive `run` through its full lifecycle. Mutates `run` in place as
    /// it progresses; the caller is responsible for making `run` visible
    /// to `abort` (e.g. via a shared registry of in-flight runs) before
    /// calling this.
    pub async fn run(&self, run: Arc<RwLock<TestRun>>, mut abort_rx: watch::Receiver<bool>) {
        self.transition(&run, TestRunState::Starting);
        run.write().started_at = Some(self.clock.utc_now());

        if let Err(reason) = self.bring_up_dependencies(&run, &mut abort_rx).await {
            self.fail(&run, reason).await;
            return;
        }

        if *abort_rx.borrow() {
            self.finish(&run, TestRunState::Aborted, None, None).await;
            return;
        }

        self.transition(&run, TestRunState::Running);

        let tests_spec = run.read().tests.clone();
        let (tests_process, _ownership) = match ensure_process(
            &tests_spec,
            &self.registry,
            &self.spawner,
            &self.clock,
            &self.events,
            self.id_gen.as_ref(),
        )
        .await
        {
            Ok(v) => v,
            Err(e) => {
                self.fail(&run, e.to_string()).await;
                return;
            }
        };
        run.write().pids.tests = Some(tests_process.read().id.clone());

        let (exit_code, crashed) = tokio::select! {
            result = wait_for_terminal(&tests_process) => result,
            _ = abort_rx.changed() => {
                let mut handle = self.registry.take_handle(&tests_process.read().id.clone());
                if let Some(h) = handle.as_mut() {
                    h.stop(true, None).await;
                }
                self.finish(&run, TestRunState::Aborted, None, None).await;
                return;
            }
        };

        let final_state = if !crashed && exit_code == Some(0) {
            TestRunState::Completed
        } else {
            TestRunState::Failed
        };
        self.finish(&run, final_state, exit_code, None).await;
    }

    async fn bring_up_dependencies(
        &self,
        run: &Arc<RwLock<TestRun>>,
        abort_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), String> {
        let backend_spec = run.read().backend.clone();
        if let Some(spec) = backend_spec {
            let (process, ownership) = ensure_process(
                &spec,
                &self.registry,
                &self.spawner,
                &self.clock,
                &self.events,
                self.id_gen.as_ref(),
            )
            .await
            .map_err(|e| e.to_string())?;
            run.write().pids.backend = Some(process.read().id.clone());
            run.write().backend_ownership = Some(ownership);
            if *abort_rx.borrow() {
                return Err("aborted before backend became ready".to_string());
            }
            await_readiness(
                &process,
                &self.registry,
                self.port_probe.as_ref(),
                self.http_probe.as_ref(),
                &self.clock,
            )
            .await
            .map_err(|reason| format!("backend readiness failed: {reason}"))?;
        }

        let frontend_spec = run.read().frontend.clone();
        if let Some(spec) = frontend_spec {
            let (process, ownership) = ensure_process(
                &spec,
                &self.registry,
                &self.spawner,
                &self.clock,
                &self.events,
                self.id_gen.as_ref(),
            )
            .await
            .map_err(|e| e.to_string())?;
            run.write().pids.frontend = Some(process.read().id.clone());
            run.write().frontend_ownership = Some(ownership);
            await_readiness(
                &process,
                &self.registry,
                self.port_probe.as_ref(),
                self.http_probe.as_ref(),
                &self.clock,
            )
            .await
            .map_err(|reason| format!("frontend readiness failed: {reason}"))?;
        }

        Ok(())
    }

    async fn fail(&self, run: &Arc<RwLock<TestRun>>, reason: String) {
        warn!(test_run_id = %run.read().id, reason = %reason, "test run failed to start");
        run.write().error = Some(reason);
        self.finish(run, TestRunState::Failed, None, None).await;
    }

    async fn finish(
        &self,
        run: &Arc<RwLock<TestRun>>,
        state: TestRunState,
        exit_code: Option<i32>,
        error: Option<String>,
    ) {
        {
            let mut r = run.write();
            r.ended_at = Some(self.clock.utc_now());
            r.exit_code = exit_code;
            if error.is_some() {
                r.error = error;
            }
        }
        self.transition(run, state);
        self.cleanup_owned(run).await;
    }

    /// Stop whatever this run owns and isn't told to keep alive. Reused
    /// singletons and (when `keep_backends` is set) owned backends/
    /// frontends are left running for a follow-up run to reuse.
    ///
    /// Exception: a run that never got past bring-up (no readiness timeout
    /// or early dependency exit ever let it reach `Running`) tears down
    /// every dependency it owns regardless of `autoStop`/`keep_backends` —
    /// those flags only govern what a completed/aborted run leaves behind,
    /// not a run that failed before its test process ever started.
    async fn cleanup_owned(&self, run: &Arc<RwLock<TestRun>>) {
        let (state, auto_stop, keep_backends, tests_id, backend, frontend) = {
            let r = run.read();
            (
                r.state,
                r.auto_stop,
                r.keep_backends,
                r.pids.tests.clone(),
                r.pids.backend.clone().zip(r.backend_ownership),
                r.pids.frontend.clone().zip(r.frontend_ownership),
            )
        };
        let force_dependency_cleanup = state == TestRunState::Failed && tests_id.is_none();

        if !auto_stop && !force_dependency_cleanup {
            return;
        }

        if auto_stop {
            if let Some(id) = tests_id {
                self.stop_and_remove(&id).await;
            }
        }
        if !keep_backends || force_dependency_cleanup {
            if let Some((id, ownership)) = backend {
                if ownership.owned {
                    self.stop_and_remove(&id).await;
                }
            }
            if let Some((id, ownership)) = frontend {
                if ownership.owned {
                    self.stop_and_remove(&id).await;
                }
            }
        }
    }

    async fn stop_and_remove(&self, id: &ProcessId) {
        if let Some(mut handle) = self.registry.take_handle(id) {
            handle.stop(false, None).await;
        }
        info!(process_id = %id, "test run cleanup stopped process");
    }

    /// Look up an in-flight run's abort switch is the caller's job (the
    /// daemon keeps a map of `TestRunId -> watch::Sender<bool>`); this
    /// helper just documents the expected construction for that sender.
    pub fn new_abort_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }
}

#[cfg(test)]
#[path = "testrun_tests.rs"]
mod tests;
