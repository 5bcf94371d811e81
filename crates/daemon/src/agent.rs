//! The `Agent`: wires every `ph-engine`/`ph-storage` collaborator into one
//! object that owns startup (reattach), the RPC dispatch table, and the
//! background health/snapshot/retention loops. Mirrors the teacher's
//! top-level `Agent`/`Daemon` struct in `oj-daemon::lifecycle` — one
//! explicitly constructed object, no module-level globals.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use ph_adapters::{HttpProbe, PortProbe, ProcessSampler};
use ph_core::{
    ActionType, Clock, Event, HealthSample, IdGen, ManagedProcess, ProcessId, ProcessSpec, Role,
    RecoveryStrategy, TestRun, TestRunId,
};
use ph_engine::{
    await_readiness, ensure_process, restart_process, should_suppress_restart, signal_unmanaged,
    EventBus, EventLogger, HealthMonitor, HealthThresholds, ProcessFilter, RecoveryController,
    RecoveryVerdict, Registry, Spawner, TestRunOrchestrator,
};
use ph_storage::{Snapshot, SnapshotStore};
use serde_json::json;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::config::Config;
use crate::protocol::{Request, Response, RpcError, StartTestRunRequest};

struct TestRunHandle {
    run: Arc<RwLock<TestRun>>,
    abort_tx: watch::Sender<bool>,
}

pub struct Agent {
    config: Config,
    registry: Arc<Registry>,
    spawner: Arc<Spawner>,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    #[allow(dead_code)]
    event_logger: Arc<EventLogger>,
    health: Arc<HealthMonitor>,
    recovery: Arc<RecoveryController>,
    orchestrator: Arc<TestRunOrchestrator>,
    id_gen: Arc<dyn IdGen>,
    port_probe: Arc<dyn PortProbe>,
    http_probe: Arc<dyn HttpProbe>,
    snapshot_store: Arc<dyn SnapshotStore>,
    session_id: String,
    test_runs: Mutex<BTreeMap<TestRunId, TestRunHandle>>,
    strategies: RwLock<BTreeMap<String, RecoveryStrategy>>,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        sampler: Arc<dyn ProcessSampler>,
        port_probe: Arc<dyn PortProbe>,
        http_probe: Arc<dyn HttpProbe>,
        snapshot_store: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        id_gen: Arc<dyn IdGen>,
        session_id: String,
    ) -> Arc<Self> {
        let registry = Arc::new(Registry::new());
        let spawner = Arc::new(Spawner::new(config.stop_grace_ms));
        let bus = EventBus::new();
        let event_logger = Arc::new(EventLogger::default());
        event_logger.clone().spawn_recorder(bus.subscribe(), clock.clone());
        let health = Arc::new(HealthMonitor::new(sampler, HealthThresholds::default()));
        let recovery = Arc::new(RecoveryController::new());
        let orchestrator = Arc::new(TestRunOrchestrator::new(
            registry.clone(),
            spawner.clone(),
            port_probe.clone(),
            http_probe.clone(),
            clock.clone(),
            bus.sender(),
            id_gen.clone(),
        ));

        Arc::new(Self {
            config,
            registry,
            spawner,
            clock,
            bus,
            event_logger,
            health,
            recovery,
            orchestrator,
            id_gen,
            port_probe,
            http_probe,
            snapshot_store,
            session_id,
            test_runs: Mutex::new(BTreeMap::new()),
            strategies: RwLock::new(BTreeMap::new()),
        })
    }

    /// Load the last snapshot (if any) and re-adopt any recorded process
    /// still alive under its pid and start time (spec.md §4.6). Historical
    /// test run records are restored for `list-test-runs`/
    /// `get-test-run-status`; a run that was mid-flight when the agent
    /// last stopped is simply left in whatever terminal-or-not state the
    /// snapshot captured — nothing resumes it.
    pub fn reattach_from_snapshot(&self) {
        let snapshot = match self.snapshot_store.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "failed to load snapshot, starting with an empty registry");
                return;
            }
        };

        let survivors = ph_storage::reattach_processes(snapshot.processes, self.clock.utc_now());
        for process in survivors {
            let id = process.id.clone();
            let pid = process.pid;
            info!(process_id = %id, pid, "reattached process from prior session");
            self.registry.insert(process, None);
            if let Some(pid) = pid {
                let _ = self.bus.sender().send(Event::ProcessReattached { id, pid });
            }
        }

        let mut test_runs = self.test_runs.lock();
        for run in snapshot.test_runs {
            let (abort_tx, _abort_rx) = TestRunOrchestrator::new_abort_channel();
            test_runs.insert(
                run.id.clone(),
                TestRunHandle {
                    run: Arc::new(RwLock::new(run)),
                    abort_tx,
                },
            );
        }
    }

    /// Spawn the periodic health-sampling, snapshot-checkpoint, and
    /// terminal-process retention loops. Each runs for the lifetime of the
    /// agent; `main` never needs to join them, only to persist a final
    /// snapshot on shutdown.
    pub fn spawn_background_tasks(self: &Arc<Self>) {
        self.spawn_loop(self.config.health_sample_interval_ms, |agent| async move {
            agent.health_tick().await;
        });
        self.spawn_loop(self.config.snapshot_interval_ms, |agent| async move {
            agent.snapshot_now();
        });
        self.spawn_loop(self.config.retention_ttl_ms.max(1_000), |agent| async move {
            agent.gc_terminal();
        });
        self.spawn_exit_recovery_subscriber();
    }

    /// Re-evaluate recovery strategies the moment a process crashes, rather
    /// than waiting on `health_tick`'s `live_only` sweep, which never looks
    /// at a process again once it leaves the live states (spec.md §4.5:
    /// the Recovery Controller subscribes to "HealthIssue and exit events").
    fn spawn_exit_recovery_subscriber(self: &Arc<Self>) {
        let agent = self.clone();
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(Event::ProcessExited { id, crashed: true, .. }) => {
                        agent.recover_after_exit(&id).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    async fn recover_after_exit(&self, id: &ProcessId) {
        let Some(process) = self.registry.get(id) else {
            return;
        };
        let sample = self.health.terminal_sample(&process.read(), self.clock.as_ref());
        let score = self.health.score(&sample);
        self.evaluate_recovery(id, &process, &sample, score).await;
    }

    fn spawn_loop<F, Fut>(self: &Arc<Self>, interval_ms: u64, tick: F)
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let agent = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            loop {
                ticker.tick().await;
                tick(agent.clone()).await;
            }
        });
    }

    async fn health_tick(&self) {
        let live = self.registry.list(&ProcessFilter {
            live_only: true,
            ..Default::default()
        });
        for process in live {
            let Some(sample) = self.health.sample(&process, self.clock.as_ref()).await else {
                continue;
            };
            let id = process.read().id.clone();
            if let Some(event) = self.health.issue_for(&id, &sample) {
                if !(self.config.silent_recovery && matches!(event, Event::HealthIssueRaised(_))) {
                    let _ = self.bus.sender().send(event);
                }
            }
            let score = self.health.score(&sample);
            self.evaluate_recovery(&id, &process, &sample, score).await;
        }
    }

    async fn evaluate_recovery(
        &self,
        id: &ProcessId,
        process: &Arc<RwLock<ManagedProcess>>,
        sample: &HealthSample,
        score: u8,
    ) {
        let targets = {
            let p = process.read();
            let mut targets = vec![p.name.clone()];
            targets.extend(p.tags.iter().cloned());
            targets
        };
        let strategies: Vec<RecoveryStrategy> = {
            let guard = self.strategies.read();
            targets.iter().filter_map(|t| guard.get(t).cloned()).collect()
        };

        for strategy in strategies {
            match self
                .recovery
                .evaluate(id, &strategy, sample, Some(score), self.clock.as_ref())
            {
                RecoveryVerdict::Fire { attempt } => {
                    let _ = self
                        .bus
                        .sender()
                        .send(RecoveryController::fired_event(id, &strategy, attempt));
                    self.execute_actions(process.clone(), strategy).await;
                }
                RecoveryVerdict::Exhausted => {
                    let _ = self
                        .bus
                        .sender()
                        .send(RecoveryController::exhausted_event(id, &strategy));
                }
                RecoveryVerdict::NotDue | RecoveryVerdict::Pending => {}
            }
        }
    }

    /// Run a fired strategy's actions in order, honoring each action's
    /// `delayMs` (spec.md §4.5).
    async fn execute_actions(&self, process: Arc<RwLock<ManagedProcess>>, strategy: RecoveryStrategy) {
        let id = process.read().id.clone();
        for action in &strategy.actions {
            if action.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(action.delay_ms)).await;
            }
            match action.action_type {
                ActionType::Notify => {
                    info!(process_id = %id, strategy = %strategy.name, "recovery notify action fired");
                }
                ActionType::Restart => {
                    if should_suppress_restart(&process.read(), self.config.crash_grace_ms, self.clock.as_ref()) {
                        info!(process_id = %id, "restart suppressed: last exit was a clean zero within the crash-grace window");
                        continue;
                    }
                    if let Err(err) =
                        restart_process(&id, &self.registry, &self.spawner, &self.clock, &self.bus.sender()).await
                    {
                        warn!(process_id = %id, error = %err, "recovery restart failed");
                    }
                }
                ActionType::Kill => {
                    if let Some(mut handle) = self.registry.take_handle(&id) {
                        handle.stop(true, None).await;
                    } else if let Some(pid) = process.read().pid {
                        signal_unmanaged(pid, true);
                    }
                }
                ActionType::Cleanup => {
                    // No cleanup-hook registry is part of this spec; a
                    // strategy naming `cleanup` just gets a log line.
                    info!(process_id = %id, strategy = %strategy.name, "recovery cleanup action (no hook registered)");
                }
            }
        }
    }

    /// Persist one final snapshot on the way out. `main` calls this after
    /// the stdin loop and background tasks have stopped, so it never races
    /// the periodic checkpoint task.
    pub fn persist_final_snapshot(&self) {
        self.snapshot_now();
    }

    fn snapshot_now(&self) {
        let processes = self.registry.snapshot_processes();
        let test_runs: Vec<TestRun> = self
            .test_runs
            .lock()
            .values()
            .map(|h| h.run.read().clone())
            .collect();
        let snapshot = Snapshot::new(self.session_id.clone(), processes, test_runs, self.clock.utc_now());
        if let Err(err) = self.snapshot_store.save(&snapshot) {
            warn!(error = %err, "failed to persist snapshot");
        }
    }

    fn gc_terminal(&self) {
        let now = self.clock.utc_now();
        for process in self.registry.all() {
            let (id, exited_at, is_terminal) = {
                let p = process.read();
                (p.id.clone(), p.exited_at, p.state.is_terminal())
            };
            if !is_terminal {
                continue;
            }
            let Some(exited_at) = exited_at else { continue };
            let age_ms = now.signed_duration_since(exited_at).num_milliseconds();
            if age_ms >= self.config.retention_ttl_ms as i64 {
                self.registry.remove(&id);
                self.health.forget(&id);
            }
        }
    }

    /// Find a process by its id, or (per spec.md §6's "id or name" inputs)
    /// by matching its display name if no process carries that id.
    fn resolve_process(&self, id: &ProcessId) -> Option<Arc<RwLock<ManagedProcess>>> {
        self.registry
            .get(id)
            .or_else(|| self.registry.all().into_iter().find(|p| p.read().name == *id.as_str()))
    }

    fn process_json(&self, process: &ManagedProcess) -> serde_json::Value {
        serde_json::to_value(process).unwrap_or(serde_json::Value::Null)
    }

    /// Dispatch one already-parsed request to its handler. Called once per
    /// incoming line; `main`'s stdin loop spawns each call onto its own
    /// task so a long-running `start-test-run`/readiness wait never blocks
    /// an `abort-test-run` for a different run.
    pub async fn dispatch(&self, request: Request) -> Response {
        let _ = self.bus.sender().send(Event::RpcReceived {
            method: request.method_name().to_string(),
        });
        match request {
            Request::StartProcess { spec } => self.handle_start_process(spec).await,
            Request::StartTask { name, spec } => self.handle_start_task(name, spec).await,
            Request::StopProcess { id, force, grace_ms } => {
                self.handle_stop_process(id, force, grace_ms).await
            }
            Request::RestartProcess { id } => self.handle_restart_process(id).await,
            Request::ListProcesses { role, tag } => self.handle_list_processes(role, tag),
            Request::GetProcessStatus { id } => self.handle_get_process_status(id),
            Request::StartTestRun { run } => self.handle_start_test_run(run).await,
            Request::GetTestRunStatus { id } => self.handle_get_test_run_status(id),
            Request::AbortTestRun { id, keep_backends } => {
                self.handle_abort_test_run(id, keep_backends).await
            }
            Request::ListTestRuns {} => self.handle_list_test_runs(),
            Request::ConfigureRecovery { id, strategy } => self.handle_configure_recovery(id, strategy),
            Request::GetHealthSummary { id } => self.handle_get_health_summary(id),
        }
    }

    async fn handle_start_process(&self, spec: ProcessSpec) -> Response {
        match ensure_process(
            &spec,
            &self.registry,
            &self.spawner,
            &self.clock,
            &self.bus.sender(),
            self.id_gen.as_ref(),
        )
        .await
        {
            Ok((process, ownership)) => {
                if ownership.owned && spec.readiness.is_some() {
                    let _ = await_readiness(
                        &process,
                        &self.registry,
                        self.port_probe.as_ref(),
                        self.http_probe.as_ref(),
                        &self.clock,
                    )
                    .await;
                }
                let p = process.read();
                Response::ok(json!({
                    "id": p.id,
                    "pid": p.pid,
                    "reused": !ownership.owned,
                    "role": p.role,
                    "ready": p.ready_at.is_some(),
                    "readyAt": p.ready_at,
                    "lastError": p.last_error,
                }))
            }
            Err(err) => Response::err(err),
        }
    }

    /// `start-task` infers a role from the task name when the caller left
    /// `spec.role` at its default (spec.md §6: "role inferred"). Deep
    /// task-file parsing is an explicit Non-goal (spec.md §1), so the
    /// heuristic only looks at the name the caller supplied.
    async fn handle_start_task(&self, name: String, mut spec: ProcessSpec) -> Response {
        if spec.role == Role::Utility {
            spec.role = infer_role(&name);
        }
        if spec.name.is_none() {
            spec.name = Some(name);
        }
        self.handle_start_process(spec).await
    }

    async fn handle_stop_process(&self, id: ProcessId, force: bool, grace_ms: Option<u64>) -> Response {
        let Some(process) = self.resolve_process(&id) else {
            return Response::err(RpcError::UnknownProcess);
        };
        let real_id = process.read().id.clone();
        // `graceMs: 0` is spec.md's documented equivalent of `force: true`.
        let force = force || grace_ms == Some(0);

        let forced = if let Some(mut handle) = self.registry.take_handle(&real_id) {
            handle.stop(force, grace_ms).await
        } else {
            if let Some(pid) = process.read().pid {
                signal_unmanaged(pid, force);
            }
            force
        };

        let p = process.read();
        Response::ok(json!({
            "id": p.id,
            "exitCode": p.exit_code,
            "forced": forced,
        }))
    }

    async fn handle_restart_process(&self, id: ProcessId) -> Response {
        let Some(process) = self.resolve_process(&id) else {
            return Response::err(RpcError::UnknownProcess);
        };
        let real_id = process.read().id.clone();
        match restart_process(&real_id, &self.registry, &self.spawner, &self.clock, &self.bus.sender()).await {
            Ok(outcome) => Response::ok(json!({
                "id": real_id,
                "oldPid": outcome.old_pid,
                "newPid": outcome.new_pid,
            })),
            Err(err) => Response::err(err),
        }
    }

    fn handle_list_processes(&self, role: Option<Role>, tag: Option<String>) -> Response {
        let filter = ProcessFilter { role, tag, live_only: false };
        let items: Vec<serde_json::Value> = self
            .registry
            .list(&filter)
            .iter()
            .map(|p| self.process_json(&p.read()))
            .collect();
        Response::ok(json!(items))
    }

    fn handle_get_process_status(&self, id: ProcessId) -> Response {
        let Some(process) = self.resolve_process(&id) else {
            return Response::ok(json!({ "isRunning": false }));
        };
        let p = process.read();
        let health = self.health.history(&p.id);
        let logs = p.log_ring.last_n(20);
        let mut value = self.process_json(&p);
        if let Some(obj) = value.as_object_mut() {
            obj.insert("isRunning".to_string(), json!(p.state.is_live()));
            obj.insert("health".to_string(), json!(health));
            obj.insert("logs".to_string(), json!(logs));
        }
        Response::ok(value)
    }

    /// Creates the `TestRun` record and hands it to the orchestrator as a
    /// background task, returning immediately — a long test run is
    /// observed via `get-test-run-status`/`abort-test-run`, not by
    /// blocking the call that started it (spec.md's S5 abort scenario
    /// requires `abort-test-run` to reach an in-flight run).
    async fn handle_start_test_run(&self, run_req: StartTestRunRequest) -> Response {
        let id = TestRunId::new(self.id_gen.next());
        let run = TestRun::new(
            id.clone(),
            run_req.backend,
            run_req.frontend,
            run_req.tests,
            run_req.auto_stop,
            run_req.keep_backends,
        );
        let shared = Arc::new(RwLock::new(run));
        let (abort_tx, abort_rx) = TestRunOrchestrator::new_abort_channel();
        self.test_runs.lock().insert(
            id.clone(),
            TestRunHandle { run: shared.clone(), abort_tx },
        );

        let orchestrator = self.orchestrator.clone();
        let run_for_task = shared.clone();
        tokio::spawn(async move {
            orchestrator.run(run_for_task, abort_rx).await;
        });

        // Yield once so a run that fails immediately (e.g. bad command)
        // has a chance to post its first transition before we snapshot
        // the descriptor, without making the caller wait on readiness.
        tokio::task::yield_now().await;
        Response::ok(serde_json::to_value(&*shared.read()).unwrap_or(serde_json::Value::Null))
    }

    fn handle_get_test_run_status(&self, id: TestRunId) -> Response {
        match self.test_runs.lock().get(&id) {
            Some(handle) => Response::ok(serde_json::to_value(&*handle.run.read()).unwrap_or(serde_json::Value::Null)),
            None => Response::err(RpcError::UnknownTestRun),
        }
    }

    async fn handle_abort_test_run(&self, id: TestRunId, keep_backends: Option<bool>) -> Response {
        let handle = {
            let guard = self.test_runs.lock();
            guard.get(&id).map(|h| (h.run.clone(), h.abort_tx.clone()))
        };
        let Some((run, abort_tx)) = handle else {
            return Response::err(RpcError::UnknownTestRun);
        };

        // Aborting an already-terminal run is a documented no-op
        // (spec.md §8 invariant 6).
        if run.read().state.is_terminal() {
            return Response::ok(serde_json::to_value(&*run.read()).unwrap_or(serde_json::Value::Null));
        }

        if let Some(keep) = keep_backends {
            run.write().keep_backends = keep;
        }
        let _ = abort_tx.send(true);

        while !run.read().state.is_terminal() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Response::ok(serde_json::to_value(&*run.read()).unwrap_or(serde_json::Value::Null))
    }

    fn handle_list_test_runs(&self) -> Response {
        let items: Vec<serde_json::Value> = self
            .test_runs
            .lock()
            .values()
            .map(|h| serde_json::to_value(&*h.run.read()).unwrap_or(serde_json::Value::Null))
            .collect();
        Response::ok(json!(items))
    }

    fn handle_configure_recovery(&self, target: ProcessId, strategy: RecoveryStrategy) -> Response {
        if strategy.conditions.is_empty() {
            return Response::err(RpcError::InvalidStrategy {
                reason: "at least one condition is required".to_string(),
            });
        }
        if strategy.actions.is_empty() {
            return Response::err(RpcError::InvalidStrategy {
                reason: "at least one action is required".to_string(),
            });
        }
        if strategy.max_attempts == 0 {
            return Response::err(RpcError::InvalidStrategy {
                reason: "maxAttempts must be at least 1".to_string(),
            });
        }

        let value = serde_json::to_value(&strategy).unwrap_or(serde_json::Value::Null);
        self.strategies.write().insert(target.as_str().to_string(), strategy);
        Response::ok(value)
    }

    fn handle_get_health_summary(&self, id: Option<ProcessId>) -> Response {
        let processes = match &id {
            Some(id) => self.resolve_process(id).into_iter().collect::<Vec<_>>(),
            None => self.registry.all(),
        };

        let mut needing_attention = Vec::new();
        let mut recovery_stats = Vec::new();
        let total = processes.len();

        for process in &processes {
            let p = process.read();
            let history = self.health.history(&p.id);
            if let Some(latest) = history.last() {
                let score = self.health.score(latest);
                if score >= 50 {
                    needing_attention.push(json!({
                        "id": p.id,
                        "name": p.name,
                        "score": score,
                    }));
                }
            }
            for (strategy, attempts, exhausted) in self.recovery.stats(&p.id) {
                recovery_stats.push(json!({
                    "id": p.id,
                    "strategy": strategy,
                    "attempts": attempts,
                    "exhausted": exhausted,
                }));
            }
        }

        Response::ok(json!({
            "totalProcesses": total,
            "needingAttention": needing_attention,
            "recoveryStats": recovery_stats,
        }))
    }
}

fn infer_role(task_name: &str) -> Role {
    let lower = task_name.to_lowercase();
    if lower.contains("e2e") {
        Role::E2e
    } else if lower.contains("test") {
        Role::Test
    } else if lower.contains("front") || lower.contains("client") || lower.contains("ui") {
        Role::Frontend
    } else if lower.contains("back") || lower.contains("server") || lower.contains("api") {
        Role::Backend
    } else {
        Role::Utility
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
