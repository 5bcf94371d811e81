use super::*;
use std::collections::BTreeMap;

use ph_adapters::{FakeHttpProbe, FakePortProbe, FakeSampler};
use ph_core::{Action, ActionType, Condition, FakeClock, Metric, Op, ProcessSpec, Role, SequentialIdGen};
use ph_storage::FileSnapshotStore;

fn test_config(dir: &std::path::Path) -> Config {
    Config {
        state_dir: dir.to_path_buf(),
        crash_grace_ms: config::DEFAULT_CRASH_GRACE_MS,
        snapshot_interval_ms: config::DEFAULT_SNAPSHOT_INTERVAL_MS,
        health_sample_interval_ms: config::DEFAULT_HEALTH_SAMPLE_INTERVAL_MS,
        stop_grace_ms: 200,
        retention_ttl_ms: config::DEFAULT_RETENTION_TTL_MS,
        silent_recovery: false,
    }
}

fn spec(command: &str, args: &[&str]) -> ProcessSpec {
    ProcessSpec {
        command: command.to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
        cwd: String::new(),
        env: BTreeMap::new(),
        role: Role::Utility,
        tags: Default::default(),
        singleton: false,
        readiness: None,
        name: None,
    }
}

fn make_agent(dir: &std::path::Path) -> Arc<Agent> {
    let config = test_config(dir);
    let sampler: Arc<dyn ProcessSampler> = Arc::new(FakeSampler::new());
    let port_probe: Arc<dyn PortProbe> = Arc::new(FakePortProbe::new());
    let http_probe: Arc<dyn HttpProbe> = Arc::new(FakeHttpProbe::new());
    let snapshot_store: Arc<dyn SnapshotStore> =
        Arc::new(FileSnapshotStore::new(dir.join("processes.json")));
    let clock: Arc<dyn Clock> = Arc::new(FakeClock::default());
    let id_gen: Arc<dyn IdGen> = Arc::new(SequentialIdGen::new("t"));
    Agent::new(config, sampler, port_probe, http_probe, snapshot_store, clock, id_gen, "session-1".to_string())
}

#[tokio::test]
async fn start_process_then_stop_process_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let agent = make_agent(dir.path());

    let start = agent
        .dispatch(Request::StartProcess { spec: spec("sleep", &["30"]) })
        .await;
    let Response::Ok { data } = start else { panic!("expected ok response") };
    let id = ProcessId::new(data["id"].as_str().unwrap().to_string());
    assert!(data["pid"].as_u64().is_some());

    let stop = agent
        .dispatch(Request::StopProcess { id, force: true, grace_ms: None })
        .await;
    let Response::Ok { data } = stop else { panic!("expected ok response") };
    assert_eq!(data["forced"], serde_json::json!(true));
}

#[tokio::test]
async fn singleton_spec_reuses_the_live_process() {
    let dir = tempfile::tempdir().unwrap();
    let agent = make_agent(dir.path());

    let mut singleton_spec = spec("sleep", &["30"]);
    singleton_spec.singleton = true;

    let first = agent.dispatch(Request::StartProcess { spec: singleton_spec.clone() }).await;
    let Response::Ok { data: first } = first else { panic!("expected ok response") };

    let second = agent.dispatch(Request::StartProcess { spec: singleton_spec }).await;
    let Response::Ok { data: second } = second else { panic!("expected ok response") };

    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["reused"], serde_json::json!(true));

    let id = ProcessId::new(first["id"].as_str().unwrap().to_string());
    agent.dispatch(Request::StopProcess { id, force: true, grace_ms: None }).await;
}

#[tokio::test]
async fn stop_process_resolves_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let agent = make_agent(dir.path());

    let mut named = spec("sleep", &["30"]);
    named.name = Some("my-worker".to_string());
    agent.dispatch(Request::StartProcess { spec: named }).await;

    let stop = agent
        .dispatch(Request::StopProcess {
            id: ProcessId::new("my-worker"),
            force: true,
            grace_ms: None,
        })
        .await;
    assert!(matches!(stop, Response::Ok { .. }));
}

#[tokio::test]
async fn get_process_status_for_unknown_id_reports_not_running_rather_than_error() {
    let dir = tempfile::tempdir().unwrap();
    let agent = make_agent(dir.path());

    let response = agent
        .dispatch(Request::GetProcessStatus { id: ProcessId::new("ghost") })
        .await;
    let Response::Ok { data } = response else { panic!("expected ok response") };
    assert_eq!(data["isRunning"], serde_json::json!(false));
}

fn strategy(conditions: Vec<Condition>, actions: Vec<Action>, max_attempts: u32) -> RecoveryStrategy {
    RecoveryStrategy {
        name: "restart-on-error".to_string(),
        conditions,
        actions,
        max_attempts,
        cooldown_ms: 0,
        enabled: true,
    }
}

#[tokio::test]
async fn configure_recovery_rejects_empty_conditions() {
    let dir = tempfile::tempdir().unwrap();
    let agent = make_agent(dir.path());

    let bad = strategy(vec![], vec![Action { action_type: ActionType::Restart, delay_ms: 0 }], 3);
    let response = agent
        .dispatch(Request::ConfigureRecovery { id: ProcessId::new("worker"), strategy: bad })
        .await;
    assert!(matches!(response, Response::Error { error: RpcError::InvalidStrategy { .. } }));
}

#[tokio::test]
async fn configure_recovery_rejects_zero_max_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let agent = make_agent(dir.path());

    let bad = strategy(
        vec![Condition { metric: Metric::ErrorCount, op: Op::Gte, value: 1.0, duration_ms: 0 }],
        vec![Action { action_type: ActionType::Restart, delay_ms: 0 }],
        0,
    );
    let response = agent
        .dispatch(Request::ConfigureRecovery { id: ProcessId::new("worker"), strategy: bad })
        .await;
    assert!(matches!(response, Response::Error { error: RpcError::InvalidStrategy { .. } }));
}

#[tokio::test]
async fn configure_recovery_accepts_a_well_formed_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let agent = make_agent(dir.path());

    let good = strategy(
        vec![Condition { metric: Metric::ErrorCount, op: Op::Gte, value: 1.0, duration_ms: 0 }],
        vec![Action { action_type: ActionType::Restart, delay_ms: 0 }],
        3,
    );
    let response = agent
        .dispatch(Request::ConfigureRecovery { id: ProcessId::new("worker"), strategy: good })
        .await;
    assert!(matches!(response, Response::Ok { .. }));
}

#[tokio::test]
async fn abort_test_run_on_unknown_id_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let agent = make_agent(dir.path());

    let response = agent
        .dispatch(Request::AbortTestRun { id: TestRunId::new("ghost"), keep_backends: None })
        .await;
    assert!(matches!(response, Response::Error { error: RpcError::UnknownTestRun }));
}

#[tokio::test]
async fn abort_test_run_is_idempotent_once_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let agent = make_agent(dir.path());

    let start = agent
        .dispatch(Request::StartTestRun {
            run: StartTestRunRequest {
                backend: None,
                frontend: None,
                tests: spec("true", &[]),
                auto_stop: true,
                keep_backends: false,
            },
        })
        .await;
    let Response::Ok { data } = start else { panic!("expected ok response") };
    let id = TestRunId::new(data["id"].as_str().unwrap().to_string());

    // Give the orchestrator a moment to drive the run to completion.
    for _ in 0..50 {
        let status = agent.dispatch(Request::GetTestRunStatus { id: id.clone() }).await;
        let Response::Ok { data } = status else { panic!("expected ok response") };
        if data["state"] == "completed" || data["state"] == "failed" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let first_abort = agent.dispatch(Request::AbortTestRun { id: id.clone(), keep_backends: None }).await;
    let second_abort = agent.dispatch(Request::AbortTestRun { id, keep_backends: None }).await;
    assert!(matches!(first_abort, Response::Ok { .. }));
    assert!(matches!(second_abort, Response::Ok { .. }));
}

#[tokio::test]
async fn list_processes_and_list_test_runs_start_empty() {
    let dir = tempfile::tempdir().unwrap();
    let agent = make_agent(dir.path());

    let processes = agent.dispatch(Request::ListProcesses { role: None, tag: None }).await;
    let Response::Ok { data } = processes else { panic!("expected ok response") };
    assert_eq!(data.as_array().unwrap().len(), 0);

    let runs = agent.dispatch(Request::ListTestRuns {}).await;
    let Response::Ok { data } = runs else { panic!("expected ok response") };
    assert_eq!(data.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn reattach_from_snapshot_with_no_file_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let agent = make_agent(dir.path());
    agent.reattach_from_snapshot();

    let processes = agent.dispatch(Request::ListProcesses { role: None, tag: None }).await;
    let Response::Ok { data } = processes else { panic!("expected ok response") };
    assert_eq!(data.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn crash_of_a_process_with_no_live_health_ticks_still_triggers_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let agent = make_agent(dir.path());
    agent.spawn_background_tasks();

    let good = strategy(
        vec![Condition { metric: Metric::HealthScore, op: Op::Gte, value: 0.0, duration_ms: 0 }],
        vec![Action { action_type: ActionType::Restart, delay_ms: 0 }],
        2,
    );
    // Configure the strategy before the process ever starts: it can crash
    // within milliseconds, and strategies are matched against a process's
    // name/tags (spec.md §4.5), not its generated id.
    agent
        .dispatch(Request::ConfigureRecovery {
            id: ProcessId::new("restart-on-error"),
            strategy: good,
        })
        .await;

    let mut crashing = spec("sh", &["-c", "exit 1"]);
    crashing.name = Some("restart-on-error".to_string());

    let start = agent.dispatch(Request::StartProcess { spec: crashing }).await;
    let Response::Ok { data } = start else { panic!("expected ok response") };
    let id = ProcessId::new(data["id"].as_str().unwrap().to_string());

    // The process is never observed by the `live_only` health sweep (it
    // exits immediately), so recovery can only happen via the exit-event
    // subscriber reacting to `ProcessExited{crashed:true}`.
    let mut exhausted = false;
    for _ in 0..100 {
        let summary = agent.dispatch(Request::GetHealthSummary { id: None }).await;
        let Response::Ok { data } = summary else { panic!("expected ok response") };
        if data["recoveryStats"]
            .as_array()
            .unwrap()
            .iter()
            .any(|entry| entry["exhausted"] == serde_json::json!(true))
        {
            exhausted = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert!(exhausted, "expected recovery to fire until max_attempts was exhausted");

    let status = agent.dispatch(Request::GetProcessStatus { id }).await;
    let Response::Ok { data } = status else { panic!("expected ok response") };
    // maxAttempts:2 must yield exactly 2 restarts, never more.
    assert_eq!(data["restartCount"], serde_json::json!(2));
}

#[tokio::test]
async fn get_health_summary_with_no_processes_reports_zero() {
    let dir = tempfile::tempdir().unwrap();
    let agent = make_agent(dir.path());

    let response = agent.dispatch(Request::GetHealthSummary { id: None }).await;
    let Response::Ok { data } = response else { panic!("expected ok response") };
    assert_eq!(data["totalProcesses"], serde_json::json!(0));
}
