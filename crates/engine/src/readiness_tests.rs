use super::*;
use ph_adapters::{FakeHttpProbe, FakePortProbe};
use ph_core::{LogPattern, LogStream, ProcessId, ProcessSpec, Role};
use tokio::sync::watch;

fn process(spec: &ProcessSpec) -> Arc<RwLock<ManagedProcess>> {
    Arc::new(RwLock::new(ManagedProcess::new(
        ProcessId::new("p-1"),
        spec,
        Some(1),
        chrono::Utc::now(),
    )))
}

fn utility_spec() -> ProcessSpec {
    ProcessSpec {
        command: "noop".to_string(),
        args: vec![],
        cwd: String::new(),
        env: Default::default(),
        role: Role::Utility,
        tags: Default::default(),
        singleton: false,
        readiness: None,
        name: None,
    }
}

#[tokio::test]
async fn port_probe_succeeds_once_port_opens() {
    let spec = ReadinessSpec::Port {
        port: 4000,
        timeout_ms: 2_000,
        interval_ms: 20,
    };
    let port_probe = FakePortProbe::new();
    let http_probe = FakeHttpProbe::new();
    let (_tx, cancel) = watch::channel(false);
    let p = process(&utility_spec());

    let probe_clone = port_probe.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        probe_clone.open(4000);
    });

    let result = evaluate(&p, &spec, &port_probe, &http_probe, None, cancel).await;
    assert!(result.is_ready());
}

#[tokio::test]
async fn port_probe_times_out_if_never_open() {
    let spec = ReadinessSpec::Port {
        port: 4000,
        timeout_ms: 80,
        interval_ms: 20,
    };
    let port_probe = FakePortProbe::new();
    let http_probe = FakeHttpProbe::new();
    let (_tx, cancel) = watch::channel(false);
    let p = process(&utility_spec());

    let result = evaluate(&p, &spec, &port_probe, &http_probe, None, cancel).await;
    assert_eq!(result.outcome, ReadinessOutcome::Timeout);
}

#[tokio::test]
async fn early_exit_reported_when_process_becomes_terminal() {
    let spec = ReadinessSpec::Port {
        port: 4000,
        timeout_ms: 5_000,
        interval_ms: 20,
    };
    let port_probe = FakePortProbe::new();
    let http_probe = FakeHttpProbe::new();
    let (_tx, cancel) = watch::channel(false);
    let p = process(&utility_spec());
    p.write().state = ph_core::ProcessState::Crashed;

    let result = evaluate(&p, &spec, &port_probe, &http_probe, None, cancel).await;
    assert_eq!(result.outcome, ReadinessOutcome::EarlyExit);
}

#[tokio::test]
async fn cancel_is_reported_immediately() {
    let spec = ReadinessSpec::Port {
        port: 4000,
        timeout_ms: 5_000,
        interval_ms: 20,
    };
    let port_probe = FakePortProbe::new();
    let http_probe = FakeHttpProbe::new();
    let (tx, cancel) = watch::channel(false);
    tx.send(true).unwrap();
    let p = process(&utility_spec());

    let result = evaluate(&p, &spec, &port_probe, &http_probe, None, cancel).await;
    assert_eq!(result.outcome, ReadinessOutcome::Cancelled);
}

#[tokio::test]
async fn log_pattern_matches_line_pushed_onto_broadcast() {
    let spec = ReadinessSpec::Log {
        pattern: LogPattern::Substring("listening".to_string()),
        timeout_ms: 2_000,
    };
    let port_probe = FakePortProbe::new();
    let http_probe = FakeHttpProbe::new();
    let (_tx, cancel) = watch::channel(false);
    let p = process(&utility_spec());

    let (log_tx, log_rx) = tokio::sync::broadcast::channel(16);
    log_tx
        .send(LogEntry {
            stream: LogStream::Stdout,
            line: "server is listening on :3000".to_string(),
            at: chrono::Utc::now(),
        })
        .unwrap();

    let result = evaluate(&p, &spec, &port_probe, &http_probe, Some(log_rx), cancel).await;
    assert!(result.is_ready());
}
