use super::*;
use ph_core::{ProcessId, ProcessSpec, Role, SystemClock};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

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

#[tokio::test]
async fn restart_preserves_id_and_bumps_restart_count() {
    let registry = Registry::new();
    let spawner = Spawner::new(200);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (events, _rx) = broadcast::channel(16);

    let id = ProcessId::new("p-1");
    let spec = spec("sleep", &["30"]);
    let process = ManagedProcess::new(id.clone(), &spec, None, clock.utc_now());
    let shared = registry.insert(process, None);
    let handle = spawner.spawn(shared.clone(), clock.clone(), events.clone()).unwrap();
    registry.set_handle(&id, handle);

    let old_pid = shared.read().pid.unwrap();

    let outcome = restart_process(&id, &registry, &spawner, &clock, &events)
        .await
        .unwrap();

    assert_eq!(outcome.old_pid, Some(old_pid));
    assert_ne!(outcome.new_pid, old_pid);
    let p = registry.get(&id).unwrap();
    assert_eq!(p.read().id, id);
    assert_eq!(p.read().restart_count, 1);
    assert_eq!(p.read().pid, Some(outcome.new_pid));

    registry.take_handle(&id).unwrap().stop(true, None).await;
}

#[tokio::test]
async fn restart_unknown_process_is_reported() {
    let registry = Registry::new();
    let spawner = Spawner::default();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (events, _rx) = broadcast::channel(16);

    let result = restart_process(&ProcessId::new("ghost"), &registry, &spawner, &clock, &events).await;
    assert!(matches!(result, Err(EngineError::UnknownProcess(_))));
}

#[test]
fn suppresses_restart_after_clean_exit_within_grace_window() {
    use ph_core::FakeClock;

    let clock = FakeClock::default();
    let spec = spec("true", &[]);
    let mut process = ManagedProcess::new(ProcessId::new("p-2"), &spec, None, clock.utc_now());
    process.exit_code = Some(0);
    process.exited_at = Some(clock.utc_now());

    assert!(should_suppress_restart(&process, 5_000, &clock));

    clock.advance(std::time::Duration::from_millis(6_000));
    assert!(!should_suppress_restart(&process, 5_000, &clock));
}

#[test]
fn never_suppresses_restart_after_a_crash() {
    use ph_core::FakeClock;

    let clock = FakeClock::default();
    let spec = spec("false", &[]);
    let mut process = ManagedProcess::new(ProcessId::new("p-3"), &spec, None, clock.utc_now());
    process.exit_code = Some(1);
    process.exited_at = Some(clock.utc_now());

    assert!(!should_suppress_restart(&process, 5_000, &clock));
}
