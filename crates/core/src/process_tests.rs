use super::*;
use chrono::Utc;

fn spec() -> ProcessSpec {
    ProcessSpec {
        command: "node".to_string(),
        args: vec!["server.js".to_string()],
        cwd: "/srv/app".to_string(),
        env: Default::default(),
        role: Role::Backend,
        tags: Default::default(),
        singleton: true,
        readiness: None,
        name: Some("api".to_string()),
    }
}

#[test]
fn new_process_starts_in_starting_state() {
    let p = ManagedProcess::new(ProcessId::new("p-1"), &spec(), Some(123), Utc::now());
    assert_eq!(p.state, ProcessState::Starting);
    assert!(p.ready_at.is_none());
    assert_eq!(p.pid, Some(123));
}

#[test]
fn mark_ready_sets_ready_at_and_state() {
    let mut p = ManagedProcess::new(ProcessId::new("p-1"), &spec(), Some(123), Utc::now());
    let at = Utc::now();
    p.mark_ready(at);
    assert_eq!(p.state, ProcessState::Ready);
    assert_eq!(p.ready_at, Some(at));
    assert!(p.readiness_result.as_ref().unwrap().is_ready());
}

#[test]
fn live_states_match_singleton_occupancy_rule() {
    assert!(ProcessState::Starting.is_live());
    assert!(ProcessState::Ready.is_live());
    assert!(ProcessState::Running.is_live());
    assert!(ProcessState::Reattached.is_live());
    assert!(!ProcessState::Exiting.is_live());
    assert!(!ProcessState::Exited.is_live());
    assert!(!ProcessState::Crashed.is_live());
}

#[test]
fn display_name_falls_back_to_command() {
    let mut s = spec();
    s.name = None;
    assert_eq!(s.display_name(), "node");
}
