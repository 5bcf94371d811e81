use super::*;

#[test]
fn nonexistent_pid_is_discarded() {
    let mut system = System::new();
    let outcome = probe_liveness(&mut system, u32::MAX, Utc::now());
    assert_eq!(outcome, ReattachOutcome::Discarded);
}

#[test]
fn current_process_matches_its_own_start_time() {
    let mut system = System::new();
    let pid = std::process::id();
    system.refresh_process(Pid::from_u32(pid));
    let Some(process) = system.process(Pid::from_u32(pid)) else {
        // Sandboxed CI environments may restrict /proc visibility.
        return;
    };
    let started_at = DateTime::from_timestamp(process.start_time() as i64, 0).unwrap();
    let outcome = probe_liveness(&mut system, pid, started_at);
    assert_eq!(outcome, ReattachOutcome::Matched);
}

#[test]
fn drift_beyond_tolerance_is_discarded() {
    let mut system = System::new();
    let pid = std::process::id();
    let far_off = Utc::now() - chrono::Duration::hours(1);
    let outcome = probe_liveness(&mut system, pid, far_off);
    assert_eq!(outcome, ReattachOutcome::Discarded);
}
