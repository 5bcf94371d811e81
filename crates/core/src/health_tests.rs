use super::*;

#[test]
fn severity_orders_by_urgency() {
    assert!(Severity::Info < Severity::Warn);
    assert!(Severity::Warn < Severity::High);
    assert!(Severity::High < Severity::Critical);
}

#[test]
fn health_issue_round_trips_through_json() {
    let issue = HealthIssue {
        process_id: ProcessId::new("p-1"),
        severity: Severity::Warn,
        score: 60,
        reason: "cpu>80% for 30s".to_string(),
        at: Utc::now(),
    };
    let json = serde_json::to_string(&issue).unwrap();
    let back: HealthIssue = serde_json::from_str(&json).unwrap();
    assert_eq!(back.score, 60);
    assert_eq!(back.severity, Severity::Warn);
}
