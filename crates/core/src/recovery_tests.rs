use super::*;

#[test]
fn gt_op_holds_above_threshold() {
    assert!(Op::Gt.holds(81.0, 80.0));
    assert!(!Op::Gt.holds(80.0, 80.0));
}

#[test]
fn lt_op_holds_below_threshold() {
    assert!(Op::Lt.holds(10.0, 30.0));
    assert!(!Op::Lt.holds(30.0, 30.0));
}

#[test]
fn eq_op_holds_within_epsilon() {
    assert!(Op::Eq.holds(5.0, 5.0));
    assert!(!Op::Eq.holds(5.1, 5.0));
}

#[test]
fn strategy_defaults_to_enabled() {
    let json = r#"{
        "name": "restart-on-crash",
        "conditions": [],
        "actions": [],
        "maxAttempts": 2,
        "cooldownMs": 60000
    }"#;
    let strategy: RecoveryStrategy = serde_json::from_str(json).unwrap();
    assert!(strategy.enabled);
}

#[test]
fn condition_parses_camel_case_metric_and_duration() {
    let json = r#"{"metric":"healthScore","op":"lt","value":40.0,"durationMs":30000}"#;
    let condition: Condition = serde_json::from_str(json).unwrap();
    assert_eq!(condition.metric, Metric::HealthScore);
    assert_eq!(condition.duration_ms, 30_000);
}
