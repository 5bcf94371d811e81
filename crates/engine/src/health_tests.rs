use super::*;
use ph_adapters::sampler::Sample;
use ph_adapters::FakeSampler;
use ph_core::{ProcessId, ProcessSpec, Role, SystemClock};

fn process(pid: u32) -> Arc<RwLock<ManagedProcess>> {
    let spec = ProcessSpec {
        command: "node".to_string(),
        args: vec![],
        cwd: String::new(),
        env: Default::default(),
        role: Role::Backend,
        tags: Default::default(),
        singleton: false,
        readiness: None,
        name: None,
    };
    Arc::new(RwLock::new(ManagedProcess::new(
        ProcessId::new("p-1"),
        &spec,
        Some(pid),
        chrono::Utc::now(),
    )))
}

#[tokio::test]
async fn sampling_missing_pid_returns_none() {
    let sampler = Arc::new(FakeSampler::new());
    let monitor = HealthMonitor::new(sampler, HealthThresholds::default());
    let p = process(999);
    assert!(monitor.sample(&p, &SystemClock).await.is_none());
}

#[tokio::test]
async fn low_usage_sample_yields_no_issue() {
    let sampler = Arc::new(FakeSampler::new());
    sampler.set(
        42,
        Sample {
            cpu_pct: 5.0,
            rss_bytes: 10 * 1024 * 1024,
        },
    );
    let monitor = HealthMonitor::new(sampler, HealthThresholds::default());
    let p = process(42);
    let sample = monitor.sample(&p, &SystemClock).await.unwrap();
    assert!(monitor.issue_for(&p.read().id.clone(), &sample).is_none());
}

#[tokio::test]
async fn crossing_into_critical_raises_an_issue_once() {
    let sampler = Arc::new(FakeSampler::new());
    sampler.set(
        42,
        Sample {
            cpu_pct: 99.0,
            rss_bytes: 10 * 1024 * 1024,
        },
    );
    let monitor = HealthMonitor::new(sampler, HealthThresholds::default());
    let p = process(42);
    let id = p.read().id.clone();

    let sample = monitor.sample(&p, &SystemClock).await.unwrap();
    let first = monitor.issue_for(&id, &sample);
    assert!(matches!(first, Some(Event::HealthIssueRaised(ref i)) if i.severity == Severity::Critical));

    // Same severity again: no repeat event.
    let sample2 = monitor.sample(&p, &SystemClock).await.unwrap();
    assert!(monitor.issue_for(&id, &sample2).is_none());
}

#[tokio::test]
async fn history_is_bounded() {
    let sampler = Arc::new(FakeSampler::new());
    sampler.set(
        42,
        Sample {
            cpu_pct: 1.0,
            rss_bytes: 1024,
        },
    );
    let monitor = HealthMonitor::new(sampler, HealthThresholds::default());
    let p = process(42);
    let id = p.read().id.clone();
    for _ in 0..(SAMPLE_HISTORY_CAPACITY + 10) {
        monitor.sample(&p, &SystemClock).await;
    }
    assert_eq!(monitor.history(&id).len(), SAMPLE_HISTORY_CAPACITY);
}
