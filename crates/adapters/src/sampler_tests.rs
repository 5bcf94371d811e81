use super::*;

#[tokio::test]
async fn fake_sampler_returns_none_for_unknown_pid() {
    let sampler = FakeSampler::new();
    assert!(sampler.sample(999).await.is_none());
}

#[tokio::test]
async fn fake_sampler_returns_set_sample() {
    let sampler = FakeSampler::new();
    sampler.set(
        123,
        Sample {
            cpu_pct: 42.0,
            rss_bytes: 1024,
        },
    );
    let sample = sampler.sample(123).await.unwrap();
    assert_eq!(sample.cpu_pct, 42.0);
    assert_eq!(sample.rss_bytes, 1024);
}

#[tokio::test]
async fn fake_sampler_stops_reporting_after_remove() {
    let sampler = FakeSampler::new();
    sampler.set(
        123,
        Sample {
            cpu_pct: 1.0,
            rss_bytes: 1,
        },
    );
    sampler.remove(123);
    assert!(sampler.sample(123).await.is_none());
}

#[tokio::test]
async fn real_sampler_returns_none_for_nonexistent_pid() {
    let sampler = SysinfoSampler::new();
    assert!(sampler.sample(u32::MAX).await.is_none());
}
