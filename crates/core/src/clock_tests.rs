use super::*;

#[test]
fn fake_clock_advances_monotonic_time() {
    let clock = FakeClock::default();
    let t0 = clock.now();
    clock.advance(Duration::from_millis(500));
    let t1 = clock.now();
    assert_eq!(t1.duration_since(t0), Duration::from_millis(500));
}

#[test]
fn fake_clock_advances_wall_time() {
    let start = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    let clock = FakeClock::new(start);
    clock.advance(Duration::from_secs(60));
    assert_eq!(clock.utc_now(), start + chrono::Duration::seconds(60));
}

#[test]
fn system_clock_now_is_monotonic_nondecreasing() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}
