use super::*;

fn entry(line: &str) -> LogEntry {
    LogEntry {
        stream: LogStream::Stdout,
        line: line.to_string(),
        at: Utc::now(),
    }
}

#[test]
fn ring_evicts_oldest_past_capacity() {
    let mut ring = LogRing::new(3);
    ring.push(entry("a"));
    ring.push(entry("b"));
    ring.push(entry("c"));
    ring.push(entry("d"));

    let lines: Vec<_> = ring.iter().map(|e| e.line.clone()).collect();
    assert_eq!(lines, vec!["b", "c", "d"]);
}

#[test]
fn ring_default_capacity_is_100() {
    let ring = LogRing::default();
    assert_eq!(ring.capacity, DEFAULT_LOG_RING_CAPACITY);
}

#[test]
fn last_n_returns_tail() {
    let mut ring = LogRing::new(10);
    for i in 0..5 {
        ring.push(entry(&i.to_string()));
    }
    let tail = ring.last_n(2);
    let lines: Vec<_> = tail.iter().map(|e| e.line.clone()).collect();
    assert_eq!(lines, vec!["3", "4"]);
}
