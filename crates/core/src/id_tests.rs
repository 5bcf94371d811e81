use super::*;

define_id! {
    pub struct TestId;
}

#[test]
fn short_truncates_long_ids() {
    let id = TestId::new("abcdefgh");
    assert_eq!(id.short(4), "abcd");
}

#[test]
fn short_leaves_short_ids_untouched() {
    let id = TestId::new("ab");
    assert_eq!(id.short(4), "ab");
}

#[test]
fn sequential_id_gen_increments() {
    let gen = SequentialIdGen::new("proc");
    assert_eq!(gen.next(), "proc-1");
    assert_eq!(gen.next(), "proc-2");
}

#[test]
fn uuid_id_gen_produces_distinct_ids() {
    let gen = UuidIdGen;
    assert_ne!(gen.next(), gen.next());
}

#[test]
fn display_and_eq_str() {
    let id = TestId::new("p-1");
    assert_eq!(format!("{id}"), "p-1");
    assert_eq!(id, "p-1");
}
