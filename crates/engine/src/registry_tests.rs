use super::*;
use ph_core::{ProcessId, ProcessSpec, ProcessState, Role};
use std::collections::BTreeSet;

fn spec_with(role: Role, tags: &[&str]) -> ProcessSpec {
    ProcessSpec {
        command: "node".to_string(),
        args: vec![],
        cwd: String::new(),
        env: Default::default(),
        role,
        tags: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
        singleton: true,
        readiness: None,
        name: None,
    }
}

fn managed(id: &str, role: Role, tags: &[&str]) -> ManagedProcess {
    let spec = spec_with(role, tags);
    ManagedProcess::new(ProcessId::new(id), &spec, Some(1), chrono::Utc::now())
}

#[test]
fn insert_and_get_round_trips() {
    let registry = Registry::new();
    let p = managed("p-1", Role::Backend, &["api"]);
    registry.insert(p, None);
    let found = registry.get(&ProcessId::new("p-1")).unwrap();
    assert_eq!(found.read().role, Role::Backend);
}

#[test]
fn live_signature_is_found_but_terminal_one_is_not() {
    let registry = Registry::new();
    let p = managed("p-1", Role::Backend, &[]);
    let signature = p.signature.clone();
    registry.insert(p, None);

    assert!(registry.find_live_by_signature(&signature).is_some());

    registry.get(&ProcessId::new("p-1")).unwrap().write().state = ProcessState::Exited;
    assert!(registry.find_live_by_signature(&signature).is_none());
}

#[test]
fn list_filters_by_role_and_tag() {
    let registry = Registry::new();
    registry.insert(managed("p-1", Role::Backend, &["api"]), None);
    registry.insert(managed("p-2", Role::Frontend, &["web"]), None);
    registry.insert(managed("p-3", Role::Backend, &["worker"]), None);

    let backends = registry.list(&ProcessFilter {
        role: Some(Role::Backend),
        tag: None,
        live_only: false,
    });
    assert_eq!(backends.len(), 2);

    let api_tagged = registry.list(&ProcessFilter {
        role: None,
        tag: Some("api".to_string()),
        live_only: false,
    });
    assert_eq!(api_tagged.len(), 1);
}

#[test]
fn remove_evicts_signature_index() {
    let registry = Registry::new();
    let p = managed("p-1", Role::Backend, &[]);
    let signature = p.signature.clone();
    registry.insert(p, None);

    registry.remove(&ProcessId::new("p-1"));
    assert!(registry.get(&ProcessId::new("p-1")).is_none());
    assert!(registry.find_live_by_signature(&signature).is_none());
}

#[test]
fn snapshot_processes_returns_every_entry() {
    let registry = Registry::new();
    registry.insert(managed("p-1", Role::Backend, &[]), None);
    registry.insert(managed("p-2", Role::Frontend, &[]), None);
    assert_eq!(registry.snapshot_processes().len(), 2);
}

#[test]
fn list_preserves_insertion_order_regardless_of_id_sort_order() {
    let registry = Registry::new();
    // Deliberately insert ids out of lexicographic order; a map keyed and
    // iterated by sorted id would report "z-first" ahead of "a-second".
    registry.insert(managed("z-first", Role::Backend, &[]), None);
    registry.insert(managed("a-second", Role::Backend, &[]), None);
    registry.insert(managed("m-third", Role::Backend, &[]), None);

    let ids: Vec<String> = registry
        .all()
        .iter()
        .map(|p| p.read().id.as_str().to_string())
        .collect();
    assert_eq!(ids, vec!["z-first", "a-second", "m-third"]);
}

#[test]
fn reserve_or_insert_returns_existing_for_a_live_signature_and_reserves_otherwise() {
    let registry = Registry::new();
    let p = managed("p-1", Role::Backend, &[]);
    let signature = p.signature.clone();

    match registry.reserve_or_insert(&signature, || p) {
        SignatureReservation::Reserved(shared) => {
            assert_eq!(shared.read().id, ProcessId::new("p-1"));
        }
        SignatureReservation::Existing(_) => panic!("expected a fresh reservation"),
    }

    let second = managed("p-2", Role::Backend, &[]);
    match registry.reserve_or_insert(&signature, || second) {
        SignatureReservation::Existing(shared) => {
            assert_eq!(shared.read().id, ProcessId::new("p-1"));
        }
        SignatureReservation::Reserved(_) => panic!("expected the live entry to be reused"),
    }
}

#[test]
fn reserve_or_insert_reuses_the_signature_once_the_prior_holder_goes_terminal() {
    let registry = Registry::new();
    let p = managed("p-1", Role::Backend, &[]);
    let signature = p.signature.clone();
    registry.insert(p, None);
    registry.get(&ProcessId::new("p-1")).unwrap().write().state = ProcessState::Exited;

    match registry.reserve_or_insert(&signature, || managed("p-2", Role::Backend, &[])) {
        SignatureReservation::Reserved(shared) => {
            assert_eq!(shared.read().id, ProcessId::new("p-2"));
        }
        SignatureReservation::Existing(_) => panic!("terminal holder should not block a new reservation"),
    }
}
