//! The process registry (spec.md §4.2): the canonical table of every
//! `ManagedProcess` this daemon knows about, plus the signature index
//! that backs singleton idempotency.
//!
//! Locking follows spec.md §5: one coarse lock guards both the entry table
//! and the signature index together, so a singleton's check-for-a-live-
//! holder and insert-if-none happen atomically under a single critical
//! section — two concurrent callers racing on the same signature can't
//! both observe "no live holder" and both spawn (spec.md §4.2: "the first
//! to acquire the signature lock wins"). Each process's own fields are
//! still independently guarded by its own `RwLock` so readers (`list`,
//! `get-process-status`) don't contend with unrelated processes.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use ph_core::{LogEntry, ManagedProcess, ProcessId, Role};
use tokio::sync::broadcast;

use crate::spawner::ProcessHandle;

struct Entry {
    process: Arc<RwLock<ManagedProcess>>,
    handle: Option<ProcessHandle>,
}

/// Optional filters applied by `list`. `None` means "don't filter on this".
#[derive(Debug, Clone, Default)]
pub struct ProcessFilter {
    pub role: Option<Role>,
    pub tag: Option<String>,
    pub live_only: bool,
}

/// Outcome of [`Registry::reserve_or_insert`].
pub enum SignatureReservation {
    /// A live process was already registered under this signature; it is
    /// returned as-is and nothing was spawned.
    Existing(Arc<RwLock<ManagedProcess>>),
    /// No live holder existed, so the process built by `make` was inserted
    /// and now holds the signature.
    Reserved(Arc<RwLock<ManagedProcess>>),
}

#[derive(Default)]
struct RegistryState {
    // `IndexMap` preserves insertion order, so `list`/`all`/
    // `snapshot_processes` return processes in spawn order (spec.md §4.2)
    // instead of the order random UUID ids happen to sort in.
    entries: IndexMap<ProcessId, Entry>,
    signatures: HashMap<String, ProcessId>,
}

#[derive(Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly-spawned (or reattached) process. Replaces any
    /// prior entry under the same id.
    pub fn insert(&self, process: ManagedProcess, handle: Option<ProcessHandle>) -> Arc<RwLock<ManagedProcess>> {
        let id = process.id.clone();
        let signature = process.signature.clone();
        let shared = Arc::new(RwLock::new(process));

        let mut state = self.state.lock();
        state.entries.insert(id.clone(), Entry { process: shared.clone(), handle });
        state.signatures.insert(signature, id);
        shared
    }

    /// Atomically resolve a singleton start. Under one lock: if a live
    /// process is already registered under `signature`, return it; otherwise
    /// construct a new one via `make`, insert it, and register it as the
    /// signature's holder before the lock is released. `make` runs while
    /// the lock is held, so it must not block or recurse into the registry.
    pub fn reserve_or_insert(
        &self,
        signature: &str,
        make: impl FnOnce() -> ManagedProcess,
    ) -> SignatureReservation {
        let mut state = self.state.lock();

        if let Some(id) = state.signatures.get(signature).cloned() {
            match state.entries.get(&id) {
                Some(entry) if entry.process.read().state.is_live() => {
                    return SignatureReservation::Existing(entry.process.clone());
                }
                _ => {
                    state.signatures.remove(signature);
                }
            }
        }

        let process = make();
        let id = process.id.clone();
        let shared = Arc::new(RwLock::new(process));
        state.entries.insert(id.clone(), Entry { process: shared.clone(), handle: None });
        state.signatures.insert(signature.to_string(), id);
        SignatureReservation::Reserved(shared)
    }

    pub fn get(&self, id: &ProcessId) -> Option<Arc<RwLock<ManagedProcess>>> {
        self.state.lock().entries.get(id).map(|e| e.process.clone())
    }

    /// Find a live process already running under this exact signature
    /// (spec.md §4.2's singleton rule). Stale signature-index entries
    /// pointing at a now-terminal process are evicted as a side effect.
    pub fn find_live_by_signature(&self, signature: &str) -> Option<Arc<RwLock<ManagedProcess>>> {
        let mut state = self.state.lock();
        let id = state.signatures.get(signature).cloned()?;
        match state.entries.get(&id) {
            Some(entry) if entry.process.read().state.is_live() => Some(entry.process.clone()),
            _ => {
                state.signatures.remove(signature);
                None
            }
        }
    }

    /// Remove a process entirely (after it has been stopped/cleaned up).
    /// Returns its handle so the caller can finish joining the supervisor.
    pub fn remove(&self, id: &ProcessId) -> Option<ProcessHandle> {
        let mut state = self.state.lock();
        let entry = state.entries.shift_remove(id)?;
        let signature = entry.process.read().signature.clone();
        if state.signatures.get(&signature) == Some(id) {
            state.signatures.remove(&signature);
        }
        entry.handle
    }

    /// Take ownership of a process's handle (e.g. to call `stop` on it),
    /// leaving the registry entry itself in place.
    /// Whether `id` has a supervised [`ProcessHandle`] attached — false for
    /// a process reattached from a snapshot, whose exit this engine instance
    /// has no supervisor task watching for.
    pub fn has_handle(&self, id: &ProcessId) -> bool {
        self.state.lock().entries.get(id).is_some_and(|e| e.handle.is_some())
    }

    pub fn take_handle(&self, id: &ProcessId) -> Option<ProcessHandle> {
        self.state.lock().entries.get_mut(id).and_then(|e| e.handle.take())
    }

    pub fn set_handle(&self, id: &ProcessId, handle: ProcessHandle) {
        if let Some(entry) = self.state.lock().entries.get_mut(id) {
            entry.handle = Some(handle);
        }
    }

    /// Clone of the running process's log broadcast sender, for a reader
    /// (e.g. log-pattern readiness) that needs to subscribe without
    /// taking ownership of the handle away from whoever will `stop` it.
    pub fn log_sender(&self, id: &ProcessId) -> Option<broadcast::Sender<LogEntry>> {
        self.state
            .lock()
            .entries
            .get(id)
            .and_then(|e| e.handle.as_ref().map(|h| h.log_tx.clone()))
    }

    pub fn list(&self, filter: &ProcessFilter) -> Vec<Arc<RwLock<ManagedProcess>>> {
        self.state
            .lock()
            .entries
            .values()
            .map(|e| e.process.clone())
            .filter(|p| {
                let p = p.read();
                if filter.live_only && !p.state.is_live() {
                    return false;
                }
                if let Some(role) = filter.role {
                    if p.role != role {
                        return false;
                    }
                }
                if let Some(tag) = &filter.tag {
                    if !p.tags.contains(tag) {
                        return false;
                    }
                }
                true
            })
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<RwLock<ManagedProcess>>> {
        self.list(&ProcessFilter::default())
    }

    /// Snapshot every process's durable state (for `ph-storage::Snapshot`).
    pub fn snapshot_processes(&self) -> Vec<ManagedProcess> {
        self.state.lock().entries.values().map(|e| e.process.read().clone()).collect()
    }

    /// Ids of processes still occupying a "live" state, used by the daemon
    /// to decide what needs a snapshot checkpoint or shutdown cascade.
    pub fn live_ids(&self) -> Vec<ProcessId> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|(_, e)| e.process.read().state.is_live())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Drop stale signature entries pointing at non-live processes that
    /// were removed without going through `remove` (defensive; normal
    /// paths always call `remove`).
    pub fn gc_signatures(&self) {
        let mut state = self.state.lock();
        let RegistryState { entries, signatures } = &mut *state;
        signatures.retain(|_, id| {
            entries
                .get(id)
                .map(|e| e.process.read().state.is_live())
                .unwrap_or(false)
        });
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
