//! Roster store: the resource store contract the controllers consume, plus an
//! in-RAM implementation used by tests and the CLI host.
//!
//! The real store (durability, conflict resolution, transport) lives outside
//! this workspace. `MemoryStore` provides exactly the contract the controllers
//! rely on: read-after-write for a single writer, a status sub-resource that
//! does not bump generation, owner cascade delete and watch deltas.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use metrics::counter;
use roster_core::{Delta, DeltaKind, Resource, ResourceId, ResourceType, Status, Tenancy};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not_found: {0}")]
    NotFound(ResourceId),
    #[error("cancelled")]
    Cancelled,
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Collaborator store contract.
#[async_trait]
pub trait Store: Send + Sync {
    async fn read(&self, id: &ResourceId) -> StoreResult<Resource>;

    /// Write payload, owner and metadata. Assigns or bumps `generation`.
    /// Rejects resources that carry status; use [`Store::write_status`].
    async fn write(&self, res: Resource) -> StoreResult<Resource>;

    async fn write_status(&self, id: &ResourceId, key: &str, status: Status) -> StoreResult<()>;

    /// Resources of one type within a tenancy whose name starts with `name_prefix`.
    async fn list(&self, rtype: &ResourceType, tenancy: &Tenancy, name_prefix: &str) -> StoreResult<Vec<Resource>>;

    async fn list_by_owner(&self, owner: &ResourceId) -> StoreResult<Vec<Resource>>;

    /// Deleting a missing resource is not an error.
    async fn delete(&self, id: &ResourceId) -> StoreResult<()>;
}

/// Per-operation counters. Tests use these to assert write idempotence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpStats {
    pub reads: u64,
    pub writes: u64,
    pub status_writes: u64,
    pub lists: u64,
    pub deletes: u64,
}

#[derive(Default)]
struct Counters {
    reads: AtomicU64,
    writes: AtomicU64,
    status_writes: AtomicU64,
    lists: AtomicU64,
    deletes: AtomicU64,
}

#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<FxHashMap<ResourceId, Resource>>,
    watchers: Mutex<Vec<mpsc::UnboundedSender<Delta>>>,
    counters: Counters,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Receive a delta for every mutation made after this call.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Delta> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.watchers).push(tx);
        rx
    }

    pub fn stats(&self) -> OpStats {
        OpStats {
            reads: self.counters.reads.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            status_writes: self.counters.status_writes.load(Ordering::Relaxed),
            lists: self.counters.lists.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize { lock(&self.items).len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Every stored resource, sorted by id.
    pub fn dump(&self) -> Vec<Resource> {
        let mut all: Vec<Resource> = lock(&self.items).values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    fn emit(&self, kind: DeltaKind, resource: Resource) {
        let mut watchers = lock(&self.watchers);
        watchers.retain(|tx| tx.send(Delta { kind, resource: resource.clone() }).is_ok());
    }

    fn bump(counter: &AtomicU64, op: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        counter!("store_ops_total", 1u64, "op" => op);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read(&self, id: &ResourceId) -> StoreResult<Resource> {
        Self::bump(&self.counters.reads, "read");
        lock(&self.items).get(id).cloned().ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn write(&self, res: Resource) -> StoreResult<Resource> {
        if !res.status.is_empty() {
            return Err(StoreError::Rejected(format!("{}: status must be written through write_status", res.id)));
        }
        Self::bump(&self.counters.writes, "write");
        let stored = {
            let mut items = lock(&self.items);
            let next = match items.get(&res.id) {
                Some(prev) => Resource {
                    uid: prev.uid.clone(),
                    generation: prev.generation.saturating_add(1),
                    status: prev.status.clone(),
                    ..res
                },
                None => Resource { uid: uuid::Uuid::new_v4().to_string(), generation: 1, ..res },
            };
            items.insert(next.id.clone(), next.clone());
            next
        };
        debug!(id = %stored.id, generation = stored.generation, "store: write");
        self.emit(DeltaKind::Applied, stored.clone());
        Ok(stored)
    }

    async fn write_status(&self, id: &ResourceId, key: &str, status: Status) -> StoreResult<()> {
        Self::bump(&self.counters.status_writes, "write_status");
        let stored = {
            let mut items = lock(&self.items);
            let res = items.get_mut(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
            res.status.insert(key.to_string(), status);
            res.clone()
        };
        debug!(id = %id, key, "store: write status");
        self.emit(DeltaKind::Applied, stored);
        Ok(())
    }

    async fn list(&self, rtype: &ResourceType, tenancy: &Tenancy, name_prefix: &str) -> StoreResult<Vec<Resource>> {
        Self::bump(&self.counters.lists, "list");
        let mut out: Vec<Resource> = lock(&self.items)
            .values()
            .filter(|r| &r.id.rtype == rtype && &r.id.tenancy == tenancy && r.id.name.starts_with(name_prefix))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.name.cmp(&b.id.name));
        Ok(out)
    }

    async fn list_by_owner(&self, owner: &ResourceId) -> StoreResult<Vec<Resource>> {
        Self::bump(&self.counters.lists, "list_by_owner");
        let mut out: Vec<Resource> = lock(&self.items)
            .values()
            .filter(|r| r.owner.as_ref() == Some(owner))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn delete(&self, id: &ResourceId) -> StoreResult<()> {
        Self::bump(&self.counters.deletes, "delete");
        let removed = {
            let mut items = lock(&self.items);
            let mut removed = Vec::new();
            let mut pending = vec![id.clone()];
            // Cascade through owner references, parents first.
            while let Some(next) = pending.pop() {
                if let Some(res) = items.remove(&next) {
                    pending.extend(items.values().filter(|r| r.owner.as_ref() == Some(&next)).map(|r| r.id.clone()));
                    removed.push(res);
                }
            }
            removed
        };
        if removed.is_empty() {
            trace!(id = %id, "store: delete of missing resource");
        }
        for res in removed {
            debug!(id = %res.id, "store: delete");
            self.emit(DeltaKind::Deleted, res);
        }
        Ok(())
    }
}
