//! Runtime handle passed to reconcilers: store access bounded by the
//! caller's cancellation token.

use std::future::Future;
use std::sync::Arc;

use roster_core::{Resource, ResourceId, ResourceType, Status, Tenancy};
use roster_store::{Store, StoreError, StoreResult};
use tokio_util::sync::CancellationToken;

/// A request to reconcile one resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Request {
    pub id: ResourceId,
}

impl Request {
    pub fn new(id: ResourceId) -> Self { Self { id } }
}

#[derive(Clone)]
pub struct Runtime {
    store: Arc<dyn Store>,
}

/// Race a store call against cancellation. No internal retry or timeout.
async fn guard<T>(cx: &CancellationToken, fut: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
    if cx.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cx.cancelled() => Err(StoreError::Cancelled),
        res = fut => res,
    }
}

impl Runtime {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    pub async fn read(&self, cx: &CancellationToken, id: &ResourceId) -> StoreResult<Resource> {
        guard(cx, self.store.read(id)).await
    }

    /// Like [`Runtime::read`] with not-found folded into `None`.
    pub async fn read_opt(&self, cx: &CancellationToken, id: &ResourceId) -> StoreResult<Option<Resource>> {
        match self.read(cx, id).await {
            Ok(res) => Ok(Some(res)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn write(&self, cx: &CancellationToken, res: Resource) -> StoreResult<Resource> {
        guard(cx, self.store.write(res)).await
    }

    pub async fn write_status(&self, cx: &CancellationToken, id: &ResourceId, key: &str, status: Status) -> StoreResult<()> {
        guard(cx, self.store.write_status(id, key, status)).await
    }

    pub async fn list(&self, cx: &CancellationToken, rtype: &ResourceType, tenancy: &Tenancy, name_prefix: &str) -> StoreResult<Vec<Resource>> {
        guard(cx, self.store.list(rtype, tenancy, name_prefix)).await
    }

    pub async fn list_by_owner(&self, cx: &CancellationToken, owner: &ResourceId) -> StoreResult<Vec<Resource>> {
        guard(cx, self.store.list_by_owner(owner)).await
    }

    pub async fn delete(&self, cx: &CancellationToken, id: &ResourceId) -> StoreResult<()> {
        guard(cx, self.store.delete(id)).await
    }
}
