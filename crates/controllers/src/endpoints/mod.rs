//! Service endpoints: compute a ServiceEndpoints resource for every Service
//! that selects workloads, and keep it in line as workloads change.
//!
//! A Service with no selector (or an empty one) is left alone: its endpoints
//! are managed by hand. When a Service stops selecting, endpoints this
//! controller wrote are deleted; hand-written ones are kept.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use metrics::counter;
use roster_core::catalog::{service_endpoints_type, service_type, workload_type, Service, ServiceEndpoints, WorkloadSelector};
use roster_core::{Condition, ConditionState, Resource, ResourceId, Status};
use rustc_hash::FxHashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::controller::{map_owner, Controller, Reconciler};
use crate::error::ReconcileError;
use crate::mappers::WorkloadMapper;
use crate::runtime::{Request, Runtime};
use crate::status;

mod translate;

pub use translate::{compute_endpoints, workload_health_from_status, workload_to_endpoint};

pub const STATUS_KEY: &str = "roster.catalog/endpoint-manager";
pub const CONDITION_ACCEPTED: &str = "Accepted";
pub const CONDITION_ENDPOINTS_MANAGED: &str = "EndpointsManaged";

pub const REASON_PASSED_VALIDATION: &str = "PassedValidation";
pub const REASON_SELECTOR_FOUND: &str = "SelectorFound";
pub const REASON_SELECTOR_NOT_FOUND: &str = "SelectorNotFound";

pub const PASSED_VALIDATION_MESSAGE: &str = "The service has passed validation.";
pub const SELECTOR_FOUND_MESSAGE: &str = "A valid workload selector is present within the service.";
pub const SELECTOR_NOT_FOUND_MESSAGE: &str = "Either the workload selector was not present or contained no selection criteria.";

/// Metadata key stamped on endpoints written by this controller. The value is
/// [`STATUS_KEY`].
pub const META_MANAGED_BY: &str = "managed-by";

pub fn controller(workload_map: Arc<WorkloadMapper>) -> Controller {
    let map = workload_map.map_fn();
    Controller::for_type(service_type(), Reconciler::ServiceEndpoints(ServiceEndpointsReconciler::new(workload_map)))
        .with_watch(service_endpoints_type(), map_owner())
        .with_watch(workload_type(), map)
}

/// Status for a service, by whether it is under endpoint management.
pub fn service_status(generation: u64, managed: bool) -> Status {
    let (state, reason, message) = if managed {
        (ConditionState::True, REASON_SELECTOR_FOUND, SELECTOR_FOUND_MESSAGE)
    } else {
        (ConditionState::False, REASON_SELECTOR_NOT_FOUND, SELECTOR_NOT_FOUND_MESSAGE)
    };
    let accepted = Condition {
        kind: CONDITION_ACCEPTED.into(),
        state: ConditionState::True,
        reason: REASON_PASSED_VALIDATION.into(),
        message: PASSED_VALIDATION_MESSAGE.into(),
    };
    let managed = Condition { kind: CONDITION_ENDPOINTS_MANAGED.into(), state, reason: reason.into(), message: message.into() };
    Status { observed_generation: generation, conditions: [accepted, managed].into_iter().collect() }
}

pub struct ServiceEndpointsReconciler {
    workload_map: Arc<WorkloadMapper>,
    /// Services whose endpoints this process has written.
    managed: Mutex<FxHashSet<ResourceId>>,
}

impl ServiceEndpointsReconciler {
    pub fn new(workload_map: Arc<WorkloadMapper>) -> Self {
        Self { workload_map, managed: Mutex::new(FxHashSet::default()) }
    }

    pub fn workload_map(&self) -> &Arc<WorkloadMapper> { &self.workload_map }

    pub fn is_managing(&self, service: &ResourceId) -> bool {
        self.managed().contains(service)
    }

    fn managed(&self) -> MutexGuard<'_, FxHashSet<ResourceId>> {
        self.managed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn reconcile(&self, cx: &CancellationToken, rt: &Runtime, req: &Request) -> Result<(), ReconcileError> {
        let Some(res) = rt.read_opt(cx, &req.id).await? else {
            // Owned endpoints go with the service through cascade delete.
            self.workload_map.untrack(&req.id);
            self.managed().remove(&req.id);
            debug!(service = %req.id, "service-endpoints: service gone, untracked");
            return Ok(());
        };
        let service: Service = res.decode()?;
        let endpoints_id = res.id.sibling(service_endpoints_type(), res.id.name.clone());

        let selector = service.workloads.as_ref().filter(|s| !s.is_empty());
        match selector {
            None => {
                self.workload_map.untrack(&res.id);
                self.maybe_delete(cx, rt, &res.id, &endpoints_id).await?;
            }
            Some(selector) => {
                self.workload_map.track(&res.id, selector);
                self.maybe_upsert(cx, rt, &res.id, &service, selector, &endpoints_id).await?;
            }
        }

        status::publish(cx, rt, &res, STATUS_KEY, service_status(res.generation, selector.is_some()), "service-endpoints").await?;
        Ok(())
    }

    async fn maybe_delete(&self, cx: &CancellationToken, rt: &Runtime, service_id: &ResourceId, endpoints_id: &ResourceId) -> Result<(), ReconcileError> {
        if !self.should_delete(cx, rt, service_id, endpoints_id).await? {
            return Ok(());
        }
        rt.delete(cx, endpoints_id).await?;
        self.managed().remove(service_id);
        counter!("endpoints_deletes_total", 1u64);
        info!(service = %service_id, "service-endpoints: selector cleared, deleted managed endpoints");
        Ok(())
    }

    /// Delete only endpoints this controller wrote: either remembered in the
    /// managed set, or stamped with the managed-by marker by an earlier process.
    async fn should_delete(&self, cx: &CancellationToken, rt: &Runtime, service_id: &ResourceId, endpoints_id: &ResourceId) -> Result<bool, ReconcileError> {
        if self.is_managing(service_id) {
            return Ok(true);
        }
        let Some(current) = rt.read_opt(cx, endpoints_id).await? else { return Ok(false) };
        Ok(current.metadata.get(META_MANAGED_BY).map(String::as_str) == Some(STATUS_KEY))
    }

    async fn maybe_upsert(
        &self,
        cx: &CancellationToken,
        rt: &Runtime,
        service_id: &ResourceId,
        service: &Service,
        selector: &WorkloadSelector,
        endpoints_id: &ResourceId,
    ) -> Result<(), ReconcileError> {
        let workloads = gather_workloads(cx, rt, service_id, selector).await?;
        let computed = compute_endpoints(service, &workloads)?;

        let unchanged = match rt.read_opt(cx, endpoints_id).await? {
            Some(current) => current.decode::<ServiceEndpoints>()? == computed,
            None => false,
        };
        if unchanged {
            return Ok(());
        }

        let res = Resource::new(endpoints_id.clone())
            .with_owner(service_id.clone())
            .with_meta(META_MANAGED_BY, STATUS_KEY)
            .with_data(&computed)?;
        rt.write(cx, res).await?;
        self.managed().insert(service_id.clone());
        counter!("endpoints_writes_total", 1u64);
        debug!(service = %service_id, endpoints = computed.endpoints.len(), workloads = workloads.len(), "service-endpoints: wrote endpoints");
        Ok(())
    }
}

/// Workloads selected by `selector` in the service's tenancy: exact names
/// first, then prefixes, each name once, sorted by name.
async fn gather_workloads(cx: &CancellationToken, rt: &Runtime, service_id: &ResourceId, selector: &WorkloadSelector) -> Result<Vec<Resource>, ReconcileError> {
    let wtype = workload_type();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut out = Vec::new();

    for name in &selector.names {
        if let Some(w) = rt.read_opt(cx, &service_id.sibling(wtype.clone(), name.clone())).await? {
            if seen.insert(w.id.name.clone()) {
                out.push(w);
            }
        }
    }
    for prefix in &selector.prefixes {
        for w in rt.list(cx, &wtype, &service_id.tenancy, prefix).await? {
            if seen.insert(w.id.name.clone()) {
                out.push(w);
            }
        }
    }

    out.sort_by(|a, b| a.id.name.cmp(&b.id.name));
    Ok(out)
}
