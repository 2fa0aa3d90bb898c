//! Controller registration: primary type, extra watches with their mapping
//! functions, and the reconciler variant that owns the controller's state.

use std::sync::Arc;

use roster_core::{Delta, Resource, ResourceType};
use tokio_util::sync::CancellationToken;

use crate::endpoints::ServiceEndpointsReconciler;
use crate::error::ReconcileError;
use crate::nodehealth::NodeHealthReconciler;
use crate::runtime::{Request, Runtime};
use crate::workloadhealth::WorkloadHealthReconciler;

/// Maps a changed resource of a watched type to requests for the
/// controller's primary type.
pub type MapFn = Arc<dyn Fn(&Resource) -> Vec<Request> + Send + Sync>;

/// Request the owner of the changed resource.
pub fn map_owner() -> MapFn {
    Arc::new(|res: &Resource| res.owner.iter().map(|o| Request::new(o.clone())).collect())
}

/// Request the owner of the changed resource, only when the owner is of `owner_type`.
pub fn map_owner_filtered(owner_type: ResourceType) -> MapFn {
    Arc::new(move |res: &Resource| {
        res.owner.iter().filter(|o| o.rtype == owner_type).map(|o| Request::new(o.clone())).collect()
    })
}

pub enum Reconciler {
    ServiceEndpoints(ServiceEndpointsReconciler),
    NodeHealth(NodeHealthReconciler),
    WorkloadHealth(WorkloadHealthReconciler),
}

impl Reconciler {
    pub async fn reconcile(&self, cx: &CancellationToken, rt: &Runtime, req: &Request) -> Result<(), ReconcileError> {
        match self {
            Reconciler::ServiceEndpoints(r) => r.reconcile(cx, rt, req).await,
            Reconciler::NodeHealth(r) => r.reconcile(cx, rt, req).await,
            Reconciler::WorkloadHealth(r) => r.reconcile(cx, rt, req).await,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Reconciler::ServiceEndpoints(_) => "service-endpoints",
            Reconciler::NodeHealth(_) => "node-health",
            Reconciler::WorkloadHealth(_) => "workload-health",
        }
    }
}

struct Watch {
    rtype: ResourceType,
    map: MapFn,
}

pub struct Controller {
    rtype: ResourceType,
    watches: Vec<Watch>,
    reconciler: Reconciler,
}

impl Controller {
    pub fn for_type(rtype: ResourceType, reconciler: Reconciler) -> Self {
        Self { rtype, watches: Vec::new(), reconciler }
    }

    pub fn with_watch(mut self, rtype: ResourceType, map: MapFn) -> Self {
        self.watches.push(Watch { rtype, map });
        self
    }

    pub fn primary_type(&self) -> &ResourceType { &self.rtype }
    pub fn reconciler(&self) -> &Reconciler { &self.reconciler }
    pub fn name(&self) -> &'static str { self.reconciler.name() }

    /// Requests triggered by one delta: the resource itself when it is of the
    /// primary type, plus whatever each matching watch maps it to.
    pub fn requests_for(&self, delta: &Delta) -> Vec<Request> {
        let res = &delta.resource;
        let mut out = Vec::new();
        if res.is_type(&self.rtype) {
            out.push(Request::new(res.id.clone()));
        }
        for w in self.watches.iter().filter(|w| res.is_type(&w.rtype)) {
            out.extend((w.map)(res));
        }
        out
    }
}
