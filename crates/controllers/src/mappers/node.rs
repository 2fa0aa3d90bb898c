use std::sync::{Arc, Mutex};

use metrics::counter;
use roster_core::catalog::{node_type, Workload};
use roster_core::{Resource, ResourceId};
use roster_index::{MatchKind, SelectorIndex};
use tracing::trace;

use super::{lock, Index};
use crate::controller::MapFn;
use crate::runtime::Request;

/// The Node a workload runs on: same tenancy, named by the payload.
pub fn node_id_from_workload(workload: &Resource, data: &Workload) -> ResourceId {
    workload.id.sibling(node_type(), data.node_name.clone())
}

/// Node -> Workload mapping. A workload is associated with at most one node.
#[derive(Default)]
pub struct NodeMapper {
    index: Mutex<Index>,
}

impl NodeMapper {
    pub fn new() -> Self { Self::default() }

    /// Associate `workload` with `node`, dropping any association with a
    /// different node first. Re-tracking the current association is a no-op
    /// and keeps its position.
    pub fn track(&self, workload: &ResourceId, node: &ResourceId) {
        let mut index = lock(&self.index);
        let current = index.entries().any(|(key, exact, _)| key == node.name && exact.contains(workload));
        if current {
            return;
        }
        if index.remove(workload) > 0 {
            index.prune();
        }
        index.insert(&node.name, workload.clone(), MatchKind::Exact);
        trace!(workload = %workload, node = %node.name, "node mapper: track");
    }

    pub fn untrack(&self, workload: &ResourceId) {
        let mut index = lock(&self.index);
        if index.remove(workload) > 0 {
            index.prune();
            trace!(workload = %workload, "node mapper: untrack");
        }
    }

    /// Workloads associated with the changed node.
    pub fn map_to_dependents(&self, node: &Resource) -> Vec<Request> {
        let reqs: Vec<Request> = lock(&self.index).lookup(&node.id.name).into_iter().map(Request::new).collect();
        counter!("mapper_requests_total", reqs.len() as u64, "mapper" => "node");
        reqs
    }

    pub fn is_tracked(&self, workload: &ResourceId) -> bool {
        lock(&self.index).contains(workload)
    }

    pub fn snapshot(&self) -> SelectorIndex<ResourceId> {
        lock(&self.index).clone()
    }

    pub fn map_fn(self: &Arc<Self>) -> MapFn {
        let me = Arc::clone(self);
        Arc::new(move |res: &Resource| me.map_to_dependents(res))
    }
}
