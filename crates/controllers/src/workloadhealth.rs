//! Workload health: the worse of the workload's own reports and the health
//! its node has published, written as one `Healthy` condition.

use std::sync::Arc;

use roster_core::catalog::{health_status_type, node_type, workload_type, Workload};
use roster_core::{Health, Status};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::controller::{map_owner_filtered, Controller, Reconciler};
use crate::error::ReconcileError;
use crate::health::{aggregate_health_reports, owned_health_reports, published_node_health, workload_health};
use crate::mappers::{node_id_from_workload, NodeMapper};
use crate::nodehealth;
use crate::runtime::{Request, Runtime};
use crate::status;

pub const STATUS_KEY: &str = "roster.catalog/workload-health";
pub const CONDITION_HEALTHY: &str = nodehealth::CONDITION_HEALTHY;

pub const WORKLOAD_HEALTHY_MESSAGE: &str = "All workload health checks are passing.";
pub const NODE_AND_WORKLOAD_HEALTHY_MESSAGE: &str = "All workload and associated node health checks are passing.";
pub const WORKLOAD_UNHEALTHY_MESSAGE: &str = "One or more workload health checks are not passing.";
pub const NODE_AND_WORKLOAD_UNHEALTHY_MESSAGE: &str = "One or more workload and node health checks are not passing.";

pub fn controller(node_map: Arc<NodeMapper>) -> Controller {
    let map = node_map.map_fn();
    Controller::for_type(workload_type(), Reconciler::WorkloadHealth(WorkloadHealthReconciler::new(node_map)))
        .with_watch(health_status_type(), map_owner_filtered(workload_type()))
        .with_watch(node_type(), map)
}

pub struct WorkloadHealthReconciler {
    node_map: Arc<NodeMapper>,
}

/// Message for the `Healthy` condition, keyed by which side is unhealthy.
fn health_message(has_node: bool, own: Health, node: Health) -> &'static str {
    match (own == Health::Passing, node == Health::Passing) {
        (false, false) => NODE_AND_WORKLOAD_UNHEALTHY_MESSAGE,
        (false, true) => WORKLOAD_UNHEALTHY_MESSAGE,
        (true, false) => nodehealth::NODE_UNHEALTHY_MESSAGE,
        (true, true) if has_node => NODE_AND_WORKLOAD_HEALTHY_MESSAGE,
        (true, true) => WORKLOAD_HEALTHY_MESSAGE,
    }
}

impl WorkloadHealthReconciler {
    pub fn new(node_map: Arc<NodeMapper>) -> Self { Self { node_map } }

    pub fn node_map(&self) -> &Arc<NodeMapper> { &self.node_map }

    pub async fn reconcile(&self, cx: &CancellationToken, rt: &Runtime, req: &Request) -> Result<(), ReconcileError> {
        let Some(res) = rt.read_opt(cx, &req.id).await? else {
            self.node_map.untrack(&req.id);
            debug!(workload = %req.id, "workload-health: workload gone, untracked");
            return Ok(());
        };
        let workload: Workload = res.decode()?;

        let node_health = if workload.node_name.is_empty() {
            self.node_map.untrack(&res.id);
            None
        } else {
            let node_id = node_id_from_workload(&res, &workload);
            self.node_map.track(&res.id, &node_id);
            let node = rt.read_opt(cx, &node_id).await?;
            Some(published_node_health(node.as_ref())?)
        };

        let reports = owned_health_reports(cx, rt, &res.id).await?;
        let own = aggregate_health_reports(reports.iter().copied());
        let health = workload_health(node_health, reports);
        let message = health_message(node_health.is_some(), own, node_health.unwrap_or(Health::Passing));

        let cond = nodehealth::healthy_condition(health, message, message);
        let new = Status { observed_generation: res.generation, conditions: [cond].into_iter().collect() };
        status::publish(cx, rt, &res, STATUS_KEY, new, "workload-health").await?;
        Ok(())
    }
}
