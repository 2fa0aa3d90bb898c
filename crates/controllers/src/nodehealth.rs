//! Node health: aggregate the HealthStatus reports a node owns into one
//! `Healthy` condition on the node.

use roster_core::catalog::{health_status_type, node_type};
use roster_core::{Condition, ConditionState, Health, Status};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::controller::{map_owner_filtered, Controller, Reconciler};
use crate::error::ReconcileError;
use crate::health::{aggregate_health_reports, owned_health_reports};
use crate::runtime::{Request, Runtime};
use crate::status;

pub const STATUS_KEY: &str = "roster.catalog/node-health";
pub const CONDITION_HEALTHY: &str = "Healthy";

pub const NODE_HEALTHY_MESSAGE: &str = "All node health checks are passing.";
pub const NODE_UNHEALTHY_MESSAGE: &str = "One or more node health checks are not passing.";

pub fn controller() -> Controller {
    Controller::for_type(node_type(), Reconciler::NodeHealth(NodeHealthReconciler))
        .with_watch(health_status_type(), map_owner_filtered(node_type()))
}

#[derive(Debug, Default)]
pub struct NodeHealthReconciler;

pub(crate) fn healthy_condition(health: Health, healthy_msg: &str, unhealthy_msg: &str) -> Condition {
    let passing = health == Health::Passing;
    Condition {
        kind: CONDITION_HEALTHY.to_string(),
        state: if passing { ConditionState::True } else { ConditionState::False },
        reason: health.as_str().to_string(),
        message: if passing { healthy_msg } else { unhealthy_msg }.to_string(),
    }
}

impl NodeHealthReconciler {
    pub async fn reconcile(&self, cx: &CancellationToken, rt: &Runtime, req: &Request) -> Result<(), ReconcileError> {
        let Some(node) = rt.read_opt(cx, &req.id).await? else {
            debug!(node = %req.id, "node-health: node gone");
            return Ok(());
        };
        let health = aggregate_health_reports(owned_health_reports(cx, rt, &node.id).await?);
        let cond = healthy_condition(health, NODE_HEALTHY_MESSAGE, NODE_UNHEALTHY_MESSAGE);
        let new = Status { observed_generation: node.generation, conditions: [cond].into_iter().collect() };
        status::publish(cx, rt, &node, STATUS_KEY, new, "node-health").await?;
        Ok(())
    }
}
