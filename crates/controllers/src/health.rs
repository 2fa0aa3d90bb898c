//! Health aggregation: reduce reports (and a node's published health) to one
//! ordinal value. Worse dominates.

use roster_core::catalog::{health_status_type, HealthStatus};
use roster_core::{ConditionState, Health, Resource, ResourceId};
use tokio_util::sync::CancellationToken;

use crate::error::ReconcileError;
use crate::nodehealth;
use crate::runtime::Runtime;

/// Worst of `reports`, starting from PASSING. No reports means PASSING.
pub fn aggregate_health_reports(reports: impl IntoIterator<Item = Health>) -> Health {
    reports.into_iter().fold(Health::Passing, Health::worst)
}

/// Health of a workload given its own reports and, when it declares a node,
/// that node's health.
pub fn workload_health(node: Option<Health>, own: impl IntoIterator<Item = Health>) -> Health {
    let own = aggregate_health_reports(own);
    match node {
        Some(node) => own.worst(node),
        None => own,
    }
}

/// Decode the HealthStatus children of `owner`. Other child types are ignored.
pub async fn owned_health_reports(cx: &CancellationToken, rt: &Runtime, owner: &ResourceId) -> Result<Vec<Health>, ReconcileError> {
    let hs_type = health_status_type();
    let children = rt.list_by_owner(cx, owner).await?;
    let mut out = Vec::with_capacity(children.len());
    for child in children.iter().filter(|c| c.is_type(&hs_type)) {
        out.push(child.decode::<HealthStatus>()?.status);
    }
    Ok(out)
}

/// Health a node has published through the node-health controller.
///
/// A missing node is CRITICAL. A node that exists but has no usable record is
/// an error so the caller retries after the node reconciles.
pub fn published_node_health(node: Option<&Resource>) -> Result<Health, ReconcileError> {
    let Some(node) = node else { return Ok(Health::Critical) };
    let status = node.status.get(nodehealth::STATUS_KEY).ok_or(ReconcileError::NodeUnreconciled)?;
    let cond = status
        .condition(nodehealth::CONDITION_HEALTHY)
        .ok_or(ReconcileError::NodeHealthConditionNotFound(nodehealth::CONDITION_HEALTHY))?;
    if cond.state == ConditionState::True {
        return Ok(Health::Passing);
    }
    cond.reason.parse::<Health>().map_err(|e| ReconcileError::NodeHealthInvalid(e.0))
}
