//! Roster catalog controllers.
//!
//! Three controllers keep derived catalog state in line with primary state:
//! - service endpoints: Service + selected Workloads -> ServiceEndpoints
//! - node health: HealthStatus reports owned by a Node -> Node status
//! - workload health: reports owned by a Workload plus its Node -> Workload status
//!
//! Watch deltas on dependency types are fanned out to reconciliation requests
//! through the dependency mappers in [`mappers`]. The [`manager::Manager`] is
//! a small in-process driver for hosting and tests; production dispatch with
//! per-key serialisation and backoff belongs to the caller.

#![forbid(unsafe_code)]

pub mod config;
pub mod controller;
pub mod endpoints;
pub mod error;
pub mod health;
pub mod manager;
pub mod mappers;
pub mod nodehealth;
pub mod runtime;
mod status;
pub mod workloadhealth;

use std::sync::Arc;

pub use config::ManagerConfig;
pub use controller::{map_owner, map_owner_filtered, Controller, MapFn, Reconciler};
pub use error::ReconcileError;
pub use manager::{Manager, RunSummary};
pub use mappers::{NodeMapper, WorkloadMapper};
pub use runtime::{Request, Runtime};

pub use tokio_util::sync::CancellationToken;

/// Register the catalog controllers on `mgr`. The mappers are injected so
/// callers (and tests) can inspect or share them.
pub fn register_catalog_controllers(mgr: &mut Manager, workload_map: Arc<WorkloadMapper>, node_map: Arc<NodeMapper>) {
    mgr.register(nodehealth::controller());
    mgr.register(workloadhealth::controller(node_map));
    mgr.register(endpoints::controller(workload_map));
}
