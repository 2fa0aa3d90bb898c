//! Catalog resource types and their payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Health, Payload, ResourceId, ResourceType};

pub const GROUP: &str = "catalog";
pub const VERSION: &str = "v1alpha1";

pub fn workload_type() -> ResourceType { ResourceType::new(GROUP, VERSION, "Workload") }
pub fn service_type() -> ResourceType { ResourceType::new(GROUP, VERSION, "Service") }
pub fn service_endpoints_type() -> ResourceType { ResourceType::new(GROUP, VERSION, "ServiceEndpoints") }
pub fn node_type() -> ResourceType { ResourceType::new(GROUP, VERSION, "Node") }
pub fn health_status_type() -> ResourceType { ResourceType::new(GROUP, VERSION, "HealthStatus") }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Http,
    Http2,
    Grpc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadPort {
    pub port: u32,
    #[serde(default)]
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadAddress {
    pub host: String,
    /// Port names exposed on this address. Empty means every workload port.
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub external: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locality {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub zone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    #[serde(default)]
    pub addresses: Vec<WorkloadAddress>,
    #[serde(default)]
    pub ports: BTreeMap<String, WorkloadPort>,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub locality: Option<Locality>,
}

impl Payload for Workload {
    const TYPE_NAME: &'static str = "roster.catalog.Workload";
}

/// Workload selection by exact name and by name prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSelector {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub prefixes: Vec<String>,
}

impl WorkloadSelector {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.prefixes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub virtual_port: u32,
    pub target_port: String,
    #[serde(default)]
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// `None` or an empty selector leaves endpoints to be managed by hand.
    #[serde(default)]
    pub workloads: Option<WorkloadSelector>,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    #[serde(default)]
    pub virtual_ips: Vec<String>,
}

impl Payload for Service {
    const TYPE_NAME: &'static str = "roster.catalog.Service";
}

impl Service {
    /// Some selection criteria exist, so endpoints are computed automatically.
    pub fn under_management(&self) -> bool {
        self.workloads.as_ref().map(|s| !s.is_empty()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    #[serde(default)]
    pub external: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
}

impl Payload for Node {
    const TYPE_NAME: &'static str = "roster.catalog.Node";
}

/// One health report, owned by the Workload or Node it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: Health,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub output: String,
}

impl Payload for HealthStatus {
    const TYPE_NAME: &'static str = "roster.catalog.HealthStatus";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub target_ref: ResourceId,
    pub health_status: Health,
    pub addresses: Vec<WorkloadAddress>,
    pub ports: BTreeMap<String, WorkloadPort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl Payload for ServiceEndpoints {
    const TYPE_NAME: &'static str = "roster.catalog.ServiceEndpoints";
}
