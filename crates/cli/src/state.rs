//! State file: the primary resources to load into the in-RAM store.
//!
//! YAML or JSON (YAML is a superset), e.g.
//!
//! ```yaml
//! resources:
//!   - kind: Workload
//!     name: api-1
//!     data: { addresses: [{ host: 10.0.0.1 }], ports: { http: { port: 8080, protocol: http } } }
//!   - kind: HealthStatus
//!     name: api-1-http
//!     owner: { kind: Workload, name: api-1 }
//!     data: { type: http, status: HEALTH_PASSING }
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use roster_core::catalog;
use roster_core::{Resource, ResourceId, ResourceType, Tenancy};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct StateFile {
    #[serde(default)]
    resources: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Ref {
    kind: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Entry {
    kind: String,
    name: String,
    #[serde(default)]
    tenancy: Tenancy,
    #[serde(default)]
    owner: Option<Ref>,
    #[serde(default)]
    metadata: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    data: serde_json::Value,
}

pub fn catalog_type(kind: &str) -> Result<ResourceType> {
    Ok(match kind {
        "Workload" => catalog::workload_type(),
        "Service" => catalog::service_type(),
        "ServiceEndpoints" => catalog::service_endpoints_type(),
        "Node" => catalog::node_type(),
        "HealthStatus" => catalog::health_status_type(),
        other => bail!("unknown kind {other:?}; expected Workload, Service, ServiceEndpoints, Node or HealthStatus"),
    })
}

/// Parse `Kind/name` in the default tenancy.
pub fn parse_ref(key: &str) -> Result<ResourceId> {
    let Some((kind, name)) = key.split_once('/') else { bail!("expected Kind/name, got {key:?}") };
    Ok(ResourceId::new(catalog_type(kind)?, Tenancy::default(), name))
}

pub fn parse(text: &str) -> Result<Vec<Resource>> {
    let file: StateFile = serde_yaml::from_str(text).context("parse state file")?;
    file.resources
        .into_iter()
        .map(|e| -> Result<Resource> {
            let id = ResourceId::new(catalog_type(&e.kind)?, e.tenancy, e.name);
            let owner = match e.owner {
                Some(o) => Some(id.sibling(catalog_type(&o.kind)?, o.name)),
                None => None,
            };
            Ok(Resource { owner, metadata: e.metadata, data: e.data, ..Resource::new(id) })
        })
        .collect()
}

pub fn load(path: &Path) -> Result<Vec<Resource>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse(&text).with_context(|| format!("load {}", path.display()))
}
