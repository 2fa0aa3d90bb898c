//! Workload -> Endpoint translation.
//!
//! Endpoint ports are keyed by the service's target port name. The numeric
//! port comes from the workload and the protocol from the service; a port is
//! only carried when both sides declare the same protocol.

use std::collections::BTreeMap;

use roster_core::catalog::{Endpoint, Service, ServiceEndpoints, Workload, WorkloadAddress, WorkloadPort};
use roster_core::{DataParseError, Health, Resource};

use crate::workloadhealth;

/// Health published by the workload-health controller, or `Any` when the
/// workload has not been reconciled yet.
pub fn workload_health_from_status(res: &Resource) -> Health {
    res.status
        .get(workloadhealth::STATUS_KEY)
        .and_then(|s| s.condition(workloadhealth::CONDITION_HEALTHY))
        .and_then(|c| c.reason.parse().ok())
        .unwrap_or(Health::Any)
}

/// The endpoint a workload contributes to `service`, if any address survives
/// port filtering.
pub fn workload_to_endpoint(service: &Service, res: &Resource) -> Result<Option<Endpoint>, DataParseError> {
    let workload: Workload = res.decode()?;

    let mut ports: BTreeMap<String, WorkloadPort> = BTreeMap::new();
    // target port name -> endpoint port name
    let mut translation: BTreeMap<&str, &str> = BTreeMap::new();
    for svc_port in &service.ports {
        let Some(wl_port) = workload.ports.get(&svc_port.target_port) else { continue };
        if wl_port.protocol != svc_port.protocol {
            continue;
        }
        ports.insert(svc_port.target_port.clone(), WorkloadPort { port: wl_port.port, protocol: svc_port.protocol });
        translation.insert(&svc_port.target_port, &svc_port.target_port);
    }

    let addresses: Vec<WorkloadAddress> = workload
        .addresses
        .iter()
        .filter_map(|addr| {
            let kept: Vec<String> = if addr.ports.is_empty() {
                translation.values().map(|p| p.to_string()).collect()
            } else {
                addr.ports.iter().filter_map(|p| translation.get(p.as_str())).map(|p| p.to_string()).collect()
            };
            (!kept.is_empty()).then(|| WorkloadAddress { host: addr.host.clone(), ports: kept, external: addr.external })
        })
        .collect();

    if addresses.is_empty() {
        return Ok(None);
    }
    Ok(Some(Endpoint { target_ref: res.id.clone(), health_status: workload_health_from_status(res), addresses, ports }))
}

/// Endpoints for `workloads`, in the order given. Callers pass workloads
/// sorted by name so the result is stable for diffing.
pub fn compute_endpoints(service: &Service, workloads: &[Resource]) -> Result<ServiceEndpoints, DataParseError> {
    let mut endpoints = Vec::with_capacity(workloads.len());
    for res in workloads {
        if let Some(ep) = workload_to_endpoint(service, res)? {
            endpoints.push(ep);
        }
    }
    Ok(ServiceEndpoints { endpoints })
}
