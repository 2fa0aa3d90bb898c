use std::sync::{Arc, Mutex};

use metrics::counter;
use roster_core::catalog::WorkloadSelector;
use roster_core::{Resource, ResourceId};
use roster_index::{MatchKind, SelectorIndex};
use tracing::trace;

use super::{lock, Index};
use crate::controller::MapFn;
use crate::runtime::Request;

/// Workload -> Service mapping, keyed by the services' selectors.
#[derive(Default)]
pub struct WorkloadMapper {
    index: Mutex<Index>,
}

impl WorkloadMapper {
    pub fn new() -> Self { Self::default() }

    /// Replace every registration of `service` with the given selector's.
    /// Removal and insertion happen under one lock hold so a concurrent
    /// lookup never sees both generations.
    pub fn track(&self, service: &ResourceId, selector: &WorkloadSelector) {
        let mut index = lock(&self.index);
        index.remove(service);
        for name in &selector.names {
            index.insert(name, service.clone(), MatchKind::Exact);
        }
        for prefix in &selector.prefixes {
            index.insert(prefix, service.clone(), MatchKind::Prefix);
        }
        index.prune();
        trace!(service = %service, names = selector.names.len(), prefixes = selector.prefixes.len(), "workload mapper: track");
    }

    pub fn untrack(&self, service: &ResourceId) {
        let mut index = lock(&self.index);
        if index.remove(service) > 0 {
            index.prune();
            trace!(service = %service, "workload mapper: untrack");
        }
    }

    /// Services whose selector matches the changed workload's name.
    pub fn map_to_dependents(&self, workload: &Resource) -> Vec<Request> {
        let reqs: Vec<Request> = lock(&self.index).lookup(&workload.id.name).into_iter().map(Request::new).collect();
        counter!("mapper_requests_total", reqs.len() as u64, "mapper" => "workload");
        reqs
    }

    pub fn is_tracked(&self, service: &ResourceId) -> bool {
        lock(&self.index).contains(service)
    }

    /// Copy of the current index, for inspection.
    pub fn snapshot(&self) -> SelectorIndex<ResourceId> {
        lock(&self.index).clone()
    }

    pub fn map_fn(self: &Arc<Self>) -> MapFn {
        let me = Arc::clone(self);
        Arc::new(move |res: &Resource| me.map_to_dependents(res))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::catalog::{service_type, workload_type};
    use roster_core::Tenancy;

    fn svc(name: &str) -> ResourceId {
        ResourceId::new(service_type(), Tenancy::default(), name)
    }

    fn wl(name: &str) -> Resource {
        Resource::new(ResourceId::new(workload_type(), Tenancy::default(), name))
    }

    fn sel(names: &[&str], prefixes: &[&str]) -> WorkloadSelector {
        WorkloadSelector {
            names: names.iter().map(|s| s.to_string()).collect(),
            prefixes: prefixes.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn names(reqs: Vec<Request>) -> Vec<String> {
        reqs.into_iter().map(|r| r.id.name).collect()
    }

    #[test]
    fn track_matches_names_and_prefixes_once() {
        let m = WorkloadMapper::new();
        m.track(&svc("api"), &sel(&["api-1"], &["api-", "api"]));
        m.track(&svc("web"), &sel(&["web-1"], &[]));
        assert_eq!(names(m.map_to_dependents(&wl("api-1"))), vec!["api"]);
        assert_eq!(names(m.map_to_dependents(&wl("api-7"))), vec!["api"]);
        assert_eq!(names(m.map_to_dependents(&wl("web-1"))), vec!["web"]);
        assert!(m.map_to_dependents(&wl("web-2")).is_empty());
    }

    #[test]
    fn retrack_supersedes_previous_selector() {
        let m = WorkloadMapper::new();
        m.track(&svc("api"), &sel(&["a", "b"], &["pre-"]));
        m.track(&svc("api"), &sel(&["c"], &[]));
        assert!(m.map_to_dependents(&wl("a")).is_empty());
        assert!(m.map_to_dependents(&wl("pre-x")).is_empty());
        assert_eq!(names(m.map_to_dependents(&wl("c"))), vec!["api"]);
        let snap = m.snapshot();
        assert_eq!(snap.entries().map(|(k, _, _)| k.to_string()).collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn untrack_removes_everywhere_and_prunes() {
        let m = WorkloadMapper::new();
        for _ in 0..3 {
            m.track(&svc("api"), &sel(&["a"], &["a"]));
        }
        m.track(&svc("other"), &sel(&["a"], &[]));
        m.untrack(&svc("api"));
        assert!(!m.is_tracked(&svc("api")));
        assert_eq!(names(m.map_to_dependents(&wl("a"))), vec!["other"]);
        m.untrack(&svc("other"));
        assert!(m.snapshot().is_empty());
    }
}
