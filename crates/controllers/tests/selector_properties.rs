//! Property tests for the workload mapper over random Track/Untrack sequences.
//!
//! A plain map from service to its current selector is the model. After every
//! step the mapper must agree with it:
//! - a workload maps to a service iff the service's current selector matches it
//! - each matching service is returned once
//! - tracking again supersedes the previous selector
//! - no key is left without a registration

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use proptest::prelude::*;
use roster_controllers::WorkloadMapper;
use roster_core::catalog::{service_type, workload_type, WorkloadSelector};
use roster_core::{Resource, ResourceId, Tenancy};

const SERVICES: usize = 4;

#[derive(Debug, Clone)]
enum Op {
    Track(usize, WorkloadSelector),
    Untrack(usize),
}

fn svc(i: usize) -> ResourceId {
    ResourceId::new(service_type(), Tenancy::default(), format!("svc-{i}"))
}

fn selector() -> impl Strategy<Value = WorkloadSelector> {
    let names = prop::collection::vec("[ab]{0,3}", 0..3);
    let prefixes = prop::collection::vec("[ab]{0,2}", 0..3);
    (names, prefixes).prop_map(|(names, prefixes)| WorkloadSelector { names, prefixes })
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..SERVICES, selector()).prop_map(|(i, s)| Op::Track(i, s)),
        1 => (0..SERVICES).prop_map(Op::Untrack),
    ]
}

fn matches(sel: &WorkloadSelector, name: &str) -> bool {
    sel.names.iter().any(|n| n == name) || sel.prefixes.iter().any(|p| name.starts_with(p.as_str()))
}

/// Every name over {a, b} up to length 3, the empty name included.
fn workload_names() -> Vec<String> {
    let mut out = vec![String::new()];
    let mut frontier = vec![String::new()];
    for _ in 0..3 {
        frontier = frontier.iter().flat_map(|s| [format!("{s}a"), format!("{s}b")]).collect();
        out.extend(frontier.iter().cloned());
    }
    out
}

proptest! {
    #[test]
    fn mapper_agrees_with_model(ops in prop::collection::vec(op(), 1..40)) {
        let mapper = WorkloadMapper::new();
        let mut model: BTreeMap<usize, WorkloadSelector> = BTreeMap::new();
        let names = workload_names();

        for op in ops {
            match op {
                Op::Track(i, sel) => {
                    mapper.track(&svc(i), &sel);
                    model.insert(i, sel);
                }
                Op::Untrack(i) => {
                    mapper.untrack(&svc(i));
                    model.remove(&i);
                }
            }

            for name in &names {
                let wl = Resource::new(ResourceId::new(workload_type(), Tenancy::default(), name.as_str()));
                let mut got: Vec<ResourceId> = mapper.map_to_dependents(&wl).into_iter().map(|r| r.id).collect();
                let returned = got.len();
                got.sort();
                got.dedup();
                prop_assert_eq!(returned, got.len(), "duplicate request for {:?}", name);

                let mut want: Vec<ResourceId> = model.iter().filter(|(_, s)| matches(s, name)).map(|(i, _)| svc(*i)).collect();
                want.sort();
                prop_assert_eq!(got, want, "lookup of {:?}", name);
            }

            for i in 0..SERVICES {
                let selects_anything = model.get(&i).is_some_and(|s| !s.names.is_empty() || !s.prefixes.is_empty());
                prop_assert_eq!(mapper.is_tracked(&svc(i)), selects_anything);
            }

            let snapshot = mapper.snapshot();
            for (key, exact, prefix) in snapshot.entries() {
                prop_assert!(!exact.is_empty() || !prefix.is_empty(), "empty key {:?} survived", key);
                for dep in exact {
                    let sel = model.iter().find(|(i, _)| svc(**i) == *dep).map(|(_, s)| s);
                    prop_assert!(sel.is_some_and(|s| s.names.iter().any(|n| n == key)), "stale exact {} at {:?}", dep, key);
                }
                for dep in prefix {
                    let sel = model.iter().find(|(i, _)| svc(**i) == *dep).map(|(_, s)| s);
                    prop_assert!(sel.is_some_and(|s| s.prefixes.iter().any(|p| p == key)), "stale prefix {} at {:?}", dep, key);
                }
            }
        }
    }
}
