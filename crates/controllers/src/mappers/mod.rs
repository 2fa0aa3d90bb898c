//! Dependency mappers: translate a change in a dependency (Workload, Node)
//! into requests for the dependents (Service, Workload) that selected it.
//!
//! Both wrap a [`SelectorIndex`] behind a single exclusive lock. Every path
//! (track, untrack, lookup) takes that lock for its whole duration; index
//! operations are small next to the store I/O of a reconciliation.

use std::sync::{Mutex, MutexGuard, PoisonError};

use roster_core::ResourceId;
use roster_index::SelectorIndex;

mod node;
mod workload;

pub use node::{node_id_from_workload, NodeMapper};
pub use workload::WorkloadMapper;

type Index = SelectorIndex<ResourceId>;

fn lock(m: &Mutex<Index>) -> MutexGuard<'_, Index> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
