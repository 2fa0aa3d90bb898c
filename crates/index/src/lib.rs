//! Roster selector index: maps a dependency name to the owners that selected
//! it, either by exact name or by name prefix.
//!
//! Keys live in an ordered map. A lookup probes every prefix of the changed
//! name, so its cost is bounded by the name length rather than by the number
//! of tracked keys. Registrations at a key keep insertion order; that order is
//! the order requests are replayed in.
//!
//! The index itself is not synchronised. Owners share it behind one exclusive
//! lock (see the dependency mappers).

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::hash::Hash;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Prefix,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    exact: SmallVec<[T; 2]>,
    prefix: SmallVec<[T; 2]>,
}

impl<T> Default for Entry<T> {
    fn default() -> Self {
        Self { exact: SmallVec::new(), prefix: SmallVec::new() }
    }
}

impl<T> Entry<T> {
    fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefix.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SelectorIndex<T> {
    tree: BTreeMap<String, Entry<T>>,
}

impl<T> Default for SelectorIndex<T> {
    fn default() -> Self {
        Self { tree: BTreeMap::new() }
    }
}

impl<T: Clone + Eq + Hash> SelectorIndex<T> {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, key: &str, dependent: T, kind: MatchKind) {
        let entry = self.tree.entry(key.to_string()).or_default();
        match kind {
            MatchKind::Exact => entry.exact.push(dependent),
            MatchKind::Prefix => entry.prefix.push(dependent),
        }
    }

    /// Strip `dependent` from every key, both match kinds, in one pass.
    /// Remaining registrations keep their relative order. Keys emptied by this
    /// call stay in place until [`SelectorIndex::prune`].
    ///
    /// Returns the number of registrations removed.
    pub fn remove(&mut self, dependent: &T) -> usize {
        let mut removed = 0usize;
        for entry in self.tree.values_mut() {
            let before = entry.exact.len() + entry.prefix.len();
            entry.exact.retain(|d| d != dependent);
            entry.prefix.retain(|d| d != dependent);
            removed += before - (entry.exact.len() + entry.prefix.len());
        }
        removed
    }

    /// Drop keys that no longer carry any registration.
    pub fn prune(&mut self) -> usize {
        let before = self.tree.len();
        self.tree.retain(|_, e| !e.is_empty());
        let pruned = before - self.tree.len();
        if pruned > 0 {
            trace!(pruned, remaining = self.tree.len(), "selector index: pruned empty keys");
        }
        pruned
    }

    /// Dependents affected by a change to `name`: prefix registrations at
    /// every key that is a prefix of `name` (shortest key first), then exact
    /// registrations at `name` itself. Each dependent is returned once.
    pub fn lookup(&self, name: &str) -> Vec<T> {
        let mut seen: FxHashSet<&T> = FxHashSet::default();
        let mut out = Vec::new();
        let boundaries = name.char_indices().map(|(i, _)| i).chain(std::iter::once(name.len()));
        for end in boundaries {
            let Some(entry) = self.tree.get(&name[..end]) else { continue };
            let terminal = end == name.len();
            let exact = if terminal { entry.exact.as_slice() } else { &[] };
            for dep in entry.prefix.iter().chain(exact.iter()) {
                if seen.insert(dep) {
                    out.push(dep.clone());
                }
            }
        }
        out
    }

    /// True when any key carries a registration for `dependent`.
    pub fn contains(&self, dependent: &T) -> bool {
        self.tree.values().any(|e| e.exact.contains(dependent) || e.prefix.contains(dependent))
    }

    pub fn len(&self) -> usize { self.tree.len() }
    pub fn is_empty(&self) -> bool { self.tree.is_empty() }

    /// `(key, exact, prefix)` for every key, in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[T], &[T])> {
        self.tree.iter().map(|(k, e)| (k.as_str(), e.exact.as_slice(), e.prefix.as_slice()))
    }
}
