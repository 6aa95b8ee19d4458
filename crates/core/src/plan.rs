//! Refresh plans: which tree nodes to invalidate and how deeply

use crate::tree::{Depth, ResourceRef};
use ahash::{AHashMap, AHashSet};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Mapping of tree nodes to refresh granularity
///
/// Once normalized, no entry is subsumed by another one:
/// - a `Deep` entry covers every node strictly below its path
/// - a container entry of any depth covers the files directly inside it
/// - at most one entry exists per path (roots win over folders, the
///   deeper request wins)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshPlan {
    entries: BTreeMap<ResourceRef, Depth>,
}

impl RefreshPlan {
    /// Create an empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a refresh; a repeated request keeps the deeper granularity
    pub fn insert(&mut self, resource: ResourceRef, depth: Depth) {
        self.entries
            .entry(resource)
            .and_modify(|existing| *existing = (*existing).max(depth))
            .or_insert(depth);
    }

    /// Drop a recorded refresh
    pub fn remove(&mut self, resource: &ResourceRef) -> Option<Depth> {
        self.entries.remove(resource)
    }

    /// Granularity recorded for `resource`
    pub fn get(&self, resource: &ResourceRef) -> Option<Depth> {
        self.entries.get(resource).copied()
    }

    pub fn contains(&self, resource: &ResourceRef) -> bool {
        self.entries.contains_key(resource)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in a stable order
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceRef, Depth)> {
        self.entries.iter().map(|(resource, depth)| (resource, *depth))
    }

    /// Number of entries refreshed recursively
    pub fn deep_count(&self) -> usize {
        self.entries.values().filter(|d| **d == Depth::Deep).count()
    }

    /// Remove every entry that another entry already covers.
    pub fn normalize(&mut self) {
        // One entry per path.
        let mut by_path: AHashMap<PathBuf, (ResourceRef, Depth)> = AHashMap::new();
        for (resource, depth) in std::mem::take(&mut self.entries) {
            match by_path.get_mut(resource.path()) {
                None => {
                    by_path.insert(resource.path().to_path_buf(), (resource, depth));
                }
                Some((kept, kept_depth)) => {
                    *kept_depth = (*kept_depth).max(depth);
                    if rank(&resource) > rank(kept) {
                        *kept = resource;
                    }
                }
            }
        }

        let deep: AHashSet<PathBuf> = by_path
            .iter()
            .filter(|(_, (resource, depth))| resource.is_container() && *depth == Depth::Deep)
            .map(|(path, _)| path.clone())
            .collect();
        let containers: AHashSet<PathBuf> = by_path
            .iter()
            .filter(|(_, (resource, _))| resource.is_container())
            .map(|(path, _)| path.clone())
            .collect();

        self.entries = by_path
            .into_values()
            .filter(|(resource, _)| !is_subsumed(resource, &deep, &containers))
            .collect();
    }

    /// Find a pair of entries where the first subsumes the second
    pub fn find_overlap(&self) -> Option<(&ResourceRef, &ResourceRef)> {
        for (outer, outer_depth) in &self.entries {
            for inner in self.entries.keys() {
                if outer == inner {
                    continue;
                }
                if covers(outer, *outer_depth, inner) {
                    return Some((outer, inner));
                }
            }
        }
        None
    }
}

/// Preference when two entries share a path
fn rank(resource: &ResourceRef) -> u8 {
    match resource {
        ResourceRef::File(_) => 0,
        ResourceRef::Container(_) => 1,
        ResourceRef::Root(_) => 2,
    }
}

fn is_subsumed(
    resource: &ResourceRef,
    deep: &AHashSet<PathBuf>,
    containers: &AHashSet<PathBuf>,
) -> bool {
    let path = resource.path();
    if path.ancestors().skip(1).any(|ancestor| deep.contains(ancestor)) {
        return true;
    }
    !resource.is_container() && path.parent().is_some_and(|parent| containers.contains(parent))
}

fn covers(outer: &ResourceRef, outer_depth: Depth, inner: &ResourceRef) -> bool {
    if !outer.is_container() {
        return false;
    }
    let (outer_path, inner_path) = (outer.path(), inner.path());
    if outer_path == inner_path {
        return true;
    }
    if outer_depth == Depth::Deep && is_strictly_below(inner_path, outer_path) {
        return true;
    }
    !inner.is_container() && inner_path.parent() == Some(outer_path)
}

fn is_strictly_below(path: &Path, ancestor: &Path) -> bool {
    path != ancestor && path.starts_with(ancestor)
}

impl<'a> IntoIterator for &'a RefreshPlan {
    type Item = (&'a ResourceRef, &'a Depth);
    type IntoIter = std::collections::btree_map::Iter<'a, ResourceRef, Depth>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<(ResourceRef, Depth)> for RefreshPlan {
    fn from_iter<I: IntoIterator<Item = (ResourceRef, Depth)>>(iter: I) -> Self {
        let mut plan = Self::new();
        for (resource, depth) in iter {
            plan.insert(resource, depth);
        }
        plan
    }
}

#[derive(Serialize)]
struct PlanEntry<'a> {
    resource: &'a ResourceRef,
    depth: Depth,
}

impl Serialize for RefreshPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            self.iter()
                .map(|(resource, depth)| PlanEntry { resource, depth }),
        )
    }
}
