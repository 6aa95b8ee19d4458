//! Registry of tracked project roots

use parking_lot::RwLock;
use refresh_core::{RootId, RootResolver, TrackedRoot};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Tracked roots by id.
///
/// A registered root is only reported while its directory exists and, when a
/// marker file name is configured, contains that marker (e.g. a project
/// description file).
#[derive(Debug, Default)]
pub struct ProjectRoots {
    roots: RwLock<BTreeMap<RootId, PathBuf>>,
    marker: Option<String>,
}

impl ProjectRoots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only report roots containing a file named `marker`
    pub fn with_marker(marker: impl Into<String>) -> Self {
        Self {
            roots: RwLock::new(BTreeMap::new()),
            marker: Some(marker.into()),
        }
    }

    /// Register or move a root; returns its previous location
    pub fn register(&self, id: impl Into<String>, location: impl Into<PathBuf>) -> Option<PathBuf> {
        let id = RootId::new(id);
        let location = location.into();
        debug!("Registering root {} at {}", id, location.display());
        self.roots.write().insert(id, location)
    }

    /// Forget a root; returns its location
    pub fn unregister(&self, id: &RootId) -> Option<PathBuf> {
        self.roots.write().remove(id)
    }

    pub fn location(&self, id: &RootId) -> Option<PathBuf> {
        self.roots.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.roots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.read().is_empty()
    }

    fn is_valid_root(&self, location: &Path) -> bool {
        if !location.is_dir() {
            return false;
        }
        match &self.marker {
            Some(marker) => location.join(marker).is_file(),
            None => true,
        }
    }
}

impl RootResolver for ProjectRoots {
    fn roots_for(&self, work_tree: &Path) -> Vec<TrackedRoot> {
        self.roots
            .read()
            .iter()
            .filter(|(_, location)| location.starts_with(work_tree))
            .filter(|(_, location)| self.is_valid_root(location))
            .map(|(id, location)| TrackedRoot {
                id: id.clone(),
                location: location.clone(),
            })
            .collect()
    }
}
