//! Classification of repository-relative changed paths
//!
//! Changed paths arrive relative to the working tree, using `/` as the
//! separator. A trailing separator marks a directory; the literal `"/"`
//! denotes the working tree itself.

use crate::tree::TrackedRoot;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Whether a changed path names a file or a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
}

/// The tracked roots of one working tree, as resolved for one planning pass
#[derive(Debug, Clone, Default)]
pub struct KnownRoots {
    /// Sorted by location
    roots: Vec<TrackedRoot>,
}

impl KnownRoots {
    /// Build the root set, dropping entries a resolver should never report
    pub fn new(mut roots: Vec<TrackedRoot>) -> Self {
        roots.retain(|root| {
            if root.location.is_absolute() {
                true
            } else {
                warn!(
                    "Ignoring tracked root {} with relative location {}",
                    root.id,
                    root.location.display()
                );
                false
            }
        });
        roots.sort_by(|a, b| a.location.cmp(&b.location).then_with(|| a.id.cmp(&b.id)));
        roots.dedup_by(|later, earlier| {
            if later.location == earlier.location {
                warn!(
                    "Tracked roots {} and {} share location {}; keeping {}",
                    earlier.id,
                    later.id,
                    earlier.location.display(),
                    earlier.id
                );
                true
            } else {
                false
            }
        });
        Self { roots }
    }

    /// Root located exactly at `path`
    pub fn exact(&self, path: &Path) -> Option<&TrackedRoot> {
        self.roots
            .binary_search_by(|root| root.location.as_path().cmp(path))
            .ok()
            .map(|idx| &self.roots[idx])
    }

    /// Deepest root whose location contains `path`
    pub fn owner(&self, path: &Path) -> Option<&TrackedRoot> {
        self.roots
            .iter()
            .filter(|root| path.starts_with(&root.location))
            .max_by_key(|root| root.location.components().count())
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedRoot> {
        self.roots.iter()
    }
}

/// A changed path resolved against the working tree and its roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedPath<'a> {
    /// Path as reported by the version-control engine
    pub relative: &'a str,
    /// Absolute location
    pub absolute: PathBuf,
    pub kind: PathKind,
    /// Root located exactly at `absolute`
    pub exact_root: Option<&'a TrackedRoot>,
    /// Deepest root containing `absolute`
    pub owner: Option<&'a TrackedRoot>,
}

impl ChangedPath<'_> {
    /// The directory whose listing this change affects: the path itself for a
    /// directory, the parent for a file
    pub fn container_path(&self) -> &Path {
        match self.kind {
            PathKind::Directory => &self.absolute,
            PathKind::File => self.absolute.parent().unwrap_or(&self.absolute),
        }
    }

    /// Whether any tracked root contains this path
    pub fn is_tracked(&self) -> bool {
        self.owner.is_some()
    }
}

/// Resolves repository-relative paths against a working tree
#[derive(Debug, Clone, Copy)]
pub struct PathClassifier<'a> {
    work_tree: &'a Path,
    roots: &'a KnownRoots,
}

impl<'a> PathClassifier<'a> {
    pub fn new(work_tree: &'a Path, roots: &'a KnownRoots) -> Self {
        Self { work_tree, roots }
    }

    pub fn work_tree(&self) -> &'a Path {
        self.work_tree
    }

    pub fn roots(&self) -> &'a KnownRoots {
        self.roots
    }

    /// Classify one changed path
    pub fn classify<'s>(&self, relative: &'s str) -> ChangedPath<'s>
    where
        'a: 's,
    {
        let absolute = self.absolute(relative);
        let kind = if relative.is_empty() || relative.ends_with('/') {
            PathKind::Directory
        } else {
            PathKind::File
        };
        let exact_root = self.roots.exact(&absolute);
        let owner = self.roots.owner(&absolute);

        ChangedPath {
            relative,
            absolute,
            kind,
            exact_root,
            owner,
        }
    }

    /// Absolute location of a repository-relative path
    pub fn absolute(&self, relative: &str) -> PathBuf {
        let mut absolute = self.work_tree.to_path_buf();
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            absolute.push(segment);
        }
        absolute
    }
}
