//! Tree node references and the seams to the cached tree model

use crate::plan::RefreshPlan;
use crate::RefreshError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Identity of a tracked root (a top-level tree node, e.g. a project)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RootId(String);

impl RootId {
    /// Create a root id from its name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the root name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tracked root together with its absolute location on disk
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackedRoot {
    pub id: RootId,
    pub location: PathBuf,
}

impl TrackedRoot {
    pub fn new(id: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self {
            id: RootId::new(id),
            location: location.into(),
        }
    }
}

/// Refresh granularity
///
/// Ordered so that `Deep` wins when two requests for the same node meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    /// Re-scan one directory level
    Shallow,
    /// Re-scan the whole subtree
    Deep,
}

/// A node of the cached tree that a plan asks to invalidate
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceRef {
    /// Leaf node
    File(PathBuf),
    /// Folder node
    Container(PathBuf),
    /// Tracked root node; refreshed as a root, never through a folder handle
    Root(TrackedRoot),
}

impl ResourceRef {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn container(path: impl Into<PathBuf>) -> Self {
        Self::Container(path.into())
    }

    pub fn root(id: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self::Root(TrackedRoot::new(id, location))
    }

    /// Absolute location of the node
    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) | Self::Container(path) => path,
            Self::Root(root) => &root.location,
        }
    }

    /// Whether the node can have children
    pub fn is_container(&self) -> bool {
        !matches!(self, Self::File(_))
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::Container(path) => write!(f, "folder {}", path.display()),
            Self::Root(root) => write!(f, "root {} ({})", root.id, root.location.display()),
        }
    }
}

/// What the tree model currently knows at a location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// The container above all tracked roots
    Workspace,
    /// Folder or root node
    Container,
    /// Leaf node
    File,
}

impl NodeKind {
    pub fn is_container(self) -> bool {
        !matches!(self, Self::File)
    }
}

/// Source of the tracked roots of a working tree
pub trait RootResolver: Send + Sync {
    /// Roots located at or below `work_tree` that currently exist as valid,
    /// openable tree roots
    fn roots_for(&self, work_tree: &Path) -> Vec<TrackedRoot>;
}

/// Lookup of existing nodes in the cached tree
pub trait ExistenceProbe: Send + Sync {
    /// Return the kind of node cached at `path`, if any
    fn resolve(&self, path: &Path) -> Option<NodeKind>;
}

/// The tree's node-invalidation primitive
pub trait TreeInvalidator: Send + Sync {
    /// Apply every `(node, depth)` entry of `plan` as one batched mutation,
    /// so downstream listeners observe a single coalesced change
    fn apply(&self, plan: &RefreshPlan) -> Result<(), RefreshError>;
}

/// A cached tree that can both answer existence queries and be invalidated
pub trait TreeModel: ExistenceProbe + TreeInvalidator {}

impl<T: ExistenceProbe + TreeInvalidator + ?Sized> TreeModel for T {}
