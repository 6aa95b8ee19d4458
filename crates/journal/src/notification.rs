//! Change notifications pushed by the version-control engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Identity of a repository handle (typically its git directory)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(String);

impl RepositoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepositoryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RepositoryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Working-tree paths rewritten by one version-control operation
///
/// Paths are relative to `work_tree` and use `/` separators; a trailing
/// `/` marks a directory and `"/"` stands for the working tree itself.
/// `event_id` is expected to grow monotonically per repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub repository: RepositoryId,
    pub work_tree: PathBuf,
    #[serde(default)]
    pub modified: BTreeSet<String>,
    #[serde(default)]
    pub deleted: BTreeSet<String>,
    pub event_id: u64,
}

impl ChangeNotification {
    /// Create a notification without any paths
    pub fn new(
        repository: impl Into<RepositoryId>,
        work_tree: impl Into<PathBuf>,
        event_id: u64,
    ) -> Self {
        Self {
            repository: repository.into(),
            work_tree: work_tree.into(),
            modified: BTreeSet::new(),
            deleted: BTreeSet::new(),
            event_id,
        }
    }

    /// Add modified (created or changed) paths
    pub fn modified<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modified.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Add deleted paths
    pub fn deleted<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deleted.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.deleted.is_empty()
    }
}
