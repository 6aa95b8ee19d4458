//! Errors raised while applying a refresh plan

use std::path::PathBuf;
use thiserror::Error;

/// Failure of the tree-invalidation primitive for one repository.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("failed to refresh {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("tree model rejected refresh of {path}: {reason}")]
    Rejected { path: PathBuf, reason: String },

    #[error("refresh cancelled")]
    Cancelled,
}

impl RefreshError {
    /// Wrap an I/O error raised while refreshing `path`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for cooperative cancellation, which is not a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
