//! Errors returned to callers waiting for a refresh

use crate::RepositoryId;
use std::time::Duration;
use thiserror::Error;

/// Why a wait ended before the repository was caught up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    #[error("interrupted while waiting for refresh of {0}")]
    Interrupted(RepositoryId),

    #[error("timed out after {waited:?} waiting for refresh of {repository}")]
    TimedOut {
        repository: RepositoryId,
        waited: Duration,
    },

    #[error("refresh engine disposed while {0} was still pending")]
    Disposed(RepositoryId),

    #[error("timed out after {waited:?} waiting for every repository to refresh")]
    IdleTimedOut { waited: Duration },

    #[error("refresh engine disposed while repositories were still pending")]
    IdleDisposed,
}

impl WaitError {
    /// Repository the wait was for; `None` for idle waits
    pub fn repository(&self) -> Option<&RepositoryId> {
        match self {
            Self::Interrupted(repository) | Self::Disposed(repository) => Some(repository),
            Self::TimedOut { repository, .. } => Some(repository),
            Self::IdleTimedOut { .. } | Self::IdleDisposed => None,
        }
    }
}
