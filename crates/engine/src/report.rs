//! Outcome of coordinator runs

use refresh_journal::RepositoryId;
use serde::Serialize;

/// What happened to one repository's batch during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RepoOutcome {
    /// Plan applied; tracker advanced
    Refreshed { entries: usize },
    /// No tracked root under the working tree; tracker advanced
    NoRoots,
    /// Nothing to invalidate; tracker advanced
    Unchanged,
    /// Apply failed; batch restored and repository left pending
    Failed { error: String },
    /// Run cancelled before the batch was applied; batch restored
    Cancelled,
}

impl RepoOutcome {
    /// Whether the tracker was advanced for this repository
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Refreshed { .. } | Self::NoRoots | Self::Unchanged
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoReport {
    pub repository: RepositoryId,
    pub max_event_id: u64,
    #[serde(flatten)]
    pub outcome: RepoOutcome,
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// At least one repository failed
    Failed,
    /// Stopped early by cancellation
    Cancelled,
}

/// Report published after every coordinator run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Sequence number of the run, starting at 1
    pub run: u64,
    pub status: RunStatus,
    pub repositories: Vec<RepoReport>,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub(crate) fn new(run: u64) -> Self {
        Self {
            run,
            status: RunStatus::Completed,
            repositories: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub(crate) fn push(&mut self, repository: RepositoryId, max_event_id: u64, outcome: RepoOutcome) {
        match (&outcome, self.status) {
            (RepoOutcome::Cancelled, _) => self.status = RunStatus::Cancelled,
            (RepoOutcome::Failed { .. }, RunStatus::Completed) => self.status = RunStatus::Failed,
            _ => {}
        }
        self.repositories.push(RepoReport {
            repository,
            max_event_id,
            outcome,
        });
    }

    /// Outcome recorded for `repository`, if it was part of the run
    pub fn outcome(&self, repository: &RepositoryId) -> Option<&RepoOutcome> {
        self.repositories
            .iter()
            .find(|report| &report.repository == repository)
            .map(|report| &report.outcome)
    }
}
