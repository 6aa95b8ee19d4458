//! Accumulated changes of one repository awaiting reconciliation

use crate::notification::{ChangeNotification, RepositoryId};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Net modified/deleted paths of one repository plus the highest event id
/// merged into them.
///
/// `modified` and `deleted` are always disjoint: the latest notification
/// decides whether a path counts as modified or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBatch {
    repository: RepositoryId,
    work_tree: PathBuf,
    modified: BTreeSet<String>,
    deleted: BTreeSet<String>,
    max_event_id: u64,
}

impl PendingBatch {
    /// Start a batch from its first notification
    pub fn from_notification(notification: ChangeNotification) -> Self {
        let ChangeNotification {
            repository,
            work_tree,
            mut modified,
            deleted,
            event_id,
        } = notification;
        // A path reported both ways within one event counts as deleted.
        modified.retain(|path| !deleted.contains(path));
        Self {
            repository,
            work_tree,
            modified,
            deleted,
            max_event_id: event_id,
        }
    }

    /// Merge a newer notification; its view of each path wins
    pub fn merge(&mut self, notification: ChangeNotification) {
        let ChangeNotification {
            work_tree,
            modified,
            deleted,
            event_id,
            ..
        } = notification;

        self.modified.retain(|path| !deleted.contains(path));
        self.deleted.retain(|path| !modified.contains(path));
        self.modified
            .extend(modified.into_iter().filter(|path| !deleted.contains(path)));
        self.deleted.extend(deleted);
        self.max_event_id = self.max_event_id.max(event_id);
        self.work_tree = work_tree;
    }

    /// Merge an older batch underneath this one: paths this batch already
    /// knows about keep their current state
    pub fn absorb_older(&mut self, older: PendingBatch) {
        for path in older.modified {
            if !self.deleted.contains(&path) {
                self.modified.insert(path);
            }
        }
        for path in older.deleted {
            if !self.modified.contains(&path) {
                self.deleted.insert(path);
            }
        }
        self.max_event_id = self.max_event_id.max(older.max_event_id);
    }

    pub fn repository(&self) -> &RepositoryId {
        &self.repository
    }

    pub fn work_tree(&self) -> &std::path::Path {
        &self.work_tree
    }

    pub fn modified(&self) -> &BTreeSet<String> {
        &self.modified
    }

    pub fn deleted(&self) -> &BTreeSet<String> {
        &self.deleted
    }

    /// Highest event id merged into this batch
    pub fn max_event_id(&self) -> u64 {
        self.max_event_id
    }

    /// Total number of changed paths
    pub fn len(&self) -> usize {
        self.modified.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.deleted.is_empty()
    }

    /// All changed paths, modified first
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.modified
            .iter()
            .chain(self.deleted.iter())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(id: u64, modified: &[&str], deleted: &[&str]) -> ChangeNotification {
        ChangeNotification::new("repo", "/ws/repo", id)
            .modified(modified.iter().copied())
            .deleted(deleted.iter().copied())
    }

    fn assert_disjoint(batch: &PendingBatch) {
        assert!(
            batch.modified().is_disjoint(batch.deleted()),
            "modified and deleted overlap: {:?}",
            batch
        );
    }

    #[test]
    fn test_latest_state_wins() {
        let mut batch = PendingBatch::from_notification(notification(1, &["a", "b"], &["c"]));
        batch.merge(notification(2, &["c"], &["a"]));

        assert_eq!(batch.modified().iter().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(batch.deleted().iter().collect::<Vec<_>>(), vec!["a"]);
        assert_disjoint(&batch);
    }

    #[test]
    fn test_event_id_is_max_folded() {
        let mut batch = PendingBatch::from_notification(notification(5, &["a"], &[]));
        batch.merge(notification(3, &["b"], &[]));
        assert_eq!(batch.max_event_id(), 5);

        batch.merge(notification(8, &["c"], &[]));
        assert_eq!(batch.max_event_id(), 8);
    }

    #[test]
    fn test_same_event_reporting_both_ways_counts_as_deleted() {
        let mut batch = PendingBatch::from_notification(notification(1, &["x"], &["x"]));
        assert_disjoint(&batch);
        assert!(batch.deleted().contains("x"));

        batch.merge(notification(2, &["y"], &["y"]));
        assert_disjoint(&batch);
        assert!(batch.deleted().contains("y"));
    }

    #[test]
    fn test_absorb_older_keeps_newer_state() {
        let older = PendingBatch::from_notification(notification(4, &["a", "b"], &["c"]));
        let mut newer = PendingBatch::from_notification(notification(6, &["c"], &["a"]));

        newer.absorb_older(older);

        assert_eq!(newer.modified().iter().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(newer.deleted().iter().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(newer.max_event_id(), 6);
        assert_disjoint(&newer);
    }

    #[test]
    fn test_repeated_merge_is_noop() {
        let mut batch = PendingBatch::from_notification(notification(1, &["a"], &[]));
        let before = batch.clone();
        batch.merge(notification(1, &["a"], &[]));
        assert_eq!(batch, before);
    }
}
