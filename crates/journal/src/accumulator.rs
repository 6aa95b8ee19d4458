//! Lock-guarded accumulation of change notifications per repository

use crate::batch::PendingBatch;
use crate::notification::{ChangeNotification, RepositoryId};
use parking_lot::Mutex;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Signal that pending work is available for the consumer
pub trait Wake: Send + Sync {
    fn wake(&self);
}

/// Waker for accumulators without a consumer
struct NoWake;

impl Wake for NoWake {
    fn wake(&self) {}
}

/// Merges notifications into one `PendingBatch` per repository until the
/// coordinator drains them.
///
/// The lock is only held for the merge itself, so producers never block on
/// a running refresh.
pub struct ChangeEventAccumulator {
    batches: Mutex<BTreeMap<RepositoryId, PendingBatch>>,
    waker: Arc<dyn Wake>,
}

impl ChangeEventAccumulator {
    /// Create an accumulator that wakes `waker` whenever work arrives
    pub fn new(waker: Arc<dyn Wake>) -> Self {
        Self {
            batches: Mutex::new(BTreeMap::new()),
            waker,
        }
    }

    /// Create an accumulator nobody is woken for
    pub fn detached() -> Self {
        Self::new(Arc::new(NoWake))
    }

    /// Merge a notification into its repository's batch and wake the
    /// consumer. Empty notifications are ignored; returns whether the
    /// notification was recorded.
    pub fn record(&self, notification: ChangeNotification) -> bool {
        if notification.is_empty() {
            return false;
        }

        let repository = notification.repository.clone();
        let non_empty = {
            let mut batches = self.batches.lock();
            match batches.entry(repository.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(PendingBatch::from_notification(notification));
                    true
                }
                Entry::Occupied(mut slot) => {
                    slot.get_mut().merge(notification);
                    if slot.get().is_empty() {
                        slot.remove();
                        false
                    } else {
                        true
                    }
                }
            }
        };

        trace!("Recorded changes for {}", repository);
        if non_empty {
            self.waker.wake();
        }
        true
    }

    /// Take the pending batch of one repository, if any
    pub fn drain(&self, repository: &RepositoryId) -> Option<PendingBatch> {
        self.batches.lock().remove(repository)
    }

    /// Take every pending batch
    pub fn drain_all(&self) -> Vec<PendingBatch> {
        std::mem::take(&mut *self.batches.lock())
            .into_values()
            .collect()
    }

    /// Put back a batch that could not be applied. Notifications recorded
    /// since it was drained take precedence. Does not wake the consumer.
    pub fn restore(&self, batch: PendingBatch) {
        if batch.is_empty() {
            return;
        }
        let mut batches = self.batches.lock();
        match batches.entry(batch.repository().clone()) {
            Entry::Vacant(slot) => {
                slot.insert(batch);
            }
            Entry::Occupied(mut slot) => slot.get_mut().absorb_older(batch),
        }
    }

    /// Check whether any batch is waiting
    pub fn is_empty(&self) -> bool {
        self.batches.lock().is_empty()
    }

    /// Repositories with a waiting batch
    pub fn pending_repositories(&self) -> Vec<RepositoryId> {
        self.batches.lock().keys().cloned().collect()
    }
}
