//! Channel between the version-control side and the accumulator

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use refresh_journal::{ChangeEventAccumulator, ChangeNotification, EventVersionTracker};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

/// Cloneable handle for pushing change notifications into the engine
#[derive(Clone)]
pub struct Notifier {
    tx: Sender<ChangeNotification>,
    tracker: Arc<EventVersionTracker>,
    /// Target of notifications that do not fit into a full queue
    accumulator: Arc<ChangeEventAccumulator>,
}

impl Notifier {
    /// Queue a notification.
    ///
    /// The event id is recorded before queueing, so a wait started after
    /// this call returns already covers the event. Never blocks: when a
    /// bounded queue is full the notification is merged into the
    /// accumulator directly. Empty notifications are dropped; returns
    /// whether the notification was accepted.
    pub fn send(&self, notification: ChangeNotification) -> bool {
        if notification.is_empty() {
            trace!(
                "Dropping empty notification {} for {}",
                notification.event_id,
                notification.repository
            );
            return false;
        }
        if self.tracker.is_closed() {
            warn!(
                "Refresh engine disposed; dropping event {} for {}",
                notification.event_id, notification.repository
            );
            return false;
        }

        self.tracker
            .record_event(&notification.repository, notification.event_id);
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(notification)) => {
                debug!(
                    "Notification queue full; merging event {} for {} directly",
                    notification.event_id, notification.repository
                );
                self.accumulator.record(notification);
                true
            }
            Err(TrySendError::Disconnected(notification)) => {
                warn!(
                    "Refresh engine stopped; dropping event {} for {}",
                    notification.event_id, notification.repository
                );
                false
            }
        }
    }
}

/// Create the notification channel and its sending handle
pub(crate) fn channel(
    capacity: usize,
    tracker: Arc<EventVersionTracker>,
    accumulator: Arc<ChangeEventAccumulator>,
) -> (Notifier, Receiver<ChangeNotification>) {
    let (tx, rx) = if capacity == 0 {
        unbounded()
    } else {
        bounded(capacity)
    };
    (
        Notifier {
            tx,
            tracker,
            accumulator,
        },
        rx,
    )
}

/// Move queued notifications into the accumulator until shut down
pub(crate) fn spawn_intake(
    rx: Receiver<ChangeNotification>,
    accumulator: Arc<ChangeEventAccumulator>,
    shutdown: Receiver<()>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("refresh-intake".to_owned())
        .spawn(move || {
            trace!("Intake thread started");
            loop {
                select! {
                    recv(rx) -> notification => match notification {
                        Ok(notification) => {
                            accumulator.record(notification);
                        }
                        Err(_) => break,
                    },
                    recv(shutdown) -> _ => break,
                }
            }
            debug!("Intake thread stopped");
        })
}
