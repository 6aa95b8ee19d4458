//! Background workspace refresh after version-control operations
//!
//! This crate provides:
//! - `RefreshEngine`: owns the notification intake and the refresh
//!   coordinator, with an explicit `new`/`dispose` lifecycle
//! - `Notifier`: the channel handle the version-control side pushes
//!   change notifications into
//! - Run reports describing each reconciliation pass
//! - `CachedTree` and `ProjectRoots`: a filesystem-backed tree model and
//!   root registry

pub mod config;
mod coordinator;
mod intake;
pub mod report;
pub mod workspace;

// Re-exports
pub use config::EngineConfig;
pub use coordinator::CoordinatorState;
pub use intake::Notifier;
pub use report::{RepoOutcome, RepoReport, RunReport, RunStatus};
pub use workspace::{CachedTree, ProjectRoots, TreeChange};

use anyhow::{Context, Result};
use coordinator::{Coordinator, ReportSink, Trigger};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use refresh_core::{CancellationToken, RootResolver, TreeModel};
use refresh_journal::{
    ChangeEventAccumulator, ChangeNotification, EventStatusSnapshot, EventVersionTracker,
    RepositoryId, Wake, WaitError,
};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info};

/// Keeps a cached tree in sync with working-tree changes made by
/// version-control operations.
///
/// Notifications are merged per repository and reconciled by a single
/// background coordinator. Callers that need the tree to reflect their own
/// change block in one of the `wait_*` methods.
pub struct RefreshEngine {
    config: EngineConfig,
    notifier: Notifier,
    accumulator: Arc<ChangeEventAccumulator>,
    tracker: Arc<EventVersionTracker>,
    trigger: Arc<Trigger>,
    reports: Receiver<RunReport>,
    /// Dropped on dispose to stop both threads
    shutdown: Mutex<Option<Sender<()>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl RefreshEngine {
    /// Start the intake and coordinator threads
    pub fn new(
        config: EngineConfig,
        resolver: Arc<dyn RootResolver>,
        tree: Arc<dyn TreeModel>,
    ) -> Result<Self> {
        config.validate().context("Invalid engine configuration")?;

        let tracker = Arc::new(EventVersionTracker::new(config.wait_poll_interval()));
        let (trigger, wake_rx) = Trigger::new();
        let accumulator = Arc::new(ChangeEventAccumulator::new(trigger.clone()));
        let (notifier, intake_rx) = intake::channel(
            config.intake_capacity,
            Arc::clone(&tracker),
            Arc::clone(&accumulator),
        );
        let reports = ReportSink::new(config.report_capacity);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let intake = intake::spawn_intake(intake_rx, Arc::clone(&accumulator), shutdown_rx.clone())
            .context("Failed to spawn intake thread")?;
        let coordinator = Coordinator::new(
            &config,
            Arc::clone(&accumulator),
            Arc::clone(&tracker),
            Arc::clone(&trigger),
            resolver,
            tree,
            reports.clone(),
        )
        .spawn(wake_rx, shutdown_rx)
        .context("Failed to spawn coordinator thread")?;

        info!("Refresh engine started");
        Ok(Self {
            config,
            notifier,
            accumulator,
            tracker,
            trigger,
            reports: reports.receiver(),
            shutdown: Mutex::new(Some(shutdown_tx)),
            threads: Mutex::new(vec![intake, coordinator]),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle for the version-control side
    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    /// Queue a notification without waiting for it to be applied
    pub fn notify(&self, notification: ChangeNotification) -> bool {
        self.notifier.send(notification)
    }

    /// Queue a notification and block until the tree has caught up with it
    pub fn notify_and_wait(&self, notification: ChangeNotification) -> Result<(), WaitError> {
        let repository = notification.repository.clone();
        self.notify(notification);
        self.wait_until_caught(&repository)
    }

    /// Block until every event recorded for `repository` so far is applied
    pub fn wait_until_caught(&self, repository: &RepositoryId) -> Result<(), WaitError> {
        self.tracker.wait_until_caught(repository)
    }

    /// Like `wait_until_caught`, but returns `WaitError::Interrupted` once
    /// `token` is cancelled
    pub fn wait_until_caught_interruptibly(
        &self,
        repository: &RepositoryId,
        token: &CancellationToken,
    ) -> Result<(), WaitError> {
        self.tracker.wait_until_caught_interruptibly(repository, token)
    }

    pub fn wait_until_caught_timeout(
        &self,
        repository: &RepositoryId,
        timeout: Duration,
    ) -> Result<(), WaitError> {
        self.tracker.wait_until_caught_timeout(repository, timeout)
    }

    /// Wait for each repository in turn
    pub fn wait_all_caught<'r>(
        &self,
        repositories: impl IntoIterator<Item = &'r RepositoryId>,
    ) -> Result<(), WaitError> {
        self.tracker.wait_all_caught(repositories)
    }

    /// Block until no repository is pending
    pub fn wait_idle(&self, timeout: Option<Duration>) -> Result<(), WaitError> {
        self.tracker.wait_idle(timeout)
    }

    pub fn is_pending(&self, repository: &RepositoryId) -> bool {
        self.tracker.is_pending(repository)
    }

    pub fn event_status(&self, repository: &RepositoryId) -> EventStatusSnapshot {
        self.tracker.status(repository)
    }

    /// Repositories with changes not yet picked up by a run, including
    /// batches put back after a failure
    pub fn queued_repositories(&self) -> Vec<RepositoryId> {
        self.accumulator.pending_repositories()
    }

    /// Schedule a run without a new notification, re-attempting batches
    /// left over from failed or cancelled runs
    pub fn retry(&self) {
        self.trigger.wake();
    }

    /// Cancel the run in progress; returns whether one was running
    pub fn cancel_current_run(&self) -> bool {
        self.trigger.cancel_current_run()
    }

    /// Reports of finished runs, oldest first
    pub fn reports(&self) -> Receiver<RunReport> {
        self.reports.clone()
    }

    pub fn state(&self) -> CoordinatorState {
        self.trigger.state()
    }

    /// Stop the engine: cancel the running pass, stop and join both threads,
    /// and release waiters with `WaitError::Disposed`. Idempotent.
    pub fn dispose(&self) {
        let Some(shutdown) = self.shutdown.lock().take() else {
            return;
        };
        info!("Disposing refresh engine");
        self.trigger.cancel_current_run();
        self.tracker.close();
        drop(shutdown);

        for handle in self.threads.lock().drain(..) {
            if handle.join().is_err() {
                error!("Refresh engine thread panicked");
            }
        }
    }
}

impl Drop for RefreshEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}
