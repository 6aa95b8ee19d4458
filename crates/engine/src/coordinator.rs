//! Single-flight refresh coordinator
//!
//! One background thread drains the accumulator and reconciles every
//! repository with pending changes:
//! - `Idle -> Scheduled` when the accumulator wakes it
//! - `Scheduled -> Running` after the initial delay
//! - `Running -> Scheduled` when notifications arrived mid-run, after the
//!   reschedule delay; `Running -> Idle` otherwise
//!
//! A repository's tracker is only advanced after its plan was applied in
//! full. Failed and cancelled batches go back into the accumulator and are
//! re-planned on the next trigger.

use crate::config::EngineConfig;
use crate::report::{RepoOutcome, RunReport};
use crossbeam_channel::{
    bounded, select, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError,
};
use parking_lot::Mutex;
use refresh_core::{
    CancellationToken, KnownRoots, MinimalRefreshPlanner, RootResolver, TreeModel,
};
use refresh_journal::{ChangeEventAccumulator, EventVersionTracker, PendingBatch, Wake};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Scheduling state of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    /// Nothing pending, not running
    Idle,
    /// Woken, run not started yet
    Scheduled,
    /// Draining and applying
    Running,
}

struct Schedule {
    state: CoordinatorState,
    /// Woken while running
    rerun: bool,
    /// Token of the run in progress
    current_run: Option<CancellationToken>,
}

/// Wake-up side of the coordinator, shared with the accumulator
pub(crate) struct Trigger {
    schedule: Mutex<Schedule>,
    wake_tx: Sender<()>,
}

impl Trigger {
    pub(crate) fn new() -> (Arc<Self>, Receiver<()>) {
        let (wake_tx, wake_rx) = bounded(1);
        let trigger = Self {
            schedule: Mutex::new(Schedule {
                state: CoordinatorState::Idle,
                rerun: false,
                current_run: None,
            }),
            wake_tx,
        };
        (Arc::new(trigger), wake_rx)
    }

    pub(crate) fn state(&self) -> CoordinatorState {
        self.schedule.lock().state
    }

    /// Cancel the run in progress, if any; returns whether one was running
    pub(crate) fn cancel_current_run(&self) -> bool {
        match &self.schedule.lock().current_run {
            Some(token) => {
                debug!("Cancelling current refresh run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn begin_run(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut schedule = self.schedule.lock();
        schedule.state = CoordinatorState::Running;
        schedule.rerun = false;
        schedule.current_run = Some(token.clone());
        token
    }

    /// Leave `Running`; returns whether another run is due
    fn finish_run(&self) -> bool {
        let mut schedule = self.schedule.lock();
        schedule.current_run = None;
        if schedule.rerun {
            schedule.rerun = false;
            schedule.state = CoordinatorState::Scheduled;
            true
        } else {
            schedule.state = CoordinatorState::Idle;
            false
        }
    }
}

impl Wake for Trigger {
    fn wake(&self) {
        let mut schedule = self.schedule.lock();
        match schedule.state {
            CoordinatorState::Idle => {
                schedule.state = CoordinatorState::Scheduled;
                // At most one wake-up is outstanding while Scheduled.
                let _ = self.wake_tx.try_send(());
            }
            CoordinatorState::Scheduled => {}
            CoordinatorState::Running => schedule.rerun = true,
        }
    }
}

/// Bounded report queue that drops the oldest report when full
#[derive(Clone)]
pub(crate) struct ReportSink {
    tx: Sender<RunReport>,
    rx: Receiver<RunReport>,
}

impl ReportSink {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    pub(crate) fn receiver(&self) -> Receiver<RunReport> {
        self.rx.clone()
    }

    fn publish(&self, mut report: RunReport) {
        loop {
            match self.tx.try_send(report) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    let _ = self.rx.try_recv();
                    report = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// Everything the coordinator thread works with
pub(crate) struct Coordinator {
    pub(crate) accumulator: Arc<ChangeEventAccumulator>,
    pub(crate) tracker: Arc<EventVersionTracker>,
    trigger: Arc<Trigger>,
    resolver: Arc<dyn RootResolver>,
    tree: Arc<dyn TreeModel>,
    reports: ReportSink,
    initial_delay: Duration,
    reschedule_delay: Duration,
    runs: u64,
}

impl Coordinator {
    pub(crate) fn new(
        config: &EngineConfig,
        accumulator: Arc<ChangeEventAccumulator>,
        tracker: Arc<EventVersionTracker>,
        trigger: Arc<Trigger>,
        resolver: Arc<dyn RootResolver>,
        tree: Arc<dyn TreeModel>,
        reports: ReportSink,
    ) -> Self {
        Self {
            accumulator,
            tracker,
            trigger,
            resolver,
            tree,
            reports,
            initial_delay: config.initial_delay(),
            reschedule_delay: config.reschedule_delay(),
            runs: 0,
        }
    }

    /// Run the coordinator loop on its own thread until `shutdown` fires or
    /// disconnects
    pub(crate) fn spawn(
        mut self,
        wake_rx: Receiver<()>,
        shutdown: Receiver<()>,
    ) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("refresh-coordinator".to_owned())
            .spawn(move || {
                trace!("Coordinator thread started");
                self.run_loop(&wake_rx, &shutdown);
                debug!("Coordinator thread stopped");
            })
    }

    fn run_loop(&mut self, wake_rx: &Receiver<()>, shutdown: &Receiver<()>) {
        loop {
            select! {
                recv(wake_rx) -> msg => if msg.is_err() { return },
                recv(shutdown) -> _ => return,
            }

            let mut delay = self.initial_delay;
            loop {
                if !sleep_unless_shutdown(shutdown, delay) {
                    return;
                }
                let token = self.trigger.begin_run();
                let report = self.run_once(&token);
                let rerun = self.trigger.finish_run();
                self.reports.publish(report);
                if !rerun {
                    break;
                }
                trace!("Changes arrived during refresh; rescheduling");
                delay = self.reschedule_delay;
            }
        }
    }

    /// Drain every pending batch and reconcile it
    pub(crate) fn run_once(&mut self, token: &CancellationToken) -> RunReport {
        self.runs += 1;
        let started = Instant::now();
        let mut report = RunReport::new(self.runs);
        let mut batches = self.accumulator.drain_all().into_iter();

        for batch in batches.by_ref() {
            if token.is_cancelled() {
                report.push(batch.repository().clone(), batch.max_event_id(), RepoOutcome::Cancelled);
                self.accumulator.restore(batch);
                break;
            }

            let outcome = self.refresh_repository(&batch, token);
            if outcome.is_success() {
                self.tracker
                    .completed(batch.repository(), batch.max_event_id());
            } else {
                self.accumulator.restore(batch.clone());
            }
            report.push(batch.repository().clone(), batch.max_event_id(), outcome);
        }
        for batch in batches {
            report.push(batch.repository().clone(), batch.max_event_id(), RepoOutcome::Cancelled);
            self.accumulator.restore(batch);
        }

        // Failed repositories do not advance, but waiters with a timeout or
        // token still need to re-check.
        self.tracker.signal_progress();
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(
            "Refresh run {} finished: {:?} ({} repositories, {} ms)",
            report.run,
            report.status,
            report.repositories.len(),
            report.elapsed_ms
        );
        report
    }

    fn refresh_repository(&self, batch: &PendingBatch, token: &CancellationToken) -> RepoOutcome {
        let repository = batch.repository();
        let work_tree = batch.work_tree();
        info!(
            "Refreshing repository {} ({} changed paths)",
            repository,
            batch.len()
        );

        let roots: Vec<_> = self
            .resolver
            .roots_for(work_tree)
            .into_iter()
            .filter(|root| {
                let inside = root.location.starts_with(work_tree);
                if !inside {
                    warn!(
                        "Resolver reported root {} at {} outside of {}; ignoring it",
                        root.id,
                        root.location.display(),
                        work_tree.display()
                    );
                }
                inside
            })
            .collect();
        let roots = KnownRoots::new(roots);
        if roots.is_empty() {
            debug!("No tracked roots under {}", work_tree.display());
            return RepoOutcome::NoRoots;
        }

        let planner = MinimalRefreshPlanner::new(work_tree, &roots, &*self.tree);
        let plan = planner.plan_changes(
            batch.modified().iter().map(String::as_str),
            batch.deleted().iter().map(String::as_str),
        );
        if plan.is_empty() {
            info!("Refreshed repository {}: nothing to refresh", repository);
            return RepoOutcome::Unchanged;
        }

        match token.check().and_then(|()| self.tree.apply(&plan)) {
            Ok(()) => {
                info!(
                    "Refreshed repository {} ({} entries)",
                    repository,
                    plan.len()
                );
                RepoOutcome::Refreshed { entries: plan.len() }
            }
            Err(e) if e.is_cancelled() => RepoOutcome::Cancelled,
            Err(e) => {
                error!("Failed to refresh repository {}: {}", repository, e);
                RepoOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Wait for `delay`; false if shut down meanwhile
fn sleep_unless_shutdown(shutdown: &Receiver<()>, delay: Duration) -> bool {
    if delay.is_zero() {
        return matches!(shutdown.try_recv(), Err(TryRecvError::Empty));
    }
    matches!(shutdown.recv_timeout(delay), Err(RecvTimeoutError::Timeout))
}
