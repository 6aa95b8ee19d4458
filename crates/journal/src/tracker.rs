//! Per-repository event versions and the primitives to wait on them
//!
//! Every repository carries two monotonically increasing counters:
//! - `last_event_seen`: highest event id handed to the engine
//! - `last_refresh_completed`: highest event id whose refresh succeeded
//!
//! A repository is pending while `last_event_seen > last_refresh_completed`.
//! Waiters block on a condition variable signalled after each run and
//! re-check on a bounded poll interval.

use crate::error::WaitError;
use crate::notification::RepositoryId;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use refresh_core::CancellationToken;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// What a wait is waiting for
#[derive(Clone, Copy)]
enum WaitTarget<'r> {
    /// One repository, optionally interruptible through a token
    Repository(&'r RepositoryId, Option<&'r CancellationToken>),
    /// Every repository known to the tracker
    Idle,
}

impl WaitTarget<'_> {
    fn disposed(self) -> WaitError {
        match self {
            Self::Repository(repository, _) => WaitError::Disposed(repository.clone()),
            Self::Idle => WaitError::IdleDisposed,
        }
    }

    fn timed_out(self, waited: Duration) -> WaitError {
        match self {
            Self::Repository(repository, _) => WaitError::TimedOut {
                repository: repository.clone(),
                waited,
            },
            Self::Idle => WaitError::IdleTimedOut { waited },
        }
    }
}

impl fmt::Display for WaitTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository(repository, _) => write!(f, "{}", repository),
            Self::Idle => f.write_str("idle wait"),
        }
    }
}

/// Default upper bound on how long a waiter sleeps between re-checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lock-free version counters of one repository
#[derive(Debug, Default)]
pub struct EventStatus {
    last_event_seen: AtomicU64,
    last_refresh_completed: AtomicU64,
}

impl EventStatus {
    /// Raise `last_event_seen` to `event_id`, never lowering it; returns
    /// the resulting value
    pub fn record_event(&self, event_id: u64) -> u64 {
        self.last_event_seen
            .fetch_max(event_id, Ordering::AcqRel)
            .max(event_id)
    }

    /// Raise `last_refresh_completed` to `event_id`, never lowering it
    pub fn record_completed(&self, event_id: u64) {
        self.last_refresh_completed
            .fetch_max(event_id, Ordering::AcqRel);
    }

    pub fn last_event_seen(&self) -> u64 {
        self.last_event_seen.load(Ordering::Acquire)
    }

    pub fn last_refresh_completed(&self) -> u64 {
        self.last_refresh_completed.load(Ordering::Acquire)
    }

    pub fn is_pending(&self) -> bool {
        self.last_event_seen() > self.last_refresh_completed()
    }

    pub fn snapshot(&self) -> EventStatusSnapshot {
        EventStatusSnapshot {
            last_event_seen: self.last_event_seen(),
            last_refresh_completed: self.last_refresh_completed(),
        }
    }
}

/// Point-in-time copy of an `EventStatus`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventStatusSnapshot {
    pub last_event_seen: u64,
    pub last_refresh_completed: u64,
}

impl EventStatusSnapshot {
    pub fn is_pending(&self) -> bool {
        self.last_event_seen > self.last_refresh_completed
    }
}

/// Tracks event versions of every repository and lets callers block until
/// the tree has caught up with the events they produced.
pub struct EventVersionTracker {
    statuses: DashMap<RepositoryId, Arc<EventStatus>>,
    /// Generation counter bumped on every progress signal
    progress: Mutex<u64>,
    progressed: Condvar,
    closed: AtomicBool,
    poll_interval: Duration,
}

impl Default for EventVersionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl EventVersionTracker {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            statuses: DashMap::new(),
            progress: Mutex::new(0),
            progressed: Condvar::new(),
            closed: AtomicBool::new(false),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    fn status_entry(&self, repository: &RepositoryId) -> Arc<EventStatus> {
        if let Some(status) = self.statuses.get(repository) {
            return Arc::clone(status.value());
        }
        Arc::clone(
            self.statuses
                .entry(repository.clone())
                .or_default()
                .value(),
        )
    }

    /// Note that `event_id` was handed to the engine for `repository`;
    /// returns the repository's `last_event_seen`
    pub fn record_event(&self, repository: &RepositoryId, event_id: u64) -> u64 {
        trace!("received refresh event {} for {}", event_id, repository);
        self.status_entry(repository).record_event(event_id)
    }

    /// Note a successful refresh covering events up to `event_id` and wake
    /// waiters
    pub fn completed(&self, repository: &RepositoryId, event_id: u64) {
        self.status_entry(repository).record_completed(event_id);
        trace!("refreshed up to event {} for {}", event_id, repository);
        self.signal_progress();
    }

    /// Whether `repository` has events the tree has not caught up with
    pub fn is_pending(&self, repository: &RepositoryId) -> bool {
        self.statuses
            .get(repository)
            .map(|status| status.is_pending())
            .unwrap_or(false)
    }

    /// Whether any repository is pending
    pub fn any_pending(&self) -> bool {
        self.statuses.iter().any(|entry| entry.value().is_pending())
    }

    /// Current counters of `repository`; zeros if never seen
    pub fn status(&self, repository: &RepositoryId) -> EventStatusSnapshot {
        self.statuses
            .get(repository)
            .map(|status| status.snapshot())
            .unwrap_or_default()
    }

    /// Wake all waiters so they re-check their condition
    pub fn signal_progress(&self) {
        let mut generation = self.progress.lock();
        *generation = generation.wrapping_add(1);
        self.progressed.notify_all();
    }

    /// Stop accepting waits; current and future waiters still pending get
    /// `WaitError::Disposed`
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.signal_progress();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Block until `repository` is no longer pending
    pub fn wait_until_caught(&self, repository: &RepositoryId) -> Result<(), WaitError> {
        let target = WaitTarget::Repository(repository, None);
        self.wait_inner(target, || self.is_pending(repository), None)
    }

    /// Like `wait_until_caught`, but gives up with `WaitError::Interrupted`
    /// once `token` is cancelled
    pub fn wait_until_caught_interruptibly(
        &self,
        repository: &RepositoryId,
        token: &CancellationToken,
    ) -> Result<(), WaitError> {
        let target = WaitTarget::Repository(repository, Some(token));
        self.wait_inner(target, || self.is_pending(repository), None)
    }

    /// Like `wait_until_caught`, but gives up with `WaitError::TimedOut`
    /// after `timeout`
    pub fn wait_until_caught_timeout(
        &self,
        repository: &RepositoryId,
        timeout: Duration,
    ) -> Result<(), WaitError> {
        self.wait_inner(
            WaitTarget::Repository(repository, None),
            || self.is_pending(repository),
            Some(timeout),
        )
    }

    /// Wait for each of `repositories` in turn
    pub fn wait_all_caught<'r>(
        &self,
        repositories: impl IntoIterator<Item = &'r RepositoryId>,
    ) -> Result<(), WaitError> {
        for repository in repositories {
            self.wait_until_caught(repository)?;
        }
        Ok(())
    }

    /// Block until no repository is pending, giving up after `timeout`
    pub fn wait_idle(&self, timeout: Option<Duration>) -> Result<(), WaitError> {
        self.wait_inner(WaitTarget::Idle, || self.any_pending(), timeout)
    }

    fn wait_inner(
        &self,
        target: WaitTarget<'_>,
        pending: impl Fn() -> bool,
        timeout: Option<Duration>,
    ) -> Result<(), WaitError> {
        let start = Instant::now();
        let deadline = timeout.map(|timeout| start + timeout);
        let mut generation = self.progress.lock();
        let mut logged = false;

        loop {
            if !pending() {
                return Ok(());
            }
            if !logged {
                trace!("{} waits for refresh", target);
                logged = true;
            }
            if let WaitTarget::Repository(repository, Some(token)) = target {
                if token.is_cancelled() {
                    return Err(WaitError::Interrupted(repository.clone()));
                }
            }
            if self.is_closed() {
                return Err(target.disposed());
            }

            let mut slice = self.poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(target.timed_out(now - start));
                }
                slice = slice.min(deadline - now);
            }
            self.progressed.wait_for(&mut generation, slice);
        }
    }
}
