//! Change bookkeeping for workspace refresh
//!
//! This crate provides:
//! - Change notifications as pushed by the version-control engine
//! - Per-repository pending batches with latest-state-wins merging
//! - The lock-guarded accumulator drained by the refresh coordinator
//! - Per-repository event version tracking and the "wait until caught up"
//!   primitive

pub mod accumulator;
pub mod batch;
pub mod error;
pub mod notification;
pub mod tracker;

// Re-exports
pub use accumulator::{ChangeEventAccumulator, Wake};
pub use batch::PendingBatch;
pub use error::WaitError;
pub use notification::{ChangeNotification, RepositoryId};
pub use tracker::{EventStatus, EventStatusSnapshot, EventVersionTracker, DEFAULT_POLL_INTERVAL};
