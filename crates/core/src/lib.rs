//! Core model for workspace refresh reconciliation
//!
//! This crate provides:
//! - Tree node references and refresh granularity (`ResourceRef`, `Depth`)
//! - The collaborator seams (`RootResolver`, `ExistenceProbe`, `TreeInvalidator`)
//! - Changed-path classification against tracked roots
//! - The minimal refresh planner
//!
//! Everything here is pure computation over snapshots; threading and
//! bookkeeping live in the `refresh-journal` and `refresh-engine` crates.

pub mod cancel;
pub mod error;
pub mod path;
pub mod plan;
pub mod planner;
pub mod tree;

// Re-exports
pub use cancel::CancellationToken;
pub use error::RefreshError;
pub use path::{ChangedPath, KnownRoots, PathClassifier, PathKind};
pub use plan::RefreshPlan;
pub use planner::MinimalRefreshPlanner;
pub use tree::{
    Depth, ExistenceProbe, NodeKind, ResourceRef, RootId, RootResolver, TrackedRoot,
    TreeInvalidator, TreeModel,
};

/// Result type for tree refresh operations
pub type Result<T> = std::result::Result<T, RefreshError>;
