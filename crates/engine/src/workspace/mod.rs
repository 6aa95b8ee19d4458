//! Filesystem-backed collaborators: the cached tree and its root registry

pub mod roots;
pub mod tree;

pub use roots::ProjectRoots;
pub use tree::{CachedTree, TreeChange};
