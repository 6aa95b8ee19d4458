//! CLI command implementations

pub mod config;
pub mod plan;
pub mod replay;

use anyhow::{Context, Result};
use refresh_engine::ProjectRoots;
use std::path::{Path, PathBuf};

/// A `--root NAME=PATH` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootArg {
    pub name: String,
    pub path: PathBuf,
}

/// Parse `NAME=PATH`
pub fn parse_root(value: &str) -> Result<RootArg, String> {
    let (name, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got '{}'", value))?;
    if name.is_empty() || path.is_empty() {
        return Err(format!("expected NAME=PATH, got '{}'", value));
    }
    Ok(RootArg {
        name: name.to_string(),
        path: PathBuf::from(path),
    })
}

/// Absolute form of a user-supplied working tree path
pub fn absolute_work_tree(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to resolve current directory")?
            .join(path)
    };
    if !absolute.is_dir() {
        anyhow::bail!("Working tree {} is not a directory", absolute.display());
    }
    Ok(absolute)
}

/// Register the given roots; relative paths are taken from the working
/// tree. Without any `--root` the working tree itself is the only root.
pub fn project_roots(work_tree: &Path, roots: &[RootArg]) -> ProjectRoots {
    let registry = ProjectRoots::new();
    if roots.is_empty() {
        let name = work_tree
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        registry.register(name, work_tree);
        return registry;
    }
    for root in roots {
        let location = if root.path.is_absolute() {
            root.path.clone()
        } else {
            work_tree.join(&root.path)
        };
        registry.register(root.name.clone(), location);
    }
    registry
}
