//! Cached node tree mirroring a directory on disk
//!
//! The cache answers existence queries without touching the disk. It only
//! learns about changes through `apply`, which re-reads the refreshed nodes
//! and reports everything that appeared or vanished as one `TreeChange`.
//! A failed `apply` leaves the cache untouched and publishes nothing.

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use refresh_core::{
    Depth, ExistenceProbe, NodeKind, RefreshError, RefreshPlan, ResourceRef, TreeInvalidator,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Directory names never mirrored into the tree
const SKIPPED_NAMES: &[&str] = &[".git"];

/// Coalesced result of one `apply`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeChange {
    /// Nodes the plan asked to refresh
    pub refreshed: Vec<(ResourceRef, Depth)>,
    /// Nodes that appeared
    pub added: BTreeSet<PathBuf>,
    /// Nodes that vanished
    pub removed: BTreeSet<PathBuf>,
}

type Nodes = BTreeMap<PathBuf, NodeKind>;

/// In-memory node tree of a base directory
pub struct CachedTree {
    base: PathBuf,
    nodes: RwLock<Nodes>,
    subscribers: Mutex<Vec<Sender<TreeChange>>>,
}

impl CachedTree {
    /// Scan `base` deeply and cache every node beneath it
    pub fn load(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref();
        let base = if base.is_absolute() {
            base.to_path_buf()
        } else {
            std::env::current_dir()
                .context("Failed to resolve current directory")?
                .join(base)
        };
        if !base.is_dir() {
            anyhow::bail!("{} is not a directory", base.display());
        }

        let mut nodes = Nodes::new();
        nodes.insert(base.clone(), NodeKind::Workspace);
        scan_into(&base, &mut nodes)
            .with_context(|| format!("Failed to scan {}", base.display()))?;

        debug!("Loaded tree of {} ({} nodes)", base.display(), nodes.len());
        Ok(Self {
            base,
            nodes: RwLock::new(nodes),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Base directory the tree mirrors
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Number of cached nodes, the base included
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.nodes.read().contains_key(path)
    }

    /// Receive one `TreeChange` per applied plan
    pub fn subscribe(&self) -> Receiver<TreeChange> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn publish(&self, change: TreeChange) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }

    fn refresh(&self, nodes: &mut Nodes, resource: &ResourceRef, depth: Depth, change: &mut TreeChange) -> Result<(), RefreshError> {
        let path = resource.path();
        if !path.starts_with(&self.base) {
            return Err(RefreshError::Rejected {
                path: path.to_path_buf(),
                reason: format!("outside of {}", self.base.display()),
            });
        }

        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if path == self.base {
                    return Err(RefreshError::io(path, e));
                }
                trace!("{} vanished", path.display());
                remove_subtree(nodes, path, change);
                return Ok(());
            }
            Err(e) => return Err(RefreshError::io(path, e)),
        };

        let kind = if path == self.base {
            NodeKind::Workspace
        } else if metadata.is_dir() {
            NodeKind::Container
        } else {
            NodeKind::File
        };
        if let Some(previous) = nodes.get(path).copied() {
            if previous.is_container() != kind.is_container() {
                // Replaced by a node of the other kind.
                remove_subtree(nodes, path, change);
            }
        }
        if nodes.insert(path.to_path_buf(), kind).is_none() {
            change.added.insert(path.to_path_buf());
        }
        if !kind.is_container() {
            return Ok(());
        }

        match depth {
            Depth::Shallow => self.refresh_children(nodes, path, change),
            Depth::Deep => self.refresh_subtree(nodes, path, change),
        }
    }

    /// Re-list one directory level
    fn refresh_children(&self, nodes: &mut Nodes, dir: &Path, change: &mut TreeChange) -> Result<(), RefreshError> {
        let mut on_disk = BTreeMap::new();
        let entries = fs::read_dir(dir).map_err(|e| RefreshError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| RefreshError::io(dir, e))?;
            if is_skipped(&entry.file_name()) {
                continue;
            }
            let file_type = entry.file_type().map_err(|e| RefreshError::io(entry.path(), e))?;
            let kind = if file_type.is_dir() {
                NodeKind::Container
            } else {
                NodeKind::File
            };
            on_disk.insert(entry.path(), kind);
        }

        let cached: Vec<(PathBuf, NodeKind)> = descendants(nodes, dir)
            .filter(|(path, _)| path.parent() == Some(dir))
            .map(|(path, kind)| (path.clone(), *kind))
            .collect();
        for (path, kind) in cached {
            match on_disk.get(&path) {
                Some(current) if current.is_container() == kind.is_container() => {}
                _ => remove_subtree(nodes, &path, change),
            }
        }

        for (path, kind) in on_disk {
            if !nodes.contains_key(&path) {
                nodes.insert(path.clone(), kind);
                change.added.insert(path);
            }
        }
        Ok(())
    }

    /// Re-walk a whole subtree
    fn refresh_subtree(&self, nodes: &mut Nodes, dir: &Path, change: &mut TreeChange) -> Result<(), RefreshError> {
        let mut on_disk = Nodes::new();
        scan_into(dir, &mut on_disk)?;

        let cached: Vec<PathBuf> = descendants(nodes, dir).map(|(path, _)| path.clone()).collect();
        for path in cached {
            let Some(kind) = nodes.get(&path).copied() else {
                continue;
            };
            match on_disk.get(&path) {
                Some(current) if current.is_container() == kind.is_container() => {}
                _ => remove_subtree(nodes, &path, change),
            }
        }

        for (path, kind) in on_disk {
            if !nodes.contains_key(&path) {
                nodes.insert(path.clone(), kind);
                change.added.insert(path);
            }
        }
        Ok(())
    }
}

impl ExistenceProbe for CachedTree {
    fn resolve(&self, path: &Path) -> Option<NodeKind> {
        self.nodes.read().get(path).copied()
    }
}

impl TreeInvalidator for CachedTree {
    fn apply(&self, plan: &RefreshPlan) -> Result<(), RefreshError> {
        let mut change = TreeChange::default();
        {
            let mut nodes = self.nodes.write();
            // Staged so that a failing entry discards the earlier ones too.
            let mut staged = nodes.clone();
            for (resource, depth) in plan.iter() {
                self.refresh(&mut staged, resource, depth, &mut change)?;
                change.refreshed.push((resource.clone(), depth));
            }
            *nodes = staged;
        }

        debug!(
            "Applied {} refreshes: {} added, {} removed",
            change.refreshed.len(),
            change.added.len(),
            change.removed.len()
        );
        self.publish(change);
        Ok(())
    }
}

fn is_skipped(name: &std::ffi::OsStr) -> bool {
    name.to_str()
        .map(|name| SKIPPED_NAMES.contains(&name))
        .unwrap_or(false)
}

/// Cached nodes strictly below `dir`, in path order
fn descendants<'n>(nodes: &'n Nodes, dir: &'n Path) -> impl Iterator<Item = (&'n PathBuf, &'n NodeKind)> {
    nodes
        .range::<Path, _>((Bound::Excluded(dir), Bound::Unbounded))
        .take_while(move |(path, _)| path.starts_with(dir))
}

/// Drop `path` and everything cached below it
fn remove_subtree(nodes: &mut Nodes, path: &Path, change: &mut TreeChange) {
    let doomed: Vec<PathBuf> = descendants(nodes, path).map(|(path, _)| path.clone()).collect();
    for child in doomed {
        nodes.remove(&child);
        change.removed.insert(child);
    }
    if nodes.remove(path).is_some() {
        change.removed.insert(path.to_path_buf());
    }
}

/// Walk everything strictly below `dir` into `nodes`
fn scan_into(dir: &Path, nodes: &mut Nodes) -> Result<(), RefreshError> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_skipped(entry.file_name()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(dir).to_path_buf();
                match e.into_io_error() {
                    // Deleted while walking.
                    Some(io) if io.kind() == io::ErrorKind::NotFound => continue,
                    Some(io) => return Err(RefreshError::io(path, io)),
                    None => {
                        return Err(RefreshError::Rejected {
                            path,
                            reason: "filesystem loop".to_string(),
                        })
                    }
                }
            }
        };
        let kind = if entry.file_type().is_dir() {
            NodeKind::Container
        } else {
            NodeKind::File
        };
        nodes.insert(entry.into_path(), kind);
    }
    Ok(())
}
