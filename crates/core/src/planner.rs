//! Minimal refresh planning
//!
//! Turns the changed paths of one repository into the smallest set of tree
//! nodes to invalidate:
//! - a changed path that is exactly a tracked root refreshes that root
//! - the first changed file in a container refreshes just that file; a
//!   second file promotes the refresh to the container (one level)
//! - a changed file whose folder is unknown to the tree (folder created or
//!   removed) refreshes the nearest existing ancestor recursively
//! - paths outside every tracked root are ignored
//!
//! Paths are visited in sorted order and the result is normalized, so the
//! plan depends only on the set of changed paths, not on their order.

use crate::path::{KnownRoots, PathClassifier, PathKind};
use crate::plan::RefreshPlan;
use crate::tree::{Depth, ExistenceProbe, NodeKind, ResourceRef};
use ahash::{AHashMap, AHashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Working state of one planning pass
#[derive(Default)]
struct PlanState {
    plan: RefreshPlan,
    /// Containers already handled. `Some(file)` while `file` is the only
    /// change seen in the container so far.
    handled: AHashMap<PathBuf, Option<PathBuf>>,
    /// Paths whose whole subtree is already taken care of
    full_refreshes: AHashSet<PathBuf>,
}

impl PlanState {
    fn is_fully_refreshed(&self, path: &Path) -> bool {
        path.ancestors()
            .any(|ancestor| self.full_refreshes.contains(ancestor))
    }

    /// Mark `child` as taken care of, including everything below it
    fn cover_subtree(&mut self, child: PathBuf) {
        self.full_refreshes.insert(child.clone());
        self.handled.insert(child, None);
    }
}

/// Computes minimal refresh plans for one working tree
pub struct MinimalRefreshPlanner<'a, P: ExistenceProbe + ?Sized> {
    classifier: PathClassifier<'a>,
    probe: &'a P,
}

impl<'a, P: ExistenceProbe + ?Sized> MinimalRefreshPlanner<'a, P> {
    /// Create a planner over a snapshot of the roots and the cached tree
    pub fn new(work_tree: &'a Path, roots: &'a KnownRoots, probe: &'a P) -> Self {
        Self {
            classifier: PathClassifier::new(work_tree, roots),
            probe,
        }
    }

    /// Plan the refresh for a batch of modified and deleted paths
    pub fn plan_changes<'s>(
        &self,
        modified: impl IntoIterator<Item = &'s str>,
        deleted: impl IntoIterator<Item = &'s str>,
    ) -> RefreshPlan {
        self.plan(modified.into_iter().chain(deleted))
    }

    /// Plan the refresh for a set of changed repository-relative paths
    pub fn plan<'s>(&self, changed: impl IntoIterator<Item = &'s str>) -> RefreshPlan {
        let mut paths: Vec<&str> = changed.into_iter().collect();
        paths.sort_unstable();
        paths.dedup();

        let work_tree = self.classifier.work_tree();
        debug!(
            "Calculating refresh for {} ({} paths)",
            work_tree.display(),
            paths.len()
        );

        let mut state = PlanState::default();
        if !self.classifier.roots().is_empty() {
            for relative in paths {
                self.visit(relative, &mut state);
            }
        }

        let mut plan = state.plan;
        plan.normalize();

        debug!(
            "Calculated refresh for {}: {} entries ({} deep)",
            work_tree.display(),
            plan.len(),
            plan.deep_count()
        );
        plan
    }

    fn visit(&self, relative: &str, state: &mut PlanState) {
        let changed = self.classifier.classify(relative);

        if let Some(root) = changed.exact_root {
            state.handled.insert(changed.absolute.clone(), None);
            state
                .plan
                .insert(ResourceRef::Root(root.clone()), Depth::Shallow);
            return;
        }

        if state.is_fully_refreshed(&changed.absolute) || !changed.is_tracked() {
            trace!("Skipping {}: covered or untracked", relative);
            return;
        }

        let container = changed.container_path().to_path_buf();
        if let Some(first_file) = state.handled.get_mut(&container) {
            if let Some(file) = first_file.take() {
                // Second change in this container.
                state.plan.remove(&ResourceRef::File(file));
                state
                    .plan
                    .insert(ResourceRef::Container(container), Depth::Shallow);
            }
            return;
        }

        match changed.kind {
            PathKind::Directory => match self.probe.resolve(&container) {
                Some(kind) if kind.is_container() => {
                    state.handled.insert(container.clone(), None);
                    state
                        .plan
                        .insert(ResourceRef::Container(container), Depth::Shallow);
                }
                Some(NodeKind::File) => {
                    debug!(
                        "Directory change at {} is cached as a file; leaving it to its parent",
                        container.display()
                    );
                }
                _ => {}
            },
            PathKind::File => self.locate_file(&changed.absolute, state),
        }
    }

    /// First change in a container: find the deepest existing container and
    /// record the refresh of its changed (possibly non-existing) child.
    fn locate_file(&self, file: &Path, state: &mut PlanState) {
        let work_tree = self.classifier.work_tree();
        let (Some(parent), Some(name)) = (file.parent(), file.file_name()) else {
            return;
        };
        let mut current = parent.to_path_buf();
        let mut last_part = name.to_os_string();
        let mut is_file = true;

        while current.starts_with(work_tree) {
            match self.probe.resolve(&current) {
                Some(kind) if kind.is_container() => {
                    if self.classifier.roots().owner(&current).is_none() {
                        // Repository content without a tree root, e.g. an
                        // untracked nested checkout. Ignore it and anything
                        // beneath.
                        debug!(
                            "No tracked root owns {}; ignoring {}",
                            current.display(),
                            file.display()
                        );
                        state.cover_subtree(current.join(&last_part));
                    } else if is_file {
                        state
                            .handled
                            .insert(current, Some(file.to_path_buf()));
                        state
                            .plan
                            .insert(ResourceRef::File(file.to_path_buf()), Depth::Shallow);
                    } else {
                        // New or deleted folder.
                        state.cover_subtree(current.join(&last_part));
                        state
                            .plan
                            .insert(ResourceRef::Container(current), Depth::Deep);
                    }
                    return;
                }
                _ => {
                    let Some(name) = current.file_name() else {
                        return;
                    };
                    last_part = name.to_os_string();
                    is_file = false;
                    if !current.pop() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TrackedRoot;
    use std::collections::HashMap;

    /// Cached tree stand-in built from a list of known nodes
    struct MemoryTree {
        nodes: HashMap<PathBuf, NodeKind>,
    }

    impl MemoryTree {
        fn new(workspace: &str, containers: &[&str], files: &[&str]) -> Self {
            let mut nodes = HashMap::new();
            nodes.insert(PathBuf::from(workspace), NodeKind::Workspace);
            for path in containers {
                nodes.insert(PathBuf::from(path), NodeKind::Container);
            }
            for path in files {
                nodes.insert(PathBuf::from(path), NodeKind::File);
            }
            Self { nodes }
        }
    }

    impl ExistenceProbe for MemoryTree {
        fn resolve(&self, path: &Path) -> Option<NodeKind> {
            self.nodes.get(path).copied()
        }
    }

    fn single_root() -> KnownRoots {
        KnownRoots::new(vec![TrackedRoot::new("proj", "/ws/proj")])
    }

    fn plan_of(entries: &[(ResourceRef, Depth)]) -> RefreshPlan {
        entries.iter().cloned().collect()
    }

    /// Visit `paths` in exactly the given order, skipping the sort.
    /// Returns the raw plan and its normalized form.
    fn visit_in_order<P: ExistenceProbe>(
        planner: &MinimalRefreshPlanner<'_, P>,
        paths: &[&str],
    ) -> (RefreshPlan, RefreshPlan) {
        let mut state = PlanState::default();
        for relative in paths {
            planner.visit(relative, &mut state);
        }
        let raw = state.plan;
        let mut normalized = raw.clone();
        normalized.normalize();
        (raw, normalized)
    }

    fn permutations<'s>(items: &[&'s str]) -> Vec<Vec<&'s str>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut all = Vec::new();
        for (i, first) in items.iter().enumerate() {
            let mut rest = items.to_vec();
            rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, *first);
                all.push(tail);
            }
        }
        all
    }

    #[test]
    fn test_single_file_refreshes_file() {
        let roots = single_root();
        let tree = MemoryTree::new("/ws", &["/ws/proj"], &["/ws/proj/a.txt"]);
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/proj"), &roots, &tree);

        let plan = planner.plan(["a.txt"]);

        assert_eq!(
            plan,
            plan_of(&[(ResourceRef::file("/ws/proj/a.txt"), Depth::Shallow)])
        );
    }

    #[test]
    fn test_second_file_promotes_to_container() {
        let roots = single_root();
        let tree = MemoryTree::new(
            "/ws",
            &["/ws/proj", "/ws/proj/sub"],
            &["/ws/proj/sub/a.txt", "/ws/proj/sub/b.txt"],
        );
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/proj"), &roots, &tree);

        let plan = planner.plan(["sub/a.txt", "sub/b.txt"]);

        assert_eq!(
            plan,
            plan_of(&[(ResourceRef::container("/ws/proj/sub"), Depth::Shallow)])
        );
    }

    #[test]
    fn test_vanished_folder_refreshes_ancestor_deeply() {
        let roots = single_root();
        let tree = MemoryTree::new("/ws", &["/ws/proj"], &[]);
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/proj"), &roots, &tree);

        let plan = planner.plan_changes([] as [&str; 0], ["newdir/x.txt", "newdir/deeper/y.txt"]);

        assert_eq!(
            plan,
            plan_of(&[(ResourceRef::container("/ws/proj"), Depth::Deep)])
        );
    }

    #[test]
    fn test_slash_refreshes_root() {
        let roots = single_root();
        let tree = MemoryTree::new("/ws", &["/ws/proj"], &[]);
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/proj"), &roots, &tree);

        let plan = planner.plan(["/"]);

        assert_eq!(
            plan,
            plan_of(&[(ResourceRef::root("proj", "/ws/proj"), Depth::Shallow)])
        );
    }

    #[test]
    fn test_root_refresh_covers_files_directly_inside() {
        let roots = single_root();
        let tree = MemoryTree::new("/ws", &["/ws/proj"], &["/ws/proj/a.txt"]);
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/proj"), &roots, &tree);

        let plan = planner.plan(["/", "a.txt"]);

        assert_eq!(
            plan,
            plan_of(&[(ResourceRef::root("proj", "/ws/proj"), Depth::Shallow)])
        );
    }

    #[test]
    fn test_existing_directory_refreshes_one_level() {
        let roots = single_root();
        let tree = MemoryTree::new("/ws", &["/ws/proj", "/ws/proj/sub"], &[]);
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/proj"), &roots, &tree);

        let plan = planner.plan(["sub/", "sub/a.txt"]);

        assert_eq!(
            plan,
            plan_of(&[(ResourceRef::container("/ws/proj/sub"), Depth::Shallow)])
        );
    }

    #[test]
    fn test_unknown_directory_is_ignored() {
        let roots = single_root();
        let tree = MemoryTree::new("/ws", &["/ws/proj"], &[]);
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/proj"), &roots, &tree);

        assert!(planner.plan(["gone/"]).is_empty());
    }

    #[test]
    fn test_paths_outside_roots_are_ignored() {
        let roots = single_root();
        let tree = MemoryTree::new("/ws", &["/ws/proj", "/ws/docs"], &["/ws/docs/a.md"]);
        let planner = MinimalRefreshPlanner::new(Path::new("/ws"), &roots, &tree);

        assert!(planner.plan(["docs/a.md", "README.md"]).is_empty());
    }

    #[test]
    fn test_untracked_nested_checkout_is_skipped() {
        // Root sits deeper than the working tree; the walk up from a new
        // folder reaches the workspace container, which no root owns.
        let roots = KnownRoots::new(vec![TrackedRoot::new("proj", "/ws/repo/proj")]);
        let tree = MemoryTree::new("/ws/repo", &[], &[]);
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/repo"), &roots, &tree);

        let plan = planner.plan(["proj/src/a.rs", "proj/src/b.rs"]);

        assert!(plan.is_empty());
    }

    #[test]
    fn test_no_roots_yields_empty_plan() {
        let roots = KnownRoots::default();
        let tree = MemoryTree::new("/ws", &["/ws/proj"], &["/ws/proj/a.txt"]);
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/proj"), &roots, &tree);

        assert!(planner.plan(["a.txt"]).is_empty());
    }

    #[test]
    fn test_files_in_different_containers_stay_separate() {
        let roots = single_root();
        let tree = MemoryTree::new(
            "/ws",
            &["/ws/proj", "/ws/proj/a", "/ws/proj/b"],
            &["/ws/proj/a/1.txt", "/ws/proj/b/2.txt"],
        );
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/proj"), &roots, &tree);

        let plan = planner.plan(["a/1.txt", "b/2.txt"]);

        assert_eq!(
            plan,
            plan_of(&[
                (ResourceRef::file("/ws/proj/a/1.txt"), Depth::Shallow),
                (ResourceRef::file("/ws/proj/b/2.txt"), Depth::Shallow),
            ])
        );
    }

    #[test]
    fn test_repeated_path_does_not_promote() {
        let roots = single_root();
        let tree = MemoryTree::new("/ws", &["/ws/proj"], &["/ws/proj/a.txt"]);
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/proj"), &roots, &tree);

        assert_eq!(planner.plan(["a.txt", "a.txt"]), planner.plan(["a.txt"]));
    }

    #[test]
    fn test_new_folder_with_sibling_file_change() {
        let roots = single_root();
        let tree = MemoryTree::new(
            "/ws",
            &["/ws/proj", "/ws/proj/src"],
            &["/ws/proj/src/lib.rs"],
        );
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/proj"), &roots, &tree);

        let plan = planner.plan(["src/lib.rs", "src/new/mod.rs", "src/new/a.rs"]);

        assert_eq!(
            plan,
            plan_of(&[(ResourceRef::container("/ws/proj/src"), Depth::Deep)])
        );
    }

    #[test]
    fn test_root_change_after_file_normalizes_to_root() {
        let roots = single_root();
        let tree = MemoryTree::new("/ws", &["/ws/proj"], &["/ws/proj/a.txt"]);
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/proj"), &roots, &tree);

        let (root_first, root_first_normalized) = visit_in_order(&planner, &["/", "a.txt"]);
        let (file_first, file_first_normalized) = visit_in_order(&planner, &["a.txt", "/"]);

        // The file is only recorded when it is seen before its root.
        assert!(!root_first.contains(&ResourceRef::file("/ws/proj/a.txt")));
        assert!(file_first.contains(&ResourceRef::file("/ws/proj/a.txt")));
        assert_ne!(root_first, file_first);

        let expected = plan_of(&[(ResourceRef::root("proj", "/ws/proj"), Depth::Shallow)]);
        assert_eq!(root_first_normalized, expected);
        assert_eq!(file_first_normalized, expected);
    }

    #[test]
    fn test_vanished_folder_before_and_after_sibling_file() {
        let roots = single_root();
        let tree = MemoryTree::new(
            "/ws",
            &["/ws/proj", "/ws/proj/src"],
            &["/ws/proj/src/lib.rs"],
        );
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/proj"), &roots, &tree);
        let expected = plan_of(&[(ResourceRef::container("/ws/proj/src"), Depth::Deep)]);

        for order in [
            ["src/lib.rs", "src/gone/x.rs"],
            ["src/gone/x.rs", "src/lib.rs"],
        ] {
            let (raw, normalized) = visit_in_order(&planner, &order);
            assert_eq!(raw.get(&ResourceRef::container("/ws/proj/src")), Some(Depth::Deep));
            assert_eq!(normalized, expected, "order {:?}", order);
        }
    }

    #[test]
    fn test_every_visit_order_matches_sorted_plan() {
        let roots = single_root();
        let tree = MemoryTree::new(
            "/ws",
            &["/ws/proj", "/ws/proj/src"],
            &["/ws/proj/a.txt", "/ws/proj/src/lib.rs", "/ws/proj/src/main.rs"],
        );
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/proj"), &roots, &tree);
        let paths = ["/", "a.txt", "src/lib.rs", "src/main.rs", "src/new/mod.rs"];
        let expected = planner.plan(paths);

        let orders = permutations(&paths);
        assert_eq!(orders.len(), 120);
        for order in orders {
            let (_, normalized) = visit_in_order(&planner, &order);
            assert_eq!(normalized, expected, "order {:?}", order);
        }
    }
}
