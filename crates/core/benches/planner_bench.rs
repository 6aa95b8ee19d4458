//! Planner benchmarks on synthetic checkouts

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use refresh_core::{ExistenceProbe, KnownRoots, MinimalRefreshPlanner, NodeKind, TrackedRoot};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

struct BenchTree {
    nodes: HashMap<PathBuf, NodeKind>,
}

impl ExistenceProbe for BenchTree {
    fn resolve(&self, path: &Path) -> Option<NodeKind> {
        self.nodes.get(path).copied()
    }
}

/// `dirs` folders of `files` files each under /ws/repo/proj
fn checkout(dirs: usize, files: usize) -> (BenchTree, Vec<String>) {
    let mut nodes = HashMap::new();
    nodes.insert(PathBuf::from("/ws"), NodeKind::Workspace);
    nodes.insert(PathBuf::from("/ws/repo/proj"), NodeKind::Container);
    let mut changed = Vec::with_capacity(dirs * files);
    for d in 0..dirs {
        nodes.insert(
            PathBuf::from(format!("/ws/repo/proj/d{}", d)),
            NodeKind::Container,
        );
        for f in 0..files {
            changed.push(format!("proj/d{}/f{}.rs", d, f));
        }
    }
    (BenchTree { nodes }, changed)
}

fn bench_plan_checkout(c: &mut Criterion) {
    let roots = KnownRoots::new(vec![TrackedRoot::new("proj", "/ws/repo/proj")]);

    let (tree, changed) = checkout(10, 10);
    c.bench_function("plan_checkout_100_files", |b| {
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/repo"), &roots, &tree);
        b.iter(|| black_box(planner.plan(changed.iter().map(String::as_str))));
    });

    let (tree, changed) = checkout(200, 50);
    c.bench_function("plan_checkout_10k_files", |b| {
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/repo"), &roots, &tree);
        b.iter(|| black_box(planner.plan(changed.iter().map(String::as_str))));
    });
}

fn bench_plan_new_folders(c: &mut Criterion) {
    let roots = KnownRoots::new(vec![TrackedRoot::new("proj", "/ws/repo/proj")]);
    // None of the folders are cached yet: every one is a fresh checkout.
    let (mut tree, changed) = checkout(200, 50);
    tree.nodes.retain(|_, kind| *kind != NodeKind::Container);
    tree.nodes
        .insert(PathBuf::from("/ws/repo/proj"), NodeKind::Container);

    c.bench_function("plan_new_folders_10k_files", |b| {
        let planner = MinimalRefreshPlanner::new(Path::new("/ws/repo"), &roots, &tree);
        b.iter(|| black_box(planner.plan(changed.iter().map(String::as_str))));
    });
}

criterion_group!(benches, bench_plan_checkout, bench_plan_new_folders);
criterion_main!(benches);
