//! End-to-end tests driving a real engine against an on-disk working tree

use refresh_core::{
    CancellationToken, ExistenceProbe, NodeKind, RefreshError, RefreshPlan, TreeInvalidator,
};
use refresh_engine::{
    CachedTree, CoordinatorState, EngineConfig, ProjectRoots, RefreshEngine, RepoOutcome,
    RunStatus,
};
use refresh_journal::{ChangeNotification, RepositoryId, WaitError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

/// Tree wrapper whose apply can be made to fail
struct FlakyTree {
    inner: CachedTree,
    fail: AtomicBool,
}

impl ExistenceProbe for FlakyTree {
    fn resolve(&self, path: &Path) -> Option<NodeKind> {
        self.inner.resolve(path)
    }
}

impl TreeInvalidator for FlakyTree {
    fn apply(&self, plan: &RefreshPlan) -> Result<(), RefreshError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RefreshError::io(
                self.inner.base(),
                std::io::Error::new(std::io::ErrorKind::Other, "simulated failure"),
            ));
        }
        self.inner.apply(plan)
    }
}

struct Fixture {
    temp_dir: TempDir,
    tree: Arc<FlakyTree>,
    engine: RefreshEngine,
}

impl Fixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let proj = temp_dir.path().join("repo/proj");
        fs::create_dir_all(proj.join("src")).unwrap();
        fs::write(proj.join("a.txt"), b"a").unwrap();
        fs::write(proj.join("src/lib.rs"), b"lib").unwrap();

        let tree = Arc::new(FlakyTree {
            inner: CachedTree::load(temp_dir.path()).unwrap(),
            fail: AtomicBool::new(false),
        });
        let roots = Arc::new(ProjectRoots::new());
        roots.register("proj", &proj);

        let config = EngineConfig {
            reschedule_delay_ms: 5,
            wait_poll_interval_ms: 10,
            ..Default::default()
        };
        let engine = RefreshEngine::new(config, roots, tree.clone()).unwrap();
        Self {
            temp_dir,
            tree,
            engine,
        }
    }

    fn work_tree(&self) -> PathBuf {
        self.temp_dir.path().join("repo")
    }

    fn proj(&self) -> PathBuf {
        self.work_tree().join("proj")
    }

    fn notification(&self, id: u64) -> ChangeNotification {
        ChangeNotification::new("repo", self.work_tree(), id)
    }
}

fn repo() -> RepositoryId {
    RepositoryId::new("repo")
}

#[test]
fn test_notify_and_wait_sees_new_file() {
    let fixture = Fixture::new();
    let new_file = fixture.proj().join("b.txt");
    fs::write(&new_file, b"b").unwrap();
    assert_eq!(fixture.tree.resolve(&new_file), None);

    fixture
        .engine
        .notify_and_wait(fixture.notification(1).modified(["proj/b.txt"]))
        .unwrap();

    assert_eq!(fixture.tree.resolve(&new_file), Some(NodeKind::File));
    assert!(!fixture.engine.is_pending(&repo()));
    let status = fixture.engine.event_status(&repo());
    assert_eq!(status.last_refresh_completed, 1);

    let report = fixture.engine.reports().recv_timeout(WAIT).unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert!(matches!(
        report.outcome(&repo()),
        Some(RepoOutcome::Refreshed { .. })
    ));
}

#[test]
fn test_new_folder_is_discovered_recursively() {
    let fixture = Fixture::new();
    let generated = fixture.proj().join("gen/out");
    fs::create_dir_all(&generated).unwrap();
    fs::write(generated.join("x.bin"), b"x").unwrap();
    fs::write(generated.join("y.bin"), b"y").unwrap();

    fixture
        .engine
        .notify_and_wait(
            fixture
                .notification(1)
                .modified(["proj/gen/out/x.bin", "proj/gen/out/y.bin"]),
        )
        .unwrap();

    assert_eq!(
        fixture.tree.resolve(&generated.join("y.bin")),
        Some(NodeKind::File)
    );
}

#[test]
fn test_deleted_file_is_dropped() {
    let fixture = Fixture::new();
    let lib = fixture.proj().join("src/lib.rs");
    fs::remove_file(&lib).unwrap();

    fixture
        .engine
        .notify_and_wait(fixture.notification(1).deleted(["proj/src/lib.rs"]))
        .unwrap();

    assert_eq!(fixture.tree.resolve(&lib), None);
    assert_eq!(
        fixture.tree.resolve(&fixture.proj().join("src")),
        Some(NodeKind::Container)
    );
}

#[test]
fn test_one_tree_change_per_run() {
    let fixture = Fixture::new();
    let changes = fixture.tree.inner.subscribe();
    fs::write(fixture.proj().join("a.txt"), b"changed").unwrap();
    fs::write(fixture.proj().join("src/main.rs"), b"main").unwrap();
    fs::write(fixture.proj().join("src/util.rs"), b"util").unwrap();

    fixture
        .engine
        .notify_and_wait(fixture.notification(1).modified([
            "proj/a.txt",
            "proj/src/main.rs",
            "proj/src/util.rs",
        ]))
        .unwrap();

    let change = changes.recv_timeout(WAIT).unwrap();
    assert!(change.added.contains(&fixture.proj().join("src/util.rs")));
    assert!(changes.try_recv().is_err());
}

#[test]
fn test_failed_apply_stays_pending_until_retry() {
    let fixture = Fixture::new();
    fixture.tree.fail.store(true, Ordering::SeqCst);
    fs::write(fixture.proj().join("b.txt"), b"b").unwrap();

    fixture
        .engine
        .notify(fixture.notification(3).modified(["proj/b.txt"]));
    let report = fixture.engine.reports().recv_timeout(WAIT).unwrap();
    assert_eq!(report.status, RunStatus::Failed);

    let result = fixture
        .engine
        .wait_until_caught_timeout(&repo(), Duration::from_millis(50));
    assert!(matches!(result, Err(WaitError::TimedOut { .. })));
    assert!(fixture.engine.is_pending(&repo()));
    assert_eq!(fixture.engine.queued_repositories(), vec![repo()]);

    fixture.tree.fail.store(false, Ordering::SeqCst);
    fixture.engine.retry();
    fixture.engine.wait_until_caught(&repo()).unwrap();
    assert_eq!(
        fixture.tree.resolve(&fixture.proj().join("b.txt")),
        Some(NodeKind::File)
    );
}

#[test]
fn test_interrupted_wait_reports_interruption() {
    let fixture = Fixture::new();
    fixture.tree.fail.store(true, Ordering::SeqCst);
    fixture
        .engine
        .notify(fixture.notification(1).modified(["proj/a.txt"]));

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            token.cancel();
        })
    };

    let result = fixture
        .engine
        .wait_until_caught_interruptibly(&repo(), &token);
    assert_eq!(result, Err(WaitError::Interrupted(repo())));
    assert!(token.is_cancelled());
    canceller.join().unwrap();
}

#[test]
fn test_dispose_releases_waiters() {
    let fixture = Fixture::new();
    fixture.tree.fail.store(true, Ordering::SeqCst);
    fixture
        .engine
        .notify(fixture.notification(1).modified(["proj/a.txt"]));

    thread::scope(|scope| {
        let waiter = scope.spawn(|| fixture.engine.wait_until_caught(&repo()));
        thread::sleep(Duration::from_millis(30));
        fixture.engine.dispose();
        assert_eq!(waiter.join().unwrap(), Err(WaitError::Disposed(repo())));
    });

    assert!(!fixture
        .engine
        .notify(fixture.notification(2).modified(["proj/a.txt"])));
    fixture.engine.dispose();
}

#[test]
fn test_concurrent_repositories_converge() {
    let temp_dir = TempDir::new().unwrap();
    let roots = Arc::new(ProjectRoots::new());
    let repos: Vec<_> = (0..4)
        .map(|i| {
            let work_tree = temp_dir.path().join(format!("repo{}", i));
            fs::create_dir_all(work_tree.join("proj")).unwrap();
            roots.register(format!("proj{}", i), work_tree.join("proj"));
            (RepositoryId::new(format!("repo{}", i)), work_tree)
        })
        .collect();
    let tree = Arc::new(CachedTree::load(temp_dir.path()).unwrap());
    let engine = RefreshEngine::new(EngineConfig::default(), roots, tree.clone()).unwrap();

    thread::scope(|scope| {
        for (repository, work_tree) in &repos {
            let notifier = engine.notifier();
            scope.spawn(move || {
                for id in 1..=25u64 {
                    let name = format!("f{}.txt", id);
                    fs::write(work_tree.join("proj").join(&name), b"x").unwrap();
                    let n = ChangeNotification::new(repository.clone(), work_tree.clone(), id)
                        .modified([format!("proj/{}", name)]);
                    notifier.send(n);
                }
            });
        }
    });

    engine.wait_all_caught(repos.iter().map(|(repository, _)| repository)).unwrap();
    for (repository, work_tree) in &repos {
        assert!(!engine.is_pending(repository));
        assert_eq!(engine.event_status(repository).last_refresh_completed, 25);
        assert_eq!(
            tree.resolve(&work_tree.join("proj/f25.txt")),
            Some(NodeKind::File)
        );
    }

    thread::sleep(Duration::from_millis(20));
    assert_ne!(engine.state(), CoordinatorState::Running);
}

#[test]
fn test_untracked_repository_completes_without_refresh() {
    let fixture = Fixture::new();
    let other = fixture.temp_dir.path().join("scratch");
    fs::create_dir_all(&other).unwrap();

    let n = ChangeNotification::new("scratch", &other, 9).modified(["notes.txt"]);
    fixture.engine.notify_and_wait(n).unwrap();

    let report = fixture.engine.reports().recv_timeout(WAIT).unwrap();
    assert_eq!(
        report.outcome(&RepositoryId::new("scratch")),
        Some(&RepoOutcome::NoRoots)
    );
}
