//! Feed recorded change notifications through a live engine

use super::{absolute_work_tree, project_roots, RootArg};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use refresh_engine::{CachedTree, EngineConfig, RefreshEngine, RepoOutcome, RunReport, RunStatus};
use refresh_journal::{ChangeNotification, RepositoryId};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct ReplayArgs {
    pub work_tree: PathBuf,
    pub events: PathBuf,
    pub roots: Vec<RootArg>,
    pub timeout: Duration,
    pub json: bool,
}

/// One line of the events file
#[derive(Debug, Deserialize)]
struct ReplayEvent {
    repository: RepositoryId,
    #[serde(default)]
    modified: BTreeSet<String>,
    #[serde(default)]
    deleted: BTreeSet<String>,
    event_id: u64,
}

fn read_events(path: &Path) -> Result<Vec<ReplayEvent>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut events = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: ReplayEvent = serde_json::from_str(&line)
            .with_context(|| format!("Invalid event on line {}", index + 1))?;
        events.push(event);
    }
    Ok(events)
}

pub fn run(args: ReplayArgs, config: &EngineConfig) -> Result<()> {
    let work_tree = absolute_work_tree(&args.work_tree)?;
    let events = read_events(&args.events)?;
    let tree = Arc::new(CachedTree::load(&work_tree)?);
    let roots = Arc::new(project_roots(&work_tree, &args.roots));

    let engine = RefreshEngine::new(config.clone(), roots, tree)?;
    let reports = engine.reports();
    let notifier = engine.notifier();

    let mut repositories = BTreeSet::new();
    for event in events {
        let notification =
            ChangeNotification::new(event.repository.clone(), work_tree.clone(), event.event_id)
                .modified(event.modified)
                .deleted(event.deleted);
        if notifier.send(notification) {
            repositories.insert(event.repository);
        } else {
            debug!("Skipped empty event {}", event.event_id);
        }
    }

    let mut timed_out = Vec::new();
    for repository in &repositories {
        if let Err(e) = engine.wait_until_caught_timeout(repository, args.timeout) {
            warn!("{}", e);
            timed_out.push(repository.clone());
        }
    }

    let statuses: BTreeMap<_, _> = repositories
        .iter()
        .map(|repository| (repository.clone(), engine.event_status(repository)))
        .collect();
    // Joins the coordinator, so every finished run has published its report.
    engine.dispose();
    let reports: Vec<RunReport> = reports.try_iter().collect();

    if args.json {
        let output = serde_json::json!({
            "reports": reports,
            "status": statuses
                .iter()
                .map(|(repository, status)| (repository.to_string(), status))
                .collect::<BTreeMap<_, _>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialize replay output")?
        );
    } else {
        print_reports(&reports);
        println!("\n{}", "Tracker".bold());
        for (repository, status) in &statuses {
            let state = if status.is_pending() {
                "pending".red().to_string()
            } else {
                "caught up".green().to_string()
            };
            println!(
                "  {}: seen {}, refreshed {} ({})",
                repository.cyan(),
                status.last_event_seen,
                status.last_refresh_completed,
                state
            );
        }
    }

    if !timed_out.is_empty() {
        anyhow::bail!(
            "Timed out waiting for {}",
            timed_out
                .iter()
                .map(RepositoryId::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

fn print_reports(reports: &[RunReport]) {
    if reports.is_empty() {
        println!("{}", "No refresh runs".yellow());
        return;
    }
    for report in reports {
        let status = match report.status {
            RunStatus::Completed => "completed".green().to_string(),
            RunStatus::Failed => "failed".red().to_string(),
            RunStatus::Cancelled => "cancelled".yellow().to_string(),
        };
        println!(
            "{} {} {} {}",
            "Run".bold(),
            report.run,
            status,
            format!("({} ms)", report.elapsed_ms).dimmed()
        );
        for repo in &report.repositories {
            let outcome = match &repo.outcome {
                RepoOutcome::Refreshed { entries } => format!("refreshed {} entries", entries),
                RepoOutcome::NoRoots => "no tracked roots".to_string(),
                RepoOutcome::Unchanged => "nothing to refresh".to_string(),
                RepoOutcome::Failed { error } => format!("failed: {}", error).red().to_string(),
                RepoOutcome::Cancelled => "cancelled".yellow().to_string(),
            };
            println!(
                "  {} up to event {}: {}",
                repo.repository.cyan(),
                repo.max_event_id,
                outcome
            );
        }
    }
}
