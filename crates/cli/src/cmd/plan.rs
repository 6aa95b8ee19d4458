//! Compute and print the refresh plan for a set of changed paths

use super::{absolute_work_tree, project_roots, RootArg};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use refresh_core::{Depth, KnownRoots, MinimalRefreshPlanner, RefreshPlan, ResourceRef, RootResolver};
use refresh_engine::CachedTree;
use std::path::{Path, PathBuf};

pub struct PlanArgs {
    pub work_tree: PathBuf,
    pub roots: Vec<RootArg>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub json: bool,
}

pub fn run(args: PlanArgs) -> Result<()> {
    let work_tree = absolute_work_tree(&args.work_tree)?;
    let tree = CachedTree::load(&work_tree)?;
    let roots = project_roots(&work_tree, &args.roots);
    let known = KnownRoots::new(roots.roots_for(&work_tree));

    let planner = MinimalRefreshPlanner::new(&work_tree, &known, &tree);
    let plan = planner.plan_changes(
        args.modified.iter().map(String::as_str),
        args.deleted.iter().map(String::as_str),
    );

    if args.json {
        let json = serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?;
        println!("{}", json);
        return Ok(());
    }

    print_plan(&work_tree, &known, &plan);
    Ok(())
}

fn print_plan(work_tree: &Path, roots: &KnownRoots, plan: &RefreshPlan) {
    println!("{}", "Refresh Plan".bold());
    println!("{}: {}", "Working tree".dimmed(), work_tree.display().dimmed());
    println!(
        "{}: {}\n",
        "Roots".dimmed(),
        roots
            .iter()
            .map(|root| root.id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
            .dimmed()
    );

    if plan.is_empty() {
        println!("{}", "Nothing to refresh".yellow());
        return;
    }

    for (resource, depth) in plan.iter() {
        let depth = match depth {
            Depth::Shallow => "shallow".cyan().to_string(),
            Depth::Deep => "deep".magenta().to_string(),
        };
        let (kind, path) = match resource {
            ResourceRef::File(path) => ("file", path),
            ResourceRef::Container(path) => ("folder", path),
            ResourceRef::Root(root) => ("root", &root.location),
        };
        let shown = path.strip_prefix(work_tree).unwrap_or(path);
        let shown = if shown.as_os_str().is_empty() {
            ".".to_string()
        } else {
            shown.display().to_string()
        };
        println!("  {:<16} {:<7} {}", depth, kind, shown);
    }

    println!(
        "\n{} {} ({} deep)",
        plan.len().to_string().green(),
        if plan.len() == 1 { "entry" } else { "entries" },
        plan.deep_count()
    );
}
