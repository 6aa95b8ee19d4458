//! Tree refresh CLI - trefresh command

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

mod cmd;
mod logging;
mod system_config;

use cmd::RootArg;

/// trefresh - Keep a cached file tree in sync after version-control operations
#[derive(Parser)]
#[command(name = "trefresh")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config_dir>/trefresh/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which tree nodes a set of changed paths would refresh
    Plan {
        /// Working tree the paths are relative to
        work_tree: PathBuf,
        /// Changed (created or modified) paths; a trailing '/' marks a directory
        paths: Vec<String>,
        /// Deleted paths
        #[arg(long)]
        deleted: Vec<String>,
        /// Tracked root as NAME=PATH (default: the working tree itself)
        #[arg(long = "root", value_parser = cmd::parse_root)]
        roots: Vec<RootArg>,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay change notifications from a JSON lines file through the engine
    Replay {
        /// Working tree the events belong to
        work_tree: PathBuf,
        /// One {"repository", "modified", "deleted", "event_id"} object per line
        events: PathBuf,
        /// Tracked root as NAME=PATH (default: the working tree itself)
        #[arg(long = "root", value_parser = cmd::parse_root)]
        roots: Vec<RootArg>,
        /// How long to wait for each repository to catch up
        #[arg(long, default_value = "30000")]
        timeout_ms: u64,
        /// Print reports and tracker status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the effective configuration
    Config {
        /// Print an example config file instead
        #[arg(long)]
        example: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = system_config::load(cli.config.as_deref())?;
    let _log_guard = logging::init(&loaded.config.logging, cli.verbose)?;

    match cli.command {
        Commands::Plan {
            work_tree,
            paths,
            deleted,
            roots,
            json,
        } => cmd::plan::run(cmd::plan::PlanArgs {
            work_tree,
            roots,
            modified: paths,
            deleted,
            json,
        }),
        Commands::Replay {
            work_tree,
            events,
            roots,
            timeout_ms,
            json,
        } => cmd::replay::run(
            cmd::replay::ReplayArgs {
                work_tree,
                events,
                roots,
                timeout: Duration::from_millis(timeout_ms),
                json,
            },
            &loaded.config.engine,
        ),
        Commands::Config { example } => cmd::config::run(&loaded, example),
    }
}
