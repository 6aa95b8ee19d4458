//! Show the effective configuration

use crate::system_config::{self, LoadedConfig};
use anyhow::Result;
use owo_colors::OwoColorize;

/// Print every configuration value and where it came from
pub fn run(loaded: &LoadedConfig, example: bool) -> Result<()> {
    if example {
        println!("{}", system_config::example_config());
        return Ok(());
    }

    let config = &loaded.config;
    println!("{}", "Configuration".bold());
    match (&loaded.source, system_config::config_file_path()) {
        (Some(path), _) => println!("{}: {}\n", "Location".dimmed(), path.display().dimmed()),
        (None, Some(default)) => println!(
            "{}: {} {}\n",
            "Location".dimmed(),
            default.display().dimmed(),
            "(not found, using defaults)".yellow()
        ),
        (None, None) => println!("{}\n", "Using built-in defaults".yellow()),
    }

    let engine = &config.engine;
    println!("{}", "[engine]".yellow());
    println!(
        "  {} = {} {}",
        "initial_delay_ms".cyan(),
        engine.initial_delay_ms,
        format!("({:?})", engine.initial_delay()).dimmed()
    );
    println!(
        "  {} = {} {}",
        "reschedule_delay_ms".cyan(),
        engine.reschedule_delay_ms,
        format!("({:?})", engine.reschedule_delay()).dimmed()
    );
    println!(
        "  {} = {}",
        "wait_poll_interval_ms".cyan(),
        engine.wait_poll_interval_ms
    );
    println!("  {} = {}", "report_capacity".cyan(), engine.report_capacity);
    println!(
        "  {} = {} {}",
        "intake_capacity".cyan(),
        engine.intake_capacity,
        if engine.intake_capacity == 0 {
            "(unbounded)".dimmed().to_string()
        } else {
            String::new()
        }
    );

    println!("\n{}", "[logging]".yellow());
    println!("  {} = {}", "level".cyan(), config.logging.level);
    match &config.logging.file {
        Some(file) => println!("  {} = {}", "file".cyan(), file.display()),
        None => println!("  {} = {}", "file".cyan(), "(stderr only)".dimmed()),
    }

    println!("\n{}", "Valid Ranges:".bold());
    println!("  initial_delay_ms, reschedule_delay_ms: 0-60000");
    println!("  wait_poll_interval_ms: 1-10000");
    println!("  report_capacity: >= 1");
    println!("  level: {}", system_config::LOG_LEVELS.join(", "));

    Ok(())
}
