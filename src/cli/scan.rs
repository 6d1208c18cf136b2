//! Scan command implementation: a dry run of the walk.

use crate::config::BackupConfig;
use crate::pipeline;
use crate::size::format_size;
use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::task;

/// Arguments for the scan command
#[derive(Args, Debug, Default)]
pub struct ScanArgs {
    /// Output the file list and counters to a JSON file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print only the counters, not every file
    #[arg(short, long)]
    pub quiet: bool,
}

/// Run the scan command
pub async fn run(config_path: &Path, args: ScanArgs) -> Result<()> {
    let config = BackupConfig::load(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    println!("Scanning directory: {}", config.base_folder.display());
    let result = task::spawn_blocking(move || pipeline::scan(&config)).await??;

    if !args.quiet {
        for file in &result.files {
            println!("  {} ({})", file.archive_name(), format_size(file.size()));
        }
    }

    let stats = &result.stats;
    println!("Scan completed:");
    println!("  Directories: {}", stats.directories);
    println!(
        "  Files to back up: {} ({})",
        stats.files,
        format_size(stats.total_bytes)
    );
    println!("  Excluded: {}", stats.excluded);
    println!("  Skipped: {}", stats.skipped);
    println!("  Unreadable: {}", stats.errors);

    if let Some(output_path) = args.output {
        let json = serde_json::to_string_pretty(&result)?;
        fs::write(&output_path, json)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        println!("Scan results saved to: {}", output_path.display());
    }

    Ok(())
}
