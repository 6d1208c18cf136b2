//! Backup command implementation.

use crate::config::BackupConfig;
use crate::pipeline::{BackupReport, Pipeline};
use crate::remote::RemoteOutcome;
use crate::size::format_size;
use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};

/// Arguments for the run command
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Also write the run report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Run the backup command
pub async fn run(config_path: &Path, args: RunArgs) -> Result<()> {
    let config = BackupConfig::load(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    let mut pipeline = Pipeline::new(config);
    let report = pipeline.run().await?;

    print_summary(&report);

    if let Some(path) = args.report {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

fn print_summary(report: &BackupReport) {
    println!("Backup completed successfully!");
    println!("  Run ID: {}", report.run_id);
    println!("  Archive: {}", report.archive.path.display());
    println!("  Files archived: {}", report.archive.files);
    println!(
        "  Archive size: {}",
        format_size(report.archive.archive_size)
    );
    println!("  SHA-256: {}", report.archive.sha256);
    if report.scan.excluded + report.scan.skipped + report.scan.errors > 0 {
        println!(
            "  Left out: {} excluded, {} skipped, {} unreadable",
            report.scan.excluded, report.scan.skipped, report.scan.errors
        );
    }

    match &report.remote {
        Some(RemoteOutcome::Synced { destination }) => {
            println!("  Remote copy: {}", destination)
        }
        Some(RemoteOutcome::Failed {
            destination,
            reason,
        }) => println!("  Remote copy to {} failed: {}", destination, reason),
        None => {}
    }
}
