//! arcsync - directory backup to a compressed archive
//!
//! Main binary entry point for the command-line interface.

use arcsync::cli::Cli;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Cli::parse().execute().await
}
