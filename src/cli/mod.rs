//! Command-line interface for arcsync.
//!
//! Running without a subcommand performs a backup, the same as `arcsync run`.

use crate::config::DEFAULT_CONFIG_PATH;
use crate::logging::{self, DEFAULT_LOG_FILE};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod backup;
pub mod configure;
pub mod scan;

/// arcsync - back up a directory tree into a zip or tar.gz archive
#[derive(Parser)]
#[command(name = "arcsync")]
#[command(about = "Back up a directory tree into a compressed archive and push it with rsync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Config file to read
    #[arg(short, long, global = true, env = "ARCSYNC_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log file to append to
    #[arg(long, global = true, env = "ARCSYNC_LOG_FILE", default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Only log to the console
    #[arg(long, global = true)]
    pub no_log_file: bool,

    /// Enable debug output, including per-file progress
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Scan, archive and optionally push to the remote server
    Run(backup::RunArgs),
    /// List the files a backup would include, without writing an archive
    Scan(scan::ScanArgs),
    /// Interactively edit the config file
    Configure,
}

impl Cli {
    /// Dispatch to the selected command
    pub async fn execute(self) -> Result<()> {
        let log_file = (!self.no_log_file).then_some(self.log_file.as_path());

        match self.command.unwrap_or_default() {
            Commands::Run(args) => {
                let _guard = logging::init(log_file, self.verbose)?;
                backup::run(&self.config, args).await
            }
            Commands::Scan(args) => {
                let _guard = logging::init(log_file, self.verbose)?;
                scan::run(&self.config, args).await
            }
            Commands::Configure => configure::run(&self.config),
        }
    }
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Run(backup::RunArgs::default())
    }
}
