//! # arcsync
//!
//! Directory backup into a single compressed archive, optionally pushed to a
//! remote host with rsync.
//!
//! ## Features
//!
//! - **Scanning**: Recursive walk with exact, prefix and suffix name exclusion and a size cap
//! - **Archiving**: zip (deflate) or gzip-compressed tar, written atomically with a SHA-256
//! - **Remote sync**: rsync through sshpass, with the password kept out of the argument list
//! - **Configuration**: TOML file editable interactively
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arcsync::{BackupConfig, Pipeline};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = BackupConfig::load("/etc/backup/backup-config.toml")?;
//! let mut pipeline = Pipeline::new(config);
//!
//! let report = pipeline.run().await?;
//! println!("Backup written to {}", report.archive.path.display());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod pipeline;
pub mod remote;
pub mod size;
pub mod walker;

// Re-export commonly used types
pub use archive::{ArchiveFormat, ArchiveJob, ArchiveSummary};
pub use config::{BackupConfig, RawConfig};
pub use error::{Error, Result};
pub use filter::ExclusionRules;
pub use pipeline::{BackupReport, Pipeline, Stage};
pub use remote::{RemoteOutcome, RemoteSync, RemoteTarget};
pub use walker::{FileEntry, TreeWalker};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
