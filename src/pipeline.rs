//! One backup run: scan, archive, then optionally push to a remote host.
//!
//! ```text
//! Idle -> Scanning -> Archiving -> [Syncing] -> Done
//!            |            |
//!            +-> Failed <-+
//! ```
//!
//! Stages run strictly one after another. Syncing is skipped when remote
//! backup is disabled, and a failed sync still ends in `Done`.

use crate::archive::{ArchiveJob, ArchiveSummary};
use crate::config::BackupConfig;
use crate::remote::{RemoteOutcome, RemoteSync, RemoteTarget};
use crate::walker::{ScanResult, TreeWalker, WalkStats};
use crate::{Error, Result};
use chrono::Local;
use serde::Serialize;
use std::fmt;
use tokio::task;
use tracing::{error, info, span, Instrument, Level, Span};
use uuid::Uuid;

/// Pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Idle,
    Scanning,
    Archiving,
    Syncing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Scanning => "scanning",
            Stage::Archiving => "archiving",
            Stage::Syncing => "syncing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a completed run produced
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub run_id: Uuid,
    pub scan: WalkStats,
    pub archive: ArchiveSummary,
    /// `None` when remote backup is disabled
    pub remote: Option<RemoteOutcome>,
}

/// Validate the base directory and walk it
pub fn scan(config: &BackupConfig) -> Result<ScanResult> {
    if !config.base_folder.is_dir() {
        return Err(Error::BaseDirectory {
            path: config.base_folder.clone(),
        });
    }

    let rules = config.exclusion_rules();
    Ok(TreeWalker::new(&config.base_folder, &rules)
        .follow_symlinks(config.follow_symlinks)
        .walk())
}

/// Drives a single backup run through its stages
#[derive(Debug)]
pub struct Pipeline {
    config: BackupConfig,
    remote_sync: Option<RemoteSync>,
    stage: Stage,
    run_id: Uuid,
}

impl Pipeline {
    pub fn new(config: BackupConfig) -> Self {
        Self {
            config,
            remote_sync: None,
            stage: Stage::Idle,
            run_id: Uuid::new_v4(),
        }
    }

    /// Replace the transfer command built from the remote config
    pub fn with_remote_sync(mut self, remote_sync: RemoteSync) -> Self {
        self.remote_sync = Some(remote_sync);
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Execute the run. A pipeline runs at most once.
    pub async fn run(&mut self) -> Result<BackupReport> {
        if self.stage != Stage::Idle {
            return Err(Error::AlreadyRun);
        }

        let span = span!(Level::INFO, "backup", run = %self.run_id);
        self.execute().instrument(span).await
    }

    async fn execute(&mut self) -> Result<BackupReport> {
        info!(
            "Starting backup of {} at {}",
            self.config.base_folder.display(),
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );

        self.transition(Stage::Scanning);
        let config = self.config.clone();
        let scanned = match blocking(move || scan(&config)).await {
            Ok(result) => result,
            Err(e) => return Err(self.fail(e)),
        };

        self.transition(Stage::Archiving);
        let job = match self.config.output_path() {
            Ok(output) => ArchiveJob::new(output, self.config.format, scanned.files),
            Err(e) => return Err(self.fail(e)),
        };
        let archive = match blocking(move || job.write()).await {
            Ok(summary) => summary,
            Err(e) => return Err(self.fail(e)),
        };

        let remote = if self.config.remote.enabled {
            self.transition(Stage::Syncing);
            let target = RemoteTarget::from_config(&self.config.remote);
            let sync = self
                .remote_sync
                .clone()
                .unwrap_or_else(|| RemoteSync::from_config(&self.config.remote));
            Some(sync.push(&archive.path, &target).await)
        } else {
            info!("Remote backup disabled, skipping sync");
            None
        };

        self.transition(Stage::Done);
        info!(
            "Backup finished: {} files in {}",
            archive.files,
            archive.path.display()
        );

        Ok(BackupReport {
            run_id: self.run_id,
            scan: scanned.stats,
            archive,
            remote,
        })
    }

    fn transition(&mut self, next: Stage) {
        info!("Stage {} -> {}", self.stage, next);
        self.stage = next;
    }

    fn fail(&mut self, error: Error) -> Error {
        error!("Backup failed while {}: {}", self.stage, error);
        self.transition(Stage::Failed);
        error
    }
}

/// Run blocking filesystem work off the async runtime, keeping the span
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let span = Span::current();
    task::spawn_blocking(move || span.in_scope(work))
        .await
        .map_err(|e| Error::Stage {
            stage: "worker".to_string(),
            reason: e.to_string(),
        })?
}
