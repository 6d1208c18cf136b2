//! Backup configuration: the on-disk TOML file and the validated record the
//! pipeline runs against.
//!
//! The file keeps the historical section and key names:
//!
//! ```toml
//! [Backup]
//! BASE_FOLDER = "/home/alice"
//! EXCLUDE = "node_modules, .git"
//! EXCLUDE_PREFIX = ".cache"
//! EXCLUDE_SUFFIX = ".tmp, .log"
//! BACKUP_FILENAME = "~/backups/home"
//! TYPE = "tar"
//! MAX_SIZE = "500M"
//! FOLLOW_SYMLINKS = true
//!
//! [RemoteBackup]
//! ENABLE = true
//! SERVER = "10.0.0.5"
//! REMOTE_USER = "alice"
//! REMOTE_PATH = "/srv/backups/"
//! RSYNC_OPTIONS = "-avz -e 'ssh -p 2222'"
//! PASSWORD = "secret"
//! TIMEOUT = 600
//! ```

use crate::archive::{self, ArchiveFormat};
use crate::filter::ExclusionRules;
use crate::size::parse_size;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Location used when no config path is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/backup/backup-config.toml";

/// Config file as written on disk, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawConfig {
    #[serde(rename = "Backup", default)]
    pub backup: RawBackupSection,
    #[serde(rename = "RemoteBackup", default)]
    pub remote: RawRemoteSection,
}

/// `[Backup]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RawBackupSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_folder: Option<String>,
    /// Comma-separated exact names
    #[serde(default)]
    pub exclude: String,
    /// Comma-separated name prefixes
    #[serde(default)]
    pub exclude_prefix: String,
    /// Comma-separated name suffixes
    #[serde(default)]
    pub exclude_suffix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_filename: Option<String>,
    #[serde(rename = "TYPE", default, skip_serializing_if = "Option::is_none")]
    pub backup_type: Option<String>,
    #[serde(default)]
    pub max_size: String,
    #[serde(default = "follow_symlinks_default")]
    pub follow_symlinks: bool,
}

impl Default for RawBackupSection {
    fn default() -> Self {
        Self {
            base_folder: None,
            exclude: String::new(),
            exclude_prefix: String::new(),
            exclude_suffix: String::new(),
            backup_filename: None,
            backup_type: None,
            max_size: String::new(),
            follow_symlinks: follow_symlinks_default(),
        }
    }
}

fn follow_symlinks_default() -> bool {
    true
}

/// `[RemoteBackup]` section
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRemoteSection {
    #[serde(rename = "ENABLE", default)]
    pub enable: bool,
    #[serde(rename = "SERVER", default)]
    pub server: String,
    #[serde(rename = "REMOTE_USER", default)]
    pub user: String,
    #[serde(rename = "REMOTE_PATH", default)]
    pub path: String,
    #[serde(rename = "RSYNC_OPTIONS", default)]
    pub rsync_options: String,
    #[serde(rename = "PASSWORD", default)]
    pub password: String,
    /// Seconds, 0 meaning no limit
    #[serde(rename = "TIMEOUT", default)]
    pub timeout: u64,
}

impl fmt::Debug for RawRemoteSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRemoteSection")
            .field("enable", &self.enable)
            .field("server", &self.server)
            .field("user", &self.user)
            .field("path", &self.path)
            .field("rsync_options", &self.rsync_options)
            .field("password", &redacted(&self.password))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RawConfig {
    /// Read and parse a config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::config(format!("Config file not found: {}", path.display())));
        }

        debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Write the config file, creating its directory if needed
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        debug!("Config saved to {}", path.display());
        Ok(())
    }
}

/// Remote transfer settings
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub server: String,
    pub user: String,
    pub path: String,
    /// Extra rsync arguments, already split into words
    pub rsync_options: Vec<String>,
    pub password: String,
    pub timeout: Option<Duration>,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("enabled", &self.enabled)
            .field("server", &self.server)
            .field("user", &self.user)
            .field("path", &self.path)
            .field("rsync_options", &self.rsync_options)
            .field("password", &redacted(&self.password))
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "<redacted>"
    }
}

/// Validated configuration for one backup run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    pub base_folder: PathBuf,
    pub exclude: Vec<String>,
    pub exclude_prefix: Vec<String>,
    pub exclude_suffix: Vec<String>,
    /// Bytes, 0 meaning unlimited
    pub max_size: u64,
    /// Archive name before the format extension is appended
    pub backup_filename: String,
    pub format: ArchiveFormat,
    pub follow_symlinks: bool,
    pub remote: RemoteConfig,
}

impl BackupConfig {
    /// Load and validate a config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_raw(RawConfig::load(path)?)
    }

    /// Validate a parsed config file
    pub fn from_raw(raw: RawConfig) -> Result<Self> {
        let backup = raw.backup;

        let base_folder = required(backup.base_folder, "BASE_FOLDER")?;
        let backup_filename = required(backup.backup_filename, "BACKUP_FILENAME")?;
        let format: ArchiveFormat = required(backup.backup_type, "TYPE")?.parse()?;

        let max_size = match backup.max_size.trim() {
            "" => 0,
            value => parse_size(value)?,
        };

        let remote = RemoteConfig {
            enabled: raw.remote.enable,
            server: raw.remote.server.trim().to_string(),
            user: raw.remote.user.trim().to_string(),
            path: raw.remote.path.trim().to_string(),
            rsync_options: split_options(&raw.remote.rsync_options)?,
            password: raw.remote.password,
            timeout: (raw.remote.timeout > 0).then(|| Duration::from_secs(raw.remote.timeout)),
        };
        if remote.enabled {
            validate_remote(&remote)?;
        }

        Ok(Self {
            base_folder: PathBuf::from(base_folder),
            exclude: split_list(&backup.exclude),
            exclude_prefix: split_list(&backup.exclude_prefix),
            exclude_suffix: split_list(&backup.exclude_suffix),
            max_size,
            backup_filename,
            format,
            follow_symlinks: backup.follow_symlinks,
            remote,
        })
    }

    /// Name and size rules for the walker
    pub fn exclusion_rules(&self) -> ExclusionRules {
        ExclusionRules::new(
            self.exclude.iter().cloned(),
            &self.exclude_prefix,
            &self.exclude_suffix,
            self.max_size,
        )
    }

    /// Final archive path: `~` expanded, made absolute, extension appended
    pub fn output_path(&self) -> Result<PathBuf> {
        archive::output_path(&self.backup_filename, self.format)
    }
}

fn required(value: Option<String>, key: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::config(format!("missing required field {}", key)))
}

fn validate_remote(remote: &RemoteConfig) -> Result<()> {
    if remote.server.is_empty() {
        return Err(Error::config("remote backup enabled but SERVER is empty"));
    }
    if remote.path.is_empty() {
        return Err(Error::config("remote backup enabled but REMOTE_PATH is empty"));
    }
    if !remote.server.contains('@') && remote.user.is_empty() {
        return Err(Error::config(
            "remote backup enabled but neither REMOTE_USER nor SERVER names a user",
        ));
    }
    Ok(())
}

/// Split `RSYNC_OPTIONS` into words with shell quoting rules.
///
/// `-e "ssh -p 2222"` yields `["-e", "ssh -p 2222"]`. Nothing is expanded
/// and no shell is involved.
pub fn split_options(value: &str) -> Result<Vec<String>> {
    shell_words::split(value)
        .map_err(|e| Error::config(format!("RSYNC_OPTIONS {:?} cannot be parsed: {}", value, e)))
}

/// Split a comma-separated list, trimming items and dropping empty ones
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
