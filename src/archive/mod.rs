//! Archive creation from a scanned file list.
//!
//! Two backends are available, a deflate zip and a gzip-compressed tar. Both
//! store each file under its path relative to the base directory and consume
//! the file list in the order the walker produced it.

mod progress;
mod tarball;
mod zipfile;

use crate::walker::FileEntry;
use crate::{Error, Result};
use progress::Progress;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, span, warn, Level};

/// Supported archive containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// Deflate-compressed zip
    Zip,
    /// Gzip-compressed tar
    Tar,
}

impl ArchiveFormat {
    /// Extension appended to the configured file name
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArchiveFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "zip" => Ok(ArchiveFormat::Zip),
            "tar" => Ok(ArchiveFormat::Tar),
            _ => Err(Error::UnsupportedFormat {
                format: s.to_string(),
            }),
        }
    }
}

/// Container-specific writing, one implementation per format
trait ArchiveBackend {
    /// Append one file, returning the number of bytes read from it
    fn append(&mut self, entry: &FileEntry) -> Result<u64>;

    /// Write trailing structures and flush everything to disk
    fn finish(self: Box<Self>) -> Result<()>;
}

fn open_backend(format: ArchiveFormat, file: File) -> Box<dyn ArchiveBackend> {
    match format {
        ArchiveFormat::Zip => Box::new(zipfile::ZipBackend::new(file)),
        ArchiveFormat::Tar => Box::new(tarball::TarBackend::new(file)),
    }
}

/// A single archive to produce
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    /// Final location of the archive
    pub output: PathBuf,
    pub format: ArchiveFormat,
    /// Files in walker order
    pub files: Vec<FileEntry>,
}

/// Outcome of a successful archive write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub format: ArchiveFormat,
    pub files: usize,
    /// Bytes read from the source files
    pub bytes_read: u64,
    /// Size of the finished archive
    pub archive_size: u64,
    /// Hex SHA-256 of the finished archive
    pub sha256: String,
}

impl ArchiveJob {
    pub fn new(output: PathBuf, format: ArchiveFormat, files: Vec<FileEntry>) -> Self {
        Self {
            output,
            format,
            files,
        }
    }

    /// Write the archive.
    ///
    /// Data goes to `<output>.partial` first and is renamed into place once
    /// the container is complete. The first I/O error abandons the job: no
    /// further files are written and the partial file is removed.
    pub fn write(&self) -> Result<ArchiveSummary> {
        let span = span!(Level::INFO, "archive", format = %self.format);
        let _enter = span.enter();

        info!(
            "Creating {} backup {} with {} files",
            self.format.extension().to_uppercase(),
            self.output.display(),
            self.files.len()
        );

        let partial = partial_path(&self.output);
        let bytes_read = match self.write_to(&partial) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("An error occurred while writing {}: {}", self.output.display(), e);
                discard_partial(&partial);
                return Err(Error::Archive {
                    path: self.output.clone(),
                    source: Box::new(e),
                });
            }
        };

        fs::rename(&partial, &self.output).map_err(|e| {
            discard_partial(&partial);
            Error::Archive {
                path: self.output.clone(),
                source: Box::new(e.into()),
            }
        })?;

        let archive_size = fs::metadata(&self.output)?.len();
        let sha256 = sha256_file(&self.output)?;

        info!("Successfully created {} file: {}", self.format, self.output.display());
        info!("Archive size {} bytes, sha256 {}", archive_size, sha256);

        Ok(ArchiveSummary {
            path: self.output.clone(),
            format: self.format,
            files: self.files.len(),
            bytes_read,
            archive_size,
            sha256,
        })
    }

    fn write_to(&self, path: &Path) -> Result<u64> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;
        let mut backend = open_backend(self.format, file);
        let mut progress = Progress::new(self.files.len());

        for entry in &self.files {
            let bytes = backend.append(entry)?;
            progress.record(entry, bytes);
        }

        backend.finish()?;
        progress.complete();
        Ok(progress.bytes())
    }
}

/// Resolve the configured archive name into the final output path.
///
/// A leading `~` or `~user` is expanded to that home directory, a relative
/// result is joined to the current directory, and the format extension is
/// appended (`backup.2024` becomes `backup.2024.zip`). An unknown user leaves
/// the name as written.
pub fn output_path(stem: &str, format: ArchiveFormat) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    Ok(resolve_output_path(stem, format, home_dir_of, &cwd))
}

/// Home directory of `user`, or of the current user for `None`
fn home_dir_of(user: Option<&str>) -> Option<PathBuf> {
    match user {
        None => dirs::home_dir(),
        Some(name) => user_home(name),
    }
}

#[cfg(unix)]
fn user_home(name: &str) -> Option<PathBuf> {
    nix::unistd::User::from_name(name)
        .ok()
        .flatten()
        .map(|user| user.dir)
}

#[cfg(not(unix))]
fn user_home(_name: &str) -> Option<PathBuf> {
    None
}

fn resolve_output_path<F>(stem: &str, format: ArchiveFormat, home_of: F, cwd: &Path) -> PathBuf
where
    F: Fn(Option<&str>) -> Option<PathBuf>,
{
    let expanded = match stem.strip_prefix('~') {
        Some(rest) => {
            let (user, tail) = rest.split_once('/').unwrap_or((rest, ""));
            match home_of((!user.is_empty()).then_some(user)) {
                Some(home) if tail.is_empty() => home,
                Some(home) => home.join(tail.trim_start_matches('/')),
                None => PathBuf::from(stem),
            }
        }
        None => PathBuf::from(stem),
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };

    let mut name = absolute.into_os_string();
    name.push(".");
    name.push(format.extension());
    PathBuf::from(name)
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

fn discard_partial(partial: &Path) {
    match fs::remove_file(partial) {
        Ok(()) => warn!("Removed incomplete archive {}", partial.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove incomplete archive {}: {}", partial.display(), e),
    }
}

/// Hex-encoded SHA-256 of a file
pub fn sha256_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();

    io::copy(&mut file, &mut hasher)?;

    Ok(hex::encode(hasher.finalize()))
}
