//! Directory traversal producing the list of files to back up.
//!
//! The walk uses walkdir's explicit directory stack rather than recursion, so
//! deep trees cannot exhaust the call stack. Errors are handled per directory:
//! a subtree that cannot be listed is logged and skipped while the rest of the
//! tree is still scanned.

use crate::filter::ExclusionRules;
use serde::Serialize;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, span, warn, Level};
use walkdir::WalkDir;

/// A regular file selected for backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    path: PathBuf,
    relative_path: PathBuf,
    size: u64,
}

impl FileEntry {
    /// Create an entry for `path` below `base`.
    ///
    /// Returns `None` when `path` is not a strict descendant of `base` or its
    /// relative form contains anything but plain name components.
    pub fn new(base: &Path, path: PathBuf, size: u64) -> Option<Self> {
        let relative_path = path.strip_prefix(base).ok()?.to_path_buf();

        let is_contained = relative_path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if relative_path.as_os_str().is_empty() || !is_contained {
            return None;
        }

        Some(Self {
            path,
            relative_path,
            size,
        })
    }

    /// Location of the file on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location relative to the base directory
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Size in bytes observed during the scan
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Relative path with `/` separators, as stored inside archives
    pub fn archive_name(&self) -> String {
        self.relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Counters collected during a walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    /// Directories descended into, the base directory included
    pub directories: usize,
    /// Files accepted for backup
    pub files: usize,
    /// Total size of accepted files
    pub total_bytes: u64,
    /// Entries left out by name or size rules
    pub excluded: usize,
    /// Entries that are neither regular files nor directories
    pub skipped: usize,
    /// Entries or subtrees dropped because of an error
    pub errors: usize,
}

/// Files selected by a walk, in discovery order
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    pub files: Vec<FileEntry>,
    pub stats: WalkStats,
}

/// Walks a base directory and applies exclusion rules
#[derive(Debug)]
pub struct TreeWalker<'a> {
    base: PathBuf,
    rules: &'a ExclusionRules,
    follow_symlinks: bool,
}

impl<'a> TreeWalker<'a> {
    pub fn new<P: AsRef<Path>>(base: P, rules: &'a ExclusionRules) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
            rules,
            follow_symlinks: true,
        }
    }

    /// Whether to follow symbolic links (the default) or skip them. Link
    /// cycles are reported as per-entry errors.
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Scan the tree and return the accepted files.
    ///
    /// Files come back depth-first in the order the filesystem lists them;
    /// the order is not sorted.
    pub fn walk(&self) -> ScanResult {
        let span = span!(Level::INFO, "walk", base = %self.base.display());
        let _enter = span.enter();

        let mut result = ScanResult::default();
        let mut entries = WalkDir::new(&self.base)
            .follow_links(self.follow_symlinks)
            .into_iter();

        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.report_error(&e);
                    result.stats.errors += 1;
                    continue;
                }
            };

            let file_type = entry.file_type();

            // The base directory itself is never matched against the rules
            if entry.depth() == 0 {
                if file_type.is_dir() {
                    result.stats.directories += 1;
                }
                continue;
            }

            let path = entry.path();
            let name = entry.file_name().to_string_lossy();

            if let Some(reason) = self.rules.should_exclude(&name) {
                info!("Excluding {} ({})", path.display(), reason);
                result.stats.excluded += 1;
                if file_type.is_dir() {
                    entries.skip_current_dir();
                }
                continue;
            }

            if file_type.is_dir() {
                debug!("Entering directory {}", path.display());
                result.stats.directories += 1;
                continue;
            }

            if file_type.is_symlink() {
                info!("Skipping symbolic link {}", path.display());
                result.stats.skipped += 1;
                continue;
            }

            if !file_type.is_file() {
                debug!("Skipping {} (not a regular file)", path.display());
                result.stats.skipped += 1;
                continue;
            }

            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    self.report_error(&e);
                    result.stats.errors += 1;
                    continue;
                }
            };

            if let Some(reason) = self.rules.check_size(size) {
                info!("Excluding {} ({})", path.display(), reason);
                result.stats.excluded += 1;
                continue;
            }

            match FileEntry::new(&self.base, path.to_path_buf(), size) {
                Some(file) => {
                    result.stats.files += 1;
                    result.stats.total_bytes += size;
                    result.files.push(file);
                }
                None => {
                    warn!("Skipping {} (outside of {})", path.display(), self.base.display());
                    result.stats.skipped += 1;
                }
            }
        }

        info!(
            "Scan completed: {} files ({} bytes), {} excluded, {} errors",
            result.stats.files, result.stats.total_bytes, result.stats.excluded, result.stats.errors
        );

        result
    }

    fn report_error(&self, error: &walkdir::Error) {
        let path = error
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| self.base.display().to_string());

        if let Some(ancestor) = error.loop_ancestor() {
            warn!("Skipping {} (symlink loop back to {})", path, ancestor.display());
            return;
        }

        match error.io_error().map(io::Error::kind) {
            Some(io::ErrorKind::PermissionDenied) => warn!(" - [Permission Denied] {}", path),
            Some(io::ErrorKind::NotFound) => warn!("Directory not found: {}", path),
            _ => warn!("An error occurred while scanning {}: {}", path, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn relative_names(result: &ScanResult) -> Vec<String> {
        let mut names: Vec<_> = result.files.iter().map(FileEntry::archive_name).collect();
        names.sort();
        names
    }

    fn sample_tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("docs/drafts")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("readme.md"), b"hello").unwrap();
        fs::write(root.join("docs/report.txt"), b"report").unwrap();
        fs::write(root.join("docs/drafts/draft.TMP"), b"draft").unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), b"js").unwrap();
        temp_dir
    }

    #[test]
    fn test_walk_collects_all_files() {
        let tree = sample_tree();
        let rules = ExclusionRules::default();
        let result = TreeWalker::new(tree.path(), &rules).walk();

        assert_eq!(
            relative_names(&result),
            vec![
                "docs/drafts/draft.TMP",
                "docs/report.txt",
                "node_modules/pkg/index.js",
                "readme.md",
            ]
        );
        assert_eq!(result.stats.files, 4);
        assert_eq!(result.stats.directories, 5);
        assert_eq!(result.stats.total_bytes, 5 + 6 + 5 + 2);
    }

    #[test]
    fn test_excluded_directory_is_pruned() {
        let tree = sample_tree();
        let rules = ExclusionRules::new(["node_modules"], Vec::<String>::new(), [".tmp"], 0);
        let result = TreeWalker::new(tree.path(), &rules).walk();

        assert_eq!(relative_names(&result), vec!["docs/report.txt", "readme.md"]);
        assert_eq!(result.stats.excluded, 2);
    }

    #[test]
    fn test_base_directory_name_is_not_matched() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("skipme");
        fs::create_dir(&base).unwrap();
        fs::write(base.join("kept.txt"), b"x").unwrap();

        let rules = ExclusionRules::new(["skipme"], Vec::<String>::new(), Vec::<String>::new(), 0);
        let result = TreeWalker::new(&base, &rules).walk();

        assert_eq!(relative_names(&result), vec!["kept.txt"]);
    }

    #[test]
    fn test_size_limit_applies_to_files_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("small.txt"), vec![0u8; 10]).unwrap();
        fs::write(root.join("exact.bin"), vec![0u8; 100]).unwrap();
        fs::write(root.join("sub/large.bin"), vec![0u8; 101]).unwrap();

        let rules = ExclusionRules::new(Vec::<String>::new(), Vec::<String>::new(), Vec::<String>::new(), 100);
        let result = TreeWalker::new(root, &rules).walk();

        assert_eq!(relative_names(&result), vec!["exact.bin", "small.txt"]);
        assert_eq!(result.stats.excluded, 1);
    }

    #[test]
    fn test_directories_are_never_yielded() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("a/b/c")).unwrap();

        let rules = ExclusionRules::default();
        let result = TreeWalker::new(temp_dir.path(), &rules).walk();

        assert!(result.files.is_empty());
        assert_eq!(result.stats.directories, 4);
    }

    #[test]
    fn test_deep_tree_does_not_recurse() {
        let temp_dir = TempDir::new().unwrap();
        let mut dir = temp_dir.path().to_path_buf();
        for i in 0..200 {
            dir.push(format!("d{}", i % 10));
        }
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("leaf.txt"), b"leaf").unwrap();

        let rules = ExclusionRules::default();
        let result = TreeWalker::new(temp_dir.path(), &rules).walk();

        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].relative_path().components().count(), 201);
    }

    #[test]
    fn test_missing_base_is_reported_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let rules = ExclusionRules::default();
        let result = TreeWalker::new(temp_dir.path().join("absent"), &rules).walk();

        assert!(result.files.is_empty());
        assert_eq!(result.stats.errors, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_followed_by_default() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("real")).unwrap();
        fs::write(root.join("real/file.txt"), b"data").unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("link")).unwrap();

        let rules = ExclusionRules::default();
        let result = TreeWalker::new(root, &rules).walk();
        assert_eq!(relative_names(&result), vec!["link/file.txt", "real/file.txt"]);
        assert_eq!(result.stats.skipped, 0);

        let skipped = TreeWalker::new(root, &rules).follow_symlinks(false).walk();
        assert_eq!(relative_names(&skipped), vec!["real/file.txt"]);
        assert_eq!(skipped.stats.skipped, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_link_pointing_outside_base_is_archived() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("base");
        fs::create_dir(&base).unwrap();
        fs::write(temp_dir.path().join("outside.txt"), b"linked data").unwrap();
        std::os::unix::fs::symlink("../outside.txt", base.join("link.txt")).unwrap();

        let rules = ExclusionRules::default();
        let result = TreeWalker::new(&base, &rules).walk();

        assert_eq!(relative_names(&result), vec!["link.txt"]);
        assert_eq!(result.files[0].size(), 11);
        assert_eq!(result.stats.skipped, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("dir")).unwrap();
        fs::write(root.join("dir/file.txt"), b"data").unwrap();
        std::os::unix::fs::symlink(root, root.join("dir/back")).unwrap();

        let rules = ExclusionRules::default();
        let result = TreeWalker::new(root, &rules).follow_symlinks(true).walk();

        assert_eq!(relative_names(&result), vec!["dir/file.txt"]);
        assert_eq!(result.stats.errors, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let locked = root.join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("hidden.txt"), b"secret").unwrap();
        fs::write(root.join("visible.txt"), b"public").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can still list the directory
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let rules = ExclusionRules::default();
        let result = TreeWalker::new(root, &rules).walk();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(relative_names(&result), vec!["visible.txt"]);
        assert_eq!(result.stats.errors, 1);
    }

    #[test]
    fn test_file_entry_rejects_escaping_paths() {
        let base = Path::new("/data/base");
        assert!(FileEntry::new(base, PathBuf::from("/data/other/file"), 1).is_none());
        assert!(FileEntry::new(base, PathBuf::from("/data/base"), 1).is_none());
        assert!(FileEntry::new(base, PathBuf::from("/data/base/../secret"), 1).is_none());

        let entry = FileEntry::new(base, PathBuf::from("/data/base/a/b.txt"), 3).unwrap();
        assert_eq!(entry.relative_path(), Path::new("a/b.txt"));
        assert_eq!(entry.archive_name(), "a/b.txt");
        assert_eq!(entry.size(), 3);
    }
}
