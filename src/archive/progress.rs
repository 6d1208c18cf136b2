//! Per-file progress reporting while an archive is written

use crate::size::format_size;
use crate::walker::FileEntry;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Summary lines are logged roughly every tenth of the job
const REPORT_STEPS: usize = 10;

#[derive(Debug)]
pub(crate) struct Progress {
    total: usize,
    done: usize,
    bytes: u64,
    started: Instant,
    step: usize,
    next_report: usize,
}

impl Progress {
    pub(crate) fn new(total: usize) -> Self {
        let step = (total / REPORT_STEPS).max(1);
        Self {
            total,
            done: 0,
            bytes: 0,
            started: Instant::now(),
            step,
            next_report: step,
        }
    }

    pub(crate) fn record(&mut self, entry: &FileEntry, bytes: u64) {
        self.done += 1;
        self.bytes += bytes;

        debug!(
            "[{}/{}] {} ({})",
            self.done,
            self.total,
            entry.archive_name(),
            format_size(bytes)
        );

        if self.done >= self.next_report && self.done < self.total {
            info!(
                "Processed {}/{} files, {} at {}/s",
                self.done,
                self.total,
                format_size(self.bytes),
                format_size(self.throughput())
            );
            self.next_report += self.step;
        }
    }

    pub(crate) fn complete(&self) {
        info!(
            "Processed {} files, {} in {:.1}s ({}/s)",
            self.done,
            format_size(self.bytes),
            self.elapsed().as_secs_f64(),
            format_size(self.throughput())
        );
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Bytes per second since the job started
    fn throughput(&self) -> u64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            (self.bytes as f64 / secs) as u64
        } else {
            self.bytes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_counts_files_and_bytes() {
        let base = Path::new("/base");
        let entry = FileEntry::new(base, PathBuf::from("/base/a.txt"), 10).unwrap();

        let mut progress = Progress::new(25);
        assert_eq!(progress.step, 2);

        for _ in 0..5 {
            progress.record(&entry, 10);
        }

        assert_eq!(progress.done, 5);
        assert_eq!(progress.bytes(), 50);
        assert_eq!(progress.next_report, 6);
    }

    #[test]
    fn test_small_jobs_report_every_file() {
        assert_eq!(Progress::new(0).step, 1);
        assert_eq!(Progress::new(3).step, 1);
    }
}
