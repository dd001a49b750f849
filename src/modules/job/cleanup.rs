//! Guaranteed removal of a job's local files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::infrastructure::fs::workspace::LocalPaths;

#[derive(Debug, Error)]
#[error("failed to remove {}: {source}", .path.display())]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub already_absent: Vec<PathBuf>,
    pub failed: Vec<CleanupError>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, path: &Path, outcome: std::io::Result<()>) {
        match outcome {
            Ok(()) => self.removed.push(path.to_path_buf()),
            Err(e) if e.kind() == ErrorKind::NotFound => self.already_absent.push(path.to_path_buf()),
            Err(source) => self.failed.push(CleanupError {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Cleanup never fails a job; problems only reach the logs.
    pub fn log(&self) {
        for path in &self.removed {
            info!("Successfully deleted {}", path.display());
        }
        for path in &self.already_absent {
            debug!("Nothing to delete at {}", path.display());
        }
        if !self.is_clean() {
            for failure in &self.failed {
                error!("Cleanup failed, local file left behind: {}", failure);
            }
        }
    }
}

/// Owns a job's local files from the moment they may exist. Either
/// [`CleanupGuard::release`] removes them, or dropping the guard does.
#[must_use = "dropping the guard removes the job's files immediately"]
pub struct CleanupGuard {
    paths: Option<LocalPaths>,
}

impl CleanupGuard {
    pub fn arm(paths: LocalPaths) -> Self {
        Self { paths: Some(paths) }
    }

    /// Removes both files. Consumes the guard, so this runs at most once.
    pub async fn release(mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let Some(paths) = self.paths.take() else {
            return report;
        };

        let (raw, processed) = tokio::join!(
            tokio::fs::remove_file(&paths.raw),
            tokio::fs::remove_file(&paths.processed)
        );
        report.record(&paths.raw, raw);
        report.record(&paths.processed, processed);
        report
    }
}

impl Drop for CleanupGuard {
    // Reached when the job future is dropped mid-flight (cancelled or
    // unwinding from a panic) before release ran.
    fn drop(&mut self) {
        let Some(paths) = self.paths.take() else {
            return;
        };

        warn!("Job ended before cleanup ran, removing local files");
        let mut report = CleanupReport::default();
        for path in paths.iter() {
            report.record(path, std::fs::remove_file(path));
        }
        report.log();
    }
}
