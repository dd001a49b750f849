use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

pub mod ffmpeg;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder exited unsuccessfully (code {exit_code:?}): {stderr}")]
    Failed { exit_code: Option<i32>, stderr: String },

    #[error("encoder timed out after {0} seconds")]
    Timeout(u64),

    #[error("output missing post-completion: {}", .0.display())]
    OutputMissing(PathBuf),

    #[error("encoder io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One progress report from a running encode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscodeProgress {
    pub frame: u64,
    pub out_time: Duration,
    pub speed: Option<f64>,
    /// Only known once the encoder has reported the input duration.
    pub percent: Option<f64>,
    pub done: bool,
}

/// Side channel for progress reports. Observers cannot influence the encode.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &TranscodeProgress);
}

/// Logs `Processing: N% done` for every report with a known percentage.
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&self, progress: &TranscodeProgress) {
        match progress.percent {
            Some(percent) => info!("Processing: {:.1}% done", percent),
            None => debug!(
                "Processing: frame {} at {:.1}s (speed {:?})",
                progress.frame,
                progress.out_time.as_secs_f64(),
                progress.speed
            ),
        }
        if progress.done {
            debug!("Encoder reached end of stream");
        }
    }
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Renders `input` into `output` scaled to `target_height` lines, width
    /// following the aspect ratio. Resolves once, with the output file
    /// guaranteed to exist on success.
    async fn convert(&self, input: &Path, output: &Path, target_height: u32) -> Result<(), TranscodeError>;
}
