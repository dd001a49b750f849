//! `ffmpeg` driven as a child process.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use super::{LogProgress, ProgressObserver, TranscodeError, TranscodeProgress, Transcoder};
use crate::config::settings::TranscodeConfig;

const STDERR_TAIL_LINES: usize = 20;

/// Argument builder for a single-input, single-output ffmpeg run.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
        }
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Fixed height, width derived from the aspect ratio.
    pub fn scale_to_height(self, height: u32) -> Self {
        self.video_filter(format!("scale=-1:{height}"))
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-nostats", "-progress", "pipe:1", "-i"]
            .into_iter()
            .map(String::from)
            .collect();
        args.push(self.input.to_string_lossy().into_owned());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

pub struct FfmpegTranscoder {
    ffmpeg_bin: PathBuf,
    timeout: Option<Duration>,
    observer: Arc<dyn ProgressObserver>,
}

impl FfmpegTranscoder {
    pub fn new(config: &TranscodeConfig) -> Self {
        Self {
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            timeout: config.timeout,
            observer: Arc::new(LogProgress),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Pumps stdout (progress) and stderr (diagnostics) until both close,
    /// then reaps the child.
    async fn drive(&self, child: &mut Child) -> Result<(ExitStatus, Vec<String>), TranscodeError> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("encoder stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("encoder stderr not captured"))?;

        let mut progress_lines = BufReader::new(stdout).split(b'\n');
        let mut diagnostic_lines = BufReader::new(stderr).split(b'\n');
        let mut tracker = ProgressTracker::default();
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let (mut stdout_open, mut stderr_open) = (true, true);

        while stdout_open || stderr_open {
            // Diagnostics first: the input duration must be known before
            // progress lines can be turned into percentages.
            tokio::select! {
                biased;

                segment = diagnostic_lines.next_segment(), if stderr_open => match segment? {
                    Some(raw) => {
                        let line = String::from_utf8_lossy(&raw).trim_end().to_string();
                        tracker.observe_diagnostic(&line);
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                    None => stderr_open = false,
                },
                segment = progress_lines.next_segment(), if stdout_open => match segment? {
                    Some(raw) => {
                        if let Some(progress) = tracker.ingest(&String::from_utf8_lossy(&raw)) {
                            self.observer.on_progress(&progress);
                        }
                    }
                    None => stdout_open = false,
                },
            }
        }

        let status = child.wait().await?;
        Ok((status, tail.into()))
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(&self, input: &Path, output: &Path, target_height: u32) -> Result<(), TranscodeError> {
        let args = FfmpegCommand::new(input, output)
            .scale_to_height(target_height)
            .build_args();
        debug!("Running {} {}", self.ffmpeg_bin.display(), args.join(" "));

        let mut child = Command::new(&self.ffmpeg_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                program: self.ffmpeg_bin.clone(),
                source,
            })?;

        info!("🎥 Video processing started: {}", input.display());

        let (status, stderr_tail) = match self.timeout {
            Some(limit) => {
                let outcome = tokio::time::timeout(limit, self.drive(&mut child)).await;
                match outcome {
                    Ok(result) => result?,
                    Err(_) => {
                        warn!("Encoder timed out after {}s, killing it", limit.as_secs());
                        if let Err(e) = child.kill().await {
                            warn!("Failed to kill timed out encoder: {}", e);
                        }
                        return Err(TranscodeError::Timeout(limit.as_secs()));
                    }
                }
            }
            None => self.drive(&mut child).await?,
        };

        if !status.success() {
            error!("Encoder failed with {}", status);
            return Err(TranscodeError::Failed {
                exit_code: status.code(),
                stderr: stderr_tail.join("\n"),
            });
        }

        // Some encoder versions report success without writing anything.
        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(TranscodeError::OutputMissing(output.to_path_buf())),
        }

        info!("Video processing completed: {}", output.display());
        Ok(())
    }
}

/// Folds ffmpeg's `-progress` key/value stream into [`TranscodeProgress`]
/// reports, one per `progress=` line.
#[derive(Debug, Default)]
struct ProgressTracker {
    total: Option<Duration>,
    current: TranscodeProgress,
}

impl ProgressTracker {
    fn observe_diagnostic(&mut self, line: &str) {
        if self.total.is_none() {
            self.total = parse_duration_line(line).filter(|d| !d.is_zero());
        }
    }

    fn ingest(&mut self, line: &str) -> Option<TranscodeProgress> {
        let (key, value) = line.trim().split_once('=')?;

        match key {
            // out_time_ms is microseconds as well, despite its name
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<u64>() {
                    self.current.out_time = Duration::from_micros(us);
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.current.frame = frame;
                }
            }
            "speed" => {
                self.current.speed = value.strip_suffix('x').and_then(|s| s.trim().parse().ok());
            }
            "progress" => {
                self.current.done = value == "end";
                self.current.percent = self.total.map(|total| {
                    if self.current.done {
                        100.0
                    } else {
                        (self.current.out_time.as_secs_f64() / total.as_secs_f64() * 100.0).min(100.0)
                    }
                });
                return Some(self.current.clone());
            }
            _ => {}
        }

        None
    }
}

/// Extracts the input duration from a line like
/// `  Duration: 00:01:02.50, start: 0.000000, bitrate: 1205 kb/s`.
fn parse_duration_line(line: &str) -> Option<Duration> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    let clock = rest.split(',').next()?.trim();
    parse_clock(clock)
}

fn parse_clock(clock: &str) -> Option<Duration> {
    let mut parts = clock.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let whole = hours.checked_mul(3600)?.checked_add(minutes.checked_mul(60)?)?;
    Duration::from_secs(whole).checked_add(Duration::try_from_secs_f64(seconds).ok()?)
}
