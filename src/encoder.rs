//! External encoder process control.
//!
//! The encoder is launched with `-progress pipe:1`, which makes it print
//! `key=value` records. Only `out_time_ms=<microseconds>` matters here; it is
//! turned into a completion fraction for the running job.

use std::collections::VecDeque;
use std::io;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::EncodeError;
use crate::media::MediaCommand;

const STDERR_TAIL_LINES: usize = 20;
const PROGRESS_KEY: &str = "out_time_ms=";

/// Receives per-job progress from an encode
pub trait ProgressSink: Send + Sync {
    /// Completion fraction in `[0, 1]`, never decreasing within a job
    fn progress(&self, fraction: f64);

    /// Non-fatal problem worth showing to the user
    fn warning(&self, _message: &str) {}
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn progress(&self, fraction: f64) {
        self(fraction)
    }
}

/// One line of encoder output, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressLine {
    /// `out_time_ms=` with an integer payload (microseconds)
    OutTime(i64),
    /// `out_time_ms=` with anything else, e.g. `N/A`
    Malformed(String),
    Other,
}

pub fn parse_progress_line(line: &str) -> ProgressLine {
    match line.trim().strip_prefix(PROGRESS_KEY) {
        Some(value) => match value.trim().parse::<i64>() {
            Ok(micros) => ProgressLine::OutTime(micros),
            Err(_) => ProgressLine::Malformed(value.trim().to_string()),
        },
        None => ProgressLine::Other,
    }
}

/// Converts encoded time into a bounded, non-decreasing fraction
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    duration_seconds: Option<f64>,
    last: f64,
}

impl ProgressTracker {
    pub fn new(duration_seconds: Option<f64>) -> Self {
        Self {
            duration_seconds: duration_seconds.filter(|d| *d > 0.0),
            last: 0.0,
        }
    }

    /// Returns the fraction to report, or `None` when the duration is unknown
    pub fn update(&mut self, out_time_micros: i64) -> Option<f64> {
        let duration = self.duration_seconds?;
        let fraction = (out_time_micros as f64 / (duration * 1_000_000.0)).clamp(0.0, 1.0);
        self.last = self.last.max(fraction);
        Some(self.last)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderExit {
    Ok,
    /// Non-zero exit; `None` when terminated by a signal
    Failed(Option<i32>),
}

impl EncoderExit {
    pub fn is_ok(&self) -> bool {
        matches!(self, EncoderExit::Ok)
    }
}

/// Runs encoder processes and follows their progress stream
#[derive(Debug, Clone, Default)]
pub struct EncoderController {
    terminate_on_cancel: bool,
}

impl EncoderController {
    pub fn new(terminate_on_cancel: bool) -> Self {
        Self { terminate_on_cancel }
    }

    /// Run `command` and report progress against `duration_seconds`
    pub async fn run(
        &self,
        command: &MediaCommand,
        duration_seconds: f64,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<EncoderExit, EncodeError> {
        debug!("Executing encoder: {} {:?}", command.binary_path, command.args);

        let mut child = command.to_process().spawn().map_err(|source| EncodeError::Spawn {
            program: command.binary_path.clone(),
            source,
        })?;

        let stdout = child.stdout.take().ok_or_else(|| not_captured("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| not_captured("stderr"))?;
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_open = true;
        let mut stderr_open = true;

        let mut tracker = ProgressTracker::new(Some(duration_seconds));
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        while stdout_open || stderr_open {
            tokio::select! {
                line = stdout_lines.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => handle_line(&line, &mut tracker, progress),
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        warn!("Failed to read encoder stdout: {}", e);
                        stdout_open = false;
                    }
                },
                line = stderr_lines.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => {
                        if stderr_tail.len() == STDERR_TAIL_LINES {
                            stderr_tail.pop_front();
                        }
                        stderr_tail.push_back(line.clone());
                        handle_line(&line, &mut tracker, progress);
                    }
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        warn!("Failed to read encoder stderr: {}", e);
                        stderr_open = false;
                    }
                },
                _ = cancel.cancelled(), if self.terminate_on_cancel => {
                    info!("Cancellation requested, terminating {}", command.description);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to terminate encoder: {}", e);
                    }
                    return Err(EncodeError::Cancelled);
                }
            }
        }

        let status = child.wait().await?;
        if status.success() {
            debug!("{} finished", command.description);
            Ok(EncoderExit::Ok)
        } else {
            warn!(
                "{} exited with {}; last output:\n{}",
                command.description,
                status,
                stderr_tail.iter().cloned().collect::<Vec<_>>().join("\n")
            );
            Ok(EncoderExit::Failed(status.code()))
        }
    }
}

fn not_captured(stream: &str) -> EncodeError {
    EncodeError::Io(io::Error::other(format!("encoder {} was not captured", stream)))
}

fn handle_line(line: &str, tracker: &mut ProgressTracker, progress: &dyn ProgressSink) {
    match parse_progress_line(line) {
        ProgressLine::OutTime(micros) => {
            if let Some(fraction) = tracker.update(micros) {
                progress.progress(fraction);
            }
        }
        ProgressLine::Malformed(value) => {
            let message = format!(
                "Non-integer out_time_ms encountered: '{}' in line: {}",
                value,
                line.trim()
            );
            warn!("{}", message);
            progress.warning(&message);
        }
        ProgressLine::Other => trace!("encoder: {}", line),
    }
}
