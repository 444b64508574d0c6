use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::error::ProbeError;
use crate::media::{MediaCommandBuilder, display_name};

/// What the encoder needs to know about a source before planning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub duration_seconds: f64,
    pub original_size_bytes: u64,
}

// Subset of `ffprobe -show_format -print_format json`
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
}

/// Inspects media files for duration and size
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError>;
}

/// ffprobe-backed prober
pub struct FfprobeProber {
    commands: MediaCommandBuilder,
}

impl FfprobeProber {
    pub fn new(commands: MediaCommandBuilder) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError> {
        let file = display_name(path);
        let tool_failure = |reason: String| ProbeError::ToolFailure {
            file: file.clone(),
            reason,
        };

        let output = self
            .commands
            .probe_format(path)
            .capture()
            .await
            .map_err(|e| tool_failure(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(tool_failure(stderr.trim().to_string()));
        }

        let duration_seconds = parse_duration(&file, &output.stdout)?;

        let original_size_bytes = tokio::fs::metadata(path)
            .await
            .map_err(|e| tool_failure(format!("cannot read file size: {}", e)))?
            .len();

        debug!(
            "Probed {}: {:.3}s, {} bytes",
            file, duration_seconds, original_size_bytes
        );

        Ok(ProbeResult {
            duration_seconds,
            original_size_bytes,
        })
    }
}

/// Extract a positive duration from ffprobe JSON output
pub fn parse_duration(file: &str, json: &[u8]) -> Result<f64, ProbeError> {
    let parsed: FfprobeOutput =
        serde_json::from_slice(json).map_err(|e| ProbeError::ToolFailure {
            file: file.to_string(),
            reason: format!("unparseable probe output: {}", e),
        })?;

    let raw = parsed
        .format
        .and_then(|format| format.duration)
        .filter(|value| value.trim() != "N/A")
        .ok_or_else(|| ProbeError::MissingDuration {
            file: file.to_string(),
        })?;

    let invalid = || ProbeError::InvalidDuration {
        file: file.to_string(),
        value: raw.clone(),
    };

    let duration: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if !duration.is_finite() || duration <= 0.0 {
        return Err(invalid());
    }

    Ok(duration)
}
