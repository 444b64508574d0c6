use tracing::{debug, info};

use crate::config::ToolsConfig;
use crate::error::{MediaPressError, Result};
use crate::media::MediaCommandBuilder;

/// Startup check for the external encoder and probe tools
pub struct ToolChecker {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl ToolChecker {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            ffmpeg_path: tools.ffmpeg_path.clone(),
            ffprobe_path: tools.ffprobe_path.clone(),
        }
    }

    /// Fail unless both ffmpeg and ffprobe answer `-version`
    pub async fn ensure_available(&self) -> Result<()> {
        info!("Checking media tools...");

        for (name, path) in [("FFmpeg", &self.ffmpeg_path), ("FFprobe", &self.ffprobe_path)] {
            let version = Self::check_tool(path)
                .await
                .map_err(|_| MediaPressError::ToolMissing(name.to_string()))?;
            info!("{} found: {}", name, version);
        }

        Ok(())
    }

    /// First line of `<tool> -version`
    async fn check_tool(path: &str) -> Result<String> {
        let output = MediaCommandBuilder::version_check(path)
            .capture()
            .await
            .map_err(|e| MediaPressError::Tool(format!("{} not found: {}", path, e)))?;

        if !output.status.success() {
            return Err(MediaPressError::Tool(format!("{} version check failed", path)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = stdout.lines().next().unwrap_or_default().trim().to_string();
        debug!("{} -version: {}", path, version);
        Ok(version)
    }
}
