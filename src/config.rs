use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{Result, MediaPressError};

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_preset() -> String {
    "medium".to_string()
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_channels() -> u32 {
    2
}

fn default_image_format() -> String {
    "jpg".to_string()
}

fn default_video_format() -> String {
    "mp4".to_string()
}

fn default_audio_format() -> String {
    "mp3".to_string()
}

fn default_percentage() -> u8 {
    50
}

fn default_true() -> bool {
    true
}

fn default_output_suffix() -> String {
    "_compressed".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to ffmpeg binary
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// Path to ffprobe binary
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Video codec used for video transcodes
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    /// Audio codec muxed alongside the video stream
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    /// Encoding speed preset (ultrafast, fast, medium, slow, veryslow)
    #[serde(default = "default_preset")]
    pub preset: String,
    /// Sample rate forced when extracting audio from video
    #[serde(default = "default_sample_rate")]
    pub extract_sample_rate: u32,
    /// Channel count forced when extracting audio from video
    #[serde(default = "default_channels")]
    pub extract_channels: u32,
    /// Kill a running encoder when the batch is cancelled instead of
    /// letting it finish
    #[serde(default)]
    pub terminate_on_cancel: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Output extension for image sources
    #[serde(default = "default_image_format")]
    pub image_format: String,
    /// Output extension for video sources (an audio extension extracts audio)
    #[serde(default = "default_video_format")]
    pub video_format: String,
    /// Output extension for audio sources
    #[serde(default = "default_audio_format")]
    pub audio_format: String,
    /// Target image size as a percentage of the original (5-100)
    #[serde(default = "default_percentage")]
    pub image_size_percentage: u8,
    /// Target video size as a percentage of the original (5-100)
    #[serde(default = "default_percentage")]
    pub video_size_percentage: u8,
    /// Audio bitrate in kbps (128, 256 or 320). When unset it follows
    /// `high_quality_audio`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<u32>,
    /// Use 256 kbps audio inside transcoded videos instead of 64 kbps
    #[serde(default = "default_true")]
    pub high_quality_audio: bool,
    /// Suffix appended to output file stems
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            preset: default_preset(),
            extract_sample_rate: default_sample_rate(),
            extract_channels: default_channels(),
            terminate_on_cancel: false,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            image_format: default_image_format(),
            video_format: default_video_format(),
            audio_format: default_audio_format(),
            image_size_percentage: default_percentage(),
            video_size_percentage: default_percentage(),
            audio_bitrate: None,
            high_quality_audio: true,
            output_suffix: default_output_suffix(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MediaPressError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| MediaPressError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| MediaPressError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| MediaPressError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}
