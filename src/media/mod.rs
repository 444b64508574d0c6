// Media model and per-kind transcoding
//
// - mod: job/option types and the format tables
// - commands: encoder/probe command builders
// - image: in-process still image encoding
// - processor: dispatch of a job to the right encode path

pub mod commands;
pub mod image;
pub mod processor;

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

pub use commands::*;
pub use processor::*;

use crate::encoder::ProgressSink;
use crate::error::{MediaPressError, Result, TranscodeError};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a"];

/// Lower-cased extension of a path, if any
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Base name used in user-facing messages
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    /// Classify a source file by its extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = extension_of(path)?;
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }

    pub fn is_supported(path: &Path) -> bool {
        Self::from_path(path).is_some()
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
}

impl ImageFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "webp" => Some(ImageFormat::WebP),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoContainer {
    Mp4,
    Mkv,
    Avi,
    Mov,
}

impl VideoContainer {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" => Some(VideoContainer::Mp4),
            "mkv" => Some(VideoContainer::Mkv),
            "avi" => Some(VideoContainer::Avi),
            "mov" => Some(VideoContainer::Mov),
            _ => None,
        }
    }

    /// ffmpeg muxer name passed to `-f`
    pub fn muxer(&self) -> &'static str {
        match self {
            VideoContainer::Mp4 => "mp4",
            VideoContainer::Mkv => "matroska",
            VideoContainer::Avi => "avi",
            VideoContainer::Mov => "mov",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
    Flac,
    Aac,
    Ogg,
    M4a,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "wav" => Some(AudioFormat::Wav),
            "flac" => Some(AudioFormat::Flac),
            "aac" => Some(AudioFormat::Aac),
            "ogg" => Some(AudioFormat::Ogg),
            "m4a" => Some(AudioFormat::M4a),
            _ => None,
        }
    }

    /// ffmpeg muxer name passed to `-f`
    pub fn muxer(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Aac => "adts",
            AudioFormat::Ogg => "ogg",
            AudioFormat::M4a => "ipod",
        }
    }

    /// Audio codec for this container. Containers that dictate their own
    /// sample format get it, everything else gets the generic lossy codec.
    pub fn codec(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "libmp3lame",
            AudioFormat::Wav => "pcm_s16le",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "libvorbis",
            AudioFormat::Aac | AudioFormat::M4a => "aac",
        }
    }
}

/// Target size as a percentage of the original, 5 to 100 inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Percentage(u8);

impl Percentage {
    pub const MIN: u8 = 5;
    pub const MAX: u8 = 100;

    pub fn new(value: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(MediaPressError::Config(format!(
                "Size percentage must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// User-selectable bitrate for audio outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioBitrate {
    Kbps128,
    Kbps256,
    Kbps320,
}

impl AudioBitrate {
    pub fn from_kbps(kbps: u32) -> Result<Self> {
        match kbps {
            128 => Ok(AudioBitrate::Kbps128),
            256 => Ok(AudioBitrate::Kbps256),
            320 => Ok(AudioBitrate::Kbps320),
            other => Err(MediaPressError::Config(format!(
                "Invalid audio bitrate '{}'. Valid bitrates: 128, 256, 320",
                other
            ))),
        }
    }

    /// Bitrate implied by the high-quality toggle when none is chosen
    pub fn default_for(high_quality_audio: bool) -> Self {
        if high_quality_audio {
            AudioBitrate::Kbps320
        } else {
            AudioBitrate::Kbps128
        }
    }

    pub fn kbps(&self) -> u32 {
        match self {
            AudioBitrate::Kbps128 => 128,
            AudioBitrate::Kbps256 => 256,
            AudioBitrate::Kbps320 => 320,
        }
    }
}

/// Options shared by every job of a batch
#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    pub image_percentage: Percentage,
    pub video_percentage: Percentage,
    pub audio_bitrate: AudioBitrate,
    pub high_quality_audio: bool,
    pub output_dir: PathBuf,
}

impl TranscodeOptions {
    pub fn video_audio_bitrate_bps(&self) -> u64 {
        video_audio_bitrate_bps(self.high_quality_audio)
    }
}

/// Bitrate of the audio stream kept inside transcoded videos
pub fn video_audio_bitrate_bps(high_quality_audio: bool) -> u64 {
    if high_quality_audio { 256_000 } else { 64_000 }
}

/// A source/destination pair as handed over by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl JobRequest {
    pub fn new<S: Into<PathBuf>, D: Into<PathBuf>>(source: S, destination: D) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// A supported job. Built once before the batch starts and never changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    source: PathBuf,
    destination: PathBuf,
    kind: MediaKind,
}

impl TranscodeJob {
    /// Returns `None` when the source extension is not a known media type
    pub fn new<S: Into<PathBuf>, D: Into<PathBuf>>(source: S, destination: D) -> Option<Self> {
        let source = source.into();
        let kind = MediaKind::from_path(&source)?;
        Some(Self {
            source,
            destination: destination.into(),
            kind,
        })
    }

    pub fn from_request(request: &JobRequest) -> Option<Self> {
        Self::new(request.source.clone(), request.destination.clone())
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Lower-cased destination extension, empty when missing
    pub fn destination_format(&self) -> String {
        extension_of(&self.destination).unwrap_or_default()
    }

    pub fn source_name(&self) -> String {
        display_name(&self.source)
    }
}

/// Anything that can turn a job into an output file
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        job: &TranscodeJob,
        options: &TranscodeOptions,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), TranscodeError>;
}
