use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::batch::{BatchCoordinator, BatchOutcome};
use crate::config::Config;
use crate::error::{MediaPressError, Result};
use crate::media::{
    AudioBitrate, AudioFormat, ImageFormat, JobRequest, MediaKind, MediaProcessor, Percentage,
    TranscodeOptions, VideoContainer, display_name,
};
use crate::report::ConsoleReporter;
use crate::setup::ToolChecker;

/// Options for one `compress` run. `None` falls back to the config defaults.
#[derive(Debug, Clone, Default)]
pub struct CompressRequest {
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub image_format: Option<String>,
    pub video_format: Option<String>,
    pub audio_format: Option<String>,
    pub image_size: Option<u8>,
    pub video_size: Option<u8>,
    pub audio_bitrate: Option<u32>,
    pub high_quality_audio: Option<bool>,
    /// `Some(None)` creates a timestamp-named sub-folder
    pub new_folder: Option<Option<String>>,
}

/// Destination extension per media kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormats {
    pub image: String,
    pub video: String,
    pub audio: String,
}

impl OutputFormats {
    pub fn extension_for(&self, kind: MediaKind) -> &str {
        match kind {
            MediaKind::Image => &self.image,
            MediaKind::Video => &self.video,
            MediaKind::Audio => &self.audio,
        }
    }
}

/// Everything a batch needs, ready to run
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub requests: Vec<JobRequest>,
    pub options: TranscodeOptions,
}

pub struct Workflow {
    config: Config,
}

impl Workflow {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Check tools, prepare jobs and run them while rendering progress
    pub async fn compress(&self, request: &CompressRequest) -> Result<BatchOutcome> {
        ToolChecker::new(&self.config.tools).ensure_available().await?;

        let prepared = self.prepare(request).await?;
        info!(
            "Compressing {} files into {}",
            prepared.requests.len(),
            prepared.options.output_dir.display()
        );

        let processor = Arc::new(MediaProcessor::from_config(&self.config));
        let coordinator = BatchCoordinator::new(processor);
        let mut handle = coordinator.spawn(prepared.requests, prepared.options);

        let cancel = handle.cancel_token();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current file");
                cancel.cancel();
            }
        });

        let reporter = ConsoleReporter::new();
        reporter.drain(&mut handle.events).await;
        interrupt.abort();

        let outcome = handle.outcome().await;
        reporter.summarize(&outcome);
        Ok(outcome)
    }

    /// Resolve formats and options, create the output folder and pair every
    /// input with its destination
    pub async fn prepare(&self, request: &CompressRequest) -> Result<PreparedBatch> {
        let formats = self.resolve_formats(request)?;
        let mut options = self.resolve_options(request, request.output_dir.clone())?;
        let files = collect_inputs(&request.inputs)?;

        options.output_dir = create_output_dir(&request.output_dir, request.new_folder.as_ref()).await?;
        let requests = plan_destinations(
            &files,
            &options.output_dir,
            &formats,
            &self.config.defaults.output_suffix,
        );

        Ok(PreparedBatch { requests, options })
    }

    pub fn resolve_formats(&self, request: &CompressRequest) -> Result<OutputFormats> {
        let defaults = &self.config.defaults;
        let pick = |value: &Option<String>, fallback: &String| {
            value.as_deref().unwrap_or(fallback).trim_start_matches('.').to_ascii_lowercase()
        };

        let formats = OutputFormats {
            image: pick(&request.image_format, &defaults.image_format),
            video: pick(&request.video_format, &defaults.video_format),
            audio: pick(&request.audio_format, &defaults.audio_format),
        };

        if ImageFormat::from_extension(&formats.image).is_none() {
            return Err(MediaPressError::Config(format!(
                "Invalid image format '{}'. Valid formats: jpg, jpeg, png, webp",
                formats.image
            )));
        }
        // audio formats are allowed here and mean "extract the audio track"
        if VideoContainer::from_extension(&formats.video).is_none()
            && AudioFormat::from_extension(&formats.video).is_none()
        {
            return Err(MediaPressError::Config(format!(
                "Invalid video format '{}'. Valid formats: mp4, mkv, avi, mov, or an audio format",
                formats.video
            )));
        }
        if AudioFormat::from_extension(&formats.audio).is_none() {
            return Err(MediaPressError::Config(format!(
                "Invalid audio format '{}'. Valid formats: mp3, wav, flac, aac, ogg, m4a",
                formats.audio
            )));
        }

        Ok(formats)
    }

    pub fn resolve_options(&self, request: &CompressRequest, output_dir: PathBuf) -> Result<TranscodeOptions> {
        let defaults = &self.config.defaults;
        let high_quality_audio = request.high_quality_audio.unwrap_or(defaults.high_quality_audio);
        let audio_bitrate = match request.audio_bitrate.or(defaults.audio_bitrate) {
            Some(kbps) => AudioBitrate::from_kbps(kbps)?,
            None => AudioBitrate::default_for(high_quality_audio),
        };

        Ok(TranscodeOptions {
            image_percentage: Percentage::new(request.image_size.unwrap_or(defaults.image_size_percentage))?,
            video_percentage: Percentage::new(request.video_size.unwrap_or(defaults.video_size_percentage))?,
            audio_bitrate,
            high_quality_audio,
            output_dir,
        })
    }
}

/// Name for an export folder created without an explicit name
pub fn default_folder_name(now: DateTime<Local>) -> String {
    format!("compressed_{}", now.format("%Y%m%d_%H%M%S"))
}

async fn create_output_dir(base: &Path, new_folder: Option<&Option<String>>) -> Result<PathBuf> {
    let output_dir = match new_folder {
        None => base.to_path_buf(),
        Some(name) => {
            let name = name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| default_folder_name(Local::now()));
            base.join(name)
        }
    };

    fs::create_dir_all(&output_dir).await.map_err(|e| {
        MediaPressError::Config(format!(
            "Failed to create folder {}: {}",
            output_dir.display(),
            e
        ))
    })?;
    if new_folder.is_some() {
        info!("Created new folder: {}", output_dir.display());
    }

    Ok(output_dir)
}

/// Expand the given paths into a list of files.
///
/// Directories contribute their supported files, recursively and in name order.
/// Files named explicitly are kept even when unsupported so the batch can
/// report them. The first occurrence of a path wins.
pub fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if inputs.is_empty() {
        return Err(MediaPressError::InvalidInput(
            "Please select files or folders to compress.".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut found = 0;
            for entry in WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                if MediaKind::is_supported(entry.path()) && seen.insert(entry.path().to_path_buf()) {
                    files.push(entry.path().to_path_buf());
                    found += 1;
                }
            }
            info!("Found {} media files in {}", found, input.display());
        } else if input.is_file() {
            if seen.insert(input.clone()) {
                files.push(input.clone());
            }
        } else {
            return Err(MediaPressError::InvalidInput(format!(
                "Input not found: {}",
                input.display()
            )));
        }
    }

    if !files.iter().any(|f| MediaKind::is_supported(f)) {
        return Err(MediaPressError::InvalidInput("No files to process.".to_string()));
    }

    Ok(files)
}

/// Pair each file with `<stem><suffix>.<ext>` in `output_dir`. Names already
/// handed out in this batch get `_1`, `_2`, ... appended.
pub fn plan_destinations(
    files: &[PathBuf],
    output_dir: &Path,
    formats: &OutputFormats,
    suffix: &str,
) -> Vec<JobRequest> {
    let mut taken = HashSet::new();

    files
        .iter()
        .map(|source| {
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| display_name(source));
            let extension = match MediaKind::from_path(source) {
                Some(kind) => formats.extension_for(kind).to_string(),
                None => source
                    .extension()
                    .map(|e| e.to_string_lossy().to_string())
                    .unwrap_or_default(),
            };

            let mut counter = 0;
            let destination = loop {
                let name = match counter {
                    0 => format!("{}{}", stem, suffix),
                    n => format!("{}{}_{}", stem, suffix, n),
                };
                let candidate = if extension.is_empty() {
                    output_dir.join(name)
                } else {
                    output_dir.join(format!("{}.{}", name, extension))
                };
                if taken.insert(candidate.clone()) {
                    break candidate;
                }
                counter += 1;
            };

            JobRequest::new(source.clone(), destination)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;
    use chrono::TimeZone;

    fn formats() -> OutputFormats {
        OutputFormats {
            image: "jpg".to_string(),
            video: "mp4".to_string(),
            audio: "mp3".to_string(),
        }
    }

    #[test]
    fn test_collect_walks_directories() {
        let temp = TempDir::new().unwrap();
        temp.child("album/b.PNG").touch().unwrap();
        temp.child("album/a.mp4").touch().unwrap();
        temp.child("album/readme.txt").touch().unwrap();
        temp.child("album/nested/c.flac").touch().unwrap();

        let files = collect_inputs(&[temp.child("album").path().to_path_buf()]).unwrap();
        let names: Vec<_> = files.iter().map(|f| display_name(f)).collect();
        assert_eq!(names, vec!["a.mp4", "b.PNG", "c.flac"]);
    }

    #[test]
    fn test_collect_keeps_explicit_files_and_dedupes() {
        let temp = TempDir::new().unwrap();
        temp.child("clip.mov").touch().unwrap();
        temp.child("notes.txt").touch().unwrap();

        let clip = temp.child("clip.mov").path().to_path_buf();
        let notes = temp.child("notes.txt").path().to_path_buf();
        let files = collect_inputs(&[clip.clone(), notes.clone(), temp.path().to_path_buf()]).unwrap();

        assert_eq!(files, vec![clip, notes]);
    }

    #[test]
    fn test_collect_rejects_empty_and_missing() {
        assert!(matches!(collect_inputs(&[]), Err(MediaPressError::InvalidInput(_))));

        let temp = TempDir::new().unwrap();
        assert!(matches!(
            collect_inputs(&[temp.child("ghost.mp4").path().to_path_buf()]),
            Err(MediaPressError::InvalidInput(_))
        ));

        temp.child("only.txt").touch().unwrap();
        assert!(matches!(
            collect_inputs(&[temp.path().to_path_buf()]),
            Err(MediaPressError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_destinations_follow_kind_and_avoid_collisions() {
        let files = vec![
            PathBuf::from("in/photo.png"),
            PathBuf::from("in/photo.webp"),
            PathBuf::from("in/talk.mkv"),
            PathBuf::from("in/song.wav"),
            PathBuf::from("other/photo.jpg"),
        ];
        let requests = plan_destinations(&files, Path::new("out"), &formats(), "_compressed");
        let destinations: Vec<_> = requests.iter().map(|r| r.destination.clone()).collect();

        assert_eq!(
            destinations,
            vec![
                PathBuf::from("out/photo_compressed.jpg"),
                PathBuf::from("out/photo_compressed_1.jpg"),
                PathBuf::from("out/talk_compressed.mp4"),
                PathBuf::from("out/song_compressed.mp3"),
                PathBuf::from("out/photo_compressed_2.jpg"),
            ]
        );
        assert_eq!(requests[2].source, PathBuf::from("in/talk.mkv"));
    }

    #[test]
    fn test_default_folder_name() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(default_folder_name(now), "compressed_20240309_140507");
    }

    #[test]
    fn test_resolve_options_defaults_and_overrides() {
        let workflow = Workflow::new(Config::default());
        let request = CompressRequest::default();

        let options = workflow.resolve_options(&request, PathBuf::from("out")).unwrap();
        assert_eq!(options.image_percentage.value(), 50);
        assert_eq!(options.audio_bitrate, AudioBitrate::Kbps320);
        assert!(options.high_quality_audio);

        let request = CompressRequest {
            high_quality_audio: Some(false),
            video_size: Some(20),
            ..Default::default()
        };
        let options = workflow.resolve_options(&request, PathBuf::from("out")).unwrap();
        assert_eq!(options.audio_bitrate, AudioBitrate::Kbps128);
        assert_eq!(options.video_percentage.value(), 20);

        let request = CompressRequest {
            audio_bitrate: Some(256),
            high_quality_audio: Some(false),
            ..Default::default()
        };
        let options = workflow.resolve_options(&request, PathBuf::from("out")).unwrap();
        assert_eq!(options.audio_bitrate, AudioBitrate::Kbps256);

        let request = CompressRequest {
            image_size: Some(2),
            ..Default::default()
        };
        assert!(workflow.resolve_options(&request, PathBuf::from("out")).is_err());
    }

    #[test]
    fn test_resolve_formats() {
        let workflow = Workflow::new(Config::default());
        let request = CompressRequest {
            image_format: Some(".PNG".to_string()),
            video_format: Some("mp3".to_string()),
            ..Default::default()
        };
        let formats = workflow.resolve_formats(&request).unwrap();
        assert_eq!(formats.image, "png");
        assert_eq!(formats.video, "mp3");
        assert_eq!(formats.audio, "mp3");

        let request = CompressRequest {
            image_format: Some("gif".to_string()),
            ..Default::default()
        };
        assert!(matches!(workflow.resolve_formats(&request), Err(MediaPressError::Config(_))));
    }

    #[tokio::test]
    async fn test_prepare_creates_named_folder() {
        let input = TempDir::new().unwrap();
        input.child("clip.mp4").touch().unwrap();
        let output = TempDir::new().unwrap();

        let workflow = Workflow::new(Config::default());
        let request = CompressRequest {
            inputs: vec![input.path().to_path_buf()],
            output_dir: output.path().to_path_buf(),
            new_folder: Some(Some("export".to_string())),
            ..Default::default()
        };
        let prepared = workflow.prepare(&request).await.unwrap();

        assert!(output.child("export").path().is_dir());
        assert_eq!(prepared.options.output_dir, output.path().join("export"));
        assert_eq!(
            prepared.requests[0].destination,
            output.path().join("export").join("clip_compressed.mp4")
        );
    }
}
