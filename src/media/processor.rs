use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{Config, EncoderConfig};
use crate::encoder::{EncoderController, EncoderExit, ProgressSink};
use crate::error::{EncodeError, PlanningError, TranscodeError};
use crate::planner;
use crate::probe::{FfprobeProber, MediaProber};
use super::image::encode_image;
use super::{
    AudioFormat, ImageFormat, MediaCommand, MediaCommandBuilder, MediaKind, TranscodeJob,
    TranscodeOptions, Transcoder, VideoContainer,
};

/// How a job will be encoded, decided from its source kind and
/// destination extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    EncodeImage(ImageFormat),
    TranscodeVideo(VideoContainer),
    ExtractAudio(AudioFormat),
    CompressAudio(AudioFormat),
}

/// Decide the encode path for a job
pub fn plan_operation(job: &TranscodeJob) -> Result<Operation, TranscodeError> {
    let format = job.destination_format();
    match job.kind() {
        MediaKind::Image => ImageFormat::from_extension(&format)
            .map(Operation::EncodeImage)
            .ok_or_else(|| PlanningError::UnsupportedImageFormat { format }.into()),
        MediaKind::Video => {
            if let Some(audio) = AudioFormat::from_extension(&format) {
                Ok(Operation::ExtractAudio(audio))
            } else if let Some(container) = VideoContainer::from_extension(&format) {
                Ok(Operation::TranscodeVideo(container))
            } else {
                Err(EncodeError::UnsupportedFormat(format).into())
            }
        }
        MediaKind::Audio => AudioFormat::from_extension(&format)
            .map(Operation::CompressAudio)
            .ok_or_else(|| EncodeError::UnsupportedFormat(format).into()),
    }
}

/// ffmpeg/ffprobe backed transcoder for every media kind
pub struct MediaProcessor {
    prober: Arc<dyn MediaProber>,
    encoder: EncoderController,
    commands: MediaCommandBuilder,
    encoder_config: EncoderConfig,
}

impl MediaProcessor {
    pub fn new(
        prober: Arc<dyn MediaProber>,
        commands: MediaCommandBuilder,
        encoder_config: EncoderConfig,
    ) -> Self {
        let encoder = EncoderController::new(encoder_config.terminate_on_cancel);
        Self {
            prober,
            encoder,
            commands,
            encoder_config,
        }
    }

    /// Processor wired to the tools named in the configuration
    pub fn from_config(config: &Config) -> Self {
        let commands = MediaCommandBuilder::new(&config.tools.ffmpeg_path, &config.tools.ffprobe_path);
        let prober = Arc::new(FfprobeProber::new(commands.clone()));
        Self::new(prober, commands, config.encoder.clone())
    }

    async fn encode_image(
        &self,
        job: &TranscodeJob,
        format: ImageFormat,
        options: &TranscodeOptions,
        progress: &dyn ProgressSink,
    ) -> Result<(), TranscodeError> {
        info!("Compressing image {} -> {}", job.source().display(), job.destination().display());

        let source = job.source().to_path_buf();
        let destination = job.destination().to_path_buf();
        let percentage = options.image_percentage;
        tokio::task::spawn_blocking(move || encode_image(&source, &destination, format, percentage))
            .await
            .map_err(|e| EncodeError::Io(std::io::Error::other(e)))??;

        progress.progress(1.0);
        Ok(())
    }

    async fn transcode_video(
        &self,
        job: &TranscodeJob,
        container: VideoContainer,
        options: &TranscodeOptions,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), TranscodeError> {
        let probe = self.prober.probe(job.source()).await?;
        let plan = planner::plan(
            probe.original_size_bytes,
            probe.duration_seconds,
            options.video_percentage.value() as f64,
            options.video_audio_bitrate_bps(),
        );
        info!(
            "Compressing video {} ({:.1}s, {} bytes) at video {} bps / audio {} bps",
            job.source_name(),
            probe.duration_seconds,
            probe.original_size_bytes,
            plan.video_bitrate_bps,
            plan.audio_bitrate_bps
        );

        let command = self.commands.transcode_video(
            job.source(),
            job.destination(),
            &plan,
            container,
            &self.encoder_config,
        );
        self.run_encoder(job, &command, probe.duration_seconds, progress, cancel).await
    }

    async fn extract_audio(
        &self,
        job: &TranscodeJob,
        format: AudioFormat,
        options: &TranscodeOptions,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), TranscodeError> {
        let probe = self.prober.probe(job.source()).await?;
        info!("Extracting audio from {} at {} kbps", job.source_name(), options.audio_bitrate.kbps());

        let command = self.commands.extract_audio(
            job.source(),
            job.destination(),
            format,
            options.audio_bitrate,
            &self.encoder_config,
        );
        self.run_encoder(job, &command, probe.duration_seconds, progress, cancel).await
    }

    async fn compress_audio(
        &self,
        job: &TranscodeJob,
        format: AudioFormat,
        options: &TranscodeOptions,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), TranscodeError> {
        // duration is only validated here; the bitrate is the user's choice
        let probe = self.prober.probe(job.source()).await?;
        info!(
            "Compressing audio {} with {} at {} kbps",
            job.source_name(),
            format.codec(),
            options.audio_bitrate.kbps()
        );

        let command = self.commands.compress_audio(
            job.source(),
            job.destination(),
            format,
            options.audio_bitrate,
        );
        self.run_encoder(job, &command, probe.duration_seconds, progress, cancel).await
    }

    async fn run_encoder(
        &self,
        job: &TranscodeJob,
        command: &MediaCommand,
        duration_seconds: f64,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), TranscodeError> {
        match self.encoder.run(command, duration_seconds, progress, cancel).await? {
            EncoderExit::Ok => Ok(()),
            EncoderExit::Failed(code) => Err(EncodeError::NonZeroExit {
                file: job.source_name(),
                code,
            }
            .into()),
        }
    }
}

#[async_trait]
impl Transcoder for MediaProcessor {
    async fn transcode(
        &self,
        job: &TranscodeJob,
        options: &TranscodeOptions,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), TranscodeError> {
        let operation = plan_operation(job)?;
        debug!("{} -> {:?}", job.source().display(), operation);

        match operation {
            Operation::EncodeImage(format) => {
                self.encode_image(job, format, options, progress).await
            }
            Operation::TranscodeVideo(container) => {
                self.transcode_video(job, container, options, progress, cancel).await
            }
            Operation::ExtractAudio(format) => {
                self.extract_audio(job, format, options, progress, cancel).await
            }
            Operation::CompressAudio(format) => {
                self.compress_audio(job, format, options, progress, cancel).await
            }
        }
    }
}
