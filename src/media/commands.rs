use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

use crate::config::EncoderConfig;
use crate::planner::BitratePlan;
use super::{AudioBitrate, AudioFormat, VideoContainer};

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Set video bitrate in bits per second
    pub fn video_bitrate(self, bps: u64) -> Self {
        self.arg("-b:v").arg(bps.to_string())
    }

    /// Set audio bitrate; accepts ffmpeg notation such as `128k`
    pub fn audio_bitrate<S: Into<String>>(self, bitrate: S) -> Self {
        self.arg("-b:a").arg(bitrate)
    }

    /// Set encoder preset
    pub fn preset<S: Into<String>>(self, preset: S) -> Self {
        self.arg("-preset").arg(preset)
    }

    /// Force output container
    pub fn format<S: Into<String>>(self, muxer: S) -> Self {
        self.arg("-f").arg(muxer)
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Set audio sample rate
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    /// Set audio channels
    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Stream `key=value` progress records to stdout
    pub fn progress_to_stdout(self) -> Self {
        self.arg("-progress").arg("pipe:1").arg("-nostats")
    }

    /// Build a tokio process with piped output and no stdin.
    ///
    /// On unix the child gets its own process group so a terminal Ctrl-C
    /// only reaches mediapress, which decides whether the encode stops.
    pub fn to_process(&self) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    /// Run to completion and capture its output
    pub async fn capture(&self) -> std::io::Result<Output> {
        debug!("Executing media command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        self.to_process().output().await
    }
}

/// Builder for the encoder and probe invocations
#[derive(Debug, Clone)]
pub struct MediaCommandBuilder {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S1: Into<String>, S2: Into<String>>(ffmpeg_path: S1, ffprobe_path: S2) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Build video transcode command targeting a bitrate plan
    pub fn transcode_video<P: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: P,
        plan: &BitratePlan,
        container: VideoContainer,
        encoder: &EncoderConfig,
    ) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, "Video compression")
            .input(input_path)
            .video_bitrate(plan.video_bitrate_bps)
            .audio_bitrate(plan.audio_bitrate_bps.to_string())
            .audio_codec(&encoder.audio_codec)
            .video_codec(&encoder.video_codec)
            .preset(&encoder.preset)
            .format(container.muxer())
            .overwrite()
            .progress_to_stdout()
            .output(output_path)
    }

    /// Build command that strips video and re-muxes the audio stream
    pub fn extract_audio<P: AsRef<Path>>(
        &self,
        video_path: P,
        audio_path: P,
        format: AudioFormat,
        bitrate: AudioBitrate,
        encoder: &EncoderConfig,
    ) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, "Audio extraction")
            .input(video_path)
            .no_video()
            .audio_sample_rate(encoder.extract_sample_rate)
            .audio_channels(encoder.extract_channels)
            .audio_codec(format.codec())
            .audio_bitrate(format!("{}k", bitrate.kbps()))
            .format(format.muxer())
            .overwrite()
            .progress_to_stdout()
            .output(audio_path)
    }

    /// Build audio re-encode command
    pub fn compress_audio<P: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: P,
        format: AudioFormat,
        bitrate: AudioBitrate,
    ) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, "Audio compression")
            .input(input_path)
            .audio_bitrate(format!("{}k", bitrate.kbps()))
            .audio_codec(format.codec())
            .format(format.muxer())
            .overwrite()
            .progress_to_stdout()
            .output(output_path)
    }

    /// Build container metadata query
    pub fn probe_format<P: AsRef<Path>>(&self, path: P) -> MediaCommand {
        MediaCommand::new(&self.ffprobe_path, "Media probe")
            .arg("-v").arg("error")
            .arg("-print_format").arg("json")
            .arg("-show_format")
            .output(path)
    }

    /// Build version check command for either tool
    pub fn version_check<S: Into<String>>(binary_path: S) -> MediaCommand {
        MediaCommand::new(binary_path, "Version check")
            .arg("-version")
    }
}
