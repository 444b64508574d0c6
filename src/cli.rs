use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::workflow::CompressRequest;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compress files and folders into an output directory
    Compress {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory for compressed files
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Output format for images (jpg, jpeg, png, webp)
        #[arg(long)]
        image_format: Option<String>,

        /// Output format for videos (mp4, mkv, avi, mov, or an audio format to extract the audio)
        #[arg(long)]
        video_format: Option<String>,

        /// Output format for audio (mp3, wav, flac, aac, ogg, m4a)
        #[arg(long)]
        audio_format: Option<String>,

        /// Target image size as a percentage of the original (5-100)
        #[arg(long, value_parser = clap::value_parser!(u8).range(5..=100))]
        image_size: Option<u8>,

        /// Target video size as a percentage of the original (5-100)
        #[arg(long, value_parser = clap::value_parser!(u8).range(5..=100))]
        video_size: Option<u8>,

        /// Audio bitrate in kbps (128, 256, 320)
        #[arg(long)]
        audio_bitrate: Option<u32>,

        /// Use 64 kbps audio inside videos and 128 kbps as the audio default
        #[arg(long)]
        no_high_quality_audio: bool,

        /// Export into a new sub-folder of the output directory
        #[arg(long, value_name = "NAME", num_args = 0..=1)]
        new_folder: Option<Option<String>>,
    },

    /// Show duration and size of a media file
    Probe {
        /// Input media file
        input: PathBuf,
    },

    /// Show the bitrates a video would be encoded with
    Plan {
        /// Input video file
        input: PathBuf,

        /// Target video size as a percentage of the original (5-100)
        #[arg(long, value_parser = clap::value_parser!(u8).range(5..=100))]
        video_size: Option<u8>,

        /// Plan with the reduced audio bitrate
        #[arg(long)]
        no_high_quality_audio: bool,
    },

    /// Write a configuration file with default settings
    InitConfig {
        /// Where to write the file
        #[arg(short, long, default_value = "mediapress.toml")]
        path: PathBuf,
    },
}

/// `Some(false)` when the flag is given, otherwise defer to the config
pub fn high_quality_override(no_high_quality_audio: bool) -> Option<bool> {
    if no_high_quality_audio { Some(false) } else { None }
}

impl Commands {
    /// Turn `compress` arguments into a workflow request
    pub fn compress_request(&self) -> Option<CompressRequest> {
        match self {
            Commands::Compress {
                inputs,
                output_dir,
                image_format,
                video_format,
                audio_format,
                image_size,
                video_size,
                audio_bitrate,
                no_high_quality_audio,
                new_folder,
            } => Some(CompressRequest {
                inputs: inputs.clone(),
                output_dir: output_dir.clone(),
                image_format: image_format.clone(),
                video_format: video_format.clone(),
                audio_format: audio_format.clone(),
                image_size: *image_size,
                video_size: *video_size,
                audio_bitrate: *audio_bitrate,
                high_quality_audio: high_quality_override(*no_high_quality_audio),
                new_folder: new_folder.clone(),
            }),
            _ => None,
        }
    }
}
