//! mediapress - batch media compression
//!
//! Entry point for the `mediapress` binary: compresses images, video and
//! audio to a target size using ffmpeg and ffprobe.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mediapress::cli::{high_quality_override, Args, Commands};
use mediapress::config::Config;
use mediapress::media::{video_audio_bitrate_bps, MediaCommandBuilder, MediaKind, Percentage};
use mediapress::planner;
use mediapress::probe::{FfprobeProber, MediaProber};
use mediapress::workflow::{CompressRequest, Workflow};

const DEFAULT_CONFIG_FILE: &str = "mediapress.toml";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging to both console and file
    let _log_guard = setup_logging(args.verbose)?;
    info!("Starting mediapress");

    let config = load_config(args.config.as_deref())?;

    match &args.command {
        Commands::Compress { .. } => {
            let request = args
                .command
                .compress_request()
                .ok_or_else(|| anyhow::anyhow!("compress arguments missing"))?;
            return compress(config, &request).await;
        }
        Commands::Probe { input } => {
            let prober = FfprobeProber::new(command_builder(&config));
            let probe = prober.probe(input).await?;
            let kind = MediaKind::from_path(input)
                .map(|k| k.to_string())
                .unwrap_or_else(|| "unsupported".to_string());

            println!("File:     {}", input.display());
            println!("Type:     {}", kind);
            println!(
                "Duration: {:.3}s ({})",
                probe.duration_seconds,
                format_duration(probe.duration_seconds)
            );
            println!("Size:     {} bytes", probe.original_size_bytes);
        }
        Commands::Plan {
            input,
            video_size,
            no_high_quality_audio,
        } => {
            let prober = FfprobeProber::new(command_builder(&config));
            let probe = prober.probe(input).await?;

            let percentage =
                Percentage::new(video_size.unwrap_or(config.defaults.video_size_percentage))?;
            let high_quality_audio = high_quality_override(*no_high_quality_audio)
                .unwrap_or(config.defaults.high_quality_audio);
            let audio_bps = video_audio_bitrate_bps(high_quality_audio);

            let plan = planner::plan(
                probe.original_size_bytes,
                probe.duration_seconds,
                percentage.value() as f64,
                audio_bps,
            );
            let estimated_bytes = plan.total_bps() as f64 * probe.duration_seconds / 8.0;

            println!("File:           {}", input.display());
            println!("Target:         {}% of {} bytes", percentage.value(), probe.original_size_bytes);
            println!("Video bitrate:  {} bps", plan.video_bitrate_bps);
            println!("Audio bitrate:  {} bps", plan.audio_bitrate_bps);
            println!("Estimated size: {:.0} bytes", estimated_bytes);
        }
        Commands::InitConfig { path } => {
            if path.exists() {
                anyhow::bail!("{} already exists", path.display());
            }
            Config::default().save_to_file(path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn compress(config: Config, request: &CompressRequest) -> Result<ExitCode> {
    let workflow = Workflow::new(config);
    let outcome = workflow.compress(request).await?;

    if outcome.is_success() {
        info!("Batch {} finished successfully", outcome.batch_id);
        Ok(ExitCode::SUCCESS)
    } else {
        info!("Batch {} finished in state {:?}", outcome.batch_id, outcome.state);
        Ok(ExitCode::FAILURE)
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            // Fall back to the working directory, then to built-in defaults
            if Path::new(DEFAULT_CONFIG_FILE).exists() {
                info!("Found {} in current directory, loading...", DEFAULT_CONFIG_FILE);
                Config::from_file(DEFAULT_CONFIG_FILE)?
            } else {
                Config::default()
            }
        }
    };
    Ok(config)
}

fn command_builder(config: &Config) -> MediaCommandBuilder {
    MediaCommandBuilder::new(&config.tools.ffmpeg_path, &config.tools.ffprobe_path)
}

fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    // Create log directory
    let log_dir = std::env::current_dir()?.join(".mediapress").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "mediapress.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("mediapress.log").display()
    );

    Ok(guard)
}

/// Format duration in seconds to human readable string
fn format_duration(seconds: f64) -> String {
    let seconds = seconds.round() as u64;
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
