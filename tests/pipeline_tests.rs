//! End-to-end runs against shell-script stand-ins for ffmpeg and ffprobe.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use image::{Rgb, RgbImage};
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use mediapress::batch::{BatchCoordinator, BatchEvent, BatchOutcome, BatchState, JobStatus};
use mediapress::config::Config;
use mediapress::media::{JobRequest, MediaProcessor};
use mediapress::setup::ToolChecker;
use mediapress::workflow::{CompressRequest, Workflow};

// Scripts are written and executed under this lock so no other test forks
// while one of them is still open for writing.
static TOOLS_LOCK: Mutex<()> = Mutex::new(());

const FAKE_FFPROBE: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffprobe version fake"; exit 0; fi
for last; do :; done
case "$last" in
  *nodur*) echo '{"format": {"filename": "x"}}' ;;
  *) echo '{"format": {"duration": "4.000000"}}' ;;
esac
"#;

const FAKE_FFMPEG: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffmpeg version fake"; exit 0; fi
input=""
prev=""
for arg; do
  if [ "$prev" = "-i" ]; then input="$arg"; fi
  prev="$arg"
  last="$arg"
done
case "$input" in
  *broken*) echo "Invalid data found when processing input" >&2; exit 1 ;;
  *slow*) exec sleep 30 ;;
esac
printf 'frame=1\nout_time_ms=1000000\nout_time_ms=N/A\nout_time_ms=2000000\nout_time_ms=4000000\nprogress=end\n'
echo "encoder log line" >&2
printf 'encoded' > "$last"
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    let mut permissions = fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).unwrap();
    path
}

fn fake_config(tools: &TempDir) -> Config {
    let mut config = Config::default();
    config.tools.ffmpeg_path = write_script(tools.path(), "ffmpeg", FAKE_FFMPEG)
        .to_string_lossy()
        .to_string();
    config.tools.ffprobe_path = write_script(tools.path(), "ffprobe", FAKE_FFPROBE)
        .to_string_lossy()
        .to_string();
    config
}

fn write_png(path: &Path) {
    RgbImage::from_pixel(16, 16, Rgb([30, 120, 200])).save(path).unwrap();
}

async fn run_collecting(
    config: &Config,
    requests: &[JobRequest],
    workflow_request: &CompressRequest,
    cancel: &CancellationToken,
) -> (BatchOutcome, Vec<BatchEvent>) {
    let workflow = Workflow::new(config.clone());
    let options = workflow
        .resolve_options(workflow_request, workflow_request.output_dir.clone())
        .unwrap();

    let coordinator = BatchCoordinator::new(Arc::new(MediaProcessor::from_config(config)));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = coordinator.run(requests, &options, &tx, cancel).await;
    drop(tx);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (outcome, events)
}

fn progress_values(events: &[BatchEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_mixed_batch_survives_failures() {
    let _lock = TOOLS_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let tools = TempDir::new().unwrap();
    let config = fake_config(&tools);

    let input = TempDir::new().unwrap();
    write_png(input.child("photo.png").path());
    input.child("clip.mp4").write_binary(&[0u8; 4096]).unwrap();
    input.child("broken.mov").write_binary(&[0u8; 1024]).unwrap();
    input.child("song.wav").write_binary(&[0u8; 2048]).unwrap();
    input.child("notes.txt").write_str("not media").unwrap();
    let output = TempDir::new().unwrap();

    let request = CompressRequest {
        inputs: vec![input.path().to_path_buf(), input.child("notes.txt").path().to_path_buf()],
        output_dir: output.path().to_path_buf(),
        ..Default::default()
    };
    let prepared = Workflow::new(config.clone()).prepare(&request).await.unwrap();
    assert_eq!(prepared.requests.len(), 5);

    let (outcome, events) =
        run_collecting(&config, &prepared.requests, &request, &CancellationToken::new()).await;

    assert_eq!(outcome.state, BatchState::CompletedWithErrors);
    assert!(!outcome.is_success());
    assert_eq!(outcome.reports.len(), 5);
    assert_eq!(outcome.succeeded_count(), 3);
    assert_eq!(outcome.failed_count(), 1);
    assert_eq!(outcome.skipped_count(), 1);

    assert!(output.child("photo_compressed.jpg").path().exists());
    assert!(output.child("clip_compressed.mp4").path().exists());
    assert!(output.child("song_compressed.mp3").path().exists());
    assert!(!output.child("broken_compressed.mp4").path().exists());

    let jpeg = image::open(output.child("photo_compressed.jpg").path()).unwrap();
    assert_eq!(jpeg.width(), 16);

    assert!(events.contains(&BatchEvent::Error(
        "Error processing broken.mov: FFmpeg failed with return code 1 for file: broken.mov"
            .to_string()
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        BatchEvent::Error(message) if message.contains("Non-integer out_time_ms encountered: 'N/A'")
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        BatchEvent::Error(message) if message.starts_with("Unsupported file type:")
    )));
    assert_eq!(events.last(), Some(&BatchEvent::Completed { success: false }));

    let progress = progress_values(&events);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
    assert_eq!(progress.last(), Some(&1.0));
}

#[tokio::test]
async fn test_probe_without_duration_fails_job() {
    let _lock = TOOLS_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let tools = TempDir::new().unwrap();
    let config = fake_config(&tools);

    let input = TempDir::new().unwrap();
    input.child("stream_nodur.mkv").write_binary(&[1u8; 512]).unwrap();
    let output = TempDir::new().unwrap();

    let request = CompressRequest {
        output_dir: output.path().to_path_buf(),
        ..Default::default()
    };
    let requests = vec![JobRequest::new(
        input.child("stream_nodur.mkv").path(),
        output.child("stream_compressed.mp4").path(),
    )];

    let (outcome, events) =
        run_collecting(&config, &requests, &request, &CancellationToken::new()).await;

    assert_eq!(outcome.state, BatchState::CompletedWithErrors);
    match &outcome.reports[0].status {
        JobStatus::Failed(reason) => {
            assert_eq!(reason, "Cannot determine duration of media file: stream_nodur.mkv")
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert!(events.contains(&BatchEvent::Status("Error processing stream_nodur.mkv.".to_string())));
}

#[tokio::test]
async fn test_cancel_terminates_running_encoder() {
    let _lock = TOOLS_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let tools = TempDir::new().unwrap();
    let mut config = fake_config(&tools);
    config.encoder.terminate_on_cancel = true;

    let input = TempDir::new().unwrap();
    input.child("slow.mp4").write_binary(&[0u8; 64]).unwrap();
    input.child("next.mp4").write_binary(&[0u8; 64]).unwrap();
    let output = TempDir::new().unwrap();

    let request = CompressRequest {
        output_dir: output.path().to_path_buf(),
        ..Default::default()
    };
    let requests = vec![
        JobRequest::new(input.child("slow.mp4").path(), output.child("slow_compressed.mp4").path()),
        JobRequest::new(input.child("next.mp4").path(), output.child("next_compressed.mp4").path()),
    ];

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let (outcome, events) = tokio::time::timeout(
        Duration::from_secs(20),
        run_collecting(&config, &requests, &request, &cancel),
    )
    .await
    .expect("running encoder was not terminated");

    assert_eq!(outcome.state, BatchState::Cancelled);
    assert_eq!(outcome.reports.len(), 1);
    assert!(!output.child("next_compressed.mp4").path().exists());
    assert!(events.contains(&BatchEvent::Status("Compression interrupted.".to_string())));
    assert_eq!(events.last(), Some(&BatchEvent::Completed { success: false }));
}

#[tokio::test]
async fn test_tool_check_and_full_workflow() {
    let _lock = TOOLS_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let tools = TempDir::new().unwrap();
    let config = fake_config(&tools);

    assert_ok!(ToolChecker::new(&config.tools).ensure_available().await);

    let mut missing = config.clone();
    missing.tools.ffprobe_path = tools.child("no-such-ffprobe").path().to_string_lossy().to_string();
    assert_err!(ToolChecker::new(&missing.tools).ensure_available().await);

    let input = TempDir::new().unwrap();
    write_png(input.child("a.png").path());
    write_png(input.child("b.png").path());
    let output = TempDir::new().unwrap();

    let request = CompressRequest {
        inputs: vec![input.path().to_path_buf()],
        output_dir: output.path().to_path_buf(),
        image_format: Some("png".to_string()),
        new_folder: Some(Some("export".to_string())),
        ..Default::default()
    };
    let outcome = assert_ok!(Workflow::new(config).compress(&request).await);

    assert!(outcome.is_success());
    assert_eq!(outcome.succeeded_count(), 2);
    assert!(output.child("export/a_compressed.png").path().exists());
    assert!(output.child("export/b_compressed.png").path().exists());
}
