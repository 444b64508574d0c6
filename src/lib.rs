//! mediapress - batch media compression
//!
//! Compresses images, video and audio to a share of their original size.
//! Video and audio go through ffmpeg with bitrates planned from ffprobe data;
//! still images are re-encoded in process. Batches run sequentially on their
//! own task and report progress as a typed event stream.

pub mod cli;
pub mod config;
pub mod workflow;
pub mod media;
pub mod probe;
pub mod planner;
pub mod encoder;
pub mod batch;
pub mod report;
pub mod error;
pub mod setup;
