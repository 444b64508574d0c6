//! Bitrate targeting for video transcodes.
//!
//! Turns "make it N% of the original size" into a concrete video/audio
//! bitrate pair for the encoder.

/// Below this the encoder produces degenerate output
pub const MIN_VIDEO_BITRATE: u64 = 100_000;

/// Upper bound for the video stream regardless of the requested size
pub const MAX_VIDEO_BITRATE: u64 = 50_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitratePlan {
    pub video_bitrate_bps: u64,
    pub audio_bitrate_bps: u64,
}

impl BitratePlan {
    pub fn total_bps(&self) -> u64 {
        self.video_bitrate_bps + self.audio_bitrate_bps
    }
}

/// Compute the bitrates that make the output roughly `target_percentage`
/// percent of `original_size_bytes`.
///
/// The caller guarantees `duration_seconds > 0` and
/// `0 < target_percentage <= 100`.
pub fn plan(
    original_size_bytes: u64,
    duration_seconds: f64,
    target_percentage: f64,
    audio_bitrate_bps: u64,
) -> BitratePlan {
    debug_assert!(duration_seconds > 0.0);

    let target_size_bytes = original_size_bytes as f64 * target_percentage / 100.0;
    let requested_bps = target_size_bytes * 8.0 / duration_seconds;

    let floor_bps = (audio_bitrate_bps + MIN_VIDEO_BITRATE) as f64;
    let total_bps = requested_bps.max(floor_bps);

    let video_bps = (total_bps - audio_bitrate_bps as f64).min(MAX_VIDEO_BITRATE as f64);

    BitratePlan {
        video_bitrate_bps: video_bps as u64,
        audio_bitrate_bps,
    }
}
