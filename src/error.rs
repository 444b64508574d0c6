use thiserror::Error;

/// Application-level errors: configuration, tooling and job preparation.
#[derive(Error, Debug)]
pub enum MediaPressError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0} is not installed or not found in system PATH")]
    ToolMissing(String),

    #[error("Media tool error: {0}")]
    Tool(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, MediaPressError>;

/// Failures while inspecting a source file.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("ffprobe failed for {file}: {reason}")]
    ToolFailure { file: String, reason: String },

    #[error("Cannot determine duration of media file: {file}")]
    MissingDuration { file: String },

    #[error("Invalid duration value '{value}' for file: {file}")]
    InvalidDuration { file: String, value: String },
}

/// Failures while producing an output file.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("FFmpeg failed with return code {} for file: {file}", exit_code_label(.code))]
    NonZeroExit { file: String, code: Option<i32> },

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("WebP encoding error: {0}")]
    WebP(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding cancelled")]
    Cancelled,
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

/// Failures deciding how a job should be encoded.
#[derive(Error, Debug)]
pub enum PlanningError {
    #[error("Unsupported output format: {format}")]
    UnsupportedImageFormat { format: String },
}

/// Everything that can fail a single job. Never fatal to a batch.
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Planning(#[from] PlanningError),
}

impl TranscodeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TranscodeError::Encode(EncodeError::Cancelled))
    }
}
