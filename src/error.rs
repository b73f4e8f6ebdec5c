use thiserror::Error;

#[derive(Error, Debug)]
pub enum VideoForgeError {
    #[error("Invalid specification: {0}")]
    Validation(String),

    #[error("Download failed for {kind}: {message}")]
    Download { kind: String, message: String },

    #[error("Stage '{stage}' failed: {message}")]
    Processing { stage: String, message: String },

    #[error("Alignment failed: {0}")]
    Alignment(String),

    #[error("Audio processing failed: {0}")]
    AudioProcessing(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Command `{command}` failed with status {status}: {stderr}")]
    Subprocess {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VideoForgeError {
    /// Wrap any failure as a stage-level error carrying the stage name.
    pub fn processing(stage: impl Into<String>, message: impl std::fmt::Display) -> Self {
        VideoForgeError::Processing {
            stage: stage.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VideoForgeError>;
