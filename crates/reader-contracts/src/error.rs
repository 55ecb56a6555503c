use serde::Serialize;
use thiserror::Error;

pub const ANALYSIS_FAILED_MESSAGE: &str = "The scholar's study is closed. Please try again.";

/// Failures surfaced by the analysis and image synthesis clients.
///
/// Every lower-level failure (HTTP, JSON, base64, image decoding) is folded
/// into one of these before it reaches the session controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReaderError {
    #[error("The scholar's study is empty. The model returned no analysis.")]
    EmptyResponse,

    #[error("The analysis could not be read: {0}")]
    SchemaValidation(String),

    #[error("This content cannot be interpreted due to safety restrictions.")]
    ContentBlocked,

    #[error("{0}")]
    Transport(String),

    #[error("Image generation failed: {0}")]
    ImageSynthesis(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyResponse,
    SchemaValidation,
    ContentBlocked,
    Transport,
    ImageSynthesis,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::EmptyResponse => "empty_response",
            ErrorKind::SchemaValidation => "schema_validation",
            ErrorKind::ContentBlocked => "content_blocked",
            ErrorKind::Transport => "transport",
            ErrorKind::ImageSynthesis => "image_synthesis",
        }
    }
}

impl ReaderError {
    /// Transport failure carrying `message`, or the generic analysis message
    /// when the underlying error had nothing to say.
    pub fn transport(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            return ReaderError::Transport(ANALYSIS_FAILED_MESSAGE.to_string());
        }
        ReaderError::Transport(message.trim().to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ReaderError::EmptyResponse => ErrorKind::EmptyResponse,
            ReaderError::SchemaValidation(_) => ErrorKind::SchemaValidation,
            ReaderError::ContentBlocked => ErrorKind::ContentBlocked,
            ReaderError::Transport(_) => ErrorKind::Transport,
            ReaderError::ImageSynthesis(_) => ErrorKind::ImageSynthesis,
        }
    }
}

impl From<serde_json::Error> for ReaderError {
    fn from(err: serde_json::Error) -> Self {
        ReaderError::SchemaValidation(err.to_string())
    }
}
