//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media ingestion and detection.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("Source unreadable: {path}: {message}")]
    SourceUnreadable { path: PathBuf, message: String },

    #[error("Unsupported codec in {path}: demux failed at {failed_at_s:.2}s: {message}")]
    UnsupportedCodec {
        path: PathBuf,
        /// Timestamp reached before the demuxer gave up. Everything sampled
        /// before this point was already delivered.
        failed_at_s: f64,
        message: String,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Detection backend failed: {0}")]
    DetectionFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create a source-unreadable error.
    pub fn source_unreadable(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SourceUnreadable { path: path.into(), message: message.into() }
    }

    /// Create an unsupported-codec (mid-stream demux) error.
    pub fn unsupported_codec(
        path: impl Into<PathBuf>,
        failed_at_s: f64,
        message: impl Into<String>,
    ) -> Self {
        Self::UnsupportedCodec {
            path: path.into(),
            failed_at_s,
            message: message.into(),
        }
    }

    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Whether this error is transient and worth retrying at the unit
    /// level. Gates the detection adapter's backoff schedule.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MediaError::DetectionFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(MediaError::detection_failed("timeout").is_retryable());
        assert!(!MediaError::Cancelled.is_retryable());
        assert!(!MediaError::source_unreadable("/a.mp4", "bad header").is_retryable());
    }
}
