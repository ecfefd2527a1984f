//! Pipeline error types.

use thiserror::Error;

use reel_media::MediaError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid parameter combination. Raised before any processing starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An internal invariant was violated. Always a bug, never absorbed.
    #[error("Logic invariant violated: {0}")]
    LogicInvariant(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Task join failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn logic_invariant(msg: impl Into<String>) -> Self {
        Self::LogicInvariant(msg.into())
    }

    /// Whether this error indicates a bug rather than bad input.
    pub fn is_bug(&self) -> bool {
        matches!(self, PipelineError::LogicInvariant(_))
    }

    /// Whether the run was cancelled cooperatively.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Media(MediaError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(PipelineError::logic_invariant("overlap merge").is_bug());
        assert!(!PipelineError::config("bad weights").is_bug());
        assert!(PipelineError::Media(MediaError::Cancelled).is_cancelled());
    }
}
