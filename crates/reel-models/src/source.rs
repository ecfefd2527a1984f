//! Media source handles.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Identifier of the camera a source was recorded on.
///
/// Guest clustering treats temporal overlap differently within one camera
/// than across cameras, so every source carries its camera identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct CameraId(pub String);

impl CameraId {
    /// Create a camera id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CameraId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Immutable handle to an opened video file.
///
/// Created by `reel_media::probe::open` at ingestion and read-only
/// thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSource {
    /// Path to the container file.
    pub path: PathBuf,
    /// Camera this footage was recorded on.
    pub camera_id: CameraId,
    /// Duration in seconds.
    pub duration_s: f64,
    /// Video frame rate (fps).
    pub fps: f64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Audio sample rate in Hz, if the container has an audio stream.
    pub audio_sample_rate: Option<u32>,
}

impl MediaSource {
    /// Whether the source carries an audio stream.
    pub fn has_audio(&self) -> bool {
        self.audio_sample_rate.is_some()
    }
}
