//! Detection backend capability interface.
//!
//! Any face/audio-event detector is pluggable behind this trait; the
//! pipeline never depends on a concrete model. Calls must be
//! side-effect-free and independently retryable.

use async_trait::async_trait;

use reel_models::Detection;

use crate::error::MediaResult;
use crate::frame::{AudioWindow, SampledFrame};

/// Capability set every detection backend must provide.
#[async_trait]
pub trait DetectionBackend: Send + Sync {
    /// Detect faces in one sampled frame.
    ///
    /// Returned detections carry `kind = Face`, the frame's timestamp, a
    /// bounding region in frame pixels and, when the backend supports it,
    /// an identity embedding.
    async fn detect_faces(&self, frame: &SampledFrame) -> MediaResult<Vec<Detection>>;

    /// Detect salient audio events (applause, cheering, volume spikes)
    /// in one audio window.
    async fn detect_audio_events(&self, window: &AudioWindow) -> MediaResult<Vec<Detection>>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}
