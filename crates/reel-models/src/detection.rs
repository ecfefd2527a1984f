//! Timestamped detection records produced by detection adapters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::embedding::Embedding;
use crate::region::BoundingRegion;

/// What a detection backend observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DetectionKind {
    /// A face in a sampled video frame.
    Face,
    /// A salient audio event (applause, cheering, volume spike).
    AudioEvent,
}

impl std::fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionKind::Face => write!(f, "face"),
            DetectionKind::AudioEvent => write!(f, "audio_event"),
        }
    }
}

/// A single timestamped detection. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Source-relative timestamp in seconds.
    pub timestamp: f64,

    /// Kind of observation.
    pub kind: DetectionKind,

    /// Spatial extent in frame pixels. Present for faces, absent for audio.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<BoundingRegion>,

    /// Backend confidence in [0, 1].
    pub confidence: f64,

    /// Identity embedding, when the backend produces one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
}

impl Detection {
    /// Create a face detection.
    pub fn face(timestamp: f64, region: BoundingRegion, confidence: f64) -> Self {
        Self {
            timestamp,
            kind: DetectionKind::Face,
            region: Some(region),
            confidence,
            embedding: None,
        }
    }

    /// Create a face detection carrying an identity embedding.
    pub fn face_with_embedding(
        timestamp: f64,
        region: BoundingRegion,
        confidence: f64,
        embedding: Embedding,
    ) -> Self {
        Self {
            timestamp,
            kind: DetectionKind::Face,
            region: Some(region),
            confidence,
            embedding: Some(embedding),
        }
    }

    /// Create an audio event detection.
    pub fn audio_event(timestamp: f64, confidence: f64) -> Self {
        Self {
            timestamp,
            kind: DetectionKind::AudioEvent,
            region: None,
            confidence,
            embedding: None,
        }
    }

    /// Whether this is a face detection.
    pub fn is_face(&self) -> bool {
        self.kind == DetectionKind::Face
    }
}
