//! Shared data models for the event reel pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Media sources and sampled detections
//! - Face tracks and clustered guest identities
//! - Seat references from the seating-map collaborator
//! - Scored timelines, highlight segments and the final reel plan

pub mod detection;
pub mod embedding;
pub mod guest;
pub mod region;
pub mod seat;
pub mod segment;
pub mod source;
pub mod timeline;
pub mod timestamp;
pub mod track;

// Re-export common types
pub use detection::{Detection, DetectionKind};
pub use embedding::{Embedding, EmbeddingAccumulator};
pub use guest::{Guest, GuestId};
pub use region::BoundingRegion;
pub use seat::SeatRef;
pub use segment::{PlannedSegment, ReelPlan, Segment, Transition, TransitionKind};
pub use source::{CameraId, MediaSource};
pub use timeline::{ScoreBucket, TimelineScore};
pub use track::{Track, TrackId};
