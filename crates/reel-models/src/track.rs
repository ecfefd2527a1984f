//! Face tracks: one guest's continuous appearance on one camera.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::detection::Detection;
use crate::embedding::Embedding;
use crate::source::CameraId;

/// Identifier of a track, unique within one pipeline run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct TrackId(pub u64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "track-{}", self.0)
    }
}

/// A continuous face appearance across consecutive sampled frames.
///
/// Owned by the track builder while open; frozen once closed and handed by
/// reference to the guest clusterer. Detections are face detections in
/// strictly increasing timestamp order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Run-unique identifier.
    pub id: TrackId,
    /// Camera the track was observed on.
    pub camera_id: CameraId,
    /// Time-ordered face detections.
    pub detections: Vec<Detection>,
    /// Timestamp of the first detection.
    pub start_ts: f64,
    /// Timestamp of the last detection.
    pub end_ts: f64,
    /// Mean of the detections' embeddings, if any carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_embedding: Option<Embedding>,
}

impl Track {
    /// Track duration in seconds.
    pub fn duration_s(&self) -> f64 {
        (self.end_ts - self.start_ts).max(0.0)
    }

    /// Whether this track's time span overlaps another's.
    pub fn overlaps_in_time(&self, other: &Track) -> bool {
        self.start_ts < other.end_ts && other.start_ts < self.end_ts
    }

    /// Mean center position of the track's detections, in frame pixels.
    ///
    /// Used for seat correlation. `None` when no detection carries a region.
    pub fn mean_position(&self) -> Option<(f64, f64)> {
        let centers: Vec<(f64, f64)> = self
            .detections
            .iter()
            .filter_map(|d| d.region.as_ref().map(|r| (r.cx(), r.cy())))
            .collect();
        if centers.is_empty() {
            return None;
        }
        let n = centers.len() as f64;
        let (sx, sy) = centers
            .iter()
            .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
        Some((sx / n, sy / n))
    }

    /// Check the time-order invariant: strictly increasing timestamps.
    pub fn is_time_ordered(&self) -> bool {
        self.detections
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::BoundingRegion;

    fn make_track(id: u64, camera: &str, start: f64, end: f64) -> Track {
        Track {
            id: TrackId(id),
            camera_id: CameraId::new(camera),
            detections: vec![
                Detection::face(start, BoundingRegion::new(0.0, 0.0, 10.0, 10.0), 0.9),
                Detection::face(end, BoundingRegion::new(2.0, 0.0, 10.0, 10.0), 0.9),
            ],
            start_ts: start,
            end_ts: end,
            mean_embedding: None,
        }
    }

    #[test]
    fn test_overlap_detection() {
        let a = make_track(1, "cam-a", 0.0, 10.0);
        let b = make_track(2, "cam-a", 5.0, 15.0);
        let c = make_track(3, "cam-a", 10.5, 12.0);

        assert!(a.overlaps_in_time(&b));
        assert!(b.overlaps_in_time(&a));
        assert!(!a.overlaps_in_time(&c));
    }

    #[test]
    fn test_time_order_invariant() {
        let track = make_track(1, "cam-a", 0.0, 1.0);
        assert!(track.is_time_ordered());

        let mut bad = track.clone();
        bad.detections.reverse();
        assert!(!bad.is_time_ordered());
    }

    #[test]
    fn test_mean_position() {
        let track = make_track(1, "cam-a", 0.0, 1.0);
        let (x, y) = track.mean_position().unwrap();
        assert!((x - 6.0).abs() < 1e-9); // centers at 5.0 and 7.0
        assert!((y - 5.0).abs() < 1e-9);
    }
}
