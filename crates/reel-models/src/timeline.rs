//! Scored interest timeline.

use serde::{Deserialize, Serialize};

/// Per-bucket signal contributions and fused score.
///
/// Signal fields are normalized to [0, 1] over the whole timeline before
/// fusion; `combined` is the configured weighted sum. Buckets with no
/// detections carry zeros, never NaN.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBucket {
    /// Face-density contribution.
    pub face: f64,
    /// Audio-energy/event contribution.
    pub audio: f64,
    /// Novelty contribution (diversity pressure).
    pub novelty: f64,
    /// Fused interest score.
    pub combined: f64,
}

/// Dense mapping from time bucket to interest score, with provenance.
///
/// Built by the highlight scorer and consumed read-only by the segment
/// selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineScore {
    /// Bucket granularity in seconds.
    pub bucket_s: f64,
    /// One bucket per `bucket_s` covering the full source duration.
    pub buckets: Vec<ScoreBucket>,
}

impl TimelineScore {
    /// Create a zeroed timeline covering `duration_s`.
    pub fn zeroed(duration_s: f64, bucket_s: f64) -> Self {
        let count = if duration_s > 0.0 && bucket_s > 0.0 {
            (duration_s / bucket_s).ceil() as usize
        } else {
            0
        };
        Self {
            bucket_s,
            buckets: vec![ScoreBucket::default(); count],
        }
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether the timeline has no buckets.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Bucket index for a timestamp, if it falls inside the timeline.
    pub fn bucket_index(&self, timestamp: f64) -> Option<usize> {
        if timestamp < 0.0 || self.bucket_s <= 0.0 {
            return None;
        }
        let idx = (timestamp / self.bucket_s) as usize;
        (idx < self.buckets.len()).then_some(idx)
    }

    /// Start timestamp of a bucket.
    pub fn bucket_start(&self, index: usize) -> f64 {
        index as f64 * self.bucket_s
    }

    /// Combined score of a bucket, 0.0 out of range.
    pub fn combined_at(&self, index: usize) -> f64 {
        self.buckets.get(index).map(|b| b.combined).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_bucket_count() {
        let t = TimelineScore::zeroed(60.0, 1.0);
        assert_eq!(t.len(), 60);
        assert!(t.buckets.iter().all(|b| b.combined == 0.0));
    }

    #[test]
    fn test_zeroed_rounds_up_partial_bucket() {
        let t = TimelineScore::zeroed(10.5, 1.0);
        assert_eq!(t.len(), 11);
    }

    #[test]
    fn test_zero_duration_has_no_buckets() {
        let t = TimelineScore::zeroed(0.0, 1.0);
        assert!(t.is_empty());
    }

    #[test]
    fn test_bucket_index() {
        let t = TimelineScore::zeroed(10.0, 2.0);
        assert_eq!(t.bucket_index(0.0), Some(0));
        assert_eq!(t.bucket_index(3.9), Some(1));
        assert_eq!(t.bucket_index(9.9), Some(4));
        assert_eq!(t.bucket_index(20.0), None);
        assert_eq!(t.bucket_index(-1.0), None);
    }
}
