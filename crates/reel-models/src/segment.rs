//! Highlight segments and the assembled reel plan.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::guest::GuestId;
use crate::timestamp::format_seconds;

/// A selected contiguous time interval destined for the reel.
///
/// Invariant: `start_ts < end_ts`. Segments emitted by the selector are
/// additionally pairwise non-overlapping and sorted by `start_ts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Interval start, seconds from source start.
    pub start_ts: f64,
    /// Interval end, seconds from source start.
    pub end_ts: f64,
    /// Fused interest score the interval was selected at.
    pub score: f64,
    /// Guests visible during the interval.
    pub contributing_guests: BTreeSet<GuestId>,
}

impl Segment {
    /// Segment duration in seconds.
    pub fn duration_s(&self) -> f64 {
        (self.end_ts - self.start_ts).max(0.0)
    }

    /// Whether this segment overlaps another in time.
    pub fn overlaps(&self, other: &Segment) -> bool {
        self.start_ts < other.end_ts && other.start_ts < self.end_ts
    }

    /// Gap in seconds to another (non-overlapping) segment.
    pub fn gap_to(&self, other: &Segment) -> f64 {
        if self.overlaps(other) {
            return 0.0;
        }
        if self.end_ts <= other.start_ts {
            other.start_ts - self.end_ts
        } else {
            self.start_ts - other.end_ts
        }
    }
}

/// How to enter a segment from the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Hard cut.
    Cut,
    /// Crossfade from the previous segment.
    Fade,
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionKind::Cut => write!(f, "cut"),
            TransitionKind::Fade => write!(f, "fade"),
        }
    }
}

/// Transition directive between consecutive reel segments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Transition style.
    pub kind: TransitionKind,
    /// Transition duration in seconds (0.0 for cuts).
    pub duration_s: f64,
}

impl Transition {
    /// A hard cut.
    pub fn cut() -> Self {
        Self { kind: TransitionKind::Cut, duration_s: 0.0 }
    }

    /// A crossfade of the given duration.
    pub fn fade(duration_s: f64) -> Self {
        Self { kind: TransitionKind::Fade, duration_s }
    }
}

/// A segment with its entry transition, as placed in the reel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedSegment {
    /// The selected interval.
    pub segment: Segment,
    /// How the renderer should enter it.
    pub transition_in: Transition,
    /// Human-readable start, HH:MM:SS(.mmm), for the edit sheet.
    pub start: String,
    /// Human-readable end, HH:MM:SS(.mmm).
    pub end: String,
}

impl PlannedSegment {
    /// Wrap a segment with a transition, formatting display timestamps.
    pub fn new(segment: Segment, transition_in: Transition) -> Self {
        let start = format_seconds(segment.start_ts);
        let end = format_seconds(segment.end_ts);
        Self { segment, transition_in, start, end }
    }
}

/// The ordered, transition-annotated edit plan handed to the external
/// renderer. Final artifact of the pipeline core; no encoding happens here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReelPlan {
    /// Ordered segments with transitions.
    pub segments: Vec<PlannedSegment>,
    /// Sum of segment durations in seconds.
    pub total_duration_s: f64,
    /// When the plan was assembled.
    pub generated_at: DateTime<Utc>,
}

impl ReelPlan {
    /// Number of planned segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the plan contains no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64) -> Segment {
        Segment {
            start_ts: start,
            end_ts: end,
            score: 1.0,
            contributing_guests: BTreeSet::new(),
        }
    }

    #[test]
    fn test_overlap() {
        assert!(seg(0.0, 10.0).overlaps(&seg(5.0, 15.0)));
        assert!(!seg(0.0, 10.0).overlaps(&seg(10.0, 15.0)));
    }

    #[test]
    fn test_gap() {
        assert!((seg(0.0, 10.0).gap_to(&seg(13.0, 15.0)) - 3.0).abs() < 1e-9);
        assert!((seg(13.0, 15.0).gap_to(&seg(0.0, 10.0)) - 3.0).abs() < 1e-9);
        assert_eq!(seg(0.0, 10.0).gap_to(&seg(5.0, 15.0)), 0.0);
    }

    #[test]
    fn test_planned_segment_formats_timestamps() {
        let planned = PlannedSegment::new(seg(90.0, 95.5), Transition::cut());
        assert_eq!(planned.start, "00:01:30");
        assert_eq!(planned.end, "00:01:35.500");
    }

    #[test]
    fn test_reel_plan_serializes_for_renderer() {
        let plan = ReelPlan {
            segments: vec![PlannedSegment::new(seg(10.0, 15.0), Transition::fade(0.5))],
            total_duration_s: 5.0,
            generated_at: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("\"fade\""));

        let parsed: ReelPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.segments, plan.segments);
    }
}
