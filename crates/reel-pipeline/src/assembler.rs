//! Reel plan assembly.
//!
//! Pure transformation from selected segments to the ordered,
//! transition-annotated `ReelPlan` consumed by the external renderer. No
//! encoding happens here.

use chrono::Utc;
use tracing::debug;

use reel_models::{PlannedSegment, ReelPlan, Segment, Transition, TransitionKind};

use crate::config::{PipelineConfig, SegmentOrdering};

/// Assembles selected segments into a `ReelPlan`.
pub struct ReelAssembler {
    ordering: SegmentOrdering,
    transition: TransitionKind,
    transition_duration_s: f64,
}

impl ReelAssembler {
    /// Create an assembler from pipeline configuration.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            ordering: config.ordering,
            transition: config.transition,
            transition_duration_s: config.transition_duration_s,
        }
    }

    /// Order segments and attach transition directives.
    ///
    /// The first segment always enters on a cut; later segments get the
    /// configured transition, with fades clamped to half the shorter
    /// neighbor so a crossfade can never consume a whole clip.
    pub fn assemble(&self, mut segments: Vec<Segment>) -> ReelPlan {
        match self.ordering {
            SegmentOrdering::Chronological => {
                segments.sort_by(|a, b| a.start_ts.total_cmp(&b.start_ts));
            }
            SegmentOrdering::BestFirst => {
                segments.sort_by(|a, b| {
                    b.score
                        .total_cmp(&a.score)
                        .then_with(|| a.start_ts.total_cmp(&b.start_ts))
                });
            }
        }

        let total_duration_s: f64 = segments.iter().map(|s| s.duration_s()).sum();

        let mut planned = Vec::with_capacity(segments.len());
        let mut prev_duration: Option<f64> = None;
        for segment in segments {
            let duration = segment.duration_s();
            let transition_in = match prev_duration {
                None => Transition::cut(),
                Some(prev) => match self.transition {
                    TransitionKind::Cut => Transition::cut(),
                    TransitionKind::Fade => {
                        let clamp = (prev.min(duration)) / 2.0;
                        Transition::fade(self.transition_duration_s.min(clamp))
                    }
                },
            };
            planned.push(PlannedSegment::new(segment, transition_in));
            prev_duration = Some(duration);
        }

        debug!(segments = planned.len(), total_s = total_duration_s, "Reel plan assembled");
        ReelPlan {
            segments: planned,
            total_duration_s,
            generated_at: Utc::now(),
        }
    }
}
