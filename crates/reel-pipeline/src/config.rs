//! Pipeline configuration.
//!
//! Every tunable analysis knob lives here; `validate` runs fail-fast
//! before any media handle is opened.

use reel_media::SamplingPolicy;
use reel_models::TransitionKind;

use crate::error::{PipelineError, PipelineResult};

/// Relative weights for timeline signal fusion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalWeights {
    /// Face-density signal weight.
    pub face: f64,
    /// Audio-energy/event signal weight.
    pub audio: f64,
    /// Novelty (diversity) signal weight.
    pub novelty: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self { face: 0.4, audio: 0.4, novelty: 0.2 }
    }
}

impl SignalWeights {
    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.face + self.audio + self.novelty
    }
}

/// How per-signal values are scaled to [0, 1] over the full timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizationMode {
    /// Scale between the timeline's minimum and maximum.
    MinMax,
    /// Scale between the 5th and 95th percentile, clamped. Robust to a
    /// single outlier spike dominating the whole timeline.
    #[default]
    Percentile,
}

/// Ordering of segments in the assembled reel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentOrdering {
    /// Source order.
    #[default]
    Chronological,
    /// Highest score first.
    BestFirst,
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Frame sampling policy.
    pub sampling_policy: SamplingPolicy,
    /// Audio window length in seconds.
    pub audio_window_s: f64,

    /// How long a track survives without a matching detection.
    pub occlusion_tolerance_s: f64,
    /// Tracks shorter than this are discarded as noise.
    pub min_track_duration_s: f64,
    /// Association cost above which a track/detection match is rejected.
    pub max_match_cost: f64,
    /// Weight of the (1 - IoU) term in association cost.
    pub iou_weight: f64,
    /// Weight of the embedding-distance term in association cost.
    pub embedding_weight: f64,

    /// Minimum cosine similarity for merging tracks into one guest.
    pub cluster_similarity_threshold: f64,
    /// Maximum floor-plan distance for seat assignment.
    pub seat_distance_tolerance: f64,

    /// Signal fusion weights.
    pub signal_weights: SignalWeights,
    /// Signal normalization mode.
    pub normalization: NormalizationMode,
    /// Timeline bucket granularity in seconds.
    pub score_bucket_s: f64,

    /// Minimum total reel duration in seconds.
    pub min_total_s: f64,
    /// Maximum total reel duration in seconds.
    pub max_total_s: f64,
    /// Minimum single segment length in seconds.
    pub min_seg_len_s: f64,
    /// Maximum single segment length in seconds.
    pub max_seg_len_s: f64,
    /// Minimum gap between selected segments in seconds.
    pub min_gap_s: f64,
    /// Maximum segments dominated by one guest.
    pub max_segments_per_guest: usize,
    /// Buckets below this fused score are never seeds for selection.
    pub min_score_floor: f64,

    /// Segment ordering in the reel.
    pub ordering: SegmentOrdering,
    /// Transition between consecutive segments.
    pub transition: TransitionKind,
    /// Transition duration in seconds (fades).
    pub transition_duration_s: f64,

    /// Retries per detection unit before degrading to zero detections.
    pub detection_retry_limit: u32,
    /// Concurrent detection calls per run.
    pub max_detection_workers: usize,
    /// Bounded queue capacity between sampler and detection stage.
    pub sample_queue_capacity: usize,
    /// Process-wide cap on concurrently processed videos.
    pub max_concurrent_videos: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_policy: SamplingPolicy::AdaptiveMotion {
                min_fps: 1.0,
                max_fps: 5.0,
                diff_threshold: 0.04,
            },
            audio_window_s: 1.0,
            occlusion_tolerance_s: 1.5,
            min_track_duration_s: 1.0,
            max_match_cost: 0.7,
            iou_weight: 0.6,
            embedding_weight: 0.4,
            cluster_similarity_threshold: 0.6,
            seat_distance_tolerance: 1.5,
            signal_weights: SignalWeights::default(),
            normalization: NormalizationMode::default(),
            score_bucket_s: 1.0,
            min_total_s: 45.0,
            max_total_s: 90.0,
            min_seg_len_s: 3.0,
            max_seg_len_s: 10.0,
            min_gap_s: 2.0,
            max_segments_per_guest: 3,
            min_score_floor: 0.2,
            ordering: SegmentOrdering::default(),
            transition: TransitionKind::Fade,
            transition_duration_s: 0.5,
            detection_retry_limit: 2,
            max_detection_workers: 4,
            sample_queue_capacity: 32,
            max_concurrent_videos: 2,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (`REEL_*`), falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            occlusion_tolerance_s: env_f64("REEL_OCCLUSION_TOLERANCE_S", d.occlusion_tolerance_s),
            min_track_duration_s: env_f64("REEL_MIN_TRACK_DURATION_S", d.min_track_duration_s),
            cluster_similarity_threshold: env_f64(
                "REEL_CLUSTER_SIMILARITY_THRESHOLD",
                d.cluster_similarity_threshold,
            ),
            seat_distance_tolerance: env_f64(
                "REEL_SEAT_DISTANCE_TOLERANCE",
                d.seat_distance_tolerance,
            ),
            signal_weights: SignalWeights {
                face: env_f64("REEL_WEIGHT_FACE", d.signal_weights.face),
                audio: env_f64("REEL_WEIGHT_AUDIO", d.signal_weights.audio),
                novelty: env_f64("REEL_WEIGHT_NOVELTY", d.signal_weights.novelty),
            },
            min_total_s: env_f64("REEL_MIN_TOTAL_S", d.min_total_s),
            max_total_s: env_f64("REEL_MAX_TOTAL_S", d.max_total_s),
            min_seg_len_s: env_f64("REEL_MIN_SEG_LEN_S", d.min_seg_len_s),
            max_seg_len_s: env_f64("REEL_MAX_SEG_LEN_S", d.max_seg_len_s),
            min_gap_s: env_f64("REEL_MIN_GAP_S", d.min_gap_s),
            max_segments_per_guest: env_usize(
                "REEL_MAX_SEGMENTS_PER_GUEST",
                d.max_segments_per_guest,
            ),
            max_detection_workers: env_usize("REEL_MAX_DETECTION_WORKERS", d.max_detection_workers),
            sample_queue_capacity: env_usize("REEL_SAMPLE_QUEUE_CAPACITY", d.sample_queue_capacity),
            max_concurrent_videos: env_usize("REEL_MAX_CONCURRENT_VIDEOS", d.max_concurrent_videos),
            ..d
        }
    }

    /// Validate parameter combinations. Called before processing starts.
    pub fn validate(&self) -> PipelineResult<()> {
        match self.sampling_policy {
            SamplingPolicy::FixedFps(fps) => {
                if !(fps > 0.0) {
                    return Err(PipelineError::config("fixed sampling fps must be > 0"));
                }
            }
            SamplingPolicy::AdaptiveMotion { min_fps, max_fps, diff_threshold } => {
                if !(min_fps > 0.0) || min_fps > max_fps {
                    return Err(PipelineError::config(
                        "adaptive sampling requires 0 < min_fps <= max_fps",
                    ));
                }
                if !(diff_threshold > 0.0 && diff_threshold <= 1.0) {
                    return Err(PipelineError::config(
                        "adaptive diff_threshold must be in (0, 1]",
                    ));
                }
            }
        }

        if !(self.audio_window_s > 0.0) {
            return Err(PipelineError::config("audio_window_s must be > 0"));
        }
        if self.occlusion_tolerance_s < 0.0 || self.min_track_duration_s < 0.0 {
            return Err(PipelineError::config(
                "occlusion_tolerance_s and min_track_duration_s must be >= 0",
            ));
        }
        if !(self.max_match_cost > 0.0) {
            return Err(PipelineError::config("max_match_cost must be > 0"));
        }
        if self.iou_weight < 0.0
            || self.embedding_weight < 0.0
            || self.iou_weight + self.embedding_weight <= 0.0
        {
            return Err(PipelineError::config(
                "association weights must be >= 0 and sum to > 0",
            ));
        }
        if !(-1.0..=1.0).contains(&self.cluster_similarity_threshold) {
            return Err(PipelineError::config(
                "cluster_similarity_threshold must be in [-1, 1]",
            ));
        }

        let w = &self.signal_weights;
        if !(w.face.is_finite() && w.audio.is_finite() && w.novelty.is_finite()) {
            return Err(PipelineError::config("signal weights must be finite"));
        }
        if w.face < 0.0 || w.audio < 0.0 || w.novelty < 0.0 || w.total() <= 0.0 {
            return Err(PipelineError::config(
                "signal weights must be >= 0 and sum to > 0",
            ));
        }
        if !(self.score_bucket_s > 0.0) {
            return Err(PipelineError::config("score_bucket_s must be > 0"));
        }

        if self.min_total_s > self.max_total_s {
            return Err(PipelineError::config("min_total_s > max_total_s"));
        }
        if !(self.min_seg_len_s > 0.0) || self.min_seg_len_s > self.max_seg_len_s {
            return Err(PipelineError::config(
                "segment lengths require 0 < min_seg_len_s <= max_seg_len_s",
            ));
        }
        if self.min_gap_s < 0.0 || self.transition_duration_s < 0.0 {
            return Err(PipelineError::config(
                "min_gap_s and transition_duration_s must be >= 0",
            ));
        }
        if self.max_segments_per_guest == 0 {
            return Err(PipelineError::config("max_segments_per_guest must be >= 1"));
        }

        if self.max_detection_workers == 0
            || self.sample_queue_capacity == 0
            || self.max_concurrent_videos == 0
        {
            return Err(PipelineError::config(
                "worker, queue and concurrency limits must be >= 1",
            ));
        }

        Ok(())
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
