//! Timeline interest scoring.
//!
//! Fuses three signals over fixed time buckets: face density, audio
//! energy/events and novelty. Each signal is normalized to [0, 1] over the
//! full timeline before the weighted sum, so scoring behaves the same for a
//! two-minute toast and a three-hour reception. Buckets with no detections
//! score 0.0, never null.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use reel_models::{Detection, Guest, GuestId, ScoreBucket, TimelineScore, Track, TrackId};

use crate::config::{NormalizationMode, PipelineConfig, SignalWeights};

/// Simultaneous faces counting as a "crowd" moment.
const CROWD_FACE_THRESHOLD: usize = 5;

/// Raw-signal bonus for crowd moments.
const CROWD_BONUS: f64 = 1.0;

/// Audio events closer than this merge into one applause span.
const APPLAUSE_MERGE_GAP_S: f64 = 0.5;

/// Spans shorter than this are ignored as isolated noise.
const APPLAUSE_MIN_DURATION_S: f64 = 0.5;

/// Raw-signal bonus for buckets covered by an applause span.
const APPLAUSE_BONUS: f64 = 1.0;

/// Produces the fused interest curve over a video's timeline.
pub struct HighlightScorer {
    bucket_s: f64,
    weights: SignalWeights,
    normalization: NormalizationMode,
}

impl HighlightScorer {
    /// Create a scorer from pipeline configuration.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            bucket_s: config.score_bucket_s,
            weights: config.signal_weights,
            normalization: config.normalization,
        }
    }

    /// Score the full timeline.
    ///
    /// `audio_energy` is per-window `(timestamp, rms)`; `frame_area` is the
    /// analysis-frame pixel area used for the face area-share term.
    #[allow(clippy::too_many_arguments)]
    pub fn score(
        &self,
        duration_s: f64,
        faces: &[Detection],
        frame_area: Option<f64>,
        audio_events: &[Detection],
        audio_energy: &[(f64, f64)],
        tracks: &[Track],
        guests: &[Guest],
    ) -> TimelineScore {
        let mut timeline = TimelineScore::zeroed(duration_s, self.bucket_s);
        if timeline.is_empty() {
            return timeline;
        }
        let buckets = timeline.len();

        let face_raw = self.face_signal(buckets, faces, frame_area);
        let audio_raw = self.audio_signal(buckets, audio_events, audio_energy);
        let occupancy = guest_occupancy(buckets, self.bucket_s, guests, tracks);
        let novelty_raw = novelty_signal(&occupancy);

        let face = normalize(&face_raw, self.normalization);
        let audio = normalize(&audio_raw, self.normalization);
        let novelty = normalize(&novelty_raw, self.normalization);

        let total_weight = self.weights.total();
        for (i, bucket) in timeline.buckets.iter_mut().enumerate() {
            *bucket = ScoreBucket {
                face: face[i],
                audio: audio[i],
                novelty: novelty[i],
                combined: (self.weights.face * face[i]
                    + self.weights.audio * audio[i]
                    + self.weights.novelty * novelty[i])
                    / total_weight,
            };
        }

        debug!(
            buckets = buckets,
            peak = timeline
                .buckets
                .iter()
                .map(|b| b.combined)
                .fold(0.0, f64::max),
            "Timeline scored"
        );
        timeline
    }

    /// Face density: mean simultaneous count per sampled frame plus area
    /// share, with a crowd bonus when a frame in the bucket reaches the
    /// crowd threshold.
    fn face_signal(&self, buckets: usize, faces: &[Detection], frame_area: Option<f64>) -> Vec<f64> {
        #[derive(Default)]
        struct FrameAgg {
            count: usize,
            area: f64,
        }

        // Group detections per sampled frame (exact timestamp). BTreeMap
        // keeps summation order stable so identical runs stay bit-identical.
        let mut frames: std::collections::BTreeMap<u64, (usize, FrameAgg)> =
            std::collections::BTreeMap::new();
        for det in faces {
            if !det.is_face() {
                continue;
            }
            let Some(bucket) = bucket_of(det.timestamp, self.bucket_s, buckets) else {
                continue;
            };
            let entry = frames
                .entry(det.timestamp.to_bits())
                .or_insert_with(|| (bucket, FrameAgg::default()));
            entry.1.count += 1;
            if let Some(region) = &det.region {
                entry.1.area += region.area();
            }
        }

        let mut raw = vec![0.0; buckets];
        let mut frames_per_bucket = vec![0usize; buckets];
        let mut max_simultaneous = vec![0usize; buckets];

        for (_, (bucket, agg)) in frames {
            frames_per_bucket[bucket] += 1;
            max_simultaneous[bucket] = max_simultaneous[bucket].max(agg.count);
            let area_share = frame_area
                .filter(|a| *a > 0.0)
                .map(|a| agg.area / a)
                .unwrap_or(0.0);
            raw[bucket] += agg.count as f64 + area_share;
        }

        for i in 0..buckets {
            if frames_per_bucket[i] > 0 {
                raw[i] /= frames_per_bucket[i] as f64;
                if max_simultaneous[i] >= CROWD_FACE_THRESHOLD {
                    raw[i] += CROWD_BONUS;
                }
            }
        }
        raw
    }

    /// Audio energy plus event confidence, with applause spans adding a
    /// sustained bonus over every bucket they cover.
    fn audio_signal(
        &self,
        buckets: usize,
        audio_events: &[Detection],
        audio_energy: &[(f64, f64)],
    ) -> Vec<f64> {
        let mut raw = vec![0.0; buckets];

        let mut rms_sum = vec![0.0; buckets];
        let mut rms_count = vec![0usize; buckets];
        for (ts, rms) in audio_energy {
            if let Some(bucket) = bucket_of(*ts, self.bucket_s, buckets) {
                rms_sum[bucket] += rms;
                rms_count[bucket] += 1;
            }
        }
        for i in 0..buckets {
            if rms_count[i] > 0 {
                raw[i] += rms_sum[i] / rms_count[i] as f64;
            }
        }

        for event in audio_events {
            if let Some(bucket) = bucket_of(event.timestamp, self.bucket_s, buckets) {
                raw[bucket] += event.confidence;
            }
        }

        for (start, end) in applause_spans(audio_events) {
            let first = bucket_of(start, self.bucket_s, buckets);
            let last = bucket_of(end, self.bucket_s, buckets);
            if let (Some(first), Some(last)) = (first, last) {
                for item in raw.iter_mut().take(last + 1).skip(first) {
                    *item += APPLAUSE_BONUS;
                }
            }
        }

        raw
    }
}

/// Group audio events into applause-like spans.
///
/// Events closer than the merge gap chain into one span; spans shorter than
/// the minimum duration are dropped.
pub(crate) fn applause_spans(audio_events: &[Detection]) -> Vec<(f64, f64)> {
    let mut times: Vec<f64> = audio_events.iter().map(|d| d.timestamp).collect();
    times.sort_by(f64::total_cmp);

    let mut spans = Vec::new();
    let mut current: Option<(f64, f64)> = None;

    for t in times {
        match current {
            None => current = Some((t, t)),
            Some((start, end)) if t - end < APPLAUSE_MERGE_GAP_S => {
                current = Some((start, t));
            }
            Some((start, end)) => {
                if end - start >= APPLAUSE_MIN_DURATION_S {
                    spans.push((start, end));
                }
                current = Some((t, t));
            }
        }
    }
    if let Some((start, end)) = current {
        if end - start >= APPLAUSE_MIN_DURATION_S {
            spans.push((start, end));
        }
    }
    spans
}

/// Which guests are on screen in each bucket, derived from member track
/// spans. Used for the novelty signal and the selector's diversity rule.
pub fn guest_occupancy(
    buckets: usize,
    bucket_s: f64,
    guests: &[Guest],
    tracks: &[Track],
) -> Vec<BTreeSet<GuestId>> {
    let by_id: HashMap<TrackId, &Track> = tracks.iter().map(|t| (t.id, t)).collect();
    let mut occupancy = vec![BTreeSet::new(); buckets];

    for guest in guests {
        for track_id in &guest.member_tracks {
            let Some(track) = by_id.get(track_id) else {
                continue;
            };
            let Some(first) = bucket_of(track.start_ts, bucket_s, buckets) else {
                continue;
            };
            let last = bucket_of(track.end_ts, bucket_s, buckets).unwrap_or(buckets - 1);
            for slot in occupancy.iter_mut().take(last + 1).skip(first) {
                slot.insert(guest.id);
            }
        }
    }
    occupancy
}

/// Novelty: high while a bucket's guests are fresh, decaying as they
/// accumulate screen presence earlier in the timeline.
fn novelty_signal(occupancy: &[BTreeSet<GuestId>]) -> Vec<f64> {
    let mut prior: HashMap<GuestId, u64> = HashMap::new();
    let mut raw = vec![0.0; occupancy.len()];

    for (i, present) in occupancy.iter().enumerate() {
        if present.is_empty() {
            continue;
        }
        let mean_prior: f64 = present
            .iter()
            .map(|g| *prior.get(g).unwrap_or(&0) as f64)
            .sum::<f64>()
            / present.len() as f64;
        raw[i] = 1.0 / (1.0 + mean_prior);

        for g in present {
            *prior.entry(*g).or_insert(0) += 1;
        }
    }
    raw
}

/// Scale raw values to [0, 1] over the whole timeline.
fn normalize(raw: &[f64], mode: NormalizationMode) -> Vec<f64> {
    if raw.is_empty() {
        return Vec::new();
    }

    let (lo, hi) = match mode {
        NormalizationMode::MinMax => {
            let lo = raw.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (lo, hi)
        }
        NormalizationMode::Percentile => {
            let mut sorted: Vec<f64> = raw.to_vec();
            sorted.sort_by(f64::total_cmp);
            let lo = percentile(&sorted, 0.05);
            let hi = percentile(&sorted, 0.95);
            if hi > lo {
                (lo, hi)
            } else {
                // Degenerate spread; fall back to full range.
                (sorted[0], sorted[sorted.len() - 1])
            }
        }
    };

    if hi <= lo {
        // Constant signal: all zero stays zero, any other constant is
        // maximally present everywhere.
        let value = if hi > 0.0 { 1.0 } else { 0.0 };
        return vec![value; raw.len()];
    }

    raw.iter()
        .map(|v| ((v - lo) / (hi - lo)).clamp(0.0, 1.0))
        .collect()
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let idx = pos.floor() as usize;
    let frac = pos - idx as f64;
    if idx + 1 < sorted.len() {
        sorted[idx] * (1.0 - frac) + sorted[idx + 1] * frac
    } else {
        sorted[idx]
    }
}

fn bucket_of(timestamp: f64, bucket_s: f64, buckets: usize) -> Option<usize> {
    if timestamp < 0.0 || bucket_s <= 0.0 {
        return None;
    }
    let idx = (timestamp / bucket_s) as usize;
    (idx < buckets).then_some(idx)
}
