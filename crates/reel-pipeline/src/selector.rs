//! Greedy highlight segment selection.
//!
//! Converts the scored timeline into a minimal set of non-overlapping
//! segments: repeatedly seed at the highest-scoring free bucket, grow the
//! seed across adjacent high-score buckets within the segment length
//! limits, then block the region plus the minimum gap. Selection stops when
//! the duration budget is exhausted or nothing clears the score floor.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use reel_models::{GuestId, Segment, TimelineScore};

use crate::config::PipelineConfig;

/// Chooses reel segments from a scored timeline.
pub struct SegmentSelector {
    min_total_s: f64,
    max_total_s: f64,
    min_seg_len_s: f64,
    max_seg_len_s: f64,
    min_gap_s: f64,
    max_segments_per_guest: usize,
    min_score_floor: f64,
}

impl SegmentSelector {
    /// Create a selector from pipeline configuration.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            min_total_s: config.min_total_s,
            max_total_s: config.max_total_s,
            min_seg_len_s: config.min_seg_len_s,
            max_seg_len_s: config.max_seg_len_s,
            min_gap_s: config.min_gap_s,
            max_segments_per_guest: config.max_segments_per_guest,
            min_score_floor: config.min_score_floor,
        }
    }

    /// Select non-overlapping segments, sorted by start time.
    ///
    /// `occupancy` carries the guests visible in each bucket (see
    /// `scorer::guest_occupancy`); it drives the diversity rule and the
    /// segments' `contributing_guests`.
    ///
    /// Never returns an empty set for a non-empty timeline: when nothing
    /// clears the floor, the single best window is returned regardless.
    pub fn select(
        &self,
        timeline: &TimelineScore,
        duration_s: f64,
        occupancy: &[BTreeSet<GuestId>],
    ) -> Vec<Segment> {
        let n = timeline.len();
        if n == 0 || duration_s <= 0.0 {
            return Vec::new();
        }

        let bucket_s = timeline.bucket_s;
        let min_buckets = ((self.min_seg_len_s / bucket_s).ceil() as usize).max(1);
        let max_buckets = ((self.max_seg_len_s / bucket_s).floor() as usize).max(min_buckets);
        let gap_buckets = (self.min_gap_s / bucket_s).ceil() as usize;

        let mut blocked = vec![false; n];
        let mut rejected_seeds: HashSet<usize> = HashSet::new();
        let mut guest_segment_counts: std::collections::HashMap<GuestId, usize> =
            std::collections::HashMap::new();
        let mut selected: Vec<Segment> = Vec::new();
        let mut total_s = 0.0;

        loop {
            let remaining_s = self.max_total_s - total_s;
            if remaining_s < self.min_seg_len_s {
                break;
            }
            let budget_buckets = ((remaining_s / bucket_s).floor() as usize).min(max_buckets);
            if budget_buckets < min_buckets {
                break;
            }

            let Some(seed) = best_seed(timeline, &blocked, &rejected_seeds, self.min_score_floor)
            else {
                break;
            };

            let Some((lo, hi)) = grow_region(
                timeline,
                &blocked,
                seed,
                min_buckets,
                budget_buckets,
                self.min_score_floor,
            ) else {
                rejected_seeds.insert(seed);
                continue;
            };

            // Diversity: a guest dominating more than the configured number
            // of segments stops earning new ones.
            let dominant = dominant_guests(occupancy, lo, hi);
            let over_quota = dominant.iter().any(|g| {
                guest_segment_counts.get(g).copied().unwrap_or(0) >= self.max_segments_per_guest
            });
            if over_quota {
                debug!(seed = seed, "Seed rejected by per-guest segment quota");
                rejected_seeds.insert(seed);
                continue;
            }

            for g in &dominant {
                *guest_segment_counts.entry(*g).or_insert(0) += 1;
            }

            let segment = self.build_segment(timeline, duration_s, occupancy, lo, hi);
            total_s += segment.duration_s();
            selected.push(segment);

            let block_lo = lo.saturating_sub(gap_buckets);
            let block_hi = (hi + gap_buckets).min(n - 1);
            for b in blocked.iter_mut().take(block_hi + 1).skip(block_lo) {
                *b = true;
            }
        }

        // Degenerate case: nothing cleared the floor. Return the single
        // best window rather than an empty reel.
        if selected.is_empty() {
            if let Some(seed) = best_seed(timeline, &blocked, &HashSet::new(), f64::NEG_INFINITY) {
                let budget_buckets =
                    ((self.max_total_s / bucket_s).floor() as usize).clamp(1, max_buckets);
                let min_b = min_buckets.min(n);
                if let Some((lo, hi)) = grow_region(
                    timeline,
                    &blocked,
                    seed,
                    min_b,
                    budget_buckets,
                    f64::NEG_INFINITY,
                ) {
                    selected.push(self.build_segment(timeline, duration_s, occupancy, lo, hi));
                }
            }
        }

        selected.sort_by(|a, b| a.start_ts.total_cmp(&b.start_ts));
        debug!(
            segments = selected.len(),
            total_s = selected.iter().map(|s| s.duration_s()).sum::<f64>(),
            target_min = self.min_total_s,
            target_max = self.max_total_s,
            "Segment selection complete"
        );
        selected
    }

    fn build_segment(
        &self,
        timeline: &TimelineScore,
        duration_s: f64,
        occupancy: &[BTreeSet<GuestId>],
        lo: usize,
        hi: usize,
    ) -> Segment {
        let bucket_s = timeline.bucket_s;
        let start_ts = lo as f64 * bucket_s;
        let end_ts = ((hi + 1) as f64 * bucket_s).min(duration_s).max(start_ts + bucket_s * 0.5);

        let score = (lo..=hi).map(|i| timeline.combined_at(i)).sum::<f64>() / (hi - lo + 1) as f64;

        let mut contributing_guests = BTreeSet::new();
        for slot in occupancy.iter().take(hi + 1).skip(lo) {
            contributing_guests.extend(slot.iter().copied());
        }

        Segment { start_ts, end_ts, score, contributing_guests }
    }
}

/// Highest-scoring eligible seed bucket; earlier index wins ties.
fn best_seed(
    timeline: &TimelineScore,
    blocked: &[bool],
    rejected: &HashSet<usize>,
    floor: f64,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for i in 0..timeline.len() {
        if blocked[i] || rejected.contains(&i) {
            continue;
        }
        let score = timeline.combined_at(i);
        if score < floor {
            continue;
        }
        let better = best.map(|(_, s)| score > s).unwrap_or(true);
        if better {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

/// Grow a seed bucket into a contiguous region.
///
/// Extends toward the higher-scoring neighbor while it clears the floor,
/// then pads below-floor buckets only as needed to reach the minimum
/// length. Returns `None` when blocked neighbors make the minimum length
/// unreachable.
fn grow_region(
    timeline: &TimelineScore,
    blocked: &[bool],
    seed: usize,
    min_buckets: usize,
    max_buckets: usize,
    floor: f64,
) -> Option<(usize, usize)> {
    let n = timeline.len();
    let (mut lo, mut hi) = (seed, seed);

    let free = |i: usize| -> bool { i < n && !blocked[i] };

    // Phase 1: absorb adjacent buckets that clear the floor on their own.
    while hi - lo + 1 < max_buckets {
        let left = (lo > 0 && free(lo - 1)).then(|| timeline.combined_at(lo - 1));
        let right = free(hi + 1).then(|| timeline.combined_at(hi + 1));

        let take_left = match (left, right) {
            (Some(l), Some(r)) if l >= floor || r >= floor => {
                if l >= floor && (r < floor || l >= r) {
                    Some(true)
                } else {
                    Some(false)
                }
            }
            (Some(l), None) if l >= floor => Some(true),
            (None, Some(r)) if r >= floor => Some(false),
            _ => None,
        };

        match take_left {
            Some(true) => lo -= 1,
            Some(false) => hi += 1,
            None => break,
        }
    }

    // Phase 2: pad to the minimum length with whatever free buckets exist,
    // preferring the higher-scoring side.
    while hi - lo + 1 < min_buckets {
        let left = (lo > 0 && free(lo - 1)).then(|| timeline.combined_at(lo - 1));
        let right = free(hi + 1).then(|| timeline.combined_at(hi + 1));

        match (left, right) {
            (Some(l), Some(r)) => {
                if l >= r {
                    lo -= 1;
                } else {
                    hi += 1;
                }
            }
            (Some(_), None) => lo -= 1,
            (None, Some(_)) => hi += 1,
            (None, None) => return None,
        }
    }

    Some((lo, hi))
}

/// Guests present in more than half of a region's buckets.
fn dominant_guests(occupancy: &[BTreeSet<GuestId>], lo: usize, hi: usize) -> Vec<GuestId> {
    let mut counts: std::collections::HashMap<GuestId, usize> = std::collections::HashMap::new();
    for slot in occupancy.iter().take(hi + 1).skip(lo) {
        for g in slot {
            *counts.entry(*g).or_insert(0) += 1;
        }
    }
    let span = hi - lo + 1;
    let mut dominant: Vec<GuestId> = counts
        .into_iter()
        .filter(|(_, c)| *c * 2 > span)
        .map(|(g, _)| g)
        .collect();
    dominant.sort();
    dominant
}
