//! Temporal association of face detections into tracks.
//!
//! Maintains a set of active tracks and greedily matches each frame's
//! detections against them on a combined bounding-region / embedding cost.
//! Tracks unmatched for longer than the occlusion tolerance are closed;
//! closed tracks shorter than the minimum duration are dropped as noise.

use tracing::debug;

use reel_models::{
    CameraId, Detection, Embedding, EmbeddingAccumulator, Track, TrackId,
};

use crate::config::PipelineConfig;

/// Embedding-distance term used when either side lacks an embedding.
const NEUTRAL_EMBEDDING_COST: f64 = 0.5;

/// A track still open for matching.
#[derive(Debug)]
struct ActiveTrack {
    id: TrackId,
    detections: Vec<Detection>,
    embedding_acc: EmbeddingAccumulator,
    last_ts: f64,
}

impl ActiveTrack {
    fn last_detection(&self) -> &Detection {
        // An active track always holds the detection that opened it.
        self.detections.last().expect("active track has detections")
    }
}

/// Builds face tracks from an ordered stream of per-frame detections.
///
/// One builder per video; single-threaded, consuming detection results as
/// an ordered stream.
pub struct TrackBuilder {
    camera_id: CameraId,
    occlusion_tolerance_s: f64,
    min_track_duration_s: f64,
    max_match_cost: f64,
    iou_weight: f64,
    embedding_weight: f64,
    active: Vec<ActiveTrack>,
    finished: Vec<Track>,
    next_id: u64,
    discarded: u64,
}

impl TrackBuilder {
    /// Create a builder for one camera's footage.
    pub fn new(config: &PipelineConfig, camera_id: CameraId) -> Self {
        Self {
            camera_id,
            occlusion_tolerance_s: config.occlusion_tolerance_s,
            min_track_duration_s: config.min_track_duration_s,
            max_match_cost: config.max_match_cost,
            iou_weight: config.iou_weight,
            embedding_weight: config.embedding_weight,
            active: Vec::new(),
            finished: Vec::new(),
            next_id: 0,
            discarded: 0,
        }
    }

    /// Feed one frame's face detections.
    ///
    /// `timestamp` must be strictly greater than any previously observed
    /// frame; detections without a bounding region are ignored.
    pub fn observe_frame(&mut self, timestamp: f64, detections: &[Detection]) {
        self.close_stale(timestamp);

        let usable: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.is_face() && d.region.is_some())
            .collect();

        if usable.is_empty() {
            return;
        }

        let assignments = self.match_detections(&usable);

        let mut claimed_dets = vec![false; usable.len()];
        for (active_idx, det_idx) in assignments {
            claimed_dets[det_idx] = true;
            let track = &mut self.active[active_idx];
            let det = usable[det_idx];
            // Out-of-order frames would break the time-order invariant;
            // drop the observation instead.
            if det.timestamp <= track.last_ts {
                continue;
            }
            if let Some(embedding) = &det.embedding {
                track.embedding_acc.push(embedding);
            }
            track.last_ts = det.timestamp;
            track.detections.push(det.clone());
        }

        for (det_idx, det) in usable.iter().enumerate() {
            if !claimed_dets[det_idx] {
                self.open_track(det);
            }
        }
    }

    /// Close everything and return finished tracks, sorted by id.
    pub fn finish(mut self) -> Vec<Track> {
        while let Some(track) = self.active.pop() {
            self.finalize(track);
        }
        self.finished.sort_by_key(|t| t.id);
        debug!(
            camera = %self.camera_id,
            tracks = self.finished.len(),
            discarded = self.discarded,
            "Track building finished"
        );
        self.finished
    }

    /// Number of currently active tracks.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Greedy minimum-cost assignment of detections to active tracks.
    ///
    /// Ties break on higher detection confidence, then leftmost region,
    /// then detection order, then track id, keeping runs deterministic.
    fn match_detections(&self, detections: &[&Detection]) -> Vec<(usize, usize)> {
        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();

        for (active_idx, track) in self.active.iter().enumerate() {
            let last = track.last_detection();
            for (det_idx, det) in detections.iter().enumerate() {
                let cost = self.association_cost(last, det);
                if cost <= self.max_match_cost {
                    candidates.push((cost, active_idx, det_idx));
                }
            }
        }

        candidates.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| {
                    let conf_a = detections[a.2].confidence;
                    let conf_b = detections[b.2].confidence;
                    conf_b.total_cmp(&conf_a)
                })
                .then_with(|| {
                    let cx_a = detections[a.2].region.map(|r| r.cx()).unwrap_or(0.0);
                    let cx_b = detections[b.2].region.map(|r| r.cx()).unwrap_or(0.0);
                    cx_a.total_cmp(&cx_b)
                })
                .then_with(|| a.2.cmp(&b.2))
                .then_with(|| self.active[a.1].id.cmp(&self.active[b.1].id))
        });

        let mut used_tracks = vec![false; self.active.len()];
        let mut used_dets = vec![false; detections.len()];
        let mut assignments = Vec::new();

        for (_, active_idx, det_idx) in candidates {
            if used_tracks[active_idx] || used_dets[det_idx] {
                continue;
            }
            used_tracks[active_idx] = true;
            used_dets[det_idx] = true;
            assignments.push((active_idx, det_idx));
        }

        assignments
    }

    /// Weighted association cost in [0, 1].
    fn association_cost(&self, last: &Detection, candidate: &Detection) -> f64 {
        let iou = match (last.region.as_ref(), candidate.region.as_ref()) {
            (Some(a), Some(b)) => a.iou(b),
            _ => 0.0,
        };
        let embedding_cost = match (last.embedding.as_ref(), candidate.embedding.as_ref()) {
            // Cosine distance spans [0, 2]; halve into [0, 1].
            (Some(a), Some(b)) => a.cosine_distance(b) / 2.0,
            _ => NEUTRAL_EMBEDDING_COST,
        };

        let total_weight = self.iou_weight + self.embedding_weight;
        (self.iou_weight * (1.0 - iou) + self.embedding_weight * embedding_cost) / total_weight
    }

    fn open_track(&mut self, det: &Detection) {
        let id = TrackId(self.next_id);
        self.next_id += 1;

        let mut embedding_acc = EmbeddingAccumulator::new();
        if let Some(embedding) = &det.embedding {
            embedding_acc.push(embedding);
        }

        self.active.push(ActiveTrack {
            id,
            detections: vec![det.clone()],
            embedding_acc,
            last_ts: det.timestamp,
        });
    }

    fn close_stale(&mut self, timestamp: f64) {
        let tolerance = self.occlusion_tolerance_s;
        let mut still_active = Vec::with_capacity(self.active.len());
        for track in self.active.drain(..) {
            if timestamp - track.last_ts > tolerance {
                let id = track.id;
                Self::finalize_into(
                    &mut self.finished,
                    &mut self.discarded,
                    &self.camera_id,
                    self.min_track_duration_s,
                    track,
                );
                debug!(track = %id, "Track closed after occlusion window");
            } else {
                still_active.push(track);
            }
        }
        self.active = still_active;
    }

    fn finalize(&mut self, track: ActiveTrack) {
        Self::finalize_into(
            &mut self.finished,
            &mut self.discarded,
            &self.camera_id,
            self.min_track_duration_s,
            track,
        );
    }

    fn finalize_into(
        finished: &mut Vec<Track>,
        discarded: &mut u64,
        camera_id: &CameraId,
        min_duration_s: f64,
        track: ActiveTrack,
    ) {
        let start_ts = track.detections.first().map(|d| d.timestamp).unwrap_or(0.0);
        let end_ts = track.last_ts;

        if end_ts - start_ts < min_duration_s {
            *discarded += 1;
            return;
        }

        let mean_embedding: Option<Embedding> = track.embedding_acc.mean();
        finished.push(Track {
            id: track.id,
            camera_id: camera_id.clone(),
            detections: track.detections,
            start_ts,
            end_ts,
            mean_embedding,
        });
    }
}
