//! Guest clustering and seat assignment.
//!
//! Merges finished tracks into guest identities by embedding similarity.
//! The one hard rule: two tracks overlapping in time on the same camera can
//! never be the same person. The clusterer refuses such merges, and the
//! final partition is re-validated so a violation surfaces as a
//! `LogicInvariant` error instead of silently shipping a bad identity.

use std::collections::HashMap;

use tracing::{debug, warn};

use reel_models::{EmbeddingAccumulator, Guest, GuestId, Track, TrackId};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::seating::{CalibrationSet, SeatingMap};

/// Clusters tracks into guests and assigns seats.
///
/// Runs once per video after all tracks are finalized; clustering is an
/// inherently whole-timeline step.
pub struct GuestClusterer {
    similarity_threshold: f64,
    seat_distance_tolerance: f64,
}

impl GuestClusterer {
    /// Create a clusterer from pipeline configuration.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            similarity_threshold: config.cluster_similarity_threshold,
            seat_distance_tolerance: config.seat_distance_tolerance,
        }
    }

    /// Partition tracks into guest identities.
    ///
    /// Greedy agglomeration in descending similarity order; candidate pairs
    /// below the similarity threshold, or with a same-camera temporal
    /// overlap anywhere between the two clusters, never merge. Tracks
    /// without an embedding each become their own guest.
    pub fn cluster(&self, tracks: &[Track]) -> PipelineResult<Vec<Guest>> {
        // cluster_of[i] = current cluster index of track i
        let mut cluster_of: Vec<usize> = (0..tracks.len()).collect();
        let mut members: Vec<Vec<usize>> = (0..tracks.len()).map(|i| vec![i]).collect();

        let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
        for i in 0..tracks.len() {
            let Some(emb_i) = tracks[i].mean_embedding.as_ref() else {
                continue;
            };
            for j in (i + 1)..tracks.len() {
                let Some(emb_j) = tracks[j].mean_embedding.as_ref() else {
                    continue;
                };
                let similarity = emb_i.cosine_similarity(emb_j);
                if similarity >= self.similarity_threshold {
                    pairs.push((similarity, i, j));
                }
            }
        }

        // Strongest matches first; equal similarity falls back to earlier
        // track ids for determinism.
        pairs.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        for (similarity, i, j) in pairs {
            let (a, b) = (cluster_of[i], cluster_of[j]);
            if a == b {
                continue;
            }
            let (dst, src) = if a < b { (a, b) } else { (b, a) };

            if !clusters_compatible(&members[dst], &members[src], tracks) {
                debug!(
                    track_a = %tracks[i].id,
                    track_b = %tracks[j].id,
                    similarity = similarity,
                    "Merge rejected: same-camera temporal overlap"
                );
                continue;
            }

            let moved = std::mem::take(&mut members[src]);
            for &t in &moved {
                cluster_of[t] = dst;
            }
            members[dst].extend(moved);
        }

        // Materialize guests in deterministic order (by smallest track id).
        let mut clusters: Vec<Vec<usize>> =
            members.into_iter().filter(|m| !m.is_empty()).collect();
        for cluster in &mut clusters {
            cluster.sort_by_key(|&t| tracks[t].id);
        }
        clusters.sort_by_key(|m| tracks[m[0]].id);

        let mut guests = Vec::with_capacity(clusters.len());
        for (idx, cluster) in clusters.iter().enumerate() {
            let mut acc = EmbeddingAccumulator::new();
            let mut guest = Guest::from_track(GuestId(idx as u64), tracks[cluster[0]].id, None);
            for &t in cluster {
                guest.member_tracks.insert(tracks[t].id);
                if let Some(embedding) = &tracks[t].mean_embedding {
                    acc.push(embedding);
                }
            }
            guest.representative_embedding = acc.mean();
            guests.push(guest);
        }

        validate_guests(&guests, tracks)?;

        debug!(tracks = tracks.len(), guests = guests.len(), "Clustering complete");
        Ok(guests)
    }

    /// Correlate each guest's mean face position with the seating map.
    ///
    /// A guest whose nearest seat lies beyond the distance tolerance, or
    /// whose camera lacks a calibration, keeps `assigned_seat = None`; seat
    /// assignment never blocks the rest of the pipeline.
    pub fn assign_seats(
        &self,
        guests: &mut [Guest],
        tracks: &[Track],
        calibrations: &CalibrationSet,
        seating: &dyn SeatingMap,
    ) {
        let by_id: HashMap<TrackId, &Track> = tracks.iter().map(|t| (t.id, t)).collect();

        for guest in guests.iter_mut() {
            let mut best: Option<(f64, reel_models::SeatRef)> = None;

            for track_id in &guest.member_tracks {
                let Some(track) = by_id.get(track_id) else {
                    continue;
                };
                let Some((px, py)) = track.mean_position() else {
                    continue;
                };
                let Some(calibration) = calibrations.get(&track.camera_id) else {
                    debug!(
                        camera = %track.camera_id,
                        "No calibration for camera, skipping seat correlation"
                    );
                    continue;
                };

                let (fx, fy) = calibration.map(px, py);
                if let Some(seat) = seating.lookup_seat(&track.camera_id, fx, fy) {
                    let distance = seat.distance_to(fx, fy);
                    let closer = best
                        .as_ref()
                        .map(|(d, _)| distance < *d)
                        .unwrap_or(true);
                    if closer {
                        best = Some((distance, seat));
                    }
                }
            }

            match best {
                Some((distance, seat)) if distance <= self.seat_distance_tolerance => {
                    guest.assigned_seat = Some(seat);
                }
                Some((distance, _)) => {
                    warn!(
                        guest = %guest.id,
                        distance = distance,
                        tolerance = self.seat_distance_tolerance,
                        "Nearest seat outside tolerance, leaving guest unseated"
                    );
                }
                None => {}
            }
        }
    }
}

/// Whether two clusters can merge: no cross pair may overlap in time on the
/// same camera (a guest cannot be in two places on one camera at once).
fn clusters_compatible(a: &[usize], b: &[usize], tracks: &[Track]) -> bool {
    for &i in a {
        for &j in b {
            let (ti, tj) = (&tracks[i], &tracks[j]);
            if ti.camera_id == tj.camera_id && ti.overlaps_in_time(tj) {
                return false;
            }
        }
    }
    true
}

/// Enforce the partition invariant over a finished clustering.
///
/// A guest holding two tracks that overlap in time on the same camera is a
/// logic fault in the clusterer, not a data fault; it is always fatal.
pub fn validate_guests(guests: &[Guest], tracks: &[Track]) -> PipelineResult<()> {
    let by_id: HashMap<TrackId, &Track> = tracks.iter().map(|t| (t.id, t)).collect();

    for guest in guests {
        let member: Vec<&Track> = guest
            .member_tracks
            .iter()
            .filter_map(|id| by_id.get(id).copied())
            .collect();
        for (i, a) in member.iter().enumerate() {
            for b in member.iter().skip(i + 1) {
                if a.camera_id == b.camera_id && a.overlaps_in_time(b) {
                    return Err(PipelineError::logic_invariant(format!(
                        "{} holds same-camera overlapping tracks {} and {} on {}",
                        guest.id, a.id, b.id, a.camera_id
                    )));
                }
            }
        }
    }
    Ok(())
}
