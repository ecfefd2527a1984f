//! Clustered guest identities.

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::embedding::Embedding;
use crate::seat::SeatRef;
use crate::track::TrackId;

/// Identifier of a clustered guest, unique within one pipeline run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct GuestId(pub u64);

impl std::fmt::Display for GuestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "guest-{}", self.0)
    }
}

/// An identity spanning one or more tracks, possibly across cameras.
///
/// Created by the guest clusterer, mutated only during clustering, and
/// immutable after the pipeline completes. The pipeline guarantees
/// consistent clustering of appearances, not ground-truth naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guest {
    /// Run-unique identifier.
    pub id: GuestId,
    /// Tracks merged into this identity.
    pub member_tracks: BTreeSet<TrackId>,
    /// Representative embedding (mean over member tracks).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub representative_embedding: Option<Embedding>,
    /// Best-guess seat, when the seating map resolved one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_seat: Option<SeatRef>,
}

impl Guest {
    /// Create a guest seeded from a single track.
    pub fn from_track(id: GuestId, track: TrackId, embedding: Option<Embedding>) -> Self {
        let mut member_tracks = BTreeSet::new();
        member_tracks.insert(track);
        Self {
            id,
            member_tracks,
            representative_embedding: embedding,
            assigned_seat: None,
        }
    }

    /// Number of member tracks.
    pub fn track_count(&self) -> usize {
        self.member_tracks.len()
    }
}
