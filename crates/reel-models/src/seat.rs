//! Seat references from the seating-map collaborator.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// External reference into the seating-map collaborator.
///
/// Looked up, never mutated: the seating map owns seat state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeatRef {
    /// Collaborator-side seat identifier.
    pub seat_id: String,
    /// Floor-plan x-coordinate.
    pub x: f64,
    /// Floor-plan y-coordinate.
    pub y: f64,
}

impl SeatRef {
    /// Create a seat reference.
    pub fn new(seat_id: impl Into<String>, x: f64, y: f64) -> Self {
        Self { seat_id: seat_id.into(), x, y }
    }

    /// Euclidean distance to a floor-plan point.
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }
}
