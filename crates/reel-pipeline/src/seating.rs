//! Seating-map collaborator interface and camera calibration.
//!
//! The seating map is an external collaborator: the pipeline issues
//! read-only spatial queries and never mutates seat state. Camera
//! calibrations map frame pixels into the collaborator's floor-plan
//! coordinate space and are supplied externally per camera.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use reel_models::{CameraId, SeatRef};

/// Read-only spatial query into the seating map.
pub trait SeatingMap: Send + Sync {
    /// Nearest seat to a floor-plan point as seen from `camera_id`, if the
    /// map knows one.
    fn lookup_seat(&self, camera_id: &CameraId, x: f64, y: f64) -> Option<SeatRef>;
}

/// Affine pixel-to-floor-plan transform for one camera.
///
/// Kept explicit and reversible-in-spirit: floor = pixel * scale + offset,
/// per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub scale_x: f64,
    pub scale_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl CameraCalibration {
    /// Identity transform (pixels already in floor-plan units).
    pub fn identity() -> Self {
        Self { scale_x: 1.0, scale_y: 1.0, offset_x: 0.0, offset_y: 0.0 }
    }

    /// Map a pixel position to floor-plan coordinates.
    pub fn map(&self, x_px: f64, y_px: f64) -> (f64, f64) {
        (
            x_px * self.scale_x + self.offset_x,
            y_px * self.scale_y + self.offset_y,
        )
    }
}

/// In-memory seating map over a fixed seat list.
///
/// Reference implementation of the collaborator interface; answers every
/// camera with the globally nearest seat.
#[derive(Debug, Clone, Default)]
pub struct StaticSeatingMap {
    seats: Vec<SeatRef>,
}

impl StaticSeatingMap {
    /// Create a map over the given seats.
    pub fn new(seats: Vec<SeatRef>) -> Self {
        Self { seats }
    }

    /// Number of seats.
    pub fn len(&self) -> usize {
        self.seats.len()
    }

    /// Whether the map has no seats.
    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }
}

impl SeatingMap for StaticSeatingMap {
    fn lookup_seat(&self, _camera_id: &CameraId, x: f64, y: f64) -> Option<SeatRef> {
        self.seats
            .iter()
            .min_by(|a, b| a.distance_to(x, y).total_cmp(&b.distance_to(x, y)))
            .cloned()
    }
}

/// Calibrations by camera, as handed to the clusterer.
pub type CalibrationSet = HashMap<CameraId, CameraCalibration>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_map() {
        let cal = CameraCalibration {
            scale_x: 0.01,
            scale_y: 0.02,
            offset_x: 5.0,
            offset_y: -1.0,
        };
        let (x, y) = cal.map(100.0, 50.0);
        assert!((x - 6.0).abs() < 1e-9);
        assert!((y - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_static_map_returns_nearest() {
        let map = StaticSeatingMap::new(vec![
            SeatRef::new("t1-s1", 0.0, 0.0),
            SeatRef::new("t1-s2", 10.0, 0.0),
        ]);
        let seat = map.lookup_seat(&CameraId::new("cam-a"), 9.0, 1.0).unwrap();
        assert_eq!(seat.seat_id, "t1-s2");
    }

    #[test]
    fn test_empty_map_returns_none() {
        let map = StaticSeatingMap::default();
        assert!(map.lookup_seat(&CameraId::new("cam-a"), 0.0, 0.0).is_none());
    }
}
