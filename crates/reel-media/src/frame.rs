//! Sampled frame and audio-window types.

use image::GrayImage;

/// A video frame sampled at analysis resolution.
///
/// Frames are decoded as 8-bit luma at a downscaled grid; detection
/// backends and the adaptive sampler both work on this representation.
#[derive(Debug, Clone)]
pub struct SampledFrame {
    /// Source-relative timestamp in seconds.
    pub timestamp: f64,
    /// Index in the decoded stream (before adaptive dropping).
    pub index: u64,
    /// Luma pixels at analysis resolution.
    pub pixels: GrayImage,
}

impl SampledFrame {
    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Mean absolute luma difference against another frame.
    ///
    /// Returns 1.0 (maximum difference) on dimension mismatch so a resolution
    /// change always reads as activity.
    pub fn mean_abs_diff(&self, other: &SampledFrame) -> f64 {
        if self.pixels.dimensions() != other.pixels.dimensions() {
            return 1.0;
        }
        let total: u64 = self
            .pixels
            .as_raw()
            .iter()
            .zip(other.pixels.as_raw().iter())
            .map(|(a, b)| a.abs_diff(*b) as u64)
            .sum();
        let count = self.pixels.as_raw().len().max(1) as f64;
        total as f64 / count / 255.0
    }
}

/// A fixed-length mono audio window.
#[derive(Debug, Clone)]
pub struct AudioWindow {
    /// Source-relative timestamp of the window start, in seconds.
    pub timestamp: f64,
    /// Mono samples in [-1, 1].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioWindow {
    /// Window duration in seconds.
    pub fn duration_s(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Root-mean-square energy of the window.
    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.samples.iter().map(|s| (*s as f64) * (*s as f64)).sum();
        (sum_sq / self.samples.len() as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, image::Luma([value]))
    }

    #[test]
    fn test_mean_abs_diff_identical() {
        let a = SampledFrame { timestamp: 0.0, index: 0, pixels: gray(4, 4, 100) };
        let b = SampledFrame { timestamp: 0.1, index: 1, pixels: gray(4, 4, 100) };
        assert_eq!(a.mean_abs_diff(&b), 0.0);
    }

    #[test]
    fn test_mean_abs_diff_full_swing() {
        let a = SampledFrame { timestamp: 0.0, index: 0, pixels: gray(4, 4, 0) };
        let b = SampledFrame { timestamp: 0.1, index: 1, pixels: gray(4, 4, 255) };
        assert!((a.mean_abs_diff(&b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mean_abs_diff_dimension_mismatch() {
        let a = SampledFrame { timestamp: 0.0, index: 0, pixels: gray(4, 4, 0) };
        let b = SampledFrame { timestamp: 0.1, index: 1, pixels: gray(8, 8, 0) };
        assert_eq!(a.mean_abs_diff(&b), 1.0);
    }

    #[test]
    fn test_audio_window_rms() {
        let w = AudioWindow {
            timestamp: 0.0,
            samples: vec![0.5; 100],
            sample_rate: 100,
        };
        assert!((w.rms() - 0.5).abs() < 1e-9);
        assert!((w.duration_s() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_audio_window() {
        let w = AudioWindow { timestamp: 0.0, samples: vec![], sample_rate: 0 };
        assert_eq!(w.rms(), 0.0);
        assert_eq!(w.duration_s(), 0.0);
    }
}
