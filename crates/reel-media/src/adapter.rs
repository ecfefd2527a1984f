//! Retry-then-degrade wrapper around detection backends.
//!
//! A single frame or window failing its detection call must never take the
//! run down: the adapter retries transient errors with backoff, then
//! degrades that unit to zero detections and moves on. Non-transient
//! backend errors skip the backoff schedule and degrade immediately.

use std::sync::Arc;
use std::sync::Mutex;

use metrics::counter;
use tracing::{debug, warn};

use reel_models::Detection;

use crate::backend::DetectionBackend;
use crate::error::MediaError;
use crate::frame::{AudioWindow, SampledFrame};
use crate::retry::{retry_async, RetryConfig, RetryResult};

/// Degrade warnings logged per unit kind before the stream goes quiet.
const DEGRADE_WARNINGS_BEFORE_QUIET: u32 = 5;

/// Outcome of one adapter call.
#[derive(Debug)]
pub struct AdapterOutput {
    /// Detections for the unit; empty when the unit degraded.
    pub detections: Vec<Detection>,
    /// Whether the retry budget was exhausted and the unit degraded.
    pub degraded: bool,
}

/// Throttles degrade warnings for one unit kind.
///
/// A backend outage degrades every frame in a row; after the first few
/// warnings the stream stays quiet until a unit succeeds again, so the log
/// carries the outage without a line per frame.
#[derive(Debug, Default)]
struct DegradeThrottle {
    consecutive: u32,
}

impl DegradeThrottle {
    /// Record a degraded unit; returns whether it should be logged at warn
    /// level.
    fn on_degrade(&mut self, unit: &'static str) -> bool {
        self.consecutive += 1;
        if self.consecutive == DEGRADE_WARNINGS_BEFORE_QUIET + 1 {
            warn!(
                unit = unit,
                "Suppressing further degrade warnings after {} consecutive failures",
                DEGRADE_WARNINGS_BEFORE_QUIET
            );
        }
        self.consecutive <= DEGRADE_WARNINGS_BEFORE_QUIET
    }

    /// Record a successful unit.
    fn on_success(&mut self, unit: &'static str) {
        if self.consecutive > DEGRADE_WARNINGS_BEFORE_QUIET {
            debug!(
                unit = unit,
                "Detection recovered after {} consecutive degraded units", self.consecutive
            );
        }
        self.consecutive = 0;
    }
}

/// Wraps a `DetectionBackend` with bounded retries and degradation.
pub struct DetectionAdapter {
    backend: Arc<dyn DetectionBackend>,
    retry: RetryConfig,
    face_throttle: Mutex<DegradeThrottle>,
    audio_throttle: Mutex<DegradeThrottle>,
}

impl DetectionAdapter {
    /// Wrap a backend with the default retry policy.
    pub fn new(backend: Arc<dyn DetectionBackend>) -> Self {
        Self::with_retry(backend, RetryConfig::new("detect"))
    }

    /// Wrap a backend with an explicit retry policy.
    pub fn with_retry(backend: Arc<dyn DetectionBackend>, retry: RetryConfig) -> Self {
        Self {
            backend,
            retry,
            face_throttle: Mutex::new(DegradeThrottle::default()),
            audio_throttle: Mutex::new(DegradeThrottle::default()),
        }
    }

    /// Backend name for logging.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Detect faces in a frame, degrading to empty on persistent failure.
    ///
    /// Returned regions are clamped to the frame so a backend reporting a
    /// box past the edge cannot skew downstream geometry.
    pub async fn detect_faces(&self, frame: &SampledFrame) -> AdapterOutput {
        let result = retry_async(&self.retry, MediaError::is_retryable, || {
            self.backend.detect_faces(frame)
        })
        .await;
        let frame_bounds = Some((frame.width(), frame.height()));
        self.resolve(result, "face", &self.face_throttle, frame_bounds, frame.timestamp)
    }

    /// Detect audio events in a window, degrading to empty on persistent
    /// failure.
    pub async fn detect_audio_events(&self, window: &AudioWindow) -> AdapterOutput {
        let result = retry_async(&self.retry, MediaError::is_retryable, || {
            self.backend.detect_audio_events(window)
        })
        .await;
        self.resolve(result, "audio", &self.audio_throttle, None, window.timestamp)
    }

    fn resolve(
        &self,
        result: RetryResult<Vec<Detection>, MediaError>,
        unit: &'static str,
        throttle: &Mutex<DegradeThrottle>,
        frame_bounds: Option<(u32, u32)>,
        timestamp: f64,
    ) -> AdapterOutput {
        match result {
            RetryResult::Success(detections) => {
                if let Ok(mut throttle) = throttle.lock() {
                    throttle.on_success(unit);
                }
                AdapterOutput {
                    detections: sanitize(detections, frame_bounds),
                    degraded: false,
                }
            }
            RetryResult::Failed { error, attempts } => {
                let log_warn = throttle
                    .lock()
                    .map(|mut t| t.on_degrade(unit))
                    .unwrap_or(true);
                if log_warn {
                    warn!(
                        backend = self.backend.name(),
                        unit = unit,
                        timestamp = timestamp,
                        attempts = attempts,
                        error = %error,
                        "Detection unit degraded to zero detections"
                    );
                } else {
                    debug!(
                        unit = unit,
                        timestamp = timestamp,
                        error = %error,
                        "Detection unit degraded (warnings suppressed)"
                    );
                }
                counter!("reel_detection_degraded_total", "unit" => unit).increment(1);
                AdapterOutput { detections: Vec::new(), degraded: true }
            }
        }
    }
}

/// Drop detections with out-of-range confidence and clamp face regions to
/// the frame, rather than letting a misbehaving backend skew scoring.
fn sanitize(detections: Vec<Detection>, frame_bounds: Option<(u32, u32)>) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.confidence.is_finite() && (0.0..=1.0).contains(&d.confidence))
        .map(|mut d| {
            if let (Some(region), Some((width, height))) = (d.region, frame_bounds) {
                d.region = Some(region.clamp(width, height));
            }
            d
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::GrayImage;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use reel_models::BoundingRegion;

    use crate::error::MediaResult;

    struct FlakyBackend {
        fail_first: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl DetectionBackend for FlakyBackend {
        async fn detect_faces(&self, frame: &SampledFrame) -> MediaResult<Vec<Detection>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(MediaError::detection_failed("backend timeout"));
            }
            Ok(vec![Detection::face(
                frame.timestamp,
                BoundingRegion::new(0.0, 0.0, 8.0, 8.0),
                0.9,
            )])
        }

        async fn detect_audio_events(&self, _window: &AudioWindow) -> MediaResult<Vec<Detection>> {
            Err(MediaError::detection_failed("always down"))
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn frame(ts: f64) -> SampledFrame {
        SampledFrame {
            timestamp: ts,
            index: 0,
            pixels: GrayImage::new(8, 8),
        }
    }

    fn fast_retry(max: u32) -> RetryConfig {
        RetryConfig::new("test")
            .with_max_retries(max)
            .with_base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let backend = Arc::new(FlakyBackend { fail_first: 1, calls: AtomicU32::new(0) });
        let adapter = DetectionAdapter::with_retry(backend, fast_retry(2));

        let out = adapter.detect_faces(&frame(1.0)).await;
        assert!(!out.degraded);
        assert_eq!(out.detections.len(), 1);
    }

    #[tokio::test]
    async fn test_persistent_failure_degrades_to_empty() {
        let backend = Arc::new(FlakyBackend { fail_first: u32::MAX, calls: AtomicU32::new(0) });
        let adapter = DetectionAdapter::with_retry(backend, fast_retry(1));

        let out = adapter.detect_faces(&frame(1.0)).await;
        assert!(out.degraded);
        assert!(out.detections.is_empty());
    }

    #[tokio::test]
    async fn test_audio_degrades_independently() {
        let backend = Arc::new(FlakyBackend { fail_first: 0, calls: AtomicU32::new(0) });
        let adapter = DetectionAdapter::with_retry(backend, fast_retry(1));

        let window = AudioWindow { timestamp: 0.0, samples: vec![0.0; 10], sample_rate: 10 };
        let out = adapter.detect_audio_events(&window).await;
        assert!(out.degraded);
    }

    struct PermanentlyBrokenBackend {
        calls: AtomicU32,
    }

    #[async_trait]
    impl DetectionBackend for PermanentlyBrokenBackend {
        async fn detect_faces(&self, _frame: &SampledFrame) -> MediaResult<Vec<Detection>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(MediaError::source_unreadable("/weights.onnx", "model missing"))
        }

        async fn detect_audio_events(&self, _window: &AudioWindow) -> MediaResult<Vec<Detection>> {
            Ok(vec![])
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_non_retryable_error_skips_backoff() {
        let backend = Arc::new(PermanentlyBrokenBackend { calls: AtomicU32::new(0) });
        let adapter = DetectionAdapter::with_retry(
            Arc::clone(&backend) as Arc<dyn DetectionBackend>,
            fast_retry(5),
        );

        let out = adapter.detect_faces(&frame(1.0)).await;
        assert!(out.degraded);
        // One attempt, no retries for a non-transient error.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    struct BadOutputBackend;

    #[async_trait]
    impl DetectionBackend for BadOutputBackend {
        async fn detect_faces(&self, frame: &SampledFrame) -> MediaResult<Vec<Detection>> {
            Ok(vec![
                Detection::face(frame.timestamp, BoundingRegion::new(0.0, 0.0, 8.0, 8.0), 1.7),
                Detection::face(frame.timestamp, BoundingRegion::new(0.0, 0.0, 8.0, 8.0), f64::NAN),
                Detection::face(frame.timestamp, BoundingRegion::new(-4.0, 2.0, 6.0, 6.0), 0.8),
            ])
        }

        async fn detect_audio_events(&self, _window: &AudioWindow) -> MediaResult<Vec<Detection>> {
            Ok(vec![])
        }

        fn name(&self) -> &'static str {
            "bad-output"
        }
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_dropped_and_region_clamped() {
        let adapter = DetectionAdapter::new(Arc::new(BadOutputBackend));
        let out = adapter.detect_faces(&frame(0.0)).await;

        assert_eq!(out.detections.len(), 1);
        let det = &out.detections[0];
        assert!((det.confidence - 0.8).abs() < 1e-9);
        // Region hung off the left edge of the 8x8 frame; clamped back in.
        let region = det.region.unwrap();
        assert_eq!(region.x, 0.0);
        assert_eq!(region.width, 6.0);
    }

    #[tokio::test]
    async fn test_degrade_warnings_throttle_and_reset() {
        let backend = Arc::new(FlakyBackend { fail_first: u32::MAX, calls: AtomicU32::new(0) });
        let adapter = DetectionAdapter::with_retry(backend, fast_retry(0));

        for i in 0..(DEGRADE_WARNINGS_BEFORE_QUIET + 3) {
            adapter.detect_faces(&frame(i as f64)).await;
        }
        let consecutive = adapter.face_throttle.lock().unwrap().consecutive;
        assert_eq!(consecutive, DEGRADE_WARNINGS_BEFORE_QUIET + 3);

        // A success resets the throttle.
        let good = Arc::new(FlakyBackend { fail_first: 0, calls: AtomicU32::new(0) });
        let adapter = DetectionAdapter::with_retry(good, fast_retry(0));
        adapter.detect_faces(&frame(0.0)).await;
        assert_eq!(adapter.face_throttle.lock().unwrap().consecutive, 0);
    }
}
