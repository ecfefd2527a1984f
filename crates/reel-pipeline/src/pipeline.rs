//! Pipeline orchestration.
//!
//! Wires the samplers, detection worker pool, track builder, clusterer,
//! scorer, selector and assembler into one run per video. Detection calls
//! fan out over a small worker pool; track building consumes their results
//! as an ordered stream; clustering is a synchronous barrier once all
//! tracks are final.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use metrics::{counter, histogram};
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

use reel_media::{
    AudioSampler, AudioWindow, CancelToken, DetectionAdapter, DetectionBackend, FrameSampler,
    MediaError, SampledFrame,
};
use reel_media::retry::RetryConfig;
use reel_models::{
    CameraId, Detection, Guest, MediaSource, ReelPlan, TimelineScore, Track,
};

use crate::assembler::ReelAssembler;
use crate::cluster::GuestClusterer;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::RunLogger;
use crate::scorer::{guest_occupancy, HighlightScorer};
use crate::seating::{CalibrationSet, SeatingMap};
use crate::selector::SegmentSelector;
use crate::tracker::TrackBuilder;

/// Result of one video's pipeline run.
///
/// A demux failure mid-stream leaves `demux_error` set while the plan is
/// still built from everything sampled before the failure point.
#[derive(Debug)]
pub struct RunOutcome {
    /// The assembled edit plan.
    pub plan: ReelPlan,
    /// Clustered guest identities with seat assignments.
    pub guests: Vec<Guest>,
    /// Finished face tracks.
    pub tracks: Vec<Track>,
    /// The scored timeline the segments were chosen from.
    pub timeline: TimelineScore,
    /// Detection units that degraded to zero detections.
    pub degraded_units: u64,
    /// Mid-stream demux failure, when the plan is partial.
    pub demux_error: Option<MediaError>,
}

/// One video's analysis pipeline.
pub struct Pipeline {
    config: PipelineConfig,
}

struct VideoStageOutput {
    tracks: Vec<Track>,
    faces: Vec<Detection>,
    frame_area: Option<f64>,
    degraded: u64,
    demux_error: Option<MediaError>,
    last_ts: f64,
}

struct AudioStageOutput {
    events: Vec<Detection>,
    energy: Vec<(f64, f64)>,
    degraded: u64,
    demux_error: Option<MediaError>,
}

impl Pipeline {
    /// Create a pipeline, validating configuration fail-fast.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline against an opened media source.
    pub async fn run(
        &self,
        source: &MediaSource,
        backend: Arc<dyn DetectionBackend>,
        seating: Arc<dyn SeatingMap>,
        calibrations: &CalibrationSet,
        cancel: CancelToken,
    ) -> PipelineResult<RunOutcome> {
        let frames = FrameSampler::spawn(
            source,
            self.config.sampling_policy,
            self.config.sample_queue_capacity,
            cancel.clone(),
        )?;
        let windows = if source.has_audio() {
            Some(AudioSampler::spawn(
                source,
                self.config.audio_window_s,
                self.config.sample_queue_capacity,
                cancel.clone(),
            )?)
        } else {
            None
        };

        self.run_with_streams(
            source.camera_id.clone(),
            source.duration_s,
            frames,
            windows,
            backend,
            seating,
            calibrations,
            cancel,
        )
        .await
    }

    /// Run the analysis stages against already-open sample streams.
    ///
    /// Split out from `run` so alternative frame sources (or tests) can
    /// drive the pipeline without a container file.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_with_streams(
        &self,
        camera_id: CameraId,
        duration_s: f64,
        frames: mpsc::Receiver<Result<SampledFrame, MediaError>>,
        windows: Option<mpsc::Receiver<Result<AudioWindow, MediaError>>>,
        backend: Arc<dyn DetectionBackend>,
        seating: Arc<dyn SeatingMap>,
        calibrations: &CalibrationSet,
        cancel: CancelToken,
    ) -> PipelineResult<RunOutcome> {
        let started = Instant::now();
        let logger = RunLogger::new(Uuid::new_v4().to_string(), camera_id.to_string());
        logger.log_start(&format!(
            "analyzing {:.1}s of footage with backend '{}'",
            duration_s,
            backend.name()
        ));
        counter!("reel_runs_total").increment(1);

        if duration_s <= 0.0 {
            logger.log_completion("zero-duration source, empty reel");
            return Ok(RunOutcome {
                plan: ReelAssembler::new(&self.config).assemble(Vec::new()),
                guests: Vec::new(),
                tracks: Vec::new(),
                timeline: TimelineScore::zeroed(0.0, self.config.score_bucket_s),
                degraded_units: 0,
                demux_error: None,
            });
        }

        let retry = RetryConfig::new("detect")
            .with_max_retries(self.config.detection_retry_limit);
        let adapter = Arc::new(DetectionAdapter::with_retry(backend, retry));
        let workers = self.config.max_detection_workers;

        let video_task = tokio::spawn(video_stage(
            frames,
            Arc::clone(&adapter),
            self.config.clone(),
            camera_id.clone(),
            workers,
            cancel.clone(),
        ));
        let audio_task = tokio::spawn(audio_stage(windows, adapter, workers, cancel.clone()));

        let (video_out, audio_out) = tokio::try_join!(video_task, audio_task)?;
        let video_out = video_out?;
        let audio_out = audio_out?;

        let degraded_units = video_out.degraded + audio_out.degraded;
        let demux_error = video_out.demux_error.or(audio_out.demux_error);
        if demux_error.is_some() {
            logger.log_warning("demux failed mid-stream, continuing with partial samples");
        }

        // The container sometimes under-reports duration; trust what was
        // actually observed when it runs longer.
        let effective_duration = duration_s.max(video_out.last_ts);

        // Whole-timeline barrier: clustering needs every track final.
        let clusterer = GuestClusterer::new(&self.config);
        let mut guests = clusterer.cluster(&video_out.tracks)?;
        clusterer.assign_seats(&mut guests, &video_out.tracks, calibrations, seating.as_ref());
        let seated = guests.iter().filter(|g| g.assigned_seat.is_some()).count();
        logger.log_progress(&format!(
            "{} tracks clustered into {} guests ({} seated)",
            video_out.tracks.len(),
            guests.len(),
            seated
        ));

        let scorer = HighlightScorer::new(&self.config);
        let timeline = scorer.score(
            effective_duration,
            &video_out.faces,
            video_out.frame_area,
            &audio_out.events,
            &audio_out.energy,
            &video_out.tracks,
            &guests,
        );

        let occupancy = guest_occupancy(
            timeline.len(),
            timeline.bucket_s,
            &guests,
            &video_out.tracks,
        );
        let segments =
            SegmentSelector::new(&self.config).select(&timeline, effective_duration, &occupancy);
        let plan = ReelAssembler::new(&self.config).assemble(segments);

        histogram!("reel_run_duration_seconds").record(started.elapsed().as_secs_f64());
        logger.log_completion(&format!(
            "{} segments, {:.1}s reel, {} degraded units",
            plan.len(),
            plan.total_duration_s,
            degraded_units
        ));

        Ok(RunOutcome {
            plan,
            guests,
            tracks: video_out.tracks,
            timeline,
            degraded_units,
            demux_error,
        })
    }
}

/// Detection + track building over the frame stream.
///
/// Frames are detected in small parallel batches; results are consumed in
/// frame order, keeping track building deterministic.
async fn video_stage(
    mut frames: mpsc::Receiver<Result<SampledFrame, MediaError>>,
    adapter: Arc<DetectionAdapter>,
    config: PipelineConfig,
    camera_id: CameraId,
    workers: usize,
    cancel: CancelToken,
) -> PipelineResult<VideoStageOutput> {
    let mut builder = TrackBuilder::new(&config, camera_id);
    let mut faces: Vec<Detection> = Vec::new();
    let mut frame_area: Option<f64> = None;
    let mut degraded: u64 = 0;
    let mut demux_error: Option<MediaError> = None;
    let mut last_ts: f64 = 0.0;

    let mut batch: Vec<SampledFrame> = Vec::with_capacity(workers);
    let mut done = false;

    while !done {
        batch.clear();
        while batch.len() < workers {
            if cancel.is_cancelled() {
                return Err(MediaError::Cancelled.into());
            }
            match frames.recv().await {
                Some(Ok(frame)) => batch.push(frame),
                Some(Err(MediaError::Cancelled)) => return Err(MediaError::Cancelled.into()),
                Some(Err(e @ MediaError::UnsupportedCodec { .. })) => {
                    demux_error = Some(e);
                    done = true;
                    break;
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    done = true;
                    break;
                }
            }
        }
        if batch.is_empty() {
            break;
        }

        if frame_area.is_none() {
            let first = &batch[0];
            frame_area = Some(first.width() as f64 * first.height() as f64);
        }

        let outputs = join_all(batch.iter().map(|f| adapter.detect_faces(f))).await;
        for (frame, output) in batch.iter().zip(outputs) {
            if output.degraded {
                degraded += 1;
            }
            last_ts = last_ts.max(frame.timestamp);
            builder.observe_frame(frame.timestamp, &output.detections);
            faces.extend(output.detections);
        }
    }

    let tracks = builder.finish();
    counter!("reel_tracks_built_total").increment(tracks.len() as u64);

    Ok(VideoStageOutput {
        tracks,
        faces,
        frame_area,
        degraded,
        demux_error,
        last_ts,
    })
}

/// Detection + energy measurement over the audio-window stream.
async fn audio_stage(
    windows: Option<mpsc::Receiver<Result<AudioWindow, MediaError>>>,
    adapter: Arc<DetectionAdapter>,
    workers: usize,
    cancel: CancelToken,
) -> PipelineResult<AudioStageOutput> {
    let Some(mut windows) = windows else {
        return Ok(AudioStageOutput {
            events: Vec::new(),
            energy: Vec::new(),
            degraded: 0,
            demux_error: None,
        });
    };

    let mut events: Vec<Detection> = Vec::new();
    let mut energy: Vec<(f64, f64)> = Vec::new();
    let mut degraded: u64 = 0;
    let mut demux_error: Option<MediaError> = None;

    let mut batch: Vec<AudioWindow> = Vec::with_capacity(workers);
    let mut done = false;

    while !done {
        batch.clear();
        while batch.len() < workers {
            if cancel.is_cancelled() {
                return Err(MediaError::Cancelled.into());
            }
            match windows.recv().await {
                Some(Ok(window)) => batch.push(window),
                Some(Err(MediaError::Cancelled)) => return Err(MediaError::Cancelled.into()),
                Some(Err(e @ MediaError::UnsupportedCodec { .. })) => {
                    demux_error = Some(e);
                    done = true;
                    break;
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    done = true;
                    break;
                }
            }
        }
        if batch.is_empty() {
            break;
        }

        let outputs = join_all(batch.iter().map(|w| adapter.detect_audio_events(w))).await;
        for (window, output) in batch.iter().zip(outputs) {
            if output.degraded {
                degraded += 1;
            }
            energy.push((window.timestamp, window.rms()));
            events.extend(output.detections);
        }
    }

    Ok(AudioStageOutput { events, energy, degraded, demux_error })
}

/// Process-wide runner enforcing the concurrent-video cap.
///
/// Each video's run is independent; no cross-video mutable state exists,
/// so the only shared resource is the permit pool.
pub struct PipelineRunner {
    pipeline: Arc<Pipeline>,
    permits: Arc<Semaphore>,
}

impl PipelineRunner {
    /// Create a runner, validating configuration fail-fast.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_videos));
        let pipeline = Arc::new(Pipeline::new(config)?);
        Ok(Self { pipeline, permits })
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        self.pipeline.config()
    }

    /// Run one video, waiting for a concurrency permit first.
    pub async fn run_video(
        &self,
        source: &MediaSource,
        backend: Arc<dyn DetectionBackend>,
        seating: Arc<dyn SeatingMap>,
        calibrations: &CalibrationSet,
        cancel: CancelToken,
    ) -> PipelineResult<RunOutcome> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PipelineError::logic_invariant("runner permit pool closed"))?;

        let outcome = self
            .pipeline
            .run(source, backend, seating, calibrations, cancel)
            .await;

        if let Err(e) = &outcome {
            warn!(error = %e, path = %source.path.display(), "Video run failed");
            counter!("reel_runs_failed_total").increment(1);
        } else {
            info!(path = %source.path.display(), "Video run finished");
        }
        outcome
    }
}

/// Build a calibration set that treats every listed camera's pixels as
/// floor-plan units. Convenience for single-camera setups and tests.
pub fn identity_calibrations(cameras: &[CameraId]) -> CalibrationSet {
    let mut set = HashMap::new();
    for camera in cameras {
        set.insert(camera.clone(), crate::seating::CameraCalibration::identity());
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use reel_media::MediaResult;

    use crate::seating::StaticSeatingMap;

    struct NullBackend;

    #[async_trait]
    impl DetectionBackend for NullBackend {
        async fn detect_faces(&self, _frame: &SampledFrame) -> MediaResult<Vec<Detection>> {
            Ok(Vec::new())
        }

        async fn detect_audio_events(
            &self,
            _window: &AudioWindow,
        ) -> MediaResult<Vec<Detection>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &'static str {
            "null"
        }
    }

    #[tokio::test]
    async fn test_zero_duration_source_yields_empty_plan() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let (_tx, rx) = mpsc::channel(1);

        let outcome = pipeline
            .run_with_streams(
                CameraId::new("cam-a"),
                0.0,
                rx,
                None,
                Arc::new(NullBackend),
                Arc::new(StaticSeatingMap::default()),
                &CalibrationSet::new(),
                CancelToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.plan.is_empty());
        assert!(outcome.guests.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_fast() {
        let config = PipelineConfig {
            min_total_s: 100.0,
            max_total_s: 50.0,
            ..Default::default()
        };
        assert!(matches!(
            Pipeline::new(config),
            Err(PipelineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_stream_aborts_run() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let (tx, rx) = mpsc::channel(1);
        tx.send(Err(MediaError::Cancelled)).await.unwrap();
        drop(tx);

        let err = pipeline
            .run_with_streams(
                CameraId::new("cam-a"),
                60.0,
                rx,
                None,
                Arc::new(NullBackend),
                Arc::new(StaticSeatingMap::default()),
                &CalibrationSet::new(),
                CancelToken::new(),
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_identity_calibrations() {
        let set = identity_calibrations(&[CameraId::new("cam-a"), CameraId::new("cam-b")]);
        assert_eq!(set.len(), 2);
    }
}
