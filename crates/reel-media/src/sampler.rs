//! Lazy, backpressured frame and audio-window sampling.
//!
//! Both samplers decode through an ffmpeg child process piping raw data to
//! stdout and deliver items over a bounded channel. A full channel blocks
//! the producer, which in turn blocks the decoder on the OS pipe, so a slow
//! detection stage pauses sampling instead of buffering unboundedly.
//! Streams are restartable only by re-opening the source.

use std::process::Stdio;

use image::GrayImage;
use metrics::counter;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use reel_models::MediaSource;

use crate::cancel::CancelToken;
use crate::error::{MediaError, MediaResult};
use crate::frame::{AudioWindow, SampledFrame};

/// Width of the analysis grid frames are downscaled to.
const ANALYSIS_WIDTH: u32 = 320;

/// How frames are drawn from the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingPolicy {
    /// Uniform sampling at the given rate.
    FixedFps(f64),
    /// Adaptive sampling: dense where inter-frame luma difference exceeds
    /// `diff_threshold`, sparse otherwise, bounded by `[min_fps, max_fps]`.
    AdaptiveMotion {
        min_fps: f64,
        max_fps: f64,
        diff_threshold: f64,
    },
}

impl SamplingPolicy {
    /// Rate the decoder runs at; adaptive mode decodes at `max_fps` and
    /// drops frames during quiet stretches.
    pub fn decode_fps(&self) -> f64 {
        match self {
            SamplingPolicy::FixedFps(fps) => *fps,
            SamplingPolicy::AdaptiveMotion { max_fps, .. } => *max_fps,
        }
    }

    /// Largest keep-stride adaptive mode may reach.
    fn max_stride(&self) -> u64 {
        match self {
            SamplingPolicy::FixedFps(_) => 1,
            SamplingPolicy::AdaptiveMotion { min_fps, max_fps, .. } => {
                if *min_fps > 0.0 {
                    (max_fps / min_fps).ceil().max(1.0) as u64
                } else {
                    1
                }
            }
        }
    }
}

/// Produces a lazy sequence of `(timestamp, frame)` from a media source.
pub struct FrameSampler;

impl FrameSampler {
    /// Spawn the sampling task.
    ///
    /// Items arrive over a bounded channel of `queue_capacity`. A demux
    /// failure mid-stream is delivered as a final
    /// `Err(MediaError::UnsupportedCodec)` after every successfully decoded
    /// frame (partial-failure tolerance).
    pub fn spawn(
        source: &MediaSource,
        policy: SamplingPolicy,
        queue_capacity: usize,
        cancel: CancelToken,
    ) -> MediaResult<mpsc::Receiver<MediaResult<SampledFrame>>> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let (width, height) = analysis_dimensions(source.width, source.height);
        let decode_fps = policy.decode_fps();

        let mut child = Command::new("ffmpeg")
            .args(["-nostdin", "-v", "error"])
            .arg("-i")
            .arg(&source.path)
            .args([
                "-vf",
                &format!("fps={decode_fps},scale={width}:{height}"),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "gray",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let path = source.path.clone();

        tokio::spawn(async move {
            let outcome = pump_frames(
                &mut child, &tx, policy, decode_fps, width, height, &cancel,
            )
            .await;

            match outcome {
                Ok(frames) => {
                    if let Err(e) = finish_child(&mut child, &path, frames, decode_fps).await {
                        let _ = tx.send(Err(e)).await;
                    }
                }
                Err(MediaError::Cancelled) => {
                    // Release the decoder right away.
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        Ok(rx)
    }
}

/// Read raw frames from the child, apply the sampling policy and deliver
/// kept frames. Returns the number of decoded frames.
async fn pump_frames(
    child: &mut Child,
    tx: &mpsc::Sender<MediaResult<SampledFrame>>,
    policy: SamplingPolicy,
    decode_fps: f64,
    width: u32,
    height: u32,
    cancel: &CancelToken,
) -> MediaResult<u64> {
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| MediaError::detection_failed("ffmpeg stdout missing"))?;

    let frame_bytes = (width * height) as usize;
    let mut buf = vec![0u8; frame_bytes];
    let mut index: u64 = 0;
    let mut stride: u64 = 1;
    let max_stride = policy.max_stride();
    let mut last_kept: Option<SampledFrame> = None;
    let mut next_keep: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            let _ = tx.send(Err(MediaError::Cancelled)).await;
            return Err(MediaError::Cancelled);
        }

        match stdout.read_exact(&mut buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(index),
            Err(e) => return Err(e.into()),
        }

        let timestamp = index as f64 / decode_fps;
        let keep = index >= next_keep;

        if keep {
            let pixels = GrayImage::from_raw(width, height, buf.clone())
                .ok_or_else(|| MediaError::detection_failed("frame buffer size mismatch"))?;
            let frame = SampledFrame { timestamp, index, pixels };

            if let SamplingPolicy::AdaptiveMotion { diff_threshold, .. } = policy {
                if let Some(prev) = &last_kept {
                    let diff = frame.mean_abs_diff(prev);
                    stride = if diff >= diff_threshold {
                        1
                    } else {
                        (stride * 2).min(max_stride)
                    };
                }
            }
            next_keep = index + stride;
            last_kept = Some(frame.clone());

            counter!("reel_frames_sampled_total").increment(1);
            if tx.send(Ok(frame)).await.is_err() {
                // Consumer gone; stop decoding.
                debug!("frame consumer dropped, stopping sampler");
                return Ok(index);
            }
        }

        index += 1;
    }
}

/// Inspect the exited decoder; a nonzero status after partial output is an
/// `UnsupportedCodec` demux failure.
async fn finish_child(
    child: &mut Child,
    path: &std::path::Path,
    frames_decoded: u64,
    decode_fps: f64,
) -> MediaResult<()> {
    let mut stderr_buf = Vec::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_end(&mut stderr_buf).await;
    }
    let status = child.wait().await?;

    if status.success() {
        return Ok(());
    }

    let message = String::from_utf8_lossy(&stderr_buf).trim().to_string();
    let failed_at_s = frames_decoded as f64 / decode_fps;
    warn!(
        path = %path.display(),
        failed_at_s = failed_at_s,
        "Demux failed mid-stream; delivered partial frames"
    );
    Err(MediaError::unsupported_codec(path, failed_at_s, message))
}

/// Produces fixed-length mono audio windows from a media source.
pub struct AudioSampler;

impl AudioSampler {
    /// Spawn the audio sampling task.
    ///
    /// Windows are `window_s` seconds of f32 mono at the source's sample
    /// rate (or 16 kHz when the container reports none). The final partial
    /// window is delivered as-is.
    pub fn spawn(
        source: &MediaSource,
        window_s: f64,
        queue_capacity: usize,
        cancel: CancelToken,
    ) -> MediaResult<mpsc::Receiver<MediaResult<AudioWindow>>> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let sample_rate = source.audio_sample_rate.unwrap_or(16_000);

        let mut child = Command::new("ffmpeg")
            .args(["-nostdin", "-v", "error"])
            .arg("-i")
            .arg(&source.path)
            .args([
                "-vn",
                "-f",
                "f32le",
                "-ac",
                "1",
                "-ar",
                &sample_rate.to_string(),
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let path = source.path.clone();

        tokio::spawn(async move {
            let outcome = pump_audio(&mut child, &tx, window_s, sample_rate, &cancel).await;

            match outcome {
                Ok(delivered_s) => {
                    if let Err(e) = finish_audio_child(&mut child, &path, delivered_s).await {
                        let _ = tx.send(Err(e)).await;
                    }
                }
                Err(MediaError::Cancelled) => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        Ok(rx)
    }
}

async fn pump_audio(
    child: &mut Child,
    tx: &mpsc::Sender<MediaResult<AudioWindow>>,
    window_s: f64,
    sample_rate: u32,
    cancel: &CancelToken,
) -> MediaResult<f64> {
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| MediaError::detection_failed("ffmpeg stdout missing"))?;

    let samples_per_window = ((window_s * sample_rate as f64) as usize).max(1);
    let mut byte_buf = vec![0u8; samples_per_window * 4];
    let mut window_index: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            let _ = tx.send(Err(MediaError::Cancelled)).await;
            return Err(MediaError::Cancelled);
        }

        let mut filled = 0usize;
        let eof = loop {
            match stdout.read(&mut byte_buf[filled..]).await {
                Ok(0) => break true,
                Ok(n) => {
                    filled += n;
                    if filled == byte_buf.len() {
                        break false;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };

        // Trailing bytes that don't form a whole sample are decoder noise.
        let whole = filled - filled % 4;
        if whole > 0 {
            let samples: Vec<f32> = byte_buf[..whole]
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();

            let window = AudioWindow {
                timestamp: window_index as f64 * window_s,
                samples,
                sample_rate,
            };
            if tx.send(Ok(window)).await.is_err() {
                debug!("audio consumer dropped, stopping sampler");
                return Ok(window_index as f64 * window_s);
            }
            window_index += 1;
        }

        if eof {
            return Ok(window_index as f64 * window_s);
        }
    }
}

async fn finish_audio_child(
    child: &mut Child,
    path: &std::path::Path,
    delivered_s: f64,
) -> MediaResult<()> {
    let mut stderr_buf = Vec::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_end(&mut stderr_buf).await;
    }
    let status = child.wait().await?;

    if status.success() {
        return Ok(());
    }

    let message = String::from_utf8_lossy(&stderr_buf).trim().to_string();
    Err(MediaError::unsupported_codec(path, delivered_s, message))
}

/// Downscale source dimensions to the analysis grid, keeping aspect ratio
/// and even dimensions.
fn analysis_dimensions(src_width: u32, src_height: u32) -> (u32, u32) {
    if src_width == 0 || src_height == 0 {
        return (ANALYSIS_WIDTH, ANALYSIS_WIDTH * 9 / 16);
    }
    let width = ANALYSIS_WIDTH.min(src_width);
    let height = ((src_height as f64 * width as f64 / src_width as f64) as u32).max(2);
    (width, height & !1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fps() {
        assert_eq!(SamplingPolicy::FixedFps(5.0).decode_fps(), 5.0);
        let adaptive = SamplingPolicy::AdaptiveMotion {
            min_fps: 1.0,
            max_fps: 8.0,
            diff_threshold: 0.05,
        };
        assert_eq!(adaptive.decode_fps(), 8.0);
    }

    #[test]
    fn test_max_stride() {
        let adaptive = SamplingPolicy::AdaptiveMotion {
            min_fps: 2.0,
            max_fps: 10.0,
            diff_threshold: 0.05,
        };
        assert_eq!(adaptive.max_stride(), 5);
        assert_eq!(SamplingPolicy::FixedFps(5.0).max_stride(), 1);
    }

    #[test]
    fn test_analysis_dimensions_aspect() {
        let (w, h) = analysis_dimensions(1920, 1080);
        assert_eq!(w, 320);
        assert_eq!(h, 180);
    }

    #[test]
    fn test_analysis_dimensions_small_source_not_upscaled() {
        let (w, h) = analysis_dimensions(160, 90);
        assert_eq!(w, 160);
        assert!(h <= 90);
    }

    #[test]
    fn test_analysis_dimensions_zero_source() {
        let (w, h) = analysis_dimensions(0, 0);
        assert!(w > 0 && h > 0);
    }
}
