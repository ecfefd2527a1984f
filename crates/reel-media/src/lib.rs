//! Media ingestion for the event reel pipeline.
//!
//! Provides:
//! - `probe::open` — ffprobe-backed `MediaSource` creation
//! - `sampler` — lazy, backpressured frame and audio-window streams
//! - `backend` — the pluggable detection capability interface
//! - `adapter` — retry-then-degrade wrapper around detection backends

pub mod adapter;
pub mod backend;
pub mod cancel;
pub mod error;
pub mod frame;
pub mod probe;
pub mod retry;
pub mod sampler;

pub use adapter::DetectionAdapter;
pub use backend::DetectionBackend;
pub use cancel::CancelToken;
pub use error::{MediaError, MediaResult};
pub use frame::{AudioWindow, SampledFrame};
pub use probe::open;
pub use sampler::{AudioSampler, FrameSampler, SamplingPolicy};
