//! Structured run logging utilities.

use tracing::{error, info, warn, Span};
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber from `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

/// Run logger for structured logging with consistent formatting.
///
/// Every pipeline run gets one, scoped to the run id and camera.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    camera: String,
}

impl RunLogger {
    /// Create a logger for a run on a camera.
    pub fn new(run_id: impl Into<String>, camera: impl Into<String>) -> Self {
        Self { run_id: run_id.into(), camera: camera.into() }
    }

    /// Log the start of a run stage.
    pub fn log_start(&self, message: &str) {
        info!(run_id = %self.run_id, camera = %self.camera, "Run started: {}", message);
    }

    /// Log a progress update.
    pub fn log_progress(&self, message: &str) {
        info!(run_id = %self.run_id, camera = %self.camera, "Run progress: {}", message);
    }

    /// Log a warning.
    pub fn log_warning(&self, message: &str) {
        warn!(run_id = %self.run_id, camera = %self.camera, "Run warning: {}", message);
    }

    /// Log an error.
    pub fn log_error(&self, message: &str) {
        error!(run_id = %self.run_id, camera = %self.camera, "Run error: {}", message);
    }

    /// Log run completion.
    pub fn log_completion(&self, message: &str) {
        info!(run_id = %self.run_id, camera = %self.camera, "Run completed: {}", message);
    }

    /// The run id.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Create a tracing span carrying run context.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("run", run_id = %self.run_id, camera = %self.camera)
    }
}
