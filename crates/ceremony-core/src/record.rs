//! Observability channel back to the harness

use tracing::{error, info};

/// Sink for run milestones and the final outcome
pub trait RunRecorder: Send + Sync {
    fn record_message(&self, message: &str);

    fn record_point(&self, name: &str, value: f64);

    /// The instance failed; `error` describes the failing phase
    fn record_failure(&self, error: &str);

    /// An unexpected environment failure
    fn record_crash(&self, error: &str);

    fn record_success(&self);
}

/// Recorder that emits every call as a `tracing` event
#[derive(Debug, Clone, Default)]
pub struct TracingRecorder {
    instance: Option<String>,
}

impl TracingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an instance label to every event
    pub fn for_instance(instance: impl Into<String>) -> Self {
        Self {
            instance: Some(instance.into()),
        }
    }

    fn instance(&self) -> &str {
        self.instance.as_deref().unwrap_or("-")
    }
}

impl RunRecorder for TracingRecorder {
    fn record_message(&self, message: &str) {
        info!(instance = self.instance(), "{}", message);
    }

    fn record_point(&self, name: &str, value: f64) {
        info!(instance = self.instance(), point = name, value, "Recorded point");
    }

    fn record_failure(&self, err: &str) {
        error!(instance = self.instance(), "Run failed: {}", err);
    }

    fn record_crash(&self, err: &str) {
        error!(instance = self.instance(), "Run crashed: {}", err);
    }

    fn record_success(&self) {
        info!(instance = self.instance(), "Run succeeded");
    }
}
