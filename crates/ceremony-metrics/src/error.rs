//! Error types for metric export

use thiserror::Error;

/// Result type alias for metric operations
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Errors that can occur while gathering or exporting metrics
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Collecting the snapshot failed
    #[error("Gather failed: {0}")]
    Gather(String),

    /// Writing points to the sink failed
    #[error("Sink write failed: {0}")]
    Sink(String),

    /// Metric registration failed
    #[error("Registration failed: {0}")]
    Registration(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for MetricsError {
    fn from(e: serde_json::Error) -> Self {
        MetricsError::Serialization(e.to_string())
    }
}
