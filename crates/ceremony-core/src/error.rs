//! Error types for harness collaborators

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised by the synchronization service
#[derive(Debug, Error)]
pub enum SyncError {
    /// The service has been shut down
    #[error("Sync service closed")]
    Closed,

    /// A topic subscription ended before a message arrived
    #[error("Topic closed: {0}")]
    TopicClosed(String),

    /// A message could not be encoded or decoded
    #[error("Payload error on topic {topic}: {reason}")]
    Payload { topic: String, reason: String },

    /// Barrier target is invalid
    #[error("Invalid barrier target {target} for state {state}")]
    InvalidTarget { state: String, target: usize },

    /// Transport-level failure
    #[error("Sync transport error: {0}")]
    Transport(String),
}

/// Errors raised by the network configuration collaborator
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Network never became ready
    #[error("Network not initialized: {0}")]
    NotInitialized(String),

    /// Applying the configuration failed
    #[error("Network configuration failed: {0}")]
    Configure(String),

    /// No address has been assigned yet
    #[error("No address assigned")]
    NoAddress,
}

/// Errors raised by the cryptographic ceremony engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine process could not start
    #[error("Engine start failed: {0}")]
    Start(String),

    /// Engine was used before start
    #[error("Engine not running")]
    NotRunning,

    /// The joint key generation failed
    #[error("Ceremony failed: {0}")]
    Ceremony(String),

    /// The ceremony did not finish in time
    #[error("Ceremony timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Output retrieval failed
    #[error("Output fetch failed: {0}")]
    Fetch(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned when a bounded wait is interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The shared run deadline elapsed
    #[error("Run deadline exceeded")]
    DeadlineExceeded,

    /// The run was cancelled
    #[error("Run cancelled")]
    Cancelled,
}

/// Configuration and data model errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML decode error
    #[error("TOML decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    /// TOML encode error
    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),
}
