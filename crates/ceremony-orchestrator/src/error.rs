//! Error types for the ceremony orchestrator

use thiserror::Error;

use ceremony_core::{ConfigError, ContextError, EngineError, NetworkError, SyncError};

use crate::phase::Phase;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, CeremonyError>;

/// Errors that end an instance's phase sequence
#[derive(Debug, Error)]
pub enum CeremonyError {
    /// The local engine could not be started
    #[error("Node {sequence}: engine start failed: {source}")]
    EngineStart { sequence: u64, source: EngineError },

    /// No leader endpoint was received
    #[error("Node {sequence}: failed to learn leader endpoint: {source}")]
    Rendezvous { sequence: u64, source: SyncError },

    /// The liveness probe never succeeded
    #[error("Node {sequence} failed to start: no successful ping after {attempts} attempts")]
    LivenessExhausted { sequence: u64, attempts: u32 },

    /// The joint key generation failed
    #[error("Node {sequence}: ceremony failed: {source}")]
    Ceremony { sequence: u64, source: EngineError },

    /// The engine never produced a group descriptor
    #[error("Node {sequence}: no group descriptor after {attempts} attempts")]
    GroupUnavailable { sequence: u64, attempts: u32 },

    /// The group descriptor could not be persisted
    #[error("Node {sequence}: failed to persist group: {source}")]
    Persist { sequence: u64, source: ConfigError },

    /// The engine returned no output for the expected round
    #[error("Node {sequence}: failed to get beacon for round {round}")]
    OutputUnavailable { sequence: u64, round: u64 },

    /// Fetching the output errored
    #[error("Node {sequence}: beacon fetch for round {round} failed: {source}")]
    OutputFetch {
        sequence: u64,
        round: u64,
        source: EngineError,
    },

    /// A barrier or topic operation failed
    #[error("Sync failure during {phase}: {source}")]
    Sync { phase: Phase, source: SyncError },

    /// The network collaborator failed
    #[error("Network failure during {phase}: {source}")]
    Network { phase: Phase, source: NetworkError },

    /// Invalid parameters
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The run deadline elapsed or the run was cancelled
    #[error("{phase} interrupted: {reason}")]
    Interrupted { phase: Phase, reason: ContextError },

    /// A phase panicked
    #[error("Phase {phase} panicked: {message}")]
    Panicked { phase: Phase, message: String },
}

impl CeremonyError {
    /// Whether the error comes from the shared deadline rather than this instance
    pub fn is_global(&self) -> bool {
        matches!(self, CeremonyError::Interrupted { .. })
    }

    /// Sequence of the failing instance, when it was known
    pub fn sequence(&self) -> Option<u64> {
        match self {
            CeremonyError::EngineStart { sequence, .. }
            | CeremonyError::Rendezvous { sequence, .. }
            | CeremonyError::LivenessExhausted { sequence, .. }
            | CeremonyError::Ceremony { sequence, .. }
            | CeremonyError::GroupUnavailable { sequence, .. }
            | CeremonyError::Persist { sequence, .. }
            | CeremonyError::OutputUnavailable { sequence, .. }
            | CeremonyError::OutputFetch { sequence, .. } => Some(*sequence),
            _ => None,
        }
    }
}
