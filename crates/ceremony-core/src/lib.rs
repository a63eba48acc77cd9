//! Ceremony Core - Shared types and collaborator seams for the ceremony harness
//!
//! This crate provides:
//! - The data model shared by all instances (identity, endpoints, groups)
//! - Traits for the external collaborators: synchronization service,
//!   network configuration, cryptographic engine and the observability channel
//! - `RunContext`, the run-wide deadline and cancellation signal
//! - Harness configuration and round arithmetic

pub mod clock;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod network;
pub mod record;
pub mod round;
pub mod sync;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use config::{HarnessConfig, LinkShape, RunEnv, RunLabels, Subnet, CONFIG_ENV, GROUP_FILE};
pub use context::RunContext;
pub use engine::{CeremonyEngine, CeremonyParams, EngineResult, StartParams};
pub use error::{ConfigError, ContextError, EngineError, NetworkError, Result, SyncError};
pub use network::{NetworkClient, NetworkConfig};
pub use record::{RunRecorder, TracingRecorder};
pub use round::{current_round, genesis_wait, round_time, unix_seconds};
pub use sync::{Subscription, SyncResult, SyncService, SyncServiceExt, Topic};
pub use types::{
    threshold_for, BeaconOutput, CeremonyConfig, GroupDescriptor, InstanceIdentity,
    NetworkEndpoint, Participant, LEADER_SEQUENCE,
};
