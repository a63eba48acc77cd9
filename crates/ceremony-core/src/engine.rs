//! Cryptographic ceremony engine collaborator

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::types::{BeaconOutput, GroupDescriptor, NetworkEndpoint};

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Arguments for starting the local engine
#[derive(Debug, Clone)]
pub struct StartParams {
    /// This instance's sequence number
    pub self_index: u64,

    /// Output period the engine will run with
    pub period: Duration,

    /// Directory for the engine's key material
    pub workdir: PathBuf,

    /// Address the engine advertises
    pub address: IpAddr,
}

/// Arguments for the joint key generation
///
/// Every participant, leader included, passes identical values apart from
/// `is_leader`.
#[derive(Debug, Clone)]
pub struct CeremonyParams {
    pub participant_count: usize,
    pub threshold: usize,
    pub timeout: Duration,
    pub is_leader: bool,
    pub leader: NetworkEndpoint,
    pub retry_count: u32,
}

/// Opaque engine driven through its lifecycle by the orchestrator
#[async_trait]
pub trait CeremonyEngine: Send + Sync {
    /// Port the engine will listen on once started
    fn listen_port(&self) -> u16;

    async fn start(&self, params: StartParams) -> EngineResult<()>;

    async fn stop(&self) -> EngineResult<()>;

    /// Liveness probe
    async fn ping(&self) -> bool;

    /// Run the joint key generation. May return before the engine has
    /// flushed the resulting group, in which case `Ok(None)` is returned and
    /// the group is later available from [`CeremonyEngine::group`].
    async fn run_ceremony(&self, params: CeremonyParams) -> EngineResult<Option<GroupDescriptor>>;

    /// Group produced by the last ceremony, if flushed
    async fn group(&self) -> EngineResult<Option<GroupDescriptor>>;

    /// Output for `round` of the group described in `group_file`
    async fn fetch_output(&self, group_file: &Path, round: u64) -> EngineResult<Option<BeaconOutput>>;
}
