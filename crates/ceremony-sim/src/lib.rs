//! Ceremony Sim - In-process collaborators for the ceremony harness
//!
//! Every collaborator trait from `ceremony-core` has a simulated
//! implementation here, so a whole run fits in one process:
//!
//! - [`MemorySync`]: barriers and topics shared through memory
//! - [`SimNetwork`]: address assignment without touching interfaces
//! - [`SimCluster`] / [`SimEngine`]: engines that run a joint key generation
//!   and serve deterministic outputs
//! - [`MemoryRecorder`], [`MemorySink`], [`TokioClock`]: observable test doubles

pub mod clock;
pub mod engine;
pub mod network;
pub mod recorder;
pub mod sink;
pub mod sync;

pub use clock::TokioClock;
pub use engine::{ClusterSettings, NodeFaults, SimCluster, SimEngine, DEFAULT_ENGINE_PORT};
pub use network::SimNetwork;
pub use recorder::{MemoryRecorder, RecordedEvent};
pub use sink::MemorySink;
pub use sync::MemorySync;
