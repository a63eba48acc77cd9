//! Ceremony Orchestrator - Barrier-synchronized beacon group bootstrap
//!
//! Every participating process runs one [`CeremonyOrchestrator`]. Instances
//! agree on identities through the first barrier, configure their network,
//! exchange the leader endpoint, start their engines, run the joint key
//! generation and confirm the group produces output after genesis.

pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod phase;
pub mod rendezvous;
pub mod retry;

pub use error::{CeremonyError, Result};
pub use metrics::{CeremonyMetrics, PhaseMetrics};
pub use orchestrator::{
    CeremonyOrchestrator, CeremonyReport, Collaborators, ENGINE_STOP_TIMEOUT, GENESIS_GRACE,
};
pub use phase::Phase;
pub use retry::{poll_bounded, RetryPolicy, GROUP_RETRY, LIVENESS_RETRY};
