//! Phases of the bootstrap sequence

use std::fmt;

/// One step of the ceremony bootstrap, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Init,
    NetworkInitWait,
    IpAllocated,
    NetworkConfigured,
    EndpointRendezvous,
    EngineStarted,
    LivenessConfirmed,
    DkgRunning,
    GroupFormed,
    GenesisAligned,
    BeaconVerified,
    Teardown,
}

impl Phase {
    /// Every phase in order
    pub const ALL: [Phase; 12] = [
        Phase::Init,
        Phase::NetworkInitWait,
        Phase::IpAllocated,
        Phase::NetworkConfigured,
        Phase::EndpointRendezvous,
        Phase::EngineStarted,
        Phase::LivenessConfirmed,
        Phase::DkgRunning,
        Phase::GroupFormed,
        Phase::GenesisAligned,
        Phase::BeaconVerified,
        Phase::Teardown,
    ];

    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::NetworkInitWait => "network_init_wait",
            Phase::IpAllocated => "ip_allocated",
            Phase::NetworkConfigured => "network_configured",
            Phase::EndpointRendezvous => "endpoint_rendezvous",
            Phase::EngineStarted => "engine_started",
            Phase::LivenessConfirmed => "liveness_confirmed",
            Phase::DkgRunning => "dkg_running",
            Phase::GroupFormed => "group_formed",
            Phase::GenesisAligned => "genesis_aligned",
            Phase::BeaconVerified => "beacon_verified",
            Phase::Teardown => "teardown",
        }
    }

    /// Position in [`Phase::ALL`]
    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    /// Following phase; `Teardown` is terminal
    pub fn next(&self) -> Option<Phase> {
        Phase::ALL.get(self.ordinal() + 1).copied()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
