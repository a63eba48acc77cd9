//! Barriers and topics shared by every instance of a run
//!
//! Barrier states are signalled in a fixed order; every instance passes each
//! one before any instance proceeds past it.

use tracing::{debug, info};

use ceremony_core::{
    InstanceIdentity, NetworkEndpoint, RunContext, SyncService, SyncServiceExt, Topic,
};

use crate::error::{CeremonyError, Result};
use crate::phase::Phase;

/// First barrier; its sequence number assigns identities
pub const IP_ALLOCATION: &str = "ip-allocation";

/// Every instance has applied its network configuration
pub const IP_CHANGED: &str = "ip-changed";

/// The leader has published its endpoint
pub const PORT_SHARE: &str = "port-share";

/// Every instance learned the leader endpoint and may start its engine
pub const ENGINE_START: &str = "drand-start";

/// Final barrier, reached in teardown on success or failure
pub const END: &str = "end";

/// Barrier states in the order they are signalled
pub const BARRIER_ORDER: [&str; 5] = [IP_ALLOCATION, IP_CHANGED, PORT_SHARE, ENGINE_START, END];

/// Leader endpoint announcements
pub const LEADER_ADDRESS: Topic<NetworkEndpoint> = Topic::new("leader-address");

/// Signal `state` and wait for `target` arrivals, bounded by `ctx`
pub async fn signal(
    sync: &dyn SyncService,
    ctx: &RunContext,
    phase: Phase,
    state: &str,
    target: usize,
) -> Result<u64> {
    let sequence = ctx
        .run(sync.signal_and_wait(state, target))
        .await
        .map_err(|reason| CeremonyError::Interrupted { phase, reason })?
        .map_err(|source| CeremonyError::Sync { phase, source })?;
    debug!("Passed barrier {} as arrival {}", state, sequence);
    Ok(sequence)
}

/// Derive this instance's identity from its arrival at the first barrier
pub async fn allocate_identity(
    sync: &dyn SyncService,
    ctx: &RunContext,
    total_instances: usize,
) -> Result<InstanceIdentity> {
    let sequence = signal(sync, ctx, Phase::IpAllocated, IP_ALLOCATION, total_instances).await?;
    let identity = InstanceIdentity::new(sequence, total_instances)?;
    info!("Allocated identity {} (leader: {})", identity, identity.is_leader());
    Ok(identity)
}

/// Announce the leader endpoint on [`LEADER_ADDRESS`]
pub async fn publish_leader_endpoint(
    sync: &dyn SyncService,
    ctx: &RunContext,
    phase: Phase,
    endpoint: &NetworkEndpoint,
) -> Result<()> {
    ctx.run(sync.publish(&LEADER_ADDRESS, endpoint))
        .await
        .map_err(|reason| CeremonyError::Interrupted { phase, reason })?
        .map_err(|source| CeremonyError::Sync { phase, source })?;
    debug!("Published leader endpoint {}", endpoint);
    Ok(())
}

/// Receive the first leader endpoint announcement
pub async fn await_leader_endpoint(
    sync: &dyn SyncService,
    ctx: &RunContext,
    identity: &InstanceIdentity,
) -> Result<NetworkEndpoint> {
    let phase = Phase::EndpointRendezvous;
    let sequence = identity.sequence;

    let mut subscription = ctx
        .run(sync.subscribe(&LEADER_ADDRESS))
        .await
        .map_err(|reason| CeremonyError::Interrupted { phase, reason })?
        .map_err(|source| CeremonyError::Rendezvous { sequence, source })?;

    ctx.run(subscription.next())
        .await
        .map_err(|reason| CeremonyError::Interrupted { phase, reason })?
        .map_err(|source| CeremonyError::Rendezvous { sequence, source })
}

/// Agree on the leader endpoint
///
/// The leader publishes `own` before the `port-share` barrier, so every
/// follower subscribing after the barrier finds the announcement.
pub async fn exchange_leader_endpoint(
    sync: &dyn SyncService,
    ctx: &RunContext,
    identity: &InstanceIdentity,
    own: NetworkEndpoint,
) -> Result<NetworkEndpoint> {
    let phase = Phase::EndpointRendezvous;

    if identity.is_leader() {
        publish_leader_endpoint(sync, ctx, phase, &own).await?;
    }
    signal(sync, ctx, phase, PORT_SHARE, identity.total_instances).await?;

    if identity.is_leader() {
        return Ok(own);
    }
    let leader = await_leader_endpoint(sync, ctx, identity).await?;
    info!("Learned leader endpoint {}", leader);
    Ok(leader)
}
