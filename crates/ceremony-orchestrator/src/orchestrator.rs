//! Per-instance ceremony state machine
//!
//! Each instance walks the phases in order. Any failure, deadline or panic
//! jumps straight to teardown, which stops the engine, reaches the `end`
//! barrier and records the outcome exactly once.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use ceremony_core::{
    current_round, genesis_wait, unix_seconds, BeaconOutput, CeremonyConfig, CeremonyEngine,
    CeremonyParams, Clock, GroupDescriptor, InstanceIdentity, NetworkClient, NetworkConfig,
    NetworkEndpoint, RunContext, RunEnv, RunRecorder, StartParams, SyncService,
};

use crate::error::{CeremonyError, Result};
use crate::metrics::PhaseMetrics;
use crate::phase::Phase;
use crate::rendezvous;
use crate::retry::{poll_bounded, GROUP_RETRY, LIVENESS_RETRY};

/// Extra wait after genesis before the first output is fetched
pub const GENESIS_GRACE: Duration = Duration::from_secs(3);

/// Upper bound on stopping the engine during teardown
pub const ENGINE_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Services an orchestrator drives
#[derive(Clone)]
pub struct Collaborators {
    pub sync: Arc<dyn SyncService>,
    pub network: Arc<dyn NetworkClient>,
    pub engine: Arc<dyn CeremonyEngine>,
    pub recorder: Arc<dyn RunRecorder>,
    pub clock: Arc<dyn Clock>,
}

/// Outcome of one instance's run
#[derive(Debug)]
pub struct CeremonyReport {
    /// Identity assigned at the first barrier
    pub identity: Option<InstanceIdentity>,
    /// Leader endpoint agreed during rendezvous
    pub leader: Option<NetworkEndpoint>,
    /// Group produced by the ceremony
    pub group: Option<GroupDescriptor>,
    /// Output fetched for the first round after genesis
    pub output: Option<BeaconOutput>,
    /// Last phase reached before teardown
    pub last_phase: Phase,
    /// Whether the `end` barrier was passed
    pub reached_end: bool,
    pub error: Option<CeremonyError>,
}

impl CeremonyReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn sequence(&self) -> Option<u64> {
        self.identity.map(|id| id.sequence)
    }
}

/// State accumulated while walking the phases
struct Progress {
    phase: Phase,
    phase_started: Instant,
    ceremony_started: Option<Instant>,
    identity: Option<InstanceIdentity>,
    leader: Option<NetworkEndpoint>,
    group: Option<GroupDescriptor>,
    output: Option<BeaconOutput>,
    engine_started: bool,
}

impl Progress {
    fn new() -> Self {
        Self {
            phase: Phase::Init,
            phase_started: Instant::now(),
            ceremony_started: None,
            identity: None,
            leader: None,
            group: None,
            output: None,
            engine_started: false,
        }
    }

    /// Seconds since the network was configured
    fn since_ceremony_start(&self) -> f64 {
        self.ceremony_started
            .map(|start| start.elapsed().as_secs_f64())
            .unwrap_or_default()
    }
}

/// Drives one instance through the bootstrap phases
pub struct CeremonyOrchestrator {
    env: RunEnv,
    config: CeremonyConfig,
    ctx: RunContext,
    services: Collaborators,
    metrics: Option<PhaseMetrics>,
}

impl CeremonyOrchestrator {
    /// Create an orchestrator; `ctx` bounds the whole run
    pub fn new(
        env: RunEnv,
        config: CeremonyConfig,
        ctx: RunContext,
        services: Collaborators,
    ) -> Self {
        Self {
            env,
            config,
            ctx,
            services,
            metrics: None,
        }
    }

    /// Report phase transitions to `metrics`
    pub fn with_metrics(mut self, metrics: PhaseMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run every phase, then teardown
    ///
    /// Never returns an error: failures are carried in the report and were
    /// already handed to the recorder.
    pub async fn run(self) -> CeremonyReport {
        let mut progress = Progress::new();

        let outcome = match AssertUnwindSafe(self.run_phases(&mut progress))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Phase {} panicked: {}", progress.phase, message);
                Err(CeremonyError::Panicked {
                    phase: progress.phase,
                    message,
                })
            }
        };

        self.teardown(progress, outcome).await
    }

    fn enter(&self, progress: &mut Progress, next: Phase) {
        let elapsed = progress.phase_started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.transition(progress.phase, elapsed, next);
        }
        match progress.identity {
            Some(id) => info!(
                sequence = id.sequence,
                "{} -> {} ({:?})",
                progress.phase,
                next,
                elapsed
            ),
            None => info!("{} -> {} ({:?})", progress.phase, next, elapsed),
        }
        progress.phase = next;
        progress.phase_started = Instant::now();
    }

    /// Await `fut` unless the run context finishes first
    async fn bounded<F: std::future::Future>(&self, phase: Phase, fut: F) -> Result<F::Output> {
        self.ctx
            .run(fut)
            .await
            .map_err(|reason| CeremonyError::Interrupted { phase, reason })
    }

    async fn run_phases(&self, progress: &mut Progress) -> Result<()> {
        let Collaborators {
            sync,
            network,
            engine,
            recorder,
            clock,
        } = &self.services;
        let sync = sync.as_ref();
        let engine = engine.as_ref();
        let total = self.env.instance_count;

        self.config.validate()?;

        if !self.env.sidecar {
            recorder.record_message("no network sidecar available; skipping ceremony");
            return Ok(());
        }

        self.enter(progress, Phase::NetworkInitWait);
        if let Err(source) = self
            .bounded(Phase::NetworkInitWait, network.wait_initialized())
            .await?
        {
            recorder.record_crash(&source.to_string());
            return Err(CeremonyError::Network {
                phase: Phase::NetworkInitWait,
                source,
            });
        }

        self.enter(progress, Phase::IpAllocated);
        let identity = rendezvous::allocate_identity(sync, &self.ctx, total).await?;
        progress.identity = Some(identity);
        let sequence = identity.sequence;
        recorder.record_message(&format!("I am {}", sequence));

        self.enter(progress, Phase::NetworkConfigured);
        let net_config = NetworkConfig::for_sequence(&self.env.subnet, self.env.link, sequence)?;
        debug!("Configuring network: {:?}", net_config);
        if let Err(source) = self
            .bounded(Phase::NetworkConfigured, network.configure(net_config))
            .await?
        {
            recorder.record_crash(&source.to_string());
            return Err(CeremonyError::Network {
                phase: Phase::NetworkConfigured,
                source,
            });
        }
        rendezvous::signal(sync, &self.ctx, Phase::NetworkConfigured, rendezvous::IP_CHANGED, total)
            .await?;
        progress.ceremony_started = Some(Instant::now());

        self.enter(progress, Phase::EndpointRendezvous);
        let address = self
            .bounded(Phase::EndpointRendezvous, network.assigned_address())
            .await?
            .map_err(|source| CeremonyError::Network {
                phase: Phase::EndpointRendezvous,
                source,
            })?;
        let own = NetworkEndpoint::new(address, engine.listen_port());
        let leader = rendezvous::exchange_leader_endpoint(sync, &self.ctx, &identity, own).await?;
        progress.leader = Some(leader);
        rendezvous::signal(
            sync,
            &self.ctx,
            Phase::EndpointRendezvous,
            rendezvous::ENGINE_START,
            total,
        )
        .await?;

        self.enter(progress, Phase::EngineStarted);
        let params = StartParams {
            self_index: sequence,
            period: self.config.period,
            workdir: self.env.workdir.clone(),
            address,
        };
        self.bounded(Phase::EngineStarted, engine.start(params))
            .await?
            .map_err(|source| CeremonyError::EngineStart { sequence, source })?;
        progress.engine_started = true;

        self.enter(progress, Phase::LivenessConfirmed);
        let alive = poll_bounded(&self.ctx, LIVENESS_RETRY, move || async move {
            engine.ping().await.then_some(())
        })
        .await
        .map_err(|reason| CeremonyError::Interrupted {
            phase: Phase::LivenessConfirmed,
            reason,
        })?;
        if alive.is_none() {
            return Err(CeremonyError::LivenessExhausted {
                sequence,
                attempts: LIVENESS_RETRY.attempts,
            });
        }
        recorder.record_point("first_ping", progress.since_ceremony_start());

        self.enter(progress, Phase::DkgRunning);
        if identity.is_leader() {
            // Late subscribers see a fresh announcement before key generation
            rendezvous::publish_leader_endpoint(sync, &self.ctx, Phase::DkgRunning, &leader).await?;
        }
        let params = CeremonyParams {
            participant_count: self.config.participant_count,
            threshold: self.config.threshold,
            timeout: self.config.dkg_timeout,
            is_leader: identity.is_leader(),
            leader,
            retry_count: self.config.retry_count,
        };
        let formed = self
            .bounded(Phase::DkgRunning, engine.run_ceremony(params))
            .await?
            .map_err(|source| CeremonyError::Ceremony { sequence, source })?;
        recorder.record_point("dkg_complete", progress.since_ceremony_start());

        self.enter(progress, Phase::GroupFormed);
        let group = match formed {
            Some(group) => group,
            None => poll_bounded(&self.ctx, GROUP_RETRY, move || async move {
                match engine.group().await {
                    Ok(group) => group,
                    Err(e) => {
                        debug!("Group not readable yet: {}", e);
                        None
                    }
                }
            })
            .await
            .map_err(|reason| CeremonyError::Interrupted {
                phase: Phase::GroupFormed,
                reason,
            })?
            .ok_or(CeremonyError::GroupUnavailable {
                sequence,
                attempts: GROUP_RETRY.attempts,
            })?,
        };
        info!(
            "Group formed: threshold {}, {} participants, genesis {}",
            group.threshold,
            group.participants.len(),
            group.genesis_time
        );
        let group_file = self.env.group_file();
        group
            .save(&group_file)
            .map_err(|source| CeremonyError::Persist { sequence, source })?;
        progress.group = Some(group.clone());

        self.enter(progress, Phase::GenesisAligned);
        let wait = genesis_wait(clock.now(), group.genesis(), GENESIS_GRACE, group.period);
        debug!("Waiting {:?} for the first round", wait);
        self.ctx
            .sleep(wait)
            .await
            .map_err(|reason| CeremonyError::Interrupted {
                phase: Phase::GenesisAligned,
                reason,
            })?;

        self.enter(progress, Phase::BeaconVerified);
        let fetch_started = Instant::now();
        let round = current_round(unix_seconds(clock.now()), group.period, group.genesis_time);
        let output = self
            .bounded(Phase::BeaconVerified, engine.fetch_output(&group_file, round))
            .await?
            .map_err(|source| CeremonyError::OutputFetch {
                sequence,
                round,
                source,
            })?
            .ok_or(CeremonyError::OutputUnavailable { sequence, round })?;
        recorder.record_point("beacon_lat", fetch_started.elapsed().as_secs_f64());
        info!("Fetched output for round {}", output.round);
        progress.output = Some(output);

        Ok(())
    }

    async fn teardown(&self, mut progress: Progress, outcome: Result<()>) -> CeremonyReport {
        let last_phase = progress.phase;
        self.enter(&mut progress, Phase::Teardown);

        if let Err(e) = &outcome {
            warn!("Instance failed in {}: {}", last_phase, e);
        }

        let services = &self.services;
        if progress.engine_started {
            match tokio::time::timeout(ENGINE_STOP_TIMEOUT, services.engine.stop()).await {
                Ok(Ok(())) => debug!("Engine stopped"),
                Ok(Err(e)) => warn!("Engine stop failed: {}", e),
                Err(_) => warn!("Engine stop timed out after {:?}", ENGINE_STOP_TIMEOUT),
            }
        }

        let end = rendezvous::signal(
            services.sync.as_ref(),
            &self.ctx,
            Phase::Teardown,
            rendezvous::END,
            self.env.instance_count,
        )
        .await
        .map(|_| ());

        let reached_end = end.is_ok();
        let error = match (outcome, end) {
            (Ok(()), Ok(())) => None,
            (Err(e), _) | (Ok(()), Err(e)) => Some(e),
        };

        match &error {
            None => services.recorder.record_success(),
            Some(e) => services.recorder.record_failure(&e.to_string()),
        }

        CeremonyReport {
            identity: progress.identity,
            leader: progress.leader,
            group: progress.group,
            output: progress.output,
            last_phase,
            reached_end,
            error,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_payloads() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(literal.as_ref()), "boom");

        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(owned.as_ref()), "bang");

        let other: Box<dyn Any + Send> = Box::new(7u32);
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
