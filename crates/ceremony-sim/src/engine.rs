//! Simulated beacon engines
//!
//! Engines created from the same [`SimCluster`] share one key generation:
//! it completes once every participant has joined with the same leader
//! endpoint, and all of them receive the same group descriptor. Outputs are
//! SHA-256 digests of the group key and round, served once the round's time
//! has passed on the cluster clock.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use prometheus::{IntCounterVec, Opts, Registry};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use ceremony_core::{
    round_time, unix_seconds, BeaconOutput, CeremonyEngine, CeremonyParams, Clock, EngineError,
    EngineResult, GroupDescriptor, NetworkEndpoint, Participant, StartParams,
};

/// Port every simulated engine listens on
pub const DEFAULT_ENGINE_PORT: u16 = 8080;

/// Timing shared by every engine of a cluster
#[derive(Debug, Clone, Copy)]
pub struct ClusterSettings {
    /// Time between start and the first successful ping
    pub startup_latency: Duration,

    /// When set, the ceremony returns before the group is flushed and the
    /// group becomes readable this long after completion
    pub group_flush_delay: Option<Duration>,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            startup_latency: Duration::from_millis(500),
            group_flush_delay: None,
        }
    }
}

/// Failures injected into one engine
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeFaults {
    /// `start` fails
    pub fail_start: bool,
    /// Starts but never answers a ping
    pub unresponsive: bool,
    /// Never serves an output
    pub withhold_outputs: bool,
}

#[derive(Default)]
struct KeyGeneration {
    leader: Option<NetworkEndpoint>,
    leader_index: Option<u64>,
    joined: BTreeMap<u64, NetworkEndpoint>,
}

struct ClusterInner {
    settings: ClusterSettings,
    clock: Arc<dyn Clock>,
    keygen: Mutex<KeyGeneration>,
    formed: watch::Sender<Option<GroupDescriptor>>,
    pings: IntCounterVec,
    outputs: IntCounterVec,
}

/// Factory for engines sharing one key generation
#[derive(Clone)]
pub struct SimCluster {
    inner: Arc<ClusterInner>,
}

impl SimCluster {
    pub fn new(clock: Arc<dyn Clock>, settings: ClusterSettings) -> prometheus::Result<Self> {
        let pings = IntCounterVec::new(
            Opts::new("engine_pings_total", "Liveness probes answered"),
            &["node"],
        )?;
        let outputs = IntCounterVec::new(
            Opts::new("engine_outputs_served_total", "Beacon outputs served"),
            &["node"],
        )?;

        Ok(Self {
            inner: Arc::new(ClusterInner {
                settings,
                clock,
                keygen: Mutex::new(KeyGeneration::default()),
                formed: watch::channel(None).0,
                pings,
                outputs,
            }),
        })
    }

    /// Expose the engine counters through `registry`
    pub fn register_metrics(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.inner.pings.clone()))?;
        registry.register(Box::new(self.inner.outputs.clone()))?;
        Ok(())
    }

    /// A healthy engine
    pub fn engine(&self) -> SimEngine {
        self.engine_with_faults(NodeFaults::default())
    }

    pub fn engine_with_faults(&self, faults: NodeFaults) -> SimEngine {
        SimEngine {
            cluster: self.inner.clone(),
            faults,
            node: Mutex::new(NodeState::default()),
        }
    }

    /// Group formed by the key generation, once complete
    pub fn formed_group(&self) -> Option<GroupDescriptor> {
        self.inner.formed.borrow().clone()
    }
}

#[derive(Default)]
struct NodeState {
    index: u64,
    address: Option<IpAddr>,
    period: Duration,
    running: bool,
    ready_at: Option<Instant>,
    group: Option<(GroupDescriptor, Instant)>,
}

/// One simulated engine
pub struct SimEngine {
    cluster: Arc<ClusterInner>,
    faults: NodeFaults,
    node: Mutex<NodeState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Deterministic stand-in for a threshold signature over `round`
fn round_signature(public_key: &str, round: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(public_key.as_bytes());
    hasher.update(round.to_be_bytes());
    hex::encode(hasher.finalize())
}

fn group_key(participants: &[Participant], threshold: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"ceremony-group");
    hasher.update((threshold as u64).to_be_bytes());
    for participant in participants {
        hasher.update(participant.index.to_be_bytes());
        hasher.update(participant.endpoint.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

impl SimEngine {
    /// (index, address, period) of a running engine
    fn running(&self) -> EngineResult<(u64, IpAddr, Duration)> {
        let node = lock(&self.node);
        match (node.running, node.address) {
            (true, Some(address)) => Ok((node.index, address, node.period)),
            _ => Err(EngineError::NotRunning),
        }
    }

    /// Register this engine with the key generation, forming the group when
    /// the last participant arrives
    fn join(
        &self,
        params: &CeremonyParams,
        index: u64,
        own: NetworkEndpoint,
        period: Duration,
    ) -> EngineResult<()> {
        let mut keygen = lock(&self.cluster.keygen);

        match keygen.leader {
            Some(leader) if leader != params.leader => {
                return Err(EngineError::Ceremony(format!(
                    "leader endpoint mismatch: {} vs {}",
                    leader, params.leader
                )));
            }
            Some(_) => {}
            None => keygen.leader = Some(params.leader),
        }
        if params.is_leader {
            match keygen.leader_index {
                Some(existing) if existing != index => {
                    return Err(EngineError::Ceremony(format!(
                        "node {} claims leadership already held by {}",
                        index, existing
                    )));
                }
                _ => keygen.leader_index = Some(index),
            }
        }
        keygen.joined.insert(index, own);
        debug!(
            "Node {} joined key generation ({}/{})",
            index,
            keygen.joined.len(),
            params.participant_count
        );

        let complete = keygen.leader_index.is_some()
            && keygen.joined.len() >= params.participant_count
            && self.cluster.formed.borrow().is_none();
        if complete {
            let participants: Vec<Participant> = keygen
                .joined
                .iter()
                .map(|(index, endpoint)| Participant {
                    index: *index,
                    endpoint: *endpoint,
                })
                .collect();
            let genesis_time =
                unix_seconds(self.cluster.clock.now()) + period.as_secs() as i64;
            let group = GroupDescriptor {
                threshold: params.threshold,
                genesis_time,
                period,
                public_key: group_key(&participants, params.threshold),
                participants,
            };
            info!(
                "Key generation complete: {} participants, genesis {}",
                group.participants.len(),
                genesis_time
            );
            self.cluster.formed.send_replace(Some(group));
        }
        Ok(())
    }
}

#[async_trait]
impl CeremonyEngine for SimEngine {
    fn listen_port(&self) -> u16 {
        DEFAULT_ENGINE_PORT
    }

    async fn start(&self, params: StartParams) -> EngineResult<()> {
        if self.faults.fail_start {
            return Err(EngineError::Start(format!(
                "node {} could not bind its listener",
                params.self_index
            )));
        }
        std::fs::create_dir_all(&params.workdir)?;

        let mut node = lock(&self.node);
        node.index = params.self_index;
        node.address = Some(params.address);
        node.period = params.period;
        node.running = true;
        node.ready_at = Some(Instant::now() + self.cluster.settings.startup_latency);
        debug!("Node {} started on {}", params.self_index, params.address);
        Ok(())
    }

    async fn stop(&self) -> EngineResult<()> {
        let mut node = lock(&self.node);
        node.running = false;
        node.ready_at = None;
        Ok(())
    }

    async fn ping(&self) -> bool {
        let node = lock(&self.node);
        if !node.running {
            return false;
        }
        self.cluster
            .pings
            .with_label_values(&[&node.index.to_string()])
            .inc();
        !self.faults.unresponsive && node.ready_at.is_some_and(|ready| Instant::now() >= ready)
    }

    async fn run_ceremony(&self, params: CeremonyParams) -> EngineResult<Option<GroupDescriptor>> {
        let (index, address, period) = self.running()?;
        let own = NetworkEndpoint::new(address, DEFAULT_ENGINE_PORT);
        self.join(&params, index, own, period)?;

        let budget = params.timeout * params.retry_count.max(1);
        let mut formed = self.cluster.formed.subscribe();
        let group = match tokio::time::timeout(budget, formed.wait_for(Option::is_some)).await {
            Ok(Ok(group)) => group.clone(),
            Ok(Err(_)) => return Err(EngineError::Ceremony("cluster shut down".to_string())),
            Err(_) => return Err(EngineError::Timeout(budget)),
        };
        let group = group.ok_or_else(|| EngineError::Ceremony("no group formed".to_string()))?;

        let flush_delay = self.cluster.settings.group_flush_delay;
        let available_at = Instant::now() + flush_delay.unwrap_or_default();
        lock(&self.node).group = Some((group.clone(), available_at));

        Ok(match flush_delay {
            Some(_) => None,
            None => Some(group),
        })
    }

    async fn group(&self) -> EngineResult<Option<GroupDescriptor>> {
        self.running()?;
        let node = lock(&self.node);
        Ok(node
            .group
            .as_ref()
            .filter(|(_, available_at)| Instant::now() >= *available_at)
            .map(|(group, _)| group.clone()))
    }

    async fn fetch_output(
        &self,
        group_file: &Path,
        round: u64,
    ) -> EngineResult<Option<BeaconOutput>> {
        let (index, _, _) = self.running()?;
        let group = GroupDescriptor::load(group_file)
            .map_err(|e| EngineError::Fetch(format!("{}: {}", group_file.display(), e)))?;

        if self.faults.withhold_outputs || round == 0 {
            return Ok(None);
        }
        let now = unix_seconds(self.cluster.clock.now());
        if round_time(round, group.period, group.genesis_time) > now {
            debug!("Round {} not produced yet", round);
            return Ok(None);
        }

        self.cluster
            .outputs
            .with_label_values(&[&index.to_string()])
            .inc();
        Ok(Some(BeaconOutput {
            round,
            signature: round_signature(&group.public_key, round),
            previous_signature: round_signature(&group.public_key, round - 1),
        }))
    }
}
