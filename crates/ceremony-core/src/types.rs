//! Data model shared by every instance of a ceremony run

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Sequence number reserved for the elected leader
pub const LEADER_SEQUENCE: u64 = 1;

/// Position of this process among all instances of the run
///
/// The sequence is the arrival rank returned by the first barrier. Barrier
/// arrival order is a total order, so `sequence == 1` elects exactly one
/// leader without a voting round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceIdentity {
    /// Arrival rank (1-indexed)
    pub sequence: u64,

    /// Number of instances in the run
    pub total_instances: usize,
}

impl InstanceIdentity {
    /// Create an identity from a barrier sequence number
    pub fn new(sequence: u64, total_instances: usize) -> Result<Self> {
        if sequence == 0 {
            return Err(ConfigError::Invalid(
                "sequence numbers start at 1".to_string(),
            ));
        }
        if sequence > total_instances as u64 {
            return Err(ConfigError::Invalid(format!(
                "sequence {} exceeds instance count {}",
                sequence, total_instances
            )));
        }
        Ok(Self {
            sequence,
            total_instances,
        })
    }

    /// Whether this instance drives the ceremony
    pub fn is_leader(&self) -> bool {
        self.sequence == LEADER_SEQUENCE
    }
}

impl fmt::Display for InstanceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sequence, self.total_instances)
    }
}

/// Reachable address of an engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkEndpoint {
    /// Address assigned by the network collaborator
    pub address: IpAddr,

    /// Port the engine listens on
    pub port: u16,
}

impl NetworkEndpoint {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl From<SocketAddr> for NetworkEndpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for NetworkEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// Parameters of the joint key generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeremonyConfig {
    /// Minimum number of participants needed to produce an output
    pub threshold: usize,

    /// Total number of participants
    pub participant_count: usize,

    /// Time between successive outputs
    #[serde(with = "duration_secs")]
    pub period: Duration,

    /// Engine-side timeout for the key generation
    #[serde(with = "duration_secs")]
    pub dkg_timeout: Duration,

    /// Engine-side retry budget for the key generation
    pub retry_count: u32,
}

impl CeremonyConfig {
    /// Build a configuration with the majority threshold for `participant_count`
    pub fn new(
        participant_count: usize,
        period: Duration,
        dkg_timeout: Duration,
        retry_count: u32,
    ) -> Result<Self> {
        let config = Self {
            threshold: threshold_for(participant_count),
            participant_count,
            period,
            dkg_timeout,
            retry_count,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check `1 <= threshold <= participant_count` and a non-zero period
    pub fn validate(&self) -> Result<()> {
        if self.participant_count == 0 {
            return Err(ConfigError::Invalid(
                "participant count must be >= 1".to_string(),
            ));
        }
        if self.threshold == 0 || self.threshold > self.participant_count {
            return Err(ConfigError::Invalid(format!(
                "threshold {} out of range for {} participants",
                self.threshold, self.participant_count
            )));
        }
        if self.period.is_zero() {
            return Err(ConfigError::Invalid("period must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Majority threshold: `ceil(participant_count / 2)`
pub fn threshold_for(participant_count: usize) -> usize {
    (participant_count + 1) / 2
}

/// One member of a formed group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Index of the participant inside the group
    pub index: u64,

    /// Where the participant's engine listens
    pub endpoint: NetworkEndpoint,
}

/// Public description of a group produced by a successful ceremony
///
/// Every participant receives an identical descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    /// Threshold the group was generated with
    pub threshold: usize,

    /// Unix time (seconds) of round 1
    pub genesis_time: i64,

    /// Time between rounds
    #[serde(with = "duration_secs")]
    pub period: Duration,

    /// Hex-encoded distributed public key
    pub public_key: String,

    /// Group members ordered by index
    pub participants: Vec<Participant>,
}

impl GroupDescriptor {
    /// Genesis as a wall-clock instant
    pub fn genesis(&self) -> SystemTime {
        if self.genesis_time >= 0 {
            UNIX_EPOCH + Duration::from_secs(self.genesis_time as u64)
        } else {
            UNIX_EPOCH - Duration::from_secs(self.genesis_time.unsigned_abs())
        }
    }

    /// Write the descriptor as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Read a descriptor previously written by [`GroupDescriptor::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// A periodic output produced by the group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconOutput {
    /// Round the output belongs to
    pub round: u64,

    /// Hex-encoded threshold signature
    pub signature: String,

    /// Hex-encoded signature of the previous round
    pub previous_signature: String,
}

/// Serde helper storing a `Duration` as whole seconds
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
