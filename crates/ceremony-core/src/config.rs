//! Harness configuration

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::types::CeremonyConfig;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "CEREMONY_HARNESS_CONFIG";

/// Name of the group file written into an instance's working directory
pub const GROUP_FILE: &str = "group.toml";

/// Largest instance count the address plan supports (last IPv4 octet)
pub const MAX_INSTANCES: usize = 254;

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Number of instances taking part in the run
    pub instances: usize,

    /// Global run deadline (seconds)
    pub timeout_secs: u64,

    /// Output period (seconds)
    pub period_secs: u64,

    /// Engine-side key generation timeout (seconds)
    pub dkg_timeout_secs: u64,

    /// Engine-side key generation retry budget
    pub dkg_retry_count: u32,

    /// Metrics export interval (milliseconds)
    pub export_interval_ms: u64,

    /// Whether a network sidecar is available to shape links
    pub sidecar: bool,

    /// Root directory for per-instance engine state
    pub workdir: PathBuf,

    /// Where exported metric points are written
    pub metrics_file: PathBuf,

    /// Default link shaping
    pub link: LinkShape,

    /// Test subnet instances draw addresses from
    pub subnet: Subnet,

    /// Labels attached to every exported metric point
    pub labels: RunLabels,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            instances: 4,
            timeout_secs: 300,
            period_secs: 10,
            dkg_timeout_secs: 10,
            dkg_retry_count: 12,
            export_interval_ms: 1000,
            sidecar: true,
            workdir: std::env::temp_dir().join("ceremony-harness"),
            metrics_file: PathBuf::from("diagnostics.jsonl"),
            link: LinkShape::default(),
            subnet: Subnet::default(),
            labels: RunLabels::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.instances == 0 {
            return Err(ConfigError::Invalid("instances must be >= 1".to_string()));
        }
        if self.instances > MAX_INSTANCES {
            return Err(ConfigError::Invalid(format!(
                "instances must be <= {} (address plan uses the last octet)",
                MAX_INSTANCES
            )));
        }
        if self.period_secs == 0 {
            return Err(ConfigError::Invalid("period_secs must be >= 1".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be >= 1".to_string()));
        }
        if self.export_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "export_interval_ms must be >= 1".to_string(),
            ));
        }
        if self.subnet.prefix_len > 24 {
            return Err(ConfigError::Invalid(
                "subnet prefix must leave the last octet free".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn export_interval(&self) -> Duration {
        Duration::from_millis(self.export_interval_ms)
    }

    /// Ceremony parameters for the configured instance count
    pub fn ceremony_config(&self) -> Result<CeremonyConfig> {
        CeremonyConfig::new(
            self.instances,
            self.period(),
            Duration::from_secs(self.dkg_timeout_secs),
            self.dkg_retry_count,
        )
    }

    /// Run environment for one instance working under `workdir`
    pub fn run_env(&self, workdir: PathBuf) -> RunEnv {
        RunEnv {
            instance_count: self.instances,
            labels: self.labels.clone(),
            subnet: self.subnet,
            link: self.link,
            sidecar: self.sidecar,
            workdir,
        }
    }
}

/// Per-process harness state handed to every component at construction
#[derive(Debug, Clone)]
pub struct RunEnv {
    pub instance_count: usize,
    pub labels: RunLabels,
    pub subnet: Subnet,
    pub link: LinkShape,
    pub sidecar: bool,
    pub workdir: PathBuf,
}

impl RunEnv {
    /// Path of the persisted group descriptor
    pub fn group_file(&self) -> PathBuf {
        self.workdir.join(GROUP_FILE)
    }
}

/// Identifiers of the run, exported as constant metric tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunLabels {
    pub plan: String,
    pub case: String,
    pub run: String,
    pub group_id: String,
}

impl Default for RunLabels {
    fn default() -> Self {
        Self {
            plan: "drand".to_string(),
            case: "ceremony".to_string(),
            run: "local".to_string(),
            group_id: "single".to_string(),
        }
    }
}

impl RunLabels {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("plan".to_string(), self.plan.clone()),
            ("case".to_string(), self.case.clone()),
            ("run".to_string(), self.run.clone()),
            ("group_id".to_string(), self.group_id.clone()),
        ])
    }
}

/// Link shaping applied by the network collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkShape {
    /// One-way latency
    #[serde(with = "duration_millis")]
    pub latency: Duration,

    /// Bandwidth in bytes per second
    pub bandwidth: u64,
}

impl Default for LinkShape {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(10),
            bandwidth: 1 << 24,
        }
    }
}

/// IPv4 test subnet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub base: Ipv4Addr,
    pub prefix_len: u8,
}

impl Default for Subnet {
    fn default() -> Self {
        Self {
            base: Ipv4Addr::new(16, 0, 0, 0),
            prefix_len: 16,
        }
    }
}

impl Subnet {
    /// Address whose last octet is `sequence`
    pub fn host(&self, sequence: u64) -> Result<Ipv4Addr> {
        let last = u8::try_from(sequence)
            .ok()
            .filter(|octet| (1..=MAX_INSTANCES as u8).contains(octet))
            .ok_or_else(|| {
                ConfigError::Invalid(format!("sequence {} has no address in the plan", sequence))
            })?;
        let [a, b, c, _] = self.base.octets();
        Ok(Ipv4Addr::new(a, b, c, last))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
