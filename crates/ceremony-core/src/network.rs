//! Network configuration collaborator

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{LinkShape, Subnet};
use crate::error::{ConfigError, NetworkError};

/// Callback state signalled by the network service once addresses are applied
pub const NETWORK_CALLBACK_STATE: &str = "ip-set";

/// Name of the data network the harness shapes
pub const DEFAULT_NETWORK: &str = "default";

/// Link configuration requested for one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network to configure
    pub network: String,

    /// Whether the link is up
    pub enable: bool,

    /// Default shaping for every link
    pub default_link: LinkShape,

    /// Address to assign to this instance
    pub ipv4: Ipv4Addr,

    /// Prefix length of the test subnet
    pub prefix_len: u8,

    /// Barrier state the service signals once applied
    pub callback_state: String,
}

impl NetworkConfig {
    /// Plan for the instance ranked `sequence`: last octet of the subnet = sequence
    pub fn for_sequence(subnet: &Subnet, link: LinkShape, sequence: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            network: DEFAULT_NETWORK.to_string(),
            enable: true,
            default_link: link,
            ipv4: subnet.host(sequence)?,
            prefix_len: subnet.prefix_len,
            callback_state: NETWORK_CALLBACK_STATE.to_string(),
        })
    }
}

/// Assigns addresses and link shapes to instances
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Block until the network service is ready for this instance
    async fn wait_initialized(&self) -> Result<(), NetworkError>;

    /// Apply `config` and wait for the service to confirm it
    async fn configure(&self, config: NetworkConfig) -> Result<(), NetworkError>;

    /// Address currently assigned to this instance
    async fn assigned_address(&self) -> Result<IpAddr, NetworkError>;
}

