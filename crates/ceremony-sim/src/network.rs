//! Simulated network configuration service

use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use ceremony_core::{NetworkClient, NetworkConfig, NetworkError};

/// Network service that assigns the planned address without touching any
/// interface
#[derive(Debug, Default)]
pub struct SimNetwork {
    init_delay: Duration,
    init_failure: Option<String>,
    configure_failure: Option<String>,
    applied: Mutex<Option<NetworkConfig>>,
}

impl SimNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay readiness by `delay`
    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    /// Never become ready
    pub fn failing_init(mut self, reason: impl Into<String>) -> Self {
        self.init_failure = Some(reason.into());
        self
    }

    /// Reject every configuration
    pub fn failing_configure(mut self, reason: impl Into<String>) -> Self {
        self.configure_failure = Some(reason.into());
        self
    }

    /// Configuration applied so far
    pub fn applied_config(&self) -> Option<NetworkConfig> {
        self.applied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl NetworkClient for SimNetwork {
    async fn wait_initialized(&self) -> Result<(), NetworkError> {
        if !self.init_delay.is_zero() {
            tokio::time::sleep(self.init_delay).await;
        }
        match &self.init_failure {
            Some(reason) => Err(NetworkError::NotInitialized(reason.clone())),
            None => Ok(()),
        }
    }

    async fn configure(&self, config: NetworkConfig) -> Result<(), NetworkError> {
        if let Some(reason) = &self.configure_failure {
            return Err(NetworkError::Configure(reason.clone()));
        }
        // Shaping takes effect after one link latency
        tokio::time::sleep(config.default_link.latency).await;
        debug!("Applied {} on network {}", config.ipv4, config.network);
        *self
            .applied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(config);
        Ok(())
    }

    async fn assigned_address(&self) -> Result<IpAddr, NetworkError> {
        self.applied_config()
            .map(|config| IpAddr::V4(config.ipv4))
            .ok_or(NetworkError::NoAddress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ceremony_core::{LinkShape, Subnet};
    use std::net::Ipv4Addr;

    #[tokio::test(start_paused = true)]
    async fn test_assigns_planned_address() {
        let network = SimNetwork::new();
        assert!(matches!(
            network.assigned_address().await,
            Err(NetworkError::NoAddress)
        ));

        let config =
            NetworkConfig::for_sequence(&Subnet::default(), LinkShape::default(), 3).unwrap();
        network.wait_initialized().await.unwrap();
        network.configure(config).await.unwrap();

        assert_eq!(
            network.assigned_address().await.unwrap(),
            IpAddr::V4(Ipv4Addr::new(16, 0, 0, 3))
        );
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let network = SimNetwork::new()
            .failing_init("sidecar unreachable")
            .failing_configure("no such network");

        assert!(matches!(
            network.wait_initialized().await,
            Err(NetworkError::NotInitialized(_))
        ));

        let config =
            NetworkConfig::for_sequence(&Subnet::default(), LinkShape::default(), 1).unwrap();
        assert!(matches!(
            network.configure(config).await,
            Err(NetworkError::Configure(_))
        ));
        assert!(network.applied_config().is_none());
    }
}
