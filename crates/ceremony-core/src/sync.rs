//! Synchronization service seam: barriers and typed topics
//!
//! Instances never talk to each other directly before the ceremony. They
//! only share barriers (which rank arrivals) and topics (which carry a few
//! small messages). The service buffers topic history so a subscriber that
//! joins after a publish still sees the message.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::SyncError;

/// Result type for sync operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Barrier and publish/subscribe primitives
///
/// Payloads cross the seam as JSON values so the trait stays object safe;
/// [`SyncServiceExt`] adds the typed layer.
#[async_trait]
pub trait SyncService: Send + Sync {
    /// Signal arrival at `state` and wait until `target` instances arrived.
    /// Returns this caller's arrival rank, starting at 1.
    async fn signal_and_wait(&self, state: &str, target: usize) -> SyncResult<u64>;

    /// Append a message to a topic, returning its position in the topic
    async fn publish_value(&self, topic: &str, payload: serde_json::Value) -> SyncResult<u64>;

    /// Stream every message of a topic, including those published earlier
    async fn subscribe_values(
        &self,
        topic: &str,
    ) -> SyncResult<mpsc::UnboundedReceiver<serde_json::Value>>;
}

/// A named topic carrying messages of type `T`
#[derive(Debug)]
pub struct Topic<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Topic<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Topic<T> {}

/// Typed receiving end of a topic
pub struct Subscription<T> {
    topic: &'static str,
    rx: mpsc::UnboundedReceiver<serde_json::Value>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Subscription<T> {
    /// Next message, or `TopicClosed` once the service ends the subscription
    pub async fn next(&mut self) -> SyncResult<T> {
        let value = self
            .rx
            .recv()
            .await
            .ok_or_else(|| SyncError::TopicClosed(self.topic.to_string()))?;

        serde_json::from_value(value).map_err(|e| SyncError::Payload {
            topic: self.topic.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Typed helpers over any [`SyncService`]
#[async_trait]
pub trait SyncServiceExt: SyncService {
    async fn publish<T>(&self, topic: &Topic<T>, message: &T) -> SyncResult<u64>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(message).map_err(|e| SyncError::Payload {
            topic: topic.name().to_string(),
            reason: e.to_string(),
        })?;
        self.publish_value(topic.name(), value).await
    }

    async fn subscribe<T>(&self, topic: &Topic<T>) -> SyncResult<Subscription<T>>
    where
        T: DeserializeOwned + Send,
    {
        let rx = self.subscribe_values(topic.name()).await?;
        Ok(Subscription {
            topic: topic.name(),
            rx,
            _marker: PhantomData,
        })
    }
}

impl<S: SyncService + ?Sized> SyncServiceExt for S {}
