//! In-memory synchronization service

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use ceremony_core::{SyncError, SyncResult, SyncService};

#[derive(Default)]
struct TopicState {
    history: Vec<Value>,
    subscribers: Vec<mpsc::UnboundedSender<Value>>,
}

#[derive(Default)]
struct SyncState {
    barriers: HashMap<String, watch::Sender<u64>>,
    topics: HashMap<String, TopicState>,
}

/// Barriers and topics shared by every instance in the process
///
/// Topics keep their full history; a subscriber first receives every message
/// published so far, then live ones.
pub struct MemorySync {
    state: Mutex<SyncState>,
    closed: watch::Sender<bool>,
}

impl MemorySync {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SyncState::default()),
            closed: watch::channel(false).0,
        }
    }

    /// Arrivals recorded so far for `state`
    pub fn arrivals(&self, state: &str) -> u64 {
        self.lock()
            .barriers
            .get(state)
            .map(|counter| *counter.borrow())
            .unwrap_or(0)
    }

    /// Messages published so far on `topic`
    pub fn published(&self, topic: &str) -> usize {
        self.lock()
            .topics
            .get(topic)
            .map(|t| t.history.len())
            .unwrap_or(0)
    }

    /// Shut the service down: pending waits fail and subscriptions end
    pub fn close(&self) {
        let mut state = self.lock();
        for topic in state.topics.values_mut() {
            topic.subscribers.clear();
        }
        drop(state);
        self.closed.send_replace(true);
        debug!("Sync service closed");
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> SyncResult<()> {
        if self.is_closed() {
            Err(SyncError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for MemorySync {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncService for MemorySync {
    async fn signal_and_wait(&self, state: &str, target: usize) -> SyncResult<u64> {
        self.ensure_open()?;
        if target == 0 {
            return Err(SyncError::InvalidTarget {
                state: state.to_string(),
                target,
            });
        }

        let (sequence, mut arrivals) = {
            let mut guard = self.lock();
            let counter = guard
                .barriers
                .entry(state.to_string())
                .or_insert_with(|| watch::channel(0).0);
            counter.send_modify(|count| *count += 1);
            let sequence = *counter.borrow();
            (sequence, counter.subscribe())
        };
        debug!("Arrival {} at {} (target {})", sequence, state, target);

        let target = target as u64;
        let mut closed = self.closed.subscribe();
        tokio::select! {
            released = arrivals.wait_for(|count| *count >= target) => {
                released.map(|_| sequence).map_err(|_| SyncError::Closed)
            }
            _ = closed.wait_for(|closed| *closed) => Err(SyncError::Closed),
        }
    }

    async fn publish_value(&self, topic: &str, payload: Value) -> SyncResult<u64> {
        self.ensure_open()?;

        let mut guard = self.lock();
        let entry = guard.topics.entry(topic.to_string()).or_default();
        entry.history.push(payload.clone());
        entry
            .subscribers
            .retain(|subscriber| subscriber.send(payload.clone()).is_ok());
        Ok(entry.history.len() as u64)
    }

    async fn subscribe_values(&self, topic: &str) -> SyncResult<mpsc::UnboundedReceiver<Value>> {
        self.ensure_open()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.lock();
        let entry = guard.topics.entry(topic.to_string()).or_default();
        for message in &entry.history {
            // rx is held locally, so the send cannot fail
            let _ = tx.send(message.clone());
        }
        entry.subscribers.push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_barrier_assigns_distinct_sequences() {
        let sync = Arc::new(MemorySync::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sync = sync.clone();
                tokio::spawn(async move { sync.signal_and_wait("ip-allocation", 4).await })
            })
            .collect();

        let mut sequences = Vec::new();
        for handle in handles {
            sequences.push(handle.await.unwrap().unwrap());
        }
        sequences.sort_unstable();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
        assert_eq!(sync.arrivals("ip-allocation"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_barrier_blocks_until_target() {
        let sync = Arc::new(MemorySync::new());

        let waiter = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.signal_and_wait("end", 2).await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!waiter.is_finished());

        assert_eq!(sync.signal_and_wait("end", 2).await.unwrap(), 2);
        assert_eq!(waiter.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_replays_history() {
        let sync = MemorySync::new();
        sync.publish_value("leader-address", Value::from("a"))
            .await
            .unwrap();
        sync.publish_value("leader-address", Value::from("b"))
            .await
            .unwrap();

        let mut rx = sync.subscribe_values("leader-address").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Value::from("a"));
        assert_eq!(rx.recv().await.unwrap(), Value::from("b"));

        sync.publish_value("leader-address", Value::from("c"))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), Value::from("c"));
    }

    #[tokio::test]
    async fn test_close_releases_waiters_and_subscribers() {
        let sync = Arc::new(MemorySync::new());
        let mut rx = sync.subscribe_values("leader-address").await.unwrap();

        let waiter = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.signal_and_wait("port-share", 3).await })
        };
        tokio::task::yield_now().await;

        sync.close();

        assert!(matches!(waiter.await.unwrap(), Err(SyncError::Closed)));
        assert!(rx.recv().await.is_none());
        assert!(matches!(
            sync.signal_and_wait("port-share", 3).await,
            Err(SyncError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_zero_target_is_rejected() {
        let sync = MemorySync::new();
        assert!(matches!(
            sync.signal_and_wait("ip-changed", 0).await,
            Err(SyncError::InvalidTarget { target: 0, .. })
        ));
    }
}
