use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::trace;

use super::ChangeEvent;

/// Broadcast channels of [`ChangeEvent`]s, one per analysis.
///
/// Channels are created on first use. Slow subscribers lose the oldest
/// events once `buffer_size` is exceeded and see `RecvError::Lagged`.
#[derive(Clone)]
pub struct ChangeFeed {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<ChangeEvent>>>>,
    buffer_size: usize,
}

impl ChangeFeed {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            buffer_size: buffer_size.max(1),
        }
    }

    pub async fn subscribe(&self, analysis_id: &str) -> broadcast::Receiver<ChangeEvent> {
        self.sender_for(analysis_id).await.subscribe()
    }

    /// Returns how many subscribers received the event; zero is not an error.
    pub async fn publish(&self, event: ChangeEvent) -> usize {
        let sender = self.sender_for(&event.analysis_id).await;
        trace!(
            "Publishing {:?} for analysis {}",
            event.change.key(),
            event.analysis_id
        );
        sender.send(event).unwrap_or(0)
    }

    pub async fn receiver_count(&self, analysis_id: &str) -> usize {
        let channels = self.channels.read().await;
        channels
            .get(analysis_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Drops channels nobody listens to; returns how many were removed.
    pub async fn cleanup_idle(&self) -> usize {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    async fn sender_for(&self, analysis_id: &str) -> broadcast::Sender<ChangeEvent> {
        {
            let channels = self.channels.read().await;
            if let Some(sender) = channels.get(analysis_id) {
                return sender.clone();
            }
        }

        // Re-check under the write lock; another task may have created it.
        let mut channels = self.channels.write().await;
        channels
            .entry(analysis_id.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::EntityChange;
    use crate::sync::EntityKind;

    fn deleted(analysis: &str, id: &str) -> ChangeEvent {
        ChangeEvent::new(
            analysis,
            "client-a",
            EntityChange::Deleted {
                kind: EntityKind::Node,
                id: id.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_events_reach_subscribers_of_the_same_analysis_only() {
        let feed = ChangeFeed::new(16);
        let mut first = feed.subscribe("a1").await;
        let mut other = feed.subscribe("a2").await;

        assert_eq!(feed.publish(deleted("a1", "n1")).await, 1);
        assert_eq!(first.recv().await.unwrap(), deleted("a1", "n1"));
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_and_cleanup() {
        let feed = ChangeFeed::new(16);
        {
            let _receiver = feed.subscribe("a1").await;
            assert_eq!(feed.receiver_count("a1").await, 1);
        }
        assert_eq!(feed.publish(deleted("a1", "n1")).await, 0);
        assert_eq!(feed.cleanup_idle().await, 1);
        assert_eq!(feed.channel_count().await, 0);
    }
}
