//! Topic-based notification bus.

use std::collections::HashMap;
use std::sync::Arc;

use strum::IntoEnumIterator;
use tokio::sync::broadcast;

use super::types::{Notification, Topic};

/// Topic-based notification bus
///
/// Allows consumers to subscribe to specific topics and only receive
/// notifications they care about. Publishing never blocks; a topic without
/// subscribers drops the notification.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<HashMap<Topic, broadcast::Sender<Notification>>>,
    // Used if a topic is ever missing from the map; never has subscribers.
    fallback: broadcast::Sender<Notification>,
}

impl EventBus {
    /// Creates a new event bus with default capacity for each topic
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Creates a new event bus with specified capacity per topic
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let channels = Topic::iter()
            .map(|topic| (topic, broadcast::channel(capacity).0))
            .collect();

        Self {
            channels: Arc::new(channels),
            fallback: broadcast::channel(1).0,
        }
    }

    /// Publish a notification to its topic
    pub fn publish(&self, notification: Notification) {
        let topic = notification.topic();
        if self.sender(topic).send(notification).is_err() {
            // No subscribers for this topic - this is normal, not an error
            tracing::trace!("No subscribers for topic {:?}", topic);
        }
    }

    /// Subscribe to a specific topic
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Notification> {
        self.sender(topic).subscribe()
    }

    /// Subscribe to multiple topics
    pub fn subscribe_multiple(
        &self,
        topics: &[Topic],
    ) -> HashMap<Topic, broadcast::Receiver<Notification>> {
        topics
            .iter()
            .map(|&topic| (topic, self.subscribe(topic)))
            .collect()
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<Notification> {
        self.channels.get(&topic).unwrap_or(&self.fallback)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
