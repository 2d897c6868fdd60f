use super::{BusMessage, BusStream, MessageBus};
use crate::telemetry::topic_matches;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// Default in-process bus buffer (messages)
pub const DEFAULT_LOCAL_CAPACITY: usize = 4096;

/// In-process bus for running producers and relay without a broker.
///
/// Every subscriber sees every message published after it subscribed.
/// A subscriber that falls more than `capacity` messages behind skips ahead.
pub struct LocalBus {
    tx: broadcast::Sender<BusMessage>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_LOCAL_CAPACITY)
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        let message = BusMessage {
            topic: topic.to_string(),
            payload,
        };

        // No subscribers is fine; the message simply goes nowhere
        if self.tx.send(message).is_err() {
            debug!(topic = %topic, "No local bus subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<BusStream> {
        let filter = filter.to_string();
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(move |item| match item {
            Ok(message) if topic_matches(&filter, &message.topic) => Some(message),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(filter = %filter, skipped, "Local bus subscriber lagged");
                None
            }
        });
        Ok(Box::pin(stream))
    }
}
