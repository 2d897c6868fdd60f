//! Fan-out of relay events to live subscribers.
//!
//! Every subscriber owns a bounded queue. Publishing never waits on a
//! subscriber: a queue that is closed or full at publish time gets its
//! subscriber removed on the spot.

use crate::state::MetricsTracker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Default per-subscriber queue depth
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Telemetry,
    Pose,
    Status,
    Error,
    Joints,
    Gps,
    Battery,
    Health,
}

/// Normalized outbound event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub entity_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

/// Event serialized once and shared by every subscriber queue
#[derive(Clone, Debug)]
pub struct Frame {
    pub entity_id: Arc<str>,
    pub text: Arc<str>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Registration handle plus the receiving side of the subscriber queue
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<Frame>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub pruned: usize,
}

pub struct BroadcastHub {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Frame>>>,
    queue_capacity: usize,
    metrics: MetricsTracker,
}

impl BroadcastHub {
    pub fn new(queue_capacity: usize, metrics: MetricsTracker) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
            metrics,
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<Frame>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, receiver) = mpsc::channel(self.queue_capacity);
        let id = SubscriberId(Uuid::new_v4());

        let count = {
            let mut subscribers = self.registry();
            subscribers.insert(id, tx);
            subscribers.len()
        };

        info!(subscriber_id = %id, subscribers = count, "Subscriber registered");
        Subscription { id, receiver }
    }

    /// Remove a subscriber. Safe to call more than once.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.registry().remove(&id).is_some();
        if removed {
            info!(subscriber_id = %id, "Subscriber removed");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.registry().len()
    }

    /// Deliver `event` to every current subscriber.
    ///
    /// Iterates over a copy of the registry so subscribe/unsubscribe are
    /// never blocked by delivery.
    pub fn publish(&self, event: &RelayEvent) -> PublishReport {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                warn!(entity_id = %event.entity_id, error = %e, "Failed to serialize event");
                return PublishReport::default();
            }
        };

        let frame = Frame {
            entity_id: Arc::from(event.entity_id.as_str()),
            text: Arc::from(text),
        };

        let targets: Vec<(SubscriberId, mpsc::Sender<Frame>)> = self
            .registry()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();

        for (id, tx) in targets {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber_id = %id, "Subscriber queue full, disconnecting");
                    failed.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(subscriber_id = %id, "Subscriber gone");
                    failed.push(id);
                }
            }
        }

        let mut pruned = 0;
        if !failed.is_empty() {
            let mut subscribers = self.registry();
            for id in &failed {
                if subscribers.remove(id).is_some() {
                    pruned += 1;
                }
            }
        }

        self.metrics.record_event_published();
        self.metrics.record_subscribers_pruned(pruned);

        PublishReport { delivered, pruned }
    }
}
