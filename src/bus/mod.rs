//! Publish/subscribe transport between producers and the relay.
//!
//! Topics are slash-separated (`robot/status/robot_01`). Subscription
//! filters accept `+` for one segment and `#` for all remaining segments.

mod local;
mod publisher;

pub use local::LocalBus;
pub use publisher::CommandPublisher;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// Filter the ingest task subscribes with
pub const TELEMETRY_FILTER: &str = "robot/#";

#[derive(Clone, Debug, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

pub type BusStream = Pin<Box<dyn Stream<Item = BusMessage> + Send>>;

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;

    /// Stream of messages whose topic matches `filter`
    async fn subscribe(&self, filter: &str) -> Result<BusStream>;
}
