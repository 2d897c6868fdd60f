use crate::bus::{BusMessage, BusStream, MessageBus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, info};

/// NATS configuration
#[derive(Clone, Debug, Deserialize)]
pub struct NatsConfig {
    #[serde(default = "default_url")]
    pub url: String,
}

fn default_url() -> String {
    "nats://localhost:4222".to_string()
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self { url: default_url() }
    }
}

/// Map a slash topic or filter to a NATS subject.
///
/// `robot/status/r1` → `robot.status.r1`, `+` → `*`, `#` → `>`.
pub fn topic_to_subject(topic: &str) -> String {
    topic
        .split('/')
        .map(|segment| match segment {
            "+" => "*",
            "#" => ">",
            other => other,
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Inverse of [`topic_to_subject`] for concrete subjects
pub fn subject_to_topic(subject: &str) -> String {
    subject.replace('.', "/")
}

/// Core NATS pub/sub (no JetStream)
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub async fn connect(config: &NatsConfig) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::connect(&config.url)
            .await
            .with_context(|| format!("Failed to connect to NATS at {}", config.url))?;

        info!("Connected to NATS");
        Ok(Self { client })
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        let subject = topic_to_subject(topic);
        self.client
            .publish(subject.clone(), payload)
            .await
            .with_context(|| format!("Failed to publish to subject '{}'", subject))?;
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<BusStream> {
        let subject = topic_to_subject(filter);
        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .with_context(|| format!("Failed to subscribe to subject '{}'", subject))?;

        debug!(subject = %subject, "Subscribed to NATS subject");

        let stream = subscriber.map(|message| BusMessage {
            topic: subject_to_topic(&message.subject),
            payload: message.payload,
        });
        Ok(Box::pin(stream))
    }
}
