use super::MessageBus;
use crate::telemetry::Command;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::debug;

/// Publishes robot commands onto the bus
#[derive(Clone)]
pub struct CommandPublisher {
    bus: Arc<dyn MessageBus>,
}

impl CommandPublisher {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    /// Validate `command` and publish it on `robot/<kind>/<robot_id>`
    pub async fn send(&self, robot_id: &str, command: &Command) -> Result<()> {
        if robot_id.is_empty() || robot_id.contains(['/', '+', '#']) {
            bail!("invalid robot id '{}'", robot_id);
        }
        command.validate()?;

        let topic = command.topic(robot_id);
        let payload = serde_json::to_vec(&command.to_payload())
            .context("Failed to serialize command payload")?;

        debug!(robot_id = %robot_id, topic = %topic, "Publishing command");

        self.bus
            .publish(&topic, payload.into())
            .await
            .with_context(|| format!("Failed to publish command to '{}'", topic))
    }
}
