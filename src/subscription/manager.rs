use crate::bus::CommandPublisher;
use crate::hub::{BroadcastHub, Frame, Subscription};
use crate::subscription::protocol::{ClientMessage, ErrorMessage};
use anyhow::{anyhow, Context};
use axum::extract::ws::{Message, WebSocket};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Manages a single WebSocket connection with entity subscriptions
pub struct ConnectionManager {
    /// Robot IDs this connection is subscribed to (empty = all)
    subscriptions: HashSet<String>,
    commands: Option<CommandPublisher>,
    delivery_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(commands: Option<CommandPublisher>, delivery_timeout: Duration) -> Self {
        Self {
            subscriptions: HashSet::new(),
            commands,
            delivery_timeout,
        }
    }

    /// Handle WebSocket connection lifecycle.
    ///
    /// Holds one hub subscription for the lifetime of the socket and releases
    /// it on every exit path.
    pub async fn handle(mut self, mut socket: WebSocket, hub: Arc<BroadcastHub>) {
        let Subscription {
            id,
            receiver: mut frames,
        } = hub.subscribe();

        info!(subscriber_id = %id, "WebSocket connection established");

        loop {
            tokio::select! {
                // Handle incoming client messages
                msg = socket.recv() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_client_message(&text).await {
                                debug!(subscriber_id = %id, error = %e, "Rejected client message");
                                let reply = ErrorMessage::new(format!("{:#}", e));
                                if let Err(e) = self.send_json(&mut socket, &reply).await {
                                    warn!(subscriber_id = %id, error = %e, "Failed to send error");
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!(subscriber_id = %id, "WebSocket client disconnected");
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = self.send(&mut socket, Message::Pong(data)).await {
                                warn!(subscriber_id = %id, error = %e, "Failed to send pong");
                                break;
                            }
                        }
                        Some(Ok(_)) => {
                            // Ignore binary, pong messages
                        }
                        Some(Err(e)) => {
                            warn!(subscriber_id = %id, error = %e, "WebSocket error");
                            break;
                        }
                    }
                }

                frame = frames.recv() => {
                    match frame {
                        Some(frame) => {
                            if self.should_forward(&frame) {
                                let message = Message::Text(frame.text.to_string());
                                if let Err(e) = self.send(&mut socket, message).await {
                                    warn!(subscriber_id = %id, error = %e, "Failed to deliver event");
                                    break;
                                }
                            }
                        }
                        None => {
                            // Hub dropped us after a failed delivery
                            warn!(subscriber_id = %id, "Subscription closed by hub");
                            break;
                        }
                    }
                }
            }
        }

        hub.unsubscribe(id);
        info!(subscriber_id = %id, "WebSocket connection closed");
    }

    /// Apply a subscription change or forward a command to the bus
    pub async fn handle_client_message(&mut self, text: &str) -> anyhow::Result<()> {
        let msg: ClientMessage =
            serde_json::from_str(text).context("Invalid client message")?;

        match msg {
            ClientMessage::Subscribe { entity_id } => {
                info!(entity_id = %entity_id, "Client subscribed to entity");
                self.subscriptions.insert(entity_id);
            }
            ClientMessage::Unsubscribe { entity_id } => {
                info!(entity_id = %entity_id, "Client unsubscribed from entity");
                self.subscriptions.remove(&entity_id);
            }
            command => {
                let publisher = self
                    .commands
                    .as_ref()
                    .ok_or_else(|| anyhow!("commands are not enabled"))?;
                if let Some((robot_id, command)) = command.into_command() {
                    publisher.send(&robot_id, &command).await?;
                    info!(robot_id = %robot_id, command = command.kind().as_str(), "Command forwarded");
                }
            }
        }

        Ok(())
    }

    /// Check if an event should be forwarded to this connection
    pub fn should_forward(&self, frame: &Frame) -> bool {
        // If no subscriptions, forward all events
        if self.subscriptions.is_empty() {
            return true;
        }

        self.subscriptions.contains(&*frame.entity_id)
    }

    async fn send_json<T: serde::Serialize>(
        &self,
        socket: &mut WebSocket,
        value: &T,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_string(value)?;
        self.send(socket, Message::Text(json)).await
    }

    /// Send with the delivery timeout; a slow client counts as failed
    async fn send(&self, socket: &mut WebSocket, message: Message) -> anyhow::Result<()> {
        tokio::time::timeout(self.delivery_timeout, socket.send(message))
            .await
            .map_err(|_| anyhow!("send timed out after {:?}", self.delivery_timeout))??;
        Ok(())
    }
}
