use crate::telemetry::Command;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Client → Server message types
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Restrict forwarded events to this robot (repeatable)
    Subscribe { entity_id: String },
    Unsubscribe { entity_id: String },
    CmdVel {
        robot_id: String,
        #[serde(default)]
        linear: f64,
        #[serde(default)]
        angular: f64,
    },
    Teleop {
        robot_id: String,
        command: String,
        #[serde(default)]
        params: Map<String, Value>,
    },
    Mode {
        robot_id: String,
        mode: String,
    },
    Update {
        robot_id: String,
        #[serde(default = "default_update_type")]
        update_type: String,
    },
    EmergencyStop {
        robot_id: String,
    },
}

fn default_update_type() -> String {
    "software".to_string()
}

impl ClientMessage {
    /// Split a command message into target robot and command
    pub fn into_command(self) -> Option<(String, Command)> {
        match self {
            ClientMessage::Subscribe { .. } | ClientMessage::Unsubscribe { .. } => None,
            ClientMessage::CmdVel {
                robot_id,
                linear,
                angular,
            } => Some((robot_id, Command::CmdVel { linear, angular })),
            ClientMessage::Teleop {
                robot_id,
                command,
                params,
            } => Some((robot_id, Command::Teleop { command, params })),
            ClientMessage::Mode { robot_id, mode } => Some((robot_id, Command::Mode { mode })),
            ClientMessage::Update {
                robot_id,
                update_type,
            } => Some((robot_id, Command::Update { update_type })),
            ClientMessage::EmergencyStop { robot_id } => Some((robot_id, Command::EmergencyStop)),
        }
    }
}

/// Server → Client: Error message
#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub error: String,
}

impl ErrorMessage {
    pub fn new(error: String) -> Self {
        Self {
            msg_type: "error".to_string(),
            error,
        }
    }
}
