//! Robot commands carried on `robot/<kind>/<robot_id>` topics.
//!
//! The relay only forwards these from clients to the bus; robots (or the
//! simulators) decode and act on them.

use super::CommandKind;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;

/// Velocity limit accepted for `cmd_vel` (m/s and rad/s)
pub const MAX_VELOCITY: f64 = 5.0;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CmdVel { linear: f64, angular: f64 },
    Teleop { command: String, params: Map<String, Value> },
    Mode { mode: String },
    Update { update_type: String },
    EmergencyStop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    InvalidPayload(String),
    OutOfRange { field: &'static str, value: f64 },
    EmptyField(&'static str),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::InvalidPayload(e) => write!(f, "invalid command payload: {}", e),
            CommandError::OutOfRange { field, value } => write!(
                f,
                "{} must be within ±{}, got {}",
                field, MAX_VELOCITY, value
            ),
            CommandError::EmptyField(field) => write!(f, "{} must not be empty", field),
        }
    }
}

impl std::error::Error for CommandError {}

#[derive(Deserialize)]
struct CmdVelPayload {
    #[serde(default)]
    linear: f64,
    #[serde(default)]
    angular: f64,
}

#[derive(Deserialize)]
struct TeleopPayload {
    cmd: String,
    #[serde(default)]
    params: Map<String, Value>,
}

#[derive(Deserialize)]
struct ModePayload {
    mode: String,
}

#[derive(Deserialize)]
struct UpdatePayload {
    #[serde(default = "default_update_type")]
    update_type: String,
}

fn default_update_type() -> String {
    "software".to_string()
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::CmdVel { .. } => CommandKind::CmdVel,
            Command::Teleop { .. } => CommandKind::Teleop,
            Command::Mode { .. } => CommandKind::Mode,
            Command::Update { .. } => CommandKind::Update,
            Command::EmergencyStop => CommandKind::EmergencyStop,
        }
    }

    /// Bus topic addressing this command to one robot
    pub fn topic(&self, robot_id: &str) -> String {
        format!("robot/{}/{}", self.kind().as_str(), robot_id)
    }

    /// Reject commands a robot should never receive
    pub fn validate(&self) -> Result<(), CommandError> {
        match self {
            Command::CmdVel { linear, angular } => {
                if !(-MAX_VELOCITY..=MAX_VELOCITY).contains(linear) {
                    return Err(CommandError::OutOfRange {
                        field: "linear",
                        value: *linear,
                    });
                }
                if !(-MAX_VELOCITY..=MAX_VELOCITY).contains(angular) {
                    return Err(CommandError::OutOfRange {
                        field: "angular",
                        value: *angular,
                    });
                }
                Ok(())
            }
            Command::Teleop { command, .. } if command.is_empty() => {
                Err(CommandError::EmptyField("command"))
            }
            Command::Mode { mode } if mode.is_empty() => Err(CommandError::EmptyField("mode")),
            _ => Ok(()),
        }
    }

    /// Wire payload published on the command topic
    pub fn to_payload(&self) -> Value {
        let timestamp = Utc::now().to_rfc3339();
        match self {
            Command::CmdVel { linear, angular } => json!({
                "cmd": "move",
                "linear": linear,
                "angular": angular,
                "timestamp": timestamp,
            }),
            Command::Teleop { command, params } => json!({
                "cmd": command,
                "params": params,
                "timestamp": timestamp,
            }),
            Command::Mode { mode } => json!({ "mode": mode, "timestamp": timestamp }),
            Command::Update { update_type } => {
                json!({ "update_type": update_type, "timestamp": timestamp })
            }
            Command::EmergencyStop => json!({ "timestamp": timestamp }),
        }
    }

    /// Decode the payload of a command topic of the given kind
    pub fn from_payload(kind: CommandKind, payload: &[u8]) -> Result<Self, CommandError> {
        let invalid = |e: serde_json::Error| CommandError::InvalidPayload(e.to_string());
        let command = match kind {
            CommandKind::CmdVel => {
                let p: CmdVelPayload = serde_json::from_slice(payload).map_err(invalid)?;
                Command::CmdVel {
                    linear: p.linear,
                    angular: p.angular,
                }
            }
            CommandKind::Teleop => {
                let p: TeleopPayload = serde_json::from_slice(payload).map_err(invalid)?;
                Command::Teleop {
                    command: p.cmd,
                    params: p.params,
                }
            }
            CommandKind::Mode => {
                let p: ModePayload = serde_json::from_slice(payload).map_err(invalid)?;
                Command::Mode { mode: p.mode }
            }
            CommandKind::Update => {
                let p: UpdatePayload = serde_json::from_slice(payload).map_err(invalid)?;
                Command::Update {
                    update_type: p.update_type,
                }
            }
            CommandKind::EmergencyStop => Command::EmergencyStop,
        };
        command.validate()?;
        Ok(command)
    }
}
