use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod command;
mod topic;
#[cfg(test)]
mod tests;

pub use command::{Command, CommandError};
pub use topic::{parse_topic, topic_matches, Category, CommandKind, Topic, TopicError};

/// Mode and status assigned to an entity before any message sets them
pub const UNKNOWN: &str = "UNKNOWN";

/// Planar position (meters) and heading (radians)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

/// Last reported GPS fix
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
}

/// Latest known state of one robot.
///
/// Owned by the entity state cache; everything handed out is a copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    /// Stable robot identifier (e.g., "robot_01")
    pub id: String,

    pub mode: String,

    pub status: String,

    /// Battery percentage, always within 0..=100
    pub battery: f64,

    pub pose: Pose,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps: Option<GpsFix>,

    /// When the relay applied the most recent update (not the payload clock)
    pub last_updated: DateTime<Utc>,

    /// Most recent error summaries, oldest first
    pub recent_errors: Vec<String>,
}

impl EntityState {
    pub fn new(id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            mode: UNKNOWN.to_string(),
            status: UNKNOWN.to_string(),
            battery: 0.0,
            pose: Pose::default(),
            gps: None,
            last_updated: now,
            recent_errors: Vec::new(),
        }
    }
}

/// Partial pose: omitted components keep their cached value
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct PoseUpdate {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub theta: Option<f64>,
}

impl PoseUpdate {
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.theta.is_none()
    }
}

/// Fields carried by one inbound telemetry message.
///
/// Every field is optional; only present fields overwrite cached state.
/// Unknown payload keys (velocity, timestamp, health, ...) are ignored.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct TelemetryUpdate {
    pub mode: Option<String>,
    pub status: Option<String>,
    pub battery: Option<f64>,
    pub pose: Option<PoseUpdate>,
    pub gps: Option<GpsFix>,
}

impl TelemetryUpdate {
    /// Keep only the position fields (pose and gps)
    pub fn position_only(self) -> Self {
        Self {
            pose: self.pose,
            gps: self.gps,
            ..Default::default()
        }
    }
}

/// Which routing path produced a persisted sample.
///
/// Each kind is throttled independently per entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    /// Full status message
    Snapshot,
    /// Position-only message
    Pose,
}

impl SampleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleKind::Snapshot => "snapshot",
            SampleKind::Pose => "pose",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "snapshot" => Some(SampleKind::Snapshot),
            "pose" => Some(SampleKind::Pose),
            _ => None,
        }
    }
}

/// One persisted telemetry row
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub entity_id: String,
    pub captured_at: DateTime<Utc>,
    pub kind: SampleKind,
    pub mode: Option<String>,
    pub status: Option<String>,
    pub battery: Option<f64>,
    pub pose: Option<Pose>,
    /// Original payload as received, kept verbatim
    pub raw_payload: String,
}

/// One robot-reported error, persisted without the in-memory cap
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub entity_id: String,
    pub category: String,
    pub message: String,
    pub severity: String,
    pub captured_at: DateTime<Utc>,
}

impl ErrorRecord {
    /// Line stored in the entity's recent error list
    pub fn summary(&self) -> String {
        format!("[{}] {}", self.category, self.message)
    }
}

/// Error payload as published on `robot/errors/<id>`
#[derive(Clone, Debug, Deserialize)]
pub struct ErrorReport {
    #[serde(default = "default_error_type")]
    pub error_type: String,
    #[serde(default = "default_error_message")]
    pub message: String,
    #[serde(default = "default_severity")]
    pub severity: String,
}

fn default_error_type() -> String {
    "UNKNOWN".to_string()
}

fn default_error_message() -> String {
    "No message provided".to_string()
}

fn default_severity() -> String {
    "ERROR".to_string()
}

impl ErrorReport {
    pub fn into_record(self, entity_id: &str, captured_at: DateTime<Utc>) -> ErrorRecord {
        ErrorRecord {
            entity_id: entity_id.to_string(),
            category: self.error_type,
            message: self.message,
            severity: self.severity,
            captured_at,
        }
    }
}
