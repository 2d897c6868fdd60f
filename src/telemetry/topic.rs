use std::fmt;

/// Command categories published for robots to consume.
///
/// The relay never interprets these; producers do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CmdVel,
    Teleop,
    Mode,
    Update,
    EmergencyStop,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::CmdVel => "cmd_vel",
            CommandKind::Teleop => "teleop",
            CommandKind::Mode => "mode",
            CommandKind::Update => "update",
            CommandKind::EmergencyStop => "emergency_stop",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cmd_vel" => Some(CommandKind::CmdVel),
            "teleop" => Some(CommandKind::Teleop),
            "mode" => Some(CommandKind::Mode),
            "update" => Some(CommandKind::Update),
            "emergency_stop" => Some(CommandKind::EmergencyStop),
            _ => None,
        }
    }
}

/// Closed set of message categories the router dispatches on
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Category {
    Status,
    Pose,
    Errors,
    Joints,
    Gps,
    Battery,
    Health,
    Command(CommandKind),
    Unrecognized(String),
}

impl Category {
    pub fn parse(s: &str) -> Self {
        match s {
            "status" => Category::Status,
            "pose" => Category::Pose,
            "errors" => Category::Errors,
            "joints" => Category::Joints,
            "gps" => Category::Gps,
            "battery" => Category::Battery,
            "health" => Category::Health,
            other => match CommandKind::parse(other) {
                Some(kind) => Category::Command(kind),
                None => Category::Unrecognized(other.to_string()),
            },
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Status => "status",
            Category::Pose => "pose",
            Category::Errors => "errors",
            Category::Joints => "joints",
            Category::Gps => "gps",
            Category::Battery => "battery",
            Category::Health => "health",
            Category::Command(kind) => kind.as_str(),
            Category::Unrecognized(other) => other,
        }
    }
}

/// Classified inbound topic
#[derive(Clone, Debug, PartialEq)]
pub struct Topic {
    /// Leading segment of three-part topics (e.g., "robot")
    pub prefix: Option<String>,
    pub category: Category,
    pub entity_id: String,
}

/// Topic parsing errors
#[derive(Debug, Clone, PartialEq)]
pub enum TopicError {
    Empty,
    /// Wrong number of segments
    InvalidFormat(String),
    /// A segment is empty or carries a wildcard
    InvalidSegment(String),
}

impl fmt::Display for TopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicError::Empty => write!(f, "topic is empty"),
            TopicError::InvalidFormat(t) => write!(
                f,
                "invalid topic '{}': expected <category>/<id> or <prefix>/<category>/<id>",
                t
            ),
            TopicError::InvalidSegment(t) => {
                write!(f, "invalid topic '{}': empty or wildcard segment", t)
            }
        }
    }
}

impl std::error::Error for TopicError {}

/// Parse a topic into prefix, category and entity id.
///
/// Supports two formats:
/// - "status/robot_01" → no prefix, Status, "robot_01"
/// - "robot/status/robot_01" → Some("robot"), Status, "robot_01"
///
/// The category is always the second-to-last segment and the entity id the
/// last one. Unknown categories parse successfully as
/// `Category::Unrecognized` so the router decides what to do with them.
///
/// # Examples
///
/// ```
/// use telemetry_relay::telemetry::{parse_topic, Category};
///
/// let topic = parse_topic("robot/pose/r2").unwrap();
/// assert_eq!(topic.prefix, Some("robot".to_string()));
/// assert_eq!(topic.category, Category::Pose);
/// assert_eq!(topic.entity_id, "r2");
///
/// assert!(parse_topic("garbage_topic_no_slash").is_err());
/// ```
pub fn parse_topic(topic: &str) -> Result<Topic, TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }

    let parts: Vec<&str> = topic.split('/').collect();

    if parts
        .iter()
        .any(|p| p.is_empty() || p.contains('+') || p.contains('#'))
    {
        return Err(TopicError::InvalidSegment(topic.to_string()));
    }

    match parts.as_slice() {
        [category, entity] => Ok(Topic {
            prefix: None,
            category: Category::parse(category),
            entity_id: entity.to_string(),
        }),
        [prefix, category, entity] => Ok(Topic {
            prefix: Some(prefix.to_string()),
            category: Category::parse(category),
            entity_id: entity.to_string(),
        }),
        _ => Err(TopicError::InvalidFormat(topic.to_string())),
    }
}

/// Match a topic against a subscription filter.
///
/// `+` matches exactly one segment, `#` matches all remaining segments.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut segments = topic.split('/');

    for part in filter.split('/') {
        match part {
            "#" => return true,
            "+" => {
                if segments.next().is_none() {
                    return false;
                }
            }
            literal => {
                if segments.next() != Some(literal) {
                    return false;
                }
            }
        }
    }

    segments.next().is_none()
}
