use super::*;
use serde_json::json;

#[test]
fn test_update_parses_partial_fields() {
    let update: TelemetryUpdate = serde_json::from_value(json!({
        "battery": 42,
        "mode": "walking",
        "velocity": {"linear": 1.0},
        "timestamp": "2026-01-01T00:00:00Z"
    }))
    .unwrap();

    assert_eq!(update.battery, Some(42.0));
    assert_eq!(update.mode.as_deref(), Some("walking"));
    assert_eq!(update.status, None);
    assert_eq!(update.pose, None);
}

#[test]
fn test_update_parses_partial_pose() {
    let update: TelemetryUpdate =
        serde_json::from_value(json!({"pose": {"x": 1.5, "theta": 0.5}})).unwrap();

    let pose = update.pose.unwrap();
    assert_eq!(pose.x, Some(1.5));
    assert_eq!(pose.y, None);
    assert_eq!(pose.theta, Some(0.5));
}

#[test]
fn test_update_rejects_wrong_field_types() {
    let result: Result<TelemetryUpdate, _> =
        serde_json::from_value(json!({"battery": "full"}));
    assert!(result.is_err());
}

#[test]
fn test_position_only_drops_other_fields() {
    let update: TelemetryUpdate = serde_json::from_value(json!({
        "battery": 10,
        "status": "MOVING",
        "pose": {"x": 1, "y": 2, "theta": 3},
        "gps": {"latitude": 37.7, "longitude": -122.4}
    }))
    .unwrap();

    let position = update.position_only();
    assert_eq!(position.battery, None);
    assert_eq!(position.status, None);
    assert!(position.pose.is_some());
    assert!(position.gps.is_some());
}

#[test]
fn test_entity_state_serializes_camel_case() {
    let state = EntityState::new("robot_01", chrono::Utc::now());
    let value = serde_json::to_value(&state).unwrap();

    assert_eq!(value["id"], "robot_01");
    assert_eq!(value["mode"], UNKNOWN);
    assert!(value.get("lastUpdated").is_some());
    assert!(value.get("recentErrors").is_some());
    // No fix reported yet
    assert!(value.get("gps").is_none());
}

#[test]
fn test_error_report_defaults() {
    let report: ErrorReport = serde_json::from_value(json!({})).unwrap();
    assert_eq!(report.error_type, "UNKNOWN");
    assert_eq!(report.message, "No message provided");
    assert_eq!(report.severity, "ERROR");

    let record = ErrorReport {
        error_type: "NAVIGATION".to_string(),
        message: "Path planning failed".to_string(),
        severity: "WARNING".to_string(),
    }
    .into_record("r1", chrono::Utc::now());
    assert_eq!(record.summary(), "[NAVIGATION] Path planning failed");
}

#[test]
fn test_sample_kind_strings() {
    for kind in [SampleKind::Snapshot, SampleKind::Pose] {
        assert_eq!(SampleKind::parse(kind.as_str()), Some(kind));
    }
    assert_eq!(SampleKind::parse("joints"), None);
}
