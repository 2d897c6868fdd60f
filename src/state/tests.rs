use super::*;
use crate::telemetry::{GpsFix, PoseUpdate, TelemetryUpdate, UNKNOWN};
use chrono::{Duration, Utc};
use std::sync::Arc;
use std::thread;

fn status(mode: &str, status: &str, battery: f64) -> TelemetryUpdate {
    TelemetryUpdate {
        mode: Some(mode.to_string()),
        status: Some(status.to_string()),
        battery: Some(battery),
        ..Default::default()
    }
}

#[test]
fn test_apply_creates_entity() {
    let cache = EntityStateCache::new();
    let now = Utc::now();

    let applied = cache.apply_telemetry("robot_01", &status("walking", "OK", 80.0), now);

    assert!(applied.created);
    assert_eq!(applied.snapshot.id, "robot_01");
    assert_eq!(applied.snapshot.mode, "walking");
    assert_eq!(applied.snapshot.battery, 80.0);
    assert_eq!(applied.snapshot.last_updated, now);
    assert_eq!(applied.previous_status.as_deref(), Some(UNKNOWN));

    let entity = cache.get("robot_01").unwrap();
    assert_eq!(entity, applied.snapshot);
}

#[test]
fn test_partial_update_keeps_other_fields() {
    let cache = EntityStateCache::new();
    let t0 = Utc::now();

    cache.apply_telemetry("r1", &status("walking", "OK", 80.0), t0);

    let battery_only = TelemetryUpdate {
        battery: Some(42.0),
        ..Default::default()
    };
    let t1 = t0 + Duration::seconds(1);
    let applied = cache.apply_telemetry("r1", &battery_only, t1);

    assert!(!applied.created);
    assert_eq!(applied.snapshot.battery, 42.0);
    assert_eq!(applied.snapshot.mode, "walking");
    assert_eq!(applied.snapshot.status, "OK");
    assert_eq!(applied.snapshot.last_updated, t1);
    assert_eq!(applied.previous_status, None);
}

#[test]
fn test_pose_components_update_individually() {
    let cache = EntityStateCache::new();
    let now = Utc::now();

    let full = TelemetryUpdate {
        pose: Some(PoseUpdate {
            x: Some(1.0),
            y: Some(2.0),
            theta: Some(0.5),
        }),
        ..Default::default()
    };
    cache.apply_telemetry("r1", &full, now);

    let x_only = TelemetryUpdate {
        pose: Some(PoseUpdate {
            x: Some(9.0),
            ..Default::default()
        }),
        gps: Some(GpsFix {
            latitude: 37.77,
            longitude: -122.41,
        }),
        ..Default::default()
    };
    let snapshot = cache.apply_telemetry("r1", &x_only, now).snapshot;

    assert_eq!(snapshot.pose.x, 9.0);
    assert_eq!(snapshot.pose.y, 2.0);
    assert_eq!(snapshot.pose.theta, 0.5);
    assert_eq!(snapshot.gps.unwrap().latitude, 37.77);
}

#[test]
fn test_battery_is_clamped() {
    let cache = EntityStateCache::new();
    let now = Utc::now();

    let high = cache.apply_telemetry("r1", &status("idle", "OK", 150.0), now);
    assert_eq!(high.snapshot.battery, 100.0);

    let low = cache.apply_telemetry("r1", &status("idle", "OK", -5.0), now);
    assert_eq!(low.snapshot.battery, 0.0);

    assert_eq!(clamp_battery(f64::NAN), 0.0);
    assert_eq!(clamp_battery(55.5), 55.5);
}

#[test]
fn test_status_change_reports_previous() {
    let cache = EntityStateCache::new();
    let now = Utc::now();

    cache.apply_telemetry("r1", &status("idle", "OK", 50.0), now);

    let same = cache.apply_telemetry("r1", &status("idle", "OK", 49.0), now);
    assert_eq!(same.previous_status, None);

    let changed = cache.apply_telemetry("r1", &status("idle", "CHARGING", 49.0), now);
    assert_eq!(changed.previous_status.as_deref(), Some("OK"));
    assert_eq!(changed.snapshot.status, "CHARGING");
}

#[test]
fn test_error_list_is_capped() {
    let cache = EntityStateCache::new();
    let now = Utc::now();

    for i in 0..15 {
        cache.append_error("r1", format!("[NAV] failure {}", i), now);
    }

    let entity = cache.get("r1").unwrap();
    assert_eq!(entity.recent_errors.len(), DEFAULT_MAX_RECENT_ERRORS);
    // Oldest five evicted, newest last
    assert_eq!(entity.recent_errors[0], "[NAV] failure 5");
    assert_eq!(entity.recent_errors[9], "[NAV] failure 14");
}

#[test]
fn test_custom_error_capacity() {
    let cache = EntityStateCache::with_error_capacity(3);
    let now = Utc::now();

    for i in 0..5 {
        cache.append_error("r1", i.to_string(), now);
    }

    assert_eq!(cache.get("r1").unwrap().recent_errors, vec!["2", "3", "4"]);
}

#[test]
fn test_append_error_creates_and_refreshes() {
    let cache = EntityStateCache::new();
    let t0 = Utc::now();
    let t1 = t0 + Duration::seconds(3);

    let first = cache.append_error("r7", "[X] boom".to_string(), t0);
    assert!(first.created);
    assert_eq!(first.snapshot.mode, UNKNOWN);
    assert_eq!(first.snapshot.battery, 0.0);

    let second = cache.append_error("r7", "[X] again".to_string(), t1);
    assert!(!second.created);
    assert_eq!(second.snapshot.last_updated, t1);
    assert_eq!(second.snapshot.recent_errors.len(), 2);
}

#[test]
fn test_clear_errors() {
    let cache = EntityStateCache::new();
    let now = Utc::now();

    cache.append_error("r1", "[X] boom".to_string(), now);
    assert!(cache.clear_errors("r1"));
    assert!(cache.get("r1").unwrap().recent_errors.is_empty());

    assert!(!cache.clear_errors("ghost"));
    assert!(cache.get("ghost").is_none());
}

#[test]
fn test_get_all_returns_copies() {
    let cache = EntityStateCache::new();
    let now = Utc::now();

    cache.apply_telemetry("r1", &status("idle", "OK", 10.0), now);
    cache.apply_telemetry("r2", &status("idle", "OK", 20.0), now);

    let mut all = cache.get_all();
    assert_eq!(all.len(), 2);

    all.get_mut("r1").unwrap().battery = 99.0;
    assert_eq!(cache.get("r1").unwrap().battery, 10.0);
}

#[test]
fn test_get_nonexistent_entity() {
    let cache = EntityStateCache::new();
    assert!(cache.get("nonexistent").is_none());
    assert!(cache.is_empty());
}

#[test]
fn test_concurrent_access() {
    let cache = Arc::new(EntityStateCache::new());
    let mut handles = vec![];

    for i in 0..10 {
        let cache_clone = Arc::clone(&cache);
        let handle = thread::spawn(move || {
            let id = format!("robot_{:02}", i);
            for j in 0..100 {
                let update = TelemetryUpdate {
                    battery: Some(j as f64),
                    ..Default::default()
                };
                cache_clone.apply_telemetry(&id, &update, Utc::now());
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.len(), 10);
    for entity in cache.get_all().values() {
        assert_eq!(entity.battery, 99.0);
    }
}

#[test]
fn test_concurrent_errors_same_entity() {
    let cache = Arc::new(EntityStateCache::new());
    let mut handles = vec![];

    for i in 0..8 {
        let cache_clone = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for j in 0..50 {
                cache_clone.append_error("shared", format!("{}-{}", i, j), Utc::now());
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let entity = cache.get("shared").unwrap();
    assert_eq!(entity.recent_errors.len(), DEFAULT_MAX_RECENT_ERRORS);
}
