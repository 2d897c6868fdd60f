use super::*;
use serde_json::json;

fn hub(capacity: usize) -> BroadcastHub {
    BroadcastHub::new(capacity, MetricsTracker::new())
}

fn event(entity_id: &str, n: i64) -> RelayEvent {
    RelayEvent {
        event_type: EventType::Pose,
        entity_id: entity_id.to_string(),
        data: json!({"pose": {"x": n, "y": 0.0, "theta": 0.0}}),
        timestamp: Utc::now(),
    }
}

fn decode(frame: &Frame) -> serde_json::Value {
    serde_json::from_str(&frame.text).unwrap()
}

#[test]
fn test_subscribe_and_count() {
    let hub = hub(8);
    assert_eq!(hub.count(), 0);

    let a = hub.subscribe();
    let b = hub.subscribe();
    assert_ne!(a.id, b.id);
    assert_eq!(hub.count(), 2);

    assert!(hub.unsubscribe(a.id));
    assert_eq!(hub.count(), 1);
}

#[test]
fn test_unsubscribe_is_idempotent() {
    let hub = hub(8);
    let sub = hub.subscribe();

    assert!(hub.unsubscribe(sub.id));
    assert!(!hub.unsubscribe(sub.id));
    assert_eq!(hub.count(), 0);
}

#[test]
fn test_publish_reaches_every_subscriber_once() {
    let hub = hub(8);
    let mut a = hub.subscribe();
    let mut b = hub.subscribe();

    let report = hub.publish(&event("robot_01", 1));
    assert_eq!(report, PublishReport { delivered: 2, pruned: 0 });

    for sub in [&mut a, &mut b] {
        let frame = sub.receiver.try_recv().unwrap();
        assert_eq!(&*frame.entity_id, "robot_01");
        let value = decode(&frame);
        assert_eq!(value["type"], "pose");
        assert_eq!(value["entityId"], "robot_01");
        assert_eq!(value["data"]["pose"]["x"], 1);
        assert!(sub.receiver.try_recv().is_err());
    }
}

#[test]
fn test_publish_with_no_subscribers() {
    let hub = hub(8);
    assert_eq!(hub.publish(&event("r1", 1)), PublishReport::default());
}

#[test]
fn test_saturated_subscriber_is_isolated_and_removed() {
    let hub = hub(2);
    let mut healthy = hub.subscribe();
    let stalled = hub.subscribe();

    hub.publish(&event("r1", 1));
    hub.publish(&event("r1", 2));

    let mut seen = Vec::new();
    while let Ok(frame) = healthy.receiver.try_recv() {
        seen.push(decode(&frame)["data"]["pose"]["x"].as_i64().unwrap());
    }

    // Stalled queue is still full; the drained one has room
    let report = hub.publish(&event("r1", 3));
    assert_eq!(report, PublishReport { delivered: 1, pruned: 1 });

    let frame = healthy.receiver.try_recv().unwrap();
    seen.push(decode(&frame)["data"]["pose"]["x"].as_i64().unwrap());

    assert_eq!(seen, vec![1, 2, 3]);
    assert_eq!(hub.count(), 1);
    assert!(!hub.unsubscribe(stalled.id));
}

#[test]
fn test_closed_subscriber_is_pruned() {
    let hub = hub(8);
    let _kept = hub.subscribe();
    let dropped = hub.subscribe();
    drop(dropped.receiver);

    let report = hub.publish(&event("r1", 1));
    assert_eq!(report, PublishReport { delivered: 1, pruned: 1 });
    assert_eq!(hub.count(), 1);
}

#[test]
fn test_per_subscriber_order() {
    let hub = hub(128);
    let mut sub = hub.subscribe();

    for n in 0..100 {
        hub.publish(&event("r1", n));
    }

    for n in 0..100 {
        let frame = sub.receiver.try_recv().unwrap();
        assert_eq!(decode(&frame)["data"]["pose"]["x"], n);
    }
}

#[test]
fn test_metrics_track_publish_and_prune() {
    let metrics = MetricsTracker::new();
    let hub = BroadcastHub::new(4, metrics.clone());
    let gone = hub.subscribe();
    drop(gone.receiver);

    hub.publish(&event("r1", 1));
    hub.publish(&event("r1", 2));

    let snapshot = metrics.get_snapshot(10);
    assert_eq!(snapshot.events_published, 2);
    assert_eq!(snapshot.subscribers_pruned, 1);
}

#[tokio::test]
async fn test_concurrent_subscribe_during_publish() {
    let hub = Arc::new(hub(1024));
    let mut handles = Vec::new();

    for _ in 0..4 {
        let hub = Arc::clone(&hub);
        handles.push(tokio::spawn(async move {
            let mut subs = Vec::new();
            for _ in 0..25 {
                subs.push(hub.subscribe());
            }
            subs
        }));
    }

    for n in 0..10 {
        hub.publish(&event("r1", n));
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap().len();
    }

    assert_eq!(total, 100);
    assert_eq!(hub.count(), 100);
}

#[test]
fn test_event_wire_format() {
    let event = RelayEvent {
        event_type: EventType::Telemetry,
        entity_id: "robot_02".to_string(),
        data: json!({"battery": 50.0}),
        timestamp: Utc::now(),
    };

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "telemetry");
    assert_eq!(value["entityId"], "robot_02");
    assert!(value["timestamp"].is_string());

    let parsed: RelayEvent = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, event);
}
