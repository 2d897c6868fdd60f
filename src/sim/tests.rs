use super::*;
use crate::bus::LocalBus;
use crate::telemetry::{parse_topic, TelemetryUpdate};
use std::time::Duration;

fn robot() -> RobotSimulator {
    RobotSimulator::new(
        "robot_01",
        GpsFix {
            latitude: 37.7749,
            longitude: -122.4194,
        },
        80.0,
    )
}

fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

#[test]
fn test_standing_robot_does_not_move() {
    let mut robot = robot();
    let mut rng = rng();

    robot.apply_command(&Command::CmdVel {
        linear: 1.0,
        angular: 0.0,
    });
    robot.tick(1.0, &mut rng);

    assert_eq!(robot.pose(), Pose::default());
    // Velocities are zeroed outside walking/running
    assert_eq!(robot.velocity(), (0.0, 0.0));
    assert_eq!(robot.status(), STATUS_IDLE);
}

#[test]
fn test_walking_integrates_position() {
    let mut robot = robot();
    let mut rng = rng();

    robot.apply_command(&Command::Mode {
        mode: "walk".to_string(),
    });
    assert_eq!(robot.mode(), RobotMode::Walking);

    let start_gps = robot.gps();
    robot.tick(1.0, &mut rng);
    robot.tick(1.0, &mut rng);

    let pose = robot.pose();
    assert!((pose.x - 2.0 * SPEED_WALK).abs() < 1e-9);
    assert!(pose.y.abs() < 1e-9);
    assert_eq!(robot.status(), STATUS_MOVING);
    assert_ne!(robot.gps(), start_gps);
}

#[test]
fn test_heading_wraps() {
    let mut robot = robot();
    let mut rng = rng();

    robot.apply_command(&Command::Mode {
        mode: "running".to_string(),
    });
    robot.apply_command(&Command::CmdVel {
        linear: 0.0,
        angular: 4.0,
    });
    for _ in 0..5 {
        robot.tick(1.0, &mut rng);
    }

    let theta = robot.pose().theta;
    assert!((0.0..TAU).contains(&theta));
}

#[test]
fn test_battery_drains_by_mode() {
    let mut standing = robot();
    let mut running = robot();
    let mut rng = rng();

    running.apply_command(&Command::Mode {
        mode: "run".to_string(),
    });

    for _ in 0..10 {
        standing.tick(1.0, &mut rng);
        running.tick(1.0, &mut rng);
    }

    assert!((standing.battery() - 79.9).abs() < 1e-9);
    assert!((running.battery() - 79.0).abs() < 1e-9);
}

#[test]
fn test_battery_never_negative() {
    let mut robot = RobotSimulator::new("r", GpsFix { latitude: 0.0, longitude: 0.0 }, 0.01);
    let mut rng = rng();
    robot.apply_command(&Command::Mode {
        mode: "running".to_string(),
    });

    robot.tick(10.0, &mut rng);
    assert_eq!(robot.battery(), 0.0);
}

#[test]
fn test_emergency_stop_halts() {
    let mut robot = robot();
    robot.apply_command(&Command::Mode {
        mode: "running".to_string(),
    });
    robot.apply_command(&Command::EmergencyStop);

    assert_eq!(robot.mode(), RobotMode::Standing);
    assert_eq!(robot.velocity(), (0.0, 0.0));
    assert_eq!(robot.status(), STATUS_IDLE);
}

#[test]
fn test_teleop_commands() {
    let mut robot = robot();

    robot.apply_command(&Command::Teleop {
        command: "walk".to_string(),
        params: Default::default(),
    });
    assert_eq!(robot.mode(), RobotMode::Walking);

    robot.apply_command(&Command::Teleop {
        command: "turn_left".to_string(),
        params: Default::default(),
    });
    assert_eq!(robot.velocity(), (0.0, SPEED_TURN));

    robot.apply_command(&Command::Teleop {
        command: "sit".to_string(),
        params: Default::default(),
    });
    robot.apply_command(&Command::Teleop {
        command: "move_forward".to_string(),
        params: Default::default(),
    });
    // Sitting robots ignore motion commands
    assert_eq!(robot.velocity(), (0.0, 0.0));
}

#[test]
fn test_telemetry_is_ingestible() {
    let robot = robot();
    let messages = robot.telemetry(Utc::now());

    let topics: Vec<String> = messages.iter().map(|(t, _)| t.clone()).collect();
    assert_eq!(
        topics,
        vec![
            "robot/status/robot_01",
            "robot/pose/robot_01",
            "robot/gps/robot_01",
            "robot/joints/robot_01",
        ]
    );

    for (topic, _) in &messages {
        assert_eq!(parse_topic(topic).unwrap().entity_id, "robot_01");
    }

    let update: TelemetryUpdate = serde_json::from_value(messages[0].1.clone()).unwrap();
    assert_eq!(update.mode.as_deref(), Some("standing"));
    assert_eq!(update.battery, Some(80.0));
    assert!(update.pose.is_some());
    assert!(update.gps.is_some());
}

#[test]
fn test_fault_reports() {
    let robot = robot();
    let mut rng = rng();

    assert!(robot.maybe_fault(0.0, &mut rng, Utc::now()).is_none());

    let (topic, payload) = robot.maybe_fault(1.0, &mut rng, Utc::now()).unwrap();
    assert_eq!(topic, "robot/errors/robot_01");
    assert!(payload["error_type"].is_string());
    assert!(payload["severity"].is_string());
}

#[test]
fn test_gps_offset_moves_north() {
    let start = GpsFix {
        latitude: 0.0,
        longitude: 0.0,
    };
    let moved = offset_gps(start, 1000.0, 0.0);

    assert!(moved.latitude > 0.008 && moved.latitude < 0.01);
    assert!(moved.longitude.abs() < 1e-9);
}

#[tokio::test]
async fn test_fleet_publishes_and_obeys_commands() {
    let bus = Arc::new(LocalBus::new(256));
    let mut status = bus.subscribe("robot/status/+").await.unwrap();

    let config = SimulatorConfig {
        robots: 2,
        publish_interval_ms: 20,
        error_probability: 0.0,
        ..Default::default()
    };
    let handles = spawn_fleet(bus.clone(), &config);

    let mut seen = std::collections::HashSet::new();
    while seen.len() < 2 {
        let message = tokio::time::timeout(Duration::from_secs(2), status.next())
            .await
            .unwrap()
            .unwrap();
        seen.insert(message.topic);
    }
    assert!(seen.contains("robot/status/robot_01"));
    assert!(seen.contains("robot/status/robot_02"));

    let command = Command::Mode {
        mode: "sitting".to_string(),
    };
    let payload = serde_json::to_vec(&command.to_payload()).unwrap();
    bus.publish(&command.topic("robot_02"), payload.into())
        .await
        .unwrap();

    let sat = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(message) = status.next().await {
            if message.topic != "robot/status/robot_02" {
                continue;
            }
            let value: Value = serde_json::from_slice(&message.payload).unwrap();
            if value["mode"] == "sitting" {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(sat);

    for handle in handles {
        handle.abort();
    }
}
