//! Simulated robots publishing telemetry onto the bus.
//!
//! Motion is a first-order Euler integration of commanded velocities; it is
//! meant to look plausible on a dashboard, not to model real dynamics.

use crate::bus::MessageBus;
use crate::config::SimulatorConfig;
use crate::telemetry::{parse_topic, Category, Command, GpsFix, Pose};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::f64::consts::TAU;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

pub const SPEED_WALK: f64 = 1.2;
pub const SPEED_RUN: f64 = 4.5;
/// Turn rate for teleop turns (rad/s)
pub const SPEED_TURN: f64 = 0.8;

const EARTH_RADIUS_M: f64 = 6_378_137.0;
const LOW_BATTERY: f64 = 20.0;

pub const STATUS_IDLE: &str = "idle";
pub const STATUS_MOVING: &str = "moving";
pub const STATUS_CHARGING: &str = "charging";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RobotMode {
    Standing,
    Sitting,
    Walking,
    Running,
}

impl RobotMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RobotMode::Standing => "standing",
            RobotMode::Sitting => "sitting",
            RobotMode::Walking => "walking",
            RobotMode::Running => "running",
        }
    }

    /// Accepts full names and the short forms clients send ("walk", "sit", ...)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standing" | "stand" => Some(RobotMode::Standing),
            "sitting" | "sit" => Some(RobotMode::Sitting),
            "walking" | "walk" => Some(RobotMode::Walking),
            "running" | "run" => Some(RobotMode::Running),
            _ => None,
        }
    }

    /// Battery drain in percent per second
    fn drain_rate(&self) -> f64 {
        match self {
            RobotMode::Standing => 0.01,
            RobotMode::Sitting => 0.005,
            RobotMode::Walking => 0.05,
            RobotMode::Running => 0.1,
        }
    }

    fn is_moving(&self) -> bool {
        matches!(self, RobotMode::Walking | RobotMode::Running)
    }
}

/// Move a GPS fix `distance_m` along `heading` (radians, 0 = north)
pub fn offset_gps(fix: GpsFix, distance_m: f64, heading: f64) -> GpsFix {
    let lat = fix.latitude.to_radians();
    let lon = fix.longitude.to_radians();
    let angular = distance_m / EARTH_RADIUS_M;

    let new_lat = (lat.sin() * angular.cos() + lat.cos() * angular.sin() * heading.cos()).asin();
    let new_lon = lon
        + (heading.sin() * angular.sin() * lat.cos())
            .atan2(angular.cos() - lat.sin() * new_lat.sin());

    GpsFix {
        latitude: new_lat.to_degrees(),
        longitude: new_lon.to_degrees(),
    }
}

const FAULTS: &[(&str, &str, &str)] = &[
    ("NAVIGATION", "Path planning failed", "WARNING"),
    ("SENSOR", "Lidar scan timeout", "ERROR"),
    ("MOTOR", "Joint torque limit exceeded", "CRITICAL"),
    ("COMMS", "Telemetry link degraded", "INFO"),
];

const JOINTS: &[&str] = &[
    "neck",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "hip",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

pub struct RobotSimulator {
    id: String,
    mode: RobotMode,
    status: &'static str,
    battery: f64,
    pose: Pose,
    gps: GpsFix,
    linear: f64,
    angular: f64,
    elapsed: f64,
}

impl RobotSimulator {
    pub fn new(id: impl Into<String>, gps: GpsFix, battery: f64) -> Self {
        Self {
            id: id.into(),
            mode: RobotMode::Standing,
            status: STATUS_IDLE,
            battery: battery.clamp(0.0, 100.0),
            pose: Pose::default(),
            gps,
            linear: 0.0,
            angular: 0.0,
            elapsed: 0.0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> RobotMode {
        self.mode
    }

    pub fn status(&self) -> &'static str {
        self.status
    }

    pub fn battery(&self) -> f64 {
        self.battery
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn gps(&self) -> GpsFix {
        self.gps
    }

    pub fn velocity(&self) -> (f64, f64) {
        (self.linear, self.angular)
    }

    /// Advance the simulation by `dt` seconds
    pub fn tick<R: Rng>(&mut self, dt: f64, rng: &mut R) {
        self.elapsed += dt;

        if self.mode.is_moving() && (self.linear != 0.0 || self.angular != 0.0) {
            self.pose.theta = (self.pose.theta + self.angular * dt).rem_euclid(TAU);
            self.pose.x += self.linear * self.pose.theta.cos() * dt;
            self.pose.y += self.linear * self.pose.theta.sin() * dt;

            // Negative distance moves backwards along the heading
            self.gps = offset_gps(self.gps, self.linear * dt, self.pose.theta);
            self.status = STATUS_MOVING;
        } else {
            if !self.mode.is_moving() {
                self.linear = 0.0;
                self.angular = 0.0;
            }
            if self.status == STATUS_MOVING {
                self.status = STATUS_IDLE;
            }
        }

        self.battery = (self.battery - self.mode.drain_rate() * dt).max(0.0);

        if self.mode == RobotMode::Sitting && self.battery < LOW_BATTERY && rng.gen_bool(0.1) {
            self.status = STATUS_CHARGING;
            self.battery = (self.battery + 0.5 * dt).min(100.0);
        }
    }

    /// React to a command addressed to this robot
    pub fn apply_command(&mut self, command: &Command) {
        match command {
            Command::CmdVel { linear, angular } => {
                self.linear = *linear;
                self.angular = *angular;
            }
            Command::Mode { mode } if mode == "stop" => self.stop(),
            Command::Mode { mode } => match RobotMode::parse(mode) {
                Some(mode) => self.set_mode(mode),
                None => warn!(robot_id = %self.id, mode = %mode, "Ignoring unknown mode"),
            },
            Command::Teleop { command, .. } => self.teleop(command),
            Command::EmergencyStop => {
                self.stop();
                self.set_mode(RobotMode::Standing);
            }
            Command::Update { update_type } => {
                info!(robot_id = %self.id, update_type = %update_type, "Update requested");
            }
        }
    }

    fn teleop(&mut self, command: &str) {
        let speed = if self.mode == RobotMode::Walking {
            SPEED_WALK
        } else {
            SPEED_RUN
        };

        match command {
            "stop" => self.stop(),
            "move_forward" | "move_backward" | "turn_left" | "turn_right"
                if self.mode == RobotMode::Sitting => {}
            "move_forward" => {
                self.linear = speed;
                self.angular = 0.0;
            }
            "move_backward" => {
                self.linear = -speed;
                self.angular = 0.0;
            }
            "turn_left" => {
                self.linear = 0.0;
                self.angular = SPEED_TURN;
            }
            "turn_right" => {
                self.linear = 0.0;
                self.angular = -SPEED_TURN;
            }
            other => match RobotMode::parse(other) {
                Some(mode) => self.set_mode(mode),
                None => warn!(robot_id = %self.id, command = %other, "Unknown teleop command"),
            },
        }
    }

    fn set_mode(&mut self, mode: RobotMode) {
        self.mode = mode;
        self.angular = 0.0;
        match mode {
            RobotMode::Walking => {
                self.linear = SPEED_WALK;
                self.status = STATUS_MOVING;
            }
            RobotMode::Running => {
                self.linear = SPEED_RUN;
                self.status = STATUS_MOVING;
            }
            RobotMode::Standing | RobotMode::Sitting => {
                self.linear = 0.0;
                self.status = STATUS_IDLE;
            }
        }
    }

    fn stop(&mut self) {
        self.linear = 0.0;
        self.angular = 0.0;
        self.status = STATUS_IDLE;
    }

    /// Messages published every tick: (topic, payload)
    pub fn telemetry(&self, now: DateTime<Utc>) -> Vec<(String, Value)> {
        let timestamp = now.to_rfc3339();
        let pose = json!({
            "x": round_to(self.pose.x, 3),
            "y": round_to(self.pose.y, 3),
            "theta": round_to(self.pose.theta, 3),
        });
        let gps = json!({ "latitude": self.gps.latitude, "longitude": self.gps.longitude });

        vec![
            (
                format!("robot/status/{}", self.id),
                json!({
                    "robot_id": self.id,
                    "mode": self.mode.as_str(),
                    "status": self.status,
                    "battery": round_to(self.battery, 2),
                    "pose": pose,
                    "gps": gps,
                    "velocity": {
                        "linear": round_to(self.linear, 3),
                        "angular": round_to(self.angular, 3),
                    },
                    "timestamp": timestamp,
                }),
            ),
            (
                format!("robot/pose/{}", self.id),
                json!({ "pose": pose, "gps": gps, "timestamp": timestamp }),
            ),
            (
                format!("robot/gps/{}", self.id),
                json!({
                    "latitude": self.gps.latitude,
                    "longitude": self.gps.longitude,
                    "heading": self.pose.theta.to_degrees(),
                    "timestamp": timestamp,
                }),
            ),
            (
                format!("robot/joints/{}", self.id),
                json!({
                    "frame_id": "base_link",
                    "joints": self.joints(),
                    "timestamp": timestamp,
                }),
            ),
        ]
    }

    fn joints(&self) -> Vec<Value> {
        let amplitude = match self.mode {
            RobotMode::Sitting => 0.05,
            RobotMode::Standing => 0.0,
            RobotMode::Walking => 0.8,
            RobotMode::Running => 1.5,
        };
        let phase = (self.elapsed * 2.0).sin() * 0.1;

        JOINTS
            .iter()
            .enumerate()
            .map(|(i, name)| {
                // Left and right limbs swing in opposition
                let side = if name.starts_with("right") { -1.0 } else { 1.0 };
                let position = side * phase * amplitude * (1.0 + i as f64 * 0.1);
                json!({
                    "name": name,
                    "position": [round_to(position, 3)],
                    "velocity": round_to(amplitude * 0.3, 3),
                    "status": "OK",
                })
            })
            .collect()
    }

    /// Roll for a random fault report
    pub fn maybe_fault<R: Rng>(
        &self,
        probability: f64,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Option<(String, Value)> {
        if probability <= 0.0 || !rng.gen_bool(probability.min(1.0)) {
            return None;
        }

        let (error_type, message, severity) = if self.battery < LOW_BATTERY {
            ("BATTERY", "Battery level low", "WARNING")
        } else {
            FAULTS[rng.gen_range(0..FAULTS.len())]
        };

        Some((
            format!("robot/errors/{}", self.id),
            json!({
                "error_type": error_type,
                "message": message,
                "severity": severity,
                "timestamp": now.to_rfc3339(),
            }),
        ))
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Spawn one task per simulated robot, placed in a ring around the center
pub fn spawn_fleet(bus: Arc<dyn MessageBus>, config: &SimulatorConfig) -> Vec<JoinHandle<()>> {
    let mut rng = StdRng::from_entropy();
    let center = GpsFix {
        latitude: config.center_lat,
        longitude: config.center_lon,
    };
    let count = config.robots;

    (0..count)
        .map(|i| {
            let id = format!("robot_{:02}", i + 1);
            let bearing = TAU * i as f64 / count as f64;
            let distance = rng.gen_range(0.0..=config.spawn_radius_km.max(0.0)) * 1000.0;
            let start = offset_gps(center, distance, bearing);
            let robot = RobotSimulator::new(id, start, rng.gen_range(50.0..100.0));

            tokio::spawn(run_robot(Arc::clone(&bus), robot, config.clone()))
        })
        .collect()
}

async fn publish(bus: &dyn MessageBus, robot_id: &str, topic: String, payload: Value) {
    let bytes = match serde_json::to_vec(&payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(robot_id = %robot_id, error = %e, "Failed to serialize telemetry");
            return;
        }
    };
    if let Err(e) = bus.publish(&topic, bytes.into()).await {
        warn!(robot_id = %robot_id, topic = %topic, error = %e, "Failed to publish telemetry");
    }
}

async fn publish_telemetry(bus: &dyn MessageBus, robot: &RobotSimulator) {
    for (topic, payload) in robot.telemetry(Utc::now()) {
        publish(bus, robot.id(), topic, payload).await;
    }
}

async fn run_robot(bus: Arc<dyn MessageBus>, mut robot: RobotSimulator, config: SimulatorConfig) {
    let filter = format!("robot/+/{}", robot.id());
    let mut commands = match bus.subscribe(&filter).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(robot_id = %robot.id(), error = %e, "Failed to subscribe to commands");
            return;
        }
    };

    let period = config.publish_interval();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut rng = StdRng::from_entropy();

    info!(robot_id = %robot.id(), "Robot simulator started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                robot.tick(period.as_secs_f64(), &mut rng);
                publish_telemetry(bus.as_ref(), &robot).await;

                if let Some((topic, payload)) =
                    robot.maybe_fault(config.error_probability, &mut rng, Utc::now())
                {
                    publish(bus.as_ref(), robot.id(), topic, payload).await;
                }
            }
            Some(message) = commands.next() => {
                // The filter also matches this robot's own telemetry
                let kind = match parse_topic(&message.topic) {
                    Ok(topic) => match topic.category {
                        Category::Command(kind) => kind,
                        _ => continue,
                    },
                    Err(_) => continue,
                };

                match Command::from_payload(kind, &message.payload) {
                    Ok(command) => {
                        info!(robot_id = %robot.id(), command = kind.as_str(), "Command received");
                        robot.apply_command(&command);
                        publish_telemetry(bus.as_ref(), &robot).await;
                    }
                    Err(e) => {
                        debug!(robot_id = %robot.id(), error = %e, "Ignoring invalid command");
                    }
                }
            }
        }
    }
}
