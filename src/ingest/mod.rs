//! Ingest router: classify inbound bus messages and fan them out to the
//! cache, the store writer and the broadcast hub.

use crate::bus::BusStream;
use crate::hub::{BroadcastHub, EventType, RelayEvent};
use crate::state::{clamp_battery, AppliedUpdate, EntityStateCache, MetricsTracker};
use crate::store::{StoreWriter, WriteThrottle};
use crate::telemetry::{
    parse_topic, Category, ErrorReport, GpsFix, PoseUpdate, SampleKind, TelemetrySample,
    TelemetryUpdate, TopicError,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};


/// Why a message was dropped before reaching the cache
#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    Topic(TopicError),
    InvalidJson(String),
    NotAnObject,
    /// A known field carried the wrong type
    InvalidFields {
        category: &'static str,
        reason: String,
    },
    MissingPose,
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Topic(e) => write!(f, "{}", e),
            IngestError::InvalidJson(e) => write!(f, "payload is not valid JSON: {}", e),
            IngestError::NotAnObject => write!(f, "payload must be a JSON object"),
            IngestError::InvalidFields { category, reason } => {
                write!(f, "invalid {} payload: {}", category, reason)
            }
            IngestError::MissingPose => write!(f, "pose payload carries no position fields"),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<TopicError> for IngestError {
    fn from(e: TopicError) -> Self {
        IngestError::Topic(e)
    }
}

/// What the router did with one message
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Applied and broadcast as `events` events
    Applied { entity_id: String, events: usize },
    /// Well-formed topic the relay does not act on (commands, unknown categories)
    Unrouted,
    /// Dropped and counted as malformed
    Malformed(IngestError),
}

#[derive(Deserialize)]
struct BatteryReading {
    battery: Option<f64>,
    level: Option<f64>,
}

#[derive(Deserialize)]
struct GpsReading {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

pub struct IngestRouter {
    cache: Arc<EntityStateCache>,
    hub: Arc<BroadcastHub>,
    writer: StoreWriter,
    throttle: WriteThrottle,
    metrics: MetricsTracker,
    // Apply, broadcast and enqueue happen in arrival order under this lock
    sequencer: Mutex<()>,
}

impl IngestRouter {
    pub fn new(
        cache: Arc<EntityStateCache>,
        hub: Arc<BroadcastHub>,
        writer: StoreWriter,
        throttle: WriteThrottle,
        metrics: MetricsTracker,
    ) -> Self {
        Self {
            cache,
            hub,
            writer,
            throttle,
            metrics,
            sequencer: Mutex::new(()),
        }
    }

    /// Route one inbound message, applied at the current time
    pub fn handle(&self, topic: &str, payload: &[u8]) -> Disposition {
        self.route(topic, payload, None)
    }

    /// Route one inbound message with an explicit application time.
    ///
    /// Never fails: malformed input is logged, counted and reported in the
    /// returned [`Disposition`].
    pub fn handle_at(&self, topic: &str, payload: &[u8], now: DateTime<Utc>) -> Disposition {
        self.route(topic, payload, Some(now))
    }

    fn route(&self, topic: &str, payload: &[u8], at: Option<DateTime<Utc>>) -> Disposition {
        self.metrics.record_message();

        let parsed = match parse_topic(topic) {
            Ok(parsed) => parsed,
            Err(e) => return self.malformed(topic, e.into()),
        };

        if let Category::Command(_) | Category::Unrecognized(_) = parsed.category {
            self.metrics.record_unrouted();
            debug!(topic = %topic, "Ignoring unrouted topic");
            return Disposition::Unrouted;
        }

        let body = match parse_object(payload) {
            Ok(body) => body,
            Err(e) => return self.malformed(topic, e),
        };

        let entity_id = parsed.entity_id.as_str();

        let _sequence = self
            .sequencer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Read the clock inside the sequencing section so application times
        // never go backwards between consecutive messages
        let now = at.unwrap_or_else(Utc::now);

        let routed = match parsed.category {
            Category::Status => self.route_status(entity_id, &body, payload, now),
            Category::Pose => self.route_pose(entity_id, &body, payload, now),
            Category::Errors => self.route_error(entity_id, &body, now),
            Category::Battery => self.route_battery(entity_id, body, now),
            Category::Gps => self.route_gps(entity_id, body, now),
            Category::Joints => Ok(self.emit(EventType::Joints, entity_id, body, now)),
            Category::Health => Ok(self.emit(EventType::Health, entity_id, body, now)),
            Category::Command(_) | Category::Unrecognized(_) => return Disposition::Unrouted,
        };

        match routed {
            Ok(events) => {
                self.metrics.record_entity_activity(entity_id);
                Disposition::Applied {
                    entity_id: parsed.entity_id,
                    events,
                }
            }
            Err(e) => self.malformed(topic, e),
        }
    }

    /// Convenience for in-process producers holding a decoded payload
    pub fn handle_json(&self, topic: &str, payload: &Value) -> Disposition {
        match serde_json::to_vec(payload) {
            Ok(bytes) => self.handle(topic, &bytes),
            Err(e) => self.malformed(topic, IngestError::InvalidJson(e.to_string())),
        }
    }

    /// Drain a bus subscription until it ends
    pub async fn run(self: Arc<Self>, mut stream: BusStream) {
        info!("Ingest started");
        while let Some(message) = stream.next().await {
            self.handle(&message.topic, &message.payload);
        }
        info!("Ingest stream closed");
    }

    fn malformed(&self, topic: &str, error: IngestError) -> Disposition {
        self.metrics.record_malformed();
        warn!(topic = %topic, error = %error, "Dropping malformed message");
        Disposition::Malformed(error)
    }

    fn route_status(
        &self,
        entity_id: &str,
        body: &Value,
        raw: &[u8],
        now: DateTime<Utc>,
    ) -> Result<usize, IngestError> {
        let update = TelemetryUpdate::deserialize(body).map_err(|e| invalid("status", e))?;
        let applied = self.cache.apply_telemetry(entity_id, &update, now);
        self.note_first_seen(&applied);

        let sample = TelemetrySample {
            entity_id: entity_id.to_string(),
            captured_at: now,
            kind: SampleKind::Snapshot,
            mode: update.mode.clone(),
            status: update.status.clone(),
            battery: update.battery.map(clamp_battery),
            pose: update.pose.map(|_| applied.snapshot.pose),
            raw_payload: String::from_utf8_lossy(raw).into_owned(),
        };
        self.persist_sample(sample);

        let mut events = self.emit(
            EventType::Telemetry,
            entity_id,
            snapshot_value(&applied),
            now,
        );

        if let Some(previous) = &applied.previous_status {
            info!(
                entity_id = %entity_id,
                from = %previous,
                to = %applied.snapshot.status,
                "Status changed"
            );
            events += self.emit(
                EventType::Status,
                entity_id,
                json!({ "status": applied.snapshot.status, "previous": previous }),
                now,
            );
        }

        Ok(events)
    }

    fn route_pose(
        &self,
        entity_id: &str,
        body: &Value,
        raw: &[u8],
        now: DateTime<Utc>,
    ) -> Result<usize, IngestError> {
        let mut update = TelemetryUpdate::deserialize(body)
            .map_err(|e| invalid("pose", e))?
            .position_only();

        // Flat {x, y, theta} payloads carry the pose at the top level
        if update.pose.is_none() {
            let flat = PoseUpdate::deserialize(body).map_err(|e| invalid("pose", e))?;
            if !flat.is_empty() {
                update.pose = Some(flat);
            }
        }

        if update.pose.map_or(true, |p| p.is_empty()) && update.gps.is_none() {
            return Err(IngestError::MissingPose);
        }

        let applied = self.cache.apply_telemetry(entity_id, &update, now);
        self.note_first_seen(&applied);

        self.persist_sample(TelemetrySample {
            entity_id: entity_id.to_string(),
            captured_at: now,
            kind: SampleKind::Pose,
            mode: None,
            status: None,
            battery: None,
            pose: Some(applied.snapshot.pose),
            raw_payload: String::from_utf8_lossy(raw).into_owned(),
        });

        Ok(self.emit(
            EventType::Pose,
            entity_id,
            json!({ "pose": applied.snapshot.pose, "gps": applied.snapshot.gps }),
            now,
        ))
    }

    fn route_error(
        &self,
        entity_id: &str,
        body: &Value,
        now: DateTime<Utc>,
    ) -> Result<usize, IngestError> {
        let report = ErrorReport::deserialize(body).map_err(|e| invalid("errors", e))?;
        let record = report.into_record(entity_id, now);

        match record.severity.to_ascii_uppercase().as_str() {
            "CRITICAL" | "ERROR" => error!(
                entity_id = %entity_id,
                category = %record.category,
                "Robot error: {}", record.message
            ),
            "WARNING" | "WARN" => warn!(
                entity_id = %entity_id,
                category = %record.category,
                "Robot warning: {}", record.message
            ),
            _ => info!(
                entity_id = %entity_id,
                category = %record.category,
                "Robot report: {}", record.message
            ),
        }

        let applied = self.cache.append_error(entity_id, record.summary(), now);
        self.note_first_seen(&applied);

        let data = serde_json::to_value(&record).unwrap_or(Value::Null);
        self.writer.submit_error(record);

        Ok(self.emit(EventType::Error, entity_id, data, now))
    }

    fn route_battery(
        &self,
        entity_id: &str,
        body: Value,
        now: DateTime<Utc>,
    ) -> Result<usize, IngestError> {
        let reading = BatteryReading::deserialize(&body).map_err(|e| invalid("battery", e))?;

        if let Some(level) = reading.battery.or(reading.level) {
            let update = TelemetryUpdate {
                battery: Some(level),
                ..Default::default()
            };
            let applied = self.cache.apply_telemetry(entity_id, &update, now);
            self.note_first_seen(&applied);
        }

        Ok(self.emit(EventType::Battery, entity_id, body, now))
    }

    fn route_gps(
        &self,
        entity_id: &str,
        body: Value,
        now: DateTime<Utc>,
    ) -> Result<usize, IngestError> {
        let reading = GpsReading::deserialize(&body).map_err(|e| invalid("gps", e))?;

        if let (Some(latitude), Some(longitude)) = (reading.latitude, reading.longitude) {
            let update = TelemetryUpdate {
                gps: Some(GpsFix {
                    latitude,
                    longitude,
                }),
                ..Default::default()
            };
            let applied = self.cache.apply_telemetry(entity_id, &update, now);
            self.note_first_seen(&applied);
        }

        Ok(self.emit(EventType::Gps, entity_id, body, now))
    }

    fn persist_sample(&self, sample: TelemetrySample) {
        let entity_id = sample.entity_id.clone();
        let (kind, captured_at) = (sample.kind, sample.captured_at);
        let writer = &self.writer;

        let claimed = self
            .throttle
            .acquire_with(&entity_id, kind, captured_at, || writer.submit_sample(sample));
        if claimed.is_none() {
            self.metrics.record_sample_throttled();
        }
    }

    fn note_first_seen(&self, applied: &AppliedUpdate) {
        if applied.created {
            info!(entity_id = %applied.snapshot.id, "Entity first seen");
        }
    }

    fn emit(&self, event_type: EventType, entity_id: &str, data: Value, now: DateTime<Utc>) -> usize {
        self.hub.publish(&RelayEvent {
            event_type,
            entity_id: entity_id.to_string(),
            data,
            timestamp: now,
        });
        1
    }
}

fn parse_object(payload: &[u8]) -> Result<Value, IngestError> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| IngestError::InvalidJson(e.to_string()))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(IngestError::NotAnObject)
    }
}

fn invalid(category: &'static str, e: serde_json::Error) -> IngestError {
    IngestError::InvalidFields {
        category,
        reason: e.to_string(),
    }
}

fn snapshot_value(applied: &AppliedUpdate) -> Value {
    serde_json::to_value(&applied.snapshot).unwrap_or(Value::Null)
}
