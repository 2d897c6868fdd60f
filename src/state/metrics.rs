use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Sliding window used for the message rate (milliseconds)
const RATE_WINDOW_MS: i64 = 5000;

#[derive(Default)]
struct Counters {
    messages_received: AtomicU64,
    messages_malformed: AtomicU64,
    messages_unrouted: AtomicU64,
    events_published: AtomicU64,
    subscribers_pruned: AtomicU64,
    samples_queued: AtomicU64,
    samples_throttled: AtomicU64,
    samples_written: AtomicU64,
    errors_written: AtomicU64,
    persistence_failures: AtomicU64,
    persistence_dropped: AtomicU64,
}

/// Relay counters shared by the router, hub and store writer.
///
/// Clones share the same underlying counters.
#[derive(Clone)]
pub struct MetricsTracker {
    counters: Arc<Counters>,

    /// Message timestamps for rate calculation (sliding 5-second window)
    message_timestamps: Arc<RwLock<VecDeque<i64>>>,

    /// Entities seen (entity_id -> last_seen_timestamp_ms)
    active_entities: Arc<RwLock<HashMap<String, i64>>>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            message_timestamps: Arc::new(RwLock::new(VecDeque::new())),
            active_entities: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record an inbound message (call before classification)
    pub fn record_message(&self) {
        self.counters.messages_received.fetch_add(1, Ordering::Relaxed);

        let now = Utc::now().timestamp_millis();
        let mut timestamps = self
            .message_timestamps
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        timestamps.push_back(now);

        while let Some(&oldest) = timestamps.front() {
            if now - oldest > RATE_WINDOW_MS {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record that a message was attributed to `entity_id`
    pub fn record_entity_activity(&self, entity_id: &str) {
        let now = Utc::now().timestamp_millis();
        let mut entities = self
            .active_entities
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entities.insert(entity_id.to_string(), now);
    }

    pub fn record_malformed(&self) {
        self.counters.messages_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unrouted(&self) {
        self.counters.messages_unrouted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_published(&self) {
        self.counters.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscribers_pruned(&self, count: usize) {
        self.counters
            .subscribers_pruned
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_sample_queued(&self) {
        self.counters.samples_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_throttled(&self) {
        self.counters.samples_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_written(&self) {
        self.counters.samples_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error_written(&self) {
        self.counters.errors_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence_failure(&self) {
        self.counters
            .persistence_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a write dropped because the writer queue was full or gone
    pub fn record_persistence_dropped(&self) {
        self.counters
            .persistence_dropped
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_messages_received(&self) -> u64 {
        self.counters.messages_received.load(Ordering::Relaxed)
    }

    pub fn get_malformed(&self) -> u64 {
        self.counters.messages_malformed.load(Ordering::Relaxed)
    }

    pub fn get_unrouted(&self) -> u64 {
        self.counters.messages_unrouted.load(Ordering::Relaxed)
    }

    pub fn get_samples_written(&self) -> u64 {
        self.counters.samples_written.load(Ordering::Relaxed)
    }

    pub fn get_persistence_failures(&self) -> u64 {
        self.counters.persistence_failures.load(Ordering::Relaxed)
    }

    /// Get current message rate (messages per second over last 5 seconds)
    pub fn get_message_rate(&self) -> f64 {
        let timestamps = self
            .message_timestamps
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        timestamps.len() as f64 / (RATE_WINDOW_MS as f64 / 1000.0)
    }

    /// Get count of entities heard from within the window
    pub fn get_active_entity_count(&self, window_seconds: i64) -> usize {
        let threshold = Utc::now().timestamp_millis() - (window_seconds * 1000);

        let entities = self
            .active_entities
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        entities
            .values()
            .filter(|&&last_seen| last_seen > threshold)
            .count()
    }

    /// Get snapshot of all metrics
    pub fn get_snapshot(&self, active_window_seconds: i64) -> MetricsSnapshot {
        let c = &self.counters;
        MetricsSnapshot {
            messages_received: c.messages_received.load(Ordering::Relaxed),
            messages_malformed: c.messages_malformed.load(Ordering::Relaxed),
            messages_unrouted: c.messages_unrouted.load(Ordering::Relaxed),
            message_rate: self.get_message_rate(),
            active_entities: self.get_active_entity_count(active_window_seconds),
            events_published: c.events_published.load(Ordering::Relaxed),
            subscribers_pruned: c.subscribers_pruned.load(Ordering::Relaxed),
            samples_queued: c.samples_queued.load(Ordering::Relaxed),
            samples_throttled: c.samples_throttled.load(Ordering::Relaxed),
            samples_written: c.samples_written.load(Ordering::Relaxed),
            errors_written: c.errors_written.load(Ordering::Relaxed),
            persistence_failures: c.persistence_failures.load(Ordering::Relaxed),
            persistence_dropped: c.persistence_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub messages_malformed: u64,
    pub messages_unrouted: u64,
    pub message_rate: f64,
    pub active_entities: usize,
    pub events_published: u64,
    pub subscribers_pruned: u64,
    pub samples_queued: u64,
    pub samples_throttled: u64,
    pub samples_written: u64,
    pub errors_written: u64,
    pub persistence_failures: u64,
    pub persistence_dropped: u64,
}
