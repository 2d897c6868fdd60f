use crate::hub::BroadcastHub;
use crate::state::{EntityStateCache, MetricsTracker};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Periodically log a metrics snapshot
///
/// Runs until the task is aborted. Missed ticks are skipped so a stalled
/// runtime does not produce a burst of reports.
pub async fn run_metrics_reporter(
    metrics: MetricsTracker,
    cache: Arc<EntityStateCache>,
    hub: Arc<BroadcastHub>,
    interval_seconds: u64,
    active_window_seconds: i64,
) {
    let mut ticker = interval(Duration::from_secs(interval_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // First tick completes immediately; nothing to report yet
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let snapshot = metrics.get_snapshot(active_window_seconds);

        info!(
            entities = cache.len(),
            subscribers = hub.count(),
            received = snapshot.messages_received,
            malformed = snapshot.messages_malformed,
            unrouted = snapshot.messages_unrouted,
            rate = snapshot.message_rate,
            active = snapshot.active_entities,
            published = snapshot.events_published,
            pruned = snapshot.subscribers_pruned,
            samples_written = snapshot.samples_written,
            samples_throttled = snapshot.samples_throttled,
            persistence_failures = snapshot.persistence_failures,
            persistence_dropped = snapshot.persistence_dropped,
            "Relay metrics"
        );
    }
}
