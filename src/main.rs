use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use telemetry_relay::api::{create_app, QueryAppState, WsAppState};
use telemetry_relay::bus::{CommandPublisher, LocalBus, MessageBus};
use telemetry_relay::config::{load_or_default, BusKind};
use telemetry_relay::hub::BroadcastHub;
use telemetry_relay::ingest::IngestRouter;
use telemetry_relay::nats::NatsBus;
use telemetry_relay::sim::spawn_fleet;
use telemetry_relay::state::{run_metrics_reporter, EntityStateCache, MetricsTracker};
use telemetry_relay::store::{SampleStore, SqliteSampleStore, StoreWriter, WriteThrottle};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telemetry_relay=info".into()),
        )
        .init();

    info!("Telemetry relay starting...");

    let config_path =
        std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "relay.toml".to_string());
    let config = load_or_default(&config_path)?;

    info!(
        config = %config_path,
        bus = ?config.bus.kind,
        db_path = %config.store.path,
        bind = %config.api.bind,
        "Configuration loaded"
    );

    // Initialize sample store
    if let Some(parent) = Path::new(&config.store.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create store directory {}", parent.display())
            })?;
        }
    }
    let store: Arc<dyn SampleStore> = Arc::new(
        SqliteSampleStore::open(&config.store.path).context("Failed to open sample store")?,
    );
    info!(path = %config.store.path, "Sample store opened");

    let metrics = MetricsTracker::new();
    let (writer, writer_handle) = StoreWriter::spawn(
        Arc::clone(&store),
        config.store.writer_queue_capacity,
        metrics.clone(),
    );

    let cache = Arc::new(EntityStateCache::with_error_capacity(
        config.cache.max_recent_errors,
    ));
    let hub = Arc::new(BroadcastHub::new(
        config.hub.subscriber_queue_capacity,
        metrics.clone(),
    ));

    // Connect message bus
    let bus: Arc<dyn MessageBus> = match config.bus.kind {
        BusKind::Local => {
            info!(capacity = config.bus.local_capacity, "Using in-process bus");
            Arc::new(LocalBus::new(config.bus.local_capacity))
        }
        BusKind::Nats => Arc::new(
            NatsBus::connect(&config.bus.nats)
                .await
                .context("Failed to connect to NATS")?,
        ),
    };

    if config.bus.kind == BusKind::Local && !config.simulator.enabled {
        warn!("In-process bus without simulators: no telemetry will arrive");
    }

    // Start ingest
    let router = Arc::new(IngestRouter::new(
        Arc::clone(&cache),
        Arc::clone(&hub),
        writer.clone(),
        WriteThrottle::new(config.ingest.min_write_interval()),
        metrics.clone(),
    ));
    let stream = bus
        .subscribe(&config.bus.subscribe_filter)
        .await
        .context("Failed to subscribe to telemetry topics")?;
    info!(filter = %config.bus.subscribe_filter, "Subscribed to telemetry");
    let ingest_handle = tokio::spawn(Arc::clone(&router).run(stream));

    // Simulated robots
    let fleet = if config.simulator.enabled {
        let handles = spawn_fleet(Arc::clone(&bus), &config.simulator);
        info!(robots = handles.len(), "Simulated robots started");
        handles
    } else {
        Vec::new()
    };

    let reporter_handle = tokio::spawn(run_metrics_reporter(
        metrics.clone(),
        Arc::clone(&cache),
        Arc::clone(&hub),
        config.metrics.report_interval_seconds,
        config.metrics.active_entity_window_seconds,
    ));

    // Start HTTP/WebSocket server
    let query_state = Arc::new(QueryAppState {
        cache: Arc::clone(&cache),
        store: Arc::clone(&store),
        hub: Arc::clone(&hub),
        metrics: metrics.clone(),
        limits: config.api.clone(),
        active_window_seconds: config.metrics.active_entity_window_seconds,
    });
    let ws_state = Arc::new(WsAppState {
        hub: Arc::clone(&hub),
        commands: Some(CommandPublisher::new(Arc::clone(&bus))),
        delivery_timeout: config.hub.delivery_timeout(),
    });
    let app = create_app(query_state, ws_state);

    let listener = tokio::net::TcpListener::bind(&config.api.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.api.bind))?;
    info!(bind = %config.api.bind, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Shutdown signal received");

    // Stop producers first, then drain pending writes
    for handle in fleet {
        handle.abort();
    }
    ingest_handle.abort();
    reporter_handle.abort();

    if !writer.flush().await {
        warn!("Store writer stopped before pending writes were flushed");
    }
    drop(router);
    drop(writer);
    if let Err(e) = writer_handle.await {
        warn!(error = %e, "Store writer task failed");
    }

    info!(
        samples_written = metrics.get_samples_written(),
        "Telemetry relay stopped"
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl_c signal");
        std::future::pending::<()>().await;
    }
}
