mod env;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub use crate::nats::NatsConfig;

/// Complete relay configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// In-process bus, producers must run inside the relay
    Local,
    Nats,
}

impl BusKind {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Some(BusKind::Local),
            "nats" => Some(BusKind::Nats),
            _ => None,
        }
    }
}

/// Message bus configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_bus_kind")]
    pub kind: BusKind,
    /// Filter the ingest task subscribes with
    #[serde(default = "default_subscribe_filter")]
    pub subscribe_filter: String,
    #[serde(default = "default_local_capacity")]
    pub local_capacity: usize,
    #[serde(default)]
    pub nats: NatsConfig,
}

fn default_bus_kind() -> BusKind {
    BusKind::Local
}

fn default_subscribe_filter() -> String {
    crate::bus::TELEMETRY_FILTER.to_string()
}

fn default_local_capacity() -> usize {
    4096
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            kind: default_bus_kind(),
            subscribe_filter: default_subscribe_filter(),
            local_capacity: default_local_capacity(),
            nats: NatsConfig::default(),
        }
    }
}

/// Sample store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Pending writes before new ones are dropped
    #[serde(default = "default_writer_queue")]
    pub writer_queue_capacity: usize,
}

fn default_db_path() -> String {
    "./data/robot_telemetry.db".to_string()
}

fn default_writer_queue() -> usize {
    1024
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            writer_queue_capacity: default_writer_queue(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Minimum spacing of persisted samples per robot and kind
    #[serde(default = "default_min_write_interval")]
    pub min_write_interval_seconds: f64,
}

fn default_min_write_interval() -> f64 {
    5.0
}

impl IngestConfig {
    pub fn min_write_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.min_write_interval_seconds).unwrap_or(Duration::ZERO)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_write_interval_seconds: default_min_write_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_recent_errors")]
    pub max_recent_errors: usize,
}

fn default_max_recent_errors() -> usize {
    crate::state::DEFAULT_MAX_RECENT_ERRORS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_recent_errors: default_max_recent_errors(),
        }
    }
}

/// Broadcast hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue_capacity: usize,
    /// Socket send timeout before a client is dropped (milliseconds)
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_ms: u64,
}

fn default_subscriber_queue() -> usize {
    crate::hub::DEFAULT_SUBSCRIBER_QUEUE
}

fn default_delivery_timeout() -> u64 {
    5000
}

impl HubConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: default_subscriber_queue(),
            delivery_timeout_ms: default_delivery_timeout(),
        }
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_query_limit")]
    pub default_limit: usize,
    #[serde(default = "default_error_limit")]
    pub default_error_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_query_limit() -> usize {
    100
}

fn default_error_limit() -> usize {
    50
}

fn default_max_limit() -> usize {
    500
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            default_limit: default_query_limit(),
            default_error_limit: default_error_limit(),
            max_limit: default_max_limit(),
        }
    }
}

/// Built-in simulated robots
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_simulator_enabled")]
    pub enabled: bool,
    #[serde(default = "default_robot_count")]
    pub robots: usize,
    #[serde(default = "default_publish_interval")]
    pub publish_interval_ms: u64,
    #[serde(default = "default_center_lat")]
    pub center_lat: f64,
    #[serde(default = "default_center_lon")]
    pub center_lon: f64,
    /// Spawn radius around the center (kilometers)
    #[serde(default = "default_spawn_radius")]
    pub spawn_radius_km: f64,
    /// Chance per tick that a robot reports a fault
    #[serde(default = "default_error_probability")]
    pub error_probability: f64,
}

fn default_simulator_enabled() -> bool {
    true
}

fn default_robot_count() -> usize {
    1
}

fn default_publish_interval() -> u64 {
    1000
}

fn default_center_lat() -> f64 {
    37.7749
}

fn default_center_lon() -> f64 {
    -122.4194
}

fn default_spawn_radius() -> f64 {
    5.0
}

fn default_error_probability() -> f64 {
    0.01
}

impl SimulatorConfig {
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms.max(1))
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: default_simulator_enabled(),
            robots: default_robot_count(),
            publish_interval_ms: default_publish_interval(),
            center_lat: default_center_lat(),
            center_lon: default_center_lon(),
            spawn_radius_km: default_spawn_radius(),
            error_probability: default_error_probability(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// How often to log a metrics snapshot (seconds)
    #[serde(default = "default_report_interval")]
    pub report_interval_seconds: u64,
    /// Time window for "active entity" tracking (seconds)
    #[serde(default = "default_active_window")]
    pub active_entity_window_seconds: i64,
}

fn default_report_interval() -> u64 {
    30
}

fn default_active_window() -> i64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_seconds: default_report_interval(),
            active_entity_window_seconds: default_active_window(),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<RelayConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: RelayConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Load the file if it exists (defaults otherwise), then apply environment
/// overrides
pub fn load_or_default(path: impl AsRef<Path>) -> Result<RelayConfig> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        load_config(path)?
    } else {
        RelayConfig::default()
    };
    config.apply_env_overrides();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.bus.kind, BusKind::Local);
        assert_eq!(config.bus.subscribe_filter, "robot/#");
        assert_eq!(config.ingest.min_write_interval(), Duration::from_secs(5));
        assert_eq!(config.cache.max_recent_errors, 10);
        assert_eq!(config.hub.delivery_timeout(), Duration::from_secs(5));
        assert_eq!(config.api.default_limit, 100);
        assert_eq!(config.api.max_limit, 500);
        assert_eq!(config.simulator.center_lat, 37.7749);
        assert_eq!(config.simulator.robots, 1);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [bus]
            kind = "nats"

            [bus.nats]
            url = "nats://example.com:4222"

            [store]
            path = "/tmp/relay.db"
            writer_queue_capacity = 64

            [ingest]
            min_write_interval_seconds = 2.5

            [hub]
            subscriber_queue_capacity = 32
            delivery_timeout_ms = 1500

            [simulator]
            enabled = false
            robots = 4
        "#;

        let config: RelayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.bus.kind, BusKind::Nats);
        assert_eq!(config.bus.nats.url, "nats://example.com:4222");
        assert_eq!(config.store.path, "/tmp/relay.db");
        assert_eq!(config.store.writer_queue_capacity, 64);
        assert_eq!(
            config.ingest.min_write_interval(),
            Duration::from_millis(2500)
        );
        assert_eq!(config.hub.subscriber_queue_capacity, 32);
        assert_eq!(config.hub.delivery_timeout(), Duration::from_millis(1500));
        assert!(!config.simulator.enabled);
        assert_eq!(config.simulator.robots, 4);
    }

    #[test]
    fn test_partial_config() {
        // Missing sections and fields use defaults
        let toml = r#"
            [metrics]
            report_interval_seconds = 3
        "#;

        let config: RelayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.metrics.report_interval_seconds, 3);
        assert_eq!(config.metrics.active_entity_window_seconds, 10);
        assert_eq!(config.store.writer_queue_capacity, 1024);
        assert_eq!(config.bus.local_capacity, 4096);
    }

    #[test]
    fn test_negative_interval_disables_throttle() {
        let config = IngestConfig {
            min_write_interval_seconds: -1.0,
        };
        assert_eq!(config.min_write_interval(), Duration::ZERO);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.api.default_error_limit, 50);
    }

    #[test]
    fn test_load_invalid_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[bus]\nkind = 7\n").unwrap();

        assert!(load_config(&path).is_err());
    }
}
