use super::{BusKind, RelayConfig};
use tracing::warn;

impl RelayConfig {
    /// Apply overrides from process environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, ignoring unparseable values
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RELAY_BUS") {
            match BusKind::parse(&v) {
                Some(kind) => self.bus.kind = kind,
                None => warn!(value = %v, "Ignoring invalid RELAY_BUS"),
            }
        }
        if let Some(v) = lookup("NATS_URL") {
            self.bus.nats.url = v;
        }
        if let Some(v) = lookup("RELAY_DB_PATH") {
            self.store.path = v;
        }
        if let Some(v) = lookup("RELAY_BIND") {
            self.api.bind = v;
        }
        if let Some(v) = lookup("RELAY_SIMULATED_ROBOTS") {
            match v.parse::<usize>() {
                Ok(n) => {
                    self.simulator.robots = n;
                    self.simulator.enabled = n > 0;
                }
                Err(_) => warn!(value = %v, "Ignoring invalid RELAY_SIMULATED_ROBOTS"),
            }
        }
    }
}
