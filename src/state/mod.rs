// Entity state cache and relay metrics

mod cache;
pub mod metrics;
mod metrics_reporter;

pub use cache::{clamp_battery, AppliedUpdate, EntityStateCache, DEFAULT_MAX_RECENT_ERRORS};
pub use metrics::{MetricsSnapshot, MetricsTracker};
pub use metrics_reporter::run_metrics_reporter;

#[cfg(test)]
mod tests;
