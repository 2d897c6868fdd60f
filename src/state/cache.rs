use crate::telemetry::{EntityState, TelemetryUpdate};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Recent error entries kept per entity
pub const DEFAULT_MAX_RECENT_ERRORS: usize = 10;

/// Outcome of one cache mutation
#[derive(Clone, Debug)]
pub struct AppliedUpdate {
    /// Entity state right after the update
    pub snapshot: EntityState,

    /// True when this message materialized the entity
    pub created: bool,

    /// Prior status, set only when the update changed it
    pub previous_status: Option<String>,
}

/// Latest-state-per-robot cache.
///
/// One mutex guards the whole map; entity counts are in the tens, so every
/// read and write takes it. Callers always get copies, never the live entry.
pub struct EntityStateCache {
    entities: Mutex<HashMap<String, EntityState>>,
    max_recent_errors: usize,
}

/// Clamp a reported battery level into 0..=100 (NaN reads as empty)
pub fn clamp_battery(level: f64) -> f64 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 100.0)
    }
}

impl EntityStateCache {
    pub fn new() -> Self {
        Self::with_error_capacity(DEFAULT_MAX_RECENT_ERRORS)
    }

    /// Create a cache keeping at most `max_recent_errors` (minimum 1) per entity
    pub fn with_error_capacity(max_recent_errors: usize) -> Self {
        Self {
            entities: Mutex::new(HashMap::new()),
            max_recent_errors: max_recent_errors.max(1),
        }
    }

    // Entries are replaced field by field and never left half-written, so a
    // poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, EntityState>> {
        self.entities.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get entity snapshot by ID
    pub fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.lock().get(entity_id).cloned()
    }

    /// Point-in-time copy of every entity
    pub fn get_all(&self) -> HashMap<String, EntityState> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Apply a partial telemetry update (core state mutation).
    ///
    /// Creates the entity if unseen. Only fields present in `update` are
    /// overwritten, pose components individually. `last_updated` becomes
    /// `now`, the time of application.
    pub fn apply_telemetry(
        &self,
        entity_id: &str,
        update: &TelemetryUpdate,
        now: DateTime<Utc>,
    ) -> AppliedUpdate {
        let mut entities = self.lock();

        let created = !entities.contains_key(entity_id);
        let state = entities
            .entry(entity_id.to_string())
            .or_insert_with(|| EntityState::new(entity_id, now));

        if let Some(mode) = &update.mode {
            state.mode.clone_from(mode);
        }

        let mut previous_status = None;
        if let Some(status) = &update.status {
            if *status != state.status {
                previous_status = Some(std::mem::replace(&mut state.status, status.clone()));
            }
        }

        if let Some(level) = update.battery {
            state.battery = clamp_battery(level);
        }

        if let Some(pose) = &update.pose {
            if let Some(x) = pose.x {
                state.pose.x = x;
            }
            if let Some(y) = pose.y {
                state.pose.y = y;
            }
            if let Some(theta) = pose.theta {
                state.pose.theta = theta;
            }
        }

        if let Some(gps) = update.gps {
            state.gps = Some(gps);
        }

        state.last_updated = now;

        AppliedUpdate {
            snapshot: state.clone(),
            created,
            previous_status,
        }
    }

    /// Append to the entity's recent errors, evicting the oldest past the cap
    pub fn append_error(
        &self,
        entity_id: &str,
        message: String,
        now: DateTime<Utc>,
    ) -> AppliedUpdate {
        let mut entities = self.lock();

        let created = !entities.contains_key(entity_id);
        let state = entities
            .entry(entity_id.to_string())
            .or_insert_with(|| EntityState::new(entity_id, now));

        state.recent_errors.push(message);
        if state.recent_errors.len() > self.max_recent_errors {
            let excess = state.recent_errors.len() - self.max_recent_errors;
            state.recent_errors.drain(..excess);
        }
        state.last_updated = now;

        AppliedUpdate {
            snapshot: state.clone(),
            created,
            previous_status: None,
        }
    }

    /// Empty the recent error list. Returns false for unknown entities.
    pub fn clear_errors(&self, entity_id: &str) -> bool {
        match self.lock().get_mut(entity_id) {
            Some(state) => {
                state.recent_errors.clear();
                true
            }
            None => false,
        }
    }
}

impl Default for EntityStateCache {
    fn default() -> Self {
        Self::new()
    }
}
