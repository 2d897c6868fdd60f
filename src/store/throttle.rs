use crate::telemetry::SampleKind;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;

/// Default minimum spacing between persisted samples of one kind
pub const DEFAULT_MIN_WRITE_INTERVAL: Duration = Duration::from_secs(5);

/// Per-(entity, kind) minimum-interval gate for sample writes.
///
/// The map grows with the number of entities, which are never deleted.
pub struct WriteThrottle {
    min_interval: Duration,
    last_write: DashMap<(String, SampleKind), DateTime<Utc>>,
}

impl WriteThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_write: DashMap::new(),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Claim a write slot at `now`.
    ///
    /// Returns true (and records `now`) when no write of this kind happened
    /// for the entity within the interval. A `now` earlier than the last
    /// recorded write never passes.
    pub fn try_acquire(&self, entity_id: &str, kind: SampleKind, now: DateTime<Utc>) -> bool {
        self.acquire_with(entity_id, kind, now, || true).unwrap_or(false)
    }

    /// Run `write` if the slot is free at `now`.
    ///
    /// Returns None when throttled, otherwise what `write` returned. The slot
    /// is recorded only when `write` succeeds, so a dropped write leaves it
    /// open for the next sample.
    pub fn acquire_with<F>(
        &self,
        entity_id: &str,
        kind: SampleKind,
        now: DateTime<Utc>,
        write: F,
    ) -> Option<bool>
    where
        F: FnOnce() -> bool,
    {
        match self.last_write.entry((entity_id.to_string(), kind)) {
            Entry::Vacant(slot) => {
                let written = write();
                if written {
                    slot.insert(now);
                }
                Some(written)
            }
            Entry::Occupied(mut slot) => match (now - *slot.get()).to_std() {
                Ok(elapsed) if elapsed >= self.min_interval => {
                    let written = write();
                    if written {
                        slot.insert(now);
                    }
                    Some(written)
                }
                _ => None,
            },
        }
    }
}

impl Default for WriteThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_WRITE_INTERVAL)
    }
}
