//! Durable sample and error history.
//!
//! The store itself is synchronous; [`StoreWriter`] keeps it off the ingest
//! path and [`WriteThrottle`] decides which samples reach it at all.

mod sqlite;
mod throttle;
mod writer;

pub use sqlite::SqliteSampleStore;
pub use throttle::{WriteThrottle, DEFAULT_MIN_WRITE_INTERVAL};
pub use writer::StoreWriter;

use crate::telemetry::{ErrorRecord, TelemetrySample};
use std::fmt;


/// Append-only history of telemetry samples and error records.
///
/// Queries return the most recent rows first, at most `limit` of them.
pub trait SampleStore: Send + Sync {
    fn append(&self, sample: &TelemetrySample) -> Result<(), StorageError>;

    fn query(&self, entity_id: &str, limit: usize) -> Result<Vec<TelemetrySample>, StorageError>;

    fn append_error(&self, record: &ErrorRecord) -> Result<(), StorageError>;

    fn query_errors(&self, entity_id: &str, limit: usize)
        -> Result<Vec<ErrorRecord>, StorageError>;
}

#[derive(Debug)]
pub enum StorageError {
    Database(rusqlite::Error),
    /// A stored row could not be turned back into a record
    Decode(String),
    Unavailable(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Database(e) => write!(f, "database error: {}", e),
            StorageError::Decode(msg) => write!(f, "corrupt row: {}", msg),
            StorageError::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(e)
    }
}
