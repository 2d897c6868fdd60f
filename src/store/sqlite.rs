//! SQLite-backed sample store.
//!
//! Rows are keyed by entity and capture time (milliseconds since epoch) so the
//! per-entity history scan is a single index range read.

use super::{SampleStore, StorageError};
use crate::telemetry::{ErrorRecord, Pose, SampleKind, TelemetrySample};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::info;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS telemetry_samples (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_id      TEXT NOT NULL,
        captured_at_ms INTEGER NOT NULL,
        kind           TEXT NOT NULL,
        mode           TEXT,
        status         TEXT,
        battery        REAL,
        x              REAL,
        y              REAL,
        theta          REAL,
        raw_payload    TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_samples_entity_time
        ON telemetry_samples (entity_id, captured_at_ms);

    CREATE TABLE IF NOT EXISTS error_records (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_id      TEXT NOT NULL,
        captured_at_ms INTEGER NOT NULL,
        category       TEXT NOT NULL,
        message        TEXT NOT NULL,
        severity       TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_errors_entity_time
        ON error_records (entity_id, captured_at_ms);
";

pub struct SqliteSampleStore {
    conn: Mutex<Connection>,
}

impl SqliteSampleStore {
    /// Opens (or creates) the database file in WAL mode and ensures the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open sample store at {}", path.display()))?;

        let journal_mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .context("Failed to enable WAL journal mode")?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .context("Failed to set synchronous mode")?;

        info!(path = %path.display(), journal_mode = %journal_mode, "Sample store opened");
        Self::with_connection(conn)
    }

    /// Private in-memory database, gone when the store is dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set busy timeout")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create sample store schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::Decode(format!("timestamp out of range: {}", ms)))
}

struct SampleRow {
    entity_id: String,
    captured_at_ms: i64,
    kind: String,
    mode: Option<String>,
    status: Option<String>,
    battery: Option<f64>,
    x: Option<f64>,
    y: Option<f64>,
    theta: Option<f64>,
    raw_payload: String,
}

impl SampleRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entity_id: row.get(0)?,
            captured_at_ms: row.get(1)?,
            kind: row.get(2)?,
            mode: row.get(3)?,
            status: row.get(4)?,
            battery: row.get(5)?,
            x: row.get(6)?,
            y: row.get(7)?,
            theta: row.get(8)?,
            raw_payload: row.get(9)?,
        })
    }

    fn into_sample(self) -> Result<TelemetrySample, StorageError> {
        let kind = SampleKind::parse(&self.kind)
            .ok_or_else(|| StorageError::Decode(format!("unknown sample kind '{}'", self.kind)))?;

        let pose = match (self.x, self.y, self.theta) {
            (Some(x), Some(y), Some(theta)) => Some(Pose { x, y, theta }),
            _ => None,
        };

        Ok(TelemetrySample {
            entity_id: self.entity_id,
            captured_at: from_millis(self.captured_at_ms)?,
            kind,
            mode: self.mode,
            status: self.status,
            battery: self.battery,
            pose,
            raw_payload: self.raw_payload,
        })
    }
}

impl SampleStore for SqliteSampleStore {
    fn append(&self, sample: &TelemetrySample) -> Result<(), StorageError> {
        let pose = sample.pose.as_ref();
        self.conn().execute(
            "INSERT INTO telemetry_samples
                (entity_id, captured_at_ms, kind, mode, status, battery, x, y, theta, raw_payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                sample.entity_id,
                sample.captured_at.timestamp_millis(),
                sample.kind.as_str(),
                sample.mode,
                sample.status,
                sample.battery,
                pose.map(|p| p.x),
                pose.map(|p| p.y),
                pose.map(|p| p.theta),
                sample.raw_payload,
            ],
        )?;
        Ok(())
    }

    fn query(&self, entity_id: &str, limit: usize) -> Result<Vec<TelemetrySample>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT entity_id, captured_at_ms, kind, mode, status, battery, x, y, theta, raw_payload
             FROM telemetry_samples
             WHERE entity_id = ?1
             ORDER BY captured_at_ms DESC, id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![entity_id, limit as i64], SampleRow::from_row)?;

        let mut samples = Vec::new();
        for row in rows {
            samples.push(row?.into_sample()?);
        }
        Ok(samples)
    }

    fn append_error(&self, record: &ErrorRecord) -> Result<(), StorageError> {
        self.conn().execute(
            "INSERT INTO error_records (entity_id, captured_at_ms, category, message, severity)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.entity_id,
                record.captured_at.timestamp_millis(),
                record.category,
                record.message,
                record.severity,
            ],
        )?;
        Ok(())
    }

    fn query_errors(
        &self,
        entity_id: &str,
        limit: usize,
    ) -> Result<Vec<ErrorRecord>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT entity_id, captured_at_ms, category, message, severity
             FROM error_records
             WHERE entity_id = ?1
             ORDER BY captured_at_ms DESC, id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![entity_id, limit as i64], |row| {
            let entity_id: String = row.get(0)?;
            let captured_at_ms: i64 = row.get(1)?;
            let category: String = row.get(2)?;
            let message: String = row.get(3)?;
            let severity: String = row.get(4)?;
            Ok((entity_id, captured_at_ms, category, message, severity))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (entity_id, captured_at_ms, category, message, severity) = row?;
            records.push(ErrorRecord {
                entity_id,
                category,
                message,
                severity,
                captured_at: from_millis(captured_at_ms)?,
            });
        }
        Ok(records)
    }
}
