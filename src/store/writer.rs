//! Background persistence worker.
//!
//! Ingest enqueues without waiting; a single task drains the queue and runs
//! each blocking store call on the blocking pool, in queue order.

use super::{SampleStore, StorageError};
use crate::state::MetricsTracker;
use crate::telemetry::{ErrorRecord, TelemetrySample};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

enum WriteCommand {
    Sample(TelemetrySample),
    Error(ErrorRecord),
    Flush(oneshot::Sender<()>),
}

/// Handle for queueing writes to the persistence worker
#[derive(Clone)]
pub struct StoreWriter {
    tx: mpsc::Sender<WriteCommand>,
    metrics: MetricsTracker,
}

impl StoreWriter {
    /// Spawn the worker task with a bounded queue of `capacity` writes
    pub fn spawn(
        store: Arc<dyn SampleStore>,
        capacity: usize,
        metrics: MetricsTracker,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_writer(store, rx, metrics.clone()));
        (Self { tx, metrics }, handle)
    }

    /// Queue a sample. Returns false if it was dropped.
    pub fn submit_sample(&self, sample: TelemetrySample) -> bool {
        let accepted = self.enqueue(WriteCommand::Sample(sample));
        if accepted {
            self.metrics.record_sample_queued();
        }
        accepted
    }

    /// Queue an error record. Returns false if it was dropped.
    pub fn submit_error(&self, record: ErrorRecord) -> bool {
        self.enqueue(WriteCommand::Error(record))
    }

    fn enqueue(&self, command: WriteCommand) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.record_persistence_dropped();
                warn!("Store writer queue full, dropping write");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.record_persistence_dropped();
                debug!("Store writer stopped, dropping write");
                false
            }
        }
    }

    /// Wait until every write queued before this call has been attempted.
    ///
    /// Returns false if the worker is gone.
    pub async fn flush(&self) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteCommand::Flush(done_tx)).await.is_err() {
            return false;
        }
        done_rx.await.is_ok()
    }
}

async fn run_writer(
    store: Arc<dyn SampleStore>,
    mut rx: mpsc::Receiver<WriteCommand>,
    metrics: MetricsTracker,
) {
    while let Some(command) = rx.recv().await {
        match command {
            WriteCommand::Sample(sample) => {
                let entity_id = sample.entity_id.clone();
                match run_blocking(&store, move |s| s.append(&sample)).await {
                    Ok(()) => metrics.record_sample_written(),
                    Err(e) => {
                        metrics.record_persistence_failure();
                        error!(entity_id = %entity_id, error = %e, "Failed to persist telemetry sample");
                    }
                }
            }
            WriteCommand::Error(record) => {
                let entity_id = record.entity_id.clone();
                match run_blocking(&store, move |s| s.append_error(&record)).await {
                    Ok(()) => metrics.record_error_written(),
                    Err(e) => {
                        metrics.record_persistence_failure();
                        error!(entity_id = %entity_id, error = %e, "Failed to persist error record");
                    }
                }
            }
            WriteCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    info!("Store writer stopped");
}

async fn run_blocking<F>(store: &Arc<dyn SampleStore>, write: F) -> Result<(), StorageError>
where
    F: FnOnce(&dyn SampleStore) -> Result<(), StorageError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || write(store.as_ref()))
        .await
        .map_err(|e| StorageError::Unavailable(format!("write task failed: {}", e)))?
}
