// crates/server/src/liveattrs/usage.rs
//! Fire-and-forget recording of attribute usage.
//!
//! Queries push records into a bounded channel; one background task writes
//! them to the store. A full or closed channel drops the record.

use std::sync::Mutex;

use corpadm_db::Database;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub corpus_id: String,
    /// Dot notation.
    pub attrs: Vec<String>,
}

pub struct UsageRecorder {
    tx: Mutex<Option<mpsc::Sender<UsageRecord>>>,
}

impl UsageRecorder {
    /// A recorder and the receiving end its writer task consumes.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<UsageRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// A recorder whose records are written to `db` by a spawned task. The
    /// task ends once the recorder is closed and the channel drained.
    pub fn spawn(db: Database, capacity: usize) -> (Self, JoinHandle<()>) {
        let (recorder, rx) = Self::new(capacity);
        (recorder, tokio::spawn(run_writer(db, rx)))
    }

    /// Queue a record. Never blocks.
    pub fn record(&self, corpus_id: &str, attrs: Vec<String>) {
        if attrs.is_empty() {
            return;
        }
        let guard = match self.tx.lock() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!("Mutex poisoned on usage recorder: {e}");
                e.into_inner()
            }
        };
        let Some(tx) = guard.as_ref() else {
            tracing::debug!(corpus_id, "usage recorder closed, record dropped");
            return;
        };
        let record = UsageRecord {
            corpus_id: corpus_id.to_string(),
            attrs,
        };
        if let Err(e) = tx.try_send(record) {
            tracing::debug!(corpus_id, error = %e, "usage record dropped");
        }
    }

    /// Stop accepting records. Already queued records are still written.
    pub fn close(&self) {
        match self.tx.lock() {
            Ok(mut guard) => {
                guard.take();
            }
            Err(e) => {
                tracing::error!("Mutex poisoned on usage recorder: {e}");
                e.into_inner().take();
            }
        }
    }
}

pub async fn run_writer(db: Database, mut rx: mpsc::Receiver<UsageRecord>) {
    while let Some(record) = rx.recv().await {
        if let Err(e) = db.record_usage(&record.corpus_id, &record.attrs).await {
            tracing::warn!(corpus_id = %record.corpus_id, error = %e, "failed to save usage");
        }
    }
    tracing::debug!("usage writer stopped");
}
