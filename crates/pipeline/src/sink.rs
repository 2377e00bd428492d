//! Fire-and-forget persistence of risk points.
//!
//! The inference stage never waits on storage: [`SinkHandle::submit`] is a
//! non-blocking enqueue, and a single background task performs the writes.
//! Records that do not fit in the queue, or whose write fails or times out,
//! are dropped and counted.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use fusionguard_core::{AlertEvent, RiskPoint};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::counters::StageCounters;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode sink record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("sink write timed out after {0:?}")]
    Timeout(Duration),
}

/// One persisted unit: a risk point and the alerts derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkRecord {
    pub risk: RiskPoint,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<AlertEvent>,
}

#[async_trait]
pub trait RiskSink: Send + Sync {
    async fn write(&self, record: &SinkRecord) -> Result<(), SinkError>;

    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

// ── NullSink ────────────────────────────────────────────────────────

/// Accepts and discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl RiskSink for NullSink {
    async fn write(&self, _record: &SinkRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

// ── JsonlSink ───────────────────────────────────────────────────────

/// Appends one JSON object per line.
pub struct JsonlSink {
    path: PathBuf,
    writer: AsyncMutex<BufWriter<File>>,
}

impl JsonlSink {
    /// Open `path` for appending, creating it and its parent directories.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| SinkError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_err)?;
        info!(path = %path.display(), "opened risk sink");
        Ok(Self {
            path,
            writer: AsyncMutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RiskSink for JsonlSink {
    async fn write(&self, record: &SinkRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await.map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })?;
        // A line is only durable once it leaves the buffer.
        writer.flush().await.map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })
    }

    async fn flush(&self) -> Result<(), SinkError> {
        self.writer
            .lock()
            .await
            .flush()
            .await
            .map_err(|source| SinkError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

// ── SinkHandle ──────────────────────────────────────────────────────

/// Bounded queue in front of a [`RiskSink`], drained by one background task.
pub struct SinkHandle {
    tx: Mutex<Option<mpsc::Sender<SinkRecord>>>,
    worker: AsyncMutex<Option<JoinHandle<()>>>,
    counters: Arc<StageCounters>,
}

impl SinkHandle {
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        sink: Arc<dyn RiskSink>,
        capacity: usize,
        write_timeout: Duration,
        counters: Arc<StageCounters>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(Self::drain(sink, rx, write_timeout, counters.clone()));
        Self {
            tx: Mutex::new(Some(tx)),
            worker: AsyncMutex::new(Some(worker)),
            counters,
        }
    }

    /// Enqueue without waiting. Returns false if the record was dropped.
    pub fn submit(&self, record: SinkRecord) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            self.counters.record_sink_dropped();
            debug!(shot_id = %record.risk.shot_id, "sink closed, record dropped");
            return false;
        };
        match tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                self.counters.record_sink_dropped();
                warn!(shot_id = %record.risk.shot_id, "sink queue full, record dropped");
                false
            }
            Err(TrySendError::Closed(record)) => {
                self.counters.record_sink_dropped();
                warn!(shot_id = %record.risk.shot_id, "sink worker gone, record dropped");
                false
            }
        }
    }

    /// Stop accepting records and wait until every queued record is written.
    pub async fn close(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "sink worker ended abnormally");
            }
        }
    }

    async fn drain(
        sink: Arc<dyn RiskSink>,
        mut rx: mpsc::Receiver<SinkRecord>,
        write_timeout: Duration,
        counters: Arc<StageCounters>,
    ) {
        let mut written = 0u64;
        while let Some(record) = rx.recv().await {
            let outcome = match tokio::time::timeout(write_timeout, sink.write(&record)).await {
                Ok(result) => result,
                Err(_) => Err(SinkError::Timeout(write_timeout)),
            };
            match outcome {
                Ok(()) => written += 1,
                Err(e) => {
                    counters.record_sink_dropped();
                    warn!(shot_id = %record.risk.shot_id, error = %e, "risk sink write failed");
                }
            }
        }
        if let Err(e) = sink.flush().await {
            warn!(error = %e, "risk sink flush failed");
        }
        debug!(written, "risk sink drained");
    }
}
