//! # Metrics
//!
//! Per-message usage metrics for seal and unseal calls, written to CSV off
//! the pipeline's return path.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        METRICS FLOW                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  seal()/unseal() ──► record() ──► Mutex<Vec<MetricRecord>>              │
//! │                                        │                                │
//! │                        every batch_size records (default 10)            │
//! │                                        │                                │
//! │                                        ▼                                │
//! │                          crossbeam channel (unbounded)                  │
//! │                                        │                                │
//! │                                        ▼                                │
//! │                     writer thread ──► MetricsSink::write_batch          │
//! │                                        (CSV append / memory)            │
//! │                                                                         │
//! │  flush(): hand over the partial batch and wait for the writer          │
//! │  shutdown(): flush, close the channel, join the writer                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writer errors are logged and dropped; metrics never fail a message.
//!
//! ## CSV Columns
//!
//! `timestamp, operation, username, message_size_chars, message_size_bytes,
//! elapsed_seconds, success, test_type, scenario`

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::MetricsConfig;
use crate::error::{Error, Result};

/// Pipeline operation a metric describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricOperation {
    /// A seal call
    Sign,
    /// An unseal call
    Verify,
}

/// One metrics row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// RFC 3339 time the record was taken
    pub timestamp: String,
    /// Operation kind
    pub operation: MetricOperation,
    /// Participant handle
    pub username: String,
    /// Message length in characters
    pub message_size_chars: usize,
    /// Message length in UTF-8 bytes
    pub message_size_bytes: usize,
    /// Wall time of the whole operation
    pub elapsed_seconds: f64,
    /// Whether the operation succeeded
    pub success: bool,
    /// Free-form run classification
    pub test_type: String,
    /// Free-form scenario label
    pub scenario: String,
}

impl MetricRecord {
    /// Build a record for `message`, stamped now
    pub fn new(
        operation: MetricOperation,
        username: &str,
        message: &str,
        elapsed: Duration,
        success: bool,
        config: &MetricsConfig,
    ) -> Self {
        Self {
            timestamp: crate::time::now_rfc3339(),
            operation,
            username: username.to_string(),
            message_size_chars: message.chars().count(),
            message_size_bytes: message.len(),
            elapsed_seconds: elapsed.as_secs_f64(),
            success,
            test_type: config.test_type.clone(),
            scenario: config.scenario.clone(),
        }
    }
}

// ============================================================================
// SINKS
// ============================================================================

/// Destination for batches of metric records
pub trait MetricsSink: Send + 'static {
    /// Persist a batch; called from the writer thread only
    fn write_batch(&mut self, records: &[MetricRecord]) -> Result<()>;
}

/// Appends records to a CSV file, writing the header once
pub struct CsvMetricsSink {
    path: PathBuf,
}

impl CsvMetricsSink {
    /// Sink appending to `path`; parent directories are created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for CsvMetricsSink {
    fn write_batch(&mut self, records: &[MetricRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::StorageWriteError(e.to_string()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::StorageWriteError(e.to_string()))?;
        let needs_header = file
            .metadata()
            .map(|m| m.len() == 0)
            .map_err(|e| Error::StorageWriteError(e.to_string()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        for record in records {
            writer.serialize(record)?;
        }
        writer
            .flush()
            .map_err(|e| Error::StorageWriteError(e.to_string()))?;
        Ok(())
    }
}

/// Keeps records in memory; clones share the same buffer
#[derive(Clone, Default)]
pub struct MemoryMetricsSink {
    records: Arc<Mutex<Vec<MetricRecord>>>,
}

impl MemoryMetricsSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far
    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().clone()
    }
}

impl MetricsSink for MemoryMetricsSink {
    fn write_batch(&mut self, records: &[MetricRecord]) -> Result<()> {
        self.records.lock().extend_from_slice(records);
        Ok(())
    }
}

// ============================================================================
// RECORDER
// ============================================================================

enum WriterMessage {
    Batch(Vec<MetricRecord>),
    Flush(Sender<()>),
}

/// Buffers metric records and hands full batches to a writer thread
pub struct MetricsRecorder {
    config: MetricsConfig,
    buffer: Mutex<Vec<MetricRecord>>,
    sender: Mutex<Option<Sender<WriterMessage>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsRecorder {
    /// Start a recorder writing to `sink`
    pub fn new<S: MetricsSink>(sink: S, config: MetricsConfig) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = std::thread::Builder::new()
            .name("sealchat-metrics".into())
            .spawn(move || run_writer(sink, rx))
            .map_err(|e| Error::Internal(format!("Failed to start metrics writer: {}", e)))?;

        Ok(Self {
            config,
            buffer: Mutex::new(Vec::new()),
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Start a recorder appending to the CSV file named in `config`
    ///
    /// Returns `None` when no path is configured.
    pub fn from_config(config: &MetricsConfig) -> Result<Option<Self>> {
        match &config.path {
            Some(path) => Ok(Some(Self::new(CsvMetricsSink::new(path), config.clone())?)),
            None => Ok(None),
        }
    }

    /// Recorder settings
    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Record one operation
    pub fn record(
        &self,
        operation: MetricOperation,
        username: &str,
        message: &str,
        elapsed: Duration,
        success: bool,
    ) {
        let record = MetricRecord::new(operation, username, message, elapsed, success, &self.config);
        self.push(record);
    }

    /// Record a prepared row
    pub fn push(&self, record: MetricRecord) {
        // Batches are sent with the buffer locked so they reach the writer
        // in the order they were filled.
        let mut buffer = self.buffer.lock();
        buffer.push(record);
        if buffer.len() >= self.config.batch_size.max(1) {
            let batch = std::mem::take(&mut *buffer);
            self.send(WriterMessage::Batch(batch));
        }
    }

    /// Records buffered but not yet handed to the writer
    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Hand over the partial batch and wait until the writer has written
    /// everything sent so far
    pub fn flush(&self) {
        {
            let mut buffer = self.buffer.lock();
            if !buffer.is_empty() {
                let batch = std::mem::take(&mut *buffer);
                self.send(WriterMessage::Batch(batch));
            }
        }

        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        let sent = self
            .sender
            .lock()
            .as_ref()
            .map(|tx| tx.send(WriterMessage::Flush(ack_tx)).is_ok())
            .unwrap_or(false);
        if sent {
            let _ = ack_rx.recv();
        }
    }

    /// Flush, stop the writer thread and wait for it to exit
    ///
    /// Records pushed after shutdown are dropped with a warning.
    pub fn shutdown(&self) {
        self.flush();
        self.sender.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("Metrics writer thread panicked");
            }
        }
    }

    fn send(&self, message: WriterMessage) -> bool {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => {
                tracing::warn!("Metrics recorder is shut down; dropping records");
                false
            }
        }
    }
}

impl Drop for MetricsRecorder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_writer<S: MetricsSink>(mut sink: S, rx: Receiver<WriterMessage>) {
    for message in rx {
        match message {
            WriterMessage::Batch(batch) => {
                if let Err(e) = sink.write_batch(&batch) {
                    tracing::warn!(error = %e, records = batch.len(), "Failed to write metrics batch");
                } else {
                    tracing::debug!(records = batch.len(), "Wrote metrics batch");
                }
            }
            WriterMessage::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
