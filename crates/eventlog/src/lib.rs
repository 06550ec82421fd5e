// Rust guideline compliant 2026-03-05

//! Gateway event log: a serialized channel feeding a dedicated file sink.
//!
//! [`channel`] returns a cloneable [`LogChannel`] write endpoint (the
//! `domain::EventLog` port) and a [`LogSink`] that appends numbered,
//! timestamped lines to the log file. The sink terminates on the
//! [`TERMINATE`] sentinel or when every channel handle has been dropped.
//!
//! The sink runs as its own task so that file I/O stays off the pipeline's
//! critical path; once the sink is gone, publishes are dropped on the floor.

use domain::EventLog;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt as _;
use tokio::sync::mpsc;

/// Literal message that stops the sink. Published by the orchestrator after
/// all pipeline tasks have been joined.
pub const TERMINATE: &str = "TERMINATE";

/// Errors that can occur while running the log sink.
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    /// The log file could not be opened for appending.
    #[error("failed to open log file {path}: {source}")]
    Open {
        /// Path of the log file that failed to open.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// An append or flush on the log file failed.
    #[error("failed to append to log file: {0}")]
    Write(#[from] std::io::Error),
}

/// Create a log channel/sink pair writing to `path`.
///
/// `capacity` bounds the in-flight message queue; publishers wait (briefly)
/// when the sink falls behind, which keeps a single publish no more costly
/// than one message hand-off.
#[must_use]
pub fn channel(path: impl Into<PathBuf>, capacity: usize) -> (LogChannel, LogSink) {
    let (tx, rx) = mpsc::channel(capacity);
    (LogChannel { tx }, LogSink { rx, path: path.into() })
}

// ---------------------------------------------------------------------------
// LogChannel
// ---------------------------------------------------------------------------

/// Cloneable write endpoint of the gateway log.
///
/// Messages are serialized by the channel; each publish is delivered whole or
/// not at all.
#[derive(Debug, Clone)]
pub struct LogChannel {
    tx: mpsc::Sender<String>,
}

impl EventLog for LogChannel {
    async fn publish(&self, message: String) {
        if self.tx.send(message).await.is_err() {
            // Sink terminated; dropping the message is the documented policy.
            log::debug!("eventlog.publish.dropped: sink gone");
        }
    }
}

// ---------------------------------------------------------------------------
// LogSink
// ---------------------------------------------------------------------------

/// Consumes the log channel and appends `No.<seq> <epoch> <message>` lines.
#[derive(Debug)]
pub struct LogSink {
    rx: mpsc::Receiver<String>,
    path: PathBuf,
}

impl LogSink {
    /// Run the sink until [`TERMINATE`] is read or all senders are dropped.
    ///
    /// Each message is assigned the next sequence number, prefixed with the
    /// current epoch seconds, and flushed before the next message is read.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Open`] when the log file cannot be opened,
    /// or [`EventLogError::Write`] when an append fails. In either case the
    /// channel ends with the sink; publishers keep running and their
    /// messages are silently discarded.
    pub async fn run(mut self) -> Result<(), EventLogError> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await
            .map_err(|source| EventLogError::Open { path: self.path.clone(), source })?;

        let mut seq = 0u64;
        while let Some(message) = self.rx.recv().await {
            if message == TERMINATE {
                log::info!("eventlog.sink.terminated: lines={seq}");
                break;
            }
            seq += 1;
            // Callers include the trailing newline by convention; normalize so
            // the file gets exactly one per entry.
            let line = format!("No.{seq} {} {}\n", epoch_seconds(), message.trim_end());
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
        }
        Ok(())
    }
}

/// Wall-clock seconds since the Unix epoch.
fn epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
