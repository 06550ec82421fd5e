// Rust guideline compliant 2026-03-04

//! Shared domain types for the sensor-telemetry gateway.
//!
//! Defines [`SensorRecord`], the pipeline error enums, [`PipelineFlags`], and
//! the hexagonal ports ([`RecordSink`], [`RecordSource`], [`MeasurementStore`],
//! [`EventLog`]). All pipeline components depend on this crate; no other
//! workspace crate is imported here.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

/// Sensor identifier as carried on the wire.
pub type SensorId = u16;

/// A single measurement produced by a sensor node.
///
/// Copied by value through the pipeline; the buffer hands each consumer its
/// own copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorRecord {
    /// Wire identifier of the reporting sensor node.
    pub sensor_id: SensorId,
    /// Measured value (degrees Celsius for temperature sensors).
    pub value: f64,
    /// Measurement time, seconds since the Unix epoch.
    pub timestamp: i64,
}

/// Selects which consumer's seen-flag a buffer `remove` updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerTag {
    /// The running-average / alerting consumer.
    Analytics,
    /// The SQL persistence consumer.
    Storage,
}

/// Errors that a buffer port implementation may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// The producer is done and the buffer has drained; no data will follow.
    #[error("buffer closed")]
    Closed,
    /// Storage has degraded; the buffer refuses all further operations.
    #[error("pipeline degraded")]
    Degraded,
}

/// Errors from a measurement store adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The storage engine rejected the operation or is unreachable.
    #[error("storage engine unavailable")]
    Unavailable,
}

// ---------------------------------------------------------------------------
// PipelineFlags
// ---------------------------------------------------------------------------

/// Process-wide pipeline lifecycle flags, passed as explicit `Arc` context to
/// every task.
///
/// `producer_done` is set exactly once, after the connection manager has
/// released its listener and peers. `storage_degraded` is set by the storage
/// path when the SQL engine is unreachable or lost; the shared buffer
/// consults it to refuse further operations, which drains the pipeline into
/// shutdown.
#[derive(Debug, Default)]
pub struct PipelineFlags {
    producer_done: AtomicBool,
    storage_degraded: AtomicBool,
}

impl PipelineFlags {
    /// Create both flags unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the producer side finished. Idempotent.
    pub fn set_producer_done(&self) {
        self.producer_done.store(true, Ordering::Release);
    }

    /// `true` once the connection manager has stopped accepting and reading.
    #[must_use]
    pub fn producer_done(&self) -> bool {
        self.producer_done.load(Ordering::Acquire)
    }

    /// Mark storage as persistently unavailable. Idempotent.
    pub fn set_storage_degraded(&self) {
        self.storage_degraded.store(true, Ordering::Release);
    }

    /// `true` once storage has given up; the buffer then fails all operations.
    #[must_use]
    pub fn storage_degraded(&self) -> bool {
        self.storage_degraded.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Hexagonal port: the producer-side write endpoint of the shared buffer.
///
/// Implementations live outside the component crates (in the binary crate).
/// The connection manager depends exclusively on this trait.
///
/// Methods return `impl Future + Send` rather than being plain `async fn`s:
/// peer handlers are spawned onto the runtime, so the composed futures must
/// be provably `Send`.
pub trait RecordSink {
    /// Append one record to the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Degraded`] when storage has degraded, or
    /// [`BufferError::Closed`] after the producer side has been closed.
    fn insert(&self, record: SensorRecord) -> impl Future<Output = Result<(), BufferError>> + Send;
}

/// Hexagonal port: the consumer-side read endpoint of the shared buffer.
///
/// `remove` is non-blocking; consumers poll it and briefly yield on empty.
pub trait RecordSource {
    /// Observe the head record on behalf of `tag`.
    ///
    /// Returns `Ok(None)` when the buffer is empty or when this consumer has
    /// already observed the current head (it must wait for the other consumer
    /// to advance, never re-observe).
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Closed`] once the producer is done and the
    /// buffer has drained, or [`BufferError::Degraded`] when storage has
    /// degraded.
    fn remove(
        &self,
        tag: ConsumerTag,
    ) -> impl Future<Output = Result<Option<SensorRecord>, BufferError>> + Send;

    /// `true` when no record is buffered.
    fn is_empty(&self) -> bool;
}

/// Hexagonal port: durable persistence of a single measurement.
pub trait MeasurementStore {
    /// Persist one record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the engine rejects the insert
    /// or the connection is lost.
    fn store(&self, record: &SensorRecord) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Hexagonal port: the gateway's lifecycle/alert log channel.
///
/// Publication is fire-and-forget: once the sink has terminated, messages are
/// dropped on the floor rather than surfaced as errors.
pub trait EventLog {
    /// Publish one log message.
    fn publish(&self, message: String) -> impl Future<Output = ()> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{BufferError, ConsumerTag, EventLog, PipelineFlags, RecordSink, SensorRecord};
    use std::sync::Mutex;

    #[test]
    fn record_fields() {
        let record = SensorRecord { sensor_id: 7, value: 21.5_f64, timestamp: 1_700_000_000 };
        assert_eq!(record.sensor_id, 7);
        assert_eq!(record.value, 21.5_f64);
        assert_eq!(record.timestamp, 1_700_000_000);
        // Copy semantics: both handles see the same value.
        let copy = record;
        assert_eq!(copy, record);
    }

    #[test]
    fn buffer_error_variants() {
        assert_ne!(BufferError::Closed, BufferError::Degraded);
        assert_eq!(BufferError::Closed.to_string(), "buffer closed");
        assert_eq!(BufferError::Degraded.to_string(), "pipeline degraded");
    }

    #[test]
    fn consumer_tags_are_distinct() {
        assert_ne!(ConsumerTag::Analytics, ConsumerTag::Storage);
    }

    #[test]
    fn flags_start_unset_and_latch() {
        let flags = PipelineFlags::new();
        assert!(!flags.producer_done());
        assert!(!flags.storage_degraded());

        flags.set_producer_done();
        flags.set_producer_done(); // idempotent
        assert!(flags.producer_done());
        assert!(!flags.storage_degraded());

        flags.set_storage_degraded();
        assert!(flags.storage_degraded());
    }

    /// Verify that a minimal `RecordSink` implementation receives records.
    #[tokio::test]
    async fn record_sink_impl() {
        struct TestSink {
            inner: Mutex<Vec<SensorRecord>>,
        }

        impl RecordSink for TestSink {
            async fn insert(&self, record: SensorRecord) -> Result<(), BufferError> {
                self.inner.lock().unwrap().push(record);
                Ok(())
            }
        }

        let sink = TestSink { inner: Mutex::new(vec![]) };
        let record = SensorRecord { sensor_id: 1, value: 20.0_f64, timestamp: 0 };
        sink.insert(record).await.unwrap();
        assert_eq!(sink.inner.lock().unwrap().as_slice(), &[record]);
    }

    /// Verify that a minimal `EventLog` implementation captures messages.
    #[tokio::test]
    async fn event_log_impl() {
        struct TestLog {
            lines: Mutex<Vec<String>>,
        }

        impl EventLog for TestLog {
            async fn publish(&self, message: String) {
                self.lines.lock().unwrap().push(message);
            }
        }

        let log = TestLog { lines: Mutex::new(vec![]) };
        log.publish("new sensor node 1 is open".to_owned()).await;
        assert_eq!(log.lines.lock().unwrap().len(), 1);
    }
}
