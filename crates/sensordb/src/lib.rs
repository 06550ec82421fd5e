// Rust guideline compliant 2026-03-06

//! Storage consumer -- persists every buffered record through a
//! `MeasurementStore` port and signals pipeline degradation when the SQL
//! engine is unreachable or lost.
//!
//! Entry points: [`SensorDb::connect_with_retry`], [`SensorDb::run`].
//! Configuration via [`SensorDbConfig::builder`].

use domain::{
    BufferError, ConsumerTag, EventLog, MeasurementStore, PipelineFlags, RecordSource, StoreError,
};
use std::future::Future;
use std::time::Duration;

// ---------------------------------------------------------------------------
// SensorDbError
// ---------------------------------------------------------------------------

/// Errors that can occur while connecting or running the storage stage.
#[derive(Debug, thiserror::Error)]
pub enum SensorDbError {
    /// The supplied configuration is invalid.
    #[error("invalid storage configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// Every connection attempt failed; the pipeline has been degraded.
    #[error("unable to connect to SQL server after {attempts} attempt(s)")]
    Unreachable {
        /// Number of attempts made.
        attempts: u32,
    },
    /// An insert failed after a successful connection.
    #[error("connection to SQL server lost: {0}")]
    ConnectionLost(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// SensorDbConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`SensorDb`].
///
/// Construct via [`SensorDbConfig::builder`].
#[derive(Debug)]
pub struct SensorDbConfig {
    /// Maximum connection attempts before degrading the pipeline.
    pub max_attempts: u32,
    /// Pause between failed connection attempts.
    pub retry_delay: Duration,
}

/// Builder for [`SensorDbConfig`].
///
/// Obtain via [`SensorDbConfig::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct SensorDbConfigBuilder {
    max_attempts: u32,
    retry_delay: Duration,
}

impl SensorDbConfig {
    /// Create a builder.
    ///
    /// Default values: `max_attempts = 3`, `retry_delay = 2 s`.
    #[must_use]
    pub fn builder() -> SensorDbConfigBuilder {
        SensorDbConfigBuilder { max_attempts: 3, retry_delay: Duration::from_secs(2) }
    }
}

impl SensorDbConfigBuilder {
    /// Override the maximum number of connection attempts.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Override the pause between failed attempts.
    #[must_use]
    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SensorDbError::InvalidConfig`] when `max_attempts` is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<SensorDbConfig, SensorDbError> {
        if self.max_attempts == 0 {
            return Err(SensorDbError::InvalidConfig {
                reason: "max_attempts must be >= 1".to_owned(),
            });
        }
        Ok(SensorDbConfig { max_attempts: self.max_attempts, retry_delay: self.retry_delay })
    }
}

// ---------------------------------------------------------------------------
// SensorDb
// ---------------------------------------------------------------------------

/// Removes records from the buffer under the `Storage` tag and persists each
/// one through a `MeasurementStore` port.
///
/// Generic over the source, store, and log ports for zero-cost static
/// dispatch; the concrete SQL adapter lives in the binary crate.
#[derive(Debug)]
pub struct SensorDb {
    config: SensorDbConfig,
}

impl SensorDb {
    /// Create a new storage stage from `config`.
    #[must_use]
    pub fn new(config: SensorDbConfig) -> Self {
        Self { config }
    }

    /// Acquire a store, retrying up to `max_attempts` times with
    /// `retry_delay` pauses.
    ///
    /// Success publishes `"Connection to SQL server established."`.
    /// Exhaustion sets `storage_degraded`, publishes
    /// `"Unable to connect to SQL server."`, and returns
    /// [`SensorDbError::Unreachable`]; the buffer then refuses further
    /// operations and the pipeline drains to shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`SensorDbError::Unreachable`] when every attempt fails.
    pub async fn connect_with_retry<S, F, Fut, L>(
        &self,
        connect: F,
        log: &L,
        flags: &PipelineFlags,
    ) -> Result<S, SensorDbError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<S, StoreError>> + Send,
        L: EventLog + Sync,
    {
        for attempt in 1..=self.config.max_attempts {
            match connect().await {
                Ok(store) => {
                    log::info!("sensordb.connect.ok: attempt={attempt}");
                    log.publish("Connection to SQL server established.\n".to_owned()).await;
                    return Ok(store);
                }
                Err(e) => {
                    log::warn!("sensordb.connect.failed: attempt={attempt} error={e}");
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }
        flags.set_storage_degraded();
        log.publish("Unable to connect to SQL server.\n".to_owned()).await;
        Err(SensorDbError::Unreachable { attempts: self.config.max_attempts })
    }

    /// Run the persistence loop until the buffer drains or storage fails.
    ///
    /// Every removed record becomes one `store` call. A store failure is
    /// treated as a lost connection: `storage_degraded` is set,
    /// `"Connection to SQL server lost."` is published, and the error is
    /// returned. A normal drain (`Closed`) publishes the same lifecycle
    /// message for the disconnect and returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`SensorDbError::ConnectionLost`] when an insert fails.
    pub async fn run<S, M, L>(
        &self,
        source: &S,
        store: &M,
        log: &L,
        flags: &PipelineFlags,
    ) -> Result<(), SensorDbError>
    where
        S: RecordSource + Sync,
        M: MeasurementStore + Sync,
        L: EventLog + Sync,
    {
        let mut count = 0u64;
        loop {
            match source.remove(ConsumerTag::Storage).await {
                Ok(Some(record)) => {
                    if let Err(e) = store.store(&record).await {
                        flags.set_storage_degraded();
                        log::error!(
                            "sensordb.insert.failed: sensor_id={} error={e}",
                            record.sensor_id
                        );
                        log.publish("Connection to SQL server lost.\n".to_owned()).await;
                        return Err(SensorDbError::ConnectionLost(e));
                    }
                    count += 1;
                    log::debug!("sensordb.record.stored: sensor_id={}", record.sensor_id);
                }
                Ok(None) => tokio::task::yield_now().await,
                Err(BufferError::Closed) => {
                    log::info!("sensordb.run.stopped: buffer drained after {count} record(s)");
                    log.publish("Connection to SQL server lost.\n".to_owned()).await;
                    return Ok(());
                }
                Err(BufferError::Degraded) => {
                    log::info!("sensordb.run.stopped: pipeline degraded after {count} record(s)");
                    return Ok(());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
