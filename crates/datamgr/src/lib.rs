// Rust guideline compliant 2026-03-06

//! Analytics consumer -- maintains a running average per sensor and raises
//! temperature alerts against a static sensor-to-room map.
//!
//! Entry points: [`Datamgr::from_map_file`], [`Datamgr::run`]. Configuration
//! via [`DatamgrConfig::builder`].

use domain::{BufferError, ConsumerTag, EventLog, RecordSource, SensorId, SensorRecord};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Number of samples in the running-average window. Build-time constant.
pub const RUN_AVG_LENGTH: usize = 5;

/// Measured values at or beyond these bounds are rejected as sensor errors.
const VALUE_MIN: f64 = -50.0;
const VALUE_MAX: f64 = 100.0;

// ---------------------------------------------------------------------------
// DatamgrError
// ---------------------------------------------------------------------------

/// Errors that can occur while building or running the analytics stage.
#[derive(Debug, thiserror::Error)]
pub enum DatamgrError {
    /// The supplied configuration is invalid.
    #[error("invalid analytics configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// The sensor map file could not be opened or read.
    #[error("failed to read sensor map {path}: {source}")]
    Map {
        /// Path of the map file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// A sensor map line is not two whitespace-separated decimal integers.
    #[error("malformed sensor map line {line}: {text:?}")]
    MapFormat {
        /// 1-based line number.
        line: usize,
        /// The offending line.
        text: String,
    },
}

// ---------------------------------------------------------------------------
// DatamgrConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`Datamgr`].
///
/// Construct via [`DatamgrConfig::builder`].
#[derive(Debug)]
pub struct DatamgrConfig {
    /// Running averages below this raise a "too cold" alert.
    pub min_temp: f64,
    /// Running averages above this raise a "too hot" alert.
    pub max_temp: f64,
}

/// Builder for [`DatamgrConfig`].
///
/// Obtain via [`DatamgrConfig::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct DatamgrConfigBuilder {
    min_temp: f64,
    max_temp: f64,
}

impl DatamgrConfig {
    /// Create a builder from the two alert thresholds.
    #[must_use]
    pub fn builder(min_temp: f64, max_temp: f64) -> DatamgrConfigBuilder {
        DatamgrConfigBuilder { min_temp, max_temp }
    }
}

impl DatamgrConfigBuilder {
    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DatamgrError::InvalidConfig`] when `min_temp >= max_temp`.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<DatamgrConfig, DatamgrError> {
        if self.min_temp >= self.max_temp {
            return Err(DatamgrError::InvalidConfig {
                reason: "min_temp must be below max_temp".to_owned(),
            });
        }
        Ok(DatamgrConfig { min_temp: self.min_temp, max_temp: self.max_temp })
    }
}

// ---------------------------------------------------------------------------
// SensorState
// ---------------------------------------------------------------------------

/// Per-sensor analytics state. Created at map load; the window and average
/// are the only runtime-mutable parts.
#[derive(Debug, Clone)]
pub struct SensorState {
    /// Wire identifier of the sensor node.
    pub sensor_id: SensorId,
    /// Room the sensor is installed in, from the map file.
    pub room_id: u16,
    /// Last accepted measurements, oldest first. Zero-filled until warm.
    window: [f64; RUN_AVG_LENGTH],
    /// Mean of the window (zeros included until the window is full).
    pub running_avg: f64,
    /// Timestamp of the last accepted measurement.
    pub last_timestamp: i64,
}

impl SensorState {
    fn new(sensor_id: SensorId, room_id: u16) -> Self {
        Self {
            sensor_id,
            room_id,
            window: [0.0; RUN_AVG_LENGTH],
            running_avg: 0.0,
            last_timestamp: 0,
        }
    }

    /// Accept one measurement: shift the window left, append, recompute.
    fn accept(&mut self, record: &SensorRecord) {
        self.last_timestamp = record.timestamp;
        for i in 1..RUN_AVG_LENGTH {
            self.window[i - 1] = self.window[i];
        }
        self.window[RUN_AVG_LENGTH - 1] = record.value;
        #[expect(clippy::cast_precision_loss, reason = "window length is tiny")]
        let len = RUN_AVG_LENGTH as f64;
        self.running_avg = self.window.iter().sum::<f64>() / len;
    }

    /// The window has seen `RUN_AVG_LENGTH` measurements once the oldest slot
    /// is populated.
    fn is_warm(&self) -> bool {
        self.window[0] != 0.0
    }
}

// ---------------------------------------------------------------------------
// Datamgr
// ---------------------------------------------------------------------------

/// Removes records from the buffer under the `Analytics` tag, updates the
/// per-sensor running averages, and publishes temperature alerts.
#[derive(Debug)]
pub struct Datamgr {
    config: DatamgrConfig,
    sensors: HashMap<SensorId, SensorState>,
}

impl Datamgr {
    /// Build the analytics stage from a sensor map file.
    ///
    /// # Errors
    ///
    /// Returns [`DatamgrError::Map`] when the file cannot be opened, or any
    /// error from [`from_map_reader`](Self::from_map_reader).
    pub fn from_map_file(config: DatamgrConfig, path: &Path) -> Result<Self, DatamgrError> {
        let file = std::fs::File::open(path)
            .map_err(|source| DatamgrError::Map { path: path.to_path_buf(), source })?;
        Self::from_map_reader(config, std::io::BufReader::new(file))
    }

    /// Build the analytics stage from sensor map text: one
    /// `<room_id> <sensor_id>` pair of decimal integers per line.
    ///
    /// # Errors
    ///
    /// Returns [`DatamgrError::MapFormat`] for any malformed line, or
    /// [`DatamgrError::Map`] when reading fails.
    pub fn from_map_reader(
        config: DatamgrConfig,
        reader: impl BufRead,
    ) -> Result<Self, DatamgrError> {
        let mut sensors = HashMap::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| DatamgrError::Map {
                path: PathBuf::from("<reader>"),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let parsed = match (fields.next(), fields.next(), fields.next()) {
                (Some(room), Some(sensor), None) => {
                    room.parse::<u16>().ok().zip(sensor.parse::<SensorId>().ok())
                }
                _ => None,
            };
            let Some((room_id, sensor_id)) = parsed else {
                return Err(DatamgrError::MapFormat { line: index + 1, text: line });
            };
            sensors.insert(sensor_id, SensorState::new(sensor_id, room_id));
        }
        log::info!("datamgr.map.loaded: sensors={}", sensors.len());
        Ok(Self { config, sensors })
    }

    /// Look up the state of one sensor.
    #[must_use]
    pub fn sensor(&self, sensor_id: SensorId) -> Option<&SensorState> {
        self.sensors.get(&sensor_id)
    }

    /// Handle one record: validate, update the window, maybe alert.
    ///
    /// Unknown sensors and out-of-range values are logged and skipped; they
    /// never touch the window. Alerts fire only once the window is warm, and
    /// at most one of the two alerts fires per record.
    pub async fn process<L: EventLog>(&mut self, record: SensorRecord, log: &L) {
        let Some(state) = self.sensors.get_mut(&record.sensor_id) else {
            log::warn!("datamgr.unknown_sensor: sensor_id={}", record.sensor_id);
            log.publish(format!("no such sensor id {}\n", record.sensor_id)).await;
            return;
        };
        if record.value <= VALUE_MIN || record.value >= VALUE_MAX {
            log::warn!(
                "datamgr.invalid_value: sensor_id={} value={}",
                record.sensor_id,
                record.value
            );
            log.publish(format!(
                "sensor node {} temperature measurement {} has an error\n",
                record.sensor_id, record.value
            ))
            .await;
            return;
        }

        state.accept(&record);
        log::debug!(
            "datamgr.window.updated: sensor_id={} room_id={} running_avg={}",
            state.sensor_id,
            state.room_id,
            state.running_avg
        );

        if state.is_warm() {
            if state.running_avg < self.config.min_temp {
                log.publish(format!(
                    "sensor node {} reports it's too cold (running avg temperature = {})\n",
                    state.sensor_id, state.running_avg
                ))
                .await;
            } else if state.running_avg > self.config.max_temp {
                log.publish(format!(
                    "sensor node {} reports it's too hot (running avg temperature = {})\n",
                    state.sensor_id, state.running_avg
                ))
                .await;
            }
        }
    }

    /// Run the analytics loop until the buffer drains or degrades.
    ///
    /// Polls `remove` under the `Analytics` tag, yielding briefly on empty.
    /// Exits cleanly when the producer is done and the buffer is drained
    /// (`Closed`), or immediately when storage degrades.
    pub async fn run<S, L>(&mut self, source: &S, log: &L) -> Result<(), DatamgrError>
    where
        S: RecordSource + Sync,
        L: EventLog + Sync,
    {
        let mut count = 0u64;
        loop {
            match source.remove(ConsumerTag::Analytics).await {
                Ok(Some(record)) => {
                    count += 1;
                    self.process(record, log).await;
                }
                Ok(None) => tokio::task::yield_now().await,
                Err(BufferError::Closed) => {
                    log::info!("datamgr.run.stopped: buffer drained after {count} record(s)");
                    return Ok(());
                }
                Err(BufferError::Degraded) => {
                    log::info!("datamgr.run.stopped: pipeline degraded after {count} record(s)");
                    return Ok(());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
