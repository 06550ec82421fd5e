// Rust guideline compliant 2026-03-07

//! Build-time gateway configuration.
//!
//! Compiled-in constants; only the listening port comes from the command
//! line and only the sensor map path may be overridden by the environment.

use std::time::Duration;

/// Idle bound for peers and for the listener's no-activity shutdown.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Connection attempts against the SQL engine before degrading.
pub const MAX_ATTEMPT: u32 = 3;

/// Pause between failed SQL connection attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Running averages below this raise a "too cold" alert.
pub const SET_MIN_TEMP: f64 = 10.0;

/// Running averages above this raise a "too hot" alert.
pub const SET_MAX_TEMP: f64 = 20.0;

/// SQLite database, created next to the working directory on first run.
pub const DB_URL: &str = "sqlite:Sensor.db";

/// Measurement table inside [`DB_URL`].
pub const TABLE_NAME: &str = "SensorData";

/// Rows left by a previous run are cleared at startup.
pub const CLEAR_EXISTING_DATA: bool = true;

/// Append-only gateway event log.
pub const LOG_FILE: &str = "gateway.log";

/// Default sensor-to-room map; override with the [`SENSOR_MAP_ENV`] variable.
pub const SENSOR_MAP_FILE: &str = "room_sensor.map";

/// Environment variable naming an alternative sensor map path.
pub const SENSOR_MAP_ENV: &str = "SENSOR_MAP";

/// Bound on in-flight event-log messages.
pub const LOG_CHANNEL_CAPACITY: usize = 64;
