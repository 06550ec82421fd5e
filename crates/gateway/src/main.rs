// Rust guideline compliant 2026-03-07

//! Sensor-telemetry gateway entry point.
//!
//! Wires the connection manager, analytics, and storage stages around the
//! shared buffer, with lifecycle events flowing through the event-log sink.
//!
//! # Usage
//!
//! ```text
//! # Listen for sensor nodes on port 5678
//! RUST_LOG=info cargo run --bin gateway -- 5678
//!
//! # Also show per-record debug output
//! RUST_LOG=debug cargo run --bin gateway -- 5678
//! ```
//!
//! The event log is appended to `gateway.log`; measurements land in
//! `Sensor.db`. The sensor map is read from `room_sensor.map` unless the
//! `SENSOR_MAP` environment variable names another path.

mod adapters;
mod config;

use adapters::shared_buffer::SharedBuffer;
use adapters::sqlite_store::SqliteStore;
use anyhow::Context as _;
use clap::Parser;
use connmgr::{Connmgr, ConnmgrConfig};
use datamgr::{Datamgr, DatamgrConfig};
use domain::{EventLog as _, PipelineFlags, StoreError};
use sensordb::{SensorDb, SensorDbConfig};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::Instrument as _;

/// Sensor-telemetry gateway: accepts sensor-node TCP connections and fans
/// every record out to analytics and SQL storage.
#[derive(Debug, Parser)]
#[command(name = "gateway")]
struct Args {
    /// TCP port to listen on for sensor nodes.
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize the tracing subscriber before any async work.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let flags = Arc::new(PipelineFlags::new());

    // The sink owns the log file; everything else holds cheap channel clones.
    let (log, sink) = eventlog::channel(config::LOG_FILE, config::LOG_CHANNEL_CAPACITY);
    let sink_task = tokio::spawn(sink.run());

    let listener = match TcpListener::bind(("0.0.0.0", args.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            log.publish("No such server port defined.\n".to_owned()).await;
            log.publish(eventlog::TERMINATE.to_owned()).await;
            let _ = sink_task.await;
            return Err(e).context(format!("failed to bind TCP port {}", args.port));
        }
    };

    let buffer = Arc::new(SharedBuffer::new(Arc::clone(&flags)));

    let map_path = std::env::var(config::SENSOR_MAP_ENV)
        .unwrap_or_else(|_| config::SENSOR_MAP_FILE.to_owned());
    let datamgr_config = DatamgrConfig::builder(config::SET_MIN_TEMP, config::SET_MAX_TEMP)
        .build()
        .context("failed to build analytics config")?;
    let mut datamgr = Datamgr::from_map_file(datamgr_config, Path::new(&map_path))
        .context("failed to load sensor map")?;

    let connmgr = Connmgr::new(
        ConnmgrConfig::builder()
            .idle_timeout(config::TIMEOUT)
            .build()
            .context("failed to build connection manager config")?,
    );
    let sensordb = SensorDb::new(
        SensorDbConfig::builder()
            .max_attempts(config::MAX_ATTEMPT)
            .retry_delay(config::RETRY_DELAY)
            .build()
            .context("failed to build storage config")?,
    );

    // -- Producer: runs until idle shutdown or CTRL+C, then marks done --
    let producer = {
        let buffer = Arc::clone(&buffer);
        let flags = Arc::clone(&flags);
        let log = log.clone();
        async move {
            let result = connmgr
                .run(listener, buffer, log, Arc::clone(&flags), async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await;
            // Listener and peers are released; consumers may now drain out.
            flags.set_producer_done();
            result
        }
    };

    // -- Analytics: drains the buffer under its own tag --
    let analytics_log = log.clone();
    let analytics_buffer = Arc::clone(&buffer);
    let analytics = async { datamgr.run(analytics_buffer.as_ref(), &analytics_log).await };

    // -- Storage: connect with retries, then persist every record --
    let storage = {
        let buffer = Arc::clone(&buffer);
        let flags = Arc::clone(&flags);
        let log = log.clone();
        async move {
            let connect = || async {
                SqliteStore::connect(config::DB_URL, config::TABLE_NAME, config::CLEAR_EXISTING_DATA)
                    .await
                    .map_err(|e| {
                        tracing::warn!("SQL connect failed: {e}");
                        StoreError::Unavailable
                    })
            };
            let store = match sensordb.connect_with_retry(connect, &log, &flags).await {
                Ok(store) => store,
                Err(e) => {
                    // Flag is set; discard whatever the producer queued so far.
                    buffer.set_degraded();
                    return Err(e);
                }
            };
            log.publish(format!("New table <{}> created.\n", config::TABLE_NAME)).await;

            let result = sensordb.run(buffer.as_ref(), &store, &log, &flags).await;
            if result.is_err() {
                buffer.set_degraded();
            }
            result
        }
    };

    let (producer_result, analytics_result, storage_result) = tokio::join!(
        producer.instrument(tracing::info_span!("connmgr")),
        analytics.instrument(tracing::info_span!("datamgr")),
        storage.instrument(tracing::info_span!("sensordb")),
    );

    producer_result.context("connection manager failed")?;
    analytics_result.context("analytics failed")?;
    if let Err(e) = storage_result {
        // Degraded storage drains the pipeline but is a normal shutdown.
        tracing::warn!("storage degraded: {e}");
    }

    // All tasks joined; stop the sink and wait for the file to settle.
    log.publish(eventlog::TERMINATE.to_owned()).await;
    drop(log);
    match sink_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("log sink failed: {e}"),
        Err(e) => tracing::warn!("log sink task panicked: {e}"),
    }

    Ok(())
}
