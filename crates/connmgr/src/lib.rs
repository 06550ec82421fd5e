// Rust guideline compliant 2026-03-05

//! Connection manager -- the producer side of the gateway pipeline.
//!
//! Listens for sensor-node TCP connections, drains their record streams, and
//! publishes every record to a `RecordSink` port. Lifecycle events (node
//! open, node close/timeout) go to the `EventLog` port.
//!
//! Entry point: [`Connmgr::run`]. Configuration via [`ConnmgrConfig::builder`].
//! The wire codec lives in [`wire`].

use domain::{BufferError, EventLog, PipelineFlags, RecordSink, SensorId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

pub mod wire;

// ---------------------------------------------------------------------------
// ConnmgrError
// ---------------------------------------------------------------------------

/// Errors that can occur while running the connection manager.
#[derive(Debug, thiserror::Error)]
pub enum ConnmgrError {
    /// The supplied configuration is invalid.
    #[error("invalid connection manager configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// Accepting an inbound connection failed; fatal to the producer.
    #[error("failed to accept inbound connection: {0}")]
    Accept(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// ConnmgrConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`Connmgr`].
///
/// Construct via [`ConnmgrConfig::builder`].
#[derive(Debug)]
pub struct ConnmgrConfig {
    /// Idle bound for both scopes: a peer that sends nothing for this long is
    /// closed, and a listener with no readiness anywhere for this long shuts
    /// the producer down.
    pub idle_timeout: Duration,
}

/// Builder for [`ConnmgrConfig`].
///
/// Obtain via [`ConnmgrConfig::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct ConnmgrConfigBuilder {
    idle_timeout: Duration,
}

impl ConnmgrConfig {
    /// Create a builder.
    ///
    /// Default values: `idle_timeout = 5 s`.
    #[must_use]
    pub fn builder() -> ConnmgrConfigBuilder {
        ConnmgrConfigBuilder { idle_timeout: Duration::from_secs(5) }
    }
}

impl ConnmgrConfigBuilder {
    /// Override the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConnmgrError::InvalidConfig`] when `idle_timeout` is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<ConnmgrConfig, ConnmgrError> {
        if self.idle_timeout.is_zero() {
            return Err(ConnmgrError::InvalidConfig {
                reason: "idle_timeout must be non-zero".to_owned(),
            });
        }
        Ok(ConnmgrConfig { idle_timeout: self.idle_timeout })
    }
}

// ---------------------------------------------------------------------------
// Connmgr
// ---------------------------------------------------------------------------

/// Accepts sensor-node connections and pumps their records into the buffer.
///
/// Generic over the sink and log ports for zero-cost static dispatch. One
/// task per peer; the manager itself only accepts, reaps, and decides when
/// the producer is done.
#[derive(Debug)]
pub struct Connmgr {
    config: ConnmgrConfig,
}

impl Connmgr {
    /// Create a new connection manager from `config`.
    #[must_use]
    pub fn new(config: ConnmgrConfig) -> Self {
        Self { config }
    }

    /// Run the producer until idle shutdown or until `shutdown` completes.
    ///
    /// Each accepted peer gets its own task that reads wire records, reports
    /// `"new sensor node <id> is open"` on the first complete record, inserts
    /// every record into `buffer`, and closes with
    /// `"sensor node <id> closed connection"` on hang-up, read error, or
    /// idle timeout.
    ///
    /// The producer is done when a full `idle_timeout` passes with no inbound
    /// connection and no live peer (peers self-expire on the same timeout, so
    /// this is the no-readiness-anywhere condition). Storage degradation
    /// observed between accepts also ends the run. On return the listener is
    /// dropped and any remaining peer task has been aborted; the caller is
    /// expected to set `producer_done` next.
    ///
    /// # Errors
    ///
    /// Returns [`ConnmgrError::Accept`] when the listener fails; this is
    /// fatal to the producer.
    pub async fn run<B, L>(
        &self,
        listener: TcpListener,
        buffer: Arc<B>,
        log: L,
        flags: Arc<PipelineFlags>,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<(), ConnmgrError>
    where
        B: RecordSink + Send + Sync + 'static,
        L: EventLog + Clone + Send + Sync + 'static,
    {
        let mut peers = JoinSet::new();
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                accepted = tokio::time::timeout(self.config.idle_timeout, listener.accept()) => {
                    match accepted {
                        Ok(Ok((socket, addr))) => {
                            log::debug!("connmgr.peer.accepted: addr={addr}");
                            peers.spawn(handle_peer(
                                socket,
                                Arc::clone(&buffer),
                                log.clone(),
                                self.config.idle_timeout,
                            ));
                        }
                        Ok(Err(e)) => break Err(ConnmgrError::Accept(e)),
                        Err(_elapsed) => {
                            while peers.try_join_next().is_some() {}
                            if peers.is_empty() {
                                log::info!(
                                    "connmgr.idle: no activity for {:?}, shutting down",
                                    self.config.idle_timeout
                                );
                                break Ok(());
                            }
                        }
                    }
                    if flags.storage_degraded() {
                        log::warn!("connmgr.stopped: storage degraded");
                        break Ok(());
                    }
                }
                () = &mut shutdown => {
                    log::info!("connmgr.shutdown: external stop requested");
                    break Ok(());
                }
            }
        };

        // Release every peer socket before reporting the producer done.
        peers.shutdown().await;
        drop(listener);
        result
    }
}

/// Per-peer record pump. Runs until hang-up, idle timeout, read error, or a
/// degraded pipeline. A `Closed` insert only drops that record.
async fn handle_peer<B, L>(mut socket: TcpStream, buffer: Arc<B>, log: L, idle_timeout: Duration)
where
    B: RecordSink + Send + Sync,
    L: EventLog + Send + Sync,
{
    // 0 until the first complete record names the node, as on the wire.
    let mut sensor_id: SensorId = 0;
    let mut is_new = true;

    loop {
        match tokio::time::timeout(idle_timeout, wire::read_record(&mut socket)).await {
            Ok(Ok(Some(record))) => {
                sensor_id = record.sensor_id;
                if is_new {
                    is_new = false;
                    log.publish(format!("new sensor node {sensor_id} is open\n")).await;
                }
                log::debug!(
                    "connmgr.record.received: sensor_id={} value={} timestamp={}",
                    record.sensor_id,
                    record.value,
                    record.timestamp
                );
                match buffer.insert(record).await {
                    Ok(()) => {}
                    Err(BufferError::Degraded) => {
                        // Storage is gone; producer exit path.
                        log::warn!("connmgr.peer.stopped: sensor_id={sensor_id} pipeline degraded");
                        break;
                    }
                    Err(BufferError::Closed) => {
                        // Record dropped; the peer stays open.
                        log::warn!("connmgr.record.dropped: sensor_id={sensor_id} buffer closed");
                    }
                }
            }
            Ok(Ok(None)) => {
                // TCP FIN; a partial trailing record was dropped, never inserted.
                log::info!("connmgr.peer.closed: sensor_id={sensor_id}");
                log.publish(format!("sensor node {sensor_id} closed connection\n")).await;
                break;
            }
            Ok(Err(e)) => {
                log::warn!("connmgr.peer.error: sensor_id={sensor_id} error={e}");
                log.publish(format!("sensor node {sensor_id} closed connection\n")).await;
                break;
            }
            Err(_elapsed) => {
                log::info!("connmgr.peer.timeout: sensor_id={sensor_id}");
                log.publish(format!("sensor node {sensor_id} closed connection\n")).await;
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{Connmgr, ConnmgrConfig, ConnmgrError, wire};
    use domain::{BufferError, EventLog, PipelineFlags, RecordSink, SensorRecord};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::{TcpListener, TcpStream};

    // ------------------------------------------------------------------
    // Test helpers
    // ------------------------------------------------------------------

    /// Sink that appends every inserted record for assertion.
    struct VecSink {
        records: Mutex<Vec<SensorRecord>>,
    }

    impl VecSink {
        fn new() -> Self {
            Self { records: Mutex::new(vec![]) }
        }

        fn records(&self) -> Vec<SensorRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl RecordSink for VecSink {
        async fn insert(&self, record: SensorRecord) -> Result<(), BufferError> {
            self.records.lock().unwrap().push(record);
            Ok(())
        }
    }

    /// Sink that always refuses: the degraded pipeline.
    struct DegradedSink;

    impl RecordSink for DegradedSink {
        async fn insert(&self, _record: SensorRecord) -> Result<(), BufferError> {
            Err(BufferError::Degraded)
        }
    }

    /// Sink that signals `Closed`: records drop but peers stay open.
    struct ClosedSink;

    impl RecordSink for ClosedSink {
        async fn insert(&self, _record: SensorRecord) -> Result<(), BufferError> {
            Err(BufferError::Closed)
        }
    }

    /// Cloneable log capturing every published message.
    #[derive(Clone)]
    struct RecordingLog {
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingLog {
        fn new() -> Self {
            Self { lines: Arc::new(Mutex::new(vec![])) }
        }

        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl EventLog for RecordingLog {
        async fn publish(&self, message: String) {
            self.lines.lock().unwrap().push(message);
        }
    }

    fn make_record(sensor_id: u16, value: f64, timestamp: i64) -> SensorRecord {
        SensorRecord { sensor_id, value, timestamp }
    }

    fn make_connmgr(idle: Duration) -> Connmgr {
        Connmgr::new(ConnmgrConfig::builder().idle_timeout(idle).build().unwrap())
    }

    async fn send_records(stream: &mut TcpStream, records: &[SensorRecord]) {
        for record in records {
            stream.write_all(&wire::encode_record(record)).await.unwrap();
        }
        stream.flush().await.unwrap();
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    #[test]
    fn config_rejects_zero_timeout() {
        let result = ConnmgrConfig::builder().idle_timeout(Duration::ZERO).build();
        assert!(matches!(result, Err(ConnmgrError::InvalidConfig { .. })));
    }

    #[test]
    fn config_default_timeout_is_5s() {
        let config = ConnmgrConfig::builder().build().unwrap();
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
    }

    // ------------------------------------------------------------------
    // Record delivery
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn single_peer_records_delivered_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let sink = Arc::new(VecSink::new());
        let log = RecordingLog::new();
        let flags = Arc::new(PipelineFlags::new());

        let connmgr = make_connmgr(Duration::from_millis(200));
        let run = tokio::spawn({
            let sink = Arc::clone(&sink);
            let log = log.clone();
            async move {
                connmgr.run(listener, sink, log, flags, std::future::pending()).await
            }
        });

        let records =
            [make_record(1, 20.0, 100), make_record(1, 21.0, 101), make_record(1, 22.0, 102)];
        let mut stream = TcpStream::connect(addr).await.unwrap();
        send_records(&mut stream, &records).await;
        drop(stream); // FIN

        run.await.unwrap().unwrap();

        assert_eq!(sink.records(), records);
        let lines = log.lines();
        let opens = lines.iter().filter(|l| l.contains("new sensor node 1 is open")).count();
        assert_eq!(opens, 1, "open message must appear exactly once: {lines:?}");
        assert!(
            lines.iter().any(|l| l.contains("sensor node 1 closed connection")),
            "missing close message: {lines:?}"
        );
    }

    #[tokio::test]
    async fn silent_peer_is_timed_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let sink = Arc::new(VecSink::new());
        let log = RecordingLog::new();
        let flags = Arc::new(PipelineFlags::new());

        let connmgr = make_connmgr(Duration::from_millis(150));
        let run = tokio::spawn({
            let sink = Arc::clone(&sink);
            let log = log.clone();
            async move {
                connmgr.run(listener, sink, log, flags, std::future::pending()).await
            }
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        send_records(&mut stream, &[make_record(4, 19.5, 7)]).await;
        // Stay connected but silent; the gateway must drop us, not wait forever.
        run.await.unwrap().unwrap();

        assert_eq!(sink.records().len(), 1);
        assert!(
            log.lines().iter().any(|l| l.contains("sensor node 4 closed connection")),
            "timeout must log the close message: {:?}",
            log.lines()
        );
        drop(stream);
    }

    #[tokio::test]
    async fn two_peers_interleave_with_per_peer_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let sink = Arc::new(VecSink::new());
        let log = RecordingLog::new();
        let flags = Arc::new(PipelineFlags::new());

        let connmgr = make_connmgr(Duration::from_millis(200));
        let run = tokio::spawn({
            let sink = Arc::clone(&sink);
            let log = log.clone();
            async move {
                connmgr.run(listener, sink, log, flags, std::future::pending()).await
            }
        });

        let send = |sensor_id: u16| async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            for i in 0..10 {
                let record = make_record(sensor_id, f64::from(i), i64::from(i));
                stream.write_all(&wire::encode_record(&record)).await.unwrap();
            }
            stream.flush().await.unwrap();
            drop(stream);
        };
        tokio::join!(send(1), send(2));

        run.await.unwrap().unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 20, "all 20 records must arrive");
        for sensor_id in [1u16, 2] {
            let values: Vec<i64> = records
                .iter()
                .filter(|r| r.sensor_id == sensor_id)
                .map(|r| r.timestamp)
                .collect();
            assert_eq!(values, (0..10).collect::<Vec<i64>>(), "per-peer order for {sensor_id}");
        }
    }

    #[tokio::test]
    async fn closed_buffer_drops_records_but_keeps_the_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log = RecordingLog::new();
        let flags = Arc::new(PipelineFlags::new());

        let connmgr = make_connmgr(Duration::from_millis(200));
        let run = tokio::spawn({
            let log = log.clone();
            async move {
                connmgr.run(listener, Arc::new(ClosedSink), log, flags, std::future::pending()).await
            }
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        send_records(&mut stream, &[make_record(3, 20.0, 1), make_record(3, 21.0, 2)]).await;
        drop(stream); // FIN

        run.await.unwrap().unwrap();

        // Both refused inserts were survived: the peer read to end-of-stream
        // and closed on the FIN, not on the first failed insert.
        let lines = log.lines();
        assert!(
            lines.iter().any(|l| l.contains("sensor node 3 closed connection")),
            "peer must reach the hang-up path: {lines:?}"
        );
        let opens = lines.iter().filter(|l| l.contains("new sensor node 3 is open")).count();
        assert_eq!(opens, 1, "{lines:?}");
    }

    // ------------------------------------------------------------------
    // Shutdown paths
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn idle_with_no_peers_ends_the_run() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let sink = Arc::new(VecSink::new());
        let flags = Arc::new(PipelineFlags::new());

        let connmgr = make_connmgr(Duration::from_millis(100));
        let result = connmgr
            .run(listener, sink, RecordingLog::new(), flags, std::future::pending())
            .await;
        assert!(result.is_ok(), "idle shutdown must be clean: {result:?}");
    }

    #[tokio::test]
    async fn external_shutdown_forces_teardown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let sink = Arc::new(VecSink::new());
        let flags = Arc::new(PipelineFlags::new());
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        // Long idle timeout: only the shutdown future can end this run early.
        let connmgr = make_connmgr(Duration::from_secs(30));
        let run = tokio::spawn({
            let sink = Arc::clone(&sink);
            async move {
                connmgr
                    .run(listener, sink, RecordingLog::new(), flags, async move {
                        let _ = stop_rx.await;
                    })
                    .await
            }
        });

        // A live, silent peer must not delay the forced teardown.
        let stream = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), run).await;
        assert!(result.is_ok(), "run must end promptly after the stop signal");
        result.unwrap().unwrap().unwrap();
        drop(stream);
    }

    #[tokio::test]
    async fn degraded_buffer_ends_the_run() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let flags = Arc::new(PipelineFlags::new());
        flags.set_storage_degraded();

        let connmgr = make_connmgr(Duration::from_millis(100));
        let run = tokio::spawn({
            let flags = Arc::clone(&flags);
            async move {
                connmgr
                    .run(
                        listener,
                        Arc::new(DegradedSink),
                        RecordingLog::new(),
                        flags,
                        std::future::pending(),
                    )
                    .await
            }
        });

        // The manager may tear everything down before this write lands; a
        // failed write is fine, the run ending promptly is what matters.
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let _ = stream.write_all(&wire::encode_record(&make_record(9, 21.0, 1))).await;

        let result = tokio::time::timeout(Duration::from_secs(1), run).await;
        assert!(result.is_ok(), "degradation must end the producer");
        result.unwrap().unwrap().unwrap();
        drop(stream);
    }
}
