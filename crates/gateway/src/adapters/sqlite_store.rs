// Rust guideline compliant 2026-03-07

//! `SQLite` adapter for the `MeasurementStore` port.
//!
//! Persists sensor records to a `SQLite` file via `sqlx`. The table and
//! database names are build-time configuration; the schema is created on
//! first connect, optionally clearing data left by a previous run.

use domain::{MeasurementStore, SensorRecord, StoreError};

/// `MeasurementStore` adapter backed by a `SQLite` database via `sqlx`.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
    insert_sql: String,
}

impl SqliteStore {
    /// Open or create the database and ensure `table` exists.
    ///
    /// Passes `create_if_missing(true)` so the database file appears on first
    /// run without manual setup. With `clear_existing`, rows surviving from a
    /// previous run are deleted and the autoincrement counter is reset.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` when the connection or schema setup fails.
    pub async fn connect(
        db_url: &str,
        table: &str,
        clear_existing: bool,
    ) -> Result<Self, sqlx::Error> {
        let opts = db_url
            .parse::<sqlx::sqlite::SqliteConnectOptions>()?
            .create_if_missing(true);
        let pool = sqlx::SqlitePool::connect_with(opts).await?;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                sensor_id    INTEGER NOT NULL,
                sensor_value DECIMAL(4,2) NOT NULL,
                timestamp    TIMESTAMP
            )"
        ))
        .execute(&pool)
        .await?;

        if clear_existing {
            sqlx::query(&format!("DELETE FROM {table}")).execute(&pool).await?;
            // sqlite_sequence only exists once an AUTOINCREMENT insert has
            // happened; a missing table here is not an error.
            if let Err(e) = sqlx::query("DELETE FROM sqlite_sequence WHERE name = ?")
                .bind(table)
                .execute(&pool)
                .await
            {
                log::debug!("sqlite.clear.sequence: {e}");
            }
        }

        Ok(Self {
            pool,
            insert_sql: format!(
                "INSERT INTO {table} (sensor_id, sensor_value, timestamp) VALUES (?, ?, ?)"
            ),
        })
    }
}

impl MeasurementStore for SqliteStore {
    /// Insert one `(sensor_id, sensor_value, timestamp)` row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] on any `sqlx` error (connection
    /// lost, disk full, constraint violation). The underlying error is logged
    /// at `error` level before mapping.
    async fn store(&self, record: &SensorRecord) -> Result<(), StoreError> {
        sqlx::query(&self.insert_sql)
            .bind(i64::from(record.sensor_id))
            .bind(record.value)
            .bind(record.timestamp)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                log::error!("sqlite.store: {e}");
                StoreError::Unavailable
            })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::SqliteStore;
    use domain::{MeasurementStore as _, SensorRecord};

    // Each test opens a fresh SqlitePool backed by an in-memory SQLite
    // database, so tests are fully isolated with no on-disk side-effects.
    async fn make_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:", "SensorData", false)
            .await
            .expect("in-memory SQLite should open")
    }

    fn make_record(sensor_id: u16, value: f64, timestamp: i64) -> SensorRecord {
        SensorRecord { sensor_id, value, timestamp }
    }

    // SQ-T01: one row per stored record.
    #[tokio::test]
    async fn store_inserts_one_row_per_record() {
        let store = make_store().await;
        store.store(&make_record(1, 20.5, 100)).await.unwrap();
        store.store(&make_record(2, 21.5, 101)).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM SensorData")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    // SQ-T02: columns round-trip.
    #[tokio::test]
    async fn columns_round_trip() {
        let store = make_store().await;
        store.store(&make_record(42, 19.25, 1_700_000_000)).await.unwrap();

        let (sensor_id, value, timestamp): (i64, f64, i64) = sqlx::query_as(
            "SELECT sensor_id, sensor_value, timestamp FROM SensorData",
        )
        .fetch_one(&store.pool)
        .await
        .unwrap();
        assert_eq!(sensor_id, 42);
        assert_eq!(value, 19.25);
        assert_eq!(timestamp, 1_700_000_000);
    }

    // SQ-T03: duplicate records append; nothing is deduplicated.
    #[tokio::test]
    async fn duplicates_append() {
        let store = make_store().await;
        let record = make_record(1, 20.0, 100);
        store.store(&record).await.unwrap();
        store.store(&record).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM SensorData")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 2, "every insert is its own row");
    }

    // SQ-T04: clear_existing wipes rows from a previous run and resets ids.
    #[tokio::test]
    async fn clear_existing_wipes_previous_rows() {
        let path = std::env::temp_dir()
            .join(format!("gateway-sqlite-clear-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let url = format!("sqlite:{}", path.display());

        let first = SqliteStore::connect(&url, "SensorData", false).await.unwrap();
        first.store(&make_record(1, 20.0, 1)).await.unwrap();
        first.pool.close().await;

        let second = SqliteStore::connect(&url, "SensorData", true).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM SensorData")
            .fetch_one(&second.pool)
            .await
            .unwrap();
        assert_eq!(count, 0, "previous rows must be cleared");

        second.store(&make_record(2, 21.0, 2)).await.unwrap();
        let id: i64 = sqlx::query_scalar("SELECT id FROM SensorData")
            .fetch_one(&second.pool)
            .await
            .unwrap();
        assert_eq!(id, 1, "autoincrement counter must restart");
        second.pool.close().await;

        let _ = std::fs::remove_file(&path);
    }
}
