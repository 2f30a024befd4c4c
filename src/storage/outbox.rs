//! Telemetry outbox - SQLite-backed store-and-forward buffer
//!
//! Every inbound record lands here first with `uploaded = 0`. The flag flips
//! to 1 once the record has been written to the remote store and never goes
//! back. Records are never deleted here; retention is handled elsewhere.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, info};

use crate::model::{MainTankReading, SamplingTankReading, TelemetryKind, TelemetryRecord};

const DATABASE_FILE: &str = "outbox.db";

/// Local durable buffer for telemetry awaiting upload
pub struct OutboxStore {
    db: Mutex<Connection>,
}

/// Records still waiting for upload, grouped by kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingRecords {
    pub main_tank: Vec<MainTankReading>,
    pub sampling_tank: Vec<SamplingTankReading>,
}

impl PendingRecords {
    pub fn len(&self) -> usize {
        self.main_tank.len() + self.sampling_tank.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into records, main tank first, each kind in insertion order
    pub fn into_records(self) -> Vec<TelemetryRecord> {
        self.main_tank
            .into_iter()
            .map(TelemetryRecord::MainTank)
            .chain(self.sampling_tank.into_iter().map(TelemetryRecord::SamplingTank))
            .collect()
    }
}

/// Backlog size per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingCounts {
    pub main_tank: u64,
    pub sampling_tank: u64,
}

impl OutboxStore {
    /// Open or create the outbox database inside `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, OutboxError> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(DATABASE_FILE);
        let db = Connection::open(&db_path)?;

        // Enable WAL mode so status reads don't block ingestion
        db.execute_batch("PRAGMA journal_mode=WAL;")?;

        let store = Self::init(db)?;
        info!(path = %db_path.display(), "Outbox initialized");
        Ok(store)
    }

    /// Non-durable outbox, for tests and dry runs
    pub fn open_in_memory() -> Result<Self, OutboxError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self, OutboxError> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS main_tank_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                temperature_C REAL,
                light_intensity_lux REAL,
                water_level_cm REAL,
                pH_value REAL,
                uploaded INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS sampling_tank_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                EC_value REAL,
                uploaded INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_main_tank_pending ON main_tank_logs(uploaded);
            CREATE INDEX IF NOT EXISTS idx_sampling_tank_pending ON sampling_tank_logs(uploaded);",
        )?;

        Ok(Self { db: Mutex::new(db) })
    }

    /// Store a new record as not yet uploaded.
    pub fn persist(&self, record: &TelemetryRecord) -> Result<(), OutboxError> {
        let db = self.lock()?;
        match record {
            TelemetryRecord::MainTank(r) => {
                db.execute(
                    "INSERT INTO main_tank_logs
                        (timestamp, temperature_C, light_intensity_lux, water_level_cm, pH_value)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        r.timestamp,
                        r.temperature_c,
                        r.light_intensity_lux,
                        r.water_level_cm,
                        r.ph_value
                    ],
                )?;
            }
            TelemetryRecord::SamplingTank(r) => {
                db.execute(
                    "INSERT INTO sampling_tank_logs (timestamp, EC_value) VALUES (?1, ?2)",
                    params![r.timestamp, r.ec_value],
                )?;
            }
        }
        debug!(
            kind = record.kind().as_str(),
            timestamp = record.timestamp(),
            "Persisted telemetry"
        );
        Ok(())
    }

    /// Flag every record with this timestamp, of either kind, as uploaded.
    ///
    /// Returns how many records changed state; already-flagged records and
    /// unknown timestamps count as zero.
    pub fn mark_uploaded(&self, timestamp: &str) -> Result<usize, OutboxError> {
        let mut db = self.lock()?;
        let tx = db.transaction()?;
        let mut changed = 0;
        for kind in TelemetryKind::ALL {
            changed += tx.execute(
                &format!(
                    "UPDATE {} SET uploaded = 1 WHERE timestamp = ?1 AND uploaded = 0",
                    table(kind)
                ),
                [timestamp],
            )?;
        }
        tx.commit()?;

        if changed > 0 {
            debug!(timestamp, changed, "Marked uploaded");
        }
        Ok(changed)
    }

    /// Every record whose `uploaded` flag is still 0.
    pub fn fetch_pending(&self) -> Result<PendingRecords, OutboxError> {
        let db = self.lock()?;

        let mut stmt = db.prepare_cached(
            "SELECT timestamp, temperature_C, light_intensity_lux, water_level_cm, pH_value
             FROM main_tank_logs WHERE uploaded = 0 ORDER BY id",
        )?;
        let main_tank = stmt
            .query_map([], |row| {
                Ok(MainTankReading {
                    timestamp: row.get(0)?,
                    temperature_c: row.get(1)?,
                    light_intensity_lux: row.get(2)?,
                    water_level_cm: row.get(3)?,
                    ph_value: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = db.prepare_cached(
            "SELECT timestamp, EC_value FROM sampling_tank_logs WHERE uploaded = 0 ORDER BY id",
        )?;
        let sampling_tank = stmt
            .query_map([], |row| {
                Ok(SamplingTankReading {
                    timestamp: row.get(0)?,
                    ec_value: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PendingRecords {
            main_tank,
            sampling_tank,
        })
    }

    pub fn pending_counts(&self) -> Result<PendingCounts, OutboxError> {
        let db = self.lock()?;
        let count = |kind: TelemetryKind| -> Result<u64, rusqlite::Error> {
            db.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE uploaded = 0", table(kind)),
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
        };

        Ok(PendingCounts {
            main_tank: count(TelemetryKind::MainTank)?,
            sampling_tank: count(TelemetryKind::SamplingTank)?,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, OutboxError> {
        self.db.lock().map_err(|_| OutboxError::Poisoned)
    }
}

/// Run an outbox operation on the blocking pool so disk stalls never hold an
/// async worker.
pub async fn blocking<F, R>(store: &Arc<OutboxStore>, op: F) -> Result<R, OutboxError>
where
    F: FnOnce(&OutboxStore) -> Result<R, OutboxError> + Send + 'static,
    R: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| OutboxError::Task(e.to_string()))?
}

fn table(kind: TelemetryKind) -> &'static str {
    match kind {
        TelemetryKind::MainTank => "main_tank_logs",
        TelemetryKind::SamplingTank => "sampling_tank_logs",
    }
}

/// Local persistence failures
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Outbox lock poisoned")]
    Poisoned,

    #[error("Outbox task failed: {0}")]
    Task(String),
}
