//! SQLite-based snapshot store.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use snapshot_core::{
    CompanyInfo, CompanySnapshot, FinancialData, NewSnapshot, SnapshotStore, StoreError,
    StoreResult, Symbol,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, instrument};

/// Environment variable naming the database file used by [`SqliteStore::from_env`].
pub const DATABASE_PATH_ENV: &str = "SNAPSHOT_DATABASE_PATH";

/// Database file used when [`DATABASE_PATH_ENV`] is unset.
pub const DEFAULT_DATABASE_PATH: &str = "./financial_data.db";

/// Database file named by [`DATABASE_PATH_ENV`], or [`DEFAULT_DATABASE_PATH`]
/// when the variable is unset or blank.
#[must_use]
pub fn database_path() -> PathBuf {
    resolve_database_path(std::env::var(DATABASE_PATH_ENV).ok())
}

fn resolve_database_path(configured: Option<String>) -> PathBuf {
    configured
        .filter(|path| !path.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH), PathBuf::from)
}

const SELECT_COLUMNS: &str = "id, ticker_symbol, company_name, sector, fiscal_year_start_month,
     market_cap, roe, pbr, financial_data, data_fetched_at, created_at";

/// SQLite-backed snapshot store.
///
/// Snapshots are kept in a single table with a `UNIQUE` ticker column; the
/// fiscal-year records are stored as JSON. Upserts run inside an immediate
/// transaction while holding the connection lock.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Open the store named by `SNAPSHOT_DATABASE_PATH`, falling back to
    /// `./financial_data.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn from_env() -> StoreResult<Self> {
        let path = database_path();
        debug!(path = %path.display(), "Opening snapshot database");
        Self::new(path)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS company_financial_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker_symbol TEXT NOT NULL UNIQUE,
                company_name TEXT,
                sector TEXT,
                fiscal_year_start_month INTEGER,
                market_cap INTEGER,
                roe REAL,
                pbr REAL,
                financial_data TEXT NOT NULL,
                data_fetched_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_fetched_at
             ON company_financial_snapshots(data_fetched_at)",
            [],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!("SQLite snapshot schema initialized");
        Ok(())
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn find_where(
        conn: &Connection,
        clause: &str,
        param: &dyn rusqlite::ToSql,
    ) -> StoreResult<Option<CompanySnapshot>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM company_financial_snapshots WHERE {clause}");
        conn.query_row(&sql, params![param], SnapshotRow::read)
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(SnapshotRow::into_snapshot)
            .transpose()
    }
}

/// Raw column values, decoded outside the rusqlite row callback.
struct SnapshotRow {
    id: i64,
    symbol: String,
    name: Option<String>,
    sector: Option<String>,
    fiscal_year_start_month: Option<u32>,
    market_cap: Option<i64>,
    roe: Option<f64>,
    pbr: Option<f64>,
    financial_data: String,
    fetched_at: String,
    created_at: String,
}

impl SnapshotRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            symbol: row.get(1)?,
            name: row.get(2)?,
            sector: row.get(3)?,
            fiscal_year_start_month: row.get(4)?,
            market_cap: row.get(5)?,
            roe: row.get(6)?,
            pbr: row.get(7)?,
            financial_data: row.get(8)?,
            fetched_at: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_snapshot(self) -> StoreResult<CompanySnapshot> {
        let financial_data: FinancialData = serde_json::from_str(&self.financial_data)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(CompanySnapshot {
            id: self.id,
            symbol: Symbol::new(self.symbol),
            info: CompanyInfo {
                name: self.name,
                sector: self.sector,
                market_cap: self.market_cap,
                roe: self.roe,
                pbr: self.pbr,
            },
            fiscal_year_start_month: self.fiscal_year_start_month,
            financial_data,
            fetched_at: decode_timestamp(&self.fetched_at)?,
            created_at: decode_timestamp(&self.created_at)?,
        })
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("Invalid timestamp {s}: {e}")))
}

fn map_write_error(e: rusqlite::Error) -> StoreError {
    match e.sqlite_error_code() {
        Some(rusqlite::ErrorCode::ConstraintViolation) => StoreError::Constraint(e.to_string()),
        _ => StoreError::Database(e.to_string()),
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn find_by_symbol(&self, symbol: &Symbol) -> StoreResult<Option<CompanySnapshot>> {
        let conn = self.lock()?;
        let found = Self::find_where(&conn, "ticker_symbol = ?1", &symbol.as_str())?;
        debug!(hit = found.is_some(), "Looked up snapshot by symbol");
        Ok(found)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<CompanySnapshot>> {
        let conn = self.lock()?;
        Self::find_where(&conn, "id = ?1", &id)
    }

    #[instrument(skip(self, snapshot), fields(symbol = %snapshot.symbol))]
    async fn upsert(&self, snapshot: NewSnapshot) -> StoreResult<CompanySnapshot> {
        let financial_data = serde_json::to_string(&snapshot.financial_data)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let fetched_at = encode_timestamp(snapshot.fetched_at);

        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM company_financial_snapshots WHERE ticker_symbol = ?1",
                params![snapshot.symbol.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let id = match existing {
            Some(id) => {
                debug!(id, "Replacing existing snapshot");
                tx.execute(
                    "UPDATE company_financial_snapshots
                     SET company_name = ?1, sector = ?2, fiscal_year_start_month = ?3,
                         market_cap = ?4, roe = ?5, pbr = ?6, financial_data = ?7,
                         data_fetched_at = ?8
                     WHERE id = ?9",
                    params![
                        snapshot.info.name,
                        snapshot.info.sector,
                        snapshot.fiscal_year_start_month,
                        snapshot.info.market_cap,
                        snapshot.info.roe,
                        snapshot.info.pbr,
                        financial_data,
                        fetched_at,
                        id
                    ],
                )
                .map_err(map_write_error)?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO company_financial_snapshots
                     (ticker_symbol, company_name, sector, fiscal_year_start_month,
                      market_cap, roe, pbr, financial_data, data_fetched_at, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        snapshot.symbol.as_str(),
                        snapshot.info.name,
                        snapshot.info.sector,
                        snapshot.fiscal_year_start_month,
                        snapshot.info.market_cap,
                        snapshot.info.roe,
                        snapshot.info.pbr,
                        financial_data,
                        fetched_at,
                        fetched_at
                    ],
                )
                .map_err(map_write_error)?;
                let id = tx.last_insert_rowid();
                debug!(id, "Inserted new snapshot");
                id
            }
        };

        let stored = Self::find_where(&tx, "id = ?1", &id)?
            .ok_or_else(|| StoreError::Database(format!("Snapshot {id} vanished during upsert")))?;

        tx.commit().map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn list_all(&self) -> StoreResult<Vec<CompanySnapshot>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM company_financial_snapshots
                 ORDER BY data_fetched_at DESC, id DESC"
            ))
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], SnapshotRow::read)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut snapshots = Vec::new();
        for row in rows {
            let row = row.map_err(|e| StoreError::Database(e.to_string()))?;
            snapshots.push(row.into_snapshot()?);
        }

        debug!("Listed {} snapshots", snapshots.len());
        Ok(snapshots)
    }

    #[instrument(skip(self))]
    async fn delete_by_id(&self, id: i64) -> StoreResult<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM company_financial_snapshots WHERE id = ?1",
                params![id],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!(deleted, "Deleted snapshot rows");
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use snapshot_core::FiscalYearRecord;
    use std::sync::Arc;

    fn record(year: &str, revenue: f64, revenue_growth: Option<f64>) -> FiscalYearRecord {
        FiscalYearRecord {
            year: year.to_string(),
            revenue,
            revenue_growth,
            ebit: 12.0,
            ebitda: 15.5,
            fcf: -3.0,
            total_assets: 900.0,
            cash: 80.0,
            debt: 120.0,
        }
    }

    fn new_snapshot(symbol: &str) -> NewSnapshot {
        NewSnapshot {
            symbol: Symbol::new(symbol),
            info: CompanyInfo::new()
                .with_name("Apple Inc.")
                .with_sector("Technology")
                .with_market_cap(3_400_000_000_000)
                .with_roe(1.36)
                .with_pbr(52.1),
            fiscal_year_start_month: Some(10),
            financial_data: FinancialData {
                fiscal_years: vec![
                    record("2023-09-30", 383.0, Some(-2.8)),
                    record("2022-09-24", 394.0, None),
                ],
            },
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_sqlite_store_initialization() {
        let store = SqliteStore::in_memory();
        assert!(store.is_ok());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let path = temp_db_path("reopen");

        let stored = {
            let store = SqliteStore::new(&path).unwrap();
            store.upsert(new_snapshot("AAPL")).await.unwrap()
        };

        let reopened = SqliteStore::new(&path).unwrap();
        let found = reopened.find_by_symbol(&Symbol::new("AAPL")).await.unwrap();
        assert_eq!(found, Some(stored));

        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }

    fn temp_db_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "snapshot-store-{tag}-{}-{}.db",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ))
    }

    #[test]
    fn test_database_path_resolution() {
        let default = PathBuf::from(DEFAULT_DATABASE_PATH);
        assert_eq!(resolve_database_path(None), default);
        assert_eq!(resolve_database_path(Some("  ".to_string())), default);
        assert_eq!(
            resolve_database_path(Some("/var/lib/snapshots.db".to_string())),
            PathBuf::from("/var/lib/snapshots.db")
        );
    }

    #[tokio::test]
    async fn test_configured_path_creates_database_file() {
        let path = temp_db_path("configured");
        assert!(!path.exists());

        let resolved = resolve_database_path(Some(path.to_string_lossy().into_owned()));
        let store = SqliteStore::new(&resolved).unwrap();
        store.upsert(new_snapshot("AAPL")).await.unwrap();

        assert!(path.exists());
        drop(store);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let store = SqliteStore::in_memory().unwrap();
        let symbol = Symbol::new("AAPL");

        assert!(store.find_by_symbol(&symbol).await.unwrap().is_none());

        let input = new_snapshot("AAPL");
        let stored = store.upsert(input.clone()).await.unwrap();

        assert_eq!(stored.symbol, symbol);
        assert_eq!(stored.info, input.info);
        assert_eq!(stored.fiscal_year_start_month, Some(10));
        assert_eq!(stored.financial_data, input.financial_data);
        // microsecond precision survives the round trip
        assert_eq!(
            stored.fetched_at.timestamp_micros(),
            input.fetched_at.timestamp_micros()
        );

        let by_symbol = store.find_by_symbol(&symbol).await.unwrap().unwrap();
        assert_eq!(by_symbol, stored);
        let by_id = store.find_by_id(stored.id).await.unwrap().unwrap();
        assert_eq!(by_id, stored);
    }

    #[tokio::test]
    async fn test_symbol_case_shares_one_row() {
        let store = SqliteStore::in_memory().unwrap();
        let stored = store.upsert(new_snapshot(" aapl ")).await.unwrap();
        assert_eq!(stored.symbol.as_str(), "AAPL");

        let found = store.find_by_symbol(&Symbol::new("Aapl")).await.unwrap();
        assert_eq!(found, Some(stored.clone()));

        let again = store.upsert(new_snapshot("AAPL")).await.unwrap();
        assert_eq!(again.id, stored.id);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_row() {
        let store = SqliteStore::in_memory().unwrap();

        let first = store.upsert(new_snapshot("AAPL")).await.unwrap();

        let mut update = new_snapshot("aapl");
        update.info = CompanyInfo::new().with_name("Apple");
        update.fiscal_year_start_month = None;
        update.financial_data = FinancialData {
            fiscal_years: vec![record("2024-09-28", 391.0, Some(2.0))],
        };
        update.fetched_at = first.fetched_at + Duration::minutes(10);
        let second = store.upsert(update).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.info.sector, None);
        assert_eq!(second.fiscal_year_start_month, None);
        assert_eq!(second.financial_data.fiscal_years.len(), 1);
        assert_eq!(second.financial_data.fiscal_years[0].year, "2024-09-28");
        assert!(second.fetched_at > first.fetched_at);

        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_all_ordering() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();

        for (symbol, age) in [("MSFT", 2), ("AAPL", 0), ("NVDA", 1)] {
            let mut snapshot = new_snapshot(symbol);
            snapshot.fetched_at = now - Duration::hours(age);
            store.upsert(snapshot).await.unwrap();
        }

        let all = store.list_all().await.unwrap();
        let symbols: Vec<&str> = all.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "NVDA", "MSFT"]);
    }

    #[tokio::test]
    async fn test_delete_by_id() {
        let store = SqliteStore::in_memory().unwrap();
        let stored = store.upsert(new_snapshot("AAPL")).await.unwrap();

        assert!(store.delete_by_id(stored.id).await.unwrap());
        assert!(!store.delete_by_id(stored.id).await.unwrap());
        assert!(store.find_by_id(stored.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_ticker_rejected_by_schema() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert(new_snapshot("AAPL")).await.unwrap();

        let conn = store.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO company_financial_snapshots
             (ticker_symbol, financial_data, data_fetched_at, created_at)
             VALUES ('AAPL', '{\"fiscal_years\":[]}', 'x', 'x')",
            [],
        );
        assert!(matches!(
            result.map_err(map_write_error),
            Err(StoreError::Constraint(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_keep_one_row() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let mut snapshot = new_snapshot("AAPL");
                    snapshot.financial_data.fiscal_years[0].revenue = f64::from(i);
                    store.upsert(snapshot).await.unwrap()
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(results.iter().all(|r| r.id == all[0].id));
        // the surviving row is exactly what one writer stored
        assert!(results.contains(&all[0]));
    }

    #[tokio::test]
    async fn test_failed_update_rolls_back() {
        let store = SqliteStore::in_memory().unwrap();
        let original = store.upsert(new_snapshot("AAPL")).await.unwrap();

        // the update itself succeeds, then the row read back inside the
        // transaction is unreadable
        store
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER corrupt_on_update AFTER UPDATE ON company_financial_snapshots
                 BEGIN
                     UPDATE company_financial_snapshots SET financial_data = 'not json'
                     WHERE id = NEW.id;
                 END;",
            )
            .unwrap();

        let mut update = new_snapshot("AAPL");
        update.info = CompanyInfo::new().with_name("Renamed");
        update.fetched_at = original.fetched_at + Duration::seconds(5);
        let result = store.upsert(update).await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));

        let after = store.find_by_id(original.id).await.unwrap();
        assert_eq!(after, Some(original));
    }

    #[tokio::test]
    async fn test_failed_insert_stores_nothing() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_insert BEFORE INSERT ON company_financial_snapshots
                 BEGIN
                     SELECT RAISE(ABORT, 'insert rejected');
                 END;",
            )
            .unwrap();

        let result = store.upsert(new_snapshot("AAPL")).await;
        assert!(matches!(result, Err(StoreError::Constraint(_))));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_financial_data_is_serialization_error() {
        let store = SqliteStore::in_memory().unwrap();
        let stored = store.upsert(new_snapshot("AAPL")).await.unwrap();

        store
            .lock()
            .unwrap()
            .execute(
                "UPDATE company_financial_snapshots SET financial_data = 'not json'",
                [],
            )
            .unwrap();

        let result = store.find_by_id(stored.id).await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
