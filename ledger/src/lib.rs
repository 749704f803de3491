//! SQLite ledger.
//!
//! [`SqliteLedger`] implements [`Ledger`] over one rusqlite connection in WAL mode.
//! Every [`Ledger::transaction`] runs as a `BEGIN IMMEDIATE` transaction so the
//! write lock is taken up front; a busy or locked database surfaces as
//! [`StoreError::Contention`] and the settlement engine retries it.
//!
//! Balance and quantity writes are relative `UPDATE`s guarded in SQL, so a debit
//! never depends on a value read earlier in Rust.

mod schema;
mod tx;

use mora_execution::{Ledger, LedgerTx, StoreError};
use rusqlite::{Connection, ErrorCode, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

pub use schema::SCHEMA_VERSION;

/// Default wait before a locked database reports contention.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) the database at `path` and bootstrap its schema.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(map_err)?;
        info!(path = %path.display(), "opened sqlite ledger");
        Self::with_connection(conn, busy_timeout)
    }

    /// Private in-memory database, mostly for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_err)?;
        Self::with_connection(conn, DEFAULT_BUSY_TIMEOUT)
    }

    fn with_connection(conn: Connection, busy_timeout: Duration) -> Result<Self, StoreError> {
        conn.busy_timeout(busy_timeout).map_err(map_err)?;
        schema::init(&conn).map_err(map_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Ledger for SqliteLedger {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("sqlite connection poisoned".to_string()))?;
        let transaction = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_err)?;
        let out = f(&mut tx::SqliteTx::new(&transaction))?;
        transaction.commit().map_err(map_err)?;
        Ok(out)
    }

    fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, StoreError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("sqlite connection poisoned".to_string()))?;
        let transaction = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(map_err)?;
        let out = f(&mut tx::SqliteTx::new(&transaction))?;
        // Reads may create default rows; they are committed like any other write.
        transaction.commit().map_err(map_err)?;
        Ok(out)
    }
}

/// Busy and locked databases are retryable; everything else is a backend failure.
pub(crate) fn map_err(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(
                failure.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) =>
        {
            debug!(%err, "sqlite contention");
            StoreError::Contention(err.to_string())
        }
        _ => StoreError::Backend(err.to_string()),
    }
}
