//!
//! clinic storage module
//! ---------------------
//! Relational store for the clinic: five entity tables (user, doctor, patient,
//! medicament, appointment), the patient_medication association and the
//! accompaniment lookup table, all in one SQLite database.
//!
//! Key responsibilities:
//! - Schema creation with foreign keys enforced (`PRAGMA foreign_keys = ON`).
//! - One repository module per entity exposing plain functions over `&Connection`.
//! - `SharedStore`, the async handle used by HTTP handlers: every call runs on the
//!   blocking pool under a bounded deadline and failures surface as `AppError`.
//!
//! Repository functions trust the scoping filters they receive. Authorization is
//! decided before any of them is invoked.

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, InterruptHandle};
use tracing::{error, info, warn};

use crate::error::AppError;

pub mod schema;
pub mod users;
pub mod doctors;
pub mod patients;
pub mod medications;
pub mod appointments;
pub mod accompaniments;

/// Failures raised inside the store. Converted to `AppError` at the handler boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("this email is already in use")]
    DuplicateEmail,
    #[error("{0}")]
    Invalid(String),
    #[error("store call exceeded {0:?}")]
    Timeout(Duration),
    #[error("store task failed: {0}")]
    Join(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(m) => AppError::not_found(m),
            StoreError::DuplicateEmail => AppError::duplicate_email(),
            StoreError::Invalid(m) => AppError::validation(m),
            other => {
                error!(target: "store", "store unavailable: {}", other);
                AppError::store_unavailable("server error")
            }
        }
    }
}

/// True when `err` is a UNIQUE constraint failure.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
}

/// True when `err` is a FOREIGN KEY constraint failure.
pub(crate) fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
}

/// Thread-safe handle over the single SQLite connection.
#[derive(Clone)]
pub struct SharedStore {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    timeout: Duration,
}

// Lifecycle of one `SharedStore::call`.
const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;
const CANCELLED: u8 = 3;

impl SharedStore {
    /// Open (or create) the database at `path`. `":memory:"` opens a private in-memory store.
    pub fn open(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let conn = if path.as_os_str() == ":memory:" {
            Connection::open_in_memory().context("While opening in-memory store")?
        } else {
            Connection::open(path).with_context(|| format!("While opening store at {}", path.display()))?
        };
        schema::install(&conn).context("While installing schema")?;
        info!(target: "store", "store ready at {}", path.display());
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Ok(Self { conn: Arc::new(Mutex::new(conn)), interrupt, timeout })
    }

    pub fn open_in_memory(timeout: Duration) -> Result<Self> {
        Self::open(":memory:", timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `f` against the connection on the blocking pool, bounded by the store deadline.
    ///
    /// When the deadline passes, a call still waiting for the connection never runs, and a
    /// call already running has its current statement interrupted. Statements that completed
    /// before the interrupt stay committed, so a multi-statement `f` can be partially applied
    /// even though the caller sees `StoreUnavailable`.
    pub async fn call<T, F>(&self, f: F) -> std::result::Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        let state = Arc::new(AtomicU8::new(PENDING));
        let task_state = state.clone();
        let timeout = self.timeout;
        let task = tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            if task_state.compare_exchange(PENDING, RUNNING, Ordering::SeqCst, Ordering::SeqCst).is_err() {
                return Err(StoreError::Timeout(timeout));
            }
            let res = f(&guard);
            task_state.store(FINISHED, Ordering::SeqCst);
            res
        });
        let out = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(res)) => res,
            Ok(Err(join)) => Err(StoreError::Join(join.to_string())),
            Err(_) => {
                if state.compare_exchange(PENDING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst) == Err(RUNNING) {
                    warn!(target: "store", "store call exceeded {:?}; interrupting", timeout);
                    self.interrupt.interrupt();
                }
                Err(StoreError::Timeout(timeout))
            }
        };
        out.map_err(AppError::from)
    }

    /// Synchronous access for startup tasks that run before the server accepts requests.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self.conn.lock();
        f(&guard)
    }
}

/// Create the bootstrap administrator when the user table is empty.
pub fn ensure_default_admin(store: &SharedStore, email: &str, password: &str) -> Result<bool> {
    let created = store.with_conn(|conn| {
        if users::count_users(conn)? > 0 { return Ok(false); }
        let phc = crate::security::hash_password(password).map_err(|e| StoreError::Invalid(e.to_string()))?;
        users::create_user_hashed(conn, email, &phc, crate::identity::Role::Admin)?;
        Ok(true)
    })?;
    if created { info!(target: "startup", "bootstrap administrator {} created", email); }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_runs_on_connection() {
        let store = SharedStore::open_in_memory(Duration::from_secs(1)).unwrap();
        let n = store.call(|c| users::count_users(c)).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn call_maps_sqlite_failures_to_store_unavailable() {
        let store = SharedStore::open_in_memory(Duration::from_secs(1)).unwrap();
        let err = store
            .call(|c| {
                c.execute("SELECT * FROM no_such_table", [])?;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn call_is_bounded_by_deadline() {
        let store = SharedStore::open_in_memory(Duration::from_millis(20)).unwrap();
        let err = store
            .call(|_| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn timed_out_statement_is_interrupted() {
        let store = SharedStore::open_in_memory(Duration::from_millis(50)).unwrap();
        let err = store
            .call(|c| {
                let n: i64 = c.query_row(
                    "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) SELECT count(*) FROM n",
                    [],
                    |r| r.get(0),
                )?;
                Ok(n)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable { .. }));

        // The endless query released the connection
        let store = SharedStore { timeout: Duration::from_secs(5), ..store };
        assert_eq!(store.call(|c| users::count_users(c)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn timed_out_waiting_call_never_runs() {
        let store = SharedStore::open_in_memory(Duration::from_millis(50)).unwrap();
        let busy = store
            .call(|_| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .await;
        assert!(busy.is_err());

        // Queued behind the sleeping call, gives up before it gets the connection
        let queued = store
            .call(|c| users::create_user_hashed(c, "late@clinic.test", "h", crate::identity::Role::Admin))
            .await;
        assert!(queued.is_err());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.with_conn(|c| users::count_users(c)).unwrap(), 0);
    }

    #[test]
    fn default_admin_only_on_empty_store() {
        let store = SharedStore::open_in_memory(Duration::from_secs(1)).unwrap();
        assert!(ensure_default_admin(&store, "admin@clinic.test", "pw").unwrap());
        assert!(!ensure_default_admin(&store, "other@clinic.test", "pw").unwrap());
        let all = store.with_conn(|c| users::list_users(c)).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].email, "admin@clinic.test");
    }

    #[test]
    fn file_backed_store_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("clinic.db");
        {
            let store = SharedStore::open(&path, Duration::from_secs(1)).unwrap();
            ensure_default_admin(&store, "admin@clinic.test", "pw").unwrap();
        }
        let store = SharedStore::open(&path, Duration::from_secs(1)).unwrap();
        assert_eq!(store.with_conn(|c| users::count_users(c)).unwrap(), 1);
    }
}
