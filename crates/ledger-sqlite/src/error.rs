//! Error type for the SQLite backend.

use ledger_common::error::Error;
use thiserror::Error as ThisError;

/// Failure modes specific to the SQLite backend, on top of the shared
/// [`Error`] taxonomy every [`ledger_common::StoreAdapter`] must surface.
#[derive(Debug, ThisError)]
pub enum SqliteError {
    /// A domain-level error (unbalanced transaction, missing account, ...).
    #[error(transparent)]
    Ledger(#[from] Error),
    /// A `rusqlite` call failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored JSON column failed to (de)serialize.
    #[error("malformed row: {0}")]
    Serde(#[from] serde_json::Error),
    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(String),
    /// The connection pool's internal lock was poisoned by a panicking holder.
    #[error("connection pool poisoned")]
    PoolPoisoned,
    /// No connection became available before the pool's wait timeout elapsed.
    #[error("timed out waiting for a pooled connection")]
    PoolTimeout,
    /// The blocking worker thread running a query panicked or was cancelled.
    #[error("sqlite worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<SqliteError> for Error {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Ledger(e) => e,
            other => Error::store(other),
        }
    }
}
