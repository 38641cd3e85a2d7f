//! SQLite [`StoreAdapter`] implementation.
//!
//! Modeled on `cdk-sqlite`, simplified: rather than that crate's pipelined
//! async actor (`cdk-sqlite::mint::async_rusqlite`) or its generic
//! `cdk-sql-common::pool::Pool<RM>`, each call here borrows a connection from
//! a small blocking [`pool::Pool`] and runs its body inside
//! `tokio::task::spawn_blocking`, with every write wrapped in a single
//! `BEGIN IMMEDIATE` transaction (spec §5: "each primitive as a single SQLite
//! statement executed against a connection under `BEGIN IMMEDIATE`"). That
//! scope reduction is recorded in this repository's design notes.

mod error;
mod pool;
mod schema;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use ledger_common::error::Error;
use ledger_common::model::{Account, AccountSide, Transaction, TxId, TxState};
use ledger_common::store::StoreAdapter;
use ledger_common::util::unix_time;
use rusqlite::{params, Connection, OptionalExtension};

pub use error::SqliteError;
pub use pool::{Location, Pool};

/// A SQLite-backed store adapter.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Arc<Pool>,
}

impl SqliteStore {
    /// Opens (creating if necessary) a SQLite database at `path`, running
    /// schema migrations before returning.
    pub async fn new(path: impl AsRef<Path>, max_connections: usize) -> Result<Self, SqliteError> {
        let pool = Pool::new(Location::Path(path.as_ref().to_path_buf()), max_connections);
        migrate(&pool).await?;
        Ok(SqliteStore { pool })
    }

    /// Opens a private, in-memory database. Intended for tests and the
    /// conformance suite, analogous to `cdk_sqlite::mint::memory::empty()`.
    /// Connections are not shared with any other [`SqliteStore`], and because a
    /// fresh `:memory:` connection is a fresh empty database, this pool is
    /// capped at one connection.
    pub async fn in_memory() -> Result<Self, SqliteError> {
        let pool = Pool::new(Location::Memory, 1);
        migrate(&pool).await?;
        Ok(SqliteStore { pool })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, SqliteError>
    where
        F: FnOnce(&Connection) -> Result<T, SqliteError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await?
    }
}

/// Runs `body` inside a `BEGIN IMMEDIATE` transaction, committing on success
/// and rolling back on failure so a connection is never handed back to the
/// pool mid-transaction.
fn in_immediate_transaction<T>(
    conn: &Connection,
    body: impl FnOnce(&Connection) -> Result<T, SqliteError>,
) -> Result<T, SqliteError> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    match body(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(err) => {
            conn.execute_batch("ROLLBACK").ok();
            Err(err)
        }
    }
}

async fn migrate(pool: &Arc<Pool>) -> Result<(), SqliteError> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok::<_, SqliteError>(())
    })
    .await??;
    Ok(())
}

fn row_to_account(
    id: String,
    side: String,
    bal: i64,
    txs: String,
    date: i64,
) -> Result<Account, SqliteError> {
    let pending_ids: Vec<String> = serde_json::from_str(&txs)?;
    let pending = pending_ids
        .into_iter()
        .map(|s| TxId::from_str(&s).map_err(|_| SqliteError::Migration(format!("malformed tx id `{s}`"))))
        .collect::<Result<BTreeSet<TxId>, SqliteError>>()?;
    Ok(Account {
        id,
        side: AccountSide::from_str(&side)
            .map_err(|_| SqliteError::Migration(format!("malformed account side `{side}`")))?,
        balance: bal,
        pending,
        updated_at: date as u64,
    })
}

fn row_to_transaction(
    id: String,
    date: i64,
    chg: String,
    stat: String,
    ref1: Option<String>,
    ref2: Option<String>,
    dscr: Option<String>,
) -> Result<Transaction, SqliteError> {
    let changes: BTreeMap<String, i64> = serde_json::from_str(&chg)?;
    Ok(Transaction {
        id: TxId::from_str(&id)
            .map_err(|_| SqliteError::Migration(format!("malformed tx id `{id}`")))?,
        changes,
        state: TxState::from_str(&stat)
            .map_err(|_| SqliteError::Migration(format!("malformed tx state `{stat}`")))?,
        updated_at: date as u64,
        ref1,
        ref2,
        description: dscr,
    })
}

#[async_trait]
impl StoreAdapter for SqliteStore {
    type Err = SqliteError;

    async fn upsert_account(&self, id: &str, side: AccountSide) -> Result<(), Self::Err> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                r#"INSERT INTO accounts ("_id", side, bal, txs, date) VALUES (?1, ?2, 0, '[]', ?3)
                   ON CONFLICT("_id") DO NOTHING"#,
                params![id, side.tag(), unix_time() as i64],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_tx(
        &self,
        id: TxId,
        changes: BTreeMap<String, i64>,
        ref1: Option<String>,
        ref2: Option<String>,
        description: Option<String>,
    ) -> Result<(), Self::Err> {
        let chg = serde_json::to_string(&changes)?;
        let id_str = id.to_string();
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                r#"INSERT INTO transactions ("_id", date, chg, stat, ref1, ref2, dscr)
                   VALUES (?1, ?2, ?3, 'init', ?4, ?5, ?6)
                   ON CONFLICT("_id") DO NOTHING"#,
                params![id_str, unix_time() as i64, chg, ref1, ref2, description],
            )?;
            if inserted == 0 {
                return Err(SqliteError::Ledger(Error::DuplicateTransaction(id)));
            }
            Ok(())
        })
        .await
    }

    async fn find_and_promote_tx(&self) -> Result<Option<Transaction>, Self::Err> {
        self.with_conn(move |conn| {
            in_immediate_transaction(conn, |conn| {
                let found = conn
                    .query_row(
                        r#"SELECT "_id", date, chg, stat, ref1, ref2, dscr FROM transactions
                           WHERE stat = 'init' LIMIT 1"#,
                        [],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, i64>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, String>(3)?,
                                row.get::<_, Option<String>>(4)?,
                                row.get::<_, Option<String>>(5)?,
                                row.get::<_, Option<String>>(6)?,
                            ))
                        },
                    )
                    .optional()?;
                let Some((id, _date, chg, _stat, ref1, ref2, dscr)) = found else {
                    return Ok(None);
                };
                let now = unix_time() as i64;
                conn.execute(
                    r#"UPDATE transactions SET stat = 'pend', date = ?2 WHERE "_id" = ?1"#,
                    params![id, now],
                )?;
                Ok(Some(row_to_transaction(
                    id,
                    now,
                    chg,
                    "pend".to_string(),
                    ref1,
                    ref2,
                    dscr,
                )?))
            })
        })
        .await
    }

    async fn apply_account_delta(
        &self,
        account_id: &str,
        tx_id: TxId,
        delta: i64,
    ) -> Result<(), Self::Err> {
        let account_id = account_id.to_string();
        self.with_conn(move |conn| {
            in_immediate_transaction(conn, |conn| {
                let txs: Option<String> = conn
                    .query_row(
                        r#"SELECT txs FROM accounts WHERE "_id" = ?1"#,
                        params![account_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(txs) = txs else {
                    return Ok(());
                };
                let mut pending: Vec<String> = serde_json::from_str(&txs)?;
                let tx_str = tx_id.to_string();
                if !pending.contains(&tx_str) {
                    pending.push(tx_str);
                    let pending_json = serde_json::to_string(&pending)?;
                    conn.execute(
                        r#"UPDATE accounts SET bal = bal + ?2, txs = ?3, date = ?4 WHERE "_id" = ?1"#,
                        params![account_id, delta, pending_json, unix_time() as i64],
                    )?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn clear_account_pending(&self, account_id: &str, tx_id: TxId) -> Result<(), Self::Err> {
        let account_id = account_id.to_string();
        self.with_conn(move |conn| {
            in_immediate_transaction(conn, |conn| {
                let txs: Option<String> = conn
                    .query_row(
                        r#"SELECT txs FROM accounts WHERE "_id" = ?1"#,
                        params![account_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(txs) = txs else {
                    return Ok(());
                };
                let mut pending: Vec<String> = serde_json::from_str(&txs)?;
                let tx_str = tx_id.to_string();
                let before = pending.len();
                pending.retain(|t| t != &tx_str);
                if pending.len() != before {
                    let pending_json = serde_json::to_string(&pending)?;
                    conn.execute(
                        r#"UPDATE accounts SET txs = ?2, date = ?3 WHERE "_id" = ?1"#,
                        params![account_id, pending_json, unix_time() as i64],
                    )?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn transition_tx_state(
        &self,
        tx_id: TxId,
        expected: TxState,
        next: TxState,
    ) -> Result<bool, Self::Err> {
        let id_str = tx_id.to_string();
        self.with_conn(move |conn| {
            let advanced = conn.execute(
                r#"UPDATE transactions SET stat = ?2, date = ?3 WHERE "_id" = ?1 AND stat = ?4"#,
                params![id_str, next.tag(), unix_time() as i64, expected.tag()],
            )?;
            Ok(advanced == 1)
        })
        .await
    }

    async fn find_tx(&self, tx_id: TxId) -> Result<Option<Transaction>, Self::Err> {
        let id_str = tx_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                r#"SELECT "_id", date, chg, stat, ref1, ref2, dscr FROM transactions WHERE "_id" = ?1"#,
                params![id_str],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?
            .map(|(id, date, chg, stat, ref1, ref2, dscr)| {
                row_to_transaction(id, date, chg, stat, ref1, ref2, dscr)
            })
            .transpose()
        })
        .await
    }

    async fn find_account(&self, id: &str) -> Result<Option<Account>, Self::Err> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                r#"SELECT "_id", side, bal, txs, date FROM accounts WHERE "_id" = ?1"#,
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?
            .map(|(id, side, bal, txs, date)| row_to_account(id, side, bal, txs, date))
            .transpose()
        })
        .await
    }

    async fn find_stale_tx(
        &self,
        state: TxState,
        older_than_unix_secs: u64,
    ) -> Result<Option<Transaction>, Self::Err> {
        let tag = state.tag();
        self.with_conn(move |conn| {
            conn.query_row(
                r#"SELECT "_id", date, chg, stat, ref1, ref2, dscr FROM transactions
                   WHERE stat = ?1 AND date < ?2 LIMIT 1"#,
                params![tag, older_than_unix_secs as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?
            .map(|(id, date, chg, stat, ref1, ref2, dscr)| {
                row_to_transaction(id, date, chg, stat, ref1, ref2, dscr)
            })
            .transpose()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_account_is_create_if_absent() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_account("A0001", AccountSide::Debit).await.unwrap();
        store.upsert_account("A0001", AccountSide::Credit).await.unwrap();
        let account = store.find_account("A0001").await.unwrap().unwrap();
        assert_eq!(account.side, AccountSide::Debit);
    }

    #[tokio::test]
    async fn insert_tx_rejects_duplicate_id() {
        let store = SqliteStore::in_memory().await.unwrap();
        let id = TxId::new();
        store
            .insert_tx(id, BTreeMap::new(), None, None, None)
            .await
            .unwrap();
        let err = store
            .insert_tx(id, BTreeMap::new(), None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SqliteError::Ledger(Error::DuplicateTransaction(_))));
    }
}

#[cfg(test)]
mod conformance {
    use super::*;

    async fn provide_store() -> SqliteStore {
        SqliteStore::in_memory().await.unwrap()
    }

    ledger_common::ledger_store_conformance!(provide_store);
}
