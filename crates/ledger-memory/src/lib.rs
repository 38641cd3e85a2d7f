//! In-memory [`StoreAdapter`] implementation, mainly for testing and for
//! exercising the commit engine without a real document store.
//!
//! Modeled on `cdk::cdk_database::mint_memory::MintMemoryDatabase`: plain
//! `HashMap`s behind `tokio::sync::RwLock`, so the "atomic" primitives are
//! exact rather than merely store-level-atomic, useful as ground truth for
//! the conformance suite before trusting a real backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use ledger_common::error::Error;
use ledger_common::model::{Account, AccountSide, Transaction, TxId, TxState};
use ledger_common::store::StoreAdapter;
use ledger_common::util::unix_time;
use thiserror::Error as ThisError;
use tokio::sync::RwLock;

/// Error type for [`MemoryStore`]. The in-memory backend never fails for
/// reasons of its own; it only ever surfaces the shared [`Error`] taxonomy
/// (e.g. [`Error::DuplicateTransaction`] on an id collision at Begin).
#[derive(Debug, ThisError)]
#[error(transparent)]
pub struct MemoryError(#[from] Error);

impl From<MemoryError> for Error {
    fn from(e: MemoryError) -> Self {
        e.0
    }
}

/// An in-memory store adapter backing [`ledger_common::StoreAdapter`].
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    transactions: Arc<RwLock<HashMap<TxId, Transaction>>>,
}

impl MemoryStore {
    /// Creates a fresh, empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "test")]
impl MemoryStore {
    /// Inserts `account` as-is, bypassing `upsert_account`'s create-if-absent
    /// semantics. For crash-recovery test fixtures that need a specific
    /// balance, pending set and timestamp already in place, as if a prior
    /// Apply had landed before the process died.
    pub async fn seed_account(&self, account: Account) {
        self.accounts.write().await.insert(account.id.clone(), account);
    }

    /// Inserts `tx` as-is, bypassing `insert_tx`'s `Initial`-only semantics.
    /// For crash-recovery test fixtures that need a transaction already
    /// sitting in `Pending`/`Applied` with a backdated `updated_at`.
    pub async fn seed_tx(&self, tx: Transaction) {
        self.transactions.write().await.insert(tx.id, tx);
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    type Err = MemoryError;

    async fn upsert_account(&self, id: &str, side: AccountSide) -> Result<(), Self::Err> {
        let mut accounts = self.accounts.write().await;
        accounts
            .entry(id.to_string())
            .or_insert_with(|| Account::new(id, side, unix_time()));
        Ok(())
    }

    async fn insert_tx(
        &self,
        id: TxId,
        changes: BTreeMap<String, i64>,
        ref1: Option<String>,
        ref2: Option<String>,
        description: Option<String>,
    ) -> Result<(), Self::Err> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&id) {
            return Err(Error::DuplicateTransaction(id).into());
        }
        transactions.insert(
            id,
            Transaction {
                id,
                changes,
                state: TxState::Initial,
                updated_at: unix_time(),
                ref1,
                ref2,
                description,
            },
        );
        Ok(())
    }

    async fn find_and_promote_tx(&self) -> Result<Option<Transaction>, Self::Err> {
        let mut transactions = self.transactions.write().await;
        let Some(tx) = transactions
            .values_mut()
            .find(|tx| tx.state == TxState::Initial)
        else {
            return Ok(None);
        };
        tx.state = TxState::Pending;
        tx.updated_at = unix_time();
        Ok(Some(tx.clone()))
    }

    async fn apply_account_delta(
        &self,
        account_id: &str,
        tx_id: TxId,
        delta: i64,
    ) -> Result<(), Self::Err> {
        let mut accounts = self.accounts.write().await;
        if let Some(account) = accounts.get_mut(account_id) {
            if !account.pending.contains(&tx_id) {
                account.balance += delta;
                account.pending.insert(tx_id);
                account.updated_at = unix_time();
            }
        }
        Ok(())
    }

    async fn clear_account_pending(&self, account_id: &str, tx_id: TxId) -> Result<(), Self::Err> {
        let mut accounts = self.accounts.write().await;
        if let Some(account) = accounts.get_mut(account_id) {
            if account.pending.remove(&tx_id) {
                account.updated_at = unix_time();
            }
        }
        Ok(())
    }

    async fn transition_tx_state(
        &self,
        tx_id: TxId,
        expected: TxState,
        next: TxState,
    ) -> Result<bool, Self::Err> {
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(&tx_id) {
            Some(tx) if tx.state == expected => {
                tx.state = next;
                tx.updated_at = unix_time();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_tx(&self, tx_id: TxId) -> Result<Option<Transaction>, Self::Err> {
        Ok(self.transactions.read().await.get(&tx_id).cloned())
    }

    async fn find_account(&self, id: &str) -> Result<Option<Account>, Self::Err> {
        Ok(self.accounts.read().await.get(id).cloned())
    }

    async fn find_stale_tx(
        &self,
        state: TxState,
        older_than_unix_secs: u64,
    ) -> Result<Option<Transaction>, Self::Err> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .find(|tx| tx.state == state && tx.updated_at < older_than_unix_secs)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_account_is_create_if_absent() {
        let store = MemoryStore::new();
        store.upsert_account("A0001", AccountSide::Debit).await.unwrap();
        store.upsert_account("A0001", AccountSide::Credit).await.unwrap();
        let account = store.find_account("A0001").await.unwrap().unwrap();
        assert_eq!(account.side, AccountSide::Debit);
    }

    #[tokio::test]
    async fn insert_tx_rejects_duplicate_id() {
        let store = MemoryStore::new();
        let id = TxId::new();
        store
            .insert_tx(id, BTreeMap::new(), None, None, None)
            .await
            .unwrap();
        let err = store
            .insert_tx(id, BTreeMap::new(), None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(Error::from(err), Error::DuplicateTransaction(_)));
    }
}

#[cfg(test)]
mod conformance {
    use super::*;

    async fn provide_store() -> MemoryStore {
        MemoryStore::new()
    }

    ledger_common::ledger_store_conformance!(provide_store);
}
