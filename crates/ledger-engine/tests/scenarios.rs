//! End-to-end scenarios against `Ledger<MemoryStore>`, matching the six
//! worked examples a StoreAdapter implementer is expected to satisfy.

use std::collections::BTreeMap;
use std::sync::Arc;

use ledger_common::util::unix_time;
use ledger_engine::{AccountSide, Error, Ledger, RecoverConfig, Transaction, TxId, TxMetadata, TxState};
use ledger_memory::MemoryStore;

fn amounts(pairs: &[(&str, u64)]) -> BTreeMap<String, u64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn signed(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

async fn new_ledger() -> (Ledger<MemoryStore>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (Ledger::new(store.clone()), store)
}

#[tokio::test]
async fn scenario_1_cash_in() {
    let (ledger, _store) = new_ledger().await;
    ledger.create_account("A0001", AccountSide::Debit).await.unwrap();
    ledger.create_account("A0002", AccountSide::Debit).await.unwrap();
    ledger.create_account("L0001", AccountSide::Credit).await.unwrap();

    let id = ledger
        .begin_transaction(
            &amounts(&[("A0001", 2000), ("A0002", 20)]),
            &amounts(&[("L0001", 2020)]),
            TxMetadata::default(),
        )
        .await
        .unwrap();
    ledger.commit_transaction().await.unwrap();

    assert_eq!(ledger.read_balance("A0001").await.unwrap(), 2000);
    assert_eq!(ledger.read_balance("A0002").await.unwrap(), 20);
    assert_eq!(ledger.read_balance("L0001").await.unwrap(), -2020);
    for acct in ["A0001", "A0002", "L0001"] {
        assert!(ledger.read_account(acct).await.unwrap().pending.is_empty());
    }
    assert_eq!(ledger.read_transaction(id).await.unwrap().state, TxState::Done);
}

#[tokio::test]
async fn scenario_2_unbalanced_rejection() {
    let (ledger, _store) = new_ledger().await;
    ledger.create_account("A0001", AccountSide::Debit).await.unwrap();
    ledger.create_account("A0002", AccountSide::Debit).await.unwrap();
    ledger.create_account("L0001", AccountSide::Credit).await.unwrap();

    let err = ledger
        .begin_transaction(
            &amounts(&[("A0001", 2000), ("A0002", 20)]),
            &amounts(&[("L0001", 2000)]),
            TxMetadata::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unbalanced));

    assert_eq!(ledger.read_balance("A0001").await.unwrap(), 0);
    assert_eq!(ledger.read_balance("A0002").await.unwrap(), 0);
    assert_eq!(ledger.read_balance("L0001").await.unwrap(), 0);
}

#[tokio::test]
async fn scenario_3_duplicated_account_rejection() {
    let (ledger, _store) = new_ledger().await;
    ledger.create_account("A0001", AccountSide::Debit).await.unwrap();

    let err = ledger
        .begin_transaction(&amounts(&[("A0001", 5)]), &amounts(&[("A0001", 5)]), TxMetadata::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicatedAccount(id) if id == "A0001"));
}

#[tokio::test]
async fn scenario_4_crash_in_pending_recovery() {
    let (ledger, store) = new_ledger().await;
    for (id, side) in [
        ("A0001", AccountSide::Debit),
        ("A0002", AccountSide::Debit),
        ("L0001", AccountSide::Credit),
    ] {
        ledger.create_account(id, side).await.unwrap();
    }

    let t = TxId::new();
    let changes = signed(&[("A0001", 50), ("A0002", 50), ("L0001", -100)]);
    store
        .seed_tx(Transaction {
            id: t,
            changes: changes.clone(),
            state: TxState::Pending,
            updated_at: unix_time().saturating_sub(60),
            ref1: None,
            ref2: None,
            description: None,
        })
        .await;

    let config = RecoverConfig::default();
    ledger.recover(&config).await.unwrap();
    ledger.recover(&config).await.unwrap();

    assert_eq!(ledger.read_balance("A0001").await.unwrap(), 50);
    assert_eq!(ledger.read_balance("A0002").await.unwrap(), 50);
    assert_eq!(ledger.read_balance("L0001").await.unwrap(), -100);
    for acct in ["A0001", "A0002", "L0001"] {
        assert!(ledger.read_account(acct).await.unwrap().pending.is_empty());
    }
    assert_eq!(ledger.read_transaction(t).await.unwrap().state, TxState::Done);
}

#[tokio::test]
async fn scenario_5_crash_in_applied_recovery() {
    let (ledger, store) = new_ledger().await;
    ledger.create_account("A0002", AccountSide::Debit).await.unwrap();
    ledger.create_account("L0001", AccountSide::Credit).await.unwrap();
    ledger.create_account("L0002", AccountSide::Credit).await.unwrap();

    let t2 = TxId::new();
    let backdated = unix_time().saturating_sub(60);
    let changes = signed(&[("A0002", 100), ("L0001", -20), ("L0002", -80)]);

    // Pre-populate balances and pending markers as if Apply had already run.
    for (id, delta) in &changes {
        let mut account = ledger.read_account(id).await.unwrap();
        account.balance += delta;
        account.pending.insert(t2);
        account.updated_at = backdated;
        store.seed_account(account).await;
    }
    store
        .seed_tx(Transaction {
            id: t2,
            changes: changes.clone(),
            state: TxState::Applied,
            updated_at: backdated,
            ref1: None,
            ref2: None,
            description: None,
        })
        .await;

    ledger.recover(&RecoverConfig::default()).await.unwrap();

    assert_eq!(ledger.read_transaction(t2).await.unwrap().state, TxState::Done);
    assert_eq!(ledger.read_balance("A0002").await.unwrap(), 100);
    assert_eq!(ledger.read_balance("L0001").await.unwrap(), -20);
    assert_eq!(ledger.read_balance("L0002").await.unwrap(), -80);
    for acct in ["A0002", "L0001", "L0002"] {
        assert!(ledger.read_account(acct).await.unwrap().pending.is_empty());
    }
}

#[tokio::test]
async fn scenario_6_concurrent_commit_and_recover() {
    let (ledger, _store) = new_ledger().await;
    ledger.create_account("A0001", AccountSide::Debit).await.unwrap();
    ledger.create_account("L0001", AccountSide::Credit).await.unwrap();

    let id = ledger
        .begin_transaction(
            &amounts(&[("A0001", 10)]),
            &amounts(&[("L0001", 10)]),
            TxMetadata::default(),
        )
        .await
        .unwrap();

    let committer = ledger.clone();
    let recoverer = ledger.clone();
    let commit_handle = tokio::spawn(async move { committer.commit_transaction().await });
    let recover_handle =
        tokio::spawn(async move { recoverer.recover(&RecoverConfig::immediate()).await });

    commit_handle.await.unwrap().unwrap();
    recover_handle.await.unwrap().unwrap();

    assert_eq!(ledger.read_transaction(id).await.unwrap().state, TxState::Done);
    assert_eq!(ledger.read_balance("A0001").await.unwrap(), 10);
    assert_eq!(ledger.read_balance("L0001").await.unwrap(), -10);
    assert!(ledger.read_account("A0001").await.unwrap().pending.is_empty());
    assert!(ledger.read_account("L0001").await.unwrap().pending.is_empty());
}
