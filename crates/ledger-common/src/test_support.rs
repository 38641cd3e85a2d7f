//! Shared conformance suite for [`crate::store::StoreAdapter`] implementations.
//!
//! This is the generic test set every backend (`ledger-memory`, `ledger-sqlite`)
//! is expected to pass; it exercises the end-to-end scenarios and invariants of
//! spec §8 directly against the store primitives, without going through the
//! commit engine, so that engine bugs and adapter bugs fail independently.
//!
//! Modeled on `cdk_common::database::mint::test` and its `mint_db_test!` macro:
//! each scenario is a plain async fn generic over `S: StoreAdapter`, and
//! [`ledger_store_conformance`] wires them up as `#[tokio::test]`s for a given
//! backend's constructor.
#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;

use crate::model::{AccountSide, TxId, TxState};
use crate::store::StoreAdapter;
use crate::validate::validate;

fn amounts(pairs: &[(&str, u64)]) -> BTreeMap<String, u64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

async fn drive_to_done<S: StoreAdapter>(store: &S, id: TxId, changes: &BTreeMap<String, i64>) {
    assert!(store
        .transition_tx_state(id, TxState::Pending, TxState::Applied)
        .await
        .is_ok());
    for acct in changes.keys() {
        store.clear_account_pending(acct, id).await.unwrap();
    }
}

/// Scenario 1 (spec §8): cash-in end to end through the raw store primitives.
pub async fn cash_in<S: StoreAdapter>(store: S) {
    store
        .upsert_account("A0001", AccountSide::Debit)
        .await
        .unwrap();
    store
        .upsert_account("A0002", AccountSide::Debit)
        .await
        .unwrap();
    store
        .upsert_account("L0001", AccountSide::Credit)
        .await
        .unwrap();

    let debit = amounts(&[("A0001", 2000), ("A0002", 20)]);
    let credit = amounts(&[("L0001", 2020)]);
    let changes = validate(&debit, &credit).unwrap();

    let id = TxId::new();
    store
        .insert_tx(id, changes.clone(), None, None, Some("CIN".to_string()))
        .await
        .unwrap();

    let promoted = store.find_and_promote_tx().await.unwrap().unwrap();
    assert_eq!(promoted.id, id);
    assert_eq!(promoted.state, TxState::Pending);

    for (acct, delta) in &promoted.changes {
        store.apply_account_delta(acct, id, *delta).await.unwrap();
    }
    drive_to_done(&store, id, &changes).await;
    assert!(store
        .transition_tx_state(id, TxState::Applied, TxState::Done)
        .await
        .unwrap());

    let a1 = store.find_account("A0001").await.unwrap().unwrap();
    let a2 = store.find_account("A0002").await.unwrap().unwrap();
    let l1 = store.find_account("L0001").await.unwrap().unwrap();
    assert_eq!(a1.balance, 2000);
    assert_eq!(a2.balance, 20);
    assert_eq!(l1.balance, -2020);
    assert!(a1.pending.is_empty());
    assert!(a2.pending.is_empty());
    assert!(l1.pending.is_empty());

    let tx = store.find_tx(id).await.unwrap().unwrap();
    assert_eq!(tx.state, TxState::Done);
}

/// Idempotence (spec §8): replaying the Apply phase on an already-applied
/// account must not land the delta twice.
pub async fn apply_phase_is_idempotent<S: StoreAdapter>(store: S) {
    store
        .upsert_account("A0001", AccountSide::Debit)
        .await
        .unwrap();
    store
        .upsert_account("L0001", AccountSide::Credit)
        .await
        .unwrap();

    let changes = validate(&amounts(&[("A0001", 100)]), &amounts(&[("L0001", 100)])).unwrap();
    let id = TxId::new();
    store
        .insert_tx(id, changes.clone(), None, None, None)
        .await
        .unwrap();
    store.find_and_promote_tx().await.unwrap();

    for _ in 0..3 {
        for (acct, delta) in &changes {
            store.apply_account_delta(acct, id, *delta).await.unwrap();
        }
    }

    let a1 = store.find_account("A0001").await.unwrap().unwrap();
    let l1 = store.find_account("L0001").await.unwrap().unwrap();
    assert_eq!(a1.balance, 100);
    assert_eq!(l1.balance, -100);
    assert_eq!(a1.pending.len(), 1);
    assert_eq!(l1.pending.len(), 1);
}

/// Idempotence (spec §8): replaying the MarkDone phase after markers are
/// already cleared must not error or double-clear anything observable.
pub async fn mark_done_phase_is_idempotent<S: StoreAdapter>(store: S) {
    store
        .upsert_account("A0001", AccountSide::Debit)
        .await
        .unwrap();
    store
        .upsert_account("L0001", AccountSide::Credit)
        .await
        .unwrap();

    let changes = validate(&amounts(&[("A0001", 50)]), &amounts(&[("L0001", 50)])).unwrap();
    let id = TxId::new();
    store
        .insert_tx(id, changes.clone(), None, None, None)
        .await
        .unwrap();
    store.find_and_promote_tx().await.unwrap();
    for (acct, delta) in &changes {
        store.apply_account_delta(acct, id, *delta).await.unwrap();
    }
    store
        .transition_tx_state(id, TxState::Pending, TxState::Applied)
        .await
        .unwrap();

    for _ in 0..3 {
        for acct in changes.keys() {
            store.clear_account_pending(acct, id).await.unwrap();
        }
    }

    let a1 = store.find_account("A0001").await.unwrap().unwrap();
    assert!(a1.pending.is_empty());
    assert_eq!(a1.balance, 50);
}

/// A guard miss on `transition_tx_state` must be reported as `Ok(false)`, not
/// an error (spec §7, "guard misses are not errors").
pub async fn guard_miss_is_not_an_error<S: StoreAdapter>(store: S) {
    store
        .upsert_account("A0001", AccountSide::Debit)
        .await
        .unwrap();
    store
        .upsert_account("L0001", AccountSide::Credit)
        .await
        .unwrap();
    let changes = validate(&amounts(&[("A0001", 1)]), &amounts(&[("L0001", 1)])).unwrap();
    let id = TxId::new();
    store.insert_tx(id, changes, None, None, None).await.unwrap();

    // Still Initial: promoting Pending->Applied must be a guard miss, not an error.
    let matched = store
        .transition_tx_state(id, TxState::Pending, TxState::Applied)
        .await
        .unwrap();
    assert!(!matched);

    let tx = store.find_tx(id).await.unwrap().unwrap();
    assert_eq!(tx.state, TxState::Initial);
}

/// `find_and_promote_tx` with nothing in `Initial` state succeeds with `None`
/// rather than erroring (spec §4.2.2, "If no document matched, return success").
pub async fn promote_with_nothing_pending_is_ok<S: StoreAdapter>(store: S) {
    let promoted = store.find_and_promote_tx().await.unwrap();
    assert!(promoted.is_none());
}

/// Exports a `#[tokio::test]` for each scenario in this module, against a given
/// backend constructor `$make:expr -> impl Future<Output = S>`.
#[macro_export]
macro_rules! ledger_store_conformance {
    ($make_store_fn:ident) => {
        $crate::ledger_store_conformance!(cash_in, $make_store_fn);
        $crate::ledger_store_conformance!(apply_phase_is_idempotent, $make_store_fn);
        $crate::ledger_store_conformance!(mark_done_phase_is_idempotent, $make_store_fn);
        $crate::ledger_store_conformance!(guard_miss_is_not_an_error, $make_store_fn);
        $crate::ledger_store_conformance!(promote_with_nothing_pending_is_ok, $make_store_fn);
    };
    ($name:ident, $make_store_fn:ident) => {
        #[tokio::test]
        async fn $name() {
            $crate::test_support::$name($make_store_fn().await).await;
        }
    };
}
