//! The store contract (spec §6.1): the minimal set of atomic primitives the
//! commit engine needs from an underlying document store.
//!
//! Implementors hide the store's query dialect entirely: the engine never
//! sees a query language, only these calls. Each mutating primitive is
//! expected to advance the touched document's server-assigned timestamp.

use async_trait::async_trait;

use crate::error::Error;
use crate::model::{Account, AccountSide, Transaction, TxId, TxState};

/// The five atomic primitives of spec §6.1, expressed as concrete Rust calls
/// rather than a generic predicate/update object, so that a given adapter can
/// keep its query dialect entirely internal.
///
/// Guard misses (a conditional update that matched nothing) are reported as
/// `Ok(false)` / `Ok(None)`, never as `Err`. Per spec §7, they mean another
/// worker already advanced the document, not that anything failed.
#[async_trait]
pub trait StoreAdapter: std::fmt::Debug + Send + Sync {
    /// The adapter's own error type. Must be convertible to and from the
    /// shared [`Error`], mirroring `cdk_common::database::mint::Database`'s
    /// `Self::Err: Into<Error> + From<Error>` convention.
    type Err: Into<Error> + From<Error> + std::error::Error + Send + Sync + 'static;

    /// Create an account if absent; no-op if one with this id already exists.
    async fn upsert_account(&self, id: &str, side: AccountSide) -> Result<(), Self::Err>;

    /// Insert a freshly allocated transaction in `Initial` state. Errors if
    /// `tx.id` already exists (ids are assigned fresh by Begin).
    async fn insert_tx(
        &self,
        id: TxId,
        changes: std::collections::BTreeMap<String, i64>,
        ref1: Option<String>,
        ref2: Option<String>,
        description: Option<String>,
    ) -> Result<(), Self::Err>;

    /// Atomically find one transaction with `state == Initial`, set
    /// `state = Pending`, and return the post-image. Returns `Ok(None)` if no
    /// transaction matched, which is not an error (spec §4.2.2).
    async fn find_and_promote_tx(&self) -> Result<Option<Transaction>, Self::Err>;

    /// Apply phase per-account step (spec §4.2.3): if `account_id` does not
    /// already have `tx_id` in its pending set, add `delta` to its balance and
    /// `tx_id` to its pending set, atomically. A no-op (not an error) if the
    /// predicate does not match; this is what makes replay idempotent.
    async fn apply_account_delta(
        &self,
        account_id: &str,
        tx_id: TxId,
        delta: i64,
    ) -> Result<(), Self::Err>;

    /// MarkDone phase per-account step (spec §4.2.4): if `account_id` has
    /// `tx_id` in its pending set, remove it, atomically. A no-op (not an
    /// error) if the predicate does not match.
    async fn clear_account_pending(&self, account_id: &str, tx_id: TxId) -> Result<(), Self::Err>;

    /// Guarded compare-and-set on a transaction's state: succeeds only if the
    /// transaction's current state is exactly `expected`. Returns whether the
    /// predicate matched; a non-match is a guard miss, not an error.
    async fn transition_tx_state(
        &self,
        tx_id: TxId,
        expected: TxState,
        next: TxState,
    ) -> Result<bool, Self::Err>;

    /// Read one transaction by id.
    async fn find_tx(&self, tx_id: TxId) -> Result<Option<Transaction>, Self::Err>;

    /// Read one account by id.
    async fn find_account(&self, id: &str) -> Result<Option<Account>, Self::Err>;

    /// Find one transaction in `state` whose `updated_at` is older than
    /// `older_than_unix_secs`, for Recover to pick up (spec §4.3). Which
    /// transaction is returned when several qualify is unspecified.
    async fn find_stale_tx(
        &self,
        state: TxState,
        older_than_unix_secs: u64,
    ) -> Result<Option<Transaction>, Self::Err>;
}
