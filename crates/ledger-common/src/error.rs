//! Errors
//!
//! Mirrors the error taxonomy of spec §7: validation errors are distinguishable
//! by the caller, store errors carry operation context, and guard misses are
//! never represented as errors at all (they are `Ok` results further up,
//! see `ledger-engine::engine`).

use thiserror::Error;

use crate::model::TxId;

/// Ledger error.
#[derive(Debug, Error)]
pub enum Error {
    /// Begin was called with debit and credit amounts that do not sum to the
    /// same total.
    #[error("debit and credit amounts do not balance")]
    Unbalanced,
    /// The same account id appeared on both the debit and credit side of a
    /// proposed transfer.
    #[error("account `{0}` appears on both the debit and credit side")]
    DuplicatedAccount(String),
    /// No account exists with the given id.
    #[error("account not found: `{0}`")]
    AccountNotFound(String),
    /// No transaction exists with the given id.
    #[error("transaction not found: `{0}`")]
    TransactionNotFound(TxId),
    /// An account already exists with the given id (upsert is expected to be
    /// create-if-absent; this is only raised by adapters that cannot express
    /// that atomically and must check-then-insert).
    #[error("account already exists: `{0}`")]
    DuplicateAccount(String),
    /// A transaction with this id was already inserted (Begin must allocate
    /// fresh ids; this indicates an id collision or a caller bug).
    #[error("transaction already exists: `{0}`")]
    DuplicateTransaction(TxId),
    /// The underlying store returned an error. Left in whatever state the
    /// store now holds; Recover will finish it on a later invocation if it
    /// reached Pending (spec §7).
    #[error("store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary adapter error as a [`Error::Store`].
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Store(Box::new(err))
    }
}
