//! Account and Transaction records.
//!
//! Field names here are part of the on-disk contract (spec §6.3): whatever the
//! concrete [`crate::store::StoreAdapter`] persists these as, the names `_id, side,
//! bal, txs, date` (accounts) and `_id, date, chg, stat, ref1, ref2, dscr`
//! (transactions) are stable so heterogeneous workers can interoperate against the
//! same store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declarative account side. Does not constrain the sign of `balance`; it only
/// documents intent, since balance arithmetic is plain signed addition either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountSide {
    /// Debit-side account.
    Debit,
    /// Credit-side account.
    Credit,
}

impl AccountSide {
    /// The four-character tag used for the `side` field, matching the original
    /// `dbt`/`crd` encoding this crate was distilled from.
    pub fn tag(self) -> &'static str {
        match self {
            AccountSide::Debit => "dbt",
            AccountSide::Credit => "crd",
        }
    }
}

impl fmt::Display for AccountSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for AccountSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dbt" => Ok(AccountSide::Debit),
            "crd" => Ok(AccountSide::Credit),
            other => Err(format!("unknown account side tag `{other}`")),
        }
    }
}

/// An account record.
///
/// `pending` is the set of transaction ids whose balance effect has landed on
/// this account but whose Done-phase pull has not yet run (invariant I3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Opaque primary key.
    pub id: String,
    /// Declarative debit/credit label.
    pub side: AccountSide,
    /// Signed running balance.
    pub balance: i64,
    /// Transaction ids whose delta has landed but not yet been finalized.
    pub pending: BTreeSet<TxId>,
    /// Server-assigned timestamp of the last mutation, unix seconds.
    pub updated_at: u64,
}

impl Account {
    /// A freshly created account with zero balance and no pending transactions.
    pub fn new(id: impl Into<String>, side: AccountSide, updated_at: u64) -> Self {
        Account {
            id: id.into(),
            side,
            balance: 0,
            pending: BTreeSet::new(),
            updated_at,
        }
    }
}

/// Opaque globally-unique transaction identifier, assigned at Begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub Uuid);

impl TxId {
    /// Allocates a fresh, random transaction id.
    pub fn new() -> Self {
        TxId(Uuid::new_v4())
    }
}

impl Default for TxId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for TxId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TxId(Uuid::parse_str(s)?))
    }
}

/// The four forward-path transaction states, plus the two reserved cancel
/// states (spec §3, §9: `Canceling`/`Canceled` are part of the state alphabet,
/// but no code path in this crate transitions into them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxState {
    /// Inserted by Begin. No effect on any account (invariant I4). Not recovered.
    Initial,
    /// Promoted from Initial by Commit. Balance updates may be partially applied.
    Pending,
    /// All balance updates have landed. Pending-marker pulls may be partial.
    Applied,
    /// Terminal state for the forward path. No account's `pending` names this id.
    Done,
    /// Reserved; no transition into this state is implemented.
    Canceling,
    /// Reserved; no transition into this state is implemented.
    Canceled,
}

impl TxState {
    /// The four-character tag used for the `stat` field.
    pub fn tag(self) -> &'static str {
        match self {
            TxState::Initial => "init",
            TxState::Pending => "pend",
            TxState::Applied => "appl",
            TxState::Done => "done",
            TxState::Canceling => "cing",
            TxState::Canceled => "canc",
        }
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for TxState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(TxState::Initial),
            "pend" => Ok(TxState::Pending),
            "appl" => Ok(TxState::Applied),
            "done" => Ok(TxState::Done),
            "cing" => Ok(TxState::Canceling),
            "canc" => Ok(TxState::Canceled),
            other => Err(format!("unknown transaction state tag `{other}`")),
        }
    }
}

/// A transaction record.
///
/// `changes` maps account id to signed delta; positive entries are debits,
/// negative entries are credits, and the values always sum to zero
/// (invariant I1, enforced once at [`crate::validate::validate`] time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Globally unique id, assigned at Begin.
    pub id: TxId,
    /// Per-account signed deltas. Sums to exactly zero.
    pub changes: BTreeMap<String, i64>,
    /// Current state in the forward-path state machine.
    pub state: TxState,
    /// Server-assigned timestamp of the last state transition, unix seconds.
    pub updated_at: u64,
    /// Opaque caller metadata, not interpreted by the core.
    pub ref1: Option<String>,
    /// Opaque caller metadata, not interpreted by the core.
    pub ref2: Option<String>,
    /// Opaque caller metadata, not interpreted by the core.
    pub description: Option<String>,
}

impl Transaction {
    /// Sum of all entries in `changes`. Should always be zero for a transaction
    /// that passed [`crate::validate::validate`] (invariant I1).
    pub fn changes_sum(&self) -> i64 {
        self.changes.values().sum()
    }
}

/// Metadata attached to a transaction at Begin time, not interpreted by the core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxMetadata {
    /// Opaque caller reference, not interpreted by the core.
    pub ref1: Option<String>,
    /// Opaque caller reference, not interpreted by the core.
    pub ref2: Option<String>,
    /// Opaque free-text description, not interpreted by the core.
    pub description: Option<String>,
}
