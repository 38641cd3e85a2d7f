//! The commit engine and caller-facing façade for atomic multi-account ledger
//! transfers (spec §2 "Commit Engine" and the thin "API façade" that sequences
//! it).
//!
//! [`Ledger`] is generic over any [`ledger_common::StoreAdapter`] and holds it
//! behind an `Arc`, threaded explicitly rather than through a process-wide
//! global handle (spec §9, "Global connection handle" design note), the same
//! shape as `cdk::mint::Mint` holding `Arc<dyn MintDatabase>`.

mod engine;
mod recover;

pub use engine::Ledger;
pub use ledger_common::error::Error;
pub use ledger_common::model::{Account, AccountSide, Transaction, TxId, TxMetadata, TxState};
pub use recover::{RecoverConfig, RecoverOutcome};
