//! Shared types, traits and errors for atomic multi-account ledger transfers.
//!
//! This crate defines the domain the rest of the workspace builds on:
//!
//! - [`model`]: the `Account` and `Transaction` records and their on-disk field
//!   names.
//! - [`validate`]: pure validation of a proposed double-entry transfer.
//! - [`store`]: the [`store::StoreAdapter`] trait, the five atomic primitives a
//!   document store must expose for the commit engine to be built on top of it.
//! - [`error`]: the error taxonomy shared by every crate in the workspace.
//!
//! It intentionally does not depend on any concrete store backend; see
//! `ledger-memory` and `ledger-sqlite` for implementations of [`store::StoreAdapter`],
//! and `ledger-engine` for the commit engine and façade built against the trait.

pub mod error;
pub mod model;
pub mod store;
pub mod util;
pub mod validate;

#[cfg(feature = "test")]
pub mod test_support;

pub use error::Error;
pub use model::{Account, AccountSide, Transaction, TxId, TxState};
pub use store::StoreAdapter;
pub use validate::validate;
