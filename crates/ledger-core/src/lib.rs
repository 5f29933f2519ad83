//! ledger-core - Core library for LedgerLite
//!
//! This crate contains the record models, the authenticated host bridge
//! (channel + correlated RPC), the idempotent send pipeline, and the
//! append-only change log shared by every LedgerLite front end.

pub mod audit;
pub mod bridge;
pub mod config;
pub mod error;
pub mod models;
pub mod records;
pub mod send;
pub mod store;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
pub use models::{Record, RecordId};
