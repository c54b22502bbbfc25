//! Append-only, hash-linked ledger of proof-of-work blocks persisted in a
//! local key-value store.
//!
//! - [`blockchain`]: blocks, mining, the chain store, backward traversal
//! - [`transaction`]: transactions, their binary codec and the UTXO scan
//! - [`api`]: JSON-over-HTTP surface used by `block serve`

pub mod api;
pub mod blockchain;
pub mod codec;
pub mod config;
pub mod error;
pub mod transaction;

pub use error::{ChainError, Result};
