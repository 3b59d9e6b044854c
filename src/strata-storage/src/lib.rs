//! Persistent account storage for the contract runtime.
//!
//! Accounts map named domains to ordered maps of stored values. Two on-disk
//! layouts coexist: the legacy layout keeps one ledger register per
//! `(address, domain)`, the current layout keeps a single `"stored"`
//! register per address pointing at an account map. The [`AccountStorage`]
//! façade detects the layout per access, defers contract updates until
//! commit, migrates scheduled accounts to the current layout, and flushes
//! everything through the slab store in one deterministic pass.

pub mod error;
pub mod storage;

pub use storage::{AccountStorage, ContractLocation, StorageConfig};
