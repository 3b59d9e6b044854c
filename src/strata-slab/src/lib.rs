//! Slab-indexed persistent storage over a flat account ledger.
//!
//! The ledger itself is a dumb byte-level key/value store. This crate layers
//! a content-addressed page structure on top of it: collections are paged
//! into slabs, slabs are referenced by [`SlabId`], and every mutation stays
//! in an in-memory delta buffer until [`SlabStore::commit`] flushes it.

pub mod error;

mod ledger;
mod map;
mod slab;
mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use ledger::Ledger;
pub use map::{SlabMap, MAX_BRANCH_CHILDREN, MAX_LEAF_ENTRIES, MIN_LEAF_ENTRIES};
pub use slab::{Node, Slab};
pub use store::{SlabStore, DEFAULT_INLINE_VALUE_LIMIT};

pub use strata_types::SlabId;
