use strata_error::StrataError;
use strata_types::Address;

/// The host-process ledger: an untyped byte-level key/value store indexed
/// by `(address, key)`, plus a fresh-index allocator per address.
///
/// Failures are fatal to the current transaction and propagate unchanged.
pub trait Ledger {
    fn get(&self, address: &Address, key: &[u8]) -> Result<Option<Vec<u8>>, StrataError>;

    fn set(&mut self, address: &Address, key: &[u8], value: Vec<u8>) -> Result<(), StrataError>;

    fn delete(&mut self, address: &Address, key: &[u8]) -> Result<(), StrataError>;

    /// A never-before-used slab index for this address, monotonically
    /// increasing across calls.
    fn allocate_index(&mut self, address: &Address) -> Result<u64, StrataError>;
}

impl<L: Ledger + ?Sized> Ledger for &mut L {
    fn get(&self, address: &Address, key: &[u8]) -> Result<Option<Vec<u8>>, StrataError> {
        (**self).get(address, key)
    }

    fn set(&mut self, address: &Address, key: &[u8], value: Vec<u8>) -> Result<(), StrataError> {
        (**self).set(address, key, value)
    }

    fn delete(&mut self, address: &Address, key: &[u8]) -> Result<(), StrataError> {
        (**self).delete(address, key)
    }

    fn allocate_index(&mut self, address: &Address) -> Result<u64, StrataError> {
        (**self).allocate_index(address)
    }
}
