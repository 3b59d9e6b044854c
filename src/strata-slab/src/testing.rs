//! Test doubles. Enabled through the `testing` feature.

use crate::error;
use crate::ledger::Ledger;
use std::cell::RefCell;
use std::collections::BTreeMap;
use strata_error::StrataError;
use strata_types::Address;

/// An in-memory ledger that records its traffic, so tests can assert on the
/// exact reads and writes an operation performs, and compare whole byte
/// images across runs.
#[derive(Clone, Debug, Default)]
pub struct MemoryLedger {
    registers: BTreeMap<(Address, Vec<u8>), Vec<u8>>,
    next_index: BTreeMap<Address, u64>,
    reads: RefCell<Vec<(Address, Vec<u8>)>>,
    writes: Vec<(Address, Vec<u8>, Option<Vec<u8>>)>,
}

impl MemoryLedger {
    /// Every `(address, key)` read since the last [`Self::clear_log`].
    pub fn read_log(&self) -> Vec<(Address, Vec<u8>)> {
        self.reads.borrow().clone()
    }

    /// Every write and delete since the last [`Self::clear_log`], in order.
    /// A `None` value is a delete.
    pub fn write_log(&self) -> &[(Address, Vec<u8>, Option<Vec<u8>>)] {
        &self.writes
    }

    pub fn clear_log(&mut self) {
        self.reads.borrow_mut().clear();
        self.writes.clear();
    }

    /// The full ledger byte image.
    pub fn image(&self) -> &BTreeMap<(Address, Vec<u8>), Vec<u8>> {
        &self.registers
    }

    /// Direct register lookup, bypassing the read log.
    pub fn register(&self, address: Address, key: &[u8]) -> Option<&Vec<u8>> {
        self.registers.get(&(address, key.to_vec()))
    }

    /// Direct register write, bypassing the write log. For seeding crafted
    /// scenarios only.
    pub fn seed_register(&mut self, address: Address, key: &[u8], value: Vec<u8>) {
        self.registers.insert((address, key.to_vec()), value);
    }

    /// Direct register delete, bypassing the write log.
    pub fn drop_register(&mut self, address: Address, key: &[u8]) {
        self.registers.remove(&(address, key.to_vec()));
    }

    pub fn set_next_index(&mut self, address: Address, next: u64) {
        self.next_index.insert(address, next);
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, address: &Address, key: &[u8]) -> Result<Option<Vec<u8>>, StrataError> {
        self.reads.borrow_mut().push((*address, key.to_vec()));
        Ok(self.registers.get(&(*address, key.to_vec())).cloned())
    }

    fn set(&mut self, address: &Address, key: &[u8], value: Vec<u8>) -> Result<(), StrataError> {
        self.writes
            .push((*address, key.to_vec(), Some(value.clone())));
        self.registers.insert((*address, key.to_vec()), value);
        Ok(())
    }

    fn delete(&mut self, address: &Address, key: &[u8]) -> Result<(), StrataError> {
        self.writes.push((*address, key.to_vec(), None));
        self.registers.remove(&(*address, key.to_vec()));
        Ok(())
    }

    fn allocate_index(&mut self, address: &Address) -> Result<u64, StrataError> {
        let next = self.next_index.entry(*address).or_insert(1);
        if *next == u64::MAX {
            return Err(error::index_allocator_exhausted(address));
        }
        let index = *next;
        *next += 1;
        Ok(index)
    }
}
