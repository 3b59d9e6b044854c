use crate::storage::{decode_root_index, root_register_value};
use std::collections::BTreeMap;
use strata_error::StrataError;
use strata_slab::{Ledger, SlabMap, SlabStore};
use strata_types::{Address, Domain, SlabId};

/// The legacy account layout: one ledger register per `(address, domain)`,
/// holding the root slab index of that domain's map.
pub(crate) struct V1Storage {
    /// Roots materialized this transaction, by register read or creation.
    roots: BTreeMap<(Address, Domain), SlabId>,
}

impl V1Storage {
    pub fn new() -> Self {
        Self {
            roots: BTreeMap::new(),
        }
    }

    /// True iff this domain exists under the legacy layout. Pure probe: no
    /// register or cache writes.
    pub fn contains_domain<L: Ledger>(
        &self,
        store: &SlabStore<L>,
        address: Address,
        domain: Domain,
    ) -> Result<bool, StrataError> {
        if self.roots.contains_key(&(address, domain)) {
            return Ok(true);
        }
        Ok(store
            .read_register(address, domain.register_key())?
            .is_some())
    }

    pub fn domain_map<L: Ledger>(
        &mut self,
        store: &mut SlabStore<L>,
        address: Address,
        domain: Domain,
        create_if_not_exists: bool,
    ) -> Result<Option<SlabMap>, StrataError> {
        if let Some(root) = self.roots.get(&(address, domain)) {
            return Ok(Some(SlabMap::open(store, *root)?));
        }
        match store.read_register(address, domain.register_key())? {
            Some(bytes) => {
                let index = decode_root_index(address, domain.register_key(), &bytes)?;
                let root = SlabId::new(address, index);
                let map = SlabMap::open(store, root)?;
                self.roots.insert((address, domain), root);
                Ok(Some(map))
            }
            None if create_if_not_exists => {
                // The register is written inline at create time; every later
                // mutation lives inside the slab tree.
                let map = SlabMap::new(store, address)?;
                store.write_register(
                    address,
                    domain.register_key(),
                    root_register_value(map.root()),
                )?;
                self.roots.insert((address, domain), map.root());
                Ok(Some(map))
            }
            None => Ok(None),
        }
    }

    /// Drop a domain register. Used by the migration after the domain map
    /// has been rehomed under an account map.
    pub fn delete_domain_register<L: Ledger>(
        &mut self,
        store: &mut SlabStore<L>,
        address: Address,
        domain: Domain,
    ) -> Result<(), StrataError> {
        store.delete_register(address, domain.register_key())?;
        self.roots.remove(&(address, domain));
        Ok(())
    }

    /// Domain-map roots materialized this transaction, with their owner.
    pub fn cached_roots(&self) -> impl Iterator<Item = (Address, SlabId)> + '_ {
        self.roots.iter().map(|((address, _), root)| (*address, *root))
    }

    /// Nothing to do: registers are written at create time and the slab
    /// store flushes the trees.
    pub fn commit(&self) -> Result<(), StrataError> {
        Ok(())
    }
}
