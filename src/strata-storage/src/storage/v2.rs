use crate::error;
use crate::storage::{decode_root_index, root_register_value};
use std::collections::{BTreeMap, BTreeSet};
use strata_error::StrataError;
use strata_slab::{Ledger, SlabMap, SlabStore};
use strata_types::{Address, ComputationKind, Domain, MapKey, Meter, SlabId, StoredValue};

/// The single well-known register of the current account layout. Its
/// presence alone decides that an account uses this layout.
pub(crate) const STORED_REGISTER: &[u8] = b"stored";

/// The current account layout: one account map per address, mapping domain
/// names to domain-map heads, rooted in the `"stored"` register.
pub(crate) struct V2Storage {
    /// Account maps touched this transaction.
    account_maps: BTreeMap<Address, SlabMap>,
    /// Accounts whose `"stored"` register must be written at commit.
    dirty: BTreeSet<Address>,
}

impl V2Storage {
    pub fn new() -> Self {
        Self {
            account_maps: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    fn account_map<L: Ledger>(
        &mut self,
        store: &mut SlabStore<L>,
        address: Address,
        create_if_not_exists: bool,
    ) -> Result<Option<SlabMap>, StrataError> {
        if let Some(map) = self.account_maps.get(&address) {
            return Ok(Some(*map));
        }
        match store.read_register(address, STORED_REGISTER)? {
            Some(bytes) => {
                let index = decode_root_index(address, STORED_REGISTER, &bytes)?;
                let map = SlabMap::open(store, SlabId::new(address, index))?;
                self.account_maps.insert(address, map);
                Ok(Some(map))
            }
            None if create_if_not_exists => {
                let map = SlabMap::new(store, address)?;
                self.account_maps.insert(address, map);
                self.dirty.insert(address);
                Ok(Some(map))
            }
            None => Ok(None),
        }
    }

    pub fn domain_map<L: Ledger>(
        &mut self,
        store: &mut SlabStore<L>,
        meter: &mut dyn Meter,
        address: Address,
        domain: Domain,
        create_if_not_exists: bool,
    ) -> Result<Option<SlabMap>, StrataError> {
        meter.meter_computation(ComputationKind::DomainLookup, 1)?;

        let Some(mut account_map) = self.account_map(store, address, create_if_not_exists)?
        else {
            return Ok(None);
        };

        let key = MapKey::from(domain.identifier());
        match account_map.get(store, &key)? {
            Some(StoredValue::Slab(root)) => Ok(Some(SlabMap::open(store, root)?)),
            Some(_) => Err(error::invalid_account_map_entry(address, domain)),
            None if create_if_not_exists => {
                let map = SlabMap::new(store, address)?;
                account_map.insert(store, key, StoredValue::Slab(map.root()))?;
                self.account_maps.insert(address, account_map);
                self.dirty.insert(address);
                Ok(Some(map))
            }
            None => Ok(None),
        }
    }

    /// Adopt an account map built by the migration.
    pub fn cache_account_map(&mut self, address: Address, map: SlabMap) {
        self.account_maps.insert(address, map);
    }

    /// Roots of every account map touched this transaction.
    pub fn cached_root_slab_ids(&self) -> Vec<SlabId> {
        self.account_maps.values().map(|map| map.root()).collect()
    }

    /// Write the `"stored"` register of every dirty account map.
    pub fn commit<L: Ledger>(&mut self, store: &mut SlabStore<L>) -> Result<(), StrataError> {
        for address in std::mem::take(&mut self.dirty) {
            if let Some(map) = self.account_maps.get(&address) {
                store.write_register(address, STORED_REGISTER, root_register_value(map.root()))?;
            }
        }
        Ok(())
    }
}
