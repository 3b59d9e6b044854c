use crate::storage::AccountStorage;
use std::collections::BTreeMap;
use strata_error::StrataError;
use strata_slab::Ledger;
use strata_types::{Address, Domain, MapKey, Meter, StoredValue};
use tracing::debug;

/// One contract slot: an address and the contract's name inside the
/// `contract` domain.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ContractLocation {
    pub address: Address,
    pub name: String,
}

impl ContractLocation {
    pub fn new(address: Address, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ContractLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.address, self.name)
    }
}

/// Deferred contract writes, keyed by location.
///
/// Re-recording a location overwrites its value but keeps its original
/// position, so commit-time application follows first-insertion order. A
/// `None` value is the deletion sentinel and survives in the map; entries
/// are only drained wholesale at commit.
#[derive(Debug, Default)]
pub(crate) struct ContractUpdates {
    order: Vec<ContractLocation>,
    entries: BTreeMap<ContractLocation, Option<StoredValue>>,
}

impl ContractUpdates {
    pub fn record(&mut self, location: ContractLocation, value: Option<StoredValue>) {
        if self.entries.insert(location.clone(), value).is_none() {
            self.order.push(location);
        }
    }

    pub fn recorded(&self, location: &ContractLocation) -> bool {
        self.entries.contains_key(location)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn drain(&mut self) -> Vec<(ContractLocation, Option<StoredValue>)> {
        let mut entries = std::mem::take(&mut self.entries);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|location| entries.remove(&location).map(|value| (location, value)))
            .collect()
    }
}

impl<L: Ledger> AccountStorage<L> {
    /// Record a pending write of a contract value. `None` deletes the
    /// contract at commit. The update is invisible to reads until then.
    pub fn record_contract_update(
        &mut self,
        location: ContractLocation,
        value: Option<StoredValue>,
    ) {
        self.contract_updates.record(location, value);
    }

    /// Whether an update is pending for this location. Lets the interpreter
    /// skip reads it would overwrite anyway.
    pub fn contract_update_recorded(&self, location: &ContractLocation) -> bool {
        self.contract_updates.recorded(location)
    }

    /// Apply every recorded update to the `contract` domain, in
    /// first-insertion order. Only called from commit.
    pub(crate) fn commit_contract_updates(
        &mut self,
        meter: &mut dyn Meter,
    ) -> Result<(), StrataError> {
        if self.contract_updates.is_empty() {
            return Ok(());
        }
        let updates = self.contract_updates.drain();
        debug!(count = updates.len(), "applying deferred contract updates");
        for (location, value) in updates {
            let key = MapKey::from(location.name.as_str());
            match value {
                Some(value) => {
                    self.write(meter, location.address, Domain::Contract, key, value)?;
                }
                None => {
                    self.remove(meter, location.address, Domain::Contract, &key)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(name: &str) -> ContractLocation {
        ContractLocation::new(Address::from(1), name)
    }

    #[test]
    fn preserves_first_insertion_order_across_overwrites() {
        let mut updates = ContractUpdates::default();
        updates.record(location("b"), Some(StoredValue::from(1i64)));
        updates.record(location("a"), Some(StoredValue::from(2i64)));
        updates.record(location("b"), Some(StoredValue::from(3i64)));

        let drained = updates.drain();
        assert_eq!(
            drained,
            vec![
                (location("b"), Some(StoredValue::from(3i64))),
                (location("a"), Some(StoredValue::from(2i64))),
            ]
        );
        assert!(updates.is_empty());
    }

    #[test]
    fn deletion_sentinel_survives_until_drain() {
        let mut updates = ContractUpdates::default();
        updates.record(location("c"), Some(StoredValue::from(1i64)));
        updates.record(location("c"), None);

        assert!(updates.recorded(&location("c")));
        assert_eq!(updates.drain(), vec![(location("c"), None)]);
    }
}
