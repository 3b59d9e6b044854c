use crate::error;
use crate::storage::contract::ContractUpdates;
use crate::storage::v1::V1Storage;
use crate::storage::v2::{V2Storage, STORED_REGISTER};
use std::collections::BTreeMap;
use strata_error::StrataError;
use strata_slab::{Ledger, SlabMap, SlabStore, DEFAULT_INLINE_VALUE_LIMIT};
use strata_types::{Address, ComputationKind, Domain, MapKey, Meter, SlabId, StoredValue};
use tracing::debug;

mod contract;
mod health;
mod migrate;
mod v1;
mod v2;

pub use contract::ContractLocation;

/// Engine configuration, fixed for the lifetime of one façade.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// When false, every account uses the legacy one-register-per-domain
    /// layout and scheduling a migration fails at commit.
    pub v2_enabled: bool,
    /// Worker lanes of the commit-time slab flush.
    pub parallelism: usize,
    /// Encoded size over which a storable spills to its own slab.
    pub inline_value_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            v2_enabled: true,
            parallelism: num_cpus::get(),
            inline_value_limit: DEFAULT_INLINE_VALUE_LIMIT,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum AccountFormat {
    V1,
    V2,
    Unknown,
}

/// The public surface of the account-storage engine.
///
/// One façade serves exactly one transaction: every cache on it (layout
/// flags, materialized domain maps, deferred contract updates, scheduled
/// migrations) is transaction-scoped, and the façade is discarded after
/// [`AccountStorage::commit`] or after any fatal error.
pub struct AccountStorage<L: Ledger> {
    store: SlabStore<L>,
    config: StorageConfig,
    v1: V1Storage,
    v2: V2Storage,
    /// Layout flag per probed address: `true` for the legacy layout.
    v1_accounts: BTreeMap<Address, bool>,
    /// Domain maps materialized this transaction.
    domain_maps: BTreeMap<(Address, Domain), SlabMap>,
    contract_updates: ContractUpdates,
    scheduled_migrations: Vec<Address>,
}

impl<L: Ledger> AccountStorage<L> {
    pub fn new(ledger: L, config: StorageConfig) -> Self {
        let store = SlabStore::new(ledger).with_inline_value_limit(config.inline_value_limit);
        Self {
            store,
            config,
            v1: V1Storage::new(),
            v2: V2Storage::new(),
            v1_accounts: BTreeMap::new(),
            domain_maps: BTreeMap::new(),
            contract_updates: ContractUpdates::default(),
            scheduled_migrations: Vec::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// The domain map of `(address, domain)`, or `None` when the domain does
    /// not exist and `create_if_not_exists` is false.
    ///
    /// The returned handle is a snapshot; mutations go through
    /// [`Self::write`] and [`Self::remove`], which keep the cache current.
    pub fn domain_map(
        &mut self,
        meter: &mut dyn Meter,
        address: Address,
        domain: Domain,
        create_if_not_exists: bool,
    ) -> Result<Option<SlabMap>, StrataError> {
        if let Some(map) = self.domain_maps.get(&(address, domain)) {
            return Ok(Some(*map));
        }

        let map = match self.account_format(address, domain, create_if_not_exists)? {
            AccountFormat::V1 => {
                self.v1
                    .domain_map(&mut self.store, address, domain, create_if_not_exists)?
            }
            AccountFormat::V2 => self.v2.domain_map(
                &mut self.store,
                meter,
                address,
                domain,
                create_if_not_exists,
            )?,
            AccountFormat::Unknown => {
                if create_if_not_exists {
                    // The probe always resolves a format when it may create.
                    return Err(error::unexpected_format_state(address, domain));
                }
                return Ok(None);
            }
        };

        if let Some(map) = map {
            self.domain_maps.insert((address, domain), map);
            return Ok(Some(map));
        }
        Ok(None)
    }

    /// Read one value. Deferred contract updates are not visible here.
    pub fn read(
        &mut self,
        meter: &mut dyn Meter,
        address: Address,
        domain: Domain,
        key: &MapKey,
    ) -> Result<Option<StoredValue>, StrataError> {
        match self.domain_map(meter, address, domain, false)? {
            Some(map) => map.get(&mut self.store, key),
            None => Ok(None),
        }
    }

    /// Write one value, creating the domain map on first use. Returns the
    /// previous value.
    pub fn write(
        &mut self,
        meter: &mut dyn Meter,
        address: Address,
        domain: Domain,
        key: MapKey,
        value: StoredValue,
    ) -> Result<Option<StoredValue>, StrataError> {
        let mut map = self
            .domain_map(meter, address, domain, true)?
            .ok_or_else(|| error::unexpected_format_state(address, domain))?;
        let prev = map.insert(&mut self.store, key, value)?;
        self.domain_maps.insert((address, domain), map);
        Ok(prev)
    }

    /// Remove one value. Returns the removed value, if any.
    pub fn remove(
        &mut self,
        meter: &mut dyn Meter,
        address: Address,
        domain: Domain,
        key: &MapKey,
    ) -> Result<Option<StoredValue>, StrataError> {
        match self.domain_map(meter, address, domain, false)? {
            Some(mut map) => {
                let prev = map.remove(&mut self.store, key)?;
                self.domain_maps.insert((address, domain), map);
                Ok(prev)
            }
            None => Ok(None),
        }
    }

    /// Which layout serves this access. Results are cached per address for
    /// the rest of the transaction, except for the `Unknown` outcome of a
    /// negative create-free read, which stays a pure probe.
    fn account_format(
        &mut self,
        address: Address,
        domain: Domain,
        create_if_not_exists: bool,
    ) -> Result<AccountFormat, StrataError> {
        if !self.config.v2_enabled {
            self.v1_accounts.insert(address, true);
            return Ok(AccountFormat::V1);
        }
        if let Some(is_v1) = self.v1_accounts.get(&address) {
            return Ok(if *is_v1 {
                AccountFormat::V1
            } else {
                AccountFormat::V2
            });
        }

        if self.store.read_register(address, STORED_REGISTER)?.is_some() {
            self.v1_accounts.insert(address, false);
            return Ok(AccountFormat::V2);
        }
        if self.v1.contains_domain(&self.store, address, domain)? {
            self.v1_accounts.insert(address, true);
            return Ok(AccountFormat::V1);
        }
        if !create_if_not_exists {
            // A negative read stops after the specific domain's register;
            // scanning the whole register set just to answer `None` is not
            // worth the ledger traffic.
            return Ok(AccountFormat::Unknown);
        }
        for other in Domain::ALL {
            if other == domain {
                continue;
            }
            if self.v1.contains_domain(&self.store, address, other)? {
                self.v1_accounts.insert(address, true);
                return Ok(AccountFormat::V1);
            }
        }

        // A new account starts on the current layout.
        self.v1_accounts.insert(address, false);
        Ok(AccountFormat::V2)
    }

    /// Commit the transaction with a reproducible ledger write order.
    ///
    /// Ordering: contract updates, V1 layer, V2 layer, scheduled account
    /// migrations in ascending address order, then the slab flush.
    pub fn commit(
        &mut self,
        meter: &mut dyn Meter,
        apply_contract_updates: bool,
    ) -> Result<(), StrataError> {
        self.commit_inner(meter, apply_contract_updates, true)
    }

    /// Commit without the write-order guarantee. Offline migration tools
    /// only; everything else goes through [`Self::commit`].
    #[deprecated(note = "only offline migration tools may trade determinism for throughput")]
    pub fn nondeterministic_commit(
        &mut self,
        meter: &mut dyn Meter,
        apply_contract_updates: bool,
    ) -> Result<(), StrataError> {
        self.commit_inner(meter, apply_contract_updates, false)
    }

    fn commit_inner(
        &mut self,
        meter: &mut dyn Meter,
        apply_contract_updates: bool,
        deterministic: bool,
    ) -> Result<(), StrataError> {
        debug!(apply_contract_updates, deterministic, "committing account storage");
        if apply_contract_updates {
            self.commit_contract_updates(meter)?;
        }
        self.v1.commit()?;
        if self.config.v2_enabled {
            self.v2.commit(&mut self.store)?;
            self.migrate_v1_accounts_to_v2(meter)?;
        } else if !self.scheduled_migrations.is_empty() {
            use itertools::Itertools;
            return Err(error::account_migration_disabled(
                self.scheduled_migrations.iter().join(", "),
            ));
        }

        let pending = self.store.pending_writes() as u64;
        meter.meter_computation(ComputationKind::SlabFlush, pending)?;
        meter.meter_memory(pending)?;

        self.store.commit(self.config.parallelism, deterministic)
    }

    #[cfg(any(test, feature = "testing"))]
    pub fn store_mut(&mut self) -> &mut SlabStore<L> {
        &mut self.store
    }
}

/// Root registers hold the 8-byte big-endian slab index of a map head.
pub(crate) fn decode_root_index(
    address: Address,
    register: &[u8],
    bytes: &[u8],
) -> Result<u64, StrataError> {
    let bytes: [u8; 8] = bytes.try_into().map_err(|_| {
        error::invalid_root_register(address, String::from_utf8_lossy(register))
    })?;
    Ok(u64::from_be_bytes(bytes))
}

pub(crate) fn root_register_value(root: SlabId) -> Vec<u8> {
    root.index().to_be_bytes().to_vec()
}
