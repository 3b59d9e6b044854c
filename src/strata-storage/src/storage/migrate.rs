use crate::storage::v1::V1Storage;
use crate::storage::v2::STORED_REGISTER;
use crate::storage::{root_register_value, AccountStorage};
use std::collections::BTreeMap;
use strata_error::StrataError;
use strata_slab::{Ledger, SlabMap, SlabStore};
use strata_types::{Address, ComputationKind, Domain, MapKey, Meter, StoredValue};
use tracing::debug;

impl<L: Ledger> AccountStorage<L> {
    /// Queue an account for migration to the single-register layout at
    /// commit time.
    pub fn schedule_v2_migration(&mut self, address: Address) {
        self.scheduled_migrations.push(address);
    }

    /// Queue every legacy-layout account with unsaved slab changes.
    pub fn schedule_v2_migration_for_modified_accounts(&mut self) {
        let modified: Vec<Address> = self
            .v1_accounts
            .iter()
            .filter(|(address, is_v1)| **is_v1 && self.store.has_unsaved_changes(**address))
            .map(|(address, _)| *address)
            .collect();
        for address in modified {
            self.schedule_v2_migration(address);
        }
    }

    /// Migrate every scheduled account, in ascending address order. Runs
    /// after the V2 layer commit so the installed registers land in the
    /// same transaction.
    pub(crate) fn migrate_v1_accounts_to_v2(
        &mut self,
        meter: &mut dyn Meter,
    ) -> Result<(), StrataError> {
        if self.scheduled_migrations.is_empty() {
            return Ok(());
        }
        let mut scheduled = std::mem::take(&mut self.scheduled_migrations);
        scheduled.sort_unstable();
        scheduled.dedup();

        for address in scheduled {
            // An account already on the current layout has nothing to move.
            if matches!(self.v1_accounts.get(&address), Some(false)) {
                continue;
            }
            if self.store.read_register(address, STORED_REGISTER)?.is_some() {
                self.v1_accounts.insert(address, false);
                continue;
            }

            meter.meter_computation(ComputationKind::AccountMigration, 1)?;
            let account_map = migrate_account_domain_registers(
                &mut self.store,
                &mut self.v1,
                address,
                &self.domain_maps,
            )?;
            self.v2.cache_account_map(address, account_map);
            self.v1_accounts.insert(address, false);
        }
        Ok(())
    }
}

/// Build one account map out of an account's legacy domain registers,
/// delete those registers, and install the `"stored"` register.
///
/// Domain maps already materialized this transaction are reused ahead of
/// their registers, so uncommitted mutations are carried over. Domains with
/// neither a register nor a cached map stay absent from the account map.
fn migrate_account_domain_registers<L: Ledger>(
    store: &mut SlabStore<L>,
    v1: &mut V1Storage,
    address: Address,
    cached_domain_maps: &BTreeMap<(Address, Domain), SlabMap>,
) -> Result<SlabMap, StrataError> {
    debug!(%address, "migrating account to the single-register layout");

    let mut account_map = SlabMap::new(store, address)?;
    for domain in Domain::ALL {
        let map = match cached_domain_maps.get(&(address, domain)) {
            Some(map) => Some(*map),
            None => v1.domain_map(store, address, domain, false)?,
        };
        let Some(map) = map else {
            continue;
        };
        account_map.insert(
            store,
            MapKey::from(domain.identifier()),
            StoredValue::Slab(map.root()),
        )?;
        v1.delete_domain_register(store, address, domain)?;
    }
    store.write_register(address, STORED_REGISTER, root_register_value(account_map.root()))?;
    Ok(account_map)
}
