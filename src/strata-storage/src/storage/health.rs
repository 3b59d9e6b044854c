use crate::error;
use crate::storage::AccountStorage;
use itertools::Itertools;
use std::collections::BTreeSet;
use strata_error::StrataError;
use strata_slab::Ledger;
use strata_types::SlabId;

impl<L: Ledger> AccountStorage<L> {
    /// Whole-storage health check.
    ///
    /// Every account root this transaction knows about must be a reachable
    /// root in the slab store, and every reachable non-scratch root must be
    /// attributable to an account. Corruption inside the slab graph
    /// (missing children, cycles) surfaces from the store walk itself.
    pub fn check_health(&mut self) -> Result<(), StrataError> {
        let roots: BTreeSet<SlabId> = self
            .store
            .check_health(-1)?
            .into_iter()
            .filter(|id| !id.is_temporary())
            .collect();

        let mut expected: BTreeSet<SlabId> = BTreeSet::new();
        expected.extend(self.v2.cached_root_slab_ids());
        for (address, root) in self.v1.cached_roots() {
            if matches!(self.v1_accounts.get(&address), Some(true)) {
                expected.insert(root);
            }
        }
        for ((address, _), map) in &self.domain_maps {
            if matches!(self.v1_accounts.get(address), Some(true)) {
                expected.insert(map.root());
            }
        }

        for id in &expected {
            if !roots.contains(id) {
                return Err(error::dangling_root_reference(id));
            }
        }

        let unreferenced: Vec<SlabId> = roots.difference(&expected).copied().collect();
        if !unreferenced.is_empty() {
            return Err(error::unreferenced_root_slabs(
                unreferenced.iter().join(", "),
            ));
        }
        Ok(())
    }
}
