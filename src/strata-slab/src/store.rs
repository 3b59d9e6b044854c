use crate::error;
use crate::ledger::Ledger;
use crate::slab::Slab;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc;
use strata_error::StrataError;
use strata_types::{Address, SlabId};
use tracing::trace;

/// Encoded size over which a storable is spilled to its own slab instead of
/// being inlined in its parent page.
pub const DEFAULT_INLINE_VALUE_LIMIT: usize = 256;

#[derive(Clone, Debug)]
enum Op {
    Put(Slab),
    Delete,
}

/// Persistent slab storage over a [`Ledger`].
///
/// All mutations accumulate in the delta buffer; nothing reaches the ledger
/// before [`SlabStore::commit`]. Slabs read from the ledger are kept in a
/// read cache for the rest of the transaction.
pub struct SlabStore<L: Ledger> {
    ledger: L,
    deltas: BTreeMap<SlabId, Op>,
    cache: BTreeMap<SlabId, Slab>,
    next_temp_index: u64,
    inline_value_limit: usize,
}

impl<L: Ledger> SlabStore<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            deltas: BTreeMap::new(),
            cache: BTreeMap::new(),
            next_temp_index: 0,
            inline_value_limit: DEFAULT_INLINE_VALUE_LIMIT,
        }
    }

    pub fn with_inline_value_limit(mut self, limit: usize) -> Self {
        self.inline_value_limit = limit;
        self
    }

    #[inline]
    pub fn inline_value_limit(&self) -> usize {
        self.inline_value_limit
    }

    /// Load one slab: delta buffer first, read cache second, ledger last.
    pub fn load(&mut self, id: SlabId) -> Result<Slab, StrataError> {
        match self.deltas.get(&id) {
            Some(Op::Put(slab)) => return Ok(slab.clone()),
            Some(Op::Delete) => return Err(error::slab_not_found(id)),
            None => {}
        }
        if let Some(slab) = self.cache.get(&id) {
            return Ok(slab.clone());
        }

        let bytes = self
            .ledger
            .get(&id.address(), &id.register_key())?
            .ok_or_else(|| error::slab_not_found(id))?;
        let slab: Slab =
            minicbor::decode(&bytes).map_err(|e| error::slab_decode_failed(id, e))?;
        self.cache.insert(id, slab.clone());
        Ok(slab)
    }

    /// Record a slab in the delta buffer. No ledger I/O happens here.
    pub fn save(&mut self, id: SlabId, slab: Slab) {
        self.cache.remove(&id);
        self.deltas.insert(id, Op::Put(slab));
    }

    /// Record a slab removal in the delta buffer.
    pub fn remove(&mut self, id: SlabId) {
        self.cache.remove(&id);
        self.deltas.insert(id, Op::Delete);
    }

    /// A fresh, never-before-used slab id for this address.
    pub fn allocate(&mut self, address: Address) -> Result<SlabId, StrataError> {
        if address.is_temporary() {
            if self.next_temp_index == u64::MAX {
                return Err(error::index_allocator_exhausted(address));
            }
            let index = self.next_temp_index;
            self.next_temp_index += 1;
            return Ok(SlabId::new(address, index));
        }
        let index = self.ledger.allocate_index(&address)?;
        Ok(SlabId::new(address, index))
    }

    /// True iff the delta buffer holds at least one dirty slab owned by the
    /// given address.
    pub fn has_unsaved_changes(&self, address: Address) -> bool {
        self.deltas.keys().any(|id| id.address() == address)
    }

    /// Number of pending ledger writes, not counting scratch slabs.
    pub fn pending_writes(&self) -> usize {
        self.deltas.keys().filter(|id| !id.is_temporary()).count()
    }

    /// Raw register access for the account layers. Registers are not part of
    /// the delta buffer; callers write them at well-defined points only.
    pub fn read_register(
        &self,
        address: Address,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StrataError> {
        self.ledger.get(&address, key)
    }

    pub fn write_register(
        &mut self,
        address: Address,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<(), StrataError> {
        self.ledger.set(&address, key, value)
    }

    pub fn delete_register(&mut self, address: Address, key: &[u8]) -> Result<(), StrataError> {
        self.ledger.delete(&address, key)
    }

    /// Flush the delta buffer to the ledger.
    ///
    /// Slab encoding runs on a fork-join pool of `parallelism` lanes, one
    /// lane per logical CPU when `parallelism` is zero. In
    /// deterministic mode the ledger sees writes in ascending slab-id order,
    /// which makes the resulting byte image reproducible across runs. The
    /// nondeterministic mode writes in encode-completion order and exists
    /// for offline migration tools only.
    ///
    /// Scratch slabs (temporary address) are dropped, never written.
    pub fn commit(&mut self, parallelism: usize, deterministic: bool) -> Result<(), StrataError> {
        let deltas = std::mem::take(&mut self.deltas);
        let (batch, scratch): (Vec<_>, Vec<_>) = deltas
            .into_iter()
            .partition(|(id, _)| !id.is_temporary());
        trace!(
            slabs = batch.len(),
            scratch = scratch.len(),
            deterministic,
            "flushing slab deltas"
        );

        let lanes = if parallelism == 0 {
            num_cpus::get()
        } else {
            parallelism
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(lanes)
            .build()
            .map_err(|e| StrataError::unknown(e))?;

        let encode = |(id, op): &(SlabId, Op)| -> Result<(SlabId, Option<Vec<u8>>), StrataError> {
            match op {
                Op::Put(slab) => minicbor::to_vec(slab)
                    .map(|bytes| (*id, Some(bytes)))
                    .map_err(|e| StrataError::serialization_error(e)),
                Op::Delete => Ok((*id, None)),
            }
        };

        if deterministic {
            // The batch iterates a BTreeMap, so it is already in ascending
            // slab-id order; an indexed collect preserves it.
            let encoded = pool.install(|| {
                batch
                    .par_iter()
                    .map(encode)
                    .collect::<Result<Vec<_>, _>>()
            });
            match encoded {
                Ok(encoded) => {
                    for (id, bytes) in encoded {
                        self.write_encoded(id, bytes)?;
                    }
                }
                Err(e) => {
                    // Nothing was written; restore the buffer so the caller
                    // observes an intact transaction state.
                    self.deltas = batch.into_iter().collect();
                    return Err(e);
                }
            }
        } else {
            let (tx, rx) = mpsc::channel();
            pool.install(|| {
                batch.par_iter().for_each_with(tx, |tx, entry| {
                    let _ = tx.send(encode(entry));
                });
            });
            // Drain the whole channel before touching the ledger: a flush is
            // all-or-nothing regardless of write order.
            match rx.into_iter().collect::<Result<Vec<_>, _>>() {
                Ok(encoded) => {
                    for (id, bytes) in encoded {
                        self.write_encoded(id, bytes)?;
                    }
                }
                Err(e) => {
                    self.deltas = batch.into_iter().collect();
                    return Err(e);
                }
            }
        }

        for (id, op) in batch {
            match op {
                Op::Put(slab) => {
                    self.cache.insert(id, slab);
                }
                Op::Delete => {
                    self.cache.remove(&id);
                }
            }
        }
        Ok(())
    }

    fn write_encoded(&mut self, id: SlabId, bytes: Option<Vec<u8>>) -> Result<(), StrataError> {
        match bytes {
            Some(bytes) => self.ledger.set(&id.address(), &id.register_key(), bytes),
            None => self.ledger.delete(&id.address(), &id.register_key()),
        }
    }

    /// Forget a slab entirely, deltas and read cache both. Lets tests craft
    /// inconsistent states the health check must catch.
    #[cfg(any(test, feature = "testing"))]
    pub fn evict(&mut self, id: SlabId) {
        self.deltas.remove(&id);
        self.cache.remove(&id);
    }

    /// Walk every resident slab and return the set of roots: slabs no other
    /// resident slab references.
    ///
    /// Fails with a corruption error on a missing child or a reference
    /// cycle. Does not touch the delta buffer and performs no ledger
    /// writes, so the result is stable across repeated calls.
    pub fn check_health(&mut self, max_depth: i64) -> Result<BTreeSet<SlabId>, StrataError> {
        let resident: BTreeSet<SlabId> = self
            .deltas
            .iter()
            .filter_map(|(id, op)| match op {
                Op::Put(_) => Some(*id),
                Op::Delete => None,
            })
            .chain(self.cache.keys().copied())
            .collect();

        let mut referenced = BTreeSet::new();
        for id in &resident {
            let slab = self.load(*id)?;
            referenced.extend(slab.child_ids());
        }

        let roots: BTreeSet<SlabId> = resident.difference(&referenced).copied().collect();

        let mut visited = BTreeSet::new();
        for root in &roots {
            self.walk(*root, 0, max_depth, &mut visited, &mut BTreeSet::new())?;
        }

        // Anything resident but unreachable from a root can only sit on an
        // unrooted reference cycle.
        if let Some(id) = resident.iter().find(|id| !visited.contains(*id)) {
            return Err(error::corrupt_slab_cycle(id));
        }

        Ok(roots)
    }

    fn walk(
        &mut self,
        id: SlabId,
        depth: i64,
        max_depth: i64,
        visited: &mut BTreeSet<SlabId>,
        path: &mut BTreeSet<SlabId>,
    ) -> Result<(), StrataError> {
        if max_depth >= 0 && depth > max_depth {
            return Ok(());
        }
        if !path.insert(id) {
            return Err(error::corrupt_slab_cycle(id));
        }
        visited.insert(id);

        let slab = self.load(id)?;
        for child in slab.child_ids() {
            if self.load(child).is_err() {
                return Err(error::corrupt_slab_reference(id, child));
            }
            self.walk(child, depth + 1, max_depth, visited, path)?;
        }

        path.remove(&id);
        Ok(())
    }
}
