use crate::error;
use crate::ledger::Ledger;
use crate::slab::{Node, Slab};
use crate::store::SlabStore;
use strata_error::StrataError;
use strata_types::{Address, MapKey, SlabId, StoredValue};

/// A leaf splits when it grows past this many entries.
pub const MAX_LEAF_ENTRIES: usize = 32;
/// A leaf that shrinks below this merges into a sibling when possible.
pub const MIN_LEAF_ENTRIES: usize = MAX_LEAF_ENTRIES / 4;
/// A branch splits when it grows past this many children.
pub const MAX_BRANCH_CHILDREN: usize = 32;

/// An ordered map paged over slabs.
///
/// The head slab keeps its id for the whole lifetime of the map, so a
/// register pointing at the root is written exactly once. Splits and merges
/// only ever touch interior slabs.
///
/// The struct itself is a cheap handle `(root, count)`; all operations go
/// through the [`SlabStore`] that owns the pages.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use]
pub struct SlabMap {
    root: SlabId,
    count: u64,
}

fn load_node<L: Ledger>(store: &mut SlabStore<L>, id: SlabId) -> Result<Node, StrataError> {
    match store.load(id)? {
        Slab::Node(node) => Ok(node),
        _ => Err(error::unexpected_slab_kind(id)),
    }
}

/// Index of the child whose subtree may hold `key`: the last child whose
/// separator is not greater than the key.
fn child_index(children: &[(MapKey, SlabId)], key: &MapKey) -> usize {
    children
        .partition_point(|(separator, _)| separator <= key)
        .saturating_sub(1)
}

impl SlabMap {
    /// Create an empty map owned by `address`.
    pub fn new<L: Ledger>(
        store: &mut SlabStore<L>,
        address: Address,
    ) -> Result<Self, StrataError> {
        let root = store.allocate(address)?;
        store.save(
            root,
            Slab::Root {
                count: 0,
                node: Node::Leaf(Vec::new()),
            },
        );
        Ok(Self { root, count: 0 })
    }

    /// Open an existing map from its head slab.
    pub fn open<L: Ledger>(store: &mut SlabStore<L>, root: SlabId) -> Result<Self, StrataError> {
        match store.load(root)? {
            Slab::Root { count, .. } => Ok(Self { root, count }),
            _ => Err(error::unexpected_slab_kind(root)),
        }
    }

    #[inline]
    pub const fn root(&self) -> SlabId {
        self.root
    }

    #[inline]
    pub const fn len(&self) -> u64 {
        self.count
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get<L: Ledger>(
        &self,
        store: &mut SlabStore<L>,
        key: &MapKey,
    ) -> Result<Option<StoredValue>, StrataError> {
        match self.get_raw(store, key)? {
            Some(value) => Ok(Some(Self::resolve(store, value)?)),
            None => Ok(None),
        }
    }

    pub fn contains<L: Ledger>(
        &self,
        store: &mut SlabStore<L>,
        key: &MapKey,
    ) -> Result<bool, StrataError> {
        Ok(self.get_raw(store, key)?.is_some())
    }

    /// Insert or overwrite. Returns the previous value, with any spilled
    /// payload resolved; the spilled slab of an overwritten value is
    /// removed.
    pub fn insert<L: Ledger>(
        &mut self,
        store: &mut SlabStore<L>,
        key: MapKey,
        value: StoredValue,
    ) -> Result<Option<StoredValue>, StrataError> {
        let value = self.maybe_spill(store, value)?;
        let mut node = self.load_root_node(store)?;

        let (prev, split) = Self::insert_node(store, self.root.address(), &mut node, key, value)?;
        if let Some((separator, right)) = split {
            // The head never moves: push both halves down and turn it into
            // a two-child branch in place.
            let left_first = node
                .first_key()
                .cloned()
                .ok_or_else(|| error::unexpected_slab_kind(self.root))?;
            let left = store.allocate(self.root.address())?;
            store.save(left, Slab::Node(node));
            node = Node::Branch(vec![(left_first, left), (separator, right)]);
        }

        let prev = Self::take_previous(store, prev)?;
        if prev.is_none() {
            self.count += 1;
        }
        store.save(
            self.root,
            Slab::Root {
                count: self.count,
                node,
            },
        );
        Ok(prev)
    }

    /// Remove a key. Returns the removed value, with any spilled payload
    /// resolved and its slab removed.
    pub fn remove<L: Ledger>(
        &mut self,
        store: &mut SlabStore<L>,
        key: &MapKey,
    ) -> Result<Option<StoredValue>, StrataError> {
        let mut node = self.load_root_node(store)?;
        let prev = Self::remove_node(store, &mut node, key)?;
        if prev.is_none() {
            return Ok(None);
        }

        // Collapse trivial head shapes back into the head slab.
        loop {
            match &node {
                Node::Branch(children) if children.len() == 1 => {
                    let child_id = children[0].1;
                    let child = load_node(store, child_id)?;
                    store.remove(child_id);
                    node = child;
                }
                Node::Branch(children) if children.is_empty() => {
                    node = Node::Leaf(Vec::new());
                }
                _ => break,
            }
        }

        let prev = Self::take_previous(store, prev)?;
        if prev.is_some() {
            self.count -= 1;
        }
        store.save(
            self.root,
            Slab::Root {
                count: self.count,
                node,
            },
        );
        Ok(prev)
    }

    /// Every entry in ascending key order, spilled payloads resolved.
    pub fn entries<L: Ledger>(
        &self,
        store: &mut SlabStore<L>,
    ) -> Result<Vec<(MapKey, StoredValue)>, StrataError> {
        let node = self.load_root_node(store)?;
        let mut out = Vec::with_capacity(self.count as usize);
        Self::collect(store, node, &mut out)?;
        Ok(out)
    }

    /// Check that the entry count declared by the head matches the tree.
    pub fn verify<L: Ledger>(&self, store: &mut SlabStore<L>) -> Result<(), StrataError> {
        let node = self.load_root_node(store)?;
        let actual = Self::count_entries(store, &node)?;
        if actual != self.count {
            return Err(error::map_count_mismatch(self.root, self.count, actual));
        }
        Ok(())
    }

    fn load_root_node<L: Ledger>(&self, store: &mut SlabStore<L>) -> Result<Node, StrataError> {
        match store.load(self.root)? {
            Slab::Root { node, .. } => Ok(node),
            _ => Err(error::unexpected_slab_kind(self.root)),
        }
    }

    fn get_raw<L: Ledger>(
        &self,
        store: &mut SlabStore<L>,
        key: &MapKey,
    ) -> Result<Option<StoredValue>, StrataError> {
        let mut node = self.load_root_node(store)?;
        loop {
            match node {
                Node::Leaf(mut entries) => {
                    return Ok(
                        match entries.binary_search_by(|(k, _)| k.cmp(key)) {
                            Ok(i) => Some(entries.swap_remove(i).1),
                            Err(_) => None,
                        },
                    )
                }
                Node::Branch(children) => {
                    if children.is_empty() {
                        return Ok(None);
                    }
                    let idx = child_index(&children, key);
                    if key < &children[idx].0 {
                        return Ok(None);
                    }
                    node = load_node(store, children[idx].1)?;
                }
            }
        }
    }

    /// Unwrap a spilled value; references to anything but a blob (nested
    /// map heads in particular) pass through untouched.
    fn resolve<L: Ledger>(
        store: &mut SlabStore<L>,
        value: StoredValue,
    ) -> Result<StoredValue, StrataError> {
        if let StoredValue::Slab(id) = value {
            if let Slab::Blob(inner) = store.load(id)? {
                return Ok(inner);
            }
        }
        Ok(value)
    }

    /// Resolve an overwritten or removed value, and delete its spilled slab
    /// if it had one.
    fn take_previous<L: Ledger>(
        store: &mut SlabStore<L>,
        prev: Option<StoredValue>,
    ) -> Result<Option<StoredValue>, StrataError> {
        match prev {
            Some(StoredValue::Slab(id)) => {
                if let Slab::Blob(inner) = store.load(id)? {
                    store.remove(id);
                    Ok(Some(inner))
                } else {
                    Ok(Some(StoredValue::Slab(id)))
                }
            }
            other => Ok(other),
        }
    }

    fn maybe_spill<L: Ledger>(
        &self,
        store: &mut SlabStore<L>,
        value: StoredValue,
    ) -> Result<StoredValue, StrataError> {
        if matches!(value, StoredValue::Slab(_)) {
            return Ok(value);
        }
        let encoded =
            minicbor::to_vec(&value).map_err(|e| StrataError::serialization_error(e))?;
        if encoded.len() <= store.inline_value_limit() {
            return Ok(value);
        }
        let id = store.allocate(self.root.address())?;
        store.save(id, Slab::Blob(value));
        Ok(StoredValue::Slab(id))
    }

    fn insert_node<L: Ledger>(
        store: &mut SlabStore<L>,
        address: Address,
        node: &mut Node,
        key: MapKey,
        value: StoredValue,
    ) -> Result<(Option<StoredValue>, Option<(MapKey, SlabId)>), StrataError> {
        match node {
            Node::Leaf(entries) => {
                let prev = match entries.binary_search_by(|(k, _)| k.cmp(&key)) {
                    Ok(i) => Some(std::mem::replace(&mut entries[i].1, value)),
                    Err(i) => {
                        entries.insert(i, (key, value));
                        None
                    }
                };
                if entries.len() > MAX_LEAF_ENTRIES {
                    let right = entries.split_off(entries.len() / 2);
                    let separator = right[0].0.clone();
                    let right_id = store.allocate(address)?;
                    store.save(right_id, Slab::Node(Node::Leaf(right)));
                    return Ok((prev, Some((separator, right_id))));
                }
                Ok((prev, None))
            }
            Node::Branch(children) => {
                let idx = child_index(children, &key);
                if key < children[idx].0 {
                    // New minimum of the subtree.
                    children[idx].0 = key.clone();
                }
                let child_id = children[idx].1;
                let mut child = load_node(store, child_id)?;
                let (prev, split) = Self::insert_node(store, address, &mut child, key, value)?;
                store.save(child_id, Slab::Node(child));

                if let Some((separator, right)) = split {
                    children.insert(idx + 1, (separator, right));
                    if children.len() > MAX_BRANCH_CHILDREN {
                        let right_children = children.split_off(children.len() / 2);
                        let separator = right_children[0].0.clone();
                        let right_id = store.allocate(address)?;
                        store.save(right_id, Slab::Node(Node::Branch(right_children)));
                        return Ok((prev, Some((separator, right_id))));
                    }
                }
                Ok((prev, None))
            }
        }
    }

    fn remove_node<L: Ledger>(
        store: &mut SlabStore<L>,
        node: &mut Node,
        key: &MapKey,
    ) -> Result<Option<StoredValue>, StrataError> {
        match node {
            Node::Leaf(entries) => Ok(match entries.binary_search_by(|(k, _)| k.cmp(key)) {
                Ok(i) => Some(entries.remove(i).1),
                Err(_) => None,
            }),
            Node::Branch(children) => {
                if children.is_empty() {
                    return Ok(None);
                }
                let idx = child_index(children, key);
                if key < &children[idx].0 {
                    return Ok(None);
                }
                let child_id = children[idx].1;
                let mut child = load_node(store, child_id)?;
                let prev = Self::remove_node(store, &mut child, key)?;
                if prev.is_none() {
                    return Ok(None);
                }

                if child.is_empty() {
                    store.remove(child_id);
                    children.remove(idx);
                    return Ok(prev);
                }
                if let Some(first) = child.first_key() {
                    children[idx].0 = first.clone();
                }

                // Fold an undersized leaf into its right sibling when the
                // result still fits one page.
                if let Node::Leaf(entries) = &mut child {
                    if entries.len() < MIN_LEAF_ENTRIES && idx + 1 < children.len() {
                        let right_id = children[idx + 1].1;
                        if let Node::Leaf(right_entries) = load_node(store, right_id)? {
                            if entries.len() + right_entries.len() <= MAX_LEAF_ENTRIES {
                                entries.extend(right_entries);
                                store.remove(right_id);
                                children.remove(idx + 1);
                            }
                        }
                    }
                }
                store.save(child_id, Slab::Node(child));
                Ok(prev)
            }
        }
    }

    fn collect<L: Ledger>(
        store: &mut SlabStore<L>,
        node: Node,
        out: &mut Vec<(MapKey, StoredValue)>,
    ) -> Result<(), StrataError> {
        match node {
            Node::Leaf(entries) => {
                for (key, value) in entries {
                    out.push((key, Self::resolve(store, value)?));
                }
            }
            Node::Branch(children) => {
                for (_, child_id) in children {
                    let child = load_node(store, child_id)?;
                    Self::collect(store, child, out)?;
                }
            }
        }
        Ok(())
    }

    fn count_entries<L: Ledger>(
        store: &mut SlabStore<L>,
        node: &Node,
    ) -> Result<u64, StrataError> {
        match node {
            Node::Leaf(entries) => Ok(entries.len() as u64),
            Node::Branch(children) => {
                let mut total = 0;
                for (_, child_id) in children {
                    let child = load_node(store, *child_id)?;
                    total += Self::count_entries(store, &child)?;
                }
                Ok(total)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryLedger;

    fn fixture() -> (MemoryLedger, Address) {
        (MemoryLedger::default(), Address::from(1))
    }

    #[test]
    fn insert_get_overwrite_remove() {
        let (mut ledger, address) = fixture();
        let mut store = SlabStore::new(&mut ledger);
        let mut map = SlabMap::new(&mut store, address).unwrap();

        assert_eq!(map.insert(&mut store, "k".into(), 1i64.into()).unwrap(), None);
        assert_eq!(map.len(), 1);
        assert_eq!(
            map.get(&mut store, &"k".into()).unwrap(),
            Some(StoredValue::from(1i64))
        );

        assert_eq!(
            map.insert(&mut store, "k".into(), 2i64.into()).unwrap(),
            Some(StoredValue::from(1i64))
        );
        assert_eq!(map.len(), 1);

        assert_eq!(
            map.remove(&mut store, &"k".into()).unwrap(),
            Some(StoredValue::from(2i64))
        );
        assert!(map.is_empty());
        assert_eq!(map.get(&mut store, &"k".into()).unwrap(), None);
        assert_eq!(map.remove(&mut store, &"k".into()).unwrap(), None);
        map.verify(&mut store).unwrap();
    }

    #[test]
    fn grows_past_many_splits_with_a_stable_root() {
        let (mut ledger, address) = fixture();
        let mut store = SlabStore::new(&mut ledger);
        let mut map = SlabMap::new(&mut store, address).unwrap();
        let root = map.root();

        for i in 0..500i64 {
            map.insert(&mut store, i.into(), (i * 2).into()).unwrap();
        }
        assert_eq!(map.root(), root);
        assert_eq!(map.len(), 500);
        map.verify(&mut store).unwrap();

        for i in 0..500i64 {
            assert_eq!(
                map.get(&mut store, &i.into()).unwrap(),
                Some(StoredValue::from(i * 2)),
                "key {i}"
            );
        }
        assert_eq!(map.get(&mut store, &500i64.into()).unwrap(), None);

        let entries = map.entries(&mut store).unwrap();
        assert_eq!(entries.len(), 500);
        assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn shrinks_back_to_empty() {
        let (mut ledger, address) = fixture();
        let mut store = SlabStore::new(&mut ledger);
        let mut map = SlabMap::new(&mut store, address).unwrap();

        for i in 0..200i64 {
            map.insert(&mut store, i.into(), i.into()).unwrap();
        }
        for i in (0..200i64).rev() {
            assert!(map.remove(&mut store, &i.into()).unwrap().is_some());
        }
        assert!(map.is_empty());
        map.verify(&mut store).unwrap();
        assert_eq!(map.entries(&mut store).unwrap(), vec![]);
    }

    #[test]
    fn mixed_key_kinds_iterate_in_order() {
        let (mut ledger, address) = fixture();
        let mut store = SlabStore::new(&mut ledger);
        let mut map = SlabMap::new(&mut store, address).unwrap();

        map.insert(&mut store, "b".into(), 1i64.into()).unwrap();
        map.insert(&mut store, 10i64.into(), 2i64.into()).unwrap();
        map.insert(&mut store, "a".into(), 3i64.into()).unwrap();
        map.insert(&mut store, (-1i64).into(), 4i64.into()).unwrap();

        let keys: Vec<MapKey> = map
            .entries(&mut store)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(
            keys,
            vec![
                MapKey::from(-1i64),
                MapKey::from(10i64),
                MapKey::from("a"),
                MapKey::from("b"),
            ]
        );
    }

    #[test]
    fn large_values_spill_to_their_own_slab() {
        let (mut ledger, address) = fixture();
        let mut store = SlabStore::new(&mut ledger).with_inline_value_limit(32);
        let mut map = SlabMap::new(&mut store, address).unwrap();

        let big = StoredValue::from(vec![0xabu8; 100]);
        map.insert(&mut store, "big".into(), big.clone()).unwrap();

        // The leaf holds a reference, not the payload.
        let raw = map.get_raw(&mut store, &"big".into()).unwrap().unwrap();
        assert!(matches!(raw, StoredValue::Slab(_)));
        // Reads resolve the indirection.
        assert_eq!(map.get(&mut store, &"big".into()).unwrap(), Some(big.clone()));

        // Overwriting deletes the spilled slab.
        let spill = match raw {
            StoredValue::Slab(id) => id,
            _ => unreachable!(),
        };
        assert_eq!(
            map.insert(&mut store, "big".into(), 1i64.into()).unwrap(),
            Some(big)
        );
        assert!(store.load(spill).is_err());
    }

    #[test]
    fn removing_a_spilled_value_returns_the_payload() {
        let (mut ledger, address) = fixture();
        let mut store = SlabStore::new(&mut ledger).with_inline_value_limit(16);
        let mut map = SlabMap::new(&mut store, address).unwrap();

        let big = StoredValue::from(vec![1u8; 64]);
        map.insert(&mut store, "k".into(), big.clone()).unwrap();
        assert_eq!(map.remove(&mut store, &"k".into()).unwrap(), Some(big));
        assert!(map.is_empty());
    }

    #[test]
    fn nested_map_references_pass_through_unresolved() {
        let (mut ledger, address) = fixture();
        let mut store = SlabStore::new(&mut ledger);
        let inner = SlabMap::new(&mut store, address).unwrap();
        let mut outer = SlabMap::new(&mut store, address).unwrap();

        outer
            .insert(&mut store, "inner".into(), StoredValue::Slab(inner.root()))
            .unwrap();
        assert_eq!(
            outer.get(&mut store, &"inner".into()).unwrap(),
            Some(StoredValue::Slab(inner.root()))
        );

        // Overwriting a nested map reference must not delete the map head.
        outer
            .insert(&mut store, "inner".into(), 0i64.into())
            .unwrap();
        assert!(store.load(inner.root()).is_ok());
    }

    #[test]
    fn survives_commit_and_reopen() {
        let mut ledger = MemoryLedger::default();
        let address = Address::from(4);
        let root = {
            let mut store = SlabStore::new(&mut ledger);
            let mut map = SlabMap::new(&mut store, address).unwrap();
            for i in 0..100i64 {
                map.insert(&mut store, i.into(), (i + 7).into()).unwrap();
            }
            store.commit(4, true).unwrap();
            map.root()
        };

        let mut store = SlabStore::new(&mut ledger);
        let map = SlabMap::open(&mut store, root).unwrap();
        assert_eq!(map.len(), 100);
        for i in 0..100i64 {
            assert_eq!(
                map.get(&mut store, &i.into()).unwrap(),
                Some(StoredValue::from(i + 7))
            );
        }
        map.verify(&mut store).unwrap();
    }
}
