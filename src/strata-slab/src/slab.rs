use minicbor::data::Tag;
use minicbor::encode::{Error, Write};
use minicbor::{decode, Decode, Decoder, Encode, Encoder};
use strata_types::value::tag;
use strata_types::{MapKey, SlabId, StoredValue};

/// One interior page of a slab map.
///
/// A leaf holds the map entries themselves, sorted by key. A branch holds
/// `(separator, child)` pairs where each separator is the smallest key of
/// its child's subtree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Node {
    Leaf(Vec<(MapKey, StoredValue)>),
    Branch(Vec<(MapKey, SlabId)>),
}

impl Node {
    pub fn first_key(&self) -> Option<&MapKey> {
        match self {
            Node::Leaf(entries) => entries.first().map(|(k, _)| k),
            Node::Branch(children) => children.first().map(|(k, _)| k),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Node::Leaf(entries) => entries.is_empty(),
            Node::Branch(children) => children.is_empty(),
        }
    }

    fn collect_child_ids(&self, out: &mut Vec<SlabId>) {
        match self {
            Node::Leaf(entries) => {
                for (_, value) in entries {
                    value.collect_slab_refs(out);
                }
            }
            Node::Branch(children) => {
                for (_, child) in children {
                    out.push(*child);
                }
            }
        }
    }
}

/// One encoded page of the slab store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Slab {
    /// Fixed-id head of a slab map. The id of a root never changes for the
    /// lifetime of its map, so the register pointing at it is written once.
    Root { count: u64, node: Node },
    /// Interior page of a slab map.
    Node(Node),
    /// A single storable too large to inline in its parent page.
    Blob(StoredValue),
}

impl Slab {
    /// Every slab directly referenced by this one.
    pub fn child_ids(&self) -> Vec<SlabId> {
        let mut out = Vec::new();
        match self {
            Slab::Root { node, .. } | Slab::Node(node) => node.collect_child_ids(&mut out),
            Slab::Blob(value) => value.collect_slab_refs(&mut out),
        }
        out
    }
}

const NODE_LEAF: u8 = 0;
const NODE_BRANCH: u8 = 1;

impl<C> Encode<C> for Node {
    fn encode<W: Write>(&self, e: &mut Encoder<W>, ctx: &mut C) -> Result<(), Error<W::Error>> {
        e.array(2)?;
        match self {
            Node::Leaf(entries) => {
                e.u8(NODE_LEAF)?;
                e.array(entries.len() as u64)?;
                for (key, value) in entries {
                    e.array(2)?;
                    key.encode(e, ctx)?;
                    value.encode(e, ctx)?;
                }
            }
            Node::Branch(children) => {
                e.u8(NODE_BRANCH)?;
                e.array(children.len() as u64)?;
                for (key, child) in children {
                    e.array(2)?;
                    key.encode(e, ctx)?;
                    child.encode(e, ctx)?;
                }
            }
        }
        Ok(())
    }
}

impl<'b, C> Decode<'b, C> for Node {
    fn decode(d: &mut Decoder<'b>, ctx: &mut C) -> Result<Self, decode::Error> {
        if d.array()? != Some(2) {
            return Err(decode::Error::message("Invalid node header."));
        }
        let kind = d.u8()?;
        let len = d
            .array()?
            .ok_or_else(|| decode::Error::message("Unsupported indefinite node."))?;
        match kind {
            NODE_LEAF => {
                let mut entries = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    if d.array()? != Some(2) {
                        return Err(decode::Error::message("Invalid leaf entry."));
                    }
                    let key = MapKey::decode(d, ctx)?;
                    let value = StoredValue::decode(d, ctx)?;
                    entries.push((key, value));
                }
                Ok(Node::Leaf(entries))
            }
            NODE_BRANCH => {
                let mut children = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    if d.array()? != Some(2) {
                        return Err(decode::Error::message("Invalid branch entry."));
                    }
                    let key = MapKey::decode(d, ctx)?;
                    let child = SlabId::decode(d, ctx)?;
                    children.push((key, child));
                }
                Ok(Node::Branch(children))
            }
            _ => Err(decode::Error::message("Unknown node kind.")),
        }
    }
}

impl<C> Encode<C> for Slab {
    fn encode<W: Write>(&self, e: &mut Encoder<W>, ctx: &mut C) -> Result<(), Error<W::Error>> {
        match self {
            Slab::Root { count, node } => {
                e.tag(Tag::Unassigned(tag::SLAB_ROOT))?;
                e.array(2)?.u64(*count)?;
                node.encode(e, ctx)?;
            }
            Slab::Node(node) => {
                e.tag(Tag::Unassigned(tag::SLAB_NODE))?;
                node.encode(e, ctx)?;
            }
            Slab::Blob(value) => {
                e.tag(Tag::Unassigned(tag::SLAB_BLOB))?;
                value.encode(e, ctx)?;
            }
        }
        Ok(())
    }
}

impl<'b, C> Decode<'b, C> for Slab {
    fn decode(d: &mut Decoder<'b>, ctx: &mut C) -> Result<Self, decode::Error> {
        match d.tag()? {
            Tag::Unassigned(tag::SLAB_ROOT) => {
                if d.array()? != Some(2) {
                    return Err(decode::Error::message("Invalid root slab header."));
                }
                let count = d.u64()?;
                let node = Node::decode(d, ctx)?;
                Ok(Slab::Root { count, node })
            }
            Tag::Unassigned(tag::SLAB_NODE) => Ok(Slab::Node(Node::decode(d, ctx)?)),
            Tag::Unassigned(tag::SLAB_BLOB) => Ok(Slab::Blob(StoredValue::decode(d, ctx)?)),
            _ => Err(decode::Error::message("Unknown slab tag.")),
        }
    }
}
