use crate::address::Address;
use crate::slab_id::SlabId;
use minicbor::data::{Tag, Type};
use minicbor::encode::{Error, Write};
use minicbor::{decode, Decode, Decoder, Encode, Encoder};
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::cast::ToPrimitive;

/// CBOR tag numbers owned by the engine. All of them are reserved and must
/// not be reused for new encodings, including the decode-only legacy tags.
pub mod tag {
    /// Reference to a stored slab (spilled storable or nested map root).
    pub const SLAB_REF: u64 = 208;
    /// Head slab of a slab map.
    pub const SLAB_ROOT: u64 = 209;
    /// Interior slab of a slab map.
    pub const SLAB_NODE: u64 = 210;
    /// Slab holding one spilled storable.
    pub const SLAB_BLOB: u64 = 211;

    /// An account address value.
    pub const ADDRESS: u64 = 225;
    /// A link value.
    pub const LINK: u64 = 226;

    /// Legacy public link value. Decoded as [`LINK`], never encoded.
    pub const LEGACY_PUBLIC_LINK: u64 = 228;
    /// Legacy private link value. Decoded as [`LINK`], never encoded.
    pub const LEGACY_PRIVATE_LINK: u64 = 229;
}

/// A value stored inside a domain map.
///
/// The variant set is closed; decoding dispatches on the CBOR type or tag
/// and encoding dispatches on the variant.
#[derive(Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum StoredValue {
    Bool(bool),
    Integer(BigInt),
    String(String),
    Bytes(Vec<u8>),
    Address(Address),
    Array(Vec<StoredValue>),
    Link { target: String },
    /// Reference to a slab holding the actual payload. Produced by the
    /// store when a value is too large to inline; never written by callers.
    Slab(SlabId),
}

impl StoredValue {
    pub fn integer(v: impl Into<BigInt>) -> Self {
        Self::Integer(v.into())
    }

    /// Collect every slab referenced by this value, transitively through
    /// arrays. Used by the reachability walk.
    pub fn collect_slab_refs(&self, out: &mut Vec<SlabId>) {
        match self {
            StoredValue::Slab(id) => out.push(*id),
            StoredValue::Array(items) => {
                for item in items {
                    item.collect_slab_refs(out);
                }
            }
            _ => {}
        }
    }
}

impl From<bool> for StoredValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for StoredValue {
    fn from(v: i64) -> Self {
        Self::Integer(v.into())
    }
}

impl From<&str> for StoredValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Vec<u8>> for StoredValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Address> for StoredValue {
    fn from(a: Address) -> Self {
        Self::Address(a)
    }
}

pub(crate) fn encode_integer<W: Write>(
    e: &mut Encoder<W>,
    v: &BigInt,
) -> Result<(), Error<W::Error>> {
    // Encode efficiently: native ints when they fit, bignums otherwise.
    if let Some(v) = v.to_i64() {
        e.i64(v)?;
    } else if let Some(v) = v.to_u64() {
        e.u64(v)?;
    } else if v.sign() == Sign::Minus {
        let magnitude: BigInt = -v - 1;
        e.tag(Tag::NegBignum)?.bytes(&magnitude.to_bytes_be().1)?;
    } else {
        e.tag(Tag::PosBignum)?.bytes(&v.to_bytes_be().1)?;
    }
    Ok(())
}

pub(crate) fn is_integer_type(t: Type) -> bool {
    matches!(
        t,
        Type::U8
            | Type::U16
            | Type::U32
            | Type::U64
            | Type::I8
            | Type::I16
            | Type::I32
            | Type::I64
            | Type::Int
            | Type::Tag
    )
}

pub(crate) fn decode_integer(d: &mut Decoder<'_>) -> Result<BigInt, decode::Error> {
    match d.datatype()? {
        Type::U8 | Type::U16 | Type::U32 | Type::U64 => Ok(d.u64()?.into()),
        Type::I8 | Type::I16 | Type::I32 | Type::I64 => Ok(d.i64()?.into()),
        Type::Int => Ok(i128::from(d.int()?).into()),
        Type::Tag => match d.tag()? {
            Tag::PosBignum => Ok(BigInt::from_biguint(
                Sign::Plus,
                BigUint::from_bytes_be(d.bytes()?),
            )),
            Tag::NegBignum => {
                let magnitude = BigInt::from_biguint(Sign::Plus, BigUint::from_bytes_be(d.bytes()?));
                Ok(-magnitude - 1)
            }
            _ => Err(decode::Error::message("Invalid integer tag.")),
        },
        _ => Err(decode::Error::message("Expected integer.")),
    }
}

impl<C> Encode<C> for StoredValue {
    fn encode<W: Write>(&self, e: &mut Encoder<W>, ctx: &mut C) -> Result<(), Error<W::Error>> {
        match self {
            StoredValue::Bool(v) => {
                e.bool(*v)?;
            }
            StoredValue::Integer(v) => encode_integer(e, v)?,
            StoredValue::String(s) => {
                e.str(s)?;
            }
            StoredValue::Bytes(b) => {
                e.bytes(b)?;
            }
            StoredValue::Address(a) => {
                e.tag(Tag::Unassigned(tag::ADDRESS))?;
                a.encode(e, ctx)?;
            }
            StoredValue::Array(items) => {
                e.array(items.len() as u64)?;
                for item in items {
                    item.encode(e, ctx)?;
                }
            }
            StoredValue::Link { target } => {
                e.tag(Tag::Unassigned(tag::LINK))?.str(target)?;
            }
            StoredValue::Slab(id) => {
                e.tag(Tag::Unassigned(tag::SLAB_REF))?;
                id.encode(e, ctx)?;
            }
        }
        Ok(())
    }
}

impl<'b, C> Decode<'b, C> for StoredValue {
    fn decode(d: &mut Decoder<'b>, ctx: &mut C) -> Result<Self, decode::Error> {
        match d.datatype()? {
            Type::Bool => Ok(Self::Bool(d.bool()?)),
            Type::String => Ok(Self::String(d.str()?.to_string())),
            Type::Bytes => Ok(Self::Bytes(d.bytes()?.to_vec())),
            Type::Array => {
                let len = d
                    .array()?
                    .ok_or_else(|| decode::Error::message("Unsupported indefinite array."))?;
                let mut items = Vec::new();
                for _ in 0..len {
                    items.push(Self::decode(d, ctx)?);
                }
                Ok(Self::Array(items))
            }
            Type::Tag => match d.tag()? {
                Tag::PosBignum => Ok(Self::Integer(BigInt::from_biguint(
                    Sign::Plus,
                    BigUint::from_bytes_be(d.bytes()?),
                ))),
                Tag::NegBignum => {
                    let magnitude =
                        BigInt::from_biguint(Sign::Plus, BigUint::from_bytes_be(d.bytes()?));
                    Ok(Self::Integer(-magnitude - 1))
                }
                Tag::Unassigned(tag::ADDRESS) => Ok(Self::Address(Address::decode(d, ctx)?)),
                Tag::Unassigned(
                    tag::LINK | tag::LEGACY_PUBLIC_LINK | tag::LEGACY_PRIVATE_LINK,
                ) => Ok(Self::Link {
                    target: d.str()?.to_string(),
                }),
                Tag::Unassigned(tag::SLAB_REF) => Ok(Self::Slab(SlabId::decode(d, ctx)?)),
                _ => Err(decode::Error::message("Unrecognized value tag.")),
            },
            t if is_integer_type(t) => Ok(Self::Integer(decode_integer(d)?)),
            _ => Err(decode::Error::message("Unrecognized value type.")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: &StoredValue) -> StoredValue {
        let bytes = minicbor::to_vec(v).unwrap();
        minicbor::decode(&bytes).unwrap()
    }

    #[test]
    fn scalar_round_trips() {
        for v in [
            StoredValue::Bool(true),
            StoredValue::integer(0i64),
            StoredValue::integer(i64::MIN),
            StoredValue::Integer(BigInt::from(u64::MAX) + 1),
            StoredValue::Integer(-(BigInt::from(u64::MAX) + 2i64)),
            StoredValue::from("hello"),
            StoredValue::from(vec![0u8, 1, 2]),
            StoredValue::from(Address::from(3)),
        ] {
            assert_eq!(round_trip(&v), v);
        }
    }

    #[test]
    fn nested_array_round_trip() {
        let v = StoredValue::Array(vec![
            StoredValue::integer(1i64),
            StoredValue::Array(vec![StoredValue::from("x")]),
        ]);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn integers_prefer_native_encoding() {
        let bytes = minicbor::to_vec(StoredValue::integer(7i64)).unwrap();
        assert_eq!(bytes, vec![0x07]);
        let bytes = minicbor::to_vec(StoredValue::Integer(BigInt::from(u64::MAX))).unwrap();
        // Still a native u64, no bignum tag.
        assert_eq!(bytes[0], 0x1b);
    }

    #[test]
    fn legacy_link_tags_decode_but_are_not_emitted() {
        for legacy in [tag::LEGACY_PUBLIC_LINK, tag::LEGACY_PRIVATE_LINK] {
            let mut bytes = Vec::new();
            let mut e = Encoder::new(&mut bytes);
            e.tag(Tag::Unassigned(legacy)).unwrap().str("dest").unwrap();

            let v: StoredValue = minicbor::decode(&bytes).unwrap();
            assert_eq!(
                v,
                StoredValue::Link {
                    target: "dest".to_string()
                }
            );

            // Re-encoding emits the current link tag.
            let out = minicbor::to_vec(&v).unwrap();
            let mut d = Decoder::new(&out);
            assert_eq!(d.tag().unwrap(), Tag::Unassigned(tag::LINK));
        }
    }

    #[test]
    fn collects_slab_refs_through_arrays() {
        let a = SlabId::new(Address::from(1), 10);
        let b = SlabId::new(Address::from(1), 11);
        let v = StoredValue::Array(vec![
            StoredValue::Slab(a),
            StoredValue::Array(vec![StoredValue::Slab(b), StoredValue::Bool(false)]),
        ]);
        let mut refs = Vec::new();
        v.collect_slab_refs(&mut refs);
        assert_eq!(refs, vec![a, b]);
    }
}
