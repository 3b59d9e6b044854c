use crate::value::{decode_integer, encode_integer, is_integer_type};
use minicbor::data::Type;
use minicbor::encode::{Error, Write};
use minicbor::{decode, Decode, Decoder, Encode, Encoder};
use num_bigint::BigInt;
use std::fmt::{Display, Formatter};

/// A user-chosen key inside a domain map.
///
/// Integer keys order before string keys; integers order numerically and
/// strings lexicographically. This is the iteration order of a map.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[must_use]
pub enum MapKey {
    Integer(BigInt),
    String(String),
}

impl MapKey {
    pub fn integer(v: impl Into<BigInt>) -> Self {
        Self::Integer(v.into())
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for MapKey {
    fn from(v: i64) -> Self {
        Self::Integer(v.into())
    }
}

impl From<BigInt> for MapKey {
    fn from(v: BigInt) -> Self {
        Self::Integer(v)
    }
}

impl Display for MapKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MapKey::Integer(v) => Display::fmt(v, f),
            MapKey::String(s) => f.write_str(s),
        }
    }
}

impl<C> Encode<C> for MapKey {
    fn encode<W: Write>(&self, e: &mut Encoder<W>, _: &mut C) -> Result<(), Error<W::Error>> {
        match self {
            MapKey::Integer(v) => encode_integer(e, v),
            MapKey::String(s) => {
                e.str(s)?;
                Ok(())
            }
        }
    }
}

impl<'b, C> Decode<'b, C> for MapKey {
    fn decode(d: &mut Decoder<'b>, _: &mut C) -> Result<Self, decode::Error> {
        match d.datatype()? {
            Type::String => Ok(Self::String(d.str()?.to_string())),
            t if is_integer_type(t) => Ok(Self::Integer(decode_integer(d)?)),
            _ => Err(decode::Error::message("Expected map key.")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_sort_before_strings() {
        let mut keys = vec![
            MapKey::from("b"),
            MapKey::from(10i64),
            MapKey::from("a"),
            MapKey::from(-3i64),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                MapKey::from(-3i64),
                MapKey::from(10i64),
                MapKey::from("a"),
                MapKey::from("b"),
            ]
        );
    }

    #[test]
    fn cbor_round_trip() {
        for key in [
            MapKey::from("counter"),
            MapKey::from(0i64),
            MapKey::from(i64::MIN),
            MapKey::Integer(BigInt::from(u64::MAX) * 3),
        ] {
            let bytes = minicbor::to_vec(&key).unwrap();
            assert_eq!(minicbor::decode::<MapKey>(&bytes).unwrap(), key);
        }
    }
}
