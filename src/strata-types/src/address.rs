use minicbor::data::Type;
use minicbor::encode::{Error, Write};
use minicbor::{decode, Decode, Decoder, Encode, Encoder};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use strata_error::StrataError;

/// Number of bytes in an account address.
pub const ADDRESS_BYTES: usize = 8;

/// An on-chain account identifier.
///
/// Addresses order lexicographically over their raw bytes, which is also
/// their numeric big-endian order. The all-zero address is reserved as the
/// scratch-slab sentinel and never denotes a real account.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[must_use]
pub struct Address([u8; ADDRESS_BYTES]);

impl Address {
    /// Sentinel owner of scratch slabs. Slabs held by this address are
    /// dropped at commit instead of being written to the ledger.
    pub const TEMP: Address = Address([0u8; ADDRESS_BYTES]);

    pub const fn new(bytes: [u8; ADDRESS_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StrataError> {
        let bytes: [u8; ADDRESS_BYTES] = bytes
            .try_into()
            .map_err(|_| StrataError::invalid_address(hex::encode(bytes)))?;
        Ok(Self(bytes))
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_BYTES] {
        &self.0
    }

    #[inline]
    pub fn to_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }

    #[inline]
    pub fn is_temporary(&self) -> bool {
        self == &Self::TEMP
    }
}

impl From<u64> for Address {
    fn from(v: u64) -> Self {
        Self(v.to_be_bytes())
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Address")
            .field(&format!("0x{}", hex::encode(self.0)))
            .finish()
    }
}

impl FromStr for Address {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|_| StrataError::invalid_address(s))?;
        Self::from_bytes(&bytes)
    }
}

impl<C> Encode<C> for Address {
    fn encode<W: Write>(&self, e: &mut Encoder<W>, _: &mut C) -> Result<(), Error<W::Error>> {
        e.bytes(&self.0)?;
        Ok(())
    }
}

impl<'b, C> Decode<'b, C> for Address {
    fn decode(d: &mut Decoder<'b>, _: &mut C) -> Result<Self, decode::Error> {
        if d.datatype()? != Type::Bytes {
            return Err(decode::Error::message("Expected address bytes."));
        }
        Self::from_bytes(d.bytes()?)
            .map_err(|_| decode::Error::message("Invalid address length."))
    }
}
