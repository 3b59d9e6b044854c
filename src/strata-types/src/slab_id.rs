use crate::address::{Address, ADDRESS_BYTES};
use minicbor::data::Type;
use minicbor::encode::{Error, Write};
use minicbor::{decode, Decode, Decoder, Encode, Encoder};
use std::fmt::{Debug, Display, Formatter};

/// Prefix byte of slab register keys on the ledger.
pub const SLAB_KEY_PREFIX: u8 = 0x00;

/// Length of a slab register key: prefix + little-endian index.
pub const SLAB_KEY_BYTES: usize = 9;

/// An address-scoped reference to one slab.
///
/// Ordering is `(address, index)`, which makes a sorted run of slab ids
/// group by account and ascend within it.
#[derive(Copy, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[must_use]
pub struct SlabId {
    address: Address,
    index: u64,
}

impl SlabId {
    pub const fn new(address: Address, index: u64) -> Self {
        Self { address, index }
    }

    #[inline]
    pub const fn address(&self) -> Address {
        self.address
    }

    #[inline]
    pub const fn index(&self) -> u64 {
        self.index
    }

    #[inline]
    pub fn is_temporary(&self) -> bool {
        self.address.is_temporary()
    }

    /// The ledger register key this slab is stored under.
    pub fn register_key(&self) -> [u8; SLAB_KEY_BYTES] {
        let mut key = [0u8; SLAB_KEY_BYTES];
        key[0] = SLAB_KEY_PREFIX;
        key[1..].copy_from_slice(&self.index.to_le_bytes());
        key
    }
}

impl Display for SlabId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.index)
    }
}

impl Debug for SlabId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SlabId({self})")
    }
}

impl<C> Encode<C> for SlabId {
    fn encode<W: Write>(&self, e: &mut Encoder<W>, _: &mut C) -> Result<(), Error<W::Error>> {
        let mut bytes = [0u8; ADDRESS_BYTES + 8];
        bytes[..ADDRESS_BYTES].copy_from_slice(self.address.as_bytes());
        bytes[ADDRESS_BYTES..].copy_from_slice(&self.index.to_le_bytes());
        e.bytes(&bytes)?;
        Ok(())
    }
}

impl<'b, C> Decode<'b, C> for SlabId {
    fn decode(d: &mut Decoder<'b>, _: &mut C) -> Result<Self, decode::Error> {
        if d.datatype()? != Type::Bytes {
            return Err(decode::Error::message("Expected slab id bytes."));
        }
        let bytes = d.bytes()?;
        if bytes.len() != ADDRESS_BYTES + 8 {
            return Err(decode::Error::message("Invalid slab id length."));
        }
        let address = Address::from_bytes(&bytes[..ADDRESS_BYTES])
            .map_err(|_| decode::Error::message("Invalid slab id address."))?;
        let mut index = [0u8; 8];
        index.copy_from_slice(&bytes[ADDRESS_BYTES..]);
        Ok(Self::new(address, u64::from_le_bytes(index)))
    }
}
