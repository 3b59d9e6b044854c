pub mod address;
pub mod domain;
pub mod key;
pub mod meter;
pub mod slab_id;
pub mod value;

#[cfg(feature = "testing")]
pub mod testing;

pub use address::Address;
pub use domain::Domain;
pub use key::MapKey;
pub use meter::{ComputationKind, Meter, NoMeter};
pub use slab_id::SlabId;
pub use value::StoredValue;
