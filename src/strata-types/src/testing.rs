//! Test helpers. Enabled through the `testing` feature.

use crate::meter::{ComputationKind, Meter};
use crate::Address;
use strata_error::StrataError;

/// A real (non-temporary) address derived from a seed.
pub fn address(seed: u64) -> Address {
    assert_ne!(seed, 0, "seed 0 is the temporary address");
    Address::from(seed)
}

/// A meter that tallies everything it is asked to record.
#[derive(Clone, Debug, Default)]
pub struct RecordingMeter {
    pub computation: Vec<(ComputationKind, u64)>,
    pub memory: u64,
}

impl Meter for RecordingMeter {
    fn meter_computation(
        &mut self,
        kind: ComputationKind,
        intensity: u64,
    ) -> Result<(), StrataError> {
        self.computation.push((kind, intensity));
        Ok(())
    }

    fn meter_memory(&mut self, amount: u64) -> Result<(), StrataError> {
        self.memory += amount;
        Ok(())
    }
}
