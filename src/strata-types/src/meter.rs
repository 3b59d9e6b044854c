use strata_error::StrataError;

/// What a unit of metered computation was spent on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, strum::Display)]
pub enum ComputationKind {
    #[strum(serialize = "domain-lookup")]
    DomainLookup,
    #[strum(serialize = "slab-flush")]
    SlabFlush,
    #[strum(serialize = "account-migration")]
    AccountMigration,
}

/// The interpreter's computation meter and memory gauge, seen from the
/// storage engine. A meter may refuse further work, which aborts the
/// current transaction.
pub trait Meter {
    fn meter_computation(
        &mut self,
        kind: ComputationKind,
        intensity: u64,
    ) -> Result<(), StrataError>;

    fn meter_memory(&mut self, amount: u64) -> Result<(), StrataError>;
}

/// A meter that accepts everything. Used by offline tools and tests.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoMeter;

impl Meter for NoMeter {
    fn meter_computation(&mut self, _: ComputationKind, _: u64) -> Result<(), StrataError> {
        Ok(())
    }

    fn meter_memory(&mut self, _: u64) -> Result<(), StrataError> {
        Ok(())
    }
}
