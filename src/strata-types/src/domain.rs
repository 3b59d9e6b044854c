use std::str::FromStr;
use strata_error::StrataError;

/// The enumerated set of named namespaces inside an account.
///
/// The identifier of each domain doubles as its legacy (V1) ledger register
/// key and as its entry key inside a V2 account map.
#[derive(
    Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, strum::Display, strum::EnumString,
)]
pub enum Domain {
    #[strum(serialize = "storage")]
    Storage,
    #[strum(serialize = "public")]
    Public,
    #[strum(serialize = "private")]
    Private,
    #[strum(serialize = "contract")]
    Contract,
    #[strum(serialize = "inbox")]
    Inbox,
    #[strum(serialize = "cap_con")]
    CapabilityController,
}

impl Domain {
    /// Every defined domain, in probe order.
    pub const ALL: [Domain; 6] = [
        Domain::Storage,
        Domain::Public,
        Domain::Private,
        Domain::Contract,
        Domain::Inbox,
        Domain::CapabilityController,
    ];

    #[inline]
    pub const fn identifier(&self) -> &'static str {
        match self {
            Domain::Storage => "storage",
            Domain::Public => "public",
            Domain::Private => "private",
            Domain::Contract => "contract",
            Domain::Inbox => "inbox",
            Domain::CapabilityController => "cap_con",
        }
    }

    /// The ledger register key of this domain's V1 root.
    #[inline]
    pub fn register_key(&self) -> &'static [u8] {
        self.identifier().as_bytes()
    }

    pub fn from_identifier(id: &str) -> Result<Self, StrataError> {
        Self::from_str(id).map_err(|_| StrataError::invalid_domain(id))
    }
}
