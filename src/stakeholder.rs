//! Stakeholder registry records: a wallet bound to a fixed supply chain role.

use std::fmt;

/// Pipeline roles in stage order. A wallet registers as exactly one role and
/// keeps it for life, there is no role-change operation.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum Role {
    #[n(0)]
    Farmer,
    #[n(1)]
    Distributor,
    #[n(2)]
    Retailer,
    #[n(3)]
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::Farmer => "Farmer",
            Role::Distributor => "Distributor",
            Role::Retailer => "Retailer",
            Role::Consumer => "Consumer",
        };
        write!(f, "{label}")
    }
}

// Key in the registry tree is the wallet address itself.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct Stakeholder {
    #[n(0)]
    pub wallet: String, // bech32 encoded
    #[n(1)]
    pub role: Role,
    #[n(2)]
    pub name: String,
    #[n(3)]
    pub organization: String,
    #[n(4)]
    pub is_registered: bool,
}

impl Stakeholder {
    pub fn new(wallet: String, role: Role, name: String, organization: String) -> Self {
        Self {
            wallet,
            role,
            name,
            organization,
            is_registered: true,
        }
    }

    /// Sentinel returned by lookups for unknown wallets. Callers must check
    /// `is_registered` explicitly, the `role` field carries no meaning here.
    pub fn unregistered(wallet: String) -> Self {
        Self {
            wallet,
            role: Role::Farmer,
            name: String::new(),
            organization: String::new(),
            is_registered: false,
        }
    }
}
