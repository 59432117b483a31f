use serde::{Deserialize, Serialize};

/// A wallet account derived from one extended public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account index; also the ordering key for listings
    pub account_index: u32,
    /// Optional user-facing name
    pub name: Option<String>,
    /// Serialized extended public key the account derives addresses from
    pub extended_public_key: String,
    /// Next unused key index on the external (receive) chain
    pub next_external_index: u32,
    /// Next unused key index on the internal (change) chain
    pub next_internal_index: u32,
    /// Cached balance in base units, maintained by balance recomputation
    pub balance: i64,
    /// Hidden accounts are excluded from visible listings
    pub hidden: bool,
}

impl Account {
    /// Create a fresh account with no derived addresses and a zero balance
    pub fn new(account_index: u32, extended_public_key: impl Into<String>) -> Self {
        Self {
            account_index,
            name: None,
            extended_public_key: extended_public_key.into(),
            next_external_index: 0,
            next_internal_index: 0,
            balance: 0,
            hidden: false,
        }
    }

    /// An account is visible once it has derived at least one address and is
    /// not hidden
    pub fn is_visible(&self) -> bool {
        (self.next_external_index > 0 || self.next_internal_index > 0) && !self.hidden
    }
}
