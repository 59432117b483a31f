use std::fmt;

use serde::{Deserialize, Serialize};

/// First hardened child index; relative wallet paths stay below it
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Chain index of the external (receive) chain
pub const EXTERNAL_CHAIN: u32 = 0;
/// Chain index of the internal (change) chain
pub const INTERNAL_CHAIN: u32 = 1;

/// Relative BIP32 derivation path of an address: `account' / chain / key`
///
/// The canonical textual form is `/<account>'/<chain>/<key>`, e.g. `/0'/1/5`
/// for key 5 on the change chain of account 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivationPath {
    /// Index of the owning account (hardened level)
    pub account_index: u32,
    /// 0 = external (receive), 1 = internal (change)
    pub chain_index: u32,
    /// Key index within the chain
    pub key_index: u32,
}

impl DerivationPath {
    pub fn new(account_index: u32, chain_index: u32, key_index: u32) -> Self {
        Self {
            account_index,
            chain_index,
            key_index,
        }
    }

    /// Path on the external (receive) chain of an account
    pub fn external(account_index: u32, key_index: u32) -> Self {
        Self::new(account_index, EXTERNAL_CHAIN, key_index)
    }

    /// Path on the internal (change) chain of an account
    pub fn internal(account_index: u32, key_index: u32) -> Self {
        Self::new(account_index, INTERNAL_CHAIN, key_index)
    }

    /// BIP32 conformance: the account level stays below the hardened offset,
    /// the chain is external or internal, and the key index is non-hardened
    pub fn conforms_to_bip32(&self) -> bool {
        self.account_index < HARDENED_OFFSET
            && (self.chain_index == EXTERNAL_CHAIN || self.chain_index == INTERNAL_CHAIN)
            && self.key_index < HARDENED_OFFSET
    }

    pub fn is_external(&self) -> bool {
        self.chain_index == EXTERNAL_CHAIN
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{}'/{}/{}",
            self.account_index, self.chain_index, self.key_index
        )
    }
}

/// A derived address owned by exactly one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Address string; globally unique across the wallet
    pub address: String,
    /// Relative derivation path that produced the address
    pub path: DerivationPath,
}

impl Address {
    pub fn new(address: impl Into<String>, path: DerivationPath) -> Self {
        Self {
            address: address.into(),
            path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_string_is_canonical() {
        assert_eq!(DerivationPath::new(0, 1, 5).to_string(), "/0'/1/5");
        assert_eq!(DerivationPath::external(3, 0).to_string(), "/3'/0/0");
    }

    #[test]
    fn conformance_accepts_both_chains() {
        assert!(DerivationPath::external(0, 0).conforms_to_bip32());
        assert!(DerivationPath::internal(7, 42).conforms_to_bip32());
    }

    #[test]
    fn conformance_rejects_unknown_chain() {
        assert!(!DerivationPath::new(0, 2, 0).conforms_to_bip32());
    }

    #[test]
    fn conformance_rejects_hardened_indexes() {
        assert!(!DerivationPath::new(HARDENED_OFFSET, 0, 0).conforms_to_bip32());
        assert!(!DerivationPath::new(0, 0, HARDENED_OFFSET).conforms_to_bip32());
    }
}
