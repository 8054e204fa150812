//! Ledger account identifiers.

use std::borrow::Borrow;
use std::fmt;
use syncledger_derive::BinaryCodec;

/// Sender used only by reward transactions synthesized during mining.
pub const ISSUER: &str = "SYSTEM";

/// Opaque account name.
///
/// Accounts are plain strings chosen by callers (node names, wallet labels);
/// the ledger never derives them from key material.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BinaryCodec)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The reserved issuance identifier.
    pub fn issuer() -> Self {
        Self(ISSUER.to_string())
    }

    pub fn is_issuer(&self) -> bool {
        self.0 == ISSUER
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for AccountId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for AccountId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::{Decode, Encode};
    use std::collections::HashMap;

    #[test]
    fn issuer_is_recognized() {
        assert!(AccountId::issuer().is_issuer());
        assert!(AccountId::from(ISSUER).is_issuer());
        assert!(!AccountId::from("miner1").is_issuer());
    }

    #[test]
    fn encodes_as_string() {
        let id = AccountId::from("alice");
        assert_eq!(id.to_bytes(), "alice".to_bytes());
        assert_eq!(AccountId::from_bytes(&id.to_bytes()).unwrap(), id);
    }

    #[test]
    fn map_lookup_by_str() {
        let mut balances = HashMap::new();
        balances.insert(AccountId::from("bob"), 5u128);
        assert_eq!(balances.get("bob"), Some(&5));
    }
}
