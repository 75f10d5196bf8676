use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{AuthorityError, MeridianResult},
    protocol::AccountId,
};

/// An opaque signing key. Key formats and signature verification are a
/// cryptographic primitive supplied by the consensus collaborator; the core
/// only compares keys for identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub String);

impl PublicKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for PublicKey {
    fn from(key: &str) -> Self {
        Self(key.to_owned())
    }
}

/// A weighted-threshold authority over accounts and keys.
///
/// Satisfied when the weights of the satisfied members reach
/// `weight_threshold`. Account members recurse into that account's own
/// authority, bounded by the chain's signature-check depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub weight_threshold: u32,
    pub account_auths: BTreeMap<AccountId, u16>,
    pub key_auths: BTreeMap<PublicKey, u16>,
}

impl Authority {
    /// Single-key authority with threshold 1.
    pub fn key(key: PublicKey) -> Self {
        Self {
            weight_threshold: 1,
            account_auths: BTreeMap::new(),
            key_auths: BTreeMap::from([(key, 1)]),
        }
    }

    /// Single-account authority with threshold 1.
    pub fn account(account: AccountId) -> Self {
        Self {
            weight_threshold: 1,
            account_auths: BTreeMap::from([(account, 1)]),
            key_auths: BTreeMap::new(),
        }
    }

    /// An authority no signature set can ever satisfy. Used to permanently
    /// disable an account (e.g. the null account).
    pub fn impossible() -> Self {
        Self {
            weight_threshold: 1,
            account_auths: BTreeMap::new(),
            key_auths: BTreeMap::new(),
        }
    }

    pub fn num_auths(&self) -> usize {
        self.account_auths.len() + self.key_auths.len()
    }

    pub fn is_impossible(&self) -> bool {
        let total: u64 = self
            .account_auths
            .values()
            .chain(self.key_auths.values())
            .map(|w| u64::from(*w))
            .sum();
        total < u64::from(self.weight_threshold)
    }

    pub fn validate(&self) -> MeridianResult<()> {
        if self.weight_threshold == 0 {
            return Err(AuthorityError::ImpossibleAuthority.into());
        }
        Ok(())
    }
}

impl Default for Authority {
    fn default() -> Self {
        Self::impossible()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_authority_is_impossible() {
        assert!(Authority::impossible().is_impossible());
        assert!(!Authority::key(PublicKey::from("k1")).is_impossible());
    }

    #[test]
    fn underweighted_authority_is_impossible() {
        let auth = Authority {
            weight_threshold: 3,
            account_auths: BTreeMap::from([(AccountId(1), 1)]),
            key_auths: BTreeMap::from([(PublicKey::from("k"), 1)]),
        };
        assert!(auth.is_impossible());
    }
}
