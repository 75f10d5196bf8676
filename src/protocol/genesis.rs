use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ChainError, MeridianResult},
    protocol::{ChainParameters, PublicKey, Share},
};

/// Identity of a chain: the digest of its canonical genesis serialization.
/// Two nodes agree on state only if they agree on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub [u8; 32]);

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub name: String,
    pub owner_key: PublicKey,
    pub active_key: PublicKey,
    #[serde(default)]
    pub is_lifetime_member: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisBalance {
    /// Account name; must match one of the genesis accounts.
    pub owner: String,
    /// Core-asset base units.
    pub amount: Share,
}

/// Everything needed to bootstrap a chain from nothing. Operator-facing and
/// loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisState {
    pub initial_timestamp: DateTime<Utc>,
    pub core_asset_symbol: String,
    pub core_asset_precision: u8,
    pub initial_parameters: ChainParameters,
    pub initial_accounts: Vec<GenesisAccount>,
    pub initial_balances: Vec<GenesisBalance>,
    /// Names of genesis accounts acting as the initial witness set.
    pub initial_witnesses: Vec<String>,
    /// Names of genesis accounts forming the initial committee.
    pub initial_committee: Vec<String>,
}

impl GenesisState {
    pub fn chain_id(&self) -> ChainId {
        let bytes = postcard::to_allocvec(self).unwrap_or_default();
        ChainId(*blake3::hash(&bytes).as_bytes())
    }

    pub fn from_json(json: &str) -> MeridianResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ChainError::SnapshotCorrupt(format!("genesis: {e}")).into())
    }

    pub fn to_json(&self) -> MeridianResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ChainError::SnapshotCorrupt(format!("genesis: {e}")).into())
    }

    /// A single-witness development chain; the starting point for tests and
    /// local networks.
    pub fn development(genesis_key: PublicKey) -> Self {
        Self {
            initial_timestamp: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            core_asset_symbol: "CORE".to_owned(),
            core_asset_precision: 5,
            initial_parameters: ChainParameters::default(),
            initial_accounts: vec![GenesisAccount {
                name: "init0".to_owned(),
                owner_key: genesis_key.clone(),
                active_key: genesis_key,
                is_lifetime_member: true,
            }],
            initial_balances: vec![GenesisBalance {
                owner: "init0".to_owned(),
                amount: Share(1_000_000_000_000),
            }],
            initial_witnesses: vec!["init0".to_owned()],
            initial_committee: vec!["init0".to_owned()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_id_tracks_content() {
        let a = GenesisState::development(PublicKey::from("k1"));
        let mut b = a.clone();
        assert_eq!(a.chain_id(), b.chain_id());
        b.core_asset_symbol = "TEST".to_owned();
        assert_ne!(a.chain_id(), b.chain_id());
    }

    #[test]
    fn genesis_round_trips_through_json() {
        let g = GenesisState::development(PublicKey::from("k1"));
        let parsed = GenesisState::from_json(&g.to_json().unwrap()).unwrap();
        assert_eq!(g, parsed);
    }
}
