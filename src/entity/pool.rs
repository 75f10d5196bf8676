use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{MeridianResult, StateError},
    protocol::{AccountId, AssetAmount, AssetId, LiquidityPoolId, ObjectTag, Share},
    store::{SecondaryIndexes, StoredObject},
};

/// A constant-product pool between `asset_a < asset_b`, with ownership
/// tracked by a dedicated share asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityPoolObject {
    pub id: LiquidityPoolId,
    pub owner: AccountId,
    pub asset_a: AssetId,
    pub asset_b: AssetId,
    pub balance_a: Share,
    pub balance_b: Share,
    pub share_asset: AssetId,
    /// Fee on the amount paid out by the pool, 1/10000, accrued to the pool
    /// itself.
    pub taker_fee_percent: u16,
    /// Fee withheld from withdrawals, 1/10000.
    pub withdrawal_fee_percent: u16,
    /// The product `balance_a * balance_b` the next exchange must preserve.
    pub virtual_value: u128,
}

impl LiquidityPoolObject {
    pub fn is_initialized(&self) -> bool {
        self.balance_a.is_positive() && self.balance_b.is_positive()
    }

    pub fn balance_of(&self, asset: AssetId) -> MeridianResult<Share> {
        if asset == self.asset_a {
            Ok(self.balance_a)
        } else if asset == self.asset_b {
            Ok(self.balance_b)
        } else {
            Err(StateError::AssetTypeMismatch {
                expected: self.asset_a,
                got: asset,
            }
            .into())
        }
    }

    /// The asset paid out when `sold` is paid in.
    pub fn counter_asset(&self, sold: AssetId) -> MeridianResult<AssetId> {
        if sold == self.asset_a {
            Ok(self.asset_b)
        } else if sold == self.asset_b {
            Ok(self.asset_a)
        } else {
            Err(StateError::AssetTypeMismatch {
                expected: self.asset_a,
                got: sold,
            }
            .into())
        }
    }

    pub fn amount_a(&self) -> AssetAmount {
        AssetAmount::new(self.balance_a, self.asset_a)
    }

    pub fn amount_b(&self) -> AssetAmount {
        AssetAmount::new(self.balance_b, self.asset_b)
    }

    pub fn update_virtual_value(&mut self) {
        self.virtual_value = (self.balance_a.0 as u128) * (self.balance_b.0 as u128);
    }
}

impl StoredObject for LiquidityPoolObject {
    const TAG: ObjectTag = ObjectTag::LiquidityPool;
    const SCHEMA: &'static str = "liquidity-pool-v1";
    type Id = LiquidityPoolId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Default)]
pub struct LiquidityPoolIndexes {
    /// Share assets map 1:1 to pools.
    pub by_share_asset: BTreeMap<AssetId, u64>,
    /// All pools trading a pair, either orientation.
    pub by_pair: BTreeMap<(AssetId, AssetId), Vec<u64>>,
}

impl SecondaryIndexes<LiquidityPoolObject> for LiquidityPoolIndexes {
    fn insert(&mut self, obj: &LiquidityPoolObject) -> MeridianResult<()> {
        if self.by_share_asset.contains_key(&obj.share_asset) {
            return Err(StateError::Precondition("share asset already backs a pool").into());
        }
        self.by_share_asset.insert(obj.share_asset, obj.id.0);
        self.by_pair
            .entry((obj.asset_a, obj.asset_b))
            .or_default()
            .push(obj.id.0);
        Ok(())
    }

    fn remove(&mut self, obj: &LiquidityPoolObject) {
        self.by_share_asset.remove(&obj.share_asset);
        if let Some(pools) = self.by_pair.get_mut(&(obj.asset_a, obj.asset_b)) {
            pools.retain(|id| *id != obj.id.0);
            if pools.is_empty() {
                self.by_pair.remove(&(obj.asset_a, obj.asset_b));
            }
        }
    }
}
