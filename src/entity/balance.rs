use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{MeridianResult, StateError},
    protocol::{AccountBalanceId, AccountId, AssetAmount, AssetId, ObjectTag, Share},
    store::{SecondaryIndexes, StoredObject},
};

/// One `(owner, asset)` balance row. Rows are created lazily on first
/// credit and never removed, mirroring the dense access pattern of fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalanceObject {
    pub id: AccountBalanceId,
    pub owner: AccountId,
    pub asset: AssetId,
    pub balance: Share,
}

impl AccountBalanceObject {
    pub fn amount(&self) -> AssetAmount {
        AssetAmount::new(self.balance, self.asset)
    }
}

impl StoredObject for AccountBalanceObject {
    const TAG: ObjectTag = ObjectTag::AccountBalance;
    const SCHEMA: &'static str = "account-balance-v1";
    type Id = AccountBalanceId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Default)]
pub struct BalanceIndexes {
    pub by_owner_asset: BTreeMap<(AccountId, AssetId), u64>,
}

impl SecondaryIndexes<AccountBalanceObject> for BalanceIndexes {
    fn insert(&mut self, obj: &AccountBalanceObject) -> MeridianResult<()> {
        let key = (obj.owner, obj.asset);
        if self.by_owner_asset.contains_key(&key) {
            return Err(StateError::Precondition("duplicate balance row").into());
        }
        self.by_owner_asset.insert(key, obj.id.0);
        Ok(())
    }

    fn remove(&mut self, obj: &AccountBalanceObject) {
        self.by_owner_asset.remove(&(obj.owner, obj.asset));
    }
}
