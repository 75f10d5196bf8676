use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    error::{MeridianResult, StateError},
    protocol::{
        AccountId, AccountStatisticsId, Authority, ObjectTag, PublicKey, Share, VestingBalanceId,
    },
    store::{SecondaryIndexes, StoredObject},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Membership {
    #[default]
    Basic,
    Lifetime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountObject {
    pub id: AccountId,
    pub name: String,
    /// The lifetime member that registered this account and keeps the
    /// registrar slice of its fees.
    pub registrar: AccountId,
    pub referrer: AccountId,
    pub lifetime_referrer: AccountId,
    /// Fee split locked in at registration, 1/10000 each.
    pub network_fee_percentage: u16,
    pub lifetime_referrer_fee_percentage: u16,
    pub referrer_rewards_percentage: u16,
    pub membership: Membership,
    pub owner: Authority,
    pub active: Authority,
    pub memo_key: PublicKey,
    /// Listing authorities that have white-/blacklisted this account.
    /// Assets with the `WHITE_LIST` flag consult these sets.
    pub whitelisting_accounts: BTreeSet<AccountId>,
    pub blacklisting_accounts: BTreeSet<AccountId>,
    pub statistics: AccountStatisticsId,
    /// Where vested fee cashback accumulates, created on first vesting.
    pub cashback_vesting: Option<VestingBalanceId>,
}

impl AccountObject {
    pub fn is_lifetime_member(&self) -> bool {
        self.membership == Membership::Lifetime
    }
}

impl StoredObject for AccountObject {
    const TAG: ObjectTag = ObjectTag::Account;
    const SCHEMA: &'static str = "account-v1";
    type Id = AccountId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

/// Per-account bookkeeping kept out of the hot protocol object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountStatisticsObject {
    pub id: AccountStatisticsId,
    pub owner: AccountId,
    /// Core currently escrowed in open orders and collateral.
    pub total_core_in_orders: Share,
    /// Fee shares awaiting the vesting sweep at maintenance.
    pub pending_fees: Share,
    pub pending_vested_fees: Share,
    pub lifetime_fees_paid: Share,
}

impl StoredObject for AccountStatisticsObject {
    const TAG: ObjectTag = ObjectTag::AccountStatistics;
    const SCHEMA: &'static str = "account-statistics-v1";
    type Id = AccountStatisticsId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Default)]
pub struct AccountIndexes {
    pub by_name: BTreeMap<String, u64>,
}

impl SecondaryIndexes<AccountObject> for AccountIndexes {
    fn insert(&mut self, obj: &AccountObject) -> MeridianResult<()> {
        if self.by_name.contains_key(&obj.name) {
            return Err(StateError::NameTaken(obj.name.clone()).into());
        }
        self.by_name.insert(obj.name.clone(), obj.id.0);
        Ok(())
    }

    fn remove(&mut self, obj: &AccountObject) {
        self.by_name.remove(&obj.name);
    }
}
