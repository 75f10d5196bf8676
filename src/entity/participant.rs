use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{MeridianResult, StateError},
    protocol::{
        AccountId, AssetAmount, CommitteeMemberId, ObjectTag, PublicKey, Share, VestingBalanceId,
        VestingPolicy, WitnessId,
    },
    store::{SecondaryIndexes, StoredObject},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessObject {
    pub id: WitnessId,
    pub witness_account: AccountId,
    pub url: String,
    pub signing_key: PublicKey,
    /// Absolute slot of the last block this witness produced.
    pub last_aslot: u64,
    pub total_missed: u32,
}

impl StoredObject for WitnessObject {
    const TAG: ObjectTag = ObjectTag::Witness;
    const SCHEMA: &'static str = "witness-v1";
    type Id = WitnessId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Default)]
pub struct WitnessIndexes {
    pub by_account: BTreeMap<AccountId, u64>,
}

impl SecondaryIndexes<WitnessObject> for WitnessIndexes {
    fn insert(&mut self, obj: &WitnessObject) -> MeridianResult<()> {
        if self.by_account.contains_key(&obj.witness_account) {
            return Err(StateError::Precondition("account is already a witness").into());
        }
        self.by_account.insert(obj.witness_account, obj.id.0);
        Ok(())
    }

    fn remove(&mut self, obj: &WitnessObject) {
        self.by_account.remove(&obj.witness_account);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitteeMemberObject {
    pub id: CommitteeMemberId,
    pub committee_member_account: AccountId,
    pub url: String,
}

impl StoredObject for CommitteeMemberObject {
    const TAG: ObjectTag = ObjectTag::CommitteeMember;
    const SCHEMA: &'static str = "committee-member-v1";
    type Id = CommitteeMemberId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Default)]
pub struct CommitteeMemberIndexes {
    pub by_account: BTreeMap<AccountId, u64>,
}

impl SecondaryIndexes<CommitteeMemberObject> for CommitteeMemberIndexes {
    fn insert(&mut self, obj: &CommitteeMemberObject) -> MeridianResult<()> {
        if self.by_account.contains_key(&obj.committee_member_account) {
            return Err(StateError::Precondition("account is already a committee member").into());
        }
        self.by_account
            .insert(obj.committee_member_account, obj.id.0);
        Ok(())
    }

    fn remove(&mut self, obj: &CommitteeMemberObject) {
        self.by_account.remove(&obj.committee_member_account);
    }
}

/// Funds released linearly over a vesting window, with an optional cliff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VestingBalanceObject {
    pub id: VestingBalanceId,
    pub owner: AccountId,
    pub balance: AssetAmount,
    pub policy: VestingPolicy,
    /// Balance at the start of the current vesting window; the linear
    /// schedule is computed against this.
    pub begin_balance: Share,
}

impl VestingBalanceObject {
    /// How much may be withdrawn at `now` under the linear policy.
    pub fn allowed_withdraw(&self, now: DateTime<Utc>) -> Share {
        let elapsed = now - self.policy.begin_timestamp;
        if elapsed < Duration::seconds(i64::from(self.policy.vesting_cliff_seconds)) {
            return Share::ZERO;
        }
        let duration = i64::from(self.policy.vesting_duration_seconds);
        if duration <= 0 || elapsed >= Duration::seconds(duration) {
            return self.balance.amount;
        }
        let vested = (i128::from(self.begin_balance.0) * i128::from(elapsed.num_seconds())
            / i128::from(duration)) as i64;
        let already_withdrawn = self.begin_balance.0 - self.balance.amount.0;
        Share((vested - already_withdrawn).clamp(0, self.balance.amount.0))
    }
}

impl StoredObject for VestingBalanceObject {
    const TAG: ObjectTag = ObjectTag::VestingBalance;
    const SCHEMA: &'static str = "vesting-balance-v1";
    type Id = VestingBalanceId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Default)]
pub struct VestingBalanceIndexes {
    pub by_owner: BTreeSet<(AccountId, u64)>,
}

impl SecondaryIndexes<VestingBalanceObject> for VestingBalanceIndexes {
    fn insert(&mut self, obj: &VestingBalanceObject) -> MeridianResult<()> {
        self.by_owner.insert((obj.owner, obj.id.0));
        Ok(())
    }

    fn remove(&mut self, obj: &VestingBalanceObject) {
        self.by_owner.remove(&(obj.owner, obj.id.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CORE_ASSET;
    use chrono::TimeZone;

    fn vesting(begin: DateTime<Utc>, cliff: u32, duration: u32, amount: i64) -> VestingBalanceObject {
        VestingBalanceObject {
            id: VestingBalanceId(0),
            owner: AccountId(1),
            balance: AssetAmount::new(amount, CORE_ASSET),
            policy: VestingPolicy {
                begin_timestamp: begin,
                vesting_cliff_seconds: cliff,
                vesting_duration_seconds: duration,
            },
            begin_balance: Share(amount),
        }
    }

    #[test]
    fn linear_vesting_respects_cliff_and_duration() {
        let begin = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let vb = vesting(begin, 100, 1000, 10_000);
        assert_eq!(vb.allowed_withdraw(begin), Share::ZERO);
        assert_eq!(
            vb.allowed_withdraw(begin + Duration::seconds(50)),
            Share::ZERO
        );
        assert_eq!(
            vb.allowed_withdraw(begin + Duration::seconds(500)),
            Share(5000)
        );
        assert_eq!(
            vb.allowed_withdraw(begin + Duration::seconds(2000)),
            Share(10_000)
        );
    }
}
