use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::MeridianResult,
    protocol::{AccountId, ObjectTag, Operation, ProposalId, PublicKey},
    store::{SecondaryIndexes, StoredObject},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalObject {
    pub id: ProposalId,
    pub proposer: AccountId,
    pub expiration_time: DateTime<Utc>,
    /// When set, approvals may still change but execution waits until the
    /// review period has elapsed.
    pub review_period_time: Option<DateTime<Utc>>,
    pub proposed_ops: Vec<Operation>,
    pub required_active_approvals: BTreeSet<AccountId>,
    pub available_active_approvals: BTreeSet<AccountId>,
    pub required_owner_approvals: BTreeSet<AccountId>,
    pub available_owner_approvals: BTreeSet<AccountId>,
    pub available_key_approvals: BTreeSet<PublicKey>,
}

impl ProposalObject {
    /// Every account whose approval state this proposal tracks; drives the
    /// required-approval index.
    pub fn interested_accounts(&self) -> BTreeSet<AccountId> {
        self.required_active_approvals
            .iter()
            .chain(self.required_owner_approvals.iter())
            .chain(self.available_active_approvals.iter())
            .chain(self.available_owner_approvals.iter())
            .copied()
            .collect()
    }
}

impl StoredObject for ProposalObject {
    const TAG: ObjectTag = ObjectTag::Proposal;
    const SCHEMA: &'static str = "proposal-v1";
    type Id = ProposalId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Default)]
pub struct ProposalIndexes {
    pub by_expiration: BTreeSet<(DateTime<Utc>, u64)>,
    /// `account -> proposals` touching it, maintained across approval
    /// changes for efficient dirty tracking.
    pub by_required_account: BTreeMap<AccountId, BTreeSet<u64>>,
}

impl SecondaryIndexes<ProposalObject> for ProposalIndexes {
    fn insert(&mut self, obj: &ProposalObject) -> MeridianResult<()> {
        self.by_expiration.insert((obj.expiration_time, obj.id.0));
        for account in obj.interested_accounts() {
            self.by_required_account
                .entry(account)
                .or_default()
                .insert(obj.id.0);
        }
        Ok(())
    }

    fn remove(&mut self, obj: &ProposalObject) {
        self.by_expiration.remove(&(obj.expiration_time, obj.id.0));
        for account in obj.interested_accounts() {
            if let Some(set) = self.by_required_account.get_mut(&account) {
                set.remove(&obj.id.0);
                if set.is_empty() {
                    self.by_required_account.remove(&account);
                }
            }
        }
    }
}
