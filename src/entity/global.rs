use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{MeridianResult, ValidationError},
    protocol::{
        BlockId, BlockSummaryId, ChainParameters, CommitteeMemberId, DynamicGlobalPropertyId,
        GlobalPropertyId, ObjectTag, Share, TransactionDedupId, TransactionDigest, WitnessId,
    },
    store::{SecondaryIndexes, StoredObject},
};

/// Committee-voted chain configuration; singleton instance 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalPropertyObject {
    pub id: GlobalPropertyId,
    pub parameters: ChainParameters,
    /// Staged by the committee, applied at the next maintenance.
    pub pending_parameters: Option<ChainParameters>,
    pub active_witnesses: Vec<WitnessId>,
    pub active_committee_members: Vec<CommitteeMemberId>,
}

impl StoredObject for GlobalPropertyObject {
    const TAG: ObjectTag = ObjectTag::GlobalProperties;
    const SCHEMA: &'static str = "global-properties-v1";
    type Id = GlobalPropertyId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

/// Fast-changing chain state; singleton instance 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicGlobalPropertyObject {
    pub id: DynamicGlobalPropertyId,
    pub head_block_number: u32,
    pub head_block_id: BlockId,
    pub time: DateTime<Utc>,
    pub current_witness: WitnessId,
    pub next_maintenance_time: DateTime<Utc>,
    pub last_budget_time: DateTime<Utc>,
    /// Core reserved for witness pay until the next budget cycle.
    pub witness_budget: Share,
    pub accounts_registered_this_interval: u32,
    pub recently_missed_count: u32,
    /// Absolute slot number of the head block since genesis.
    pub current_aslot: u64,
    /// True while the block containing the maintenance sweep is applied.
    pub maintenance_flag: bool,
}

impl StoredObject for DynamicGlobalPropertyObject {
    const TAG: ObjectTag = ObjectTag::DynamicGlobalProperties;
    const SCHEMA: &'static str = "dynamic-global-properties-v1";
    type Id = DynamicGlobalPropertyId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

/// Ring of recent block ids for TaPoS anchoring, keyed by
/// `block_num & 0xFFFF`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSummaryObject {
    pub id: BlockSummaryId,
    pub block_id: BlockId,
}

impl BlockSummaryObject {
    /// The 32-bit prefix a transaction must quote to anchor at this block.
    pub fn prefix(&self) -> u32 {
        u32::from_le_bytes([
            self.block_id.0[4],
            self.block_id.0[5],
            self.block_id.0[6],
            self.block_id.0[7],
        ])
    }
}

impl StoredObject for BlockSummaryObject {
    const TAG: ObjectTag = ObjectTag::BlockSummary;
    const SCHEMA: &'static str = "block-summary-v1";
    type Id = BlockSummaryId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

/// Digest of an applied transaction, kept until well past its expiration so
/// replays are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionDedupObject {
    pub id: TransactionDedupId,
    pub digest: TransactionDigest,
    pub expiration: DateTime<Utc>,
}

impl StoredObject for TransactionDedupObject {
    const TAG: ObjectTag = ObjectTag::TransactionDedup;
    const SCHEMA: &'static str = "transaction-dedup-v1";
    type Id = TransactionDedupId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Default)]
pub struct DedupIndexes {
    pub by_digest: BTreeMap<TransactionDigest, u64>,
    pub by_expiration: std::collections::BTreeSet<(DateTime<Utc>, u64)>,
}

impl SecondaryIndexes<TransactionDedupObject> for DedupIndexes {
    fn insert(&mut self, obj: &TransactionDedupObject) -> MeridianResult<()> {
        if self.by_digest.contains_key(&obj.digest) {
            return Err(ValidationError::DuplicateTransaction.into());
        }
        self.by_digest.insert(obj.digest, obj.id.0);
        self.by_expiration.insert((obj.expiration, obj.id.0));
        Ok(())
    }

    fn remove(&mut self, obj: &TransactionDedupObject) {
        self.by_digest.remove(&obj.digest);
        self.by_expiration.remove(&(obj.expiration, obj.id.0));
    }
}
