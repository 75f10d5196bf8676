use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::{OperationTag, PERCENT_100, Share};

pub const MIN_UNDO_HISTORY: usize = 10;
pub const MAX_UNDO_HISTORY: usize = 10_000;

pub const MAX_SIG_CHECK_DEPTH: u32 = 2;

/// One core unit subdivided (10^5 base units), used for default fees.
pub const CORE_PRECISION: i64 = 100_000;

/// Flat fees per operation kind, plus a size component for payload-heavy
/// operations. All amounts are core base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub flat: BTreeMap<OperationTag, Share>,
    /// Charged per started kilobyte of proposal / custom payloads.
    pub price_per_kbyte: Share,
    /// Premium charged by `account_upgrade` for a lifetime membership.
    pub lifetime_membership: Share,
}

impl FeeSchedule {
    /// Flat fee for an operation kind. Kinds missing from the table are
    /// free; the committee controls the table through parameter updates.
    pub fn flat_fee(&self, tag: OperationTag) -> Share {
        self.flat.get(&tag).copied().unwrap_or(Share::ZERO)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        let mut flat = BTreeMap::new();
        let cheap = Share(CORE_PRECISION / 10);
        for tag in [
            OperationTag::Transfer,
            OperationTag::LimitOrderCreate,
            OperationTag::CallOrderUpdate,
            OperationTag::AssetIssue,
            OperationTag::AssetReserve,
            OperationTag::AssetFundFeePool,
            OperationTag::AssetClaimFees,
            OperationTag::AssetClaimPool,
            OperationTag::AssetSettle,
            OperationTag::AssetPublishFeed,
            OperationTag::BidCollateral,
            OperationTag::ProposalCreate,
            OperationTag::ProposalUpdate,
            OperationTag::ProposalDelete,
            OperationTag::VestingBalanceCreate,
            OperationTag::VestingBalanceWithdraw,
            OperationTag::LiquidityPoolDeposit,
            OperationTag::LiquidityPoolWithdraw,
            OperationTag::LiquidityPoolExchange,
            OperationTag::OverrideTransfer,
            OperationTag::AccountWhitelist,
            OperationTag::AccountUpdate,
            OperationTag::AssetUpdate,
            OperationTag::AssetUpdateIssuer,
            OperationTag::AssetUpdateBitasset,
            OperationTag::AssetUpdateFeedProducers,
            OperationTag::AssetGlobalSettle,
            OperationTag::WitnessCreate,
            OperationTag::WitnessUpdate,
            OperationTag::CommitteeMemberCreate,
            OperationTag::CommitteeMemberUpdate,
            OperationTag::CommitteeMemberUpdateGlobalParameters,
        ] {
            flat.insert(tag, cheap);
        }
        // Registrations carry a premium.
        flat.insert(OperationTag::AccountCreate, Share(CORE_PRECISION));
        flat.insert(OperationTag::AssetCreate, Share(5 * CORE_PRECISION));
        flat.insert(
            OperationTag::LiquidityPoolCreate,
            Share(CORE_PRECISION),
        );
        // Cancellation stays free so stale orders can always be cleared.
        flat.insert(OperationTag::LimitOrderCancel, Share::ZERO);
        Self {
            flat,
            price_per_kbyte: Share(CORE_PRECISION / 100),
            lifetime_membership: Share(100 * CORE_PRECISION),
        }
    }
}

/// Committee-voted parameters governing the whole chain. A pending copy can
/// be staged by `committee_member_update_global_parameters` and is swapped in
/// at the next maintenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParameters {
    pub fee_schedule: FeeSchedule,
    pub block_interval: u8,
    pub maintenance_interval: u32,
    pub maintenance_skip_slots: u8,
    pub maximum_transaction_size: u32,
    pub maximum_block_size: u32,
    pub maximum_time_until_expiration: u32,
    pub maximum_proposal_lifetime: u32,
    pub committee_proposal_review_period: u32,
    pub maximum_asset_whitelist_authorities: u8,
    pub maximum_asset_feed_publishers: u8,
    pub maximum_authority_membership: u16,
    pub maximum_witness_count: u16,
    pub maximum_committee_count: u16,
    /// Share of every fee burned to the network, 1/10000.
    pub network_percent_of_fee: u16,
    /// Share of every fee paid to the lifetime referrer, 1/10000.
    pub lifetime_referrer_percent_of_fee: u16,
    pub cashback_vesting_period_sec: u32,
    pub cashback_vesting_threshold: Share,
    pub witness_pay_per_block: Share,
    pub witness_pay_vesting_seconds: u32,
    pub worker_budget_per_day: Share,
    pub max_predicate_opcode: u16,
}

impl ChainParameters {
    pub fn validate(&self) -> crate::error::MeridianResult<()> {
        use crate::error::ValidationError;
        if self.block_interval == 0 {
            return Err(ValidationError::InvalidOperation {
                field: "block_interval",
                reason: "must be positive",
            }
            .into());
        }
        if self.maintenance_interval < u32::from(self.block_interval) {
            return Err(ValidationError::InvalidOperation {
                field: "maintenance_interval",
                reason: "must cover at least one block",
            }
            .into());
        }
        for (field, value) in [
            ("network_percent_of_fee", self.network_percent_of_fee),
            (
                "lifetime_referrer_percent_of_fee",
                self.lifetime_referrer_percent_of_fee,
            ),
        ] {
            if value > PERCENT_100 {
                return Err(ValidationError::PercentageOutOfRange { field, value }.into());
            }
        }
        if u32::from(self.network_percent_of_fee)
            + u32::from(self.lifetime_referrer_percent_of_fee)
            > u32::from(PERCENT_100)
        {
            return Err(ValidationError::PercentageOutOfRange {
                field: "network_percent_of_fee",
                value: self.network_percent_of_fee,
            }
            .into());
        }
        Ok(())
    }
}

impl Default for ChainParameters {
    fn default() -> Self {
        Self {
            fee_schedule: FeeSchedule::default(),
            block_interval: 5,
            maintenance_interval: 60 * 60 * 24,
            maintenance_skip_slots: 3,
            maximum_transaction_size: 2048,
            maximum_block_size: 2048 * 5 * 200_000,
            maximum_time_until_expiration: 60 * 60 * 24,
            maximum_proposal_lifetime: 60 * 60 * 24 * 7 * 4,
            committee_proposal_review_period: 60 * 60 * 24 * 7 * 2,
            maximum_asset_whitelist_authorities: 10,
            maximum_asset_feed_publishers: 10,
            maximum_authority_membership: 10,
            maximum_witness_count: 1001,
            maximum_committee_count: 1001,
            network_percent_of_fee: 2000,
            lifetime_referrer_percent_of_fee: 3000,
            cashback_vesting_period_sec: 60 * 60 * 24 * 365,
            cashback_vesting_threshold: Share(100 * CORE_PRECISION),
            witness_pay_per_block: Share(10 * CORE_PRECISION),
            witness_pay_vesting_seconds: 60 * 60 * 24,
            worker_budget_per_day: Share(500_000 * CORE_PRECISION),
            max_predicate_opcode: 1,
        }
    }
}
