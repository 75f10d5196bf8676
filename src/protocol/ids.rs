use serde::{Deserialize, Serialize};
use strum::{EnumCount, EnumIter};

use crate::define_object_id;

/// Address space of an object id. Protocol objects are referenced by
/// operations on the wire; implementation objects are bookkeeping the chain
/// derives on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Space {
    Protocol = 1,
    Implementation = 2,
}

/// Every storable entity type, with its stable `(space, type)` pair.
///
/// The discriminant order is stable; snapshot sections and object ids depend
/// on it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumCount,
    EnumIter,
    strum::IntoStaticStr,
)]
pub enum ObjectTag {
    // Protocol space.
    Account,
    Asset,
    ForceSettlement,
    CommitteeMember,
    Witness,
    LimitOrder,
    CallOrder,
    Proposal,
    VestingBalance,
    LiquidityPool,
    CollateralBid,
    // Implementation space.
    GlobalProperties,
    DynamicGlobalProperties,
    AssetDynamic,
    AssetBitasset,
    AccountBalance,
    AccountStatistics,
    BlockSummary,
    TransactionDedup,
}

impl ObjectTag {
    pub fn space(self) -> Space {
        match self {
            ObjectTag::Account
            | ObjectTag::Asset
            | ObjectTag::ForceSettlement
            | ObjectTag::CommitteeMember
            | ObjectTag::Witness
            | ObjectTag::LimitOrder
            | ObjectTag::CallOrder
            | ObjectTag::Proposal
            | ObjectTag::VestingBalance
            | ObjectTag::LiquidityPool
            | ObjectTag::CollateralBid => Space::Protocol,
            _ => Space::Implementation,
        }
    }

    /// Stable numeric type tag within the space.
    pub fn type_number(self) -> u8 {
        match self {
            ObjectTag::Account => 1,
            ObjectTag::Asset => 2,
            ObjectTag::ForceSettlement => 3,
            ObjectTag::CommitteeMember => 4,
            ObjectTag::Witness => 5,
            ObjectTag::LimitOrder => 6,
            ObjectTag::CallOrder => 7,
            ObjectTag::Proposal => 8,
            ObjectTag::VestingBalance => 9,
            ObjectTag::LiquidityPool => 10,
            ObjectTag::CollateralBid => 11,
            ObjectTag::GlobalProperties => 0,
            ObjectTag::DynamicGlobalProperties => 1,
            ObjectTag::AssetDynamic => 2,
            ObjectTag::AssetBitasset => 3,
            ObjectTag::AccountBalance => 4,
            ObjectTag::AccountStatistics => 5,
            ObjectTag::BlockSummary => 6,
            ObjectTag::TransactionDedup => 7,
        }
    }
}

/// Largest instance number an id may carry (48 bits).
pub const MAX_INSTANCE: u64 = (1 << 48) - 1;

/// A globally unique, never reused entity identifier `(space, type, instance)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    tag: ObjectTag,
    instance: u64,
}

impl ObjectId {
    pub fn new(tag: ObjectTag, instance: u64) -> Self {
        debug_assert!(instance <= MAX_INSTANCE);
        Self { tag, instance }
    }

    pub fn tag(self) -> ObjectTag {
        self.tag
    }

    pub fn space(self) -> Space {
        self.tag.space()
    }

    pub fn instance(self) -> u64 {
        self.instance
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.tag.space() as u8,
            self.tag.type_number(),
            self.instance
        )
    }
}

define_object_id!(AccountId, ObjectTag::Account);
define_object_id!(AssetId, ObjectTag::Asset);
define_object_id!(ForceSettlementId, ObjectTag::ForceSettlement);
define_object_id!(CommitteeMemberId, ObjectTag::CommitteeMember);
define_object_id!(WitnessId, ObjectTag::Witness);
define_object_id!(LimitOrderId, ObjectTag::LimitOrder);
define_object_id!(CallOrderId, ObjectTag::CallOrder);
define_object_id!(ProposalId, ObjectTag::Proposal);
define_object_id!(VestingBalanceId, ObjectTag::VestingBalance);
define_object_id!(LiquidityPoolId, ObjectTag::LiquidityPool);
define_object_id!(CollateralBidId, ObjectTag::CollateralBid);
define_object_id!(GlobalPropertyId, ObjectTag::GlobalProperties);
define_object_id!(DynamicGlobalPropertyId, ObjectTag::DynamicGlobalProperties);
define_object_id!(AssetDynamicId, ObjectTag::AssetDynamic);
define_object_id!(AssetBitassetId, ObjectTag::AssetBitasset);
define_object_id!(AccountBalanceId, ObjectTag::AccountBalance);
define_object_id!(AccountStatisticsId, ObjectTag::AccountStatistics);
define_object_id!(BlockSummaryId, ObjectTag::BlockSummary);
define_object_id!(TransactionDedupId, ObjectTag::TransactionDedup);

/// The core asset is always instance 0 of the asset type.
pub const CORE_ASSET: AssetId = AssetId(0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_space_type_instance() {
        assert_eq!(AccountId(17).to_string(), "1.1.17");
        assert_eq!(AssetDynamicId(3).to_string(), "2.2.3");
    }

    #[test]
    fn typed_id_round_trips_through_object_id() {
        let id = LimitOrderId(42);
        let raw: ObjectId = id.into();
        assert_eq!(LimitOrderId::try_from(raw).unwrap(), id);
        assert!(AccountId::try_from(raw).is_err());
    }
}
