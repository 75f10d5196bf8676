//! Stored entity types and their secondary indices.
//!
//! Entities reference each other by id only; derived relationships (an
//! account's orders, an asset's call positions) live in the index structs
//! next to each type.

mod account;
mod asset;
mod balance;
mod global;
mod market;
mod participant;
mod pool;
mod proposal;

pub use account::{AccountIndexes, AccountObject, AccountStatisticsObject, Membership};
pub use asset::{
    AssetBitassetObject, AssetDynamicObject, AssetIndexes, AssetObject, TimestampedFeed,
};
pub use balance::{AccountBalanceObject, BalanceIndexes};
pub use global::{
    BlockSummaryObject, DedupIndexes, DynamicGlobalPropertyObject, GlobalPropertyObject,
    TransactionDedupObject,
};
pub use market::{
    BidKey, BookKey, CallOrderIndexes, CallOrderObject, CollateralBidIndexes, CollateralBidObject,
    CollateralKey, ForceSettlementObject, LimitOrderIndexes, LimitOrderObject, SettlementIndexes,
};
pub use participant::{
    CommitteeMemberIndexes, CommitteeMemberObject, VestingBalanceIndexes, VestingBalanceObject,
    WitnessIndexes, WitnessObject,
};
pub use pool::{LiquidityPoolIndexes, LiquidityPoolObject};
pub use proposal::{ProposalIndexes, ProposalObject};
