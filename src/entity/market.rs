use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{MeridianResult, StateError},
    protocol::{
        AccountId, AssetAmount, AssetId, CallOrderId, CollateralBidId, ForceSettlementId,
        LimitOrderId, ObjectTag, Price, Rounding, Share,
    },
    store::{SecondaryIndexes, StoredObject},
};

// ================================================================================================
// Limit orders
// ================================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitOrderObject {
    pub id: LimitOrderId,
    pub seller: AccountId,
    /// Remaining escrowed amount, in the base asset of `sell_price`.
    pub for_sale: Share,
    pub sell_price: Price,
    pub expiration: DateTime<Utc>,
    /// Fee deferred until fill/cancel, refundable pro rata on cancel.
    pub deferred_fee: Share,
    /// Marks the synthetic order produced by individual settlement; it has
    /// no seller escrow and fills burn the received debt asset.
    pub is_settled_debt: bool,
}

impl LimitOrderObject {
    pub fn sell_asset(&self) -> AssetId {
        self.sell_price.base.asset
    }

    pub fn receive_asset(&self) -> AssetId {
        self.sell_price.quote.asset
    }

    pub fn amount_for_sale(&self) -> AssetAmount {
        AssetAmount::new(self.for_sale, self.sell_asset())
    }

    pub fn amount_to_receive(&self) -> MeridianResult<AssetAmount> {
        self.amount_for_sale()
            .multiply(&self.sell_price, Rounding::Down)
    }
}

impl StoredObject for LimitOrderObject {
    const TAG: ObjectTag = ObjectTag::LimitOrder;
    const SCHEMA: &'static str = "limit-order-v1";
    type Id = LimitOrderId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

/// Order-book position: one market's orders sorted best price first
/// (sell price descending), oldest order winning ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookKey {
    pub sell_asset: AssetId,
    pub receive_asset: AssetId,
    pub price: Price,
    pub id: u64,
}

impl BookKey {
    pub fn of(order: &LimitOrderObject) -> Self {
        Self {
            sell_asset: order.sell_asset(),
            receive_asset: order.receive_asset(),
            price: order.sell_price,
            id: order.id.0,
        }
    }

    /// First possible key of a market: the best (highest) price.
    pub fn market_start(sell: AssetId, receive: AssetId) -> Self {
        Self {
            sell_asset: sell,
            receive_asset: receive,
            price: Price::max(sell, receive),
            id: 0,
        }
    }

    /// Last possible key of a market.
    pub fn market_end(sell: AssetId, receive: AssetId) -> Self {
        Self {
            sell_asset: sell,
            receive_asset: receive,
            price: Price::min(sell, receive),
            id: u64::MAX,
        }
    }
}

impl Ord for BookKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.sell_asset, self.receive_asset)
            .cmp(&(other.sell_asset, other.receive_asset))
            // Descending by price within one market.
            .then_with(|| other.price.cmp_same_pair(&self.price))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for BookKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct LimitOrderIndexes {
    pub by_price: BTreeSet<BookKey>,
    pub by_expiration: BTreeSet<(DateTime<Utc>, u64)>,
    pub by_account: BTreeSet<(AccountId, u64)>,
}

impl SecondaryIndexes<LimitOrderObject> for LimitOrderIndexes {
    fn insert(&mut self, obj: &LimitOrderObject) -> MeridianResult<()> {
        self.by_price.insert(BookKey::of(obj));
        self.by_expiration.insert((obj.expiration, obj.id.0));
        self.by_account.insert((obj.seller, obj.id.0));
        Ok(())
    }

    fn remove(&mut self, obj: &LimitOrderObject) {
        self.by_price.remove(&BookKey::of(obj));
        self.by_expiration.remove(&(obj.expiration, obj.id.0));
        self.by_account.remove(&(obj.seller, obj.id.0));
    }
}

// ================================================================================================
// Call orders
// ================================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallOrderObject {
    pub id: CallOrderId,
    pub borrower: AccountId,
    pub collateral: Share,
    pub collateral_asset: AssetId,
    pub debt: Share,
    pub debt_asset: AssetId,
    /// Collateralization threshold at the maintenance ratio, kept in the
    /// debt/collateral orientation of the feed.
    pub call_price: Price,
    pub target_collateral_ratio: Option<u16>,
}

impl CallOrderObject {
    pub fn collateral_amount(&self) -> AssetAmount {
        AssetAmount::new(self.collateral, self.collateral_asset)
    }

    pub fn debt_amount(&self) -> AssetAmount {
        AssetAmount::new(self.debt, self.debt_asset)
    }

    /// True when the position no longer meets `mcr` at the given feed
    /// price (quoted debt/collateral): collateral · feed_debt · 1000 ≤
    /// debt · feed_collateral · mcr.
    pub fn is_callable(&self, feed_price: &Price, mcr: u16) -> bool {
        debug_assert_eq!(feed_price.base.asset, self.debt_asset);
        let collateral_side = i128::from(self.collateral.0) * i128::from(feed_price.base.amount.0);
        let debt_side = i128::from(self.debt.0) * i128::from(feed_price.quote.amount.0);
        collateral_side * i128::from(crate::protocol::RATIO_DENOM) <= debt_side * i128::from(mcr)
    }
}

impl StoredObject for CallOrderObject {
    const TAG: ObjectTag = ObjectTag::CallOrder;
    const SCHEMA: &'static str = "call-order-v1";
    type Id = CallOrderId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

/// Position in the margin queue: least collateralized first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollateralKey {
    pub debt_asset: AssetId,
    pub collateral: i64,
    pub debt: i64,
    pub id: u64,
}

impl CollateralKey {
    pub fn of(order: &CallOrderObject) -> Self {
        Self {
            debt_asset: order.debt_asset,
            collateral: order.collateral.0,
            debt: order.debt.0,
            id: order.id.0,
        }
    }

    pub fn asset_start(debt_asset: AssetId) -> Self {
        Self {
            debt_asset,
            collateral: 0,
            debt: 1,
            id: 0,
        }
    }

    pub fn asset_end(debt_asset: AssetId) -> Self {
        // Zero debt sorts as infinite collateralization.
        Self {
            debt_asset,
            collateral: 1,
            debt: 0,
            id: u64::MAX,
        }
    }
}

impl Ord for CollateralKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.debt_asset
            .cmp(&other.debt_asset)
            .then_with(|| {
                let lhs = i128::from(self.collateral) * i128::from(other.debt);
                let rhs = i128::from(other.collateral) * i128::from(self.debt);
                lhs.cmp(&rhs)
            })
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for CollateralKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct CallOrderIndexes {
    pub by_collateralization: BTreeSet<CollateralKey>,
    pub by_account: BTreeMap<(AccountId, AssetId), u64>,
}

impl SecondaryIndexes<CallOrderObject> for CallOrderIndexes {
    fn insert(&mut self, obj: &CallOrderObject) -> MeridianResult<()> {
        let account_key = (obj.borrower, obj.debt_asset);
        if self.by_account.contains_key(&account_key) {
            return Err(StateError::Precondition("duplicate debt position").into());
        }
        self.by_collateralization.insert(CollateralKey::of(obj));
        self.by_account.insert(account_key, obj.id.0);
        Ok(())
    }

    fn remove(&mut self, obj: &CallOrderObject) {
        self.by_collateralization.remove(&CollateralKey::of(obj));
        self.by_account.remove(&(obj.borrower, obj.debt_asset));
    }
}

// ================================================================================================
// Force settlements
// ================================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceSettlementObject {
    pub id: ForceSettlementId,
    pub owner: AccountId,
    /// Escrowed market-issued asset awaiting settlement.
    pub balance: AssetAmount,
    pub settlement_date: DateTime<Utc>,
}

impl StoredObject for ForceSettlementObject {
    const TAG: ObjectTag = ObjectTag::ForceSettlement;
    const SCHEMA: &'static str = "force-settlement-v1";
    type Id = ForceSettlementId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Default)]
pub struct SettlementIndexes {
    /// `(asset, due date, id)`: maintenance walks due settlements per asset.
    pub by_expiration: BTreeSet<(AssetId, DateTime<Utc>, u64)>,
    pub by_account: BTreeSet<(AccountId, u64)>,
}

impl SecondaryIndexes<ForceSettlementObject> for SettlementIndexes {
    fn insert(&mut self, obj: &ForceSettlementObject) -> MeridianResult<()> {
        self.by_expiration
            .insert((obj.balance.asset, obj.settlement_date, obj.id.0));
        self.by_account.insert((obj.owner, obj.id.0));
        Ok(())
    }

    fn remove(&mut self, obj: &ForceSettlementObject) {
        self.by_expiration
            .remove(&(obj.balance.asset, obj.settlement_date, obj.id.0));
        self.by_account.remove(&(obj.owner, obj.id.0));
    }
}

// ================================================================================================
// Collateral bids
// ================================================================================================

/// A standing offer to adopt part of a globally-settled asset's debt in
/// exchange for a slice of the settlement fund.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralBidObject {
    pub id: CollateralBidId,
    pub bidder: AccountId,
    /// Collateral escrowed by the bidder, on top of the fund slice.
    pub additional_collateral: AssetAmount,
    pub debt_covered: AssetAmount,
}

impl StoredObject for CollateralBidObject {
    const TAG: ObjectTag = ObjectTag::CollateralBid;
    const SCHEMA: &'static str = "collateral-bid-v1";
    type Id = CollateralBidId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

/// Bids sorted most collateral per covered debt first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidKey {
    pub debt_asset: AssetId,
    pub collateral: i64,
    pub debt: i64,
    pub id: u64,
}

impl BidKey {
    pub fn of(bid: &CollateralBidObject) -> Self {
        Self {
            debt_asset: bid.debt_covered.asset,
            collateral: bid.additional_collateral.amount.0,
            debt: bid.debt_covered.amount.0,
            id: bid.id.0,
        }
    }

    pub fn asset_start(debt_asset: AssetId) -> Self {
        Self {
            debt_asset,
            collateral: 1,
            debt: 0,
            id: 0,
        }
    }

    pub fn asset_end(debt_asset: AssetId) -> Self {
        Self {
            debt_asset,
            collateral: 0,
            debt: 1,
            id: u64::MAX,
        }
    }
}

impl Ord for BidKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.debt_asset
            .cmp(&other.debt_asset)
            .then_with(|| {
                let lhs = i128::from(self.collateral) * i128::from(other.debt);
                let rhs = i128::from(other.collateral) * i128::from(self.debt);
                // Descending: richer bids first.
                rhs.cmp(&lhs)
            })
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for BidKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct CollateralBidIndexes {
    pub by_price: BTreeSet<BidKey>,
    pub by_account: BTreeMap<(AccountId, AssetId), u64>,
}

impl SecondaryIndexes<CollateralBidObject> for CollateralBidIndexes {
    fn insert(&mut self, obj: &CollateralBidObject) -> MeridianResult<()> {
        let key = (obj.bidder, obj.debt_covered.asset);
        if self.by_account.contains_key(&key) {
            return Err(StateError::Precondition("one bid per account and asset").into());
        }
        self.by_price.insert(BidKey::of(obj));
        self.by_account.insert(key, obj.id.0);
        Ok(())
    }

    fn remove(&mut self, obj: &CollateralBidObject) {
        self.by_price.remove(&BidKey::of(obj));
        self.by_account.remove(&(obj.bidder, obj.debt_covered.asset));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: u64, sell: i64, receive: i64) -> LimitOrderObject {
        LimitOrderObject {
            id: LimitOrderId(id),
            seller: AccountId(1),
            for_sale: Share(sell),
            sell_price: Price::new(
                AssetAmount::new(sell, AssetId(1)),
                AssetAmount::new(receive, AssetId(2)),
            ),
            expiration: DateTime::<Utc>::MAX_UTC,
            deferred_fee: Share::ZERO,
            is_settled_debt: false,
        }
    }

    #[test]
    fn book_orders_best_price_first_oldest_wins_ties() {
        let mut book = BTreeSet::new();
        book.insert(BookKey::of(&order(10, 100, 50))); // price 2
        book.insert(BookKey::of(&order(11, 100, 25))); // price 4 (best)
        book.insert(BookKey::of(&order(12, 200, 100))); // price 2, younger
        let ids: Vec<u64> = book.iter().map(|k| k.id).collect();
        assert_eq!(ids, vec![11, 10, 12]);
    }

    #[test]
    fn collateral_key_orders_least_collateralized_first() {
        let mut queue = BTreeSet::new();
        for (id, collateral) in [(1, 2500i64), (2, 2000), (3, 2200)] {
            queue.insert(CollateralKey {
                debt_asset: AssetId(5),
                collateral,
                debt: 100_000,
                id,
            });
        }
        let ids: Vec<u64> = queue.iter().map(|k| k.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn callable_threshold_is_inclusive() {
        let call = CallOrderObject {
            id: CallOrderId(0),
            borrower: AccountId(1),
            collateral: Share(2000),
            collateral_asset: AssetId(0),
            debt: Share(100_000),
            debt_asset: AssetId(5),
            call_price: Price::null(AssetId(5), AssetId(0)),
            target_collateral_ratio: None,
        };
        // Feed 100000:1650 at MCR 1.25 requires 2062.5 collateral.
        let feed = Price::new(
            AssetAmount::new(100_000, AssetId(5)),
            AssetAmount::new(1650, AssetId(0)),
        );
        assert!(call.is_callable(&feed, 1250));
        // At 100000:1600 the requirement is 2000 exactly; still callable.
        let feed = Price::new(
            AssetAmount::new(100_000, AssetId(5)),
            AssetAmount::new(1600, AssetId(0)),
        );
        assert!(call.is_callable(&feed, 1250));
        let feed = Price::new(
            AssetAmount::new(100_000, AssetId(5)),
            AssetAmount::new(1500, AssetId(0)),
        );
        assert!(!call.is_callable(&feed, 1250));
    }
}
