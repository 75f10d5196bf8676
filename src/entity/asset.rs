use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{MeridianResult, StateError},
    protocol::{
        AccountId, AssetAmount, AssetBitassetId, AssetDynamicId, AssetFlags, AssetId, AssetOptions,
        BitassetOptions, LimitOrderId, ObjectTag, Price, PriceFeed, Share,
    },
    store::{SecondaryIndexes, StoredObject},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetObject {
    pub id: AssetId,
    pub symbol: String,
    /// Decimal places carried by the asset's base unit.
    pub precision: u8,
    pub issuer: AccountId,
    pub options: AssetOptions,
    pub dynamic_data: AssetDynamicId,
    /// Present exactly when the asset is market-issued.
    pub bitasset_data: Option<AssetBitassetId>,
}

impl AssetObject {
    pub fn is_market_issued(&self) -> bool {
        self.bitasset_data.is_some()
    }

    pub fn charges_market_fees(&self) -> bool {
        self.options.flags.contains(AssetFlags::CHARGE_MARKET_FEE)
    }

    pub fn is_transfer_restricted(&self) -> bool {
        self.options
            .flags
            .contains(AssetFlags::TRANSFER_RESTRICTED)
    }

    pub fn uses_whitelist(&self) -> bool {
        self.options.flags.contains(AssetFlags::WHITE_LIST)
    }

    pub fn can_override(&self) -> bool {
        self.options.flags.contains(AssetFlags::OVERRIDE_AUTHORITY)
    }

    pub fn can_force_settle(&self) -> bool {
        !self
            .options
            .flags
            .contains(AssetFlags::DISABLE_FORCE_SETTLE)
    }

    pub fn can_global_settle(&self) -> bool {
        self.options
            .issuer_permissions
            .contains(AssetFlags::GLOBAL_SETTLE)
    }

    pub fn amount(&self, value: impl Into<Share>) -> AssetAmount {
        AssetAmount::new(value, self.id)
    }
}

impl StoredObject for AssetObject {
    const TAG: ObjectTag = ObjectTag::Asset;
    const SCHEMA: &'static str = "asset-v1";
    type Id = AssetId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

/// Supply and fee accounting, mutated by nearly every market operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetDynamicObject {
    pub id: AssetDynamicId,
    pub current_supply: Share,
    /// Market and taker fees accumulated in this asset, claimable by the
    /// issuer.
    pub accumulated_fees: Share,
    /// Margin-call fees accumulated in the backing asset.
    pub accumulated_collateral_fees: Share,
    /// Core reserved to pay transaction fees denominated in this asset.
    pub fee_pool: Share,
}

impl StoredObject for AssetDynamicObject {
    const TAG: ObjectTag = ObjectTag::AssetDynamic;
    const SCHEMA: &'static str = "asset-dynamic-v1";
    type Id = AssetDynamicId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

/// A feed published by one producer, with its publication time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimestampedFeed {
    pub published_at: DateTime<Utc>,
    pub feed: PriceFeed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetBitassetObject {
    pub id: AssetBitassetId,
    pub asset: AssetId,
    pub options: BitassetOptions,
    /// Accounts currently allowed to publish feeds. For witness- or
    /// committee-fed assets this tracks the respective active set.
    pub feed_producers: BTreeSet<AccountId>,
    pub feeds: BTreeMap<AccountId, TimestampedFeed>,
    /// Element-wise median of the unexpired feeds.
    pub current_feed: PriceFeed,
    pub current_feed_publication_time: DateTime<Utc>,
    /// Set when the asset is globally settled: the fixed price, and the
    /// collateral backing redemption.
    pub settlement_price: Price,
    pub settlement_fund: Share,
    /// Individual settlement accounting (fund mode keeps collateral here;
    /// order mode tracks the debt represented by the settled-debt order).
    pub individual_settlement_debt: Share,
    pub individual_settlement_fund: Share,
    /// The resting settled-debt order, when the response mode produces one.
    pub settled_debt_order: Option<LimitOrderId>,
    /// Amount force-settled in the current maintenance interval.
    pub force_settled_volume: Share,
}

impl AssetBitassetObject {
    pub fn backing_asset(&self) -> AssetId {
        self.options.short_backing_asset
    }

    pub fn has_settlement(&self) -> bool {
        !self.settlement_price.is_null()
    }

    pub fn has_individual_settlement(&self) -> bool {
        self.individual_settlement_debt.is_positive()
    }

    pub fn feed_is_valid(&self) -> bool {
        !self.current_feed.is_null()
    }

    /// Cap on force settlements per maintenance interval.
    pub fn max_force_settlement_volume(&self, current_supply: Share) -> MeridianResult<Share> {
        current_supply.scale(
            u64::from(self.options.maximum_force_settlement_volume),
            u64::from(crate::protocol::PERCENT_100),
            crate::protocol::Rounding::Down,
        )
    }

    /// Recomputes the element-wise median feed over unexpired producer
    /// feeds. With fewer than `minimum_feeds` unexpired entries the median
    /// becomes null, which disables all margin machinery.
    pub fn update_median_feed(&mut self, now: DateTime<Utc>) {
        let lifetime = Duration::seconds(i64::from(self.options.feed_lifetime_sec));
        let live: Vec<&TimestampedFeed> = self
            .feeds
            .values()
            .filter(|f| f.published_at + lifetime > now && !f.feed.settlement_price.is_null())
            .collect();
        if live.len() < usize::from(self.options.minimum_feeds) {
            self.current_feed = PriceFeed::null(self.asset, self.backing_asset());
            return;
        }
        if live.len() == 1 {
            self.current_feed = live[0].feed;
            self.current_feed_publication_time = live[0].published_at;
            return;
        }

        self.current_feed_publication_time = median_by(&live, |f| f.published_at);
        self.current_feed = PriceFeed {
            settlement_price: median_by(&live, |f| {
                PriceOrd(f.feed.settlement_price)
            })
            .0,
            core_exchange_rate: median_by(&live, |f| PriceOrd(f.feed.core_exchange_rate)).0,
            maintenance_collateral_ratio: median_by(&live, |f| {
                f.feed.maintenance_collateral_ratio
            }),
            maximum_short_squeeze_ratio: median_by(&live, |f| f.feed.maximum_short_squeeze_ratio),
            initial_collateral_ratio: {
                let published: Vec<u16> = live
                    .iter()
                    .filter_map(|f| f.feed.initial_collateral_ratio)
                    .collect();
                if published.is_empty() {
                    None
                } else {
                    let mut sorted = published;
                    sorted.sort_unstable();
                    Some(sorted[sorted.len() / 2])
                }
            },
        };
    }
}

/// Median element (index len/2 after sorting) of one feed component.
fn median_by<T, K: Ord + Copy>(feeds: &[&T], key: impl Fn(&T) -> K) -> K {
    let mut keys: Vec<K> = feeds.iter().map(|f| key(f)).collect();
    keys.sort_unstable();
    keys[keys.len() / 2]
}

/// Price wrapper ordered by the exact rational value, for median selection
/// within one asset pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PriceOrd(Price);

impl PartialOrd for PriceOrd {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriceOrd {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp_same_pair(&other.0)
    }
}

impl StoredObject for AssetBitassetObject {
    const TAG: ObjectTag = ObjectTag::AssetBitasset;
    const SCHEMA: &'static str = "asset-bitasset-v1";
    type Id = AssetBitassetId;

    fn instance(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Default)]
pub struct AssetIndexes {
    pub by_symbol: BTreeMap<String, u64>,
}

impl SecondaryIndexes<AssetObject> for AssetIndexes {
    fn insert(&mut self, obj: &AssetObject) -> MeridianResult<()> {
        if self.by_symbol.contains_key(&obj.symbol) {
            return Err(StateError::SymbolTaken(obj.symbol.clone()).into());
        }
        self.by_symbol.insert(obj.symbol.clone(), obj.id.0);
        Ok(())
    }

    fn remove(&mut self, obj: &AssetObject) {
        self.by_symbol.remove(&obj.symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CORE_ASSET;

    fn feed(debt: i64, collateral: i64, mcr: u16) -> PriceFeed {
        PriceFeed {
            settlement_price: Price::new(
                AssetAmount::new(debt, AssetId(1)),
                AssetAmount::new(collateral, CORE_ASSET),
            ),
            core_exchange_rate: Price::new(
                AssetAmount::new(1, AssetId(1)),
                AssetAmount::new(1, CORE_ASSET),
            ),
            maintenance_collateral_ratio: mcr,
            maximum_short_squeeze_ratio: 1100,
            initial_collateral_ratio: None,
        }
    }

    fn bitasset_with_feeds(feeds: Vec<(u64, DateTime<Utc>, PriceFeed)>) -> AssetBitassetObject {
        let mut options = BitassetOptions::new(CORE_ASSET);
        options.minimum_feeds = 1;
        AssetBitassetObject {
            id: AssetBitassetId(0),
            asset: AssetId(1),
            options,
            feed_producers: BTreeSet::new(),
            feeds: feeds
                .into_iter()
                .map(|(acct, at, feed)| {
                    (
                        AccountId(acct),
                        TimestampedFeed {
                            published_at: at,
                            feed,
                        },
                    )
                })
                .collect(),
            current_feed: PriceFeed::null(AssetId(1), CORE_ASSET),
            current_feed_publication_time: DateTime::<Utc>::MIN_UTC,
            settlement_price: Price::null(AssetId(1), CORE_ASSET),
            settlement_fund: Share::ZERO,
            individual_settlement_debt: Share::ZERO,
            individual_settlement_fund: Share::ZERO,
            settled_debt_order: None,
            force_settled_volume: Share::ZERO,
        }
    }

    #[test]
    fn median_is_elementwise() {
        let now = Utc::now();
        let mut ba = bitasset_with_feeds(vec![
            (1, now, feed(100, 10, 1750)),
            (2, now, feed(100, 12, 1650)),
            (3, now, feed(100, 11, 2000)),
        ]);
        ba.update_median_feed(now);
        // Settlement prices sort 100/12 < 100/11 < 100/10; median 100/11.
        assert_eq!(ba.current_feed.settlement_price.quote.amount, Share(11));
        // MCRs sort 1650, 1750, 2000; median 1750.
        assert_eq!(ba.current_feed.maintenance_collateral_ratio, 1750);
    }

    #[test]
    fn expired_feeds_drop_out() {
        let now = Utc::now();
        let stale = now - Duration::seconds(60 * 60 * 24 * 2);
        let mut ba = bitasset_with_feeds(vec![
            (1, stale, feed(100, 10, 1750)),
            (2, now, feed(100, 12, 1650)),
        ]);
        ba.update_median_feed(now);
        assert_eq!(ba.current_feed.settlement_price.quote.amount, Share(12));

        // With every feed expired the median goes null.
        let mut ba = bitasset_with_feeds(vec![(1, stale, feed(100, 10, 1750))]);
        ba.update_median_feed(now);
        assert!(ba.current_feed.is_null());
    }
}
