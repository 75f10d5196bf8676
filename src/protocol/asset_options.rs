use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::{
    error::{MeridianResult, ValidationError},
    protocol::{AccountId, AssetId, PERCENT_100, Price, Share},
};

pub const MIN_SYMBOL_LENGTH: usize = 3;
pub const MAX_SYMBOL_LENGTH: usize = 16;
pub const MAX_PRECISION: u8 = 12;

static SYMBOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9]*(\.[A-Z0-9]+)?[A-Z]$").unwrap());

/// Validates an asset symbol: 3..=16 chars, uppercase letters and digits with
/// at most one interior dot, starting and ending with a letter.
pub fn validate_symbol(symbol: &str) -> MeridianResult<()> {
    if !(MIN_SYMBOL_LENGTH..=MAX_SYMBOL_LENGTH).contains(&symbol.len())
        || !SYMBOL_RE.is_match(symbol)
    {
        return Err(ValidationError::InvalidSymbol(symbol.to_owned()).into());
    }
    Ok(())
}

/// Per-asset permission/flag bits.
///
/// `issuer_permissions` records which bits the issuer may ever enable;
/// `flags` records which are currently active. Permissions can only be
/// narrowed once supply exists.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct AssetFlags(pub u16);

impl AssetFlags {
    pub const CHARGE_MARKET_FEE: AssetFlags = AssetFlags(0x0001);
    pub const WHITE_LIST: AssetFlags = AssetFlags(0x0002);
    pub const OVERRIDE_AUTHORITY: AssetFlags = AssetFlags(0x0004);
    pub const TRANSFER_RESTRICTED: AssetFlags = AssetFlags(0x0008);
    pub const DISABLE_FORCE_SETTLE: AssetFlags = AssetFlags(0x0010);
    pub const GLOBAL_SETTLE: AssetFlags = AssetFlags(0x0020);
    pub const DISABLE_CONFIDENTIAL: AssetFlags = AssetFlags(0x0040);
    pub const WITNESS_FED: AssetFlags = AssetFlags(0x0080);
    pub const COMMITTEE_FED: AssetFlags = AssetFlags(0x0100);

    /// All bits a user-issued (non-market-issued) asset may carry.
    pub const UIA_MASK: AssetFlags = AssetFlags(0x004F);
    /// All defined bits.
    pub const MIA_MASK: AssetFlags = AssetFlags(0x01FF);

    pub fn contains(self, bit: AssetFlags) -> bool {
        self.0 & bit.0 == bit.0
    }

    pub fn insert(&mut self, bit: AssetFlags) {
        self.0 |= bit.0;
    }

    pub fn remove(&mut self, bit: AssetFlags) {
        self.0 &= !bit.0;
    }

    pub fn is_subset_of(self, other: AssetFlags) -> bool {
        self.0 & !other.0 == 0
    }
}

/// Options common to every asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetOptions {
    pub max_supply: Share,
    /// Market fee taken from the receiving side of fills, in 1/10000.
    pub market_fee_percent: u16,
    /// Absolute cap on a single fill's market fee.
    pub max_market_fee: Share,
    pub issuer_permissions: AssetFlags,
    pub flags: AssetFlags,
    /// Rate used to pay transaction fees in this asset via the fee pool.
    pub core_exchange_rate: Price,
    /// Accounts whose whitelists gate who may hold/trade the asset when the
    /// `WHITE_LIST` flag is active.
    pub whitelist_authorities: BTreeSet<AccountId>,
    pub blacklist_authorities: BTreeSet<AccountId>,
    /// When non-empty, the asset may only trade against these assets.
    pub whitelist_markets: BTreeSet<AssetId>,
    pub blacklist_markets: BTreeSet<AssetId>,
}

impl AssetOptions {
    pub fn validate(&self) -> MeridianResult<()> {
        if !self.max_supply.is_positive() || self.max_supply.0 > crate::protocol::MAX_SHARE_SUPPLY {
            return Err(ValidationError::NonPositiveAmount(self.max_supply.0).into());
        }
        if self.market_fee_percent > PERCENT_100 {
            return Err(ValidationError::PercentageOutOfRange {
                field: "market_fee_percent",
                value: self.market_fee_percent,
            }
            .into());
        }
        if self.max_market_fee.is_negative() {
            return Err(ValidationError::NonPositiveAmount(self.max_market_fee.0).into());
        }
        if !self.flags.is_subset_of(self.issuer_permissions) {
            return Err(ValidationError::InvalidOperation {
                field: "flags",
                reason: "flags must be a subset of issuer_permissions",
            }
            .into());
        }
        self.core_exchange_rate.validate()
    }
}

/// How the chain responds when the least-collateralized position can no
/// longer cover its debt at the feed price.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter, Default,
)]
#[strum(serialize_all = "snake_case")]
pub enum BlackSwanResponse {
    #[default]
    GlobalSettlement,
    NoSettlement,
    IndividualSettlementToFund,
    IndividualSettlementToOrder,
}

/// Options specific to market-issued (collateral-backed) assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitassetOptions {
    /// The asset held as collateral, most commonly the core asset.
    pub short_backing_asset: AssetId,
    /// Seconds before a published feed stops contributing to the median.
    pub feed_lifetime_sec: u32,
    /// Feeds required before the median is considered meaningful.
    pub minimum_feeds: u8,
    pub force_settlement_delay_sec: u32,
    /// Haircut applied to the feed when filling force settlements, 1/10000.
    pub force_settlement_offset_percent: u16,
    /// Cap on force-settled volume per maintenance interval, 1/10000 of
    /// supply.
    pub maximum_force_settlement_volume: u16,
    /// Portion of the short-squeeze spread kept by the network, in
    /// 1/1000 like the ratios it offsets.
    pub margin_call_fee_ratio: u16,
    /// Optional stricter collateral ratio for opening positions.
    pub initial_collateral_ratio: Option<u16>,
    pub black_swan_response: BlackSwanResponse,
}

impl BitassetOptions {
    pub fn new(short_backing_asset: AssetId) -> Self {
        Self {
            short_backing_asset,
            feed_lifetime_sec: 60 * 60 * 24,
            minimum_feeds: 1,
            force_settlement_delay_sec: 60 * 60 * 24,
            force_settlement_offset_percent: 0,
            maximum_force_settlement_volume: 2000,
            margin_call_fee_ratio: 0,
            initial_collateral_ratio: None,
            black_swan_response: BlackSwanResponse::GlobalSettlement,
        }
    }

    pub fn validate(&self) -> MeridianResult<()> {
        for (field, value) in [
            (
                "force_settlement_offset_percent",
                self.force_settlement_offset_percent,
            ),
            (
                "maximum_force_settlement_volume",
                self.maximum_force_settlement_volume,
            ),
        ] {
            if value > PERCENT_100 {
                return Err(ValidationError::PercentageOutOfRange { field, value }.into());
            }
        }
        if self.minimum_feeds == 0 {
            return Err(ValidationError::InvalidOperation {
                field: "minimum_feeds",
                reason: "at least one feed must be required",
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_grammar() {
        for ok in ["USD", "GOLD", "BIT.USD", "A1B"] {
            assert!(validate_symbol(ok).is_ok(), "{ok} should be valid");
        }
        for bad in ["US", "usd", "1AB", ".USD", "USD.", "A..B", "TOOLONGSYMBOL.ABCD"] {
            assert!(validate_symbol(bad).is_err(), "{bad} should be invalid");
        }
    }

    #[test]
    fn flags_subset() {
        let mut flags = AssetFlags::default();
        flags.insert(AssetFlags::CHARGE_MARKET_FEE);
        assert!(flags.is_subset_of(AssetFlags::UIA_MASK));
        flags.insert(AssetFlags::WITNESS_FED);
        assert!(!flags.is_subset_of(AssetFlags::UIA_MASK));
        assert!(flags.contains(AssetFlags::CHARGE_MARKET_FEE));
    }
}
