use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{
    error::{ArithmeticError, MeridianResult, StateError},
    protocol::{AssetAmount, AssetId, MAX_SHARE_SUPPLY, Rounding},
};

/// Denominator of all collateral ratios (MCR, MSSR, ICR, TCR).
pub const RATIO_DENOM: u16 = 1000;

/// Denominator of all percentages: 10_000 = 100%.
pub const PERCENT_100: u16 = 10_000;

pub const DEFAULT_MAINTENANCE_COLLATERAL_RATIO: u16 = 1750;
pub const DEFAULT_MAX_SHORT_SQUEEZE_RATIO: u16 = 1500;
pub const MIN_COLLATERAL_RATIO: u16 = 1001;
pub const MAX_COLLATERAL_RATIO: u16 = 32000;

/// An exchange rate between two assets, stored as the unreduced ratio
/// `base / quote`.
///
/// By convention the base is the asset being sold and the quote the asset
/// being bought. A price of `(1000 CORE) / (20 USD)` is kept as-is; ordering
/// and multiplication work on the exact rational value via 128-bit cross
/// multiplication, so no precision is ever lost to normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Price {
    pub base: AssetAmount,
    pub quote: AssetAmount,
}

impl Price {
    pub fn new(base: AssetAmount, quote: AssetAmount) -> Self {
        Self { base, quote }
    }

    pub fn validate(&self) -> MeridianResult<()> {
        if !self.base.amount.is_positive() || !self.quote.amount.is_positive() {
            return Err(StateError::PriceOutOfRange.into());
        }
        if self.base.asset == self.quote.asset {
            return Err(StateError::PriceOutOfRange.into());
        }
        Ok(())
    }

    /// A null price carries no information; a bitasset with a null median
    /// feed has its entire margin machinery disabled.
    pub fn is_null(&self) -> bool {
        self.base.amount.is_zero() || self.quote.amount.is_zero()
    }

    pub fn null(base: AssetId, quote: AssetId) -> Self {
        Self::new(AssetAmount::zero(base), AssetAmount::zero(quote))
    }

    /// Cheapest representable price selling `base` for `quote`.
    pub fn min(base: AssetId, quote: AssetId) -> Self {
        Self::new(
            AssetAmount::new(1, base),
            AssetAmount::new(MAX_SHARE_SUPPLY, quote),
        )
    }

    /// Most expensive representable price selling `base` for `quote`.
    pub fn max(base: AssetId, quote: AssetId) -> Self {
        Self::new(
            AssetAmount::new(MAX_SHARE_SUPPLY, base),
            AssetAmount::new(1, quote),
        )
    }

    /// The same rate quoted in the opposite direction.
    pub fn invert(self) -> Self {
        Self::new(self.quote, self.base)
    }

    /// Compares two prices over the same ordered asset pair as exact
    /// rationals.
    ///
    /// Panics in debug builds if the pairs differ; production callers always
    /// compare within one market.
    pub fn cmp_same_pair(&self, other: &Price) -> Ordering {
        debug_assert_eq!(self.base.asset, other.base.asset);
        debug_assert_eq!(self.quote.asset, other.quote.asset);
        let lhs = i128::from(self.base.amount.0) * i128::from(other.quote.amount.0);
        let rhs = i128::from(other.base.amount.0) * i128::from(self.quote.amount.0);
        lhs.cmp(&rhs)
    }

    /// Multiplies the price by the ratio `num/den` applied to the base side.
    ///
    /// The result is reduced by gcd and, when it still cannot fit a signed
    /// 64-bit amount, both sides are halved until it does. Reduction keeps
    /// the ratio exact whenever possible.
    pub fn scaled(self, num: u64, den: u64) -> MeridianResult<Price> {
        if num == 0 || den == 0 {
            return Err(ArithmeticError::DivisionByZero("price scaling").into());
        }
        let mut base = u128::try_from(self.base.amount.0)
            .map_err(|_| ArithmeticError::PriceUndefined)?
            * u128::from(num);
        let mut quote = u128::try_from(self.quote.amount.0)
            .map_err(|_| ArithmeticError::PriceUndefined)?
            * u128::from(den);
        if base == 0 || quote == 0 {
            return Err(ArithmeticError::PriceUndefined.into());
        }
        let g = gcd(base, quote);
        base /= g;
        quote /= g;
        while base > i64::MAX as u128 || quote > i64::MAX as u128 {
            base >>= 1;
            quote >>= 1;
        }
        if base == 0 || quote == 0 {
            return Err(ArithmeticError::PriceUndefined.into());
        }
        Ok(Price::new(
            AssetAmount::new(base as i64, self.base.asset),
            AssetAmount::new(quote as i64, self.quote.asset),
        ))
    }

    /// The collateralization threshold price of a debt position.
    ///
    /// Quoted debt/collateral like a settlement feed: the position becomes
    /// callable once the feed falls to or below this price.
    pub fn call_price(
        debt: AssetAmount,
        collateral: AssetAmount,
        collateral_ratio: u16,
    ) -> MeridianResult<Price> {
        Price::new(debt, collateral).scaled(u64::from(collateral_ratio), u64::from(RATIO_DENOM))
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.base, self.quote)
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl AssetAmount {
    /// Multiplies the amount by a price, converting it into the opposite
    /// asset of the pair. The rounding direction is explicit at every call
    /// site.
    pub fn multiply(self, price: &Price, rounding: Rounding) -> MeridianResult<AssetAmount> {
        let (num, den, out_asset) = if self.asset == price.base.asset {
            (price.quote.amount.0, price.base.amount.0, price.quote.asset)
        } else if self.asset == price.quote.asset {
            (price.base.amount.0, price.quote.amount.0, price.base.asset)
        } else {
            return Err(StateError::AssetTypeMismatch {
                expected: price.base.asset,
                got: self.asset,
            }
            .into());
        };
        if den <= 0 || num < 0 {
            return Err(ArithmeticError::PriceUndefined.into());
        }
        let wide = i128::from(self.amount.0) * i128::from(num);
        let den = i128::from(den);
        let out = match rounding {
            Rounding::Down => wide.div_euclid(den),
            Rounding::Up => wide.div_euclid(den) + i128::from(wide.rem_euclid(den) != 0),
        };
        if out > i128::from(MAX_SHARE_SUPPLY) {
            return Err(ArithmeticError::AmountOutOfRange.into());
        }
        let out = i64::try_from(out).map_err(|_| ArithmeticError::AmountOutOfRange)?;
        Ok(AssetAmount::new(out, out_asset))
    }
}

/// One producer's published view of a market-issued asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFeed {
    /// Forced settlements evaluate at this price, quoted debt/collateral.
    pub settlement_price: Price,

    /// Rate used to convert fees paid in this asset into core via the fee
    /// pool.
    pub core_exchange_rate: Price,

    /// Fixed point with denominator [`RATIO_DENOM`].
    pub maintenance_collateral_ratio: u16,

    /// Fixed point with denominator [`RATIO_DENOM`].
    pub maximum_short_squeeze_ratio: u16,

    /// Optional stricter ratio enforced when opening or increasing debt.
    pub initial_collateral_ratio: Option<u16>,
}

impl PriceFeed {
    pub fn null(debt: AssetId, collateral: AssetId) -> Self {
        Self {
            settlement_price: Price::null(debt, collateral),
            core_exchange_rate: Price::null(debt, super::CORE_ASSET),
            maintenance_collateral_ratio: DEFAULT_MAINTENANCE_COLLATERAL_RATIO,
            maximum_short_squeeze_ratio: DEFAULT_MAX_SHORT_SQUEEZE_RATIO,
            initial_collateral_ratio: None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.settlement_price.is_null()
    }

    pub fn validate(&self) -> MeridianResult<()> {
        for (field, value) in [
            (
                "maintenance_collateral_ratio",
                self.maintenance_collateral_ratio,
            ),
            (
                "maximum_short_squeeze_ratio",
                self.maximum_short_squeeze_ratio,
            ),
        ] {
            if !(MIN_COLLATERAL_RATIO..=MAX_COLLATERAL_RATIO).contains(&value) {
                return Err(crate::error::ValidationError::RatioOutOfRange { field, value }.into());
            }
        }
        if let Some(icr) = self.initial_collateral_ratio {
            if !(MIN_COLLATERAL_RATIO..=MAX_COLLATERAL_RATIO).contains(&icr) {
                return Err(crate::error::ValidationError::RatioOutOfRange {
                    field: "initial_collateral_ratio",
                    value: icr,
                }
                .into());
            }
        }
        if !self.settlement_price.is_null() {
            self.settlement_price.validate()?;
        }
        Ok(())
    }

    /// Worst price at which the network will force collateral to sell: the
    /// feed discounted by the full short-squeeze ratio.
    pub fn max_short_squeeze_price(&self) -> MeridianResult<Price> {
        self.settlement_price.scaled(
            u64::from(RATIO_DENOM),
            u64::from(self.maximum_short_squeeze_ratio),
        )
    }

    /// Price offered to the order book during a margin call: slightly better
    /// than [`Self::max_short_squeeze_price`], keeping the margin-call fee
    /// ratio for the network. Never better for the caller than the feed
    /// itself.
    pub fn margin_call_order_price(&self, margin_call_fee_ratio: u16) -> MeridianResult<Price> {
        let den = self
            .maximum_short_squeeze_ratio
            .saturating_sub(margin_call_fee_ratio)
            .max(RATIO_DENOM);
        self.settlement_price
            .scaled(u64::from(RATIO_DENOM), u64::from(den))
    }

    /// The ratio at which new or growing positions must collateralize:
    /// the ICR when published, the MCR otherwise.
    pub fn opening_collateral_ratio(&self) -> u16 {
        self.initial_collateral_ratio
            .unwrap_or(self.maintenance_collateral_ratio)
            .max(self.maintenance_collateral_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Share;

    fn amt(v: i64, a: u64) -> AssetAmount {
        AssetAmount::new(v, AssetId(a))
    }

    #[test]
    fn price_comparison_is_exact() {
        let a = Price::new(amt(1000, 1), amt(20, 2));
        let b = Price::new(amt(100, 1), amt(2, 2));
        assert_eq!(a.cmp_same_pair(&b), Ordering::Equal);
        let c = Price::new(amt(101, 1), amt(2, 2));
        assert_eq!(c.cmp_same_pair(&a), Ordering::Greater);
    }

    #[test]
    fn multiply_rounds_as_requested() {
        let p = Price::new(amt(3, 1), amt(2, 2));
        let sold = amt(5, 1);
        assert_eq!(sold.multiply(&p, Rounding::Down).unwrap(), amt(3, 2));
        assert_eq!(sold.multiply(&p, Rounding::Up).unwrap(), amt(4, 2));
        // Quote-side amounts convert back through the same ratio.
        let bought = amt(4, 2);
        assert_eq!(bought.multiply(&p, Rounding::Up).unwrap(), amt(6, 1));
    }

    #[test]
    fn short_squeeze_price_reduces_exactly() {
        // feed 100000 debt : 1650 collateral, MSSR 1.25 => 100000 : 2062.5,
        // kept exactly as the reduced ratio 8000 : 165.
        let feed = PriceFeed {
            settlement_price: Price::new(amt(100_000, 1), amt(1650, 0)),
            core_exchange_rate: Price::new(amt(1, 1), amt(1, 0)),
            maintenance_collateral_ratio: 1250,
            maximum_short_squeeze_ratio: 1250,
            initial_collateral_ratio: None,
        };
        let squeeze = feed.max_short_squeeze_price().unwrap();
        assert_eq!(squeeze.base.amount, Share(1600));
        assert_eq!(squeeze.quote.amount, Share(33));
        // 1600/33 == 100000/2062.5
        let match_price = feed.margin_call_order_price(11).unwrap();
        // 100000:1650 * 1000:1239 => 100000000:2044350, gcd 50
        assert_eq!(match_price.base.amount, Share(2_000_000));
        assert_eq!(match_price.quote.amount, Share(40_887));
    }

    #[test]
    fn call_price_matches_ratio_definition() {
        let debt = amt(100_000, 1);
        let collateral = amt(2000, 0);
        let cp = Price::call_price(debt, collateral, 1250).unwrap();
        // 100000*1250 : 2000*1000 => 125000000:2000000 reduced to 125:2
        assert_eq!(cp.base.amount, Share(125));
        assert_eq!(cp.quote.amount, Share(2));
    }
}
