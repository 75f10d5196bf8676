use serde::{Deserialize, Serialize};

use crate::{
    error::{ArithmeticError, MeridianResult, StateError},
    impl_from_primitive,
    protocol::AssetId,
};

/// A signed amount in an asset's base units.
///
/// Totals on the chain always fit within `MAX_SHARE_SUPPLY`; any arithmetic
/// that could leave that range is checked and surfaces as
/// [`ArithmeticError`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Share(pub i64);

impl_from_primitive!(Share, i64);

/// 10^15: upper bound on any asset supply, in base units.
pub const MAX_SHARE_SUPPLY: i64 = 1_000_000_000_000_000;

impl Share {
    pub const ZERO: Share = Share(0);

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Share) -> MeridianResult<Share> {
        self.0
            .checked_add(rhs.0)
            .map(Share)
            .ok_or_else(|| ArithmeticError::Overflow("share addition").into())
    }

    pub fn checked_sub(self, rhs: Share) -> MeridianResult<Share> {
        self.0
            .checked_sub(rhs.0)
            .map(Share)
            .ok_or_else(|| ArithmeticError::Underflow("share subtraction").into())
    }

    /// `self * num / den` in 128-bit intermediates, rounded as requested.
    pub fn scale(self, num: u64, den: u64, rounding: Rounding) -> MeridianResult<Share> {
        if den == 0 {
            return Err(ArithmeticError::DivisionByZero("share scaling").into());
        }
        let wide = i128::from(self.0) * i128::from(num);
        let den = i128::from(den);
        let out = match rounding {
            Rounding::Down => wide.div_euclid(den),
            Rounding::Up => {
                let q = wide.div_euclid(den);
                if wide.rem_euclid(den) != 0 { q + 1 } else { q }
            }
        };
        i64::try_from(out)
            .map(Share)
            .map_err(|_| ArithmeticError::AmountOutOfRange.into())
    }
}

impl std::fmt::Display for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Explicit rounding direction for every integer price multiplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

/// An amount of a concrete asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetAmount {
    pub amount: Share,
    pub asset: AssetId,
}

impl AssetAmount {
    pub fn new(amount: impl Into<Share>, asset: AssetId) -> Self {
        Self {
            amount: amount.into(),
            asset,
        }
    }

    pub fn zero(asset: AssetId) -> Self {
        Self::new(0, asset)
    }

    pub fn checked_add(self, rhs: AssetAmount) -> MeridianResult<AssetAmount> {
        self.same_asset(rhs)?;
        Ok(AssetAmount {
            amount: self.amount.checked_add(rhs.amount)?,
            asset: self.asset,
        })
    }

    pub fn checked_sub(self, rhs: AssetAmount) -> MeridianResult<AssetAmount> {
        self.same_asset(rhs)?;
        Ok(AssetAmount {
            amount: self.amount.checked_sub(rhs.amount)?,
            asset: self.asset,
        })
    }

    fn same_asset(self, rhs: AssetAmount) -> MeridianResult<()> {
        if self.asset == rhs.asset {
            Ok(())
        } else {
            Err(StateError::AssetTypeMismatch {
                expected: self.asset,
                got: rhs.asset,
            }
            .into())
        }
    }
}

impl std::fmt::Display for AssetAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} of {}", self.amount, self.asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_add_rejects_overflow() {
        assert!(Share(i64::MAX).checked_add(Share(1)).is_err());
        assert_eq!(Share(2).checked_add(Share(3)).unwrap(), Share(5));
    }

    #[test]
    fn scale_rounds_in_the_requested_direction() {
        assert_eq!(Share(10).scale(1, 3, Rounding::Down).unwrap(), Share(3));
        assert_eq!(Share(10).scale(1, 3, Rounding::Up).unwrap(), Share(4));
        assert_eq!(Share(9).scale(1, 3, Rounding::Up).unwrap(), Share(3));
    }

    #[test]
    fn mismatched_assets_do_not_add() {
        let a = AssetAmount::new(1, AssetId(0));
        let b = AssetAmount::new(1, AssetId(1));
        assert!(a.checked_add(b).is_err());
    }
}
