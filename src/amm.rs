//! Constant-product pool arithmetic.
//!
//! Pure quote functions over a pool's balances; the evaluators and the
//! margin-call sweep apply the resulting deltas. All intermediates are
//! 128-bit and every rounding direction protects the pool invariant
//! `balance_a * balance_b >= virtual_value`.

use crate::{
    entity::LiquidityPoolObject,
    error::{ArithmeticError, MarketError, MeridianResult, StateError},
    protocol::{AssetAmount, PERCENT_100, Share},
};

#[derive(Debug, Clone, Copy)]
pub struct DepositQuote {
    /// Amounts actually accepted by the pool (rounded up against the
    /// depositor; the surplus stays with the user).
    pub pool_receives_a: Share,
    pub pool_receives_b: Share,
    pub new_shares: Share,
}

/// Quotes a deposit. For the initial deposit the share grant is
/// `max(amount_a, amount_b)`; afterwards shares are the floor of the
/// proportional entitlement and the accepted amounts are rounded up.
pub fn quote_deposit(
    pool: &LiquidityPoolObject,
    share_supply: Share,
    share_max_supply: Share,
    amount_a: Share,
    amount_b: Share,
) -> MeridianResult<DepositQuote> {
    if !amount_a.is_positive() || !amount_b.is_positive() {
        return Err(crate::error::ValidationError::NonPositiveAmount(
            amount_a.0.min(amount_b.0),
        )
        .into());
    }
    if share_supply.is_zero() {
        let shares = Share(amount_a.0.max(amount_b.0));
        if shares.0 > share_max_supply.0 {
            return Err(StateError::Precondition(
                "initial deposit exceeds the share asset's maximum supply",
            )
            .into());
        }
        return Ok(DepositQuote {
            pool_receives_a: amount_a,
            pool_receives_b: amount_b,
            new_shares: shares,
        });
    }

    let supply = share_supply.0 as u128;
    let max_new = (share_max_supply.0 - share_supply.0) as u128;
    let if_a = supply * amount_a.0 as u128 / pool.balance_a.0 as u128;
    let if_b = supply * amount_b.0 as u128 / pool.balance_b.0 as u128;
    let new_shares = if_a.min(if_b).min(max_new);
    if new_shares == 0 {
        return Err(MarketError::PoolPriceMismatch.into());
    }
    // Round the accepted amounts up so the pool never under-collects.
    let take_a = (new_shares * pool.balance_a.0 as u128).div_ceil(supply);
    let take_b = (new_shares * pool.balance_b.0 as u128).div_ceil(supply);
    debug_assert!(take_a <= amount_a.0 as u128 && take_b <= amount_b.0 as u128);
    Ok(DepositQuote {
        pool_receives_a: Share(take_a as i64),
        pool_receives_b: Share(take_b as i64),
        new_shares: Share(
            i64::try_from(new_shares).map_err(|_| ArithmeticError::AmountOutOfRange)?,
        ),
    })
}

#[derive(Debug, Clone, Copy)]
pub struct WithdrawQuote {
    pub pays_a: Share,
    pub pays_b: Share,
    pub fee_a: Share,
    pub fee_b: Share,
}

/// Quotes a withdrawal: proportional floor on each side, withdrawal fee
/// floored and retained by the pool. Burning the last share empties the
/// pool fee-free.
pub fn quote_withdraw(
    pool: &LiquidityPoolObject,
    share_supply: Share,
    share_amount: Share,
) -> MeridianResult<WithdrawQuote> {
    if !share_amount.is_positive() {
        return Err(crate::error::ValidationError::NonPositiveAmount(share_amount.0).into());
    }
    if share_amount.0 > share_supply.0 {
        return Err(StateError::Precondition("cannot withdraw more than the share supply").into());
    }
    if share_amount == share_supply {
        return Ok(WithdrawQuote {
            pays_a: pool.balance_a,
            pays_b: pool.balance_b,
            fee_a: Share::ZERO,
            fee_b: Share::ZERO,
        });
    }
    let supply = share_supply.0 as u128;
    let share = share_amount.0 as u128;
    let fee_percent = u128::from(pool.withdrawal_fee_percent);
    let mut side = |balance: Share| -> (Share, Share) {
        let out = share * balance.0 as u128 / supply;
        let fee = out * fee_percent / u128::from(PERCENT_100);
        (Share((out - fee) as i64), Share(fee as i64))
    };
    let (pays_a, fee_a) = side(pool.balance_a);
    let (pays_b, fee_b) = side(pool.balance_b);
    if pays_a.is_zero() && pays_b.is_zero() {
        return Err(MarketError::PoolPriceMismatch.into());
    }
    Ok(WithdrawQuote {
        pays_a,
        pays_b,
        fee_a,
        fee_b,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct ExchangeQuote {
    /// What the pool takes in (the sold amount net of any maker market
    /// fee, which the caller deducts beforehand).
    pub pool_receives: AssetAmount,
    /// What the pool pays out net of its taker fee; the fee remains in the
    /// pool's balance, compounding for the share holders.
    pub pool_pays: AssetAmount,
    pub pool_taker_fee: AssetAmount,
}

/// Quotes swapping `pool_receives` into the opposite asset, preserving
/// `balance_a * balance_b >= virtual_value` by rounding the new pay-side
/// balance up.
pub fn quote_exchange(
    pool: &LiquidityPoolObject,
    pool_receives: AssetAmount,
) -> MeridianResult<ExchangeQuote> {
    if !pool.is_initialized() {
        return Err(MarketError::PoolUninitialized.into());
    }
    if !pool_receives.amount.is_positive() {
        return Err(crate::error::ValidationError::NonPositiveAmount(pool_receives.amount.0).into());
    }
    let pay_asset = pool.counter_asset(pool_receives.asset)?;
    let balance_in = pool.balance_of(pool_receives.asset)?;
    let balance_out = pool.balance_of(pay_asset)?;

    let new_balance_in = balance_in.checked_add(pool_receives.amount)?;
    // Round up: the pool may keep a fraction more than the invariant asks.
    let new_balance_out = pool.virtual_value.div_ceil(new_balance_in.0 as u128);
    if new_balance_out > balance_out.0 as u128 {
        return Err(MarketError::PoolPriceMismatch.into());
    }
    let delta = balance_out.0 as u128 - new_balance_out;
    let taker_fee = delta * u128::from(pool.taker_fee_percent) / u128::from(PERCENT_100);
    let pays = delta - taker_fee;
    if pays == 0 {
        return Err(MarketError::PoolPriceMismatch.into());
    }
    Ok(ExchangeQuote {
        pool_receives,
        pool_pays: AssetAmount::new(pays as i64, pay_asset),
        pool_taker_fee: AssetAmount::new(taker_fee as i64, pay_asset),
    })
}

/// Spot amount of `want` one unit batch of `give` would fetch; used by the
/// margin sweep to decide whether the pool beats the order book.
pub fn effective_price(
    pool: &LiquidityPoolObject,
    give: AssetAmount,
) -> MeridianResult<Option<crate::protocol::Price>> {
    match quote_exchange(pool, give) {
        Ok(quote) => Ok(Some(crate::protocol::Price::new(
            quote.pool_receives,
            quote.pool_pays,
        ))),
        Err(crate::error::MeridianError::Market(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AssetId, LiquidityPoolId};

    fn pool(balance_a: i64, balance_b: i64) -> LiquidityPoolObject {
        let mut pool = LiquidityPoolObject {
            id: LiquidityPoolId(0),
            owner: crate::protocol::AccountId(1),
            asset_a: AssetId(1),
            asset_b: AssetId(2),
            balance_a: Share(balance_a),
            balance_b: Share(balance_b),
            share_asset: AssetId(3),
            taker_fee_percent: 0,
            withdrawal_fee_percent: 0,
            virtual_value: 0,
        };
        pool.update_virtual_value();
        pool
    }

    #[test]
    fn proportional_deposit_rounds_acceptance_up() {
        // Pool (A=1000, B=2000, shares=2000), deposit (10, 20):
        // new_shares = min(2000*10/1000, 2000*20/2000) = 20,
        // accepted A = ceil(20*1000/2000) = 10, B = ceil(20*2000/2000) = 20.
        let quote = quote_deposit(&pool(1000, 2000), Share(2000), Share(i64::MAX), Share(10), Share(20))
            .unwrap();
        assert_eq!(quote.new_shares, Share(20));
        assert_eq!(quote.pool_receives_a, Share(10));
        assert_eq!(quote.pool_receives_b, Share(20));
    }

    #[test]
    fn unbalanced_deposit_takes_the_smaller_entitlement() {
        let quote = quote_deposit(&pool(1000, 2000), Share(2000), Share(i64::MAX), Share(10), Share(10))
            .unwrap();
        // 2000*10/2000 = 10 shares from the B side.
        assert_eq!(quote.new_shares, Share(10));
        assert_eq!(quote.pool_receives_a, Share(5));
        assert_eq!(quote.pool_receives_b, Share(10));
    }

    #[test]
    fn exchange_preserves_the_product() {
        let p = pool(1000, 2000);
        let quote = quote_exchange(&p, AssetAmount::new(100, AssetId(1))).unwrap();
        // new_a = 1100, new_b = ceil(2_000_000/1100) = 1819, delta = 181.
        assert_eq!(quote.pool_pays.amount, Share(181));
        let new_a = 1000 + 100;
        let new_b = 2000 - 181;
        assert!((new_a as u128) * (new_b as u128) >= p.virtual_value);
    }

    #[test]
    fn exchange_taker_fee_stays_in_pool() {
        let mut p = pool(1000, 2000);
        p.taker_fee_percent = 100; // 1%
        let quote = quote_exchange(&p, AssetAmount::new(100, AssetId(1))).unwrap();
        assert_eq!(quote.pool_taker_fee.amount, Share(1));
        assert_eq!(quote.pool_pays.amount, Share(180));
    }

    #[test]
    fn last_share_withdraw_empties_pool_without_fee() {
        let mut p = pool(1000, 2000);
        p.withdrawal_fee_percent = 500;
        let quote = quote_withdraw(&p, Share(2000), Share(2000)).unwrap();
        assert_eq!(quote.pays_a, Share(1000));
        assert_eq!(quote.pays_b, Share(2000));
        assert_eq!(quote.fee_a, Share::ZERO);
    }

    #[test]
    fn partial_withdraw_charges_fee_on_each_side() {
        let mut p = pool(1000, 2000);
        p.withdrawal_fee_percent = 1000; // 10%
        let quote = quote_withdraw(&p, Share(2000), Share(200)).unwrap();
        // Entitlement 100/200, fee 10/20.
        assert_eq!(quote.pays_a, Share(90));
        assert_eq!(quote.pays_b, Share(180));
        assert_eq!(quote.fee_b, Share(20));
    }
}
