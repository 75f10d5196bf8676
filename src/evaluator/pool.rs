use crate::{
    amm,
    database::Database,
    entity::{AccountObject, AssetDynamicObject, AssetObject, LiquidityPoolObject},
    error::{MarketError, MeridianResult, StateError, ValidationError},
    evaluator::{EvalContext, OperationEvaluator},
    market,
    protocol::{
        AssetAmount, LiquidityPoolCreateOperation, LiquidityPoolDeleteOperation,
        LiquidityPoolDepositOperation, LiquidityPoolExchangeOperation,
        LiquidityPoolWithdrawOperation, PERCENT_100, Share,
    },
};

fn check_authorized(
    db: &Database,
    account: crate::protocol::AccountId,
    asset: &AssetObject,
) -> MeridianResult<()> {
    let account_obj = db.get::<AccountObject>(account)?;
    if !db.is_authorized_asset(account_obj, asset) {
        return Err(StateError::UnauthorizedByWhitelist {
            account,
            asset: asset.id,
        }
        .into());
    }
    Ok(())
}

pub struct LiquidityPoolCreateEvaluator;

impl OperationEvaluator for LiquidityPoolCreateEvaluator {
    type Op = LiquidityPoolCreateOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if op.asset_a >= op.asset_b {
            return Err(ValidationError::InvalidOperation {
                field: "asset_a",
                reason: "pool assets must be distinct and ordered",
            }
            .into());
        }
        for percent in [op.taker_fee_percent, op.withdrawal_fee_percent] {
            if percent > PERCENT_100 {
                return Err(ValidationError::PercentageOutOfRange {
                    field: "pool fee",
                    value: percent,
                }
                .into());
            }
        }
        db.get::<AssetObject>(op.asset_a)?;
        db.get::<AssetObject>(op.asset_b)?;
        let share_asset = db.get::<AssetObject>(op.share_asset)?;
        if share_asset.issuer != op.account {
            return Err(StateError::NotIssuer {
                expected: share_asset.issuer,
                got: op.account,
            }
            .into());
        }
        if share_asset.is_market_issued() {
            return Err(StateError::Precondition(
                "a market-issued asset cannot be a pool share asset",
            )
            .into());
        }
        if op.share_asset == op.asset_a || op.share_asset == op.asset_b {
            return Err(StateError::Precondition(
                "the share asset cannot be pooled against itself",
            )
            .into());
        }
        let supply = db
            .get::<AssetDynamicObject>(share_asset.dynamic_data)?
            .current_supply;
        if supply.is_positive() {
            return Err(StateError::Precondition(
                "the share asset must have zero supply at pool creation",
            )
            .into());
        }
        if db
            .index::<LiquidityPoolObject>()
            .by_share_asset
            .contains_key(&op.share_asset)
        {
            return Err(StateError::Precondition("share asset already backs a pool").into());
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.create(|id| LiquidityPoolObject {
            id,
            owner: op.account,
            asset_a: op.asset_a,
            asset_b: op.asset_b,
            balance_a: Share::ZERO,
            balance_b: Share::ZERO,
            share_asset: op.share_asset,
            taker_fee_percent: op.taker_fee_percent,
            withdrawal_fee_percent: op.withdrawal_fee_percent,
            virtual_value: 0,
        })?;
        Ok(())
    }
}

pub struct LiquidityPoolDeleteEvaluator;

impl OperationEvaluator for LiquidityPoolDeleteEvaluator {
    type Op = LiquidityPoolDeleteOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        let pool = db.get::<LiquidityPoolObject>(op.pool)?;
        if pool.owner != op.account {
            return Err(StateError::Precondition("only the pool owner may delete it").into());
        }
        if pool.balance_a.is_positive() || pool.balance_b.is_positive() {
            return Err(MarketError::PoolNotEmpty.into());
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.remove::<LiquidityPoolObject>(op.pool)?;
        Ok(())
    }
}

pub struct LiquidityPoolDepositEvaluator {
    quote: amm::DepositQuote,
}

impl OperationEvaluator for LiquidityPoolDepositEvaluator {
    type Op = LiquidityPoolDepositOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        let pool = db.get::<LiquidityPoolObject>(op.pool)?;
        if op.amount_a.asset != pool.asset_a || op.amount_b.asset != pool.asset_b {
            return Err(StateError::AssetTypeMismatch {
                expected: pool.asset_a,
                got: op.amount_a.asset,
            }
            .into());
        }
        let share_asset = db.get::<AssetObject>(pool.share_asset)?;
        let share_dynamic = db.get::<AssetDynamicObject>(share_asset.dynamic_data)?;
        if share_dynamic.current_supply.is_zero() && pool.owner != op.account {
            return Err(StateError::Precondition(
                "the initial deposit can only be made by the pool owner",
            )
            .into());
        }
        for asset_id in [pool.asset_a, pool.asset_b, pool.share_asset] {
            let asset = db.get::<AssetObject>(asset_id)?;
            check_authorized(db, op.account, asset)?;
        }
        for (amount, asset) in [(op.amount_a, pool.asset_a), (op.amount_b, pool.asset_b)] {
            let available = db.get_balance(op.account, asset);
            if available.0 < amount.amount.0 {
                return Err(StateError::InsufficientBalance {
                    asset,
                    required: amount.amount.0,
                    available: available.0,
                }
                .into());
            }
        }
        let quote = amm::quote_deposit(
            pool,
            share_dynamic.current_supply,
            share_asset.options.max_supply,
            op.amount_a.amount,
            op.amount_b.amount,
        )?;
        Ok(Self { quote })
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        let pool = db.get::<LiquidityPoolObject>(op.pool)?.clone();
        db.adjust_balance(
            op.account,
            AssetAmount::new(-self.quote.pool_receives_a.0, pool.asset_a),
        )?;
        db.adjust_balance(
            op.account,
            AssetAmount::new(-self.quote.pool_receives_b.0, pool.asset_b),
        )?;
        db.adjust_supply(pool.share_asset, self.quote.new_shares)?;
        db.adjust_balance(
            op.account,
            AssetAmount::new(self.quote.new_shares, pool.share_asset),
        )?;
        db.modify::<LiquidityPoolObject>(op.pool, |p| {
            p.balance_a = p.balance_a.checked_add(self.quote.pool_receives_a)?;
            p.balance_b = p.balance_b.checked_add(self.quote.pool_receives_b)?;
            p.update_virtual_value();
            Ok(())
        })
    }
}

pub struct LiquidityPoolWithdrawEvaluator {
    quote: amm::WithdrawQuote,
}

impl OperationEvaluator for LiquidityPoolWithdrawEvaluator {
    type Op = LiquidityPoolWithdrawOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        let pool = db.get::<LiquidityPoolObject>(op.pool)?;
        if op.share_amount.asset != pool.share_asset {
            return Err(StateError::AssetTypeMismatch {
                expected: pool.share_asset,
                got: op.share_amount.asset,
            }
            .into());
        }
        if !pool.is_initialized() {
            return Err(MarketError::PoolUninitialized.into());
        }
        let share_asset = db.get::<AssetObject>(pool.share_asset)?;
        let share_dynamic = db.get::<AssetDynamicObject>(share_asset.dynamic_data)?;
        let available = db.get_balance(op.account, pool.share_asset);
        if available.0 < op.share_amount.amount.0 {
            return Err(StateError::InsufficientBalance {
                asset: pool.share_asset,
                required: op.share_amount.amount.0,
                available: available.0,
            }
            .into());
        }
        let quote = amm::quote_withdraw(pool, share_dynamic.current_supply, op.share_amount.amount)?;
        Ok(Self { quote })
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        let pool = db.get::<LiquidityPoolObject>(op.pool)?.clone();
        db.adjust_balance(
            op.account,
            AssetAmount::new(-op.share_amount.amount.0, pool.share_asset),
        )?;
        db.adjust_supply(pool.share_asset, Share(-op.share_amount.amount.0))?;
        if self.quote.pays_a.is_positive() {
            db.adjust_balance(op.account, AssetAmount::new(self.quote.pays_a, pool.asset_a))?;
        }
        if self.quote.pays_b.is_positive() {
            db.adjust_balance(op.account, AssetAmount::new(self.quote.pays_b, pool.asset_b))?;
        }
        db.modify::<LiquidityPoolObject>(op.pool, |p| {
            p.balance_a = p
                .balance_a
                .checked_sub(self.quote.pays_a.checked_add(self.quote.fee_a)?)?;
            p.balance_b = p
                .balance_b
                .checked_sub(self.quote.pays_b.checked_add(self.quote.fee_b)?)?;
            p.update_virtual_value();
            Ok(())
        })
    }
}

pub struct LiquidityPoolExchangeEvaluator {
    maker_market_fee: Share,
    quote: amm::ExchangeQuote,
    taker_market_fee: Share,
    account_receives: AssetAmount,
}

impl OperationEvaluator for LiquidityPoolExchangeEvaluator {
    type Op = LiquidityPoolExchangeOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        let pool = db.get::<LiquidityPoolObject>(op.pool)?;
        if !pool.is_initialized() {
            return Err(MarketError::PoolUninitialized.into());
        }
        let pay_asset = pool.counter_asset(op.amount_to_sell.asset)?;
        if op.min_to_receive.asset != pay_asset {
            return Err(StateError::AssetTypeMismatch {
                expected: pay_asset,
                got: op.min_to_receive.asset,
            }
            .into());
        }
        if !op.amount_to_sell.amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(op.amount_to_sell.amount.0).into());
        }
        for asset_id in [pool.asset_a, pool.asset_b] {
            let asset = db.get::<AssetObject>(asset_id)?;
            check_authorized(db, op.account, asset)?;
        }
        let available = db.get_balance(op.account, op.amount_to_sell.asset);
        if available.0 < op.amount_to_sell.amount.0 {
            return Err(StateError::InsufficientBalance {
                asset: op.amount_to_sell.asset,
                required: op.amount_to_sell.amount.0,
                available: available.0,
            }
            .into());
        }

        // Maker-side market fee comes off the sold amount before it enters
        // the pool.
        let sold_asset = db.get::<AssetObject>(op.amount_to_sell.asset)?;
        let maker_market_fee = market::calculate_market_fee(sold_asset, op.amount_to_sell)?;
        if maker_market_fee.0 >= op.amount_to_sell.amount.0 {
            return Err(StateError::Precondition(
                "market fee of the sold asset consumes the whole amount",
            )
            .into());
        }
        let pool_receives = AssetAmount::new(
            op.amount_to_sell.amount.checked_sub(maker_market_fee)?,
            op.amount_to_sell.asset,
        );
        let quote = amm::quote_exchange(pool, pool_receives)?;

        // Taker-side market fee comes off what the pool pays out.
        let pay_asset_obj = db.get::<AssetObject>(pay_asset)?;
        let taker_market_fee = market::calculate_market_fee(pay_asset_obj, quote.pool_pays)?;
        let account_receives = AssetAmount::new(
            quote.pool_pays.amount.checked_sub(taker_market_fee)?,
            pay_asset,
        );
        if account_receives.amount.0 < op.min_to_receive.amount.0 {
            return Err(MarketError::PoolPriceMismatch.into());
        }
        Ok(Self {
            maker_market_fee,
            quote,
            taker_market_fee,
            account_receives,
        })
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.adjust_balance(
            op.account,
            AssetAmount::new(-op.amount_to_sell.amount.0, op.amount_to_sell.asset),
        )?;
        db.adjust_balance(op.account, self.account_receives)?;
        market::pay_market_fee(db, op.amount_to_sell.asset, self.maker_market_fee)?;
        market::pay_market_fee(db, self.account_receives.asset, self.taker_market_fee)?;
        db.modify::<LiquidityPoolObject>(op.pool, |p| {
            if self.quote.pool_receives.asset == p.asset_a {
                p.balance_a = p.balance_a.checked_add(self.quote.pool_receives.amount)?;
                p.balance_b = p.balance_b.checked_sub(self.quote.pool_pays.amount)?;
            } else {
                p.balance_b = p.balance_b.checked_add(self.quote.pool_receives.amount)?;
                p.balance_a = p.balance_a.checked_sub(self.quote.pool_pays.amount)?;
            }
            p.update_virtual_value();
            Ok(())
        })
    }
}
