use crate::{
    database::Database,
    entity::{
        AccountObject, AssetBitassetObject, AssetObject, CallOrderObject, CollateralBidObject,
        ForceSettlementObject, LimitOrderObject,
    },
    error::{MarketError, MeridianResult, StateError, ValidationError},
    evaluator::{EvalContext, OperationEvaluator},
    market,
    protocol::{
        AssetAmount, AssetGlobalSettleOperation, AssetSettleOperation, BidCollateralOperation,
        CallOrderId, CallOrderUpdateOperation, LimitOrderCancelOperation,
        LimitOrderCreateOperation, MAX_COLLATERAL_RATIO, MIN_COLLATERAL_RATIO, Price, Share,
    },
};

fn check_market_authorization(
    db: &Database,
    account: &AccountObject,
    asset: &AssetObject,
) -> MeridianResult<()> {
    if !db.is_authorized_asset(account, asset) {
        return Err(StateError::UnauthorizedByWhitelist {
            account: account.id,
            asset: asset.id,
        }
        .into());
    }
    Ok(())
}

/// Market whitelist/blacklist: the sold asset's options may restrict which
/// assets it trades against.
fn check_market_allowed(sell: &AssetObject, receive: &AssetObject) -> MeridianResult<()> {
    for (options, other) in [(&sell.options, receive.id), (&receive.options, sell.id)] {
        if !options.whitelist_markets.is_empty() && !options.whitelist_markets.contains(&other) {
            return Err(StateError::MarketNotWhitelisted(sell.id, receive.id).into());
        }
        if options.blacklist_markets.contains(&other) {
            return Err(StateError::MarketNotWhitelisted(sell.id, receive.id).into());
        }
    }
    Ok(())
}

/// The limit-order path keeps its fee deferred on the order instead of the
/// common split pipeline, so it does not implement [`OperationEvaluator`].
pub fn apply_limit_order_create(
    db: &mut Database,
    ctx: &EvalContext,
    op: &LimitOrderCreateOperation,
    deferred_core_fee: Share,
) -> MeridianResult<()> {
    if !op.amount_to_sell.amount.is_positive() || !op.min_to_receive.amount.is_positive() {
        return Err(ValidationError::NonPositiveAmount(
            op.amount_to_sell.amount.0.min(op.min_to_receive.amount.0),
        )
        .into());
    }
    if op.amount_to_sell.asset == op.min_to_receive.asset {
        return Err(ValidationError::InvalidOperation {
            field: "min_to_receive",
            reason: "cannot trade an asset against itself",
        }
        .into());
    }
    if op.expiration <= ctx.now {
        return Err(ValidationError::InvalidOperation {
            field: "expiration",
            reason: "order already expired",
        }
        .into());
    }
    {
        let seller = db.get::<AccountObject>(op.seller)?;
        let sell_asset = db.get::<AssetObject>(op.amount_to_sell.asset)?;
        let receive_asset = db.get::<AssetObject>(op.min_to_receive.asset)?;
        check_market_authorization(db, seller, sell_asset)?;
        check_market_authorization(db, seller, receive_asset)?;
        check_market_allowed(sell_asset, receive_asset)?;
        let available = db.get_balance(op.seller, op.amount_to_sell.asset);
        if available.0 < op.amount_to_sell.amount.0 {
            return Err(StateError::InsufficientBalance {
                asset: op.amount_to_sell.asset,
                required: op.amount_to_sell.amount.0,
                available: available.0,
            }
            .into());
        }
    }

    db.adjust_balance(
        op.seller,
        AssetAmount::new(-op.amount_to_sell.amount.0, op.amount_to_sell.asset),
    )?;
    db.adjust_core_in_orders(op.seller, op.amount_to_sell)?;
    let order_id = db.create(|id| LimitOrderObject {
        id,
        seller: op.seller,
        for_sale: op.amount_to_sell.amount,
        sell_price: op.sell_price(),
        expiration: op.expiration,
        deferred_fee: deferred_core_fee,
        is_settled_debt: false,
    })?;

    let filled = market::apply_order(db, order_id)?;
    if op.fill_or_kill && !filled {
        return Err(MarketError::FillOrKillUnfilled.into());
    }
    Ok(())
}

pub struct LimitOrderCancelEvaluator;

impl OperationEvaluator for LimitOrderCancelEvaluator {
    type Op = LimitOrderCancelOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        let order = db.get::<LimitOrderObject>(op.order)?;
        if order.is_settled_debt {
            return Err(StateError::Precondition("settled-debt orders cannot be cancelled").into());
        }
        if order.seller != op.fee_paying_account {
            return Err(StateError::Precondition("only the seller may cancel an order").into());
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        market::cancel_limit_order(db, op.order)
    }
}

pub struct CallOrderUpdateEvaluator {
    bitasset_id: crate::protocol::AssetBitassetId,
    existing: Option<CallOrderId>,
    new_debt: Share,
    new_collateral: Share,
}

impl OperationEvaluator for CallOrderUpdateEvaluator {
    type Op = CallOrderUpdateOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if op.delta_debt.amount.is_zero() && op.delta_collateral.amount.is_zero() {
            return Err(ValidationError::InvalidOperation {
                field: "call_order_update",
                reason: "nothing to update",
            }
            .into());
        }
        if let Some(tcr) = op.target_collateral_ratio {
            if !(MIN_COLLATERAL_RATIO..=MAX_COLLATERAL_RATIO).contains(&tcr) {
                return Err(ValidationError::RatioOutOfRange {
                    field: "target_collateral_ratio",
                    value: tcr,
                }
                .into());
            }
        }
        let debt_asset = db.get::<AssetObject>(op.delta_debt.asset)?;
        let bitasset_id = debt_asset
            .bitasset_data
            .ok_or(StateError::Precondition("debt asset is not market-issued"))?;
        let bitasset = db.get::<AssetBitassetObject>(bitasset_id)?;
        if bitasset.has_settlement() {
            return Err(MarketError::GloballySettled(debt_asset.id).into());
        }
        if op.delta_collateral.asset != bitasset.backing_asset() {
            return Err(StateError::AssetTypeMismatch {
                expected: bitasset.backing_asset(),
                got: op.delta_collateral.asset,
            }
            .into());
        }
        let account = db.get::<AccountObject>(op.funding_account)?;
        check_market_authorization(db, account, debt_asset)?;

        let existing = db
            .index::<CallOrderObject>()
            .by_account
            .get(&(op.funding_account, op.delta_debt.asset))
            .copied()
            .map(CallOrderId);
        let (old_debt, old_collateral) = match existing {
            Some(call_id) => {
                let call = db.get::<CallOrderObject>(call_id)?;
                (call.debt, call.collateral)
            }
            None => (Share::ZERO, Share::ZERO),
        };
        let new_debt = old_debt.checked_add(op.delta_debt.amount)?;
        let new_collateral = old_collateral.checked_add(op.delta_collateral.amount)?;
        if new_debt.is_negative() || new_collateral.is_negative() {
            return Err(StateError::InsufficientCollateral.into());
        }
        if new_debt.is_zero() && new_collateral.is_positive() {
            return Err(StateError::Precondition(
                "closing a position must withdraw all collateral",
            )
            .into());
        }
        if new_debt.is_positive() && new_collateral.is_zero() {
            return Err(StateError::InsufficientCollateral.into());
        }

        // Growing the position requires a live feed and opening-ratio
        // coverage.
        let growing = op.delta_debt.amount.is_positive()
            || op.delta_collateral.amount.is_negative();
        if growing {
            if !bitasset.feed_is_valid() {
                return Err(StateError::InsufficientFeeds(debt_asset.id).into());
            }
            let feed = &bitasset.current_feed;
            let ratio = feed.opening_collateral_ratio();
            let lhs = i128::from(new_collateral.0)
                * i128::from(feed.settlement_price.base.amount.0)
                * i128::from(crate::protocol::RATIO_DENOM);
            let rhs = i128::from(new_debt.0)
                * i128::from(feed.settlement_price.quote.amount.0)
                * i128::from(ratio);
            if new_debt.is_positive() && lhs <= rhs {
                return Err(StateError::InsufficientCollateral.into());
            }
        }

        // Funding checks.
        if op.delta_collateral.amount.is_positive() {
            let available = db.get_balance(op.funding_account, op.delta_collateral.asset);
            if available.0 < op.delta_collateral.amount.0 {
                return Err(StateError::InsufficientBalance {
                    asset: op.delta_collateral.asset,
                    required: op.delta_collateral.amount.0,
                    available: available.0,
                }
                .into());
            }
        }
        if op.delta_debt.amount.is_negative() {
            let repay = -op.delta_debt.amount.0;
            let available = db.get_balance(op.funding_account, op.delta_debt.asset);
            if available.0 < repay {
                return Err(StateError::InsufficientBalance {
                    asset: op.delta_debt.asset,
                    required: repay,
                    available: available.0,
                }
                .into());
            }
        }
        Ok(Self {
            bitasset_id,
            existing,
            new_debt,
            new_collateral,
        })
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        let mcr = db
            .get::<AssetBitassetObject>(self.bitasset_id)?
            .current_feed
            .maintenance_collateral_ratio;

        // Move funds: collateral into escrow (or back), debt into
        // circulation (or out of it).
        db.adjust_balance(
            op.funding_account,
            AssetAmount::new(-op.delta_collateral.amount.0, op.delta_collateral.asset),
        )?;
        db.adjust_core_in_orders(op.funding_account, op.delta_collateral)?;
        db.adjust_supply(op.delta_debt.asset, op.delta_debt.amount)?;
        db.adjust_balance(op.funding_account, op.delta_debt)?;

        let call_id = if self.new_debt.is_zero() {
            if let Some(call_id) = self.existing {
                db.remove::<CallOrderObject>(call_id)?;
            }
            None
        } else {
            let call_price = Price::call_price(
                AssetAmount::new(self.new_debt, op.delta_debt.asset),
                AssetAmount::new(self.new_collateral, op.delta_collateral.asset),
                mcr,
            )?;
            match self.existing {
                Some(call_id) => {
                    db.modify::<CallOrderObject>(call_id, |call| {
                        call.debt = self.new_debt;
                        call.collateral = self.new_collateral;
                        call.call_price = call_price;
                        call.target_collateral_ratio = op.target_collateral_ratio;
                        Ok(())
                    })?;
                    Some(call_id)
                }
                None => Some(db.create(|id| CallOrderObject {
                    id,
                    borrower: op.funding_account,
                    collateral: self.new_collateral,
                    collateral_asset: op.delta_collateral.asset,
                    debt: self.new_debt,
                    debt_asset: op.delta_debt.asset,
                    call_price,
                    target_collateral_ratio: op.target_collateral_ratio,
                })?),
            }
        };

        // If the update leaves the position callable, a sweep must be able
        // to resolve it; otherwise the update is rejected and the borrower
        // has to post more collateral.
        market::check_call_orders(db, op.delta_debt.asset, self.bitasset_id)?;
        if let Some(call_id) = call_id {
            if let Some(call) = db.find::<CallOrderObject>(call_id) {
                let bitasset = db.get::<AssetBitassetObject>(self.bitasset_id)?;
                if bitasset.feed_is_valid()
                    && call.is_callable(
                        &bitasset.current_feed.settlement_price,
                        bitasset.current_feed.maintenance_collateral_ratio,
                    )
                {
                    return Err(MarketError::OrderWouldBeMarginCalled.into());
                }
            }
        }
        Ok(())
    }
}

pub struct AssetSettleEvaluator {
    bitasset_id: crate::protocol::AssetBitassetId,
    instant: bool,
}

impl OperationEvaluator for AssetSettleEvaluator {
    type Op = AssetSettleOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if !op.amount.amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(op.amount.amount.0).into());
        }
        let asset = db.get::<AssetObject>(op.amount.asset)?;
        let bitasset_id = asset
            .bitasset_data
            .ok_or(StateError::Precondition("asset is not market-issued"))?;
        let bitasset = db.get::<AssetBitassetObject>(bitasset_id)?;
        let instant = bitasset.has_settlement()
            || (bitasset.has_individual_settlement()
                && bitasset.individual_settlement_fund.is_positive());
        if !instant && !asset.can_force_settle() {
            return Err(MarketError::ForceSettleDisabled(asset.id).into());
        }
        let account = db.get::<AccountObject>(op.account)?;
        check_market_authorization(db, account, asset)?;
        let available = db.get_balance(op.account, op.amount.asset);
        if available.0 < op.amount.amount.0 {
            return Err(StateError::InsufficientBalance {
                asset: op.amount.asset,
                required: op.amount.amount.0,
                available: available.0,
            }
            .into());
        }
        Ok(Self {
            bitasset_id,
            instant,
        })
    }

    fn apply(self, db: &mut Database, ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.adjust_balance(
            op.account,
            AssetAmount::new(-op.amount.amount.0, op.amount.asset),
        )?;
        if self.instant {
            let receives = market::settle_from_funds(db, self.bitasset_id, op.amount)?
                .ok_or(StateError::Precondition("settlement fund is empty"))?;
            db.adjust_balance(op.account, receives)?;
            return Ok(());
        }
        let delay = db
            .get::<AssetBitassetObject>(self.bitasset_id)?
            .options
            .force_settlement_delay_sec;
        db.create(|id| ForceSettlementObject {
            id,
            owner: op.account,
            balance: op.amount,
            settlement_date: ctx.now + chrono::Duration::seconds(i64::from(delay)),
        })?;
        Ok(())
    }
}

pub struct AssetGlobalSettleEvaluator {
    bitasset_id: crate::protocol::AssetBitassetId,
}

impl OperationEvaluator for AssetGlobalSettleEvaluator {
    type Op = AssetGlobalSettleOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        let asset = db.get::<AssetObject>(op.asset_to_settle)?;
        if asset.issuer != op.issuer {
            return Err(StateError::NotIssuer {
                expected: asset.issuer,
                got: op.issuer,
            }
            .into());
        }
        if !asset.can_global_settle() {
            return Err(StateError::Precondition(
                "asset does not permit global settlement",
            )
            .into());
        }
        let bitasset_id = asset
            .bitasset_data
            .ok_or(StateError::Precondition("asset is not market-issued"))?;
        let bitasset = db.get::<AssetBitassetObject>(bitasset_id)?;
        if bitasset.has_settlement() {
            return Err(MarketError::GloballySettled(asset.id).into());
        }
        op.settle_price.validate()?;
        if op.settle_price.base.asset != asset.id
            || op.settle_price.quote.asset != bitasset.backing_asset()
        {
            return Err(StateError::Precondition(
                "settle price must quote the asset against its backing",
            )
            .into());
        }
        // The worst-collateralized position must be able to pay.
        for call in db.iter::<CallOrderObject>() {
            if call.debt_asset != asset.id {
                continue;
            }
            let pays = call
                .debt_amount()
                .multiply(&op.settle_price, crate::protocol::Rounding::Up)?;
            if pays.amount.0 > call.collateral.0 {
                return Err(StateError::PriceOutOfRange.into());
            }
        }
        Ok(Self { bitasset_id })
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        market::global_settle(db, op.asset_to_settle, self.bitasset_id, op.settle_price)
    }
}

pub struct BidCollateralEvaluator {
    previous_bid: Option<crate::protocol::CollateralBidId>,
}

impl OperationEvaluator for BidCollateralEvaluator {
    type Op = BidCollateralOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if op.additional_collateral.amount.is_negative() || !op.debt_covered.amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(op.debt_covered.amount.0).into());
        }
        let asset = db.get::<AssetObject>(op.debt_covered.asset)?;
        let bitasset_id = asset
            .bitasset_data
            .ok_or(StateError::Precondition("asset is not market-issued"))?;
        let bitasset = db.get::<AssetBitassetObject>(bitasset_id)?;
        if !bitasset.has_settlement() {
            return Err(MarketError::NotGloballySettled(asset.id).into());
        }
        if op.additional_collateral.asset != bitasset.backing_asset() {
            return Err(StateError::AssetTypeMismatch {
                expected: bitasset.backing_asset(),
                got: op.additional_collateral.asset,
            }
            .into());
        }
        let available = db.get_balance(op.bidder, op.additional_collateral.asset);
        if available.0 < op.additional_collateral.amount.0 {
            return Err(StateError::InsufficientBalance {
                asset: op.additional_collateral.asset,
                required: op.additional_collateral.amount.0,
                available: available.0,
            }
            .into());
        }
        let previous_bid = db
            .index::<CollateralBidObject>()
            .by_account
            .get(&(op.bidder, op.debt_covered.asset))
            .copied()
            .map(crate::protocol::CollateralBidId);
        Ok(Self { previous_bid })
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        if let Some(previous) = self.previous_bid {
            let old = db.remove::<CollateralBidObject>(previous)?;
            db.adjust_balance(old.bidder, old.additional_collateral)?;
        }
        db.adjust_balance(
            op.bidder,
            AssetAmount::new(
                -op.additional_collateral.amount.0,
                op.additional_collateral.asset,
            ),
        )?;
        db.create(|id| CollateralBidObject {
            id,
            bidder: op.bidder,
            additional_collateral: op.additional_collateral,
            debt_covered: op.debt_covered,
        })?;
        Ok(())
    }
}
