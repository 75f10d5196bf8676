use crate::{
    database::Database,
    entity::{
        AssetBitassetObject, AssetDynamicObject, AssetObject, CallOrderObject, LimitOrderObject,
    },
    error::{MeridianResult, StateError},
    protocol::{
        AssetAmount, AssetId, CallOrderId, LimitOrderId, PERCENT_100, Price, Rounding, Share,
    },
};

/// Market fee charged on `amount` when it is credited to a trader:
/// `market_fee_percent` of the amount, floored, capped at the asset's
/// `max_market_fee`.
pub fn calculate_market_fee(asset: &AssetObject, amount: AssetAmount) -> MeridianResult<Share> {
    if !asset.charges_market_fees() || amount.amount.is_zero() {
        return Ok(Share::ZERO);
    }
    let fee = amount.amount.scale(
        u64::from(asset.options.market_fee_percent),
        u64::from(PERCENT_100),
        Rounding::Down,
    )?;
    Ok(Share(fee.0.min(asset.options.max_market_fee.0)))
}

/// Accrues a collected market fee onto the asset's dynamic data.
pub fn pay_market_fee(db: &mut Database, asset_id: AssetId, fee: Share) -> MeridianResult<()> {
    if fee.is_zero() {
        return Ok(());
    }
    let dynamic_id = db.get::<AssetObject>(asset_id)?.dynamic_data;
    db.modify::<AssetDynamicObject>(dynamic_id, |dyn_data| {
        dyn_data.accumulated_fees = dyn_data.accumulated_fees.checked_add(fee)?;
        Ok(())
    })
}

/// Credits `amount` to `account` net of the receiving asset's market fee;
/// returns the fee kept by the asset.
pub fn credit_with_market_fee(
    db: &mut Database,
    account: crate::protocol::AccountId,
    amount: AssetAmount,
) -> MeridianResult<Share> {
    let fee = {
        let asset = db.get::<AssetObject>(amount.asset)?;
        calculate_market_fee(asset, amount)?
    };
    pay_market_fee(db, amount.asset, fee)?;
    db.adjust_balance(
        account,
        AssetAmount::new(amount.amount.checked_sub(fee)?, amount.asset),
    )?;
    Ok(fee)
}

/// Applies one fill to a resting limit order: pays out of escrow, credits
/// the received side (net of market fees), and removes or culls the order.
/// Returns true when the order left the book.
pub fn fill_limit_order(
    db: &mut Database,
    order_id: LimitOrderId,
    pays: AssetAmount,
    receives: AssetAmount,
    cull_if_small: bool,
) -> MeridianResult<bool> {
    let order = db.get::<LimitOrderObject>(order_id)?.clone();
    if order.is_settled_debt {
        return fill_settled_debt_order(db, order_id, pays, receives);
    }
    debug_assert_eq!(pays.asset, order.sell_asset());
    debug_assert_eq!(receives.asset, order.receive_asset());

    credit_with_market_fee(db, order.seller, receives)?;
    db.adjust_core_in_orders(order.seller, AssetAmount::new(Share(-pays.amount.0), pays.asset))?;

    if pays.amount == order.for_sale {
        db.pay_fee(order.seller, order.deferred_fee)?;
        db.remove::<LimitOrderObject>(order_id)?;
        return Ok(true);
    }

    db.modify::<LimitOrderObject>(order_id, |o| {
        o.for_sale = o.for_sale.checked_sub(pays.amount)?;
        Ok(())
    })?;
    if cull_if_small {
        let remaining = db.get::<LimitOrderObject>(order_id)?;
        if remaining.amount_to_receive()?.amount.is_zero() {
            tracing::debug!(order = %order_id, "culling dust order");
            cancel_limit_order(db, order_id)?;
            return Ok(true);
        }
    }
    Ok(false)
}

/// Cancels a resting order: refunds the remaining escrow and the deferred
/// fee, then removes it.
pub fn cancel_limit_order(db: &mut Database, order_id: LimitOrderId) -> MeridianResult<()> {
    let order = db.get::<LimitOrderObject>(order_id)?.clone();
    if order.is_settled_debt {
        return Err(StateError::Precondition("settled-debt orders cannot be cancelled").into());
    }
    db.adjust_balance(order.seller, order.amount_for_sale())?;
    db.adjust_core_in_orders(
        order.seller,
        AssetAmount::new(Share(-order.for_sale.0), order.sell_asset()),
    )?;
    if order.deferred_fee.is_positive() {
        db.adjust_balance(
            order.seller,
            AssetAmount::new(order.deferred_fee, crate::protocol::CORE_ASSET),
        )?;
    }
    db.remove::<LimitOrderObject>(order_id)?;
    Ok(())
}

/// Fills the synthetic settled-debt order: the received debt asset is
/// burned against the bitasset's outstanding individual-settlement debt and
/// the order's price is re-anchored to the remaining aggregates.
fn fill_settled_debt_order(
    db: &mut Database,
    order_id: LimitOrderId,
    pays: AssetAmount,
    receives: AssetAmount,
) -> MeridianResult<bool> {
    let order = db.get::<LimitOrderObject>(order_id)?.clone();
    let debt_asset = order.receive_asset();
    let bitasset_id = db
        .get::<AssetObject>(debt_asset)?
        .bitasset_data
        .ok_or(StateError::Precondition("settled-debt order without bitasset"))?;

    // Burn the received debt.
    db.adjust_supply(debt_asset, Share(-receives.amount.0))?;
    db.modify::<AssetBitassetObject>(bitasset_id, |ba| {
        ba.individual_settlement_debt = ba.individual_settlement_debt.checked_sub(receives.amount)?;
        Ok(())
    })?;

    let remaining_collateral = order.for_sale.checked_sub(pays.amount)?;
    let remaining_debt = db
        .get::<AssetBitassetObject>(bitasset_id)?
        .individual_settlement_debt;

    if remaining_debt.is_zero() || remaining_collateral.is_zero() {
        // Any residue on either side is kept by the asset as collateral
        // fees rather than left as an unfillable husk.
        if remaining_collateral.is_positive() {
            let dynamic_id = db.get::<AssetObject>(debt_asset)?.dynamic_data;
            db.modify::<AssetDynamicObject>(dynamic_id, |dyn_data| {
                dyn_data.accumulated_collateral_fees = dyn_data
                    .accumulated_collateral_fees
                    .checked_add(remaining_collateral)?;
                Ok(())
            })?;
        }
        db.modify::<AssetBitassetObject>(bitasset_id, |ba| {
            ba.settled_debt_order = None;
            ba.individual_settlement_debt = Share::ZERO;
            Ok(())
        })?;
        db.remove::<LimitOrderObject>(order_id)?;
        return Ok(true);
    }

    db.modify::<LimitOrderObject>(order_id, |o| {
        o.for_sale = remaining_collateral;
        o.sell_price = Price::new(
            AssetAmount::new(remaining_collateral, o.sell_asset()),
            AssetAmount::new(remaining_debt, debt_asset),
        );
        Ok(())
    })?;
    Ok(false)
}

/// Applies one fill to a call order; closes it and refunds leftover
/// collateral once the debt reaches zero. Returns true when the position
/// was closed.
pub fn fill_call_order(
    db: &mut Database,
    call_id: CallOrderId,
    pays_collateral: AssetAmount,
    receives_debt: AssetAmount,
    mcr: u16,
) -> MeridianResult<bool> {
    let call = db.get::<CallOrderObject>(call_id)?.clone();
    debug_assert_eq!(pays_collateral.asset, call.collateral_asset);
    debug_assert_eq!(receives_debt.asset, call.debt_asset);

    // Repaid debt leaves circulation.
    db.adjust_supply(call.debt_asset, Share(-receives_debt.amount.0))?;

    let new_debt = call.debt.checked_sub(receives_debt.amount)?;
    let new_collateral = call.collateral.checked_sub(pays_collateral.amount)?;
    if new_debt.is_negative() || new_collateral.is_negative() {
        return Err(StateError::InsufficientCollateral.into());
    }

    db.adjust_core_in_orders(
        call.borrower,
        AssetAmount::new(Share(-pays_collateral.amount.0), call.collateral_asset),
    )?;

    if new_debt.is_zero() {
        if new_collateral.is_positive() {
            db.adjust_balance(
                call.borrower,
                AssetAmount::new(new_collateral, call.collateral_asset),
            )?;
            db.adjust_core_in_orders(
                call.borrower,
                AssetAmount::new(Share(-new_collateral.0), call.collateral_asset),
            )?;
        }
        db.remove::<CallOrderObject>(call_id)?;
        return Ok(true);
    }

    db.modify::<CallOrderObject>(call_id, |c| {
        c.debt = new_debt;
        c.collateral = new_collateral;
        c.call_price = Price::call_price(
            AssetAmount::new(new_debt, c.debt_asset),
            AssetAmount::new(new_collateral, c.collateral_asset),
            mcr,
        )?;
        Ok(())
    })?;
    Ok(false)
}
