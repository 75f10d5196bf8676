use crate::{
    amm,
    database::Database,
    entity::{
        AssetBitassetObject, AssetDynamicObject, AssetObject, BidKey, CallOrderObject,
        CollateralBidObject, CollateralKey, LimitOrderObject, LiquidityPoolObject,
    },
    error::MeridianResult,
    protocol::{
        AssetAmount, AssetBitassetId, AssetId, BlackSwanResponse, CallOrderId, LimitOrderId,
        Price, RATIO_DENOM, Rounding, Share,
    },
};

use super::{fill, matching};

/// Everything the matching paths need to price a margin call.
#[derive(Debug, Clone, Copy)]
pub struct CallMatchContext {
    pub debt_asset: AssetId,
    pub backing_asset: AssetId,
    pub bitasset_id: AssetBitassetId,
    /// Feed settlement price, debt/collateral.
    pub feed_price: Price,
    pub mcr: u16,
    /// Price offered to the book: feed discounted by MSSR less the
    /// margin-call fee ratio.
    pub match_price: Price,
    /// Worst price the call itself pays: feed discounted by the full MSSR.
    pub call_pays_price: Price,
}

impl CallMatchContext {
    pub fn load(
        db: &Database,
        debt_asset: AssetId,
        bitasset_id: AssetBitassetId,
    ) -> MeridianResult<Option<Self>> {
        let bitasset = db.get::<AssetBitassetObject>(bitasset_id)?;
        if !bitasset.feed_is_valid() || bitasset.has_settlement() {
            return Ok(None);
        }
        let feed = &bitasset.current_feed;
        Ok(Some(Self {
            debt_asset,
            backing_asset: bitasset.backing_asset(),
            bitasset_id,
            feed_price: feed.settlement_price,
            mcr: feed.maintenance_collateral_ratio,
            match_price: feed.margin_call_order_price(bitasset.options.margin_call_fee_ratio)?,
            call_pays_price: feed.max_short_squeeze_price()?,
        }))
    }
}

/// Margin-call context for a taker selling `sell_asset` into
/// `receive_asset`, present when the sold asset is market-issued against
/// the received one and its feed is live.
pub fn call_match_context(
    db: &Database,
    sell_asset: AssetId,
    receive_asset: AssetId,
) -> MeridianResult<Option<CallMatchContext>> {
    let Some(bitasset_id) = db.get::<AssetObject>(sell_asset)?.bitasset_data else {
        return Ok(None);
    };
    let bitasset = db.get::<AssetBitassetObject>(bitasset_id)?;
    if bitasset.backing_asset() != receive_asset {
        return Ok(None);
    }
    CallMatchContext::load(db, sell_asset, bitasset_id)
}

fn least_collateralized(db: &Database, debt_asset: AssetId) -> Option<CallOrderId> {
    db.index::<CallOrderObject>()
        .by_collateralization
        .range(CollateralKey::asset_start(debt_asset)..=CollateralKey::asset_end(debt_asset))
        .next()
        .map(|key| CallOrderId(key.id))
}

/// Whether the call can buy back its whole debt at the short-squeeze price.
/// A call that cannot is bad debt and flows into the black-swan response.
fn covers_at_squeeze(call: &CallOrderObject, ctx: &CallMatchContext) -> MeridianResult<bool> {
    let required = call
        .debt_amount()
        .multiply(&ctx.call_pays_price, Rounding::Up)?;
    Ok(required.amount.0 <= call.collateral.0)
}

/// One round of matching a resting/new limit order (a debt seller) against
/// the least-collateralized callable position. Returns true when a fill or
/// settlement happened and the caller should loop.
pub fn match_order_against_calls(
    db: &mut Database,
    order_id: LimitOrderId,
    ctx: &CallMatchContext,
) -> MeridianResult<bool> {
    let Some(call_id) = least_collateralized(db, ctx.debt_asset) else {
        return Ok(false);
    };
    let call = db.get::<CallOrderObject>(call_id)?.clone();
    if !call.is_callable(&ctx.feed_price, ctx.mcr) {
        return Ok(false);
    }
    if !covers_at_squeeze(&call, ctx)? {
        return respond_to_bad_debt(db, ctx, call_id);
    }
    let debt_bound = max_debt_to_cover(&call, ctx)?;
    fill_call_with_limit(db, ctx, call_id, order_id, debt_bound)?;
    Ok(true)
}

/// The margin-call sweep: runs whenever a relevant mutation occurred (new
/// feed, feed expiry, debt or collateral change, order placement). Walks
/// positions from the least collateralized, filling against the book and
/// pools, and invokes the black-swan response on bad debt. Returns true if
/// any position was called or settled.
pub fn check_call_orders(
    db: &mut Database,
    debt_asset: AssetId,
    bitasset_id: AssetBitassetId,
) -> MeridianResult<bool> {
    let mut margin_called = false;
    loop {
        let Some(ctx) = CallMatchContext::load(db, debt_asset, bitasset_id)? else {
            return Ok(margin_called);
        };
        let Some(call_id) = least_collateralized(db, debt_asset) else {
            return Ok(margin_called);
        };
        let call = db.get::<CallOrderObject>(call_id)?.clone();
        if !call.is_callable(&ctx.feed_price, ctx.mcr) {
            return Ok(margin_called);
        }
        if !covers_at_squeeze(&call, &ctx)? {
            if respond_to_bad_debt(db, &ctx, call_id)? {
                margin_called = true;
                continue;
            }
            return Ok(margin_called);
        }

        let debt_bound = max_debt_to_cover(&call, &ctx)?;

        // Prefer the book while its top offers debt at or above the call
        // match price; otherwise try the pools.
        let book_order = matching::best_order(db, ctx.debt_asset, ctx.backing_asset)
            .filter(|order_id| {
                db.find::<LimitOrderObject>(*order_id).is_some_and(|order| {
                    order
                        .sell_price
                        .cmp_same_pair(&ctx.match_price)
                        .is_ge()
                })
            });
        if let Some(order_id) = book_order {
            fill_call_with_limit(db, &ctx, call_id, order_id, debt_bound)?;
            margin_called = true;
            continue;
        }
        if fill_call_from_pool(db, &ctx, call_id, debt_bound)? {
            margin_called = true;
            continue;
        }
        return Ok(margin_called);
    }
}

/// Fills a callable position against one limit order at the call match
/// price. The order side is rounded down and re-derived rounded up; the
/// call pays at the squeeze price with the spread accruing as the
/// margin-call fee.
fn fill_call_with_limit(
    db: &mut Database,
    ctx: &CallMatchContext,
    call_id: CallOrderId,
    order_id: LimitOrderId,
    debt_bound: Share,
) -> MeridianResult<()> {
    let order = db.get::<LimitOrderObject>(order_id)?.clone();
    let covered = Share(order.for_sale.0.min(debt_bound.0));
    let covered = AssetAmount::new(covered, ctx.debt_asset);

    let order_receives = covered.multiply(&ctx.match_price, Rounding::Down)?;
    if order_receives.amount.is_zero() {
        // The order cannot earn a single unit of collateral; cull it.
        fill::cancel_limit_order(db, order_id)?;
        return Ok(());
    }
    let order_pays = order_receives.multiply(&ctx.match_price, Rounding::Up)?;
    let call_pays = order_pays.multiply(&ctx.call_pays_price, Rounding::Down)?;
    let margin_call_fee = call_pays.amount.checked_sub(order_receives.amount)?;

    fill::fill_call_order(db, call_id, call_pays, order_pays, ctx.mcr)?;
    fill::fill_limit_order(db, order_id, order_pays, order_receives, true)?;
    accrue_collateral_fee(db, ctx.debt_asset, margin_call_fee)?;
    tracing::debug!(
        call = %call_id,
        order = %order_id,
        debt = order_pays.amount.0,
        collateral = call_pays.amount.0,
        fee = margin_call_fee.0,
        "margin call filled against book"
    );
    Ok(())
}

/// Fills a callable position from the best-priced liquidity pool trading
/// the debt against its backing asset, bounded so the average price stays
/// at or better than the call match price. Returns true when anything
/// filled.
fn fill_call_from_pool(
    db: &mut Database,
    ctx: &CallMatchContext,
    call_id: CallOrderId,
    debt_bound: Share,
) -> MeridianResult<bool> {
    let call = db.get::<CallOrderObject>(call_id)?.clone();
    let pool_ids: Vec<u64> = {
        let key = if ctx.backing_asset < ctx.debt_asset {
            (ctx.backing_asset, ctx.debt_asset)
        } else {
            (ctx.debt_asset, ctx.backing_asset)
        };
        db.index::<LiquidityPoolObject>()
            .by_pair
            .get(&key)
            .cloned()
            .unwrap_or_default()
    };

    for pool_instance in pool_ids {
        let pool = db
            .get::<LiquidityPoolObject>(pool_instance.into())?
            .clone();
        if !pool.is_initialized() {
            continue;
        }
        // Largest collateral input whose proceeds stay at or above the
        // match price, capped by what covering `debt_bound` would need.
        let max_collateral = call.collateral.0;
        let acceptable = |x: i64| -> MeridianResult<Option<Share>> {
            let quote = match amm::quote_exchange(
                &pool,
                AssetAmount::new(x, ctx.backing_asset),
            ) {
                Ok(q) => q,
                Err(crate::error::MeridianError::Market(_)) => return Ok(None),
                Err(e) => return Err(e),
            };
            // The pool must not overshoot what the call wants to cover.
            if quote.pool_pays.amount.0 > debt_bound.0 {
                return Ok(None);
            }
            let collateral_at_match = quote
                .pool_pays
                .multiply(&ctx.match_price, Rounding::Down)?;
            if x <= collateral_at_match.amount.0 {
                Ok(Some(quote.pool_pays.amount))
            } else {
                Ok(None)
            }
        };

        let (mut lo, mut hi) = (0i64, max_collateral);
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            if acceptable(mid)?.is_some() {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        if lo == 0 {
            continue;
        }
        let quote = amm::quote_exchange(&pool, AssetAmount::new(lo, ctx.backing_asset))?;
        let debt_received = quote.pool_pays.amount;
        if debt_received.is_zero() || debt_received.0 > debt_bound.0 {
            continue;
        }

        // The call pays the squeeze price for what it got; the spread over
        // the pool's take is the margin-call fee.
        let call_pays = AssetAmount::new(debt_received, ctx.debt_asset)
            .multiply(&ctx.call_pays_price, Rounding::Down)?;
        let call_pays = AssetAmount::new(
            Share(call_pays.amount.0.max(lo).min(call.collateral.0)),
            ctx.backing_asset,
        );
        let margin_call_fee = call_pays.amount.checked_sub(Share(lo))?;

        db.modify::<LiquidityPoolObject>(pool.id, |p| {
            if quote.pool_receives.asset == p.asset_a {
                p.balance_a = p.balance_a.checked_add(quote.pool_receives.amount)?;
                p.balance_b = p.balance_b.checked_sub(quote.pool_pays.amount)?;
            } else {
                p.balance_b = p.balance_b.checked_add(quote.pool_receives.amount)?;
                p.balance_a = p.balance_a.checked_sub(quote.pool_pays.amount)?;
            }
            p.update_virtual_value();
            Ok(())
        })?;
        fill::fill_call_order(
            db,
            call_id,
            call_pays,
            AssetAmount::new(debt_received, ctx.debt_asset),
            ctx.mcr,
        )?;
        accrue_collateral_fee(db, ctx.debt_asset, margin_call_fee)?;
        tracing::debug!(
            call = %call_id,
            pool = %pool.id,
            debt = debt_received.0,
            collateral = call_pays.amount.0,
            "margin call filled against pool"
        );
        return Ok(true);
    }
    Ok(false)
}

fn accrue_collateral_fee(db: &mut Database, asset: AssetId, fee: Share) -> MeridianResult<()> {
    if !fee.is_positive() {
        return Ok(());
    }
    let dynamic_id = db.get::<AssetObject>(asset)?.dynamic_data;
    db.modify::<AssetDynamicObject>(dynamic_id, |dyn_data| {
        dyn_data.accumulated_collateral_fees =
            dyn_data.accumulated_collateral_fees.checked_add(fee)?;
        Ok(())
    })
}

/// Largest debt this call should buy back in one sweep round: the whole
/// debt without a target ratio, otherwise the least repayment that lifts
/// the position back to its target collateral ratio.
fn max_debt_to_cover(call: &CallOrderObject, ctx: &CallMatchContext) -> MeridianResult<Share> {
    let Some(tcr) = call.target_collateral_ratio else {
        return Ok(call.debt);
    };
    let tcr = tcr.max(ctx.mcr);
    let restored = |repaid: i64| -> MeridianResult<bool> {
        let spent = AssetAmount::new(repaid, ctx.debt_asset)
            .multiply(&ctx.call_pays_price, Rounding::Down)?;
        let collateral = i128::from(call.collateral.0 - spent.amount.0);
        let debt = i128::from(call.debt.0 - repaid);
        if debt <= 0 {
            return Ok(true);
        }
        if collateral <= 0 {
            return Ok(false);
        }
        let lhs = collateral
            * i128::from(ctx.feed_price.base.amount.0)
            * i128::from(RATIO_DENOM);
        let rhs = debt * i128::from(ctx.feed_price.quote.amount.0) * i128::from(tcr);
        Ok(lhs > rhs)
    };
    let (mut lo, mut hi) = (1i64, call.debt.0);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if restored(mid)? {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    Ok(Share(lo))
}

// ================================================================================================
// Black swan responses
// ================================================================================================

/// Handles a position that cannot cover its debt at the squeeze price.
/// Returns true when the sweep may continue (the position was disposed
/// of), false when margin processing must stop for this asset.
fn respond_to_bad_debt(
    db: &mut Database,
    ctx: &CallMatchContext,
    call_id: CallOrderId,
) -> MeridianResult<bool> {
    let response = db
        .get::<AssetBitassetObject>(ctx.bitasset_id)?
        .options
        .black_swan_response;
    match response {
        BlackSwanResponse::GlobalSettlement => {
            let call = db.get::<CallOrderObject>(call_id)?.clone();
            // Settle everyone at the worst position's collateralization.
            let settle_price = Price::new(call.debt_amount(), call.collateral_amount());
            global_settle(db, ctx.debt_asset, ctx.bitasset_id, settle_price)?;
            Ok(true)
        }
        BlackSwanResponse::NoSettlement => {
            tracing::warn!(asset = %ctx.debt_asset, call = %call_id, "bad debt left open (no-settlement mode)");
            Ok(false)
        }
        BlackSwanResponse::IndividualSettlementToFund => {
            individually_settle(db, ctx, call_id, false)?;
            Ok(true)
        }
        BlackSwanResponse::IndividualSettlementToOrder => {
            individually_settle(db, ctx, call_id, true)?;
            Ok(true)
        }
    }
}

/// Closes one bad-debt position. Its collateral, less the margin-call fee,
/// either joins the individual settlement fund or aggregates into the
/// settled-debt limit order resting on the book.
fn individually_settle(
    db: &mut Database,
    ctx: &CallMatchContext,
    call_id: CallOrderId,
    to_order: bool,
) -> MeridianResult<()> {
    let call = db.get::<CallOrderObject>(call_id)?.clone();
    let (mssr, mcfr) = {
        let bitasset = db.get::<AssetBitassetObject>(ctx.bitasset_id)?;
        (
            bitasset.current_feed.maximum_short_squeeze_ratio,
            bitasset.options.margin_call_fee_ratio,
        )
    };
    let fee = call
        .collateral
        .scale(u64::from(mcfr), u64::from(mssr), Rounding::Down)?;
    let fund = call.collateral.checked_sub(fee)?;

    db.adjust_core_in_orders(
        call.borrower,
        AssetAmount::new(Share(-call.collateral.0), call.collateral_asset),
    )?;
    db.remove::<CallOrderObject>(call_id)?;
    accrue_collateral_fee(db, ctx.debt_asset, fee)?;

    if to_order {
        let existing = db
            .get::<AssetBitassetObject>(ctx.bitasset_id)?
            .settled_debt_order;
        let new_debt_total = db
            .get::<AssetBitassetObject>(ctx.bitasset_id)?
            .individual_settlement_debt
            .checked_add(call.debt)?;
        let order_id = match existing {
            Some(order_id) => {
                db.modify::<LimitOrderObject>(order_id, |order| {
                    order.for_sale = order.for_sale.checked_add(fund)?;
                    order.sell_price = Price::new(
                        AssetAmount::new(order.for_sale, ctx.backing_asset),
                        AssetAmount::new(new_debt_total, ctx.debt_asset),
                    );
                    Ok(())
                })?;
                order_id
            }
            None => {
                let issuer = db.get::<AssetObject>(ctx.debt_asset)?.issuer;
                db.create(|id| LimitOrderObject {
                    id,
                    seller: issuer,
                    for_sale: fund,
                    sell_price: Price::new(
                        AssetAmount::new(fund, ctx.backing_asset),
                        AssetAmount::new(new_debt_total, ctx.debt_asset),
                    ),
                    expiration: chrono::DateTime::<chrono::Utc>::MAX_UTC,
                    deferred_fee: Share::ZERO,
                    is_settled_debt: true,
                })?
            }
        };
        db.modify::<AssetBitassetObject>(ctx.bitasset_id, |ba| {
            ba.individual_settlement_debt = new_debt_total;
            ba.settled_debt_order = Some(order_id);
            Ok(())
        })?;
        tracing::info!(
            asset = %ctx.debt_asset,
            call = %call_id,
            fund = fund.0,
            debt = call.debt.0,
            fee = fee.0,
            "position individually settled to order"
        );
    } else {
        db.modify::<AssetBitassetObject>(ctx.bitasset_id, |ba| {
            ba.individual_settlement_fund = ba.individual_settlement_fund.checked_add(fund)?;
            ba.individual_settlement_debt = ba.individual_settlement_debt.checked_add(call.debt)?;
            Ok(())
        })?;
        tracing::info!(
            asset = %ctx.debt_asset,
            call = %call_id,
            fund = fund.0,
            debt = call.debt.0,
            "position individually settled to fund"
        );
    }
    Ok(())
}

/// Closes every call order of the asset at `settle_price` (debt over
/// collateral), pooling the gathered collateral into the settlement fund.
/// Also used by the issuer-initiated `asset_global_settle`.
pub fn global_settle(
    db: &mut Database,
    asset_id: AssetId,
    bitasset_id: AssetBitassetId,
    settle_price: Price,
) -> MeridianResult<()> {
    let call_ids: Vec<CallOrderId> = db
        .index::<CallOrderObject>()
        .by_collateralization
        .range(CollateralKey::asset_start(asset_id)..=CollateralKey::asset_end(asset_id))
        .map(|key| CallOrderId(key.id))
        .collect();

    let mut gathered = Share::ZERO;
    for call_id in &call_ids {
        let call = db.get::<CallOrderObject>(*call_id)?.clone();
        let pays = call
            .debt_amount()
            .multiply(&settle_price, Rounding::Up)?
            .amount;
        let pays = Share(pays.0.min(call.collateral.0));
        let refund = call.collateral.checked_sub(pays)?;
        if refund.is_positive() {
            db.adjust_balance(
                call.borrower,
                AssetAmount::new(refund, call.collateral_asset),
            )?;
        }
        db.adjust_core_in_orders(
            call.borrower,
            AssetAmount::new(Share(-call.collateral.0), call.collateral_asset),
        )?;
        gathered = gathered.checked_add(pays)?;
        db.remove::<CallOrderObject>(*call_id)?;
    }

    db.modify::<AssetBitassetObject>(bitasset_id, |ba| {
        ba.settlement_price = settle_price;
        ba.settlement_fund = ba.settlement_fund.checked_add(gathered)?;
        Ok(())
    })?;
    tracing::warn!(
        asset = %asset_id,
        positions = call_ids.len(),
        fund = gathered.0,
        "asset globally settled"
    );
    Ok(())
}

// ================================================================================================
// Collateral bids and revival
// ================================================================================================

/// Maintenance step for a globally-settled asset: when the median feed is
/// live and the standing bids can adopt the entire outstanding debt at the
/// maintenance ratio, convert them into call orders and revive the asset.
pub fn process_collateral_bids(
    db: &mut Database,
    asset_id: AssetId,
    bitasset_id: AssetBitassetId,
) -> MeridianResult<()> {
    let bitasset = db.get::<AssetBitassetObject>(bitasset_id)?.clone();
    if !bitasset.has_settlement() || !bitasset.feed_is_valid() {
        return Ok(());
    }
    let supply = {
        let dynamic_id = db.get::<AssetObject>(asset_id)?.dynamic_data;
        db.get::<AssetDynamicObject>(dynamic_id)?.current_supply
    };
    if supply.is_zero() {
        return Ok(());
    }

    let feed = bitasset.current_feed;
    let mcr = feed.maintenance_collateral_ratio;
    let fund = bitasset.settlement_fund;

    // Walk bids best-first, assigning each a pro-rata slice of the fund,
    // until the whole supply is covered. Every accepted bid must meet MCR.
    let bid_ids: Vec<u64> = db
        .index::<CollateralBidObject>()
        .by_price
        .range(BidKey::asset_start(asset_id)..=BidKey::asset_end(asset_id))
        .map(|key| key.id)
        .collect();

    let mut covered = Share::ZERO;
    let mut accepted: Vec<(crate::protocol::CollateralBidId, Share, Share)> = Vec::new();
    for bid_instance in &bid_ids {
        if covered == supply {
            break;
        }
        let bid = db.get::<CollateralBidObject>((*bid_instance).into())?.clone();
        let debt = Share(bid.debt_covered.amount.0.min(supply.0 - covered.0));
        let fund_share = fund.scale(debt.0 as u64, supply.0 as u64, Rounding::Down)?;
        let collateral = bid.additional_collateral.amount.checked_add(fund_share)?;
        // The revived position must not be instantly callable.
        let lhs = i128::from(collateral.0)
            * i128::from(feed.settlement_price.base.amount.0)
            * i128::from(RATIO_DENOM);
        let rhs = i128::from(debt.0)
            * i128::from(feed.settlement_price.quote.amount.0)
            * i128::from(mcr);
        if lhs <= rhs {
            break;
        }
        covered = covered.checked_add(debt)?;
        accepted.push((bid.id, debt, collateral));
    }

    if covered != supply {
        return Ok(());
    }

    for (bid_id, debt, collateral) in accepted {
        let bid = db.remove::<CollateralBidObject>(bid_id)?;
        db.create(|id| CallOrderObject {
            id,
            borrower: bid.bidder,
            collateral,
            collateral_asset: bitasset.backing_asset(),
            debt,
            debt_asset: asset_id,
            call_price: Price::null(asset_id, bitasset.backing_asset()),
            target_collateral_ratio: None,
        })?;
        db.adjust_core_in_orders(
            bid.bidder,
            AssetAmount::new(collateral, bitasset.backing_asset()),
        )?;
    }
    // Refund any bids that were not needed.
    cancel_all_bids(db, asset_id)?;

    db.modify::<AssetBitassetObject>(bitasset_id, |ba| {
        ba.settlement_price = Price::null(asset_id, ba.backing_asset());
        ba.settlement_fund = Share::ZERO;
        Ok(())
    })?;
    tracing::info!(asset = %asset_id, "asset revived from global settlement");

    // Fix the call prices now that positions exist again.
    let call_ids: Vec<CallOrderId> = db
        .index::<CallOrderObject>()
        .by_collateralization
        .range(CollateralKey::asset_start(asset_id)..=CollateralKey::asset_end(asset_id))
        .map(|key| CallOrderId(key.id))
        .collect();
    for call_id in call_ids {
        db.modify::<CallOrderObject>(call_id, |call| {
            call.call_price = Price::call_price(
                AssetAmount::new(call.debt, call.debt_asset),
                AssetAmount::new(call.collateral, call.collateral_asset),
                mcr,
            )?;
            Ok(())
        })?;
    }
    Ok(())
}

/// Refunds and removes every remaining bid on the asset.
pub fn cancel_all_bids(db: &mut Database, asset_id: AssetId) -> MeridianResult<()> {
    let bid_ids: Vec<u64> = db
        .index::<CollateralBidObject>()
        .by_price
        .range(BidKey::asset_start(asset_id)..=BidKey::asset_end(asset_id))
        .map(|key| key.id)
        .collect();
    for bid_instance in bid_ids {
        let bid = db.remove::<CollateralBidObject>(bid_instance.into())?;
        db.adjust_balance(bid.bidder, bid.additional_collateral)?;
    }
    Ok(())
}

/// Instant redemption against a settled asset: global settlement fund
/// first, then the individual settlement fund. Returns the collateral
/// paid out, or None when the asset has no fund to redeem from.
pub fn settle_from_funds(
    db: &mut Database,
    bitasset_id: AssetBitassetId,
    amount: AssetAmount,
) -> MeridianResult<Option<AssetAmount>> {
    let bitasset = db.get::<AssetBitassetObject>(bitasset_id)?.clone();
    if bitasset.has_settlement() {
        let receives = amount.multiply(&bitasset.settlement_price, Rounding::Down)?;
        let receives = AssetAmount::new(
            Share(receives.amount.0.min(bitasset.settlement_fund.0)),
            bitasset.backing_asset(),
        );
        db.adjust_supply(amount.asset, Share(-amount.amount.0))?;
        db.modify::<AssetBitassetObject>(bitasset_id, |ba| {
            ba.settlement_fund = ba.settlement_fund.checked_sub(receives.amount)?;
            Ok(())
        })?;
        return Ok(Some(receives));
    }
    if bitasset.has_individual_settlement() && bitasset.individual_settlement_fund.is_positive() {
        // Redemption at the fund's own collateralization.
        let receives = bitasset.individual_settlement_fund.scale(
            amount.amount.0 as u64,
            bitasset.individual_settlement_debt.0 as u64,
            Rounding::Down,
        )?;
        let receives = AssetAmount::new(receives, bitasset.backing_asset());
        db.adjust_supply(amount.asset, Share(-amount.amount.0))?;
        db.modify::<AssetBitassetObject>(bitasset_id, |ba| {
            ba.individual_settlement_fund =
                ba.individual_settlement_fund.checked_sub(receives.amount)?;
            ba.individual_settlement_debt =
                ba.individual_settlement_debt.checked_sub(amount.amount)?;
            Ok(())
        })?;
        return Ok(Some(receives));
    }
    Ok(None)
}
