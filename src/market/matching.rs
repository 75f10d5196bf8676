use std::cmp::Ordering;

use crate::{
    database::Database,
    entity::{AssetBitassetObject, AssetObject, BookKey, LimitOrderObject},
    error::MeridianResult,
    protocol::{AssetId, LimitOrderId, Price, Rounding},
};

use super::{fill, margin};

/// Outcome of one taker/maker match round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    pub taker_gone: bool,
    pub maker_gone: bool,
}

/// Best resting order of the `(sell, receive)` market, if any.
pub fn best_order(db: &Database, sell: AssetId, receive: AssetId) -> Option<LimitOrderId> {
    db.index::<LimitOrderObject>()
        .by_price
        .range(BookKey::market_start(sell, receive)..=BookKey::market_end(sell, receive))
        .next()
        .map(|key| LimitOrderId(key.id))
}

/// Matches a freshly placed limit order against the opposite side of the
/// book and against any margin calls whose match price beats the book.
/// Returns true when the order was completely consumed (it never rested).
pub fn apply_order(db: &mut Database, order_id: LimitOrderId) -> MeridianResult<bool> {
    let (sell_asset, receive_asset, taker_price) = {
        let order = db.get::<LimitOrderObject>(order_id)?;
        (order.sell_asset(), order.receive_asset(), order.sell_price)
    };

    // When the taker sells a market-issued asset for its backing asset, the
    // asset's margin calls stand as makers at the call match price.
    let call_context = margin::call_match_context(db, sell_asset, receive_asset)?;

    loop {
        if db.find::<LimitOrderObject>(order_id).is_none() {
            return Ok(true);
        }
        let maker_id = best_order(db, receive_asset, sell_asset);

        // A margin call takes priority over the book whenever its match
        // price is at least as good for the taker.
        if let Some(ctx) = &call_context {
            let call_beats_book = match maker_id {
                None => true,
                Some(maker_id) => {
                    let maker = db.get::<LimitOrderObject>(maker_id)?;
                    // Both quoted collateral/debt; the maker is a collateral
                    // seller only in the reverse market, so compare via the
                    // taker-side receive rate, debt/collateral descending.
                    ctx.match_price
                        .cmp_same_pair(&maker.sell_price.invert())
                        != Ordering::Greater
                }
            };
            if call_beats_book
                && taker_price.cmp_same_pair(&ctx.match_price) != Ordering::Less
                && margin::match_order_against_calls(db, order_id, ctx)?
            {
                continue;
            }
        }

        let Some(maker_id) = maker_id else {
            break;
        };
        // Price compatibility: the taker must offer at least the maker's
        // reciprocal ask.
        {
            let maker = db.get::<LimitOrderObject>(maker_id)?;
            if taker_price.cmp_same_pair(&maker.sell_price.invert()) == Ordering::Less {
                break;
            }
        }
        let outcome = match_limit_limit(db, order_id, maker_id)?;
        if outcome.taker_gone {
            return Ok(true);
        }
        if !outcome.maker_gone {
            // The maker absorbed everything it can at this price; if the
            // taker still rests something is out of sync.
            break;
        }
    }

    // Whatever rested may still trigger margin calls on the other side of
    // the market (the taker bought the debt asset cheapening collateral).
    if let Some(bitasset_id) = market_issued(db, receive_asset, sell_asset)? {
        margin::check_call_orders(db, receive_asset, bitasset_id)?;
    }
    if let Some(bitasset_id) = market_issued(db, sell_asset, receive_asset)? {
        margin::check_call_orders(db, sell_asset, bitasset_id)?;
    }

    Ok(db.find::<LimitOrderObject>(order_id).is_none())
}

/// The bitasset id when `asset` is market-issued and backed by `backing`.
fn market_issued(
    db: &Database,
    asset: AssetId,
    backing: AssetId,
) -> MeridianResult<Option<crate::protocol::AssetBitassetId>> {
    let Some(bitasset_id) = db.get::<AssetObject>(asset)?.bitasset_data else {
        return Ok(None);
    };
    let bitasset = db.get::<AssetBitassetObject>(bitasset_id)?;
    Ok((bitasset.backing_asset() == backing).then_some(bitasset_id))
}

/// Matches two limit orders at the maker's price, with the exact legacy
/// rounding: the smaller side receives its proceeds rounded down and the
/// payment recomputed from those proceeds rounded up, so the rounding loss
/// always lands on the smaller side.
pub fn match_limit_limit(
    db: &mut Database,
    taker_id: LimitOrderId,
    maker_id: LimitOrderId,
) -> MeridianResult<MatchOutcome> {
    let taker = db.get::<LimitOrderObject>(taker_id)?.clone();
    let maker = db.get::<LimitOrderObject>(maker_id)?.clone();
    let match_price: Price = maker.sell_price;

    let taker_for_sale = taker.amount_for_sale();
    let maker_for_sale = maker.amount_for_sale();

    let maker_capacity = maker_for_sale.multiply(&match_price, Rounding::Down)?;
    let (taker_pays, taker_receives) = if taker_for_sale.amount.0 <= maker_capacity.amount.0 {
        // Taker is the smaller side.
        let receives = taker_for_sale.multiply(&match_price, Rounding::Down)?;
        if receives.amount.is_zero() {
            // Too small to buy a single unit at this price.
            fill::cancel_limit_order(db, taker_id)?;
            return Ok(MatchOutcome {
                taker_gone: true,
                maker_gone: false,
            });
        }
        let pays = receives.multiply(&match_price, Rounding::Up)?;
        (pays, receives)
    } else {
        // Maker is the smaller side and is emptied entirely.
        let pays = maker_for_sale.multiply(&match_price, Rounding::Up)?;
        (pays, maker_for_sale)
    };

    let maker_pays = taker_receives;
    let maker_receives = taker_pays;

    let taker_gone = fill::fill_limit_order(db, taker_id, taker_pays, taker_receives, true)?;
    let maker_gone = fill::fill_limit_order(db, maker_id, maker_pays, maker_receives, true)?;
    Ok(MatchOutcome {
        taker_gone,
        maker_gone,
    })
}
