use itertools::Itertools;

use crate::{
    database::Database,
    entity::{
        AssetBitassetObject, AssetDynamicObject, AssetObject, CallOrderObject, CollateralKey,
        ForceSettlementObject,
    },
    error::MeridianResult,
    protocol::{
        AssetAmount, AssetId, CallOrderId, ForceSettlementId, PERCENT_100, Rounding, Share,
    },
};

use super::margin;

/// Refunds and removes a pending force settlement (null feed, explicit
/// cancellation, or frozen asset).
pub fn cancel_settlement(db: &mut Database, settlement_id: ForceSettlementId) -> MeridianResult<()> {
    let settlement = db.remove::<ForceSettlementObject>(settlement_id)?;
    db.adjust_balance(settlement.owner, settlement.balance)?;
    Ok(())
}

/// Processes every force settlement due at `head_time`, asset by asset,
/// capped by each asset's per-interval settlement volume. Runs inside the
/// maintenance sweep.
pub fn process_due_settlements(db: &mut Database) -> MeridianResult<()> {
    let now = db.head_block_time();
    let due_assets: Vec<AssetId> = db
        .index::<ForceSettlementObject>()
        .by_expiration
        .iter()
        .filter(|(_, date, _)| *date <= now)
        .map(|(asset, _, _)| *asset)
        .dedup()
        .collect();
    for asset_id in due_assets {
        process_asset_settlements(db, asset_id, now)?;
    }
    Ok(())
}

/// Works through one asset's due settlements. Returns false when the
/// asset's queue must rest until the next interval (volume cap hit, frozen
/// feed handled by cancellation, or no fillable source).
fn process_asset_settlements(
    db: &mut Database,
    asset_id: AssetId,
    now: chrono::DateTime<chrono::Utc>,
) -> MeridianResult<bool> {
    let Some(bitasset_id) = db.get::<AssetObject>(asset_id)?.bitasset_data else {
        return Ok(false);
    };

    loop {
        let due = db
            .index::<ForceSettlementObject>()
            .by_expiration
            .range(
                (asset_id, chrono::DateTime::<chrono::Utc>::MIN_UTC, 0)
                    ..=(asset_id, now, u64::MAX),
            )
            .next()
            .map(|(_, _, instance)| ForceSettlementId(*instance));
        let Some(settlement_id) = due else {
            return Ok(true);
        };
        let settlement = db.get::<ForceSettlementObject>(settlement_id)?.clone();
        let bitasset = db.get::<AssetBitassetObject>(bitasset_id)?.clone();

        // Globally or individually settled assets redeem straight from the
        // fund.
        if bitasset.has_settlement() || bitasset.individual_settlement_fund.is_positive() {
            if let Some(receives) =
                margin::settle_from_funds(db, bitasset_id, settlement.balance)?
            {
                db.adjust_balance(settlement.owner, receives)?;
                db.remove::<ForceSettlementObject>(settlement_id)?;
                continue;
            }
        }

        // A null feed freezes settlement; the escrow is returned.
        if !bitasset.feed_is_valid() {
            tracing::warn!(asset = %asset_id, settlement = %settlement_id, "feed expired, cancelling settlement");
            cancel_settlement(db, settlement_id)?;
            continue;
        }

        let (max_volume, settled_so_far) = {
            let dynamic_id = db.get::<AssetObject>(asset_id)?.dynamic_data;
            let supply = db.get::<AssetDynamicObject>(dynamic_id)?.current_supply;
            (
                bitasset.max_force_settlement_volume(supply)?,
                bitasset.force_settled_volume,
            )
        };
        let remaining_volume = max_volume.checked_sub(settled_so_far).unwrap_or(Share::ZERO);
        if !remaining_volume.is_positive() {
            return Ok(false);
        }

        // Fill price: the median feed shaved by the settlement offset.
        let offset = bitasset.options.force_settlement_offset_percent;
        let fill_price = bitasset.current_feed.settlement_price.scaled(
            u64::from(PERCENT_100),
            u64::from(PERCENT_100 - offset),
        )?;

        let Some(call_id) = cheapest_call(db, asset_id) else {
            // Nothing to settle against; wait for positions to reappear.
            return Ok(false);
        };
        let call = db.get::<CallOrderObject>(call_id)?.clone();
        let mcr = bitasset.current_feed.maintenance_collateral_ratio;

        let settled = Share(
            settlement
                .balance
                .amount
                .0
                .min(call.debt.0)
                .min(remaining_volume.0),
        );
        let settled = AssetAmount::new(settled, asset_id);
        let collateral_out = settled.multiply(&fill_price, Rounding::Down)?;
        let collateral_out = AssetAmount::new(
            Share(collateral_out.amount.0.min(call.collateral.0)),
            collateral_out.asset,
        );

        super::fill::fill_call_order(db, call_id, collateral_out, settled, mcr)?;
        db.adjust_balance(settlement.owner, collateral_out)?;
        db.modify::<AssetBitassetObject>(bitasset_id, |ba| {
            ba.force_settled_volume = ba.force_settled_volume.checked_add(settled.amount)?;
            Ok(())
        })?;

        if settled.amount == settlement.balance.amount {
            db.remove::<ForceSettlementObject>(settlement_id)?;
        } else {
            db.modify::<ForceSettlementObject>(settlement_id, |s| {
                s.balance = s.balance.checked_sub(settled)?;
                Ok(())
            })?;
            if settled.amount == remaining_volume {
                return Ok(false);
            }
        }
    }
}

fn cheapest_call(db: &Database, debt_asset: AssetId) -> Option<CallOrderId> {
    db.index::<CallOrderObject>()
        .by_collateralization
        .range(CollateralKey::asset_start(debt_asset)..=CollateralKey::asset_end(debt_asset))
        .next()
        .map(|key| CallOrderId(key.id))
}
