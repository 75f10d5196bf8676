use chrono::{DateTime, Duration, Utc};

use crate::{
    database::Database,
    entity::{
        AccountStatisticsObject, AssetBitassetObject, AssetObject, LimitOrderObject,
        ProposalObject, TransactionDedupObject,
    },
    error::MeridianResult,
    evaluator::{self, EvalContext},
    market,
    protocol::{
        AssetBitassetId, AssetId, LimitOrderId, MAX_SHARE_SUPPLY, ProposalId, Share,
        TransactionDedupId,
    },
};

/// The maintenance sweep, run atomically when a block's timestamp reaches
/// `next_maintenance_time`:
///
/// 1. drop expired entries from the transaction dedup index,
/// 2. clear expired proposals, executing any that completed their approvals,
/// 3. cancel expired limit orders,
/// 4. process due force settlements,
/// 5. re-derive median feeds and re-run the margin sweep per asset,
/// 6. apply staged parameter updates, refresh the witness budget and vest
///    pending fees,
/// 7. advance `next_maintenance_time`.
pub fn perform_maintenance(db: &mut Database, now: DateTime<Utc>) -> MeridianResult<()> {
    let span = tracing::info_span!("maintenance", at = %now);
    let _enter = span.enter();
    let ctx = EvalContext::at(now);

    clear_expired_transactions(db, now)?;
    clear_expired_proposals(db, &ctx, now)?;
    cancel_expired_limit_orders(db, now)?;
    market::process_due_settlements(db)?;
    refresh_feeds_and_sweep(db, now)?;
    apply_pending_parameters(db)?;
    refresh_witness_budget(db)?;
    vest_pending_fees(db)?;

    let interval = i64::from(db.parameters().maintenance_interval);
    db.modify_dynamic_properties(|dgp| {
        while dgp.next_maintenance_time <= now {
            dgp.next_maintenance_time += Duration::seconds(interval);
        }
        dgp.last_budget_time = now;
        dgp.accounts_registered_this_interval = 0;
        Ok(())
    })?;
    Ok(())
}

fn clear_expired_transactions(db: &mut Database, now: DateTime<Utc>) -> MeridianResult<()> {
    // Once expired, a transaction can never be accepted again, so its
    // dedup row carries no information.
    loop {
        let expired = db
            .index::<TransactionDedupObject>()
            .by_expiration
            .iter()
            .next()
            .filter(|(expiration, _)| *expiration <= now)
            .map(|(_, instance)| TransactionDedupId(*instance));
        match expired {
            Some(id) => {
                db.remove::<TransactionDedupObject>(id)?;
            }
            None => return Ok(()),
        }
    }
}

fn clear_expired_proposals(
    db: &mut Database,
    ctx: &EvalContext,
    now: DateTime<Utc>,
) -> MeridianResult<()> {
    loop {
        let expired = db
            .index::<ProposalObject>()
            .by_expiration
            .iter()
            .next()
            .filter(|(expiration, _)| *expiration <= now)
            .map(|(_, instance)| ProposalId(*instance));
        let Some(proposal_id) = expired else {
            return Ok(());
        };
        let authorized = {
            let proposal = db.get::<ProposalObject>(proposal_id)?;
            evaluator::proposal_is_authorized(db, proposal)?
        };
        if authorized {
            // Executes in a sub-session and removes the proposal whether or
            // not the execution succeeds.
            evaluator::execute_proposal(db, ctx, proposal_id)?;
        } else {
            tracing::debug!(proposal = %proposal_id, "proposal expired unapproved");
            db.remove::<ProposalObject>(proposal_id)?;
        }
    }
}

fn cancel_expired_limit_orders(db: &mut Database, now: DateTime<Utc>) -> MeridianResult<()> {
    loop {
        let expired = db
            .index::<LimitOrderObject>()
            .by_expiration
            .iter()
            .next()
            .filter(|(expiration, _)| *expiration <= now)
            .map(|(_, instance)| LimitOrderId(*instance));
        match expired {
            Some(order_id) => {
                tracing::debug!(order = %order_id, "cancelling expired order");
                market::cancel_limit_order(db, order_id)?;
            }
            None => return Ok(()),
        }
    }
}

/// Recomputes every bitasset's median feed against the current time,
/// re-runs the margin sweep where the median moved, resets the
/// per-interval force-settlement volume, and processes collateral bids on
/// globally-settled assets.
fn refresh_feeds_and_sweep(db: &mut Database, now: DateTime<Utc>) -> MeridianResult<()> {
    let bitassets: Vec<(AssetId, AssetBitassetId)> = db
        .iter::<AssetBitassetObject>()
        .map(|ba| (ba.asset, ba.id))
        .collect();
    for (asset_id, bitasset_id) in bitassets {
        let before = db.get::<AssetBitassetObject>(bitasset_id)?.current_feed;
        db.modify::<AssetBitassetObject>(bitasset_id, |bitasset| {
            bitasset.update_median_feed(now);
            bitasset.force_settled_volume = Share::ZERO;
            Ok(())
        })?;
        let after = db.get::<AssetBitassetObject>(bitasset_id)?.current_feed;
        if before != after {
            market::check_call_orders(db, asset_id, bitasset_id)?;
        }
        market::process_collateral_bids(db, asset_id, bitasset_id)?;
    }
    Ok(())
}

fn apply_pending_parameters(db: &mut Database) -> MeridianResult<()> {
    let pending = db.global_properties().pending_parameters.clone();
    if let Some(parameters) = pending {
        db.modify_global_properties(|globals| {
            globals.parameters = parameters;
            globals.pending_parameters = None;
            Ok(())
        })?;
        tracing::info!("applied committee parameter update");
    }
    Ok(())
}

/// Reserves enough core to pay witnesses through the next interval. The
/// pay itself is minted out of the unissued reserve when deposited.
fn refresh_witness_budget(db: &mut Database) -> MeridianResult<()> {
    let (pay_per_block, blocks_per_interval) = {
        let params = db.parameters();
        (
            params.witness_pay_per_block,
            i64::from(params.maintenance_interval) / i64::from(params.block_interval.max(1)),
        )
    };
    let reserve = {
        let core = db.get::<AssetObject>(crate::protocol::CORE_ASSET)?;
        let supply = db
            .get::<crate::entity::AssetDynamicObject>(core.dynamic_data)?
            .current_supply;
        Share(core.options.max_supply.0.min(MAX_SHARE_SUPPLY) - supply.0)
    };
    let budget = Share(
        pay_per_block
            .0
            .saturating_mul(blocks_per_interval)
            .min(reserve.0),
    );
    db.modify_dynamic_properties(|dgp| {
        dgp.witness_budget = budget;
        Ok(())
    })
}

/// Routes accumulated fee shares to registrars and referrers.
fn vest_pending_fees(db: &mut Database) -> MeridianResult<()> {
    let pending: Vec<crate::protocol::AccountId> = db
        .iter::<AccountStatisticsObject>()
        .filter(|stats| stats.pending_fees.is_positive())
        .map(|stats| stats.owner)
        .collect();
    for account in pending {
        db.process_pending_fees(account)?;
    }
    Ok(())
}
