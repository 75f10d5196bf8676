use std::collections::BTreeSet;

use crate::{
    database::Database,
    entity::{
        AccountObject, AssetBitassetObject, AssetDynamicObject, AssetObject, TimestampedFeed,
    },
    error::{MeridianResult, StateError, ValidationError},
    evaluator::{EvalContext, OperationEvaluator},
    market,
    protocol::{
        AssetAmount, AssetClaimFeesOperation, AssetClaimPoolOperation, AssetCreateOperation,
        AssetFlags, AssetFundFeePoolOperation, AssetIssueOperation, AssetPublishFeedOperation,
        AssetReserveOperation, AssetUpdateBitassetOperation, AssetUpdateFeedProducersOperation,
        AssetUpdateIssuerOperation, AssetUpdateOperation, CORE_ASSET, MAX_PRECISION, Price,
        PriceFeed, Share, validate_symbol,
    },
};

fn require_issuer(asset: &AssetObject, account: crate::protocol::AccountId) -> MeridianResult<()> {
    if asset.issuer != account {
        return Err(StateError::NotIssuer {
            expected: asset.issuer,
            got: account,
        }
        .into());
    }
    Ok(())
}

pub struct AssetCreateEvaluator;

impl OperationEvaluator for AssetCreateEvaluator {
    type Op = AssetCreateOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        validate_symbol(&op.symbol)?;
        if db.asset_by_symbol(&op.symbol).is_some() {
            return Err(StateError::SymbolTaken(op.symbol.clone()).into());
        }
        if op.precision > MAX_PRECISION {
            return Err(ValidationError::InvalidPrecision(op.precision).into());
        }
        op.common_options.validate()?;
        let allowed = if op.bitasset_options.is_some() {
            AssetFlags::MIA_MASK
        } else {
            AssetFlags::UIA_MASK
        };
        if !op.common_options.issuer_permissions.is_subset_of(allowed) {
            return Err(ValidationError::InvalidOperation {
                field: "issuer_permissions",
                reason: "permission bits not applicable to this asset kind",
            }
            .into());
        }
        if let Some(bitasset) = &op.bitasset_options {
            bitasset.validate()?;
            let backing = db.get::<AssetObject>(bitasset.short_backing_asset)?;
            if let Some(backing_bitasset_id) = backing.bitasset_data {
                let backing_bitasset = db.get::<AssetBitassetObject>(backing_bitasset_id)?;
                if backing_bitasset.backing_asset() != CORE_ASSET {
                    return Err(StateError::Precondition(
                        "backing asset must be core or directly core-backed",
                    )
                    .into());
                }
            }
        }
        // Sub-symbols (PARENT.CHILD) belong to the parent's issuer.
        if let Some(dot) = op.symbol.find('.') {
            let parent = &op.symbol[..dot];
            let parent_asset = db
                .asset_by_symbol(parent)
                .ok_or_else(|| StateError::Precondition("parent symbol does not exist"))?;
            require_issuer(parent_asset, op.issuer)?;
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        let dynamic_id = db.create(|id| AssetDynamicObject {
            id,
            current_supply: Share::ZERO,
            accumulated_fees: Share::ZERO,
            accumulated_collateral_fees: Share::ZERO,
            fee_pool: Share::ZERO,
        })?;
        let asset_id = db.create(|id| AssetObject {
            id,
            symbol: op.symbol.clone(),
            precision: op.precision,
            issuer: op.issuer,
            options: op.common_options.clone(),
            dynamic_data: dynamic_id,
            bitasset_data: None,
        })?;
        if let Some(bitasset_options) = &op.bitasset_options {
            let bitasset_id = db.create(|id| AssetBitassetObject {
                id,
                asset: asset_id,
                options: bitasset_options.clone(),
                feed_producers: BTreeSet::new(),
                feeds: Default::default(),
                current_feed: PriceFeed::null(asset_id, bitasset_options.short_backing_asset),
                current_feed_publication_time: chrono::DateTime::<chrono::Utc>::MIN_UTC,
                settlement_price: Price::null(asset_id, bitasset_options.short_backing_asset),
                settlement_fund: Share::ZERO,
                individual_settlement_debt: Share::ZERO,
                individual_settlement_fund: Share::ZERO,
                settled_debt_order: None,
                force_settled_volume: Share::ZERO,
            })?;
            db.modify::<AssetObject>(asset_id, |asset| {
                asset.bitasset_data = Some(bitasset_id);
                Ok(())
            })?;
        }
        Ok(())
    }
}

pub struct AssetUpdateEvaluator;

impl OperationEvaluator for AssetUpdateEvaluator {
    type Op = AssetUpdateOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        let asset = db.get::<AssetObject>(op.asset_to_update)?;
        require_issuer(asset, op.issuer)?;
        op.new_options.validate()?;
        let supply = db.get::<AssetDynamicObject>(asset.dynamic_data)?.current_supply;
        // Once supply exists, permissions may only be narrowed.
        if supply.is_positive()
            && !op
                .new_options
                .issuer_permissions
                .is_subset_of(asset.options.issuer_permissions)
        {
            return Err(StateError::Precondition(
                "cannot expand issuer permissions after supply exists",
            )
            .into());
        }
        let max_listed = usize::from(db.parameters().maximum_asset_whitelist_authorities);
        if op.new_options.whitelist_authorities.len() > max_listed
            || op.new_options.blacklist_authorities.len() > max_listed
        {
            return Err(ValidationError::InvalidOperation {
                field: "whitelist_authorities",
                reason: "too many listing authorities",
            }
            .into());
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.modify::<AssetObject>(op.asset_to_update, |asset| {
            asset.options = op.new_options.clone();
            Ok(())
        })
    }
}

pub struct AssetUpdateIssuerEvaluator;

impl OperationEvaluator for AssetUpdateIssuerEvaluator {
    type Op = AssetUpdateIssuerOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        let asset = db.get::<AssetObject>(op.asset_to_update)?;
        require_issuer(asset, op.issuer)?;
        db.get::<AccountObject>(op.new_issuer)?;
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.modify::<AssetObject>(op.asset_to_update, |asset| {
            asset.issuer = op.new_issuer;
            Ok(())
        })
    }
}

pub struct AssetUpdateBitassetEvaluator {
    bitasset_id: crate::protocol::AssetBitassetId,
}

impl OperationEvaluator for AssetUpdateBitassetEvaluator {
    type Op = AssetUpdateBitassetOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        let asset = db.get::<AssetObject>(op.asset_to_update)?;
        require_issuer(asset, op.issuer)?;
        let bitasset_id = asset
            .bitasset_data
            .ok_or(StateError::Precondition("asset is not market-issued"))?;
        op.new_options.validate()?;
        let bitasset = db.get::<AssetBitassetObject>(bitasset_id)?;
        let supply = db.get::<AssetDynamicObject>(asset.dynamic_data)?.current_supply;
        if op.new_options.short_backing_asset != bitasset.backing_asset() && supply.is_positive() {
            return Err(StateError::Precondition(
                "cannot change the backing asset while supply exists",
            )
            .into());
        }
        db.get::<AssetObject>(op.new_options.short_backing_asset)?;
        Ok(Self { bitasset_id })
    }

    fn apply(self, db: &mut Database, ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.modify::<AssetBitassetObject>(self.bitasset_id, |bitasset| {
            bitasset.options = op.new_options.clone();
            bitasset.update_median_feed(ctx.now);
            Ok(())
        })?;
        market::check_call_orders(db, op.asset_to_update, self.bitasset_id)?;
        Ok(())
    }
}

pub struct AssetUpdateFeedProducersEvaluator {
    bitasset_id: crate::protocol::AssetBitassetId,
}

impl OperationEvaluator for AssetUpdateFeedProducersEvaluator {
    type Op = AssetUpdateFeedProducersOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        let asset = db.get::<AssetObject>(op.asset_to_update)?;
        require_issuer(asset, op.issuer)?;
        let bitasset_id = asset
            .bitasset_data
            .ok_or(StateError::Precondition("asset is not market-issued"))?;
        if asset.options.flags.contains(AssetFlags::WITNESS_FED)
            || asset.options.flags.contains(AssetFlags::COMMITTEE_FED)
        {
            return Err(StateError::Precondition(
                "feed producers of witness- or committee-fed assets are implicit",
            )
            .into());
        }
        if op.new_feed_producers.len() > usize::from(db.parameters().maximum_asset_feed_publishers)
        {
            return Err(ValidationError::InvalidOperation {
                field: "new_feed_producers",
                reason: "too many feed producers",
            }
            .into());
        }
        for producer in &op.new_feed_producers {
            db.get::<AccountObject>(*producer)?;
        }
        Ok(Self { bitasset_id })
    }

    fn apply(self, db: &mut Database, ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.modify::<AssetBitassetObject>(self.bitasset_id, |bitasset| {
            bitasset.feed_producers = op.new_feed_producers.clone();
            bitasset
                .feeds
                .retain(|producer, _| op.new_feed_producers.contains(producer));
            bitasset.update_median_feed(ctx.now);
            Ok(())
        })?;
        market::check_call_orders(db, op.asset_to_update, self.bitasset_id)?;
        Ok(())
    }
}

pub struct AssetPublishFeedEvaluator {
    bitasset_id: crate::protocol::AssetBitassetId,
}

impl OperationEvaluator for AssetPublishFeedEvaluator {
    type Op = AssetPublishFeedOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        let asset = db.get::<AssetObject>(op.asset_id)?;
        let bitasset_id = asset
            .bitasset_data
            .ok_or(StateError::Precondition("asset is not market-issued"))?;
        let bitasset = db.get::<AssetBitassetObject>(bitasset_id)?;
        op.feed.validate()?;
        if !op.feed.settlement_price.is_null() {
            let price = &op.feed.settlement_price;
            if price.base.asset != op.asset_id || price.quote.asset != bitasset.backing_asset() {
                return Err(StateError::Precondition(
                    "settlement price must quote the asset against its backing",
                )
                .into());
            }
        }
        if !op.feed.core_exchange_rate.is_null() {
            let cer = &op.feed.core_exchange_rate;
            if cer.base.asset != op.asset_id || cer.quote.asset != CORE_ASSET {
                return Err(StateError::Precondition(
                    "core exchange rate must quote the asset against core",
                )
                .into());
            }
        }
        let authorized = if asset.options.flags.contains(AssetFlags::WITNESS_FED) {
            db.iter::<crate::entity::WitnessObject>()
                .any(|w| w.witness_account == op.publisher)
        } else if asset.options.flags.contains(AssetFlags::COMMITTEE_FED) {
            db.iter::<crate::entity::CommitteeMemberObject>()
                .any(|m| m.committee_member_account == op.publisher)
        } else {
            bitasset.feed_producers.contains(&op.publisher)
        };
        if !authorized {
            return Err(StateError::Precondition("account is not a feed producer").into());
        }
        Ok(Self { bitasset_id })
    }

    fn apply(self, db: &mut Database, ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.modify::<AssetBitassetObject>(self.bitasset_id, |bitasset| {
            bitasset.feeds.insert(
                op.publisher,
                TimestampedFeed {
                    published_at: ctx.now,
                    feed: op.feed,
                },
            );
            bitasset.update_median_feed(ctx.now);
            Ok(())
        })?;
        market::check_call_orders(db, op.asset_id, self.bitasset_id)?;
        Ok(())
    }
}

pub struct AssetIssueEvaluator;

impl OperationEvaluator for AssetIssueEvaluator {
    type Op = AssetIssueOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if !op.asset_to_issue.amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(op.asset_to_issue.amount.0).into());
        }
        let asset = db.get::<AssetObject>(op.asset_to_issue.asset)?;
        require_issuer(asset, op.issuer)?;
        if asset.is_market_issued() {
            return Err(StateError::Precondition(
                "market-issued assets enter circulation through debt positions",
            )
            .into());
        }
        let receiver = db.get::<AccountObject>(op.issue_to_account)?;
        if !db.is_authorized_asset(receiver, asset) {
            return Err(StateError::UnauthorizedByWhitelist {
                account: op.issue_to_account,
                asset: asset.id,
            }
            .into());
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.adjust_supply(op.asset_to_issue.asset, op.asset_to_issue.amount)?;
        db.adjust_balance(op.issue_to_account, op.asset_to_issue)?;
        Ok(())
    }
}

pub struct AssetReserveEvaluator;

impl OperationEvaluator for AssetReserveEvaluator {
    type Op = AssetReserveOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if !op.amount_to_reserve.amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(op.amount_to_reserve.amount.0).into());
        }
        let asset = db.get::<AssetObject>(op.amount_to_reserve.asset)?;
        if asset.is_market_issued() {
            return Err(StateError::Precondition(
                "market-issued supply is retired through settlement",
            )
            .into());
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.adjust_balance(
            op.payer,
            AssetAmount::new(-op.amount_to_reserve.amount.0, op.amount_to_reserve.asset),
        )?;
        db.adjust_supply(
            op.amount_to_reserve.asset,
            Share(-op.amount_to_reserve.amount.0),
        )?;
        Ok(())
    }
}

pub struct AssetFundFeePoolEvaluator;

impl OperationEvaluator for AssetFundFeePoolEvaluator {
    type Op = AssetFundFeePoolOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if !op.amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(op.amount.0).into());
        }
        db.get::<AssetObject>(op.asset_id)?;
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.adjust_balance(op.from_account, AssetAmount::new(-op.amount.0, CORE_ASSET))?;
        let dynamic_id = db.get::<AssetObject>(op.asset_id)?.dynamic_data;
        db.modify::<AssetDynamicObject>(dynamic_id, |dyn_data| {
            dyn_data.fee_pool = dyn_data.fee_pool.checked_add(op.amount)?;
            Ok(())
        })
    }
}

pub struct AssetClaimFeesEvaluator;

impl OperationEvaluator for AssetClaimFeesEvaluator {
    type Op = AssetClaimFeesOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if !op.amount_to_claim.amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(op.amount_to_claim.amount.0).into());
        }
        let asset = db.get::<AssetObject>(op.amount_to_claim.asset)?;
        require_issuer(asset, op.issuer)?;
        let dyn_data = db.get::<AssetDynamicObject>(asset.dynamic_data)?;
        let available = if op.claim_from_collateral_fees {
            if !asset.is_market_issued() {
                return Err(StateError::Precondition(
                    "only market-issued assets accrue collateral fees",
                )
                .into());
            }
            dyn_data.accumulated_collateral_fees
        } else {
            dyn_data.accumulated_fees
        };
        if available.0 < op.amount_to_claim.amount.0 {
            return Err(StateError::Precondition("claim exceeds accumulated fees").into());
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        let asset = db.get::<AssetObject>(op.amount_to_claim.asset)?.clone();
        let dynamic_id = asset.dynamic_data;
        let credited_asset = if op.claim_from_collateral_fees {
            let bitasset_id = asset
                .bitasset_data
                .ok_or(StateError::Precondition("asset is not market-issued"))?;
            db.get::<AssetBitassetObject>(bitasset_id)?.backing_asset()
        } else {
            asset.id
        };
        db.modify::<AssetDynamicObject>(dynamic_id, |dyn_data| {
            if op.claim_from_collateral_fees {
                dyn_data.accumulated_collateral_fees = dyn_data
                    .accumulated_collateral_fees
                    .checked_sub(op.amount_to_claim.amount)?;
            } else {
                dyn_data.accumulated_fees =
                    dyn_data.accumulated_fees.checked_sub(op.amount_to_claim.amount)?;
            }
            Ok(())
        })?;
        db.adjust_balance(
            op.issuer,
            AssetAmount::new(op.amount_to_claim.amount, credited_asset),
        )?;
        Ok(())
    }
}

pub struct AssetClaimPoolEvaluator;

impl OperationEvaluator for AssetClaimPoolEvaluator {
    type Op = AssetClaimPoolOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if !op.amount_to_claim.amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(op.amount_to_claim.amount.0).into());
        }
        if op.amount_to_claim.asset != CORE_ASSET {
            return Err(StateError::AssetTypeMismatch {
                expected: CORE_ASSET,
                got: op.amount_to_claim.asset,
            }
            .into());
        }
        let asset = db.get::<AssetObject>(op.asset_id)?;
        require_issuer(asset, op.issuer)?;
        let dyn_data = db.get::<AssetDynamicObject>(asset.dynamic_data)?;
        if dyn_data.fee_pool.0 < op.amount_to_claim.amount.0 {
            return Err(StateError::InsufficientFeePool {
                asset: op.asset_id,
                required: op.amount_to_claim.amount.0,
            }
            .into());
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        let dynamic_id = db.get::<AssetObject>(op.asset_id)?.dynamic_data;
        db.modify::<AssetDynamicObject>(dynamic_id, |dyn_data| {
            dyn_data.fee_pool = dyn_data.fee_pool.checked_sub(op.amount_to_claim.amount)?;
            Ok(())
        })?;
        db.adjust_balance(op.issuer, op.amount_to_claim)?;
        Ok(())
    }
}
