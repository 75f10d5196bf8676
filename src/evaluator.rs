//! The two-phase evaluate/apply pipeline.
//!
//! Each operation kind has an evaluator: `evaluate` performs read-only
//! checks and caches lookups, `apply` mutates. The dispatcher assesses and
//! debits the fee before `evaluate`, so evaluators always see the payer's
//! post-fee balance; everything runs inside the enclosing transaction's
//! undo session and rolls back together on failure.

mod account;
mod asset;
mod market;
mod participant;
mod pool;
mod proposal;
mod transfer;

pub use proposal::{execute_proposal, proposal_is_authorized};

use chrono::{DateTime, Utc};

use crate::{
    database::Database,
    error::{MeridianResult, ValidationError},
    protocol::{
        AssetAmount, CORE_ASSET, Operation, OperationTag, Rounding, Share,
    },
};

/// Per-application context threaded through every evaluator.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    pub now: DateTime<Utc>,
    /// True while executing an approved proposal's operations; some checks
    /// (committee parameter updates) are only legal there.
    pub in_proposal: bool,
}

impl EvalContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            in_proposal: false,
        }
    }

    pub fn proposed(self) -> Self {
        Self {
            in_proposal: true,
            ..self
        }
    }
}

pub trait OperationEvaluator: Sized {
    type Op;

    /// Read-only phase: authority-independent validation and precondition
    /// checks. May cache lookups on `Self` for `apply`.
    fn evaluate(db: &Database, ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self>;

    /// Mutating phase. Deterministic given the state `evaluate` observed.
    fn apply(self, db: &mut Database, ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()>;
}

/// Required fee for an operation, in core base units.
pub fn required_fee(db: &Database, op: &Operation) -> Share {
    let schedule = &db.parameters().fee_schedule;
    let tag = op.tag();
    let mut fee = schedule.flat_fee(tag);
    match op {
        Operation::AccountUpgrade(upgrade) if upgrade.upgrade_to_lifetime_member => {
            fee = schedule.lifetime_membership;
        }
        Operation::ProposalCreate(_) | Operation::Custom(_) => {
            let kbytes = (op.serialized_size() as u64).div_ceil(1024);
            fee = fee
                .checked_add(Share(schedule.price_per_kbyte.0.saturating_mul(kbytes as i64)))
                .unwrap_or(fee);
        }
        _ => {}
    }
    fee
}

/// Assesses, collects and splits the fee for one operation. The declared
/// fee must cover the schedule; a non-core fee is converted through the
/// asset's fee pool.
fn collect_fee(db: &mut Database, op: &Operation) -> MeridianResult<Share> {
    let declared = op.fee();
    if declared.amount.is_negative() {
        return Err(ValidationError::NonPositiveAmount(declared.amount.0).into());
    }
    let required = required_fee(db, op);
    let declared_in_core = if declared.asset == CORE_ASSET {
        declared.amount
    } else {
        let asset = db.get::<crate::entity::AssetObject>(declared.asset)?;
        declared
            .multiply(&asset.options.core_exchange_rate, Rounding::Down)?
            .amount
    };
    if declared_in_core.0 < required.0 {
        return Err(crate::error::StateError::InsufficientFee {
            required: required.0,
            provided: declared_in_core.0,
        }
        .into());
    }
    let payer = op.fee_payer();
    db.adjust_balance(payer, AssetAmount::new(Share(-declared.amount.0), declared.asset))?;
    let core_collected = db.convert_fee_to_core(declared)?;
    Ok(core_collected)
}

/// Applies a single operation: fee, evaluate, apply. The limit-order
/// deferred fee is the one deviation from the common pipeline: its fee is
/// escrowed on the order and only split when the order fills.
pub fn apply_operation(
    db: &mut Database,
    ctx: &EvalContext,
    op: &Operation,
) -> MeridianResult<()> {
    let span = tracing::debug_span!("op", tag = %op.tag());
    let _enter = span.enter();

    let core_fee = collect_fee(db, op)?;
    let defer_fee = matches!(op, Operation::LimitOrderCreate(_));
    if !defer_fee {
        db.pay_fee(op.fee_payer(), core_fee)?;
    }

    match op {
        Operation::Transfer(inner) => run::<transfer::TransferEvaluator>(db, ctx, inner),
        Operation::OverrideTransfer(inner) => {
            run::<transfer::OverrideTransferEvaluator>(db, ctx, inner)
        }
        Operation::LimitOrderCreate(inner) => {
            market::apply_limit_order_create(db, ctx, inner, core_fee)
        }
        Operation::LimitOrderCancel(inner) => {
            run::<market::LimitOrderCancelEvaluator>(db, ctx, inner)
        }
        Operation::CallOrderUpdate(inner) => {
            run::<market::CallOrderUpdateEvaluator>(db, ctx, inner)
        }
        Operation::BidCollateral(inner) => run::<market::BidCollateralEvaluator>(db, ctx, inner),
        Operation::AssetSettle(inner) => run::<market::AssetSettleEvaluator>(db, ctx, inner),
        Operation::AssetGlobalSettle(inner) => {
            run::<market::AssetGlobalSettleEvaluator>(db, ctx, inner)
        }
        Operation::AssetCreate(inner) => run::<asset::AssetCreateEvaluator>(db, ctx, inner),
        Operation::AssetUpdate(inner) => run::<asset::AssetUpdateEvaluator>(db, ctx, inner),
        Operation::AssetUpdateIssuer(inner) => {
            run::<asset::AssetUpdateIssuerEvaluator>(db, ctx, inner)
        }
        Operation::AssetUpdateBitasset(inner) => {
            run::<asset::AssetUpdateBitassetEvaluator>(db, ctx, inner)
        }
        Operation::AssetUpdateFeedProducers(inner) => {
            run::<asset::AssetUpdateFeedProducersEvaluator>(db, ctx, inner)
        }
        Operation::AssetPublishFeed(inner) => {
            run::<asset::AssetPublishFeedEvaluator>(db, ctx, inner)
        }
        Operation::AssetIssue(inner) => run::<asset::AssetIssueEvaluator>(db, ctx, inner),
        Operation::AssetReserve(inner) => run::<asset::AssetReserveEvaluator>(db, ctx, inner),
        Operation::AssetFundFeePool(inner) => {
            run::<asset::AssetFundFeePoolEvaluator>(db, ctx, inner)
        }
        Operation::AssetClaimFees(inner) => run::<asset::AssetClaimFeesEvaluator>(db, ctx, inner),
        Operation::AssetClaimPool(inner) => run::<asset::AssetClaimPoolEvaluator>(db, ctx, inner),
        Operation::AccountCreate(inner) => run::<account::AccountCreateEvaluator>(db, ctx, inner),
        Operation::AccountUpdate(inner) => run::<account::AccountUpdateEvaluator>(db, ctx, inner),
        Operation::AccountWhitelist(inner) => {
            run::<account::AccountWhitelistEvaluator>(db, ctx, inner)
        }
        Operation::AccountUpgrade(inner) => {
            run::<account::AccountUpgradeEvaluator>(db, ctx, inner)
        }
        Operation::ProposalCreate(inner) => {
            run::<proposal::ProposalCreateEvaluator>(db, ctx, inner)
        }
        Operation::ProposalUpdate(inner) => {
            run::<proposal::ProposalUpdateEvaluator>(db, ctx, inner)
        }
        Operation::ProposalDelete(inner) => {
            run::<proposal::ProposalDeleteEvaluator>(db, ctx, inner)
        }
        Operation::WitnessCreate(inner) => {
            run::<participant::WitnessCreateEvaluator>(db, ctx, inner)
        }
        Operation::WitnessUpdate(inner) => {
            run::<participant::WitnessUpdateEvaluator>(db, ctx, inner)
        }
        Operation::CommitteeMemberCreate(inner) => {
            run::<participant::CommitteeMemberCreateEvaluator>(db, ctx, inner)
        }
        Operation::CommitteeMemberUpdate(inner) => {
            run::<participant::CommitteeMemberUpdateEvaluator>(db, ctx, inner)
        }
        Operation::CommitteeMemberUpdateGlobalParameters(inner) => {
            run::<participant::UpdateGlobalParametersEvaluator>(db, ctx, inner)
        }
        Operation::VestingBalanceCreate(inner) => {
            run::<participant::VestingBalanceCreateEvaluator>(db, ctx, inner)
        }
        Operation::VestingBalanceWithdraw(inner) => {
            run::<participant::VestingBalanceWithdrawEvaluator>(db, ctx, inner)
        }
        Operation::LiquidityPoolCreate(inner) => {
            run::<pool::LiquidityPoolCreateEvaluator>(db, ctx, inner)
        }
        Operation::LiquidityPoolDelete(inner) => {
            run::<pool::LiquidityPoolDeleteEvaluator>(db, ctx, inner)
        }
        Operation::LiquidityPoolDeposit(inner) => {
            run::<pool::LiquidityPoolDepositEvaluator>(db, ctx, inner)
        }
        Operation::LiquidityPoolWithdraw(inner) => {
            run::<pool::LiquidityPoolWithdrawEvaluator>(db, ctx, inner)
        }
        Operation::LiquidityPoolExchange(inner) => {
            run::<pool::LiquidityPoolExchangeEvaluator>(db, ctx, inner)
        }
        Operation::AssetSettleCancel(_) => {
            Err(ValidationError::InternalOperation(OperationTag::AssetSettleCancel).into())
        }
        other => Err(ValidationError::UnsupportedOperation(other.tag()).into()),
    }
}

fn run<E: OperationEvaluator>(
    db: &mut Database,
    ctx: &EvalContext,
    op: &E::Op,
) -> MeridianResult<()> {
    let evaluated = E::evaluate(db, ctx, op)?;
    evaluated.apply(db, ctx, op)
}
