use crate::{
    database::Database,
    entity::AssetObject,
    error::{MeridianResult, StateError, ValidationError},
    evaluator::{EvalContext, OperationEvaluator},
    protocol::{OverrideTransferOperation, TransferOperation},
};

pub struct TransferEvaluator;

impl OperationEvaluator for TransferEvaluator {
    type Op = TransferOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if !op.amount.amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(op.amount.amount.0).into());
        }
        if op.from == op.to {
            return Err(ValidationError::InvalidOperation {
                field: "to",
                reason: "cannot transfer to self",
            }
            .into());
        }
        let asset = db.get::<AssetObject>(op.amount.asset)?;
        let from = db.get::<crate::entity::AccountObject>(op.from)?;
        let to = db.get::<crate::entity::AccountObject>(op.to)?;
        if !db.is_authorized_asset(from, asset) {
            return Err(StateError::UnauthorizedByWhitelist {
                account: op.from,
                asset: asset.id,
            }
            .into());
        }
        if !db.is_authorized_asset(to, asset) {
            return Err(StateError::UnauthorizedByWhitelist {
                account: op.to,
                asset: asset.id,
            }
            .into());
        }
        if asset.is_transfer_restricted() && op.from != asset.issuer && op.to != asset.issuer {
            return Err(StateError::Precondition(
                "asset is transfer restricted to its issuer",
            )
            .into());
        }
        let available = db.get_balance(op.from, op.amount.asset);
        if available.0 < op.amount.amount.0 {
            return Err(StateError::InsufficientBalance {
                asset: op.amount.asset,
                required: op.amount.amount.0,
                available: available.0,
            }
            .into());
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.adjust_balance(
            op.from,
            crate::protocol::AssetAmount::new(-op.amount.amount.0, op.amount.asset),
        )?;
        db.adjust_balance(op.to, op.amount)?;
        Ok(())
    }
}

/// Issuer-forced movement of a whitelisted asset, gated on the
/// `OVERRIDE_AUTHORITY` flag.
pub struct OverrideTransferEvaluator;

impl OperationEvaluator for OverrideTransferEvaluator {
    type Op = OverrideTransferOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if !op.amount.amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(op.amount.amount.0).into());
        }
        let asset = db.get::<AssetObject>(op.amount.asset)?;
        if asset.issuer != op.issuer {
            return Err(StateError::NotIssuer {
                expected: asset.issuer,
                got: op.issuer,
            }
            .into());
        }
        if !asset.can_override() {
            return Err(StateError::Precondition(
                "asset does not permit issuer override transfers",
            )
            .into());
        }
        let to = db.get::<crate::entity::AccountObject>(op.to)?;
        if !db.is_authorized_asset(to, asset) {
            return Err(StateError::UnauthorizedByWhitelist {
                account: op.to,
                asset: asset.id,
            }
            .into());
        }
        let available = db.get_balance(op.from, op.amount.asset);
        if available.0 < op.amount.amount.0 {
            return Err(StateError::InsufficientBalance {
                asset: op.amount.asset,
                required: op.amount.amount.0,
                available: available.0,
            }
            .into());
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.adjust_balance(
            op.from,
            crate::protocol::AssetAmount::new(-op.amount.amount.0, op.amount.asset),
        )?;
        db.adjust_balance(op.to, op.amount)?;
        Ok(())
    }
}
