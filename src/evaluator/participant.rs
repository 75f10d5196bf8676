use crate::{
    database::Database,
    entity::{
        AccountObject, CommitteeMemberObject, VestingBalanceObject, WitnessObject,
    },
    error::{MeridianResult, StateError, ValidationError},
    evaluator::{EvalContext, OperationEvaluator},
    protocol::{
        AssetAmount, CommitteeMemberCreateOperation, CommitteeMemberUpdateOperation,
        CommitteeMemberUpdateGlobalParametersOperation, VestingBalanceCreateOperation,
        VestingBalanceWithdrawOperation, WitnessCreateOperation, WitnessUpdateOperation,
    },
};

const MAX_URL_LENGTH: usize = 127;

fn validate_url(url: &str) -> MeridianResult<()> {
    if url.len() > MAX_URL_LENGTH {
        return Err(ValidationError::InvalidOperation {
            field: "url",
            reason: "url too long",
        }
        .into());
    }
    Ok(())
}

pub struct WitnessCreateEvaluator;

impl OperationEvaluator for WitnessCreateEvaluator {
    type Op = WitnessCreateOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        validate_url(&op.url)?;
        let account = db.get::<AccountObject>(op.witness_account)?;
        if !account.is_lifetime_member() {
            return Err(StateError::Precondition("witnesses must be lifetime members").into());
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.create(|id| WitnessObject {
            id,
            witness_account: op.witness_account,
            url: op.url.clone(),
            signing_key: op.block_signing_key.clone(),
            last_aslot: 0,
            total_missed: 0,
        })?;
        Ok(())
    }
}

pub struct WitnessUpdateEvaluator;

impl OperationEvaluator for WitnessUpdateEvaluator {
    type Op = WitnessUpdateOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if let Some(url) = &op.new_url {
            validate_url(url)?;
        }
        let witness = db.get::<WitnessObject>(op.witness)?;
        if witness.witness_account != op.witness_account {
            return Err(StateError::Precondition("witness is owned by another account").into());
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.modify::<WitnessObject>(op.witness, |witness| {
            if let Some(url) = &op.new_url {
                witness.url = url.clone();
            }
            if let Some(key) = &op.new_signing_key {
                witness.signing_key = key.clone();
            }
            Ok(())
        })
    }
}

pub struct CommitteeMemberCreateEvaluator;

impl OperationEvaluator for CommitteeMemberCreateEvaluator {
    type Op = CommitteeMemberCreateOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        validate_url(&op.url)?;
        let account = db.get::<AccountObject>(op.committee_member_account)?;
        if !account.is_lifetime_member() {
            return Err(
                StateError::Precondition("committee members must be lifetime members").into(),
            );
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.create(|id| CommitteeMemberObject {
            id,
            committee_member_account: op.committee_member_account,
            url: op.url.clone(),
        })?;
        Ok(())
    }
}

pub struct CommitteeMemberUpdateEvaluator;

impl OperationEvaluator for CommitteeMemberUpdateEvaluator {
    type Op = CommitteeMemberUpdateOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if let Some(url) = &op.new_url {
            validate_url(url)?;
        }
        let member = db.get::<CommitteeMemberObject>(op.committee_member)?;
        if member.committee_member_account != op.committee_member_account {
            return Err(
                StateError::Precondition("committee seat is owned by another account").into(),
            );
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.modify::<CommitteeMemberObject>(op.committee_member, |member| {
            if let Some(url) = &op.new_url {
                member.url = url.clone();
            }
            Ok(())
        })
    }
}

/// Stages new chain parameters; the pending copy is swapped in at the next
/// maintenance. Only reachable through an approved committee proposal.
pub struct UpdateGlobalParametersEvaluator;

impl OperationEvaluator for UpdateGlobalParametersEvaluator {
    type Op = CommitteeMemberUpdateGlobalParametersOperation;

    fn evaluate(_db: &Database, ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if !ctx.in_proposal {
            return Err(StateError::Precondition(
                "parameter updates must come through an approved proposal",
            )
            .into());
        }
        op.new_parameters.validate()?;
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.modify_global_properties(|globals| {
            globals.pending_parameters = Some(op.new_parameters.clone());
            Ok(())
        })
    }
}

pub struct VestingBalanceCreateEvaluator;

impl OperationEvaluator for VestingBalanceCreateEvaluator {
    type Op = VestingBalanceCreateOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if !op.amount.amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(op.amount.amount.0).into());
        }
        db.get::<AccountObject>(op.owner)?;
        let available = db.get_balance(op.creator, op.amount.asset);
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
            op.creator,
            AssetAmount::new(-op.amount.amount.0, op.amount.asset),
        )?;
        db.create(|id| VestingBalanceObject {
            id,
            owner: op.owner,
            balance: op.amount,
            policy: op.policy,
            begin_balance: op.amount.amount,
        })?;
        Ok(())
    }
}

pub struct VestingBalanceWithdrawEvaluator;

impl OperationEvaluator for VestingBalanceWithdrawEvaluator {
    type Op = VestingBalanceWithdrawOperation;

    fn evaluate(db: &Database, ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if !op.amount.amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(op.amount.amount.0).into());
        }
        let vesting = db.get::<VestingBalanceObject>(op.vesting_balance)?;
        if vesting.owner != op.owner {
            return Err(StateError::Precondition("vesting balance is owned by another account").into());
        }
        if vesting.balance.asset != op.amount.asset {
            return Err(StateError::AssetTypeMismatch {
                expected: vesting.balance.asset,
                got: op.amount.asset,
            }
            .into());
        }
        let allowed = vesting.allowed_withdraw(ctx.now);
        if allowed.0 < op.amount.amount.0 {
            return Err(StateError::InsufficientBalance {
                asset: op.amount.asset,
                required: op.amount.amount.0,
                available: allowed.0,
            }
            .into());
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.modify::<VestingBalanceObject>(op.vesting_balance, |vesting| {
            vesting.balance = vesting.balance.checked_sub(op.amount)?;
            Ok(())
        })?;
        db.adjust_balance(op.owner, op.amount)?;
        Ok(())
    }
}
