use std::collections::BTreeSet;

use chrono::Duration;
use smallvec::SmallVec;

use crate::{
    database::Database,
    entity::{AccountObject, CommitteeMemberObject, ProposalObject},
    error::{AuthorityError, MeridianResult, StateError, ValidationError},
    evaluator::{self, EvalContext, OperationEvaluator},
    protocol::{
        AccountId, Authority, MAX_SIG_CHECK_DEPTH, Operation, ProposalCreateOperation,
        ProposalDeleteOperation, ProposalId, ProposalUpdateOperation, PublicKey, special_accounts,
    },
};

/// Whether the provided approval sets satisfy `authority`, recursing
/// through account authorities like the signature path does.
fn approval_satisfied(
    db: &Database,
    authority: &Authority,
    approved: &BTreeSet<AccountId>,
    keys: &BTreeSet<PublicKey>,
    depth: u32,
) -> bool {
    let mut total: u64 = 0;
    for (key, weight) in &authority.key_auths {
        if keys.contains(key) {
            total += u64::from(*weight);
        }
    }
    for (account_id, weight) in &authority.account_auths {
        if approved.contains(account_id) {
            total += u64::from(*weight);
        } else if depth < MAX_SIG_CHECK_DEPTH {
            if let Some(account) = db.find::<AccountObject>(*account_id) {
                if approval_satisfied(db, &account.active, approved, keys, depth + 1) {
                    total += u64::from(*weight);
                }
            }
        }
    }
    total >= u64::from(authority.weight_threshold)
}

/// A proposal is authorized once every required active and owner authority
/// is satisfied by the approvals collected so far.
pub fn proposal_is_authorized(db: &Database, proposal: &ProposalObject) -> MeridianResult<bool> {
    for account_id in &proposal.required_active_approvals {
        let account = db.get::<AccountObject>(*account_id)?;
        if !approval_satisfied(
            db,
            &account.active,
            &proposal.available_active_approvals,
            &proposal.available_key_approvals,
            0,
        ) {
            return Ok(false);
        }
    }
    for account_id in &proposal.required_owner_approvals {
        let account = db.get::<AccountObject>(*account_id)?;
        if !approval_satisfied(
            db,
            &account.owner,
            &proposal.available_owner_approvals,
            &proposal.available_key_approvals,
            0,
        ) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Executes an authorized proposal in its own sub-session and removes it.
/// An execution failure also removes the proposal; it never propagates to
/// the enclosing block.
pub fn execute_proposal(
    db: &mut Database,
    ctx: &EvalContext,
    proposal_id: ProposalId,
) -> MeridianResult<()> {
    let proposal = db.get::<ProposalObject>(proposal_id)?.clone();
    let mark = db.changes_mark();
    db.begin_session();
    let mut result = Ok(());
    for op in &proposal.proposed_ops {
        result = evaluator::apply_operation(db, &ctx.proposed(), op);
        if result.is_err() {
            break;
        }
    }
    match result {
        Ok(()) => {
            db.commit_session();
            tracing::debug!(proposal = %proposal_id, "proposal executed");
        }
        Err(e) => {
            db.rollback_session();
            db.truncate_changes(mark);
            tracing::warn!(proposal = %proposal_id, error = %e, "proposal execution failed, removing");
        }
    }
    db.remove::<ProposalObject>(proposal_id)?;
    Ok(())
}

fn requires_committee_account(op: &ProposalCreateOperation) -> bool {
    let mut active: SmallVec<[AccountId; 4]> = SmallVec::new();
    let mut owner: SmallVec<[AccountId; 2]> = SmallVec::new();
    for proposed in &op.proposed_ops {
        proposed.required_authorities(&mut active, &mut owner);
    }
    active.contains(&special_accounts::COMMITTEE) || owner.contains(&special_accounts::COMMITTEE)
}

pub struct ProposalCreateEvaluator;

impl OperationEvaluator for ProposalCreateEvaluator {
    type Op = ProposalCreateOperation;

    fn evaluate(db: &Database, ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if op.proposed_ops.is_empty() {
            return Err(ValidationError::EmptyTransaction.into());
        }
        let lifetime = Duration::seconds(i64::from(db.parameters().maximum_proposal_lifetime));
        if op.expiration_time <= ctx.now || op.expiration_time > ctx.now + lifetime {
            return Err(ValidationError::InvalidOperation {
                field: "expiration_time",
                reason: "outside the permitted proposal lifetime",
            }
            .into());
        }
        if let Some(review) = op.review_period_seconds {
            if i64::from(review) >= (op.expiration_time - ctx.now).num_seconds() {
                return Err(ValidationError::InvalidOperation {
                    field: "review_period_seconds",
                    reason: "review period must end before expiration",
                }
                .into());
            }
        }
        for proposed in &op.proposed_ops {
            if matches!(proposed, Operation::ProposalCreate(_)) {
                return Err(ValidationError::InvalidOperation {
                    field: "proposed_ops",
                    reason: "proposals cannot nest",
                }
                .into());
            }
        }
        // Committee-authority proposals are a committee privilege with a
        // mandatory review period, checked here rather than through the
        // generic authority graph.
        if requires_committee_account(op) {
            let review_needed = db.parameters().committee_proposal_review_period;
            if op.review_period_seconds.unwrap_or(0) < review_needed {
                return Err(ValidationError::InvalidOperation {
                    field: "review_period_seconds",
                    reason: "committee proposals require the full review period",
                }
                .into());
            }
            let is_member = db
                .iter::<CommitteeMemberObject>()
                .any(|m| m.committee_member_account == op.fee_paying_account);
            if !is_member {
                return Err(AuthorityError::CommitteeProposalOnly.into());
            }
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        let mut active: SmallVec<[AccountId; 4]> = SmallVec::new();
        let mut owner: SmallVec<[AccountId; 2]> = SmallVec::new();
        for proposed in &op.proposed_ops {
            proposed.required_authorities(&mut active, &mut owner);
        }
        let review_period_time = op
            .review_period_seconds
            .map(|secs| op.expiration_time - Duration::seconds(i64::from(secs)));
        db.create(|id| ProposalObject {
            id,
            proposer: op.fee_paying_account,
            expiration_time: op.expiration_time,
            review_period_time,
            proposed_ops: op.proposed_ops.clone(),
            required_active_approvals: active.iter().copied().collect(),
            available_active_approvals: BTreeSet::new(),
            required_owner_approvals: owner.iter().copied().collect(),
            available_owner_approvals: BTreeSet::new(),
            available_key_approvals: BTreeSet::new(),
        })?;
        Ok(())
    }
}

pub struct ProposalUpdateEvaluator {
    in_review: bool,
}

impl OperationEvaluator for ProposalUpdateEvaluator {
    type Op = ProposalUpdateOperation;

    fn evaluate(db: &Database, ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        let proposal = db.get::<ProposalObject>(op.proposal)?;
        let in_review = proposal
            .review_period_time
            .is_some_and(|review_start| ctx.now >= review_start);
        let adds_any = !op.active_approvals_to_add.is_empty()
            || !op.owner_approvals_to_add.is_empty()
            || !op.key_approvals_to_add.is_empty();
        if in_review && adds_any {
            return Err(StateError::Precondition(
                "approvals cannot be added during the review period",
            )
            .into());
        }
        for account in &op.active_approvals_to_add {
            if !proposal.required_active_approvals.contains(account) {
                return Err(StateError::Precondition(
                    "approval is not required by this proposal",
                )
                .into());
            }
        }
        for account in &op.owner_approvals_to_add {
            if !proposal.required_owner_approvals.contains(account) {
                return Err(StateError::Precondition(
                    "approval is not required by this proposal",
                )
                .into());
            }
        }
        for account in &op.active_approvals_to_remove {
            if !proposal.available_active_approvals.contains(account) {
                return Err(StateError::Precondition("approval was never given").into());
            }
        }
        for account in &op.owner_approvals_to_remove {
            if !proposal.available_owner_approvals.contains(account) {
                return Err(StateError::Precondition("approval was never given").into());
            }
        }
        Ok(Self { in_review })
    }

    fn apply(self, db: &mut Database, ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.modify::<ProposalObject>(op.proposal, |proposal| {
            for account in &op.active_approvals_to_add {
                proposal.available_active_approvals.insert(*account);
            }
            for account in &op.active_approvals_to_remove {
                proposal.available_active_approvals.remove(account);
            }
            for account in &op.owner_approvals_to_add {
                proposal.available_owner_approvals.insert(*account);
            }
            for account in &op.owner_approvals_to_remove {
                proposal.available_owner_approvals.remove(account);
            }
            for key in &op.key_approvals_to_add {
                proposal.available_key_approvals.insert(key.clone());
            }
            for key in &op.key_approvals_to_remove {
                proposal.available_key_approvals.remove(key);
            }
            Ok(())
        })?;

        // Without a review period, full authorization executes on the spot.
        if !self.in_review {
            let proposal = db.get::<ProposalObject>(op.proposal)?;
            if proposal.review_period_time.is_none() && proposal_is_authorized(db, proposal)? {
                execute_proposal(db, ctx, op.proposal)?;
            }
        }
        Ok(())
    }
}

pub struct ProposalDeleteEvaluator;

impl OperationEvaluator for ProposalDeleteEvaluator {
    type Op = ProposalDeleteOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        let proposal = db.get::<ProposalObject>(op.proposal)?;
        let allowed = if op.using_owner_authority {
            proposal
                .required_owner_approvals
                .contains(&op.fee_paying_account)
        } else {
            proposal.proposer == op.fee_paying_account
                || proposal
                    .required_active_approvals
                    .contains(&op.fee_paying_account)
        };
        if !allowed {
            return Err(StateError::Precondition(
                "only the proposer or a required authority may delete a proposal",
            )
            .into());
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.remove::<ProposalObject>(op.proposal)?;
        Ok(())
    }
}
