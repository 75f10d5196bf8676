use crate::{
    database::Database,
    entity::{AccountObject, AccountStatisticsObject, Membership},
    error::{MeridianResult, StateError, ValidationError},
    evaluator::{EvalContext, OperationEvaluator},
    protocol::{
        AccountCreateOperation, AccountId, AccountUpdateOperation, AccountUpgradeOperation,
        AccountWhitelistOperation, Authority, PERCENT_100, listing, validate_account_name,
    },
};

fn validate_new_authority(db: &Database, authority: &Authority) -> MeridianResult<()> {
    authority.validate()?;
    let max_members = usize::from(db.parameters().maximum_authority_membership);
    if authority.num_auths() > max_members {
        return Err(ValidationError::InvalidOperation {
            field: "authority",
            reason: "too many authority members",
        }
        .into());
    }
    for account_id in authority.account_auths.keys() {
        db.get::<AccountObject>(*account_id)?;
    }
    Ok(())
}

pub struct AccountCreateEvaluator {
    lifetime_referrer: AccountId,
}

impl OperationEvaluator for AccountCreateEvaluator {
    type Op = AccountCreateOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        validate_account_name(&op.name)?;
        if db.account_by_name(&op.name).is_ok() {
            return Err(StateError::NameTaken(op.name.clone()).into());
        }
        if op.referrer_percent > PERCENT_100 {
            return Err(ValidationError::PercentageOutOfRange {
                field: "referrer_percent",
                value: op.referrer_percent,
            }
            .into());
        }
        let registrar = db.get::<AccountObject>(op.registrar)?;
        if !registrar.is_lifetime_member() {
            return Err(StateError::Precondition(
                "registrar must be a lifetime member",
            )
            .into());
        }
        let referrer = db.get::<AccountObject>(op.referrer)?;
        validate_new_authority(db, &op.owner)?;
        validate_new_authority(db, &op.active)?;
        let lifetime_referrer = if referrer.is_lifetime_member() {
            referrer.id
        } else {
            referrer.lifetime_referrer
        };
        Ok(Self { lifetime_referrer })
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        let (network_pct, lifetime_pct) = {
            let params = db.parameters();
            (
                params.network_percent_of_fee,
                params.lifetime_referrer_percent_of_fee,
            )
        };
        let stats_id = db.create(|id| AccountStatisticsObject {
            id,
            owner: AccountId(id.0), // patched right below, once the account id is known
            total_core_in_orders: crate::protocol::Share::ZERO,
            pending_fees: crate::protocol::Share::ZERO,
            pending_vested_fees: crate::protocol::Share::ZERO,
            lifetime_fees_paid: crate::protocol::Share::ZERO,
        })?;
        let account_id = db.create(|id| AccountObject {
            id,
            name: op.name.clone(),
            registrar: op.registrar,
            referrer: op.referrer,
            lifetime_referrer: self.lifetime_referrer,
            network_fee_percentage: network_pct,
            lifetime_referrer_fee_percentage: lifetime_pct,
            referrer_rewards_percentage: op.referrer_percent,
            membership: Membership::Basic,
            owner: op.owner.clone(),
            active: op.active.clone(),
            memo_key: op.memo_key.clone(),
            whitelisting_accounts: Default::default(),
            blacklisting_accounts: Default::default(),
            statistics: stats_id,
            cashback_vesting: None,
        })?;
        db.modify::<AccountStatisticsObject>(stats_id, |stats| {
            stats.owner = account_id;
            Ok(())
        })?;
        db.modify_dynamic_properties(|dgp| {
            dgp.accounts_registered_this_interval += 1;
            Ok(())
        })?;
        Ok(())
    }
}

pub struct AccountUpdateEvaluator;

impl OperationEvaluator for AccountUpdateEvaluator {
    type Op = AccountUpdateOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        db.get::<AccountObject>(op.account)?;
        if op.owner.is_none() && op.active.is_none() && op.memo_key.is_none() {
            return Err(ValidationError::InvalidOperation {
                field: "account_update",
                reason: "nothing to update",
            }
            .into());
        }
        if let Some(owner) = &op.owner {
            validate_new_authority(db, owner)?;
        }
        if let Some(active) = &op.active {
            validate_new_authority(db, active)?;
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.modify::<AccountObject>(op.account, |account| {
            if let Some(owner) = &op.owner {
                account.owner = owner.clone();
            }
            if let Some(active) = &op.active {
                account.active = active.clone();
            }
            if let Some(memo_key) = &op.memo_key {
                account.memo_key = memo_key.clone();
            }
            Ok(())
        })
    }
}

pub struct AccountWhitelistEvaluator;

impl OperationEvaluator for AccountWhitelistEvaluator {
    type Op = AccountWhitelistOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if op.new_listing > (listing::WHITE_LISTED | listing::BLACK_LISTED) {
            return Err(ValidationError::InvalidOperation {
                field: "new_listing",
                reason: "unknown listing bits",
            }
            .into());
        }
        db.get::<AccountObject>(op.account_to_list)?;
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.modify::<AccountObject>(op.account_to_list, |listee| {
            if op.new_listing & listing::WHITE_LISTED != 0 {
                listee.whitelisting_accounts.insert(op.authorizing_account);
            } else {
                listee.whitelisting_accounts.remove(&op.authorizing_account);
            }
            if op.new_listing & listing::BLACK_LISTED != 0 {
                listee.blacklisting_accounts.insert(op.authorizing_account);
            } else {
                listee.blacklisting_accounts.remove(&op.authorizing_account);
            }
            Ok(())
        })
    }
}

pub struct AccountUpgradeEvaluator;

impl OperationEvaluator for AccountUpgradeEvaluator {
    type Op = AccountUpgradeOperation;

    fn evaluate(db: &Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<Self> {
        if !op.upgrade_to_lifetime_member {
            return Err(ValidationError::InvalidOperation {
                field: "upgrade_to_lifetime_member",
                reason: "only lifetime upgrades are supported",
            }
            .into());
        }
        let account = db.get::<AccountObject>(op.account_to_upgrade)?;
        if account.is_lifetime_member() {
            return Err(StateError::Precondition("account is already a lifetime member").into());
        }
        Ok(Self)
    }

    fn apply(self, db: &mut Database, _ctx: &EvalContext, op: &Self::Op) -> MeridianResult<()> {
        db.modify::<AccountObject>(op.account_to_upgrade, |account| {
            account.membership = Membership::Lifetime;
            account.lifetime_referrer = account.id;
            Ok(())
        })
    }
}
