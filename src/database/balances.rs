use crate::{
    database::Database,
    entity::{
        AccountBalanceObject, AccountObject, AccountStatisticsObject, AssetDynamicObject,
        AssetObject, VestingBalanceObject,
    },
    error::{MeridianResult, StateError},
    protocol::{
        AccountId, AssetAmount, AssetId, CORE_ASSET, MAX_SHARE_SUPPLY, PERCENT_100, Rounding,
        Share, VestingPolicy,
    },
};

/// Balance, supply and fee-pool accounting. Every amount moved on the chain
/// passes through here so the supply-conservation invariant has a single
/// point of truth.
impl Database {
    pub fn get_balance(&self, owner: AccountId, asset: AssetId) -> Share {
        self.index::<AccountBalanceObject>()
            .by_owner_asset
            .get(&(owner, asset))
            .and_then(|instance| self.find::<AccountBalanceObject>((*instance).into()))
            .map(|row| row.balance)
            .unwrap_or(Share::ZERO)
    }

    /// Credits (positive) or debits (negative) an account. Debits below
    /// zero are rejected without mutating anything.
    pub fn adjust_balance(&mut self, owner: AccountId, delta: AssetAmount) -> MeridianResult<()> {
        if delta.amount.is_zero() {
            return Ok(());
        }
        let key = (owner, delta.asset);
        let existing = self
            .index::<AccountBalanceObject>()
            .by_owner_asset
            .get(&key)
            .copied();
        match existing {
            Some(instance) => self.modify::<AccountBalanceObject>(instance.into(), |row| {
                let updated = row.balance.checked_add(delta.amount)?;
                if updated.is_negative() {
                    return Err(StateError::InsufficientBalance {
                        asset: delta.asset,
                        required: -delta.amount.0,
                        available: row.balance.0,
                    }
                    .into());
                }
                row.balance = updated;
                Ok(())
            }),
            None => {
                if delta.amount.is_negative() {
                    return Err(StateError::InsufficientBalance {
                        asset: delta.asset,
                        required: -delta.amount.0,
                        available: 0,
                    }
                    .into());
                }
                self.create(|id| AccountBalanceObject {
                    id,
                    owner,
                    asset: delta.asset,
                    balance: delta.amount,
                })?;
                Ok(())
            }
        }
    }

    /// Mints (positive) or burns (negative) supply of an asset, enforcing
    /// `0 <= current_supply <= max_supply`.
    pub fn adjust_supply(&mut self, asset: AssetId, delta: Share) -> MeridianResult<()> {
        let (dynamic_id, max_supply) = {
            let asset_obj = self.get::<AssetObject>(asset)?;
            (asset_obj.dynamic_data, asset_obj.options.max_supply)
        };
        self.modify::<AssetDynamicObject>(dynamic_id, |dyn_data| {
            let updated = dyn_data.current_supply.checked_add(delta)?;
            if updated.is_negative() || updated.0 > max_supply.0.min(MAX_SHARE_SUPPLY) {
                return Err(StateError::Precondition("supply out of range").into());
            }
            dyn_data.current_supply = updated;
            Ok(())
        })
    }

    /// Tracks core escrowed in orders and collateral on the owner's
    /// statistics.
    pub fn adjust_core_in_orders(
        &mut self,
        account: AccountId,
        delta: AssetAmount,
    ) -> MeridianResult<()> {
        if delta.asset != CORE_ASSET || delta.amount.is_zero() {
            return Ok(());
        }
        let stats_id = self.get::<AccountObject>(account)?.statistics;
        self.modify::<AccountStatisticsObject>(stats_id, |stats| {
            stats.total_core_in_orders = stats.total_core_in_orders.checked_add(delta.amount)?;
            Ok(())
        })
    }

    // ---- fees ----------------------------------------------------------

    /// Converts a fee offered in a non-core asset into core through the
    /// asset's fee pool: the paid asset accrues to its accumulated fees and
    /// the pool surrenders the core equivalent.
    pub fn convert_fee_to_core(&mut self, fee: AssetAmount) -> MeridianResult<Share> {
        if fee.asset == CORE_ASSET {
            return Ok(fee.amount);
        }
        let (dynamic_id, core_equivalent) = {
            let asset = self.get::<AssetObject>(fee.asset)?;
            let core = fee.multiply(&asset.options.core_exchange_rate, Rounding::Down)?;
            if core.asset != CORE_ASSET {
                return Err(StateError::Precondition("core exchange rate must quote core").into());
            }
            (asset.dynamic_data, core.amount)
        };
        self.modify::<AssetDynamicObject>(dynamic_id, |dyn_data| {
            if dyn_data.fee_pool.0 < core_equivalent.0 {
                return Err(StateError::InsufficientFeePool {
                    asset: fee.asset,
                    required: core_equivalent.0,
                }
                .into());
            }
            dyn_data.fee_pool = dyn_data.fee_pool.checked_sub(core_equivalent)?;
            dyn_data.accumulated_fees = dyn_data.accumulated_fees.checked_add(fee.amount)?;
            Ok(())
        })?;
        Ok(core_equivalent)
    }

    /// Splits an already-collected core fee: the network share is burned
    /// from supply immediately, the rest accrues to the payer's pending
    /// fees and is routed to registrar/referrers by the maintenance sweep.
    pub fn pay_fee(&mut self, payer: AccountId, core_fee: Share) -> MeridianResult<()> {
        if core_fee.is_zero() {
            return Ok(());
        }
        let network_percent = self.parameters().network_percent_of_fee;
        let network_cut = core_fee.scale(
            u64::from(network_percent),
            u64::from(PERCENT_100),
            Rounding::Down,
        )?;
        let accumulated = core_fee.checked_sub(network_cut)?;
        self.adjust_supply(CORE_ASSET, Share(-network_cut.0))?;
        let stats_id = self.get::<AccountObject>(payer)?.statistics;
        self.modify::<AccountStatisticsObject>(stats_id, |stats| {
            stats.pending_fees = stats.pending_fees.checked_add(accumulated)?;
            stats.lifetime_fees_paid = stats.lifetime_fees_paid.checked_add(core_fee)?;
            Ok(())
        })
    }

    /// Distributes one account's pending fees to its referral chain.
    /// Runs inside the maintenance sweep.
    pub fn process_pending_fees(&mut self, account_id: AccountId) -> MeridianResult<()> {
        let (stats_id, pending, network_pct, lifetime_pct, referrer_pct) = {
            let account = self.get::<AccountObject>(account_id)?;
            let stats = self.get::<AccountStatisticsObject>(account.statistics)?;
            (
                account.statistics,
                stats.pending_fees,
                account.network_fee_percentage,
                account.lifetime_referrer_fee_percentage,
                account.referrer_rewards_percentage,
            )
        };
        if pending.is_zero() {
            return Ok(());
        }
        // The network share was burned at payment time; what is pending is
        // the remainder, split lifetime-referrer first, then the
        // referrer/registrar pair.
        let non_network = u64::from(PERCENT_100) - u64::from(network_pct);
        let lifetime_cut = if non_network == 0 {
            Share::ZERO
        } else {
            pending.scale(u64::from(lifetime_pct), non_network, Rounding::Down)?
        };
        let remainder = pending.checked_sub(lifetime_cut)?;
        let referrer_cut = remainder.scale(
            u64::from(referrer_pct),
            u64::from(PERCENT_100),
            Rounding::Down,
        )?;
        let registrar_cut = remainder.checked_sub(referrer_cut)?;

        let (lifetime_referrer, referrer, registrar) = {
            let account = self.get::<AccountObject>(account_id)?;
            (account.lifetime_referrer, account.referrer, account.registrar)
        };
        self.deposit_cashback(lifetime_referrer, lifetime_cut)?;
        self.deposit_cashback(referrer, referrer_cut)?;
        self.deposit_cashback(registrar, registrar_cut)?;
        self.modify::<AccountStatisticsObject>(stats_id, |stats| {
            stats.pending_vested_fees = stats.pending_vested_fees.checked_add(pending)?;
            stats.pending_fees = Share::ZERO;
            Ok(())
        })
    }

    /// Credits fee cashback into the account's vesting balance, creating it
    /// on first use. Amounts below the vesting threshold are credited to
    /// the liquid balance directly.
    pub fn deposit_cashback(&mut self, account_id: AccountId, amount: Share) -> MeridianResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let threshold = self.parameters().cashback_vesting_threshold;
        if amount.0 < threshold.0 {
            return self.adjust_balance(account_id, AssetAmount::new(amount, CORE_ASSET));
        }
        let vesting_period = self.parameters().cashback_vesting_period_sec;
        let now = self.head_block_time();
        let existing = self.get::<AccountObject>(account_id)?.cashback_vesting;
        match existing {
            Some(vb_id) => self.modify::<VestingBalanceObject>(vb_id, |vb| {
                vb.balance = vb
                    .balance
                    .checked_add(AssetAmount::new(amount, CORE_ASSET))?;
                vb.begin_balance = vb.begin_balance.checked_add(amount)?;
                Ok(())
            }),
            None => {
                let vb_id = self.create(|id| VestingBalanceObject {
                    id,
                    owner: account_id,
                    balance: AssetAmount::new(amount, CORE_ASSET),
                    policy: VestingPolicy {
                        begin_timestamp: now,
                        vesting_cliff_seconds: 0,
                        vesting_duration_seconds: vesting_period,
                    },
                    begin_balance: amount,
                })?;
                self.modify::<AccountObject>(account_id, |account| {
                    account.cashback_vesting = Some(vb_id);
                    Ok(())
                })
            }
        }
    }

    /// Pays the scheduled witness out of the reserved witness budget into a
    /// short vesting balance. The pay is minted from the unissued core
    /// reserve; the budget refresh at maintenance bounds the inflation.
    pub fn deposit_witness_pay(
        &mut self,
        witness_account: AccountId,
        pay: Share,
    ) -> MeridianResult<()> {
        if pay.is_zero() {
            return Ok(());
        }
        self.adjust_supply(CORE_ASSET, pay)?;
        let vesting_seconds = self.parameters().witness_pay_vesting_seconds;
        let now = self.head_block_time();
        self.create(|id| VestingBalanceObject {
            id,
            owner: witness_account,
            balance: AssetAmount::new(pay, CORE_ASSET),
            policy: VestingPolicy {
                begin_timestamp: now,
                vesting_cliff_seconds: 0,
                vesting_duration_seconds: vesting_seconds,
            },
            begin_balance: pay,
        })?;
        Ok(())
    }
}
