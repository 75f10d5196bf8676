use std::collections::BTreeMap;

use crate::{
    database::Database,
    entity::{
        AccountObject, AccountStatisticsObject, AssetDynamicObject, AssetObject,
        BlockSummaryObject, CommitteeMemberObject, DynamicGlobalPropertyObject,
        GlobalPropertyObject, Membership, WitnessObject,
    },
    error::{ChainError, MeridianResult},
    protocol::{
        AccountId, AssetAmount, AssetFlags, AssetOptions, Authority, BlockId, CORE_ASSET,
        CommitteeMemberId, GenesisState, MAX_SHARE_SUPPLY, Price, PublicKey, Share, WitnessId,
        special_accounts, validate_account_name, validate_symbol,
    },
};

/// Builds the initial, irreversible state from a genesis document: the
/// reserved accounts, the core asset, the configured accounts/balances and
/// the initial witness and committee sets.
pub fn initialize(db: &mut Database, genesis: &GenesisState) -> MeridianResult<()> {
    genesis.initial_parameters.validate()?;
    validate_symbol(&genesis.core_asset_symbol)?;

    let mut accounts_by_name: BTreeMap<String, AccountId> = BTreeMap::new();

    // Reserved accounts occupy the first instances in a fixed order.
    for (expected, name, owner) in [
        (special_accounts::COMMITTEE, "committee-account", Authority::impossible()),
        (special_accounts::WITNESSES, "witness-account", Authority::impossible()),
        (special_accounts::NULL, "null-account", Authority::impossible()),
        (
            special_accounts::TEMP,
            "temp-account",
            Authority {
                weight_threshold: 0,
                account_auths: BTreeMap::new(),
                key_auths: BTreeMap::new(),
            },
        ),
    ] {
        let id = create_account(db, name, owner.clone(), owner, PublicKey::new(""), true)?;
        if id != expected {
            return Err(ChainError::SnapshotCorrupt("reserved account ids out of order".into()).into());
        }
        accounts_by_name.insert(name.to_owned(), id);
    }

    for account in &genesis.initial_accounts {
        validate_account_name(&account.name)?;
        let id = create_account(
            db,
            &account.name,
            Authority::key(account.owner_key.clone()),
            Authority::key(account.active_key.clone()),
            account.active_key.clone(),
            account.is_lifetime_member,
        )?;
        accounts_by_name.insert(account.name.clone(), id);
    }

    // The core asset is always asset instance 0.
    let dynamic_id = db.create(|id| AssetDynamicObject {
        id,
        current_supply: Share::ZERO,
        accumulated_fees: Share::ZERO,
        accumulated_collateral_fees: Share::ZERO,
        fee_pool: Share::ZERO,
    })?;
    let core_id = db.create(|id| AssetObject {
        id,
        symbol: genesis.core_asset_symbol.clone(),
        precision: genesis.core_asset_precision,
        issuer: special_accounts::COMMITTEE,
        options: AssetOptions {
            max_supply: Share(MAX_SHARE_SUPPLY),
            market_fee_percent: 0,
            max_market_fee: Share::ZERO,
            issuer_permissions: AssetFlags::default(),
            flags: AssetFlags::default(),
            core_exchange_rate: Price::new(
                AssetAmount::new(1, CORE_ASSET),
                AssetAmount::new(1, CORE_ASSET),
            ),
            whitelist_authorities: Default::default(),
            blacklist_authorities: Default::default(),
            whitelist_markets: Default::default(),
            blacklist_markets: Default::default(),
        },
        dynamic_data: dynamic_id,
        bitasset_data: None,
    })?;
    debug_assert_eq!(core_id, CORE_ASSET);

    let mut total_supply = Share::ZERO;
    for balance in &genesis.initial_balances {
        let owner = *accounts_by_name
            .get(&balance.owner)
            .ok_or(ChainError::SnapshotCorrupt(format!(
                "genesis balance for unknown account '{}'",
                balance.owner
            )))?;
        db.adjust_balance(owner, AssetAmount::new(balance.amount, CORE_ASSET))?;
        total_supply = total_supply.checked_add(balance.amount)?;
    }
    db.modify::<AssetDynamicObject>(dynamic_id, |dyn_data| {
        dyn_data.current_supply = total_supply;
        Ok(())
    })?;

    let mut active_witnesses: Vec<WitnessId> = Vec::new();
    for name in &genesis.initial_witnesses {
        let account = *accounts_by_name.get(name).ok_or(ChainError::SnapshotCorrupt(
            format!("genesis witness for unknown account '{name}'"),
        ))?;
        let signing_key = db.get::<AccountObject>(account)?.memo_key.clone();
        let witness_id = db.create(|id| WitnessObject {
            id,
            witness_account: account,
            url: String::new(),
            signing_key,
            last_aslot: 0,
            total_missed: 0,
        })?;
        active_witnesses.push(witness_id);
    }
    if active_witnesses.is_empty() {
        return Err(ChainError::SnapshotCorrupt("genesis needs at least one witness".into()).into());
    }

    let mut active_committee: Vec<CommitteeMemberId> = Vec::new();
    for name in &genesis.initial_committee {
        let account = *accounts_by_name.get(name).ok_or(ChainError::SnapshotCorrupt(
            format!("genesis committee for unknown account '{name}'"),
        ))?;
        let member_id = db.create(|id| CommitteeMemberObject {
            id,
            committee_member_account: account,
            url: String::new(),
        })?;
        active_committee.push(member_id);
    }

    db.create(|id| GlobalPropertyObject {
        id,
        parameters: genesis.initial_parameters.clone(),
        pending_parameters: None,
        active_witnesses,
        active_committee_members: active_committee,
    })?;
    let maintenance_interval =
        chrono::Duration::seconds(i64::from(genesis.initial_parameters.maintenance_interval));
    db.create(|id| DynamicGlobalPropertyObject {
        id,
        head_block_number: 0,
        head_block_id: BlockId::ZERO,
        time: genesis.initial_timestamp,
        current_witness: WitnessId(0),
        next_maintenance_time: genesis.initial_timestamp + maintenance_interval,
        last_budget_time: genesis.initial_timestamp,
        witness_budget: Share::ZERO,
        accounts_registered_this_interval: 0,
        recently_missed_count: 0,
        current_aslot: 0,
        maintenance_flag: false,
    })?;
    // Slot 0 of the TaPoS ring anchors transactions referencing genesis.
    db.create(|id| BlockSummaryObject {
        id,
        block_id: BlockId::ZERO,
    })?;
    Ok(())
}

fn create_account(
    db: &mut Database,
    name: &str,
    owner: Authority,
    active: Authority,
    memo_key: PublicKey,
    lifetime: bool,
) -> MeridianResult<AccountId> {
    let stats_id = db.create(|id| AccountStatisticsObject {
        id,
        owner: AccountId(0),
        total_core_in_orders: Share::ZERO,
        pending_fees: Share::ZERO,
        pending_vested_fees: Share::ZERO,
        lifetime_fees_paid: Share::ZERO,
    })?;
    let account_id = db.create(|id| AccountObject {
        id,
        name: name.to_owned(),
        registrar: special_accounts::COMMITTEE,
        referrer: special_accounts::COMMITTEE,
        lifetime_referrer: special_accounts::COMMITTEE,
        network_fee_percentage: 2000,
        lifetime_referrer_fee_percentage: 3000,
        referrer_rewards_percentage: 0,
        membership: if lifetime {
            Membership::Lifetime
        } else {
            Membership::Basic
        },
        owner,
        active,
        memo_key,
        whitelisting_accounts: Default::default(),
        blacklisting_accounts: Default::default(),
        statistics: stats_id,
        cashback_vesting: None,
    })?;
    db.modify::<AccountStatisticsObject>(stats_id, |stats| {
        stats.owner = account_id;
        Ok(())
    })?;
    Ok(account_id)
}
