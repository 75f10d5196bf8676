//! Shared chain fixture for the integration tests: a single-witness
//! development chain with a set of funded, lifetime-member accounts, plus
//! helpers to build signed transactions and drive blocks.
#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use meridian::{
    Chain, GenesisState, MeridianResult, SignedBlock, SignedTransaction, SkipFlags,
    entity::{
        AccountBalanceObject, AssetBitassetObject, AssetDynamicObject, AssetObject,
        AccountStatisticsObject, CallOrderObject, CollateralBidObject, ForceSettlementObject,
        LimitOrderObject, LiquidityPoolObject, VestingBalanceObject,
    },
    evaluator,
    protocol::{
        AccountId, AssetAmount, AssetFlags, AssetId, AssetOptions, BitassetOptions, CORE_ASSET,
        GenesisAccount, GenesisBalance, LimitOrderId, Operation, Price, PriceFeed, PublicKey,
        Share,
    },
};

pub const INITIAL_BALANCE: i64 = 1_000_000_000_000;

pub struct Fixture {
    pub chain: Chain,
    accounts: BTreeMap<String, AccountId>,
}

pub fn key_of(name: &str) -> PublicKey {
    PublicKey::new(format!("key-{name}"))
}

pub fn genesis_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
}

/// Opt-in log output for debugging test runs: `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

impl Fixture {
    /// Boots a chain whose genesis funds `names` (plus the `init0`
    /// witness) with [`INITIAL_BALANCE`] core each.
    pub fn with_accounts(names: &[&str]) -> Self {
        init_tracing();
        let mut genesis = GenesisState::development(key_of("init0"));
        genesis.initial_timestamp = genesis_time();
        for name in names {
            genesis.initial_accounts.push(GenesisAccount {
                name: (*name).to_owned(),
                owner_key: key_of(name),
                active_key: key_of(name),
                is_lifetime_member: true,
            });
            genesis.initial_balances.push(GenesisBalance {
                owner: (*name).to_owned(),
                amount: Share(INITIAL_BALANCE),
            });
        }
        let chain = Chain::open(&genesis).expect("genesis must apply");
        let mut accounts = BTreeMap::new();
        for name in names.iter().copied().chain(["init0"]) {
            let id = chain
                .database()
                .account_by_name(name)
                .expect("genesis account exists")
                .id;
            accounts.insert(name.to_owned(), id);
        }
        Self { chain, accounts }
    }

    pub fn db(&self) -> &meridian::Database {
        self.chain.database()
    }

    pub fn account(&self, name: &str) -> AccountId {
        *self.accounts.get(name).expect("known account")
    }

    pub fn balance(&self, name: &str, asset: AssetId) -> i64 {
        self.db().get_balance(self.account(name), asset).0
    }

    pub fn core_balance(&self, name: &str) -> i64 {
        self.balance(name, CORE_ASSET)
    }

    /// Builds a transaction from `ops` (fees filled in from the schedule),
    /// signed with the keys of `signers`, anchored at genesis.
    pub fn tx(&self, ops: Vec<Operation>, signers: &[&str]) -> SignedTransaction {
        let mut operations = ops;
        for op in &mut operations {
            if op.fee().amount.is_zero() {
                let required = evaluator::required_fee(self.db(), op);
                op.set_fee(AssetAmount::new(required, CORE_ASSET));
            }
        }
        SignedTransaction {
            ref_block_num: 0,
            ref_block_prefix: 0,
            expiration: self.chain.head_block_time() + Duration::hours(1),
            operations,
            signatures: signers.iter().map(|name| key_of(name)).collect(),
        }
    }

    pub fn try_push(&mut self, ops: Vec<Operation>, signers: &[&str]) -> MeridianResult<()> {
        let tx = self.tx(ops, signers);
        self.chain.push_transaction(&tx, SkipFlags::NOTHING)
    }

    pub fn push(&mut self, ops: Vec<Operation>, signers: &[&str]) {
        if let Err(e) = self.try_push(ops, signers) {
            panic!("transaction unexpectedly rejected: {e}");
        }
    }

    // ---- blocks --------------------------------------------------------

    /// Produces and pushes one block at the next slot containing `txs`.
    pub fn produce_block(&mut self, txs: Vec<SignedTransaction>) {
        self.produce_block_at_slot(1, txs);
    }

    pub fn produce_block_at_slot(&mut self, slots: u64, txs: Vec<SignedTransaction>) {
        let interval = i64::from(self.db().parameters().block_interval);
        let witness = self.chain.scheduled_witness(slots);
        let signing_key = self
            .db()
            .get::<meridian::entity::WitnessObject>(witness)
            .expect("scheduled witness exists")
            .signing_key
            .clone();
        let block = SignedBlock {
            previous: self.db().dynamic_properties().head_block_id,
            timestamp: self.chain.head_block_time()
                + Duration::seconds(interval * slots as i64),
            witness,
            transaction_merkle_root: SignedBlock::compute_merkle_root(&txs),
            transactions: txs,
            witness_signature: signing_key,
        };
        self.chain
            .push_block(&block, SkipFlags::NOTHING)
            .expect("block must apply");
    }

    /// Pushes empty blocks until the maintenance sweep has run.
    pub fn advance_past_maintenance(&mut self) {
        let interval = i64::from(self.db().parameters().block_interval);
        let due = self.db().dynamic_properties().next_maintenance_time;
        let gap = (due - self.chain.head_block_time()).num_seconds();
        let slots = (gap / interval).max(1) as u64 + 1;
        self.produce_block_at_slot(slots, Vec::new());
    }

    // ---- asset helpers -------------------------------------------------

    pub fn default_uia_options() -> AssetOptions {
        AssetOptions {
            max_supply: Share(meridian::protocol::MAX_SHARE_SUPPLY),
            market_fee_percent: 0,
            max_market_fee: Share(meridian::protocol::MAX_SHARE_SUPPLY),
            issuer_permissions: AssetFlags::UIA_MASK,
            flags: AssetFlags::default(),
            core_exchange_rate: Price::new(
                AssetAmount::new(1, AssetId(1)),
                AssetAmount::new(1, CORE_ASSET),
            ),
            whitelist_authorities: Default::default(),
            blacklist_authorities: Default::default(),
            whitelist_markets: Default::default(),
            blacklist_markets: Default::default(),
        }
    }

    pub fn create_uia(&mut self, issuer: &str, symbol: &str, market_fee_percent: u16) -> AssetId {
        let mut options = Self::default_uia_options();
        if market_fee_percent > 0 {
            options.market_fee_percent = market_fee_percent;
            options.flags.insert(AssetFlags::CHARGE_MARKET_FEE);
        }
        self.create_asset(issuer, symbol, options, None)
    }

    pub fn create_bitasset(
        &mut self,
        issuer: &str,
        symbol: &str,
        tune: impl FnOnce(&mut BitassetOptions),
    ) -> AssetId {
        let mut bitasset_options = BitassetOptions::new(CORE_ASSET);
        tune(&mut bitasset_options);
        let mut options = Self::default_uia_options();
        options.issuer_permissions = AssetFlags::MIA_MASK;
        self.create_asset(issuer, symbol, options, Some(bitasset_options))
    }

    pub fn create_asset(
        &mut self,
        issuer: &str,
        symbol: &str,
        mut options: AssetOptions,
        bitasset_options: Option<BitassetOptions>,
    ) -> AssetId {
        let issuer_id = self.account(issuer);
        // The core exchange rate must quote the asset being created, whose
        // id is the next asset instance.
        let next = AssetId(self.db().iter::<AssetObject>().count() as u64);
        options.core_exchange_rate =
            Price::new(AssetAmount::new(1, next), AssetAmount::new(1, CORE_ASSET));
        let op = Operation::AssetCreate(meridian::protocol::AssetCreateOperation {
            fee: AssetAmount::zero(CORE_ASSET),
            issuer: issuer_id,
            symbol: symbol.to_owned(),
            precision: 5,
            common_options: options,
            bitasset_options,
        });
        self.push(vec![op], &[issuer]);
        self.db()
            .asset_by_symbol(symbol)
            .expect("asset just created")
            .id
    }

    pub fn update_feed_producers(&mut self, issuer: &str, asset: AssetId, producers: &[&str]) {
        let issuer_id = self.account(issuer);
        let set = producers.iter().map(|p| self.account(p)).collect();
        self.push(
            vec![Operation::AssetUpdateFeedProducers(
                meridian::protocol::AssetUpdateFeedProducersOperation {
                    fee: AssetAmount::zero(CORE_ASSET),
                    issuer: issuer_id,
                    asset_to_update: asset,
                    new_feed_producers: set,
                },
            )],
            &[issuer],
        );
    }

    pub fn feed(
        asset: AssetId,
        debt: i64,
        collateral: i64,
        mcr: u16,
        mssr: u16,
        icr: Option<u16>,
    ) -> PriceFeed {
        PriceFeed {
            settlement_price: Price::new(
                AssetAmount::new(debt, asset),
                AssetAmount::new(collateral, CORE_ASSET),
            ),
            core_exchange_rate: Price::new(
                AssetAmount::new(1, asset),
                AssetAmount::new(1, CORE_ASSET),
            ),
            maintenance_collateral_ratio: mcr,
            maximum_short_squeeze_ratio: mssr,
            initial_collateral_ratio: icr,
        }
    }

    pub fn publish_feed(&mut self, producer: &str, asset: AssetId, feed: PriceFeed) {
        let publisher = self.account(producer);
        self.push(
            vec![Operation::AssetPublishFeed(
                meridian::protocol::AssetPublishFeedOperation {
                    fee: AssetAmount::zero(CORE_ASSET),
                    publisher,
                    asset_id: asset,
                    feed,
                },
            )],
            &[producer],
        );
    }

    pub fn try_borrow(
        &mut self,
        account: &str,
        debt: AssetAmount,
        collateral: i64,
    ) -> MeridianResult<()> {
        let funding_account = self.account(account);
        self.try_push(
            vec![Operation::CallOrderUpdate(
                meridian::protocol::CallOrderUpdateOperation {
                    fee: AssetAmount::zero(CORE_ASSET),
                    funding_account,
                    delta_collateral: AssetAmount::new(collateral, CORE_ASSET),
                    delta_debt: debt,
                    target_collateral_ratio: None,
                },
            )],
            &[account],
        )
    }

    pub fn borrow(&mut self, account: &str, debt: AssetAmount, collateral: i64) {
        self.try_borrow(account, debt, collateral)
            .expect("borrow must succeed");
    }

    /// Places a limit order; returns its id if it rested on the book.
    pub fn try_sell(
        &mut self,
        account: &str,
        amount_to_sell: AssetAmount,
        min_to_receive: AssetAmount,
    ) -> MeridianResult<Option<LimitOrderId>> {
        let seller = self.account(account);
        let before: Vec<u64> = self.orders_of(account);
        self.try_push(
            vec![Operation::LimitOrderCreate(
                meridian::protocol::LimitOrderCreateOperation {
                    fee: AssetAmount::zero(CORE_ASSET),
                    seller,
                    amount_to_sell,
                    min_to_receive,
                    expiration: self.chain.head_block_time() + Duration::days(30),
                    fill_or_kill: false,
                },
            )],
            &[account],
        )?;
        let after = self.orders_of(account);
        Ok(after
            .into_iter()
            .find(|id| !before.contains(id))
            .map(LimitOrderId))
    }

    pub fn sell(
        &mut self,
        account: &str,
        amount_to_sell: AssetAmount,
        min_to_receive: AssetAmount,
    ) -> Option<LimitOrderId> {
        self.try_sell(account, amount_to_sell, min_to_receive)
            .expect("order must be accepted")
    }

    fn orders_of(&self, account: &str) -> Vec<u64> {
        let seller = self.account(account);
        self.db()
            .index::<LimitOrderObject>()
            .by_account
            .iter()
            .filter(|(owner, _)| *owner == seller)
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn transfer(&mut self, from: &str, to: &str, amount: AssetAmount) {
        let (from_id, to_id) = (self.account(from), self.account(to));
        self.push(
            vec![Operation::Transfer(meridian::protocol::TransferOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                from: from_id,
                to: to_id,
                amount,
                memo: None,
            })],
            &[from],
        );
    }

    pub fn settle(&mut self, account: &str, amount: AssetAmount) {
        let account_id = self.account(account);
        self.push(
            vec![Operation::AssetSettle(
                meridian::protocol::AssetSettleOperation {
                    fee: AssetAmount::zero(CORE_ASSET),
                    account: account_id,
                    amount,
                },
            )],
            &[account],
        );
    }

    // ---- invariants ----------------------------------------------------

    /// Asserts the supply-conservation invariant for `asset`: everything
    /// held in balances, escrows, funds and fee accumulators matches the
    /// recorded current supply exactly.
    pub fn assert_supply_conserved(&self, asset: AssetId) {
        let db = self.db();
        let mut total: i128 = 0;
        for row in db.iter::<AccountBalanceObject>() {
            if row.asset == asset {
                total += i128::from(row.balance.0);
            }
        }
        for vb in db.iter::<VestingBalanceObject>() {
            if vb.balance.asset == asset {
                total += i128::from(vb.balance.amount.0);
            }
        }
        for order in db.iter::<LimitOrderObject>() {
            if order.sell_asset() == asset {
                total += i128::from(order.for_sale.0);
            }
            if asset == CORE_ASSET {
                total += i128::from(order.deferred_fee.0);
            }
        }
        for call in db.iter::<CallOrderObject>() {
            if call.collateral_asset == asset {
                total += i128::from(call.collateral.0);
            }
        }
        for settlement in db.iter::<ForceSettlementObject>() {
            if settlement.balance.asset == asset {
                total += i128::from(settlement.balance.amount.0);
            }
        }
        for bid in db.iter::<CollateralBidObject>() {
            if bid.additional_collateral.asset == asset {
                total += i128::from(bid.additional_collateral.amount.0);
            }
        }
        for pool in db.iter::<LiquidityPoolObject>() {
            if pool.asset_a == asset {
                total += i128::from(pool.balance_a.0);
            }
            if pool.asset_b == asset {
                total += i128::from(pool.balance_b.0);
            }
        }
        for other in db.iter::<AssetObject>() {
            let dynamic = db
                .get::<AssetDynamicObject>(other.dynamic_data)
                .expect("dynamic data exists");
            if other.id == asset {
                total += i128::from(dynamic.accumulated_fees.0);
            }
            if asset == CORE_ASSET {
                total += i128::from(dynamic.fee_pool.0);
            }
            if let Some(bitasset_id) = other.bitasset_data {
                let bitasset = db
                    .get::<AssetBitassetObject>(bitasset_id)
                    .expect("bitasset data exists");
                if bitasset.backing_asset() == asset {
                    total += i128::from(bitasset.settlement_fund.0);
                    total += i128::from(bitasset.individual_settlement_fund.0);
                    total += i128::from(dynamic.accumulated_collateral_fees.0);
                }
            }
        }
        if asset == CORE_ASSET {
            for stats in db.iter::<AccountStatisticsObject>() {
                total += i128::from(stats.pending_fees.0);
            }
        }
        let supply = db
            .get::<AssetObject>(asset)
            .and_then(|a| db.get::<AssetDynamicObject>(a.dynamic_data))
            .map(|d| d.current_supply.0)
            .expect("asset exists");
        assert_eq!(
            total,
            i128::from(supply),
            "supply conservation violated for asset {asset}"
        );
    }
}

/// Convenience for building amounts in tests.
pub fn amount(value: i64, asset: AssetId) -> AssetAmount {
    AssetAmount::new(value, asset)
}
