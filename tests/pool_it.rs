//! Liquidity-pool behavior through the full operation pipeline.

mod common;

use common::{Fixture, amount};
use meridian::{
    MeridianError,
    entity::{AssetDynamicObject, AssetObject, LiquidityPoolObject},
    error::MarketError,
    protocol::{AssetAmount, AssetId, CORE_ASSET, LiquidityPoolId, Operation},
};

struct PoolFixture {
    fx: Fixture,
    a: AssetId,
    b: AssetId,
    share: AssetId,
    pool: LiquidityPoolId,
}

fn setup() -> PoolFixture {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let a = fx.create_uia("alice", "AAA", 0);
    let b = fx.create_uia("alice", "BBB", 0);
    let share = fx.create_uia("alice", "POOLSHARE", 0);
    for (asset, quantity) in [(a, 10_000_000), (b, 10_000_000)] {
        let issuer = fx.account("alice");
        fx.push(
            vec![Operation::AssetIssue(
                meridian::protocol::AssetIssueOperation {
                    fee: AssetAmount::zero(CORE_ASSET),
                    issuer,
                    asset_to_issue: amount(quantity, asset),
                    issue_to_account: issuer,
                },
            )],
            &["alice"],
        );
    }
    let account = fx.account("alice");
    fx.push(
        vec![Operation::LiquidityPoolCreate(
            meridian::protocol::LiquidityPoolCreateOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                account,
                asset_a: a,
                asset_b: b,
                share_asset: share,
                taker_fee_percent: 0,
                withdrawal_fee_percent: 0,
            },
        )],
        &["alice"],
    );
    let pool = LiquidityPoolId(
        *fx.db()
            .index::<LiquidityPoolObject>()
            .by_share_asset
            .get(&share)
            .unwrap(),
    );
    PoolFixture {
        fx,
        a,
        b,
        share,
        pool,
    }
}

fn deposit(pf: &mut PoolFixture, who: &str, amount_a: i64, amount_b: i64) {
    let account = pf.fx.account(who);
    pf.fx.push(
        vec![Operation::LiquidityPoolDeposit(
            meridian::protocol::LiquidityPoolDepositOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                account,
                pool: pf.pool,
                amount_a: amount(amount_a, pf.a),
                amount_b: amount(amount_b, pf.b),
            },
        )],
        &[who],
    );
}

fn pool_state(pf: &PoolFixture) -> LiquidityPoolObject {
    pf.fx.db().get::<LiquidityPoolObject>(pf.pool).unwrap().clone()
}

fn share_supply(pf: &PoolFixture) -> i64 {
    let dynamic_id = pf.fx.db().get::<AssetObject>(pf.share).unwrap().dynamic_data;
    pf.fx
        .db()
        .get::<AssetDynamicObject>(dynamic_id)
        .unwrap()
        .current_supply
        .0
}

/// Scenario: pool (A=1000, B=2000, shares=2000); a deposit of (10, 20)
/// grants min(2000*10/1000, 2000*20/2000) = 20 shares and accepts
/// ceil(20*1000/2000)=10 A and ceil(20*2000/2000)=20 B.
#[test]
fn proportional_deposit_grants_floored_shares_and_rounds_acceptance_up() {
    let mut pf = setup();
    deposit(&mut pf, "alice", 1000, 2000);
    assert_eq!(share_supply(&pf), 2000);

    let before_a = pf.fx.balance("alice", pf.a);
    let before_b = pf.fx.balance("alice", pf.b);
    deposit(&mut pf, "alice", 10, 20);
    assert_eq!(share_supply(&pf), 2020);
    assert_eq!(pf.fx.balance("alice", pf.a), before_a - 10);
    assert_eq!(pf.fx.balance("alice", pf.b), before_b - 20);

    let pool = pool_state(&pf);
    assert_eq!((pool.balance_a.0, pool.balance_b.0), (1010, 2020));
    pf.fx.assert_supply_conserved(pf.a);
    pf.fx.assert_supply_conserved(pf.b);
    pf.fx.assert_supply_conserved(pf.share);
}

#[test]
fn initial_deposit_is_reserved_to_the_owner() {
    let mut pf = setup();
    // Bob holds no share-asset authority problems, but he is not the owner.
    let account = pf.fx.account("bob");
    let err = pf
        .fx
        .try_push(
            vec![Operation::LiquidityPoolDeposit(
                meridian::protocol::LiquidityPoolDepositOperation {
                    fee: AssetAmount::zero(CORE_ASSET),
                    account,
                    pool: pf.pool,
                    amount_a: amount(1000, pf.a),
                    amount_b: amount(2000, pf.b),
                },
            )],
            &["bob"],
        )
        .unwrap_err();
    assert!(matches!(err, MeridianError::State(_)));
}

#[test]
fn exchange_preserves_the_invariant_and_honors_min_to_receive() {
    let mut pf = setup();
    deposit(&mut pf, "alice", 1000, 2000);
    let virtual_before = pool_state(&pf).virtual_value;

    // Selling 100 A nets ceil-preserved 181 B.
    let account = pf.fx.account("alice");
    pf.fx.push(
        vec![Operation::LiquidityPoolExchange(
            meridian::protocol::LiquidityPoolExchangeOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                account,
                pool: pf.pool,
                amount_to_sell: amount(100, pf.a),
                min_to_receive: amount(181, pf.b),
            },
        )],
        &["alice"],
    );
    let pool = pool_state(&pf);
    assert_eq!((pool.balance_a.0, pool.balance_b.0), (1100, 1819));
    assert!(pool.virtual_value >= virtual_before);

    // Asking for more than the pool can give at this size fails.
    let err = pf
        .fx
        .try_push(
            vec![Operation::LiquidityPoolExchange(
                meridian::protocol::LiquidityPoolExchangeOperation {
                    fee: AssetAmount::zero(CORE_ASSET),
                    account,
                    pool: pf.pool,
                    amount_to_sell: amount(100, pf.a),
                    min_to_receive: amount(1000, pf.b),
                },
            )],
            &["alice"],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        MeridianError::Market(MarketError::PoolPriceMismatch)
    ));
    pf.fx.assert_supply_conserved(pf.a);
    pf.fx.assert_supply_conserved(pf.b);
}

#[test]
fn taker_fee_stays_in_the_pool() {
    let mut fx = Fixture::with_accounts(&["alice"]);
    let a = fx.create_uia("alice", "AAA", 0);
    let b = fx.create_uia("alice", "BBB", 0);
    let share = fx.create_uia("alice", "POOLSHARE", 0);
    let issuer = fx.account("alice");
    for (asset, quantity) in [(a, 1_000_000), (b, 1_000_000)] {
        fx.push(
            vec![Operation::AssetIssue(
                meridian::protocol::AssetIssueOperation {
                    fee: AssetAmount::zero(CORE_ASSET),
                    issuer,
                    asset_to_issue: amount(quantity, asset),
                    issue_to_account: issuer,
                },
            )],
            &["alice"],
        );
    }
    fx.push(
        vec![Operation::LiquidityPoolCreate(
            meridian::protocol::LiquidityPoolCreateOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                account: issuer,
                asset_a: a,
                asset_b: b,
                share_asset: share,
                taker_fee_percent: 100, // 1%
                withdrawal_fee_percent: 0,
            },
        )],
        &["alice"],
    );
    let pool = LiquidityPoolId(
        *fx.db()
            .index::<LiquidityPoolObject>()
            .by_share_asset
            .get(&share)
            .unwrap(),
    );
    fx.push(
        vec![Operation::LiquidityPoolDeposit(
            meridian::protocol::LiquidityPoolDepositOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                account: issuer,
                pool,
                amount_a: amount(1000, a),
                amount_b: amount(2000, b),
            },
        )],
        &["alice"],
    );
    let before_b = fx.balance("alice", b);
    fx.push(
        vec![Operation::LiquidityPoolExchange(
            meridian::protocol::LiquidityPoolExchangeOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                account: issuer,
                pool,
                amount_to_sell: amount(100, a),
                min_to_receive: amount(180, b),
            },
        )],
        &["alice"],
    );
    // Raw delta 181, 1% taker fee floored to 1, so the account nets 180
    // and the fee unit compounds inside the pool.
    assert_eq!(fx.balance("alice", b) - before_b, 180);
    let pool_obj = fx.db().get::<LiquidityPoolObject>(pool).unwrap();
    assert_eq!(pool_obj.balance_b.0, 1820);
    fx.assert_supply_conserved(b);
}

#[test]
fn withdraw_returns_proportional_balances_and_the_last_share_empties_the_pool() {
    let mut pf = setup();
    deposit(&mut pf, "alice", 1000, 2000);
    let account = pf.fx.account("alice");

    // Withdraw a tenth of the shares.
    pf.fx.push(
        vec![Operation::LiquidityPoolWithdraw(
            meridian::protocol::LiquidityPoolWithdrawOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                account,
                pool: pf.pool,
                share_amount: amount(200, pf.share),
            },
        )],
        &["alice"],
    );
    let pool = pool_state(&pf);
    assert_eq!((pool.balance_a.0, pool.balance_b.0), (900, 1800));
    assert_eq!(share_supply(&pf), 1800);

    // Burning the rest empties the pool, after which it can be deleted.
    pf.fx.push(
        vec![Operation::LiquidityPoolWithdraw(
            meridian::protocol::LiquidityPoolWithdrawOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                account,
                pool: pf.pool,
                share_amount: amount(1800, pf.share),
            },
        )],
        &["alice"],
    );
    assert_eq!(share_supply(&pf), 0);
    let pool = pool_state(&pf);
    assert_eq!((pool.balance_a.0, pool.balance_b.0), (0, 0));

    pf.fx.push(
        vec![Operation::LiquidityPoolDelete(
            meridian::protocol::LiquidityPoolDeleteOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                account,
                pool: pf.pool,
            },
        )],
        &["alice"],
    );
    assert!(pf.fx.db().find::<LiquidityPoolObject>(pf.pool).is_none());
    pf.fx.assert_supply_conserved(pf.a);
    pf.fx.assert_supply_conserved(pf.b);
    pf.fx.assert_supply_conserved(pf.share);
}

#[test]
fn deleting_a_funded_pool_is_rejected() {
    let mut pf = setup();
    deposit(&mut pf, "alice", 1000, 2000);
    let account = pf.fx.account("alice");
    let err = pf
        .fx
        .try_push(
            vec![Operation::LiquidityPoolDelete(
                meridian::protocol::LiquidityPoolDeleteOperation {
                    fee: AssetAmount::zero(CORE_ASSET),
                    account,
                    pool: pf.pool,
                },
            )],
            &["alice"],
        )
        .unwrap_err();
    assert!(matches!(err, MeridianError::Market(MarketError::PoolNotEmpty)));
}
