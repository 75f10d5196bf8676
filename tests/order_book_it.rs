//! Order book and matching behavior: maker-price rule, price-time
//! priority, rounding, dust culling, expiration and fees.

mod common;

use chrono::Duration;
use common::{Fixture, amount};
use meridian::{
    MeridianError,
    entity::{AssetDynamicObject, AssetObject, LimitOrderObject},
    error::{MarketError, ValidationError},
    protocol::{AssetAmount, CORE_ASSET, LimitOrderCreateOperation, Operation},
};

/// Scenario: Alice offers 1000 X for 200 Y, Bob offers 200 Y for 1000 X.
/// One match fills both completely; the market fee on X accrues to the
/// asset.
#[test]
fn exact_cross_fills_both_orders() {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let x = fx.create_uia("alice", "XCOIN", 100); // 1% market fee
    let y = fx.create_uia("bob", "YCOIN", 0);
    issue(&mut fx, "alice", x, 1_000_000);
    issue(&mut fx, "bob", y, 1_000_000);

    let maker = fx.sell("alice", amount(1000, x), amount(200, y));
    assert!(maker.is_some(), "no counterparty yet, the order must rest");

    let taker = fx.sell("bob", amount(200, y), amount(1000, x));
    assert!(taker.is_none(), "the taker must fill completely");
    assert!(
        fx.db()
            .find::<LimitOrderObject>(maker.unwrap())
            .is_none(),
        "the maker must fill completely"
    );

    // Bob bought 1000 X minus the 1% market fee; Alice received all 200 Y.
    assert_eq!(fx.balance("bob", x), 990);
    assert_eq!(fx.balance("alice", y), 200);
    assert_eq!(fx.balance("alice", x), 1_000_000 - 1000);
    assert_eq!(fx.balance("bob", y), 1_000_000 - 200);
    assert_eq!(accumulated_fees(&fx, x), 10);

    fx.assert_supply_conserved(x);
    fx.assert_supply_conserved(y);
    fx.assert_supply_conserved(CORE_ASSET);
}

#[test]
fn taker_fills_at_the_maker_price() {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let x = fx.create_uia("alice", "XCOIN", 0);
    let y = fx.create_uia("bob", "YCOIN", 0);
    issue(&mut fx, "alice", x, 1_000_000);
    issue(&mut fx, "bob", y, 1_000_000);

    // Maker asks 10 X per Y; taker would settle for 8 X per Y.
    fx.sell("alice", amount(1000, x), amount(100, y));
    let taker = fx.sell("bob", amount(50, y), amount(400, x));
    assert!(taker.is_none());
    // The taker gets the maker's better rate, never its own limit.
    assert_eq!(fx.balance("bob", x), 500);
}

#[test]
fn older_order_wins_at_equal_price() {
    let mut fx = Fixture::with_accounts(&["alice", "bob", "carol"]);
    let x = fx.create_uia("alice", "XCOIN", 0);
    let y = fx.create_uia("bob", "YCOIN", 0);
    issue(&mut fx, "alice", x, 1_000_000);
    issue(&mut fx, "carol", x, 1_000_000);
    issue(&mut fx, "bob", y, 1_000_000);

    let first = fx.sell("alice", amount(1000, x), amount(200, y)).unwrap();
    let second = fx.sell("carol", amount(1000, x), amount(200, y)).unwrap();

    fx.sell("bob", amount(200, y), amount(1000, x));
    assert!(fx.db().find::<LimitOrderObject>(first).is_none());
    assert!(fx.db().find::<LimitOrderObject>(second).is_some());
}

#[test]
fn partial_fill_keeps_the_remainder_on_the_book() {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let x = fx.create_uia("alice", "XCOIN", 0);
    let y = fx.create_uia("bob", "YCOIN", 0);
    issue(&mut fx, "alice", x, 1_000_000);
    issue(&mut fx, "bob", y, 1_000_000);

    let maker = fx.sell("alice", amount(1000, x), amount(200, y)).unwrap();
    fx.sell("bob", amount(50, y), amount(250, x));

    let rest = fx.db().get::<LimitOrderObject>(maker).unwrap();
    assert_eq!(rest.for_sale.0, 750);
    assert_eq!(fx.balance("bob", x), 250);
    assert_eq!(fx.balance("alice", y), 50);
}

#[test]
fn dust_remainder_is_cancelled_and_refunded() {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let x = fx.create_uia("alice", "XCOIN", 0);
    let y = fx.create_uia("bob", "YCOIN", 0);
    issue(&mut fx, "alice", x, 1_000_000);
    issue(&mut fx, "bob", y, 1_000_000);

    // Maker asks 500 X per Y. A taker selling 1001 X leaves 1 X behind,
    // which can never buy a unit of Y and must be refunded.
    fx.sell("bob", amount(2, y), amount(1000, x));
    let before = fx.balance("alice", x);
    let rest = fx.sell("alice", amount(1001, x), amount(2, y));
    assert!(rest.is_none(), "dust must not rest on the book");
    assert_eq!(fx.balance("alice", x), before - 1000);
    assert_eq!(fx.balance("alice", y), 2);
}

#[test]
fn fill_or_kill_rejects_when_unfillable() {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let x = fx.create_uia("alice", "XCOIN", 0);
    let y = fx.create_uia("bob", "YCOIN", 0);
    issue(&mut fx, "alice", x, 1_000_000);

    let seller = fx.account("alice");
    let expiration = fx.chain.head_block_time() + Duration::days(1);
    let err = fx
        .try_push(
            vec![Operation::LimitOrderCreate(LimitOrderCreateOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                seller,
                amount_to_sell: amount(1000, x),
                min_to_receive: amount(200, y),
                expiration,
                fill_or_kill: true,
            })],
            &["alice"],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        MeridianError::Market(MarketError::FillOrKillUnfilled)
    ));
    assert_eq!(fx.balance("alice", x), 1_000_000);
}

#[test]
fn expired_orders_are_cancelled_at_maintenance() {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let x = fx.create_uia("alice", "XCOIN", 0);
    let y = fx.create_uia("bob", "YCOIN", 0);
    issue(&mut fx, "alice", x, 1_000_000);

    let seller = fx.account("alice");
    let expiration = fx.chain.head_block_time() + Duration::hours(2);
    fx.push(
        vec![Operation::LimitOrderCreate(LimitOrderCreateOperation {
            fee: AssetAmount::zero(CORE_ASSET),
            seller,
            amount_to_sell: amount(1000, x),
            min_to_receive: amount(200, y),
            expiration,
            fill_or_kill: false,
        })],
        &["alice"],
    );
    assert_eq!(fx.balance("alice", x), 1_000_000 - 1000);
    let core_after_place = fx.core_balance("alice");

    // The maintenance interval (one day) passes the 2h expiration.
    fx.advance_past_maintenance();
    assert_eq!(fx.balance("alice", x), 1_000_000);
    // The deferred order fee is refunded on cancellation.
    assert_eq!(fx.core_balance("alice"), core_after_place + 10_000);
    fx.assert_supply_conserved(x);
    fx.assert_supply_conserved(CORE_ASSET);
}

#[test]
fn cancelling_an_order_refunds_escrow_and_deferred_fee() {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let x = fx.create_uia("alice", "XCOIN", 0);
    let y = fx.create_uia("bob", "YCOIN", 0);
    issue(&mut fx, "alice", x, 1_000_000);

    let order = fx.sell("alice", amount(1000, x), amount(200, y)).unwrap();
    let core_after_place = fx.core_balance("alice");
    let fee_paying_account = fx.account("alice");
    fx.push(
        vec![Operation::LimitOrderCancel(
            meridian::protocol::LimitOrderCancelOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                fee_paying_account,
                order,
            },
        )],
        &["alice"],
    );
    assert_eq!(fx.balance("alice", x), 1_000_000);
    // Cancellation itself is free and the deferred creation fee returns.
    assert_eq!(fx.core_balance("alice"), core_after_place + 10_000);
}

/// Seeded churn: random crossing and resting orders never violate supply
/// conservation, and the price index stays in lockstep with the primary.
#[test]
fn random_order_churn_conserves_supply() {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let x = fx.create_uia("alice", "XCOIN", 30);
    let y = fx.create_uia("bob", "YCOIN", 0);
    issue(&mut fx, "alice", x, 100_000_000);
    issue(&mut fx, "bob", y, 100_000_000);
    fx.transfer("alice", "bob", amount(50_000_000, x));
    fx.transfer("bob", "alice", amount(50_000_000, y));

    let mut rng = StdRng::seed_from_u64(20_200_101);
    for round in 0..60 {
        let sell = rng.random_range(1..5000i64);
        let receive = rng.random_range(1..5000i64);
        let result = if round % 2 == 0 {
            fx.try_sell("alice", amount(sell, x), amount(receive, y))
        } else {
            fx.try_sell("bob", amount(sell, y), amount(receive, x))
        };
        if let Err(e) = result {
            // A colliding draw can reproduce an earlier transaction
            // verbatim; everything else must be accepted.
            assert!(
                matches!(
                    e,
                    MeridianError::Validation(ValidationError::DuplicateTransaction)
                ),
                "well-funded order rejected: {e}"
            );
        }
        fx.assert_supply_conserved(x);
        fx.assert_supply_conserved(y);
    }
    // Every primary row appears in the price index and vice versa.
    let primary: Vec<u64> = fx
        .db()
        .iter::<LimitOrderObject>()
        .map(|o| o.id.0)
        .collect();
    let mut indexed: Vec<u64> = fx
        .db()
        .index::<LimitOrderObject>()
        .by_price
        .iter()
        .map(|k| k.id)
        .collect();
    indexed.sort_unstable();
    assert_eq!(primary, indexed);
}

fn issue(fx: &mut Fixture, issuer: &str, asset: meridian::protocol::AssetId, quantity: i64) {
    let issuer_id = fx.account(issuer);
    fx.push(
        vec![Operation::AssetIssue(
            meridian::protocol::AssetIssueOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                issuer: issuer_id,
                asset_to_issue: amount(quantity, asset),
                issue_to_account: issuer_id,
            },
        )],
        &[issuer],
    );
}

fn accumulated_fees(fx: &Fixture, asset: meridian::protocol::AssetId) -> i64 {
    let dynamic_id = fx.db().get::<AssetObject>(asset).unwrap().dynamic_data;
    fx.db()
        .get::<AssetDynamicObject>(dynamic_id)
        .unwrap()
        .accumulated_fees
        .0
}
