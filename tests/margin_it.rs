//! Collateral-engine behavior: margin calls, black-swan responses,
//! settled-debt orders, global settlement with collateral bids, and force
//! settlements.

mod common;

use common::{Fixture, amount};
use meridian::{
    entity::{
        AssetBitassetObject, AssetDynamicObject, AssetObject, CallOrderObject,
        CollateralBidObject, LimitOrderObject,
    },
    protocol::{AssetAmount, AssetId, BlackSwanResponse, CORE_ASSET, Operation},
};

fn bitasset_of(fx: &Fixture, asset: AssetId) -> AssetBitassetObject {
    let bitasset_id = fx
        .db()
        .get::<AssetObject>(asset)
        .unwrap()
        .bitasset_data
        .unwrap();
    fx.db().get::<AssetBitassetObject>(bitasset_id).unwrap().clone()
}

fn collateral_fees_of(fx: &Fixture, asset: AssetId) -> i64 {
    let dynamic_id = fx.db().get::<AssetObject>(asset).unwrap().dynamic_data;
    fx.db()
        .get::<AssetDynamicObject>(dynamic_id)
        .unwrap()
        .accumulated_collateral_fees
        .0
}

fn call_of(fx: &Fixture, owner: &str, asset: AssetId) -> Option<CallOrderObject> {
    let owner_id = fx.account(owner);
    fx.db()
        .index::<CallOrderObject>()
        .by_account
        .get(&(owner_id, asset))
        .map(|instance| {
            fx.db()
                .get::<CallOrderObject>((*instance).into())
                .unwrap()
                .clone()
        })
}

/// Four positions at increasing collateralization; the feed drops twice.
/// Undercollateralized positions flow one by one into a single settled-debt
/// order whose aggregates match the margin-call fee arithmetic exactly.
#[test]
fn individual_settlement_to_order_aggregates_bad_debt() {
    let mut fx = Fixture::with_accounts(&[
        "alice", "feeder", "seller", "borrower1", "borrower2", "borrower3", "borrower4",
    ]);
    let mm = fx.create_bitasset("alice", "MERIDIANUSD", |opts| {
        opts.margin_call_fee_ratio = 11;
        opts.black_swan_response = BlackSwanResponse::IndividualSettlementToOrder;
        opts.feed_lifetime_sec = 60 * 60 * 24 * 30;
    });
    fx.update_feed_producers("alice", mm, &["feeder"]);
    fx.publish_feed("feeder", mm, Fixture::feed(mm, 100, 1, 1850, 1250, Some(1900)));

    for (borrower, collateral) in [
        ("borrower1", 2000),
        ("borrower2", 2100),
        ("borrower3", 2200),
        ("borrower4", 2500),
    ] {
        fx.borrow(borrower, amount(100_000, mm), collateral);
        fx.transfer(borrower, "seller", amount(100_000, mm));
    }
    assert_eq!(fx.balance("seller", mm), 400_000);

    // Feed drop one: borrower1 can no longer cover at the squeeze price
    // and is settled into a fresh settled-debt order.
    // margin call fee = round_down(2000 * 11 / 1250) = 17.
    fx.publish_feed("feeder", mm, Fixture::feed(mm, 100_000, 1650, 1850, 1250, Some(1900)));

    let bitasset = bitasset_of(&fx, mm);
    let settled_order_id = bitasset.settled_debt_order.expect("settled-debt order exists");
    let order = fx.db().get::<LimitOrderObject>(settled_order_id).unwrap();
    assert_eq!(order.for_sale.0, 1983);
    assert_eq!(order.sell_price.quote.amount.0, 100_000);
    assert_eq!(bitasset.individual_settlement_debt.0, 100_000);
    assert_eq!(collateral_fees_of(&fx, mm), 17);
    assert!(call_of(&fx, "borrower1", mm).is_none());
    assert!(call_of(&fx, "borrower2", mm).is_some());

    // A debt seller takes the margin call of the least-collateralized
    // remaining position at the call match price:
    //   order receives round_down(10000 * 1650/100000 * 1239/1000) = 204
    //   order pays round_up(204 * 100000/1650 * 1000/1239) = 9979
    //   call2 pays round_down(9979 * 1650/100000 * 1250/1000) = 205
    let rest = fx.sell("seller", amount(10_000, mm), amount(100, CORE_ASSET));
    assert!(rest.is_none());
    let call2 = call_of(&fx, "borrower2", mm).unwrap();
    assert_eq!(call2.debt.0, 90_021);
    assert_eq!(call2.collateral.0, 1895);
    assert_eq!(fx.balance("seller", mm), 390_021);
    // Proceeds land in core; the culled order refunds its deferred fee.
    assert_eq!(fx.balance("seller", CORE_ASSET), common::INITIAL_BALANCE + 204);
    assert_eq!(collateral_fees_of(&fx, mm), 18);

    // Feed drop two: borrowers 2 and 3 go under; their remains aggregate
    // into the same settled-debt order.
    //   call2 fee = round_down(1895 * 11 / 1250) = 16, fund 1879
    //   call3 fee = round_down(2200 * 11 / 1250) = 19, fund 2181
    fx.publish_feed("feeder", mm, Fixture::feed(mm, 100_000, 1800, 1850, 1250, Some(1900)));

    let bitasset = bitasset_of(&fx, mm);
    let order = fx.db().get::<LimitOrderObject>(settled_order_id).unwrap();
    assert_eq!(order.for_sale.0, 6043); // 1983 + 1879 + 2181
    assert_eq!(order.sell_price.quote.amount.0, 290_021); // 100000 + 90021 + 100000
    assert_eq!(bitasset.individual_settlement_debt.0, 290_021);
    assert_eq!(collateral_fees_of(&fx, mm), 53); // 17 + 1 + 16 + 19
    assert!(call_of(&fx, "borrower2", mm).is_none());
    assert!(call_of(&fx, "borrower3", mm).is_none());
    let call4 = call_of(&fx, "borrower4", mm).unwrap();
    assert_eq!((call4.debt.0, call4.collateral.0), (100_000, 2500));

    // With borrower4 topped up out of call range, a sale matches the
    // settled-debt order as an ordinary maker at its own price:
    //   limit receives round_down(10000 * 6043/290021) = 208
    //   settled debt receives round_up(208 * 290021/6043) = 9983 (burned)
    fx.borrow("borrower4", amount(0, mm), 2000);
    let core_before = fx.balance("seller", CORE_ASSET);
    let rest = fx.sell("seller", amount(10_000, mm), amount(208, CORE_ASSET));
    assert!(rest.is_none());

    let bitasset = bitasset_of(&fx, mm);
    let order = fx.db().get::<LimitOrderObject>(settled_order_id).unwrap();
    assert_eq!(order.for_sale.0, 5835); // 6043 - 208
    assert_eq!(order.sell_price.quote.amount.0, 280_038); // 290021 - 9983
    assert_eq!(bitasset.individual_settlement_debt.0, 280_038);
    // Net of the refunded deferred fee, only the proceeds remain.
    assert_eq!(fx.balance("seller", CORE_ASSET) - core_before, 208);

    fx.assert_supply_conserved(mm);
    fx.assert_supply_conserved(CORE_ASSET);
}

/// Global-settlement mode: the first uncoverable position closes every
/// call at the worst collateralization, the fund redeems at the fixed
/// price, and collateral bids revive the asset at maintenance.
#[test]
fn global_settlement_and_revival_through_bids() {
    let mut fx = Fixture::with_accounts(&["alice", "feeder", "hodler", "carol", "ann", "ben"]);
    let mm = fx.create_bitasset("alice", "MERIDIANUSD", |opts| {
        opts.feed_lifetime_sec = 60 * 60 * 24 * 30;
    });
    fx.update_feed_producers("alice", mm, &["feeder"]);
    fx.publish_feed("feeder", mm, Fixture::feed(mm, 100, 1, 1750, 1500, None));

    fx.borrow("ann", amount(1000, mm), 30);
    fx.borrow("ben", amount(1000, mm), 21);

    // At 100:2 ben is callable and cannot cover 1000*2*1.5/100 = 30 > 21.
    // Everyone settles at ben's collateralization, 1000:21.
    fx.publish_feed("feeder", mm, Fixture::feed(mm, 100, 2, 1750, 1500, None));

    let bitasset = bitasset_of(&fx, mm);
    assert!(bitasset.has_settlement());
    assert_eq!(bitasset.settlement_fund.0, 42); // 21 from each position
    assert!(call_of(&fx, "ann", mm).is_none());
    assert!(call_of(&fx, "ben", mm).is_none());
    // ann paid round_up(1000 * 21/1000) = 21, the rest came back.
    assert_eq!(
        fx.balance("ann", CORE_ASSET),
        common::INITIAL_BALANCE - 21 - 10_000
    );

    // Instant redemption from the fund at the settlement price.
    fx.settle("ann", amount(1000, mm));
    assert_eq!(fx.balance("ann", mm), 0);
    let bitasset = bitasset_of(&fx, mm);
    assert_eq!(bitasset.settlement_fund.0, 21);

    // Carol bids to adopt the whole outstanding debt; the next maintenance
    // converts the bid into a call order and revives the asset.
    let bidder = fx.account("carol");
    fx.push(
        vec![Operation::BidCollateral(
            meridian::protocol::BidCollateralOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                bidder,
                additional_collateral: amount(50, CORE_ASSET),
                debt_covered: amount(1000, mm),
            },
        )],
        &["carol"],
    );
    assert_eq!(fx.db().iter::<CollateralBidObject>().count(), 1);

    // Keep the feed fresh so the revival check can price the new position.
    fx.advance_past_maintenance();

    let bitasset = bitasset_of(&fx, mm);
    assert!(!bitasset.has_settlement(), "asset must revive");
    assert_eq!(bitasset.settlement_fund.0, 0);
    let call = call_of(&fx, "carol", mm).expect("bid became a call order");
    assert_eq!(call.debt.0, 1000);
    assert_eq!(call.collateral.0, 71); // 50 bid + 21 fund share
    assert_eq!(fx.db().iter::<CollateralBidObject>().count(), 0);

    fx.assert_supply_conserved(mm);
    fx.assert_supply_conserved(CORE_ASSET);
}

/// Individual-settlement-to-fund: the bad position's collateral joins the
/// fund and holders redeem instantly at the fund's collateralization.
#[test]
fn individual_settlement_to_fund_allows_instant_redemption() {
    let mut fx = Fixture::with_accounts(&["alice", "feeder", "ann"]);
    let mm = fx.create_bitasset("alice", "MERIDIANUSD", |opts| {
        opts.margin_call_fee_ratio = 50;
        opts.black_swan_response = BlackSwanResponse::IndividualSettlementToFund;
        opts.feed_lifetime_sec = 60 * 60 * 24 * 30;
    });
    fx.update_feed_producers("alice", mm, &["feeder"]);
    fx.publish_feed("feeder", mm, Fixture::feed(mm, 100, 1, 1750, 1500, None));

    fx.borrow("ann", amount(1000, mm), 21);
    fx.publish_feed("feeder", mm, Fixture::feed(mm, 100, 2, 1750, 1500, None));

    let bitasset = bitasset_of(&fx, mm);
    assert!(!bitasset.has_settlement());
    assert!(bitasset.has_individual_settlement());
    // fee = round_down(21 * 50 / 1500) = 0; the full collateral funds.
    assert_eq!(bitasset.individual_settlement_fund.0, 21);
    assert_eq!(bitasset.individual_settlement_debt.0, 1000);
    assert!(call_of(&fx, "ann", mm).is_none());

    // Redeeming 500 debt pays round_down(21 * 500/1000) = 10 collateral.
    fx.settle("ann", amount(500, mm));
    assert_eq!(fx.balance("ann", mm), 500);
    let bitasset = bitasset_of(&fx, mm);
    assert_eq!(bitasset.individual_settlement_fund.0, 11);
    assert_eq!(bitasset.individual_settlement_debt.0, 500);

    fx.assert_supply_conserved(mm);
    fx.assert_supply_conserved(CORE_ASSET);
}

/// Queued force settlements fill at maintenance against the least
/// collateralized call, shaved by the settlement offset and capped by the
/// per-interval volume.
#[test]
fn force_settlement_respects_offset_and_volume_cap() {
    let mut fx = Fixture::with_accounts(&["alice", "feeder", "ann", "holder"]);
    let mm = fx.create_bitasset("alice", "MERIDIANUSD", |opts| {
        opts.force_settlement_offset_percent = 100; // 1%
        opts.maximum_force_settlement_volume = 2000; // 20%
        opts.feed_lifetime_sec = 60 * 60 * 24 * 30;
    });
    fx.update_feed_producers("alice", mm, &["feeder"]);
    fx.publish_feed("feeder", mm, Fixture::feed(mm, 100_000, 1000, 1750, 1500, None));

    fx.borrow("ann", amount(100_000, mm), 3000);
    fx.transfer("ann", "holder", amount(40_000, mm));

    fx.settle("holder", amount(40_000, mm));
    assert_eq!(fx.balance("holder", mm), 0);

    // One day later the settlement is due. Volume cap: 20% of 100000 =
    // 20000. Fill price: 1000/100000 shaved 1% => receives
    // round_down(20000 * 99/10000) = 198 core.
    fx.advance_past_maintenance();

    assert_eq!(fx.balance("holder", CORE_ASSET), common::INITIAL_BALANCE - 10_000 + 198);
    let call = call_of(&fx, "ann", mm).unwrap();
    assert_eq!(call.debt.0, 80_000);
    assert_eq!(call.collateral.0, 2802);
    // The unfilled remainder stays queued.
    let pending: i64 = fx
        .db()
        .iter::<meridian::entity::ForceSettlementObject>()
        .map(|s| s.balance.amount.0)
        .sum();
    assert_eq!(pending, 20_000);

    fx.assert_supply_conserved(mm);
    fx.assert_supply_conserved(CORE_ASSET);
}

/// A borrower whose update would leave the position instantly callable is
/// rejected; adding collateral instead passes.
#[test]
fn borrowing_into_margin_call_territory_is_rejected() {
    let mut fx = Fixture::with_accounts(&["alice", "feeder", "ann"]);
    let mm = fx.create_bitasset("alice", "MERIDIANUSD", |opts| {
        opts.feed_lifetime_sec = 60 * 60 * 24 * 30;
    });
    fx.update_feed_producers("alice", mm, &["feeder"]);
    fx.publish_feed("feeder", mm, Fixture::feed(mm, 100, 1, 1750, 1500, None));

    // 1000 debt needs strictly more than 17.5 collateral at the feed.
    let err = fx.try_borrow("ann", amount(1000, mm), 17).unwrap_err();
    assert!(matches!(err, meridian::MeridianError::State(_)));
    assert!(fx.try_borrow("ann", amount(1000, mm), 18).is_ok());

    // After any sweep every remaining position is safely collateralized.
    let bitasset = bitasset_of(&fx, mm);
    let feed = bitasset.current_feed;
    for call in fx.db().iter::<CallOrderObject>() {
        assert!(
            !call.is_callable(&feed.settlement_price, feed.maintenance_collateral_ratio),
            "call safety violated"
        );
    }
}

/// A position carrying a target collateral ratio only sells enough
/// collateral to climb back above its target.
#[test]
fn target_collateral_ratio_limits_the_fill() {
    let mut fx = Fixture::with_accounts(&["alice", "feeder", "ann", "seller"]);
    let mm = fx.create_bitasset("alice", "MERIDIANUSD", |opts| {
        opts.feed_lifetime_sec = 60 * 60 * 24 * 30;
    });
    fx.update_feed_producers("alice", mm, &["feeder"]);
    fx.publish_feed("feeder", mm, Fixture::feed(mm, 100_000, 1000, 1750, 1500, None));

    let funding_account = fx.account("ann");
    fx.push(
        vec![Operation::CallOrderUpdate(
            meridian::protocol::CallOrderUpdateOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                funding_account,
                delta_collateral: amount(2000, CORE_ASSET),
                delta_debt: amount(100_000, mm),
                target_collateral_ratio: Some(2500),
            },
        )],
        &["ann"],
    );
    fx.transfer("ann", "seller", amount(100_000, mm));

    // Big resting ask, then a feed drop that makes ann callable.
    fx.sell("seller", amount(100_000, mm), amount(1400, CORE_ASSET));
    fx.publish_feed("feeder", mm, Fixture::feed(mm, 100_000, 1200, 1750, 1500, None));

    let call = call_of(&fx, "ann", mm).expect("position partially covered, not closed");
    assert!(call.debt.0 > 0 && call.debt.0 < 100_000);
    let bitasset = bitasset_of(&fx, mm);
    assert!(!call.is_callable(
        &bitasset.current_feed.settlement_price,
        bitasset.current_feed.maintenance_collateral_ratio
    ));
    // The remainder of the ask is still on the book.
    let resting: i64 = fx
        .db()
        .iter::<LimitOrderObject>()
        .filter(|o| o.sell_asset() == mm)
        .map(|o| o.for_sale.0)
        .sum();
    assert!(resting > 0);

    fx.assert_supply_conserved(mm);
    fx.assert_supply_conserved(CORE_ASSET);
}
