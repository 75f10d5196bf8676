//! End-to-end chain behavior: transfers, fees, transaction validation,
//! block production and the undo path.

mod common;

use common::{Fixture, amount, key_of};
use meridian::{
    MeridianError, SkipFlags,
    error::{StateError, ValidationError},
    protocol::{
        AccountCreateOperation, AssetAmount, Authority, CORE_ASSET, Operation,
        TransferOperation, validate_account_name,
    },
};

#[test]
fn account_name_grammar_matches_the_chain_rules() {
    for ok in ["a-b", "abc.def"] {
        assert!(validate_account_name(ok).is_ok(), "{ok} should be accepted");
    }
    for bad in ["a_b", "aaa..bbb", "1abc", ".abc", "a"] {
        assert!(validate_account_name(bad).is_err(), "{bad} should be rejected");
    }
}

#[test]
fn account_create_registers_a_valid_name() {
    let mut fx = Fixture::with_accounts(&["alice"]);
    let registrar = fx.account("alice");
    fx.push(
        vec![Operation::AccountCreate(AccountCreateOperation {
            fee: AssetAmount::zero(CORE_ASSET),
            registrar,
            referrer: registrar,
            referrer_percent: 0,
            name: "a-b".to_owned(),
            owner: Authority::key(key_of("a-b")),
            active: Authority::key(key_of("a-b")),
            memo_key: key_of("a-b"),
        })],
        &["alice"],
    );
    assert!(fx.db().account_by_name("a-b").is_ok());

    let err = fx
        .try_push(
            vec![Operation::AccountCreate(AccountCreateOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                registrar,
                referrer: registrar,
                referrer_percent: 0,
                name: "1abc".to_owned(),
                owner: Authority::key(key_of("x")),
                active: Authority::key(key_of("x")),
                memo_key: key_of("x"),
            })],
            &["alice"],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        MeridianError::Validation(ValidationError::InvalidName(_))
    ));
}

#[test]
fn transfer_moves_funds_and_burns_the_network_fee_share() {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let before_alice = fx.core_balance("alice");
    let before_bob = fx.core_balance("bob");

    fx.transfer("alice", "bob", amount(1_000_000, CORE_ASSET));

    // Flat transfer fee is 10_000 core base units.
    assert_eq!(fx.core_balance("alice"), before_alice - 1_000_000 - 10_000);
    assert_eq!(fx.core_balance("bob"), before_bob + 1_000_000);
    fx.assert_supply_conserved(CORE_ASSET);
}

#[test]
fn transfer_with_insufficient_balance_leaves_state_untouched() {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let before = fx.core_balance("alice");
    let err = fx
        .try_push(
            vec![Operation::Transfer(TransferOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                from: fx.account("alice"),
                to: fx.account("bob"),
                amount: amount(common::INITIAL_BALANCE + 1, CORE_ASSET),
                memo: None,
            })],
            &["alice"],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        MeridianError::State(StateError::InsufficientBalance { .. })
    ));
    assert_eq!(fx.core_balance("alice"), before);
    fx.assert_supply_conserved(CORE_ASSET);
}

#[test]
fn missing_signature_is_rejected() {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let err = fx
        .try_push(
            vec![Operation::Transfer(TransferOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                from: fx.account("alice"),
                to: fx.account("bob"),
                amount: amount(100, CORE_ASSET),
                memo: None,
            })],
            &["bob"],
        )
        .unwrap_err();
    assert!(matches!(err, MeridianError::Authority(_)));
}

#[test]
fn duplicate_transaction_is_rejected() {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let tx = fx.tx(
        vec![Operation::Transfer(TransferOperation {
            fee: AssetAmount::zero(CORE_ASSET),
            from: fx.account("alice"),
            to: fx.account("bob"),
            amount: amount(100, CORE_ASSET),
            memo: None,
        })],
        &["alice"],
    );
    fx.chain.push_transaction(&tx, SkipFlags::NOTHING).unwrap();
    let err = fx.chain.push_transaction(&tx, SkipFlags::NOTHING).unwrap_err();
    assert!(matches!(
        err,
        MeridianError::Validation(ValidationError::DuplicateTransaction)
    ));
}

#[test]
fn tapos_anchor_must_match_a_recent_block() {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let mut tx = fx.tx(
        vec![Operation::Transfer(TransferOperation {
            fee: AssetAmount::zero(CORE_ASSET),
            from: fx.account("alice"),
            to: fx.account("bob"),
            amount: amount(100, CORE_ASSET),
            memo: None,
        })],
        &["alice"],
    );
    tx.ref_block_prefix = 0xDEAD_BEEF;
    let err = fx.chain.push_transaction(&tx, SkipFlags::NOTHING).unwrap_err();
    assert!(matches!(
        err,
        MeridianError::Validation(ValidationError::TaposAnchorMismatch)
    ));
}

#[test]
fn expired_transaction_is_rejected() {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let mut tx = fx.tx(
        vec![Operation::Transfer(TransferOperation {
            fee: AssetAmount::zero(CORE_ASSET),
            from: fx.account("alice"),
            to: fx.account("bob"),
            amount: amount(100, CORE_ASSET),
            memo: None,
        })],
        &["alice"],
    );
    tx.expiration = fx.chain.head_block_time();
    let err = fx.chain.push_transaction(&tx, SkipFlags::NOTHING).unwrap_err();
    assert!(matches!(
        err,
        MeridianError::Validation(ValidationError::ExpiredTransaction { .. })
    ));
}

#[test]
fn popping_a_block_restores_the_previous_state() {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let before_alice = fx.core_balance("alice");
    let before_bob = fx.core_balance("bob");
    let head_before = fx.chain.head_block_num();

    let tx = fx.tx(
        vec![Operation::Transfer(TransferOperation {
            fee: AssetAmount::zero(CORE_ASSET),
            from: fx.account("alice"),
            to: fx.account("bob"),
            amount: amount(777, CORE_ASSET),
            memo: None,
        })],
        &["alice"],
    );
    fx.produce_block(vec![tx]);
    assert_eq!(fx.chain.head_block_num(), head_before + 1);
    assert_eq!(fx.core_balance("bob"), before_bob + 777);

    fx.chain.pop_block().unwrap();
    assert_eq!(fx.chain.head_block_num(), head_before);
    assert_eq!(fx.core_balance("alice"), before_alice);
    assert_eq!(fx.core_balance("bob"), before_bob);
    fx.assert_supply_conserved(CORE_ASSET);
}

#[test]
fn paying_fees_in_an_asset_draws_down_its_fee_pool() {
    let mut fx = Fixture::with_accounts(&["alice", "bob"]);
    let x = fx.create_uia("bob", "XCOIN", 0);
    let bob = fx.account("bob");
    let alice = fx.account("alice");
    fx.push(
        vec![Operation::AssetIssue(
            meridian::protocol::AssetIssueOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                issuer: bob,
                asset_to_issue: amount(1_000_000, x),
                issue_to_account: alice,
            },
        )],
        &["bob"],
    );

    // The fee pool is empty, so a fee denominated in XCOIN cannot convert.
    let err = fx
        .try_push(
            vec![Operation::Transfer(TransferOperation {
                fee: amount(10_000, x),
                from: alice,
                to: bob,
                amount: amount(5000, x),
                memo: None,
            })],
            &["alice"],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        MeridianError::State(StateError::InsufficientFeePool { .. })
    ));
    assert_eq!(fx.balance("alice", x), 1_000_000);

    // Funding the pool makes the same transaction pass.
    fx.push(
        vec![Operation::AssetFundFeePool(
            meridian::protocol::AssetFundFeePoolOperation {
                fee: AssetAmount::zero(CORE_ASSET),
                from_account: bob,
                asset_id: x,
                amount: meridian::protocol::Share(1_000_000),
            },
        )],
        &["bob"],
    );
    fx.push(
        vec![Operation::Transfer(TransferOperation {
            fee: amount(10_000, x),
            from: alice,
            to: bob,
            amount: amount(5000, x),
            memo: None,
        })],
        &["alice"],
    );
    assert_eq!(fx.balance("alice", x), 1_000_000 - 5000 - 10_000);
    fx.assert_supply_conserved(CORE_ASSET);
    fx.assert_supply_conserved(x);
}

#[test]
fn witness_pay_vests_after_maintenance_funds_the_budget() {
    let mut fx = Fixture::with_accounts(&["alice"]);
    // The genesis budget is zero; the first maintenance refreshes it, after
    // which every block pays the witness into a vesting balance.
    fx.advance_past_maintenance();
    fx.produce_block(Vec::new());
    let init0 = fx.account("init0");
    let vested: i64 = fx
        .db()
        .iter::<meridian::entity::VestingBalanceObject>()
        .filter(|vb| vb.owner == init0)
        .map(|vb| vb.balance.amount.0)
        .sum();
    assert!(vested > 0, "witness pay should accumulate in vesting");
    fx.assert_supply_conserved(CORE_ASSET);
}
