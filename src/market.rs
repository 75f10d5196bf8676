//! The market engine: limit-order matching, margin calls and black-swan
//! responses, and force-settlement processing. All functions mutate state
//! through the database's journaled access, so any enclosing session can
//! roll a partially executed sweep back.

mod fill;
mod margin;
mod matching;
mod settlement;

pub use fill::{
    calculate_market_fee, cancel_limit_order, credit_with_market_fee, fill_call_order,
    fill_limit_order, pay_market_fee,
};
pub use margin::{
    CallMatchContext, call_match_context, cancel_all_bids, check_call_orders, global_settle,
    process_collateral_bids, settle_from_funds,
};
pub use matching::{MatchOutcome, apply_order, best_order, match_limit_limit};
pub use settlement::{cancel_settlement, process_due_settlements};
