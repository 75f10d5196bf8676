//! Wire-level protocol types: identifiers, amounts, prices, authorities,
//! operations, transactions and blocks. Everything here is deterministic
//! plain data; behavior lives in the evaluators and the chain layer.

mod amount;
mod asset_options;
mod authority;
mod block;
mod genesis;
mod ids;
mod operations;
mod parameters;
mod price;
mod transaction;

pub use amount::{AssetAmount, MAX_SHARE_SUPPLY, Rounding, Share};
pub use asset_options::{
    AssetFlags, AssetOptions, BitassetOptions, BlackSwanResponse, MAX_PRECISION,
    MAX_SYMBOL_LENGTH, MIN_SYMBOL_LENGTH, validate_symbol,
};
pub use authority::{Authority, PublicKey};
pub use block::{BlockId, SignedBlock};
pub use genesis::{ChainId, GenesisAccount, GenesisBalance, GenesisState};
pub use ids::{
    AccountBalanceId, AccountId, AccountStatisticsId, AssetBitassetId, AssetDynamicId, AssetId,
    BlockSummaryId, CORE_ASSET, CallOrderId, CollateralBidId, CommitteeMemberId,
    DynamicGlobalPropertyId, ForceSettlementId, GlobalPropertyId, LimitOrderId, LiquidityPoolId,
    MAX_INSTANCE, ObjectId, ObjectTag, ProposalId, Space, TransactionDedupId, VestingBalanceId,
    WitnessId,
};
pub use operations::*;
pub use parameters::{
    CORE_PRECISION, ChainParameters, FeeSchedule, MAX_SIG_CHECK_DEPTH, MAX_UNDO_HISTORY,
    MIN_UNDO_HISTORY,
};
pub use price::{
    DEFAULT_MAINTENANCE_COLLATERAL_RATIO, DEFAULT_MAX_SHORT_SQUEEZE_RATIO, MAX_COLLATERAL_RATIO,
    MIN_COLLATERAL_RATIO, PERCENT_100, Price, PriceFeed, RATIO_DENOM,
};
pub use transaction::{SignedTransaction, TransactionDigest};

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{MeridianResult, ValidationError};

pub const MIN_ACCOUNT_NAME_LENGTH: usize = 3;
pub const MAX_ACCOUNT_NAME_LENGTH: usize = 63;

static ACCOUNT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]([a-z0-9-]*[a-z0-9])?(\.[a-z]([a-z0-9-]*[a-z0-9])?)*$").unwrap());

/// Validates an account name: 3..=63 chars, dot-separated labels of
/// lowercase letters, digits and single hyphens, each label starting with a
/// letter and not ending with a hyphen.
pub fn validate_account_name(name: &str) -> MeridianResult<()> {
    if !(MIN_ACCOUNT_NAME_LENGTH..=MAX_ACCOUNT_NAME_LENGTH).contains(&name.len())
        || !ACCOUNT_NAME_RE.is_match(name)
        || name.contains("--")
    {
        return Err(ValidationError::InvalidName(name.to_owned()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_name_grammar() {
        for ok in ["a-b", "abc.def", "alice", "a1-b2.c3"] {
            assert!(validate_account_name(ok).is_ok(), "{ok} should be valid");
        }
        for bad in ["a_b", "aaa..bbb", "1abc", ".abc", "a", "ab", "abc.", "a--b", "Abc"] {
            assert!(validate_account_name(bad).is_err(), "{bad} should be invalid");
        }
    }
}
