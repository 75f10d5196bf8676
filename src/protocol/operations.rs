use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::EnumDiscriminants;

use crate::protocol::{
    AccountId, AssetAmount, AssetId, AssetOptions, Authority, BitassetOptions, ChainParameters,
    CommitteeMemberId, ForceSettlementId, LimitOrderId, LiquidityPoolId, Price, PriceFeed,
    ProposalId, PublicKey, Share, VestingBalanceId, WitnessId,
};

// ================================================================================================
// Payloads
// ================================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOperation {
    pub fee: AssetAmount,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: AssetAmount,
    /// Opaque encrypted memo; the core never interprets it.
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderCreateOperation {
    pub fee: AssetAmount,
    pub seller: AccountId,
    pub amount_to_sell: AssetAmount,
    pub min_to_receive: AssetAmount,
    pub expiration: DateTime<Utc>,
    pub fill_or_kill: bool,
}

impl LimitOrderCreateOperation {
    /// The price this order is willing to sell at.
    pub fn sell_price(&self) -> Price {
        Price::new(self.amount_to_sell, self.min_to_receive)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderCancelOperation {
    pub fee: AssetAmount,
    pub fee_paying_account: AccountId,
    pub order: LimitOrderId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOrderUpdateOperation {
    pub fee: AssetAmount,
    pub funding_account: AccountId,
    /// Collateral to add (positive) or withdraw (negative), in the backing
    /// asset.
    pub delta_collateral: AssetAmount,
    /// Debt to borrow (positive) or repay (negative), in the market-issued
    /// asset.
    pub delta_debt: AssetAmount,
    pub target_collateral_ratio: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetCreateOperation {
    pub fee: AssetAmount,
    pub issuer: AccountId,
    pub symbol: String,
    pub precision: u8,
    pub common_options: AssetOptions,
    pub bitasset_options: Option<BitassetOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetUpdateOperation {
    pub fee: AssetAmount,
    pub issuer: AccountId,
    pub asset_to_update: AssetId,
    pub new_options: AssetOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetUpdateIssuerOperation {
    pub fee: AssetAmount,
    pub issuer: AccountId,
    pub asset_to_update: AssetId,
    pub new_issuer: AccountId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetUpdateBitassetOperation {
    pub fee: AssetAmount,
    pub issuer: AccountId,
    pub asset_to_update: AssetId,
    pub new_options: BitassetOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetUpdateFeedProducersOperation {
    pub fee: AssetAmount,
    pub issuer: AccountId,
    pub asset_to_update: AssetId,
    pub new_feed_producers: BTreeSet<AccountId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPublishFeedOperation {
    pub fee: AssetAmount,
    pub publisher: AccountId,
    pub asset_id: AssetId,
    pub feed: PriceFeed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetIssueOperation {
    pub fee: AssetAmount,
    pub issuer: AccountId,
    pub asset_to_issue: AssetAmount,
    pub issue_to_account: AccountId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetReserveOperation {
    pub fee: AssetAmount,
    pub payer: AccountId,
    pub amount_to_reserve: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetFundFeePoolOperation {
    pub fee: AssetAmount,
    pub from_account: AccountId,
    pub asset_id: AssetId,
    /// Core-asset base units moved into the pool.
    pub amount: Share,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetClaimFeesOperation {
    pub fee: AssetAmount,
    pub issuer: AccountId,
    pub amount_to_claim: AssetAmount,
    /// Claim accumulated margin-call fees (denominated in the backing asset)
    /// instead of regular market fees.
    pub claim_from_collateral_fees: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetClaimPoolOperation {
    pub fee: AssetAmount,
    pub issuer: AccountId,
    pub asset_id: AssetId,
    /// Core-asset amount drawn back out of the fee pool.
    pub amount_to_claim: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSettleOperation {
    pub fee: AssetAmount,
    pub account: AccountId,
    pub amount: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetGlobalSettleOperation {
    pub fee: AssetAmount,
    pub issuer: AccountId,
    pub asset_to_settle: AssetId,
    pub settle_price: Price,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountCreateOperation {
    pub fee: AssetAmount,
    pub registrar: AccountId,
    pub referrer: AccountId,
    /// Share of the registrar's cut passed to the referrer, 1/10000.
    pub referrer_percent: u16,
    pub name: String,
    pub owner: Authority,
    pub active: Authority,
    pub memo_key: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountUpdateOperation {
    pub fee: AssetAmount,
    pub account: AccountId,
    pub owner: Option<Authority>,
    pub active: Option<Authority>,
    pub memo_key: Option<PublicKey>,
}

/// Bits for [`AccountWhitelistOperation::new_listing`].
pub mod listing {
    pub const NO_LISTING: u8 = 0;
    pub const WHITE_LISTED: u8 = 1;
    pub const BLACK_LISTED: u8 = 2;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountWhitelistOperation {
    pub fee: AssetAmount,
    pub authorizing_account: AccountId,
    pub account_to_list: AccountId,
    pub new_listing: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountUpgradeOperation {
    pub fee: AssetAmount,
    pub account_to_upgrade: AccountId,
    pub upgrade_to_lifetime_member: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTransferOperation {
    pub fee: AssetAmount,
    pub account_id: AccountId,
    pub new_owner: AccountId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalCreateOperation {
    pub fee: AssetAmount,
    pub fee_paying_account: AccountId,
    pub expiration_time: DateTime<Utc>,
    pub proposed_ops: Vec<Operation>,
    pub review_period_seconds: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalUpdateOperation {
    pub fee: AssetAmount,
    pub fee_paying_account: AccountId,
    pub proposal: ProposalId,
    pub active_approvals_to_add: BTreeSet<AccountId>,
    pub active_approvals_to_remove: BTreeSet<AccountId>,
    pub owner_approvals_to_add: BTreeSet<AccountId>,
    pub owner_approvals_to_remove: BTreeSet<AccountId>,
    pub key_approvals_to_add: BTreeSet<PublicKey>,
    pub key_approvals_to_remove: BTreeSet<PublicKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalDeleteOperation {
    pub fee: AssetAmount,
    pub fee_paying_account: AccountId,
    pub using_owner_authority: bool,
    pub proposal: ProposalId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawPermissionCreateOperation {
    pub fee: AssetAmount,
    pub withdraw_from_account: AccountId,
    pub authorized_account: AccountId,
    pub withdrawal_limit: AssetAmount,
    pub withdrawal_period_sec: u32,
    pub periods_until_expiration: u32,
    pub period_start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawPermissionUpdateOperation {
    pub fee: AssetAmount,
    pub withdraw_from_account: AccountId,
    pub authorized_account: AccountId,
    pub permission_to_update: u64,
    pub withdrawal_limit: AssetAmount,
    pub withdrawal_period_sec: u32,
    pub periods_until_expiration: u32,
    pub period_start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawPermissionClaimOperation {
    pub fee: AssetAmount,
    pub withdraw_permission: u64,
    pub withdraw_from_account: AccountId,
    pub withdraw_to_account: AccountId,
    pub amount_to_withdraw: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawPermissionDeleteOperation {
    pub fee: AssetAmount,
    pub withdraw_from_account: AccountId,
    pub authorized_account: AccountId,
    pub withdrawal_permission: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeMemberCreateOperation {
    pub fee: AssetAmount,
    pub committee_member_account: AccountId,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeMemberUpdateOperation {
    pub fee: AssetAmount,
    pub committee_member: CommitteeMemberId,
    pub committee_member_account: AccountId,
    pub new_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeMemberUpdateGlobalParametersOperation {
    pub fee: AssetAmount,
    pub new_parameters: ChainParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessCreateOperation {
    pub fee: AssetAmount,
    pub witness_account: AccountId,
    pub url: String,
    pub block_signing_key: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessUpdateOperation {
    pub fee: AssetAmount,
    pub witness: WitnessId,
    pub witness_account: AccountId,
    pub new_url: Option<String>,
    pub new_signing_key: Option<PublicKey>,
}

/// Linear vesting with an optional cliff, the only policy the core ships.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VestingPolicy {
    pub begin_timestamp: DateTime<Utc>,
    pub vesting_cliff_seconds: u32,
    pub vesting_duration_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VestingBalanceCreateOperation {
    pub fee: AssetAmount,
    pub creator: AccountId,
    pub owner: AccountId,
    pub amount: AssetAmount,
    pub policy: VestingPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VestingBalanceWithdrawOperation {
    pub fee: AssetAmount,
    pub vesting_balance: VestingBalanceId,
    pub owner: AccountId,
    pub amount: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerCreateOperation {
    pub fee: AssetAmount,
    pub owner: AccountId,
    pub work_begin_date: DateTime<Utc>,
    pub work_end_date: DateTime<Utc>,
    pub daily_pay: Share,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomOperation {
    pub fee: AssetAmount,
    pub payer: AccountId,
    pub required_auths: BTreeSet<AccountId>,
    pub id: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertOperation {
    pub fee: AssetAmount,
    pub fee_paying_account: AccountId,
    pub predicates: Vec<u8>,
    pub required_auths: BTreeSet<AccountId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceClaimOperation {
    pub fee: AssetAmount,
    pub deposit_to_account: AccountId,
    pub balance_owner_key: PublicKey,
    pub total_claimed: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideTransferOperation {
    pub fee: AssetAmount,
    pub issuer: AccountId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferToBlindOperation {
    pub fee: AssetAmount,
    pub amount: AssetAmount,
    pub from: AccountId,
    pub blinding_factor: Vec<u8>,
    pub outputs: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferFromBlindOperation {
    pub fee: AssetAmount,
    pub amount: AssetAmount,
    pub to: AccountId,
    pub blinding_factor: Vec<u8>,
    pub inputs: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlindTransferOperation {
    pub fee: AssetAmount,
    pub inputs: Vec<u8>,
    pub outputs: Vec<u8>,
}

/// Emitted by the core when a null feed freezes a pending settlement.
/// Never accepted inside a user transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSettleCancelOperation {
    pub fee: AssetAmount,
    pub settlement: ForceSettlementId,
    pub account: AccountId,
    pub amount: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbaDistributeOperation {
    pub fee: AssetAmount,
    pub account_id: AccountId,
    pub fba_id: u64,
    pub amount: Share,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPoolCreateOperation {
    pub fee: AssetAmount,
    pub account: AccountId,
    pub asset_a: AssetId,
    pub asset_b: AssetId,
    pub share_asset: AssetId,
    pub taker_fee_percent: u16,
    pub withdrawal_fee_percent: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPoolDeleteOperation {
    pub fee: AssetAmount,
    pub account: AccountId,
    pub pool: LiquidityPoolId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPoolDepositOperation {
    pub fee: AssetAmount,
    pub account: AccountId,
    pub pool: LiquidityPoolId,
    pub amount_a: AssetAmount,
    pub amount_b: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPoolWithdrawOperation {
    pub fee: AssetAmount,
    pub account: AccountId,
    pub pool: LiquidityPoolId,
    pub share_amount: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPoolExchangeOperation {
    pub fee: AssetAmount,
    pub account: AccountId,
    pub pool: LiquidityPoolId,
    pub amount_to_sell: AssetAmount,
    pub min_to_receive: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SametFundCreateOperation {
    pub fee: AssetAmount,
    pub owner_account: AccountId,
    pub asset_type: AssetId,
    pub balance: Share,
    pub fee_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SametFundDeleteOperation {
    pub fee: AssetAmount,
    pub owner_account: AccountId,
    pub fund_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SametFundUpdateOperation {
    pub fee: AssetAmount,
    pub owner_account: AccountId,
    pub fund_id: u64,
    pub delta_amount: Option<AssetAmount>,
    pub new_fee_rate: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SametFundBorrowOperation {
    pub fee: AssetAmount,
    pub borrower: AccountId,
    pub fund_id: u64,
    pub borrow_amount: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SametFundRepayOperation {
    pub fee: AssetAmount,
    pub account: AccountId,
    pub fund_id: u64,
    pub repay_amount: AssetAmount,
    pub fund_fee: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditOfferCreateOperation {
    pub fee: AssetAmount,
    pub owner_account: AccountId,
    pub asset_type: AssetId,
    pub balance: Share,
    pub fee_rate: u32,
    pub max_duration_seconds: u32,
    pub min_deal_amount: Share,
    pub auto_disable_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditOfferDeleteOperation {
    pub fee: AssetAmount,
    pub owner_account: AccountId,
    pub offer_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditOfferUpdateOperation {
    pub fee: AssetAmount,
    pub owner_account: AccountId,
    pub offer_id: u64,
    pub delta_amount: Option<AssetAmount>,
    pub fee_rate: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditOfferAcceptOperation {
    pub fee: AssetAmount,
    pub borrower: AccountId,
    pub offer_id: u64,
    pub borrow_amount: AssetAmount,
    pub collateral: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditDealRepayOperation {
    pub fee: AssetAmount,
    pub account: AccountId,
    pub deal_id: u64,
    pub repay_amount: AssetAmount,
    pub credit_fee: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtlcCreateOperation {
    pub fee: AssetAmount,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: AssetAmount,
    pub preimage_hash: Vec<u8>,
    pub preimage_size: u16,
    pub claim_period_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtlcRedeemOperation {
    pub fee: AssetAmount,
    pub htlc_id: u64,
    pub redeemer: AccountId,
    pub preimage: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtlcExtendOperation {
    pub fee: AssetAmount,
    pub htlc_id: u64,
    pub update_issuer: AccountId,
    pub seconds_to_add: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidCollateralOperation {
    pub fee: AssetAmount,
    pub bidder: AccountId,
    /// Collateral the bidder locks up, in the backing asset.
    pub additional_collateral: AssetAmount,
    /// Debt from the settlement fund the bidder offers to adopt.
    pub debt_covered: AssetAmount,
}

// ================================================================================================
// The union
// ================================================================================================

/// The stable tagged union of every operation kind.
///
/// Member order is frozen: the discriminant position is the wire tag
/// (`operation.which`) and must never change. New kinds append at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumDiscriminants)]
#[strum_discriminants(
    name(OperationTag),
    derive(
        PartialOrd,
        Ord,
        Hash,
        strum::EnumCount,
        strum::EnumIter,
        strum::Display,
        strum::IntoStaticStr,
        Serialize,
        Deserialize
    ),
    strum(serialize_all = "snake_case")
)]
pub enum Operation {
    Transfer(TransferOperation),
    LimitOrderCreate(LimitOrderCreateOperation),
    LimitOrderCancel(LimitOrderCancelOperation),
    CallOrderUpdate(CallOrderUpdateOperation),
    AssetCreate(AssetCreateOperation),
    AssetUpdate(AssetUpdateOperation),
    AssetUpdateIssuer(AssetUpdateIssuerOperation),
    AssetUpdateBitasset(AssetUpdateBitassetOperation),
    AssetUpdateFeedProducers(AssetUpdateFeedProducersOperation),
    AssetPublishFeed(AssetPublishFeedOperation),
    AssetIssue(AssetIssueOperation),
    AssetReserve(AssetReserveOperation),
    AssetFundFeePool(AssetFundFeePoolOperation),
    AssetClaimFees(AssetClaimFeesOperation),
    AssetClaimPool(AssetClaimPoolOperation),
    AssetSettle(AssetSettleOperation),
    AssetGlobalSettle(AssetGlobalSettleOperation),
    AccountCreate(AccountCreateOperation),
    AccountUpdate(AccountUpdateOperation),
    AccountWhitelist(AccountWhitelistOperation),
    AccountUpgrade(AccountUpgradeOperation),
    AccountTransfer(AccountTransferOperation),
    ProposalCreate(ProposalCreateOperation),
    ProposalUpdate(ProposalUpdateOperation),
    ProposalDelete(ProposalDeleteOperation),
    WithdrawPermissionCreate(WithdrawPermissionCreateOperation),
    WithdrawPermissionUpdate(WithdrawPermissionUpdateOperation),
    WithdrawPermissionClaim(WithdrawPermissionClaimOperation),
    WithdrawPermissionDelete(WithdrawPermissionDeleteOperation),
    CommitteeMemberCreate(CommitteeMemberCreateOperation),
    CommitteeMemberUpdate(CommitteeMemberUpdateOperation),
    CommitteeMemberUpdateGlobalParameters(CommitteeMemberUpdateGlobalParametersOperation),
    WitnessCreate(WitnessCreateOperation),
    WitnessUpdate(WitnessUpdateOperation),
    VestingBalanceCreate(VestingBalanceCreateOperation),
    VestingBalanceWithdraw(VestingBalanceWithdrawOperation),
    WorkerCreate(WorkerCreateOperation),
    Custom(CustomOperation),
    Assert(AssertOperation),
    BalanceClaim(BalanceClaimOperation),
    OverrideTransfer(OverrideTransferOperation),
    TransferToBlind(TransferToBlindOperation),
    TransferFromBlind(TransferFromBlindOperation),
    BlindTransfer(BlindTransferOperation),
    AssetSettleCancel(AssetSettleCancelOperation),
    FbaDistribute(FbaDistributeOperation),
    LiquidityPoolCreate(LiquidityPoolCreateOperation),
    LiquidityPoolDelete(LiquidityPoolDeleteOperation),
    LiquidityPoolDeposit(LiquidityPoolDepositOperation),
    LiquidityPoolWithdraw(LiquidityPoolWithdrawOperation),
    LiquidityPoolExchange(LiquidityPoolExchangeOperation),
    SametFundCreate(SametFundCreateOperation),
    SametFundDelete(SametFundDeleteOperation),
    SametFundUpdate(SametFundUpdateOperation),
    SametFundBorrow(SametFundBorrowOperation),
    SametFundRepay(SametFundRepayOperation),
    CreditOfferCreate(CreditOfferCreateOperation),
    CreditOfferDelete(CreditOfferDeleteOperation),
    CreditOfferUpdate(CreditOfferUpdateOperation),
    CreditOfferAccept(CreditOfferAcceptOperation),
    CreditDealRepay(CreditDealRepayOperation),
    HtlcCreate(HtlcCreateOperation),
    HtlcRedeem(HtlcRedeemOperation),
    HtlcExtend(HtlcExtendOperation),
    BidCollateral(BidCollateralOperation),
}

macro_rules! for_each_operation {
    ($self:expr, $op:ident => $body:expr) => {
        match $self {
            Operation::Transfer($op) => $body,
            Operation::LimitOrderCreate($op) => $body,
            Operation::LimitOrderCancel($op) => $body,
            Operation::CallOrderUpdate($op) => $body,
            Operation::AssetCreate($op) => $body,
            Operation::AssetUpdate($op) => $body,
            Operation::AssetUpdateIssuer($op) => $body,
            Operation::AssetUpdateBitasset($op) => $body,
            Operation::AssetUpdateFeedProducers($op) => $body,
            Operation::AssetPublishFeed($op) => $body,
            Operation::AssetIssue($op) => $body,
            Operation::AssetReserve($op) => $body,
            Operation::AssetFundFeePool($op) => $body,
            Operation::AssetClaimFees($op) => $body,
            Operation::AssetClaimPool($op) => $body,
            Operation::AssetSettle($op) => $body,
            Operation::AssetGlobalSettle($op) => $body,
            Operation::AccountCreate($op) => $body,
            Operation::AccountUpdate($op) => $body,
            Operation::AccountWhitelist($op) => $body,
            Operation::AccountUpgrade($op) => $body,
            Operation::AccountTransfer($op) => $body,
            Operation::ProposalCreate($op) => $body,
            Operation::ProposalUpdate($op) => $body,
            Operation::ProposalDelete($op) => $body,
            Operation::WithdrawPermissionCreate($op) => $body,
            Operation::WithdrawPermissionUpdate($op) => $body,
            Operation::WithdrawPermissionClaim($op) => $body,
            Operation::WithdrawPermissionDelete($op) => $body,
            Operation::CommitteeMemberCreate($op) => $body,
            Operation::CommitteeMemberUpdate($op) => $body,
            Operation::CommitteeMemberUpdateGlobalParameters($op) => $body,
            Operation::WitnessCreate($op) => $body,
            Operation::WitnessUpdate($op) => $body,
            Operation::VestingBalanceCreate($op) => $body,
            Operation::VestingBalanceWithdraw($op) => $body,
            Operation::WorkerCreate($op) => $body,
            Operation::Custom($op) => $body,
            Operation::Assert($op) => $body,
            Operation::BalanceClaim($op) => $body,
            Operation::OverrideTransfer($op) => $body,
            Operation::TransferToBlind($op) => $body,
            Operation::TransferFromBlind($op) => $body,
            Operation::BlindTransfer($op) => $body,
            Operation::AssetSettleCancel($op) => $body,
            Operation::FbaDistribute($op) => $body,
            Operation::LiquidityPoolCreate($op) => $body,
            Operation::LiquidityPoolDelete($op) => $body,
            Operation::LiquidityPoolDeposit($op) => $body,
            Operation::LiquidityPoolWithdraw($op) => $body,
            Operation::LiquidityPoolExchange($op) => $body,
            Operation::SametFundCreate($op) => $body,
            Operation::SametFundDelete($op) => $body,
            Operation::SametFundUpdate($op) => $body,
            Operation::SametFundBorrow($op) => $body,
            Operation::SametFundRepay($op) => $body,
            Operation::CreditOfferCreate($op) => $body,
            Operation::CreditOfferDelete($op) => $body,
            Operation::CreditOfferUpdate($op) => $body,
            Operation::CreditOfferAccept($op) => $body,
            Operation::CreditDealRepay($op) => $body,
            Operation::HtlcCreate($op) => $body,
            Operation::HtlcRedeem($op) => $body,
            Operation::HtlcExtend($op) => $body,
            Operation::BidCollateral($op) => $body,
        }
    };
}

impl Operation {
    pub fn tag(&self) -> OperationTag {
        OperationTag::from(self)
    }

    pub fn fee(&self) -> AssetAmount {
        for_each_operation!(self, op => op.fee)
    }

    pub fn set_fee(&mut self, fee: AssetAmount) {
        for_each_operation!(self, op => op.fee = fee)
    }

    /// The account debited for this operation's fee.
    pub fn fee_payer(&self) -> AccountId {
        match self {
            Operation::Transfer(op) => op.from,
            Operation::LimitOrderCreate(op) => op.seller,
            Operation::LimitOrderCancel(op) => op.fee_paying_account,
            Operation::CallOrderUpdate(op) => op.funding_account,
            Operation::AssetCreate(op) => op.issuer,
            Operation::AssetUpdate(op) => op.issuer,
            Operation::AssetUpdateIssuer(op) => op.issuer,
            Operation::AssetUpdateBitasset(op) => op.issuer,
            Operation::AssetUpdateFeedProducers(op) => op.issuer,
            Operation::AssetPublishFeed(op) => op.publisher,
            Operation::AssetIssue(op) => op.issuer,
            Operation::AssetReserve(op) => op.payer,
            Operation::AssetFundFeePool(op) => op.from_account,
            Operation::AssetClaimFees(op) => op.issuer,
            Operation::AssetClaimPool(op) => op.issuer,
            Operation::AssetSettle(op) => op.account,
            Operation::AssetGlobalSettle(op) => op.issuer,
            Operation::AccountCreate(op) => op.registrar,
            Operation::AccountUpdate(op) => op.account,
            Operation::AccountWhitelist(op) => op.authorizing_account,
            Operation::AccountUpgrade(op) => op.account_to_upgrade,
            Operation::AccountTransfer(op) => op.account_id,
            Operation::ProposalCreate(op) => op.fee_paying_account,
            Operation::ProposalUpdate(op) => op.fee_paying_account,
            Operation::ProposalDelete(op) => op.fee_paying_account,
            Operation::WithdrawPermissionCreate(op) => op.withdraw_from_account,
            Operation::WithdrawPermissionUpdate(op) => op.withdraw_from_account,
            Operation::WithdrawPermissionClaim(op) => op.withdraw_to_account,
            Operation::WithdrawPermissionDelete(op) => op.withdraw_from_account,
            Operation::CommitteeMemberCreate(op) => op.committee_member_account,
            Operation::CommitteeMemberUpdate(op) => op.committee_member_account,
            Operation::CommitteeMemberUpdateGlobalParameters(_) => special_accounts::COMMITTEE,
            Operation::WitnessCreate(op) => op.witness_account,
            Operation::WitnessUpdate(op) => op.witness_account,
            Operation::VestingBalanceCreate(op) => op.creator,
            Operation::VestingBalanceWithdraw(op) => op.owner,
            Operation::WorkerCreate(op) => op.owner,
            Operation::Custom(op) => op.payer,
            Operation::Assert(op) => op.fee_paying_account,
            Operation::BalanceClaim(op) => op.deposit_to_account,
            Operation::OverrideTransfer(op) => op.issuer,
            Operation::TransferToBlind(op) => op.from,
            Operation::TransferFromBlind(op) => op.to,
            Operation::BlindTransfer(_) => special_accounts::TEMP,
            Operation::AssetSettleCancel(op) => op.account,
            Operation::FbaDistribute(op) => op.account_id,
            Operation::LiquidityPoolCreate(op) => op.account,
            Operation::LiquidityPoolDelete(op) => op.account,
            Operation::LiquidityPoolDeposit(op) => op.account,
            Operation::LiquidityPoolWithdraw(op) => op.account,
            Operation::LiquidityPoolExchange(op) => op.account,
            Operation::SametFundCreate(op) => op.owner_account,
            Operation::SametFundDelete(op) => op.owner_account,
            Operation::SametFundUpdate(op) => op.owner_account,
            Operation::SametFundBorrow(op) => op.borrower,
            Operation::SametFundRepay(op) => op.account,
            Operation::CreditOfferCreate(op) => op.owner_account,
            Operation::CreditOfferDelete(op) => op.owner_account,
            Operation::CreditOfferUpdate(op) => op.owner_account,
            Operation::CreditOfferAccept(op) => op.borrower,
            Operation::CreditDealRepay(op) => op.account,
            Operation::HtlcCreate(op) => op.from,
            Operation::HtlcRedeem(op) => op.redeemer,
            Operation::HtlcExtend(op) => op.update_issuer,
            Operation::BidCollateral(op) => op.bidder,
        }
    }

    /// Accounts whose authorities this operation requires, split into
    /// active- and owner-level sets. Most operations need only the fee
    /// payer's active authority.
    pub fn required_authorities(
        &self,
        active: &mut SmallVec<[AccountId; 4]>,
        owner: &mut SmallVec<[AccountId; 2]>,
    ) {
        match self {
            Operation::AccountUpdate(op) => {
                if op.owner.is_some() {
                    owner.push(op.account);
                } else {
                    active.push(op.account);
                }
            }
            Operation::AccountTransfer(op) => owner.push(op.account_id),
            Operation::AssetUpdateIssuer(op) => owner.push(op.issuer),
            Operation::ProposalDelete(op) => {
                if op.using_owner_authority {
                    owner.push(op.fee_paying_account);
                } else {
                    active.push(op.fee_paying_account);
                }
            }
            Operation::ProposalUpdate(op) => {
                // Adding approvals needs the approving accounts themselves;
                // the fee payer merely pays.
                active.push(op.fee_paying_account);
                active.extend(op.active_approvals_to_add.iter().copied());
                active.extend(op.active_approvals_to_remove.iter().copied());
                owner.extend(op.owner_approvals_to_add.iter().copied());
                owner.extend(op.owner_approvals_to_remove.iter().copied());
            }
            Operation::Custom(op) => {
                active.extend(op.required_auths.iter().copied());
                active.push(op.payer);
            }
            _ => active.push(self.fee_payer()),
        }
    }

    /// Serialized size in bytes, used for per-kbyte fees and block limits.
    pub fn serialized_size(&self) -> usize {
        postcard::to_allocvec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// Instances of accounts created at genesis with reserved ids.
pub mod special_accounts {
    use crate::protocol::AccountId;

    /// Controlled by the active committee members collectively.
    pub const COMMITTEE: AccountId = AccountId(0);
    /// Controlled by the active witnesses collectively.
    pub const WITNESSES: AccountId = AccountId(1);
    /// Sink for destroyed funds; may never transact.
    pub const NULL: AccountId = AccountId(2);
    /// Ownerless intermediary for multi-step operations.
    pub const TEMP: AccountId = AccountId(3);
    /// Number of reserved instances.
    pub const COUNT: u64 = 4;
}
