use thiserror::Error;

use crate::protocol::{AccountId, AssetId, ObjectId, OperationTag};

pub type MeridianResult<T> = Result<T, MeridianError>;

#[derive(Debug, Error)]
pub enum MeridianError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    #[error(transparent)]
    Market(#[from] MarketError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl MeridianError {
    /// Whether the error must abort the whole block rather than just the
    /// enclosing transaction.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MeridianError::Chain(_))
    }
}

/// Rejections of malformed input, before any state is consulted.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid asset symbol: '{0}'")]
    InvalidSymbol(String),

    #[error("Invalid account name: '{0}'")]
    InvalidName(String),

    #[error("Invalid asset precision: {0}")]
    InvalidPrecision(u8),

    #[error("Percentage out of range for {field}: {value}")]
    PercentageOutOfRange { field: &'static str, value: u16 },

    #[error("Collateral ratio out of range for {field}: {value}")]
    RatioOutOfRange { field: &'static str, value: u16 },

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("Transaction expired at {expiration} (head time {head_time})")]
    ExpiredTransaction {
        expiration: chrono::DateTime<chrono::Utc>,
        head_time: chrono::DateTime<chrono::Utc>,
    },

    #[error("Transaction expiration too far in the future")]
    ExpirationTooFarInFuture,

    #[error("Transaction of {size} bytes exceeds maximum of {max}")]
    OversizedTransaction { size: usize, max: usize },

    #[error("Transaction contains no operations")]
    EmptyTransaction,

    #[error("Transaction anchor does not match a recent block")]
    TaposAnchorMismatch,

    #[error("Duplicate transaction")]
    DuplicateTransaction,

    #[error("Operation '{0}' is not supported by this node")]
    UnsupportedOperation(OperationTag),

    #[error("Operation '{0}' may not appear in a user transaction")]
    InternalOperation(OperationTag),

    #[error("Invalid operation field {field}: {reason}")]
    InvalidOperation {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("Missing active authority of account {0}")]
    MissingActiveAuthority(AccountId),

    #[error("Missing owner authority of account {0}")]
    MissingOwnerAuthority(AccountId),

    #[error("Transaction carries a signature that is not required by any operation")]
    IrrelevantSignature,

    #[error("Authority resolution exceeded the maximum recursion depth")]
    ExcessiveSignatureDepth,

    #[error("Authority is impossible to satisfy")]
    ImpossibleAuthority,

    #[error("Only the committee account may propose this operation")]
    CommitteeProposalOnly,
}

/// Preconditions on existing chain state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Unknown object {0}")]
    UnknownObject(ObjectId),

    #[error("Unknown account '{0}'")]
    UnknownAccountName(String),

    #[error("Asset symbol '{0}' already registered")]
    SymbolTaken(String),

    #[error("Account name '{0}' already registered")]
    NameTaken(String),

    #[error("Asset type mismatch: expected {expected}, got {got}")]
    AssetTypeMismatch { expected: AssetId, got: AssetId },

    #[error("Insufficient balance: {required} of asset {asset} required, {available} available")]
    InsufficientBalance {
        asset: AssetId,
        required: i64,
        available: i64,
    },

    #[error("Insufficient fee: {required} required, {provided} provided")]
    InsufficientFee { required: i64, provided: i64 },

    #[error("Fee pool of asset {asset} cannot cover {required} of core")]
    InsufficientFeePool { asset: AssetId, required: i64 },

    #[error("Insufficient collateral for the resulting debt position")]
    InsufficientCollateral,

    #[error("Asset {0} has fewer price feeds than it requires")]
    InsufficientFeeds(AssetId),

    #[error("Price out of permitted range")]
    PriceOutOfRange,

    #[error("Account {account} is not authorized to transact in asset {asset}")]
    UnauthorizedByWhitelist { account: AccountId, asset: AssetId },

    #[error("Market between {0} and {1} is not whitelisted for this asset")]
    MarketNotWhitelisted(AssetId, AssetId),

    #[error("Operation requires issuer {expected}, got account {got}")]
    NotIssuer { expected: AccountId, got: AccountId },

    #[error("Precondition failed: {0}")]
    Precondition(&'static str),
}

/// Integer arithmetic violations. These always reject the operation; the
/// engine never wraps.
#[derive(Debug, Error)]
pub enum ArithmeticError {
    #[error("Integer overflow in {0}")]
    Overflow(&'static str),

    #[error("Integer underflow in {0}")]
    Underflow(&'static str),

    #[error("Division by zero in {0}")]
    DivisionByZero(&'static str),

    #[error("Price multiplication produced an undefined result")]
    PriceUndefined,

    #[error("Resulting amount exceeds the maximum share supply")]
    AmountOutOfRange,
}

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("Updated position would be margin called immediately")]
    OrderWouldBeMarginCalled,

    #[error("Executing the order would trigger a black swan")]
    BlackSwanWouldOccur,

    #[error("Asset {0} is globally settled; no new positions or feeds")]
    GloballySettled(AssetId),

    #[error("Asset {0} is not globally settled")]
    NotGloballySettled(AssetId),

    #[error("Fill-or-kill order could not be completely filled")]
    FillOrKillUnfilled,

    #[error("Force settlement is disabled for asset {0}")]
    ForceSettleDisabled(AssetId),

    #[error("Exchanging with the pool cannot satisfy min_to_receive")]
    PoolPriceMismatch,

    #[error("Liquidity pool is not yet initialized")]
    PoolUninitialized,

    #[error("Liquidity pool must be empty to be deleted")]
    PoolNotEmpty,
}

/// Fatal conditions: chain corruption or misuse of the block interface.
/// These abort the enclosing block and leave the store at the pre-block
/// state.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Unknown block {0}")]
    UnknownBlock(String),

    #[error("Block does not link to the current head")]
    UnlinkableBlock,

    #[error("Wrong chain id")]
    WrongChainId,

    #[error("Block number {got} does not follow head {head}")]
    NonMonotonicBlock { head: u32, got: u32 },

    #[error("Block timestamp must be later than the head block and slot aligned")]
    InvalidTimestamp,

    #[error("Block signed by {got}, but the slot belongs to {scheduled}")]
    WrongWitness { scheduled: ObjectId, got: ObjectId },

    #[error("Witness signature verification failed")]
    InvalidWitnessSignature,

    #[error("Merkle root does not match the block's transactions")]
    BadMerkleRoot,

    #[error("Cannot pop a block beyond the undo history")]
    PopBeyondUndoHistory,

    #[error("Snapshot is corrupt: {0}")]
    SnapshotCorrupt(String),

    #[error("Snapshot section digest mismatch for table '{0}'")]
    SnapshotDigestMismatch(&'static str),
}
