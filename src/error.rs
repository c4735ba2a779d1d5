//! Error types for the consensus core.

use thiserror::Error;

/// Top-level error taxonomy. Structural and semantic rejections mark the
/// offending block as known-bad; `Orphan` does not. `Fatal` means the ledger
/// itself is inconsistent and the embedding process should abort.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("structural check failed: {0}")]
    Structural(#[from] StructuralError),

    #[error("transaction rejected: {0}")]
    Transaction(#[from] TransactionError),

    #[error("block rejected: {0}")]
    Block(#[from] BlockError),

    /// The block's parent is not in the consensus set. Not a rejection: the
    /// caller is expected to fetch the missing ancestors and resubmit.
    #[error("parent block unknown")]
    Orphan,

    /// The block ID is in the permanent bad-block set; no validation work was
    /// performed.
    #[error("block is known to be invalid")]
    KnownBad,

    /// The block is already part of the consensus set. Not marked bad.
    #[error("block already known")]
    DuplicateBlock,

    /// A ledger invariant was violated while applying or rewinding a block.
    /// State may be corrupt; callers must not mask this.
    #[error("ledger invariant violated: {0}")]
    Fatal(String),
}

/// Encoding-level and shape-level failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("trailing bytes after canonical object")]
    TrailingBytes,

    #[error("length prefix {0} exceeds remaining input")]
    LengthOutOfBounds(u64),

    #[error("{0} exceeds its size bound")]
    Oversize(&'static str),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("unsupported transaction version {0}")]
    UnknownVersion(u8),

    #[error("currency encoding wider than 32 bytes")]
    CurrencyTooWide,
}

/// Per-transaction semantic failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("spent coin output {0} is not in the unspent set")]
    UnknownCoinOutput(String),

    #[error("spent blockstake output {0} is not in the unspent set")]
    UnknownBlockStakeOutput(String),

    #[error("coin inputs do not equal coin outputs plus miner fees")]
    CoinSumMismatch,

    #[error("blockstake inputs do not equal blockstake outputs")]
    BlockStakeSumMismatch,

    #[error("output {0} is spent more than once within one block")]
    DoubleSpend(String),

    #[error("arithmetic overflow while summing currency values")]
    CurrencyOverflow,

    #[error("invalid pre-image sha256")]
    InvalidPreImage,

    #[error("invalid input redeemer")]
    InvalidRedeemer,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("entropy keys cannot sign")]
    EntropyKey,

    #[error("unlock condition does not match the spent output's unlock hash")]
    UnlockHashMismatch,

    #[error("unlock condition is already locked")]
    AlreadyLocked,

    #[error("nil input lock cannot be used")]
    NilInputLock,

    #[error("unknown input lock")]
    UnknownInputLock,

    #[error("invalid public key size in transaction")]
    InvalidPublicKeySize,

    #[error("invalid signature size in transaction")]
    InvalidSignatureSize,

    #[error("unrecognized public key algorithm in transaction")]
    UnknownSignatureAlgorithm,

    #[error("miner fee below the configured minimum")]
    FeeTooSmall,

    #[error("atomic swap contract expired already")]
    SwapExpired,

    #[error("atomic swap contract not yet expired")]
    SwapNotExpired,

    #[error("cannot lock with the given key type")]
    WrongKeyType,
}

/// Per-block semantic failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("block timestamp is not above the median of recent ancestors")]
    EarlyTimestamp,

    #[error("block timestamp too far in the future")]
    FutureTimestamp,

    #[error("staked output {0} is not in the unspent set")]
    UnknownStakeOutput(String),

    #[error("stake proof does not match the first transaction's blockstake input")]
    StakeProofMismatch,

    #[error("stake proof signature does not match the parent block")]
    StakeSignatureMismatch,

    #[error("stake proof hash does not meet the target")]
    InvalidStakeProof,

    #[error("block has no transactions")]
    NoTransactions,

    #[error("miner payouts do not equal block subsidy plus fees")]
    PayoutMismatch,
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
