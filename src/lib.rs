//! # blockstake-consensus
//!
//! The consensus core of a proof-of-blockstake chain: a state machine that
//! accepts blocks, maintains a tree of competing forks, selects the heaviest
//! chain by accumulated work, applies reorganizations atomically, and
//! enforces transaction validity against an unspent-output set guarded by
//! pluggable input locks.
//!
//! ## Architecture
//!
//! - [`ConsensusSet`] is the public, thread-safe entry point: submit blocks,
//!   query the canonical chain and unspent outputs, subscribe to changes.
//! - Block authorship is proven by stake: spending a blockstake output whose
//!   proof hash falls below the active target scaled by the staked value.
//! - Outputs are owned by unlock hashes; spending requires a condition and
//!   fulfillment pair. Unknown lock types round-trip byte-identically so new
//!   types can be introduced by soft fork.
//! - Every applied block leaves a diff on its tree node, so a reorganization
//!   rewinds exactly, without re-running validation of the abandoned branch.
//!
//! ## Usage
//!
//! ```rust
//! use blockstake_consensus::{ChainConstants, ConsensusSet, InputLockRegistry};
//!
//! let set = ConsensusSet::new(ChainConstants::testing(), InputLockRegistry::standard());
//! let (tip, height) = set.tip();
//! assert_eq!(height, 0);
//! let checksum = set.consensus_checksum();
//! # let _ = (tip, checksum);
//! ```

pub mod block;
pub mod constants;
pub mod crypto;
pub mod currency;
pub mod encoding;
pub mod error;
pub mod forktree;
pub mod inputlock;
pub mod ledger;
pub mod state;
pub mod subscribe;
pub mod target;
pub mod transaction;
pub mod types;

pub use block::{Block, BlockStakeProof};
pub use constants::ChainConstants;
pub use currency::Currency;
pub use error::{BlockError, ConsensusError, Result, StructuralError, TransactionError};
pub use inputlock::{
    AtomicSwapClaimKey, AtomicSwapCondition, AtomicSwapHashedSecret, AtomicSwapRefundKey,
    AtomicSwapSecret, InputLockProxy, InputLockRegistry, UnlockHash, UnlockKey, UnlockType,
};
pub use ledger::BlockDiff;
pub use state::{ConsensusSet, ConsensusState, ConsensusSubscription};
pub use subscribe::{ConsensusChange, SubscriptionToken};
pub use target::Target;
pub use transaction::{
    BlockStakeInput, BlockStakeOutput, CoinInput, CoinOutput, Transaction,
};
pub use types::{
    BlockHeight, BlockID, BlockStakeOutputID, CoinOutputID, FileContractID, OutputID, Timestamp,
    TransactionID,
};
