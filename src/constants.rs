//! Chain constants, configured once at startup.
//!
//! The consensus core takes all chain parameters as a value handed to it at
//! construction instead of reading package-level globals, so one process can
//! host differently parameterized networks (mainnet, testnet, local devnet)
//! side by side.

use crate::block::{Block, BlockStakeProof};
use crate::currency::Currency;
use crate::inputlock::UnlockHash;
use crate::target::{BlockDepth, Target};
use crate::transaction::{BlockStakeOutput, CoinOutput, Transaction};
use crate::types::{BlockHeight, Timestamp};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ChainConstants {
    /// Timestamp of the genesis block.
    pub genesis_timestamp: Timestamp,
    /// Owner of the genesis miner payout.
    pub genesis_coin_unlock_hash: UnlockHash,
    /// Owner of the initial blockstake supply.
    pub genesis_blockstake_unlock_hash: UnlockHash,
    /// Total blockstake minted at genesis. Blockstake is never created after
    /// height 0; it only changes hands.
    pub genesis_blockstake_count: Currency,

    /// Expected seconds between blocks; drives retargeting.
    pub block_frequency: u64,
    /// Blocks before a miner payout becomes spendable.
    pub maturity_delay: BlockHeight,
    /// Number of trailing ancestors whose median bounds a block timestamp
    /// from below.
    pub median_timestamp_window: usize,
    /// Seconds a block timestamp may run ahead of local wall-clock time.
    pub future_threshold: u64,
    /// Number of trailing blocks the retargeting ratio is measured over.
    pub target_window: BlockHeight,

    /// Target assigned to the genesis block.
    pub root_target: Target,
    /// Cumulative depth assigned to the genesis block.
    pub root_depth: BlockDepth,

    /// Subsidy paid by the block at height 0; halves every
    /// `subsidy_halving_interval` blocks thereafter.
    pub initial_block_subsidy: Currency,
    /// Halving interval in blocks; 0 disables halving.
    pub subsidy_halving_interval: BlockHeight,

    /// Smallest miner fee a transaction may pay.
    pub minimum_miner_fee: Currency,
    /// The only transaction version this chain currently accepts.
    pub default_transaction_version: u8,

    /// Holding the read lock longer than this is reported in debug builds.
    pub read_lock_warn_threshold: Duration,
}

impl ChainConstants {
    /// Subsidy for the block at `height`.
    pub fn block_subsidy(&self, height: BlockHeight) -> Currency {
        if self.subsidy_halving_interval == 0 {
            return self.initial_block_subsidy;
        }
        let halvings = height / self.subsidy_halving_interval;
        if halvings >= 256 {
            return Currency::ZERO;
        }
        Currency::from_u256(self.initial_block_subsidy.as_u256() >> halvings)
    }

    /// The genesis block implied by these constants. Seeded directly into the
    /// consensus set at construction; it is never validated.
    pub fn genesis_block(&self) -> Block {
        Block {
            parent_id: Default::default(),
            timestamp: self.genesis_timestamp,
            pobs: BlockStakeProof::default(),
            transactions: vec![Transaction {
                version: self.default_transaction_version,
                coin_inputs: Vec::new(),
                coin_outputs: Vec::new(),
                blockstake_inputs: Vec::new(),
                blockstake_outputs: vec![BlockStakeOutput {
                    value: self.genesis_blockstake_count,
                    unlock_hash: self.genesis_blockstake_unlock_hash,
                }],
                miner_fees: Vec::new(),
                arbitrary_data: Vec::new(),
            }],
            miner_payouts: vec![CoinOutput {
                value: self.block_subsidy(0),
                unlock_hash: self.genesis_coin_unlock_hash,
            }],
        }
    }

    /// Mainnet-shaped defaults.
    pub fn standard() -> ChainConstants {
        ChainConstants {
            genesis_timestamp: 1_500_000_000,
            genesis_coin_unlock_hash: UnlockHash::nil(),
            genesis_blockstake_unlock_hash: UnlockHash::nil(),
            genesis_blockstake_count: Currency::from_u64(1_000_000),
            block_frequency: 600,
            maturity_delay: 144,
            median_timestamp_window: 11,
            future_threshold: 3 * 3600,
            target_window: 1_000,
            root_target: Target::from_u256(primitive_types::U256::MAX >> 32),
            root_depth: BlockDepth::ZERO,
            initial_block_subsidy: Currency::from_u64(10_000_000_000),
            subsidy_halving_interval: 0,
            minimum_miner_fee: Currency::from_u64(10),
            default_transaction_version: 1,
            read_lock_warn_threshold: Duration::from_secs(1),
        }
    }

    /// Fast parameters for tests: trivial target, short maturity, and a
    /// future threshold wide enough that historical fixture timestamps pass.
    pub fn testing() -> ChainConstants {
        ChainConstants {
            genesis_timestamp: 1_500_000_000,
            genesis_blockstake_count: Currency::from_u64(1_000),
            block_frequency: 1,
            maturity_delay: 3,
            median_timestamp_window: 3,
            future_threshold: u64::MAX / 2,
            target_window: 10,
            root_target: Target::max(),
            minimum_miner_fee: Currency::from_u64(1),
            ..ChainConstants::standard()
        }
    }
}

impl Default for ChainConstants {
    fn default() -> ChainConstants {
        ChainConstants::standard()
    }
}
