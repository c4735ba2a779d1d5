//! Shared helpers for the end-to-end consensus tests: a deterministic staker
//! identity, test chain constants bound to it, and block construction.

#![allow(dead_code)]

use blockstake_consensus::crypto::PublicKey;
use blockstake_consensus::inputlock::single_signature_unlock_hash;
use blockstake_consensus::{
    Block, BlockHeight, BlockStakeInput, BlockStakeOutput, BlockStakeOutputID, BlockStakeProof,
    ChainConstants, CoinOutput, ConsensusSet, Currency, InputLockProxy, InputLockRegistry,
    Transaction, UnlockKey,
};
use ed25519_dalek::SigningKey;

pub fn key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

pub fn staker() -> SigningKey {
    key(1)
}

/// Test constants with the genesis coinbase and blockstake owned by the
/// deterministic staker key.
pub fn constants() -> ChainConstants {
    let staker_pk = PublicKey::from_signing_key(&staker());
    ChainConstants {
        genesis_coin_unlock_hash: single_signature_unlock_hash(&staker_pk),
        genesis_blockstake_unlock_hash: single_signature_unlock_hash(&staker_pk),
        ..ChainConstants::testing()
    }
}

pub fn new_set(constants: &ChainConstants) -> ConsensusSet {
    ConsensusSet::new(constants.clone(), InputLockRegistry::standard())
}

/// Timestamp a block at `height` with `tweak` carries, kept deterministic so
/// competing branches differ only where the test wants them to.
pub fn block_timestamp(constants: &ChainConstants, height: BlockHeight, tweak: u64) -> u64 {
    constants.genesis_timestamp + height * 10 + tweak
}

/// Build a valid child of `parent`: the first transaction respends the
/// staked output back to the staker, `extra_txs` follow, and the miner
/// payout is exactly the subsidy plus collected fees.
pub fn make_block(
    constants: &ChainConstants,
    parent: &Block,
    height: BlockHeight,
    stake_id: BlockStakeOutputID,
    stake_value: Currency,
    tweak: u64,
    extra_txs: Vec<Transaction>,
) -> Block {
    let sk = staker();
    let pk = PublicKey::from_signing_key(&sk);
    let mut stake_tx = Transaction {
        version: constants.default_transaction_version,
        coin_inputs: Vec::new(),
        coin_outputs: Vec::new(),
        blockstake_inputs: vec![BlockStakeInput {
            parent_id: stake_id,
            unlocker: InputLockProxy::single_signature(pk.clone()),
        }],
        blockstake_outputs: vec![BlockStakeOutput {
            value: stake_value,
            unlock_hash: single_signature_unlock_hash(&pk),
        }],
        miner_fees: Vec::new(),
        arbitrary_data: tweak.to_le_bytes().to_vec(),
    };
    let unsigned = stake_tx.clone();
    stake_tx.blockstake_inputs[0]
        .unlocker
        .lock(
            unsigned.blockstake_input_index(0),
            &unsigned,
            0,
            &UnlockKey::SingleSignature(&sk),
        )
        .unwrap();

    let mut transactions = vec![stake_tx];
    transactions.extend(extra_txs);

    let mut fees = Currency::ZERO;
    for tx in &transactions {
        fees = fees.checked_add(tx.total_fee().unwrap()).unwrap();
    }

    Block {
        parent_id: parent.id(),
        timestamp: block_timestamp(constants, height, tweak),
        pobs: BlockStakeProof {
            parent_signature: parent.stake_signature(),
            stake_output_id: stake_id,
            stake_output_index: 0,
        },
        transactions,
        miner_payouts: vec![CoinOutput {
            value: constants.block_subsidy(height).checked_add(fees).unwrap(),
            unlock_hash: single_signature_unlock_hash(&pk),
        }],
    }
}

/// The blockstake output a block's stake transaction leaves behind, which
/// the next block must consume.
pub fn stake_of(block: &Block) -> BlockStakeOutputID {
    block.transactions[0].blockstake_output_id(0)
}

/// Extend the canonical chain with `count` minimal blocks, returning the
/// blocks built. Threads the stake output through automatically.
pub fn extend_chain(
    set: &ConsensusSet,
    constants: &ChainConstants,
    parent: &Block,
    start_height: BlockHeight,
    mut stake_id: BlockStakeOutputID,
    count: u64,
) -> Vec<Block> {
    let stake_value = constants.genesis_blockstake_count;
    let mut blocks = Vec::new();
    let mut parent = parent.clone();
    for i in 0..count {
        let block = make_block(
            constants,
            &parent,
            start_height + i,
            stake_id,
            stake_value,
            0,
            Vec::new(),
        );
        set.accept_block(block.clone()).unwrap();
        stake_id = stake_of(&block);
        parent = block.clone();
        blocks.push(block);
    }
    blocks
}
