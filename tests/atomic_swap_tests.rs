//! End-to-end atomic swap scenarios: a contract output funded on chain, then
//! claimed by the receiver with the secret, or refunded by the sender after
//! the deadline. The contract clock is the block timestamp, so the branch
//! taken is fully deterministic.

mod common;

use blockstake_consensus::crypto::PublicKey;
use blockstake_consensus::inputlock::single_signature_unlock_hash;
use blockstake_consensus::{
    AtomicSwapClaimKey, AtomicSwapCondition, AtomicSwapRefundKey, AtomicSwapSecret, Block,
    ChainConstants, CoinInput, CoinOutput, ConsensusError, ConsensusSet, Currency,
    InputLockProxy, Transaction, TransactionError, UnlockKey,
};
use common::*;

struct SwapFixture {
    set: ConsensusSet,
    constants: ChainConstants,
    /// Block funding the contract; its first extra transaction's output 0 is
    /// the contract output.
    funding_block: Block,
    funding_tx: Transaction,
    condition: AtomicSwapCondition,
    secret: AtomicSwapSecret,
}

/// Fund a contract output of the genesis coinbase value minus fee, locked by
/// an atomic swap between the staker (sender) and `key(2)` (receiver),
/// expiring at `timelock`.
fn fund_swap(timelock: u64) -> SwapFixture {
    let constants = constants();
    let set = new_set(&constants);
    let genesis = constants.genesis_block();
    let sender_sk = staker();
    let sender_pk = PublicKey::from_signing_key(&sender_sk);
    let receiver_pk = PublicKey::from_signing_key(&key(2));

    let secret = AtomicSwapSecret([0x5e; 32]);
    let condition = AtomicSwapCondition {
        sender: single_signature_unlock_hash(&sender_pk),
        receiver: single_signature_unlock_hash(&receiver_pk),
        hashed_secret: secret.hashed(),
        timelock,
    };

    let contract_value = constants
        .block_subsidy(0)
        .checked_sub(Currency::from_u64(1))
        .unwrap();
    let mut funding_tx = Transaction {
        version: constants.default_transaction_version,
        coin_inputs: vec![CoinInput {
            parent_id: genesis.miner_payout_id(0),
            unlocker: InputLockProxy::single_signature(sender_pk),
        }],
        coin_outputs: vec![CoinOutput {
            value: contract_value,
            unlock_hash: InputLockProxy::atomic_swap(condition.clone()).unlock_hash(),
        }],
        blockstake_inputs: Vec::new(),
        blockstake_outputs: Vec::new(),
        miner_fees: vec![Currency::from_u64(1)],
        arbitrary_data: Vec::new(),
    };
    let unsigned = funding_tx.clone();
    funding_tx.coin_inputs[0]
        .unlocker
        .lock(0, &unsigned, 0, &UnlockKey::SingleSignature(&sender_sk))
        .unwrap();

    let funding_block = make_block(
        &constants,
        &genesis,
        1,
        stake_of(&genesis),
        constants.genesis_blockstake_count,
        0,
        vec![funding_tx.clone()],
    );
    set.accept_block(funding_block.clone()).unwrap();

    SwapFixture {
        set,
        constants,
        funding_block,
        funding_tx,
        condition,
        secret,
    }
}

/// Transaction redeeming the contract output with the given locked proxy.
fn redeem_tx(fixture: &SwapFixture, lock_now: u64, swap_key: &UnlockKey<'_>) -> Result<Transaction, ConsensusError> {
    let contract_value = fixture.funding_tx.coin_outputs[0].value;
    let mut tx = Transaction {
        version: fixture.constants.default_transaction_version,
        coin_inputs: vec![CoinInput {
            parent_id: fixture.funding_tx.coin_output_id(0),
            unlocker: InputLockProxy::atomic_swap(fixture.condition.clone()),
        }],
        coin_outputs: vec![CoinOutput {
            value: contract_value.checked_sub(Currency::from_u64(1)).unwrap(),
            unlock_hash: fixture.condition.receiver,
        }],
        blockstake_inputs: Vec::new(),
        blockstake_outputs: Vec::new(),
        miner_fees: vec![Currency::from_u64(1)],
        arbitrary_data: Vec::new(),
    };
    let unsigned = tx.clone();
    tx.coin_inputs[0].unlocker.lock(0, &unsigned, lock_now, swap_key)?;
    Ok(tx)
}

#[test]
fn test_claim_with_correct_secret() {
    // Claim happens in block 2 (timestamp well below the deadline).
    let fixture = fund_swap(1_500_000_000 + 1_000);
    let receiver_sk = key(2);
    let claim = AtomicSwapClaimKey {
        public_key: PublicKey::from_signing_key(&receiver_sk),
        secret_key: receiver_sk,
        secret: fixture.secret,
    };
    let claim_time = block_timestamp(&fixture.constants, 2, 0);
    let tx = redeem_tx(&fixture, claim_time, &UnlockKey::AtomicSwapClaim(&claim)).unwrap();

    let block2 = make_block(
        &fixture.constants,
        &fixture.funding_block,
        2,
        stake_of(&fixture.funding_block),
        fixture.constants.genesis_blockstake_count,
        0,
        vec![tx.clone()],
    );
    fixture.set.accept_block(block2).unwrap();

    // The receiver now owns the redeemed value.
    let redeemed = fixture.set.coin_output(&tx.coin_output_id(0)).unwrap();
    assert_eq!(redeemed.unlock_hash, fixture.condition.receiver);
    assert!(fixture
        .set
        .coin_output(&fixture.funding_tx.coin_output_id(0))
        .is_none());
}

#[test]
fn test_claim_with_wrong_secret_rejected() {
    let fixture = fund_swap(1_500_000_000 + 1_000);
    let receiver_sk = key(2);
    let claim = AtomicSwapClaimKey {
        public_key: PublicKey::from_signing_key(&receiver_sk),
        secret_key: receiver_sk,
        secret: AtomicSwapSecret([0xbd; 32]),
    };
    let claim_time = block_timestamp(&fixture.constants, 2, 0);
    // The lock helper refuses a secret that does not hash to the contract.
    let err = redeem_tx(&fixture, claim_time, &UnlockKey::AtomicSwapClaim(&claim)).unwrap_err();
    assert_eq!(
        err,
        ConsensusError::Transaction(TransactionError::InvalidPreImage)
    );

    // A hand-crafted fulfillment carrying the wrong secret is rejected by
    // consensus with the same error.
    let secret = AtomicSwapSecret([0xbd; 32]);
    let contract_value = fixture.funding_tx.coin_outputs[0].value;
    let mut tx = Transaction {
        version: fixture.constants.default_transaction_version,
        coin_inputs: vec![CoinInput {
            parent_id: fixture.funding_tx.coin_output_id(0),
            unlocker: InputLockProxy::atomic_swap(fixture.condition.clone()),
        }],
        coin_outputs: vec![CoinOutput {
            value: contract_value.checked_sub(Currency::from_u64(1)).unwrap(),
            unlock_hash: fixture.condition.receiver,
        }],
        blockstake_inputs: Vec::new(),
        blockstake_outputs: Vec::new(),
        miner_fees: vec![Currency::from_u64(1)],
        arbitrary_data: Vec::new(),
    };
    // The signature hash ignores fulfillments, so it can be computed before
    // the fulfillment is filled in.
    let sig_hash = tx.input_sig_hash(0, &[&secret.0]);
    if let InputLockProxy::AtomicSwap(swap) = &mut tx.coin_inputs[0].unlocker {
        let receiver_sk = key(2);
        swap.fulfillment.public_key = PublicKey::from_signing_key(&receiver_sk);
        swap.fulfillment.secret = secret;
        swap.fulfillment.signature = blockstake_consensus::crypto::sign_hash(
            &swap.fulfillment.public_key,
            &receiver_sk,
            &sig_hash,
        )
        .unwrap();
    }

    let block2 = make_block(
        &fixture.constants,
        &fixture.funding_block,
        2,
        stake_of(&fixture.funding_block),
        fixture.constants.genesis_blockstake_count,
        0,
        vec![tx],
    );
    let err = fixture.set.accept_block(block2).unwrap_err();
    assert_eq!(
        err,
        ConsensusError::Transaction(TransactionError::InvalidPreImage)
    );
}

#[test]
fn test_refund_after_deadline() {
    // Deadline before block 2's timestamp: the contract is expired on chain.
    let deadline = 1_500_000_000 + 15;
    let fixture = fund_swap(deadline);
    let sender_sk = staker();
    let refund = AtomicSwapRefundKey {
        public_key: PublicKey::from_signing_key(&sender_sk),
        secret_key: sender_sk,
    };
    let refund_time = block_timestamp(&fixture.constants, 2, 0);
    assert!(refund_time > deadline);
    let tx = redeem_tx(&fixture, refund_time, &UnlockKey::AtomicSwapRefund(&refund)).unwrap();

    let block2 = make_block(
        &fixture.constants,
        &fixture.funding_block,
        2,
        stake_of(&fixture.funding_block),
        fixture.constants.genesis_blockstake_count,
        0,
        vec![tx.clone()],
    );
    fixture.set.accept_block(block2).unwrap();
    assert!(fixture.set.coin_output(&tx.coin_output_id(0)).is_some());
}

#[test]
fn test_receiver_cannot_refund() {
    let deadline = 1_500_000_000 + 15;
    let fixture = fund_swap(deadline);
    let receiver_sk = key(2);
    let refund = AtomicSwapRefundKey {
        public_key: PublicKey::from_signing_key(&receiver_sk),
        secret_key: receiver_sk,
    };
    let refund_time = block_timestamp(&fixture.constants, 2, 0);
    let err = redeem_tx(&fixture, refund_time, &UnlockKey::AtomicSwapRefund(&refund)).unwrap_err();
    assert_eq!(
        err,
        ConsensusError::Transaction(TransactionError::InvalidRedeemer)
    );
}

#[test]
fn test_sender_cannot_claim_before_deadline() {
    let fixture = fund_swap(1_500_000_000 + 1_000);
    let sender_sk = staker();
    let claim = AtomicSwapClaimKey {
        public_key: PublicKey::from_signing_key(&sender_sk),
        secret_key: sender_sk,
        secret: fixture.secret,
    };
    let claim_time = block_timestamp(&fixture.constants, 2, 0);
    // The secret checks out, but the fulfilling key is not the receiver's.
    let err = redeem_tx(&fixture, claim_time, &UnlockKey::AtomicSwapClaim(&claim)).unwrap_err();
    assert_eq!(
        err,
        ConsensusError::Transaction(TransactionError::InvalidRedeemer)
    );
}

#[test]
fn test_claim_after_deadline_rejected_on_chain() {
    // Contract expires between funding (block 1) and redemption (block 2):
    // the claim fulfillment reaches consensus in the refund phase and fails
    // as a wrong redeemer.
    let deadline = 1_500_000_000 + 15;
    let fixture = fund_swap(deadline);
    let receiver_sk = key(2);
    let claim = AtomicSwapClaimKey {
        public_key: PublicKey::from_signing_key(&receiver_sk),
        secret_key: receiver_sk,
        secret: fixture.secret,
    };
    // Lock while the contract still looks live to the wallet.
    let tx = redeem_tx(&fixture, deadline, &UnlockKey::AtomicSwapClaim(&claim)).unwrap();

    let block2 = make_block(
        &fixture.constants,
        &fixture.funding_block,
        2,
        stake_of(&fixture.funding_block),
        fixture.constants.genesis_blockstake_count,
        0,
        vec![tx],
    );
    let err = fixture.set.accept_block(block2).unwrap_err();
    assert_eq!(
        err,
        ConsensusError::Transaction(TransactionError::InvalidRedeemer)
    );
}
