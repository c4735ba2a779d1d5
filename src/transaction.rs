//! Transaction model and the validation rules that do not need ledger state.
//!
//! A transaction moves coins and blockstake from spent outputs to new
//! outputs. Coins pay miner fees on top; blockstake only changes hands.
//! Checks that require the unspent-output set (value lookups, sum
//! conservation, cross-transaction double spends) live on the ledger.

use crate::crypto::hash_all;
use crate::currency::{self, Currency};
use crate::encoding::{
    decode_byte_vec, decode_vec, encode_byte_slice, encode_slice, encode_u64, encode_u8,
    CanonicalDecode, CanonicalEncode, Decoder,
};
use crate::error::{ConsensusError, Result, StructuralError, TransactionError};
use crate::inputlock::{InputLockProxy, InputLockRegistry, UnlockHash};
use crate::types::{
    BlockStakeOutputID, CoinOutputID, Specifier, Timestamp, TransactionID,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const SPECIFIER_TRANSACTION: Specifier = Specifier::new("transaction");
pub const SPECIFIER_COIN_OUTPUT: Specifier = Specifier::new("coin output");
pub const SPECIFIER_BLOCKSTAKE_OUTPUT: Specifier = Specifier::new("blockstake output");

/// Upper bound on a transaction's canonical encoding.
pub const MAX_TRANSACTION_SIZE: usize = 16 * 1024;
/// Upper bound on the opaque data a transaction may carry.
pub const MAX_ARBITRARY_DATA_SIZE: usize = 1024;

/// Spend of an unspent coin output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinInput {
    pub parent_id: CoinOutputID,
    pub unlocker: InputLockProxy,
}

/// Newly created coin output, owned by `unlock_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinOutput {
    pub value: Currency,
    pub unlock_hash: UnlockHash,
}

/// Spend of an unspent blockstake output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStakeInput {
    pub parent_id: BlockStakeOutputID,
    pub unlocker: InputLockProxy,
}

/// Newly created blockstake output, owned by `unlock_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStakeOutput {
    pub value: Currency,
    pub unlock_hash: UnlockHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u8,
    pub coin_inputs: Vec<CoinInput>,
    pub coin_outputs: Vec<CoinOutput>,
    pub blockstake_inputs: Vec<BlockStakeInput>,
    pub blockstake_outputs: Vec<BlockStakeOutput>,
    pub miner_fees: Vec<Currency>,
    pub arbitrary_data: Vec<u8>,
}

impl CanonicalEncode for CoinInput {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.parent_id.0);
        self.unlocker.encode(buf);
    }
}

impl CanonicalEncode for CoinOutput {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.value.encode(buf);
        self.unlock_hash.encode(buf);
    }
}

impl CanonicalDecode for CoinOutput {
    fn decode(dec: &mut Decoder<'_>) -> Result<CoinOutput> {
        Ok(CoinOutput {
            value: Currency::decode(dec)?,
            unlock_hash: UnlockHash::decode(dec)?,
        })
    }
}

impl CanonicalEncode for BlockStakeInput {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.parent_id.0);
        self.unlocker.encode(buf);
    }
}

impl CanonicalEncode for BlockStakeOutput {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.value.encode(buf);
        self.unlock_hash.encode(buf);
    }
}

impl CanonicalDecode for BlockStakeOutput {
    fn decode(dec: &mut Decoder<'_>) -> Result<BlockStakeOutput> {
        Ok(BlockStakeOutput {
            value: Currency::decode(dec)?,
            unlock_hash: UnlockHash::decode(dec)?,
        })
    }
}

impl CanonicalEncode for Transaction {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_u8(buf, self.version);
        encode_slice(buf, &self.coin_inputs);
        encode_slice(buf, &self.coin_outputs);
        encode_slice(buf, &self.blockstake_inputs);
        encode_slice(buf, &self.blockstake_outputs);
        encode_slice(buf, &self.miner_fees);
        encode_byte_slice(buf, &self.arbitrary_data);
    }
}

impl Transaction {
    /// Decode with the registry that resolves input-lock types.
    pub fn decode_with(dec: &mut Decoder<'_>, registry: &InputLockRegistry) -> Result<Transaction> {
        let version = dec.read_u8()?;

        let count = dec.read_length()?;
        let mut coin_inputs = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            coin_inputs.push(CoinInput {
                parent_id: CoinOutputID(dec.read_hash()?),
                unlocker: registry.decode_proxy(dec)?,
            });
        }

        let coin_outputs = decode_vec(dec)?;

        let count = dec.read_length()?;
        let mut blockstake_inputs = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            blockstake_inputs.push(BlockStakeInput {
                parent_id: BlockStakeOutputID(dec.read_hash()?),
                unlocker: registry.decode_proxy(dec)?,
            });
        }

        let blockstake_outputs = decode_vec(dec)?;
        let miner_fees = decode_vec(dec)?;
        let arbitrary_data = decode_byte_vec(dec)?;

        Ok(Transaction {
            version,
            coin_inputs,
            coin_outputs,
            blockstake_inputs,
            blockstake_outputs,
            miner_fees,
            arbitrary_data,
        })
    }

    pub fn id(&self) -> TransactionID {
        TransactionID(hash_all(&[
            SPECIFIER_TRANSACTION.as_bytes(),
            &self.canonical_bytes(),
        ]))
    }

    /// ID of the coin output at `index`, as spendable by a later transaction.
    pub fn coin_output_id(&self, index: u64) -> CoinOutputID {
        CoinOutputID(hash_all(&[
            SPECIFIER_COIN_OUTPUT.as_bytes(),
            &self.canonical_bytes(),
            &index.to_le_bytes(),
        ]))
    }

    /// ID of the blockstake output at `index`.
    pub fn blockstake_output_id(&self, index: u64) -> BlockStakeOutputID {
        BlockStakeOutputID(hash_all(&[
            SPECIFIER_BLOCKSTAKE_OUTPUT.as_bytes(),
            &self.canonical_bytes(),
            &index.to_le_bytes(),
        ]))
    }

    /// Global index of the blockstake input at `index`, used as the signing
    /// context. Coin inputs occupy `0..coin_inputs.len()`; blockstake inputs
    /// follow.
    pub fn blockstake_input_index(&self, index: usize) -> u64 {
        (self.coin_inputs.len() + index) as u64
    }

    /// Hash signed by input fulfillments: the input's index, the transaction
    /// with every fulfillment cleared, then any extra objects the lock type
    /// binds (an atomic swap claim binds its secret, so a changed secret
    /// invalidates the signature).
    pub fn input_sig_hash(&self, input_index: u64, extra: &[&[u8]]) -> crate::types::Hash {
        let mut buf = Vec::new();
        encode_u64(&mut buf, input_index);
        self.encode_for_signing(&mut buf);
        for part in extra {
            buf.extend_from_slice(part);
        }
        crate::crypto::hash_bytes(&buf)
    }

    /// Encode with all fulfillments cleared: only parent IDs, lock types and
    /// conditions of the inputs are covered by signatures.
    fn encode_for_signing(&self, buf: &mut Vec<u8>) {
        encode_u8(buf, self.version);
        encode_u64(buf, self.coin_inputs.len() as u64);
        for input in &self.coin_inputs {
            buf.extend_from_slice(&input.parent_id.0);
            encode_u8(buf, input.unlocker.unlock_type().0);
            encode_byte_slice(buf, &input.unlocker.condition_bytes());
        }
        encode_slice(buf, &self.coin_outputs);
        encode_u64(buf, self.blockstake_inputs.len() as u64);
        for input in &self.blockstake_inputs {
            buf.extend_from_slice(&input.parent_id.0);
            encode_u8(buf, input.unlocker.unlock_type().0);
            encode_byte_slice(buf, &input.unlocker.condition_bytes());
        }
        encode_slice(buf, &self.blockstake_outputs);
        encode_slice(buf, &self.miner_fees);
        encode_byte_slice(buf, &self.arbitrary_data);
    }

    /// Sum of the declared miner fees.
    pub fn total_fee(&self) -> std::result::Result<Currency, TransactionError> {
        currency::sum(self.miner_fees.iter()).ok_or(TransactionError::CurrencyOverflow)
    }

    /// Every input lock must pass the strict check: all condition and
    /// fulfillment shapes known to this node. Used for relay-grade
    /// validation, not for block acceptance.
    pub fn strict_check(&self) -> std::result::Result<(), TransactionError> {
        for input in &self.coin_inputs {
            input.unlocker.strict_check()?;
        }
        for input in &self.blockstake_inputs {
            input.unlocker.strict_check()?;
        }
        Ok(())
    }
}

/// Shape-level validation, independent of ledger state.
///
/// A transaction is well-formed if and only if:
/// 1. Its version is the one this chain accepts.
/// 2. It spends something or carries arbitrary data.
/// 3. Its encoding and arbitrary data respect the size bounds.
/// 4. No output ID is spent twice within the transaction itself.
/// 5. If it spends coins, its miner fees reach the configured minimum.
pub fn check_transaction_structure(
    tx: &Transaction,
    default_version: u8,
    minimum_miner_fee: Currency,
) -> Result<()> {
    if tx.version != default_version {
        return Err(ConsensusError::Structural(StructuralError::UnknownVersion(
            tx.version,
        )));
    }

    if tx.coin_inputs.is_empty() && tx.blockstake_inputs.is_empty() && tx.arbitrary_data.is_empty()
    {
        return Err(ConsensusError::Structural(StructuralError::Empty(
            "transaction",
        )));
    }

    if tx.arbitrary_data.len() > MAX_ARBITRARY_DATA_SIZE {
        return Err(ConsensusError::Structural(StructuralError::Oversize(
            "arbitrary data",
        )));
    }
    if tx.canonical_bytes().len() > MAX_TRANSACTION_SIZE {
        return Err(ConsensusError::Structural(StructuralError::Oversize(
            "transaction",
        )));
    }

    let mut spent_coins = HashSet::new();
    for input in &tx.coin_inputs {
        if !spent_coins.insert(input.parent_id) {
            return Err(ConsensusError::Transaction(TransactionError::DoubleSpend(
                input.parent_id.to_string(),
            )));
        }
    }
    let mut spent_stakes = HashSet::new();
    for input in &tx.blockstake_inputs {
        if !spent_stakes.insert(input.parent_id) {
            return Err(ConsensusError::Transaction(TransactionError::DoubleSpend(
                input.parent_id.to_string(),
            )));
        }
    }

    if !tx.coin_inputs.is_empty() {
        let fee = tx.total_fee().map_err(ConsensusError::Transaction)?;
        if fee < minimum_miner_fee {
            return Err(ConsensusError::Transaction(TransactionError::FeeTooSmall));
        }
    }

    Ok(())
}

/// Run every input lock's unlock operation under the transaction context.
/// Signature verification dominates validation cost, so callers gate this
/// behind the cheap structural checks.
pub fn check_input_unlocks(
    tx: &Transaction,
    now: Timestamp,
) -> std::result::Result<(), TransactionError> {
    for (i, input) in tx.coin_inputs.iter().enumerate() {
        input.unlocker.unlock(i as u64, tx, now)?;
    }
    for (i, input) in tx.blockstake_inputs.iter().enumerate() {
        input
            .unlocker
            .unlock(tx.blockstake_input_index(i), tx, now)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PublicKey;
    use crate::encoding::from_canonical_bytes;
    use crate::inputlock::{UnlockKey, UNLOCK_TYPE_SINGLE_SIGNATURE};
    use ed25519_dalek::SigningKey;

    fn test_key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn empty_tx() -> Transaction {
        Transaction {
            version: 1,
            coin_inputs: Vec::new(),
            coin_outputs: Vec::new(),
            blockstake_inputs: Vec::new(),
            blockstake_outputs: Vec::new(),
            miner_fees: Vec::new(),
            arbitrary_data: Vec::new(),
        }
    }

    fn coin_spend_tx(seed: u8) -> Transaction {
        let pk = PublicKey::from_signing_key(&test_key(seed));
        Transaction {
            coin_inputs: vec![CoinInput {
                parent_id: CoinOutputID([seed; 32]),
                unlocker: InputLockProxy::single_signature(pk),
            }],
            coin_outputs: vec![CoinOutput {
                value: Currency::from_u64(90),
                unlock_hash: UnlockHash::nil(),
            }],
            miner_fees: vec![Currency::from_u64(10)],
            ..empty_tx()
        }
    }

    #[test]
    fn test_round_trip() {
        let registry = InputLockRegistry::standard();
        let tx = coin_spend_tx(1);
        let bytes = tx.canonical_bytes();
        let mut dec = Decoder::new(&bytes);
        let back = Transaction::decode_with(&mut dec, &registry).unwrap();
        dec.finish().unwrap();
        assert_eq!(back, tx);
        assert_eq!(back.id(), tx.id());
    }

    #[test]
    fn test_ids_are_domain_separated() {
        let tx = coin_spend_tx(1);
        assert_ne!(tx.coin_output_id(0).0, tx.blockstake_output_id(0).0);
        assert_ne!(tx.id().0, tx.coin_output_id(0).0);
    }

    #[test]
    fn test_output_ids_differ_by_index() {
        let tx = coin_spend_tx(1);
        assert_ne!(tx.coin_output_id(0), tx.coin_output_id(1));
    }

    #[test]
    fn test_structure_rejects_wrong_version() {
        let tx = Transaction {
            version: 9,
            ..coin_spend_tx(1)
        };
        assert_eq!(
            check_transaction_structure(&tx, 1, Currency::ZERO),
            Err(ConsensusError::Structural(StructuralError::UnknownVersion(9)))
        );
    }

    #[test]
    fn test_structure_rejects_empty_transaction() {
        assert_eq!(
            check_transaction_structure(&empty_tx(), 1, Currency::ZERO),
            Err(ConsensusError::Structural(StructuralError::Empty("transaction")))
        );
    }

    #[test]
    fn test_structure_accepts_arbitrary_data_only() {
        let tx = Transaction {
            arbitrary_data: b"hello".to_vec(),
            ..empty_tx()
        };
        check_transaction_structure(&tx, 1, Currency::ZERO).unwrap();
    }

    #[test]
    fn test_structure_rejects_oversize_arbitrary_data() {
        let tx = Transaction {
            arbitrary_data: vec![0; MAX_ARBITRARY_DATA_SIZE + 1],
            ..empty_tx()
        };
        assert!(matches!(
            check_transaction_structure(&tx, 1, Currency::ZERO),
            Err(ConsensusError::Structural(StructuralError::Oversize(_)))
        ));
    }

    #[test]
    fn test_structure_rejects_duplicate_spend() {
        let mut tx = coin_spend_tx(1);
        let dup = tx.coin_inputs[0].clone();
        tx.coin_inputs.push(dup);
        assert!(matches!(
            check_transaction_structure(&tx, 1, Currency::ZERO),
            Err(ConsensusError::Transaction(TransactionError::DoubleSpend(_)))
        ));
    }

    #[test]
    fn test_structure_enforces_minimum_fee() {
        let tx = coin_spend_tx(1);
        check_transaction_structure(&tx, 1, Currency::from_u64(10)).unwrap();
        assert_eq!(
            check_transaction_structure(&tx, 1, Currency::from_u64(11)),
            Err(ConsensusError::Transaction(TransactionError::FeeTooSmall))
        );
    }

    #[test]
    fn test_no_fee_needed_without_coin_inputs() {
        let tx = Transaction {
            blockstake_inputs: vec![BlockStakeInput {
                parent_id: BlockStakeOutputID([5; 32]),
                unlocker: InputLockProxy::single_signature(PublicKey::ed25519([5; 32])),
            }],
            ..empty_tx()
        };
        check_transaction_structure(&tx, 1, Currency::from_u64(10)).unwrap();
    }

    #[test]
    fn test_sig_hash_ignores_fulfillments() {
        let sk = test_key(1);
        let mut tx = coin_spend_tx(1);
        tx.coin_inputs[0].unlocker = InputLockProxy::single_signature(
            PublicKey::from_signing_key(&sk),
        );
        let before = tx.input_sig_hash(0, &[]);
        let unsigned = tx.clone();
        tx.coin_inputs[0]
            .unlocker
            .lock(0, &unsigned, 0, &UnlockKey::SingleSignature(&sk))
            .unwrap();
        assert_eq!(tx.input_sig_hash(0, &[]), before);
    }

    #[test]
    fn test_sig_hash_covers_outputs_and_extras() {
        let tx = coin_spend_tx(1);
        let mut altered = tx.clone();
        altered.coin_outputs[0].value = Currency::from_u64(89);
        assert_ne!(tx.input_sig_hash(0, &[]), altered.input_sig_hash(0, &[]));
        assert_ne!(tx.input_sig_hash(0, &[]), tx.input_sig_hash(0, &[b"secret"]));
        assert_ne!(tx.input_sig_hash(0, &[]), tx.input_sig_hash(1, &[]));
    }

    #[test]
    fn test_signed_unlocks_verify() {
        let sk = test_key(7);
        let pk = PublicKey::from_signing_key(&sk);
        let mut tx = Transaction {
            coin_inputs: vec![CoinInput {
                parent_id: CoinOutputID([7; 32]),
                unlocker: InputLockProxy::single_signature(pk.clone()),
            }],
            blockstake_inputs: vec![BlockStakeInput {
                parent_id: BlockStakeOutputID([8; 32]),
                unlocker: InputLockProxy::single_signature(pk),
            }],
            miner_fees: vec![Currency::from_u64(1)],
            ..empty_tx()
        };
        let unsigned = tx.clone();
        tx.coin_inputs[0]
            .unlocker
            .lock(0, &unsigned, 0, &UnlockKey::SingleSignature(&sk))
            .unwrap();
        let stake_index = unsigned.blockstake_input_index(0);
        tx.blockstake_inputs[0]
            .unlocker
            .lock(stake_index, &unsigned, 0, &UnlockKey::SingleSignature(&sk))
            .unwrap();
        check_input_unlocks(&tx, 0).unwrap();
    }

    #[test]
    fn test_strict_check_rejects_unknown_lock() {
        let mut tx = coin_spend_tx(1);
        tx.coin_inputs[0].unlocker = InputLockProxy::Unknown(crate::inputlock::UnknownInputLock {
            unlock_type: crate::inputlock::UnlockType(0x55),
            condition: vec![1],
            fulfillment: vec![2],
        });
        assert_eq!(tx.strict_check(), Err(TransactionError::UnknownInputLock));
    }

    #[test]
    fn test_unlock_hash_round_trip() {
        let uh = UnlockHash::new(UNLOCK_TYPE_SINGLE_SIGNATURE, [3; 32]);
        let back: UnlockHash = from_canonical_bytes(&uh.canonical_bytes()).unwrap();
        assert_eq!(back, uh);
    }
}
