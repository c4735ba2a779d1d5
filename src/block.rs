//! Block model: header fields, the blockstake proof, and identity hashing.
//!
//! Block authorship is proven by consuming a blockstake output: the proof
//! hash, derived from the parent block's stake signature and this block's
//! timestamp, must fall below the active target scaled by the staked value.
//! The staked output is respent by the block's first transaction, whose
//! fulfillment signature becomes the entropy for the next block's proof.

use crate::crypto::hash_all;
use crate::currency::Currency;
use crate::encoding::{
    decode_byte_vec, decode_vec, encode_byte_slice, encode_slice, encode_u64, CanonicalDecode,
    CanonicalEncode, Decoder,
};
use crate::error::Result;
use crate::inputlock::InputLockRegistry;
use crate::target::Target;
use crate::transaction::{CoinOutput, Transaction};
use crate::types::{BlockID, BlockStakeOutputID, CoinOutputID, Hash, Specifier, Timestamp};
use serde::{Deserialize, Serialize};

pub const SPECIFIER_MINER_PAYOUT: Specifier = Specifier::new("miner payout");

/// Proof that the block creator held and spent the referenced blockstake
/// output. `parent_signature` is the stake signature of the parent block,
/// carried so the proof hash is fixed before the block's own content exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStakeProof {
    pub parent_signature: Vec<u8>,
    pub stake_output_id: BlockStakeOutputID,
    /// Index of the staked output within the transaction that created it.
    pub stake_output_index: u64,
}

impl CanonicalEncode for BlockStakeProof {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_byte_slice(buf, &self.parent_signature);
        buf.extend_from_slice(&self.stake_output_id.0);
        encode_u64(buf, self.stake_output_index);
    }
}

impl CanonicalDecode for BlockStakeProof {
    fn decode(dec: &mut Decoder<'_>) -> Result<BlockStakeProof> {
        Ok(BlockStakeProof {
            parent_signature: decode_byte_vec(dec)?,
            stake_output_id: BlockStakeOutputID(dec.read_hash()?),
            stake_output_index: dec.read_u64_le()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub parent_id: BlockID,
    pub timestamp: Timestamp,
    pub pobs: BlockStakeProof,
    pub transactions: Vec<Transaction>,
    /// Subsidy plus collected fees, paid to the block creator. Enter the
    /// unspent set only after the maturity delay.
    pub miner_payouts: Vec<CoinOutput>,
}

impl CanonicalEncode for Block {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.parent_id.0);
        encode_u64(buf, self.timestamp);
        self.pobs.encode(buf);
        encode_slice(buf, &self.transactions);
        encode_slice(buf, &self.miner_payouts);
    }
}

impl Block {
    /// Decode with the registry that resolves input-lock types.
    pub fn decode_with(dec: &mut Decoder<'_>, registry: &InputLockRegistry) -> Result<Block> {
        let parent_id = BlockID(dec.read_hash()?);
        let timestamp = dec.read_u64_le()?;
        let pobs = BlockStakeProof::decode(dec)?;

        let count = dec.read_length()?;
        let mut transactions = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            transactions.push(Transaction::decode_with(dec, registry)?);
        }

        let miner_payouts = decode_vec(dec)?;

        Ok(Block {
            parent_id,
            timestamp,
            pobs,
            transactions,
            miner_payouts,
        })
    }

    /// Decode a complete block from raw submission bytes, rejecting trailing
    /// bytes.
    pub fn from_raw_bytes(bytes: &[u8], registry: &InputLockRegistry) -> Result<Block> {
        let mut dec = Decoder::new(bytes);
        let block = Block::decode_with(&mut dec, registry)?;
        dec.finish()?;
        Ok(block)
    }

    /// Merkle-style hash over the transaction IDs: pair-wise hashing with an
    /// odd leaf carried up unchanged.
    pub fn transaction_root(&self) -> Hash {
        let mut layer: Vec<Hash> = self.transactions.iter().map(|tx| tx.id().0).collect();
        if layer.is_empty() {
            return [0u8; 32];
        }
        while layer.len() > 1 {
            let mut next = Vec::with_capacity((layer.len() + 1) / 2);
            for pair in layer.chunks(2) {
                if pair.len() == 2 {
                    next.push(hash_all(&[&pair[0], &pair[1]]));
                } else {
                    next.push(pair[0]);
                }
            }
            layer = next;
        }
        layer[0]
    }

    /// Block identity: parent, timestamp, stake proof and the transaction
    /// root, hashed in canonical form.
    pub fn id(&self) -> BlockID {
        let mut header = Vec::new();
        header.extend_from_slice(&self.parent_id.0);
        encode_u64(&mut header, self.timestamp);
        self.pobs.encode(&mut header);
        header.extend_from_slice(&self.transaction_root());
        BlockID(crate::crypto::hash_bytes(&header))
    }

    /// The stake signature of this block: the fulfillment of the first
    /// transaction's first blockstake input. The next block's proof hash is
    /// seeded with it. Empty for the genesis block.
    pub fn stake_signature(&self) -> Vec<u8> {
        self.transactions
            .first()
            .and_then(|tx| tx.blockstake_inputs.first())
            .map(|input| input.unlocker.fulfillment_bytes())
            .unwrap_or_default()
    }

    /// ID under which the miner payout at `index` matures into the coin set.
    pub fn miner_payout_id(&self, index: u64) -> CoinOutputID {
        CoinOutputID(hash_all(&[
            SPECIFIER_MINER_PAYOUT.as_bytes(),
            &self.canonical_bytes(),
            &index.to_le_bytes(),
        ]))
    }

    /// Sum of the miner payouts.
    pub fn total_payout(&self) -> Option<Currency> {
        crate::currency::sum(self.miner_payouts.iter().map(|p| &p.value))
    }
}

/// The stake-proof inequality: the hash of the parent stake signature and
/// the block timestamp must fall below `target * stake`.
pub fn check_stake_proof(
    proof: &BlockStakeProof,
    timestamp: Timestamp,
    target: Target,
    stake: Currency,
) -> bool {
    let proof_hash = hash_all(&[&proof.parent_signature, &timestamp.to_le_bytes()]);
    target.meets(&proof_hash, stake)
}

/// Median of the given timestamps. The caller passes the trailing ancestor
/// window; a new block's timestamp must be strictly above this.
pub fn median_timestamp(mut timestamps: Vec<Timestamp>) -> Timestamp {
    timestamps.sort_unstable();
    timestamps[timestamps.len() / 2]
}
