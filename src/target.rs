//! Difficulty targets and accumulated chain work.
//!
//! A target is a 256-bit big-endian bound: a stake proof is valid when its
//! hash, read as a big-endian integer, falls below `target * stake`. The
//! work contributed by one block is `1 / target`, carried here as
//! `U256::MAX / target` so that cumulative depth is a plain saturating sum
//! with the same ordering.

use crate::currency::Currency;
use crate::encoding::{CanonicalDecode, CanonicalEncode, Decoder};
use crate::error::Result;
use crate::types::Hash;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Target(pub Hash);

impl Target {
    pub fn from_u256(v: U256) -> Target {
        let mut raw = [0u8; 32];
        v.to_big_endian(&mut raw);
        Target(raw)
    }

    pub fn as_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// The easiest possible target: every hash satisfies it.
    pub fn max() -> Target {
        Target([0xff; 32])
    }

    /// True when `hash < target * stake`, the stake-proof inequality. The
    /// product saturates; a saturated bound admits every hash, which is the
    /// correct limit behavior for enormous stakes.
    pub fn meets(&self, hash: &Hash, stake: Currency) -> bool {
        let bound = self
            .as_u256()
            .checked_mul(stake.as_u256())
            .unwrap_or(U256::MAX);
        U256::from_big_endian(hash) < bound
    }

    /// Work contributed by a block that met this target.
    pub fn work(&self) -> BlockWork {
        let value = self.as_u256();
        if value.is_zero() {
            return BlockWork(U256::MAX);
        }
        BlockWork(U256::MAX / value)
    }

    /// Retarget by the ratio of observed to expected block time over the
    /// target window, clamped to a factor of four per adjustment so a burst
    /// of lucky stakes cannot swing difficulty arbitrarily.
    pub fn adjusted(&self, actual_seconds: u64, expected_seconds: u64) -> Target {
        let expected = expected_seconds.max(1);
        let actual = actual_seconds.max(1).min(expected.saturating_mul(4));
        let actual = actual.max(expected / 4);
        let value = self.as_u256();
        let scaled = value
            .checked_mul(U256::from(actual))
            .map(|v| v / U256::from(expected))
            .unwrap_or(U256::MAX);
        Target::from_u256(scaled.max(U256::one()))
    }
}

impl CanonicalEncode for Target {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.0);
    }
}

impl CanonicalDecode for Target {
    fn decode(dec: &mut Decoder<'_>) -> Result<Target> {
        Ok(Target(dec.read_hash()?))
    }
}

/// Work of a single block, `1 / target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockWork(pub U256);

/// Cumulative work of a chain; the fork-choice metric. Greater is heavier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockDepth(pub U256);

impl BlockDepth {
    pub const ZERO: BlockDepth = BlockDepth(U256::zero());

    pub fn plus(&self, work: BlockWork) -> BlockDepth {
        BlockDepth(self.0.saturating_add(work.0))
    }
}
