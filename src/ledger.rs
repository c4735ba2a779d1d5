//! The unspent-output ledger.
//!
//! Three maps make up the consensus variables: active coin outputs, active
//! blockstake outputs, and delayed coin outputs bucketed by the height at
//! which they mature. Every mutation a block performs is captured in a
//! `BlockDiff` so a reorganization can invert the block exactly, without
//! re-running validation. Two nodes on the same canonical path hold
//! byte-identical ledgers; the checksum makes that comparable across the
//! network.
//!
//! Map iteration order feeds the checksum, so the maps are ordered.

use crate::block::Block;
use crate::constants::ChainConstants;
use crate::currency::{self, Currency};
use crate::encoding::{encode_u64, CanonicalEncode};
use crate::error::{BlockError, ConsensusError, Result, TransactionError};
use crate::transaction::{
    check_input_unlocks, check_transaction_structure, BlockStakeOutput, CoinOutput, Transaction,
};
use crate::types::{BlockHeight, BlockID, BlockStakeOutputID, CoinOutputID, Hash};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// The minimal set of ledger mutations one block performs, in application
/// order. Stored on the block's tree node; applying and reverting a diff are
/// exact inverses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDiff {
    /// Delayed outputs that entered the active map when this block's height
    /// was reached.
    pub matured_coin_outputs: Vec<(CoinOutputID, CoinOutput)>,
    pub spent_coin_outputs: Vec<(CoinOutputID, CoinOutput)>,
    pub created_coin_outputs: Vec<(CoinOutputID, CoinOutput)>,
    pub spent_blockstake_outputs: Vec<(BlockStakeOutputID, BlockStakeOutput)>,
    pub created_blockstake_outputs: Vec<(BlockStakeOutputID, BlockStakeOutput)>,
    /// Miner payouts scheduled to mature at a later height.
    pub delayed_coin_additions: Vec<(BlockHeight, CoinOutputID, CoinOutput)>,
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    coin_outputs: BTreeMap<CoinOutputID, CoinOutput>,
    blockstake_outputs: BTreeMap<BlockStakeOutputID, BlockStakeOutput>,
    delayed_coin_outputs: BTreeMap<BlockHeight, BTreeMap<CoinOutputID, CoinOutput>>,
}

impl Ledger {
    pub fn new() -> Ledger {
        Ledger::default()
    }

    pub fn coin_output(&self, id: &CoinOutputID) -> Option<&CoinOutput> {
        self.coin_outputs.get(id)
    }

    pub fn blockstake_output(&self, id: &BlockStakeOutputID) -> Option<&BlockStakeOutput> {
        self.blockstake_outputs.get(id)
    }

    /// Seed the ledger with the genesis block: its payouts and outputs are
    /// spendable immediately, with no maturity delay and no validation.
    pub fn apply_genesis(&mut self, genesis: &Block) {
        for (i, payout) in genesis.miner_payouts.iter().enumerate() {
            self.coin_outputs
                .insert(genesis.miner_payout_id(i as u64), payout.clone());
        }
        for tx in &genesis.transactions {
            for (i, output) in tx.coin_outputs.iter().enumerate() {
                self.coin_outputs
                    .insert(tx.coin_output_id(i as u64), output.clone());
            }
            for (i, output) in tx.blockstake_outputs.iter().enumerate() {
                self.blockstake_outputs
                    .insert(tx.blockstake_output_id(i as u64), output.clone());
            }
        }
    }

    /// Validate `block` against the current ledger state and apply it,
    /// returning the diff. On any failure the partial mutation is rolled
    /// back; the ledger is untouched on error.
    ///
    /// Order of operations:
    /// 1. Delayed outputs keyed by `height` mature into the active map.
    /// 2. Each transaction is validated against the ledger as left by its
    ///    predecessors in the same block, then applied.
    /// 3. Miner payouts must equal subsidy plus fees; they are scheduled to
    ///    mature at `height + maturity_delay`.
    pub fn apply_block(
        &mut self,
        block: &Block,
        height: BlockHeight,
        constants: &ChainConstants,
    ) -> Result<BlockDiff> {
        let mut diff = BlockDiff::default();
        match self.apply_block_inner(block, height, constants, &mut diff) {
            Ok(()) => Ok(diff),
            Err(err) => {
                self.revert_block(&diff, height)?;
                Err(err)
            }
        }
    }

    fn apply_block_inner(
        &mut self,
        block: &Block,
        height: BlockHeight,
        constants: &ChainConstants,
        diff: &mut BlockDiff,
    ) -> Result<()> {
        // 1. Maturation.
        if let Some(bucket) = self.delayed_coin_outputs.remove(&height) {
            for (id, output) in bucket {
                if self
                    .coin_outputs
                    .insert(id, output.clone())
                    .is_some()
                {
                    return Err(ConsensusError::Fatal(format!(
                        "matured coin output {id} already in the active set"
                    )));
                }
                diff.matured_coin_outputs.push((id, output));
            }
        }

        // 2. Transactions, against the ledger as mutated so far. Output IDs
        // spent earlier in this same block are gone from the active map, but
        // are reported as double spends rather than unknown outputs.
        let mut spent_in_block: HashSet<Hash> = HashSet::new();
        let mut total_fees = Currency::ZERO;
        for tx in &block.transactions {
            let fee = self.apply_transaction(tx, constants, block.timestamp, &mut spent_in_block, diff)?;
            total_fees = total_fees
                .checked_add(fee)
                .ok_or(ConsensusError::Transaction(TransactionError::CurrencyOverflow))?;
        }

        // 3. Miner payouts.
        let subsidy = constants.block_subsidy(height);
        let expected = subsidy
            .checked_add(total_fees)
            .ok_or(ConsensusError::Transaction(TransactionError::CurrencyOverflow))?;
        let paid = block
            .total_payout()
            .ok_or(ConsensusError::Transaction(TransactionError::CurrencyOverflow))?;
        if paid != expected {
            return Err(ConsensusError::Block(BlockError::PayoutMismatch));
        }
        let maturity_height = height + constants.maturity_delay;
        for (i, payout) in block.miner_payouts.iter().enumerate() {
            let id = block.miner_payout_id(i as u64);
            let bucket = self.delayed_coin_outputs.entry(maturity_height).or_default();
            if bucket.insert(id, payout.clone()).is_some() {
                return Err(ConsensusError::Fatal(format!(
                    "delayed coin output {id} created twice"
                )));
            }
            diff.delayed_coin_additions
                .push((maturity_height, id, payout.clone()));
        }

        Ok(())
    }

    /// Validate one transaction against the current ledger state and apply
    /// it, extending `diff`. Returns the transaction's fee.
    fn apply_transaction(
        &mut self,
        tx: &Transaction,
        constants: &ChainConstants,
        now: crate::types::Timestamp,
        spent_in_block: &mut HashSet<Hash>,
        diff: &mut BlockDiff,
    ) -> Result<Currency> {
        check_transaction_structure(
            tx,
            constants.default_transaction_version,
            constants.minimum_miner_fee,
        )?;

        // Cheap ledger checks before the signature work: referenced outputs
        // must exist and be owned by the unlocking condition.
        let mut coin_in = Currency::ZERO;
        for input in &tx.coin_inputs {
            if spent_in_block.contains(&input.parent_id.0) {
                return Err(ConsensusError::Transaction(TransactionError::DoubleSpend(
                    input.parent_id.to_string(),
                )));
            }
            let output = self.coin_outputs.get(&input.parent_id).ok_or_else(|| {
                ConsensusError::Transaction(TransactionError::UnknownCoinOutput(
                    input.parent_id.to_string(),
                ))
            })?;
            if input.unlocker.unlock_hash() != output.unlock_hash {
                return Err(ConsensusError::Transaction(
                    TransactionError::UnlockHashMismatch,
                ));
            }
            coin_in = coin_in
                .checked_add(output.value)
                .ok_or(ConsensusError::Transaction(TransactionError::CurrencyOverflow))?;
        }
        let mut stake_in = Currency::ZERO;
        for input in &tx.blockstake_inputs {
            if spent_in_block.contains(&input.parent_id.0) {
                return Err(ConsensusError::Transaction(TransactionError::DoubleSpend(
                    input.parent_id.to_string(),
                )));
            }
            let output = self.blockstake_outputs.get(&input.parent_id).ok_or_else(|| {
                ConsensusError::Transaction(TransactionError::UnknownBlockStakeOutput(
                    input.parent_id.to_string(),
                ))
            })?;
            if input.unlocker.unlock_hash() != output.unlock_hash {
                return Err(ConsensusError::Transaction(
                    TransactionError::UnlockHashMismatch,
                ));
            }
            stake_in = stake_in
                .checked_add(output.value)
                .ok_or(ConsensusError::Transaction(TransactionError::CurrencyOverflow))?;
        }

        // Sum conservation.
        let fee = tx.total_fee().map_err(ConsensusError::Transaction)?;
        let coin_out = currency::sum(tx.coin_outputs.iter().map(|o| &o.value))
            .and_then(|out| out.checked_add(fee))
            .ok_or(ConsensusError::Transaction(TransactionError::CurrencyOverflow))?;
        if coin_in != coin_out {
            return Err(ConsensusError::Transaction(TransactionError::CoinSumMismatch));
        }
        let stake_out = currency::sum(tx.blockstake_outputs.iter().map(|o| &o.value))
            .ok_or(ConsensusError::Transaction(TransactionError::CurrencyOverflow))?;
        if stake_in != stake_out {
            return Err(ConsensusError::Transaction(
                TransactionError::BlockStakeSumMismatch,
            ));
        }

        // The expensive step last.
        check_input_unlocks(tx, now).map_err(ConsensusError::Transaction)?;

        // Apply: spend, then create.
        for input in &tx.coin_inputs {
            let output = self
                .coin_outputs
                .remove(&input.parent_id)
                .ok_or_else(|| ConsensusError::Fatal(format!(
                    "validated coin output {} vanished before spend",
                    input.parent_id
                )))?;
            spent_in_block.insert(input.parent_id.0);
            diff.spent_coin_outputs.push((input.parent_id, output));
        }
        for input in &tx.blockstake_inputs {
            let output = self
                .blockstake_outputs
                .remove(&input.parent_id)
                .ok_or_else(|| ConsensusError::Fatal(format!(
                    "validated blockstake output {} vanished before spend",
                    input.parent_id
                )))?;
            spent_in_block.insert(input.parent_id.0);
            diff.spent_blockstake_outputs.push((input.parent_id, output));
        }
        for (i, output) in tx.coin_outputs.iter().enumerate() {
            let id = tx.coin_output_id(i as u64);
            if self.coin_outputs.insert(id, output.clone()).is_some() {
                return Err(ConsensusError::Fatal(format!(
                    "coin output {id} created twice"
                )));
            }
            diff.created_coin_outputs.push((id, output.clone()));
        }
        for (i, output) in tx.blockstake_outputs.iter().enumerate() {
            let id = tx.blockstake_output_id(i as u64);
            if self.blockstake_outputs.insert(id, output.clone()).is_some() {
                return Err(ConsensusError::Fatal(format!(
                    "blockstake output {id} created twice"
                )));
            }
            diff.created_blockstake_outputs.push((id, output.clone()));
        }

        Ok(fee)
    }

    /// Re-apply a stored diff without validation. Only sound when the ledger
    /// is in the exact state the diff was computed against, which the reorg
    /// engine guarantees when restoring a branch it just rewound.
    pub fn apply_diff(&mut self, diff: &BlockDiff, height: BlockHeight) -> Result<()> {
        self.delayed_coin_outputs.remove(&height);
        for (id, output) in &diff.matured_coin_outputs {
            self.coin_outputs.insert(*id, output.clone());
        }
        for (id, _) in &diff.spent_coin_outputs {
            if self.coin_outputs.remove(id).is_none() {
                return Err(ConsensusError::Fatal(format!(
                    "diff spends missing coin output {id}"
                )));
            }
        }
        for (id, _) in &diff.spent_blockstake_outputs {
            if self.blockstake_outputs.remove(id).is_none() {
                return Err(ConsensusError::Fatal(format!(
                    "diff spends missing blockstake output {id}"
                )));
            }
        }
        for (id, output) in &diff.created_coin_outputs {
            self.coin_outputs.insert(*id, output.clone());
        }
        for (id, output) in &diff.created_blockstake_outputs {
            self.blockstake_outputs.insert(*id, output.clone());
        }
        for (maturity, id, output) in &diff.delayed_coin_additions {
            self.delayed_coin_outputs
                .entry(*maturity)
                .or_default()
                .insert(*id, output.clone());
        }
        Ok(())
    }

    /// Undo one block using its stored diff: the exact inverse of
    /// `apply_diff`, step by step in reverse order.
    pub fn revert_block(&mut self, diff: &BlockDiff, height: BlockHeight) -> Result<()> {
        for (maturity, id, _) in diff.delayed_coin_additions.iter().rev() {
            let missing = match self.delayed_coin_outputs.get_mut(maturity) {
                Some(bucket) => bucket.remove(id).is_none(),
                None => true,
            };
            if missing {
                return Err(ConsensusError::Fatal(format!(
                    "reverted delayed coin output {id} not found in its bucket"
                )));
            }
            let emptied = self
                .delayed_coin_outputs
                .get(maturity)
                .is_some_and(|bucket| bucket.is_empty());
            if emptied {
                self.delayed_coin_outputs.remove(maturity);
            }
        }
        for (id, _) in diff.created_blockstake_outputs.iter().rev() {
            if self.blockstake_outputs.remove(id).is_none() {
                return Err(ConsensusError::Fatal(format!(
                    "reverted blockstake output {id} missing from the active set"
                )));
            }
        }
        for (id, _) in diff.created_coin_outputs.iter().rev() {
            if self.coin_outputs.remove(id).is_none() {
                return Err(ConsensusError::Fatal(format!(
                    "reverted coin output {id} missing from the active set"
                )));
            }
        }
        for (id, output) in diff.spent_blockstake_outputs.iter().rev() {
            if self
                .blockstake_outputs
                .insert(*id, output.clone())
                .is_some()
            {
                return Err(ConsensusError::Fatal(format!(
                    "re-credited blockstake output {id} already present"
                )));
            }
        }
        for (id, output) in diff.spent_coin_outputs.iter().rev() {
            if self.coin_outputs.insert(*id, output.clone()).is_some() {
                return Err(ConsensusError::Fatal(format!(
                    "re-credited coin output {id} already present"
                )));
            }
        }
        for (id, output) in diff.matured_coin_outputs.iter().rev() {
            if self.coin_outputs.remove(id).is_none() {
                return Err(ConsensusError::Fatal(format!(
                    "un-matured coin output {id} missing from the active set"
                )));
            }
            self.delayed_coin_outputs
                .entry(height)
                .or_default()
                .insert(*id, output.clone());
        }
        Ok(())
    }

    /// Deterministic hash over the whole ledger plus the tip ID. Two nodes
    /// agreeing on this value hold the same consensus state.
    pub fn checksum(&self, tip: BlockID) -> Hash {
        let mut buf = Vec::new();
        buf.extend_from_slice(&tip.0);
        encode_u64(&mut buf, self.coin_outputs.len() as u64);
        for (id, output) in &self.coin_outputs {
            buf.extend_from_slice(&id.0);
            output.encode(&mut buf);
        }
        encode_u64(&mut buf, self.blockstake_outputs.len() as u64);
        for (id, output) in &self.blockstake_outputs {
            buf.extend_from_slice(&id.0);
            output.encode(&mut buf);
        }
        encode_u64(&mut buf, self.delayed_coin_outputs.len() as u64);
        for (height, bucket) in &self.delayed_coin_outputs {
            encode_u64(&mut buf, *height);
            encode_u64(&mut buf, bucket.len() as u64);
            for (id, output) in bucket {
                buf.extend_from_slice(&id.0);
                output.encode(&mut buf);
            }
        }
        crate::crypto::hash_bytes(&buf)
    }

    /// No output ID may sit in the active map and a delayed bucket at once.
    pub fn check_disjoint(&self) -> Result<()> {
        for bucket in self.delayed_coin_outputs.values() {
            for id in bucket.keys() {
                if self.coin_outputs.contains_key(id) {
                    return Err(ConsensusError::Fatal(format!(
                        "coin output {id} is both active and delayed"
                    )));
                }
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn active_coin_count(&self) -> usize {
        self.coin_outputs.len()
    }

    #[cfg(test)]
    pub fn delayed_coin_count(&self) -> usize {
        self.delayed_coin_outputs.values().map(|b| b.len()).sum()
    }
}
