//! The consensus state machine.
//!
//! `ConsensusState` accepts blocks, maintains the tree of competing forks,
//! selects the heaviest chain by accumulated work, and swaps the canonical
//! path atomically. `ConsensusSet` wraps it for concurrent use: one
//! reader-writer lock guards the whole state. Queries take the read lock;
//! block acceptance, reorganization and subscription registration take the
//! write lock. Finer-grained locking was rejected: a reorg touches every
//! component, and ordering multiple locks through it buys complexity, not
//! throughput.

use crate::block::{check_stake_proof, median_timestamp, Block};
use crate::constants::ChainConstants;
use crate::error::{BlockError, ConsensusError, Result};
use crate::forktree::ForkTree;
use crate::inputlock::InputLockRegistry;
use crate::ledger::Ledger;
use crate::subscribe::{ConsensusChange, SubscriptionFeed, SubscriptionToken};
use crate::types::{BlockHeight, BlockID, BlockStakeOutputID, CoinOutputID, Hash, Timestamp};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// The single-threaded consensus core. All nodes on the network that agree
/// on the canonical path hold identical consensus variables; anything else
/// is a software bug, surfaced as `ConsensusError::Fatal`.
pub struct ConsensusState {
    constants: ChainConstants,
    registry: InputLockRegistry,
    tree: ForkTree,
    ledger: Ledger,
    current_block_id: BlockID,
    /// Dense height-to-ID map of the canonical chain, for ancestor lookups.
    current_path: BTreeMap<BlockHeight, BlockID>,
    feed: SubscriptionFeed,
}

impl ConsensusState {
    /// State containing the genesis block and nothing else.
    pub fn new(constants: ChainConstants, registry: InputLockRegistry) -> ConsensusState {
        let genesis = constants.genesis_block();
        let tree = ForkTree::new(genesis.clone(), constants.root_target, constants.root_depth);
        let genesis_id = tree.root_id();
        let mut ledger = Ledger::new();
        ledger.apply_genesis(&genesis);
        let mut current_path = BTreeMap::new();
        current_path.insert(0, genesis_id);
        ConsensusState {
            constants,
            registry,
            tree,
            ledger,
            current_block_id: genesis_id,
            current_path,
            feed: SubscriptionFeed::new(),
        }
    }

    pub fn tip(&self) -> (BlockID, BlockHeight) {
        let height = self
            .current_path
            .keys()
            .next_back()
            .copied()
            .unwrap_or_default();
        (self.current_block_id, height)
    }

    pub fn block_at_height(&self, height: BlockHeight) -> Option<BlockID> {
        self.current_path.get(&height).copied()
    }

    pub fn block(&self, id: &BlockID) -> Option<Block> {
        self.tree.node(id).map(|node| node.block.clone())
    }

    pub fn coin_output(&self, id: &CoinOutputID) -> Option<crate::transaction::CoinOutput> {
        self.ledger.coin_output(id).cloned()
    }

    pub fn blockstake_output(
        &self,
        id: &BlockStakeOutputID,
    ) -> Option<crate::transaction::BlockStakeOutput> {
        self.ledger.blockstake_output(id).cloned()
    }

    /// Stable hash over the canonical UTXO set and the tip ID. Two nodes on
    /// the same chain agree on this value.
    pub fn consensus_checksum(&self) -> Hash {
        self.ledger.checksum(self.current_block_id)
    }

    /// Accept one block into the consensus set.
    ///
    /// Order of checks:
    /// 1. The ID must not be in the bad-block set, nor already admitted.
    /// 2. The parent must be known; otherwise the block is an orphan and the
    ///    caller should fetch ancestors.
    /// 3. Timestamp rules: strictly above the median of the trailing
    ///    ancestor window, and no further ahead of local time than the
    ///    future threshold.
    /// 4. The stake proof must reference the first transaction's blockstake
    ///    input and carry the parent's stake signature.
    /// 5. If the block's cumulative depth beats the current tip, the
    ///    canonical path switches to it; ledger-dependent validation (stake
    ///    proof inequality, transaction semantics, payouts) happens during
    ///    that switch. A block extending a side branch is stored untouched.
    ///
    /// Rejections from steps 3 and 4, and validation failures during a
    /// switch, permanently mark the block bad.
    /// Decode and accept a block in wire form, using the registry this state
    /// was constructed with to resolve input-lock types.
    pub fn accept_raw_block(&mut self, bytes: &[u8], now: Timestamp) -> Result<()> {
        let block = Block::from_raw_bytes(bytes, &self.registry)?;
        self.accept_block(block, now)
    }

    pub fn accept_block(&mut self, block: Block, now: Timestamp) -> Result<()> {
        let id = block.id();
        if self.tree.is_bad(&id) {
            return Err(ConsensusError::KnownBad);
        }
        if self.tree.contains(&id) {
            return Err(ConsensusError::DuplicateBlock);
        }
        if !self.tree.contains(&block.parent_id) {
            debug!(block = %id, parent = %block.parent_id, "orphan block");
            return Err(ConsensusError::Orphan);
        }

        if let Err(err) = self.check_header(&block, now) {
            warn!(block = %id, %err, "rejecting block");
            self.tree.mark_bad(id);
            return Err(err);
        }

        let target = self.tree.child_target(&block.parent_id, &self.constants)?;
        let id = self.tree.insert_child(block, target)?;

        let new_depth = self.tree.expect_node(&id)?.depth;
        let tip_depth = self.tree.expect_node(&self.current_block_id)?.depth;
        if new_depth <= tip_depth {
            // Stored, but the heaviest known chain is unchanged.
            debug!(block = %id, "block extends a side branch");
            return Ok(());
        }

        self.switch_to(id)
    }

    /// Header-level checks that need no ledger state.
    fn check_header(&self, block: &Block, now: Timestamp) -> Result<()> {
        let window = self
            .tree
            .timestamp_window(&block.parent_id, self.constants.median_timestamp_window)?;
        if block.timestamp <= median_timestamp(window) {
            return Err(ConsensusError::Block(BlockError::EarlyTimestamp));
        }
        if block.timestamp > now.saturating_add(self.constants.future_threshold) {
            return Err(ConsensusError::Block(BlockError::FutureTimestamp));
        }

        let first_tx = block
            .transactions
            .first()
            .ok_or(ConsensusError::Block(BlockError::NoTransactions))?;
        let stake_input = first_tx
            .blockstake_inputs
            .first()
            .ok_or(ConsensusError::Block(BlockError::StakeProofMismatch))?;
        if stake_input.parent_id != block.pobs.stake_output_id {
            return Err(ConsensusError::Block(BlockError::StakeProofMismatch));
        }

        let parent = self.tree.expect_node(&block.parent_id)?;
        if block.pobs.parent_signature != parent.block.stake_signature() {
            return Err(ConsensusError::Block(BlockError::StakeSignatureMismatch));
        }
        Ok(())
    }

    /// Ledger-dependent validation of one block, then application. The
    /// ledger must be at the block's parent state. Returns the block's diff.
    fn validate_and_apply(&mut self, id: &BlockID) -> Result<()> {
        let (block, height, target) = {
            let node = self.tree.expect_node(id)?;
            (node.block.clone(), node.height, node.target)
        };

        // Stake proof against the parent ledger: the staked output must be
        // unspent, owned by the claimant, and heavy enough for the target.
        let stake_output = self
            .ledger
            .blockstake_output(&block.pobs.stake_output_id)
            .ok_or_else(|| {
                ConsensusError::Block(BlockError::UnknownStakeOutput(
                    block.pobs.stake_output_id.to_string(),
                ))
            })?;
        let claimant = block
            .transactions
            .first()
            .and_then(|tx| tx.blockstake_inputs.first())
            .map(|input| input.unlocker.unlock_hash())
            .ok_or(ConsensusError::Block(BlockError::StakeProofMismatch))?;
        if claimant != stake_output.unlock_hash {
            return Err(ConsensusError::Block(BlockError::StakeProofMismatch));
        }
        if !check_stake_proof(&block.pobs, block.timestamp, target, stake_output.value) {
            return Err(ConsensusError::Block(BlockError::InvalidStakeProof));
        }

        let diff = self.ledger.apply_block(&block, height, &self.constants)?;
        self.tree.set_diff(id, diff)?;
        Ok(())
    }

    /// Switch the canonical path to `new_tip`: rewind to the common
    /// ancestor using stored diffs, then apply and re-validate the new
    /// branch. Re-validation is required because any block on it may have
    /// been admitted speculatively against a different parent state.
    ///
    /// On a mid-apply failure the partial apply is inverted, the original
    /// branch is restored from its stored diffs, and the failing block and
    /// its descendants are removed and marked bad. Observers never see a
    /// state in which the path and the ledger disagree.
    fn switch_to(&mut self, new_tip: BlockID) -> Result<()> {
        let old_tip = self.current_block_id;
        let ancestor = self.tree.common_ancestor(old_tip, new_tip)?;
        let reverted_ids: Vec<BlockID> = {
            let mut ids = self.tree.path_from(ancestor, old_tip)?;
            ids.reverse(); // old tip first, ancestor's child last
            ids
        };
        let applied_ids = self.tree.path_from(ancestor, new_tip)?;

        // Rewind.
        for id in &reverted_ids {
            let (height, diff) = {
                let node = self.tree.expect_node(id)?;
                let diff = node.diff.clone().ok_or_else(|| {
                    ConsensusError::Fatal(format!("canonical block {id} has no stored diff"))
                })?;
                (node.height, diff)
            };
            self.ledger.revert_block(&diff, height)?;
            self.current_path.remove(&height);
        }
        self.current_block_id = ancestor;

        // Apply, validating each block against the now-current ledger.
        let mut applied_ok: Vec<BlockID> = Vec::new();
        for id in &applied_ids {
            match self.validate_and_apply(id) {
                Ok(()) => {
                    let height = self.tree.expect_node(id)?.height;
                    self.current_path.insert(height, *id);
                    self.current_block_id = *id;
                    applied_ok.push(*id);
                }
                Err(err) => {
                    if let ConsensusError::Fatal(_) = err {
                        return Err(err);
                    }
                    warn!(block = %id, %err, "block invalid during apply; reversing");
                    self.reverse_partial_switch(&applied_ok, &reverted_ids, old_tip)?;
                    self.tree.remove_subtree_as_bad(*id);
                    return Err(err);
                }
            }
        }

        let change = ConsensusChange {
            reverted: reverted_ids
                .iter()
                .map(|id| self.tree.expect_node(id).map(|n| n.block.clone()))
                .collect::<Result<_>>()?,
            applied: applied_ids
                .iter()
                .map(|id| self.tree.expect_node(id).map(|n| n.block.clone()))
                .collect::<Result<_>>()?,
        };
        info!(
            old_tip = %old_tip,
            new_tip = %new_tip,
            reverted = change.reverted.len(),
            applied = change.applied.len(),
            "canonical path switched"
        );
        self.feed.broadcast(&change);

        if cfg!(debug_assertions) {
            self.check_invariants()?;
        }
        Ok(())
    }

    /// Undo a failed apply: invert the blocks applied so far, then restore
    /// the original branch from its stored diffs. No re-validation: the
    /// ledger is back in the exact state those diffs were computed against.
    fn reverse_partial_switch(
        &mut self,
        applied_ok: &[BlockID],
        reverted_ids: &[BlockID],
        old_tip: BlockID,
    ) -> Result<()> {
        for id in applied_ok.iter().rev() {
            let (height, diff) = {
                let node = self.tree.expect_node(id)?;
                let diff = node.diff.clone().ok_or_else(|| {
                    ConsensusError::Fatal(format!("applied block {id} has no stored diff"))
                })?;
                (node.height, diff)
            };
            self.ledger.revert_block(&diff, height)?;
            self.current_path.remove(&height);
        }
        for id in reverted_ids.iter().rev() {
            let (height, diff) = {
                let node = self.tree.expect_node(id)?;
                let diff = node.diff.clone().ok_or_else(|| {
                    ConsensusError::Fatal(format!("restored block {id} has no stored diff"))
                })?;
                (node.height, diff)
            };
            self.ledger.apply_diff(&diff, height)?;
            self.current_path.insert(height, *id);
        }
        self.current_block_id = old_tip;
        Ok(())
    }

    /// Register a subscriber. Its first message replays the canonical chain
    /// from genesis so it can build a complete view.
    pub fn subscribe(&mut self) -> Result<(SubscriptionToken, Receiver<ConsensusChange>)> {
        let mut applied = Vec::new();
        for id in self.current_path.values() {
            applied.push(self.tree.expect_node(id)?.block.clone());
        }
        Ok(self.feed.subscribe(ConsensusChange {
            reverted: Vec::new(),
            applied,
        }))
    }

    pub fn unsubscribe(&mut self, token: SubscriptionToken) {
        self.feed.unsubscribe(token);
    }

    /// Audit the consensus variables. Any violation means the state is
    /// corrupt; debug builds run this after every path switch.
    pub fn check_invariants(&self) -> Result<()> {
        let (tip, tip_height) = self.tip();
        if self.current_path.get(&tip_height) != Some(&tip) {
            return Err(ConsensusError::Fatal(
                "tip is not the last entry of the canonical path".into(),
            ));
        }
        for (height, id) in &self.current_path {
            let node = self.tree.expect_node(id)?;
            if node.height != *height {
                return Err(ConsensusError::Fatal(format!(
                    "canonical path entry {id} has height {} but sits at {height}",
                    node.height
                )));
            }
            if *height > 0 {
                let parent = self.current_path.get(&(height - 1)).copied();
                if node.parent != parent {
                    return Err(ConsensusError::Fatal(format!(
                        "canonical path is not parent-linked at height {height}"
                    )));
                }
            }
        }
        if self.current_path.len() as u64 != tip_height + 1 {
            return Err(ConsensusError::Fatal("canonical path has gaps".into()));
        }
        self.ledger.check_disjoint()
    }
}

/// Handle to a registered subscription.
pub struct ConsensusSubscription {
    pub token: SubscriptionToken,
    pub receiver: Receiver<ConsensusChange>,
}

/// Thread-safe consensus set. All public operations may be called
/// concurrently from many threads; clones share the same state.
#[derive(Clone)]
pub struct ConsensusSet {
    state: Arc<RwLock<ConsensusState>>,
    /// Registry copy for decoding submissions outside the lock.
    registry: InputLockRegistry,
    read_warn_threshold: std::time::Duration,
}

impl ConsensusSet {
    pub fn new(constants: ChainConstants, registry: InputLockRegistry) -> ConsensusSet {
        let read_warn_threshold = constants.read_lock_warn_threshold;
        ConsensusSet {
            state: Arc::new(RwLock::new(ConsensusState::new(
                constants,
                registry.clone(),
            ))),
            registry,
            read_warn_threshold,
        }
    }

    fn now() -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Run a query under the read lock, reporting slow holders in debug
    /// builds.
    fn read<T>(&self, op: impl FnOnce(&ConsensusState) -> T) -> T {
        let guard = self.state.read();
        let start = Instant::now();
        let out = op(&*guard);
        if cfg!(debug_assertions) && start.elapsed() > self.read_warn_threshold {
            warn!(
                held_for = ?start.elapsed(),
                "read lock held past the configured threshold"
            );
        }
        out
    }

    /// Submit a block in wire form. `Orphan` means the parent is unknown and
    /// the caller should fetch ancestors; every other error is a rejection.
    pub fn accept_raw_block(&self, bytes: &[u8]) -> Result<()> {
        let block = Block::from_raw_bytes(bytes, &self.registry)?;
        self.accept_block(block)
    }

    /// Submit an already-decoded block.
    pub fn accept_block(&self, block: Block) -> Result<()> {
        self.state.write().accept_block(block, Self::now())
    }

    pub fn tip(&self) -> (BlockID, BlockHeight) {
        self.read(|s| s.tip())
    }

    pub fn block_at_height(&self, height: BlockHeight) -> Option<BlockID> {
        self.read(|s| s.block_at_height(height))
    }

    pub fn block(&self, id: &BlockID) -> Option<Block> {
        self.read(|s| s.block(id))
    }

    pub fn coin_output(&self, id: &CoinOutputID) -> Option<crate::transaction::CoinOutput> {
        self.read(|s| s.coin_output(id))
    }

    pub fn blockstake_output(
        &self,
        id: &BlockStakeOutputID,
    ) -> Option<crate::transaction::BlockStakeOutput> {
        self.read(|s| s.blockstake_output(id))
    }

    pub fn consensus_checksum(&self) -> Hash {
        self.read(|s| s.consensus_checksum())
    }

    pub fn subscribe(&self) -> Result<ConsensusSubscription> {
        let (token, receiver) = self.state.write().subscribe()?;
        Ok(ConsensusSubscription { token, receiver })
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        self.state.write().unsubscribe(token);
    }

    pub fn check_invariants(&self) -> Result<()> {
        self.read(|s| s.check_invariants())
    }
}
