//! The tree of all admitted blocks and the permanent bad-block set.
//!
//! Nodes live in an arena keyed by block ID; parent links and child sets are
//! IDs, never owning pointers, so the tree is cycle-free and serializable.
//! Every node carries the target its block had to meet, its cumulative depth
//! (the fork-choice metric), and, once the block has been applied at least
//! once, the ledger diff needed to invert it.

use crate::block::Block;
use crate::constants::ChainConstants;
use crate::error::{ConsensusError, Result};
use crate::ledger::BlockDiff;
use crate::target::{BlockDepth, Target};
use crate::types::{BlockHeight, BlockID};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct BlockNode {
    pub block: Block,
    /// `None` only for the genesis node.
    pub parent: Option<BlockID>,
    pub children: BTreeSet<BlockID>,
    pub height: BlockHeight,
    /// Target this block's stake proof had to meet.
    pub target: Target,
    /// Cumulative work from genesis through this block.
    pub depth: BlockDepth,
    /// Ledger mutations the block performs, recorded when it is applied.
    pub diff: Option<BlockDiff>,
}

#[derive(Debug, Clone)]
pub struct ForkTree {
    nodes: HashMap<BlockID, BlockNode>,
    root: BlockID,
    bad_blocks: HashSet<BlockID>,
}

impl ForkTree {
    pub fn new(genesis: Block, root_target: Target, root_depth: BlockDepth) -> ForkTree {
        let root = genesis.id();
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            BlockNode {
                block: genesis,
                parent: None,
                children: BTreeSet::new(),
                height: 0,
                target: root_target,
                depth: root_depth,
                diff: None,
            },
        );
        ForkTree {
            nodes,
            root,
            bad_blocks: HashSet::new(),
        }
    }

    /// ID of the genesis node.
    pub fn root_id(&self) -> BlockID {
        self.root
    }

    pub fn contains(&self, id: &BlockID) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn is_bad(&self, id: &BlockID) -> bool {
        self.bad_blocks.contains(id)
    }

    pub fn mark_bad(&mut self, id: BlockID) {
        self.bad_blocks.insert(id);
    }

    pub fn node(&self, id: &BlockID) -> Option<&BlockNode> {
        self.nodes.get(id)
    }

    /// Node lookup that treats absence as state corruption; for IDs the
    /// engine itself put on a path.
    pub fn expect_node(&self, id: &BlockID) -> Result<&BlockNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| ConsensusError::Fatal(format!("block node {id} missing from the tree")))
    }

    pub fn set_diff(&mut self, id: &BlockID, diff: BlockDiff) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| ConsensusError::Fatal(format!("block node {id} missing from the tree")))?;
        node.diff = Some(diff);
        Ok(())
    }

    /// Admit `block` as a child of its parent node. The caller has already
    /// verified the parent exists.
    pub fn insert_child(&mut self, block: Block, target: Target) -> Result<BlockID> {
        let id = block.id();
        let parent_id = block.parent_id;
        let (height, depth) = {
            let parent = self.expect_node(&parent_id)?;
            (parent.height + 1, parent.depth.plus(target.work()))
        };
        self.nodes.insert(
            id,
            BlockNode {
                block,
                parent: Some(parent_id),
                children: BTreeSet::new(),
                height,
                target,
                depth,
                diff: None,
            },
        );
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.children.insert(id);
        }
        Ok(id)
    }

    /// Remove `id` and every descendant, marking them all bad. Used when a
    /// block fails validation during apply: no child of invalid state can
    /// ever be valid.
    pub fn remove_subtree_as_bad(&mut self, id: BlockID) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children.iter().copied());
                if let Some(parent_id) = node.parent {
                    if let Some(parent) = self.nodes.get_mut(&parent_id) {
                        parent.children.remove(&current);
                    }
                }
            }
            self.bad_blocks.insert(current);
        }
    }

    /// Common ancestor of two nodes: walk the deeper side up until heights
    /// match, then walk both up until the IDs meet.
    pub fn common_ancestor(&self, a: BlockID, b: BlockID) -> Result<BlockID> {
        let mut a_id = a;
        let mut b_id = b;
        let mut a_node = self.expect_node(&a_id)?;
        let mut b_node = self.expect_node(&b_id)?;
        while a_node.height > b_node.height {
            a_id = a_node
                .parent
                .ok_or_else(|| ConsensusError::Fatal("walked past the genesis node".into()))?;
            a_node = self.expect_node(&a_id)?;
        }
        while b_node.height > a_node.height {
            b_id = b_node
                .parent
                .ok_or_else(|| ConsensusError::Fatal("walked past the genesis node".into()))?;
            b_node = self.expect_node(&b_id)?;
        }
        while a_id != b_id {
            match (a_node.parent, b_node.parent) {
                (Some(ap), Some(bp)) => {
                    a_id = ap;
                    b_id = bp;
                    a_node = self.expect_node(&a_id)?;
                    b_node = self.expect_node(&b_id)?;
                }
                _ => {
                    return Err(ConsensusError::Fatal(
                        "blocks share no common ancestor".into(),
                    ))
                }
            }
        }
        Ok(a_id)
    }

    /// IDs from just above `ancestor` down to `tip`, in increasing height
    /// order. Empty when `tip == ancestor`.
    pub fn path_from(&self, ancestor: BlockID, tip: BlockID) -> Result<Vec<BlockID>> {
        let mut path = Vec::new();
        let mut current = tip;
        while current != ancestor {
            let node = self.expect_node(&current)?;
            path.push(current);
            current = node.parent.ok_or_else(|| {
                ConsensusError::Fatal("path walk reached genesis before the ancestor".into())
            })?;
        }
        path.reverse();
        Ok(path)
    }

    /// Target the child of `parent_id` must meet: the parent's target eased
    /// or tightened by the observed block rate over the trailing window.
    pub fn child_target(&self, parent_id: &BlockID, constants: &ChainConstants) -> Result<Target> {
        let parent = self.expect_node(parent_id)?;
        let mut window_start = parent;
        let mut span: u64 = 0;
        while span < constants.target_window {
            match window_start.parent {
                Some(grandparent) => {
                    window_start = self.expect_node(&grandparent)?;
                    span += 1;
                }
                None => break,
            }
        }
        if span == 0 {
            return Ok(parent.target);
        }
        let actual = parent
            .block
            .timestamp
            .saturating_sub(window_start.block.timestamp);
        let expected = constants.block_frequency * span;
        Ok(parent.target.adjusted(actual, expected))
    }

    /// Timestamps of `parent_id` and its ancestors, most recent first, up to
    /// the median window size. Input to the minimum-timestamp rule.
    pub fn timestamp_window(
        &self,
        parent_id: &BlockID,
        window: usize,
    ) -> Result<Vec<crate::types::Timestamp>> {
        let mut timestamps = Vec::with_capacity(window);
        let mut current = self.expect_node(parent_id)?;
        loop {
            timestamps.push(current.block.timestamp);
            if timestamps.len() == window {
                break;
            }
            match current.parent {
                Some(parent) => current = self.expect_node(&parent)?,
                None => break,
            }
        }
        Ok(timestamps)
    }
}
