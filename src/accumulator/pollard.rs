//! A sparse accumulator that holds the roots plus whichever branches it has learned from
//! proofs. A compact state node keeps one of these: it can verify batched proofs against
//! its roots, splice the proven subtrees in, and afterwards has every node the deletion
//! machinery needs to touch.
//!
//! Nodes hold their hash and two *niece* pointers (not children!). A node's nieces are
//! its sibling's children; roots, having no sibling, hold their own children. The
//! deletion algorithm swaps siblings around, and reaching a sibling's children through
//! the node you already hold is cheaper than descending through the sibling. Every node
//! is owned by the node above it through the niece [Rc]s, the roots are owned by the
//! [Pollard] itself. Hashes live in [Cell]s and the links in [RefCell]s so that proof
//! ingestion can fill branches in behind a shared reference; none of this is [Sync],
//! wrap the pollard in a lock to share it between threads.
use std::cell::Cell;
use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use super::node_hash::NodeHash;
use super::proof::BatchProof;
use super::proof::MiniTree;
use super::proof::ProofError;
use super::proof::ProofNode;
use super::util::detect_row;
use super::util::is_root_populated;
use super::util::tree_rows;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollardError {
    /// The proof did not verify against this pollard's roots.
    InvalidProof(ProofError),
    /// A recomputed root has no counterpart among the pollard's roots. Only reachable
    /// with a proof verified against different roots than this pollard's.
    RootNotFound,
}

impl Display for PollardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollardError::InvalidProof(err) => write!(f, "invalid proof: {err}"),
            PollardError::RootNotFound => {
                write!(f, "could not find the root for a proven subtree")
            }
        }
    }
}

impl std::error::Error for PollardError {}

#[derive(Default)]
/// A node in the pollard. `data` is the node's own hash; the nieces point at the
/// sibling's children, except for roots, whose nieces are their own children.
struct PolNode {
    data: Cell<NodeHash>,
    left_niece: RefCell<Option<Rc<PolNode>>>,
    right_niece: RefCell<Option<Rc<PolNode>>>,
}

impl PolNode {
    fn new(hash: NodeHash) -> Rc<Self> {
        Rc::new(PolNode {
            data: Cell::new(hash),
            left_niece: RefCell::new(None),
            right_niece: RefCell::new(None),
        })
    }

    fn left_niece(&self) -> Option<Rc<PolNode>> {
        self.left_niece.borrow().clone()
    }

    fn right_niece(&self) -> Option<Rc<PolNode>> {
        self.right_niece.borrow().clone()
    }

    /// Returns the node in the slot, taking one from the block if the slot is empty.
    fn slot_or_take(
        slot: &RefCell<Option<Rc<PolNode>>>,
        block: &mut NodeBlock,
    ) -> Rc<PolNode> {
        let mut slot = slot.borrow_mut();
        match slot.as_ref() {
            Some(node) => node.clone(),
            None => {
                let node = block.take();
                *slot = Some(node.clone());
                node
            }
        }
    }
}

/// Node slots allocated up front for one ingestion, so the splice doesn't hit the
/// allocator once per node. Either the graph adopts a slot or the whole block drops at
/// the end of the ingestion.
struct NodeBlock {
    nodes: Vec<Rc<PolNode>>,
    used: usize,
}

impl NodeBlock {
    fn new(capacity: usize) -> Self {
        NodeBlock {
            nodes: (0..capacity).map(|_| Rc::new(PolNode::default())).collect(),
            used: 0,
        }
    }

    // at most two slots per mini tree get taken, the block is sized three per
    fn take(&mut self) -> Rc<PolNode> {
        let node = self.nodes[self.used].clone();
        self.used += 1;
        node
    }
}

/// The sparse accumulator. Holds the leaf count and one root slot per row; everything
/// else hangs off the roots through niece links.
pub struct Pollard {
    roots: [Option<Rc<PolNode>>; 64],
    num_leaves: u64,
}

impl Pollard {
    /// Builds a pollard from the committed state of an accumulator: the root hashes,
    /// tallest tree first, and the leaf count. No branches are cached yet; feed it
    /// proofs through [Pollard::ingest_batch_proof] to hydrate it.
    pub fn from_roots(roots: &[NodeHash], num_leaves: u64) -> Pollard {
        let mut root_nodes: [Option<Rc<PolNode>>; 64] = std::array::from_fn(|_| None);

        let mut hashes = roots.iter();
        for row in (0..64u8).rev() {
            if !is_root_populated(row, num_leaves) {
                continue;
            }
            if let Some(hash) = hashes.next() {
                root_nodes[row as usize] = Some(PolNode::new(*hash));
            }
        }

        Pollard {
            roots: root_nodes,
            num_leaves,
        }
    }

    /// How many leaves the accumulator commits to.
    pub fn leaves(&self) -> u64 {
        self.num_leaves
    }

    /// The root hashes, tallest tree first.
    pub fn roots(&self) -> Vec<NodeHash> {
        self.roots
            .iter()
            .rev()
            .filter_map(|root| root.as_ref().map(|root| root.data.get()))
            .collect()
    }

    /// The root hashes in reverse order, shortest tree first. This is the order the
    /// verifier consumes roots in.
    pub fn root_hashes_reverse(&self) -> Vec<NodeHash> {
        self.roots
            .iter()
            .filter_map(|root| root.as_ref().map(|root| root.data.get()))
            .collect()
    }

    /// Returns the hash at the given position if the pollard has it cached. `None` for
    /// positions that were never ingested, pruned branches, and positions outside the
    /// forest.
    pub fn read_pos(&self, pos: u64) -> Option<NodeHash> {
        let (node, _) = self.grab_position(pos)?;
        let hash = node.data.get();
        if hash.is_empty() {
            return None;
        }
        Some(hash)
    }

    /// Verifies a batched proof against this pollard's roots, with cached nodes standing
    /// in for hash computations where the pollard has them.
    pub fn verify(
        &self,
        proof: &BatchProof,
    ) -> Result<(Vec<MiniTree>, Vec<ProofNode>), ProofError> {
        let roots = self.root_hashes_reverse();
        proof.verify_with_cache(&roots, self.num_leaves, |pos| self.read_pos(pos))
    }

    /// Verifies the proof and splices the proven subtrees into the pollard, giving it
    /// every node needed to later delete the targets. Fails without touching the pollard
    /// if the proof doesn't verify. Requires sorted targets, see
    /// [BatchProof::sort_targets].
    ///
    /// Node slots are allocated in one contiguous block up front; nodes the pollard
    /// already has are left in place, with their hashes refreshed from the proof tree.
    pub fn ingest_batch_proof(&mut self, proof: &BatchProof) -> Result<(), PollardError> {
        let root_hashes = self.root_hashes_reverse();
        let (trees, root_candidates) = proof
            .verify_with_cache(&root_hashes, self.num_leaves, |pos| self.read_pos(pos))
            .map_err(PollardError::InvalidProof)?;

        let mut block = NodeBlock::new(trees.len() * 3);

        // walk the candidate roots and the pollard's roots with one shared cursor. The
        // candidates arrive in the same shortest-first order the root hashes are in.
        let mut cursor = 0;
        for candidate in root_candidates.iter() {
            loop {
                match root_hashes.get(cursor) {
                    Some(hash) if *hash == candidate.hash => break,
                    Some(_) => cursor += 1,
                    None => return Err(PollardError::RootNotFound),
                }
            }
            let root = self
                .root_at_reverse_index(cursor)
                .ok_or(PollardError::RootNotFound)?;
            self.populate(&root, candidate.pos, &trees, &mut block);
        }

        Ok(())
    }

    /// Places the children recorded for `pos` into the niece slots of `owner`, then
    /// descends. `owner` is the node whose nieces are `pos`'s children: the sibling for
    /// ordinary nodes, the root itself at the top of a tree.
    fn populate(&self, owner: &Rc<PolNode>, pos: u64, trees: &[MiniTree], block: &mut NodeBlock) {
        if pos < self.num_leaves {
            // a leaf, nothing below it to place
            return;
        }

        // mini trees are sorted by parent position, bottom row first
        let tree = match trees.binary_search_by_key(&pos, |tree| tree.parent.pos) {
            Ok(idx) => &trees[idx],
            // the branch below pos came in as a single proof hash, it stays opaque
            Err(_) => return,
        };

        let left = PolNode::slot_or_take(&owner.left_niece, block);
        left.data.set(tree.left.hash);
        let right = PolNode::slot_or_take(&owner.right_niece, block);
        right.data.set(tree.right.hash);

        // each child's children live in the other child's niece slots
        self.populate(&right, tree.left.pos, trees, block);
        self.populate(&left, tree.right.pos, trees, block);
    }

    // maps an index into the reverse (shortest first) root list to the root node
    fn root_at_reverse_index(&self, index: usize) -> Option<Rc<PolNode>> {
        let mut seen = 0;
        for row in 0..64u8 {
            if !is_root_populated(row, self.num_leaves) {
                continue;
            }
            if seen == index {
                return self.roots[row as usize].clone();
            }
            seen += 1;
        }
        None
    }

    fn grab_position(&self, pos: u64) -> Option<(Rc<PolNode>, Rc<PolNode>)> {
        if self.num_leaves == 0 || pos > (2u64 << tree_rows(self.num_leaves)) - 2 {
            return None;
        }

        let (root_row, depth, bits) = Self::detect_offset(pos, self.num_leaves)?;
        let mut node = self.roots.get(root_row as usize)?.clone()?;

        if depth == 0 {
            return Some((node.clone(), node));
        }

        // the niece layout flips the branch to take at every level but the last
        for row in 0..(depth - 1) {
            let next = if pos >> (depth - row - 1) & 1 == 1 {
                node.left_niece()?
            } else {
                node.right_niece()?
            };
            node = next;
        }

        if bits & 1 == 0 {
            Some((node.left_niece()?, node.right_niece()?))
        } else {
            Some((node.right_niece()?, node.left_niece()?))
        }
    }

    // finds which tree pos lives under: the row of that tree's root, how many rows down
    // pos sits, and the offset bits that drive the descent
    fn detect_offset(pos: u64, num_leaves: u64) -> Option<(u8, u8, u64)> {
        let mut tr = tree_rows(num_leaves);
        let nr = detect_row(pos, tr);

        let mut marker = pos;
        while (marker.wrapping_shl(nr as u32) & ((2u64 << tr) - 1)) >= ((1u64 << tr) & num_leaves)
        {
            marker = marker.checked_sub((1u64 << tr) & num_leaves)?;
            tr = tr.checked_sub(1)?;
        }
        if tr < nr {
            return None;
        }

        Some((tr, tr - nr, marker))
    }
}
