//! A full in-RAM forest, the proving side of the accumulator.
//!
//! [MemForest] keeps every node of every tree, addressed by position, so it can produce a
//! [BatchProof] for any subset of its leaves. Full nodes and bridge nodes run one of
//! these; compact state nodes only ever see the roots it commits to.
use std::collections::HashMap;
use std::fmt::Display;

use super::node_hash::NodeHash;
use super::proof::BatchProof;
use super::util::left_child;
use super::util::merge_sorted;
use super::util::num_roots;
use super::util::proof_positions;
use super::util::right_child;
use super::util::root_positions;
use super::util::start_position_at_row;
use super::util::tree_rows;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemForestError {
    /// The leaf being proven is not in the accumulator.
    LeafNotFound(NodeHash),
}

impl Display for MemForestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemForestError::LeafNotFound(hash) => write!(f, "leaf not found: {hash}"),
        }
    }
}

impl std::error::Error for MemForestError {}

/// An accumulator that stores the whole forest as a flat, position-indexed vector of
/// hashes. Slots that hold no node carry the empty hash.
#[derive(Debug, Clone, Default)]
pub struct MemForest {
    data: Vec<NodeHash>,
    position_map: HashMap<NodeHash, u64>,
    num_leaves: u64,
    rows: u8,
}

impl MemForest {
    /// Creates an empty forest.
    pub fn new() -> Self {
        MemForest::default()
    }

    /// How many leaves have ever been added to the forest.
    pub fn leaves(&self) -> u64 {
        self.num_leaves
    }

    /// Appends new leaves to the forest and recomputes the affected interior nodes.
    pub fn add(&mut self, adds: &[NodeHash]) {
        let mut leaves: Vec<NodeHash> = (0..self.num_leaves)
            .map(|pos| self.data[pos as usize])
            .collect();
        leaves.extend_from_slice(adds);
        self.rebuild(leaves);
    }

    /// Returns the hash at the given position, if the position holds a node.
    pub fn read(&self, pos: u64) -> Option<NodeHash> {
        let hash = self.data.get(pos as usize)?;
        if hash.is_empty() {
            return None;
        }
        Some(*hash)
    }

    /// The committed state of the forest: the root hashes, tallest tree first.
    pub fn roots(&self) -> Vec<NodeHash> {
        let (positions, _) = root_positions(self.num_leaves, self.rows);
        let mut roots = Vec::with_capacity(num_roots(self.num_leaves));
        for pos in positions.iter().rev() {
            roots.push(self.data[*pos as usize]);
        }
        roots
    }

    /// The root hashes in the order the verifier consumes them, shortest tree first.
    pub fn root_hashes_reverse(&self) -> Vec<NodeHash> {
        let (positions, _) = root_positions(self.num_leaves, self.rows);
        positions
            .iter()
            .map(|pos| self.data[*pos as usize])
            .collect()
    }

    /// Produces a batched inclusion proof for the given leaf hashes.
    ///
    /// Targets come back in request order; the proof hashes are laid out for the sorted
    /// target list, so callers must [BatchProof::sort_targets] them before verifying. The
    /// hashes on the wire are those of the sorted targets merged with their proof
    /// positions, in ascending position order.
    pub fn prove_batch(&self, del_hashes: &[NodeHash]) -> Result<BatchProof, MemForestError> {
        if del_hashes.is_empty() {
            return Ok(BatchProof::default());
        }

        let mut targets = Vec::with_capacity(del_hashes.len());
        for wanted in del_hashes {
            let pos = self
                .position_map
                .get(wanted)
                .ok_or(MemForestError::LeafNotFound(*wanted))?;
            targets.push(*pos);
        }

        let mut sorted_targets = targets.clone();
        sorted_targets.sort_unstable();

        let (proof_positions, _) = proof_positions(&sorted_targets, self.num_leaves, self.rows);
        let wire_positions = merge_sorted(&sorted_targets, &proof_positions);
        let hashes = wire_positions
            .iter()
            .map(|pos| self.data[*pos as usize])
            .collect();

        Ok(BatchProof::new(targets, hashes))
    }

    fn rebuild(&mut self, leaves: Vec<NodeHash>) {
        self.num_leaves = leaves.len() as u64;
        self.rows = tree_rows(self.num_leaves);

        let size = if self.num_leaves == 0 {
            0
        } else {
            (2usize << self.rows) - 1
        };
        self.data = vec![NodeHash::empty(); size];
        self.position_map = HashMap::with_capacity(leaves.len());

        for (pos, leaf) in leaves.into_iter().enumerate() {
            self.data[pos] = leaf;
            self.position_map.insert(leaf, pos as u64);
        }

        // row by row, every interior node whose subtree is fully populated
        for row in 1..=self.rows {
            let start = start_position_at_row(row, self.rows);
            for offset in 0..(self.num_leaves >> row) {
                let pos = start + offset;
                self.data[pos as usize] = NodeHash::parent_hash(
                    &self.data[left_child(pos, self.rows) as usize],
                    &self.data[right_child(pos, self.rows) as usize],
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::MemForest;
    use super::MemForestError;
    use crate::accumulator::node_hash::NodeHash;
    use crate::accumulator::util::hash_from_u8;

    fn forest_with(leaves: u8) -> MemForest {
        let hashes: Vec<NodeHash> = (0..leaves).map(hash_from_u8).collect();
        let mut forest = MemForest::new();
        forest.add(&hashes);
        forest
    }

    #[test]
    fn test_add_four() {
        let forest = forest_with(4);
        let roots = forest.roots();
        assert_eq!(roots.len(), 1);
        assert_eq!(
            roots[0],
            NodeHash::from_str(
                "df46b17be5f66f0750a4b3efa26d4679db170a72d41eb56c3e4ff75a58c65386"
            )
            .unwrap()
        );
    }

    #[test]
    fn test_add_eight() {
        let forest = forest_with(8);
        let roots = forest.roots();
        assert_eq!(roots.len(), 1);
        assert_eq!(
            roots[0],
            NodeHash::from_str(
                "b151a956139bb821d4effa34ea95c17560e0135d1e4661fc23cedc3af49dac42"
            )
            .unwrap()
        );
    }

    #[test]
    fn test_add_fifteen() {
        let forest = forest_with(15);
        let expected = [
            "b151a956139bb821d4effa34ea95c17560e0135d1e4661fc23cedc3af49dac42",
            "9c053db406c1a077112189469a3aca0573d3481bef09fa3d2eda3304d7d44be8",
            "55d0a0ef8f5c25a9da266b36c0c5f4b31008ece82df2512c8966bddcc27a66a0",
            "4d7b3ef7300acf70c892d8327db8272f54434adbc61a4e130a563cb59a0d0f47",
        ]
        .iter()
        .map(|hash| NodeHash::from_str(hash).unwrap())
        .collect::<Vec<_>>();

        assert_eq!(forest.roots(), expected);

        let mut reversed = expected;
        reversed.reverse();
        assert_eq!(forest.root_hashes_reverse(), reversed);
    }

    #[test]
    fn test_incremental_add_matches_batch_add() {
        let mut forest = MemForest::new();
        for value in 0..15 {
            forest.add(&[hash_from_u8(value)]);
        }
        assert_eq!(forest.roots(), forest_with(15).roots());
    }

    #[test]
    fn test_prove_single_leaf() {
        let forest = forest_with(8);
        let proof = forest.prove_batch(&[hash_from_u8(0)]).unwrap();

        assert_eq!(proof.targets, vec![0]);
        // own hash, sibling leaf, then the two upper siblings at positions 9 and 13
        let expected = [
            "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d",
            "4bf5122f344554c53bde2ebb8cd2b7e3d1600ad631c385a5d7cce23c7785459a",
            "9576f4ade6e9bc3a6458b506ce3e4e890df29cb14cb5d3d887672aef55647a2b",
            "29590a14c1b09384b94a2c0e94bf821ca75b62eacebc47893397ca88e3bbcbd7",
        ]
        .iter()
        .map(|hash| NodeHash::from_str(hash).unwrap())
        .collect::<Vec<_>>();
        assert_eq!(proof.hashes, expected);
    }

    #[test]
    fn test_prove_preserves_request_order() {
        let forest = forest_with(8);
        let del_hashes = [hash_from_u8(6), hash_from_u8(2)];
        let proof = forest.prove_batch(&del_hashes).unwrap();
        assert_eq!(proof.targets, vec![6, 2]);
    }

    #[test]
    fn test_prove_empty() {
        let forest = forest_with(8);
        let proof = forest.prove_batch(&[]).unwrap();
        assert!(proof.targets.is_empty());
        assert!(proof.hashes.is_empty());
    }

    #[test]
    fn test_prove_unknown_leaf() {
        let forest = forest_with(8);
        let unknown = hash_from_u8(0xcc);
        assert_eq!(
            forest.prove_batch(&[unknown]),
            Err(MemForestError::LeafNotFound(unknown))
        );
    }

    #[test]
    fn test_read() {
        let forest = forest_with(8);
        assert_eq!(forest.read(0), Some(hash_from_u8(0)));
        assert_eq!(
            forest.read(8),
            Some(NodeHash::parent_hash(&hash_from_u8(0), &hash_from_u8(1)))
        );
        assert_eq!(forest.read(100), None);
    }
}
