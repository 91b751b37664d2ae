//! Batched membership proofs, their wire format, and the verification algorithm.
//!
//! A [BatchProof] covers many leaves at once, sharing the internal hashes their merkle
//! branches have in common. The verifier walks the targets bottom up, pairing each known
//! node with a sibling drawn either from the proof or from the working set, and hashing
//! parents until it reaches the roots. The output is the reconstructed proof tree as
//! parent/left/right triples, which a [crate::accumulator::pollard::Pollard] can splice
//! into itself, plus the subset of roots that were recomputed.
use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt::Display;

#[cfg(feature = "with-serde")]
use serde::Deserialize;
#[cfg(feature = "with-serde")]
use serde::Serialize;

use super::node_hash::NodeHash;
use super::util::is_left_niece;
use super::util::is_right_sibling;
use super::util::is_root_position;
use super::util::is_sibling;
use super::util::parent;
use super::util::proof_positions;
use super::util::root_positions;
use super::util::tree_rows;

/// A position and the hash committed at that position. The row and role of the node are
/// recoverable from the position alone, so no further tagging is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofNode {
    pub pos: u64,
    pub hash: NodeHash,
}

/// A parent and its two children, as recomputed during verification. `left.pos` is even
/// and `right.pos` is `left.pos | 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiniTree {
    pub parent: ProofNode,
    pub left: ProofNode,
    pub right: ProofNode,
}

/// The ways proof decoding, verification or reconstruction can fail. Errors are returned
/// to the caller unchanged, there is no retry and no partial success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofError {
    /// A non-empty encoding was shorter than the 4 byte target count.
    TruncatedHeader,
    /// The encoding ended inside the target list.
    TruncatedTargets,
    /// The trailing hash bytes are not a multiple of 32.
    UnalignedProofTail,
    /// Verification or reconstruction ran out of proof hashes mid-walk.
    ProofExhausted,
    /// The climb found neither a proof hash nor a computed node for a sibling.
    MissingSibling,
    /// The recomputed roots do not appear among the committed roots in order.
    RootMismatch,
    /// Targets are unsorted, duplicated or not below the leaf count.
    InvalidTargets,
    /// Reconstruction finished with proof hashes left over.
    ProofSurplus,
}

impl Display for ProofError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProofError::TruncatedHeader => write!(f, "proof too short to hold a target count"),
            ProofError::TruncatedTargets => write!(f, "proof ended inside the target list"),
            ProofError::UnalignedProofTail => {
                write!(f, "trailing proof bytes are not a multiple of 32")
            }
            ProofError::ProofExhausted => write!(f, "ran out of proof hashes"),
            ProofError::MissingSibling => write!(f, "no sibling available for a computed node"),
            ProofError::RootMismatch => {
                write!(f, "recomputed roots don't match the accumulator roots")
            }
            ProofError::InvalidTargets => {
                write!(f, "targets are unsorted, duplicated or out of range")
            }
            ProofError::ProofSurplus => write!(f, "proof hashes left over after reconstruction"),
        }
    }
}

impl std::error::Error for ProofError {}

/// A proof is a collection of targets and hashes. Each target is the position of a leaf
/// being proven. The hashes are everything the verifier cannot compute by itself: the
/// targets' own leaf hashes and the siblings along their branches, laid out in ascending
/// position order (targets merged with the proof positions for the target set).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub struct BatchProof {
    /// The positions of the leaves being proven. The verifier requires them sorted, see
    /// [BatchProof::sort_targets]. Provers may emit them in request order.
    pub targets: Vec<u64>,
    /// The proof hashes. Their positions are not stored, they are implied by the targets
    /// and the leaf count.
    pub hashes: Vec<NodeHash>,
}

impl Display for BatchProof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} targets: ", self.targets.len())?;
        for target in self.targets.iter() {
            write!(f, "{target} ")?;
        }
        write!(f, "\n{} proofs: ", self.hashes.len())?;
        for hash in self.hashes.iter() {
            write!(f, "{:02x}{:02x}{:02x}{:02x} ", hash[0], hash[1], hash[2], hash[3])?;
        }
        writeln!(f)
    }
}

impl BatchProof {
    /// Creates a proof from targets and hashes. No validation happens here, an
    /// inconsistent proof is caught during verification.
    pub fn new(targets: Vec<u64>, hashes: Vec<NodeHash>) -> Self {
        BatchProof { targets, hashes }
    }

    /// Sorts the targets in ascending order, as verification requires. The hashes are
    /// already laid out in sorted-target order by the prover, so they stay untouched.
    /// Sorting twice is the same as sorting once.
    pub fn sort_targets(&mut self) {
        self.targets.sort_unstable();
    }

    /// Serializes the proof. An empty proof encodes to zero bytes. Otherwise the layout
    /// is a 4 byte big-endian target count, the targets as 8 byte big-endian integers,
    /// then the raw proof hashes.
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.targets.is_empty() {
            return Vec::new();
        }

        let mut buf = Vec::with_capacity(4 + self.targets.len() * 8 + self.hashes.len() * 32);
        buf.extend_from_slice(&(self.targets.len() as u32).to_be_bytes());
        for target in self.targets.iter() {
            buf.extend_from_slice(&target.to_be_bytes());
        }
        for hash in self.hashes.iter() {
            buf.extend_from_slice(&**hash);
        }

        buf
    }

    /// Deserializes a proof produced by [BatchProof::to_bytes]. The proof hash count is
    /// implied by the remaining length; whether it matches the target set is only checked
    /// during verification.
    pub fn from_bytes(bytes: &[u8]) -> Result<BatchProof, ProofError> {
        if bytes.is_empty() {
            return Ok(BatchProof::default());
        }
        if bytes.len() < 4 {
            return Err(ProofError::TruncatedHeader);
        }

        let mut count = [0u8; 4];
        count.copy_from_slice(&bytes[..4]);
        let num_targets = u32::from_be_bytes(count) as usize;

        let rest = &bytes[4..];
        if (rest.len() as u64) < num_targets as u64 * 8 {
            return Err(ProofError::TruncatedTargets);
        }
        let (target_bytes, hash_bytes) = rest.split_at(num_targets * 8);

        let mut targets = Vec::with_capacity(num_targets);
        for chunk in target_bytes.chunks_exact(8) {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            targets.push(u64::from_be_bytes(bytes));
        }

        if hash_bytes.len() % 32 != 0 {
            return Err(ProofError::UnalignedProofTail);
        }
        let hashes = hash_bytes.chunks_exact(32).map(NodeHash::from).collect();

        Ok(BatchProof { targets, hashes })
    }

    /// Verifies the proof against the accumulator roots, without any cached nodes.
    ///
    /// `roots` must be ordered shortest tree first, the order
    /// [crate::accumulator::pollard::Pollard::root_hashes_reverse] returns. On success,
    /// returns the recomputed proof tree as [MiniTree]s, bottom up, and the subset of
    /// roots that the targets hash up to, in the same shortest-first order.
    pub fn verify(
        &self,
        roots: &[NodeHash],
        num_leaves: u64,
    ) -> Result<(Vec<MiniTree>, Vec<ProofNode>), ProofError> {
        self.verify_with_cache(roots, num_leaves, |_| None)
    }

    /// Verifies the proof, fetching already-known parent hashes from `cached`. A cache
    /// entry short-circuits the hash computation for that position; a cache populated
    /// only with hashes that would be computed anyway does not change the output.
    pub fn verify_with_cache<F>(
        &self,
        roots: &[NodeHash],
        num_leaves: u64,
        cached: F,
    ) -> Result<(Vec<MiniTree>, Vec<ProofNode>), ProofError>
    where
        F: Fn(u64) -> Option<NodeHash>,
    {
        if self.targets.is_empty() {
            return Ok((vec![], vec![]));
        }
        self.check_targets(num_leaves)?;

        let rows = tree_rows(num_leaves);
        let (proof_positions, computable_positions) =
            proof_positions(&self.targets, num_leaves, rows);

        let mut targets = self.targets.as_slice();
        let mut proofs = self.hashes.as_slice();

        // target_nodes holds the nodes that are known. On the bottom row those are the
        // targets, above it the computed parents. root_candidates holds the computed
        // roots, compared against the actual roots at the end.
        let mut target_nodes: VecDeque<ProofNode> =
            VecDeque::with_capacity(self.targets.len() * rows as usize);
        let mut root_candidates: Vec<ProofNode> = Vec::with_capacity(roots.len());
        let mut trees: Vec<MiniTree> = Vec::with_capacity(computable_positions.len());

        // Seed row 0. The wire interleaves target hashes with row 0 sibling hashes, so
        // the sibling hashes get reordered into proof_hashes for the climb to consume.
        let mut proof_hashes: Vec<NodeHash> = Vec::with_capacity(proof_positions.len());
        let mut targets_matched = 0;
        while !targets.is_empty() {
            if targets[0] == num_leaves - 1 && num_leaves & 1 == 1 {
                // the target is the lone row 0 root. The prover emits one placeholder
                // hash for it, the committed root is what counts.
                let root = roots.first().ok_or(ProofError::RootMismatch)?;
                root_candidates.push(ProofNode {
                    pos: targets[0],
                    hash: *root,
                });
                if proofs.is_empty() {
                    return Err(ProofError::ProofExhausted);
                }
                proofs = &proofs[1..];
                break;
            }

            if targets_matched < proof_positions.len()
                && targets[0] ^ 1 == proof_positions[targets_matched]
            {
                // unpaired target. Two hashes travel together, the target's own and its
                // sibling's, in position order.
                if proofs.len() < 2 {
                    return Err(ProofError::ProofExhausted);
                }
                let lr = (targets[0] & 1) as usize;
                target_nodes.push_back(ProofNode {
                    pos: targets[0],
                    hash: proofs[lr],
                });
                proof_hashes.push(proofs[lr ^ 1]);
                targets_matched += 1;
                proofs = &proofs[2..];
                targets = &targets[1..];
                continue;
            }

            // the next two targets must be siblings, both their hashes are in the proof
            if proofs.len() < 2 {
                return Err(ProofError::ProofExhausted);
            }
            if targets.len() < 2 {
                return Err(ProofError::MissingSibling);
            }
            target_nodes.push_back(ProofNode {
                pos: targets[0],
                hash: proofs[0],
            });
            target_nodes.push_back(ProofNode {
                pos: targets[1],
                hash: proofs[1],
            });
            proofs = &proofs[2..];
            targets = &targets[2..];
        }

        proof_hashes.extend_from_slice(proofs);
        let mut proofs = proof_hashes.as_slice();
        let mut proof_positions = proof_positions.as_slice();

        // hash every known node with its sibling, which is either in the proof or also a
        // known node, until everything has reached a root
        while let Some(target) = target_nodes.pop_front() {
            let sibling = if proof_positions.first() == Some(&(target.pos ^ 1)) {
                let (hash, rest) = proofs.split_first().ok_or(ProofError::ProofExhausted)?;
                let sibling = ProofNode {
                    pos: proof_positions[0],
                    hash: *hash,
                };
                proof_positions = &proof_positions[1..];
                proofs = rest;
                sibling
            } else {
                // the sibling must be the next node in the working set
                target_nodes.pop_front().ok_or(ProofError::MissingSibling)?
            };

            let (left, right) = if is_left_niece(target.pos) {
                (target, sibling)
            } else {
                (sibling, target)
            };

            let parent_pos = parent(target.pos, rows);
            let hash = match cached(parent_pos) {
                Some(hash) => hash,
                None => NodeHash::parent_hash(&left.hash, &right.hash),
            };
            trees.push(MiniTree {
                parent: ProofNode {
                    pos: parent_pos,
                    hash,
                },
                left,
                right,
            });

            if is_root_position(parent_pos, num_leaves, rows) {
                root_candidates.push(ProofNode {
                    pos: parent_pos,
                    hash,
                });
                continue;
            }
            target_nodes.push_back(ProofNode {
                pos: parent_pos,
                hash,
            });
        }

        if root_candidates.is_empty() {
            return Err(ProofError::RootMismatch);
        }

        // candidates arrive shortest tree first and must match the committed roots in
        // order. A single cursor walks both lists, a candidate that fails leaves later
        // candidates to try against the remaining roots.
        let mut matched = 0;
        for root in roots.iter() {
            if matched < root_candidates.len() && *root == root_candidates[matched].hash {
                matched += 1;
            }
        }
        if matched != root_candidates.len() {
            return Err(ProofError::RootMismatch);
        }

        Ok((trees, root_candidates))
    }

    /// Places every proof hash at its position in the forest, without computing any
    /// hashes. The result holds exactly the positions whose hashes travel in the proof,
    /// so a sparse accumulator can file them away. Fails if the hash count does not
    /// match what the target set requires.
    pub fn reconstruct(
        &self,
        num_leaves: u64,
        forest_rows: u8,
    ) -> Result<HashMap<u64, NodeHash>, ProofError> {
        let mut proof_tree = HashMap::new();
        if self.targets.is_empty() {
            return Ok(proof_tree);
        }
        self.check_targets(num_leaves)?;

        let mut proof = self.hashes.as_slice();
        let mut targets = self.targets.as_slice();
        let (root_positions, root_rows) = root_positions(num_leaves, forest_rows);

        // positions whose siblings are expected in the proof at the row being walked
        let mut need_sib_row: Vec<u64> = Vec::new();
        let mut next_row: Vec<u64> = Vec::new();

        // row 0: two hashes and one or two targets come off at a time
        while !proof.is_empty() && !targets.is_empty() {
            if Some(&targets[0]) == root_positions.first() {
                // the target is a root, which can only happen at row 0. A placeholder
                // hash is sent anyway.
                proof_tree.insert(targets[0], proof[0]);
                proof = &proof[1..];
                targets = &targets[1..];
                continue;
            }

            if proof.len() < 2 {
                return Err(ProofError::ProofExhausted);
            }

            let right = targets[0] | 1;
            let left = right ^ 1;
            proof_tree.insert(left, proof[0]);
            proof_tree.insert(right, proof[1]);
            need_sib_row.push(parent(targets[0], forest_rows));
            proof = &proof[2..];

            if targets.len() > 1 && is_right_sibling(targets[0], targets[1]) {
                targets = &targets[2..];
            } else {
                targets = &targets[1..];
            }
        }

        // the row 0 root is behind us either way
        let mut roots_idx = usize::from(root_rows.first() == Some(&0));

        // the rest is pure proof hashes, walked bottom to top
        for row in 1..forest_rows {
            let mut idx = 0;
            while idx < need_sib_row.len() {
                let pos = need_sib_row[idx];
                if root_positions.get(roots_idx) == Some(&pos) {
                    // roots are neither needed nor sent
                    idx += 1;
                    roots_idx += 1;
                    continue;
                }

                next_row.push(parent(pos, forest_rows));

                if idx + 1 < need_sib_row.len() && is_sibling(pos, need_sib_row[idx + 1]) {
                    // both siblings are known, no hash travels for them
                    idx += 2;
                } else {
                    if proof.is_empty() {
                        return Err(ProofError::ProofExhausted);
                    }
                    proof_tree.insert(pos ^ 1, proof[0]);
                    proof = &proof[1..];
                    idx += 1;
                }
            }

            // a root on this row that no branch passes through gets skipped here
            if root_rows.get(roots_idx) == Some(&row) {
                roots_idx += 1;
            }

            need_sib_row = std::mem::take(&mut next_row);
        }

        if !proof.is_empty() {
            return Err(ProofError::ProofSurplus);
        }

        Ok(proof_tree)
    }

    // targets must be strictly ascending and below the leaf count
    fn check_targets(&self, num_leaves: u64) -> Result<(), ProofError> {
        if self.targets.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ProofError::InvalidTargets);
        }
        if self.targets.last().map_or(false, |last| *last >= num_leaves) {
            return Err(ProofError::InvalidTargets);
        }
        Ok(())
    }
}
