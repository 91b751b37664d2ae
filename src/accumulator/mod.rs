//! This module is the core of the library. It contains the data structures that make up the
//! accumulator, and the algorithms that produce, verify and consume batched membership proofs.
//!
//! The prover side lives in [mem_forest::MemForest], a full forest that can prove arbitrary
//! subsets of its leaves. The verifier side needs only the roots and the leaf count, see
//! [proof::BatchProof::verify]. A middle ground is the [pollard::Pollard], which keeps the roots
//! plus whichever branches it has learned from proofs, and can feed cached hashes back into
//! verification.
pub mod mem_forest;
pub mod node_hash;
pub mod pollard;
pub mod proof;
pub(super) mod util;
