//! # Utreexo
//! [Utreexo](https://eprint.iacr.org/2019/611.pdf) is a dynamic accumulator that represents the
//! set of unspent transaction outputs of a UTXO-based ledger as a forest of perfect binary Merkle
//! trees. The committed state is just the ordered list of tree roots, so a node holding only the
//! roots can validate block-sized batches of spends against a short proof, instead of storing the
//! whole UTXO set.
//!
//! This crate implements the batch-proof subsystem: the positional arithmetic over the forest,
//! the batch proof wire format, batch proof verification, partial proof tree reconstruction, and
//! the ingestion of verified proofs into a sparse in-memory accumulator (a pollard). A full
//! in-RAM forest is included for the proving side. See the documentation of each module for
//! details and examples.
pub mod accumulator;
