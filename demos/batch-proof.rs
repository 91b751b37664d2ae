//! An end-to-end walk through the batch proof flow: a bridge node with a full forest
//! proves a block's worth of spends, the proof crosses the wire as bytes, and a compact
//! state node holding only the roots verifies it and hydrates its pollard with just
//! enough nodes to perform the deletions.

use bitcoin_hashes::sha256;
use bitcoin_hashes::Hash;
use bitcoin_hashes::HashEngine;
use utreexo::accumulator::mem_forest::MemForest;
use utreexo::accumulator::node_hash::NodeHash;
use utreexo::accumulator::pollard::Pollard;
use utreexo::accumulator::proof::BatchProof;

fn leaf_hash(value: u8) -> NodeHash {
    let mut engine = sha256::Hash::engine();
    engine.input(&[value]);
    sha256::Hash::from_engine(engine).into()
}

fn main() {
    // The bridge node accumulates the whole UTXO set.
    let utxos: Vec<NodeHash> = (0..21).map(leaf_hash).collect();
    let mut forest = MemForest::new();
    forest.add(&utxos);

    // A block spends a few of those outputs; the bridge node proves them all at once.
    let spent = [utxos[3], utxos[9], utxos[10], utxos[20]];
    let mut proof = forest.prove_batch(&spent).expect("leaves are in the forest");
    proof.sort_targets();

    // The proof ships as bytes.
    let wire = proof.to_bytes();
    println!("proof for {} spends: {} bytes", spent.len(), wire.len());

    // A compact state node holds only the roots and the leaf count.
    let received = BatchProof::from_bytes(&wire).expect("wire bytes are well formed");
    let roots = forest.root_hashes_reverse();
    let (trees, recomputed) = received
        .verify(&roots, forest.leaves())
        .expect("the block's proof is valid");
    println!(
        "verified: {} recomputed subtrees, {} roots touched",
        trees.len(),
        recomputed.len()
    );

    // A pollard holder splices the proven branches in, after which every node needed to
    // delete the spent outputs is cached locally.
    let mut pollard = Pollard::from_roots(&forest.roots(), forest.leaves());
    pollard
        .ingest_batch_proof(&received)
        .expect("the proof just verified");

    for target in received.targets.iter() {
        let cached = pollard.read_pos(*target).expect("target is cached");
        println!("position {target}: {cached}");
    }
}
