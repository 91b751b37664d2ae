//! [NodeHash] is the type of every node in the accumulator. It's a wrapper around a
//! `[u8; 32]` with the methods the forest needs. The all-zero value is the designated
//! empty hash, used for positions that hold no data.
//!
//! # Examples
//! Building from a str
//! ```
//! use std::str::FromStr;
//!
//! use utreexo::accumulator::node_hash::NodeHash;
//! let hash = NodeHash::from_str(
//!     "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d",
//! )
//! .unwrap();
//! assert_eq!(
//!     hash.to_string().as_str(),
//!     "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d"
//! );
//! ```
//! Computing a parent hash (i.e. a hash of two nodes concatenated)
//! ```
//! use std::str::FromStr;
//!
//! use utreexo::accumulator::node_hash::NodeHash;
//! let left = NodeHash::from_str(
//!     "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d",
//! )
//! .unwrap();
//! let right = NodeHash::from_str(
//!     "4bf5122f344554c53bde2ebb8cd2b7e3d1600ad631c385a5d7cce23c7785459a",
//! )
//! .unwrap();
//! let parent = NodeHash::parent_hash(&left, &right);
//! let expected = NodeHash::from_str(
//!     "02242b37d8e851f1e86f46790298c7097df06893d6226b7c1453c213e91717de",
//! )
//! .unwrap();
//! assert_eq!(parent, expected);
//! ```
use std::fmt::Debug;
use std::fmt::Display;
use std::ops::Deref;
use std::str::FromStr;

use bitcoin_hashes::hex;
use bitcoin_hashes::sha256;
use bitcoin_hashes::Hash;
#[cfg(feature = "with-serde")]
use serde::Deserialize;
#[cfg(feature = "with-serde")]
use serde::Serialize;
use sha2::Digest;
use sha2::Sha512_256;

#[derive(Eq, PartialEq, Copy, Clone, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
/// A 32 byte hash of a node in the forest. Leaves commit to the data being accumulated,
/// internal nodes commit to the concatenation of their children.
pub struct NodeHash([u8; 32]);

impl Deref for NodeHash {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for NodeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Debug for NodeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        if self.is_empty() {
            return write!(f, "empty");
        }
        write!(f, "{self}")
    }
}

impl From<[u8; 32]> for NodeHash {
    fn from(hash: [u8; 32]) -> Self {
        NodeHash(hash)
    }
}

impl From<&[u8; 32]> for NodeHash {
    fn from(hash: &[u8; 32]) -> Self {
        NodeHash(*hash)
    }
}

impl From<&[u8]> for NodeHash {
    fn from(hash: &[u8]) -> Self {
        let mut inner = [0; 32];
        inner.copy_from_slice(hash);
        NodeHash(inner)
    }
}

impl From<sha256::Hash> for NodeHash {
    fn from(hash: sha256::Hash) -> Self {
        NodeHash(hash.to_byte_array())
    }
}

impl FromStr for NodeHash {
    type Err = hex::HexToArrayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = hex::FromHex::from_hex(s)?;
        Ok(NodeHash(inner))
    }
}

impl NodeHash {
    /// Creates a new NodeHash from a 32 byte array.
    pub fn new(inner: [u8; 32]) -> Self {
        NodeHash(inner)
    }

    /// The empty hash, marking positions that hold no data.
    pub fn empty() -> Self {
        NodeHash([0; 32])
    }

    /// Whether this hash is the empty hash.
    pub fn is_empty(&self) -> bool {
        self.0 == [0; 32]
    }

    /// Returns the merkle parent of the two passed in nodes, a SHA-512/256 of the
    /// concatenated child hashes.
    /// # Example
    /// ```
    /// use std::str::FromStr;
    ///
    /// use utreexo::accumulator::node_hash::NodeHash;
    /// let left = NodeHash::new([0; 32]);
    /// let right = NodeHash::new([1; 32]);
    /// let parent = NodeHash::parent_hash(&left, &right);
    /// let expected = NodeHash::from_str(
    ///     "34e33ca0c40b7bd33d28932ca9e35170def7309a3bf91ecda5e1ceb067548a12",
    /// )
    /// .unwrap();
    /// assert_eq!(parent, expected);
    /// ```
    pub fn parent_hash(left: &NodeHash, right: &NodeHash) -> NodeHash {
        let hash = Sha512_256::new()
            .chain_update(&**left)
            .chain_update(&**right)
            .finalize();

        NodeHash::from(hash.as_slice())
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::NodeHash;
    use crate::accumulator::util::hash_from_u8;

    #[test]
    fn test_parent_hash() {
        let hash1 = hash_from_u8(0);
        let hash2 = hash_from_u8(1);

        let parent_hash = NodeHash::parent_hash(&hash1, &hash2);
        assert_eq!(
            parent_hash.to_string().as_str(),
            "02242b37d8e851f1e86f46790298c7097df06893d6226b7c1453c213e91717de"
        );
    }

    #[test]
    fn test_hash_from_str() {
        let hash = NodeHash::from_str(
            "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d",
        )
        .unwrap();
        assert_eq!(hash, hash_from_u8(0));
    }

    #[test]
    fn test_empty_hash() {
        let hash = NodeHash::from_str(
            "0000000000000000000000000000000000000000000000000000000000000000",
        )
        .unwrap();
        assert!(hash.is_empty());
        assert_eq!(hash, NodeHash::empty());
    }
}
