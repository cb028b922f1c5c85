//! Hash keys and labels.
//!
//! Hashes are computed outside of this crate. A [`HashKey`] is only ever cached next to the
//! vertex it was computed for and becomes void when the subtree below that vertex changes.

use crate::vertex::VertexId;
use core::fmt;

/// The 256-bit content hash of a vertex.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashKey(pub [u8; 32]);

impl fmt::Debug for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Abbreviated, the full key is rarely useful in logs.
        write!(f, "0x{}..", hex::encode(&self.0[..4]))
    }
}

/// A hash key scoped by the root of the trie the vertex belongs to.
///
/// Identical subtrees in different tries share a [`HashKey`] but never a [`HashLabel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashLabel {
    pub root: VertexId,
    pub key: HashKey,
}

impl HashLabel {
    pub fn new(root: VertexId, key: HashKey) -> Self {
        HashLabel { root, key }
    }
}
