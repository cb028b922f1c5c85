//! The vertices of a hexary Merkle-Patricia trie and their identifiers.
//!
//! Vertices never reference each other directly. A [`VertexId`] is the only handle on a vertex
//! and is resolved through whatever store holds it. Trie tables are multi-rooted: one account
//! trie rooted at [`VertexId::ACCOUNTS`] plus one storage trie per account, so lookups are
//! always scoped by a root.
//!
//! There are three kinds of vertices.
//!   1. Branch vertices, which have up to 16 children indexed by nibble. Once a mutation has
//!      completed, every branch has at least two children.
//!   2. Extension vertices, which carry a non-empty nibble prefix shared by everything below
//!      their single child.
//!   3. Leaf vertices, which carry the remaining nibbles of a path and the payload stored there.

use crate::nibbles::NibblePath;
use alloc::vec::Vec;
use arrayvec::ArrayVec;
use core::fmt;
use ruint::aliases::U256;

/// The number of child slots of a branch vertex.
pub const BRANCH_WIDTH: usize = 16;

/// An opaque vertex identifier. Zero is reserved as the void identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub u64);

impl VertexId {
    /// The void identifier. Denotes an absent child, or a deleted entry where an ID is expected.
    pub const VOID: VertexId = VertexId(0);
    /// The root of the account trie.
    pub const ACCOUNTS: VertexId = VertexId(1);
    /// The smallest identifier handed out by the allocator. Everything below is a fixed root.
    pub const LEAST_FREE: VertexId = VertexId(2);

    /// Whether this is anything other than [`VertexId::VOID`].
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// Whether this identifier is a fixed root which is never recycled.
    pub fn is_reserved(&self) -> bool {
        *self < VertexId::LEAST_FREE
    }
}

impl fmt::Debug for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// A vertex identifier scoped by the root of the trie it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootedVertexId {
    pub root: VertexId,
    pub vid: VertexId,
}

/// Key of the leaf-path cache: a trie root and the full nibble path of a leaf below it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeafTie {
    pub root: VertexId,
    pub path: NibblePath,
}

/// The kind of a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexKind {
    Branch,
    Extension,
    Leaf,
}

/// Account data stored in a leaf of the account trie.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AccountData {
    pub nonce: u64,
    pub balance: U256,
    pub code_hash: [u8; 32],
    /// The root of this account's storage trie, or [`VertexId::VOID`] if it has no storage.
    pub storage_id: VertexId,
}

/// The payload carried by a leaf vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// An opaque value, typically a storage slot.
    Raw(Vec<u8>),
    /// An account.
    Account(AccountData),
}

/// A trie vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vertex {
    Branch {
        /// Child identifiers indexed by nibble. [`VertexId::VOID`] marks an empty slot.
        children: [VertexId; BRANCH_WIDTH],
    },
    Extension {
        prefix: NibblePath,
        child: VertexId,
    },
    Leaf {
        prefix: NibblePath,
        payload: Payload,
    },
}

impl Vertex {
    /// Get the kind of this vertex.
    pub fn kind(&self) -> VertexKind {
        match self {
            Vertex::Branch { .. } => VertexKind::Branch,
            Vertex::Extension { .. } => VertexKind::Extension,
            Vertex::Leaf { .. } => VertexKind::Leaf,
        }
    }

    /// Create a branch vertex from `(nibble, child)` pairs. Unmentioned slots are empty.
    ///
    /// Panics if a nibble is out of range.
    pub fn branch(children: impl IntoIterator<Item = (u8, VertexId)>) -> Self {
        let mut slots = [VertexId::VOID; BRANCH_WIDTH];
        for (nibble, vid) in children {
            slots[nibble as usize] = vid;
        }
        Vertex::Branch { children: slots }
    }

    /// The valid identifiers directly referenced by this vertex. Leaves reference nothing;
    /// storage tries hanging off account leaves are separate roots.
    pub fn children(&self) -> ArrayVec<VertexId, BRANCH_WIDTH> {
        let mut out = ArrayVec::new();
        match self {
            Vertex::Branch { children } => {
                out.extend(children.iter().copied().filter(VertexId::is_valid));
            }
            Vertex::Extension { child, .. } if child.is_valid() => out.push(*child),
            Vertex::Extension { .. } | Vertex::Leaf { .. } => {}
        }
        out
    }

    /// The prefix of an extension or leaf vertex. Branches have none.
    pub fn prefix(&self) -> Option<&NibblePath> {
        match self {
            Vertex::Branch { .. } => None,
            Vertex::Extension { prefix, .. } | Vertex::Leaf { prefix, .. } => Some(prefix),
        }
    }
}
