//! A layered, forkable store for the vertices of a hexary Merkle-Patricia trie.
//!
//! Mutations are held in stacked copy-on-write [`Layer`]s owned by a [`View`]. Views are grouped
//! into a [`ForkGroup`] sharing one [`Backend`]; exactly one view of the group, the centre, may
//! write to it. Persisting folds a view's layers into its balancer and writes that as one atomic
//! batch, while sibling views are rebased so that they keep seeing the state they saw before.
//!
//! Deletion keeps tries canonical: after [`View::delete`] returns, no branch has fewer than two
//! children.

pub use strata_core::{
    AccountData, HashKey, HashLabel, IdGen, LeafTie, NibblePath, Payload, RootedVertexId, Vertex,
    VertexId, VertexKind,
};

pub use backend::{Backend, MemoryBackend, MemoryDump, SavedState, WriteBatch};
pub use error::{Error, Result};
pub use fork::{ForkGroup, RecentreGuard, ViewId};
pub use hike::{Hike, Leg};
pub use layer::{merge_onto, Layer, LayerDelta, LayerFinal};
pub use layers::LayerStack;
pub use leaf_cache::{CachedLeaf, LeafCache};
pub use options::Options;
pub use view::View;

mod backend;
mod delete;
mod error;
mod fork;
mod hike;
mod layer;
mod layers;
mod leaf_cache;
mod options;
mod persist;
mod view;
