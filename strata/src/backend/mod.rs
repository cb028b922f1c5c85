//! The physical key/value backend consumed by the fork group.
//!
//! Backends are shared by every view of a fork group. Reads go straight through; writes are
//! collected in a [`WriteBatch`] and applied all at once by [`Backend::end_batch`].

use strata_core::{HashKey, HashLabel, IdGen, Vertex, VertexId};

mod memory;

pub use memory::{MemoryBackend, MemoryDump};

/// The commit marker written alongside every persisted batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavedState {
    /// Incremented by one on every successful persist.
    pub serial: u64,
    /// The key of the account trie root at the time of the persist, if it was known.
    pub state_root: Option<HashKey>,
}

/// A physical store for vertices, labels and allocator state.
pub trait Backend: Send + Sync {
    /// Load a vertex. `None` if the backend holds nothing for `vid`.
    fn get_vertex(&self, vid: VertexId) -> anyhow::Result<Option<Vertex>>;

    /// Load the cached label of a vertex. `None` if there is none.
    fn get_label(&self, vid: VertexId) -> anyhow::Result<Option<HashLabel>>;

    /// Load the allocator state. A fresh backend returns the default allocator.
    fn get_id_gen(&self) -> anyhow::Result<IdGen>;

    /// Load the last commit marker, if anything was ever committed.
    fn get_saved_state(&self) -> anyhow::Result<Option<SavedState>>;

    /// Open a new write batch.
    fn begin_batch(&self) -> WriteBatch {
        WriteBatch::default()
    }

    /// Apply a write batch. Either every write in the batch lands or none does.
    fn end_batch(&self, batch: WriteBatch) -> anyhow::Result<()>;
}

/// A set of writes to be applied atomically.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    vertices: Vec<(VertexId, Option<Vertex>)>,
    labels: Vec<(VertexId, Option<HashLabel>)>,
    id_gen: Option<IdGen>,
    saved_state: Option<SavedState>,
}

impl WriteBatch {
    /// Write a vertex. `None` deletes it.
    pub fn put_vertex(&mut self, vid: VertexId, vertex: Option<Vertex>) {
        self.vertices.push((vid, vertex));
    }

    /// Write a label. `None` deletes it.
    pub fn put_label(&mut self, vid: VertexId, label: Option<HashLabel>) {
        self.labels.push((vid, label));
    }

    /// Replace the allocator state, including the free-list high-water mark.
    pub fn put_id_gen(&mut self, id_gen: IdGen) {
        self.id_gen = Some(id_gen);
    }

    pub fn put_saved_state(&mut self, state: SavedState) {
        self.saved_state = Some(state);
    }

    /// Vertex writes in the order they were made.
    pub fn vertices(&self) -> &[(VertexId, Option<Vertex>)] {
        &self.vertices
    }

    /// Label writes in the order they were made.
    pub fn labels(&self) -> &[(VertexId, Option<HashLabel>)] {
        &self.labels
    }

    pub fn id_gen(&self) -> Option<&IdGen> {
        self.id_gen.as_ref()
    }

    pub fn saved_state(&self) -> Option<SavedState> {
        self.saved_state
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
            && self.labels.is_empty()
            && self.id_gen.is_none()
            && self.saved_state.is_none()
    }
}
