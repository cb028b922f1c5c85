//! A view is one fork's window onto the store: its layer stack, its balancer and the shared
//! backend beneath them.
//!
//! Reads resolve through the layer stack, then the balancer, then the backend. Writes always
//! land in the top frame of the layer stack.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::layer::{merge_onto, Layer, LayerFinal};
use crate::layers::LayerStack;
use std::sync::Arc;
use strata_core::{HashLabel, IdGen, LeafTie, Vertex, VertexId};

pub struct View {
    pub(crate) layers: LayerStack,
    pub(crate) balancer: Option<Layer>,
    pub(crate) backend: Option<Arc<dyn Backend>>,
}

impl View {
    /// Create a view over `backend`, picking up the persisted allocator state.
    pub fn new(backend: Option<Arc<dyn Backend>>) -> Result<Self> {
        let id_gen = match backend {
            Some(ref backend) => backend.get_id_gen()?,
            None => IdGen::default(),
        };
        Ok(View {
            layers: LayerStack::new(LayerFinal::with_id_gen(id_gen)),
            balancer: None,
            backend,
        })
    }

    pub fn layers(&self) -> &LayerStack {
        &self.layers
    }

    /// The flattened delta which has not been persisted yet, if any was stowed.
    pub fn balancer(&self) -> Option<&Layer> {
        self.balancer.as_ref()
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Resolve a vertex. `None` if it does not exist or was deleted.
    pub fn get_vertex(&self, vid: VertexId) -> Result<Option<Vertex>> {
        match self.layers.get_vertex(vid) {
            Some(vertex) => Ok(vertex.cloned()),
            None => self.get_vertex_persisted(vid),
        }
    }

    /// Resolve a vertex skipping the layer stack: the balancer, then the backend.
    pub fn get_vertex_persisted(&self, vid: VertexId) -> Result<Option<Vertex>> {
        if let Some(vertex) = self
            .balancer
            .as_ref()
            .and_then(|balancer| balancer.delta.vertices.get(&vid))
        {
            return Ok(vertex.clone());
        }
        match self.backend {
            Some(ref backend) => Ok(backend.get_vertex(vid)?),
            None => Ok(None),
        }
    }

    /// Write a vertex to the top frame. `None` writes a tombstone.
    pub fn put_vertex(&mut self, vid: VertexId, vertex: Option<Vertex>) -> Result<()> {
        if self.is_locked(vid) {
            return Err(Error::VertexLocked(vid));
        }
        self.layers.put_vertex(vid, vertex);
        Ok(())
    }

    /// Resolve the cached label of a vertex. `None` if there is none or it is void.
    pub fn get_label(&self, vid: VertexId) -> Result<Option<HashLabel>> {
        if let Some(label) = self.layers.get_label(vid) {
            return Ok(label);
        }
        if let Some(label) = self
            .balancer
            .as_ref()
            .and_then(|balancer| balancer.delta.labels.get(&vid))
        {
            return Ok(*label);
        }
        match self.backend {
            Some(ref backend) => Ok(backend.get_label(vid)?),
            None => Ok(None),
        }
    }

    /// Set or void the label of a vertex.
    pub fn put_label(&mut self, vid: VertexId, label: Option<HashLabel>) -> Result<()> {
        if self.is_locked(vid) {
            return Err(Error::VertexLocked(vid));
        }
        self.layers.relabel(vid, label, self.balancer.as_ref());
        Ok(())
    }

    /// The vertices known to carry `label`. Only labels set through a layer are indexed.
    pub fn vids_by_label(&self, label: &HashLabel) -> imbl::HashSet<VertexId> {
        self.layers
            .vids_by_label(label)
            .or_else(|| {
                self.balancer
                    .as_ref()
                    .and_then(|balancer| balancer.delta.by_label.get(label))
            })
            .cloned()
            .unwrap_or_default()
    }

    /// The raw leaf-path table entry for `tie`. `Some(VertexId::VOID)` records a deletion.
    pub fn leaf_vid(&self, tie: &LeafTie) -> Option<VertexId> {
        self.layers.final_state().leaves.get(tie).copied()
    }

    /// Record the vertex holding the leaf at `tie`.
    pub fn put_leaf_vid(&mut self, tie: LeafTie, vid: VertexId) {
        self.layers.put_leaf(tie, vid);
    }

    pub(crate) fn remove_leaf_vid(&mut self, tie: &LeafTie) {
        self.layers.remove_leaf(tie);
    }

    /// Whether `vid` was dropped as a subtree root and not persisted since.
    pub fn is_dropped(&self, vid: VertexId) -> bool {
        self.layers.is_dropped(vid)
            || self
                .balancer
                .as_ref()
                .map_or(false, |balancer| balancer.delta.dropped_trees.contains(&vid))
    }

    /// Protect a vertex against mutation and deletion.
    pub fn lock(&mut self, vid: VertexId) {
        self.layers.final_mut().locked.insert(vid);
    }

    pub fn unlock(&mut self, vid: VertexId) {
        self.layers.final_mut().locked.remove(&vid);
    }

    pub fn is_locked(&self, vid: VertexId) -> bool {
        self.layers.final_state().locked.contains(&vid)
    }

    /// Allocate a fresh vertex ID.
    pub fn new_vid(&mut self) -> VertexId {
        let final_state = self.layers.final_mut();
        final_state.dirty = true;
        final_state.id_gen.fetch()
    }

    /// Delete a vertex: tombstone it, void its label and recycle its ID.
    pub fn dispose(&mut self, vid: VertexId) -> Result<()> {
        self.put_vertex(vid, None)?;
        self.put_label(vid, None)?;
        self.layers.final_mut().id_gen.dispose(vid);
        Ok(())
    }

    /// The number of open transactions.
    pub fn level(&self) -> usize {
        self.layers.level()
    }

    pub fn begin(&mut self) {
        self.layers.begin();
    }

    pub fn commit(&mut self) -> Result<()> {
        self.layers.commit()
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.layers.rollback()
    }

    /// Flatten the layer stack up to `level`. See [`LayerStack::collapse`].
    pub fn collapse(&self, level: Option<usize>) -> Layer {
        self.layers.collapse(level)
    }

    /// Fold the top frame into the balancer, creating the balancer if there is none.
    ///
    /// Fails with [`Error::TxPending`] while transactions are open.
    pub fn stow(&mut self) -> Result<()> {
        let level = self.layers.level();
        if level > 0 {
            return Err(Error::TxPending(level));
        }

        let top = self.layers.take_top();
        self.balancer = Some(match self.balancer.take() {
            Some(mut balancer) => {
                merge_onto(&top, &mut balancer);
                balancer
            }
            None => top,
        });
        Ok(())
    }
}
