//! Versioning frames.
//!
//! A [`Layer`] is one frame of a view's history. Its delta holds everything written while the
//! frame was on top: vertices, hash labels and the reverse label index. Its final state holds the
//! data which is not tracked per change but is valid for the whole stack as of this frame: the
//! leaf-path table, the lock set and the ID allocator.
//!
//! All maps are persistent, so cloning a layer is cheap and clones share structure until one of
//! them is written to.

use std::collections::HashSet;
use strata_core::{HashLabel, IdGen, LeafTie, Vertex, VertexId};

/// The per-change part of a layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerDelta {
    /// `None` marks a vertex deleted in this frame.
    pub(crate) vertices: imbl::HashMap<VertexId, Option<Vertex>>,
    /// `None` marks a void label, which must be recomputed.
    pub(crate) labels: imbl::HashMap<VertexId, Option<HashLabel>>,
    /// label -> every vertex carrying it, as of this frame.
    pub(crate) by_label: imbl::HashMap<HashLabel, imbl::HashSet<VertexId>>,
    /// Roots whose persisted subtrees are removed on the next persist.
    pub(crate) dropped_trees: imbl::HashSet<VertexId>,
}

impl LayerDelta {
    /// Vertex entries of this frame.
    pub fn vertices(&self) -> &imbl::HashMap<VertexId, Option<Vertex>> {
        &self.vertices
    }

    /// Label entries of this frame.
    pub fn labels(&self) -> &imbl::HashMap<VertexId, Option<HashLabel>> {
        &self.labels
    }

    /// The reverse label index of this frame.
    pub fn by_label(&self) -> &imbl::HashMap<HashLabel, imbl::HashSet<VertexId>> {
        &self.by_label
    }

    pub fn dropped_trees(&self) -> &imbl::HashSet<VertexId> {
        &self.dropped_trees
    }
}

/// The state of a layer which is valid for the whole stack below it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerFinal {
    /// full leaf path -> leaf vertex. [`VertexId::VOID`] records a deleted leaf.
    pub(crate) leaves: imbl::HashMap<LeafTie, VertexId>,
    /// Vertices which must not be mutated or deleted.
    pub(crate) locked: imbl::HashSet<VertexId>,
    pub(crate) id_gen: IdGen,
    /// Whether anything was written since this state was taken.
    pub(crate) dirty: bool,
}

impl LayerFinal {
    /// A clean final state around the given allocator.
    pub fn with_id_gen(id_gen: IdGen) -> Self {
        LayerFinal {
            id_gen,
            ..Default::default()
        }
    }

    pub fn leaves(&self) -> &imbl::HashMap<LeafTie, VertexId> {
        &self.leaves
    }

    pub fn locked(&self) -> &imbl::HashSet<VertexId> {
        &self.locked
    }

    pub fn id_gen(&self) -> &IdGen {
        &self.id_gen
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// One versioning frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layer {
    pub(crate) delta: LayerDelta,
    pub(crate) final_state: LayerFinal,
}

impl Layer {
    /// An empty frame carrying the given final state.
    pub fn with_final(final_state: LayerFinal) -> Self {
        Layer {
            delta: LayerDelta::default(),
            final_state,
        }
    }

    pub fn delta(&self) -> &LayerDelta {
        &self.delta
    }

    pub fn final_state(&self) -> &LayerFinal {
        &self.final_state
    }

    /// Whether the delta holds no change at all.
    pub fn is_empty(&self) -> bool {
        self.delta.vertices.is_empty()
            && self.delta.labels.is_empty()
            && self.delta.dropped_trees.is_empty()
    }

    /// Write a vertex entry into this frame only.
    pub(crate) fn set_vertex(&mut self, vid: VertexId, vertex: Option<Vertex>) {
        self.delta.vertices.insert(vid, vertex);
    }

    /// Write a label entry into this frame only, keeping this frame's own reverse index in
    /// step. Sets of lower frames are not consulted.
    #[cfg(test)]
    pub(crate) fn set_label(&mut self, vid: VertexId, label: Option<HashLabel>) {
        if let Some(Some(prev)) = self.delta.labels.insert(vid, label) {
            if Some(prev) != label {
                if let Some(vids) = self.delta.by_label.get_mut(&prev) {
                    vids.remove(&vid);
                }
            }
        }
        if let Some(label) = label {
            let mut vids = self.delta.by_label.get(&label).cloned().unwrap_or_default();
            vids.insert(vid);
            self.delta.by_label.insert(label, vids);
        }
    }
}

/// Merge `src` onto `dst`.
///
/// Vertex and label entries of `src` override those of `dst`. Reverse-index sets are unioned and
/// every set the merge touched is then filtered down to the vertices whose merged label is still
/// that set's label, or which carry no label entry in the merged frame. The dropped-tree sets are
/// unioned and `dst` adopts the final state of `src`.
pub fn merge_onto(src: &Layer, dst: &mut Layer) {
    for (vid, vertex) in src.delta.vertices.iter() {
        dst.delta.vertices.insert(*vid, vertex.clone());
    }

    let mut touched = HashSet::new();
    for (vid, label) in src.delta.labels.iter() {
        if let Some(Some(prev)) = dst.delta.labels.insert(*vid, *label) {
            if Some(prev) != *label {
                touched.insert(prev);
            }
        }
    }

    for (label, vids) in src.delta.by_label.iter() {
        let merged = match dst.delta.by_label.get(label) {
            Some(existing) => existing.clone().union(vids.clone()),
            None => vids.clone(),
        };
        dst.delta.by_label.insert(*label, merged);
        touched.insert(*label);
    }

    for label in touched {
        let Some(vids) = dst.delta.by_label.get(&label) else {
            continue;
        };
        let labels = &dst.delta.labels;
        let filtered = vids
            .iter()
            .copied()
            .filter(|vid| match labels.get(vid) {
                None => true,
                Some(current) => *current == Some(label),
            })
            .collect::<imbl::HashSet<_>>();
        dst.delta.by_label.insert(label, filtered);
    }

    dst.delta.dropped_trees = dst
        .delta
        .dropped_trees
        .clone()
        .union(src.delta.dropped_trees.clone());

    let dirty = src.final_state.dirty || dst.final_state.dirty;
    dst.final_state = src.final_state.clone();
    dst.final_state.dirty = dirty;
}
