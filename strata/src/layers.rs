//! The layer stack of a single view.
//!
//! Frames are pushed by [`LayerStack::begin`] and the mutable top frame receives every write.
//! Reads scan the top, then the pushed frames from newest to oldest. The first frame holding any
//! entry for a key answers, even when that entry is a tombstone.

use crate::error::{Error, Result};
use crate::layer::{merge_onto, Layer, LayerFinal};
use std::mem;
use strata_core::{HashLabel, LeafTie, Vertex, VertexId};

/// An ordered sequence of frames plus the mutable top frame.
#[derive(Debug, Clone, Default)]
pub struct LayerStack {
    top: Layer,
    // oldest first.
    stack: Vec<Layer>,
}

impl LayerStack {
    /// Create a stack with no open transaction and the given final state.
    pub fn new(final_state: LayerFinal) -> Self {
        LayerStack {
            top: Layer::with_final(final_state),
            stack: Vec::new(),
        }
    }

    /// Create a stack whose only frame is the given layer.
    pub fn from_layer(top: Layer) -> Self {
        LayerStack {
            top,
            stack: Vec::new(),
        }
    }

    pub fn top(&self) -> &Layer {
        &self.top
    }

    /// The final state as of the top frame.
    pub fn final_state(&self) -> &LayerFinal {
        &self.top.final_state
    }

    pub(crate) fn final_mut(&mut self) -> &mut LayerFinal {
        &mut self.top.final_state
    }

    fn frames(&self) -> impl Iterator<Item = &Layer> {
        std::iter::once(&self.top).chain(self.stack.iter().rev())
    }

    /// Get the nearest entry for a vertex.
    ///
    /// `None` if no frame mentions `vid`, `Some(None)` if the nearest entry is a tombstone.
    pub fn get_vertex(&self, vid: VertexId) -> Option<Option<&Vertex>> {
        self.frames()
            .find_map(|layer| layer.delta.vertices.get(&vid))
            .map(Option::as_ref)
    }

    /// Write a vertex entry to the top frame. `None` writes a tombstone.
    pub fn put_vertex(&mut self, vid: VertexId, vertex: Option<Vertex>) {
        self.top.set_vertex(vid, vertex);
        self.top.final_state.dirty = true;
    }

    /// Get the nearest label entry for a vertex. `Some(None)` is a void label.
    pub fn get_label(&self, vid: VertexId) -> Option<Option<HashLabel>> {
        self.frames()
            .find_map(|layer| layer.delta.labels.get(&vid))
            .copied()
    }

    /// The set of vertices carrying `label` according to the nearest frame which indexes it.
    pub fn vids_by_label(&self, label: &HashLabel) -> Option<&imbl::HashSet<VertexId>> {
        self.frames()
            .find_map(|layer| layer.delta.by_label.get(label))
    }

    /// Write a label entry to the top frame and update the reverse index.
    pub fn put_label(&mut self, vid: VertexId, label: Option<HashLabel>) {
        self.relabel(vid, label, None);
    }

    /// As [`LayerStack::put_label`], consulting `base` after every frame of the stack when
    /// looking up the previous label and the sets to patch.
    pub(crate) fn relabel(&mut self, vid: VertexId, label: Option<HashLabel>, base: Option<&Layer>) {
        let prev = self
            .get_label(vid)
            .or_else(|| base.and_then(|layer| layer.delta.labels.get(&vid).copied()))
            .flatten();

        if prev != label {
            // sets are copied up lazily, only once a frame actually changes them.
            if let Some(prev) = prev {
                let mut vids = self.label_set(&prev, base);
                vids.remove(&vid);
                self.top.delta.by_label.insert(prev, vids);
            }
            if let Some(label) = label {
                let mut vids = self.label_set(&label, base);
                vids.insert(vid);
                self.top.delta.by_label.insert(label, vids);
            }
        }

        self.top.delta.labels.insert(vid, label);
        self.top.final_state.dirty = true;
    }

    fn label_set(&self, label: &HashLabel, base: Option<&Layer>) -> imbl::HashSet<VertexId> {
        self.vids_by_label(label)
            .or_else(|| base.and_then(|layer| layer.delta.by_label.get(label)))
            .cloned()
            .unwrap_or_default()
    }

    /// Mark `vid` as the root of a subtree to be dropped from the backend.
    pub(crate) fn drop_tree(&mut self, vid: VertexId) {
        self.top.delta.dropped_trees.insert(vid);
        self.top.final_state.dirty = true;
    }

    /// Whether any frame marked `vid` as the root of a dropped subtree.
    pub fn is_dropped(&self, vid: VertexId) -> bool {
        self.frames()
            .any(|layer| layer.delta.dropped_trees.contains(&vid))
    }

    /// Add leaf-path entries to the final state of every frame which has none for their tie.
    /// Does not mark anything dirty.
    pub(crate) fn seed_leaves(&mut self, leaves: &[(LeafTie, VertexId)]) {
        for layer in std::iter::once(&mut self.top).chain(self.stack.iter_mut()) {
            for (tie, vid) in leaves {
                if !layer.final_state.leaves.contains_key(tie) {
                    layer.final_state.leaves.insert(tie.clone(), *vid);
                }
            }
        }
    }

    pub(crate) fn put_leaf(&mut self, tie: LeafTie, vid: VertexId) {
        self.top.final_state.leaves.insert(tie, vid);
        self.top.final_state.dirty = true;
    }

    pub(crate) fn remove_leaf(&mut self, tie: &LeafTie) {
        self.top.final_state.leaves.remove(tie);
        self.top.final_state.dirty = true;
    }

    /// The number of open transactions.
    pub fn level(&self) -> usize {
        self.stack.len()
    }

    /// Open a transaction: push the top frame and start a fresh one inheriting its final state.
    pub fn begin(&mut self) {
        let mut final_state = self.top.final_state.clone();
        final_state.dirty = false;
        let below = mem::replace(&mut self.top, Layer::with_final(final_state));
        self.stack.push(below);
    }

    /// Close the innermost transaction, merging its frame into the one below.
    pub fn commit(&mut self) -> Result<()> {
        let mut below = self.stack.pop().ok_or(Error::TxNotOpen)?;
        merge_onto(&self.top, &mut below);
        self.top = below;
        Ok(())
    }

    /// Discard the innermost transaction.
    pub fn rollback(&mut self) -> Result<()> {
        self.top = self.stack.pop().ok_or(Error::TxNotOpen)?;
        Ok(())
    }

    /// Flatten frames from the bottom up to and including `level` into one layer. The top frame
    /// counts as the level above the last pushed frame. `None`, or a level beyond the top,
    /// flattens everything.
    ///
    /// The live stack is left untouched.
    pub fn collapse(&self, level: Option<usize>) -> Layer {
        let frames = self.stack.len() + 1;
        let end = level.map_or(frames, |level| (level + 1).min(frames));

        let mut frames = self.stack.iter().chain(std::iter::once(&self.top)).take(end);
        let mut flat = frames.next().cloned().unwrap_or_default();
        for layer in frames {
            merge_onto(layer, &mut flat);
        }
        flat
    }

    /// Replace the top frame with a fresh one carrying the same final state and return the old
    /// top. Only meaningful with no open transaction.
    pub(crate) fn take_top(&mut self) -> Layer {
        let mut final_state = self.top.final_state.clone();
        final_state.dirty = false;
        mem::replace(&mut self.top, Layer::with_final(final_state))
    }
}
