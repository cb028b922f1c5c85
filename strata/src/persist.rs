//! Persisting a view into the shared backend.
//!
//! Persisting writes the balancer of a view into the backend as one batch. The backend is shared
//! by every sibling view, so before the batch is written the prior backend contents of every key
//! it touches are read into a reverse delta. Once the batch has landed, each sibling's balancer is
//! rebuilt on top of that reverse delta and the siblings keep seeing exactly what they saw before.

use crate::backend::{Backend, SavedState, WriteBatch};
use crate::error::{Error, Result};
use crate::fork::{ForkGroup, ViewId};
use crate::layer::{merge_onto, Layer, LayerFinal};
use crate::leaf_cache::CachedLeaf;
use crate::view::View;
use std::collections::HashSet;
use strata_core::{LeafTie, Vertex, VertexId};
use tracing::{debug, trace, warn};

impl ForkGroup {
    /// Persist the pending changes of view `id`.
    ///
    /// The top layer is stowed into the balancer first, which fails while transactions are open.
    /// Only the centre may write. With `allow_recentre`, a non-centre view is made the centre for
    /// the duration of the call and the previous centre is restored afterwards, whatever the
    /// outcome.
    ///
    /// `next_free_id`, if given, is a lower bound for the persisted allocator high-water mark.
    pub fn persist(
        &mut self,
        id: ViewId,
        next_free_id: Option<VertexId>,
        allow_recentre: bool,
    ) -> Result<()> {
        if self.backend.is_none() {
            return Err(Error::BackendMissing);
        }

        let view = self.view_mut(id)?;
        view.stow()?;
        if view.balancer.as_ref().map_or(true, Layer::is_empty) {
            trace!(view = %id, "nothing to persist");
            return Ok(());
        }

        if self.is_centre(id) {
            return self.persist_centre(id, next_free_id);
        }
        if !allow_recentre {
            return Err(Error::BackendReadOnly(id));
        }

        let mut guard = self.recentre_scoped(id)?;
        let result = guard.persist_centre(id, next_free_id);
        drop(guard);
        result
    }

    fn persist_centre(&mut self, id: ViewId, next_free_id: Option<VertexId>) -> Result<()> {
        let backend = self.backend.clone().ok_or(Error::BackendMissing)?;
        let view = self.view(id)?;
        let Some(balancer) = view.balancer.clone() else {
            return Ok(());
        };

        let dropped = subtree_ids(backend.as_ref(), &balancer)?;
        let has_siblings = self.views.len() > 1;
        let reverse = if has_siblings {
            Some(reverse_delta(backend.as_ref(), &balancer, &dropped)?)
        } else {
            None
        };

        let mut balancer = balancer;
        let mut batch = backend.begin_batch();

        // deletions first, writes to the same IDs below override them.
        let mut id_gen = balancer.final_state.id_gen.clone();
        for &(vid, recreated) in &dropped {
            batch.put_vertex(vid, None);
            batch.put_label(vid, None);
            if !recreated {
                balancer.delta.vertices.remove(&vid);
                balancer.delta.labels.remove(&vid);
                id_gen.dispose(vid);
            }
        }

        write_delta(&mut batch, &balancer);

        if self.options.compact_free_list {
            id_gen.compact();
        }
        if let Some(next_free_id) = next_free_id {
            id_gen.raise(next_free_id);
        }
        batch.put_id_gen(id_gen.clone());

        let serial = backend.get_saved_state()?.map_or(0, |state| state.serial) + 1;
        let state_root = match balancer.delta.labels.get(&VertexId::ACCOUNTS) {
            Some(label) => label.map(|label| label.key),
            None => backend
                .get_label(VertexId::ACCOUNTS)?
                .map(|label| label.key),
        };
        batch.put_saved_state(SavedState { serial, state_root });

        let vertices = batch.vertices().len();
        if let Err(err) = backend.end_batch(batch) {
            warn!(view = %id, %err, "persist failed");
            return Err(Error::Backend(err));
        }

        let removed = dropped
            .iter()
            .filter(|(_, recreated)| !recreated)
            .map(|(vid, _)| *vid)
            .collect::<HashSet<_>>();
        let priors = self.promote_leaves(&balancer, &removed);

        if let Some(reverse) = reverse {
            self.reconcile_siblings(id, reverse, &priors);
        }

        let view = self.view_mut(id)?;
        view.balancer = None;
        let final_state = view.layers.final_mut();
        final_state.id_gen = id_gen;
        // what is left are live entries this persist did not write.
        final_state.leaves.retain(|_, vid| {
            vid.is_valid()
                && !removed.contains(vid)
                && !balancer.delta.vertices.contains_key(vid)
        });

        debug!(
            view = %id,
            serial,
            vertices,
            dropped = dropped.len(),
            "persisted"
        );
        Ok(())
    }

    /// Move the leaves written by `balancer` into the leaf cache and drop deleted ones, along
    /// with every cached leaf whose vertex was `removed`.
    ///
    /// Returns the cache entries displaced on the way, which siblings still see.
    fn promote_leaves(
        &self,
        balancer: &Layer,
        removed: &HashSet<VertexId>,
    ) -> Vec<(LeafTie, VertexId)> {
        let mut priors = self
            .leaf_cache
            .remove_vids(removed)
            .into_iter()
            .map(|(tie, leaf)| (tie, leaf.vid))
            .collect::<Vec<_>>();

        for (tie, vid) in balancer.final_state.leaves.iter() {
            let prior = if !vid.is_valid() {
                self.leaf_cache.remove(tie)
            } else {
                match balancer.delta.vertices.get(vid) {
                    Some(Some(Vertex::Leaf { payload, .. })) => self.leaf_cache.insert(
                        tie.clone(),
                        CachedLeaf {
                            vid: *vid,
                            payload: payload.clone(),
                        },
                    ),
                    Some(_) => self.leaf_cache.remove(tie),
                    None => continue,
                }
            };
            if let Some(prior) = prior.filter(|prior| prior.vid != *vid) {
                priors.push((tie.clone(), prior.vid));
            }
        }
        self.leaf_cache.evict();
        priors
    }

    /// Rebuild every sibling's balancer on top of `reverse` and hand it the leaf-path entries the
    /// cache no longer holds for it. The last sibling takes `reverse` itself, the others a copy.
    fn reconcile_siblings(&mut self, id: ViewId, reverse: Layer, priors: &[(LeafTie, VertexId)]) {
        let mut siblings = self
            .views
            .iter_mut()
            .filter(|(index, _)| *index != id.0)
            .map(|(_, view)| view)
            .collect::<Vec<_>>();
        for sibling in siblings.iter_mut() {
            sibling.layers.seed_leaves(priors);
        }
        let Some(last) = siblings.pop() else {
            return;
        };
        for sibling in siblings {
            rebase(sibling, reverse.clone());
        }
        rebase(last, reverse);
    }
}

fn rebase(sibling: &mut View, mut reverse: Layer) {
    match sibling.balancer.take() {
        Some(balancer) => merge_onto(&balancer, &mut reverse),
        None => {
            let mut final_state = sibling.layers.final_state().clone();
            final_state.dirty = false;
            reverse.final_state = final_state;
        }
    }
    sibling.balancer = Some(reverse);
}

fn write_delta(batch: &mut WriteBatch, layer: &Layer) {
    for (vid, vertex) in layer.delta.vertices.iter() {
        batch.put_vertex(*vid, vertex.clone());
    }
    for (vid, label) in layer.delta.labels.iter() {
        batch.put_label(*vid, *label);
    }
}

/// Everything persisted below the dropped trees of `balancer`, children before parents.
///
/// Each entry carries whether the balancer wrote a new vertex under that ID after dropping it.
/// Only persisted content is walked: a child the balancer has written or deleted since is no
/// longer part of the persisted subtree and is skipped together with whatever hangs below it.
/// Storage tries hanging off account leaves are separate roots and are not followed.
fn subtree_ids(backend: &dyn Backend, balancer: &Layer) -> Result<Vec<(VertexId, bool)>> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for &root in balancer.delta.dropped_trees.iter() {
        let recreated = matches!(balancer.delta.vertices.get(&root), Some(Some(_)));
        // the root is tombstoned in memory, its persisted content is in the backend.
        let Some(vertex) = backend.get_vertex(root)? else {
            if recreated {
                continue;
            }
            // nothing persisted: still clear the tombstone and any label.
            if seen.insert(root) {
                out.push((root, false));
            }
            continue;
        };
        collect_children(backend, balancer, &vertex, &mut seen, &mut out)?;
        if seen.insert(root) {
            out.push((root, recreated));
        }
    }
    Ok(out)
}

fn collect_children(
    backend: &dyn Backend,
    balancer: &Layer,
    vertex: &Vertex,
    seen: &mut HashSet<VertexId>,
    out: &mut Vec<(VertexId, bool)>,
) -> Result<()> {
    for child in vertex.children() {
        if seen.contains(&child) || balancer.delta.vertices.contains_key(&child) {
            continue;
        }
        if let Some(ref child_vertex) = backend.get_vertex(child)? {
            collect_children(backend, balancer, child_vertex, seen, out)?;
        }
        seen.insert(child);
        out.push((child, false));
    }
    Ok(())
}

/// The backend contents of every vertex and label a persist of `balancer` is about to overwrite.
fn reverse_delta(
    backend: &dyn Backend,
    balancer: &Layer,
    dropped: &[(VertexId, bool)],
) -> Result<Layer> {
    let mut reverse = Layer::with_final(LayerFinal::with_id_gen(backend.get_id_gen()?));
    let vids = balancer
        .delta
        .vertices
        .keys()
        .copied()
        .chain(dropped.iter().map(|&(vid, _)| vid));
    for vid in vids {
        reverse.set_vertex(vid, backend.get_vertex(vid)?);
    }
    let vids = balancer
        .delta
        .labels
        .keys()
        .copied()
        .chain(dropped.iter().map(|&(vid, _)| vid));
    // backend labels are not indexed by label, neither are their priors.
    for vid in vids {
        reverse.delta.labels.insert(vid, backend.get_label(vid)?);
    }
    Ok(reverse)
}
