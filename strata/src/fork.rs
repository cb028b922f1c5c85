//! Fork groups.
//!
//! A fork group owns every view sharing one backend. Exactly one view, the centre, may write to
//! the backend. The others read it through their own balancers, which persisting the centre keeps
//! consistent.

use crate::backend::{Backend, MemoryBackend};
use crate::error::{Error, Result};
use crate::layer::LayerFinal;
use crate::layers::LayerStack;
use crate::leaf_cache::LeafCache;
use crate::options::Options;
use crate::view::View;
use slab::Slab;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use strata_core::{IdGen, LeafTie, Vertex, VertexId};
use tracing::debug;

/// Handle of a view within its fork group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub(crate) usize);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A set of views over one backend with a single writer.
pub struct ForkGroup {
    pub(crate) views: Slab<View>,
    pub(crate) centre: ViewId,
    pub(crate) backend: Option<Arc<dyn Backend>>,
    pub(crate) leaf_cache: LeafCache,
    pub(crate) options: Options,
}

impl ForkGroup {
    /// Create a fork group with a single view, the centre, over `backend`.
    ///
    /// Without a backend the group works purely in memory and refuses to persist.
    pub fn new(backend: Option<Arc<dyn Backend>>, options: Options) -> Result<Self> {
        let mut views = Slab::new();
        let centre = ViewId(views.insert(View::new(backend.clone())?));
        debug!(
            backend = backend.is_some(),
            account_cache = options.account_cache_size,
            storage_cache = options.storage_cache_size,
            "opened fork group"
        );
        Ok(ForkGroup {
            views,
            centre,
            backend,
            leaf_cache: LeafCache::new(options.account_cache_size, options.storage_cache_size),
            options,
        })
    }

    /// Create a fork group over a fresh [`MemoryBackend`].
    pub fn in_memory(options: Options) -> Result<Self> {
        Self::new(Some(Arc::new(MemoryBackend::new())), options)
    }

    /// The view currently allowed to write to the backend.
    pub fn centre(&self) -> ViewId {
        self.centre
    }

    pub fn is_centre(&self, id: ViewId) -> bool {
        self.centre == id
    }

    pub fn view(&self, id: ViewId) -> Result<&View> {
        self.views.get(id.0).ok_or(Error::UnknownView(id))
    }

    pub fn view_mut(&mut self, id: ViewId) -> Result<&mut View> {
        self.views.get_mut(id.0).ok_or(Error::UnknownView(id))
    }

    /// The IDs of all views in the group.
    pub fn views(&self) -> impl Iterator<Item = ViewId> + '_ {
        self.views.iter().map(|(index, _)| ViewId(index))
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn backend(&self) -> Option<&Arc<dyn Backend>> {
        self.backend.as_ref()
    }

    pub fn leaf_cache(&self) -> &LeafCache {
        &self.leaf_cache
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Create a sibling of `id` which sees exactly what `id` sees: the same balancer and the
    /// whole layer stack collapsed into a single frame.
    pub fn fork(&mut self, id: ViewId) -> Result<ViewId> {
        let view = self.view(id)?;
        let fork = View {
            layers: LayerStack::from_layer(view.collapse(None)),
            balancer: view.balancer.clone(),
            backend: view.backend.clone(),
        };
        let fork_id = ViewId(self.views.insert(fork));
        debug!(parent = %id, fork = %fork_id, "forked view");
        Ok(fork_id)
    }

    /// Create a sibling of `id` which sees what `id` has stowed, without its layer stack.
    pub fn fork_base(&mut self, id: ViewId) -> Result<ViewId> {
        let view = self.view(id)?;
        let final_state = match view.balancer {
            Some(ref balancer) => {
                let mut final_state = balancer.final_state.clone();
                final_state.dirty = false;
                final_state
            }
            None => LayerFinal::with_id_gen(match view.backend {
                Some(ref backend) => backend.get_id_gen()?,
                None => IdGen::default(),
            }),
        };
        let fork = View {
            layers: LayerStack::new(final_state),
            balancer: view.balancer.clone(),
            backend: view.backend.clone(),
        };
        let fork_id = ViewId(self.views.insert(fork));
        debug!(parent = %id, fork = %fork_id, "forked view base");
        Ok(fork_id)
    }

    /// Drop a view. The centre cannot be dropped.
    pub fn forget(&mut self, id: ViewId) -> Result<View> {
        if id == self.centre {
            return Err(Error::ForgetCentre(id));
        }
        let view = self.views.try_remove(id.0).ok_or(Error::UnknownView(id))?;
        debug!(view = %id, "forgot view");
        Ok(view)
    }

    /// Make `id` the centre.
    pub fn recentre(&mut self, id: ViewId) -> Result<()> {
        self.view(id)?;
        if self.centre != id {
            debug!(from = %self.centre, to = %id, "recentred");
            self.centre = id;
        }
        Ok(())
    }

    /// Make `id` the centre until the returned guard is dropped, which restores the current
    /// centre.
    pub fn recentre_scoped(&mut self, id: ViewId) -> Result<RecentreGuard<'_>> {
        let prior = self.centre;
        self.recentre(id)?;
        Ok(RecentreGuard { group: self, prior })
    }

    /// Look up the vertex holding the leaf at `tie` as seen by `id`: its leaf-path table first,
    /// then the cache of persisted leaves.
    ///
    /// The cache is shared by the whole group and follows the centre, so a cached entry is only
    /// returned if it resolves in view `id` to a leaf with the cached payload ending `tie.path`.
    /// `None` means the leaf is unknown here, not that it is absent from the trie.
    pub fn leaf_vid(&self, id: ViewId, tie: &LeafTie) -> Result<Option<VertexId>> {
        let view = self.view(id)?;
        match view.leaf_vid(tie) {
            Some(vid) if vid.is_valid() => return Ok(Some(vid)),
            Some(_) => return Ok(None),
            None => {}
        }

        let Some(cached) = self.leaf_cache.get(tie) else {
            return Ok(None);
        };
        if view.is_dropped(tie.root) {
            return Ok(None);
        }
        match view.get_vertex(cached.vid)? {
            Some(Vertex::Leaf { prefix, payload })
                if payload == cached.payload
                    && tie.path.as_slice().ends_with(prefix.as_slice()) =>
            {
                Ok(Some(cached.vid))
            }
            _ => Ok(None),
        }
    }
}

/// Restores the prior centre of a fork group when dropped.
pub struct RecentreGuard<'a> {
    group: &'a mut ForkGroup,
    prior: ViewId,
}

impl<'a> Deref for RecentreGuard<'a> {
    type Target = ForkGroup;

    fn deref(&self) -> &ForkGroup {
        self.group
    }
}

impl<'a> DerefMut for RecentreGuard<'a> {
    fn deref_mut(&mut self) -> &mut ForkGroup {
        self.group
    }
}

impl<'a> Drop for RecentreGuard<'a> {
    fn drop(&mut self) {
        if self.group.centre != self.prior {
            debug!(from = %self.group.centre, to = %self.prior, "restored centre");
            self.group.centre = self.prior;
        }
    }
}
