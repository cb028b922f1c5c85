//! The vertex identifier allocator.
//!
//! Identifiers are handed out from a high-water mark and recycled through a free list once the
//! vertex they named is deleted.

use crate::vertex::VertexId;
use alloc::vec::Vec;

/// Allocator state: the next never-used identifier plus the recycled ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdGen {
    next: VertexId,
    // popped from the back.
    free: Vec<VertexId>,
}

impl Default for IdGen {
    fn default() -> Self {
        IdGen {
            next: VertexId::LEAST_FREE,
            free: Vec::new(),
        }
    }
}

impl IdGen {
    /// Restore an allocator from its persisted parts.
    ///
    /// The high-water mark is lifted to [`VertexId::LEAST_FREE`] and recycled identifiers which
    /// are reserved or not below the high-water mark are dropped.
    pub fn new(next: VertexId, free: Vec<VertexId>) -> Self {
        let next = core::cmp::max(next, VertexId::LEAST_FREE);
        let free = free
            .into_iter()
            .filter(|vid| !vid.is_reserved() && *vid < next)
            .collect();
        IdGen { next, free }
    }

    /// Allocate an identifier, preferring recycled ones.
    pub fn fetch(&mut self) -> VertexId {
        if let Some(vid) = self.free.pop() {
            return vid;
        }
        let vid = self.next;
        self.next = VertexId(vid.0 + 1);
        vid
    }

    /// Return an identifier to the free list.
    ///
    /// Reserved roots and identifiers this allocator never handed out are ignored. Returns
    /// whether the identifier was recycled.
    pub fn dispose(&mut self, vid: VertexId) -> bool {
        if vid.is_reserved() || vid >= self.next {
            return false;
        }
        self.free.push(vid);
        true
    }

    /// The high-water mark: the lowest identifier never handed out.
    pub fn next(&self) -> VertexId {
        self.next
    }

    /// The recycled identifiers, in reverse order of reuse.
    pub fn free(&self) -> &[VertexId] {
        &self.free
    }

    /// Lift the high-water mark to at least `vid`.
    pub fn raise(&mut self, vid: VertexId) {
        if vid > self.next {
            self.next = vid;
        }
    }

    /// Sort and deduplicate the free list, then lower the high-water mark while the highest
    /// recycled identifier sits directly below it.
    pub fn compact(&mut self) {
        self.free.sort_unstable();
        self.free.dedup();
        while let Some(&top) = self.free.last() {
            if top.0 + 1 != self.next.0 {
                break;
            }
            self.free.pop();
            self.next = top;
        }
        // lowest identifiers are reused first.
        self.free.reverse();
    }
}
