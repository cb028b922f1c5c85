//! Resolved root-to-leaf paths.

use crate::error::{Error, Result};
use crate::view::View;
use strata_core::{NibblePath, PathOverflow, Vertex, VertexId};

/// One step of a [`Hike`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leg {
    pub vid: VertexId,
    pub vertex: Vertex,
    /// The child slot taken out of a branch. `None` for extensions and leaves.
    pub nibble: Option<u8>,
}

/// A chain of legs from a trie root down to a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hike {
    pub root: VertexId,
    pub legs: Vec<Leg>,
}

impl Hike {
    /// The nibbles consumed by the legs before leg `n`. An `n` past the end yields the path
    /// consumed by the whole hike.
    pub fn path_to(&self, n: usize) -> std::result::Result<NibblePath, PathOverflow> {
        let mut path = NibblePath::new();
        for leg in &self.legs[..n.min(self.legs.len())] {
            match (&leg.vertex, leg.nibble) {
                (Vertex::Branch { .. }, Some(nibble)) => path.push(nibble)?,
                (Vertex::Extension { prefix, .. }, _) | (Vertex::Leaf { prefix, .. }, _) => {
                    path = path.join(prefix)?
                }
                (Vertex::Branch { .. }, None) => {}
            }
        }
        Ok(path)
    }

    /// The last leg, if the hike is not empty.
    pub fn last(&self) -> Option<&Leg> {
        self.legs.last()
    }
}

impl View {
    /// Walk from `root` along `path` down to the leaf sitting at exactly that path.
    pub fn hike(&self, root: VertexId, path: &NibblePath) -> Result<Hike> {
        let mut legs = Vec::new();
        let mut vid = root;
        let mut rest = path.clone();

        loop {
            let vertex = self.get_vertex(vid)?.ok_or(Error::VertexNotFound(vid))?;
            match vertex {
                Vertex::Branch { ref children } => {
                    let nibble = rest.get(0).ok_or(Error::HikeNoLeaf(vid))?;
                    let child = children[nibble as usize];
                    if !child.is_valid() {
                        return Err(Error::HikeNoLeaf(vid));
                    }
                    legs.push(Leg {
                        vid,
                        vertex,
                        nibble: Some(nibble),
                    });
                    rest = rest.skip(1);
                    vid = child;
                }
                Vertex::Extension { ref prefix, child } => {
                    if !rest.as_slice().starts_with(prefix.as_slice()) {
                        return Err(Error::HikeNoLeaf(vid));
                    }
                    rest = rest.skip(prefix.len());
                    legs.push(Leg {
                        vid,
                        vertex,
                        nibble: None,
                    });
                    vid = child;
                }
                Vertex::Leaf { ref prefix, .. } => {
                    if *prefix != rest {
                        return Err(Error::HikeNoLeaf(vid));
                    }
                    legs.push(Leg {
                        vid,
                        vertex,
                        nibble: None,
                    });
                    return Ok(Hike { root, legs });
                }
            }
        }
    }
}
