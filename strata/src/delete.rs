//! Structural deletion.
//!
//! Removing a leaf unlinks it from its parent branch. A branch left with a single child is not
//! canonical and is folded together with that child, and with an extension above it if there is
//! one, so that after every deletion each branch has at least two children.
//!
//! Deletion plans everything it is going to do before writing anything. Every failure is
//! therefore reported with the view untouched.

use crate::error::{Error, Result};
use crate::hike::Hike;
use crate::view::View;
use strata_core::{LeafTie, NibblePath, Payload, Vertex, VertexId, VertexKind};
use tracing::trace;

/// The node a single-child branch folds into. Never a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Folded {
    Extension { prefix: NibblePath, child: VertexId },
    Leaf { prefix: NibblePath, payload: Payload },
}

impl Folded {
    /// Fold the branch slot `nibble` and the surviving child below it.
    ///
    /// Returns the folded node and whether the child was absorbed into it.
    fn below_slot(nibble: u8, child: VertexId, child_vertex: Vertex) -> Option<(Folded, bool)> {
        Some(match child_vertex {
            Vertex::Branch { .. } => (
                Folded::Extension {
                    prefix: NibblePath::single(nibble),
                    child,
                },
                false,
            ),
            Vertex::Extension {
                prefix,
                child: grandchild,
            } => (
                Folded::Extension {
                    prefix: prefix.prepend(nibble).ok()?,
                    child: grandchild,
                },
                true,
            ),
            Vertex::Leaf { prefix, payload } => (
                Folded::Leaf {
                    prefix: prefix.prepend(nibble).ok()?,
                    payload,
                },
                true,
            ),
        })
    }

    /// Fold an extension prefix on top of this node.
    fn behind(self, outer: &NibblePath) -> Option<Folded> {
        Some(match self {
            Folded::Extension { prefix, child } => Folded::Extension {
                prefix: outer.join(&prefix).ok()?,
                child,
            },
            Folded::Leaf { prefix, payload } => Folded::Leaf {
                prefix: outer.join(&prefix).ok()?,
                payload,
            },
        })
    }

    fn into_vertex(self) -> Vertex {
        match self {
            Folded::Extension { prefix, child } => Vertex::Extension { prefix, child },
            Folded::Leaf { prefix, payload } => Vertex::Leaf { prefix, payload },
        }
    }
}

/// A branch losing one child.
struct Unlink {
    branch: VertexId,
    children: [VertexId; 16],
    collapse: Option<Collapse>,
}

/// The replacement of a single-child branch.
struct Collapse {
    /// Where the folded node is written: the branch itself, or the extension above it.
    target: VertexId,
    folded: Folded,
    /// The surviving child, when it was folded into the new node.
    absorbed: Option<VertexId>,
    /// The branch, when the folded node moved up into its parent extension.
    retired: Option<VertexId>,
    /// Full path of the folded node, when it is a leaf.
    leaf_path: Option<NibblePath>,
}

impl View {
    /// Delete the leaf at the end of `hike`, whose full path is `tie`.
    ///
    /// The hike must be resolved against this view, root first.
    pub fn delete(&mut self, hike: &Hike, tie: &LeafTie) -> Result<()> {
        let (leaf, ancestors) = hike
            .legs
            .split_last()
            .ok_or(Error::LeafExpected(hike.root))?;
        if leaf.vertex.kind() != VertexKind::Leaf {
            return Err(Error::LeafExpected(leaf.vid));
        }
        if self.is_locked(leaf.vid) {
            return Err(Error::LeafLocked(leaf.vid));
        }
        if let Some(leg) = ancestors.iter().find(|leg| self.is_locked(leg.vid)) {
            return Err(Error::BranchLocked(leg.vid));
        }

        let unlink = match ancestors.len() {
            0 => None,
            n => Some(self.plan_unlink(hike, n - 1)?),
        };
        let persisted = self.get_vertex_persisted(leaf.vid)?.is_some();

        self.dispose(leaf.vid)?;
        if let Some(unlink) = unlink {
            self.put_vertex(
                unlink.branch,
                Some(Vertex::Branch {
                    children: unlink.children,
                }),
            )?;
            for leg in ancestors {
                self.put_label(leg.vid, None)?;
            }
            if let Some(collapse) = unlink.collapse {
                self.apply_collapse(hike.root, collapse)?;
            }
        }

        if persisted {
            self.put_leaf_vid(tie.clone(), VertexId::VOID);
        } else {
            self.remove_leaf_vid(tie);
        }

        trace!(leaf = %leaf.vid, root = %hike.root, persisted, "deleted leaf");
        Ok(())
    }

    /// Delete the whole subtree below `vid`.
    ///
    /// `vid` is tombstoned right away and every leaf-path entry rooted at it is voided. Its
    /// persisted descendants are removed from the backend on the next persist.
    pub fn delete_subtree(&mut self, vid: VertexId) -> Result<()> {
        self.put_vertex(vid, None)?;
        self.put_label(vid, None)?;
        self.layers.drop_tree(vid);

        let ties = self
            .layers
            .final_state()
            .leaves
            .iter()
            .filter(|(tie, leaf)| tie.root == vid && leaf.is_valid())
            .map(|(tie, _)| tie.clone())
            .collect::<Vec<_>>();
        for tie in ties {
            self.put_leaf_vid(tie, VertexId::VOID);
        }
        trace!(root = %vid, "dropped subtree");
        Ok(())
    }

    fn plan_unlink(&self, hike: &Hike, at: usize) -> Result<Unlink> {
        let branch = &hike.legs[at];
        let (mut children, nibble) = match (&branch.vertex, branch.nibble) {
            (Vertex::Branch { children }, Some(nibble)) => (*children, nibble),
            _ => return Err(Error::BranchExpected(branch.vid)),
        };
        children[nibble as usize] = VertexId::VOID;

        let mut survivors = children
            .iter()
            .enumerate()
            .filter(|(_, vid)| vid.is_valid());
        let collapse = match (survivors.next(), survivors.next()) {
            (None, _) => return Err(Error::BranchWithoutRefs(branch.vid)),
            (Some((nibble, child)), None) => {
                Some(self.plan_collapse(hike, at, nibble as u8, *child)?)
            }
            (Some(_), Some(_)) => None,
        };

        Ok(Unlink {
            branch: branch.vid,
            children,
            collapse,
        })
    }

    fn plan_collapse(
        &self,
        hike: &Hike,
        at: usize,
        nibble: u8,
        child: VertexId,
    ) -> Result<Collapse> {
        let branch = &hike.legs[at];
        let overflow = || Error::PathOverflow(branch.vid);

        let child_vertex = self
            .get_vertex(child)?
            .ok_or(Error::VertexNotFound(child))?;
        let (folded, absorbed) =
            Folded::below_slot(nibble, child, child_vertex).ok_or_else(overflow)?;
        let absorbed = absorbed.then_some(child);
        if let Some(absorbed) = absorbed.filter(|vid| self.is_locked(*vid)) {
            return Err(Error::VertexLocked(absorbed));
        }

        let parent = at.checked_sub(1).map(|i| (i, &hike.legs[i]));
        let (target, depth, folded, retired) = match parent {
            None => (branch.vid, at, folded, None),
            Some((_, leg)) => match leg.vertex {
                Vertex::Branch { .. } => (branch.vid, at, folded, None),
                Vertex::Extension { prefix: ref outer, .. } => {
                    if let Some(grand) = at.checked_sub(2).map(|i| &hike.legs[i]) {
                        if grand.vertex.kind() != VertexKind::Branch {
                            return Err(Error::BranchExpected(grand.vid));
                        }
                    }
                    let folded = folded.behind(outer).ok_or_else(overflow)?;
                    (leg.vid, at - 1, folded, Some(branch.vid))
                }
                Vertex::Leaf { .. } => return Err(Error::LeafUnexpected(leg.vid)),
            },
        };

        let leaf_path = match folded {
            Folded::Leaf { ref prefix, .. } => Some(
                hike.path_to(depth)
                    .and_then(|path| path.join(prefix))
                    .map_err(|_| overflow())?,
            ),
            Folded::Extension { .. } => None,
        };

        Ok(Collapse {
            target,
            folded,
            absorbed,
            retired,
            leaf_path,
        })
    }

    fn apply_collapse(&mut self, root: VertexId, collapse: Collapse) -> Result<()> {
        if let Some(absorbed) = collapse.absorbed {
            self.dispose(absorbed)?;
        }
        if let Some(retired) = collapse.retired {
            self.dispose(retired)?;
        }
        self.put_vertex(collapse.target, Some(collapse.folded.into_vertex()))?;
        if let Some(path) = collapse.leaf_path {
            self.put_leaf_vid(LeafTie { root, path }, collapse.target);
        }
        trace!(target = %collapse.target, "collapsed branch");
        Ok(())
    }
}
