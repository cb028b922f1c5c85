//! Error types returned by layer, fork and deletion operations.

use crate::fork::ViewId;
use strata_core::VertexId;
use thiserror::Error;

/// Result type alias for strata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while mutating or persisting a view.
///
/// Structural variants carry the [`VertexId`] they were raised for. None of these are retried
/// internally; the caller decides whether to roll back the enclosing transaction.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no backend attached")]
    BackendMissing,

    #[error("view {0} is not the centre of its fork group")]
    BackendReadOnly(ViewId),

    #[error("expected a leaf at {0}")]
    LeafExpected(VertexId),

    #[error("leaf {0} is locked")]
    LeafLocked(VertexId),

    #[error("branch {0} is locked")]
    BranchLocked(VertexId),

    #[error("vertex {0} is locked")]
    VertexLocked(VertexId),

    #[error("expected a branch at {0}")]
    BranchExpected(VertexId),

    #[error("branch {0} has no children left")]
    BranchWithoutRefs(VertexId),

    #[error("unexpected leaf at {0}")]
    LeafUnexpected(VertexId),

    #[error("vertex {0} not found")]
    VertexNotFound(VertexId),

    #[error("path does not end at a leaf below {0}")]
    HikeNoLeaf(VertexId),

    #[error("nibble path overflow at {0}")]
    PathOverflow(VertexId),

    #[error("{0} transaction(s) still open")]
    TxPending(usize),

    #[error("no transaction open")]
    TxNotOpen,

    #[error("unknown view {0}")]
    UnknownView(ViewId),

    #[error("cannot forget the centre view {0}")]
    ForgetCentre(ViewId),

    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl Error {
    /// The vertex this error was raised for, if any.
    pub fn vid(&self) -> Option<VertexId> {
        match *self {
            Error::LeafExpected(vid)
            | Error::LeafLocked(vid)
            | Error::BranchLocked(vid)
            | Error::VertexLocked(vid)
            | Error::BranchExpected(vid)
            | Error::BranchWithoutRefs(vid)
            | Error::LeafUnexpected(vid)
            | Error::VertexNotFound(vid)
            | Error::HikeNoLeaf(vid)
            | Error::PathOverflow(vid) => Some(vid),
            _ => None,
        }
    }
}
