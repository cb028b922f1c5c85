//! Core types of the strata vertex store.
//!
//! This crate defines the data model shared by every layer of the store: vertex identifiers and
//! their allocator, the three vertex shapes of a hexary Merkle-Patricia trie, nibble paths and
//! the hash labels cached alongside vertices. It holds no behavior beyond the invariants of
//! those types.
//!
//! The types of this crate do not require the standard library, but do require Rust's alloc
//! crate.

#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

pub mod hash;
pub mod id_gen;
pub mod nibbles;
pub mod vertex;

pub use hash::{HashKey, HashLabel};
pub use id_gen::IdGen;
pub use nibbles::{NibblePath, PathOverflow, MAX_NIBBLES};
pub use vertex::{
    AccountData, LeafTie, Payload, RootedVertexId, Vertex, VertexId, VertexKind, BRANCH_WIDTH,
};
