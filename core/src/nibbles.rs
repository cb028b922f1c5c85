//! Nibble paths.
//!
//! Every lookup path in a hexary trie is a sequence of 4-bit nibbles. Full paths are derived from
//! 32-byte keys and are therefore at most [`MAX_NIBBLES`] long; extension and leaf prefixes are
//! suffixes of such paths.

use arrayvec::ArrayVec;
use core::fmt;

/// The maximum number of nibbles in a path: two per byte of a 32-byte key.
pub const MAX_NIBBLES: usize = 64;

/// Returned when an operation would make a path longer than [`MAX_NIBBLES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathOverflow;

impl fmt::Display for PathOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nibble path longer than {} nibbles", MAX_NIBBLES)
    }
}

/// A sequence of nibbles, each in `0..16`.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NibblePath(ArrayVec<u8, MAX_NIBBLES>);

impl NibblePath {
    /// Create an empty path.
    pub fn new() -> Self {
        NibblePath(ArrayVec::new())
    }

    /// Create a path holding a single nibble.
    ///
    /// Panics if `nibble` is not a valid nibble.
    pub fn single(nibble: u8) -> Self {
        assert!(nibble < 16, "not a nibble: {}", nibble);
        let mut path = NibblePath::new();
        path.0.push(nibble);
        path
    }

    /// Create a path from a slice of nibbles.
    ///
    /// Returns [`PathOverflow`] if the slice holds more than [`MAX_NIBBLES`] nibbles. Panics if any
    /// element is not a valid nibble.
    pub fn from_nibbles(nibbles: &[u8]) -> Result<Self, PathOverflow> {
        let mut path = NibblePath::new();
        for &nibble in nibbles {
            path.push(nibble)?;
        }
        Ok(path)
    }

    /// Unpack a 32-byte key into its full 64-nibble path, high nibble first.
    pub fn from_key(key: &[u8; 32]) -> Self {
        let mut path = NibblePath::new();
        for byte in key {
            path.0.push(byte >> 4);
            path.0.push(byte & 0x0f);
        }
        path
    }

    /// Pack a full-length path back into its key. Returns `None` for shorter paths.
    pub fn to_key(&self) -> Option<[u8; 32]> {
        if self.0.len() != MAX_NIBBLES {
            return None;
        }
        let mut key = [0u8; 32];
        for (byte, pair) in key.iter_mut().zip(self.0.chunks_exact(2)) {
            *byte = (pair[0] << 4) | pair[1];
        }
        Some(key)
    }

    /// Append a nibble.
    ///
    /// Panics if `nibble` is not a valid nibble.
    pub fn push(&mut self, nibble: u8) -> Result<(), PathOverflow> {
        assert!(nibble < 16, "not a nibble: {}", nibble);
        self.0.try_push(nibble).map_err(|_| PathOverflow)
    }

    /// Concatenate `self` and `other` into a new path.
    pub fn join(&self, other: &NibblePath) -> Result<NibblePath, PathOverflow> {
        let mut joined = self.clone();
        joined
            .0
            .try_extend_from_slice(&other.0)
            .map_err(|_| PathOverflow)?;
        Ok(joined)
    }

    /// Prepend a single nibble, as when a branch slot is folded into the prefix below it.
    pub fn prepend(&self, nibble: u8) -> Result<NibblePath, PathOverflow> {
        NibblePath::single(nibble).join(self)
    }

    /// The path with the first `n` nibbles removed. Panics if `n` exceeds the length.
    pub fn skip(&self, n: usize) -> NibblePath {
        let mut path = NibblePath::new();
        // UNWRAP: a suffix can never be longer than the path it is taken from.
        path.0.try_extend_from_slice(&self.0[n..]).unwrap();
        path
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the nibble at the given index.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.0.get(index).copied()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for NibblePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NibblePath({})", self)
    }
}

impl fmt::Display for NibblePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for &nibble in self.0.iter() {
            // UNWRAP: every element is below 16.
            let c = core::char::from_digit(nibble as u32, 16).unwrap();
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}
