//! The leaf cache holds recently persisted leaves by their full path.
//!
//! Account-trie leaves and storage-trie leaves live in separate LRU shards so heavy storage
//! traffic does not push accounts out.

use lru::LruCache;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::sync::Arc;
use strata_core::{LeafTie, Payload, VertexId};

/// A leaf as it was last persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedLeaf {
    pub vid: VertexId,
    pub payload: Payload,
}

/// A cache for persisted leaves.
///
/// This is cheap to clone.
#[derive(Clone)]
pub struct LeafCache {
    inner: Arc<Shared>,
}

impl LeafCache {
    /// Create a new cache holding at most `account_items` account leaves and `storage_items`
    /// storage leaves once [`LeafCache::evict`] has run.
    pub fn new(account_items: usize, storage_items: usize) -> Self {
        let shard = |max_items| {
            Mutex::new(Shard {
                cache: LruCache::unbounded(),
                max_items,
            })
        };
        LeafCache {
            inner: Arc::new(Shared {
                accounts: shard(account_items),
                storage: shard(storage_items),
            }),
        }
    }

    /// Get a cache entry, updating the LRU state.
    pub fn get(&self, tie: &LeafTie) -> Option<CachedLeaf> {
        let mut shard = self.inner.shard_for(tie);

        shard.cache.get(tie).cloned()
    }

    /// Check whether the cache contains a key without updating the LRU state.
    pub fn contains_key(&self, tie: &LeafTie) -> bool {
        let shard = self.inner.shard_for(tie);

        shard.cache.contains(tie)
    }

    /// Insert a cache entry, returning the one it replaced. This does not evict anything.
    pub fn insert(&self, tie: LeafTie, leaf: CachedLeaf) -> Option<CachedLeaf> {
        let mut shard = self.inner.shard_for(&tie);

        shard.cache.put(tie, leaf)
    }

    /// Drop the entry for a leaf which no longer exists, returning it.
    pub fn remove(&self, tie: &LeafTie) -> Option<CachedLeaf> {
        let mut shard = self.inner.shard_for(tie);

        shard.cache.pop(tie)
    }

    /// Drop every entry pointing at one of `vids`, returning the dropped entries.
    pub fn remove_vids(&self, vids: &HashSet<VertexId>) -> Vec<(LeafTie, CachedLeaf)> {
        let mut removed = Vec::new();
        if vids.is_empty() {
            return removed;
        }
        for shard in [&self.inner.accounts, &self.inner.storage] {
            let mut shard = shard.lock();
            let ties = shard
                .cache
                .iter()
                .filter(|(_, leaf)| vids.contains(&leaf.vid))
                .map(|(tie, _)| tie.clone())
                .collect::<Vec<_>>();
            for tie in ties {
                if let Some(leaf) = shard.cache.pop(&tie) {
                    removed.push((tie, leaf));
                }
            }
        }
        removed
    }

    /// Evict all excess items from the cache.
    pub fn evict(&self) {
        for shard in [&self.inner.accounts, &self.inner.storage] {
            let mut shard = shard.lock();
            while shard.cache.len() > shard.max_items {
                let _ = shard.cache.pop_lru();
            }
        }
    }

    /// The number of cached account and storage leaves.
    pub fn len(&self) -> (usize, usize) {
        (
            self.inner.accounts.lock().cache.len(),
            self.inner.storage.lock().cache.len(),
        )
    }
}

struct Shared {
    accounts: Mutex<Shard>,
    storage: Mutex<Shard>,
}

impl Shared {
    fn shard_for(&self, tie: &LeafTie) -> MutexGuard<'_, Shard> {
        if tie.root == VertexId::ACCOUNTS {
            self.accounts.lock()
        } else {
            self.storage.lock()
        }
    }
}

struct Shard {
    cache: LruCache<LeafTie, CachedLeaf>,
    max_items: usize,
}
