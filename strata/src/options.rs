/// Options when opening a [`crate::ForkGroup`].
#[derive(Debug, Clone)]
pub struct Options {
    /// The maximum number of account-trie leaves held in the leaf cache.
    pub(crate) account_cache_size: usize,
    /// The maximum number of storage-trie leaves held in the leaf cache.
    pub(crate) storage_cache_size: usize,
    pub(crate) compact_free_list: bool,
}

impl Options {
    /// Create a new `Options` instance with the default values.
    pub fn new() -> Self {
        Self {
            account_cache_size: 4096,
            storage_cache_size: 16384,
            compact_free_list: true,
        }
    }

    /// Set the maximum number of account leaves kept in the leaf cache.
    ///
    /// May not be zero.
    ///
    /// Default: 4096.
    pub fn account_cache_size(&mut self, account_cache_size: usize) {
        assert!(account_cache_size > 0);
        self.account_cache_size = account_cache_size;
    }

    /// Set the maximum number of storage leaves kept in the leaf cache.
    ///
    /// May not be zero.
    ///
    /// Default: 16384.
    pub fn storage_cache_size(&mut self, storage_cache_size: usize) {
        assert!(storage_cache_size > 0);
        self.storage_cache_size = storage_cache_size;
    }

    /// Configure whether the vertex ID free list is compacted before it is persisted.
    ///
    /// Compaction drops duplicates and lowers the high-water mark past trailing free IDs.
    ///
    /// Default: on.
    pub fn compact_free_list(&mut self, compact_free_list: bool) {
        self.compact_free_list = compact_free_list;
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}
