//! Local store configuration.

/// Configuration for opening a [`LocalStore`](crate::LocalStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Journal size that triggers a compaction.
    ///
    /// The journal is rewritten from live state once it grows past this size
    /// and past twice its size after the previous compaction.
    pub compact_after_bytes: u64,

    /// Whether to sync the journal after every write.
    pub sync_on_write: bool,

    /// Maximum number of ancestors kept per leaf.
    pub revs_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            compact_after_bytes: 8 * 1024 * 1024, // 8 MB
            sync_on_write: true,
            revs_limit: 1000,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compaction threshold.
    #[must_use]
    pub const fn with_compact_after_bytes(mut self, bytes: u64) -> Self {
        self.compact_after_bytes = bytes;
        self
    }

    /// Sets whether every write is synced.
    #[must_use]
    pub const fn with_sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the number of ancestors kept per leaf.
    #[must_use]
    pub const fn with_revs_limit(mut self, limit: usize) -> Self {
        self.revs_limit = limit;
        self
    }
}
