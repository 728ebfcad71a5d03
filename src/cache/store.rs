//! The cache store abstraction.
//!
//! The lifecycle controller owns no persistent data itself; all durable state
//! lives behind [`CacheStore`]. The trait is object-safe so a process can be
//! wired with the in-memory backend, the disk backend, or a test substitute
//! without touching the handlers.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::http::{RequestKey, StoredResponse};

/// Errors raised by a cache store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache entry at {path}: {reason}")]
    CorruptEntry { path: String, reason: String },

    #[error("Generation {0:?} does not exist")]
    UnknownGeneration(String),
}

/// A versioned cache registry.
///
/// Generations are named key/value caches; the registry tracks which ones
/// currently exist. Individual read/write operations are atomic at single-key
/// granularity and there are no cross-key transactions, so concurrent fetch
/// handlers may read and write without additional locking. Callers must not
/// assume anything stronger.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a generation by name, creating it if absent.
    async fn open(&self, generation: &str) -> Result<Arc<dyn GenerationCache>, StoreError>;

    /// Enumerate the names of all generations currently persisted.
    ///
    /// Queried fresh on every call; the result reflects durable state, not
    /// any in-memory bookkeeping of the caller.
    async fn generations(&self) -> Result<Vec<String>, StoreError>;

    /// Delete an entire generation and all its entries.
    ///
    /// Returns `true` if the generation existed.
    async fn delete_generation(&self, generation: &str) -> Result<bool, StoreError>;

    /// Look up a request across all generations.
    ///
    /// This is the default match policy used when serving: the lookup is not
    /// restricted to the current generation name. Each implementation
    /// documents its scan order; the first match wins.
    async fn match_any(&self, key: &RequestKey) -> Result<Option<StoredResponse>, StoreError>;
}

/// Handle to one open generation.
#[async_trait]
pub trait GenerationCache: Send + Sync {
    /// Store a response under a key, overwriting any previous entry.
    async fn put(&self, key: RequestKey, response: StoredResponse) -> Result<(), StoreError>;

    /// Look up a request within this generation only.
    async fn match_request(&self, key: &RequestKey) -> Result<Option<StoredResponse>, StoreError>;

    /// Number of entries currently stored.
    async fn entry_count(&self) -> Result<usize, StoreError>;
}
