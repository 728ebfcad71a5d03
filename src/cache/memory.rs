//! In-memory cache store.
//!
//! The default backend and the substitute used by tests. Generations are
//! plain maps behind `tokio` RwLocks; every trait operation takes the lock
//! for the duration of one key access, which gives the per-key atomicity the
//! store contract promises.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::store::{CacheStore, GenerationCache, StoreError};
use crate::http::{RequestKey, StoredResponse};

/// One named generation: a map from request identity to response snapshot.
#[derive(Default)]
struct MemoryGeneration {
    entries: RwLock<HashMap<RequestKey, StoredResponse>>,
}

#[async_trait]
impl GenerationCache for MemoryGeneration {
    async fn put(&self, key: RequestKey, response: StoredResponse) -> Result<(), StoreError> {
        self.entries.write().await.insert(key, response);
        Ok(())
    }

    async fn match_request(&self, key: &RequestKey) -> Result<Option<StoredResponse>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn entry_count(&self) -> Result<usize, StoreError> {
        Ok(self.entries.read().await.len())
    }
}

/// In-memory cache store.
///
/// Generations are kept in creation order, and [`CacheStore::match_any`]
/// scans them in that order, so entries written by an older generation are
/// found before duplicates written by a newer one.
#[derive(Default)]
pub struct MemoryStore {
    generations: RwLock<Vec<(String, Arc<MemoryGeneration>)>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open(&self, generation: &str) -> Result<Arc<dyn GenerationCache>, StoreError> {
        {
            let generations = self.generations.read().await;
            if let Some((_, cache)) = generations.iter().find(|(name, _)| name == generation) {
                return Ok(cache.clone());
            }
        }

        let mut generations = self.generations.write().await;
        // Re-check under the write lock: another opener may have raced us.
        if let Some((_, cache)) = generations.iter().find(|(name, _)| name == generation) {
            return Ok(cache.clone());
        }

        debug!(generation, "Creating cache generation");
        let cache = Arc::new(MemoryGeneration::default());
        generations.push((generation.to_string(), cache.clone()));
        Ok(cache)
    }

    async fn generations(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .generations
            .read()
            .await
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn delete_generation(&self, generation: &str) -> Result<bool, StoreError> {
        let mut generations = self.generations.write().await;
        let before = generations.len();
        generations.retain(|(name, _)| name != generation);
        Ok(generations.len() < before)
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<StoredResponse>, StoreError> {
        let generations = self.generations.read().await;
        for (_, cache) in generations.iter() {
            if let Some(response) = cache.entries.read().await.get(key) {
                return Ok(Some(response.clone()));
            }
        }
        Ok(None)
    }
}
