//! The lifecycle controller: install, activate, and fetch handlers.
//!
//! All durable state lives in the injected [`CacheStore`]; the controller
//! itself only tracks the current generation's phase and serve counters.
//! Each handler is an async fn whose returned future is the deferred
//! completion of the corresponding host event: the host must await it, and a
//! handler's work is composed with explicit awaits rather than fired and
//! forgotten.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::store::{CacheStore, StoreError};
use crate::fetch::{FetchError, NetworkFetcher};
use crate::http::{RequestKey, StoredResponse};
use crate::lifecycle::clients::{ClientId, ClientRegistry};
use crate::lifecycle::state::GenerationPhase;

/// Errors that fail an install event.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Precache fetch failed for {url}: {source}")]
    Precache {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Precache fetch for {url} returned status {status}")]
    PrecacheStatus { url: String, status: u16 },

    #[error("Cache store error during install: {0}")]
    Store(#[from] StoreError),
}

/// Errors that fail an activate event.
#[derive(Error, Debug)]
pub enum ActivateError {
    #[error("Generation {generation:?} has not completed installation")]
    NotInstalled { generation: String },

    #[error("Cache registry enumeration failed: {0}")]
    Registry(#[source] StoreError),

    #[error("Failed to delete stale generation {generation:?}: {source}")]
    Delete {
        generation: String,
        #[source]
        source: StoreError,
    },
}

/// Errors that fail a single intercepted request.
///
/// A failed cache write after a successful network fetch is NOT represented
/// here: the response has already been obtained for the caller, so the write
/// failure is logged and counted instead of masking the response.
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Cache lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Network(#[from] FetchError),
}

/// Serve counters, updated by concurrent fetch handlers.
#[derive(Debug, Default)]
pub struct ServeStats {
    cache_hits: AtomicU64,
    network_served: AtomicU64,
    network_failures: AtomicU64,
    entries_stored: AtomicU64,
    store_write_failures: AtomicU64,
}

/// Point-in-time copy of [`ServeStats`] for the stats surface.
#[derive(Debug, Clone, Serialize)]
pub struct ServeStatsSnapshot {
    pub cache_hits: u64,
    pub network_served: u64,
    pub network_failures: u64,
    pub entries_stored: u64,
    pub store_write_failures: u64,
}

impl ServeStats {
    pub fn snapshot(&self) -> ServeStatsSnapshot {
        ServeStatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            network_served: self.network_served.load(Ordering::Relaxed),
            network_failures: self.network_failures.load(Ordering::Relaxed),
            entries_stored: self.entries_stored.load(Ordering::Relaxed),
            store_write_failures: self.store_write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Drives the three lifecycle events over one named cache generation.
pub struct LifecycleController {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn NetworkFetcher>,
    clients: ClientRegistry,

    /// The current Version Identifier: name of this build's generation.
    generation: String,

    /// Absolute URLs to precache during install, in manifest order.
    manifest: Vec<String>,

    phase: RwLock<GenerationPhase>,
    supersede: AtomicBool,
    stats: ServeStats,
}

impl LifecycleController {
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn NetworkFetcher>,
        generation: String,
        manifest: Vec<String>,
    ) -> Self {
        Self {
            store,
            fetcher,
            clients: ClientRegistry::new(),
            generation,
            manifest,
            phase: RwLock::new(GenerationPhase::Absent),
            supersede: AtomicBool::new(false),
            stats: ServeStats::default(),
        }
    }

    /// Name of the generation this controller manages.
    pub fn generation(&self) -> &str {
        &self.generation
    }

    /// Current phase of this generation.
    pub async fn phase(&self) -> GenerationPhase {
        *self.phase.read().await
    }

    /// Registry of open clients.
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Serve counters.
    pub fn stats(&self) -> ServeStatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether a completed install asked to supersede prior instances
    /// immediately instead of waiting for open pages to close.
    pub fn supersede_requested(&self) -> bool {
        self.supersede.load(Ordering::Relaxed)
    }

    /// Install handler: populate this generation with the precache manifest.
    ///
    /// Every manifest resource is fetched before anything is written, so a
    /// single failed fetch (transport error or non-success status) fails the
    /// whole install and leaves existing cache contents untouched. On success
    /// the generation becomes eligible for activation and control transfer is
    /// requested immediately.
    pub async fn install(&self) -> Result<(), InstallError> {
        *self.phase.write().await = GenerationPhase::Installing;

        match self.precache().await {
            Ok(stored) => {
                *self.phase.write().await = GenerationPhase::Installed;
                self.supersede.store(true, Ordering::Relaxed);
                info!(
                    generation = %self.generation,
                    resources = stored,
                    "Install complete, requesting immediate takeover"
                );
                Ok(())
            }
            Err(e) => {
                *self.phase.write().await = GenerationPhase::Absent;
                warn!(generation = %self.generation, error = %e, "Install failed");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, InstallError> {
        let cache = self.store.open(&self.generation).await?;

        info!(
            generation = %self.generation,
            resources = self.manifest.len(),
            "Precaching application shell"
        );

        let fetched = future::try_join_all(self.manifest.iter().map(|url| async move {
            let key = RequestKey::get(url.clone());
            let response =
                self.fetcher
                    .fetch(&key)
                    .await
                    .map_err(|source| InstallError::Precache {
                        url: url.clone(),
                        source,
                    })?;
            if !response.is_success() {
                return Err(InstallError::PrecacheStatus {
                    url: url.clone(),
                    status: response.status,
                });
            }
            debug!(url = %url, status = response.status, "Precached resource");
            Ok((key, response))
        }))
        .await?;

        let stored = fetched.len();
        for (key, response) in fetched {
            cache.put(key, response).await?;
        }

        Ok(stored)
    }

    /// Activate handler: garbage-collect stale generations and take control
    /// of currently-open clients.
    ///
    /// Deletions fan out and are joined as a batch; a single failing deletion
    /// fails the whole activation and no clients are claimed.
    pub async fn activate(&self) -> Result<(), ActivateError> {
        if !self.phase().await.activation_eligible() {
            return Err(ActivateError::NotInstalled {
                generation: self.generation.clone(),
            });
        }

        let names = self
            .store
            .generations()
            .await
            .map_err(ActivateError::Registry)?;

        let stale: Vec<String> = names
            .into_iter()
            .filter(|name| name != &self.generation)
            .collect();

        future::try_join_all(stale.iter().map(|name| async move {
            info!(generation = %name, "Deleting stale cache generation");
            self.store
                .delete_generation(name)
                .await
                .map_err(|source| ActivateError::Delete {
                    generation: name.clone(),
                    source,
                })?;
            Ok::<(), ActivateError>(())
        }))
        .await?;

        *self.phase.write().await = GenerationPhase::Active;
        let claimed = self.clients.claim(&self.generation).await;

        info!(
            generation = %self.generation,
            deleted = stale.len(),
            claimed,
            "Activation complete"
        );

        Ok(())
    }

    /// Fetch handler: cache-first, network-fallback, read-through population.
    ///
    /// Invocations are independent and may overlap; they share nothing but
    /// the store, whose operations are per-key atomic. The response is
    /// determined by exactly one of cache hit, network success, or network
    /// failure.
    pub async fn handle_fetch(
        &self,
        client: Option<ClientId>,
        key: &RequestKey,
    ) -> Result<StoredResponse, ServeError> {
        if let Some(id) = client {
            let controlling = if self.phase().await == GenerationPhase::Active {
                Some(self.generation.clone())
            } else {
                None
            };
            self.clients.register(id, controlling).await;
        }

        if let Some(hit) = self.store.match_any(key).await? {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Serving from cache");
            return Ok(hit);
        }

        debug!(key = %key, "Cache miss, fetching from network");
        let response = match self.fetcher.fetch(key).await {
            Ok(response) => response,
            Err(e) => {
                self.stats.network_failures.fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            }
        };

        if response.is_success() {
            // A clone goes into the current generation; the original is
            // handed back untouched. The write is awaited here so the
            // handler's task does not finish before the entry is durable,
            // but a write failure never masks the obtained response.
            match self.store_copy(key, &response).await {
                Ok(()) => {
                    self.stats.entries_stored.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats
                        .store_write_failures
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(key = %key, error = %e, "Failed to cache network response");
                }
            }
        }

        self.stats.network_served.fetch_add(1, Ordering::Relaxed);
        Ok(response)
    }

    async fn store_copy(&self, key: &RequestKey, response: &StoredResponse) -> Result<(), StoreError> {
        let cache = self.store.open(&self.generation).await?;
        cache.put(key.clone(), response.clone()).await
    }

    /// Entry counts per persisted generation, for the stats surface.
    pub async fn generation_entry_counts(&self) -> Result<Vec<(String, usize)>, StoreError> {
        let mut counts = Vec::new();
        for name in self.store.generations().await? {
            let cache = self.store.open(&name).await?;
            counts.push((name, cache.entry_count().await?));
        }
        Ok(counts)
    }
}
