//! Integration tests for the cache lifecycle: install, activate, fetch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use offline_cache_proxy::cache::memory::MemoryStore;
use offline_cache_proxy::cache::store::{CacheStore, GenerationCache, StoreError};
use offline_cache_proxy::fetch::{FetchError, NetworkFetcher};
use offline_cache_proxy::http::{RequestKey, StoredResponse};
use offline_cache_proxy::lifecycle::controller::{
    ActivateError, InstallError, LifecycleController, ServeError,
};
use offline_cache_proxy::lifecycle::state::GenerationPhase;

const GEN_V1: &str = "treasury-bulletin-v1";
const GEN_V2: &str = "treasury-bulletin-v2";

/// Scripted outcome for one URL.
#[derive(Clone)]
enum Outcome {
    Success(&'static str),
    Status(u16),
    Unreachable,
}

/// Fetcher that serves canned outcomes and counts network calls.
#[derive(Default)]
struct ScriptedFetcher {
    outcomes: HashMap<String, Outcome>,
    calls: AtomicU64,
}

impl ScriptedFetcher {
    fn new() -> Self {
        Self::default()
    }

    fn with(mut self, url: &str, outcome: Outcome) -> Self {
        self.outcomes.insert(url.to_string(), outcome);
        self
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NetworkFetcher for ScriptedFetcher {
    async fn fetch(&self, key: &RequestKey) -> Result<StoredResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match self.outcomes.get(&key.url) {
            Some(Outcome::Success(body)) => Ok(StoredResponse::new(
                200,
                vec![("content-type".to_string(), "text/html".to_string())],
                Bytes::from_static(body.as_bytes()),
            )),
            Some(Outcome::Status(status)) => Ok(StoredResponse::from_status(*status)),
            Some(Outcome::Unreachable) | None => Err(FetchError::transport(
                key.url.clone(),
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"),
            )),
        }
    }
}

/// Store wrapper whose generation deletions always fail.
struct UndeletableStore {
    inner: MemoryStore,
}

#[async_trait]
impl CacheStore for UndeletableStore {
    async fn open(&self, generation: &str) -> Result<Arc<dyn GenerationCache>, StoreError> {
        self.inner.open(generation).await
    }

    async fn generations(&self) -> Result<Vec<String>, StoreError> {
        self.inner.generations().await
    }

    async fn delete_generation(&self, _generation: &str) -> Result<bool, StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "deletion refused",
        )))
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<StoredResponse>, StoreError> {
        self.inner.match_any(key).await
    }
}

fn controller(
    store: Arc<dyn CacheStore>,
    fetcher: Arc<ScriptedFetcher>,
    manifest: &[&str],
) -> LifecycleController {
    LifecycleController::new(
        store,
        fetcher,
        GEN_V2.to_string(),
        manifest.iter().map(|s| s.to_string()).collect(),
    )
}

// ─── Fetch handler ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_hit_serves_stored_entry_without_network() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(ScriptedFetcher::new());

    let stored = StoredResponse::new(
        200,
        vec![("etag".to_string(), "\"abc\"".to_string())],
        Bytes::from_static(b"cached body"),
    );
    let key = RequestKey::get("http://app/index.html");
    store
        .open(GEN_V2)
        .await
        .unwrap()
        .put(key.clone(), stored.clone())
        .await
        .unwrap();

    let ctl = controller(store, fetcher.clone(), &[]);
    let served = ctl.handle_fetch(None, &key).await.unwrap();

    assert_eq!(served, stored);
    assert_eq!(fetcher.calls(), 0);
    assert_eq!(ctl.stats().cache_hits, 1);
}

#[tokio::test]
async fn test_miss_with_success_populates_cache() {
    let store = Arc::new(MemoryStore::new());
    let fetcher =
        Arc::new(ScriptedFetcher::new().with("http://app/report.pdf", Outcome::Success("%PDF")));
    let ctl = controller(store.clone(), fetcher.clone(), &[]);

    let key = RequestKey::get("http://app/report.pdf");
    let served = ctl.handle_fetch(None, &key).await.unwrap();
    assert_eq!(served.status, 200);
    assert_eq!(served.body, Bytes::from_static(b"%PDF"));
    assert_eq!(fetcher.calls(), 1);

    // The stored copy is equivalent to what was served.
    let cached = store.match_any(&key).await.unwrap().unwrap();
    assert_eq!(cached, served);

    // A second request is a hit; no further network activity.
    let again = ctl.handle_fetch(None, &key).await.unwrap();
    assert_eq!(again, served);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_miss_with_non_success_is_passed_through_uncached() {
    let store = Arc::new(MemoryStore::new());
    let fetcher =
        Arc::new(ScriptedFetcher::new().with("http://app/missing", Outcome::Status(404)));
    let ctl = controller(store.clone(), fetcher.clone(), &[]);

    let key = RequestKey::get("http://app/missing");
    let served = ctl.handle_fetch(None, &key).await.unwrap();
    assert_eq!(served.status, 404);

    // Not stored: the next request goes to the network again.
    assert!(store.match_any(&key).await.unwrap().is_none());
    ctl.handle_fetch(None, &key).await.unwrap();
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_miss_with_transport_failure_fails_the_request() {
    let store = Arc::new(MemoryStore::new());
    let fetcher =
        Arc::new(ScriptedFetcher::new().with("http://app/offline", Outcome::Unreachable));
    let ctl = controller(store.clone(), fetcher.clone(), &[]);

    let key = RequestKey::get("http://app/offline");
    let result = ctl.handle_fetch(None, &key).await;

    assert!(matches!(result, Err(ServeError::Network(_))));
    assert!(store.match_any(&key).await.unwrap().is_none());
    assert_eq!(ctl.stats().network_failures, 1);
}

#[tokio::test]
async fn test_concurrent_fetches_are_independent() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with("http://app/a", Outcome::Success("a"))
            .with("http://app/b", Outcome::Success("b"))
            .with("http://app/c", Outcome::Unreachable),
    );
    let ctl = Arc::new(controller(store.clone(), fetcher.clone(), &[]));

    let key_a = RequestKey::get("http://app/a");
    let key_b = RequestKey::get("http://app/b");
    let key_c = RequestKey::get("http://app/c");
    let (a, b, c) = tokio::join!(
        ctl.handle_fetch(None, &key_a),
        ctl.handle_fetch(None, &key_b),
        ctl.handle_fetch(None, &key_c),
    );

    assert_eq!(a.unwrap().body, Bytes::from_static(b"a"));
    assert_eq!(b.unwrap().body, Bytes::from_static(b"b"));
    assert!(c.is_err());

    let cache = store.open(GEN_V2).await.unwrap();
    assert_eq!(cache.entry_count().await.unwrap(), 2);
}

// ─── Install handler ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_install_precaches_whole_manifest() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with("http://app/", Outcome::Success("root"))
            .with("http://app/index.html", Outcome::Success("index"))
            .with("https://cdn/office.js", Outcome::Success("office"))
            .with("https://cdn/pdf.min.js", Outcome::Success("pdf")),
    );
    let ctl = controller(
        store.clone(),
        fetcher,
        &[
            "http://app/",
            "http://app/index.html",
            "https://cdn/office.js",
            "https://cdn/pdf.min.js",
        ],
    );

    ctl.install().await.unwrap();

    assert_eq!(ctl.phase().await, GenerationPhase::Installed);
    assert!(ctl.supersede_requested());
    let cache = store.open(GEN_V2).await.unwrap();
    assert_eq!(cache.entry_count().await.unwrap(), 4);
    let index = store
        .match_any(&RequestKey::get("http://app/index.html"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(index.body, Bytes::from_static(b"index"));
}

#[tokio::test]
async fn test_install_is_all_or_nothing_on_transport_failure() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with("http://app/a", Outcome::Success("a"))
            .with("http://app/b", Outcome::Unreachable)
            .with("http://app/c", Outcome::Success("c")),
    );
    let ctl = controller(
        store.clone(),
        fetcher,
        &["http://app/a", "http://app/b", "http://app/c"],
    );

    let err = ctl.install().await.unwrap_err();
    assert!(matches!(err, InstallError::Precache { ref url, .. } if url == "http://app/b"));

    // No partial {a, c} set is left behind.
    let cache = store.open(GEN_V2).await.unwrap();
    assert_eq!(cache.entry_count().await.unwrap(), 0);
    assert_eq!(ctl.phase().await, GenerationPhase::Absent);
    assert!(!ctl.supersede_requested());

    // And the failed generation is not eligible for activation.
    assert!(matches!(
        ctl.activate().await,
        Err(ActivateError::NotInstalled { .. })
    ));
}

#[tokio::test]
async fn test_install_fails_on_non_success_status() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with("http://app/a", Outcome::Success("a"))
            .with("http://app/b", Outcome::Status(503)),
    );
    let ctl = controller(store.clone(), fetcher, &["http://app/a", "http://app/b"]);

    let err = ctl.install().await.unwrap_err();
    assert!(
        matches!(err, InstallError::PrecacheStatus { ref url, status } if url == "http://app/b" && status == 503)
    );
}

#[tokio::test]
async fn test_install_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with("http://app/a", Outcome::Success("a"))
            .with("http://app/b", Outcome::Success("b")),
    );
    let ctl = controller(store.clone(), fetcher, &["http://app/a", "http://app/b"]);

    ctl.install().await.unwrap();
    ctl.install().await.unwrap();

    let cache = store.open(GEN_V2).await.unwrap();
    assert_eq!(cache.entry_count().await.unwrap(), 2);
    let a = store
        .match_any(&RequestKey::get("http://app/a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.body, Bytes::from_static(b"a"));
}

// ─── Activate handler ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_activate_deletes_stale_generations_and_claims_clients() {
    let store = Arc::new(MemoryStore::new());

    // A previous build's generation with an old entry.
    store
        .open(GEN_V1)
        .await
        .unwrap()
        .put(
            RequestKey::get("http://app/index.html"),
            StoredResponse::new(200, Vec::new(), Bytes::from_static(b"old index")),
        )
        .await
        .unwrap();

    let fetcher =
        Arc::new(ScriptedFetcher::new().with("http://app/index.html", Outcome::Success("new")));
    let ctl = controller(store.clone(), fetcher, &["http://app/index.html"]);

    // An open page is browsing under the old generation.
    let page = Uuid::new_v4();
    ctl.clients().register(page, Some(GEN_V1.to_string())).await;

    ctl.install().await.unwrap();
    ctl.activate().await.unwrap();

    assert_eq!(store.generations().await.unwrap(), vec![GEN_V2]);
    assert_eq!(ctl.phase().await, GenerationPhase::Active);
    assert_eq!(
        ctl.clients().controller_of(page).await,
        Some(Some(GEN_V2.to_string()))
    );

    // The old generation's entries are gone with it.
    let index = store
        .match_any(&RequestKey::get("http://app/index.html"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(index.body, Bytes::from_static(b"new"));
}

#[tokio::test]
async fn test_activate_failure_on_deletion_leaves_clients_unclaimed() {
    let inner = MemoryStore::new();
    let fetcher = Arc::new(ScriptedFetcher::new().with("http://app/a", Outcome::Success("a")));

    // Seed a stale generation, then wrap the store so deletion fails.
    let seeded = {
        let store = Arc::new(UndeletableStore { inner });
        store.open(GEN_V1).await.unwrap();
        store
    };

    let ctl = controller(seeded, fetcher, &["http://app/a"]);
    let page = Uuid::new_v4();
    ctl.clients().register(page, Some(GEN_V1.to_string())).await;

    ctl.install().await.unwrap();
    let err = ctl.activate().await.unwrap_err();
    assert!(matches!(err, ActivateError::Delete { ref generation, .. } if generation == GEN_V1));

    // The batch join failed: not active, nobody claimed.
    assert_eq!(ctl.phase().await, GenerationPhase::Installed);
    assert_eq!(
        ctl.clients().controller_of(page).await,
        Some(Some(GEN_V1.to_string()))
    );
}

#[tokio::test]
async fn test_client_seen_while_active_is_controlled_by_current_generation() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with("http://app/a", Outcome::Success("a"))
            .with("http://app/late", Outcome::Success("late")),
    );
    let ctl = controller(store, fetcher, &["http://app/a"]);

    ctl.install().await.unwrap();
    ctl.activate().await.unwrap();

    let page = Uuid::new_v4();
    ctl.handle_fetch(Some(page), &RequestKey::get("http://app/late"))
        .await
        .unwrap();

    assert_eq!(
        ctl.clients().controller_of(page).await,
        Some(Some(GEN_V2.to_string()))
    );
}
