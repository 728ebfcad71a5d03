//! offline-cache-proxy daemon.
//!
//! Boots the configured store backend, runs the install and activate
//! lifecycle events, then serves the proxy API. Lifecycle failures are not
//! fatal: whatever generations already exist stay in control and the proxy
//! keeps serving from them.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use offline_cache_proxy::cache::disk::DiskStore;
use offline_cache_proxy::cache::memory::MemoryStore;
use offline_cache_proxy::cache::store::CacheStore;
use offline_cache_proxy::config::{Cli, Config, StoreBackend};
use offline_cache_proxy::fetch::HttpFetcher;
use offline_cache_proxy::lifecycle::controller::LifecycleController;
use offline_cache_proxy::server::proxy_api::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "offline_cache_proxy=debug,tower_http=debug"
    } else {
        "offline_cache_proxy=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("offline-cache-proxy v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = Config::load(&cli.config)?;
    let config = Arc::new(config);

    info!(
        generation = %config.cache_name(),
        upstream = %config.upstream.origin,
        resources = config.precache.resources.len(),
        "Configuration loaded"
    );

    // Build the store backend.
    let store: Arc<dyn CacheStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Disk => {
            info!(
                path = %config.store.disk_path.display(),
                compression = config.store.disk_compression,
                "Using disk store"
            );
            Arc::new(
                DiskStore::new(
                    config.store.disk_path.clone(),
                    config.store.disk_compression,
                    config.store.zstd_level,
                )
                .await?,
            )
        }
    };

    let fetcher = Arc::new(HttpFetcher::new());
    let controller = Arc::new(LifecycleController::new(
        store,
        fetcher,
        config.cache_name(),
        config.manifest_urls(),
    ));

    // Run the install and activate events. A failure on either path leaves
    // whatever generations already exist in control; the proxy still serves.
    match controller.install().await {
        Ok(()) => {
            if controller.supersede_requested() {
                if let Err(e) = controller.activate().await {
                    error!(error = %e, "Activation failed, previous generation remains in control");
                }
            }
        }
        Err(e) => {
            error!(error = %e, "Install failed, serving existing cache contents");
        }
    }

    // Build application state and the router.
    let state = Arc::new(AppState {
        controller,
        config: config.clone(),
        start_time: Instant::now(),
    });

    let app = build_router(state);

    // Start the server.
    let listen_addr = cli.listen;
    info!(addr = %listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
