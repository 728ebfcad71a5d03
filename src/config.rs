//! Runtime configuration for offline-cache-proxy.
//!
//! Configuration can be loaded from a JSON file or constructed
//! programmatically. The generation identifier, precache manifest, and store
//! backend selection all live here.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "offline-cache-proxy",
    about = "Offline-first caching proxy with versioned cache generations"
)]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Cache generation naming.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Precache manifest.
    #[serde(default)]
    pub precache: PrecacheConfig,

    /// Upstream origin.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Store backend.
    #[serde(default)]
    pub store: StoreConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Names the current cache generation.
///
/// The combined name is the Version Identifier: bumping `version` on deploy
/// makes every previous generation stale, and activation deletes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Application prefix shared by all generations.
    pub name_prefix: String,

    /// Version token of this build's generation.
    pub version: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name_prefix: "treasury-bulletin".to_string(),
            version: "v2".to_string(),
        }
    }
}

/// The precache manifest: resources fetched and stored unconditionally at
/// install time, in order. Fixed at startup, immutable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecacheConfig {
    /// Resource locators; absolute URLs are used as-is, paths are resolved
    /// against the upstream origin.
    pub resources: Vec<String>,
}

impl Default for PrecacheConfig {
    fn default() -> Self {
        Self {
            resources: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "https://appsforoffice.microsoft.com/lib/1/hosted/office.js".to_string(),
                "https://cdnjs.cloudflare.com/ajax/libs/pdf.js/2.10.377/pdf.min.js".to_string(),
            ],
        }
    }
}

/// The origin that proxied requests and relative manifest entries resolve
/// against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Scheme + host + optional port, no trailing slash.
    pub origin: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8081".to_string(),
        }
    }
}

/// Which store backend holds the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Volatile in-process store.
    Memory,
    /// Durable directory-per-generation store.
    Disk,
}

/// Store backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend selection.
    pub backend: StoreBackend,

    /// Root directory for the disk backend.
    pub disk_path: PathBuf,

    /// Apply zstd compression to bodies written by the disk backend.
    pub disk_compression: bool,

    /// zstd compression level (1-22).
    pub zstd_level: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            disk_path: PathBuf::from("/var/cache/offline-cache-proxy"),
            disk_compression: true,
            zstd_level: 3,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for a
    /// missing file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// The Version Identifier: the current generation's name.
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache.name_prefix, self.cache.version)
    }

    /// Precache manifest resolved to absolute URLs, in manifest order.
    pub fn manifest_urls(&self) -> Vec<String> {
        self.precache
            .resources
            .iter()
            .map(|resource| self.resolve(resource))
            .collect()
    }

    /// Resolve a resource locator against the upstream origin.
    pub fn resolve(&self, resource: &str) -> String {
        if resource.starts_with("http://") || resource.starts_with("https://") {
            return resource.to_string();
        }
        let origin = self.upstream.origin.trim_end_matches('/');
        if resource.starts_with('/') {
            format!("{origin}{resource}")
        } else {
            format!("{origin}/{resource}")
        }
    }
}
