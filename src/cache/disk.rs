//! Disk-backed cache store.
//!
//! Each generation is a directory under the store root. An entry is a pair of
//! files named by the SHA-256 of the request identity: a JSON metadata
//! sidecar (method, URL, status, headers) and the body, optionally zstd
//! compressed. The body is written before the sidecar, so a readable sidecar
//! implies a complete entry.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use crate::cache::store::{CacheStore, GenerationCache, StoreError};
use crate::http::{RequestKey, StoredResponse};

/// Sidecar metadata stored next to each body file.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: RequestKey,
    status: u16,
    headers: Vec<(String, String)>,
    compressed: bool,
}

/// Hex SHA-256 of the request identity, used as the entry's file stem.
fn entry_stem(key: &RequestKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.method.as_bytes());
    hasher.update(b" ");
    hasher.update(key.url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Disk-backed cache store.
///
/// [`CacheStore::match_any`] scans generation directories in lexicographic
/// name order. Writes within one entry are per-key atomic from a reader's
/// point of view because the sidecar lands last.
pub struct DiskStore {
    root: PathBuf,
    compression: bool,
    zstd_level: i32,
}

impl DiskStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn new(
        root: PathBuf,
        compression: bool,
        zstd_level: i32,
    ) -> Result<Self, StoreError> {
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            compression,
            zstd_level,
        })
    }

    fn generation_dir(&self, generation: &str) -> PathBuf {
        // Generation names are config-controlled version identifiers; strip
        // anything that would escape the root.
        let safe: String = generation
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.root.join(safe)
    }
}

/// Handle to one generation directory.
struct DiskGeneration {
    dir: PathBuf,
    compression: bool,
    zstd_level: i32,
}

impl DiskGeneration {
    fn body_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}.body"))
    }

    fn meta_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}.meta.json"))
    }
}

/// Read one entry from a generation directory, `None` if absent.
async fn read_entry(
    generation: &DiskGeneration,
    key: &RequestKey,
) -> Result<Option<StoredResponse>, StoreError> {
    let stem = entry_stem(key);
    let meta_path = generation.meta_path(&stem);

    let raw_meta = match fs::read(&meta_path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let meta: EntryMeta =
        serde_json::from_slice(&raw_meta).map_err(|e| StoreError::CorruptEntry {
            path: meta_path.display().to_string(),
            reason: e.to_string(),
        })?;

    let body_path = generation.body_path(&stem);
    let raw_body = fs::read(&body_path).await?;

    let body = if meta.compressed {
        zstd::stream::decode_all(raw_body.as_slice()).map_err(|e| StoreError::CorruptEntry {
            path: body_path.display().to_string(),
            reason: e.to_string(),
        })?
    } else {
        raw_body
    };

    Ok(Some(StoredResponse::new(
        meta.status,
        meta.headers,
        Bytes::from(body),
    )))
}

#[async_trait]
impl GenerationCache for DiskGeneration {
    async fn put(&self, key: RequestKey, response: StoredResponse) -> Result<(), StoreError> {
        let stem = entry_stem(&key);

        let body: Vec<u8> = if self.compression {
            zstd::stream::encode_all(response.body.as_ref(), self.zstd_level)?
        } else {
            response.body.to_vec()
        };

        fs::write(self.body_path(&stem), &body).await?;

        let meta = EntryMeta {
            status: response.status,
            headers: response.headers,
            compressed: self.compression,
            key: key.clone(),
        };
        let raw_meta = serde_json::to_vec(&meta).map_err(|e| StoreError::CorruptEntry {
            path: self.meta_path(&stem).display().to_string(),
            reason: e.to_string(),
        })?;
        fs::write(self.meta_path(&stem), raw_meta).await?;

        debug!(
            key = %key,
            stored_bytes = body.len(),
            compressed = self.compression,
            "Wrote cache entry to disk"
        );

        Ok(())
    }

    async fn match_request(&self, key: &RequestKey) -> Result<Option<StoredResponse>, StoreError> {
        read_entry(self, key).await
    }

    async fn entry_count(&self) -> Result<usize, StoreError> {
        let mut count = 0;
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().ends_with(".meta.json") {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn open(&self, generation: &str) -> Result<std::sync::Arc<dyn GenerationCache>, StoreError> {
        let dir = self.generation_dir(generation);
        fs::create_dir_all(&dir).await?;
        Ok(std::sync::Arc::new(DiskGeneration {
            dir,
            compression: self.compression,
            zstd_level: self.zstd_level,
        }))
    }

    async fn generations(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.metadata().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_generation(&self, generation: &str) -> Result<bool, StoreError> {
        let dir = self.generation_dir(generation);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(generation, "Deleted cache generation directory");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<StoredResponse>, StoreError> {
        for name in self.generations().await? {
            let generation = DiskGeneration {
                dir: self.generation_dir(&name),
                compression: self.compression,
                zstd_level: self.zstd_level,
            };
            if let Some(response) = read_entry(&generation, key).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}
