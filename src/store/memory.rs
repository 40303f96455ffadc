//! In-process stores backed by ordered maps.
//!
//! Cheap to clone (shared `Arc` state), so a test can keep a handle and
//! inspect what a pipeline wrote.

use super::{candidate_name, join_path, normalise_dir, upload_name, BlobEntry, BlobStore, KvEntry, KvStore};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Blob store holding every upload in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, bytes: &[u8], filename: &str) -> Result<BlobEntry, StoreError> {
        let base = upload_name(filename);
        let mut blobs = self.blobs.write().await;
        let name = (0..)
            .map(|n| candidate_name(&base, n))
            .find(|candidate| !blobs.contains_key(candidate))
            .ok_or_else(|| StoreError::Backend(format!("no free name for '{base}'")))?;
        blobs.insert(name.clone(), bytes.to_vec());
        Ok(BlobEntry {
            path: name.clone(),
            name,
        })
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.blobs
            .write()
            .await
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn list_dir(&self, dir: &str) -> Result<Vec<BlobEntry>, StoreError> {
        let dir = normalise_dir(dir);
        let blobs = self.blobs.read().await;
        Ok(blobs
            .keys()
            .filter_map(|path| {
                let (parent, name) = path.rsplit_once('/').unwrap_or(("", path.as_str()));
                (parent == dir).then(|| BlobEntry {
                    name: name.to_string(),
                    path: join_path(dir, name),
                })
            })
            .collect())
    }
}

/// Key-value store held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidPath(key.to_string()));
        }
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<KvEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| KvEntry {
                key: k.clone(),
                value: v.clone(),
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.entries.write().await.clear();
        Ok(())
    }
}
