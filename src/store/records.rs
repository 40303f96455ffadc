//! Record Store Adapter: Document Records over a [`KvStore`].
//!
//! Records live under `<prefix><id>` (by default `resume:<id>`), serialised
//! as JSON. Listing with the prefix returns exactly the Document Records,
//! whatever else shares the underlying store.

use super::KvStore;
use crate::error::{ReviewError, StoreError};
use crate::record::{DocumentRecord, RecordId};
use std::sync::Arc;
use tracing::debug;

/// Namespaced persistence for [`DocumentRecord`]s.
#[derive(Clone)]
pub struct RecordStore {
    kv: Arc<dyn KvStore>,
    prefix: String,
}

impl RecordStore {
    pub fn new(kv: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Store key for a record id.
    pub fn key_for(&self, id: &RecordId) -> String {
        format!("{}{}", self.prefix, id)
    }

    /// Write `record` under `key`. Last write wins.
    pub async fn put(&self, key: &str, record: &DocumentRecord) -> Result<(), ReviewError> {
        let json = serde_json::to_string(record).map_err(|e| ReviewError::Persistence {
            key: key.to_string(),
            source: StoreError::Corrupt {
                key: key.to_string(),
                detail: e.to_string(),
            },
        })?;
        self.kv
            .set(key, &json)
            .await
            .map_err(|source| ReviewError::Persistence {
                key: key.to_string(),
                source,
            })?;
        debug!("Stored record {} ({} bytes)", key, json.len());
        Ok(())
    }

    /// Read the record under `key`.
    ///
    /// A stored record with empty feedback is returned as such; only a
    /// missing key is [`ReviewError::NotFound`].
    pub async fn get(&self, key: &str) -> Result<DocumentRecord, ReviewError> {
        let raw = self
            .kv
            .get(key)
            .await
            .map_err(|source| ReviewError::Persistence {
                key: key.to_string(),
                source,
            })?
            .ok_or_else(|| ReviewError::NotFound {
                key: key.to_string(),
            })?;
        decode(key, &raw)
    }

    /// Every record whose key starts with `prefix`, in store order.
    ///
    /// A value that does not decode fails the whole listing.
    pub async fn list(&self, prefix: &str) -> Result<Vec<DocumentRecord>, ReviewError> {
        let entries = self
            .kv
            .list(prefix)
            .await
            .map_err(|source| ReviewError::Persistence {
                key: format!("{prefix}*"),
                source,
            })?;
        entries
            .iter()
            .map(|entry| decode(&entry.key, &entry.value))
            .collect()
    }

    /// Every Document Record in this store's namespace.
    pub async fn list_all(&self) -> Result<Vec<DocumentRecord>, ReviewError> {
        self.list(&self.prefix).await
    }

    /// Keys in this store's namespace, without decoding the values.
    pub async fn keys(&self) -> Result<Vec<String>, ReviewError> {
        let entries = self
            .kv
            .list(&self.prefix)
            .await
            .map_err(|source| ReviewError::Persistence {
                key: format!("{}*", self.prefix),
                source,
            })?;
        Ok(entries.into_iter().map(|e| e.key).collect())
    }

    /// Delete `keys`; returns how many existed.
    pub async fn delete_all<S: AsRef<str>>(&self, keys: &[S]) -> Result<usize, ReviewError> {
        let mut deleted = 0;
        for key in keys {
            let key = key.as_ref();
            let existed = self
                .kv
                .delete(key)
                .await
                .map_err(|source| ReviewError::Persistence {
                    key: key.to_string(),
                    source,
                })?;
            if existed {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Clear the whole underlying store, not only this namespace.
    pub async fn flush(&self) -> Result<(), ReviewError> {
        self.kv
            .flush()
            .await
            .map_err(|source| ReviewError::Persistence {
                key: "*".to_string(),
                source,
            })
    }
}

fn decode(key: &str, raw: &str) -> Result<DocumentRecord, ReviewError> {
    serde_json::from_str(raw).map_err(|e| ReviewError::Persistence {
        key: key.to_string(),
        source: StoreError::Corrupt {
            key: key.to_string(),
            detail: e.to_string(),
        },
    })
}
