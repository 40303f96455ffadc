//! Directory-backed stores used by the CLI.
//!
//! Layout under a data directory:
//!
//! ```text
//! <data-dir>/
//!   blobs/    uploaded documents and previews, one file per blob
//!   records/  one file per key: percent-escaped key + ".kv"
//! ```
//!
//! Writes go to a dot-prefixed temp file first and are renamed into place,
//! so a crash never leaves a half-written value under a real key. Listings
//! skip dotfiles.

use super::{candidate_name, join_path, normalise_dir, upload_name, BlobEntry, BlobStore, KvEntry, KvStore};
use crate::error::StoreError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_stream::wrappers::ReadDirStream;
use tracing::{debug, warn};

/// Upper bound on `-N` suffixes tried for one upload name.
const MAX_NAME_ATTEMPTS: usize = 10_000;

/// Concurrent file reads during a key listing.
const LIST_READ_CONCURRENCY: usize = 16;

const KV_SUFFIX: &str = ".kv";

/// Blob store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (creating if needed) a blob directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a store path to a file path, refusing anything outside the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(path);
        let mut out = self.root.clone();
        for component in rel.components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::CurDir => {}
                _ => return Err(StoreError::InvalidPath(path.to_string())),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, bytes: &[u8], filename: &str) -> Result<BlobEntry, StoreError> {
        let base = upload_name(filename);

        for n in 0..MAX_NAME_ATTEMPTS {
            let name = candidate_name(&base, n);
            let target = self.root.join(&name);
            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
                .await
            {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };

            let written = async {
                file.write_all(bytes).await?;
                file.sync_all().await
            }
            .await;
            if let Err(e) = written {
                let _ = fs::remove_file(&target).await;
                return Err(e.into());
            }

            debug!("Stored blob {} ({} bytes)", name, bytes.len());
            return Ok(BlobEntry {
                path: name.clone(),
                name,
            });
        }

        Err(StoreError::Backend(format!(
            "no free name for '{base}' after {MAX_NAME_ATTEMPTS} attempts"
        )))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let file = self.resolve(path)?;
        fs::read(&file).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
            _ => e.into(),
        })
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let file = self.resolve(path)?;
        fs::remove_file(&file).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
            _ => e.into(),
        })
    }

    async fn list_dir(&self, dir: &str) -> Result<Vec<BlobEntry>, StoreError> {
        let dir = normalise_dir(dir);
        let abs = self.resolve(dir)?;
        let read_dir = match fs::read_dir(&abs).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        let mut stream = ReadDirStream::new(read_dir);
        while let Some(entry) = stream.try_next().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!("Skipping non-UTF-8 blob name in {}", abs.display());
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            entries.push(BlobEntry {
                path: join_path(dir, &name),
                name,
            });
        }
        entries.sort();
        Ok(entries)
    }
}

/// Key-value store keeping one file per key.
#[derive(Debug, Clone)]
pub struct FsKvStore {
    dir: PathBuf,
}

impl FsKvStore {
    /// Open (creating if needed) a record directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `key`. The empty key would map to a hidden `.kv` file.
    fn file_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidPath(key.to_string()));
        }
        Ok(self.dir.join(format!("{}{}", escape_key(key), KV_SUFFIX)))
    }

    /// Keys currently stored, decoded from the file names.
    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let read_dir = fs::read_dir(&self.dir).await?;
        let mut keys = Vec::new();
        let mut stream = ReadDirStream::new(read_dir);
        while let Some(entry) = stream.try_next().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if let Some(key) = name.strip_suffix(KV_SUFFIX).and_then(unescape_key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl KvStore for FsKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.file_for(key)?).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == ErrorKind::InvalidData => Err(StoreError::Corrupt {
                key: key.to_string(),
                detail: e.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let target = self.file_for(key)?;
        let tmp = self.dir.join(format!(
            ".{}.{}.tmp",
            escape_key(key),
            uuid::Uuid::new_v4().simple()
        ));
        fs::write(&tmp, value).await?;
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<KvEntry>, StoreError> {
        let keys: Vec<String> = self
            .keys()
            .await?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect();

        // A key deleted between the directory scan and the read is skipped.
        let entries: Vec<Option<KvEntry>> = stream::iter(keys.into_iter().map(|key| async move {
            Ok::<_, StoreError>(self.get(&key).await?.map(|value| KvEntry { key, value }))
        }))
        .buffer_unordered(LIST_READ_CONCURRENCY)
        .try_collect()
        .await?;

        Ok(entries.into_iter().flatten().collect())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.file_for(key)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn flush(&self) -> Result<(), StoreError> {
        for key in self.keys().await? {
            self.delete(&key).await?;
        }
        Ok(())
    }
}

/// Percent-escape a key into a portable file name.
///
/// ASCII alphanumerics, `-` and `_` are kept; every other byte becomes
/// `%XX`. A leading `.` is therefore always escaped, so real keys never
/// collide with temp files.
pub(crate) fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Inverse of [`escape_key`]; `None` for names it could not have produced.
pub(crate) fn unescape_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
