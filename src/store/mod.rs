//! Storage collaborators: raw blob storage and a string key-value store.
//!
//! Both are traits so the pipeline can run against the in-process
//! implementations in [`memory`] (tests, embedding), the directory-backed
//! ones in [`fs`] (CLI), or any remote service a host application wraps.
//!
//! [`records::RecordStore`] sits on top of a [`KvStore`] and is the only
//! place Document Records are (de)serialised.

pub mod fs;
pub mod memory;
pub mod records;

use crate::error::StoreError;
use async_trait::async_trait;
use std::path::Path;

pub use records::RecordStore;

/// A stored blob as returned by uploads and directory listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobEntry {
    /// File name component.
    pub name: String,
    /// Path to pass back to [`BlobStore::read`] / [`BlobStore::delete`].
    pub path: String,
}

/// Raw file storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under a name derived from `filename`.
    ///
    /// Never overwrites: when the name is taken a `-N` suffix is added
    /// before the extension, so every upload gets its own path.
    async fn upload(&self, bytes: &[u8], filename: &str) -> Result<BlobEntry, StoreError>;

    /// Read a blob back; `StoreError::NotFound` if absent.
    async fn read(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Delete a blob; `StoreError::NotFound` if absent.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Blobs directly inside `dir`. `""`, `"."` and `"./"` name the root.
    async fn list_dir(&self, dir: &str) -> Result<Vec<BlobEntry>, StoreError>;
}

/// One key-value pair returned by [`KvStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
}

/// String key-value store with last-write-wins semantics per key.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Fails with [`StoreError::InvalidPath`] for an empty key.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// All entries whose key starts with `prefix`, in no particular order.
    async fn list(&self, prefix: &str) -> Result<Vec<KvEntry>, StoreError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove every entry.
    async fn flush(&self) -> Result<(), StoreError>;
}

// ── Naming helpers shared by the implementations ─────────────────────────

/// Reduce a user-supplied file name to a safe single path component.
pub(crate) fn upload_name(filename: &str) -> String {
    let base = Path::new(filename.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .trim_start_matches('.');
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() || c == '/' || c == '\\' { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// `n`-th candidate for `name`: the name itself, then `stem-1.ext`, `stem-2.ext`, …
pub(crate) fn candidate_name(name: &str, n: usize) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{n}.{ext}"),
        _ => format!("{name}-{n}"),
    }
}

/// Canonical form of a blob directory: no leading `./` or `/`, no trailing `/`.
pub(crate) fn normalise_dir(dir: &str) -> &str {
    let d = dir.trim();
    let d = d.strip_prefix("./").unwrap_or(d);
    let d = d.trim_matches('/');
    if d == "." {
        ""
    } else {
        d
    }
}

pub(crate) fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_name_strips_directories() {
        assert_eq!(upload_name("/home/me/cv.pdf"), "cv.pdf");
        assert_eq!(upload_name("../../etc/passwd"), "passwd");
        assert_eq!(upload_name(".hidden.pdf"), "hidden.pdf");
        assert_eq!(upload_name(""), "upload");
        assert_eq!(upload_name(".."), "upload");
    }

    #[test]
    fn candidate_names_keep_extension() {
        assert_eq!(candidate_name("cv.pdf", 0), "cv.pdf");
        assert_eq!(candidate_name("cv.pdf", 2), "cv-2.pdf");
        assert_eq!(candidate_name("archive.tar.gz", 1), "archive.tar-1.gz");
        assert_eq!(candidate_name("README", 1), "README-1");
    }

    #[test]
    fn normalise_dir_variants() {
        assert_eq!(normalise_dir(""), "");
        assert_eq!(normalise_dir("."), "");
        assert_eq!(normalise_dir("./"), "");
        assert_eq!(normalise_dir("/"), "");
        assert_eq!(normalise_dir("./previews/"), "previews");
        assert_eq!(join_path("", "a.png"), "a.png");
        assert_eq!(join_path("previews", "a.png"), "previews/a.png");
    }
}
