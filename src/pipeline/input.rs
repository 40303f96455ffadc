//! Input resolution: turn a user-supplied path or URL into document bytes.
//!
//! The pipeline works on bytes, never on paths: the same bytes are uploaded
//! and rasterised, so the two can never disagree. Validation of the content
//! is left to the rasteriser, which reports it as a decode failure at the
//! right pipeline state.

use crate::error::ReviewError;
use std::path::PathBuf;
use tracing::{debug, info};

/// Name used when a URL has no usable last path segment.
const DEFAULT_DOWNLOAD_NAME: &str = "resume.pdf";

/// A document ready to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Original file name; uploads and the preview name derive from it.
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local file or download a URL.
pub async fn load_document(input: &str, timeout_secs: u64) -> Result<SourceDocument, ReviewError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ReviewError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<SourceDocument, ReviewError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ReviewError::FileNotFound { path: path.clone() },
        std::io::ErrorKind::PermissionDenied => ReviewError::PermissionDenied { path: path.clone() },
        _ => ReviewError::InvalidInput {
            input: format!("{}: {}", path.display(), e),
        },
    })?;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_DOWNLOAD_NAME)
        .to_string();
    debug!("Read local document {} ({} bytes)", path.display(), bytes.len());
    Ok(SourceDocument { filename, bytes })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceDocument, ReviewError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ReviewError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            ReviewError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ReviewError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(ReviewError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send_err)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(SourceDocument {
        filename: filename_from_url(url),
        bytes: bytes.to_vec(),
    })
}

/// Last path segment of a URL when it looks like a file name.
pub fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    DEFAULT_DOWNLOAD_NAME.to_string()
}
