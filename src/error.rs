//! Error types for the resumind library.
//!
//! The pipeline has two layers of failure:
//!
//! * [`ReviewError`]: a single step could not complete (the document does
//!   not decode, an upload was refused, the model answered with garbage).
//!   Components return it directly.
//!
//! * [`PipelineFailure`]: a whole submission stopped. It wraps the
//!   [`ReviewError`] that ended the run together with the state the run was
//!   in and, once the provisional checkpoint was reached, the id of the
//!   record that is still stored. Callers need that id to show
//!   "analysis incomplete" for the record instead of losing it.
//!
//! Collaborators speak their own narrower error types ([`StoreError`],
//! [`AnalysisError`]); the orchestrator decides which step they belong to.

use crate::record::RecordId;
use crate::submit::PipelineState;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All step-level errors returned by the resumind library.
#[derive(Debug, Error)]
pub enum ReviewError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Raster errors ─────────────────────────────────────────────────────
    /// The bytes are not a parseable document, or the document is empty.
    #[error("Document could not be decoded: {detail}")]
    Decode { detail: String },

    /// The document decoded but its first page could not be rasterised.
    #[error("Rasterisation of the first page failed: {detail}")]
    Render { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Rasterisation needs the pdfium shared library. You can:\n\
  • Install pdfium system-wide so the dynamic loader finds it.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Remote step errors ────────────────────────────────────────────────
    /// Blob storage refused or failed an upload.
    #[error("Upload of '{filename}' failed: {source}")]
    Upload {
        filename: String,
        #[source]
        source: StoreError,
    },

    /// The analysis endpoint failed.
    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    /// The analysis result does not match the feedback schema.
    #[error("Feedback rejected: {0}")]
    Schema(#[from] SchemaError),

    /// The record store could not read or write a record.
    #[error("Record store failure on '{key}': {source}")]
    Persistence {
        key: String,
        #[source]
        source: StoreError,
    },

    /// No record exists under the key. A record whose analysis is still
    /// running is *not* reported this way; it exists with empty feedback.
    #[error("No record stored under '{key}'")]
    NotFound { key: String },

    /// A stored blob could not be read or deleted outside a submission.
    #[error("Blob '{path}' unavailable: {source}")]
    BlobAccess {
        path: String,
        #[source]
        source: StoreError,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures reported by blob storage and key-value collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("corrupt value under '{key}': {detail}")]
    Corrupt { key: String, detail: String },

    #[error("io error: {0}")]
    Io(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Failures reported by the analysis endpoint.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The provider returned an error (HTTP failure, auth, content filter…).
    #[error("provider error: {0}")]
    Provider(String),

    /// The call did not resolve in time.
    #[error("no response after {secs}s")]
    Timeout { secs: u64 },

    /// The referenced document could not be prepared for the request.
    #[error("document '{path}' unusable: {detail}")]
    Document { path: String, detail: String },
}

/// Why a raw analysis result was rejected by [`crate::feedback::parse`].
///
/// Field paths use the serialised names, e.g. `ATS.tips[2].type`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// Nothing to parse.
    #[error("response is empty")]
    Empty,

    /// The text is not well-formed JSON.
    #[error("response is not JSON: {detail}")]
    NotJson { detail: String },

    /// Well-formed JSON with missing or mistyped fields.
    #[error("response does not match the feedback shape: {detail}")]
    Invalid { detail: String },

    /// A score outside 0–100.
    #[error("{field} = {value} is outside 0–100")]
    ScoreOutOfRange { field: String, value: String },

    /// A score that is not a whole number.
    #[error("{field} = {value} is not a whole number")]
    FractionalScore { field: String, value: String },

    /// A tip polarity outside the closed set.
    #[error("{field} = {value:?} is not one of \"good\", \"improve\"")]
    UnknownPolarity { field: String, value: String },
}

/// Coarse classification of a failed submission, one per error kind a user
/// can be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Decode,
    Render,
    Upload,
    Analysis,
    Schema,
    Persistence,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Decode => "decode",
            FailureKind::Render => "render",
            FailureKind::Upload => "upload",
            FailureKind::Analysis => "analysis",
            FailureKind::Schema => "schema",
            FailureKind::Persistence => "persistence",
            FailureKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A submission that stopped before `Complete`.
///
/// `record_id` is `Some` exactly when the provisional record was written;
/// that record stays stored with empty feedback.
#[derive(Debug, Error)]
#[error("Submission failed while {state}: {source}")]
pub struct PipelineFailure {
    pub state: PipelineState,
    pub record_id: Option<RecordId>,
    #[source]
    pub source: ReviewError,
}

impl PipelineFailure {
    pub fn kind(&self) -> FailureKind {
        match &self.source {
            ReviewError::Decode { .. } => FailureKind::Decode,
            ReviewError::Render { .. } | ReviewError::PdfiumBindingFailed(_) => FailureKind::Render,
            ReviewError::Upload { .. } => FailureKind::Upload,
            ReviewError::Analysis(_) | ReviewError::ProviderNotConfigured { .. } => {
                FailureKind::Analysis
            }
            ReviewError::Schema(_) => FailureKind::Schema,
            ReviewError::Persistence { .. } | ReviewError::NotFound { .. } => {
                FailureKind::Persistence
            }
            _ => FailureKind::Internal,
        }
    }

    /// Whether a record with empty feedback was left behind.
    pub fn left_provisional_record(&self) -> bool {
        self.record_id.is_some()
    }
}
