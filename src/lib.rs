//! # resumind
//!
//! Intake and analysis pipeline for résumé reviews: take an uploaded
//! document, render a preview of its first page, have a vision model score
//! it against a job description, and keep the result as a durable record.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document bytes
//!  │
//!  ├─ 1. UploadingRaw           store the document blob
//!  ├─ 2. Converting             rasterise page 1 via pdfium (spawn_blocking)
//!  ├─ 3. UploadingPreview       store the PNG preview blob
//!  ├─ 4. PersistingProvisional  write the record with empty feedback  ◀ checkpoint
//!  ├─ 5. Analyzing              vision model call (edgequake-llm)
//!  ├─ 6. ParsingFeedback        validate the JSON answer
//!  └─ 7. PersistingFinal        overwrite the record with the feedback
//! ```
//!
//! A run that fails after the checkpoint leaves its record stored with
//! empty feedback, shown as pending. Nothing is retried automatically.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resumind::store::fs::{FsBlobStore, FsKvStore};
//! use resumind::{load_document, JobContext, PipelineConfig, ReviewPipeline, Submission};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = PipelineConfig::default();
//!     let blobs = Arc::new(FsBlobStore::open("data/blobs").await?);
//!     let kv = Arc::new(FsKvStore::open("data/records").await?);
//!     let pipeline = ReviewPipeline::with_vision(blobs, kv, config)?;
//!
//!     let document = load_document("resume.pdf", 120).await?;
//!     let job = JobContext::new("Acme", "Engineer", "Build systems");
//!     let record = pipeline.submit(Submission::new(document, job)).await?;
//!     if let Some(feedback) = record.feedback() {
//!         println!("overall {}/100", feedback.overall_score);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `resumind` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! resumind = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod feedback;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod store;
pub mod submit;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{
    AnalysisError, FailureKind, PipelineFailure, ReviewError, SchemaError, StoreError,
};
pub use feedback::{parse as parse_feedback, Category, CategoryKind, Feedback, Score, Tip, TipPolarity};
pub use pipeline::analyze::{Analyzer, Completion, VisionAnalyzer};
pub use pipeline::input::{load_document, SourceDocument};
pub use pipeline::render::{PdfiumRasterizer, RasterOutput, Rasterizer};
pub use progress::{NoopObserver, Observer, SubmissionObserver};
pub use record::{DocumentRecord, JobContext, RecordId, ReviewStatus};
pub use store::{BlobEntry, BlobStore, KvEntry, KvStore, RecordStore};
pub use submit::{PipelineState, ReviewBundle, ReviewPipeline, Submission, WipeReport};
