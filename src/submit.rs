//! Submission orchestrator: document in, Document Record out.
//!
//! ## State Machine
//!
//! ```text
//! Idle → UploadingRaw → Converting → UploadingPreview → PersistingProvisional
//!      → Analyzing → ParsingFeedback → PersistingFinal → Complete
//! ```
//!
//! Every state has one way forward and one way out: a [`PipelineFailure`]
//! naming the state it failed in. Steps run strictly in order; the only
//! suspension points are the remote calls between them.
//!
//! ## Provisional Checkpoint
//!
//! `PersistingProvisional` writes the record with empty feedback. From then
//! on the record is visible to [`ReviewPipeline::list`] and survives any later
//! failure; the failure carries its id. Nothing is rolled back, and nothing
//! uploaded is cleaned up on failure: [`ReviewPipeline::wipe`] is the only
//! deletion path.
//!
//! Re-submitting the same inputs is always safe. It produces a new id and
//! fresh blob paths, and never touches an earlier record.

use crate::config::PipelineConfig;
use crate::error::{PipelineFailure, ReviewError, StoreError};
use crate::feedback;
use crate::pipeline::analyze::{Analyzer, VisionAnalyzer};
use crate::pipeline::input::SourceDocument;
use crate::pipeline::render::{rasterize, PdfiumRasterizer, Rasterizer};
use crate::progress::Observer;
use crate::prompts::build_instructions;
use crate::record::{DocumentRecord, JobContext, RecordId};
use crate::store::{BlobStore, KvStore, RecordStore};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where a submission is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    UploadingRaw,
    Converting,
    UploadingPreview,
    PersistingProvisional,
    Analyzing,
    ParsingFeedback,
    PersistingFinal,
    Complete,
}

impl PipelineState {
    /// Every state in run order.
    pub const SEQUENCE: [PipelineState; 9] = [
        PipelineState::Idle,
        PipelineState::UploadingRaw,
        PipelineState::Converting,
        PipelineState::UploadingPreview,
        PipelineState::PersistingProvisional,
        PipelineState::Analyzing,
        PipelineState::ParsingFeedback,
        PipelineState::PersistingFinal,
        PipelineState::Complete,
    ];

    /// The one state a successful step leads to.
    pub fn successor(self) -> Option<Self> {
        use PipelineState::*;
        match self {
            Idle => Some(UploadingRaw),
            UploadingRaw => Some(Converting),
            Converting => Some(UploadingPreview),
            UploadingPreview => Some(PersistingProvisional),
            PersistingProvisional => Some(Analyzing),
            Analyzing => Some(ParsingFeedback),
            ParsingFeedback => Some(PersistingFinal),
            PersistingFinal => Some(Complete),
            Complete => None,
        }
    }

    /// Status line shown to the user while in this state.
    pub fn status_text(self) -> &'static str {
        use PipelineState::*;
        match self {
            Idle => "Waiting for a document...",
            UploadingRaw => "Uploading the file...",
            Converting => "Converting to image...",
            UploadingPreview => "Uploading the image...",
            PersistingProvisional => "Preparing data...",
            Analyzing => "Analyzing...",
            ParsingFeedback => "Reading the feedback...",
            PersistingFinal => "Saving the review...",
            Complete => "Analysis complete",
        }
    }

    /// Whether the provisional record exists once this state is entered.
    pub fn past_checkpoint(self) -> bool {
        use PipelineState::*;
        matches!(self, Analyzing | ParsingFeedback | PersistingFinal | Complete)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use PipelineState::*;
        let s = match self {
            Idle => "idle",
            UploadingRaw => "uploading the document",
            Converting => "converting the first page",
            UploadingPreview => "uploading the preview",
            PersistingProvisional => "saving the provisional record",
            Analyzing => "analyzing",
            ParsingFeedback => "parsing feedback",
            PersistingFinal => "saving the final record",
            Complete => "complete",
        };
        f.write_str(s)
    }
}

/// A document plus the job context it is reviewed against.
#[derive(Debug, Clone)]
pub struct Submission {
    pub document: SourceDocument,
    pub job: JobContext,
}

impl Submission {
    pub fn new(document: SourceDocument, job: JobContext) -> Self {
        Self { document, job }
    }
}

/// A record together with both stored blobs.
#[derive(Debug, Clone)]
pub struct ReviewBundle {
    pub record: DocumentRecord,
    pub document: Vec<u8>,
    pub preview: Vec<u8>,
}

/// What [`ReviewPipeline::wipe`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WipeReport {
    pub blobs_deleted: usize,
    /// Document Records present before the key-value store was flushed.
    pub records_cleared: usize,
}

/// Progress of one run: its state, the checkpoint id, and timing.
struct Run<'a> {
    state: PipelineState,
    record_id: Option<RecordId>,
    started: Instant,
    step_started: Instant,
    observer: Option<&'a Observer>,
}

impl<'a> Run<'a> {
    fn start(observer: Option<&'a Observer>) -> Self {
        let now = Instant::now();
        Self {
            state: PipelineState::Idle,
            record_id: None,
            started: now,
            step_started: now,
            observer,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert_eq!(self.state.successor(), Some(next));
        info!(
            "{} → {} (step {}ms)",
            self.state,
            next,
            self.step_started.elapsed().as_millis()
        );
        self.state = next;
        self.step_started = Instant::now();
        if let Some(obs) = self.observer {
            obs.on_state(next);
        }
    }

    fn checkpoint(&mut self, id: RecordId) {
        if let Some(obs) = self.observer {
            obs.on_checkpoint(&id);
        }
        self.record_id = Some(id);
    }

    fn fail(self, source: ReviewError) -> PipelineFailure {
        let failure = PipelineFailure {
            state: self.state,
            record_id: self.record_id,
            source,
        };
        warn!(
            "Submission failed after {}ms: {}",
            self.started.elapsed().as_millis(),
            failure
        );
        if let Some(obs) = self.observer {
            obs.on_failure(&failure);
        }
        failure
    }
}

/// Drives submissions through the state machine and serves the results.
///
/// Holds no per-submission state: one instance can run many submissions
/// concurrently.
pub struct ReviewPipeline {
    blobs: Arc<dyn BlobStore>,
    records: RecordStore,
    analyzer: Arc<dyn Analyzer>,
    rasterizer: Arc<dyn Rasterizer>,
    config: PipelineConfig,
}

impl ReviewPipeline {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        kv: Arc<dyn KvStore>,
        analyzer: Arc<dyn Analyzer>,
        rasterizer: Arc<dyn Rasterizer>,
        config: PipelineConfig,
    ) -> Self {
        let records = RecordStore::new(kv, config.record_prefix.clone());
        Self {
            blobs,
            records,
            analyzer,
            rasterizer,
            config,
        }
    }

    /// Pipeline rendering with pdfium and analysing with the configured
    /// vision model.
    pub fn with_vision(
        blobs: Arc<dyn BlobStore>,
        kv: Arc<dyn KvStore>,
        config: PipelineConfig,
    ) -> Result<Self, ReviewError> {
        let analyzer: Arc<dyn Analyzer> =
            Arc::new(VisionAnalyzer::from_config(Arc::clone(&blobs), &config)?);
        let rasterizer: Arc<dyn Rasterizer> = Arc::new(PdfiumRasterizer::from_config(&config));
        Ok(Self::new(blobs, kv, analyzer, rasterizer, config))
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Run one submission to `Complete`.
    ///
    /// On failure after the provisional checkpoint, the returned
    /// [`PipelineFailure`] carries the id of the record left behind.
    pub async fn submit(&self, submission: Submission) -> Result<DocumentRecord, PipelineFailure> {
        info!(
            "Submitting '{}' ({} bytes) for {:?}",
            submission.document.filename,
            submission.document.bytes.len(),
            submission.job.job_title
        );
        let mut run = Run::start(self.config.observer.as_ref());
        match self.run_steps(submission, &mut run).await {
            Ok(record) => {
                info!(
                    "Submission {} complete in {}ms",
                    record.id(),
                    run.started.elapsed().as_millis()
                );
                if let Some(obs) = run.observer {
                    obs.on_complete(&record);
                }
                Ok(record)
            }
            Err(source) => Err(run.fail(source)),
        }
    }

    async fn run_steps(
        &self,
        submission: Submission,
        run: &mut Run<'_>,
    ) -> Result<DocumentRecord, ReviewError> {
        let Submission { document, job } = submission;
        let SourceDocument { filename, bytes } = document;

        run.advance(PipelineState::UploadingRaw);
        let raw = self
            .blobs
            .upload(&bytes, &filename)
            .await
            .map_err(|source| upload_error(&filename, source))?;
        debug!("Document stored at {}", raw.path);

        run.advance(PipelineState::Converting);
        let raster = rasterize(Arc::clone(&self.rasterizer), bytes, filename).await?;
        debug!(
            "Preview {}x{} px, {} bytes",
            raster.width,
            raster.height,
            raster.byte_len()
        );

        run.advance(PipelineState::UploadingPreview);
        let preview = self
            .blobs
            .upload(&raster.png, &raster.filename)
            .await
            .map_err(|source| upload_error(&raster.filename, source))?;

        run.advance(PipelineState::PersistingProvisional);
        let id = RecordId::generate();
        let key = self.records.key_for(&id);
        let record = DocumentRecord::provisional(id.clone(), raw.path, preview.path, job);
        self.records.put(&key, &record).await?;
        run.checkpoint(id);

        run.advance(PipelineState::Analyzing);
        let instructions = build_instructions(&record.job().job_title, &record.job().job_description);
        let completion = self
            .analyzer
            .complete(record.resume_path(), &instructions)
            .await?;
        debug!(
            "Analysis returned {} chars ({} in / {} out tokens)",
            completion.content.len(),
            completion.input_tokens,
            completion.output_tokens
        );

        run.advance(PipelineState::ParsingFeedback);
        let feedback = feedback::parse(&completion.content)?;

        run.advance(PipelineState::PersistingFinal);
        let record = record.with_feedback(feedback);
        self.records.put(&key, &record).await?;

        run.advance(PipelineState::Complete);
        Ok(record)
    }

    /// The stored record for `id`, complete or still pending.
    pub async fn get(&self, id: &RecordId) -> Result<DocumentRecord, ReviewError> {
        self.records.get(&self.records.key_for(id)).await
    }

    /// Every Document Record, in store order.
    pub async fn list(&self) -> Result<Vec<DocumentRecord>, ReviewError> {
        self.records.list_all().await
    }

    /// The record for `id` with both of its blobs read back.
    pub async fn open(&self, id: &RecordId) -> Result<ReviewBundle, ReviewError> {
        open_review(self.blobs.as_ref(), &self.records, id).await
    }

    /// Delete every blob under the configured directory, then flush the
    /// key-value store.
    pub async fn wipe(&self) -> Result<WipeReport, ReviewError> {
        wipe(self.blobs.as_ref(), &self.records, &self.config.blob_dir).await
    }
}

fn upload_error(filename: &str, source: StoreError) -> ReviewError {
    ReviewError::Upload {
        filename: filename.to_string(),
        source,
    }
}

/// Fetch a record and its blobs without a full pipeline.
pub async fn open_review(
    blobs: &dyn BlobStore,
    records: &RecordStore,
    id: &RecordId,
) -> Result<ReviewBundle, ReviewError> {
    let record = records.get(&records.key_for(id)).await?;
    let document = read_blob(blobs, record.resume_path()).await?;
    let preview = read_blob(blobs, record.image_path()).await?;
    Ok(ReviewBundle {
        record,
        document,
        preview,
    })
}

async fn read_blob(blobs: &dyn BlobStore, path: &str) -> Result<Vec<u8>, ReviewError> {
    blobs
        .read(path)
        .await
        .map_err(|source| ReviewError::BlobAccess {
            path: path.to_string(),
            source,
        })
}

/// Bulk wipe: delete every blob listed under `blob_dir`, then flush the
/// whole key-value store behind `records`.
///
/// Operates on whatever stores it is given; scoping to one user means
/// handing it that user's stores.
pub async fn wipe(
    blobs: &dyn BlobStore,
    records: &RecordStore,
    blob_dir: &str,
) -> Result<WipeReport, ReviewError> {
    let listed = blobs
        .list_dir(blob_dir)
        .await
        .map_err(|source| ReviewError::BlobAccess {
            path: blob_dir.to_string(),
            source,
        })?;

    let mut blobs_deleted = 0;
    for entry in &listed {
        match blobs.delete(&entry.path).await {
            Ok(()) => blobs_deleted += 1,
            Err(StoreError::NotFound(_)) => debug!("{} already gone", entry.path),
            Err(source) => {
                return Err(ReviewError::BlobAccess {
                    path: entry.path.clone(),
                    source,
                })
            }
        }
    }

    let records_cleared = records.keys().await?.len();
    records.flush().await?;
    info!(
        "Wiped {} blobs and {} records",
        blobs_deleted, records_cleared
    );
    Ok(WipeReport {
        blobs_deleted,
        records_cleared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_walks_the_sequence() {
        let mut walked = vec![PipelineState::Idle];
        while let Some(next) = walked.last().and_then(|s| s.successor()) {
            walked.push(next);
        }
        assert_eq!(walked, PipelineState::SEQUENCE);
    }

    #[test]
    fn status_text_follows_upload_flow() {
        assert_eq!(PipelineState::UploadingRaw.status_text(), "Uploading the file...");
        assert_eq!(PipelineState::Converting.status_text(), "Converting to image...");
        assert_eq!(PipelineState::UploadingPreview.status_text(), "Uploading the image...");
        assert_eq!(PipelineState::PersistingProvisional.status_text(), "Preparing data...");
        assert_eq!(PipelineState::Analyzing.status_text(), "Analyzing...");
    }

    #[test]
    fn checkpoint_boundary() {
        assert!(!PipelineState::PersistingProvisional.past_checkpoint());
        assert!(PipelineState::Analyzing.past_checkpoint());
        assert!(PipelineState::Complete.past_checkpoint());
    }

    #[test]
    fn display_is_lowercase_phrase() {
        assert_eq!(PipelineState::ParsingFeedback.to_string(), "parsing feedback");
        for state in PipelineState::SEQUENCE {
            let s = state.to_string();
            assert_eq!(s, s.to_lowercase());
        }
    }
}
