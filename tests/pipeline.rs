//! Integration tests for the submission pipeline.
//!
//! Everything runs in-process: memory stores, a stub rasterizer that never
//! touches pdfium, and a scripted analyzer. No network, no API key.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use resumind::pipeline::render::{check_document_bytes, preview_filename};
use resumind::store::memory::{MemoryBlobStore, MemoryKvStore};
use resumind::{
    AnalysisError, Analyzer, BlobEntry, BlobStore, Completion, DocumentRecord, FailureKind,
    JobContext, KvEntry, KvStore, PipelineConfig, PipelineFailure, PipelineState, RasterOutput,
    Rasterizer, RecordId, ReviewError, ReviewPipeline, ReviewStatus, SchemaError, SourceDocument,
    StoreError, Submission, SubmissionObserver, VisionAnalyzer,
};
use edgequake_llm::MockProvider;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

// ── Test helpers ─────────────────────────────────────────────────────────────

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("resumind=debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

const PDF: &[u8] = b"%PDF-1.4\n% stub document\n%%EOF\n";
const PREVIEW: &[u8] = b"\x89PNG\r\n\x1a\nstub";

const GOOD_RESPONSE: &str = r#"```json
{
  "overallScore": 72,
  "ATS": {
    "score": 80,
    "tips": [
      { "type": "good", "tip": "Plain layout" },
      { "type": "improve", "tip": "Add keywords", "explanation": "Mirror the posting." }
    ]
  },
  "toneAndStyle": { "score": 64, "tips": [] },
  "content": { "score": 70, "tips": [] },
  "structure": { "score": 88, "tips": [] },
  "skills": { "score": 59, "tips": [] }
}
```"#;

/// Rasterizer with the same input checks as pdfium but a fixed output.
struct StubRasterizer;

impl Rasterizer for StubRasterizer {
    fn rasterize_first_page(
        &self,
        bytes: &[u8],
        source_name: &str,
    ) -> Result<RasterOutput, ReviewError> {
        check_document_bytes(bytes)?;
        Ok(RasterOutput {
            width: 1414,
            height: 2000,
            page_index: 0,
            filename: preview_filename(source_name),
            png: PREVIEW.to_vec(),
        })
    }
}

/// Analyzer that returns a canned answer and remembers what it was asked.
struct ScriptedAnalyzer {
    reply: Result<String, fn() -> AnalysisError>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedAnalyzer {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn failing(err: fn() -> AnalysisError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(err),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn complete(
        &self,
        document_ref: &str,
        instructions: &str,
    ) -> Result<Completion, AnalysisError> {
        self.calls
            .lock()
            .unwrap()
            .push((document_ref.to_string(), instructions.to_string()));
        match &self.reply {
            Ok(text) => Ok(Completion::text(text.clone())),
            Err(make) => Err(make()),
        }
    }
}

/// Blob store that refuses uploads whose name ends with `suffix`.
struct RejectingBlobs {
    inner: MemoryBlobStore,
    suffix: &'static str,
}

#[async_trait]
impl BlobStore for RejectingBlobs {
    async fn upload(&self, bytes: &[u8], filename: &str) -> Result<BlobEntry, StoreError> {
        if filename.ends_with(self.suffix) {
            return Err(StoreError::Backend("quota exceeded".into()));
        }
        self.inner.upload(bytes, filename).await
    }
    async fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.read(path).await
    }
    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.inner.delete(path).await
    }
    async fn list_dir(&self, dir: &str) -> Result<Vec<BlobEntry>, StoreError> {
        self.inner.list_dir(dir).await
    }
}

/// Key-value store whose `n`-th `set` (1-based) fails.
struct FlakyKv {
    inner: MemoryKvStore,
    fail_on: usize,
    sets: AtomicUsize,
}

#[async_trait]
impl KvStore for FlakyKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.sets.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(StoreError::Backend("connection reset".into()));
        }
        self.inner.set(key, value).await
    }
    async fn list(&self, prefix: &str) -> Result<Vec<KvEntry>, StoreError> {
        self.inner.list(prefix).await
    }
    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }
    async fn flush(&self) -> Result<(), StoreError> {
        self.inner.flush().await
    }
}

#[derive(Default)]
struct Recording {
    states: Mutex<Vec<PipelineState>>,
    checkpoints: Mutex<Vec<RecordId>>,
    failures: AtomicUsize,
    completions: AtomicUsize,
}

impl SubmissionObserver for Recording {
    fn on_state(&self, state: PipelineState) {
        self.states.lock().unwrap().push(state);
    }
    fn on_checkpoint(&self, id: &RecordId) {
        self.checkpoints.lock().unwrap().push(id.clone());
    }
    fn on_failure(&self, _failure: &PipelineFailure) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }
    fn on_complete(&self, _record: &DocumentRecord) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }
}

fn submission(bytes: &[u8]) -> Submission {
    Submission::new(
        SourceDocument::new("cv.pdf", bytes),
        JobContext::new("Acme", "Engineer", "Build systems"),
    )
}

fn pipeline_with(
    blobs: Arc<dyn BlobStore>,
    kv: Arc<dyn KvStore>,
    analyzer: Arc<dyn Analyzer>,
) -> ReviewPipeline {
    init_tracing();
    ReviewPipeline::new(
        blobs,
        kv,
        analyzer,
        Arc::new(StubRasterizer),
        PipelineConfig::default(),
    )
}

fn memory_pipeline(analyzer: Arc<dyn Analyzer>) -> (ReviewPipeline, MemoryBlobStore, MemoryKvStore) {
    let blobs = MemoryBlobStore::new();
    let kv = MemoryKvStore::new();
    let pipeline = pipeline_with(Arc::new(blobs.clone()), Arc::new(kv.clone()), analyzer);
    (pipeline, blobs, kv)
}

// ── Successful runs ──────────────────────────────────────────────────────────

#[tokio::test]
async fn complete_run_stores_scored_record() {
    let analyzer = ScriptedAnalyzer::replying(GOOD_RESPONSE);
    let (pipeline, blobs, _) = memory_pipeline(analyzer.clone());

    let record = pipeline.submit(submission(PDF)).await.unwrap();

    assert_eq!(record.status(), ReviewStatus::Complete);
    let feedback = record.feedback().expect("feedback present");
    assert!(feedback.overall_score.get() <= 100);
    assert_eq!(feedback.ats.score.get(), 80);
    assert_eq!(feedback.ats.tips.len(), 2);
    assert!(!record.resume_path().is_empty());
    assert!(!record.image_path().is_empty());
    assert_eq!(record.job().company_name, "Acme");

    // Both blobs are readable at the paths the record points to.
    assert_eq!(blobs.read(record.resume_path()).await.unwrap(), PDF);
    assert_eq!(blobs.read(record.image_path()).await.unwrap(), PREVIEW);

    // The stored copy matches what submit returned.
    assert_eq!(pipeline.get(record.id()).await.unwrap(), record);
}

#[tokio::test]
async fn analyzer_sees_document_path_and_job() {
    let analyzer = ScriptedAnalyzer::replying(GOOD_RESPONSE);
    let (pipeline, _, _) = memory_pipeline(analyzer.clone());

    let record = pipeline.submit(submission(PDF)).await.unwrap();

    let calls = analyzer.calls();
    assert_eq!(calls.len(), 1);
    let (document_ref, instructions) = &calls[0];
    assert_eq!(document_ref, record.resume_path());
    assert!(instructions.contains("Job title: Engineer"), "{instructions}");
    assert!(instructions.contains("Build systems"), "{instructions}");
}

#[tokio::test]
async fn observer_sees_every_state_in_order() {
    init_tracing();
    let observer = Arc::new(Recording::default());
    let config = PipelineConfig::builder()
        .observer(observer.clone())
        .build()
        .unwrap();
    let pipeline = ReviewPipeline::new(
        Arc::new(MemoryBlobStore::new()),
        Arc::new(MemoryKvStore::new()),
        ScriptedAnalyzer::replying(GOOD_RESPONSE),
        Arc::new(StubRasterizer),
        config,
    );

    let record = pipeline.submit(submission(PDF)).await.unwrap();

    let states = observer.states.lock().unwrap().clone();
    assert_eq!(states, &PipelineState::SEQUENCE[1..]);
    assert_eq!(*observer.checkpoints.lock().unwrap(), vec![record.id().clone()]);
    assert_eq!(observer.completions.load(Ordering::SeqCst), 1);
    assert_eq!(observer.failures.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn resubmission_creates_a_new_record() {
    let (pipeline, _, _) = memory_pipeline(ScriptedAnalyzer::replying(GOOD_RESPONSE));

    let first = pipeline.submit(submission(PDF)).await.unwrap();
    let second = pipeline.submit(submission(PDF)).await.unwrap();

    assert_ne!(first.id(), second.id());
    assert_ne!(first.resume_path(), second.resume_path());
    assert_ne!(first.image_path(), second.image_path());
    assert_eq!(pipeline.list().await.unwrap().len(), 2);
    // The earlier record is untouched.
    assert_eq!(pipeline.get(first.id()).await.unwrap(), first);
}

#[tokio::test]
async fn concurrent_submissions_are_independent() {
    let (pipeline, blobs, _) = memory_pipeline(ScriptedAnalyzer::replying(GOOD_RESPONSE));

    let runs = (0..8).map(|_| pipeline.submit(submission(PDF)));
    let records: Vec<DocumentRecord> = futures::future::join_all(runs)
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    let mut ids: Vec<&str> = records.iter().map(|r| r.id().as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(pipeline.list().await.unwrap().len(), 8);
    assert_eq!(blobs.len().await, 16);
}

// ── Failures before the checkpoint ───────────────────────────────────────────

#[tokio::test]
async fn empty_document_fails_to_decode_without_record() {
    let (pipeline, _, _) = memory_pipeline(ScriptedAnalyzer::replying(GOOD_RESPONSE));

    let failure = pipeline.submit(submission(b"")).await.unwrap_err();

    assert_eq!(failure.state, PipelineState::Converting);
    assert_eq!(failure.kind(), FailureKind::Decode);
    assert!(failure.record_id.is_none());
    assert!(!failure.left_provisional_record());
    assert!(pipeline.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn non_pdf_bytes_fail_to_decode() {
    let (pipeline, _, _) = memory_pipeline(ScriptedAnalyzer::replying(GOOD_RESPONSE));

    let failure = pipeline
        .submit(submission(b"PK\x03\x04 this is a zip"))
        .await
        .unwrap_err();

    assert!(matches!(failure.source, ReviewError::Decode { .. }), "{failure}");
    assert!(pipeline.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn preview_upload_failure_leaves_no_record() {
    let analyzer = ScriptedAnalyzer::replying(GOOD_RESPONSE);
    let blobs = RejectingBlobs {
        inner: MemoryBlobStore::new(),
        suffix: ".png",
    };
    let kv = MemoryKvStore::new();
    let pipeline = pipeline_with(Arc::new(blobs), Arc::new(kv.clone()), analyzer.clone());

    let failure = pipeline.submit(submission(PDF)).await.unwrap_err();

    assert_eq!(failure.state, PipelineState::UploadingPreview);
    assert_eq!(failure.kind(), FailureKind::Upload);
    assert!(failure.record_id.is_none());
    assert!(kv.list("").await.unwrap().is_empty());
    assert!(analyzer.calls().is_empty());
}

// ── Failures after the checkpoint ────────────────────────────────────────────

#[tokio::test]
async fn unparseable_answer_leaves_pending_record() {
    let (pipeline, _, _) = memory_pipeline(ScriptedAnalyzer::replying(
        "I'm sorry, I can't review this résumé.",
    ));

    let failure = pipeline.submit(submission(PDF)).await.unwrap_err();

    assert_eq!(failure.state, PipelineState::ParsingFeedback);
    assert!(
        matches!(failure.source, ReviewError::Schema(SchemaError::NotJson { .. })),
        "{failure}"
    );
    let id = failure.record_id.clone().expect("provisional record id");

    let stored = pipeline.get(&id).await.unwrap();
    assert_eq!(stored.status(), ReviewStatus::Pending);
    assert!(stored.feedback().is_none());

    let listed = pipeline.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), &id);
}

#[tokio::test]
async fn out_of_range_score_is_a_schema_failure() {
    let reply = GOOD_RESPONSE.replace("\"overallScore\": 72", "\"overallScore\": 140");
    let (pipeline, _, _) = memory_pipeline(ScriptedAnalyzer::replying(&reply));

    let failure = pipeline.submit(submission(PDF)).await.unwrap_err();

    assert_eq!(failure.kind(), FailureKind::Schema);
    assert!(
        matches!(
            failure.source,
            ReviewError::Schema(SchemaError::ScoreOutOfRange { .. })
        ),
        "{failure}"
    );
    assert!(failure.left_provisional_record());
}

#[tokio::test]
async fn blank_model_answer_fails_at_parsing() {
    init_tracing();
    let blobs = MemoryBlobStore::new();
    let mock = MockProvider::new();
    mock.add_response("").await;
    let config = PipelineConfig::default();
    let analyzer = VisionAnalyzer::new(
        Arc::new(mock),
        Arc::new(blobs.clone()),
        Arc::new(StubRasterizer),
        &config,
    );
    let pipeline = ReviewPipeline::new(
        Arc::new(blobs),
        Arc::new(MemoryKvStore::new()),
        Arc::new(analyzer),
        Arc::new(StubRasterizer),
        config,
    );

    let failure = pipeline.submit(submission(PDF)).await.unwrap_err();

    assert_eq!(failure.state, PipelineState::ParsingFeedback);
    assert_eq!(failure.kind(), FailureKind::Schema);
    assert!(
        matches!(failure.source, ReviewError::Schema(SchemaError::Empty)),
        "{failure}"
    );
    let id = failure.record_id.expect("provisional record id");
    assert_eq!(
        pipeline.get(&id).await.unwrap().status(),
        ReviewStatus::Pending
    );
}

#[tokio::test]
async fn analysis_error_leaves_pending_record() {
    let analyzer = ScriptedAnalyzer::failing(|| AnalysisError::Timeout { secs: 120 });
    let (pipeline, _, _) = memory_pipeline(analyzer);

    let failure = pipeline.submit(submission(PDF)).await.unwrap_err();

    assert_eq!(failure.state, PipelineState::Analyzing);
    assert_eq!(failure.kind(), FailureKind::Analysis);
    let id = failure.record_id.expect("provisional record id");
    assert_eq!(
        pipeline.get(&id).await.unwrap().status(),
        ReviewStatus::Pending
    );
}

#[tokio::test]
async fn final_persist_failure_keeps_provisional_record() {
    let kv = FlakyKv {
        inner: MemoryKvStore::new(),
        fail_on: 2,
        sets: AtomicUsize::new(0),
    };
    let inner = kv.inner.clone();
    let pipeline = pipeline_with(
        Arc::new(MemoryBlobStore::new()),
        Arc::new(kv),
        ScriptedAnalyzer::replying(GOOD_RESPONSE),
    );

    let failure = pipeline.submit(submission(PDF)).await.unwrap_err();

    assert_eq!(failure.state, PipelineState::PersistingFinal);
    assert_eq!(failure.kind(), FailureKind::Persistence);
    let id = failure.record_id.expect("provisional record id");
    let raw = inner
        .get(&format!("resume:{id}"))
        .await
        .unwrap()
        .expect("provisional record stored");
    assert!(raw.contains("\"feedback\":\"\""), "{raw}");
}

#[tokio::test]
async fn provisional_persist_failure_has_no_record_id() {
    let kv = FlakyKv {
        inner: MemoryKvStore::new(),
        fail_on: 1,
        sets: AtomicUsize::new(0),
    };
    let pipeline = pipeline_with(
        Arc::new(MemoryBlobStore::new()),
        Arc::new(kv),
        ScriptedAnalyzer::replying(GOOD_RESPONSE),
    );

    let failure = pipeline.submit(submission(PDF)).await.unwrap_err();

    assert_eq!(failure.state, PipelineState::PersistingProvisional);
    assert!(failure.record_id.is_none());
}

// ── Retrieval and wipe ───────────────────────────────────────────────────────

#[tokio::test]
async fn open_returns_record_with_both_blobs() {
    let (pipeline, _, _) = memory_pipeline(ScriptedAnalyzer::replying(GOOD_RESPONSE));
    let record = pipeline.submit(submission(PDF)).await.unwrap();

    let bundle = pipeline.open(record.id()).await.unwrap();

    assert_eq!(bundle.record, record);
    assert_eq!(bundle.document, PDF);
    assert_eq!(bundle.preview, PREVIEW);
}

#[tokio::test]
async fn open_unknown_id_is_not_found() {
    let (pipeline, _, _) = memory_pipeline(ScriptedAnalyzer::replying(GOOD_RESPONSE));
    let err = pipeline
        .open(&RecordId::from("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::NotFound { .. }), "{err:?}");
}

#[tokio::test]
async fn wipe_removes_blobs_and_records() {
    let (pipeline, blobs, kv) = memory_pipeline(ScriptedAnalyzer::replying(GOOD_RESPONSE));
    pipeline.submit(submission(PDF)).await.unwrap();
    pipeline.submit(submission(PDF)).await.unwrap();
    kv.set("settings:theme", "dark").await.unwrap();

    let report = pipeline.wipe().await.unwrap();

    assert_eq!(report.blobs_deleted, 4);
    assert_eq!(report.records_cleared, 2);
    assert!(blobs.is_empty().await);
    assert!(kv.list("").await.unwrap().is_empty());
    assert!(pipeline.list().await.unwrap().is_empty());

    // Wiping an empty store is a no-op.
    let again = pipeline.wipe().await.unwrap();
    assert_eq!(again.blobs_deleted, 0);
    assert_eq!(again.records_cleared, 0);
}
