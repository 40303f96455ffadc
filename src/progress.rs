//! Observer trait for per-state submission events.
//!
//! Inject an [`Arc<dyn SubmissionObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to follow a submission
//! as it moves through its states. The CLI feeds a spinner from it; a web
//! front-end would forward the same events as status text.
//!
//! # Example
//!
//! ```rust
//! use resumind::{PipelineConfig, PipelineState, SubmissionObserver};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct StatusLine(Mutex<String>);
//!
//! impl SubmissionObserver for StatusLine {
//!     fn on_state(&self, state: PipelineState) {
//!         *self.0.lock().unwrap() = state.status_text().to_string();
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .observer(Arc::new(StatusLine::default()))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::PipelineFailure;
use crate::record::{DocumentRecord, RecordId};
use crate::submit::PipelineState;
use std::sync::Arc;

/// Called by the orchestrator as a submission advances.
///
/// Concurrent submissions sharing one config call the same observer from
/// different tasks, so implementations must be `Send + Sync`. All methods
/// default to no-ops.
pub trait SubmissionObserver: Send + Sync {
    /// A new state was entered. Called once per state, in order.
    fn on_state(&self, state: PipelineState) {
        let _ = state;
    }

    /// The provisional record was written and is now visible to listings.
    fn on_checkpoint(&self, id: &RecordId) {
        let _ = id;
    }

    /// The run stopped before `Complete`.
    fn on_failure(&self, failure: &PipelineFailure) {
        let _ = failure;
    }

    /// The final record was written.
    fn on_complete(&self, record: &DocumentRecord) {
        let _ = record;
    }
}

/// Observer that ignores every event. Used when none is configured.
pub struct NoopObserver;

impl SubmissionObserver for NoopObserver {}

/// Type stored in [`crate::config::PipelineConfig`].
pub type Observer = Arc<dyn SubmissionObserver>;
