//! The durable Document Record and its identifiers.
//!
//! A record is written twice by a successful submission: once with empty
//! feedback (the provisional checkpoint) and once with the parsed feedback.
//! Everything except `feedback` is fixed at construction, so the fields are
//! private and only [`DocumentRecord::with_feedback`] produces a changed copy.
//!
//! The serialised shape is shared with earlier readers of the store:
//!
//! ```json
//! { "id": "…", "resumePath": "…", "imagePath": "…",
//!   "companyName": "…", "jobTitle": "…", "jobDescription": "…",
//!   "feedback": "" }
//! ```
//!
//! `feedback` is the empty string while pending and a feedback object once
//! analysed.

use crate::feedback::Feedback;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque record identifier, unique per submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// A fresh random (v4) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Free-text context the user supplied with the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobContext {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub job_description: String,
}

impl JobContext {
    pub fn new(
        company_name: impl Into<String>,
        job_title: impl Into<String>,
        job_description: impl Into<String>,
    ) -> Self {
        Self {
            company_name: company_name.into(),
            job_title: job_title.into(),
            job_description: job_description.into(),
        }
    }
}

/// Whether the analysis of a record has landed.
///
/// `Pending` covers both "still running" and "failed after the checkpoint";
/// the store cannot tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    Pending,
    Complete,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewStatus::Pending => f.write_str("pending"),
            ReviewStatus::Complete => f.write_str("complete"),
        }
    }
}

/// One submitted document with its stored blobs, context and feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    id: RecordId,
    resume_path: String,
    image_path: String,
    #[serde(flatten)]
    job: JobContext,
    #[serde(default, with = "pending_feedback")]
    feedback: Option<Feedback>,
}

impl DocumentRecord {
    /// A record at the provisional checkpoint: blobs uploaded, no feedback.
    pub fn provisional(
        id: RecordId,
        resume_path: impl Into<String>,
        image_path: impl Into<String>,
        job: JobContext,
    ) -> Self {
        Self {
            id,
            resume_path: resume_path.into(),
            image_path: image_path.into(),
            job,
            feedback: None,
        }
    }

    /// The same record with its feedback filled in.
    pub fn with_feedback(self, feedback: Feedback) -> Self {
        Self {
            feedback: Some(feedback),
            ..self
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// Blob path of the uploaded document.
    pub fn resume_path(&self) -> &str {
        &self.resume_path
    }

    /// Blob path of the first-page preview image.
    pub fn image_path(&self) -> &str {
        &self.image_path
    }

    pub fn job(&self) -> &JobContext {
        &self.job
    }

    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    pub fn status(&self) -> ReviewStatus {
        if self.feedback.is_some() {
            ReviewStatus::Complete
        } else {
            ReviewStatus::Pending
        }
    }
}

/// `Option<Feedback>` stored as `""` when absent.
///
/// Reading also accepts `null`; a non-empty string is treated as an
/// embedded serialised feedback object.
mod pending_feedback {
    use crate::feedback::{self, Feedback};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Option<Feedback>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(f) => f.serialize(s),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Feedback>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => feedback::parse(&s).map(Some).map_err(D::Error::custom),
            other => serde_json::from_value(other)
                .map(Some)
                .map_err(D::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEEDBACK: &str = r#"{
        "overallScore": 72,
        "ATS": { "score": 80, "tips": [ { "type": "good", "tip": "Clear headings" } ] }
    }"#;

    fn sample() -> DocumentRecord {
        DocumentRecord::provisional(
            RecordId::from("0f8c"),
            "resume.pdf",
            "resume.png",
            JobContext::new("Acme", "Engineer", "Build systems"),
        )
    }

    #[test]
    fn provisional_record_serialises_empty_feedback() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["id"], "0f8c");
        assert_eq!(json["resumePath"], "resume.pdf");
        assert_eq!(json["imagePath"], "resume.png");
        assert_eq!(json["companyName"], "Acme");
        assert_eq!(json["jobTitle"], "Engineer");
        assert_eq!(json["jobDescription"], "Build systems");
        assert_eq!(json["feedback"], "");
    }

    #[test]
    fn provisional_record_reads_back_pending() {
        let json = serde_json::to_string(&sample()).unwrap();
        let back: DocumentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
        assert_eq!(back.status(), ReviewStatus::Pending);
    }

    #[test]
    fn completed_record_reads_back_feedback() {
        let feedback = crate::feedback::parse(FEEDBACK).unwrap();
        let record = sample().with_feedback(feedback.clone());
        assert_eq!(record.status(), ReviewStatus::Complete);
        assert_eq!(record.id().as_str(), "0f8c");

        let json = serde_json::to_string(&record).unwrap();
        let back: DocumentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.feedback(), Some(&feedback));
    }

    #[test]
    fn null_or_missing_feedback_is_pending() {
        let json = r#"{"id":"a","resumePath":"r","imagePath":"i","feedback":null}"#;
        let r: DocumentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.status(), ReviewStatus::Pending);
        assert_eq!(r.job(), &JobContext::default());

        let json = r#"{"id":"a","resumePath":"r","imagePath":"i"}"#;
        let r: DocumentRecord = serde_json::from_str(json).unwrap();
        assert!(r.feedback().is_none());
    }

    #[test]
    fn stored_feedback_is_validated() {
        let json = r#"{"id":"a","resumePath":"r","imagePath":"i",
            "feedback":{"overallScore":180,"ATS":{"score":1,"tips":[]}}}"#;
        assert!(serde_json::from_str::<DocumentRecord>(json).is_err());
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(RecordId::generate(), RecordId::generate());
    }
}
