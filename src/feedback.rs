//! Structured review feedback and the parser that validates model output.
//!
//! The analysis model is asked for a JSON object of this shape:
//!
//! ```json
//! {
//!   "overallScore": 74,
//!   "ATS":          { "score": 80, "tips": [ { "type": "good", "tip": "…", "explanation": "…" } ] },
//!   "toneAndStyle": { "score": 70, "tips": [ … ] },
//!   "content":      { … },
//!   "structure":    { … },
//!   "skills":       { … }
//! }
//! ```
//!
//! Only `overallScore` and `ATS` are required. Every score must be a whole
//! number in 0–100 and every tip `type` must be `good` or `improve`.
//! Violations are rejected rather than repaired: a clamped score would hide
//! a misbehaving model.
//!
//! Deserialising a [`Feedback`] from anywhere (including stored records)
//! goes through the same validation as [`parse`].

use crate::error::SchemaError;
use crate::pipeline::postprocess::clean_response;
use serde::{Deserialize, Serialize};
use serde_json::error::Category as JsonErrorCategory;
use std::fmt;

/// A validated 0–100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Score(u8);

impl Score {
    pub const MAX: u8 = 100;

    /// `None` when `value` exceeds [`Score::MAX`].
    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a tip praises something or asks for a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TipPolarity {
    Good,
    Improve,
}

impl TipPolarity {
    /// Parse the wire value; the set is closed.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "good" => Some(TipPolarity::Good),
            "improve" => Some(TipPolarity::Improve),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TipPolarity::Good => "good",
            TipPolarity::Improve => "improve",
        }
    }
}

impl fmt::Display for TipPolarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tip {
    #[serde(rename = "type")]
    pub polarity: TipPolarity,
    /// Short headline.
    #[serde(rename = "tip")]
    pub label: String,
    /// Longer explanation. Empty when the model gave none (common for ATS tips).
    pub explanation: String,
}

/// A scored category. `tips` keeps the order the model produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub score: Score,
    pub tips: Vec<Tip>,
}

/// The named categories a [`Feedback`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryKind {
    Ats,
    ToneAndStyle,
    Content,
    Structure,
    Skills,
}

impl CategoryKind {
    pub const ALL: [CategoryKind; 5] = [
        CategoryKind::Ats,
        CategoryKind::ToneAndStyle,
        CategoryKind::Content,
        CategoryKind::Structure,
        CategoryKind::Skills,
    ];

    /// Key used in the serialised object.
    pub fn wire_name(self) -> &'static str {
        match self {
            CategoryKind::Ats => "ATS",
            CategoryKind::ToneAndStyle => "toneAndStyle",
            CategoryKind::Content => "content",
            CategoryKind::Structure => "structure",
            CategoryKind::Skills => "skills",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CategoryKind::Ats => "ATS compatibility",
            CategoryKind::ToneAndStyle => "Tone & style",
            CategoryKind::Content => "Content",
            CategoryKind::Structure => "Structure",
            CategoryKind::Skills => "Skills",
        }
    }
}

/// Validated analysis result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawFeedback")]
pub struct Feedback {
    pub overall_score: Score,
    #[serde(rename = "ATS")]
    pub ats: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone_and_style: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Category>,
}

impl Feedback {
    pub fn category(&self, kind: CategoryKind) -> Option<&Category> {
        match kind {
            CategoryKind::Ats => Some(&self.ats),
            CategoryKind::ToneAndStyle => self.tone_and_style.as_ref(),
            CategoryKind::Content => self.content.as_ref(),
            CategoryKind::Structure => self.structure.as_ref(),
            CategoryKind::Skills => self.skills.as_ref(),
        }
    }

    /// Present categories in display order.
    pub fn categories(&self) -> impl Iterator<Item = (CategoryKind, &Category)> + '_ {
        CategoryKind::ALL
            .into_iter()
            .filter_map(move |k| self.category(k).map(|c| (k, c)))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Parse and validate a raw analysis response.
///
/// Outer code fences and invisible characters are removed first (see
/// [`clean_response`]); the JSON itself is taken as-is.
pub fn parse(raw: &str) -> Result<Feedback, SchemaError> {
    let cleaned = clean_response(raw);
    if cleaned.is_empty() {
        return Err(SchemaError::Empty);
    }

    let raw: RawFeedback = serde_json::from_str(&cleaned).map_err(|e| match e.classify() {
        JsonErrorCategory::Data => SchemaError::Invalid {
            detail: e.to_string(),
        },
        _ => SchemaError::NotJson {
            detail: e.to_string(),
        },
    })?;

    Feedback::try_from(raw)
}

// ── Unvalidated wire shape ───────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFeedback {
    overall_score: serde_json::Number,
    #[serde(rename = "ATS")]
    ats: RawCategory,
    tone_and_style: Option<RawCategory>,
    content: Option<RawCategory>,
    structure: Option<RawCategory>,
    skills: Option<RawCategory>,
}

#[derive(Deserialize)]
struct RawCategory {
    score: serde_json::Number,
    tips: Vec<RawTip>,
}

#[derive(Deserialize)]
struct RawTip {
    #[serde(rename = "type")]
    polarity: String,
    tip: String,
    #[serde(default)]
    explanation: String,
}

impl TryFrom<RawFeedback> for Feedback {
    type Error = SchemaError;

    fn try_from(raw: RawFeedback) -> Result<Self, Self::Error> {
        let optional = |kind: CategoryKind, c: Option<RawCategory>| {
            c.map(|c| validate_category(kind.wire_name(), c)).transpose()
        };

        Ok(Feedback {
            overall_score: validate_score("overallScore", &raw.overall_score)?,
            ats: validate_category(CategoryKind::Ats.wire_name(), raw.ats)?,
            tone_and_style: optional(CategoryKind::ToneAndStyle, raw.tone_and_style)?,
            content: optional(CategoryKind::Content, raw.content)?,
            structure: optional(CategoryKind::Structure, raw.structure)?,
            skills: optional(CategoryKind::Skills, raw.skills)?,
        })
    }
}

fn validate_category(name: &str, raw: RawCategory) -> Result<Category, SchemaError> {
    let score = validate_score(&format!("{name}.score"), &raw.score)?;
    let tips = raw
        .tips
        .into_iter()
        .enumerate()
        .map(|(i, t)| {
            let polarity =
                TipPolarity::from_wire(&t.polarity).ok_or_else(|| SchemaError::UnknownPolarity {
                    field: format!("{name}.tips[{i}].type"),
                    value: t.polarity.clone(),
                })?;
            Ok(Tip {
                polarity,
                label: t.tip,
                explanation: t.explanation,
            })
        })
        .collect::<Result<Vec<_>, SchemaError>>()?;
    Ok(Category { score, tips })
}

fn validate_score(field: &str, n: &serde_json::Number) -> Result<Score, SchemaError> {
    let out_of_range = || SchemaError::ScoreOutOfRange {
        field: field.to_string(),
        value: n.to_string(),
    };

    if let Some(v) = n.as_u64() {
        return u8::try_from(v)
            .ok()
            .and_then(Score::new)
            .ok_or_else(out_of_range);
    }
    if n.is_i64() {
        // Only negative integers reach here.
        return Err(out_of_range());
    }

    let v = n.as_f64().unwrap_or(f64::NAN);
    if !(0.0..=f64::from(Score::MAX)).contains(&v) {
        return Err(out_of_range());
    }
    if v.fract() != 0.0 {
        return Err(SchemaError::FractionalScore {
            field: field.to_string(),
            value: n.to_string(),
        });
    }
    Ok(Score(v as u8))
}
