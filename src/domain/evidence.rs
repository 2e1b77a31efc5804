//! Evidence gathered for one identification request and the fused result.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::candidate::Candidate;
use super::part::PartRecord;

/// Independent evidence sources that feed fusion
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Ocr,
    Classifier,
    Vision,
    Database,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Ocr,
        SourceKind::Classifier,
        SourceKind::Vision,
        SourceKind::Database,
    ];
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Ocr => write!(f, "ocr"),
            SourceKind::Classifier => write!(f, "classifier"),
            SourceKind::Vision => write!(f, "vision"),
            SourceKind::Database => write!(f, "database"),
        }
    }
}

/// Outcome of asking one source for evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Signal<T> {
    /// The source answered with usable evidence
    Present(T),
    /// The source answered, but had nothing for this image
    NotFound,
    /// The source is not configured or reports no model loaded
    Unavailable,
    /// The source errored or timed out
    Failed(String),
}

impl<T> Signal<T> {
    pub fn present(&self) -> Option<&T> {
        match self {
            Signal::Present(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Signal::Present(_))
    }

    pub fn status(&self) -> SignalStatus {
        match self {
            Signal::Present(_) => SignalStatus::Present,
            Signal::NotFound => SignalStatus::NotFound,
            Signal::Unavailable => SignalStatus::Unavailable,
            Signal::Failed(_) => SignalStatus::Failed,
        }
    }
}

impl<T> From<Option<T>> for Signal<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Signal::Present(v),
            None => Signal::NotFound,
        }
    }
}

/// Payload-free view of a [`Signal`], reported per source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Present,
    NotFound,
    Unavailable,
    Failed,
}

/// One ranked classifier label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    #[serde(alias = "part_type")]
    pub label: String,
    pub confidence: f64,
}

/// Visual classifier prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSignal {
    pub label: String,
    pub confidence: f64,
    /// Coarse category derived from the label
    pub category: String,
    /// Second head of the model: the part's condition (new, used, worn)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_confidence: Option<f64>,
    /// Best part labels, highest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_predictions: Vec<LabelScore>,
}

/// Structured fields produced by vision analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionFields {
    pub part_type: String,
    pub category: String,
    #[serde(default)]
    pub likely_makes: Vec<String>,
    #[serde(default)]
    pub year_range: String,
    #[serde(default)]
    pub description: String,
}

/// Where a vision result came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VisionOrigin {
    /// Parsed structured output of the language model
    Model,
    /// Model answered but its output was not parseable; raw text is kept
    Unparsed { raw: String },
    /// Deterministic keyword mapping over OCR text
    RuleBased,
}

/// Vision-language analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionSignal {
    pub fields: VisionFields,
    pub confidence: f64,
    pub origin: VisionOrigin,
}

impl VisionSignal {
    /// True when the result did not come from parsed model output
    pub fn is_fallback(&self) -> bool {
        !matches!(self.origin, VisionOrigin::Model)
    }
}

/// How the database lookup found its record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    Fuzzy,
}

/// Compatibility database hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbMatch {
    /// Catalog key of the matched record
    pub key: String,
    /// Detected text that produced the hit
    pub query: String,
    pub record: PartRecord,
    pub confidence: f64,
    pub strategy: MatchStrategy,
}

/// All independent signals available for one identification request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub ocr_candidate: Signal<Candidate>,
    pub classifier: Signal<ClassifierSignal>,
    pub vision: Signal<VisionSignal>,
    pub db_match: Signal<DbMatch>,
}

impl Default for Evidence {
    fn default() -> Self {
        Self {
            ocr_candidate: Signal::NotFound,
            classifier: Signal::NotFound,
            vision: Signal::NotFound,
            db_match: Signal::NotFound,
        }
    }
}

impl Evidence {
    /// Status of every source, in [`SourceKind::ALL`] order
    pub fn statuses(&self) -> BTreeMap<SourceKind, SignalStatus> {
        [
            (SourceKind::Ocr, self.ocr_candidate.status()),
            (SourceKind::Classifier, self.classifier.status()),
            (SourceKind::Vision, self.vision.status()),
            (SourceKind::Database, self.db_match.status()),
        ]
        .into_iter()
        .collect()
    }
}

/// One fused identification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    /// Chosen part identifier, if any source produced one
    pub chosen_identifier: Option<String>,

    /// Weighted confidence in [0, 1]
    pub overall_confidence: f64,

    /// Raw confidence of every present source
    pub per_source_confidences: BTreeMap<SourceKind, f64>,

    /// Sources that contributed, in [`SourceKind::ALL`] order
    pub sources_used: Vec<SourceKind>,

    /// Outcome of every source, including absent ones
    pub source_status: BTreeMap<SourceKind, SignalStatus>,
}
