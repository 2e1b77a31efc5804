//! Scored part-number candidates.

use serde::{Deserialize, Serialize};

/// Shortest normalized text kept as a candidate
pub const MIN_CANDIDATE_LEN: usize = 2;

/// Longest normalized text kept as a candidate
pub const MAX_CANDIDATE_LEN: usize = 50;

/// Normalize OCR text into candidate form.
///
/// Uppercases, then keeps only `[A-Z0-9-]`. Whitespace and every other
/// character are dropped, so the function is idempotent.
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

/// A deduplicated, scored string considered as a possible part identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Uppercase, `[A-Z0-9-]` only; uniqueness key
    pub normalized_text: String,

    /// Highest raw confidence among detections that normalized to this text
    pub best_confidence: f64,

    /// Heuristic part-number likelihood, clamped to [0, 1]
    pub likelihood_score: f64,

    /// `likelihood_score * best_confidence`
    pub combined_score: f64,

    /// Unclamped heuristic total (tie-breaker between saturated likelihoods)
    pub evidence_score: f64,

    /// Manufacturer family whose structured pattern matched, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_family: Option<String>,

    /// Engine that produced the best-confidence detection
    pub source_engine: String,

    /// Preprocessing variant of the best-confidence detection
    pub preprocessing_variant: usize,
}
