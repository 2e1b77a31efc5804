//! Weighted fusion of independent evidence into one identification.
//!
//! Each present source contributes `weight × confidence`. Weights are fixed
//! fractions of 1.0 and are not renormalized when a source is missing, so
//! fewer sources mean a lower overall confidence. An OCR candidate counts
//! only above the acceptance threshold, for both the sum and the chosen
//! identifier. When neither an accepted OCR candidate nor a database match
//! is present there is nothing that names a part, and the neutral prior is
//! returned instead.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::scorer::ACCEPTANCE_THRESHOLD;
use crate::domain::{Evidence, FusedResult, SourceKind};

/// Overall confidence when no identifying evidence exists
pub const NEUTRAL_PRIOR: f64 = 0.5;

/// Per-source weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub ocr: f64,
    pub classifier: f64,
    pub vision: f64,
    pub database: f64,

    /// Multiplier on the vision term when it came from a fallback
    #[serde(default = "default_fallback_vision_factor")]
    pub fallback_vision_factor: f64,
}

fn default_fallback_vision_factor() -> f64 {
    1.0
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            ocr: 0.30,
            classifier: 0.25,
            vision: 0.25,
            database: 0.20,
            fallback_vision_factor: default_fallback_vision_factor(),
        }
    }
}

impl FusionWeights {
    fn weight(&self, source: SourceKind) -> f64 {
        match source {
            SourceKind::Ocr => self.ocr,
            SourceKind::Classifier => self.classifier,
            SourceKind::Vision => self.vision,
            SourceKind::Database => self.database,
        }
    }
}

/// Pure combination of [`Evidence`] into a [`FusedResult`]
#[derive(Debug, Clone)]
pub struct FusionEngine {
    weights: FusionWeights,
    acceptance_threshold: f64,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(FusionWeights::default())
    }
}

impl FusionEngine {
    pub fn new(weights: FusionWeights) -> Self {
        Self {
            weights,
            acceptance_threshold: ACCEPTANCE_THRESHOLD,
        }
    }

    /// Must match the scorer's threshold; the orchestrator sets both
    pub fn with_acceptance_threshold(mut self, threshold: f64) -> Self {
        self.acceptance_threshold = threshold;
        self
    }

    pub fn weights(&self) -> &FusionWeights {
        &self.weights
    }

    pub fn acceptance_threshold(&self) -> f64 {
        self.acceptance_threshold
    }

    pub fn fuse(&self, evidence: &Evidence) -> FusedResult {
        let ocr = evidence
            .ocr_candidate
            .present()
            .filter(|c| c.combined_score > self.acceptance_threshold);

        let mut per_source = BTreeMap::new();
        if let Some(candidate) = ocr {
            per_source.insert(SourceKind::Ocr, candidate.combined_score);
        }
        if let Some(classifier) = evidence.classifier.present() {
            per_source.insert(SourceKind::Classifier, classifier.confidence);
        }
        if let Some(vision) = evidence.vision.present() {
            per_source.insert(SourceKind::Vision, vision.confidence);
        }
        if let Some(db) = evidence.db_match.present() {
            per_source.insert(SourceKind::Database, db.confidence);
        }

        let identifying = ocr.is_some() || evidence.db_match.is_present();

        let overall_confidence = if identifying {
            per_source
                .iter()
                .map(|(source, confidence)| {
                    let mut term = self.weights.weight(*source) * confidence;
                    if *source == SourceKind::Vision
                        && evidence.vision.present().is_some_and(|v| v.is_fallback())
                    {
                        term *= self.weights.fallback_vision_factor;
                    }
                    term
                })
                .sum::<f64>()
                .clamp(0.0, 1.0)
        } else {
            NEUTRAL_PRIOR
        };

        let chosen_identifier = ocr
            .map(|c| c.normalized_text.clone())
            .or_else(|| evidence.db_match.present().map(|m| m.key.clone()));

        let sources_used: Vec<SourceKind> = per_source.keys().copied().collect();

        debug!(
            chosen = chosen_identifier.as_deref(),
            overall_confidence,
            sources = sources_used.len(),
            "Evidence fused"
        );

        FusedResult {
            chosen_identifier,
            overall_confidence,
            per_source_confidences: per_source,
            sources_used,
            source_status: evidence.statuses(),
        }
    }
}
