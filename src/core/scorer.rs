//! Part-number likelihood scoring and candidate ranking.
//!
//! Detections are normalized, bounded by length, merged by normalized text
//! (keeping the highest confidence) and scored with additive heuristics:
//!
//! | Signal                                        | Bonus |
//! |-----------------------------------------------|-------|
//! | matches a manufacturer pattern (at most once) | 0.9   |
//! | matches a generic part-number shape           | 0.7   |
//! | contains a digit                              | 0.3   |
//! | contains a letter                             | 0.2   |
//! | contains a hyphen                             | 0.2   |
//! | length in 5..=20                              | 0.3   |
//! | only `[A-Z0-9-]`                              | 0.2   |
//! | contains a brand keyword                      | 0.4   |
//!
//! The sum is clamped to [0, 1] as the likelihood; the unclamped sum is
//! kept to order candidates whose likelihood saturates.

use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{normalize, Candidate, RawDetection, MAX_CANDIDATE_LEN, MIN_CANDIDATE_LEN};

pub const BRAND_PATTERN_BONUS: f64 = 0.9;
pub const GENERIC_PATTERN_BONUS: f64 = 0.7;
pub const DIGIT_BONUS: f64 = 0.3;
pub const LETTER_BONUS: f64 = 0.2;
pub const HYPHEN_BONUS: f64 = 0.2;
pub const LENGTH_BONUS: f64 = 0.3;
pub const CHARSET_BONUS: f64 = 0.2;
pub const KEYWORD_BONUS: f64 = 0.4;

/// Best candidates must exceed this combined score to be carried forward
pub const ACCEPTANCE_THRESHOLD: f64 = 0.4;

/// Maker and aftermarket names that raise likelihood
pub const BRAND_KEYWORDS: &[&str] = &[
    "TOYOTA", "HONDA", "FORD", "GM", "BMW", "MERCEDES", "BOSCH", "DENSO", "FRAM", "WIX",
    "MOBIL", "AC", "DELCO",
];

/// Manufacturer part-number families, written against normalized text
const BRAND_FAMILIES: &[(&str, &[&str])] = &[
    ("toyota", &[r"\b\d{5}-\d{5}\b", r"\b\d{5}-[A-Z0-9]{5}\b"]),
    (
        "honda",
        &[r"\b\d{5}-[A-Z0-9]{3}-[A-Z0-9]{3}\b", r"\b\d{5}-[A-Z]{3}-[A-Z]\d{2}\b"],
    ),
    ("ford", &[r"\b[A-Z]\d[A-Z]\d-\d{4,5}-[A-Z]{1,2}\b", r"\bFL-\d{3}-S\b"]),
    ("gm", &[r"\b1\d{7,8}\b", r"\bPF\d{2,4}[A-Z]?\b", r"ACDELCO"]),
    ("bmw", &[r"\b11\d{8,9}\b"]),
    ("mercedes", &[r"\b[A-Z]\d{10}\b"]),
    ("bosch", &[r"\b0\d{9}\b", r"BOSCH[A-Z0-9-]+"]),
    ("denso", &[r"\b\d{3}-\d{4}\b", r"DENSO[A-Z0-9-]+"]),
    ("fram", &[r"\bPH\d{4}[A-Z]?\b", r"FRAM[A-Z]{2}\d{4}[A-Z]?"]),
    ("wix", &[r"\b\d{5}[A-Z]?\b", r"WIX\d{4,6}[A-Z]?"]),
    ("mobil1", &[r"\bM1[A-Z]?-\d{3,4}[A-Z]?\b"]),
];

/// Shapes common to part numbers regardless of maker
const GENERIC_PATTERNS: &[&str] = &[
    r"\b[A-Z]{2,4}\d{3,6}[A-Z]?\b",
    r"\b\d{4,6}-[A-Z0-9]{2,4}\b",
    r"\b[A-Z]\d{3}-\d{3}-\d{3}\b",
    r"\b\d{8,12}\b",
    r"\b[A-Z]{1,3}\d{3,8}[A-Z]{0,2}\b",
];

struct PatternFamily {
    name: &'static str,
    patterns: Vec<Regex>,
}

fn brand_families() -> &'static [PatternFamily] {
    static FAMILIES: OnceLock<Vec<PatternFamily>> = OnceLock::new();
    FAMILIES.get_or_init(|| {
        BRAND_FAMILIES
            .iter()
            .map(|(name, patterns)| PatternFamily {
                name,
                patterns: patterns
                    .iter()
                    .map(|p| Regex::new(p).expect("brand pattern is valid"))
                    .collect(),
            })
            .collect()
    })
}

fn generic_patterns() -> &'static [Regex] {
    static GENERIC: OnceLock<Vec<Regex>> = OnceLock::new();
    GENERIC.get_or_init(|| {
        GENERIC_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("generic pattern is valid"))
            .collect()
    })
}

/// First manufacturer family whose pattern matches
pub fn brand_family(text: &str) -> Option<&'static str> {
    brand_families()
        .iter()
        .find(|family| family.patterns.iter().any(|p| p.is_match(text)))
        .map(|family| family.name)
}

/// Letter+digit combination of 3 to 12 characters, hyphens allowed
fn is_generic_shape(text: &str) -> bool {
    (3..=12).contains(&text.len())
        && text.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
        && text.chars().any(|c| c.is_ascii_uppercase())
        && text.chars().any(|c| c.is_ascii_digit())
}

fn is_generic(text: &str) -> bool {
    is_generic_shape(text) || generic_patterns().iter().any(|p| p.is_match(text))
}

/// Per-string heuristic result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Likelihood {
    /// Clamped to [0, 1]
    pub score: f64,
    /// Unclamped sum of all bonuses
    pub raw: f64,
    /// Manufacturer family that matched, if any
    pub family: Option<&'static str>,
}

/// Score how plausibly a normalized string is a structured part identifier
pub fn likelihood(text: &str) -> Likelihood {
    let mut raw = 0.0;

    let family = brand_family(text);
    if family.is_some() {
        raw += BRAND_PATTERN_BONUS;
    }
    if is_generic(text) {
        raw += GENERIC_PATTERN_BONUS;
    }

    if text.chars().any(|c| c.is_ascii_digit()) {
        raw += DIGIT_BONUS;
    }
    if text.chars().any(|c| c.is_ascii_uppercase()) {
        raw += LETTER_BONUS;
    }
    if text.contains('-') {
        raw += HYPHEN_BONUS;
    }
    if (5..=20).contains(&text.chars().count()) {
        raw += LENGTH_BONUS;
    }
    if !text.is_empty()
        && text.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
    {
        raw += CHARSET_BONUS;
    }
    if BRAND_KEYWORDS.iter().any(|k| text.contains(k)) {
        raw += KEYWORD_BONUS;
    }

    Likelihood {
        score: raw.clamp(0.0, 1.0),
        raw,
        family,
    }
}

/// Ranked candidates and the single identifier carried forward
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidates {
    /// Ordered by likelihood, then confidence
    pub ranked: Vec<Candidate>,

    /// Highest combined score, present only above the acceptance threshold
    pub best: Option<Candidate>,
}

impl ScoredCandidates {
    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}

/// Best detection seen for one normalized text
struct Merged<'a> {
    confidence: f64,
    detection: &'a RawDetection,
}

/// Deduplicates and ranks OCR detections
#[derive(Debug, Clone)]
pub struct CandidateScorer {
    acceptance_threshold: f64,
}

impl Default for CandidateScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateScorer {
    pub fn new() -> Self {
        Self {
            acceptance_threshold: ACCEPTANCE_THRESHOLD,
        }
    }

    pub fn with_acceptance_threshold(mut self, threshold: f64) -> Self {
        self.acceptance_threshold = threshold;
        self
    }

    pub fn acceptance_threshold(&self) -> f64 {
        self.acceptance_threshold
    }

    /// Normalize, bound and merge detections; returns the ranked list and
    /// the accepted best identifier.
    pub fn score(&self, detections: &[RawDetection]) -> ScoredCandidates {
        let mut merged: BTreeMap<String, Merged<'_>> = BTreeMap::new();

        for detection in detections {
            let text = normalize(&detection.text);
            if !(MIN_CANDIDATE_LEN..=MAX_CANDIDATE_LEN).contains(&text.len()) {
                continue;
            }

            match merged.entry(text) {
                Entry::Occupied(mut entry) => {
                    if replaces(detection, entry.get()) {
                        let existing = entry.get_mut();
                        existing.confidence = detection.confidence;
                        existing.detection = detection;
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(Merged {
                        confidence: detection.confidence,
                        detection,
                    });
                }
            }
        }

        let mut ranked: Vec<Candidate> = merged
            .into_iter()
            .map(|(text, best)| {
                let likelihood = likelihood(&text);
                Candidate {
                    combined_score: likelihood.score * best.confidence,
                    likelihood_score: likelihood.score,
                    evidence_score: likelihood.raw,
                    pattern_family: likelihood.family.map(str::to_string),
                    best_confidence: best.confidence,
                    source_engine: best.detection.source_engine.clone(),
                    preprocessing_variant: best.detection.preprocessing_variant,
                    normalized_text: text,
                }
            })
            .collect();

        ranked.sort_by(rank_order);

        let best = ranked
            .iter()
            .min_by(|a, b| selection_order(a, b))
            .filter(|c| c.combined_score > self.acceptance_threshold)
            .cloned();

        debug!(
            candidates = ranked.len(),
            best = best.as_ref().map(|c| c.normalized_text.as_str()),
            "Scored OCR candidates"
        );

        ScoredCandidates { ranked, best }
    }
}

/// Higher confidence wins; ties go to the smaller (engine, variant) so the
/// kept metadata does not depend on input order.
fn replaces(detection: &RawDetection, existing: &Merged<'_>) -> bool {
    match detection.confidence.total_cmp(&existing.confidence) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => {
            (&detection.source_engine, detection.preprocessing_variant)
                < (&existing.detection.source_engine, existing.detection.preprocessing_variant)
        }
    }
}

/// Descending (likelihood, confidence), then unclamped evidence, then text
fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.likelihood_score
        .total_cmp(&a.likelihood_score)
        .then_with(|| b.best_confidence.total_cmp(&a.best_confidence))
        .then_with(|| b.evidence_score.total_cmp(&a.evidence_score))
        .then_with(|| a.normalized_text.cmp(&b.normalized_text))
}

/// Descending combined score, then unclamped evidence, then text
fn selection_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.combined_score
        .total_cmp(&a.combined_score)
        .then_with(|| b.evidence_score.total_cmp(&a.evidence_score))
        .then_with(|| a.normalized_text.cmp(&b.normalized_text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(text: &str, confidence: f64) -> RawDetection {
        RawDetection::new(text, confidence, "test", 0)
    }

    #[test]
    fn test_brand_families() {
        assert_eq!(brand_family("90915-YZZD4"), Some("toyota"));
        assert_eq!(brand_family("15400-PLM-A02"), Some("honda"));
        assert_eq!(brand_family("F1TZ-6714-A"), Some("ford"));
        assert_eq!(brand_family("FL-820-S"), Some("ford"));
        assert_eq!(brand_family("PF52"), Some("gm"));
        assert_eq!(brand_family("PH3593A"), Some("fram"));
        assert_eq!(brand_family("M1-110A"), Some("mobil1"));
        assert_eq!(brand_family("HONDA"), None);
    }

    #[test]
    fn test_likelihood_breakdown() {
        // keyword + letter + length + charset
        let honda = likelihood("HONDA");
        assert!((honda.raw - 1.1).abs() < 1e-9);
        assert_eq!(honda.score, 1.0);
        assert_eq!(honda.family, None);

        // letters only, short, no keyword
        let oil = likelihood("OIL");
        assert!((oil.raw - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_brand_bonus_counts_once() {
        // Matches wix (\d{5}) and toyota; still a single 0.9
        let l = likelihood("90915-12345");
        let expected = BRAND_PATTERN_BONUS
            + DIGIT_BONUS
            + HYPHEN_BONUS
            + LENGTH_BONUS
            + CHARSET_BONUS;
        assert!((l.raw - expected).abs() < 1e-9);
    }

    #[test]
    fn test_merge_keeps_higher_confidence() {
        let scored = CandidateScorer::new().score(&[
            detection("pf52", 0.4),
            detection("PF 52", 0.8),
            detection("PF52", 0.6),
        ]);

        assert_eq!(scored.ranked.len(), 1);
        assert_eq!(scored.ranked[0].normalized_text, "PF52");
        assert_eq!(scored.ranked[0].best_confidence, 0.8);
    }

    #[test]
    fn test_length_bounds() {
        let long = "A".repeat(51);
        let scored = CandidateScorer::new().score(&[detection("X", 0.9), detection(&long, 0.9)]);
        assert!(scored.is_empty());
        assert!(scored.best.is_none());
    }

    #[test]
    fn test_empty_input() {
        let scored = CandidateScorer::new().score(&[]);
        assert!(scored.ranked.is_empty());
        assert!(scored.best.is_none());
    }

    #[test]
    fn test_best_requires_threshold() {
        let scored = CandidateScorer::new().score(&[detection("90915-YZZD4", 0.35)]);
        assert_eq!(scored.ranked.len(), 1);
        assert!(scored.best.is_none());

        let scored = CandidateScorer::new().score(&[detection("90915-YZZD4", 0.5)]);
        assert_eq!(scored.best.unwrap().normalized_text, "90915-YZZD4");
    }

    #[test]
    fn test_combined_score() {
        let scored = CandidateScorer::new().score(&[detection("OIL", 0.5)]);
        let c = &scored.ranked[0];
        assert!((c.combined_score - c.likelihood_score * 0.5).abs() < 1e-9);
    }
}
