//! Candidate scoring: ranking, determinism and score bounds.

use partscout::core::{likelihood, CandidateScorer, ACCEPTANCE_THRESHOLD};
use partscout::domain::{normalize, RawDetection};
use proptest::prelude::*;

fn detections(items: &[(&str, f64)]) -> Vec<RawDetection> {
    items
        .iter()
        .map(|(text, conf)| RawDetection::new(*text, *conf, "tesseract", 0))
        .collect()
}

#[test]
fn test_structured_number_beats_keyword_and_generic() {
    let scorer = CandidateScorer::new();
    let scored = scorer.score(&detections(&[
        ("HONDA", 0.9),
        ("90915-YZZD4", 0.9),
        ("PF52", 0.9),
    ]));

    let best = scored.best.expect("a candidate above the threshold");
    assert_eq!(best.normalized_text, "90915-YZZD4");
    assert_eq!(best.pattern_family.as_deref(), Some("toyota"));

    let order: Vec<_> = scored.ranked.iter().map(|c| c.normalized_text.as_str()).collect();
    assert_eq!(order, vec!["90915-YZZD4", "PF52", "HONDA"]);
}

#[test]
fn test_order_independent() {
    let scorer = CandidateScorer::new();
    let items = [
        ("pf 52", 0.6),
        ("HONDA", 0.9),
        ("90915-YZZD4", 0.7),
        ("PF52", 0.8),
        ("oil filter", 0.95),
    ];

    let forward = scorer.score(&detections(&items));
    let mut reversed = items.to_vec();
    reversed.reverse();
    let backward = scorer.score(&detections(&reversed));

    assert_eq!(forward, backward);
}

#[test]
fn test_merge_keeps_higher_confidence() {
    let scorer = CandidateScorer::new();
    let scored = scorer.score(&detections(&[("pf52", 0.4), ("PF-52", 0.3), ("P F 5 2", 0.85)]));

    let pf52 = scored
        .ranked
        .iter()
        .find(|c| c.normalized_text == "PF52")
        .unwrap();
    assert_eq!(pf52.best_confidence, 0.85);
    assert_eq!(scored.ranked.len(), 2);
}

#[test]
fn test_length_bounds_filter_everything() {
    let scorer = CandidateScorer::new();
    let long = "A".repeat(51);
    let scored = scorer.score(&detections(&[("x", 0.9), ("!!", 0.9), (long.as_str(), 0.9)]));

    assert!(scored.is_empty());
    assert!(scored.best.is_none());
}

#[test]
fn test_low_confidence_not_accepted() {
    let scorer = CandidateScorer::new();
    let scored = scorer.score(&detections(&[("90915-YZZD4", 0.4)]));

    assert_eq!(scored.ranked.len(), 1);
    assert!(scored.ranked[0].combined_score <= ACCEPTANCE_THRESHOLD);
    assert!(scored.best.is_none());
}

proptest! {
    #[test]
    fn prop_likelihood_is_clamped(text in "[A-Z0-9 -]{0,60}") {
        let score = likelihood(&normalize(&text)).score;
        prop_assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn prop_normalize_is_idempotent(text in ".{0,80}") {
        let once = normalize(&text);
        prop_assert_eq!(normalize(&once), once.clone());
        prop_assert!(once.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-'));
    }

    #[test]
    fn prop_scoring_ignores_input_order(
        items in proptest::collection::vec(("[A-Za-z0-9 -]{1,14}", 0.0f64..=1.0), 0..12)
    ) {
        let scorer = CandidateScorer::new();
        let forward: Vec<RawDetection> = items
            .iter()
            .map(|(t, c)| RawDetection::new(t.clone(), *c, "tesseract", 0))
            .collect();
        let mut backward = forward.clone();
        backward.reverse();

        prop_assert_eq!(scorer.score(&forward), scorer.score(&backward));
    }

    #[test]
    fn prop_scores_within_bounds(
        items in proptest::collection::vec(("[A-Za-z0-9 -]{1,14}", 0.0f64..=1.0), 0..12)
    ) {
        let scored = CandidateScorer::new().score(
            &items
                .iter()
                .map(|(t, c)| RawDetection::new(t.clone(), *c, "tesseract", 0))
                .collect::<Vec<_>>(),
        );
        for candidate in &scored.ranked {
            prop_assert!((0.0..=1.0).contains(&candidate.likelihood_score));
            prop_assert!(candidate.combined_score <= candidate.best_confidence + 1e-12);
        }
    }
}
