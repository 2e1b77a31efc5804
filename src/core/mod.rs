//! Core engine.
//!
//! This module contains:
//! - TextEvidenceCollector: OCR passes over image variants
//! - CandidateScorer: Part-number likelihood and ranking
//! - FusionEngine: Weighted combination of evidence sources
//! - ProviderAggregator: Concurrent shopping queries and price statistics
//! - Orchestrator: The `identify` and `find_offers` entry points

pub mod aggregator;
pub mod collector;
pub mod fusion;
pub mod input;
pub mod orchestrator;
pub mod scorer;

// Re-export commonly used types
pub use aggregator::{parse_price, AggregatorError, ProviderAggregator, DEFAULT_PROVIDER_TIMEOUT};
pub use collector::TextEvidenceCollector;
pub use fusion::{FusionEngine, FusionWeights, NEUTRAL_PRIOR};
pub use input::{InputError, InputLimits};
pub use orchestrator::{Identification, Orchestrator, DEFAULT_SERVICE_TIMEOUT};
pub use scorer::{likelihood, CandidateScorer, Likelihood, ScoredCandidates, ACCEPTANCE_THRESHOLD};
