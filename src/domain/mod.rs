//! Domain types for partscout.
//!
//! This module contains the core data structures:
//! - Detections: raw OCR output and the validated image
//! - Candidates: normalized, scored part-number strings
//! - Evidence: per-source signals and the fused result
//! - Offers: shopping listings and the aggregate report
//! - Parts: compatibility database records

pub mod candidate;
pub mod detection;
pub mod evidence;
pub mod offer;
pub mod part;

// Re-export commonly used types
pub use candidate::{normalize, Candidate, MAX_CANDIDATE_LEN, MIN_CANDIDATE_LEN};
pub use detection::{ImageFormat, ImageInput, RawDetection, TextDetection};
pub use evidence::{
    ClassifierSignal, DbMatch, Evidence, FusedResult, LabelScore, MatchStrategy, Signal,
    SignalStatus, SourceKind, VisionFields, VisionOrigin, VisionSignal,
};
pub use offer::{AggregateReport, PriceStats, ProviderResult, ProviderStatus};
pub use part::{Fitment, Interchange, PartRecord};
