//! partscout - Automotive part identification and offer aggregation
//!
//! Identifies a part from a photo by fusing several unreliable evidence
//! sources, then searches many shopping providers concurrently for it.
//!
//! # Architecture
//!
//! - OCR passes run over the original image and every preprocessing variant
//! - Detected strings are normalized, deduplicated and scored by how much
//!   they look like a part number
//! - The best candidate is fused with classifier, vision and catalog
//!   signals into one confidence
//! - Offer search queries every provider in parallel; one provider failing
//!   or timing out never affects the others
//!
//! # Modules
//!
//! - `adapters`: External collaborators (tesseract, classifier, vision, catalog, shops)
//! - `core`: Collector, scorer, fusion, aggregator and the orchestrator
//! - `domain`: Data structures (RawDetection, Candidate, Evidence, AggregateReport)
//! - `config`: YAML configuration with environment overrides
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Identify a part
//! partscout identify photo.jpg
//!
//! # Search offers
//! partscout offers 90915-YZZD4 --json
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use config::Settings;
pub use core::{Identification, InputError, Orchestrator};
pub use domain::{AggregateReport, Evidence, FusedResult};
