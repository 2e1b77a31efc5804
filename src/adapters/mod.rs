//! Adapter interfaces for external collaborators.
//!
//! Every service the engine depends on sits behind one of these traits:
//! OCR engines, preprocessing filters, the visual classifier, the
//! vision-language model, the compatibility database and the shopping
//! providers. Concrete adapters are constructed once at startup and shared
//! read-only between requests.

pub mod catalog;
pub mod classifier;
pub mod preprocess;
pub mod providers;
pub mod subprocess;
pub mod tesseract;
pub mod vision;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{ClassifierSignal, DbMatch, ImageInput, ProviderResult, TextDetection, VisionSignal};

pub use catalog::InMemoryCatalog;
pub use classifier::{HttpClassifier, NoModelClassifier};
pub use preprocess::CommandPreprocessor;
pub use providers::{
    default_providers, EbayProvider, ProviderOptions, ScrapingProvider, Storefront,
    StorefrontProvider,
};
pub use tesseract::TesseractEngine;
pub use vision::{KeywordVision, LanguageModelVision};

/// Text recognizer run against each preprocessing variant
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Engine name used to tag detections
    fn name(&self) -> &str;

    /// Detections below this confidence are discarded at source
    fn min_confidence(&self) -> f64;

    /// Read all text from the image
    async fn detect(&self, image: &ImageInput) -> Result<Vec<TextDetection>>;
}

/// Image to image transform producing one OCR variant
#[async_trait]
pub trait Preprocessor: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(&self, image: &ImageInput) -> Result<ImageInput>;
}

/// Classifier answer; a missing model is not an error
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Prediction(ClassifierSignal),
    Unavailable,
}

/// Pretrained visual classifier
#[async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, image: &ImageInput) -> Result<Classification>;
}

/// Vision-language analysis of the image, hinted with OCR text.
///
/// Implementations degrade to a rule-based result instead of failing
/// whenever the model is unreachable or its output cannot be parsed.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self, image: &ImageInput, text_hints: &[String]) -> Result<VisionSignal>;
}

/// Read-only compatibility database
#[async_trait]
pub trait PartsCatalog: Send + Sync {
    fn name(&self) -> &str;

    /// Exact lookup first, fuzzy matching second
    async fn lookup(&self, key: &str) -> Result<Option<DbMatch>>;
}

/// A retail source queried for listings
#[async_trait]
pub trait ShoppingProvider: Send + Sync {
    /// Store name; the key of this provider in the aggregate report
    fn name(&self) -> &str;

    async fn search(&self, term: &str) -> Result<Vec<ProviderResult>>;
}
