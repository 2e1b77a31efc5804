//! Entry points of the engine.
//!
//! `identify` runs the recognition pipeline for one image: OCR collection,
//! candidate scoring, then the classifier, vision and catalog calls in
//! parallel, then fusion. `find_offers` fans a search term out to the
//! shopping providers. Only input problems are returned as errors; every
//! collaborator failure is logged and recorded in the result instead.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::providers::build_client;
use crate::adapters::{
    default_providers, Classification, Classifier, CommandPreprocessor, HttpClassifier,
    InMemoryCatalog, LanguageModelVision, NoModelClassifier, OcrEngine, PartsCatalog,
    Preprocessor, ProviderOptions, TesseractEngine, VisionAnalyzer,
};
use crate::config::Settings;
use crate::domain::{
    AggregateReport, Candidate, ClassifierSignal, DbMatch, Evidence, FusedResult, ImageInput,
    Signal, SourceKind, VisionSignal,
};

use super::aggregator::ProviderAggregator;
use super::collector::TextEvidenceCollector;
use super::fusion::{FusionEngine, FusionWeights};
use super::input::{InputError, InputLimits};
use super::scorer::CandidateScorer;

/// Candidates reported back with an identification
const TOP_CANDIDATES: usize = 5;

/// Candidate texts handed to vision as hints and tried against the catalog
const MAX_TEXT_HINTS: usize = 20;

/// Default timeout for each classifier, vision and catalog call
pub const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one `identify` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identification {
    pub request_id: Uuid,

    pub result: FusedResult,

    /// Best ranked candidates, highest first
    pub top_candidates: Vec<Candidate>,

    /// Detections collected before deduplication
    pub total_detections: usize,

    /// Signals the result was fused from
    pub evidence: Evidence,

    pub elapsed_ms: u64,
}

/// Identification and offer-search engine
pub struct Orchestrator {
    collector: TextEvidenceCollector,
    scorer: CandidateScorer,
    classifier: Arc<dyn Classifier>,
    vision: Option<Arc<dyn VisionAnalyzer>>,
    catalog: Option<Arc<dyn PartsCatalog>>,
    fusion: FusionEngine,
    aggregator: ProviderAggregator,
    limits: InputLimits,
    service_timeout: Duration,
}

impl Orchestrator {
    /// Create an orchestrator with no classifier model, vision or catalog
    pub fn new(collector: TextEvidenceCollector, aggregator: ProviderAggregator) -> Self {
        Self {
            collector,
            scorer: CandidateScorer::new(),
            classifier: Arc::new(NoModelClassifier),
            vision: None,
            catalog: None,
            fusion: FusionEngine::default(),
            aggregator,
            limits: InputLimits::default(),
            service_timeout: DEFAULT_SERVICE_TIMEOUT,
        }
    }

    /// Build every collaborator from resolved settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let ocr = &settings.ocr;
        let engine = TesseractEngine::with_binary_path(ocr.binary.clone())
            .with_page_modes(ocr.page_modes.clone())
            .with_min_confidence(ocr.min_confidence)
            .with_pass_timeout(settings.ocr_pass_timeout());
        let engines: Vec<Arc<dyn OcrEngine>> = vec![Arc::new(engine)];

        let preprocessors = settings
            .preprocessing
            .iter()
            .map(|step| -> Result<Arc<dyn Preprocessor>> {
                let preprocessor =
                    CommandPreprocessor::from_command(step.name.clone(), &step.command)?
                        .with_timeout(settings.ocr_pass_timeout());
                Ok(Arc::new(preprocessor))
            })
            .collect::<Result<Vec<_>>>()?;

        let classifier: Arc<dyn Classifier> = match &settings.classifier_url {
            Some(url) => Arc::new(HttpClassifier::new(url.clone(), settings.service_timeout())?),
            None => Arc::new(NoModelClassifier),
        };

        let vision = LanguageModelVision::new(
            settings.vision.api_url.clone(),
            settings.vision.model.clone(),
            settings.vision.api_key.clone(),
            settings.service_timeout(),
        )?;

        let catalog = settings
            .catalog_path
            .as_deref()
            .map(InMemoryCatalog::from_file)
            .transpose()?;
        if let Some(catalog) = &catalog {
            info!(records = catalog.len(), "Parts catalog loaded");
        }

        let client = build_client(settings.provider_timeout())?;
        let options = ProviderOptions {
            ebay_app_id: settings.shopping.ebay_app_id.clone(),
            amazon_associate_tag: settings.shopping.amazon_associate_tag.clone(),
            verify_storefronts: settings.shopping.verify_storefronts,
        };
        let providers = default_providers(&client, &options)?;
        let aggregator = ProviderAggregator::new(providers, settings.provider_timeout())
            .context("Failed to register shopping providers")?;

        let collector = TextEvidenceCollector::new(engines, preprocessors);
        let mut orchestrator = Self::new(collector, aggregator)
            .with_classifier(classifier)
            .with_vision(Arc::new(vision))
            .with_limits(settings.input_limits())
            .with_service_timeout(settings.service_timeout());
        if let Some(catalog) = catalog {
            orchestrator = orchestrator.with_catalog(Arc::new(catalog));
        }

        Ok(orchestrator)
    }

    /// OCR candidates must exceed this combined score to be identified.
    ///
    /// Applied to both scoring and fusion.
    pub fn with_acceptance_threshold(mut self, threshold: f64) -> Self {
        self.scorer = self.scorer.with_acceptance_threshold(threshold);
        self.fusion = self.fusion.with_acceptance_threshold(threshold);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_vision(mut self, vision: Arc<dyn VisionAnalyzer>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn PartsCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Replace the fusion weights; the acceptance threshold is kept
    pub fn with_fusion_weights(mut self, weights: FusionWeights) -> Self {
        self.fusion = FusionEngine::new(weights)
            .with_acceptance_threshold(self.scorer.acceptance_threshold());
        self
    }

    pub fn with_limits(mut self, limits: InputLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_service_timeout(mut self, service_timeout: Duration) -> Self {
        self.service_timeout = service_timeout;
        self
    }

    /// Identify the part shown in an encoded image
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn identify(&self, bytes: Vec<u8>) -> Result<Identification, InputError> {
        let started = Instant::now();
        let image = self.limits.validate_image(bytes)?;
        let request_id = Uuid::new_v4();
        info!(%request_id, format = ?image.format, "Starting identification");

        let detections = self.collector.collect(&image).await;
        let scored = self.scorer.score(&detections);
        debug!(
            detections = detections.len(),
            candidates = scored.ranked.len(),
            best = scored.best.as_ref().map(|c| c.normalized_text.as_str()),
            "Candidates scored"
        );

        let hints: Vec<String> = scored
            .ranked
            .iter()
            .take(MAX_TEXT_HINTS)
            .map(|c| c.normalized_text.clone())
            .collect();

        let (classifier, vision, db_match) = tokio::join!(
            self.classify(&image),
            self.analyze(&image, &hints),
            self.lookup(&hints),
        );

        let evidence = Evidence {
            ocr_candidate: scored.best.clone().into(),
            classifier,
            vision,
            db_match,
        };
        let result = self.fusion.fuse(&evidence);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            %request_id,
            chosen = result.chosen_identifier.as_deref(),
            confidence = result.overall_confidence,
            elapsed_ms,
            "Identification complete"
        );

        Ok(Identification {
            request_id,
            result,
            top_candidates: scored.ranked.into_iter().take(TOP_CANDIDATES).collect(),
            total_detections: detections.len(),
            evidence,
            elapsed_ms,
        })
    }

    /// Search every shopping provider for a part identifier or name
    #[instrument(skip(self))]
    pub async fn find_offers(&self, term: &str) -> Result<AggregateReport, InputError> {
        let term = self.limits.validate_term(term)?;
        Ok(self.aggregator.aggregate(term).await)
    }

    /// Run one collaborator call under the service timeout
    async fn guarded<T>(
        &self,
        source: SourceKind,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T, String> {
        match tokio::time::timeout(self.service_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(%source, error = %e, "Evidence source failed");
                Err(e.to_string())
            }
            Err(_) => {
                warn!(%source, timeout = ?self.service_timeout, "Evidence source timed out");
                Err(format!("timed out after {:?}", self.service_timeout))
            }
        }
    }

    async fn classify(&self, image: &ImageInput) -> Signal<ClassifierSignal> {
        match self
            .guarded(SourceKind::Classifier, self.classifier.classify(image))
            .await
        {
            Ok(Classification::Prediction(signal)) => Signal::Present(signal),
            Ok(Classification::Unavailable) => {
                debug!(classifier = self.classifier.name(), "Classifier has no model loaded");
                Signal::Unavailable
            }
            Err(e) => Signal::Failed(e),
        }
    }

    async fn analyze(&self, image: &ImageInput, hints: &[String]) -> Signal<VisionSignal> {
        let Some(vision) = &self.vision else {
            return Signal::Unavailable;
        };

        match self
            .guarded(SourceKind::Vision, vision.analyze(image, hints))
            .await
        {
            Ok(signal) => Signal::Present(signal),
            Err(e) => Signal::Failed(e),
        }
    }

    /// Try candidate texts in rank order; the first hit wins
    async fn lookup(&self, keys: &[String]) -> Signal<DbMatch> {
        let Some(catalog) = &self.catalog else {
            return Signal::Unavailable;
        };

        match self
            .guarded(SourceKind::Database, first_hit(catalog.as_ref(), keys))
            .await
        {
            Ok(hit) => hit.into(),
            Err(e) => Signal::Failed(e),
        }
    }
}

async fn first_hit(catalog: &dyn PartsCatalog, keys: &[String]) -> Result<Option<DbMatch>> {
    for key in keys {
        if let Some(hit) = catalog.lookup(key).await? {
            return Ok(Some(hit));
        }
    }
    Ok(None)
}
