//! Text evidence collection across preprocessing variants and OCR engines.
//!
//! Variant 0 is always the original image. Each configured preprocessor
//! adds one more variant. Every (variant, engine) pair is an independent
//! pass; passes run concurrently and a failing pass only loses its own
//! detections.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::adapters::{OcrEngine, Preprocessor};
use crate::domain::{ImageInput, RawDetection};

/// Runs every OCR engine against every image variant
#[derive(Clone, Default)]
pub struct TextEvidenceCollector {
    engines: Vec<Arc<dyn OcrEngine>>,
    preprocessors: Vec<Arc<dyn Preprocessor>>,
}

impl TextEvidenceCollector {
    pub fn new(engines: Vec<Arc<dyn OcrEngine>>, preprocessors: Vec<Arc<dyn Preprocessor>>) -> Self {
        Self {
            engines,
            preprocessors,
        }
    }

    /// Build the image variants; a failing preprocessor is skipped.
    ///
    /// Returned indices are stable: a variant keeps the index of its
    /// preprocessor (plus one) even when an earlier one failed.
    async fn variants(&self, image: &ImageInput) -> Vec<(usize, ImageInput)> {
        let futures = self.preprocessors.iter().enumerate().map(|(i, preprocessor)| {
            let preprocessor = Arc::clone(preprocessor);
            async move {
                match preprocessor.apply(image).await {
                    Ok(variant) => Some((i + 1, variant)),
                    Err(e) => {
                        warn!(
                            source = "preprocessor",
                            preprocessor = preprocessor.name(),
                            error = %e,
                            "Preprocessing failed, variant skipped"
                        );
                        None
                    }
                }
            }
        });

        let mut variants = vec![(0, image.clone())];
        variants.extend(join_all(futures).await.into_iter().flatten());
        variants
    }

    /// Collect detections from every pass, ordered by (variant, engine)
    pub async fn collect(&self, image: &ImageInput) -> Vec<RawDetection> {
        let variants = self.variants(image).await;

        let passes = variants.iter().flat_map(|(variant, input)| {
            self.engines.iter().map(move |engine| {
                let engine = Arc::clone(engine);
                let variant = *variant;
                async move {
                    match engine.detect(input).await {
                        Ok(detections) => {
                            let floor = engine.min_confidence();
                            let kept: Vec<RawDetection> = detections
                                .into_iter()
                                .filter(|d| d.confidence >= floor)
                                .map(|d| {
                                    RawDetection::new(d.text, d.confidence, engine.name(), variant)
                                })
                                .collect();
                            debug!(
                                engine = engine.name(),
                                variant,
                                kept = kept.len(),
                                "OCR pass complete"
                            );
                            kept
                        }
                        Err(e) => {
                            warn!(
                                source = "ocr",
                                engine = engine.name(),
                                variant,
                                error = %e,
                                "OCR pass failed"
                            );
                            Vec::new()
                        }
                    }
                }
            })
        });

        join_all(passes).await.into_iter().flatten().collect()
    }
}
