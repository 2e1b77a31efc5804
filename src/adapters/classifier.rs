//! Visual part classifier.
//!
//! The pretrained model is served out of process. `HttpClassifier` uploads
//! the image as multipart form data and reads back the part label, the
//! condition label and the ranked part predictions.
//! A server answering 503 (or `"available": false`) has no model loaded,
//! which is reported as [`Classification::Unavailable`] rather than an error.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;

use super::{Classification, Classifier};
use crate::domain::{ClassifierSignal, ImageInput, LabelScore};

/// Ranked part labels kept per prediction
const TOP_PREDICTIONS: usize = 3;

/// Label groups used to derive a coarse category
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Engine",
        &[
            "Air Filter", "Oil Filter", "Fuel Filter", "Spark Plug", "Ignition Coil",
            "Timing Belt", "Serpentine Belt", "V-Belt", "Chain", "Fuel Pump",
            "Fuel Injector", "Throttle Body",
        ],
    ),
    ("Brakes", &["Brake Pad", "Brake Rotor", "Brake Caliper", "Brake Line"]),
    (
        "Electrical",
        &[
            "Alternator", "Starter", "Battery", "Voltage Regulator", "MAF Sensor",
            "O2 Sensor", "MAP Sensor", "TPS Sensor", "Knock Sensor",
        ],
    ),
    ("Cooling", &["Radiator", "Thermostat", "Water Pump", "Cooling Fan"]),
    (
        "Suspension",
        &[
            "Shock Absorber", "Strut", "Spring", "Control Arm", "Tie Rod", "Ball Joint",
            "Stabilizer Bar", "Bushing",
        ],
    ),
    ("Lighting", &["Headlight", "Taillight", "Turn Signal", "Bulb"]),
    ("Wheels", &["Tire", "Rim", "Hub Cap", "Valve Stem"]),
    ("Exhaust", &["Exhaust Pipe", "Muffler"]),
    ("Filtration", &["Cabin Filter"]),
];

/// Map a classifier label to its category, `General` when unknown
pub fn category_for(label: &str) -> &'static str {
    CATEGORIES
        .iter()
        .find(|(_, labels)| labels.iter().any(|l| l.eq_ignore_ascii_case(label)))
        .map(|(category, _)| *category)
        .unwrap_or("General")
}

/// Response body of the model server
#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default = "default_available")]
    available: bool,
    #[serde(alias = "part_type")]
    label: Option<String>,
    confidence: Option<f64>,
    #[serde(alias = "condition")]
    secondary_label: Option<String>,
    #[serde(alias = "condition_confidence")]
    secondary_confidence: Option<f64>,
    #[serde(default)]
    top_predictions: Vec<LabelScore>,
}

fn default_available() -> bool {
    true
}

impl PredictResponse {
    fn into_classification(self) -> Result<Classification> {
        if !self.available {
            return Ok(Classification::Unavailable);
        }

        let label = self.label.context("Classifier response has no label")?;
        let confidence = self
            .confidence
            .context("Classifier response has no confidence")?
            .clamp(0.0, 1.0);

        Ok(Classification::Prediction(ClassifierSignal {
            category: category_for(&label).to_string(),
            label,
            confidence,
            secondary_label: self.secondary_label,
            secondary_confidence: self.secondary_confidence.map(|c| c.clamp(0.0, 1.0)),
            top_predictions: self
                .top_predictions
                .into_iter()
                .take(TOP_PREDICTIONS)
                .map(|p| LabelScore {
                    confidence: p.confidence.clamp(0.0, 1.0),
                    label: p.label,
                })
                .collect(),
        }))
    }
}

/// Classifier reached over HTTP
pub struct HttpClassifier {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build classifier HTTP client")?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> &str {
        "http-classifier"
    }

    async fn classify(&self, image: &ImageInput) -> Result<Classification> {
        let part = Part::bytes(image.bytes.clone())
            .file_name("part")
            .mime_str(image.format.mime_type())?;
        let form = Form::new().part("image", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .context("Failed to send classifier request")?;

        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return Ok(Classification::Unavailable);
        }
        if !response.status().is_success() {
            anyhow::bail!("Classifier returned error: {}", response.status());
        }

        let body: PredictResponse = response
            .json()
            .await
            .context("Failed to parse classifier response")?;

        body.into_classification()
    }
}

/// Stand-in used when no classifier endpoint is configured
#[derive(Debug, Default)]
pub struct NoModelClassifier;

#[async_trait]
impl Classifier for NoModelClassifier {
    fn name(&self) -> &str {
        "no-model"
    }

    async fn classify(&self, _image: &ImageInput) -> Result<Classification> {
        Ok(Classification::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        assert_eq!(category_for("Oil Filter"), "Engine");
        assert_eq!(category_for("brake pad"), "Brakes");
        assert_eq!(category_for("Cabin Filter"), "Filtration");
        assert_eq!(category_for("Flux Capacitor"), "General");
    }

    #[test]
    fn test_response_unavailable() {
        let body: PredictResponse = serde_json::from_str(r#"{"available": false}"#).unwrap();
        assert_eq!(body.into_classification().unwrap(), Classification::Unavailable);
    }

    #[test]
    fn test_response_prediction() {
        let body: PredictResponse = serde_json::from_str(
            r#"{"label": "Spark Plug", "confidence": 0.82,
                "secondary_label": "Glow Plug", "secondary_confidence": 0.11}"#,
        )
        .unwrap();

        match body.into_classification().unwrap() {
            Classification::Prediction(signal) => {
                assert_eq!(signal.label, "Spark Plug");
                assert_eq!(signal.category, "Engine");
                assert_eq!(signal.secondary_label.as_deref(), Some("Glow Plug"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_model_server_fields() {
        let body: PredictResponse = serde_json::from_str(
            r#"{"part_type": "Oil Filter", "confidence": 0.91,
                "condition": "New", "condition_confidence": 0.77,
                "top_predictions": [
                    {"part_type": "Oil Filter", "confidence": 0.91},
                    {"part_type": "Fuel Filter", "confidence": 0.05},
                    {"part_type": "Air Filter", "confidence": 0.02},
                    {"part_type": "Cabin Filter", "confidence": 0.01}
                ]}"#,
        )
        .unwrap();

        let Classification::Prediction(signal) = body.into_classification().unwrap() else {
            panic!("expected a prediction");
        };
        assert_eq!(signal.label, "Oil Filter");
        assert_eq!(signal.secondary_label.as_deref(), Some("New"));
        assert_eq!(signal.secondary_confidence, Some(0.77));
        assert_eq!(signal.top_predictions.len(), 3);
        assert_eq!(signal.top_predictions[1].label, "Fuel Filter");
    }

    #[test]
    fn test_response_without_label_is_malformed() {
        let body: PredictResponse = serde_json::from_str(r#"{"confidence": 0.5}"#).unwrap();
        assert!(body.into_classification().is_err());
    }

    #[tokio::test]
    async fn test_no_model_classifier() {
        let image = ImageInput::new(vec![0xFF, 0xD8, 0xFF], crate::domain::ImageFormat::Jpeg);
        let result = NoModelClassifier.classify(&image).await.unwrap();
        assert_eq!(result, Classification::Unavailable);
    }
}
