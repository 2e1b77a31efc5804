//! Vision-language analysis.
//!
//! `LanguageModelVision` sends the image and OCR hints to an
//! OpenAI-compatible chat-completions endpoint and asks for a JSON
//! description of the part. When no API key is configured or the request
//! fails it answers with [`KeywordVision`], a deterministic keyword
//! mapping over the OCR text. Output that cannot be parsed is kept as raw
//! text at low confidence.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use tracing::{debug, warn};

use super::VisionAnalyzer;
use crate::domain::{ImageInput, VisionFields, VisionOrigin, VisionSignal};

/// Confidence given to model output that could not be parsed
const UNPARSED_CONFIDENCE: f64 = 0.3;

const PART_KEYWORDS: &[(&str, &str, &str)] = &[
    ("brake", "Brake Component", "Braking System"),
    ("filter", "Filter", "Filtration"),
    ("spark", "Spark Plug", "Ignition"),
    ("oil", "Oil Component", "Engine"),
    ("belt", "Belt", "Engine"),
    ("hose", "Hose", "Cooling/Fuel"),
    ("sensor", "Sensor", "Electrical"),
    ("pump", "Pump", "Fuel/Cooling"),
    ("valve", "Valve", "Engine"),
    ("gasket", "Gasket", "Engine"),
];

const MAKE_GROUPS: &[(&str, &[&str])] = &[
    ("Honda", &["honda", "acura"]),
    ("Toyota", &["toyota", "lexus", "scion"]),
    ("Ford", &["ford", "lincoln", "mercury"]),
    ("Gm", &["chevrolet", "chevy", "gmc", "cadillac", "buick"]),
    ("Bmw", &["bmw", "mini"]),
    ("Vw", &["volkswagen", "vw", "audi", "porsche"]),
    ("Nissan", &["nissan", "infiniti"]),
    ("Hyundai", &["hyundai", "kia", "genesis"]),
];

/// Rule-based analyzer over OCR text
#[derive(Debug, Default, Clone)]
pub struct KeywordVision;

impl KeywordVision {
    /// Map OCR text to a part type, category and likely makes
    pub fn analyze_text(&self, text_hints: &[String]) -> VisionSignal {
        let text = text_hints.join(" ").to_lowercase();

        let hit = PART_KEYWORDS
            .iter()
            .find(|(keyword, _, _)| text.contains(keyword));

        let (part_type, category) = match hit {
            Some((_, part_type, category)) => (part_type.to_string(), category.to_string()),
            None => ("Unknown Part".to_string(), "General".to_string()),
        };

        let mut likely_makes: Vec<String> = MAKE_GROUPS
            .iter()
            .filter(|(_, variants)| variants.iter().any(|v| text.contains(v)))
            .map(|(make, _)| make.to_string())
            .collect();
        if likely_makes.is_empty() {
            likely_makes.push("Universal".to_string());
        }

        VisionSignal {
            fields: VisionFields {
                description: format!("Detected {} based on text analysis", part_type.to_lowercase()),
                part_type,
                category,
                likely_makes,
                year_range: "Various".to_string(),
            },
            confidence: if hit.is_some() { 0.6 } else { 0.3 },
            origin: VisionOrigin::RuleBased,
        }
    }
}

#[async_trait]
impl VisionAnalyzer for KeywordVision {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn analyze(&self, _image: &ImageInput, text_hints: &[String]) -> Result<VisionSignal> {
        Ok(self.analyze_text(text_hints))
    }
}

/// Fields the model is asked to return
#[derive(Debug, Deserialize)]
struct ModelAnswer {
    part_type: String,
    category: String,
    #[serde(default)]
    likely_makes: Vec<String>,
    #[serde(default)]
    year_range: String,
    confidence: f64,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Strip a surrounding markdown code fence, if any
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Turn the model's message content into a signal, never failing
pub fn parse_model_content(content: &str) -> VisionSignal {
    match serde_json::from_str::<ModelAnswer>(strip_code_fence(content)) {
        Ok(answer) => VisionSignal {
            fields: VisionFields {
                part_type: answer.part_type,
                category: answer.category,
                likely_makes: answer.likely_makes,
                year_range: answer.year_range,
                description: answer.description,
            },
            confidence: answer.confidence.clamp(0.0, 1.0),
            origin: VisionOrigin::Model,
        },
        Err(e) => {
            warn!(error = %e, "Vision output is not the requested JSON, keeping raw text");
            VisionSignal {
                fields: VisionFields {
                    part_type: "Unknown".to_string(),
                    category: "General".to_string(),
                    likely_makes: vec!["Universal".to_string()],
                    year_range: "Various".to_string(),
                    description: content.to_string(),
                },
                confidence: UNPARSED_CONFIDENCE,
                origin: VisionOrigin::Unparsed {
                    raw: content.to_string(),
                },
            }
        }
    }
}

fn build_prompt(text_hints: &[String]) -> String {
    format!(
        r#"Analyze this car part image and provide:
1. Part type (e.g., brake pad, air filter, spark plug, etc.)
2. Likely car make/model compatibility
3. Part category (engine, brakes, electrical, etc.)
4. Estimated year range

Detected text from OCR: {}

Respond in JSON format:
{{
    "part_type": "specific part name",
    "category": "part category",
    "likely_makes": ["make1", "make2"],
    "year_range": "2010-2020",
    "confidence": 0.85,
    "description": "detailed description"
}}"#,
        text_hints.join(", ")
    )
}

/// Chat-completions backed analyzer with keyword fallback
pub struct LanguageModelVision {
    api_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
    fallback: KeywordVision,
}

impl LanguageModelVision {
    pub fn new(
        api_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build vision HTTP client")?;

        Ok(Self {
            api_url: api_url.into(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
            fallback: KeywordVision,
        })
    }

    /// Ask the model; returns the message content
    async fn request(&self, api_key: &str, image: &ImageInput, text_hints: &[String]) -> Result<String> {
        let data_url = format!(
            "data:{};base64,{}",
            image.format.mime_type(),
            BASE64.encode(&image.bytes)
        );

        let payload = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": build_prompt(text_hints) },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }],
            "max_tokens": 500
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to send vision request")?;

        if !response.status().is_success() {
            anyhow::bail!("Vision API returned error: {}", response.status());
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("Failed to parse vision API envelope")?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("Vision API returned no choices")
    }
}

#[async_trait]
impl VisionAnalyzer for LanguageModelVision {
    fn name(&self) -> &str {
        "language-model"
    }

    async fn analyze(&self, image: &ImageInput, text_hints: &[String]) -> Result<VisionSignal> {
        let Some(api_key) = self.api_key.as_deref() else {
            debug!("No vision API key configured, using keyword fallback");
            return Ok(self.fallback.analyze_text(text_hints));
        };

        match self.request(api_key, image, text_hints).await {
            Ok(content) => Ok(parse_model_content(&content)),
            Err(e) => {
                warn!(error = %e, "Vision analysis failed, using keyword fallback");
                Ok(self.fallback.analyze_text(text_hints))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_keyword_fallback_detects_part_and_make() {
        let signal = KeywordVision.analyze_text(&hints(&["TOYOTA", "OIL FILTER"]));
        assert_eq!(signal.fields.part_type, "Filter");
        assert_eq!(signal.fields.category, "Filtration");
        assert_eq!(signal.fields.likely_makes, vec!["Toyota"]);
        assert_eq!(signal.confidence, 0.6);
        assert_eq!(signal.origin, VisionOrigin::RuleBased);
    }

    #[test]
    fn test_keyword_fallback_unknown() {
        let signal = KeywordVision.analyze_text(&hints(&["90915-YZZD4"]));
        assert_eq!(signal.fields.part_type, "Unknown Part");
        assert_eq!(signal.fields.likely_makes, vec!["Universal"]);
        assert_eq!(signal.confidence, 0.3);
        assert!(signal.is_fallback());
    }

    #[test]
    fn test_parse_model_content_json() {
        let content = r#"```json
{"part_type": "Oil Filter", "category": "Engine", "likely_makes": ["Toyota"],
 "year_range": "2018-2023", "confidence": 0.85, "description": "Spin-on filter"}
```"#;
        let signal = parse_model_content(content);
        assert_eq!(signal.origin, VisionOrigin::Model);
        assert_eq!(signal.fields.part_type, "Oil Filter");
        assert_eq!(signal.confidence, 0.85);
    }

    #[test]
    fn test_parse_model_content_unparsed_keeps_raw() {
        let signal = parse_model_content("Looks like an oil filter to me.");
        assert_eq!(signal.confidence, UNPARSED_CONFIDENCE);
        assert_eq!(
            signal.origin,
            VisionOrigin::Unparsed {
                raw: "Looks like an oil filter to me.".to_string()
            }
        );
        assert_eq!(signal.fields.description, "Looks like an oil filter to me.");
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }

    #[tokio::test]
    async fn test_without_key_uses_fallback() {
        let vision = LanguageModelVision::new(
            "http://127.0.0.1:9/v1/chat/completions",
            "gpt-4o-mini",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        let image = ImageInput::new(vec![0xFF, 0xD8, 0xFF], crate::domain::ImageFormat::Jpeg);

        let signal = vision.analyze(&image, &hints(&["BRAKE PAD"])).await.unwrap();
        assert_eq!(signal.origin, VisionOrigin::RuleBased);
        assert_eq!(signal.fields.category, "Braking System");
    }
}
