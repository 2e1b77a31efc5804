//! Raw OCR output and the image it was read from.

use serde::{Deserialize, Serialize};

/// Encoded image formats recognized from their leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Webp,
    Tiff,
}

impl ImageFormat {
    /// Sniff the format from magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(Self::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if bytes.starts_with(b"BM") {
            Some(Self::Bmp)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
            Some(Self::Tiff)
        } else {
            None
        }
    }

    /// MIME type used when shipping the image to HTTP collaborators
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Webp => "image/webp",
            Self::Tiff => "image/tiff",
        }
    }
}

/// A validated image handed to OCR engines and recognition services
#[derive(Debug, Clone)]
pub struct ImageInput {
    /// Encoded image bytes
    pub bytes: Vec<u8>,

    /// Detected encoding
    pub format: ImageFormat,
}

impl ImageInput {
    pub fn new(bytes: Vec<u8>, format: ImageFormat) -> Self {
        Self { bytes, format }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Text reported by an OCR engine for one pass, before tagging
#[derive(Debug, Clone, PartialEq)]
pub struct TextDetection {
    pub text: String,
    pub confidence: f64,
    /// Corner points, when the engine reports them
    pub bbox: Option<Vec<[f64; 2]>>,
}

impl TextDetection {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
            bbox: None,
        }
    }
}

/// One detection tagged with the engine and preprocessing variant that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Text exactly as the engine reported it
    pub text: String,

    /// Engine confidence in [0, 1]
    pub confidence: f64,

    /// Name of the OCR engine
    pub source_engine: String,

    /// Index of the preprocessing variant (0 = original image)
    pub preprocessing_variant: usize,
}

impl RawDetection {
    pub fn new(
        text: impl Into<String>,
        confidence: f64,
        source_engine: impl Into<String>,
        preprocessing_variant: usize,
    ) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source_engine: source_engine.into(),
            preprocessing_variant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_known_formats() {
        assert_eq!(
            ImageFormat::sniff(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0]),
            Some(ImageFormat::Png)
        );
        assert_eq!(ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageFormat::Webp));
        assert_eq!(ImageFormat::sniff(b"hello world"), None);
        assert_eq!(ImageFormat::sniff(&[]), None);
    }

    #[test]
    fn test_raw_detection_clamps_confidence() {
        let detection = RawDetection::new("PF52", 1.7, "tesseract", 0);
        assert_eq!(detection.confidence, 1.0);
    }
}
