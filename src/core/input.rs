//! Request validation.
//!
//! Input problems are the only failures surfaced to callers: an empty
//! upload, bytes that are not an image, an image above the size limit and
//! a blank search term. Everything downstream degrades instead of failing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ImageFormat, ImageInput};

/// Request size limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputLimits {
    /// Maximum image size in bytes (default: 16MB)
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

fn default_max_image_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

impl InputLimits {
    /// Accept the bytes as an image or say why not
    pub fn validate_image(&self, bytes: Vec<u8>) -> Result<ImageInput, InputError> {
        if bytes.is_empty() {
            return Err(InputError::EmptyImage);
        }

        if bytes.len() > self.max_image_bytes {
            return Err(InputError::TooLarge {
                actual: bytes.len(),
                limit: self.max_image_bytes,
            });
        }

        let format = ImageFormat::sniff(&bytes).ok_or(InputError::NotAnImage)?;
        Ok(ImageInput::new(bytes, format))
    }

    /// Trimmed search term, rejected when blank
    pub fn validate_term<'a>(&self, term: &'a str) -> Result<&'a str, InputError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(InputError::EmptySearchTerm);
        }
        Ok(term)
    }
}

/// Caller-visible rejection
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Image is empty")]
    EmptyImage,

    #[error("Content is not a recognized image format")]
    NotAnImage,

    #[error("Image exceeds size limit: {actual} bytes > {limit} bytes")]
    TooLarge { actual: usize, limit: usize },

    #[error("Search term is empty")]
    EmptySearchTerm,
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    #[test]
    fn test_accepts_jpeg() {
        let image = InputLimits::default().validate_image(JPEG.to_vec()).unwrap();
        assert_eq!(image.format, ImageFormat::Jpeg);
        assert_eq!(image.len(), JPEG.len());
    }

    #[test]
    fn test_rejects_empty() {
        let err = InputLimits::default().validate_image(Vec::new()).unwrap_err();
        assert_eq!(err, InputError::EmptyImage);
    }

    #[test]
    fn test_rejects_text() {
        let err = InputLimits::default()
            .validate_image(b"definitely not an image".to_vec())
            .unwrap_err();
        assert_eq!(err, InputError::NotAnImage);
    }

    #[test]
    fn test_rejects_oversize() {
        let limits = InputLimits { max_image_bytes: 4 };
        let err = limits.validate_image(JPEG.to_vec()).unwrap_err();
        assert_eq!(err, InputError::TooLarge { actual: 6, limit: 4 });
        assert!(err.to_string().contains("6 bytes > 4 bytes"));
    }

    #[test]
    fn test_term_is_trimmed() {
        let limits = InputLimits::default();
        assert_eq!(limits.validate_term("  PF52 \n"), Ok("PF52"));
        assert_eq!(limits.validate_term("   "), Err(InputError::EmptySearchTerm));
    }
}
