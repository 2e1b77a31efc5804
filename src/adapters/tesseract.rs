//! Tesseract OCR engine.
//!
//! Runs the `tesseract` CLI as a subprocess, piping the image on stdin and
//! reading TSV from stdout. Word rows are grouped back into lines, each
//! carrying the mean word confidence. Each configured page-segmentation
//! mode is a separate pass over the same image.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::subprocess::run_piped;
use super::OcrEngine;
use crate::domain::{ImageInput, TextDetection};

/// Lines shorter than this are never part numbers
const MIN_LINE_LEN: usize = 3;

/// Default floor; tesseract reports low word confidences on glare and noise
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;

/// TSV row level of a single word
const WORD_LEVEL: &str = "5";

/// Character whitelist for the part-number oriented passes
const PART_WHITELIST: &str = "tessedit_char_whitelist=ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-";

/// One tesseract invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMode {
    /// `--psm` value
    pub psm: u8,
    /// Restrict output to part-number characters
    #[serde(default)]
    pub whitelist: bool,
}

impl PageMode {
    fn args(&self) -> Vec<String> {
        let mut args = vec!["--psm".to_string(), self.psm.to_string()];
        if self.whitelist {
            args.push("-c".to_string());
            args.push(PART_WHITELIST.to_string());
        }
        args
    }
}

/// Default passes: block and word modes restricted to part-number characters,
/// then unrestricted single-line and raw-line modes.
pub fn default_page_modes() -> Vec<PageMode> {
    vec![
        PageMode { psm: 6, whitelist: true },
        PageMode { psm: 8, whitelist: true },
        PageMode { psm: 7, whitelist: false },
        PageMode { psm: 13, whitelist: false },
    ]
}

/// Tesseract adapter using subprocess mode
pub struct TesseractEngine {
    /// Path to the tesseract binary
    binary_path: String,

    /// Passes run per image
    page_modes: Vec<PageMode>,

    /// Lines below this confidence are dropped by the collector
    min_confidence: f64,

    /// Per-pass timeout
    pass_timeout: Duration,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TesseractEngine {
    /// Create an engine using `tesseract` from PATH
    pub fn new() -> Self {
        Self::with_binary_path("tesseract")
    }

    /// Create an engine with a custom binary path
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            page_modes: default_page_modes(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            pass_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_page_modes(mut self, page_modes: Vec<PageMode>) -> Self {
        self.page_modes = page_modes;
        self
    }

    pub fn with_min_confidence(mut self, floor: f64) -> Self {
        self.min_confidence = floor.clamp(0.0, 1.0);
        self
    }

    pub fn with_pass_timeout(mut self, pass_timeout: Duration) -> Self {
        self.pass_timeout = pass_timeout;
        self
    }

    /// Run one tesseract pass and return its TSV output
    async fn run_pass(&self, image: &ImageInput, mode: &PageMode) -> Result<String> {
        let mut args = vec!["stdin".to_string(), "stdout".to_string()];
        args.extend(mode.args());
        args.push("tsv".to_string());

        let label = format!("tesseract psm {}", mode.psm);
        let output =
            run_piped(&label, &self.binary_path, &args, &image.bytes, self.pass_timeout).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "tesseract psm {} failed with exit code {}: {}",
                mode.psm,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Words of one recognized line
struct Line<'a> {
    key: [&'a str; 4],
    words: Vec<&'a str>,
    confidence_sum: f64,
}

/// Group TSV word rows into lines scored by mean word confidence.
///
/// Columns: level, page, block, par, line, word, left, top, width, height,
/// conf (0-100, -1 for layout rows), text.
fn parse_tsv(stdout: &str) -> Vec<TextDetection> {
    let mut lines: Vec<Line<'_>> = Vec::new();

    for row in stdout.lines() {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 || fields[0] != WORD_LEVEL {
            continue;
        }
        let text = fields[11].trim();
        let Ok(confidence) = fields[10].trim().parse::<f64>() else {
            continue;
        };
        if text.is_empty() || confidence < 0.0 {
            continue;
        }

        let key = [fields[1], fields[2], fields[3], fields[4]];
        match lines.last_mut() {
            Some(line) if line.key == key => {
                line.words.push(text);
                line.confidence_sum += confidence;
            }
            _ => lines.push(Line {
                key,
                words: vec![text],
                confidence_sum: confidence,
            }),
        }
    }

    lines
        .into_iter()
        .filter_map(|line| {
            let text = line.words.join(" ");
            if text.chars().count() < MIN_LINE_LEN {
                return None;
            }
            let mean = line.confidence_sum / line.words.len() as f64;
            Some(TextDetection::new(text, (mean / 100.0).clamp(0.0, 1.0)))
        })
        .collect()
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    async fn detect(&self, image: &ImageInput) -> Result<Vec<TextDetection>> {
        let mut detections = Vec::new();
        let mut last_error = None;

        for mode in &self.page_modes {
            match self.run_pass(image, mode).await {
                Ok(stdout) => {
                    let lines = parse_tsv(&stdout);
                    debug!(psm = mode.psm, lines = lines.len(), "tesseract pass complete");
                    detections.extend(lines);
                }
                Err(e) => {
                    warn!(psm = mode.psm, error = %e, "tesseract pass failed");
                    last_error = Some(e);
                }
            }
        }

        // Only an engine that failed every pass is reported as failed
        match last_error {
            Some(e) if detections.is_empty() => Err(e),
            _ => Ok(detections),
        }
    }
}
