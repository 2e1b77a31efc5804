//! Preprocessing variants produced by external image tools.
//!
//! A variant is any command that reads an encoded image on stdin and writes
//! the transformed image to stdout, e.g. ImageMagick:
//! `magick - -colorspace Gray -contrast-stretch 2% png:-`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::subprocess::run_piped;
use super::Preprocessor;
use crate::domain::{ImageFormat, ImageInput};

/// Preprocessor backed by a subprocess
pub struct CommandPreprocessor {
    name: String,
    program: String,
    args: Vec<String>,
    step_timeout: Duration,
}

impl CommandPreprocessor {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            step_timeout: Duration::from_secs(20),
        }
    }

    /// Build from an argv list; the first element is the program
    pub fn from_command(name: impl Into<String>, command: &[String]) -> Result<Self> {
        let name = name.into();
        let (program, args) = command
            .split_first()
            .with_context(|| format!("Preprocessing step '{}' has an empty command", name))?;
        Ok(Self::new(name, program.clone(), args.to_vec()))
    }

    pub fn with_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }
}

#[async_trait]
impl Preprocessor for CommandPreprocessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, image: &ImageInput) -> Result<ImageInput> {
        let label = format!("preprocessor '{}'", self.name);
        let output =
            run_piped(&label, &self.program, &self.args, &image.bytes, self.step_timeout).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Preprocessor '{}' failed with exit code {}: {}",
                self.name,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        let format = ImageFormat::sniff(&output.stdout).with_context(|| {
            format!("Preprocessor '{}' did not produce a recognizable image", self.name)
        })?;

        Ok(ImageInput::new(output.stdout, format))
    }
}
