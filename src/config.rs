//! Configuration for partscout.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (OPENAI_API_KEY, EBAY_APP_ID, AMAZON_ASSOCIATE_TAG,
//!    PARTSCOUT_CATALOG, PARTSCOUT_CLASSIFIER_URL)
//! 2. Config file (.partscout/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .partscout/config.yaml
//! - Falls back to ~/.partscout/config.yaml
//! - Paths in config file are relative to the directory holding .partscout/
//!
//! Settings are loaded once by the binary and handed to the orchestrator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::tesseract::{default_page_modes, PageMode, DEFAULT_MIN_CONFIDENCE};
use crate::core::InputLimits;

const CONFIG_DIR: &str = ".partscout";
const CONFIG_FILE: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default = "default_preprocessing")]
    pub preprocessing: Vec<PreprocessStep>,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub shopping: ShoppingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Path to the tesseract binary
    pub binary: String,
    /// One tesseract pass per entry
    pub page_modes: Vec<PageMode>,
    /// Lines whose mean word confidence is below this are discarded
    pub min_confidence: f64,
    pub pass_timeout_seconds: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            page_modes: default_page_modes(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            pass_timeout_seconds: 30,
        }
    }
}

/// External command producing one preprocessing variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessStep {
    pub name: String,
    /// Program followed by its arguments
    pub command: Vec<String>,
}

impl PreprocessStep {
    fn magick(name: &str, ops: &[&str]) -> Self {
        let mut command = vec!["magick".to_string(), "-".to_string()];
        command.extend(["-colorspace", "Gray"].iter().map(|s| s.to_string()));
        command.extend(ops.iter().map(|s| s.to_string()));
        command.push("png:-".to_string());
        Self {
            name: name.to_string(),
            command,
        }
    }
}

/// ImageMagick variants: contrast, denoise, adaptive threshold,
/// morphological close and edge emphasis. Set `preprocessing: []` to
/// run OCR on the original image only.
pub fn default_preprocessing() -> Vec<PreprocessStep> {
    vec![
        PreprocessStep::magick("contrast", &["-clahe", "25x25%+128+3"]),
        PreprocessStep::magick("denoise", &["-statistic", "Median", "3x3"]),
        PreprocessStep::magick("threshold", &["-lat", "15x15-5%"]),
        PreprocessStep::magick("close", &["-morphology", "Close", "Square:1"]),
        PreprocessStep::magick("edges", &["-unsharp", "0x2+1.5+0"]),
    ]
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: None,
            ocr: OcrConfig::default(),
            preprocessing: default_preprocessing(),
            classifier: ClassifierConfig::default(),
            vision: VisionConfig::default(),
            catalog: CatalogConfig::default(),
            shopping: ShoppingConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Prediction endpoint of the model server
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub api_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Parts catalog YAML (relative to the project root)
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShoppingConfig {
    pub provider_timeout_seconds: u64,
    #[serde(skip_serializing)]
    pub ebay_app_id: Option<String>,
    /// Appended to Amazon listing links
    pub amazon_associate_tag: Option<String>,
    /// Fetch storefront search links before listing them
    pub verify_storefronts: bool,
}

impl Default for ShoppingConfig {
    fn default() -> Self {
        Self {
            provider_timeout_seconds: 20,
            ebay_app_id: None,
            amazon_associate_tag: None,
            verify_storefronts: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_image_bytes: usize,
    /// Timeout for the classifier, vision and catalog calls
    pub service_timeout_seconds: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: InputLimits::default().max_image_bytes,
            service_timeout_seconds: 30,
        }
    }
}

/// Resolved configuration with absolute paths and env overrides applied
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub ocr: OcrConfig,
    pub preprocessing: Vec<PreprocessStep>,
    pub classifier_url: Option<String>,
    pub vision: VisionConfig,
    pub catalog_path: Option<PathBuf>,
    pub shopping: ShoppingConfig,
    pub limits: LimitsConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self::resolve(None, ConfigFile::default(), |_| None)
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        let config_file = find_config_file();
        let file = match &config_file {
            Some(path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };

        Ok(Self::resolve(config_file, file, env_var))
    }

    /// Combine a parsed file with overrides looked up through `env`
    pub fn resolve(
        config_file: Option<PathBuf>,
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        // Base directory is the parent of .partscout/ (i.e., grandparent of config.yaml)
        let base_dir = config_file
            .as_deref()
            .and_then(Path::parent)
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let catalog_path = env("PARTSCOUT_CATALOG")
            .map(PathBuf::from)
            .or_else(|| file.catalog.path.as_deref().map(|p| resolve_path(&base_dir, p)));

        let classifier_url = env("PARTSCOUT_CLASSIFIER_URL").or(file.classifier.url);

        let mut vision = file.vision;
        if let Some(key) = env("OPENAI_API_KEY") {
            vision.api_key = Some(key);
        }

        let mut shopping = file.shopping;
        if let Some(app_id) = env("EBAY_APP_ID") {
            shopping.ebay_app_id = Some(app_id);
        }
        if let Some(tag) = env("AMAZON_ASSOCIATE_TAG") {
            shopping.amazon_associate_tag = Some(tag);
        }

        Self {
            config_file,
            ocr: file.ocr,
            preprocessing: file.preprocessing,
            classifier_url,
            vision,
            catalog_path,
            shopping,
            limits: file.limits,
        }
    }

    pub fn input_limits(&self) -> InputLimits {
        InputLimits {
            max_image_bytes: self.limits.max_image_bytes,
        }
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.service_timeout_seconds)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.shopping.provider_timeout_seconds)
    }

    pub fn ocr_pass_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr.pass_timeout_seconds)
    }
}

/// Non-empty environment variable
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Search `start` and its parents for .partscout/config.yaml
fn find_config_file_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Find config file from the current directory, then the home directory
fn find_config_file() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| find_config_file_from(&cwd))
        .or_else(|| {
            let path = dirs::home_dir()?.join(CONFIG_DIR).join(CONFIG_FILE);
            path.exists().then_some(path)
        })
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(root: &Path, body: &str) -> PathBuf {
        let dir = root.join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", body).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::default();
        assert!(settings.config_file.is_none());
        assert_eq!(settings.ocr.binary, "tesseract");
        assert_eq!(settings.ocr.page_modes.len(), 4);
        assert_eq!(settings.provider_timeout(), Duration::from_secs(20));
        assert!(settings.catalog_path.is_none());
        assert!(settings.classifier_url.is_none());
        assert_eq!(settings.ocr.min_confidence, DEFAULT_MIN_CONFIDENCE);

        let names: Vec<_> = settings.preprocessing.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["contrast", "denoise", "threshold", "close", "edges"]);
        assert!(settings
            .preprocessing
            .iter()
            .all(|s| s.command.first().map(String::as_str) == Some("magick")));
    }

    #[test]
    fn test_preprocessing_defaults_and_opt_out() {
        let file: ConfigFile = serde_yaml::from_str("version: \"1.0\"").unwrap();
        assert_eq!(file.preprocessing.len(), 5);
        assert_eq!(file.ocr.min_confidence, DEFAULT_MIN_CONFIDENCE);

        let file: ConfigFile = serde_yaml::from_str("preprocessing: []").unwrap();
        assert!(file.preprocessing.is_empty());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            temp.path(),
            r#"
version: "1.0"
ocr:
  binary: /usr/local/bin/tesseract
  page_modes:
    - { psm: 7 }
    - { psm: 6, whitelist: true }
  min_confidence: 0.3
preprocessing:
  - name: threshold
    command: [convert, "-", -threshold, "50%", "-"]
catalog:
  path: data/parts.yaml
shopping:
  provider_timeout_seconds: 15
  verify_storefronts: true
limits:
  max_image_bytes: 1048576
"#,
        );

        let file = load_config_file(&path).unwrap();
        assert_eq!(file.version.as_deref(), Some("1.0"));
        assert_eq!(file.ocr.page_modes[0], PageMode { psm: 7, whitelist: false });
        assert_eq!(file.ocr.min_confidence, 0.3);
        assert_eq!(file.preprocessing.len(), 1);
        assert_eq!(file.preprocessing[0].command[0], "convert");
        assert!(file.shopping.verify_storefronts);
        assert_eq!(file.limits.service_timeout_seconds, 30);

        let settings = Settings::resolve(Some(path), file, |_| None);
        assert_eq!(
            settings.catalog_path,
            Some(temp.path().join("data/parts.yaml"))
        );
        assert_eq!(settings.input_limits().max_image_bytes, 1_048_576);
        assert_eq!(settings.provider_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            temp.path(),
            r#"
classifier:
  url: http://localhost:8001/predict
catalog:
  path: parts.yaml
"#,
        );
        let file = load_config_file(&path).unwrap();

        let env: HashMap<&str, &str> = [
            ("PARTSCOUT_CATALOG", "/srv/catalog.yaml"),
            ("PARTSCOUT_CLASSIFIER_URL", "http://model:9000/predict"),
            ("OPENAI_API_KEY", "sk-test"),
            ("EBAY_APP_ID", "app-123"),
            ("AMAZON_ASSOCIATE_TAG", "partscout-20"),
        ]
        .into_iter()
        .collect();

        let settings =
            Settings::resolve(Some(path), file, |name| env.get(name).map(|v| v.to_string()));
        assert_eq!(settings.catalog_path, Some(PathBuf::from("/srv/catalog.yaml")));
        assert_eq!(settings.classifier_url.as_deref(), Some("http://model:9000/predict"));
        assert_eq!(settings.vision.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.shopping.ebay_app_id.as_deref(), Some("app-123"));
        assert_eq!(
            settings.shopping.amazon_associate_tag.as_deref(),
            Some("partscout-20")
        );
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "version: \"1.0\"");
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config_file_from(&nested), Some(path));
    }

    #[test]
    fn test_secrets_not_serialized() {
        let vision = VisionConfig {
            api_key: Some("sk-secret".to_string()),
            ..VisionConfig::default()
        };
        let yaml = serde_yaml::to_string(&vision).unwrap();
        assert!(!yaml.contains("sk-secret"));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "data/parts.yaml"),
            PathBuf::from("/home/user/project/data/parts.yaml")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
