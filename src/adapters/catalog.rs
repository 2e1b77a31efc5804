//! Compatibility database backed by a YAML file.
//!
//! The file maps part numbers to records:
//!
//! ```yaml
//! 90915-YZZD4:
//!   name: Toyota OEM Oil Filter
//!   category: Engine
//!   compatibility:
//!     - { make: Toyota, model: Camry, years: 2018-2023, engines: [2.5L 4cyl], confidence: 0.98 }
//! ```
//!
//! Lookups try the cleaned key exactly, then fall back to fuzzy matching
//! over a few rewrites of the key.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::PartsCatalog;
use crate::domain::{DbMatch, MatchStrategy, PartRecord};

pub const EXACT_CONFIDENCE: f64 = 0.95;
pub const FUZZY_CONFIDENCE: f64 = 0.75;

/// Minimum similarity for a fuzzy hit
const FUZZY_THRESHOLD: f64 = 0.8;

/// Keys shorter than this are only matched exactly
const MIN_FUZZY_LEN: usize = 4;

/// Uppercase, drop whitespace and anything that is not a word character or hyphen
pub fn clean_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Similarity between two part numbers in [0, 1]
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_uppercase();
    let b = b.to_uppercase();

    if a == b {
        return 1.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 0.9;
    }

    let set_a: BTreeSet<char> = a.chars().collect();
    let set_b: BTreeSet<char> = b.chars().collect();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    set_a.intersection(&set_b).count() as f64 / union as f64
}

/// Rewrites of a key tried during fuzzy matching
fn fuzzy_variants(key: &str) -> Vec<String> {
    let mut variants = vec![key.replace('-', ""), key.replace('_', ""), key.to_string()];
    for prefix in ["AC", "FL", "PF"] {
        if let Some(rest) = key.strip_prefix(prefix) {
            variants.push(rest.trim_start_matches('-').to_string());
        }
    }
    variants.retain(|v| v.len() >= MIN_FUZZY_LEN);
    variants.dedup();
    variants
}

/// Parts catalog held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    records: BTreeMap<String, PartRecord>,
}

impl InMemoryCatalog {
    pub fn new(records: impl IntoIterator<Item = (String, PartRecord)>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|(key, record)| (clean_key(&key), record))
                .collect(),
        }
    }

    /// Load records from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read parts catalog: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse parts catalog: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let records: BTreeMap<String, PartRecord> =
            serde_yaml::from_str(content).context("Invalid parts catalog YAML")?;
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Exact, then fuzzy lookup
    pub fn find(&self, query: &str) -> Option<DbMatch> {
        let key = clean_key(query);
        if key.is_empty() {
            return None;
        }

        if let Some(record) = self.records.get(&key) {
            return Some(DbMatch {
                key,
                query: query.to_string(),
                record: record.clone(),
                confidence: EXACT_CONFIDENCE,
                strategy: MatchStrategy::Exact,
            });
        }

        for variant in fuzzy_variants(&key) {
            for (db_key, record) in &self.records {
                let score = similarity(&variant, db_key);
                if score > FUZZY_THRESHOLD {
                    debug!(query, matched = %db_key, score, "Fuzzy catalog match");
                    return Some(DbMatch {
                        key: db_key.clone(),
                        query: query.to_string(),
                        record: PartRecord {
                            name: format!("{} (Similar to {})", record.name, query),
                            ..record.clone()
                        },
                        confidence: FUZZY_CONFIDENCE,
                        strategy: MatchStrategy::Fuzzy,
                    });
                }
            }
        }

        None
    }
}

#[async_trait]
impl PartsCatalog for InMemoryCatalog {
    fn name(&self) -> &str {
        "catalog"
    }

    async fn lookup(&self, key: &str) -> Result<Option<DbMatch>> {
        Ok(self.find(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
90915-YZZD4:
  name: Toyota OEM Oil Filter
  category: Engine
  compatibility:
    - { make: Toyota, model: Camry, years: 2018-2023, engines: [2.5L 4cyl], confidence: 0.98 }
  interchangeable:
    - { part_number: PH3593A, brand: FRAM, type: Aftermarket, price_range: "$6-10" }
  specifications:
    thread: 3/4-16
AC-PF52:
  name: AC Delco Oil Filter PF52
  category: Engine
"#;

    #[test]
    fn test_clean_key() {
        assert_eq!(clean_key(" 90915 yzzd4 "), "90915YZZD4");
        assert_eq!(clean_key("fl-820-s!"), "FL-820-S");
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("PF52", "pf52"), 1.0);
        assert_eq!(similarity("PF52", "AC-PF52"), 0.9);
        assert!(similarity("ABCD", "WXYZ") < 0.01);
    }

    #[test]
    fn test_exact_lookup() {
        let catalog = InMemoryCatalog::from_yaml(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 2);

        let hit = catalog.find("90915-yzzd4").unwrap();
        assert_eq!(hit.strategy, MatchStrategy::Exact);
        assert_eq!(hit.confidence, EXACT_CONFIDENCE);
        assert_eq!(hit.record.interchangeable[0].kind, "Aftermarket");
        assert_eq!(hit.record.specifications["thread"], "3/4-16");
    }

    #[test]
    fn test_fuzzy_lookup_strips_prefix() {
        let catalog = InMemoryCatalog::from_yaml(SAMPLE).unwrap();

        let hit = catalog.find("ACPF52").unwrap();
        assert_eq!(hit.key, "AC-PF52");
        assert_eq!(hit.strategy, MatchStrategy::Fuzzy);
        assert_eq!(hit.confidence, FUZZY_CONFIDENCE);
        assert!(hit.record.name.contains("Similar to ACPF52"));
    }

    #[test]
    fn test_short_keys_are_exact_only() {
        let catalog = InMemoryCatalog::from_yaml(SAMPLE).unwrap();
        assert!(catalog.find("AC").is_none());
        assert!(catalog.find("").is_none());
    }

    #[test]
    fn test_bundled_catalog_parses() {
        let catalog = InMemoryCatalog::from_yaml(include_str!("../../data/parts.yaml")).unwrap();
        assert_eq!(catalog.len(), 3);

        let hit = catalog.find("PF52").unwrap();
        assert_eq!(hit.record.compatibility.len(), 3);
        assert_eq!(hit.record.interchangeable[0].part_number, "51515");
    }

    #[test]
    fn test_unrelated_key_misses() {
        let catalog = InMemoryCatalog::from_yaml(SAMPLE).unwrap();
        assert!(catalog.find("HONDA").is_none());
    }
}
