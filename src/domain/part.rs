//! Compatibility database records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A vehicle the part is known to fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fitment {
    pub make: String,
    pub model: String,
    pub years: String,
    #[serde(default)]
    pub engines: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub notes: String,
}

/// A part that can be substituted for the looked-up one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interchange {
    pub part_number: String,
    pub brand: String,
    /// OEM, Aftermarket, ...
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub price_range: String,
}

/// Catalog entry for one part number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub compatibility: Vec<Fitment>,
    #[serde(default)]
    pub interchangeable: Vec<Interchange>,
    #[serde(default)]
    pub specifications: BTreeMap<String, String>,
}
