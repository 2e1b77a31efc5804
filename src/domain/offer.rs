//! Shopping listings and the aggregate report built from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single listing returned by a shopping provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub title: String,
    /// Free-text price as shown by the store ("$8-12", "Call for price")
    pub price: String,
    pub url: String,
    pub availability: String,
    pub store: String,
}

/// How one provider's query settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProviderStatus {
    Ok,
    Failed { error: String },
    TimedOut,
}

/// Statistics over every parseable listing price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub range: f64,
    /// Number of prices that parsed
    pub count: usize,
}

impl PriceStats {
    /// Compute statistics, or `None` when no price is available
    pub fn from_prices(prices: &[f64]) -> Option<Self> {
        if prices.is_empty() {
            return None;
        }

        let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
        let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = prices.iter().sum::<f64>() / prices.len() as f64;

        Some(Self {
            min,
            max,
            mean,
            range: max - min,
            count: prices.len(),
        })
    }
}

/// Combined result of querying every configured provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub search_term: String,

    /// One entry per requested provider, empty when it failed
    pub per_provider: BTreeMap<String, Vec<ProviderResult>>,

    /// Settlement state of each provider
    pub statuses: BTreeMap<String, ProviderStatus>,

    /// Absent when no listing carried a parseable price
    pub price_stats: Option<PriceStats>,

    pub total_listings: usize,

    pub searched_at: DateTime<Utc>,
}

impl AggregateReport {
    /// Providers that settled without error
    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.statuses
            .iter()
            .filter(|(_, status)| matches!(status, ProviderStatus::Ok))
            .map(|(name, _)| name.as_str())
    }
}
