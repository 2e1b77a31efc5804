//! Concurrent shopping-provider aggregation.
//!
//! One task per provider is spawned on the runtime, each under its own
//! timeout. A provider that errors, panics or times out yields an empty
//! listing and a non-`Ok` status; siblings are never cancelled. The report
//! is composed only after every task has settled.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use regex::Regex;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::adapters::ShoppingProvider;
use crate::domain::{AggregateReport, PriceStats, ProviderResult, ProviderStatus};

/// Per-provider timeout when none is configured
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregatorError {
    #[error("Provider registered twice: {0}")]
    DuplicateProvider(String),
}

/// First numeric token of a free-text price.
///
/// Currency symbols and thousands separators are dropped first, so
/// `"$1,299.99"` parses as 1299.99 and `"$8-12"` as 8.
pub fn parse_price(text: &str) -> Option<f64> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let number = NUMBER.get_or_init(|| Regex::new(r"\d+\.?\d*").expect("price pattern is valid"));

    let cleaned = text.replace(['$', ','], "");
    number.find(&cleaned)?.as_str().parse().ok()
}

/// Fans a search term out to every provider
#[derive(Clone)]
pub struct ProviderAggregator {
    providers: Vec<Arc<dyn ShoppingProvider>>,
    per_provider_timeout: Duration,
}

impl std::fmt::Debug for ProviderAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAggregator")
            .field("providers", &self.provider_names())
            .field("per_provider_timeout", &self.per_provider_timeout)
            .finish()
    }
}

impl ProviderAggregator {
    /// Provider names are report keys and must be unique
    pub fn new(
        providers: Vec<Arc<dyn ShoppingProvider>>,
        per_provider_timeout: Duration,
    ) -> Result<Self, AggregatorError> {
        let mut seen = BTreeSet::new();
        for provider in &providers {
            if !seen.insert(provider.name().to_string()) {
                return Err(AggregatorError::DuplicateProvider(provider.name().to_string()));
            }
        }

        Ok(Self {
            providers,
            per_provider_timeout,
        })
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn per_provider_timeout(&self) -> Duration {
        self.per_provider_timeout
    }

    /// Query every provider and wait for all of them to settle
    #[instrument(skip(self), fields(providers = self.providers.len()))]
    pub async fn aggregate(&self, term: &str) -> AggregateReport {
        let tasks = self.providers.iter().map(|provider| {
            let name = provider.name().to_string();
            let provider = Arc::clone(provider);
            let term = term.to_string();
            let limit = self.per_provider_timeout;

            let handle = tokio::spawn(async move { timeout(limit, provider.search(&term)).await });

            async move {
                let (listings, status) = match handle.await {
                    Ok(Ok(Ok(listings))) => {
                        debug!(provider = %name, count = listings.len(), "Provider settled");
                        (listings, ProviderStatus::Ok)
                    }
                    Ok(Ok(Err(e))) => {
                        warn!(provider = %name, error = %e, "Provider failed");
                        (Vec::new(), ProviderStatus::Failed { error: e.to_string() })
                    }
                    Ok(Err(_)) => {
                        warn!(provider = %name, timeout = ?limit, "Provider timed out");
                        (Vec::new(), ProviderStatus::TimedOut)
                    }
                    Err(e) => {
                        warn!(provider = %name, error = %e, "Provider task aborted");
                        (Vec::new(), ProviderStatus::Failed { error: e.to_string() })
                    }
                };
                (name, listings, status)
            }
        });

        let settled = join_all(tasks).await;

        let mut per_provider = BTreeMap::new();
        let mut statuses = BTreeMap::new();
        for (name, listings, status) in settled {
            per_provider.insert(name.clone(), listings);
            statuses.insert(name, status);
        }

        build_report(term, per_provider, statuses)
    }
}

/// Compose the report and its price statistics
fn build_report(
    term: &str,
    per_provider: BTreeMap<String, Vec<ProviderResult>>,
    statuses: BTreeMap<String, ProviderStatus>,
) -> AggregateReport {
    let prices: Vec<f64> = per_provider
        .values()
        .flatten()
        .filter_map(|listing| parse_price(&listing.price))
        .collect();
    let total_listings = per_provider.values().map(Vec::len).sum();

    let price_stats = PriceStats::from_prices(&prices);
    info!(
        term,
        total_listings,
        priced = prices.len(),
        failed = statuses.values().filter(|s| **s != ProviderStatus::Ok).count(),
        "Offers aggregated"
    );

    AggregateReport {
        search_term: term.to_string(),
        per_provider,
        statuses,
        price_stats,
        total_listings,
        searched_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl ShoppingProvider for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn search(&self, term: &str) -> Result<Vec<ProviderResult>> {
            Ok(vec![ProviderResult {
                title: format!("{} {}", self.0, term),
                price: "$10.00".to_string(),
                url: "https://example.com".to_string(),
                availability: "In stock".to_string(),
                store: self.0.to_string(),
            }])
        }
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("$8-12"), Some(8.0));
        assert_eq!(parse_price("$15.00"), Some(15.0));
        assert_eq!(parse_price("$1,299.99"), Some(1299.99));
        assert_eq!(parse_price("From 24.5 USD"), Some(24.5));
        assert_eq!(parse_price("Call for price"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let providers: Vec<Arc<dyn ShoppingProvider>> =
            vec![Arc::new(Named("eBay")), Arc::new(Named("eBay"))];
        let err = ProviderAggregator::new(providers, DEFAULT_PROVIDER_TIMEOUT).unwrap_err();
        assert_eq!(err, AggregatorError::DuplicateProvider("eBay".to_string()));
    }

    #[tokio::test]
    async fn test_single_provider_report() {
        let providers: Vec<Arc<dyn ShoppingProvider>> = vec![Arc::new(Named("AutoZone"))];
        let aggregator = ProviderAggregator::new(providers, DEFAULT_PROVIDER_TIMEOUT).unwrap();

        let report = aggregator.aggregate("PF52").await;
        assert_eq!(report.search_term, "PF52");
        assert_eq!(report.total_listings, 1);
        assert_eq!(report.statuses["AutoZone"], ProviderStatus::Ok);
        assert_eq!(report.price_stats.unwrap().min, 10.0);
    }

    #[tokio::test]
    async fn test_no_providers_reports_nothing() {
        let aggregator = ProviderAggregator::new(vec![], DEFAULT_PROVIDER_TIMEOUT).unwrap();
        let report = aggregator.aggregate("PF52").await;
        assert!(report.per_provider.is_empty());
        assert!(report.price_stats.is_none());
    }
}
