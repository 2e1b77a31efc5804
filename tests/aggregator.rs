//! Provider aggregation: failure isolation, timeouts and price statistics.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;

use partscout::adapters::ShoppingProvider;
use partscout::core::ProviderAggregator;
use partscout::domain::{ProviderResult, ProviderStatus};

enum Behavior {
    Listings(Vec<&'static str>),
    Fail,
    Hang,
    Panic,
}

struct FakeProvider {
    name: &'static str,
    behavior: Behavior,
}

impl FakeProvider {
    fn new(name: &'static str, behavior: Behavior) -> Arc<dyn ShoppingProvider> {
        Arc::new(Self { name, behavior })
    }
}

#[async_trait]
impl ShoppingProvider for FakeProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn search(&self, term: &str) -> Result<Vec<ProviderResult>> {
        match &self.behavior {
            Behavior::Listings(prices) => Ok(prices
                .iter()
                .map(|price| ProviderResult {
                    title: format!("{} at {}", term, self.name),
                    price: price.to_string(),
                    url: format!("https://{}.example/search", self.name.to_lowercase()),
                    availability: "In stock".to_string(),
                    store: self.name.to_string(),
                })
                .collect()),
            Behavior::Fail => anyhow::bail!("{} returned 503 Service Unavailable", self.name),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Vec::new())
            }
            Behavior::Panic => panic!("provider bug"),
        }
    }
}

#[tokio::test]
async fn test_three_fail_three_succeed() {
    let providers = vec![
        FakeProvider::new("eBay", Behavior::Listings(vec!["$8-12"])),
        FakeProvider::new("Amazon", Behavior::Fail),
        FakeProvider::new("AutoZone", Behavior::Listings(vec!["Call for price"])),
        FakeProvider::new("RockAuto", Behavior::Fail),
        FakeProvider::new("Advance Auto", Behavior::Listings(vec!["$15.00"])),
        FakeProvider::new("O'Reilly", Behavior::Fail),
    ];
    let aggregator = ProviderAggregator::new(providers, Duration::from_secs(5)).unwrap();

    let report = aggregator.aggregate("90915-YZZD4").await;

    assert_eq!(report.per_provider.len(), 6);
    assert_eq!(report.statuses.len(), 6);
    let empty = report.per_provider.values().filter(|l| l.is_empty()).count();
    assert_eq!(empty, 3);
    for store in ["Amazon", "RockAuto", "O'Reilly"] {
        assert!(report.per_provider[store].is_empty());
        assert!(matches!(report.statuses[store], ProviderStatus::Failed { .. }));
    }
    assert_eq!(report.per_provider["eBay"].len(), 1);
    assert_eq!(report.total_listings, 3);

    let stats = report.price_stats.as_ref().expect("two prices parse");
    assert_eq!(stats.count, 2);
    assert_eq!(stats.min, 8.0);
    assert_eq!(stats.max, 15.0);
    assert_eq!(stats.range, 7.0);
    assert!((stats.mean - 11.5).abs() < 1e-9);

    let mut ok: Vec<_> = report.succeeded().collect();
    ok.sort();
    assert_eq!(ok, vec!["Advance Auto", "AutoZone", "eBay"]);
}

#[tokio::test]
async fn test_timeout_isolated_to_one_provider() {
    let providers = vec![
        FakeProvider::new("Slow", Behavior::Hang),
        FakeProvider::new("Fast", Behavior::Listings(vec!["$20.00"])),
    ];
    let aggregator = ProviderAggregator::new(providers, Duration::from_millis(100)).unwrap();

    let started = Instant::now();
    let report = aggregator.aggregate("PF52").await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.statuses["Slow"], ProviderStatus::TimedOut);
    assert!(report.per_provider["Slow"].is_empty());
    assert_eq!(report.statuses["Fast"], ProviderStatus::Ok);
    assert_eq!(report.price_stats.unwrap().mean, 20.0);
}

#[tokio::test]
async fn test_panicking_provider_is_contained() {
    let providers = vec![
        FakeProvider::new("Broken", Behavior::Panic),
        FakeProvider::new("Healthy", Behavior::Listings(vec!["$9.99", "$12.49"])),
    ];
    let aggregator = ProviderAggregator::new(providers, Duration::from_secs(5)).unwrap();

    let report = aggregator.aggregate("FL-820-S").await;

    assert!(matches!(report.statuses["Broken"], ProviderStatus::Failed { .. }));
    assert!(report.per_provider["Broken"].is_empty());
    assert_eq!(report.per_provider["Healthy"].len(), 2);
}

#[tokio::test]
async fn test_no_parseable_prices_means_no_stats() {
    let providers = vec![
        FakeProvider::new("A", Behavior::Listings(vec!["Call for price", "See listing"])),
        FakeProvider::new("B", Behavior::Fail),
    ];
    let aggregator = ProviderAggregator::new(providers, Duration::from_secs(5)).unwrap();

    let report = aggregator.aggregate("PF52").await;

    assert!(report.price_stats.is_none());
    assert_eq!(report.per_provider["A"].len(), 2);
}

#[tokio::test]
async fn test_every_provider_fails() {
    let providers = vec![
        FakeProvider::new("A", Behavior::Fail),
        FakeProvider::new("B", Behavior::Fail),
    ];
    let aggregator = ProviderAggregator::new(providers, Duration::from_secs(5)).unwrap();

    let report = aggregator.aggregate("PF52").await;

    assert_eq!(report.per_provider.len(), 2);
    assert_eq!(report.total_listings, 0);
    assert!(report.price_stats.is_none());
    assert_eq!(report.succeeded().count(), 0);
}
