//! Shopping providers.
//!
//! Six retail sources are supported. eBay, Amazon and AutoZone search pages
//! are fetched and their result markup parsed into priced listings; eBay
//! prefers the Finding API when an application id is configured and falls
//! back to its search page when the API call fails. RockAuto, Advance Auto
//! and O'Reilly render results client-side, so they yield one search-link
//! listing each; with verification on, the link is fetched first and a
//! non-success status fails the provider.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use super::ShoppingProvider;
use crate::domain::ProviderResult;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

const EBAY_FINDING_URL: &str = "https://svcs.ebay.com/services/search/FindingService/v1";

/// Retail sources with a public search page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storefront {
    Ebay,
    Amazon,
    AutoZone,
    RockAuto,
    AdvanceAuto,
    OReilly,
}

impl Storefront {
    pub const ALL: [Storefront; 6] = [
        Storefront::Ebay,
        Storefront::Amazon,
        Storefront::AutoZone,
        Storefront::RockAuto,
        Storefront::AdvanceAuto,
        Storefront::OReilly,
    ];

    /// Report key for this store
    pub fn name(&self) -> &'static str {
        match self {
            Storefront::Ebay => "eBay",
            Storefront::Amazon => "Amazon",
            Storefront::AutoZone => "AutoZone",
            Storefront::RockAuto => "RockAuto",
            Storefront::AdvanceAuto => "Advance Auto",
            Storefront::OReilly => "O'Reilly",
        }
    }

    /// Store name as shown on listings
    pub fn display_name(&self) -> &'static str {
        match self {
            Storefront::Ebay => "eBay Motors",
            Storefront::Amazon => "Amazon Auto",
            Storefront::AutoZone => "AutoZone",
            Storefront::RockAuto => "RockAuto",
            Storefront::AdvanceAuto => "Advance Auto Parts",
            Storefront::OReilly => "O'Reilly Auto Parts",
        }
    }

    /// Search page URL for a term
    pub fn search_url(&self, term: &str) -> Result<Url> {
        let (base, params): (&str, Vec<(&str, String)>) = match self {
            Storefront::Ebay => (
                "https://www.ebay.com/sch/i.html",
                vec![("_nkw", term.to_string()), ("_sacat", "6030".to_string())],
            ),
            Storefront::Amazon => (
                "https://www.amazon.com/s",
                vec![
                    ("k", format!("{} automotive part", term)),
                    ("rh", "n:15684181".to_string()),
                ],
            ),
            Storefront::AutoZone => (
                "https://www.autozone.com/search",
                vec![("searchText", term.to_string())],
            ),
            Storefront::RockAuto => (
                "https://www.rockauto.com/en/search/",
                vec![("searchtype", "partnumber".to_string()), ("q", term.to_string())],
            ),
            Storefront::AdvanceAuto => (
                "https://shop.advanceautoparts.com/find/search",
                vec![("q", term.to_string())],
            ),
            Storefront::OReilly => (
                "https://www.oreillyauto.com/search",
                vec![("q", term.to_string())],
            ),
        };

        Url::parse_with_params(base, &params)
            .with_context(|| format!("Failed to build {} search URL", self.name()))
    }

    fn price_hint(&self) -> &'static str {
        match self {
            Storefront::Ebay => "Auction & Buy Now",
            Storefront::Amazon => "Prime pricing",
            Storefront::AutoZone => "Check prices online",
            Storefront::RockAuto => "Wholesale prices",
            Storefront::AdvanceAuto => "Competitive pricing",
            Storefront::OReilly => "Great prices",
        }
    }

    fn availability(&self) -> &'static str {
        match self {
            Storefront::Ebay => "New & used, global sellers",
            Storefront::Amazon => "Fast Prime delivery",
            Storefront::AutoZone => "Free store pickup, same day",
            Storefront::RockAuto => "Huge selection, catalog parts",
            Storefront::AdvanceAuto => "Professional installation available",
            Storefront::OReilly => "Same day pickup, expert advice",
        }
    }
}

/// Shared HTTP client for provider traffic
pub fn build_client(request_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(request_timeout)
        .build()
        .context("Failed to build shopping HTTP client")
}

/// Search-link provider for one storefront
pub struct StorefrontProvider {
    storefront: Storefront,
    /// Present when links are verified before being listed
    verify_with: Option<reqwest::Client>,
}

impl StorefrontProvider {
    pub fn new(storefront: Storefront) -> Self {
        Self {
            storefront,
            verify_with: None,
        }
    }

    pub fn verified(storefront: Storefront, client: reqwest::Client) -> Self {
        Self {
            storefront,
            verify_with: Some(client),
        }
    }

    fn listing(&self, term: &str, url: Url) -> ProviderResult {
        ProviderResult {
            title: format!("{} - Search {}", self.storefront.display_name(), term),
            price: self.storefront.price_hint().to_string(),
            url: url.to_string(),
            availability: self.storefront.availability().to_string(),
            store: self.storefront.display_name().to_string(),
        }
    }
}

#[async_trait]
impl ShoppingProvider for StorefrontProvider {
    fn name(&self) -> &str {
        self.storefront.name()
    }

    async fn search(&self, term: &str) -> Result<Vec<ProviderResult>> {
        let url = self.storefront.search_url(term)?;

        if let Some(client) = &self.verify_with {
            let response = client
                .get(url.clone())
                .send()
                .await
                .with_context(|| format!("Failed to reach {}", self.storefront.name()))?;

            if !response.status().is_success() {
                anyhow::bail!("{} returned {}", self.storefront.name(), response.status());
            }
        }

        Ok(vec![self.listing(term, url)])
    }
}

/// Where listings sit in a store's search-result markup
pub struct ListingLayout {
    pub store: &'static str,
    /// One element per result
    pub item: &'static str,
    /// Tried in order inside each item
    pub title: &'static [&'static str],
    pub price: &'static [&'static str],
    pub link: &'static str,
    /// Prefix for relative hrefs
    pub origin: &'static str,
    /// Results kept per page
    pub limit: usize,
    /// Price text when none is shown; `None` drops unpriced items
    pub missing_price: Option<&'static str>,
    /// Promotional tiles carrying these titles are skipped
    pub skip_titles: &'static [&'static str],
    pub availability: &'static str,
}

pub const EBAY_LAYOUT: ListingLayout = ListingLayout {
    store: "eBay",
    item: "div.s-item__wrapper",
    title: &["h3.s-item__title", "div.s-item__title"],
    price: &["span.s-item__price"],
    link: "a.s-item__link",
    origin: "https://www.ebay.com",
    limit: 8,
    missing_price: None,
    skip_titles: &["Shop on eBay"],
    availability: "In Stock",
};

pub const AMAZON_LAYOUT: ListingLayout = ListingLayout {
    store: "Amazon",
    item: r#"div[data-component-type="s-search-result"]"#,
    title: &["h2.s-size-mini", "span.a-text-normal", "h2"],
    price: &["span.a-price-whole", "span.a-offscreen"],
    link: "h2 a",
    origin: "https://www.amazon.com",
    limit: 6,
    missing_price: None,
    skip_titles: &[],
    availability: "Prime eligible",
};

pub const AUTOZONE_LAYOUT: ListingLayout = ListingLayout {
    store: "AutoZone",
    item: "div.search-result-item",
    title: &["h3", "a.product-name"],
    price: &["span.price", "span.sale-price"],
    link: "a",
    origin: "https://www.autozone.com",
    limit: 5,
    missing_price: Some("Call for price"),
    skip_titles: &[],
    availability: "In Store",
};

impl Storefront {
    /// Result markup for stores whose search page is rendered server-side
    pub fn layout(&self) -> Option<&'static ListingLayout> {
        match self {
            Storefront::Ebay => Some(&EBAY_LAYOUT),
            Storefront::Amazon => Some(&AMAZON_LAYOUT),
            Storefront::AutoZone => Some(&AUTOZONE_LAYOUT),
            Storefront::RockAuto | Storefront::AdvanceAuto | Storefront::OReilly => None,
        }
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("Invalid selector '{}': {}", css, e))
}

fn selectors(css: &[&str]) -> Result<Vec<Selector>> {
    css.iter().map(|c| selector(c)).collect()
}

/// Text of the first element matching any selector, in selector order
fn first_text(item: ElementRef<'_>, selectors: &[Selector], separator: &str) -> Option<String> {
    selectors.iter().find_map(|s| {
        let element = item.select(s).next()?;
        let text = element
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(separator);
        (!text.is_empty()).then_some(text)
    })
}

/// Prices shown as bare numbers get a currency sign; a dangling decimal
/// point from split whole/fraction markup is dropped.
fn normalize_price(raw: &str) -> String {
    let price = raw.trim().trim_end_matches('.');
    if price.starts_with(|c: char| c.is_ascii_digit()) {
        format!("${}", price)
    } else {
        price.to_string()
    }
}

fn with_associate_tag(url: String, tag: Option<&str>) -> String {
    match tag {
        Some(tag) if !url.contains("tag=") => {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{}{}tag={}", url, separator, tag)
        }
        _ => url,
    }
}

/// Parse a search-result page into listings
pub fn parse_listings(
    html: &str,
    layout: &ListingLayout,
    associate_tag: Option<&str>,
) -> Result<Vec<ProviderResult>> {
    let item = selector(layout.item)?;
    let title = selectors(layout.title)?;
    let price = selectors(layout.price)?;
    let link = selector(layout.link)?;

    let document = Html::parse_document(html);
    let listings = document
        .select(&item)
        .filter_map(|element| {
            let title = first_text(element, &title, " ")?;
            if layout.skip_titles.iter().any(|skip| title.contains(skip)) {
                return None;
            }
            let price = match first_text(element, &price, "") {
                Some(price) => normalize_price(&price),
                None => layout.missing_price?.to_string(),
            };
            let href = element.select(&link).next()?.value().attr("href")?;
            let url = if href.starts_with('/') {
                format!("{}{}", layout.origin, href)
            } else {
                href.to_string()
            };

            Some(ProviderResult {
                title,
                price,
                url: with_associate_tag(url, associate_tag),
                availability: layout.availability.to_string(),
                store: layout.store.to_string(),
            })
        })
        .take(layout.limit)
        .collect();

    Ok(listings)
}

/// Fetch a store's search page and parse its listings
async fn scrape(
    client: &reqwest::Client,
    storefront: Storefront,
    url: Url,
    layout: &ListingLayout,
    associate_tag: Option<&str>,
) -> Result<Vec<ProviderResult>> {
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
        .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.5")
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", storefront.name()))?;

    if !response.status().is_success() {
        anyhow::bail!("{} returned {}", storefront.name(), response.status());
    }

    let html = response
        .text()
        .await
        .with_context(|| format!("Failed to read {} search page", storefront.name()))?;

    let listings = parse_listings(&html, layout, associate_tag)?;
    debug!(store = storefront.name(), count = listings.len(), "Search page parsed");
    Ok(listings)
}

/// Provider that scrapes a store's search-result page
pub struct ScrapingProvider {
    storefront: Storefront,
    layout: &'static ListingLayout,
    client: reqwest::Client,
    associate_tag: Option<String>,
}

impl ScrapingProvider {
    pub fn new(storefront: Storefront, client: reqwest::Client) -> Result<Self> {
        let layout = storefront
            .layout()
            .with_context(|| format!("{} has no parsable search page", storefront.name()))?;
        Ok(Self {
            storefront,
            layout,
            client,
            associate_tag: None,
        })
    }

    /// Affiliate tag appended to every listing URL
    pub fn with_associate_tag(mut self, tag: Option<String>) -> Self {
        self.associate_tag = tag.filter(|t| !t.is_empty());
        self
    }
}

#[async_trait]
impl ShoppingProvider for ScrapingProvider {
    fn name(&self) -> &str {
        self.storefront.name()
    }

    async fn search(&self, term: &str) -> Result<Vec<ProviderResult>> {
        let url = self.storefront.search_url(term)?;
        scrape(
            &self.client,
            self.storefront,
            url,
            self.layout,
            self.associate_tag.as_deref(),
        )
        .await
    }
}

/// eBay: Finding API when an application id is set, search page otherwise
pub struct EbayProvider {
    app_id: Option<String>,
    client: reqwest::Client,
    entries_per_page: u32,
    api_url: String,
    /// Replaces the public search page when set
    search_page: Option<String>,
}

impl EbayProvider {
    pub fn new(app_id: Option<String>, client: reqwest::Client) -> Self {
        Self {
            app_id: app_id.filter(|id| !id.is_empty()),
            client,
            entries_per_page: 10,
            api_url: EBAY_FINDING_URL.to_string(),
            search_page: None,
        }
    }

    /// Point the API and search-page requests at other hosts
    pub fn with_endpoints(
        mut self,
        api_url: impl Into<String>,
        search_page: impl Into<String>,
    ) -> Self {
        self.api_url = api_url.into();
        self.search_page = Some(search_page.into());
        self
    }

    fn search_url(&self, term: &str) -> Result<Url> {
        match &self.search_page {
            Some(base) => Url::parse_with_params(base, [("_nkw", term)])
                .with_context(|| format!("Invalid eBay search page '{}'", base)),
            None => Storefront::Ebay.search_url(term),
        }
    }

    async fn search_api(&self, app_id: &str, term: &str) -> Result<Vec<ProviderResult>> {
        let keywords = format!("{} automotive part", term);
        let entries = self.entries_per_page.to_string();
        let params = [
            ("OPERATION-NAME", "findItemsByKeywords"),
            ("SERVICE-VERSION", "1.0.0"),
            ("SECURITY-APPNAME", app_id),
            ("RESPONSE-DATA-FORMAT", "JSON"),
            ("REST-PAYLOAD", ""),
            ("keywords", keywords.as_str()),
            ("paginationInput.entriesPerPage", entries.as_str()),
            ("itemFilter(0).name", "ListingType"),
            ("itemFilter(0).value", "FixedPrice"),
            ("itemFilter(1).name", "Condition"),
            ("itemFilter(1).value", "New"),
            ("sortOrder", "BestMatch"),
        ];

        let response = self
            .client
            .get(&self.api_url)
            .query(&params)
            .send()
            .await
            .context("eBay Finding API request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("eBay Finding API returned error: {}", response.status());
        }

        let data: Value = response
            .json()
            .await
            .context("Failed to parse eBay Finding API response")?;

        let listings = parse_finding_response(&data);
        debug!(count = listings.len(), "eBay listings parsed");
        Ok(listings)
    }
}

/// First element of a Finding API array field
fn first<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key)?.get(0)
}

/// Extract listings from a `findItemsByKeywords` JSON response
pub fn parse_finding_response(data: &Value) -> Vec<ProviderResult> {
    let items = first(data, "findItemsByKeywordsResponse")
        .and_then(|r| first(r, "searchResult"))
        .and_then(|r| r.get("item"))
        .and_then(Value::as_array);

    let Some(items) = items else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let title = first(item, "title")?.as_str()?.to_string();
            let url = first(item, "viewItemURL")?.as_str()?.to_string();
            let price = first(item, "sellingStatus")
                .and_then(|s| first(s, "currentPrice"))
                .and_then(|p| p.get("__value__"))
                .and_then(Value::as_str)
                .map(|v| format!("${}", v))
                .unwrap_or_else(|| "See listing".to_string());

            Some(ProviderResult {
                title,
                price,
                url,
                availability: "Available".to_string(),
                store: "eBay".to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl ShoppingProvider for EbayProvider {
    fn name(&self) -> &str {
        Storefront::Ebay.name()
    }

    async fn search(&self, term: &str) -> Result<Vec<ProviderResult>> {
        if let Some(app_id) = &self.app_id {
            match self.search_api(app_id, term).await {
                Ok(listings) => return Ok(listings),
                Err(e) => warn!(error = %e, "eBay Finding API failed, scraping search page"),
            }
        }

        let url = self.search_url(term)?;
        scrape(&self.client, Storefront::Ebay, url, &EBAY_LAYOUT, None).await
    }
}

/// Shopping options for [`default_providers`]
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    pub ebay_app_id: Option<String>,
    pub amazon_associate_tag: Option<String>,
    /// Fetch link-only storefronts before listing them
    pub verify_storefronts: bool,
}

/// The six default providers
pub fn default_providers(
    client: &reqwest::Client,
    options: &ProviderOptions,
) -> Result<Vec<Arc<dyn ShoppingProvider>>> {
    Storefront::ALL
        .iter()
        .map(|storefront| -> Result<Arc<dyn ShoppingProvider>> {
            let provider: Arc<dyn ShoppingProvider> = match storefront {
                Storefront::Ebay => {
                    Arc::new(EbayProvider::new(options.ebay_app_id.clone(), client.clone()))
                }
                Storefront::Amazon => Arc::new(
                    ScrapingProvider::new(*storefront, client.clone())?
                        .with_associate_tag(options.amazon_associate_tag.clone()),
                ),
                Storefront::AutoZone => {
                    Arc::new(ScrapingProvider::new(*storefront, client.clone())?)
                }
                _ if options.verify_storefronts => {
                    Arc::new(StorefrontProvider::verified(*storefront, client.clone()))
                }
                _ => Arc::new(StorefrontProvider::new(*storefront)),
            };
            Ok(provider)
        })
        .collect()
}
