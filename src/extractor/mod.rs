//! Tiered catalog extraction.
//!
//! Each tier is tried in order; a tier that errors or comes back empty
//! hands over to the next one instead of failing the fetch.

pub mod coming_soon;
pub mod enrich;
pub mod html;
pub mod json_walk;
pub mod legacy;
pub mod release;
pub mod source;
pub mod stock;
pub mod structured;

#[cfg(feature = "browser")]
pub mod browser;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, CatalogConfig};
use crate::models::{Product, ReleaseCard};
use crate::normalizer::{EXCLUSIVE_FLAG_KEY, Normalizer};
use crate::utils::error::{AppError, Result};
use crate::utils::http::HttpClient;

pub use coming_soon::ComingSoonScan;
pub use enrich::Enricher;
pub use source::{PageSource, RenderedPage, StaticHtmlSource, TransportSource};
use structured::PageRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Structured,
    Legacy,
    StaticHtml,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Structured => "structured",
            Tier::Legacy => "legacy",
            Tier::StaticHtml => "static-html",
        }
    }

    /// Paginated API tiers see the whole category; a listing page does not.
    pub fn is_complete(&self) -> bool {
        matches!(self, Tier::Structured | Tier::Legacy)
    }
}

/// Raw records for one category and the tier that produced them.
#[derive(Debug, Default)]
pub struct CatalogFetch {
    pub tier: Option<Tier>,
    pub records: Vec<Value>,
}

impl CatalogFetch {
    pub fn is_complete(&self) -> bool {
        self.tier.is_some_and(|tier| tier.is_complete())
    }
}

pub struct CatalogExtractor {
    http: Arc<HttpClient>,
    normalizer: Normalizer,
    catalog: CatalogConfig,
    sources: Vec<Arc<dyn PageSource>>,
}

impl CatalogExtractor {
    pub fn new(
        http: Arc<HttpClient>,
        catalog: CatalogConfig,
        sources: Vec<Arc<dyn PageSource>>,
    ) -> Self {
        Self {
            normalizer: Normalizer::from_config(&catalog),
            http,
            catalog,
            sources,
        }
    }

    /// Transport and static-HTML page sources, plus the browser when it is
    /// compiled in and enabled.
    pub fn from_config(config: &AppConfig, http: Arc<HttpClient>) -> Self {
        let mut sources: Vec<Arc<dyn PageSource>> = vec![
            Arc::new(TransportSource::new(Arc::clone(&http))),
            Arc::new(StaticHtmlSource::new(Arc::clone(&http))),
        ];
        if config.release.use_browser {
            sources.extend(browser_source(config));
        }

        Self::new(http, config.catalog.clone(), sources)
    }

    pub fn http(&self) -> &Arc<HttpClient> {
        &self.http
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn catalog(&self) -> &CatalogConfig {
        &self.catalog
    }

    pub fn enricher(&self, delay: std::time::Duration) -> Enricher {
        Enricher::new(Arc::clone(&self.http), delay)
    }

    fn is_primary_category(&self, category_id: &str) -> bool {
        self.catalog.category_ids.first().map(String::as_str) == Some(category_id)
    }

    /// Every record of a category, from the first tier that yields any.
    ///
    /// All tiers empty is `Ok` with no tier; all tiers failing returns the
    /// last error.
    pub async fn fetch_catalog(&self, category_id: &str) -> Result<CatalogFetch> {
        let mut last_error: Option<AppError> = None;

        for tier in [Tier::Structured, Tier::Legacy, Tier::StaticHtml] {
            let attempt = match tier {
                Tier::Structured => {
                    let request = PageRequest {
                        category_id,
                        page_size: self.catalog.page_size,
                        sort: self.catalog.sort.as_deref(),
                        max_pages: self.catalog.max_pages,
                    };
                    structured::fetch_all(&self.http, &request).await
                }
                // The legacy endpoint only knows one category.
                Tier::Legacy if self.is_primary_category(category_id) => {
                    legacy::fetch_all(&self.http, &self.catalog.legacy_category_id).await
                }
                Tier::Legacy => continue,
                Tier::StaticHtml => self.fetch_listing(category_id).await,
            };

            match attempt {
                Ok(mut records) if !records.is_empty() => {
                    if tier.is_complete() {
                        self.tag_exclusive(category_id, &mut records);
                    }
                    info!(
                        "Category {}: {} records via {} tier",
                        category_id,
                        records.len(),
                        tier.as_str()
                    );
                    return Ok(CatalogFetch {
                        tier: Some(tier),
                        records,
                    });
                }
                Ok(_) => debug!("Category {}: {} tier returned nothing", category_id, tier.as_str()),
                Err(e) => {
                    warn!(
                        "Category {}: {} tier failed, falling through: {}",
                        category_id,
                        tier.as_str(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => {
                warn!("Category {}: every tier came back empty", category_id);
                Ok(CatalogFetch::default())
            }
        }
    }

    /// Records pulled from a paginated API carry the category's exclusive
    /// status as an explicit flag, which the normalizer trusts first.
    fn tag_exclusive(&self, category_id: &str, records: &mut [Value]) {
        let exclusive = self.normalizer.is_exclusive_category(category_id);
        for record in records.iter_mut() {
            if let Value::Object(map) = record {
                map.insert(EXCLUSIVE_FLAG_KEY.to_string(), Value::Bool(exclusive));
            }
        }
    }

    async fn fetch_listing(&self, category_id: &str) -> Result<Vec<Value>> {
        let url = format!(
            "{}{}?N={}&Nrpp={}",
            self.http.base_url(),
            self.catalog.listing_path,
            category_id,
            self.catalog.page_size
        );
        let Some(html) = self.http.get_html(&url).await? else {
            return Ok(Vec::new());
        };
        Ok(html::listing_records(&html, self.http.base_url(), false).records)
    }

    pub async fn fetch_stock(&self, ids: &[String]) -> Result<HashMap<String, u32>> {
        stock::fetch_quantities(&self.http, ids, self.catalog.stock_chunk_size).await
    }

    /// The first page of a category, as a shopper would see it.
    pub async fn fetch_front_page(
        &self,
        category_id: &str,
        page_size: u32,
        sort: Option<&str>,
    ) -> Result<Vec<Value>> {
        let request = PageRequest {
            category_id,
            page_size,
            sort,
            max_pages: 1,
        };
        structured::fetch_first_page(&self.http, &request).await
    }

    pub async fn fetch_coming_soon(&self, category_id: &str, sort: &str) -> Result<ComingSoonScan> {
        coming_soon::scan(&self.http, &self.catalog, category_id, sort).await
    }

    /// Cards on the release landing page. URL variants are tried in turn and
    /// each variant goes through the page sources in order; the first
    /// non-empty card list wins.
    pub async fn fetch_release_cards(&self, page_url: &str) -> Vec<ReleaseCard> {
        for url in release::url_variants(page_url) {
            for source in &self.sources {
                let page = match source.load(&url).await {
                    Ok(Some(page)) => page,
                    Ok(None) => {
                        debug!("{} source returned nothing for {}", source.name(), url);
                        continue;
                    }
                    Err(e) => {
                        warn!("{} source failed for {}: {}", source.name(), url, e);
                        continue;
                    }
                };

                let cards = release::cards_from_page(&page, self.http.base_url());
                if !cards.is_empty() {
                    info!("{} release cards from {} via {}", cards.len(), url, source.name());
                    return cards;
                }
            }
        }

        warn!("No release cards found at {}", page_url);
        Vec::new()
    }

    /// Canonical products for raw records and their stock map.
    pub fn build_products(&self, records: &[Value], stock: &HashMap<String, u32>) -> Vec<Product> {
        self.normalizer.normalize_all(records, stock)
    }

    /// Ids of the records, first occurrence order, duplicates dropped.
    pub fn record_ids(records: &[Value]) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        records
            .iter()
            .filter_map(Normalizer::record_id)
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }
}

#[cfg(feature = "browser")]
fn browser_source(config: &AppConfig) -> Option<Arc<dyn PageSource>> {
    Some(Arc::new(browser::BrowserSource::new(
        &config.release,
        &config.catalog.base_url,
        &config.http.user_agent,
    )))
}

#[cfg(not(feature = "browser"))]
fn browser_source(_config: &AppConfig) -> Option<Arc<dyn PageSource>> {
    warn!("Browser rendering requested but not compiled in; release page uses HTTP only");
    None
}
