//! Fills price, quantity and image from a product's own detail page when
//! the catalog APIs left them blank.

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, warn};

use super::json_walk::find_objects;
use crate::models::Product;
use crate::normalizer::{normalize_image_url, parse_number};
use crate::utils::error::Result;
use crate::utils::http::HttpClient;

static CURRENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*([0-9]+\.[0-9]{2})").unwrap());
static INTEGER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d+)\b").unwrap());

const PRICE_SELECTORS: &[&str] = &[
    "span.card__price-amount",
    "[itemprop=\"price\"]",
    ".price__value",
    ".cc-product-price__value",
    ".cc-pdp-price__value",
    "meta[itemprop=\"price\"][content]",
];
const QUANTITY_SELECTOR: &str = "div.availability-info";
const IMAGE_SELECTORS: &[(&str, &str)] = &[
    ("meta[property=\"og:image\"]", "content"),
    ("meta[name=\"og:image\"]", "content"),
    ("link[rel=\"image_src\"]", "href"),
    ("img.card_image_id", "src"),
    ("div.card__image img", "src"),
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageDetails {
    pub price: Option<f64>,
    pub quantity: Option<u32>,
    pub image_url: Option<String>,
}

pub fn parse_details(html: &str, base_url: &str) -> PageDetails {
    let document = Html::parse_document(html);
    PageDetails {
        price: price_from_json_ld(&document)
            .or_else(|| price_from_selectors(&document))
            .or_else(|| price_from_text(&document)),
        quantity: quantity_from_availability(&document),
        image_url: image_from_selectors(&document).map(|src| normalize_image_url(&src, base_url)),
    }
}

fn positive(price: f64) -> Option<f64> {
    (price > 0.0).then_some(price)
}

fn price_from_json_ld(document: &Html) -> Option<f64> {
    let scripts = Selector::parse("script[type=\"application/ld+json\"]").ok()?;
    document.select(&scripts).find_map(|script| {
        let body: String = script.text().collect();
        let value: Value = serde_json::from_str(body.trim()).ok()?;
        find_objects(&value, |map| map.contains_key("offers"))
            .into_iter()
            .find_map(|product| {
                let offers = product.get("offers")?;
                let offers = match offers {
                    Value::Array(items) => items.iter().collect::<Vec<_>>(),
                    other => vec![other],
                };
                offers.into_iter().find_map(|offer| {
                    offer
                        .get("price")
                        .or_else(|| offer.pointer("/priceSpecification/price"))
                        .and_then(parse_number)
                        .and_then(positive)
                })
            })
    })
}

fn price_from_selectors(document: &Html) -> Option<f64> {
    PRICE_SELECTORS.iter().find_map(|css| {
        let selector = Selector::parse(css).ok()?;
        document.select(&selector).find_map(|el| {
            let raw = el
                .value()
                .attr("content")
                .map(str::to_string)
                .unwrap_or_else(|| el.text().collect::<String>());
            parse_number(&Value::String(raw.trim().to_string())).and_then(positive)
        })
    })
}

fn price_from_text(document: &Html) -> Option<f64> {
    let text = document.root_element().text().collect::<Vec<_>>().join(" ");
    CURRENCY_RE
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .and_then(positive)
}

fn quantity_from_availability(document: &Html) -> Option<u32> {
    let selector = Selector::parse(QUANTITY_SELECTOR).ok()?;
    let element = document.select(&selector).next()?;
    let text = element.text().collect::<Vec<_>>().join(" ");
    INTEGER_RE
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

fn image_from_selectors(document: &Html) -> Option<String> {
    IMAGE_SELECTORS.iter().find_map(|(css, attr)| {
        let selector = Selector::parse(css).ok()?;
        document
            .select(&selector)
            .filter_map(|el| el.value().attr(attr))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string)
    })
}

pub struct Enricher {
    http: Arc<HttpClient>,
    delay: Duration,
}

impl Enricher {
    pub fn new(http: Arc<HttpClient>, delay: Duration) -> Self {
        Self { http, delay }
    }

    pub async fn fetch_details(&self, page_url: &str) -> Result<Option<PageDetails>> {
        let Some(html) = self.http.get_html(page_url).await? else {
            return Ok(None);
        };
        Ok(Some(parse_details(&html, self.http.base_url())))
    }

    /// Best effort: fills only the fields that are missing, skips items
    /// whose page cannot be fetched, and pauses between page requests.
    /// Returns how many products gained at least one field.
    pub async fn enrich(&self, products: &mut [Product]) -> usize {
        let mut enriched = 0;
        let mut first = true;

        for product in products.iter_mut() {
            if !product.needs_enrichment() || product.page_url.is_empty() {
                continue;
            }
            if !first && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            first = false;

            match self.fetch_details(&product.page_url).await {
                Ok(Some(details)) => {
                    if apply(product, &details) {
                        enriched += 1;
                    }
                }
                Ok(None) => debug!("No detail page for {} at {}", product.id, product.page_url),
                Err(e) => warn!("Enrichment of {} failed: {}", product.id, e),
            }
        }

        enriched
    }
}

/// Copies page details onto the missing fields only.
pub fn apply(product: &mut Product, details: &PageDetails) -> bool {
    let mut changed = false;
    if !product.has_price() {
        if let Some(price) = details.price.filter(|p| *p > 0.0) {
            product.price = price;
            changed = true;
        }
    }
    if !product.in_stock() {
        if let Some(quantity) = details.quantity.filter(|q| *q > 0) {
            product.quantity = quantity;
            changed = true;
        }
    }
    if product.image_url.is_empty() {
        if let Some(image) = details.image_url.as_ref().filter(|i| !i.is_empty()) {
            product.image_url = image.clone();
            changed = true;
        }
    }
    changed
}
