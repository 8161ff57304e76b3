//! Structural heuristics over static HTML.
//!
//! Nothing here is a contract with the site; markup drifts. Every function
//! degrades to an empty result instead of failing. All parsing is
//! synchronous so no `Html` value is ever held across an await point.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

use super::json_walk::{find_objects, parse_embedded};
use super::source::LinkItem;
use crate::models::{ReleaseCard, ReleaseStatus};
use crate::normalizer::{
    IMAGE_KEYS, NAME_KEYS, Normalizer, ROUTE_KEYS, absolute_url, first_string,
    normalize_image_url, parse_number, release_key,
};

static PRODUCT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/product/(?:[^/?#]+/)*?(\d{6,})").unwrap());

const PRODUCT_ANCHOR: &str = r#"a[href*="/product/"]"#;
const TILE_SELECTOR: &str = "article, .card, .teaser, .tile, .grid__item, .c-card, .cc-card, .cc-tile";
const TILE_CLASSES: &[&str] = &["card", "teaser", "tile", "grid__item", "c-card", "cc-card", "cc-tile"];
const TITLE_SELECTOR: &str = "h1, h2, h3, h4";
const TILE_NAME_SELECTOR: &str = "h2, h3, .card__name, .product__name, [itemprop='name']";
const TILE_PRICE_SELECTOR: &str =
    "span.card__price-amount, [itemprop='price'], .price__value, .cc-product-price__value";
const MAX_ANCHORS: usize = 200;

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn collapsed_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_tile(element: ElementRef<'_>) -> bool {
    element.value().name() == "article"
        || element.value().classes().any(|class| TILE_CLASSES.contains(&class))
}

/// Closest ancestor that looks like a product tile.
fn tile_container(anchor: ElementRef<'_>) -> Option<ElementRef<'_>> {
    anchor.ancestors().filter_map(ElementRef::wrap).find(|el| is_tile(*el))
}

/// Tile for grid listings: a recognized tile, else the nearest li/article/div.
fn grid_container(anchor: ElementRef<'_>) -> ElementRef<'_> {
    tile_container(anchor)
        .or_else(|| {
            anchor
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| matches!(el.value().name(), "li" | "article" | "div"))
        })
        .unwrap_or(anchor)
}

fn first_match<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    scope.select(&sel).next()
}

pub fn product_id_from_href(href: &str) -> Option<String> {
    PRODUCT_ID_RE
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn card(href: &str, title: &str, image: Option<&str>, status_text: &str, base_url: &str) -> Option<ReleaseCard> {
    let url = absolute_url(href, base_url);
    if url.is_empty() {
        return None;
    }
    let title = title.trim();
    Some(ReleaseCard {
        key: release_key(Some(&url), title),
        title: if title.is_empty() { url.clone() } else { title.to_string() },
        image_url: image
            .map(str::trim)
            .filter(|src| !src.is_empty())
            .map(|src| normalize_image_url(src, base_url)),
        status: ReleaseStatus::from_text(status_text),
        url,
    })
}

fn push_unique(cards: &mut Vec<ReleaseCard>, seen: &mut HashSet<String>, card: Option<ReleaseCard>) {
    if let Some(card) = card {
        if seen.insert(card.key.clone()) {
            cards.push(card);
        }
    }
}

/// Release cards from a static page: product anchors, then tile blocks,
/// then (only if both found nothing) product objects in inline scripts.
pub fn release_cards(html: &str, base_url: &str) -> Vec<ReleaseCard> {
    let document = Html::parse_document(html);
    let mut cards = Vec::new();
    let mut seen = HashSet::new();

    let og_image = selector(r#"meta[property="og:image"], meta[name="og:image"]"#)
        .and_then(|sel| document.select(&sel).next())
        .and_then(|meta| meta.value().attr("content").map(str::to_string));

    if let Some(anchors) = selector(PRODUCT_ANCHOR) {
        for anchor in document.select(&anchors).take(MAX_ANCHORS) {
            let Some(href) = anchor.value().attr("href").map(str::trim).filter(|h| !h.is_empty()) else {
                continue;
            };
            let container = tile_container(anchor);
            let scope = container.unwrap_or(anchor);
            let title = first_match(scope, TITLE_SELECTOR)
                .map(collapsed_text)
                .filter(|t| !t.is_empty())
                .or_else(|| Some(collapsed_text(anchor)).filter(|t| !t.is_empty()))
                .or_else(|| anchor.value().attr("aria-label").map(str::to_string))
                .or_else(|| anchor.value().attr("title").map(str::to_string))
                .unwrap_or_else(|| href.to_string());
            let image = og_image.clone().or_else(|| {
                first_match(scope, "img").and_then(|img| img.value().attr("src").map(str::to_string))
            });
            let status_text = format!(
                "{} {}",
                collapsed_text(anchor),
                container.map(collapsed_text).unwrap_or_default()
            );
            push_unique(&mut cards, &mut seen, card(href, &title, image.as_deref(), &status_text, base_url));
        }
    }

    if let Some(tiles) = selector(TILE_SELECTOR) {
        for tile in document.select(&tiles) {
            let Some(anchor) = first_match(tile, "a[href]") else {
                continue;
            };
            let Some(href) = anchor.value().attr("href").filter(|h| h.contains("/product/")) else {
                continue;
            };
            let title = first_match(tile, TITLE_SELECTOR)
                .map(collapsed_text)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| collapsed_text(anchor));
            let image = first_match(tile, "img").and_then(|img| img.value().attr("src"));
            push_unique(&mut cards, &mut seen, card(href, &title, image, &collapsed_text(tile), base_url));
        }
    }

    if cards.is_empty() {
        cards = inline_json_cards(&document, base_url);
        if !cards.is_empty() {
            debug!("Recovered {} release cards from inline JSON", cards.len());
        }
    }

    cards
}

fn inline_json_cards(document: &Html, base_url: &str) -> Vec<ReleaseCard> {
    let Some(scripts) = selector("script") else {
        return Vec::new();
    };
    let mut cards = Vec::new();
    let mut seen = HashSet::new();

    for script in document.select(&scripts) {
        let body: String = script.text().collect();
        if body.trim().is_empty() {
            continue;
        }
        for value in parse_embedded(&body) {
            for object in find_objects(&value, |map| {
                Normalizer::record_id(&Value::Object(map.clone())).is_some()
            }) {
                let record = Value::Object(object.clone());
                push_unique(&mut cards, &mut seen, card_from_record(&record, base_url, false));
            }
        }
    }
    cards
}

/// Card for a product-shaped JSON object. With `require_product_route`
/// the object must route to a product page.
pub fn card_from_record(record: &Value, base_url: &str, require_product_route: bool) -> Option<ReleaseCard> {
    let id = Normalizer::record_id(record);
    let route = first_string(record, ROUTE_KEYS)
        .or_else(|| first_string(record, &["href", "url"]))
        .map(|r| absolute_url(&r, base_url));

    if require_product_route && !route.as_deref().is_some_and(|r| r.contains("/product/")) {
        return None;
    }
    let basis = id.clone().or_else(|| route.clone())?;

    let title = first_string(record, NAME_KEYS)
        .or_else(|| first_string(record, &["title"]))
        .or_else(|| id.as_ref().map(|id| format!("Product {}", id)))
        .unwrap_or_else(|| basis.clone());
    let image = first_string(record, IMAGE_KEYS)
        .or_else(|| first_string(record, &["img"]))
        .map(|src| normalize_image_url(&src, base_url));
    let status = first_string(record, &["status"]).unwrap_or_default();

    Some(ReleaseCard {
        key: release_key(route.as_deref(), &basis),
        url: route.unwrap_or_else(|| format!("{}/", base_url.trim_end_matches('/'))),
        title,
        image_url: image,
        status: ReleaseStatus::from_text(&status),
    })
}

/// Cards from anchors a browser collected; non-product links are ignored.
pub fn cards_from_links(links: &[LinkItem], base_url: &str) -> Vec<ReleaseCard> {
    let mut cards = Vec::new();
    let mut seen = HashSet::new();
    for link in links {
        let url = absolute_url(&link.href, base_url);
        if !url.contains("/product/") {
            continue;
        }
        let title = link.title.as_deref().unwrap_or_default();
        let status = link.status.as_deref().unwrap_or_default();
        push_unique(&mut cards, &mut seen, card(&url, title, link.img.as_deref(), status, base_url));
    }
    cards
}

/// Cards mined from JSON responses captured on the wire.
pub fn cards_from_payloads(payloads: &[Value], base_url: &str) -> Vec<ReleaseCard> {
    let mut cards = Vec::new();
    let mut seen = HashSet::new();
    for payload in payloads {
        for object in find_objects(payload, |map| {
            ROUTE_KEYS
                .iter()
                .chain(["href", "url"].iter())
                .filter_map(|key| map.get(*key))
                .filter_map(|v| match v {
                    Value::Array(items) => items.first().and_then(Value::as_str),
                    other => other.as_str(),
                })
                .any(|route| route.contains("/product/"))
        }) {
            let record = Value::Object(object.clone());
            push_unique(&mut cards, &mut seen, card_from_record(&record, base_url, true));
        }
    }
    cards
}

/// Product tiles found on one listing/grid page.
#[derive(Debug, Default)]
pub struct ListingScan {
    /// Raw records in the shape the normalizer understands.
    pub records: Vec<Value>,
    /// Distinct product tiles seen, matching or not.
    pub tiles: usize,
}

/// Product tiles on a category listing page. With `coming_soon_only` just
/// the tiles whose text says "coming soon" are kept.
pub fn listing_records(html: &str, base_url: &str, coming_soon_only: bool) -> ListingScan {
    let document = Html::parse_document(html);
    let mut scan = ListingScan::default();
    let Some(anchors) = selector(PRODUCT_ANCHOR) else {
        return scan;
    };

    let mut seen = HashSet::new();
    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(id) = product_id_from_href(href) else {
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }
        scan.tiles += 1;

        let tile = grid_container(anchor);
        let coming_soon = collapsed_text(tile).to_lowercase().contains("coming soon");
        if coming_soon_only && !coming_soon {
            continue;
        }

        let name = first_match(tile, TILE_NAME_SELECTOR)
            .map(collapsed_text)
            .filter(|t| !t.is_empty())
            .or_else(|| {
                first_match(tile, "img")
                    .and_then(|img| img.value().attr("alt"))
                    .map(|alt| alt.trim().to_string())
                    .filter(|alt| !alt.is_empty())
            })
            .unwrap_or_else(|| {
                href.rsplit('/').next().unwrap_or_default().replace('-', " ").trim().to_string()
            });
        let price = first_match(tile, TILE_PRICE_SELECTOR).and_then(|el| {
            let text = el.value().attr("content").map(str::to_string).unwrap_or_else(|| collapsed_text(el));
            parse_number(&Value::String(text))
        });
        let image = first_match(tile, "img")
            .and_then(|img| img.value().attr("src"))
            .map(|src| normalize_image_url(src, base_url));

        scan.records.push(json!({
            "repositoryId": id,
            "displayName": name,
            "listPrice": price,
            "primaryMediumImageURL": image,
            "route": href,
            "b2c_comingSoon": coming_soon,
        }));
    }
    scan
}
