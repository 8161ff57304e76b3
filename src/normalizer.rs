//! Maps raw catalog records of varying shape onto [`Product`].
//!
//! Every logical field has an ordered alias table. A key may be a literal
//! (`"product.repositoryId"` is a real key in assembler payloads) or a dotted
//! path into nested objects; both are tried. New upstream shapes are
//! supported by extending a table, not by adding branches.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use url::Url;

use crate::config::CatalogConfig;
use crate::models::Product;

pub const ID_KEYS: &[&str] = &["repositoryId", "product.repositoryId", "sku.repositoryId"];
pub const NAME_KEYS: &[&str] = &["displayName", "product.displayName", "sku.displayName"];
pub const LIST_PRICE_KEYS: &[&str] = &["listPrice", "product.listPrice", "sku.listPrice"];
pub const SALE_PRICE_KEYS: &[&str] = &["salePrice", "product.salePrice", "sku.salePrice"];
pub const IMAGE_KEYS: &[&str] = &[
    "primaryMediumImageURL",
    "product.primaryMediumImageURL",
    "sku.primaryMediumImageURL",
    "primaryLargeImageURL",
    "product.primaryLargeImageURL",
    "sku.primaryLargeImageURL",
    "primaryFullImageURL",
    "sku.primaryFullImageURL",
];
pub const ROUTE_KEYS: &[&str] = &[
    "route",
    "product.route",
    "sku.route",
    "seoUrl",
    "seoUrlSlugDerived",
    "relativeURL",
];
pub const CATEGORY_KEYS: &[&str] = &[
    "categoryId",
    "categoryIds",
    "category",
    "parentCategories",
    "ancestorCategories",
    "categories",
    "parentCategory",
];
pub const COMING_SOON_KEYS: &[&str] = &[
    "B2CProduct.b2c_comingSoon",
    "b2c_comingSoon",
    "product.b2c_comingSoon",
    "sku.b2c_comingSoon",
    "B2CProduct.b2cComingSoon",
    "b2cComingSoon",
];

/// Key a caller sets when it already knows the online-exclusive answer.
pub const EXCLUSIVE_FLAG_KEY: &str = "is_online_exclusive";

const EXCLUSIVE_ROUTE_HINTS: &[&str] = &[
    "online-exclusive",
    "online_exclusive",
    "online-only",
    "onlineonly",
    "web-exclusive",
    "web_exclusive",
];
const EXCLUSIVE_NAME_HINT: &str = "online exclusive";

/// Which signal decided the online-exclusive classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusiveSignal {
    Flag(bool),
    Category,
    Route,
    Name,
    None,
}

impl ExclusiveSignal {
    pub fn is_exclusive(&self) -> bool {
        match self {
            ExclusiveSignal::Flag(value) => *value,
            ExclusiveSignal::Category | ExclusiveSignal::Route | ExclusiveSignal::Name => true,
            ExclusiveSignal::None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    base_url: String,
    exclusive_categories: HashSet<String>,
}

impl Normalizer {
    pub fn new<I, S>(base_url: &str, exclusive_categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            exclusive_categories: exclusive_categories.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(&config.base_url, config.online_exclusive_category_ids.iter().cloned())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_exclusive_category(&self, category_id: &str) -> bool {
        self.exclusive_categories.contains(category_id)
    }

    pub fn record_id(record: &Value) -> Option<String> {
        first_string(record, ID_KEYS)
    }

    /// Explicit flag, then category membership, then route hint, then name
    /// hint. The first signal that fires decides.
    pub fn exclusive_signal(&self, record: &Value) -> ExclusiveSignal {
        if let Some(flag) = raw_lookup(record, EXCLUSIVE_FLAG_KEY) {
            return ExclusiveSignal::Flag(is_truthy(flag));
        }

        if category_ids(record)
            .iter()
            .any(|id| self.exclusive_categories.contains(id))
        {
            return ExclusiveSignal::Category;
        }

        let routes = ROUTE_KEYS
            .iter()
            .filter_map(|key| lookup(record, key).and_then(value_to_string))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if EXCLUSIVE_ROUTE_HINTS.iter().any(|hint| routes.contains(hint)) {
            return ExclusiveSignal::Route;
        }

        let name = first_string(record, NAME_KEYS).unwrap_or_default().to_lowercase();
        if name.contains(EXCLUSIVE_NAME_HINT) {
            return ExclusiveSignal::Name;
        }

        ExclusiveSignal::None
    }

    /// Canonical product for one raw record, or `None` when it carries no id.
    /// Ids absent from `stock` get quantity 0.
    pub fn normalize(&self, record: &Value, stock: &HashMap<String, u32>) -> Option<Product> {
        let id = Self::record_id(record)?;
        let name = first_string(record, NAME_KEYS).unwrap_or_default();

        let mut product = Product::observed(id, name);
        product.price = resolve_price(record);
        product.image_url = first_string(record, IMAGE_KEYS)
            .map(|src| normalize_image_url(&src, &self.base_url))
            .unwrap_or_default();
        product.page_url = page_url(first_string(record, ROUTE_KEYS).as_deref(), &self.base_url);
        product.quantity = stock.get(&product.id).copied().unwrap_or(0);
        product.is_online_exclusive = self.exclusive_signal(record).is_exclusive();
        Some(product)
    }

    /// Normalizes a batch, dropping id-less records and keeping the first
    /// occurrence of a repeated id.
    pub fn normalize_all(&self, records: &[Value], stock: &HashMap<String, u32>) -> Vec<Product> {
        let mut seen = HashSet::new();
        records
            .iter()
            .filter_map(|record| self.normalize(record, stock))
            .filter(|product| seen.insert(product.id.clone()))
            .collect()
    }
}

/// Literal key first, then the dotted path. JSON null counts as absent.
pub fn raw_lookup<'a>(record: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(value) = record.get(key).filter(|v| !v.is_null()) {
        return Some(value);
    }
    if !key.contains('.') {
        return None;
    }
    key.split('.')
        .try_fold(record, |node, part| node.get(part))
        .filter(|v| !v.is_null())
}

/// Like [`raw_lookup`], but a list resolves to its first element.
pub fn lookup<'a>(record: &'a Value, key: &str) -> Option<&'a Value> {
    match raw_lookup(record, key)? {
        Value::Array(items) => items.first().filter(|v| !v.is_null()),
        value => Some(value),
    }
}

pub fn first_value<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| lookup(record, key))
}

pub fn first_string(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| lookup(record, key).and_then(value_to_string))
}

fn value_to_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Numbers, or strings such as `"$1,299.00"`.
pub fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Sale price wins over list price; nothing parsable means 0.0 (unknown).
pub fn resolve_price(record: &Value) -> f64 {
    first_value(record, SALE_PRICE_KEYS)
        .and_then(parse_number)
        .or_else(|| first_value(record, LIST_PRICE_KEYS).and_then(parse_number))
        .unwrap_or(0.0)
}

pub fn category_ids(record: &Value) -> HashSet<String> {
    let mut ids = HashSet::new();
    for key in CATEGORY_KEYS {
        if let Some(value) = raw_lookup(record, key) {
            collect_category_ids(value, &mut ids);
        }
    }
    ids
}

fn collect_category_ids(value: &Value, out: &mut HashSet<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_category_ids(item, out)),
        Value::Object(map) => {
            if let Some(id) = map
                .get("repositoryId")
                .or_else(|| map.get("id"))
                .and_then(value_to_string)
            {
                out.insert(id);
            }
        }
        other => {
            if let Some(id) = value_to_string(other) {
                out.insert(id);
            }
        }
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "1" | "yes" | "y"
        ),
        Value::Array(items) => items.first().is_some_and(is_truthy),
        _ => false,
    }
}

pub fn is_coming_soon(record: &Value) -> bool {
    COMING_SOON_KEYS
        .iter()
        .filter_map(|key| raw_lookup(record, key))
        .any(is_truthy)
}

/// Resolves `href` against the site root. Absolute URLs pass through.
pub fn absolute_url(href: &str, base_url: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    format!("{}/{}", base_url.trim_end_matches('/'), href.trim_start_matches('/'))
}

/// Absolute image URL. Image-service links
/// (`/ccstore/v1/images/?source=/file/...&width=300`) unwrap to the file they serve.
pub fn normalize_image_url(src: &str, base_url: &str) -> String {
    let absolute = absolute_url(src, base_url);
    if let Ok(parsed) = Url::parse(&absolute) {
        if parsed.path().trim_end_matches('/').ends_with("/ccstore/v1/images") {
            if let Some((_, inner)) = parsed.query_pairs().find(|(key, _)| key == "source") {
                if !inner.is_empty() {
                    return absolute_url(&inner, base_url);
                }
            }
        }
    }
    absolute
}

pub fn page_url(route: Option<&str>, base_url: &str) -> String {
    match route.map(str::trim).filter(|r| !r.is_empty()) {
        Some(route) => absolute_url(route, base_url),
        None => base_url.trim_end_matches('/').to_string(),
    }
}

/// Lowercased URL without query, fragment or trailing slash.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.as_str().trim_end_matches('/').to_lowercase()
        }
        Err(_) => trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_lowercase(),
    }
}

/// First 16 hex chars of SHA-256 over the trimmed, lowercased text.
pub fn stable_key(text: &str) -> String {
    let digest = Sha256::digest(text.trim().to_lowercase().as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Release-card identity: normalized URL when known, else the title.
pub fn release_key(url: Option<&str>, title: &str) -> String {
    let basis = match url.map(normalize_url).filter(|u| !u.is_empty()) {
        Some(normalized) => normalized,
        None => title.trim().to_lowercase(),
    };
    format!("release:{}", stable_key(&basis))
}
