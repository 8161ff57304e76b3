//! Tier 2: the legacy offset/limit product endpoint.

use serde_json::Value;
use tracing::debug;

use crate::utils::error::{AppError, Result};
use crate::utils::http::HttpClient;

pub const PRODUCTS_PATH: &str = "/ccstore/v1/products";
const PAGE_LIMIT: usize = 100;

/// Pages until `offset >= totalResults` or a page is empty.
pub async fn fetch_all(http: &HttpClient, category_id: &str) -> Result<Vec<Value>> {
    let url = format!("{}{}", http.base_url(), PRODUCTS_PATH);
    let mut items = Vec::new();
    let mut offset = 0usize;

    loop {
        let query = [
            ("categoryId", category_id.to_string()),
            ("limit", PAGE_LIMIT.to_string()),
            ("offset", offset.to_string()),
        ];
        let payload = http.get_json(&url, &query).await?;
        let batch = payload
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| AppError::parse("legacy response has no items list"))?;
        let total = payload
            .get("totalResults")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;

        debug!("Legacy category {} offset {}: {} of {}", category_id, offset, batch.len(), total);
        if batch.is_empty() {
            break;
        }
        offset += batch.len();
        items.extend(batch.iter().cloned());
        if offset >= total {
            break;
        }
    }

    Ok(items)
}
