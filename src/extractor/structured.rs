//! Tier 1: the assembler-style catalog endpoint.

use serde_json::Value;
use tracing::debug;

use crate::utils::error::{AppError, Result};
use crate::utils::http::HttpClient;

pub const CATALOG_PATH: &str = "/ccstore/v1/assembler/pages/Default/osf/catalog";

#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    pub category_id: &'a str,
    pub page_size: u32,
    pub sort: Option<&'a str>,
    pub max_pages: u32,
}

/// Attribute bags of one response page. `Err` when the payload has no
/// recognizable record list at all.
pub fn page_records(payload: &Value) -> Result<Vec<Value>> {
    let records = payload
        .pointer("/results/records")
        .or_else(|| payload.get("records"))
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::parse("catalog response has no records list"))?;

    Ok(records
        .iter()
        .map(|record| record.get("attributes").unwrap_or(record).clone())
        .collect())
}

/// Reads pages until one comes back empty. The offset advances by the
/// number of records actually returned, so short pages are tolerated.
pub async fn fetch_all(http: &HttpClient, request: &PageRequest<'_>) -> Result<Vec<Value>> {
    let url = format!("{}{}", http.base_url(), CATALOG_PATH);
    let mut records = Vec::new();
    let mut offset = 0usize;

    for page in 0..request.max_pages {
        let payload = http.get_json(&url, &query(request, offset)).await?;
        let batch = page_records(&payload)?;
        debug!(
            "Category {} page {} (offset {}): {} records",
            request.category_id,
            page,
            offset,
            batch.len()
        );
        if batch.is_empty() {
            return Ok(records);
        }
        offset += batch.len();
        records.extend(batch);
    }

    debug!(
        "Category {} stopped at the {} page limit",
        request.category_id, request.max_pages
    );
    Ok(records)
}

/// A single page at offset 0; what a shopper sees first.
pub async fn fetch_first_page(http: &HttpClient, request: &PageRequest<'_>) -> Result<Vec<Value>> {
    let url = format!("{}{}", http.base_url(), CATALOG_PATH);
    let payload = http.get_json(&url, &query(request, 0)).await?;
    page_records(&payload)
}

fn query(request: &PageRequest<'_>, offset: usize) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("N", request.category_id.to_string()),
        ("Nrpp", request.page_size.to_string()),
        ("No", offset.to_string()),
    ];
    if let Some(sort) = request.sort.filter(|s| !s.is_empty()) {
        params.push(("Ns", sort.to_string()));
    }
    params
}
