//! Batched stock-status lookups.

use serde_json::Value;
use std::collections::HashMap;

use crate::normalizer::parse_number;
use crate::utils::error::Result;
use crate::utils::http::HttpClient;

pub const STOCK_PATH: &str = "/ccstore/v1/stockStatus";

/// Quantities for `ids`, one request per `chunk_size` ids. Ids the endpoint
/// does not mention are simply absent from the map (quantity 0 downstream).
pub async fn fetch_quantities(
    http: &HttpClient,
    ids: &[String],
    chunk_size: usize,
) -> Result<HashMap<String, u32>> {
    let url = format!("{}{}", http.base_url(), STOCK_PATH);
    let mut quantities = HashMap::new();

    for chunk in ids.chunks(chunk_size.max(1)) {
        let query = [
            ("products", chunk.join(",")),
            ("expandStockDetails", "true".to_string()),
            ("actualStockStatus", "true".to_string()),
            ("locationIds", "null".to_string()),
        ];
        let payload = http.get_json(&url, &query).await?;
        quantities.extend(parse_quantities(&payload));
    }

    Ok(quantities)
}

pub fn parse_quantities(payload: &Value) -> HashMap<String, u32> {
    let mut quantities = HashMap::new();
    let items = payload.get("items").and_then(Value::as_array);
    for item in items.into_iter().flatten() {
        let Some(status) = item.get("productSkuInventoryStatus").and_then(Value::as_object) else {
            continue;
        };
        for (id, raw) in status {
            let quantity = parse_number(raw)
                .filter(|q| *q > 0.0)
                .map(|q| q.min(u32::MAX as f64) as u32)
                .unwrap_or(0);
            quantities.insert(id.clone(), quantity);
        }
    }
    quantities
}
