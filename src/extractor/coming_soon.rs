//! Coming-soon discovery: the structured endpoint sorted by the coming-soon
//! flag, with the listing grid as a fallback.

use serde_json::Value;
use tracing::{debug, warn};

use super::html::listing_records;
use super::structured::{self, PageRequest};
use crate::config::CatalogConfig;
use crate::normalizer::is_coming_soon;
use crate::utils::error::Result;
use crate::utils::http::HttpClient;

pub const GRID_PAGE_SIZE: usize = 12;
const MAX_GRID_PAGES: usize = 50;

#[derive(Debug, Default)]
pub struct ComingSoonScan {
    pub records: Vec<Value>,
    /// False when only the grid fallback answered; absence from such a scan
    /// says nothing.
    pub complete: bool,
}

pub async fn scan(
    http: &HttpClient,
    catalog: &CatalogConfig,
    category_id: &str,
    sort: &str,
) -> Result<ComingSoonScan> {
    let request = PageRequest {
        category_id,
        page_size: catalog.page_size,
        sort: Some(sort),
        max_pages: catalog.max_pages,
    };

    let structured_error = match structured::fetch_all(http, &request).await {
        Ok(records) => {
            let records: Vec<Value> = records.into_iter().filter(is_coming_soon).collect();
            if !records.is_empty() {
                debug!("Category {}: {} coming-soon records", category_id, records.len());
                return Ok(ComingSoonScan {
                    records,
                    complete: true,
                });
            }
            None
        }
        Err(e) => {
            warn!("Coming-soon query for {} failed, trying listing grid: {}", category_id, e);
            Some(e)
        }
    };

    match grid_scan(http, catalog, category_id, sort).await {
        Ok(records) if !records.is_empty() => Ok(ComingSoonScan {
            records,
            complete: false,
        }),
        // The structured query answered cleanly and found nothing; that is
        // a full observation.
        Ok(_) => match structured_error {
            Some(e) => Err(e),
            None => Ok(ComingSoonScan {
                records: Vec::new(),
                complete: true,
            }),
        },
        Err(e) => match structured_error {
            Some(structured_error) => Err(structured_error),
            None => {
                warn!("Listing grid for {} failed: {}", category_id, e);
                Ok(ComingSoonScan {
                    records: Vec::new(),
                    complete: true,
                })
            }
        },
    }
}

/// Walks grid pages until one shows no product tiles at all.
async fn grid_scan(
    http: &HttpClient,
    catalog: &CatalogConfig,
    category_id: &str,
    sort: &str,
) -> Result<Vec<Value>> {
    let mut records = Vec::new();

    for page in 0..MAX_GRID_PAGES {
        let url = format!(
            "{}{}?N={}&Ns={}&Nrpp={}&No={}",
            http.base_url(),
            catalog.listing_path,
            category_id,
            sort,
            GRID_PAGE_SIZE,
            page * GRID_PAGE_SIZE
        );
        let Some(html) = http.get_html(&url).await? else {
            break;
        };
        let scan = listing_records(&html, http.base_url(), true);
        debug!(
            "Grid page {} for {}: {} tiles, {} coming soon",
            page,
            category_id,
            scan.tiles,
            scan.records.len()
        );
        if scan.tiles == 0 {
            break;
        }
        records.extend(scan.records);
    }

    Ok(records)
}
