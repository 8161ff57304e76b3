//! Fast path for brand-new listings: poll the first page of one category
//! and act on any id never seen before, ahead of the slow sweep.

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tracing::info;

use super::{LoopContext, PollingLoop};
use crate::config::AppConfig;
use crate::models::{CatalogEvent, EventKind};
use crate::normalizer::Normalizer;
use crate::utils::error::Result;

pub struct FrontPageLoop {
    ctx: LoopContext,
    category_id: String,
    page_size: u32,
    sort: Option<String>,
    interval: Duration,
    enrich_delay: Duration,
    seen: HashSet<String>,
}

impl FrontPageLoop {
    pub fn new(ctx: LoopContext, config: &AppConfig, category_id: &str, seen: HashSet<String>) -> Self {
        Self {
            ctx,
            category_id: category_id.to_string(),
            page_size: config.front_page.page_size,
            sort: config.front_page.sort.clone(),
            interval: Duration::from_secs(config.front_page.interval_secs.max(1)),
            enrich_delay: Duration::from_millis(config.enrichment.delay_ms),
            seen,
        }
    }

    /// Known ids start out as every product already stored.
    pub async fn seeded(ctx: LoopContext, config: &AppConfig, category_id: &str) -> Result<Self> {
        let seen = ctx.store.product_ids().await?;
        info!(
            "Front-page scanner for category {} starts with {} known ids",
            category_id,
            seen.len()
        );
        Ok(Self::new(ctx, config, category_id, seen))
    }

    pub fn knows(&self, id: &str) -> bool {
        self.seen.contains(id)
    }
}

#[async_trait]
impl PollingLoop for FrontPageLoop {
    fn name(&self) -> &'static str {
        "front-page"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&mut self) -> Result<()> {
        let extractor = &self.ctx.extractor;
        let store = &self.ctx.store;
        let records = extractor
            .fetch_front_page(&self.category_id, self.page_size, self.sort.as_deref())
            .await?;

        for record in &records {
            let Some(id) = Normalizer::record_id(record) else {
                continue;
            };
            if self.seen.contains(&id) {
                continue;
            }
            info!("Front page discovered new id {} ahead of the sweep", id);

            let stock = extractor.fetch_stock(std::slice::from_ref(&id)).await?;
            let mut products = extractor.build_products(std::slice::from_ref(record), &stock);
            if !products.is_empty() && !store.has_seen(&id).await? {
                store.upsert_products(&products).await?;
                store.mark_seen(&[id.as_str()]).await?;
                extractor.enricher(self.enrich_delay).enrich(&mut products).await;
                for product in products {
                    store
                        .update_price_quantity(&product.id, product.price, product.quantity)
                        .await?;
                    self.ctx
                        .notifier
                        .notify(&CatalogEvent::product(EventKind::New, product))
                        .await;
                }
            }
            self.seen.insert(id);
        }
        Ok(())
    }
}
