//! Backfills prices the fast paths could not get, a small batch at a time.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::{LoopContext, PollingLoop};
use crate::config::EnrichmentConfig;
use crate::utils::error::Result;

pub struct EnrichmentLoop {
    ctx: LoopContext,
    batch_size: u32,
    delay: Duration,
    interval: Duration,
}

impl EnrichmentLoop {
    pub fn new(ctx: LoopContext, config: &EnrichmentConfig) -> Self {
        Self {
            ctx,
            batch_size: config.batch_size.max(1),
            delay: Duration::from_millis(config.delay_ms),
            interval: Duration::from_secs(config.interval_secs.max(1)),
        }
    }
}

#[async_trait]
impl PollingLoop for EnrichmentLoop {
    fn name(&self) -> &'static str {
        "enrichment"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&mut self) -> Result<()> {
        let mut candidates = self.ctx.store.enrichment_candidates(self.batch_size).await?;
        if candidates.is_empty() {
            debug!("No products need enrichment");
            return Ok(());
        }

        let ids: Vec<String> = candidates.iter().map(|p| p.id.clone()).collect();
        let quantities = self.ctx.extractor.fetch_stock(&ids).await?;
        for product in candidates.iter_mut() {
            product.quantity = quantities.get(&product.id).copied().unwrap_or(0);
        }

        let enriched = self.ctx.extractor.enricher(self.delay).enrich(&mut candidates).await;

        // Price and quantity only; everything else belongs to the sweep.
        for product in &candidates {
            self.ctx
                .store
                .update_price_quantity(&product.id, product.price, product.quantity)
                .await?;
        }

        info!(
            "Enrichment: updated {} products ({} filled from detail pages)",
            candidates.len(),
            enriched
        );
        Ok(())
    }
}
