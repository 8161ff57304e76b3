//! High-frequency stock polling for a short list of ids.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{LoopContext, PollingLoop};
use crate::config::WatchlistConfig;
use crate::models::{CatalogEvent, EventKind, Product};
use crate::utils::error::Result;

/// Remembers the last quantity per id in memory and announces every
/// 0 to >0 flip straight away, without waiting for the sweep.
pub struct WatchlistLoop {
    ctx: LoopContext,
    interval: Duration,
    last_quantity: HashMap<String, u32>,
}

impl WatchlistLoop {
    pub fn new(ctx: LoopContext, config: &WatchlistConfig) -> Self {
        Self {
            ctx,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            last_quantity: HashMap::new(),
        }
    }

    pub fn last_quantity(&self, id: &str) -> Option<u32> {
        self.last_quantity.get(id).copied()
    }

    async fn announce(&self, id: &str, quantity: u32) -> Result<()> {
        let product = match self.ctx.store.get_product(id).await? {
            Some(mut stored) => {
                stored.quantity = quantity;
                stored
            }
            None => Product::placeholder(id, self.ctx.extractor.http().base_url(), quantity),
        };
        info!("Watchlist: {} is now available (qty={})", id, quantity);
        self.ctx
            .notifier
            .notify(&CatalogEvent::product(EventKind::Available, product))
            .await;
        Ok(())
    }
}

#[async_trait]
impl PollingLoop for WatchlistLoop {
    fn name(&self) -> &'static str {
        "watchlist"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&mut self) -> Result<()> {
        let ids = self.ctx.store.watchlist_ids().await?;
        if ids.is_empty() {
            debug!("Watchlist is empty");
            return Ok(());
        }

        let quantities = self.ctx.extractor.fetch_stock(&ids).await?;
        for id in &ids {
            let quantity = quantities.get(id).copied().unwrap_or(0);
            let previous = self.last_quantity.get(id).copied().unwrap_or(0);
            if previous == 0 && quantity > 0 {
                if let Err(e) = self.announce(id, quantity).await {
                    warn!("Watchlist announcement for {} failed: {}", id, e);
                }
            }
            self.last_quantity.insert(id.clone(), quantity);
        }
        Ok(())
    }
}
