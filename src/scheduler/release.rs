//! Release landing page watcher. Cards have no catalog id; the stable key
//! and its "went live" companion key carry the dedupe.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::{LoopContext, PollingLoop};
use crate::config::ReleaseConfig;
use crate::models::{CatalogEvent, EventKind, ReleaseCard};
use crate::utils::error::Result;

pub struct ReleaseLoop {
    ctx: LoopContext,
    page_url: String,
    interval: Duration,
}

impl ReleaseLoop {
    pub fn new(ctx: LoopContext, config: &ReleaseConfig) -> Self {
        Self {
            ctx,
            page_url: config.page_url.clone(),
            interval: Duration::from_secs(config.interval_minutes.max(3) * 60),
        }
    }

    /// Announces what is new about each card and marks it seen; returns
    /// the number of events emitted.
    pub async fn process_cards(&self, cards: Vec<ReleaseCard>) -> Result<usize> {
        let store = &self.ctx.store;
        let mut emitted = 0;

        for card in cards {
            if !store.has_seen(&card.key).await? {
                self.ctx
                    .notifier
                    .notify(&CatalogEvent::release(EventKind::Release, card.clone()))
                    .await;
                store.mark_seen(&[card.key.as_str()]).await?;
                emitted += 1;
            }

            if card.is_live() {
                let live_key = card.live_key();
                if !store.has_seen(&live_key).await? {
                    self.ctx
                        .notifier
                        .notify(&CatalogEvent::release(EventKind::Live, card))
                        .await;
                    store.mark_seen(&[live_key]).await?;
                    emitted += 1;
                }
            }
        }
        Ok(emitted)
    }
}

#[async_trait]
impl PollingLoop for ReleaseLoop {
    fn name(&self) -> &'static str {
        "release-page"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&mut self) -> Result<()> {
        let cards = self.ctx.extractor.fetch_release_cards(&self.page_url).await;
        if cards.is_empty() {
            info!("Release scanner: no cards (blocked or empty) at {}", self.page_url);
            return Ok(());
        }

        let total = cards.len();
        let emitted = self.process_cards(cards).await?;
        info!("Release scanner: {} cards, {} events", total, emitted);
        Ok(())
    }
}
