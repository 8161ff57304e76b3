//! The slow, thorough sweep over every configured category. The only loop
//! that sees the whole catalog, so the only one allowed to infer removal.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{info, warn};

use super::{LoopContext, PollingLoop};
use crate::config::{AppConfig, SweepConfig};
use crate::detector::ChangeDetector;
use crate::extractor::CatalogExtractor;
use crate::models::{CatalogEvent, EventKind, Product};
use crate::utils::error::{AppError, Result};

/// What one category contributed to the sweep.
#[derive(Debug, Default)]
pub struct CategoryOutcome {
    pub ids: HashSet<String>,
    pub complete: bool,
    pub notified: usize,
}

#[derive(Debug, Default)]
struct ComingSoonOutcome {
    ids: HashSet<String>,
    complete: bool,
}

pub struct FullSweep {
    ctx: LoopContext,
    config: SweepConfig,
    detector: ChangeDetector,
    enrich_delay: Duration,
}

impl FullSweep {
    pub fn new(ctx: LoopContext, config: &AppConfig) -> Self {
        Self {
            ctx,
            detector: ChangeDetector::from_config(&config.sweep),
            config: config.sweep.clone(),
            enrich_delay: Duration::from_millis(config.enrichment.delay_ms),
        }
    }

    /// Fetch, stock, normalize, upsert, diff, enrich, notify for one category.
    pub async fn sweep_category(&self, category_id: &str) -> Result<CategoryOutcome> {
        let extractor = &self.ctx.extractor;
        let store = &self.ctx.store;

        let fetch = extractor.fetch_catalog(category_id).await?;
        let ids = CatalogExtractor::record_ids(&fetch.records);
        if ids.is_empty() {
            warn!("No items returned for category {}", category_id);
            return Ok(CategoryOutcome {
                complete: fetch.is_complete(),
                ..Default::default()
            });
        }

        // A failed stock lookup fails the category; missing stock is not zero.
        let stock = extractor.fetch_stock(&ids).await?;
        let mut products = extractor.build_products(&fetch.records, &stock);

        let prior = store.snapshot().await?;
        store.upsert_products(&products).await?;
        info!("Upserted {} products for category {}", products.len(), category_id);

        let mut changes = self.detector.diff(&prior, &mut products);

        // The seen-key set is the dedupe point shared with the front page.
        let mut fresh_new = Vec::with_capacity(changes.new.len());
        for product in changes.new.drain(..) {
            if !store.has_seen(&product.id).await? {
                fresh_new.push(product);
            }
        }
        changes.new = fresh_new;
        self.detector.cap(&mut changes);

        if self.config.enrich_notified && !changes.is_empty() {
            let enricher = extractor.enricher(self.enrich_delay);
            let mut to_enrich: Vec<Product> = changes.notified_mut().map(|p| p.clone()).collect();
            if enricher.enrich(&mut to_enrich).await > 0 {
                let enriched: HashMap<String, Product> =
                    to_enrich.into_iter().map(|p| (p.id.clone(), p)).collect();
                for product in changes.notified_mut() {
                    if let Some(better) = enriched.get(&product.id) {
                        *product = better.clone();
                        store
                            .update_price_quantity(&product.id, product.price, product.quantity)
                            .await?;
                    }
                }
            }
        }

        let events = changes.events();
        let notified = events.len();
        self.ctx.notifier.notify_all(&events).await;

        let new_ids: Vec<&str> = changes.new.iter().map(|p| p.id.as_str()).collect();
        store.mark_seen(&new_ids).await?;

        if changes.is_empty() {
            info!("No product changes detected this cycle for category {}", category_id);
        } else {
            info!(
                "Category {}: {} new, {} restocked",
                category_id,
                changes.new.len(),
                changes.restocked.len()
            );
        }

        Ok(CategoryOutcome {
            ids: products.into_iter().map(|p| p.id).collect(),
            complete: fetch.is_complete(),
            notified,
        })
    }

    async fn scan_coming_soon(
        &self,
        category_id: &str,
        previously_active: &HashSet<String>,
        announced: &HashSet<String>,
    ) -> Result<ComingSoonOutcome> {
        let scan = self
            .ctx
            .extractor
            .fetch_coming_soon(category_id, &self.config.coming_soon_sort)
            .await?;
        let products = self.ctx.extractor.build_products(&scan.records, &HashMap::new());
        let ids: Vec<String> = products.iter().map(|p| p.id.clone()).collect();

        self.ctx.store.mark_coming_soon(&ids, true).await?;

        let newly_active = products
            .into_iter()
            .filter(|p| !previously_active.contains(&p.id) && !announced.contains(&p.id));
        for product in newly_active {
            info!("Coming soon: {} ({})", product.name, product.id);
            self.ctx
                .notifier
                .notify(&CatalogEvent::product(EventKind::ComingSoon, product))
                .await;
        }

        Ok(ComingSoonOutcome {
            ids: ids.into_iter().collect(),
            complete: scan.complete,
        })
    }

    /// Marks and announces rows a complete sweep no longer returns.
    async fn apply_removals(&self, prior: &HashMap<String, Product>, observed: &HashSet<String>) -> Result<usize> {
        let removed = self.detector.detect_removed(prior, observed);
        if removed.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = removed.iter().map(|p| p.id.clone()).collect();
        self.ctx.store.mark_removed(&ids).await?;
        for mut product in removed {
            product.removed = true;
            product.available = false;
            self.ctx
                .notifier
                .notify(&CatalogEvent::product(EventKind::Removed, product))
                .await;
        }
        info!("Marked {} products as removed", ids.len());
        Ok(ids.len())
    }
}

#[async_trait]
impl PollingLoop for FullSweep {
    fn name(&self) -> &'static str {
        "full-sweep"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_minutes * 60)
    }

    async fn run_once(&mut self) -> Result<()> {
        let categories: Vec<String> = self
            .ctx
            .extractor
            .catalog()
            .category_ids
            .iter()
            .filter(|id| !id.trim().is_empty())
            .cloned()
            .collect();

        let prior = self.ctx.store.snapshot().await?;
        let previously_coming = if self.config.track_coming_soon {
            self.ctx.store.active_coming_soon_ids().await?
        } else {
            HashSet::new()
        };

        let mut observed = HashSet::new();
        let mut complete = !categories.is_empty();
        let mut coming_observed = HashSet::new();
        let mut coming_complete = true;
        let mut failures = Vec::new();

        for category_id in &categories {
            info!("Starting sweep for category {}", category_id);
            match self.sweep_category(category_id).await {
                Ok(outcome) => {
                    complete &= outcome.complete;
                    observed.extend(outcome.ids);
                }
                Err(e) => {
                    warn!("Sweep of category {} failed: {}", category_id, e);
                    complete = false;
                    failures.push(format!("{}: {}", category_id, e));
                }
            }

            if self.config.track_coming_soon {
                let scan = self
                    .scan_coming_soon(category_id, &previously_coming, &coming_observed)
                    .await;
                match scan {
                    Ok(outcome) => {
                        coming_complete &= outcome.complete;
                        coming_observed.extend(outcome.ids);
                    }
                    Err(e) => {
                        warn!("Coming-soon scan of category {} failed: {}", category_id, e);
                        coming_complete = false;
                    }
                }
            }
        }

        if complete {
            self.apply_removals(&prior, &observed).await?;
        } else if self.detector.removed_events {
            info!("Skipping removal check: not every category was fully observed");
        }

        if self.config.track_coming_soon && coming_complete {
            let stale: Vec<String> = previously_coming.difference(&coming_observed).cloned().collect();
            if !stale.is_empty() {
                info!("{} items left the coming-soon list", stale.len());
                self.ctx.store.mark_coming_soon(&stale, false).await?;
            }
        }

        info!(
            "Sweep finished over {} categories; sleeping {} minutes",
            categories.len(),
            self.config.interval_minutes
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::Internal(format!("sweep incomplete: {}", failures.join("; "))))
        }
    }
}
