//! The five polling loops and the runner that keeps them alive.
//!
//! Each loop is an independent tokio task owning its private state; the
//! store is the only thing they share.

pub mod enrichment;
pub mod front_page;
pub mod full_sweep;
pub mod release;
pub mod watchlist;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::extractor::CatalogExtractor;
use crate::plugins::NotifierManager;
use crate::store::Store;
use crate::utils::error::Result;

pub use enrichment::EnrichmentLoop;
pub use front_page::FrontPageLoop;
pub use full_sweep::FullSweep;
pub use release::ReleaseLoop;
pub use watchlist::WatchlistLoop;

/// What every loop needs: the store, the extractor and the sinks.
#[derive(Clone)]
pub struct LoopContext {
    pub store: Store,
    pub extractor: Arc<CatalogExtractor>,
    pub notifier: NotifierManager,
}

impl LoopContext {
    pub fn new(store: Store, extractor: Arc<CatalogExtractor>, notifier: NotifierManager) -> Self {
        Self {
            store,
            extractor,
            notifier,
        }
    }
}

#[async_trait]
pub trait PollingLoop: Send {
    fn name(&self) -> &'static str;
    fn interval(&self) -> Duration;

    /// One iteration. Errors end the iteration, never the loop.
    async fn run_once(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopStats {
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl LoopStats {
    fn record(&mut self, outcome: std::result::Result<(), String>) {
        self.run_count += 1;
        self.last_run = Some(Utc::now());
        match outcome {
            Ok(()) => self.success_count += 1,
            Err(message) => {
                self.error_count += 1;
                self.last_error = Some(message);
            }
        }
    }
}

/// Runs one iteration with errors and panics contained.
pub async fn run_guarded(job: &mut dyn PollingLoop, stats: &mut LoopStats) {
    let name = job.name();
    let outcome = match AssertUnwindSafe(job.run_once()).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string())),
    };

    let failure = outcome.as_ref().err().cloned();
    stats.record(outcome);
    if let Some(message) = failure {
        error!(
            "{} loop iteration failed ({} of {} runs): {}",
            name, stats.error_count, stats.run_count, message
        );
    }
}

/// Iterate forever: run, then sleep the loop's interval.
pub async fn run_forever(mut job: Box<dyn PollingLoop>) {
    let mut stats = LoopStats::default();
    info!("Starting {} loop (interval {:?})", job.name(), job.interval());
    loop {
        run_guarded(job.as_mut(), &mut stats).await;
        tokio::time::sleep(job.interval()).await;
    }
}

pub struct Scheduler {
    context: LoopContext,
    config: AppConfig,
}

impl Scheduler {
    pub fn new(context: LoopContext, config: AppConfig) -> Self {
        Self { context, config }
    }

    /// The loops switched on in the configuration. The full sweep always runs.
    pub async fn loops(&self) -> Result<Vec<Box<dyn PollingLoop>>> {
        let ctx = &self.context;
        let mut loops: Vec<Box<dyn PollingLoop>> = vec![Box::new(FullSweep::new(ctx.clone(), &self.config))];

        if self.config.watchlist.enabled {
            loops.push(Box::new(WatchlistLoop::new(ctx.clone(), &self.config.watchlist)));
        } else {
            info!("Watchlist disabled.");
        }

        match (self.config.front_page.enabled, self.config.front_page_category()) {
            (true, Some(category)) => {
                let front = FrontPageLoop::seeded(ctx.clone(), &self.config, category).await?;
                loops.push(Box::new(front));
            }
            _ => info!("Front-page scanner disabled."),
        }

        if self.config.enrichment.enabled {
            loops.push(Box::new(EnrichmentLoop::new(ctx.clone(), &self.config.enrichment)));
        } else {
            info!("Price enrichment disabled.");
        }

        if self.config.release.enabled {
            loops.push(Box::new(ReleaseLoop::new(ctx.clone(), &self.config.release)));
        } else {
            info!("Release scanner disabled.");
        }

        Ok(loops)
    }

    pub async fn spawn_all(&self) -> Result<Vec<JoinHandle<()>>> {
        Ok(self
            .loops()
            .await?
            .into_iter()
            .map(|job| tokio::spawn(run_forever(job)))
            .collect())
    }

    /// One guarded iteration of every enabled loop, in order.
    pub async fn run_once_all(&self) -> Result<Vec<(&'static str, LoopStats)>> {
        let mut report = Vec::new();
        for mut job in self.loops().await? {
            let mut stats = LoopStats::default();
            run_guarded(job.as_mut(), &mut stats).await;
            report.push((job.name(), stats));
        }
        Ok(report)
    }
}
