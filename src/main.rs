use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use shelf_watcher::AppConfig;
use shelf_watcher::config::LoggingConfig;
use shelf_watcher::extractor::CatalogExtractor;
use shelf_watcher::plugins::NotifierManager;
use shelf_watcher::scheduler::{LoopContext, Scheduler};
use shelf_watcher::store::Store;
use shelf_watcher::utils::http::HttpClient;

#[derive(Parser, Debug)]
#[command(name = "shelf-watcher", version, about = "Catalog inventory watcher")]
struct Cli {
    /// Directory holding default.toml / {RUN_MODE}.toml / local.toml
    #[arg(short, long, default_value = "config")]
    config: PathBuf,

    /// Run one iteration of every enabled loop, then exit
    #[arg(long)]
    once: bool,

    /// Add product ids to the watchlist before starting
    #[arg(long, num_args = 1..)]
    watch: Vec<String>,

    /// Print the stored product as JSON and exit
    #[arg(long, value_name = "ID")]
    show: Option<String>,
}

fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!("shelf_watcher={}", config.level))
    })?;

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "shelf-watcher.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config).context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging)?;

    info!("Starting Shelf Watcher...");

    // The one fatal step: without a store nothing else can work.
    let store = Store::connect(&config.database)
        .await
        .context("Failed to initialize the store")?;

    if let Some(id) = &cli.show {
        match store.get_product(id).await? {
            Some(product) => println!("{}", serde_json::to_string_pretty(&product)?),
            None => {
                warn!("No stored product with id {}", id);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let seeded = config.watchlist.ids.iter().map(|id| (id, "seeded from config"));
    let requested = cli.watch.iter().map(|id| (id, "added from command line"));
    for (id, note) in seeded.chain(requested) {
        store.add_to_watchlist(id.trim(), Some(note)).await?;
    }

    let http = Arc::new(HttpClient::new(&config.http, &config.catalog.base_url)?);
    let extractor = Arc::new(CatalogExtractor::from_config(&config, http));
    let notifier = NotifierManager::from_config(&config.notifications)?;
    info!("Notification sinks: {}", notifier.list_sink_types().join(", "));

    info!(
        "Monitoring categories {} every {} minutes",
        config.catalog.category_ids.join(", "),
        config.sweep.interval_minutes
    );

    let scheduler = Scheduler::new(LoopContext::new(store, extractor, notifier), config);

    if cli.once {
        for (name, stats) in scheduler.run_once_all().await? {
            match stats.last_error {
                Some(e) => error!("{} failed: {}", name, e),
                None => info!("{} completed", name),
            }
        }
        return Ok(());
    }

    let handles = scheduler.spawn_all().await?;
    info!("{} loops running", handles.len());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    for handle in handles {
        handle.abort();
    }

    Ok(())
}
