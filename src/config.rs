use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use url::Url;

const LIST_KEYS: &[&str] = &[
    "catalog.category_ids",
    "catalog.online_exclusive_category_ids",
    "watchlist.ids",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub sweep: SweepConfig,
    pub watchlist: WatchlistConfig,
    pub front_page: FrontPageConfig,
    pub enrichment: EnrichmentConfig,
    pub release: ReleaseConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub category_ids: Vec<String>,
    pub online_exclusive_category_ids: Vec<String>,
    /// Records requested per structured-catalog page.
    pub page_size: u32,
    pub sort: Option<String>,
    pub legacy_category_id: String,
    pub stock_chunk_size: usize,
    /// Hard stop for servers that ignore the offset parameter.
    pub max_pages: u32,
    pub listing_path: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.finewineandgoodspirits.com".to_string(),
            category_ids: vec!["4036262580".to_string()],
            online_exclusive_category_ids: vec!["3030473779".to_string()],
            page_size: 2000,
            sort: None,
            legacy_category_id: "151".to_string(),
            stock_chunk_size: 50,
            max_pages: 500,
            listing_path: "/whiskey/151".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub retry_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retry_attempts: 5,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 10_000,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://monitor.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub interval_minutes: u64,
    pub restock_events: bool,
    pub removed_events: bool,
    /// Upper bound on new/restocked notifications per category and cycle, 0 = unlimited.
    pub max_notify: usize,
    pub enrich_notified: bool,
    pub track_coming_soon: bool,
    pub coming_soon_sort: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 10,
            restock_events: true,
            removed_events: false,
            max_notify: 0,
            enrich_notified: true,
            track_coming_soon: false,
            coming_soon_sort: "B2CProduct.b2c_comingSoon|1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchlistConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub ids: Vec<String>,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 5,
            ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontPageConfig {
    pub enabled: bool,
    /// Falls back to the first catalog category when unset.
    pub category_id: Option<String>,
    pub page_size: u32,
    pub sort: Option<String>,
    pub interval_secs: u64,
}

impl Default for FrontPageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            category_id: None,
            page_size: 120,
            sort: None,
            interval_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub batch_size: u32,
    pub delay_ms: u64,
    pub interval_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: 10,
            delay_ms: 1500,
            interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    pub enabled: bool,
    pub page_url: String,
    pub interval_minutes: u64,
    pub use_browser: bool,
    pub browser_timeout_ms: u64,
    pub chrome_path: Option<String>,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            page_url: "https://www.finewineandgoodspirits.com/whiskey-release/whiskey-release".to_string(),
            interval_minutes: 15,
            use_browser: false,
            browser_timeout_ms: 120_000,
            chrome_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub discord: DiscordConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub webhook_url: Option<String>,
    pub username: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            username: "Shelf Watcher".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load("config")
    }

    pub fn load(config_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = config_dir.as_ref();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut environment = Environment::with_prefix("SHELF")
            .separator("__")
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            environment = environment.with_list_parse_key(key);
        }

        let s = Config::builder()
            .add_source(File::from(dir.join("default")).required(false))
            .add_source(File::from(dir.join(&run_mode)).required(false))
            // Local overrides, ignored by git
            .add_source(File::from(dir.join("local")).required(false))
            .add_source(environment)
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.release.chrome_path.is_none() {
            config.release.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.catalog.base_url).is_err() {
            return Err(ConfigError::Message("Invalid catalog base URL format".into()));
        }

        if self.catalog.category_ids.iter().all(|id| id.trim().is_empty()) {
            return Err(ConfigError::Message("At least one catalog category id is required".into()));
        }

        if self.catalog.page_size == 0 {
            return Err(ConfigError::Message("Catalog page_size must be greater than 0".into()));
        }

        if self.catalog.stock_chunk_size == 0 {
            return Err(ConfigError::Message("Catalog stock_chunk_size must be greater than 0".into()));
        }

        if self.http.retry_attempts == 0 {
            return Err(ConfigError::Message("HTTP retry_attempts must be at least 1".into()));
        }

        if self.http.retry_base_delay_ms > self.http.retry_max_delay_ms {
            return Err(ConfigError::Message("HTTP retry_base_delay_ms cannot exceed retry_max_delay_ms".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if self.sweep.interval_minutes == 0 {
            return Err(ConfigError::Message("Sweep interval_minutes must be greater than 0".into()));
        }

        if self.enrichment.enabled && self.enrichment.batch_size == 0 {
            return Err(ConfigError::Message("Enrichment batch_size must be greater than 0".into()));
        }

        if self.release.enabled && Url::parse(&self.release.page_url).is_err() {
            return Err(ConfigError::Message("Invalid release page URL format".into()));
        }

        if let Some(webhook) = &self.notifications.discord.webhook_url {
            if Url::parse(webhook).is_err() {
                return Err(ConfigError::Message("Invalid Discord webhook URL format".into()));
            }
        }

        if self.release.interval_minutes < 3 {
            return Err(ConfigError::Message("Release interval_minutes must be at least 3".into()));
        }

        Ok(())
    }

    /// Category polled by the front-page loop.
    pub fn front_page_category(&self) -> Option<&str> {
        self.front_page
            .category_id
            .as_deref()
            .or_else(|| self.catalog.category_ids.first().map(String::as_str))
    }
}
