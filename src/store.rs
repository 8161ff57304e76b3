//! SQLite persistence shared by every polling loop.
//!
//! Every write is a single insert-or-merge statement, so loops racing on the
//! same row cannot lose a known price or URL.

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::models::{ComingSoonEntry, Product, WatchlistEntry};
use crate::utils::error::Result;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS products (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL DEFAULT '',
        price REAL NOT NULL DEFAULT 0,
        image_url TEXT NOT NULL DEFAULT '',
        page_url TEXT NOT NULL DEFAULT '',
        quantity INTEGER NOT NULL DEFAULT 0,
        is_online_exclusive INTEGER NOT NULL DEFAULT 0,
        first_seen TEXT,
        last_seen TEXT,
        removed INTEGER NOT NULL DEFAULT 0,
        available INTEGER NOT NULL DEFAULT 1
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_products_price ON products (price, removed)",
    r#"CREATE TABLE IF NOT EXISTS seen_keys (
        key TEXT PRIMARY KEY,
        first_seen TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS watchlist (
        id TEXT PRIMARY KEY,
        notes TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS coming_soon (
        id TEXT PRIMARY KEY,
        first_seen TEXT NOT NULL,
        last_seen TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1
    )"#,
];

const UPSERT_PRODUCT: &str = r#"
    INSERT INTO products (
        id, name, price, image_url, page_url, quantity,
        is_online_exclusive, first_seen, last_seen, removed, available
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        price = CASE WHEN excluded.price > 0 THEN excluded.price ELSE products.price END,
        image_url = CASE WHEN excluded.image_url <> '' THEN excluded.image_url ELSE products.image_url END,
        page_url = CASE WHEN excluded.page_url <> '' THEN excluded.page_url ELSE products.page_url END,
        quantity = excluded.quantity,
        is_online_exclusive = excluded.is_online_exclusive,
        last_seen = excluded.last_seen,
        removed = excluded.removed,
        available = excluded.available
"#;

const PRODUCT_COLUMNS: &str = "id, name, price, image_url, page_url, quantity, \
     is_online_exclusive, first_seen, last_seen, removed, available";

#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Opens (creating if needed) the database and its schema.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let in_memory = config.url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives as long as its one connection.
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections.max(1))
                .connect_with(options)
                .await?
        };

        let store = Self { pool };
        store.init_schema().await?;
        info!("Store ready at {}", config.url);
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert-or-merge by id. Price only moves to a positive value, URLs
    /// only to non-empty ones; `first_seen` is set once.
    pub async fn upsert_products(&self, products: &[Product]) -> Result<()> {
        if products.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for product in products {
            sqlx::query(UPSERT_PRODUCT)
                .bind(&product.id)
                .bind(&product.name)
                .bind(product.price)
                .bind(&product.image_url)
                .bind(&product.page_url)
                .bind(product.quantity)
                .bind(product.is_online_exclusive)
                .bind(now)
                .bind(now)
                .bind(product.removed)
                .bind(product.available)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("Upserted {} products", products.len());
        Ok(())
    }

    /// Flags rows as gone without touching anything else.
    pub async fn mark_removed(&self, ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("UPDATE products SET removed = 1, available = 0 WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Every stored product keyed by id.
    pub async fn snapshot(&self) -> Result<HashMap<String, Product>> {
        let rows: Vec<Product> = sqlx::query_as(&format!("SELECT {} FROM products", PRODUCT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|p| (p.id.clone(), p)).collect())
    }

    /// Current stored state of one product, without scraping anything.
    pub async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        let product = sqlx::query_as(&format!("SELECT {} FROM products WHERE id = ?", PRODUCT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    pub async fn product_ids(&self) -> Result<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM products")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    pub async fn has_seen(&self, key: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM seen_keys WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    pub async fn mark_seen<S: AsRef<str>>(&self, keys: &[S]) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query("INSERT OR IGNORE INTO seen_keys (key, first_seen) VALUES (?, ?)")
                .bind(key.as_ref())
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn add_to_watchlist(&self, id: &str, notes: Option<&str>) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO watchlist (id, notes) VALUES (?, ?)")
            .bind(id)
            .bind(notes)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn watchlist(&self) -> Result<Vec<WatchlistEntry>> {
        let entries = sqlx::query_as("SELECT id, notes FROM watchlist ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    pub async fn watchlist_ids(&self) -> Result<Vec<String>> {
        Ok(self.watchlist().await?.into_iter().map(|entry| entry.id).collect())
    }

    /// Listed rows still missing a price, least recently seen first, so a
    /// row that keeps failing enrichment cannot hold the head of the queue.
    pub async fn enrichment_candidates(&self, limit: u32) -> Result<Vec<Product>> {
        let rows = sqlx::query_as(&format!(
            "SELECT {} FROM products WHERE price <= 0 AND removed = 0 \
             ORDER BY last_seen ASC, id ASC LIMIT ?",
            PRODUCT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Writes back only price (when positive) and quantity.
    pub async fn update_price_quantity(&self, id: &str, price: f64, quantity: u32) -> Result<()> {
        sqlx::query(
            "UPDATE products SET price = CASE WHEN ? > 0 THEN ? ELSE price END, quantity = ? WHERE id = ?",
        )
        .bind(price)
        .bind(price)
        .bind(quantity)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn active_coming_soon_ids(&self) -> Result<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM coming_soon WHERE active = 1")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    /// Activation refreshes `last_seen` and keeps `first_seen`; deactivation
    /// keeps the row.
    pub async fn mark_coming_soon(&self, ids: &[String], active: bool) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for id in ids {
            if active {
                sqlx::query(
                    "INSERT INTO coming_soon (id, first_seen, last_seen, active) VALUES (?, ?, ?, 1) \
                     ON CONFLICT(id) DO UPDATE SET last_seen = excluded.last_seen, active = 1",
                )
                .bind(id)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            } else {
                sqlx::query("UPDATE coming_soon SET active = 0 WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn coming_soon(&self, id: &str) -> Result<Option<ComingSoonEntry>> {
        let entry = sqlx::query_as(
            "SELECT id, first_seen, last_seen, active FROM coming_soon WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }
}
