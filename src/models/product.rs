use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A catalog item as the watcher knows it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,

    /// 0.0 means unknown, never free.
    pub price: f64,
    pub image_url: String,
    pub page_url: String,
    pub quantity: u32,
    pub is_online_exclusive: bool,

    // Lifecycle
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub removed: bool,
    pub available: bool,
}

impl Product {
    /// A freshly observed, listed item. Timestamps are assigned by the store.
    pub fn observed(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price: 0.0,
            image_url: String::new(),
            page_url: String::new(),
            quantity: 0,
            is_online_exclusive: false,
            first_seen: None,
            last_seen: None,
            removed: false,
            available: true,
        }
    }

    /// Stand-in for an id that was never stored, e.g. a watchlist entry that
    /// came back in stock before any sweep saw it.
    pub fn placeholder(id: &str, base_url: &str, quantity: u32) -> Self {
        let mut product = Self::observed(id, format!("Product {}", id));
        product.page_url = format!("{}/product/{}", base_url.trim_end_matches('/'), id);
        product.quantity = quantity;
        product
    }

    pub fn has_price(&self) -> bool {
        self.price > 0.0
    }

    pub fn in_stock(&self) -> bool {
        self.quantity > 0
    }

    /// True when the detail page may fill in something the API left out.
    pub fn needs_enrichment(&self) -> bool {
        !self.has_price() || !self.in_stock() || self.image_url.is_empty()
    }
}
