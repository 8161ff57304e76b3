use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct WatchlistEntry {
    pub id: String,
    pub notes: Option<String>,
}

/// Rows are deactivated, never deleted, so first_seen survives an item
/// dropping off the coming-soon list and coming back.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ComingSoonEntry {
    pub id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub active: bool,
}
