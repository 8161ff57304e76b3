use serde::{Deserialize, Serialize};

/// Where a release-page card stands, as far as its visible text tells.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    #[default]
    Unknown,
    ComingSoon,
    SoldOut,
    Live,
}

impl ReleaseStatus {
    pub fn from_text(text: &str) -> Self {
        let text = text.to_lowercase();
        if text.contains("shop now") || text.contains("add to cart") || text.contains("buy") {
            ReleaseStatus::Live
        } else if text.contains("coming soon") {
            ReleaseStatus::ComingSoon
        } else if text.contains("sold out") || text.contains("out of stock") {
            ReleaseStatus::SoldOut
        } else {
            ReleaseStatus::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Unknown => "unknown",
            ReleaseStatus::ComingSoon => "coming_soon",
            ReleaseStatus::SoldOut => "sold_out",
            ReleaseStatus::Live => "live",
        }
    }
}

/// A tile on the release landing page. There is no catalog id, so identity
/// is the stable key derived from the card's normalized URL (or title).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseCard {
    pub key: String,
    pub title: String,
    pub url: String,
    pub image_url: Option<String>,
    pub status: ReleaseStatus,
}

impl ReleaseCard {
    pub fn is_live(&self) -> bool {
        self.status == ReleaseStatus::Live
    }

    /// Seen-key recorded once the card has been announced as live.
    pub fn live_key(&self) -> String {
        format!("release_live:{}", self.key)
    }
}
