use serde::{Deserialize, Serialize};

use super::{Product, ReleaseCard};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    New,
    Available,
    Removed,
    ComingSoon,
    Release,
    Live,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::New => "new",
            EventKind::Available => "available",
            EventKind::Removed => "removed",
            EventKind::ComingSoon => "coming_soon",
            EventKind::Release => "release",
            EventKind::Live => "live",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "subject", rename_all = "snake_case")]
pub enum EventSubject {
    Product(Product),
    Release(ReleaseCard),
}

/// What the core hands to the notification side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEvent {
    pub kind: EventKind,
    pub subject: EventSubject,
}

impl CatalogEvent {
    pub fn product(kind: EventKind, product: Product) -> Self {
        Self {
            kind,
            subject: EventSubject::Product(product),
        }
    }

    pub fn release(kind: EventKind, card: ReleaseCard) -> Self {
        Self {
            kind,
            subject: EventSubject::Release(card),
        }
    }

    pub fn title(&self) -> &str {
        match &self.subject {
            EventSubject::Product(p) => &p.name,
            EventSubject::Release(c) => &c.title,
        }
    }

    pub fn url(&self) -> &str {
        match &self.subject {
            EventSubject::Product(p) => &p.page_url,
            EventSubject::Release(c) => &c.url,
        }
    }

    pub fn as_product(&self) -> Option<&Product> {
        match &self.subject {
            EventSubject::Product(p) => Some(p),
            EventSubject::Release(_) => None,
        }
    }
}
