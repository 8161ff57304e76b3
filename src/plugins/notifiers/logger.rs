use async_trait::async_trait;
use tracing::info;

use crate::models::{CatalogEvent, EventSubject};
use crate::plugins::traits::{EventSink, NotificationResult};
use crate::utils::error::Result;

/// Writes every event to the log. Always registered.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventSink for LogNotifier {
    fn name(&self) -> &str {
        "Log Notifier"
    }

    fn plugin_type(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &CatalogEvent) -> Result<NotificationResult> {
        match &event.subject {
            EventSubject::Product(product) => info!(
                event = %event.kind,
                id = %product.id,
                price = product.price,
                quantity = product.quantity,
                online_exclusive = product.is_online_exclusive,
                "{} {}",
                product.name,
                product.page_url
            ),
            EventSubject::Release(card) => info!(
                event = %event.kind,
                key = %card.key,
                status = card.status.as_str(),
                "{} {}",
                card.title,
                card.url
            ),
        }
        Ok(NotificationResult::delivered(None))
    }
}
