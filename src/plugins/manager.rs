use std::sync::Arc;
use tracing::{debug, warn};

use super::notifiers::{DiscordNotifier, LogNotifier};
use super::traits::EventSink;
use crate::config::NotificationsConfig;
use crate::models::CatalogEvent;
use crate::utils::error::Result;

pub type EventSinkBox = Arc<dyn EventSink>;

/// Fans each event out to every registered sink. A failing sink is logged
/// and skipped; it never reaches the loop that produced the event.
#[derive(Clone, Default)]
pub struct NotifierManager {
    sinks: Vec<EventSinkBox>,
}

impl NotifierManager {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Log sink always, Discord when a webhook is configured.
    pub fn from_config(config: &NotificationsConfig) -> Result<Self> {
        let mut manager = Self::new();
        manager.register(Arc::new(LogNotifier::new()));
        if let Some(discord) = DiscordNotifier::from_config(&config.discord)? {
            manager.register(Arc::new(discord));
        }
        Ok(manager)
    }

    pub fn register(&mut self, sink: EventSinkBox) {
        debug!("Registered {} sink", sink.plugin_type());
        self.sinks.push(sink);
    }

    pub fn list_sink_types(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.plugin_type().to_string()).collect()
    }

    /// Returns how many sinks accepted the event.
    pub async fn notify(&self, event: &CatalogEvent) -> usize {
        let mut delivered = 0;
        for sink in &self.sinks {
            match sink.notify(event).await {
                Ok(result) if result.success => delivered += 1,
                Ok(_) => warn!("{} declined {} event for {}", sink.name(), event.kind, event.title()),
                Err(e) => warn!("{} failed on {} event for {}: {}", sink.name(), event.kind, event.title(), e),
            }
        }
        delivered
    }

    pub async fn notify_all(&self, events: &[CatalogEvent]) -> usize {
        let mut delivered = 0;
        for event in events {
            delivered += self.notify(event).await;
        }
        delivered
    }
}
