use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::CatalogEvent;
use crate::utils::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
}

impl NotificationResult {
    pub fn delivered(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
        }
    }
}

/// Receiver of catalog events (log, Discord, ...).
///
/// Sinks report failures as errors; the caller decides that a failed
/// delivery never interrupts detection.
#[async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;
    fn plugin_type(&self) -> &str;

    async fn notify(&self, event: &CatalogEvent) -> Result<NotificationResult>;
}
