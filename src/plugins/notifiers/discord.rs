use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

use crate::config::DiscordConfig;
use crate::models::{CatalogEvent, EventKind, EventSubject};
use crate::plugins::traits::{EventSink, NotificationResult};
use crate::utils::error::{AppError, Result};

pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
    username: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>, username: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
            username: username.into(),
        })
    }

    /// `None` when no webhook is configured.
    pub fn from_config(config: &DiscordConfig) -> Result<Option<Self>> {
        config
            .webhook_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| Self::new(url, config.username.clone()))
            .transpose()
    }

    fn get_embed_color(&self, kind: EventKind) -> u32 {
        match kind {
            EventKind::New => 0x0099ff,
            EventKind::Available | EventKind::Live => 0x00ff00,
            EventKind::Removed => 0xff3300,
            EventKind::ComingSoon | EventKind::Release => 0xff9900,
        }
    }

    fn get_heading(&self, kind: EventKind) -> &'static str {
        match kind {
            EventKind::New => "🆕 New listing",
            EventKind::Available => "✅ Back in stock",
            EventKind::Removed => "❌ Removed",
            EventKind::ComingSoon => "⏳ Coming soon",
            EventKind::Release => "📣 New release",
            EventKind::Live => "🚀 Release is live",
        }
    }

    fn create_embed(&self, event: &CatalogEvent) -> Value {
        let mut fields = Vec::new();
        let mut image = None;

        match &event.subject {
            EventSubject::Product(product) => {
                let price = if product.has_price() {
                    format!("${:.2}", product.price)
                } else {
                    "Unknown".to_string()
                };
                fields.push(json!({"name": "💰 Price", "value": price, "inline": true}));
                fields.push(json!({"name": "📦 Quantity", "value": product.quantity.to_string(), "inline": true}));
                fields.push(json!({"name": "🔖 Id", "value": product.id, "inline": true}));
                if product.is_online_exclusive {
                    fields.push(json!({"name": "🌐 Online exclusive", "value": "Yes", "inline": true}));
                }
                if !product.image_url.is_empty() {
                    image = Some(product.image_url.clone());
                }
            }
            EventSubject::Release(card) => {
                fields.push(json!({"name": "📋 Status", "value": card.status.as_str(), "inline": true}));
                image = card.image_url.clone();
            }
        }

        let mut embed = json!({
            "title": format!("{}: {}", self.get_heading(event.kind), event.title()),
            "url": event.url(),
            "color": self.get_embed_color(event.kind),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "fields": fields,
            "footer": {"text": self.username},
        });
        if let Some(image) = image {
            embed["thumbnail"] = json!({ "url": image });
        }
        embed
    }

    fn create_webhook_payload(&self, event: &CatalogEvent) -> Value {
        json!({
            "username": self.username,
            "embeds": [self.create_embed(event)],
        })
    }
}

#[async_trait]
impl EventSink for DiscordNotifier {
    fn name(&self) -> &str {
        "Discord Notifier"
    }

    fn plugin_type(&self) -> &str {
        "discord"
    }

    async fn notify(&self, event: &CatalogEvent) -> Result<NotificationResult> {
        let payload = self.create_webhook_payload(event);
        let response = self.client.post(&self.webhook_url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Notifier {
                notifier: self.plugin_type().to_string(),
                message: format!("webhook answered {}", status),
            });
        }

        Ok(NotificationResult::delivered(
            response.headers().get("x-ratelimit-bucket").and_then(|v| v.to_str().ok()).map(str::to_string),
        ))
    }
}
