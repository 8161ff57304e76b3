//! Interchangeable ways of getting a page's content.
//!
//! Release extraction tries each configured [`PageSource`] in order until
//! one yields cards. The browser source is optional; without it only the
//! rendered-page tier is lost.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::utils::error::Result;
use crate::utils::http::HttpClient;

/// An anchor collected from a live DOM (main document, shadow roots, frames).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkItem {
    pub href: String,
    pub title: Option<String>,
    pub img: Option<String>,
    /// Visible text of the enclosing tile, used to infer status.
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
    pub links: Vec<LinkItem>,
    /// JSON bodies observed on the wire while the page loaded.
    pub payloads: Vec<Value>,
}

impl RenderedPage {
    pub fn from_html(url: &str, html: String) -> Self {
        Self {
            url: url.to_string(),
            html,
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait PageSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the page could not be obtained this way.
    async fn load(&self, url: &str) -> Result<Option<RenderedPage>>;
}

/// Plain GET with the client's default identity.
pub struct TransportSource {
    http: Arc<HttpClient>,
}

impl TransportSource {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PageSource for TransportSource {
    fn name(&self) -> &'static str {
        "transport"
    }

    async fn load(&self, url: &str) -> Result<Option<RenderedPage>> {
        Ok(self
            .http
            .get_text(url)
            .await?
            .map(|html| RenderedPage::from_html(url, html)))
    }
}

/// GET dressed up as a browser navigation (warm-up, headers, 403 rotation).
pub struct StaticHtmlSource {
    http: Arc<HttpClient>,
}

impl StaticHtmlSource {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PageSource for StaticHtmlSource {
    fn name(&self) -> &'static str {
        "static-html"
    }

    async fn load(&self, url: &str) -> Result<Option<RenderedPage>> {
        Ok(self
            .http
            .get_html(url)
            .await?
            .map(|html| RenderedPage::from_html(url, html)))
    }
}
