//! HTTP client shared by every extraction tier.
//!
//! JSON endpoints go through a bounded exponential-backoff retry. HTML pages
//! are fetched with browser-like header profiles and a same-site warm-up
//! request so the session carries the cookies a real visitor would have.

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::utils::error::{AppError, Result};

/// Browser identities rotated through when a page answers 403.
const BROWSER_PROFILES: &[BrowserProfile] = &[
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        platform: "\"Windows\"",
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        platform: "\"macOS\"",
    },
];

#[derive(Debug, Clone, Copy)]
struct BrowserProfile {
    user_agent: &'static str,
    platform: &'static str,
}

impl BrowserProfile {
    fn headers(&self, referer: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(self.user_agent));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
        headers.insert("Sec-Fetch-User", HeaderValue::from_static("?1"));
        headers.insert("Sec-Ch-Ua-Platform", HeaderValue::from_static(self.platform));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
        if let Ok(value) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, value);
        }
        headers
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Delays between attempts: base, 2*base, 4*base ... capped at `max_delay`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let factor = (self.base_delay.as_millis() as u64 / 2).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(self.max_delay)
            .take(self.attempts.saturating_sub(1))
    }
}

pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
    base_url: String,
    warmed_up: AtomicBool,
}

impl HttpClient {
    pub fn new(config: &HttpConfig, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            retry: RetryPolicy::from_config(config),
            base_url: base_url.trim_end_matches('/').to_string(),
            warmed_up: AtomicBool::new(false),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// GET a JSON document, retrying transient failures with backoff.
    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        RetryIf::spawn(
            self.retry.delays(),
            || self.get_json_once(url, query),
            |err: &AppError| {
                let transient = err.is_transient();
                if transient {
                    warn!("Transient error fetching {}, retrying: {}", url, err);
                }
                transient
            },
        )
        .await
    }

    async fn get_json_once(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Plain GET with the client's default identity. Non-2xx answers yield `None`.
    pub async fn get_text(&self, url: &str) -> Result<Option<String>> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            debug!("GET {} answered {}", url, response.status());
            return Ok(None);
        }
        Ok(Some(response.text().await?))
    }

    /// GET an HTML page the way a browser would: warm-up visit to the home
    /// page, navigation headers, a cache-busting parameter, and a second
    /// identity when the first one is refused.
    pub async fn get_html(&self, url: &str) -> Result<Option<String>> {
        self.warm_up().await;

        let referer = format!("{}/", self.base_url);
        let cache_buster = chrono::Utc::now().timestamp_millis().to_string();

        for profile in BROWSER_PROFILES {
            let response = self
                .client
                .get(url)
                .query(&[("_", cache_buster.as_str())])
                .headers(profile.headers(&referer))
                .send()
                .await?;

            match response.status() {
                status if status.is_success() => return Ok(Some(response.text().await?)),
                StatusCode::FORBIDDEN => {
                    debug!("{} refused profile {}, rotating", url, profile.user_agent);
                    self.warmed_up.store(false, Ordering::Relaxed);
                    self.warm_up().await;
                }
                status => {
                    debug!("GET {} answered {}", url, status);
                    return Ok(None);
                }
            }
        }

        Ok(None)
    }

    async fn warm_up(&self) {
        if self.warmed_up.swap(true, Ordering::Relaxed) {
            return;
        }
        let home = format!("{}/", self.base_url);
        if let Err(e) = self
            .client
            .get(&home)
            .headers(BROWSER_PROFILES[0].headers(&home))
            .send()
            .await
        {
            debug!("Warm-up request to {} failed: {}", home, e);
            self.warmed_up.store(false, Ordering::Relaxed);
        }
    }
}
