//! Rendered-page source backed by headless Chrome.
//!
//! Expensive and fragile by nature: every failure (missing binary, crash,
//! timeout) is logged and reported as "no page", never as an error.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network::events::ResponseReceivedEventParams;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::source::{LinkItem, PageSource, RenderedPage};
use crate::config::ReleaseConfig;

const SNIFF_URL_HINTS: &[&str] = &["/ccstore/", "/osf/", "/assembler/", "/content", "/pages"];
const SCROLL_STEPS: u32 = 12;
const SCROLL_STEP_PX: u32 = 800;
const RETRY_DELAY: Duration = Duration::from_millis(1500);

/// Collects product anchors from the document, every open shadow root and
/// every same-origin iframe. Returns a JSON string so the value survives
/// the protocol round-trip intact.
const COLLECT_LINKS_JS: &str = r#"
(() => {
  const results = []; const seen = new Set();
  const walk = (root) => {
    root.querySelectorAll('a[href*="/product/"]').forEach(a => {
      const href = a.href;
      if (!href || seen.has(href)) return;
      seen.add(href);
      const c = a.closest('article, .card, .teaser, .tile, .grid__item, .c-card, .cc-card, .cc-tile') || a;
      const t = c.querySelector('h1,h2,h3,h4') || a;
      const title = (t.textContent || a.getAttribute('aria-label') || a.getAttribute('title') || href).trim();
      const imgEl = c.querySelector('img');
      results.push({ href, title, img: imgEl && imgEl.src ? imgEl.src : null, status: c.textContent || '' });
    });
    root.querySelectorAll('*').forEach(el => { if (el.shadowRoot) walk(el.shadowRoot); });
  };
  walk(document);
  document.querySelectorAll('iframe, frame').forEach(f => {
    try { if (f.contentDocument) walk(f.contentDocument); } catch (e) {}
  });
  return JSON.stringify(results);
})()
"#;

fn scroll_js() -> String {
    format!(
        r#"(async () => {{
  for (let i = 0; i < {steps}; i++) {{
    window.scrollBy(0, {px});
    await new Promise(r => setTimeout(r, 250));
  }}
  return true;
}})()"#,
        steps = SCROLL_STEPS,
        px = SCROLL_STEP_PX
    )
}

#[derive(Debug, Clone)]
struct RenderJob {
    base_url: String,
    timeout: Duration,
    chrome_path: Option<PathBuf>,
    user_agent: String,
}

pub struct BrowserSource {
    job: RenderJob,
}

impl BrowserSource {
    pub fn new(config: &ReleaseConfig, base_url: &str, user_agent: &str) -> Self {
        Self {
            job: RenderJob {
                base_url: base_url.trim_end_matches('/').to_string(),
                timeout: Duration::from_millis(config.browser_timeout_ms),
                chrome_path: config.chrome_path.as_ref().map(PathBuf::from),
                user_agent: user_agent.to_string(),
            },
        }
    }
}

#[async_trait]
impl PageSource for BrowserSource {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn load(&self, url: &str) -> crate::Result<Option<RenderedPage>> {
        let job = self.job.clone();
        let target = url.to_string();
        // Navigation timeouts are enforced inside; this outer bound only
        // covers a browser that stops answering altogether.
        let deadline = job.timeout * 2;

        let rendered = tokio::time::timeout(
            deadline,
            tokio::task::spawn_blocking(move || render(&job, &target)),
        )
        .await;

        match rendered {
            Ok(Ok(Ok(page))) => {
                info!(
                    "Browser rendered {}: {} links, {} sniffed payloads",
                    url,
                    page.links.len(),
                    page.payloads.len()
                );
                Ok(Some(page))
            }
            Ok(Ok(Err(e))) => {
                warn!("Browser render of {} failed: {}", url, e);
                Ok(None)
            }
            Ok(Err(e)) => {
                warn!("Browser worker for {} panicked: {}", url, e);
                Ok(None)
            }
            Err(_) => {
                warn!("Browser render of {} exceeded {:?}", url, deadline);
                Ok(None)
            }
        }
    }
}

fn launch(job: &RenderJob) -> Result<Browser> {
    let mut options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(false)
        .idle_browser_timeout(job.timeout)
        .args(vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-gpu"),
            OsStr::new("--disable-extensions"),
        ])
        .build()
        .map_err(|e| anyhow!("Failed to create launch options: {}", e))?;

    if let Some(path) = &job.chrome_path {
        options.path = Some(path.clone());
    }

    Browser::new(options).map_err(|e| anyhow!("Failed to launch browser: {}", e))
}

/// JSON responses from the storefront's catalog-ish endpoints.
fn is_catalog_json(mime_type: &str, url: &str) -> bool {
    mime_type.contains("json") && SNIFF_URL_HINTS.iter().any(|hint| url.contains(hint))
}

fn sniff_responses(tab: &Tab) -> Result<Arc<Mutex<Vec<Value>>>> {
    let sniffed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sniffed);

    tab.register_response_handling(
        "catalog-sniffer",
        Box::new(move |event: ResponseReceivedEventParams, fetch_body| {
            let response = &event.response;
            if !is_catalog_json(&response.mime_type, &response.url) {
                return;
            }
            let Ok(body) = fetch_body() else {
                return;
            };
            if body.base_64_encoded {
                return;
            }
            if let Ok(value) = serde_json::from_str::<Value>(&body.body) {
                if let Ok(mut payloads) = sink.lock() {
                    payloads.push(value);
                }
            }
        }),
    )?;

    Ok(sniffed)
}

fn collect_links(tab: &Tab) -> Vec<LinkItem> {
    let raw = match tab.evaluate(COLLECT_LINKS_JS, false) {
        Ok(object) => object.value,
        Err(e) => {
            debug!("Link collector failed: {}", e);
            return Vec::new();
        }
    };
    parse_links(raw.as_ref())
}

/// The collector script answers with a JSON string; anything else is no links.
fn parse_links(raw: Option<&Value>) -> Vec<LinkItem> {
    raw.and_then(Value::as_str)
        .and_then(|json| serde_json::from_str::<Vec<LinkItem>>(json).ok())
        .unwrap_or_default()
}

fn render(job: &RenderJob, url: &str) -> Result<RenderedPage> {
    let browser = launch(job)?;
    let tab = browser.new_tab()?;
    tab.set_default_timeout(job.timeout);
    tab.set_user_agent(&job.user_agent, Some("en-US,en;q=0.9"), None)?;

    let sniffed = sniff_responses(&tab)?;

    // Same-site visit first so the real navigation carries session cookies.
    if let Err(e) = tab
        .navigate_to(&format!("{}/", job.base_url))
        .and_then(|t| t.wait_until_navigated())
    {
        debug!("Browser warm-up failed: {}", e);
    }

    tab.navigate_to(url)?;
    tab.wait_until_navigated()?;

    if let Err(e) = tab.evaluate(&scroll_js(), true) {
        debug!("Auto-scroll failed: {}", e);
    }

    let mut links = collect_links(&tab);
    if links.is_empty() {
        std::thread::sleep(RETRY_DELAY);
        links = collect_links(&tab);
    }

    let html = tab.get_content().unwrap_or_default();
    let payloads = sniffed
        .lock()
        .map(|mut guard| std::mem::take(&mut *guard))
        .unwrap_or_default();

    if let Err(e) = tab.close(true) {
        debug!("Closing tab failed: {}", e);
    }

    Ok(RenderedPage {
        url: url.to_string(),
        html,
        links,
        payloads,
    })
}
