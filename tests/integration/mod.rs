// Integration tests for Shelf Watcher
// These run the extractor, store and loops against a mock catalog server.

pub mod extractor_tests;
pub mod loop_tests;
pub mod sweep_tests;

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shelf_watcher::AppConfig;
use shelf_watcher::extractor::structured::CATALOG_PATH;
use shelf_watcher::extractor::legacy::PRODUCTS_PATH;
use shelf_watcher::extractor::stock::STOCK_PATH;
use shelf_watcher::extractor::{CatalogExtractor, PageSource};
use shelf_watcher::models::{CatalogEvent, EventKind};
use shelf_watcher::plugins::{EventSink, NotificationResult, NotifierManager};
use shelf_watcher::scheduler::LoopContext;
use shelf_watcher::store::Store;
use shelf_watcher::utils::http::HttpClient;

pub const CATEGORY: &str = "100";
pub const EXCLUSIVE_CATEGORY: &str = "900";

/// Test configuration pointing every endpoint at the mock server
pub fn test_config(base_url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.catalog.base_url = base_url.to_string();
    config.catalog.category_ids = vec![CATEGORY.to_string()];
    config.catalog.online_exclusive_category_ids = vec![EXCLUSIVE_CATEGORY.to_string()];
    config.catalog.page_size = 50;
    config.catalog.max_pages = 20;
    config.catalog.legacy_category_id = "151".to_string();
    config.http.retry_attempts = 2;
    config.http.retry_base_delay_ms = 1;
    config.http.retry_max_delay_ms = 1;
    config.http.timeout_secs = 5;
    config.database.url = "sqlite::memory:".to_string();
    config.sweep.enrich_notified = false;
    config.sweep.coming_soon_sort = "soon".to_string();
    config.enrichment.delay_ms = 0;
    config
}

/// Captures every event the loops hand to the notification side
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<CatalogEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<CatalogEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<(EventKind, String)> {
        self.events()
            .into_iter()
            .map(|event| {
                let id = event
                    .as_product()
                    .map(|p| p.id.clone())
                    .unwrap_or_else(|| event.title().to_string());
                (event.kind, id)
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    fn name(&self) -> &str {
        "Recording"
    }

    fn plugin_type(&self) -> &str {
        "recording"
    }

    async fn notify(&self, event: &CatalogEvent) -> shelf_watcher::Result<NotificationResult> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(NotificationResult::delivered(None))
    }
}

pub struct TestHarness {
    pub server: MockServer,
    pub config: AppConfig,
    pub store: Store,
    pub sink: Arc<RecordingSink>,
    pub ctx: LoopContext,
}

pub async fn create_harness() -> anyhow::Result<TestHarness> {
    create_harness_with(|_| {}, Vec::new()).await
}

/// Harness with a tweaked config and, optionally, replacement page sources
pub async fn create_harness_with(
    configure: impl FnOnce(&mut AppConfig),
    sources: Vec<Arc<dyn PageSource>>,
) -> anyhow::Result<TestHarness> {
    let server = MockServer::start().await;
    let mut config = test_config(&server.uri());
    configure(&mut config);

    let store = Store::in_memory().await?;
    let http = Arc::new(HttpClient::new(&config.http, &server.uri())?);
    let extractor = if sources.is_empty() {
        CatalogExtractor::from_config(&config, http)
    } else {
        CatalogExtractor::new(http, config.catalog.clone(), sources)
    };

    let sink = Arc::new(RecordingSink::default());
    let mut notifier = NotifierManager::new();
    notifier.register(sink.clone());

    let ctx = LoopContext::new(store.clone(), Arc::new(extractor), notifier);
    Ok(TestHarness {
        server,
        config,
        store,
        sink,
        ctx,
    })
}

/// A structured-catalog record with its attribute bag
pub fn record(id: &str, name: &str, price: Option<f64>) -> Value {
    let mut attributes = json!({
        "product.repositoryId": [id],
        "product.displayName": [name],
        "product.route": [format!("/product/{}/{}", name.to_lowercase().replace(' ', "-"), id)],
    });
    if let Some(price) = price {
        attributes["sku.listPrice"] = json!([price]);
    }
    json!({ "attributes": attributes })
}

pub fn records(ids: impl IntoIterator<Item = usize>) -> Vec<Value> {
    ids.into_iter()
        .map(|i| record(&format!("{:06}", i), &format!("Bottle {}", i), Some(10.0)))
        .collect()
}

/// Mounts one mock per page at its offset, plus the empty page after the last
pub async fn mount_catalog(server: &MockServer, category_id: &str, pages: Vec<Vec<Value>>) {
    let mut offset = 0usize;
    for page in pages.into_iter().chain(std::iter::once(Vec::new())) {
        let len = page.len();
        Mock::given(method("GET"))
            .and(path(CATALOG_PATH))
            .and(query_param("N", category_id))
            .and(query_param("No", offset.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": { "records": page }
            })))
            .mount(server)
            .await;
        offset += len;
        if len == 0 {
            break;
        }
    }
}

pub async fn mount_catalog_status(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

pub fn stock_body(quantities: &[(&str, u32)]) -> Value {
    let status: serde_json::Map<String, Value> = quantities
        .iter()
        .map(|(id, qty)| (id.to_string(), json!(qty)))
        .collect();
    json!({ "items": [{ "productSkuInventoryStatus": status }] })
}

pub async fn mount_stock(server: &MockServer, quantities: &[(&str, u32)]) {
    Mock::given(method("GET"))
        .and(path(STOCK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(stock_body(quantities)))
        .mount(server)
        .await;
}

pub async fn mount_legacy(server: &MockServer, items: Vec<Value>) {
    let total = items.len();
    Mock::given(method("GET"))
        .and(path(PRODUCTS_PATH))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": items,
            "totalResults": total,
        })))
        .mount(server)
        .await;
}

pub async fn mount_legacy_status(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path(PRODUCTS_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}
