use super::*;
use serde_json::json;
use shelf_watcher::extractor::source::LinkItem;
use shelf_watcher::extractor::{RenderedPage, Tier};
use shelf_watcher::models::ReleaseStatus;
use std::collections::HashMap;

const LISTING_HTML: &str = r#"
    <ul>
      <li class="grid__item">
        <a href="/product/bottle-1/000001"><h3>Bottle 1</h3></a>
        <span class="card__price-amount">$19.99</span>
      </li>
      <li class="grid__item">
        <a href="/product/bottle-2/000002"><h3>Bottle 2</h3></a>
        <p>Coming Soon</p>
      </li>
    </ul>"#;

#[tokio::test]
async fn test_structured_pagination_reads_until_empty_page() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    mount_catalog(
        &harness.server,
        CATEGORY,
        vec![records(0..50), records(50..100), records(100..113)],
    )
    .await;

    let fetch = harness.ctx.extractor.fetch_catalog(CATEGORY).await?;
    assert_eq!(fetch.tier, Some(Tier::Structured));
    assert!(fetch.is_complete());
    assert_eq!(fetch.records.len(), 113);

    let ids = CatalogExtractor::record_ids(&fetch.records);
    assert_eq!(ids.len(), 113);
    assert_eq!(ids[0], "000000");
    assert_eq!(ids[112], "000112");

    let requests = harness.server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_server_error_falls_through_to_legacy() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    mount_catalog_status(&harness.server, 500).await;
    mount_legacy(
        &harness.server,
        vec![json!({"repositoryId": "000002", "displayName": "Legacy Bottle", "listPrice": 12.5})],
    )
    .await;

    let fetch = harness.ctx.extractor.fetch_catalog(CATEGORY).await?;
    assert_eq!(fetch.tier, Some(Tier::Legacy));
    assert!(fetch.is_complete());

    let products = harness.ctx.extractor.build_products(&fetch.records, &HashMap::new());
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].id, "000002");
    assert_eq!(products[0].price, 12.5);
    assert!(!products[0].is_online_exclusive);
    Ok(())
}

#[tokio::test]
async fn test_listing_page_is_the_last_resort() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    mount_catalog_status(&harness.server, 404).await;
    mount_legacy_status(&harness.server, 404).await;
    Mock::given(method("GET"))
        .and(path("/whiskey/151"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING_HTML))
        .mount(&harness.server)
        .await;

    let fetch = harness.ctx.extractor.fetch_catalog(CATEGORY).await?;
    assert_eq!(fetch.tier, Some(Tier::StaticHtml));
    assert!(!fetch.is_complete());

    let products = harness.ctx.extractor.build_products(&fetch.records, &HashMap::new());
    assert_eq!(products.len(), 2);
    assert_eq!(products[0].name, "Bottle 1");
    assert_eq!(products[0].price, 19.99);
    assert_eq!(products[0].page_url, format!("{}/product/bottle-1/000001", harness.server.uri()));
    Ok(())
}

#[tokio::test]
async fn test_empty_tiers_are_not_an_error() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    mount_catalog(&harness.server, CATEGORY, Vec::new()).await;
    mount_legacy(&harness.server, Vec::new()).await;

    let fetch = harness.ctx.extractor.fetch_catalog(CATEGORY).await?;
    assert_eq!(fetch.tier, None);
    assert!(fetch.records.is_empty());
    assert!(!fetch.is_complete());
    Ok(())
}

#[tokio::test]
async fn test_legacy_tier_only_serves_the_primary_category() -> anyhow::Result<()> {
    let harness = create_harness_with(
        |config| config.catalog.category_ids = vec![CATEGORY.to_string(), EXCLUSIVE_CATEGORY.to_string()],
        Vec::new(),
    )
    .await?;
    mount_catalog_status(&harness.server, 404).await;
    Mock::given(method("GET"))
        .and(path(shelf_watcher::extractor::legacy::PRODUCTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [], "totalResults": 0})))
        .expect(0)
        .mount(&harness.server)
        .await;

    let result = harness.ctx.extractor.fetch_catalog(EXCLUSIVE_CATEGORY).await;
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn test_exclusive_category_tags_every_record() -> anyhow::Result<()> {
    let harness = create_harness_with(
        |config| config.catalog.category_ids = vec![CATEGORY.to_string(), EXCLUSIVE_CATEGORY.to_string()],
        Vec::new(),
    )
    .await?;
    mount_catalog(&harness.server, EXCLUSIVE_CATEGORY, vec![records(1..3)]).await;
    mount_catalog(&harness.server, CATEGORY, vec![records(5..6)]).await;

    let extractor = &harness.ctx.extractor;
    let exclusive = extractor.fetch_catalog(EXCLUSIVE_CATEGORY).await?;
    let regular = extractor.fetch_catalog(CATEGORY).await?;

    let exclusive = extractor.build_products(&exclusive.records, &HashMap::new());
    let regular = extractor.build_products(&regular.records, &HashMap::new());
    assert!(exclusive.iter().all(|p| p.is_online_exclusive));
    assert!(regular.iter().all(|p| !p.is_online_exclusive));
    Ok(())
}

#[tokio::test]
async fn test_stock_lookups_are_chunked() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    Mock::given(method("GET"))
        .and(path(shelf_watcher::extractor::stock::STOCK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(stock_body(&[("000001", 7)])))
        .expect(3)
        .mount(&harness.server)
        .await;

    let ids: Vec<String> = (0..120).map(|i| format!("{:06}", i)).collect();
    let stock = harness.ctx.extractor.fetch_stock(&ids).await?;
    assert_eq!(stock.get("000001"), Some(&7));
    assert_eq!(stock.get("000002"), None);
    Ok(())
}

#[tokio::test]
async fn test_client_errors_are_not_retried() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    Mock::given(method("GET"))
        .and(path(shelf_watcher::extractor::stock::STOCK_PATH))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&harness.server)
        .await;

    let result = harness.ctx.extractor.fetch_stock(&["000001".to_string()]).await;
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn test_coming_soon_grid_fallback_is_incomplete() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    // The structured query answers, but nothing in it is flagged.
    mount_catalog(&harness.server, CATEGORY, vec![records(1..3)]).await;
    Mock::given(method("GET"))
        .and(path("/whiskey/151"))
        .and(query_param("No", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING_HTML))
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/whiskey/151"))
        .and(query_param("No", "12"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ul></ul>"))
        .mount(&harness.server)
        .await;

    let scan = harness.ctx.extractor.fetch_coming_soon(CATEGORY, "soon").await?;
    assert!(!scan.complete);
    assert_eq!(CatalogExtractor::record_ids(&scan.records), vec!["000002"]);
    Ok(())
}

/// Serves canned pages by exact URL
struct FakeSource {
    pages: HashMap<String, RenderedPage>,
}

#[async_trait]
impl PageSource for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn load(&self, url: &str) -> shelf_watcher::Result<Option<RenderedPage>> {
        Ok(self.pages.get(url).cloned())
    }
}

pub fn release_page(base: &str) -> RenderedPage {
    let html = r#"
        <div class="grid">
          <article>
            <h3>Stagg Jr. Barrel Proof</h3>
            <a href="/product/stagg-jr/000012345">View</a>
            <span>Coming Soon</span>
          </article>
        </div>"#;
    let mut page = RenderedPage::from_html(&format!("{}/whiskey-release/whiskey-release", base), html.to_string());
    page.links = vec![LinkItem {
        href: format!("{}/product/stagg-jr/000012345", base),
        title: Some("Stagg Jr. Barrel Proof".to_string()),
        img: Some("/file/stagg.jpg".to_string()),
        status: Some("Add to cart".to_string()),
    }];
    page
}

pub fn release_source(base: &str) -> Arc<dyn PageSource> {
    let page = release_page(base);
    Arc::new(FakeSource {
        pages: HashMap::from([(page.url.clone(), page)]),
    })
}

#[tokio::test]
async fn test_release_cards_try_url_variants_and_merge_sources() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let config = test_config(&server.uri());
    let http = Arc::new(HttpClient::new(&config.http, &server.uri())?);
    let extractor = CatalogExtractor::new(http, config.catalog.clone(), vec![release_source(&server.uri())]);

    // Only the hyphenated variant exists.
    let cards = extractor
        .fetch_release_cards(&format!("{}/whiskey%20release/whiskey-release", server.uri()))
        .await;
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].title, "Stagg Jr. Barrel Proof");
    assert_eq!(cards[0].status, ReleaseStatus::ComingSoon);
    assert!(cards[0].image_url.is_some());

    let missing = extractor.fetch_release_cards(&format!("{}/nothing/here", server.uri())).await;
    assert!(missing.is_empty());
    Ok(())
}
