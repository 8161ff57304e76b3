use super::*;
use shelf_watcher::config::{EnrichmentConfig, ReleaseConfig, WatchlistConfig};
use shelf_watcher::extractor::RenderedPage;
use shelf_watcher::extractor::source::LinkItem;
use shelf_watcher::models::Product;
use std::collections::VecDeque;
use shelf_watcher::scheduler::{
    EnrichmentLoop, FrontPageLoop, PollingLoop, ReleaseLoop, Scheduler, WatchlistLoop,
};
use tokio_test::assert_ok;

#[tokio::test]
async fn test_watchlist_announces_zero_to_positive_flip() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    harness.store.add_to_watchlist("000777", None).await?;

    let stock = shelf_watcher::extractor::stock::STOCK_PATH;
    Mock::given(method("GET"))
        .and(path(stock))
        .respond_with(ResponseTemplate::new(200).set_body_json(stock_body(&[("000777", 0)])))
        .up_to_n_times(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path(stock))
        .respond_with(ResponseTemplate::new(200).set_body_json(stock_body(&[("000777", 2)])))
        .mount(&harness.server)
        .await;

    let mut watchlist = WatchlistLoop::new(harness.ctx.clone(), &WatchlistConfig::default());

    watchlist.run_once().await?;
    assert!(harness.sink.events().is_empty());
    assert_eq!(watchlist.last_quantity("000777"), Some(0));

    watchlist.run_once().await?;
    let events = harness.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Available);
    let product = events[0].as_product().ok_or_else(|| anyhow::anyhow!("not a product event"))?;
    assert_eq!(product.name, "Product 000777");
    assert_eq!(product.quantity, 2);
    assert_eq!(product.page_url, format!("{}/product/000777", harness.server.uri()));

    // Still in stock: no repeat.
    watchlist.run_once().await?;
    assert_eq!(harness.sink.events().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_watchlist_keeps_going_when_an_announcement_fails() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    harness.store.add_to_watchlist("000777", None).await?;
    harness.store.add_to_watchlist("000778", None).await?;
    mount_stock(&harness.server, &[("000777", 2), ("000778", 3)]).await;

    // Product lookups now fail; the watchlist table is still readable.
    sqlx::query("DROP TABLE products").execute(harness.store.pool()).await?;

    let mut watchlist = WatchlistLoop::new(harness.ctx.clone(), &WatchlistConfig::default());
    assert_ok!(watchlist.run_once().await);

    assert!(harness.sink.events().is_empty());
    assert_eq!(watchlist.last_quantity("000777"), Some(2));
    assert_eq!(watchlist.last_quantity("000778"), Some(3));
    Ok(())
}

#[tokio::test]
async fn test_front_page_fast_path_for_unknown_ids() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    let mut known = Product::observed("000001", "Bottle A");
    known.quantity = 1;
    harness.store.upsert_products(&[known]).await?;

    let mut fresh = record("000003", "Bottle C", Some(30.0));
    fresh["attributes"]["product.primaryMediumImageURL"] = json!(["/file/c.jpg"]);
    mount_catalog(
        &harness.server,
        CATEGORY,
        vec![vec![record("000001", "Bottle A", Some(10.0)), fresh]],
    )
    .await;
    mount_stock(&harness.server, &[("000003", 5)]).await;

    let mut front = FrontPageLoop::seeded(harness.ctx.clone(), &harness.config, CATEGORY).await?;
    assert!(front.knows("000001"));
    assert!(!front.knows("000003"));

    front.run_once().await?;
    assert_eq!(harness.sink.kinds(), vec![(EventKind::New, "000003".to_string())]);
    assert!(front.knows("000003"));
    assert!(harness.store.has_seen("000003").await?);

    let stored = harness.store.get_product("000003").await?.ok_or_else(|| anyhow::anyhow!("not stored"))?;
    assert_eq!(stored.quantity, 5);
    assert_eq!(stored.price, 30.0);

    front.run_once().await?;
    assert_eq!(harness.sink.events().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_enrichment_backfills_price_and_quantity() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    let mut product = Product::observed("000555", "Bottle E");
    product.page_url = format!("{}/product/bottle-e/000555", harness.server.uri());
    harness.store.upsert_products(&[product]).await?;

    Mock::given(method("GET"))
        .and(path("/product/bottle-e/000555"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head>
                 <script type="application/ld+json">
                   {"@type": "Product", "name": "Bottle E", "offers": {"price": "54.99"}}
                 </script>
               </head><body></body></html>"#,
        ))
        .mount(&harness.server)
        .await;
    mount_stock(&harness.server, &[("000555", 4)]).await;

    let config = EnrichmentConfig {
        delay_ms: 0,
        ..Default::default()
    };
    let mut enrichment = EnrichmentLoop::new(harness.ctx.clone(), &config);
    assert_ok!(enrichment.run_once().await);

    let stored = harness.store.get_product("000555").await?.ok_or_else(|| anyhow::anyhow!("row deleted"))?;
    assert_eq!(stored.price, 54.99);
    assert_eq!(stored.quantity, 4);
    assert!(harness.store.enrichment_candidates(10).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_release_loop_announces_each_card_once() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    let base = harness.server.uri();
    let http = Arc::new(HttpClient::new(&harness.config.http, &base)?);
    let extractor = CatalogExtractor::new(
        http,
        harness.config.catalog.clone(),
        vec![super::extractor_tests::release_source(&base)],
    );
    let ctx = LoopContext::new(harness.store.clone(), Arc::new(extractor), harness.ctx.notifier.clone());

    let config = ReleaseConfig {
        page_url: format!("{}/whiskey-release/whiskey-release", base),
        ..Default::default()
    };
    let mut release = ReleaseLoop::new(ctx, &config);

    release.run_once().await?;
    let events = harness.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Release);
    assert_eq!(events[0].title(), "Stagg Jr. Barrel Proof");

    release.run_once().await?;
    assert_eq!(harness.sink.events().len(), 1);
    Ok(())
}

/// Hands out its pages in order, then keeps serving the last one
struct SequencedSource {
    pages: Mutex<VecDeque<RenderedPage>>,
}

#[async_trait]
impl PageSource for SequencedSource {
    fn name(&self) -> &'static str {
        "sequenced"
    }

    async fn load(&self, _url: &str) -> shelf_watcher::Result<Option<RenderedPage>> {
        let mut pages = self.pages.lock().unwrap();
        if pages.len() > 1 {
            Ok(pages.pop_front())
        } else {
            Ok(pages.front().cloned())
        }
    }
}

#[tokio::test]
async fn test_release_seen_through_every_tier_is_announced_once() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    let base = harness.server.uri();
    let page_url = format!("{}/whiskey-release/whiskey-release", base);

    // Anchor and tile markup, collected links and a captured payload, all
    // pointing at one product with different query strings and slashes.
    let grid = r#"
        <div class="grid">
          <article>
            <h3>Stagg Jr. Barrel Proof</h3>
            <a href="/product/stagg-jr/000012345?ref=grid">View</a>
            <a href="/product/stagg-jr/000012345/?ref=image"><img src="/file/stagg.jpg"></a>
            <span>Coming Soon</span>
          </article>
        </div>"#;
    let mut first = RenderedPage::from_html(&page_url, grid.to_string());
    first.links = vec![LinkItem {
        href: format!("{}/product/stagg-jr/000012345/?utm_source=newsletter", base),
        title: Some("Stagg Jr. Barrel Proof".to_string()),
        img: None,
        status: None,
    }];
    first.payloads = vec![json!({
        "items": [{"displayName": "Stagg Jr. Barrel Proof", "route": "/product/stagg-jr/000012345?src=feed"}]
    })];

    // Next poll only has the product in an inline script.
    let inline = r#"
        <div id="app"></div>
        <script type="application/json">
          {"product": {"repositoryId": "000012345", "displayName": "Stagg Jr. Barrel Proof",
                       "route": "/product/stagg-jr/000012345/#details"}}
        </script>"#;
    let second = RenderedPage::from_html(&page_url, inline.to_string());

    let source: Arc<dyn PageSource> = Arc::new(SequencedSource {
        pages: Mutex::new(VecDeque::from([first, second])),
    });
    let http = Arc::new(HttpClient::new(&harness.config.http, &base)?);
    let extractor = CatalogExtractor::new(http, harness.config.catalog.clone(), vec![source]);
    let ctx = LoopContext::new(harness.store.clone(), Arc::new(extractor), harness.ctx.notifier.clone());
    let mut release = ReleaseLoop::new(
        ctx,
        &ReleaseConfig {
            page_url,
            ..Default::default()
        },
    );

    release.run_once().await?;
    release.run_once().await?;

    let events = harness.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Release);
    assert_eq!(events[0].title(), "Stagg Jr. Barrel Proof");
    Ok(())
}

#[tokio::test]
async fn test_release_card_going_live_is_announced_separately() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    let release = ReleaseLoop::new(harness.ctx.clone(), &ReleaseConfig::default());

    let page = super::extractor_tests::release_page("https://shop.example.com");
    let mut cards = shelf_watcher::extractor::release::cards_from_page(&page, "https://shop.example.com");
    assert_eq!(release.process_cards(cards.clone()).await?, 1);

    cards[0].status = shelf_watcher::models::ReleaseStatus::Live;
    assert_eq!(release.process_cards(cards.clone()).await?, 1);
    assert_eq!(release.process_cards(cards).await?, 0);

    assert_eq!(
        harness.sink.events().iter().map(|e| e.kind).collect::<Vec<_>>(),
        vec![EventKind::Release, EventKind::Live]
    );
    Ok(())
}

#[tokio::test]
async fn test_scheduler_runs_enabled_loops_once() -> anyhow::Result<()> {
    let harness = create_harness_with(
        |config| config.watchlist.enabled = true,
        Vec::new(),
    )
    .await?;
    harness.store.add_to_watchlist("000001", Some("seeded")).await?;
    mount_catalog(&harness.server, CATEGORY, vec![records(1..3)]).await;
    mount_stock(&harness.server, &[("000001", 1), ("000002", 0)]).await;

    let scheduler = Scheduler::new(harness.ctx.clone(), harness.config.clone());
    let report = scheduler.run_once_all().await?;

    let names: Vec<&str> = report.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, vec!["full-sweep", "watchlist"]);
    for (_, stats) in &report {
        assert_eq!(stats.run_count, 1);
        assert_eq!(stats.success_count, 1);
    }
    assert_eq!(harness.store.snapshot().await?.len(), 2);
    Ok(())
}
