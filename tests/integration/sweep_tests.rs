use super::*;
use shelf_watcher::models::Product;
use shelf_watcher::scheduler::{FullSweep, PollingLoop};

async fn seed(store: &Store, id: &str, quantity: u32, price: f64) -> anyhow::Result<()> {
    let mut product = Product::observed(id, format!("Bottle {}", id));
    product.quantity = quantity;
    product.price = price;
    store.upsert_products(&[product]).await?;
    Ok(())
}

#[tokio::test]
async fn test_sweep_classifies_new_and_restocked() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    seed(&harness.store, "000001", 0, 10.0).await?;

    mount_catalog(
        &harness.server,
        CATEGORY,
        vec![vec![
            record("000001", "Bottle A", None),
            record("000002", "Bottle B", Some(5.0)),
        ]],
    )
    .await;
    mount_stock(&harness.server, &[("000001", 3), ("000002", 1)]).await;

    let mut sweep = FullSweep::new(harness.ctx.clone(), &harness.config);
    sweep.run_once().await?;

    assert_eq!(
        harness.sink.kinds(),
        vec![
            (EventKind::New, "000002".to_string()),
            (EventKind::Available, "000001".to_string()),
        ]
    );

    let restocked = &harness.sink.events()[1];
    assert_eq!(restocked.as_product().map(|p| p.price), Some(10.0));

    let stored_a = harness.store.get_product("000001").await?.ok_or_else(|| anyhow::anyhow!("A missing"))?;
    assert_eq!(stored_a.quantity, 3);
    assert_eq!(stored_a.price, 10.0);
    assert_eq!(stored_a.name, "Bottle A");

    let stored_b = harness.store.get_product("000002").await?.ok_or_else(|| anyhow::anyhow!("B missing"))?;
    assert_eq!(stored_b.quantity, 1);
    assert_eq!(stored_b.price, 5.0);
    assert!(harness.store.has_seen("000002").await?);

    // Nothing changed, nothing to say.
    harness.sink.clear();
    sweep.run_once().await?;
    assert!(harness.sink.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_removal_is_reported_only_when_enabled() -> anyhow::Result<()> {
    for enabled in [false, true] {
        let harness = create_harness_with(|config| config.sweep.removed_events = enabled, Vec::new()).await?;
        seed(&harness.store, "000001", 2, 10.0).await?;
        seed(&harness.store, "000002", 2, 10.0).await?;

        mount_catalog(&harness.server, CATEGORY, vec![vec![record("000001", "Bottle A", Some(10.0))]]).await;
        mount_stock(&harness.server, &[("000001", 2)]).await;

        let mut sweep = FullSweep::new(harness.ctx.clone(), &harness.config);
        sweep.run_once().await?;

        let gone = harness.store.get_product("000002").await?.ok_or_else(|| anyhow::anyhow!("row deleted"))?;
        if enabled {
            assert_eq!(harness.sink.kinds(), vec![(EventKind::Removed, "000002".to_string())]);
            assert!(gone.removed);
            assert!(!gone.available);
        } else {
            assert!(harness.sink.events().is_empty());
            assert!(!gone.removed);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_partial_sweep_never_infers_removal() -> anyhow::Result<()> {
    let harness = create_harness_with(|config| config.sweep.removed_events = true, Vec::new()).await?;
    seed(&harness.store, "000001", 2, 10.0).await?;
    seed(&harness.store, "000002", 2, 10.0).await?;

    mount_catalog_status(&harness.server, 404).await;
    mount_legacy_status(&harness.server, 404).await;
    Mock::given(method("GET"))
        .and(path("/whiskey/151"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<ul><li class="grid__item"><a href="/product/a/000001"><h3>Bottle A</h3></a></li></ul>"#,
        ))
        .mount(&harness.server)
        .await;
    mount_stock(&harness.server, &[("000001", 2)]).await;

    let mut sweep = FullSweep::new(harness.ctx.clone(), &harness.config);
    sweep.run_once().await?;

    assert!(harness.sink.events().is_empty());
    let untouched = harness.store.get_product("000002").await?.ok_or_else(|| anyhow::anyhow!("row deleted"))?;
    assert!(!untouched.removed);
    Ok(())
}

#[tokio::test]
async fn test_failed_stock_lookup_fails_the_category() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    mount_catalog(&harness.server, CATEGORY, vec![records(1..3)]).await;
    Mock::given(method("GET"))
        .and(path(shelf_watcher::extractor::stock::STOCK_PATH))
        .respond_with(ResponseTemplate::new(403))
        .mount(&harness.server)
        .await;

    let mut sweep = FullSweep::new(harness.ctx.clone(), &harness.config);
    assert!(sweep.run_once().await.is_err());
    assert!(harness.store.snapshot().await?.is_empty());
    assert!(harness.sink.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_front_page_announcement_is_not_repeated_by_sweep() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    // Announced elsewhere, never stored.
    harness.store.mark_seen(&["000002"]).await?;

    mount_catalog(&harness.server, CATEGORY, vec![vec![record("000002", "Bottle B", Some(5.0))]]).await;
    mount_stock(&harness.server, &[("000002", 1)]).await;

    let mut sweep = FullSweep::new(harness.ctx.clone(), &harness.config);
    sweep.run_once().await?;

    assert!(harness.sink.events().is_empty());
    assert!(harness.store.get_product("000002").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_notify_cap_counts_only_unannounced_items() -> anyhow::Result<()> {
    let harness = create_harness_with(|config| config.sweep.max_notify = 1, Vec::new()).await?;
    harness.store.mark_seen(&["000001"]).await?;

    mount_catalog(
        &harness.server,
        CATEGORY,
        vec![vec![
            record("000001", "Bottle A", Some(10.0)),
            record("000002", "Bottle B", Some(12.0)),
        ]],
    )
    .await;
    mount_stock(&harness.server, &[("000001", 1), ("000002", 1)]).await;

    let mut sweep = FullSweep::new(harness.ctx.clone(), &harness.config);
    sweep.run_once().await?;

    assert_eq!(harness.sink.kinds(), vec![(EventKind::New, "000002".to_string())]);
    assert!(harness.store.has_seen("000002").await?);
    Ok(())
}

#[tokio::test]
async fn test_coming_soon_tracking() -> anyhow::Result<()> {
    let harness = create_harness_with(|config| config.sweep.track_coming_soon = true, Vec::new()).await?;
    mount_catalog(&harness.server, CATEGORY, vec![records(1..2)]).await;
    mount_stock(&harness.server, &[("000001", 1)]).await;

    let mut soon = record("000009", "Bottle Soon", Some(80.0));
    soon["attributes"]["B2CProduct.b2c_comingSoon"] = json!([true]);
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("Ns", "soon"))
        .and(query_param("No", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": { "records": [soon] } })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("Ns", "soon"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": { "records": [] } })))
        .with_priority(2)
        .mount(&harness.server)
        .await;

    let mut sweep = FullSweep::new(harness.ctx.clone(), &harness.config);
    sweep.run_once().await?;

    let kinds = harness.sink.kinds();
    assert!(kinds.contains(&(EventKind::ComingSoon, "000009".to_string())));
    let entry = harness.store.coming_soon("000009").await?.ok_or_else(|| anyhow::anyhow!("not tracked"))?;
    assert!(entry.active);

    // Gone from a complete scan: deactivated, not deleted.
    harness.sink.clear();
    sweep.run_once().await?;
    assert!(harness.sink.events().is_empty());
    let entry = harness.store.coming_soon("000009").await?.ok_or_else(|| anyhow::anyhow!("row deleted"))?;
    assert!(!entry.active);
    Ok(())
}
