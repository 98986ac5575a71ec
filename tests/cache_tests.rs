// ABOUTME: Integration tests for the per-engine template cache
// ABOUTME: Checks staleness while cached, explicit clearing and mode-driven enabling

use serde_json::json;

use stencil::template::{RenderOptions, TemplateError, ViewEngine};

mod common;
use common::TestViewsBuilder;

#[tokio::test]
async fn test_cached_engine_serves_first_read() {
    let views = TestViewsBuilder::new().with_view("page", "v1 {{ n }}").build().await;
    let engine = ViewEngine::new(views.config().with_cache(true)).unwrap();

    let first = engine.render("page", &json!({"n": 1}), &RenderOptions::new()).await.unwrap();
    views.write("page.html", "v2 {{ n }}").await;
    let second = engine.render("page", &json!({"n": 2}), &RenderOptions::new()).await.unwrap();

    assert_eq!(first, "v1 1");
    assert_eq!(second, "v1 2");
}

#[tokio::test]
async fn test_clear_cache_picks_up_changes() {
    let views = TestViewsBuilder::new().with_view("page", "old").build().await;
    let engine = ViewEngine::new(views.config().with_cache(true)).unwrap();

    assert_eq!(engine.render("page", &json!({}), &RenderOptions::new()).await.unwrap(), "old");
    views.write("page.html", "new").await;
    engine.clear_cache();

    assert!(engine.loader().cache().is_empty());
    assert_eq!(engine.render("page", &json!({}), &RenderOptions::new()).await.unwrap(), "new");
}

#[tokio::test]
async fn test_cached_template_survives_deletion() {
    let views = TestViewsBuilder::new().with_view("page", "kept").build().await;
    let engine = ViewEngine::new(views.config().with_cache(true)).unwrap();

    engine.render("page", &json!({}), &RenderOptions::new()).await.unwrap();
    views.remove("page.html").await;

    assert_eq!(engine.render("page", &json!({}), &RenderOptions::new()).await.unwrap(), "kept");

    engine.clear_cache();
    let err = engine.render("page", &json!({}), &RenderOptions::new()).await.unwrap_err();
    assert!(matches!(err, TemplateError::TemplateNotFound { .. }));
}

#[tokio::test]
async fn test_uncached_engine_rereads() {
    let views = TestViewsBuilder::new().with_view("page", "old").build().await;
    let engine = views.engine();

    assert_eq!(engine.render("page", &json!({}), &RenderOptions::new()).await.unwrap(), "old");
    views.write("page.html", "new").await;

    assert_eq!(engine.render("page", &json!({}), &RenderOptions::new()).await.unwrap(), "new");
    assert!(engine.loader().cache().is_empty());
}

#[tokio::test]
async fn test_production_mode_enables_cache() {
    let views = TestViewsBuilder::new().with_view("page", "old").build().await;
    let engine = ViewEngine::new(views.config().with_mode("production")).unwrap();

    engine.render("page", &json!({}), &RenderOptions::new()).await.unwrap();
    views.write("page.html", "new").await;

    assert_eq!(engine.render("page", &json!({}), &RenderOptions::new()).await.unwrap(), "old");
}

#[tokio::test]
async fn test_explicit_flag_overrides_production_mode() {
    let views = TestViewsBuilder::new().with_view("page", "old").build().await;
    let engine = ViewEngine::new(views.config().with_mode("production").with_cache(false)).unwrap();

    engine.render("page", &json!({}), &RenderOptions::new()).await.unwrap();
    views.write("page.html", "new").await;

    assert_eq!(engine.render("page", &json!({}), &RenderOptions::new()).await.unwrap(), "new");
}

#[tokio::test]
async fn test_layouts_are_cached_separately() {
    let views = TestViewsBuilder::new()
        .with_view("page", "p")
        .with_layout("main", "<{{{ body }}}>")
        .build()
        .await;
    let engine = ViewEngine::new(views.config().with_cache(true)).unwrap();

    let out = engine
        .render("page", &json!({}), &RenderOptions::new().with_layout("main"))
        .await
        .unwrap();

    assert_eq!(out, "<p>");
    assert_eq!(engine.loader().cache().len(), 2);
}

#[tokio::test]
async fn test_engines_do_not_share_caches() {
    let views = TestViewsBuilder::new().with_view("page", "old").build().await;
    let cached = ViewEngine::new(views.config().with_cache(true)).unwrap();
    cached.render("page", &json!({}), &RenderOptions::new()).await.unwrap();

    views.write("page.html", "new").await;
    let fresh = ViewEngine::new(views.config().with_cache(true)).unwrap();

    assert_eq!(fresh.render("page", &json!({}), &RenderOptions::new()).await.unwrap(), "new");
    assert_eq!(cached.render("page", &json!({}), &RenderOptions::new()).await.unwrap(), "old");
}
