//! Differential fetching of the specification feed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, Method};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde_json::json;

use domain_manager::config::FeedConfig;
use domain_manager::specs::cache::{CacheEvent, FeedKind, FeedLoop};
use domain_manager::specs::{FeedClient, SpecCache};

mod common;

#[derive(Default)]
struct Origin {
    heads: AtomicUsize,
    gets: AtomicUsize,
    etag: Mutex<String>,
    max_age: Mutex<u64>,
    body: Mutex<serde_json::Value>,
}

async fn specs(State(origin): State<Arc<Origin>>, method: Method) -> impl IntoResponse {
    if method == Method::HEAD {
        origin.heads.fetch_add(1, Ordering::SeqCst);
    } else {
        origin.gets.fetch_add(1, Ordering::SeqCst);
    }
    let etag = origin.etag.lock().unwrap().clone();
    let cache_control = format!("public, max-age={}", origin.max_age.lock().unwrap());
    let body = origin.body.lock().unwrap().clone();
    (
        [(header::ETAG, etag), (header::CACHE_CONTROL, cache_control)],
        axum::Json(body),
    )
}

async fn start_origin() -> (Arc<Origin>, String) {
    let origin = Arc::new(Origin::default());
    *origin.etag.lock().unwrap() = "\"v1\"".into();
    *origin.max_age.lock().unwrap() = 60;
    *origin.body.lock().unwrap() = common::success(json!([common::demo_spec()]));

    let router = Router::new()
        .route("/apps/globalappsspecifications", get(specs))
        .with_state(origin.clone());
    let addr = common::serve(router).await;
    (origin, common::base_url(addr))
}

fn feed(cache: Arc<SpecCache>, base: &str) -> FeedLoop {
    FeedLoop::new(
        cache,
        FeedClient::new(base, Duration::from_secs(2)),
        FeedKind::Specs,
        "/apps/globalappsspecifications".into(),
        &FeedConfig::default(),
    )
}

#[tokio::test]
async fn test_matching_etag_skips_body_download() {
    let (origin, base) = start_origin().await;
    let cache = Arc::new(SpecCache::new(None));
    let mut feed = feed(cache.clone(), &base);

    let first = feed.poll_once().await;
    assert_eq!(origin.gets.load(Ordering::SeqCst), 1);
    assert!(cache.get_global_specs().contains_key("demo"));
    assert!(first <= Duration::from_secs(60) && first > Duration::from_secs(50));

    let second = feed.poll_once().await;
    assert_eq!(origin.heads.load(Ordering::SeqCst), 1);
    assert_eq!(origin.gets.load(Ordering::SeqCst), 1);
    assert_eq!(second, Duration::from_secs(60));
}

#[tokio::test]
async fn test_new_etag_with_same_content_is_not_republished() {
    let (origin, base) = start_origin().await;
    let cache = Arc::new(SpecCache::new(None));
    let mut feed = feed(cache.clone(), &base);
    let mut events = cache.subscribe();

    feed.poll_once().await;
    assert!(matches!(events.try_recv(), Ok(CacheEvent::SpecsUpdated(_))));

    *origin.etag.lock().unwrap() = "\"v2\"".into();
    feed.poll_once().await;
    assert_eq!(origin.gets.load(Ordering::SeqCst), 2);
    assert!(events.try_recv().is_err());
    assert_eq!(feed.entry().etag.as_deref(), Some("\"v2\""));

    *origin.etag.lock().unwrap() = "\"v3\"".into();
    *origin.body.lock().unwrap() = common::success(json!([]));
    feed.poll_once().await;
    assert!(matches!(events.try_recv(), Ok(CacheEvent::SpecsUpdated(map)) if map.is_empty()));
}

#[tokio::test]
async fn test_zero_max_age_retries_shortly() {
    let (origin, base) = start_origin().await;
    *origin.max_age.lock().unwrap() = 0;
    let cache = Arc::new(SpecCache::new(None));
    let mut feed = feed(cache, &base);

    assert_eq!(feed.poll_once().await, Duration::from_secs(5));
}

#[tokio::test]
async fn test_unreachable_origin_keeps_fresh_value() {
    let (_origin, base) = start_origin().await;
    let cache = Arc::new(SpecCache::new(None));
    let mut feed = feed(cache.clone(), &base);
    feed.poll_once().await;

    let mut broken = FeedLoop::new(
        cache.clone(),
        FeedClient::new("http://127.0.0.1:1", Duration::from_millis(200)),
        FeedKind::Specs,
        "/apps/globalappsspecifications".into(),
        &FeedConfig::default(),
    );
    assert_eq!(broken.poll_once().await, Duration::from_secs(5));
    assert!(cache.get_global_specs().contains_key("demo"));
}
