//! Cloudflare provider against a mock zone API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde_json::{json, Value};

use domain_manager::config::{DnsConfig, DnsProviderKind};
use domain_manager::dns::{CloudflareProvider, DnsError, DnsProvider, DomainRecord, NewRecord};

mod common;

const NAME: &str = "app.sub.example.com";

#[derive(Default)]
struct Zone {
    total_pages: u32,
    pages_seen: Mutex<Vec<u32>>,
    created: Mutex<Vec<Value>>,
    deleted: Mutex<Vec<String>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer token-1")
}

async fn list(
    State(zone): State<Arc<Zone>>,
    Path(zone_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if zone_id != "zone-1" || !authorized(&headers) {
        return (StatusCode::FORBIDDEN, Json(json!({ "success": false })));
    }
    assert_eq!(query.get("name").map(String::as_str), Some(NAME));
    assert_eq!(query.get("per_page").map(String::as_str), Some("100"));
    let page: u32 = query["page"].parse().unwrap();
    zone.pages_seen.lock().unwrap().push(page);

    let result: Vec<Value> = if page <= zone.total_pages {
        vec![json!({
            "id": format!("rec-{page}"),
            "name": NAME,
            "type": "A",
            "content": format!("10.0.0.{page}"),
            "proxied": page == 2
        })]
    } else {
        Vec::new()
    };
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "errors": [],
            "result": result,
            "result_info": { "page": page, "per_page": 100, "total_pages": zone.total_pages }
        })),
    )
}

async fn create(
    State(zone): State<Arc<Zone>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    assert!(authorized(&headers));
    zone.created.lock().unwrap().push(body.clone());
    let mut record = body;
    record["id"] = json!("rec-new");
    Json(json!({ "success": true, "errors": [], "result": record }))
}

async fn remove(
    State(zone): State<Arc<Zone>>,
    Path((_zone_id, id)): Path<(String, String)>,
) -> Json<Value> {
    zone.deleted.lock().unwrap().push(id.clone());
    Json(json!({ "success": true, "errors": [], "result": { "id": id } }))
}

async fn start(total_pages: u32) -> (Arc<Zone>, CloudflareProvider) {
    let (zone, base) = start_zone(total_pages).await;
    (zone, provider(&base, "zone-1"))
}

fn provider(base: &str, zone_id: &str) -> CloudflareProvider {
    CloudflareProvider::new(&DnsConfig {
        enabled: true,
        provider: DnsProviderKind::Cloudflare,
        api_url: base.to_string(),
        api_token: "token-1".into(),
        zone_id: zone_id.into(),
        ..Default::default()
    })
}

async fn start_zone(total_pages: u32) -> (Arc<Zone>, String) {
    let zone = Arc::new(Zone {
        total_pages,
        ..Default::default()
    });
    let router = Router::new()
        .route("/zones/{zone}/dns_records", get(list).post(create))
        .route("/zones/{zone}/dns_records/{id}", delete(remove))
        .with_state(zone.clone());
    let addr = common::serve(router).await;
    (zone, common::base_url(addr))
}

#[tokio::test]
async fn test_listing_walks_every_page_then_stops() {
    let (zone, provider) = start(3).await;

    let records = provider.list_records(NAME).await.unwrap();

    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["rec-1", "rec-2", "rec-3"]);
    assert!(records[1].proxied);
    assert_eq!(records[2].record_type, "A");
    assert_eq!(*zone.pages_seen.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_listing_with_zero_pages_makes_one_request() {
    let (zone, provider) = start(0).await;

    let records = provider.list_records(NAME).await.unwrap();

    assert!(records.is_empty());
    assert_eq!(*zone.pages_seen.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn test_create_and_delete_request_shapes() {
    let (zone, provider) = start(1).await;

    let created = provider
        .create_record(&NewRecord {
            name: NAME.into(),
            record_type: "A".into(),
            content: "9.9.9.9".into(),
            proxied: false,
        })
        .await
        .unwrap();
    assert_eq!(created.id, "rec-new");
    assert_eq!(created.content, "9.9.9.9");

    let body = zone.created.lock().unwrap()[0].clone();
    assert_eq!(
        body,
        json!({ "type": "A", "name": NAME, "content": "9.9.9.9", "proxied": false, "ttl": 1 })
    );

    provider
        .delete_record(&DomainRecord {
            id: "rec-1".into(),
            name: NAME.into(),
            record_type: "A".into(),
            content: "10.0.0.1".into(),
            proxied: false,
        })
        .await
        .unwrap();
    assert_eq!(*zone.deleted.lock().unwrap(), vec!["rec-1".to_string()]);
}

#[tokio::test]
async fn test_rejected_request_surfaces_status() {
    let (zone, base) = start_zone(1).await;

    let result = provider(&base, "other-zone").list_records(NAME).await;

    assert!(matches!(result, Err(DnsError::Status { status: 403, .. })));
    assert!(zone.pages_seen.lock().unwrap().is_empty());
}
