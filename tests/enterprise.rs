//! Enterprise specification decryption against mock origin and oracle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use domain_manager::config::{EnterpriseConfig, FeedConfig};
use domain_manager::specs::enterprise::{EnterpriseDecryptor, OracleRequest, WRAPPED_KEY_LEN};
use domain_manager::specs::cache::{FeedKind, FeedLoop};
use domain_manager::specs::{ApplicationSpec, FeedClient, SpecCache};

mod common;

const AES_KEY: [u8; 32] = [7u8; 32];

struct Oracle {
    calls: AtomicUsize,
    failures_left: AtomicUsize,
}

async fn original_owner(Path(app): Path<String>) -> Json<Value> {
    Json(common::success(json!(format!("owner-of-{app}"))))
}

async fn decrypt(
    State(oracle): State<Arc<Oracle>>,
    Json(request): Json<OracleRequest>,
) -> (StatusCode, Json<Value>) {
    oracle.calls.fetch_add(1, Ordering::SeqCst);
    if oracle
        .failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})));
    }

    let wrapped = STANDARD.decode(&request.message).unwrap();
    assert_eq!(wrapped.len(), WRAPPED_KEY_LEN);
    assert_eq!(request.flux_id, format!("owner-of-{}", request.app_name));
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "message": STANDARD.encode(AES_KEY) })),
    )
}

/// The same sealed payload on every request.
async fn sealed_feed() -> impl axum::response::IntoResponse {
    static SPEC: OnceLock<Value> = OnceLock::new();
    let spec = SPEC
        .get_or_init(|| serde_json::to_value(sealed_spec("secretapp")).unwrap())
        .clone();
    (
        [(header::ETAG, "\"feed-v1\"")],
        Json(common::success(json!([spec]))),
    )
}

async fn start(failures: usize) -> (Arc<Oracle>, String) {
    let oracle = Arc::new(Oracle {
        calls: AtomicUsize::new(0),
        failures_left: AtomicUsize::new(failures),
    });
    let router = Router::new()
        .route("/apps/apporiginalowner/{app}", get(original_owner))
        .route("/apps/globalappsspecifications", get(sealed_feed))
        .route("/decryptMessageRSA", post(decrypt))
        .with_state(oracle.clone());
    let addr = common::serve(router).await;
    (oracle, common::base_url(addr))
}

fn sealed_spec(name: &str) -> ApplicationSpec {
    let payload = json!({
        "compose": [{ "name": "web", "repotag": "acme/web:1", "ports": [31000], "domains": ["shop.io"] }],
        "contacts": ["ops@shop.io"]
    });
    let cipher = Aes256Gcm::new_from_slice(&AES_KEY).unwrap();
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let mut blob = vec![0xAB; WRAPPED_KEY_LEN];
    blob.extend_from_slice(&nonce);
    blob.extend(cipher.encrypt(&nonce, payload.to_string().as_bytes()).unwrap());

    ApplicationSpec {
        name: name.into(),
        version: 8,
        owner: "1Owner".into(),
        enterprise: STANDARD.encode(blob),
        hash: format!("{name}-hash"),
        height: 1_600_000,
        ..Default::default()
    }
}

fn decryptor(base: &str, oracle_attempts: u32) -> EnterpriseDecryptor {
    let config = EnterpriseConfig {
        enabled: true,
        oracle_url: base.to_string(),
        owner_attempts: 1,
        owner_retry_secs: 0,
        oracle_attempts,
        oracle_retry_secs: 0,
        cache_ttl_secs: 600,
        ..Default::default()
    };
    EnterpriseDecryptor::new(config, FeedClient::new(base, Duration::from_secs(2))).unwrap()
}

#[tokio::test]
async fn test_decrypts_and_caches_by_digest() {
    let (oracle, base) = start(0).await;
    let decryptor = decryptor(&base, 1);
    let spec = sealed_spec("secretapp");

    let decrypted = decryptor.decrypt(&spec).await.unwrap();
    assert!(!decrypted.is_enterprise());
    assert_eq!(decrypted.compose.len(), 1);
    assert_eq!(decrypted.compose[0].domains, vec!["shop.io".to_string()]);
    assert_eq!(decrypted.contacts, vec!["ops@shop.io".to_string()]);

    decryptor.decrypt(&spec).await.unwrap();
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    assert_eq!(decryptor.cached(), 1);
}

#[tokio::test]
async fn test_oracle_failures_are_retried() {
    let (oracle, base) = start(2).await;
    let decryptor = decryptor(&base, 4);

    assert!(decryptor.decrypt(&sealed_spec("retryapp")).await.is_ok());
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_undecryptable_spec_is_dropped_alone() {
    let (_oracle, base) = start(10).await;
    let cache = SpecCache::new(Some(decryptor(&base, 2)));
    let open: ApplicationSpec = serde_json::from_value(common::demo_spec()).unwrap();

    let snapshot = cache.ingest_specs(vec![open, sealed_spec("secretapp")]).await;
    assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["demo"]);
}

#[tokio::test]
async fn test_dropped_spec_returns_once_oracle_recovers() {
    let (oracle, base) = start(1).await;
    let cache = Arc::new(SpecCache::new(Some(decryptor(&base, 1))));
    let config = FeedConfig::default();
    let mut feed = FeedLoop::new(
        cache.clone(),
        FeedClient::new(base.as_str(), Duration::from_secs(2)),
        FeedKind::Specs,
        config.specs_path.clone(),
        &config,
    );

    feed.poll_once().await;
    assert!(cache.get_global_specs().is_empty());
    assert!(feed.entry().etag.is_none());
    assert!(feed.entry().content_sha.is_none());

    feed.poll_once().await;
    assert!(cache.get_global_specs().contains_key("secretapp"));
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    assert_eq!(feed.entry().etag.as_deref(), Some("\"feed-v1\""));

    feed.poll_once().await;
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
}
