//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use domain_manager::config::{ControlConfig, DomainConfig};

/// Serve `router` on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    addr
}

/// `{status: "success", data}`.
pub fn success(data: Value) -> Value {
    json!({ "status": "success", "data": data })
}

pub fn base_url(addr: SocketAddr) -> String {
    format!("http://{addr}")
}

/// The single-port `demo` application.
pub fn demo_spec() -> Value {
    json!({
        "name": "demo",
        "version": 3,
        "owner": "1DemoOwner",
        "ports": [8080],
        "domains": [""],
        "hash": "demo-hash",
        "height": 1_500_000
    })
}

/// Configuration pointing at a mock origin, `sub.example.com` domains.
pub fn test_config(origin: SocketAddr) -> ControlConfig {
    let mut config = ControlConfig::default();
    config.feed.api_base_url = base_url(origin);
    config.feed.request_timeout_ms = 2_000;
    config.domains = DomainConfig {
        root_domain: "example.com".into(),
        subdomain: "sub".into(),
    };
    config.cycle.dns_settle_ms = 0;
    config
}

/// Serve `ui` and `api` on adjacent ports (`api = ui + 1`). Returns the API port.
pub async fn serve_adjacent(ui: Router, api: Router) -> u16 {
    for _ in 0..50 {
        let ui_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ui_port = ui_listener.local_addr().unwrap().port();
        let Some(api_port) = ui_port.checked_add(1) else {
            continue;
        };
        let Ok(api_listener) = TcpListener::bind(("127.0.0.1", api_port)).await else {
            continue;
        };
        let (ui, api) = (ui.clone(), api.clone());
        tokio::spawn(async move {
            let _ = axum::serve(ui_listener, ui).await;
        });
        tokio::spawn(async move {
            let _ = axum::serve(api_listener, api).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        return api_port;
    }
    panic!("no adjacent free ports");
}
