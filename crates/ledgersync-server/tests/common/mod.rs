//! Shared helpers for the ledgersync-server integration tests
//!
//! Everything here runs against [`MemoryStore`] and [`StaticSource`], so the
//! tests need neither a database nor a running exporter. The PostgreSQL
//! tests in `db_tests.rs` bring their own pool through `#[sqlx::test]`.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use ledgersync_common::TenantScope;
use ledgersync_server::{
    api,
    config::Config,
    db::{MemoryStore, RecordStore, Store},
    features::AppState,
    ingest::{IngestPipeline, StaticSource, SyncConfig},
    models::{Company, Division, Group, Ledger},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

/// The sample sales voucher: Cash and Sales ledger entries plus one Widget line.
///
/// It names no voucher type and its quantity carries no unit, so ingesting it
/// creates exactly three masters: the two ledgers and the stock item.
pub const INV_001: &str = include_str!("../fixtures/inv_001.xml");

/// INV-001 again under the `Sales` voucher type, which becomes a fourth master.
pub const INV_002: &str = include_str!("../fixtures/inv_002.xml");

pub fn scope() -> TenantScope {
    TenantScope::new(
        Uuid::parse_str("6f1c1d9e-0000-4000-8000-000000000001").unwrap(),
        Uuid::parse_str("6f1c1d9e-0000-4000-8000-000000000002").unwrap(),
    )
}

/// Insert the tenant roots and the group auto-created ledgers hang under.
pub async fn seed_tenant<S: Store>(store: &S, scope: &TenantScope) {
    RecordStore::<Company>::insert(store, &Company::new(scope.company_id, "Acme Industries"))
        .await
        .expect("Failed to seed company");
    RecordStore::<Division>::insert(
        store,
        &Division::new(scope.division_id, scope.company_id, "Head Office"),
    )
    .await
    .expect("Failed to seed division");
    RecordStore::<Group>::insert(store, &Group::new(scope, Ledger::DEFAULT_PARENT))
        .await
        .expect("Failed to seed suspense group");
}

pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    seed_tenant(&store, &scope()).await;
    Arc::new(store)
}

pub fn pipeline(store: Arc<MemoryStore>) -> IngestPipeline<MemoryStore> {
    IngestPipeline::new(store, SyncConfig::default())
}

/// Router wired exactly like the server binary, minus PostgreSQL.
pub fn test_app(store: Arc<MemoryStore>, source: StaticSource) -> Router {
    let state = AppState::new(store, Arc::new(source), SyncConfig::default());
    api::create_router(state, &Config::default())
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };
    (status, json)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_xml(app: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/xml")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub fn tenant_query(scope: &TenantScope) -> String {
    format!("company_id={}&division_id={}", scope.company_id, scope.division_id)
}
