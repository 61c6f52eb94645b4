//! HTTP routing integration tests
//!
//! Drives `server::route` directly, without a listening socket.

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

use tally::auth::{AccessPolicy, JwtValidator, MANAGE_CAPABILITY};
use tally::cache::{CacheConfig, ReportCache, TransientStore};
use tally::config::Args;
use tally::engine::ReportQueryEngine;
use tally::server::{route, AppState};
use tally::settings::AdminSettings;
use tally::source::schema::create_store_tables;
use tally::source::{DataSourceSelector, SqliteConnector, SqliteStore, StaticDevConfig};

const SECRET: &str = "api-test-secret-that-is-at-least-32-characters";

fn state(access: AccessPolicy) -> AppState {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .with_conn(|conn| {
            create_store_tables(conn, "wp_")?;
            conn.execute_batch(
                "INSERT INTO wp_edd_orders (id, parent, customer_id, status, type, total, gateway, date_created) VALUES
                   (1, 0, 1, 'complete', 'sale', 42.0, 'stripe', '2024-05-02 08:00:00');",
            )?;
            Ok(())
        })
        .unwrap();

    let selector = Arc::new(DataSourceSelector::new(
        Arc::new(store),
        "wp_",
        Arc::new(StaticDevConfig::disabled()),
        Arc::new(SqliteConnector),
    ));
    let cache = ReportCache::new(Arc::new(TransientStore::new()), &CacheConfig::default());
    let settings = Arc::new(AdminSettings::new(3600, Default::default()));
    let engine = Arc::new(ReportQueryEngine::new(selector, cache, settings));

    let args = Args::parse_from(["tally", "--insecure-no-auth"]);
    AppState::new(args, engine, access)
}

fn validator() -> JwtValidator {
    JwtValidator::new(SECRET.to_string(), 300).unwrap()
}

async fn body_json(response: Response<Full<Bytes>>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(state: &AppState, path: &str, query: Option<&str>) -> Response<Full<Bytes>> {
    route(state, &Method::GET, path, query, None, Bytes::new()).await
}

#[tokio::test]
async fn test_report_envelope() {
    let state = state(AccessPolicy::Open);

    let response = get(&state, "/stats/v1/revenue/by-month", Some("start_date=2024-01-01")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");

    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"][0]["label"], json!("May 2024"));
    assert_eq!(body["data"][0]["total_revenue"], json!(42.0));
}

#[tokio::test]
async fn test_invalid_date_rejected() {
    let state = state(AccessPolicy::Open);

    let response = get(&state, "/stats/v1/revenue/by-month", Some("start_date=2024-02-30")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(state.engine.cache().stats().entries, 0);
}

#[tokio::test]
async fn test_yoy_shaped_record() {
    let state = state(AccessPolicy::Open);

    let body = body_json(get(&state, "/stats/v1/customers/yoy-change", None).await).await;
    assert_eq!(
        body["data"],
        json!({"current_year": 0, "last_year": 0, "change": 0.0})
    );
}

#[tokio::test]
async fn test_auth_required() {
    let state = state(AccessPolicy::Jwt(validator()));

    let response = get(&state, "/stats/v1/mrr/current", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = validator().generate_token("viewer", vec![]).unwrap();
    let header = format!("Bearer {}", token);
    let response = route(
        &state,
        &Method::GET,
        "/stats/v1/mrr/current",
        None,
        Some(&header),
        Bytes::new(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let token = validator()
        .generate_token("admin", vec![MANAGE_CAPABILITY.to_string()])
        .unwrap();
    let header = format!("Bearer {}", token);
    let response = route(
        &state,
        &Method::GET,
        "/stats/v1/mrr/current",
        None,
        Some(&header),
        Bytes::new(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_is_open() {
    let state = state(AccessPolicy::Jwt(validator()));

    let response = get(&state, "/stats/v1/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["database"], json!("connected"));
    assert_eq!(body["edd_active"], json!(true));
    assert_eq!(body["tables_exist"]["edd_subscriptions"], json!(true));
}

#[tokio::test]
async fn test_cache_clear_and_settings() {
    let state = state(AccessPolicy::Open);

    get(&state, "/stats/v1/revenue/by-month", None).await;
    assert_eq!(state.engine.cache().stats().entries, 1);

    let response = route(
        &state,
        &Method::POST,
        "/stats/v1/cache/clear",
        None,
        None,
        Bytes::new(),
    )
    .await;
    let body = body_json(response).await;
    assert_eq!(body["message"], json!("Cache cleared successfully!"));
    assert_eq!(body["removed"], json!(1));
    assert_eq!(state.engine.cache().stats().entries, 0);

    let response = route(
        &state,
        &Method::POST,
        "/stats/v1/settings",
        None,
        None,
        Bytes::from_static(br#"{"cache_duration": 0, "default_range": "all"}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(get(&state, "/stats/v1/settings", None).await).await;
    assert_eq!(body["data"], json!({"cache_duration": 0, "default_range": "all"}));

    get(&state, "/stats/v1/revenue/by-month", None).await;
    assert_eq!(state.engine.cache().stats().entries, 0);
}

#[tokio::test]
async fn test_unknown_paths_and_preflight() {
    let state = state(AccessPolicy::Open);

    assert_eq!(
        get(&state, "/stats/v1/nothing-here", None).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(get(&state, "/other", None).await.status(), StatusCode::NOT_FOUND);

    let response = route(
        &state,
        &Method::OPTIONS,
        "/stats/v1/revenue/by-month",
        None,
        None,
        Bytes::new(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}
