//! Router-level tests over an in-memory row store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::Settings;
use rowstore_client::{MemoryStore, RowStore};
use swainos::api::build_router;
use swainos::state::{AppState, MarketProviders};

fn app_with(settings: Settings, store: Arc<MemoryStore>) -> Router {
    let store: Arc<dyn RowStore> = store;
    let state = AppState::with_store(settings, store, MarketProviders::default())
        .expect("state");
    build_router(state)
}

fn app(store: Arc<MemoryStore>) -> Router {
    app_with(Settings::default(), store)
}

fn booking_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new().with_rows(
        "bookings",
        [
            json!({"id": "b1", "is_deleted": false, "service_start_date": "2026-03-01",
                   "currency_code": "USD", "gross_amount": 1200.5, "booking_number": "BK-1"}),
            json!({"id": "b2", "is_deleted": false, "service_start_date": "2026-05-01",
                   "currency_code": "USD", "gross_amount": 800}),
            json!({"id": "b3", "is_deleted": true, "service_start_date": "2026-04-01",
                   "currency_code": "USD"}),
        ],
    ))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    send(app, request).await
}

fn post(uri: &str, headers: &[(&str, &str)], body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

#[tokio::test]
async fn test_health_envelope() {
    for path in ["/api/v1/health", "/api/v1/healthz"] {
        let (status, body) = get(app(Arc::new(MemoryStore::new())), path).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");
        assert_eq!(body["meta"]["source"], "system");
        assert_eq!(body["meta"]["timeWindow"], "now");
        assert_eq!(body["meta"]["calculationVersion"], "v1");
        assert!(body["pagination"].is_null());
    }
}

#[tokio::test]
async fn test_unknown_route_uses_error_envelope() {
    let (status, body) = get(app(Arc::new(MemoryStore::new())), "/api/v1/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_bookings_list_pages_non_deleted_rows() {
    let (status, body) = get(app(booking_store()), "/api/v1/bookings?page_size=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], "b2");
    assert_eq!(body["pagination"]["totalItems"], 2);
    assert_eq!(body["pagination"]["totalPages"], 2);
    assert_eq!(body["meta"]["source"], "salesforce_kaptio");
}

#[tokio::test]
async fn test_booking_detail_not_found() {
    let (status, body) = get(app(booking_store()), "/api/v1/bookings/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Booking not found");
}

#[tokio::test]
async fn test_query_validation_failures_are_422() {
    for uri in [
        "/api/v1/bookings?page_size=0",
        "/api/v1/bookings?page=abc",
        "/api/v1/travel-trade/search",
        "/api/v1/travel-trade/search?q=",
        "/api/v1/travel-trade/search?q=acme&limit=51",
        "/api/v1/itinerary-revenue/outlook?grain=daily",
        "/api/v1/travel-consultants/leaderboard?month=13",
    ] {
        let (status, body) = get(app(booking_store()), uri).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
        assert_eq!(body["error"]["code"], "validation_error", "{uri}");
    }
}

#[tokio::test]
async fn test_trade_search_returns_ranked_matches() {
    let store = Arc::new(MemoryStore::new().with_rows(
        "travel_trade_search_index",
        [
            json!({"entity_type": "agency", "entity_id": "ag1", "display_name": "Acme Travel",
                   "search_text": "acme travel", "rank_score": 2.0}),
            json!({"entity_type": "agent", "entity_id": "a1", "display_name": "Jo Acme",
                   "search_text": "jo acme", "rank_score": 1.0}),
        ],
    ));
    let (status, body) = get(app(store), "/api/v1/travel-trade/search?q=acme").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["source"], "travel_trade_search_index");
    assert_eq!(body["meta"]["timeWindow"], "n/a");
    assert_eq!(body["data"]["query"], "acme");
    let results = body["data"]["results"].as_array().expect("results");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["entityId"], "ag1");
    assert_eq!(results[1]["displayName"], "Jo Acme");
}

#[tokio::test]
async fn test_ai_run_disabled_without_token() {
    let request = post("/api/v1/ai-insights/run", &[], "");
    let (status, body) = send(app(Arc::new(MemoryStore::new())), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Manual AI run endpoint is disabled");
}

#[tokio::test]
async fn test_ai_run_rejects_wrong_token() {
    let mut settings = Settings::default();
    settings.ai.manual_run_token = Some("secret".into());
    let request = post("/api/v1/ai-insights/run", &[("x-ai-run-token", "nope")], "");
    let (status, body) = send(app_with(settings, Arc::new(MemoryStore::new())), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Invalid manual run token");
}

#[tokio::test]
async fn test_fx_run_requires_configured_token() {
    let mut settings = Settings::default();
    settings.fx.manual_run_token = Some("fx-secret".into());
    let store = Arc::new(MemoryStore::new());
    let request = post("/api/v1/fx/signals/run", &[], "{}");
    let (status, body) = send(app_with(settings, store.clone()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_fx_transaction_body_validation() {
    let request = post(
        "/api/v1/fx/transactions",
        &[],
        r#"{"currencyCode":"AUD","transactionType":"BUY","transactionDate":"2026-01-05","amount":"100","bogus":1}"#,
    );
    let (status, body) = send(app(Arc::new(MemoryStore::new())), request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn test_missing_briefing_is_404() {
    let (status, body) = get(app(Arc::new(MemoryStore::new())), "/api/v1/ai-insights/briefing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "No AI briefing available");
}

#[tokio::test]
async fn test_recommendation_invalid_transition_is_400() {
    let store = Arc::new(MemoryStore::new().with_rows(
        "ai_recommendation_queue",
        [json!({"id": "r1", "status": "resolved", "title": "Follow up"})],
    ));
    let request = Request::builder()
        .method(Method::PATCH)
        .uri("/api/v1/ai-insights/recommendations/r1")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"status":"acknowledged"}"#))
        .expect("request");
    let (status, body) = send(app(store), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_cash_flow_summary_is_paginated() {
    let store = Arc::new(MemoryStore::new());
    let (status, body) = get(app(store), "/api/v1/cash-flow/summary?time_window=30d").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["page"], 1);
    assert_eq!(body["pagination"]["totalItems"], 0);
    assert_eq!(body["meta"]["timeWindow"], "30d");
}

#[tokio::test]
async fn test_unknown_query_params_are_ignored() {
    let (status, body) = get(app(Arc::new(MemoryStore::new())), "/api/v1/fx/rates?limit=50").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["pageSize"], 50);

    let (status, body) = get(app(booking_store()), "/api/v1/bookings?unexpected=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["totalItems"], 2);
}

#[tokio::test]
async fn test_create_fx_transaction_returns_ok() {
    let store = Arc::new(MemoryStore::new());
    let request = post(
        "/api/v1/fx/transactions",
        &[],
        r#"{"currencyCode":"AUD","transactionType":"BUY","transactionDate":"2026-01-05","amount":"100"}"#,
    );
    let (status, body) = send(app(store.clone()), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["source"], "fx_transactions");
    assert_eq!(body["meta"]["currency"], "AUD");
    assert_eq!(store.rows("fx_transactions").len(), 1);
}

#[tokio::test]
async fn test_create_fx_transaction_accepts_snake_case_body() {
    let store = Arc::new(MemoryStore::new());
    let request = post(
        "/api/v1/fx/transactions",
        &[],
        r#"{"currency_code":"NZD","transaction_type":"BUY","transaction_date":"2026-01-05","amount":"165","exchange_rate":"1.65"}"#,
    );
    let (status, body) = send(app(store.clone()), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currencyCode"], "NZD");
    assert_eq!(store.rows("fx_transactions").len(), 1);
}

#[tokio::test]
async fn test_oversized_time_window_is_400() {
    for uri in [
        "/api/v1/itinerary-revenue/outlook?time_window=100000000d",
        "/api/v1/itinerary-revenue/outlook?time_window=3000000000m",
        "/api/v1/cash-flow/summary?time_window=99999999999999m",
    ] {
        let (status, body) = get(app(Arc::new(MemoryStore::new())), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["message"], "Unsupported time window format", "{uri}");
    }
}
