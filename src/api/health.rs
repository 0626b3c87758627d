use axum::{routing::get, Json, Router};
use common::{Envelope, Meta};
use serde_json::{json, Value};

use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
}

async fn health() -> Json<Envelope<Value>> {
    Json(Envelope::new(
        json!({"status": "ok"}),
        Meta::new("system", "now", "v1"),
    ))
}
