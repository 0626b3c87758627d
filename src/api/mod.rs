//! HTTP surface. Every route answers with the `{data, pagination, meta}`
//! envelope on success and `{error: {code, message}}` on failure.

pub mod ai_insights;
pub mod error;
pub mod extract;
pub mod fx;
pub mod health;
pub mod itinerary_revenue;
pub mod revenue_bookings;
pub mod travel_consultants;
pub mod travel_trade;

use axum::{
    http::{HeaderValue, Method},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::AppState;
use error::ApiError;

/// Full application router with CORS and request tracing.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(health::routes())
        .merge(fx::routes())
        .merge(ai_insights::routes())
        .merge(itinerary_revenue::routes())
        .merge(revenue_bookings::routes())
        .merge(travel_consultants::routes())
        .merge(travel_trade::routes());

    let prefix = state.settings.api_prefix.trim_end_matches('/').to_string();
    let cors = cors_layer(&state.settings.cors_origins());

    let router = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(&prefix, api)
    };

    router
        .fallback(not_found)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> ApiError {
    ApiError(common::Error::not_found("Resource not found"))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return base.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}
