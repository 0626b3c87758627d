use axum::{extract::State, routing::get, Json, Router};
use common::{Envelope, Meta};

use super::error::ApiResult;
use super::extract::ValidatedQuery;
use crate::itinerary_revenue::types::{
    ActualsYoyResponse, ChannelsResponse, ConversionResponse, DepositsResponse,
    ItineraryRevenueFilters, OutlookResponse,
};
use crate::AppState;

const VERSION: &str = "v2";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/itinerary-revenue/outlook", get(outlook))
        .route("/itinerary-revenue/deposits", get(deposits))
        .route("/itinerary-revenue/conversion", get(conversion))
        .route("/itinerary-revenue/channels", get(channels))
        .route("/itinerary-revenue/actuals-yoy", get(actuals_yoy))
        .route("/itinerary-revenue/actuals-channels", get(actuals_channels))
}

fn meta(source: &str, time_window: String, filters: &ItineraryRevenueFilters) -> Meta {
    Meta::new(source, time_window, VERSION).with_currency(filters.currency_code.clone())
}

async fn outlook(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<ItineraryRevenueFilters>,
) -> ApiResult<Json<Envelope<OutlookResponse>>> {
    let data = state
        .itinerary_revenue
        .get_outlook(&filters.time_window, filters.grain)
        .await?;
    let meta = meta(
        "mv_itinerary_revenue_monthly,mv_itinerary_revenue_weekly,mv_itinerary_pipeline_stages",
        filters.time_window.clone(),
        &filters,
    );
    Ok(Json(Envelope::new(data, meta)))
}

async fn deposits(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<ItineraryRevenueFilters>,
) -> ApiResult<Json<Envelope<DepositsResponse>>> {
    let data = state
        .itinerary_revenue
        .get_deposits(&filters.time_window)
        .await?;
    let meta = meta(
        "mv_itinerary_deposit_monthly",
        filters.time_window.clone(),
        &filters,
    );
    Ok(Json(Envelope::new(data, meta)))
}

async fn conversion(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<ItineraryRevenueFilters>,
) -> ApiResult<Json<Envelope<ConversionResponse>>> {
    let data = state
        .itinerary_revenue
        .get_conversion(&filters.time_window)
        .await?;
    let meta = meta(
        "mv_itinerary_pipeline_stages",
        filters.time_window.clone(),
        &filters,
    );
    Ok(Json(Envelope::new(data, meta)))
}

async fn channels(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<ItineraryRevenueFilters>,
) -> ApiResult<Json<Envelope<ChannelsResponse>>> {
    let data = state
        .itinerary_revenue
        .get_channels(&filters.time_window)
        .await?;
    let meta = meta(
        "mv_itinerary_consortia_monthly,mv_itinerary_trade_agency_monthly",
        filters.time_window.clone(),
        &filters,
    );
    Ok(Json(Envelope::new(data, meta)))
}

async fn actuals_yoy(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<ItineraryRevenueFilters>,
) -> ApiResult<Json<Envelope<ActualsYoyResponse>>> {
    let data = state
        .itinerary_revenue
        .get_actuals_yoy(filters.years_back)
        .await?;
    let meta = meta(
        "mv_itinerary_revenue_monthly,mv_itinerary_consortia_actuals_monthly",
        format!("{}y", filters.years_back),
        &filters,
    );
    Ok(Json(Envelope::new(data, meta)))
}

async fn actuals_channels(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<ItineraryRevenueFilters>,
) -> ApiResult<Json<Envelope<ChannelsResponse>>> {
    let data = state
        .itinerary_revenue
        .get_actuals_channels(filters.years_back, filters.actuals_year)
        .await?;
    let meta = meta(
        "mv_itinerary_consortia_actuals_monthly,mv_itinerary_trade_agency_actuals_monthly",
        filters.actuals_window_label(),
        &filters,
    );
    Ok(Json(Envelope::new(data, meta)))
}
