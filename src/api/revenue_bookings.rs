use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use common::time::parse_time_window;
use common::{paginate_list, Envelope, Meta};

use super::error::ApiResult;
use super::extract::ValidatedQuery;
use crate::revenue_bookings::types::{
    BookingDetail, BookingForecastFilters, BookingForecastPoint, BookingListFilters,
    BookingSummary, CashFlowFilters, CashFlowSummary, CashFlowTimeseriesPoint, DepositSummary,
    ItineraryTrendsResponse, LeadFlowResponse, PaymentOutSummary, TrendWindowFilters,
    SOURCE_SYSTEM,
};
use crate::AppState;

const VERSION: &str = "v1";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", get(list_bookings))
        .route("/bookings/:id", get(get_booking))
        .route("/cash-flow/summary", get(cash_flow_summary))
        .route("/cash-flow/timeseries", get(cash_flow_timeseries))
        .route("/deposits/summary", get(deposit_summary))
        .route("/payments-out/summary", get(payments_out_summary))
        .route("/booking-forecasts", get(booking_forecasts))
        .route("/itinerary-trends", get(itinerary_trends))
        .route("/itinerary-lead-flow", get(itinerary_lead_flow))
}

fn cash_meta(filters: &CashFlowFilters) -> Meta {
    Meta::new(SOURCE_SYSTEM, filters.time_window.clone(), VERSION)
        .with_currency(filters.currency_code.clone())
}

async fn list_bookings(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<BookingListFilters>,
) -> ApiResult<Json<Envelope<Vec<BookingSummary>>>> {
    let (data, pagination) = state.revenue_bookings.list_bookings(&filters).await?;
    let meta = Meta::new(SOURCE_SYSTEM, "custom", VERSION)
        .with_currency(filters.currency_code.clone());
    Ok(Json(Envelope::paged(data, pagination, meta)))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> ApiResult<Json<Envelope<BookingDetail>>> {
    let data = state.revenue_bookings.get_booking(&booking_id).await?;
    Ok(Json(Envelope::new(
        data,
        Meta::new(SOURCE_SYSTEM, "point_in_time", VERSION),
    )))
}

async fn cash_flow_summary(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<CashFlowFilters>,
) -> ApiResult<Json<Envelope<Vec<CashFlowSummary>>>> {
    let (start, end) = parse_time_window(&filters.time_window)?;
    let data = state
        .revenue_bookings
        .get_cashflow_summary(start, end, filters.currency_code.as_deref())
        .await?;
    let (page, pagination) = paginate_list(&data, filters.page, filters.page_size);
    Ok(Json(Envelope::paged(page, pagination, cash_meta(&filters))))
}

async fn cash_flow_timeseries(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<CashFlowFilters>,
) -> ApiResult<Json<Envelope<Vec<CashFlowTimeseriesPoint>>>> {
    let (start, end) = parse_time_window(&filters.time_window)?;
    let data = state
        .revenue_bookings
        .get_cashflow_timeseries(start, end, filters.currency_code.as_deref())
        .await?;
    let (page, pagination) = paginate_list(&data, filters.page, filters.page_size);
    Ok(Json(Envelope::paged(page, pagination, cash_meta(&filters))))
}

async fn deposit_summary(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<CashFlowFilters>,
) -> ApiResult<Json<Envelope<Vec<DepositSummary>>>> {
    let (start, end) = parse_time_window(&filters.time_window)?;
    let data = state
        .revenue_bookings
        .get_deposit_summary(start, end, filters.currency_code.as_deref())
        .await?;
    let (page, pagination) = paginate_list(&data, filters.page, filters.page_size);
    Ok(Json(Envelope::paged(page, pagination, cash_meta(&filters))))
}

async fn payments_out_summary(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<CashFlowFilters>,
) -> ApiResult<Json<Envelope<Vec<PaymentOutSummary>>>> {
    let (start, end) = parse_time_window(&filters.time_window)?;
    let data = state
        .revenue_bookings
        .get_payments_out_summary(start, end, filters.currency_code.as_deref())
        .await?;
    let (page, pagination) = paginate_list(&data, filters.page, filters.page_size);
    Ok(Json(Envelope::paged(page, pagination, cash_meta(&filters))))
}

async fn booking_forecasts(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<BookingForecastFilters>,
) -> ApiResult<Json<Envelope<Vec<BookingForecastPoint>>>> {
    let data = state
        .revenue_bookings
        .get_booking_forecasts(filters.lookback_months, filters.horizon_months)
        .await?;
    let (page, pagination) = paginate_list(&data, filters.page, filters.page_size);
    let meta = Meta::new(
        SOURCE_SYSTEM,
        format!("{}m", filters.lookback_months),
        VERSION,
    );
    Ok(Json(Envelope::paged(page, pagination, meta)))
}

async fn itinerary_trends(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<TrendWindowFilters>,
) -> ApiResult<Json<Envelope<ItineraryTrendsResponse>>> {
    let (start, end) = parse_time_window(&filters.time_window)?;
    let data = state.revenue_bookings.get_itinerary_trends(start, end).await;
    Ok(Json(Envelope::new(
        data,
        Meta::new(SOURCE_SYSTEM, filters.time_window, VERSION),
    )))
}

async fn itinerary_lead_flow(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<TrendWindowFilters>,
) -> ApiResult<Json<Envelope<LeadFlowResponse>>> {
    let (start, end) = parse_time_window(&filters.time_window)?;
    let data = state.revenue_bookings.get_itinerary_lead_flow(start, end).await;
    Ok(Json(Envelope::new(
        data,
        Meta::new(SOURCE_SYSTEM, filters.time_window, VERSION),
    )))
}
