use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use common::{Envelope, Meta};

use super::error::ApiResult;
use super::extract::ValidatedQuery;
use crate::travel_consultants::types::{
    ForecastFilters, ForecastResponse, LeaderboardFilters, LeaderboardResponse, ProfileFilters,
    ProfileResponse,
};
use crate::AppState;

const VERSION: &str = "v1";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/travel-consultants/leaderboard", get(leaderboard))
        .route("/travel-consultants/:employee_id/profile", get(profile))
        .route("/travel-consultants/:employee_id/forecast", get(forecast))
}

async fn leaderboard(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<LeaderboardFilters>,
) -> ApiResult<Json<Envelope<LeaderboardResponse>>> {
    let data = state.travel_consultants.get_leaderboard(&filters).await?;
    let meta = Meta::new(
        "mv_travel_consultant_leaderboard_monthly,mv_travel_consultant_funnel_monthly",
        filters.period_type.as_str(),
        VERSION,
    )
    .with_currency(filters.currency_code);
    Ok(Json(Envelope::new(data, meta)))
}

async fn profile(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
    ValidatedQuery(filters): ValidatedQuery<ProfileFilters>,
) -> ApiResult<Json<Envelope<ProfileResponse>>> {
    let data = state
        .travel_consultants
        .get_profile(&employee_id, &filters)
        .await?;
    let meta = Meta::new(
        "mv_travel_consultant_profile_monthly,mv_travel_consultant_funnel_monthly,\
mv_travel_consultant_compensation_monthly",
        filters.period_type.as_str(),
        VERSION,
    )
    .with_currency(filters.currency_code);
    Ok(Json(Envelope::new(data, meta)))
}

async fn forecast(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
    ValidatedQuery(filters): ValidatedQuery<ForecastFilters>,
) -> ApiResult<Json<Envelope<ForecastResponse>>> {
    let data = state
        .travel_consultants
        .get_forecast(&employee_id, &filters)
        .await?;
    let meta = Meta::new(
        "mv_travel_consultant_profile_monthly",
        format!("{}m", filters.horizon_months),
        VERSION,
    )
    .with_currency(filters.currency_code);
    Ok(Json(Envelope::new(data, meta)))
}
