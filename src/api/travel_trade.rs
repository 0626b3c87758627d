use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use common::{Envelope, Meta};

use super::error::ApiResult;
use super::extract::ValidatedQuery;
use crate::travel_trade::types::{
    AgencyLeaderboardRow, AgencyProfileResponse, AgentLeaderboardRow, AgentProfileResponse,
    PeriodType, TradeLeaderboardFilters, TradeLeaderboardResponse, TradeProfileFilters,
    TradeSearchFilters, TradeSearchResponse,
};
use crate::AppState;

const VERSION: &str = "v1";
const TRADE_ROLLUPS: &str =
    "travel_trade_lead_monthly_rollup,travel_trade_booked_itinerary_monthly_rollup";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/travel-agents/leaderboard", get(agent_leaderboard))
        .route("/travel-agents/:agent_id/profile", get(agent_profile))
        .route("/travel-agencies/leaderboard", get(agency_leaderboard))
        .route("/travel-agencies/:agency_id/profile", get(agency_profile))
        .route("/travel-trade/search", get(search))
}

fn rollup_meta(extra_sources: &str, period_type: PeriodType, currency: Option<String>) -> Meta {
    Meta::new(
        format!("{TRADE_ROLLUPS},{extra_sources}"),
        period_type.as_str(),
        VERSION,
    )
    .with_currency(currency)
}

async fn agent_leaderboard(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<TradeLeaderboardFilters>,
) -> ApiResult<Json<Envelope<TradeLeaderboardResponse<AgentLeaderboardRow>>>> {
    let data = state.travel_trade.agent_leaderboard(&filters).await?;
    let meta = rollup_meta(
        "travel_agent_monthly_rollup",
        filters.period_type,
        filters.currency_code,
    );
    Ok(Json(Envelope::new(data, meta)))
}

async fn agent_profile(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    ValidatedQuery(filters): ValidatedQuery<TradeProfileFilters>,
) -> ApiResult<Json<Envelope<AgentProfileResponse>>> {
    let data = state.travel_trade.agent_profile(&agent_id, &filters).await?;
    let meta = rollup_meta(
        "travel_agent_monthly_rollup,travel_agent_consultant_affinity_monthly_rollup,itineraries",
        filters.period_type,
        filters.currency_code,
    );
    Ok(Json(Envelope::new(data, meta)))
}

async fn agency_leaderboard(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<TradeLeaderboardFilters>,
) -> ApiResult<Json<Envelope<TradeLeaderboardResponse<AgencyLeaderboardRow>>>> {
    let data = state.travel_trade.agency_leaderboard(&filters).await?;
    let meta = rollup_meta(
        "travel_agency_monthly_rollup",
        filters.period_type,
        filters.currency_code,
    );
    Ok(Json(Envelope::new(data, meta)))
}

async fn agency_profile(
    State(state): State<AppState>,
    Path(agency_id): Path<String>,
    ValidatedQuery(filters): ValidatedQuery<TradeProfileFilters>,
) -> ApiResult<Json<Envelope<AgencyProfileResponse>>> {
    let data = state.travel_trade.agency_profile(&agency_id, &filters).await?;
    let meta = rollup_meta(
        "travel_agency_monthly_rollup,travel_agent_monthly_rollup",
        filters.period_type,
        filters.currency_code,
    );
    Ok(Json(Envelope::new(data, meta)))
}

async fn search(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<TradeSearchFilters>,
) -> ApiResult<Json<Envelope<TradeSearchResponse>>> {
    let data = state.travel_trade.search(&filters).await?;
    Ok(Json(Envelope::new(
        data,
        Meta::new("travel_trade_search_index", "n/a", VERSION),
    )))
}
