use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use common::{Envelope, Meta};
use serde::Deserialize;

use super::error::ApiResult;
use super::extract::{check_ai_run_token, decode_body, Validate, ValidatedQuery};
use crate::ai_insights::orchestration::GenerationRunResult;
use crate::ai_insights::types::{
    AiBriefingDaily, AiEntityInsightsResponse, AiInsightEvent, AiRecommendationItem,
    FeedFilters, HistoryFilters, ItemsResponse, RecommendationFilters,
    RecommendationUpdateRequest,
};
use crate::AppState;

const VERSION: &str = "v1";
const EVENTS_SOURCE: &str = "ai_insight_events";
const QUEUE_SOURCE: &str = "ai_recommendation_queue";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ai-insights/briefing", get(briefing))
        .route("/ai-insights/feed", get(feed))
        .route("/ai-insights/recommendations", get(recommendations))
        .route("/ai-insights/recommendations/:id", patch(update_recommendation))
        .route("/ai-insights/history", get(history))
        .route("/ai-insights/entities/:entity_type/:entity_id", get(entity_insights))
        .route("/ai-insights/run", post(run_generation))
}

#[derive(Debug, Clone, Deserialize)]
pub struct BriefingQuery {
    pub briefing_date: Option<NaiveDate>,
}

impl Validate for BriefingQuery {}

async fn briefing(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<BriefingQuery>,
) -> ApiResult<Json<Envelope<AiBriefingDaily>>> {
    let data = state.ai_insights.get_briefing(query.briefing_date).await?;
    Ok(Json(Envelope::new(
        data,
        Meta::new("ai_briefings_daily", "daily", VERSION),
    )))
}

async fn feed(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<FeedFilters>,
) -> ApiResult<Json<Envelope<ItemsResponse<AiInsightEvent>>>> {
    let (data, pagination) = state.ai_insights.get_feed(&filters).await?;
    Ok(Json(Envelope::paged(
        data,
        pagination,
        Meta::new(EVENTS_SOURCE, "rolling", VERSION),
    )))
}

async fn recommendations(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<RecommendationFilters>,
) -> ApiResult<Json<Envelope<ItemsResponse<AiRecommendationItem>>>> {
    let (data, pagination) = state.ai_insights.get_recommendations(&filters).await?;
    Ok(Json(Envelope::paged(
        data,
        pagination,
        Meta::new(QUEUE_SOURCE, "rolling", VERSION),
    )))
}

async fn update_recommendation(
    State(state): State<AppState>,
    Path(recommendation_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Envelope<AiRecommendationItem>>> {
    let request: RecommendationUpdateRequest = decode_body(&body)?;
    let data = state
        .ai_insights
        .update_recommendation(&recommendation_id, request)
        .await?;
    Ok(Json(Envelope::new(
        data,
        Meta::new(QUEUE_SOURCE, "point_in_time", VERSION),
    )))
}

async fn history(
    State(state): State<AppState>,
    ValidatedQuery(filters): ValidatedQuery<HistoryFilters>,
) -> ApiResult<Json<Envelope<ItemsResponse<AiInsightEvent>>>> {
    let (data, pagination) = state.ai_insights.get_history(&filters).await?;
    Ok(Json(Envelope::paged(
        data,
        pagination,
        Meta::new(EVENTS_SOURCE, "historical", VERSION),
    )))
}

async fn entity_insights(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> ApiResult<Json<Envelope<AiEntityInsightsResponse>>> {
    let data = state
        .ai_insights
        .get_entity_insights(&entity_type, &entity_id)
        .await?;
    Ok(Json(Envelope::new(
        data,
        Meta::new(EVENTS_SOURCE, "entity", VERSION),
    )))
}

async fn run_generation(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Envelope<GenerationRunResult>>> {
    check_ai_run_token(&headers, state.settings.ai.manual_run_token.as_deref())?;
    let data = state.ai_orchestration.generate_insights("manual_api").await?;
    Ok(Json(Envelope::new(
        data,
        Meta::new("ai_context_*", "manual", VERSION),
    )))
}
