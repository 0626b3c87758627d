use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use common::{Envelope, Error, Meta, Pagination};
use serde::Deserialize;

use super::error::ApiResult;
use super::extract::{
    check_fx_run_token, decode_body, decode_optional_body, Validate, ValidatedQuery,
};
use crate::fx::types::{
    FxBackfillResult, FxExposure, FxHolding, FxIntelligenceItem, FxIntelligenceRunRequest,
    FxInvoicePressure, FxManualRunResult, FxRate, FxRunRequest, FxSignal, FxTransaction,
    FxTransactionCreateRequest,
};
use crate::AppState;

const VERSION: &str = "v1";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/fx/rates", get(rates))
        .route("/fx/rates/pull", post(pull_rates))
        .route("/fx/rates/backfill", post(backfill_rates))
        .route("/fx/exposure", get(exposure))
        .route("/fx/invoice-pressure", get(invoice_pressure))
        .route("/fx/signals", get(signals))
        .route("/fx/signals/run", post(run_signals))
        .route("/fx/transactions", get(transactions).post(create_transaction))
        .route("/fx/holdings", get(holdings))
        .route("/fx/intelligence", get(intelligence))
        .route("/fx/intelligence/run", post(run_intelligence))
}

fn default_page() -> u32 {
    1
}
fn default_page_size() -> u32 {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size", alias = "limit")]
    pub page_size: u32,
    #[serde(default)]
    pub include_totals: bool,
    pub currency_code: Option<String>,
    pub transaction_type: Option<String>,
}

impl Validate for FxListQuery {
    fn validate(&self) -> Result<(), Error> {
        if self.page < 1 {
            return Err(Error::validation("page must be at least 1"));
        }
        if !(1..=200).contains(&self.page_size) {
            return Err(Error::validation("page_size must be between 1 and 200"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HoldingsQuery {
    pub currency_code: Option<String>,
}

impl Validate for HoldingsQuery {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BackfillRequest {
    #[serde(default = "default_backfill_days")]
    pub days: u32,
    #[serde(default = "default_backfill_interval")]
    pub interval: String,
}

fn default_backfill_days() -> u32 {
    120
}
fn default_backfill_interval() -> String {
    "1day".to_string()
}

impl Default for BackfillRequest {
    fn default() -> Self {
        Self {
            days: default_backfill_days(),
            interval: default_backfill_interval(),
        }
    }
}

fn meta(source: &str, currency: Option<String>) -> Meta {
    Meta::new(source, "", VERSION).with_currency(currency)
}

async fn rates(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<FxListQuery>,
) -> ApiResult<Json<Envelope<Vec<FxRate>>>> {
    let (data, total) = state
        .fx
        .get_rates(query.page, query.page_size, query.include_totals)
        .await?;
    let latest = state.fx.get_latest_rate_timestamp().await?;
    let stale = state.fx.rates_are_stale().await?;
    let meta = meta("supabase", None)
        .with_status(if stale { "stale" } else { "live" }, stale, false)
        .with_generated_at(latest.map(|ts| ts.to_rfc3339()));
    Ok(Json(Envelope::paged(
        data,
        Pagination::new(query.page, query.page_size, total),
        meta,
    )))
}

async fn exposure(State(state): State<AppState>) -> ApiResult<Json<Envelope<Vec<FxExposure>>>> {
    let data = state.fx.get_exposure().await?;
    Ok(Json(Envelope::new(data, meta("mv_fx_exposure", None))))
}

async fn invoice_pressure(
    State(state): State<AppState>,
) -> ApiResult<Json<Envelope<Vec<FxInvoicePressure>>>> {
    let data = state.fx.get_invoice_pressure().await?;
    Ok(Json(Envelope::new(data, meta("fx_invoice_pressure_v1", None))))
}

async fn signals(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<FxListQuery>,
) -> ApiResult<Json<Envelope<Vec<FxSignal>>>> {
    let (data, total) = state
        .fx
        .get_signals(
            query.page,
            query.page_size,
            query.include_totals,
            query.currency_code.as_deref(),
        )
        .await?;
    Ok(Json(Envelope::paged(
        data,
        Pagination::new(query.page, query.page_size, total),
        meta("fx_signals", query.currency_code),
    )))
}

async fn transactions(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<FxListQuery>,
) -> ApiResult<Json<Envelope<Vec<FxTransaction>>>> {
    let (data, total) = state
        .fx
        .get_transactions(
            query.page,
            query.page_size,
            query.include_totals,
            query.currency_code.as_deref(),
            query.transaction_type.as_deref(),
        )
        .await?;
    Ok(Json(Envelope::paged(
        data,
        Pagination::new(query.page, query.page_size, total),
        meta("fx_transactions", query.currency_code),
    )))
}

async fn create_transaction(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Envelope<FxTransaction>>> {
    let request: FxTransactionCreateRequest = decode_body(&body)?;
    let currency = Some(request.currency_code.trim().to_uppercase());
    let data = state.fx.create_transaction(request).await?;
    Ok(Json(Envelope::new(data, meta("fx_transactions", currency))))
}

async fn holdings(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<HoldingsQuery>,
) -> ApiResult<Json<Envelope<Vec<FxHolding>>>> {
    let data = state.fx.get_holdings(query.currency_code.as_deref()).await?;
    Ok(Json(Envelope::new(data, meta("fx_holdings", query.currency_code))))
}

async fn intelligence(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<FxListQuery>,
) -> ApiResult<Json<Envelope<Vec<FxIntelligenceItem>>>> {
    let (data, total) = state
        .fx_intelligence
        .list_intelligence(
            query.page,
            query.page_size,
            query.include_totals,
            query.currency_code.as_deref(),
        )
        .await?;
    Ok(Json(Envelope::paged(
        data,
        Pagination::new(query.page, query.page_size, total),
        meta("fx_intelligence_items", query.currency_code),
    )))
}

async fn pull_rates(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Envelope<FxManualRunResult>>> {
    check_fx_run_token(&headers, state.settings.fx.manual_run_token.as_deref())?;
    let request: FxRunRequest = decode_optional_body(&body)?;
    let data = state.fx.pull_rates(request.run_type).await?;
    Ok(Json(Envelope::new(data, meta("fx_rates", None))))
}

async fn backfill_rates(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Envelope<FxBackfillResult>>> {
    check_fx_run_token(&headers, state.settings.fx.manual_run_token.as_deref())?;
    let request: BackfillRequest = decode_optional_body(&body)?;
    let data = state
        .fx
        .backfill_rates(request.days, &request.interval)
        .await?;
    Ok(Json(Envelope::new(data, meta("fx_rates", None))))
}

async fn run_signals(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Envelope<FxManualRunResult>>> {
    check_fx_run_token(&headers, state.settings.fx.manual_run_token.as_deref())?;
    let request: FxRunRequest = decode_optional_body(&body)?;
    let data = state.fx.run_signals(request.run_type).await?;
    Ok(Json(Envelope::new(data, meta("fx_signal_runs", None))))
}

async fn run_intelligence(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Envelope<FxManualRunResult>>> {
    check_fx_run_token(&headers, state.settings.fx.manual_run_token.as_deref())?;
    let request: FxIntelligenceRunRequest = decode_optional_body(&body)?;
    let data = state
        .fx_intelligence
        .run_intelligence(request.run_type)
        .await?;
    Ok(Json(Envelope::new(data, meta("fx_intelligence_runs", None))))
}
