//! Filters and response records for itinerary revenue outlook and actuals.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use common::row::{de_f64, de_i64, de_opt_date, de_string};
use common::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grain {
    Weekly,
    #[default]
    Monthly,
}

fn default_time_window() -> String {
    "12m".to_string()
}
fn default_years_back() -> i32 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItineraryRevenueFilters {
    #[serde(default = "default_time_window")]
    pub time_window: String,
    #[serde(default)]
    pub grain: Grain,
    pub currency_code: Option<String>,
    #[serde(default = "default_years_back")]
    pub years_back: i32,
    pub actuals_year: Option<i32>,
}

impl Default for ItineraryRevenueFilters {
    fn default() -> Self {
        Self {
            time_window: default_time_window(),
            grain: Grain::Monthly,
            currency_code: None,
            years_back: default_years_back(),
            actuals_year: None,
        }
    }
}

impl ItineraryRevenueFilters {
    pub fn validate(&self) -> Result<(), Error> {
        if !(2..=5).contains(&self.years_back) {
            return Err(Error::validation("years_back must be between 2 and 5"));
        }
        if let Some(year) = self.actuals_year {
            if !(2000..=2100).contains(&year) {
                return Err(Error::validation("actuals_year must be between 2000 and 2100"));
            }
        }
        Ok(())
    }

    /// Window label reported in response meta for the actuals endpoints.
    pub fn actuals_window_label(&self) -> String {
        match self.actuals_year {
            Some(year) => year.to_string(),
            None => format!("{}y", self.years_back),
        }
    }
}

/// One row of `mv_itinerary_pipeline_stages`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineStageRow {
    #[serde(default, deserialize_with = "de_opt_date")]
    pub period_start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub period_end: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_string")]
    pub stage: String,
    #[serde(default, deserialize_with = "de_f64")]
    pub itinerary_count: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub gross_amount: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub net_amount: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub pax_count: f64,
}

impl PipelineStageRow {
    pub fn is_quoted(&self) -> bool {
        self.stage == "Quoted"
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.stage.as_str(), "Confirmed" | "Traveling" | "Traveled")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookPoint {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub on_books_gross_amount: f64,
    pub potential_gross_amount: f64,
    pub expected_gross_amount: f64,
    pub on_books_commission_income_amount: f64,
    pub potential_commission_income_amount: f64,
    pub expected_commission_income_amount: f64,
    pub on_books_pax_count: i64,
    pub potential_pax_count: f64,
    pub expected_pax_count: f64,
    pub expected_margin_amount: f64,
    pub expected_margin_pct: f64,
    pub forecast_gross_amount: f64,
    pub target_gross_amount: f64,
    pub forecast_commission_income_amount: f64,
    pub target_commission_income_amount: f64,
    pub forecast_pax_count: f64,
    pub target_pax_count: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookSummary {
    pub total_on_books_gross_amount: f64,
    pub total_potential_gross_amount: f64,
    pub total_expected_gross_amount: f64,
    pub total_expected_commission_income_amount: f64,
    pub total_expected_margin_amount: f64,
    pub total_on_books_pax_count: i64,
    pub total_potential_pax_count: f64,
    pub total_expected_pax_count: f64,
    pub total_forecast_gross_amount: f64,
    pub total_target_gross_amount: f64,
    pub total_forecast_commission_income_amount: f64,
    pub total_target_commission_income_amount: f64,
    pub total_forecast_pax_count: f64,
    pub total_target_pax_count: f64,
}

impl OutlookSummary {
    pub fn from_timeline(timeline: &[OutlookPoint]) -> Self {
        timeline.iter().fold(Self::default(), |mut acc, p| {
            acc.total_on_books_gross_amount += p.on_books_gross_amount;
            acc.total_potential_gross_amount += p.potential_gross_amount;
            acc.total_expected_gross_amount += p.expected_gross_amount;
            acc.total_expected_commission_income_amount += p.expected_commission_income_amount;
            acc.total_expected_margin_amount += p.expected_margin_amount;
            acc.total_on_books_pax_count += p.on_books_pax_count;
            acc.total_potential_pax_count += p.potential_pax_count;
            acc.total_expected_pax_count += p.expected_pax_count;
            acc.total_forecast_gross_amount += p.forecast_gross_amount;
            acc.total_target_gross_amount += p.target_gross_amount;
            acc.total_forecast_commission_income_amount += p.forecast_commission_income_amount;
            acc.total_target_commission_income_amount += p.target_commission_income_amount;
            acc.total_forecast_pax_count += p.forecast_pax_count;
            acc.total_target_pax_count += p.target_pax_count;
            acc
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookResponse {
    pub summary: OutlookSummary,
    pub timeline: Vec<OutlookPoint>,
    pub close_ratio: f64,
}

/// Deposit rollup row; decoded from snake_case view columns, served camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct DepositTrendPoint {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    #[serde(default, deserialize_with = "de_i64")]
    pub closed_itinerary_count: i64,
    #[serde(default, deserialize_with = "de_f64")]
    pub closed_gross_amount: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub deposit_received_amount: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub target_deposit_amount: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub deposit_gap_amount: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub deposit_coverage_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositsResponse {
    pub timeline: Vec<DepositTrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionPoint {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub quoted_count: i64,
    pub confirmed_count: i64,
    pub close_ratio: f64,
    pub projected_confirmed_count: f64,
    pub projected_commission_income_expected: f64,
    pub projected_commission_income_best_case: f64,
    pub projected_commission_income_worst_case: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResponse {
    pub timeline: Vec<ConversionPoint>,
    pub lookback_close_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPoint {
    pub label: String,
    pub itinerary_count: i64,
    pub pax_count: i64,
    pub gross_amount: f64,
    pub commission_income_amount: f64,
    pub margin_amount: f64,
    pub trade_commission_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsResponse {
    pub top_consortia: Vec<ChannelPoint>,
    pub top_trade_agencies: Vec<ChannelPoint>,
}

/// Per-month and per-year actuals share these aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActualsFigures {
    pub itinerary_count: i64,
    pub pax_count: i64,
    pub gross_amount: f64,
    pub commission_income_amount: f64,
    pub margin_amount: f64,
    pub trade_commission_amount: f64,
    pub margin_pct: f64,
    pub avg_gross_per_itinerary: f64,
    pub avg_commission_income_per_itinerary: f64,
    pub avg_gross_per_pax: f64,
    pub avg_commission_income_per_pax: f64,
    pub avg_number_of_days: f64,
    pub avg_number_of_nights: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActualsMonthPoint {
    pub year: i32,
    pub month: u32,
    pub month_label: String,
    #[serde(flatten)]
    pub figures: ActualsFigures,
    pub gross_share_of_year_pct: f64,
    pub itinerary_share_of_year_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActualsYearSummary {
    pub year: i32,
    #[serde(flatten)]
    pub figures: ActualsFigures,
}

/// Direct vs trade split for one side of a month or the totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeDirectFigures {
    pub direct_itinerary_count: i64,
    pub trade_itinerary_count: i64,
    pub direct_pax_count: i64,
    pub trade_pax_count: i64,
    pub direct_gross_amount: f64,
    pub trade_gross_amount: f64,
    pub direct_commission_income_amount: f64,
    pub trade_commission_income_amount: f64,
    pub direct_margin_amount: f64,
    pub trade_margin_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeDirectMonthPoint {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    #[serde(flatten)]
    pub figures: TradeDirectFigures,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeDirectBreakdown {
    pub timeline: Vec<TradeDirectMonthPoint>,
    pub totals: TradeDirectFigures,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActualsYoyResponse {
    pub years: Vec<i32>,
    pub timeline: Vec<ActualsMonthPoint>,
    pub year_summaries: Vec<ActualsYearSummary>,
    pub trade_vs_direct: TradeDirectBreakdown,
}
