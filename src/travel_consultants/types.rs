//! Query filters and response records for consultant leaderboards and profiles.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use common::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Monthly,
    Rolling12,
    Year,
}

impl PeriodType {
    pub fn as_str(self) -> &'static str {
        match self {
            PeriodType::Monthly => "monthly",
            PeriodType::Rolling12 => "rolling12",
            PeriodType::Year => "year",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardDomain {
    Travel,
    Funnel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    ConversionRate,
    CloseRate,
    BookedRevenue,
    MarginPct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum YoyMode {
    SamePeriod,
    FullYear,
}

impl YoyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            YoyMode::SamePeriod => "same_period",
            YoyMode::FullYear => "full_year",
        }
    }
}

fn check_year_month(year: Option<i32>, month: Option<u32>) -> Result<(), Error> {
    if let Some(year) = year {
        if !(2000..=2100).contains(&year) {
            return Err(Error::validation("year must be between 2000 and 2100"));
        }
    }
    if let Some(month) = month {
        if !(1..=12).contains(&month) {
            return Err(Error::validation("month must be between 1 and 12"));
        }
    }
    Ok(())
}

fn default_monthly() -> PeriodType {
    PeriodType::Monthly
}
fn default_rolling12() -> PeriodType {
    PeriodType::Rolling12
}
fn default_domain() -> LeaderboardDomain {
    LeaderboardDomain::Travel
}
fn default_sort_by() -> SortBy {
    SortBy::BookedRevenue
}
fn default_sort_order() -> SortOrder {
    SortOrder::Desc
}
fn default_yoy_mode() -> YoyMode {
    YoyMode::SamePeriod
}
fn default_horizon() -> u32 {
    12
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardFilters {
    #[serde(default = "default_monthly")]
    pub period_type: PeriodType,
    #[serde(default = "default_domain")]
    pub domain: LeaderboardDomain,
    pub year: Option<i32>,
    pub month: Option<u32>,
    #[serde(default = "default_sort_by")]
    pub sort_by: SortBy,
    #[serde(default = "default_sort_order")]
    pub sort_order: SortOrder,
    pub currency_code: Option<String>,
}

impl LeaderboardFilters {
    pub fn new(period_type: PeriodType, domain: LeaderboardDomain) -> Self {
        Self {
            period_type,
            domain,
            year: None,
            month: None,
            sort_by: SortBy::BookedRevenue,
            sort_order: SortOrder::Desc,
            currency_code: None,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        check_year_month(self.year, self.month)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileFilters {
    #[serde(default = "default_rolling12")]
    pub period_type: PeriodType,
    pub year: Option<i32>,
    pub month: Option<u32>,
    #[serde(default = "default_yoy_mode")]
    pub yoy_mode: YoyMode,
    pub currency_code: Option<String>,
}

impl ProfileFilters {
    pub fn validate(&self) -> Result<(), Error> {
        check_year_month(self.year, self.month)
    }
}

impl Default for ProfileFilters {
    fn default() -> Self {
        Self {
            period_type: PeriodType::Rolling12,
            year: None,
            month: None,
            yoy_mode: YoyMode::SamePeriod,
            currency_code: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastFilters {
    #[serde(default = "default_horizon")]
    pub horizon_months: u32,
    pub currency_code: Option<String>,
}

impl ForecastFilters {
    pub fn validate(&self) -> Result<(), Error> {
        if !(1..=24).contains(&self.horizon_months) {
            return Err(Error::validation("horizon_months must be between 1 and 24"));
        }
        Ok(())
    }
}

impl Default for ForecastFilters {
    fn default() -> Self {
        Self {
            horizon_months: default_horizon(),
            currency_code: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultantIdentity {
    pub employee_id: String,
    pub employee_external_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub rank: u32,
    pub employee_id: String,
    pub employee_external_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub itinerary_count: i64,
    pub pax_count: i64,
    pub booked_revenue: f64,
    pub commission_income: f64,
    pub margin_amount: f64,
    pub margin_pct: f64,
    pub lead_count: i64,
    pub closed_won_count: i64,
    pub closed_lost_count: i64,
    pub conversion_rate: f64,
    pub close_rate: f64,
    pub avg_speed_to_book_days: Option<f64>,
    pub spend_to_book: Option<f64>,
    pub growth_target_variance_pct: f64,
    pub yoy_to_date_variance_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub key: String,
    pub title: String,
    pub description: String,
    pub trend_direction: String,
    pub trend_strength: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub period_type: PeriodType,
    pub domain: LeaderboardDomain,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub rankings: Vec<LeaderboardRow>,
    pub highlights: Vec<Highlight>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiCard {
    pub key: String,
    pub display_label: String,
    pub description: String,
    pub value: f64,
    pub trend_direction: String,
    pub trend_strength: String,
    pub is_lagging_indicator: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendStoryPoint {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub month_label: String,
    pub current_value: f64,
    pub baseline_value: f64,
    pub yoy_delta_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendStory {
    pub points: Vec<TrendStoryPoint>,
    pub current_total: f64,
    pub baseline_total: f64,
    pub yoy_delta_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreeYearSeries {
    pub year: i32,
    pub monthly_values: Vec<f64>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreeYearVariance {
    pub label: String,
    pub monthly_variance_pct: Vec<f64>,
    pub total_variance_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreeYearMatrix {
    pub key: String,
    pub title: String,
    pub metric_label: String,
    pub series: Vec<ThreeYearSeries>,
    pub variances: Vec<ThreeYearVariance>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreeYearPerformance {
    pub travel_closed_files: ThreeYearMatrix,
    pub lead_funnel: ThreeYearMatrix,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelHealth {
    pub lead_count: i64,
    pub closed_won_count: i64,
    pub closed_lost_count: i64,
    pub conversion_rate: f64,
    pub close_rate: f64,
    pub avg_speed_to_book_days: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub projected_revenue_amount: f64,
    pub target_revenue_amount: f64,
    pub growth_gap_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSummary {
    pub total_projected_revenue_amount: f64,
    pub total_target_revenue_amount: f64,
    pub total_growth_gap_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSection {
    pub timeline: Vec<ForecastPoint>,
    pub summary: ForecastSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationImpact {
    pub salary_annual_amount: f64,
    pub salary_period_amount: f64,
    pub commission_rate: f64,
    pub estimated_commission_amount: f64,
    pub estimated_total_pay_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub key: String,
    pub display_label: String,
    pub description: String,
    pub trend_direction: String,
    pub trend_strength: String,
    pub is_lagging_indicator: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightCard {
    pub title: String,
    pub description: String,
    pub trend_direction: String,
    pub trend_strength: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonContext {
    pub current_period: String,
    pub baseline_period: String,
    pub yoy_mode: YoyMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationalItinerary {
    pub itinerary_id: String,
    pub itinerary_number: String,
    pub itinerary_name: Option<String>,
    pub itinerary_status: String,
    pub primary_country: Option<String>,
    pub travel_start_date: Option<NaiveDate>,
    pub travel_end_date: Option<NaiveDate>,
    pub gross_amount: f64,
    pub pax_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationalSnapshot {
    pub current_traveling_files: Vec<OperationalItinerary>,
    pub top_open_itineraries: Vec<OperationalItinerary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub employee: ConsultantIdentity,
    pub section_order: Vec<String>,
    pub hero_kpis: Vec<KpiCard>,
    pub trend_story: TrendStory,
    pub three_year_performance: ThreeYearPerformance,
    pub ytd_variance_pct: f64,
    pub funnel_health: FunnelHealth,
    pub forecast_and_target: ForecastSection,
    pub compensation_impact: CompensationImpact,
    pub operational_snapshot: OperationalSnapshot,
    pub signals: Vec<Signal>,
    pub insight_cards: Vec<InsightCard>,
    pub comparison_context: ComparisonContext,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastResponse {
    pub employee: ConsultantIdentity,
    pub timeline: Vec<ForecastPoint>,
    pub summary: ForecastSummary,
}
