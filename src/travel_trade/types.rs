//! Filters, rollup records and responses for travel agents, agencies and trade search.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use common::row::{de_f64, de_i64, de_opt_date, de_string};
use common::Error;

pub use crate::travel_consultants::types::{PeriodType, SortOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSortBy {
    #[default]
    GrossProfit,
    Gross,
    ConvertedLeads,
    BookedItineraries,
    Leads,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchEntityType {
    #[default]
    All,
    Agent,
    Agency,
}

impl SearchEntityType {
    pub fn as_filter(self) -> Option<&'static str> {
        match self {
            SearchEntityType::All => None,
            SearchEntityType::Agent => Some("agent"),
            SearchEntityType::Agency => Some("agency"),
        }
    }
}

fn default_year_period() -> PeriodType {
    PeriodType::Year
}
fn default_top_n() -> u32 {
    10
}
fn default_desc() -> SortOrder {
    SortOrder::Desc
}
fn default_search_limit() -> u32 {
    10
}

fn check_period(year: Option<i32>, month: Option<u32>, top_n: u32) -> Result<(), Error> {
    if year.is_some_and(|y| !(2000..=2100).contains(&y)) {
        return Err(Error::validation("year must be between 2000 and 2100"));
    }
    if month.is_some_and(|m| !(1..=12).contains(&m)) {
        return Err(Error::validation("month must be between 1 and 12"));
    }
    if !(1..=50).contains(&top_n) {
        return Err(Error::validation("top_n must be between 1 and 50"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeLeaderboardFilters {
    #[serde(default = "default_year_period")]
    pub period_type: PeriodType,
    pub year: Option<i32>,
    pub month: Option<u32>,
    #[serde(default = "default_top_n")]
    pub top_n: u32,
    #[serde(default)]
    pub sort_by: TradeSortBy,
    #[serde(default = "default_desc")]
    pub sort_order: SortOrder,
    pub currency_code: Option<String>,
}

impl TradeLeaderboardFilters {
    pub fn validate(&self) -> Result<(), Error> {
        check_period(self.year, self.month, self.top_n)
    }
}

impl Default for TradeLeaderboardFilters {
    fn default() -> Self {
        Self {
            period_type: PeriodType::Year,
            year: None,
            month: None,
            top_n: default_top_n(),
            sort_by: TradeSortBy::default(),
            sort_order: SortOrder::Desc,
            currency_code: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeProfileFilters {
    #[serde(default = "default_year_period")]
    pub period_type: PeriodType,
    pub year: Option<i32>,
    pub month: Option<u32>,
    #[serde(default = "default_top_n")]
    pub top_n: u32,
    pub currency_code: Option<String>,
}

impl TradeProfileFilters {
    pub fn validate(&self) -> Result<(), Error> {
        check_period(self.year, self.month, self.top_n)
    }
}

impl Default for TradeProfileFilters {
    fn default() -> Self {
        Self {
            period_type: PeriodType::Year,
            year: None,
            month: None,
            top_n: default_top_n(),
            currency_code: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeSearchFilters {
    pub q: String,
    #[serde(default)]
    pub entity_type: SearchEntityType,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
}

impl TradeSearchFilters {
    pub fn validate(&self) -> Result<(), Error> {
        let length = self.q.chars().count();
        if !(1..=120).contains(&length) {
            return Err(Error::validation("q must be between 1 and 120 characters"));
        }
        if !(1..=50).contains(&self.limit) {
            return Err(Error::validation("limit must be between 1 and 50"));
        }
        Ok(())
    }
}

// ── rollup records ────────────────────────────────────────────────────

/// One month of `travel_agent_monthly_rollup` or `travel_agency_monthly_rollup`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradeRollupRow {
    #[serde(default, deserialize_with = "de_opt_date")]
    pub period_start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_string")]
    pub agent_id: String,
    #[serde(default, deserialize_with = "de_string")]
    pub agent_external_id: String,
    #[serde(default, deserialize_with = "de_string")]
    pub agent_name: String,
    #[serde(default)]
    pub agent_email: Option<String>,
    #[serde(default, deserialize_with = "de_string")]
    pub agency_id: String,
    #[serde(default, deserialize_with = "de_string")]
    pub agency_external_id: String,
    #[serde(default, deserialize_with = "de_string")]
    pub agency_name: String,
    #[serde(default, deserialize_with = "de_i64")]
    pub leads_count: i64,
    #[serde(default, deserialize_with = "de_i64")]
    pub converted_leads_count: i64,
    #[serde(default, deserialize_with = "de_i64")]
    pub traveled_itineraries_count: i64,
    #[serde(default, deserialize_with = "de_f64")]
    pub gross_amount: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub gross_profit_amount: f64,
    #[serde(default, deserialize_with = "de_i64")]
    pub active_agents_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AffinityRow {
    #[serde(default, deserialize_with = "de_string")]
    pub employee_id: String,
    #[serde(default, deserialize_with = "de_string")]
    pub employee_external_id: String,
    #[serde(default, deserialize_with = "de_string")]
    pub employee_first_name: String,
    #[serde(default, deserialize_with = "de_string")]
    pub employee_last_name: String,
    #[serde(default, deserialize_with = "de_i64")]
    pub converted_leads_count: i64,
    #[serde(default, deserialize_with = "de_i64")]
    pub closed_won_itineraries_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradeItineraryRow {
    #[serde(default, deserialize_with = "de_string")]
    pub id: String,
    #[serde(default, deserialize_with = "de_string")]
    pub itinerary_number: String,
    #[serde(default)]
    pub itinerary_name: Option<String>,
    #[serde(default, deserialize_with = "de_string")]
    pub itinerary_status: String,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub travel_start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub travel_end_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_f64")]
    pub gross_amount: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub gross_profit: f64,
}

/// A row of `travel_trade_search_index`, also returned as-is in search results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct TradeSearchRow {
    #[serde(default, deserialize_with = "de_string")]
    pub entity_type: String,
    #[serde(default, deserialize_with = "de_string")]
    pub entity_id: String,
    #[serde(default, deserialize_with = "de_string")]
    pub entity_external_id: String,
    #[serde(default, deserialize_with = "de_string")]
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub agency_name: Option<String>,
    #[serde(default)]
    pub iata_code: Option<String>,
    #[serde(default)]
    pub host_identifier: Option<String>,
    #[serde(default, deserialize_with = "de_f64")]
    pub rank_score: f64,
}

// ── responses ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeLeaderboardResponse<R> {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub period_type: PeriodType,
    pub sort_by: TradeSortBy,
    pub sort_order: SortOrder,
    pub top_n: u32,
    pub rankings: Vec<R>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentLeaderboardRow {
    pub rank: u32,
    pub agent_id: String,
    pub agent_external_id: String,
    pub agent_name: String,
    pub agent_email: Option<String>,
    pub agency_id: String,
    pub agency_external_id: String,
    pub agency_name: String,
    pub leads_count: i64,
    pub converted_leads_count: i64,
    pub booked_itineraries_count: i64,
    pub gross_amount: f64,
    pub gross_profit_amount: f64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyLeaderboardRow {
    pub rank: u32,
    pub agency_id: String,
    pub agency_external_id: String,
    pub agency_name: String,
    pub leads_count: i64,
    pub converted_leads_count: i64,
    pub booked_itineraries_count: i64,
    pub gross_amount: f64,
    pub gross_profit_amount: f64,
    pub active_agents_count: i64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdentity {
    pub agent_id: String,
    pub agent_external_id: String,
    pub agent_name: String,
    pub agent_email: Option<String>,
    pub agency_id: String,
    pub agency_external_id: String,
    pub agency_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyIdentity {
    pub agency_id: String,
    pub agency_external_id: String,
    pub agency_name: String,
    pub iata_code: Option<String>,
    pub host_identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeKpis {
    pub leads_count: i64,
    pub converted_leads_count: i64,
    pub booked_itineraries_count: i64,
    pub gross_amount: f64,
    pub gross_profit_amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_agents_count: Option<i64>,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeYoyPoint {
    pub month: u32,
    pub month_label: String,
    pub current_year_value: f64,
    pub prior_year_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeYoySeries {
    pub metric: String,
    pub current_year: i32,
    pub prior_year: i32,
    pub points: Vec<TradeYoyPoint>,
    pub total_current_year_value: f64,
    pub total_prior_year_value: f64,
    pub yoy_delta_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultantAffinity {
    pub employee_id: String,
    pub employee_external_id: String,
    pub employee_name: String,
    pub converted_leads_count: i64,
    pub closed_won_itineraries_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOperationalItinerary {
    pub itinerary_id: String,
    pub itinerary_number: String,
    pub itinerary_name: Option<String>,
    pub itinerary_status: String,
    pub travel_start_date: Option<NaiveDate>,
    pub travel_end_date: Option<NaiveDate>,
    pub gross_amount: f64,
    pub gross_profit_amount: f64,
}

impl From<TradeItineraryRow> for TradeOperationalItinerary {
    fn from(row: TradeItineraryRow) -> Self {
        Self {
            itinerary_id: row.id,
            itinerary_number: row.itinerary_number,
            itinerary_name: row.itinerary_name.filter(|name| !name.is_empty()),
            itinerary_status: row.itinerary_status,
            travel_start_date: row.travel_start_date,
            travel_end_date: row.travel_end_date,
            gross_amount: row.gross_amount,
            gross_profit_amount: row.gross_profit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfileResponse {
    pub agent: AgentIdentity,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub period_type: PeriodType,
    pub kpis: TradeKpis,
    pub yoy_series: Vec<TradeYoySeries>,
    pub primary_travel_consultants: Vec<ConsultantAffinity>,
    pub current_traveling_files: Vec<TradeOperationalItinerary>,
    pub top_open_itineraries: Vec<TradeOperationalItinerary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyTopAgent {
    pub rank: u32,
    pub agent_id: String,
    pub agent_external_id: String,
    pub agent_name: String,
    pub agent_email: Option<String>,
    pub leads_count: i64,
    pub converted_leads_count: i64,
    pub booked_itineraries_count: i64,
    pub gross_amount: f64,
    pub gross_profit_amount: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyProfileResponse {
    pub agency: AgencyIdentity,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub period_type: PeriodType,
    pub kpis: TradeKpis,
    pub yoy_series: Vec<TradeYoySeries>,
    pub top_agents: Vec<AgencyTopAgent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSearchResponse {
    pub query: String,
    pub entity_type: SearchEntityType,
    pub results: Vec<TradeSearchRow>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_leaderboard_filter_defaults_and_bounds() {
        let filters: TradeLeaderboardFilters = serde_json::from_value(json!({})).expect("parses");
        assert_eq!(filters.period_type, PeriodType::Year);
        assert_eq!(filters.sort_by, TradeSortBy::GrossProfit);
        assert_eq!(filters.sort_order, SortOrder::Desc);
        assert!(filters.validate().is_ok());

        let wide: TradeLeaderboardFilters =
            serde_json::from_value(json!({"top_n": 51})).expect("parses");
        assert!(wide.validate().is_err());
        assert!(serde_json::from_value::<TradeLeaderboardFilters>(json!({"sort_by": "margin"})).is_err());
    }

    #[test]
    fn test_search_filter_bounds() {
        let ok: TradeSearchFilters = serde_json::from_value(json!({"q": "acme"})).expect("parses");
        assert_eq!(ok.entity_type, SearchEntityType::All);
        assert_eq!(ok.limit, 10);
        assert!(ok.validate().is_ok());

        let empty: TradeSearchFilters = serde_json::from_value(json!({"q": ""})).expect("parses");
        assert!(empty.validate().is_err());
        let long: TradeSearchFilters =
            serde_json::from_value(json!({"q": "x".repeat(121)})).expect("parses");
        assert!(long.validate().is_err());
        assert!(serde_json::from_value::<TradeSearchFilters>(json!({})).is_err());
    }

    #[test]
    fn test_rollup_row_decodes_loosely() {
        let row: TradeRollupRow = serde_json::from_value(json!({
            "period_start": "2026-03-01",
            "agent_id": 17,
            "leads_count": "4",
            "gross_amount": null
        }))
        .expect("decodes");
        assert_eq!(row.agent_id, "17");
        assert_eq!(row.leads_count, 4);
        assert_eq!(row.gross_amount, 0.0);
        assert_eq!(row.agency_name, "");
    }
}
