//! Booking, payment and invoice records plus the cash flow and forecast responses.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use common::row::{de_i64, de_opt_date, de_opt_datetime, de_string, decimal, opt_decimal};
use common::Error;

pub const SOURCE_SYSTEM: &str = "salesforce_kaptio";

fn default_page() -> u32 {
    1
}
fn default_page_size() -> u32 {
    50
}
fn default_cash_window() -> String {
    "90d".to_string()
}
fn default_trend_window() -> String {
    "12m".to_string()
}
fn default_lookback() -> u32 {
    12
}
fn default_horizon() -> u32 {
    3
}

fn check_paging(page: u32, page_size: u32) -> Result<(), Error> {
    if page < 1 {
        return Err(Error::validation("page must be at least 1"));
    }
    if !(1..=500).contains(&page_size) {
        return Err(Error::validation("page_size must be between 1 and 500"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingListFilters {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub currency_code: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl BookingListFilters {
    pub fn validate(&self) -> Result<(), Error> {
        check_paging(self.page, self.page_size)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CashFlowFilters {
    #[serde(default = "default_cash_window")]
    pub time_window: String,
    pub currency_code: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl CashFlowFilters {
    pub fn validate(&self) -> Result<(), Error> {
        check_paging(self.page, self.page_size)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingForecastFilters {
    #[serde(default = "default_lookback")]
    pub lookback_months: u32,
    #[serde(default = "default_horizon")]
    pub horizon_months: u32,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl BookingForecastFilters {
    pub fn validate(&self) -> Result<(), Error> {
        if !(3..=36).contains(&self.lookback_months) {
            return Err(Error::validation("lookback_months must be between 3 and 36"));
        }
        if !(1..=12).contains(&self.horizon_months) {
            return Err(Error::validation("horizon_months must be between 1 and 12"));
        }
        check_paging(self.page, self.page_size)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendWindowFilters {
    #[serde(default = "default_trend_window")]
    pub time_window: String,
}

// ── store records ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BookingRecord {
    #[serde(deserialize_with = "de_string")]
    pub id: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub itinerary_id: Option<String>,
    #[serde(default)]
    pub booking_number: Option<String>,
    #[serde(default)]
    pub booking_type: Option<String>,
    #[serde(default)]
    pub supplier_id: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub service_start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub service_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub location_country: Option<String>,
    #[serde(default)]
    pub location_city: Option<String>,
    #[serde(with = "opt_decimal", default)]
    pub gross_amount: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub net_amount: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub commission_amount: Option<Decimal>,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub is_deleted: Option<bool>,
    #[serde(default)]
    pub confirmation_number: Option<String>,
    #[serde(default, deserialize_with = "de_opt_datetime")]
    pub synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CustomerPaymentRecord {
    #[serde(deserialize_with = "de_string")]
    pub id: String,
    #[serde(default)]
    pub itinerary_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub payment_date: Option<NaiveDate>,
    #[serde(with = "opt_decimal", default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SupplierInvoiceRecord {
    #[serde(deserialize_with = "de_string")]
    pub id: String,
    #[serde(default)]
    pub supplier_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub invoice_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub due_date: Option<NaiveDate>,
    #[serde(with = "opt_decimal", default)]
    pub total_amount: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub paid_amount: Option<Decimal>,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub paid_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ItineraryTrendRecord {
    pub period_start: NaiveDate,
    #[serde(default, deserialize_with = "de_i64")]
    pub created_count: i64,
    #[serde(default, deserialize_with = "de_i64")]
    pub closed_count: i64,
    #[serde(default, deserialize_with = "de_i64")]
    pub travel_start_count: i64,
    #[serde(default, deserialize_with = "de_i64")]
    pub travel_end_count: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LeadFlowRecord {
    pub period_start: NaiveDate,
    #[serde(default, deserialize_with = "de_i64")]
    pub created_count: i64,
    #[serde(default, deserialize_with = "de_i64")]
    pub closed_won_count: i64,
    #[serde(default, deserialize_with = "de_i64")]
    pub closed_lost_count: i64,
}

// ── responses ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lineage {
    pub source_system: String,
    pub source_record_id: Option<String>,
    pub ingested_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSummary {
    pub id: String,
    pub booking_number: Option<String>,
    pub service_start_date: Option<NaiveDate>,
    pub service_end_date: Option<NaiveDate>,
    #[serde(with = "opt_decimal")]
    pub gross_amount: Option<Decimal>,
    #[serde(with = "opt_decimal")]
    pub net_amount: Option<Decimal>,
    pub currency_code: Option<String>,
    pub itinerary_id: Option<String>,
    pub lineage: Lineage,
}

impl From<&BookingRecord> for BookingSummary {
    fn from(record: &BookingRecord) -> Self {
        Self {
            id: record.id.clone(),
            booking_number: record.booking_number.clone(),
            service_start_date: record.service_start_date,
            service_end_date: record.service_end_date,
            gross_amount: record.gross_amount,
            net_amount: record.net_amount,
            currency_code: record.currency_code.clone(),
            itinerary_id: record.itinerary_id.clone(),
            lineage: Lineage {
                source_system: SOURCE_SYSTEM.to_string(),
                source_record_id: record.external_id.clone(),
                ingested_at: record.synced_at.map(|at| at.to_rfc3339()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetail {
    #[serde(flatten)]
    pub summary: BookingSummary,
    pub supplier_id: Option<String>,
    pub booking_type: Option<String>,
    pub service_name: Option<String>,
    pub location_country: Option<String>,
    pub location_city: Option<String>,
    pub confirmation_number: Option<String>,
}

impl From<&BookingRecord> for BookingDetail {
    fn from(record: &BookingRecord) -> Self {
        Self {
            summary: BookingSummary::from(record),
            supplier_id: record.supplier_id.clone(),
            booking_type: record.booking_type.clone(),
            service_name: record.service_name.clone(),
            location_country: record.location_country.clone(),
            location_city: record.location_city.clone(),
            confirmation_number: record.confirmation_number.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositSummary {
    pub currency_code: String,
    #[serde(with = "decimal")]
    pub total_deposits: Decimal,
    #[serde(with = "decimal")]
    pub received_deposits: Decimal,
    #[serde(with = "decimal")]
    pub outstanding_deposits: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutSummary {
    pub currency_code: String,
    #[serde(with = "decimal")]
    pub total_invoices: Decimal,
    #[serde(with = "decimal")]
    pub paid_amount: Decimal,
    #[serde(with = "decimal")]
    pub outstanding_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowSummary {
    pub currency_code: String,
    #[serde(with = "decimal")]
    pub cash_in_total: Decimal,
    #[serde(with = "decimal")]
    pub cash_out_total: Decimal,
    #[serde(with = "decimal")]
    pub net_cash_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowTimeseriesPoint {
    pub period_start: NaiveDate,
    #[serde(with = "decimal")]
    pub cash_in: Decimal,
    #[serde(with = "decimal")]
    pub cash_out: Decimal,
    #[serde(with = "decimal")]
    pub net_cash: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingForecastPoint {
    pub period_start: NaiveDate,
    pub projected_bookings: i64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryTrendPoint {
    pub period_start: NaiveDate,
    pub created_count: i64,
    pub closed_count: i64,
    pub travel_start_count: i64,
    pub travel_end_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryTrendsSummary {
    pub created_itineraries: i64,
    pub closed_itineraries: i64,
    pub travel_start_itineraries: i64,
    pub travel_end_itineraries: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItineraryTrendsResponse {
    pub summary: ItineraryTrendsSummary,
    pub timeline: Vec<ItineraryTrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadFlowPoint {
    pub period_start: NaiveDate,
    pub created_count: i64,
    pub closed_won_count: i64,
    pub closed_lost_count: i64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadFlowSummary {
    pub created_itineraries: i64,
    pub closed_won_itineraries: i64,
    pub closed_lost_itineraries: i64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeadFlowResponse {
    pub summary: LeadFlowSummary,
    pub timeline: Vec<LeadFlowPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_booking_detail_flattens_summary_with_lineage() {
        let record: BookingRecord = serde_json::from_value(json!({
            "id": 42,
            "external_id": "a0B1",
            "gross_amount": "1250.50",
            "service_start_date": "2026-05-01",
            "synced_at": "2026-02-01T10:00:00Z",
            "service_name": "Safari lodge"
        }))
        .expect("decodes");
        let encoded = serde_json::to_value(BookingDetail::from(&record)).expect("encodes");
        assert_eq!(encoded["id"], json!("42"));
        assert_eq!(encoded["grossAmount"], json!(1250.5));
        assert_eq!(encoded["netAmount"], json!(null));
        assert_eq!(encoded["serviceName"], json!("Safari lodge"));
        assert_eq!(encoded["lineage"]["sourceSystem"], json!("salesforce_kaptio"));
        assert_eq!(encoded["lineage"]["sourceRecordId"], json!("a0B1"));
        assert_eq!(encoded["lineage"]["ingestedAt"], json!("2026-02-01T10:00:00+00:00"));
    }

    #[test]
    fn test_filter_bounds() {
        let forecast: BookingForecastFilters = serde_json::from_value(json!({})).expect("parses");
        assert_eq!((forecast.lookback_months, forecast.horizon_months), (12, 3));
        assert!(forecast.validate().is_ok());
        let too_far: BookingForecastFilters =
            serde_json::from_value(json!({"horizon_months": 13})).expect("parses");
        assert!(too_far.validate().is_err());

        let cash: CashFlowFilters = serde_json::from_value(json!({"page_size": 0})).expect("parses");
        assert_eq!(cash.time_window, "90d");
        assert!(cash.validate().is_err());
        assert!(serde_json::from_value::<BookingListFilters>(json!({"unknown": 1})).is_err());
    }
}
