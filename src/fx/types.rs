//! FX desk records, requests and run results.

use chrono::{DateTime, NaiveDate, Utc};
use common::row::{de_opt_date, de_opt_datetime, de_string, de_string_list, decimal, opt_decimal};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every currency the desk tracks, sorted.
pub const SUPPORTED_CURRENCIES: [&str; 4] = ["AUD", "NZD", "USD", "ZAR"];
/// Currencies bought against USD.
pub const TARGET_CURRENCIES: [&str; 3] = ["AUD", "NZD", "ZAR"];

/// All ordered `BASE/QUOTE` pairs of supported currencies.
pub fn supported_pairs() -> Vec<String> {
    let mut pairs = Vec::with_capacity(12);
    for base in SUPPORTED_CURRENCIES {
        for quote in SUPPORTED_CURRENCIES {
            if base != quote {
                pairs.push(format!("{base}/{quote}"));
            }
        }
    }
    pairs
}

pub fn pair_uses_supported_currencies(pair: Option<&str>) -> bool {
    let Some((base, quote)) = pair.and_then(|p| p.split_once('/')) else {
        return false;
    };
    let base = base.trim().to_uppercase();
    let quote = quote.trim().to_uppercase();
    SUPPORTED_CURRENCIES.contains(&base.as_str()) && SUPPORTED_CURRENCIES.contains(&quote.as_str())
}

// ── Records ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct FxRate {
    #[serde(deserialize_with = "de_string", default)]
    pub id: String,
    #[serde(default)]
    pub currency_pair: Option<String>,
    #[serde(deserialize_with = "de_opt_datetime", default)]
    pub rate_timestamp: Option<DateTime<Utc>>,
    #[serde(with = "opt_decimal", default)]
    pub bid_rate: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub ask_rate: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub mid_rate: Option<Decimal>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(deserialize_with = "de_opt_datetime", default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct FxExposure {
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(with = "opt_decimal", default)]
    pub confirmed_30d: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub confirmed_60d: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub confirmed_90d: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub estimated_30d: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub estimated_60d: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub estimated_90d: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub current_holdings: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub net_exposure: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct FxInvoicePressure {
    #[serde(deserialize_with = "de_string", default)]
    pub currency_code: String,
    #[serde(with = "opt_decimal", default)]
    pub due_7d_amount: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub due_30d_amount: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub due_60d_amount: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub due_90d_amount: Option<Decimal>,
    #[serde(default)]
    pub invoices_due_30d_count: Option<i64>,
    #[serde(deserialize_with = "de_opt_date", default)]
    pub next_due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct FxSignal {
    #[serde(deserialize_with = "de_string", default)]
    pub id: String,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub signal_type: Option<String>,
    #[serde(default)]
    pub signal_strength: Option<String>,
    #[serde(with = "opt_decimal", default)]
    pub current_rate: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub avg_30d_rate: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub exposure_amount: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub recommended_amount: Option<Decimal>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(deserialize_with = "de_opt_datetime", default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de_opt_datetime", default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub was_acted_on: Option<bool>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(with = "opt_decimal", default)]
    pub confidence: Option<Decimal>,
    #[serde(default)]
    pub reason_summary: Option<String>,
    #[serde(deserialize_with = "de_string_list", default)]
    pub trend_tags: Vec<String>,
    #[serde(deserialize_with = "de_string_list", default)]
    pub source_links: Vec<String>,
    #[serde(with = "opt_decimal", default)]
    pub exposure_30d_amount: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub invoice_pressure_30d: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub invoice_pressure_60d: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub invoice_pressure_90d: Option<Decimal>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(deserialize_with = "de_opt_datetime", default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de_opt_datetime", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Buy,
    Spend,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Buy => "BUY",
            TransactionType::Spend => "SPEND",
            TransactionType::Adjustment => "ADJUSTMENT",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct FxTransaction {
    #[serde(deserialize_with = "de_string", default)]
    pub id: String,
    #[serde(deserialize_with = "de_string", default)]
    pub currency_code: String,
    pub transaction_type: TransactionType,
    #[serde(deserialize_with = "de_opt_date", default)]
    pub transaction_date: Option<NaiveDate>,
    #[serde(with = "decimal", default)]
    pub amount: Decimal,
    #[serde(with = "opt_decimal", default)]
    pub exchange_rate: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub usd_equivalent: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub balance_after: Option<Decimal>,
    #[serde(default)]
    pub supplier_invoice_id: Option<String>,
    #[serde(default)]
    pub signal_id: Option<String>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub entered_by: Option<String>,
    #[serde(deserialize_with = "de_opt_datetime", default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de_opt_datetime", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct FxHolding {
    #[serde(deserialize_with = "de_string", default)]
    pub id: String,
    #[serde(deserialize_with = "de_string", default)]
    pub currency_code: String,
    #[serde(with = "opt_decimal", default)]
    pub balance_amount: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub avg_purchase_rate: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub total_purchased: Option<Decimal>,
    #[serde(with = "opt_decimal", default)]
    pub total_spent: Option<Decimal>,
    #[serde(deserialize_with = "de_opt_date", default)]
    pub last_transaction_date: Option<NaiveDate>,
    #[serde(deserialize_with = "de_opt_datetime", default)]
    pub last_reconciled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(deserialize_with = "de_opt_datetime", default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de_opt_datetime", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct FxIntelligenceItem {
    #[serde(deserialize_with = "de_string", default)]
    pub id: String,
    #[serde(deserialize_with = "de_string", default)]
    pub run_id: String,
    #[serde(deserialize_with = "de_string", default)]
    pub currency_code: String,
    #[serde(deserialize_with = "de_string", default)]
    pub source_type: String,
    #[serde(deserialize_with = "de_string", default)]
    pub source_title: String,
    #[serde(deserialize_with = "de_string", default)]
    pub source_url: String,
    #[serde(default)]
    pub source_publisher: Option<String>,
    #[serde(with = "opt_decimal", default)]
    pub source_credibility_score: Option<Decimal>,
    #[serde(deserialize_with = "de_opt_datetime", default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default = "default_risk_direction")]
    pub risk_direction: String,
    #[serde(with = "opt_decimal", default)]
    pub confidence: Option<Decimal>,
    #[serde(deserialize_with = "de_string_list", default)]
    pub trend_tags: Vec<String>,
    #[serde(deserialize_with = "de_string", default)]
    pub summary: String,
    #[serde(default)]
    pub raw_payload: Value,
    #[serde(deserialize_with = "de_opt_datetime", default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_risk_direction() -> String {
    "neutral".to_string()
}

/// Row created for a signal, intelligence or sync run; only the id matters downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct RunRecord {
    #[serde(deserialize_with = "de_string", default)]
    pub id: String,
}

// ── Requests ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Scheduled,
    #[default]
    Manual,
    OnDemand,
}

impl RunType {
    pub fn as_str(self) -> &'static str {
        match self {
            RunType::Scheduled => "scheduled",
            RunType::Manual => "manual",
            RunType::OnDemand => "on_demand",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntelligenceRunType {
    Daily,
    #[default]
    OnDemand,
}

impl IntelligenceRunType {
    pub fn as_str(self) -> &'static str {
        match self {
            IntelligenceRunType::Daily => "daily",
            IntelligenceRunType::OnDemand => "on_demand",
        }
    }
}

/// Body of the rate pull and signal run endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FxRunRequest {
    #[serde(default, alias = "run_type")]
    pub run_type: RunType,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FxIntelligenceRunRequest {
    #[serde(default, alias = "run_type")]
    pub run_type: IntelligenceRunType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FxTransactionCreateRequest {
    #[serde(alias = "currency_code")]
    pub currency_code: String,
    #[serde(alias = "transaction_type")]
    pub transaction_type: TransactionType,
    #[serde(alias = "transaction_date")]
    pub transaction_date: NaiveDate,
    pub amount: Decimal,
    #[serde(default, alias = "exchange_rate")]
    pub exchange_rate: Option<Decimal>,
    #[serde(default, alias = "usd_equivalent")]
    pub usd_equivalent: Option<Decimal>,
    #[serde(default, alias = "supplier_invoice_id")]
    pub supplier_invoice_id: Option<String>,
    #[serde(default, alias = "signal_id")]
    pub signal_id: Option<String>,
    #[serde(default, alias = "reference_number")]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, alias = "entered_by")]
    pub entered_by: Option<uuid::Uuid>,
}

impl FxTransactionCreateRequest {
    /// Field-level checks that the JSON shape alone cannot express.
    pub fn validate(&self) -> Result<(), common::Error> {
        if self.currency_code.chars().count() != 3 {
            return Err(common::Error::validation(
                "currencyCode must be exactly 3 characters",
            ));
        }
        if self
            .reference_number
            .as_ref()
            .is_some_and(|r| r.chars().count() > 120)
        {
            return Err(common::Error::validation(
                "referenceNumber must be at most 120 characters",
            ));
        }
        if self.notes.as_ref().is_some_and(|n| n.chars().count() > 2000) {
            return Err(common::Error::validation(
                "notes must be at most 2000 characters",
            ));
        }
        Ok(())
    }
}

// ── Results ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FxManualRunResult {
    pub run_id: String,
    pub status: String,
    pub records_processed: usize,
    pub records_created: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FxBackfillResult {
    pub pairs_requested: Vec<String>,
    pub interval: String,
    pub days_requested: u32,
    pub request_errors: Vec<String>,
    pub rows_prepared: usize,
    pub rows_upserted: usize,
    pub exposure_refresh: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_supported_pairs_are_ordered_crosses() {
        let pairs = supported_pairs();
        assert_eq!(pairs.len(), 12);
        assert_eq!(pairs[0], "AUD/NZD");
        assert!(pairs.contains(&"USD/ZAR".to_string()));
        assert!(!pairs.iter().any(|p| p == "USD/USD"));
    }

    #[test]
    fn test_pair_support_check() {
        assert!(pair_uses_supported_currencies(Some("usd/aud")));
        assert!(!pair_uses_supported_currencies(Some("USD/EUR")));
        assert!(!pair_uses_supported_currencies(Some("USDAUD")));
        assert!(!pair_uses_supported_currencies(None));
    }

    #[test]
    fn test_signal_row_decodes_and_renders_camel_case() {
        let row = json!({
            "id": 7,
            "currency_code": "AUD",
            "confidence": "0.72",
            "trend_tags": "[\"Policy Risk\"]",
            "source_links": null,
            "generated_at": "2026-02-18T10:00:00+00:00"
        });
        let signal: FxSignal = serde_json::from_value(row).expect("decodes");
        assert_eq!(signal.id, "7");
        assert_eq!(signal.trend_tags, vec!["Policy Risk"]);
        assert!(signal.source_links.is_empty());

        let out = serde_json::to_value(&signal).expect("serializes");
        assert_eq!(out["confidence"], json!(0.72));
        assert_eq!(out["trendTags"][0], "Policy Risk");
        assert!(out["currentRate"].is_null());
    }

    #[test]
    fn test_transaction_request_rejects_unknown_fields() {
        let body = json!({
            "currencyCode": "AUD",
            "transactionType": "BUY",
            "transactionDate": "2026-02-18",
            "amount": "1250.50",
            "surprise": true
        });
        assert!(serde_json::from_value::<FxTransactionCreateRequest>(body).is_err());
    }

    #[test]
    fn test_transaction_request_accepts_snake_case_keys() {
        let body = json!({
            "currency_code": "AUD",
            "transaction_type": "BUY",
            "transaction_date": "2026-02-18",
            "amount": "1250.50",
            "exchange_rate": "1.55",
            "reference_number": "INV-9"
        });
        let request: FxTransactionCreateRequest =
            serde_json::from_value(body).expect("snake_case decodes");
        assert_eq!(request.currency_code, "AUD");
        assert_eq!(request.exchange_rate, Some(Decimal::new(155, 2)));
        assert_eq!(request.reference_number.as_deref(), Some("INV-9"));

        let run: FxRunRequest =
            serde_json::from_value(json!({"run_type": "manual"})).expect("run body decodes");
        assert_eq!(run.run_type, RunType::Manual);
    }

    #[test]
    fn test_transaction_request_field_limits() {
        let body = json!({
            "currencyCode": "AUDX",
            "transactionType": "SPEND",
            "transactionDate": "2026-02-18",
            "amount": 10
        });
        let request: FxTransactionCreateRequest =
            serde_json::from_value(body).expect("shape is valid");
        assert_eq!(request.validate().expect_err("too long").status(), 422);
    }

    #[test]
    fn test_run_request_defaults_to_manual() {
        let request: FxRunRequest = serde_json::from_value(json!({})).expect("empty body ok");
        assert_eq!(request.run_type, RunType::Manual);
        let request: FxRunRequest =
            serde_json::from_value(json!({"runType": "on_demand"})).expect("parses");
        assert_eq!(request.run_type.as_str(), "on_demand");
        assert!(serde_json::from_value::<FxRunRequest>(json!({"runType": "weekly"})).is_err());
    }
}
