//! Twelve Data REST client.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use common::row::value_decimal;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::ProviderError;
use crate::rate_limit::RateLimiter;
use crate::{format_reqwest_error, get_json, normalize_base_url, RateProvider};

const PROVIDER: &str = "twelve_data";
const MAX_OUTPUTSIZE: u32 = 5000;

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRateQuote {
    pub symbol: String,
    pub rate: Decimal,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub close: Decimal,
}

#[derive(Debug, Clone)]
pub struct TwelveDataClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: RateLimiter,
}

impl TwelveDataClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Config(
                "FX_PRIMARY_API_KEY is required for rate pull".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ProviderError::Http(format_reqwest_error(&e)))?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            api_key: api_key.trim().to_string(),
            limiter: RateLimiter::per_minute(8),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RateProvider for TwelveDataClient {
    #[instrument(skip(self))]
    async fn exchange_rate(&self, symbol: &str) -> Result<ExchangeRateQuote, ProviderError> {
        self.limiter.wait().await;
        let params = [("symbol", symbol.to_string()), ("apikey", self.api_key.clone())];
        let payload = get_json(&self.client, PROVIDER, &self.url("/exchange_rate"), &params).await?;
        let quote = parse_exchange_rate(symbol, &payload, Utc::now())?;
        debug!(symbol, rate = %quote.rate, "exchange rate fetched");
        Ok(quote)
    }

    #[instrument(skip(self))]
    async fn time_series(
        &self,
        symbol: &str,
        interval: &str,
        outputsize: u32,
    ) -> Result<Vec<SeriesPoint>, ProviderError> {
        self.limiter.wait().await;
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("outputsize", outputsize.clamp(1, MAX_OUTPUTSIZE).to_string()),
            ("order", "desc".to_string()),
            ("apikey", self.api_key.clone()),
        ];
        let payload = get_json(&self.client, PROVIDER, &self.url("/time_series"), &params).await?;
        parse_time_series(&payload, Utc::now())
    }
}

pub fn parse_exchange_rate(
    symbol: &str,
    payload: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<ExchangeRateQuote, ProviderError> {
    let raw = payload
        .get("rate")
        .filter(|v| !v.is_null())
        .ok_or_else(|| ProviderError::Provider("Missing rate in provider payload".into()))?;
    let rate = value_decimal(raw)
        .filter(|rate| *rate > Decimal::ZERO)
        .ok_or_else(|| ProviderError::Provider("Invalid rate in provider payload".into()))?;
    Ok(ExchangeRateQuote {
        symbol: symbol.to_string(),
        rate,
        fetched_at,
    })
}

/// Values of a `time_series` payload. A `status: "error"` payload is a provider error.
pub fn parse_time_series(
    payload: &Value,
    now: DateTime<Utc>,
) -> Result<Vec<SeriesPoint>, ProviderError> {
    if payload.get("status").and_then(Value::as_str) == Some("error") {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("unknown provider error");
        return Err(ProviderError::Provider(message.to_string()));
    }

    let Some(values) = payload.get("values").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    Ok(values
        .iter()
        .filter_map(|item| {
            let datetime = item.get("datetime").and_then(Value::as_str)?;
            let close = item.get("close").and_then(value_decimal)?;
            Some(SeriesPoint {
                timestamp: parse_series_timestamp(datetime, now),
                close,
            })
        })
        .collect())
}

/// Provider datetimes are either `YYYY-MM-DD HH:MM:SS` or a bare date, in UTC.
pub fn parse_series_timestamp(raw: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let value = raw.trim();
    if let Ok(parsed) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return parsed.and_utc();
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return midnight.and_utc();
        }
    }
    now
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 18, 12, 0, 0).single().expect("valid time")
    }

    #[test]
    fn test_exchange_rate_accepts_string_or_number() {
        let quote = parse_exchange_rate("USD/AUD", &json!({"rate": "1.5321"}), now())
            .expect("parses");
        assert_eq!(quote.rate, Decimal::new(15321, 4));
        let quote = parse_exchange_rate("USD/ZAR", &json!({"rate": 18.2}), now()).expect("parses");
        assert_eq!(quote.symbol, "USD/ZAR");
    }

    #[test]
    fn test_exchange_rate_rejects_missing_or_non_positive() {
        assert!(parse_exchange_rate("USD/AUD", &json!({"status": "ok"}), now()).is_err());
        assert!(parse_exchange_rate("USD/AUD", &json!({"rate": 0}), now()).is_err());
        assert!(parse_exchange_rate("USD/AUD", &json!({"rate": "abc"}), now()).is_err());
    }

    #[test]
    fn test_time_series_skips_unusable_values() {
        let payload = json!({
            "values": [
                {"datetime": "2026-02-17", "close": "1.52"},
                {"datetime": "2026-02-16 00:00:00", "close": "1.51"},
                {"datetime": "2026-02-15", "close": ""},
                {"close": "1.50"}
            ]
        });
        let points = parse_time_series(&payload, now()).expect("parses");
        assert_eq!(points.len(), 2);
        assert_eq!(
            points[0].timestamp,
            Utc.with_ymd_and_hms(2026, 2, 17, 0, 0, 0).single().expect("valid")
        );
    }

    #[test]
    fn test_time_series_error_status() {
        let err = parse_time_series(&json!({"status": "error", "message": "bad symbol"}), now())
            .expect_err("provider error");
        assert_eq!(err.to_string(), "bad symbol");
    }

    #[test]
    fn test_unparseable_timestamp_uses_now() {
        assert_eq!(parse_series_timestamp("yesterday", now()), now());
    }

    #[test]
    fn test_new_requires_api_key() {
        assert!(matches!(
            TwelveDataClient::new("https://api.twelvedata.com", " "),
            Err(ProviderError::Config(_))
        ));
    }
}
