//! FRED (St. Louis Fed) observations client.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::instrument;

use crate::error::ProviderError;
use crate::rate_limit::RateLimiter;
use crate::{format_reqwest_error, get_json, normalize_base_url, MacroProvider};

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub series_id: String,
    pub date: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct FredClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: RateLimiter,
}

impl FredClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Config("FX_MACRO_API_KEY is not set".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ProviderError::Http(format_reqwest_error(&e)))?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            api_key: api_key.trim().to_string(),
            limiter: RateLimiter::per_second(2),
        })
    }
}

#[async_trait]
impl MacroProvider for FredClient {
    #[instrument(skip(self))]
    async fn observations(
        &self,
        series_id: &str,
        limit: u32,
    ) -> Result<Vec<Observation>, ProviderError> {
        self.limiter.wait().await;
        let params = [
            ("series_id", series_id.to_string()),
            ("api_key", self.api_key.clone()),
            ("file_type", "json".to_string()),
            ("sort_order", "desc".to_string()),
            ("limit", limit.to_string()),
        ];
        let url = format!("{}/series/observations", self.base_url);
        let payload = get_json(&self.client, "fred", &url, &params).await?;
        Ok(parse_observations(series_id, &payload, limit as usize))
    }
}

/// Observations with a date and a reported value. FRED marks gaps with `"."`.
pub fn parse_observations(series_id: &str, payload: &Value, limit: usize) -> Vec<Observation> {
    let Some(items) = payload.get("observations").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .take(limit)
        .filter_map(|obs| {
            let date = obs.get("date").and_then(Value::as_str).filter(|d| !d.is_empty())?;
            let value = match obs.get("value")? {
                Value::String(s) if s != "." && !s.is_empty() => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some(Observation {
                series_id: series_id.to_string(),
                date: date.to_string(),
                value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gaps_and_missing_dates_are_skipped() {
        let payload = json!({
            "observations": [
                {"date": "2026-02-13", "value": "0.6512"},
                {"date": "2026-02-12", "value": "."},
                {"value": "0.64"},
                {"date": "2026-02-10", "value": 0.6433}
            ]
        });
        let observations = parse_observations("DEXUSAL", &payload, 5);
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].value, "0.6512");
        assert_eq!(observations[1].date, "2026-02-10");
    }

    #[test]
    fn test_limit_applies_before_filtering() {
        let payload = json!({
            "observations": [
                {"date": "2026-02-13", "value": "."},
                {"date": "2026-02-12", "value": "1.0"}
            ]
        });
        assert!(parse_observations("DEXUSNZ", &payload, 1).is_empty());
        assert!(parse_observations("DEXUSNZ", &json!({"error": "x"}), 5).is_empty());
    }
}
