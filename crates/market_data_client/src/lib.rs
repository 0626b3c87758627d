//! Clients for the external market data providers behind the FX desk.
//!
//! - Twelve Data: spot exchange rates and historical time series.
//! - FRED: macro observations for the USD crosses.
//! - Marketaux: currency news.
//!
//! Each provider sits behind a small trait so services can swap in fakes.

pub mod error;
pub mod fred;
pub mod marketaux;
pub mod rate_limit;
pub mod twelve_data;

use async_trait::async_trait;

pub use error::ProviderError;
pub use fred::{FredClient, Observation};
pub use marketaux::{MarketauxClient, NewsArticle};
pub use rate_limit::RateLimiter;
pub use twelve_data::{ExchangeRateQuote, SeriesPoint, TwelveDataClient};

#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn exchange_rate(&self, symbol: &str) -> Result<ExchangeRateQuote, ProviderError>;

    async fn time_series(
        &self,
        symbol: &str,
        interval: &str,
        outputsize: u32,
    ) -> Result<Vec<SeriesPoint>, ProviderError>;
}

#[async_trait]
pub trait MacroProvider: Send + Sync {
    async fn observations(
        &self,
        series_id: &str,
        limit: u32,
    ) -> Result<Vec<Observation>, ProviderError>;
}

#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn news(&self, search: &str, limit: u32) -> Result<Vec<NewsArticle>, ProviderError>;
}

pub(crate) fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

pub(crate) fn format_reqwest_error(err: &reqwest::Error) -> String {
    use std::error::Error as StdError;

    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }
    message
}

/// GET `url` with `params`, failing on non-2xx, and decode the JSON body.
pub(crate) async fn get_json(
    client: &reqwest::Client,
    provider: &'static str,
    url: &str,
    params: &[(&str, String)],
) -> Result<serde_json::Value, ProviderError> {
    let resp = client
        .get(url)
        .query(params)
        .send()
        .await
        .map_err(|e| ProviderError::Http(format_reqwest_error(&e)))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            provider,
            status: status.as_u16(),
            body: body.chars().take(800).collect(),
        });
    }

    resp.json()
        .await
        .map_err(|e| ProviderError::Http(format_reqwest_error(&e)))
}
