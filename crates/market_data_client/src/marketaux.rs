//! Marketaux news client.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::instrument;

use crate::error::ProviderError;
use crate::rate_limit::RateLimiter;
use crate::{format_reqwest_error, get_json, normalize_base_url, NewsProvider};

#[derive(Debug, Clone, PartialEq)]
pub struct NewsArticle {
    pub title: String,
    pub url: String,
    pub source: Option<String>,
    pub published_at: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct MarketauxClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    limiter: RateLimiter,
}

impl MarketauxClient {
    pub fn new(base_url: &str, api_token: &str) -> Result<Self, ProviderError> {
        if api_token.trim().is_empty() {
            return Err(ProviderError::Config("FX_NEWS_API_KEY is not set".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ProviderError::Http(format_reqwest_error(&e)))?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            api_token: api_token.trim().to_string(),
            limiter: RateLimiter::per_second(2),
        })
    }
}

#[async_trait]
impl NewsProvider for MarketauxClient {
    #[instrument(skip(self))]
    async fn news(&self, search: &str, limit: u32) -> Result<Vec<NewsArticle>, ProviderError> {
        self.limiter.wait().await;
        let params = [
            ("api_token", self.api_token.clone()),
            ("search", search.to_string()),
            ("language", "en".to_string()),
            ("limit", limit.to_string()),
        ];
        let url = format!("{}/v1/news/all", self.base_url);
        let payload = get_json(&self.client, "marketaux", &url, &params).await?;
        Ok(parse_articles(&payload, limit as usize))
    }
}

pub fn parse_articles(payload: &Value, limit: usize) -> Vec<NewsArticle> {
    let Some(items) = payload.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .take(limit)
        .filter_map(|entry| {
            let url = entry.get("url").and_then(Value::as_str).filter(|s| !s.is_empty())?;
            let title = entry.get("title").and_then(Value::as_str).filter(|s| !s.is_empty())?;
            Some(NewsArticle {
                title: title.to_string(),
                url: url.to_string(),
                source: entry
                    .get("source")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                published_at: entry
                    .get("published_at")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                raw: entry.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_articles_need_url_and_title() {
        let payload = json!({
            "data": [
                {"title": "RBA holds", "url": "https://www.reuters.com/a", "source": "reuters.com", "published_at": "2026-02-17T08:00:00Z"},
                {"title": "", "url": "https://x.test/b"},
                {"title": "No link"},
                "garbage"
            ]
        });
        let articles = parse_articles(&payload, 10);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source.as_deref(), Some("reuters.com"));
        assert_eq!(articles[0].raw["title"], "RBA holds");
    }
}
