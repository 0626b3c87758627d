//! PostgREST client for the hosted row store.
//!
//! Every call authenticates with the service key as both `apikey` and
//! bearer token. Totals come from the `Content-Range` header when a count
//! mode is requested.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::error::Error as StdError;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::RowStoreError;
use crate::query::{Filter, SelectQuery};
use crate::{Page, Row, RowStore};

const REQUEST_TIMEOUT_SECS: u64 = 30;

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn format_reqwest_error(err: &reqwest::Error) -> String {
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

fn summarize_response_body(raw: &str) -> String {
    const MAX_CHARS: usize = 800;
    let compact = raw.replace(['\n', '\r'], " ");
    if compact.chars().count() > MAX_CHARS {
        let truncated: String = compact.chars().take(MAX_CHARS).collect();
        format!("{truncated}…")
    } else {
        compact
    }
}

/// Total from a `Content-Range` value such as `0-24/311` or `*/0`.
pub fn parse_content_range_total(raw: &str) -> Option<u64> {
    let (_, total) = raw.split_once('/')?;
    total.trim().parse::<u64>().ok()
}

/// Rows from a response body. A lone object is wrapped, an empty body is no rows.
fn rows_from_body(body: &str) -> Result<Vec<Row>, RowStoreError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(body)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect()),
        Value::Object(map) => Ok(vec![map]),
        _ => Ok(Vec::new()),
    }
}

#[derive(Debug, Clone)]
pub struct SupabaseClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(supabase_url: &str, api_key: &str) -> Result<Self, RowStoreError> {
        let base_url = normalize_base_url(supabase_url);
        if base_url.is_empty() {
            return Err(RowStoreError::Config("SUPABASE_URL is empty".into()));
        }
        if api_key.trim().is_empty() {
            return Err(RowStoreError::Config("row store key is empty".into()));
        }

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| RowStoreError::Http(format_reqwest_error(&e)))?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.trim().to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn headers(&self, prefer: &[&str]) -> Result<HeaderMap, RowStoreError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|e| RowStoreError::Config(format!("invalid api key header: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| RowStoreError::Config(format!("invalid api key header: {e}")))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if !prefer.is_empty() {
            let joined = prefer.join(",");
            let value = HeaderValue::from_str(&joined)
                .map_err(|e| RowStoreError::Config(format!("invalid prefer header: {e}")))?;
            headers.insert("Prefer", value);
        }
        Ok(headers)
    }

    /// Send, check status, and hand back headers plus the raw body.
    async fn execute(
        &self,
        table: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<(HeaderMap, String), RowStoreError> {
        let resp = request
            .send()
            .await
            .map_err(|e| RowStoreError::Http(format_reqwest_error(&e)))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.text().await;

        if !status.is_success() {
            warn!(table, status = status.as_u16(), "row store request failed");
            return Err(RowStoreError::Status {
                status: status.as_u16(),
                table: table.to_string(),
                body: summarize_response_body(&body.unwrap_or_default()),
            });
        }
        let body = body.map_err(|e| RowStoreError::Http(format_reqwest_error(&e)))?;
        Ok((headers, body))
    }
}

#[async_trait]
impl RowStore for SupabaseClient {
    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn select(&self, query: SelectQuery) -> Result<Page, RowStoreError> {
        let prefer: Vec<&str> = query.count.prefer_header().into_iter().collect();
        let request = self
            .client
            .get(self.url(&query.table))
            .headers(self.headers(&prefer)?)
            .query(&query.params());

        let (headers, body) = self.execute(&query.table, request).await?;
        let rows = rows_from_body(&body)?;
        let total = headers
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);

        debug!(rows = rows.len(), ?total, "select complete");
        Ok((rows, total))
    }

    #[instrument(skip(self, payload))]
    async fn insert(
        &self,
        table: &str,
        payload: Value,
        upsert: bool,
        on_conflict: Option<&str>,
    ) -> Result<Vec<Row>, RowStoreError> {
        let mut prefer = vec!["return=representation"];
        if upsert {
            prefer.push("resolution=merge-duplicates");
        }
        let mut request = self
            .client
            .post(self.url(table))
            .headers(self.headers(&prefer)?)
            .json(&payload);
        if let Some(columns) = on_conflict {
            request = request.query(&[("on_conflict", columns)]);
        }

        let (_, body) = self.execute(table, request).await?;
        rows_from_body(&body)
    }

    #[instrument(skip(self, payload, filters))]
    async fn update(
        &self,
        table: &str,
        payload: Value,
        filters: &[Filter],
    ) -> Result<Vec<Row>, RowStoreError> {
        let request = self
            .client
            .patch(self.url(table))
            .headers(self.headers(&["return=representation"])?)
            .query(filters)
            .json(&payload);

        let (_, body) = self.execute(table, request).await?;
        rows_from_body(&body)
    }

    #[instrument(skip(self, filters))]
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>, RowStoreError> {
        let request = self
            .client
            .delete(self.url(table))
            .headers(self.headers(&["return=representation"])?)
            .query(filters);

        let (_, body) = self.execute(table, request).await?;
        rows_from_body(&body)
    }

    #[instrument(skip(self, payload))]
    async fn rpc(&self, function: &str, payload: Value) -> Result<Value, RowStoreError> {
        let path = format!("rpc/{function}");
        let request = self
            .client
            .post(self.url(&path))
            .headers(self.headers(&[])?)
            .json(&payload);

        let (_, body) = self.execute(&path, request).await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}
