//! Client for the hosted REST-over-Postgres row store.
//!
//! Repositories talk to the [`RowStore`] trait; [`SupabaseClient`] speaks the
//! PostgREST dialect over HTTP and [`MemoryStore`] evaluates the same filter
//! subset in memory.

pub mod error;
pub mod memory;
pub mod query;
pub mod rest;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::RowStoreError;
pub use memory::MemoryStore;
pub use query::{ilike_escape, in_filter, CountMode, Filter, SelectQuery};
pub use rest::SupabaseClient;

pub type Row = common::row::Row;

/// Rows plus the optional total reported by the store.
pub type Page = (Vec<Row>, Option<u64>);

#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(&self, query: SelectQuery) -> Result<Page, RowStoreError>;

    /// Insert one object or a list of objects. Upserts merge on `on_conflict`.
    async fn insert(
        &self,
        table: &str,
        payload: Value,
        upsert: bool,
        on_conflict: Option<&str>,
    ) -> Result<Vec<Row>, RowStoreError>;

    async fn update(
        &self,
        table: &str,
        payload: Value,
        filters: &[Filter],
    ) -> Result<Vec<Row>, RowStoreError>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>, RowStoreError>;

    /// Call a stored function. An empty response body yields `Value::Null`.
    async fn rpc(&self, function: &str, payload: Value) -> Result<Value, RowStoreError>;
}

/// Decode raw rows into typed records.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, RowStoreError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)).map_err(RowStoreError::from))
        .collect()
}

/// Wrap a non-object RPC result as `{"status": "ok", "result": ...}`.
pub fn rpc_status_object(result: Value) -> serde_json::Map<String, Value> {
    match result {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("status".into(), Value::String("ok".into()));
            map.insert("result".into(), other);
            map
        }
    }
}
