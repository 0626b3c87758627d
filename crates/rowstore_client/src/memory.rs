//! In-memory row store.
//!
//! Evaluates the PostgREST filter subset the repositories use (`eq`, `neq`,
//! `gt`, `gte`, `lt`, `lte`, `in`, `is`, `like`, `ilike`, `wfts`, with an
//! optional `not.` prefix) plus ordering, paging and counts. Every write and
//! RPC call is recorded so callers can assert on side effects.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::RowStoreError;
use crate::query::{CountMode, Filter, SelectQuery};
use crate::{Page, Row, RowStore};

#[derive(Debug, Clone, PartialEq)]
pub enum WriteKind {
    Insert { upsert: bool },
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub table: String,
    pub kind: WriteKind,
    pub payload: Value,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, Vec<Row>>,
    rpc_responses: HashMap<String, Value>,
    failing: HashSet<String>,
    writes: Vec<WriteRecord>,
    rpc_calls: Vec<(String, Value)>,
    selects: Vec<SelectQuery>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means a test panicked mid-call; the data is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append rows to a table. Non-object values are ignored.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let mut inner = self.lock();
        let target = inner.tables.entry(table.to_string()).or_default();
        target.extend(rows.into_iter().filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        }));
    }

    pub fn with_rows(self, table: &str, rows: impl IntoIterator<Item = Value>) -> Self {
        self.seed(table, rows);
        self
    }

    pub fn set_rpc_response(&self, function: &str, response: Value) {
        self.lock()
            .rpc_responses
            .insert(function.to_string(), response);
    }

    /// Make every call touching `table` (or RPC `function`) fail with a 500.
    pub fn fail_table(&self, table: &str) {
        self.lock().failing.insert(table.to_string());
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn writes_to(&self, table: &str) -> Vec<WriteRecord> {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.table == table)
            .cloned()
            .collect()
    }

    pub fn rpc_calls(&self) -> Vec<(String, Value)> {
        self.lock().rpc_calls.clone()
    }

    pub fn selects(&self) -> Vec<SelectQuery> {
        self.lock().selects.clone()
    }

    fn check_failure(inner: &Inner, table: &str) -> Result<(), RowStoreError> {
        if inner.failing.contains(table) {
            return Err(RowStoreError::Status {
                status: 500,
                table: table.to_string(),
                body: "injected failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn select(&self, query: SelectQuery) -> Result<Page, RowStoreError> {
        let mut inner = self.lock();
        inner.selects.push(query.clone());
        Self::check_failure(&inner, &query.table)?;

        let mut rows: Vec<Row> = inner
            .tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            sort_rows(&mut rows, order);
        }

        let total = rows.len() as u64;
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let page: Vec<Row> = rows.into_iter().skip(offset).take(limit).collect();
        let page = page.into_iter().map(|row| project(row, &query.select)).collect();

        let count = match query.count {
            CountMode::None => None,
            CountMode::Exact | CountMode::Planned => Some(total),
        };
        Ok((page, count))
    }

    async fn insert(
        &self,
        table: &str,
        payload: Value,
        upsert: bool,
        on_conflict: Option<&str>,
    ) -> Result<Vec<Row>, RowStoreError> {
        let mut inner = self.lock();
        inner.writes.push(WriteRecord {
            table: table.to_string(),
            kind: WriteKind::Insert { upsert },
            payload: payload.clone(),
            filters: Vec::new(),
        });
        Self::check_failure(&inner, table)?;

        let items: Vec<Row> = match payload {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            Value::Object(map) => vec![map],
            _ => Vec::new(),
        };

        let conflict_columns: Vec<String> = on_conflict
            .map(|raw| {
                raw.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["id".to_string()]);

        let target = inner.tables.entry(table.to_string()).or_default();
        let mut returned = Vec::with_capacity(items.len());
        for mut item in items {
            if upsert {
                let existing = target.iter_mut().find(|row| {
                    conflict_columns.iter().all(|column| {
                        matches!(
                            (row.get(column), item.get(column)),
                            (Some(a), Some(b)) if !a.is_null() && a == b
                        )
                    })
                });
                if let Some(row) = existing {
                    for (key, value) in item {
                        row.insert(key, value);
                    }
                    returned.push(row.clone());
                    continue;
                }
            }
            if item.get("id").map_or(true, Value::is_null) {
                item.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
            }
            target.push(item.clone());
            returned.push(item);
        }
        Ok(returned)
    }

    async fn update(
        &self,
        table: &str,
        payload: Value,
        filters: &[Filter],
    ) -> Result<Vec<Row>, RowStoreError> {
        let mut inner = self.lock();
        inner.writes.push(WriteRecord {
            table: table.to_string(),
            kind: WriteKind::Update,
            payload: payload.clone(),
            filters: filters.to_vec(),
        });
        Self::check_failure(&inner, table)?;

        let patch: Map<String, Value> = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut returned = Vec::new();
        if let Some(rows) = inner.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| matches_all(row, filters)) {
                for (key, value) in &patch {
                    row.insert(key.clone(), value.clone());
                }
                returned.push(row.clone());
            }
        }
        Ok(returned)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>, RowStoreError> {
        let mut inner = self.lock();
        inner.writes.push(WriteRecord {
            table: table.to_string(),
            kind: WriteKind::Delete,
            payload: Value::Null,
            filters: filters.to_vec(),
        });
        Self::check_failure(&inner, table)?;

        let mut removed = Vec::new();
        if let Some(rows) = inner.tables.get_mut(table) {
            let (gone, kept): (Vec<Row>, Vec<Row>) =
                rows.drain(..).partition(|row| matches_all(row, filters));
            *rows = kept;
            removed = gone;
        }
        Ok(removed)
    }

    async fn rpc(&self, function: &str, payload: Value) -> Result<Value, RowStoreError> {
        let mut inner = self.lock();
        inner.rpc_calls.push((function.to_string(), payload));
        Self::check_failure(&inner, function)?;
        Ok(inner
            .rpc_responses
            .get(function)
            .cloned()
            .unwrap_or(Value::Null))
    }
}

// ── Filter evaluation ─────────────────────────────────────────────────

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters
        .iter()
        .all(|(column, expr)| matches_filter(row.get(column), expr))
}

fn matches_filter(value: Option<&Value>, expr: &str) -> bool {
    if let Some(rest) = expr.strip_prefix("not.") {
        return !matches_filter(value, rest);
    }
    let Some((op, operand)) = expr.split_once('.') else {
        return false;
    };
    let value = value.unwrap_or(&Value::Null);

    match op {
        "is" => match operand {
            "null" => value.is_null(),
            "true" => value.as_bool() == Some(true),
            "false" => value.as_bool() == Some(false),
            _ => false,
        },
        "eq" => as_text(value).is_some_and(|text| text == operand),
        "neq" => as_text(value).is_some_and(|text| text != operand),
        "gt" => compare(value, operand) == Some(Ordering::Greater),
        "gte" => matches!(
            compare(value, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        "lt" => compare(value, operand) == Some(Ordering::Less),
        "lte" => matches!(
            compare(value, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        "in" => as_text(value).is_some_and(|text| parse_in_list(operand).contains(&text)),
        "like" => as_text(value).is_some_and(|text| glob_match(&text, operand, false)),
        "ilike" => as_text(value).is_some_and(|text| glob_match(&text, operand, true)),
        "wfts" | "fts" | "plfts" => as_text(value).is_some_and(|text| {
            let haystack = text.to_lowercase();
            operand
                .split_whitespace()
                .all(|word| haystack.contains(&word.to_lowercase()))
        }),
        _ => false,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn compare(value: &Value, operand: &str) -> Option<Ordering> {
    let text = as_text(value)?;
    match (text.parse::<f64>(), operand.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b),
        _ => Some(text.as_str().cmp(operand)),
    }
}

/// Split `(a,"b,c",d)` honouring double quotes and backslash escapes.
fn parse_in_list(raw: &str) -> Vec<String> {
    let inner = raw
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')');
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if quoted => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '"' => quoted = !quoted,
            ',' if !quoted => items.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    items.push(current);
    items.into_iter().map(|s| s.trim().to_string()).collect()
}

#[derive(Debug, PartialEq)]
enum Token {
    Literal(char),
    AnyOne,
    AnyMany,
}

fn tokenize_pattern(pattern: &str, case_insensitive: bool) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        let token = match ch {
            '\\' => match chars.next() {
                Some(next) => Token::Literal(next),
                None => Token::Literal('\\'),
            },
            '*' | '%' => Token::AnyMany,
            '_' => Token::AnyOne,
            other => Token::Literal(other),
        };
        tokens.push(match token {
            Token::Literal(c) if case_insensitive => {
                Token::Literal(c.to_lowercase().next().unwrap_or(c))
            }
            t => t,
        });
    }
    tokens
}

fn glob_match(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    let tokens = tokenize_pattern(pattern, case_insensitive);
    let chars: Vec<char> = if case_insensitive {
        text.to_lowercase().chars().collect()
    } else {
        text.chars().collect()
    };

    // dp[j] = tokens[..i] matches chars[..j]
    let mut dp = vec![false; chars.len() + 1];
    dp[0] = true;
    for token in &tokens {
        let mut next = vec![false; chars.len() + 1];
        match token {
            Token::AnyMany => {
                let mut seen = false;
                for j in 0..=chars.len() {
                    seen |= dp[j];
                    next[j] = seen;
                }
            }
            Token::AnyOne => {
                for j in 1..=chars.len() {
                    next[j] = dp[j - 1];
                }
            }
            Token::Literal(c) => {
                for j in 1..=chars.len() {
                    next[j] = dp[j - 1] && chars[j - 1] == *c;
                }
            }
        }
        dp = next;
    }
    dp[chars.len()]
}

// ── Ordering and projection ───────────────────────────────────────────

fn sort_rows(rows: &mut [Row], order: &str) {
    let keys: Vec<(String, bool, bool)> = order
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.trim().split('.');
            let column = pieces.next()?.to_string();
            let mut descending = false;
            let mut nulls_first = None;
            for modifier in pieces {
                match modifier {
                    "desc" => descending = true,
                    "asc" => descending = false,
                    "nullsfirst" => nulls_first = Some(true),
                    "nullslast" => nulls_first = Some(false),
                    _ => {}
                }
            }
            Some((column, descending, nulls_first.unwrap_or(descending)))
        })
        .collect();

    rows.sort_by(|a, b| {
        for (column, descending, nulls_first) in &keys {
            let left = a.get(column).filter(|v| !v.is_null());
            let right = b.get(column).filter(|v| !v.is_null());
            let ordering = match (left, right) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => {
                    if *nulls_first {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    }
                }
                (Some(_), None) => {
                    if *nulls_first {
                        Ordering::Greater
                    } else {
                        Ordering::Less
                    }
                }
                (Some(l), Some(r)) => {
                    let natural = compare_values(l, r);
                    if *descending {
                        natural.reverse()
                    } else {
                        natural
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn compare_values(left: &Value, right: &Value) -> Ordering {
    let l = as_text(left).unwrap_or_default();
    let r = as_text(right).unwrap_or_default();
    match (l.parse::<f64>(), r.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => l.cmp(&r),
    }
}

/// Keep only the selected columns. `*` and embedded selects keep the row.
fn project(row: Row, select: &str) -> Row {
    let columns: Vec<&str> = select.split(',').map(str::trim).collect();
    if columns.iter().any(|c| *c == "*" || c.contains('(')) {
        return row;
    }
    row.into_iter()
        .filter(|(key, _)| columns.contains(&key.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new().with_rows(
            "bookings",
            vec![
                json!({"id": "b1", "currency": "AUD", "amount": 120.0, "service_start_date": "2026-01-10", "is_deleted": false, "name": "Safari_Kenya"}),
                json!({"id": "b2", "currency": "USD", "amount": 80, "service_start_date": "2026-02-01", "is_deleted": false, "name": "Cape Town"}),
                json!({"id": "b3", "currency": "AUD", "amount": null, "service_start_date": "2026-03-05", "is_deleted": true, "name": "Safari Botswana"}),
            ],
        )
    }

    #[tokio::test]
    async fn test_select_filters_orders_and_counts() {
        let store = store();
        let query = SelectQuery::new("bookings", "id,amount")
            .eq("is_deleted", false)
            .filter("service_start_date", "gte.2026-01-01")
            .order("service_start_date.desc")
            .count(CountMode::Exact)
            .limit(1);
        let (rows, total) = store.select(query).await.expect("select works");
        assert_eq!(total, Some(2));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "b2");
        assert!(rows[0].get("currency").is_none());
    }

    #[tokio::test]
    async fn test_in_not_and_ilike_filters() {
        let store = store();
        let (rows, _) = store
            .select(SelectQuery::new("bookings", "*").filter("id", "in.(\"b1\",\"b3\")"))
            .await
            .expect("select works");
        assert_eq!(rows.len(), 2);

        let (rows, _) = store
            .select(SelectQuery::new("bookings", "*").filter("amount", "not.is.null"))
            .await
            .expect("select works");
        assert_eq!(rows.len(), 2);

        let (rows, _) = store
            .select(SelectQuery::new("bookings", "*").filter("name", "ilike.*safari\\_*"))
            .await
            .expect("select works");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "b1");
    }

    #[tokio::test]
    async fn test_nulls_last_ordering() {
        let store = store();
        let (rows, _) = store
            .select(SelectQuery::new("bookings", "id").order("amount.desc.nullslast"))
            .await
            .expect("select works");
        let ids: Vec<&str> = rows.iter().filter_map(|r| r["id"].as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2", "b3"]);
    }

    #[tokio::test]
    async fn test_upsert_merges_on_conflict_columns() {
        let store = MemoryStore::new();
        store
            .insert(
                "fx_rates",
                json!([{"currency_pair": "USD/AUD", "rate_timestamp": "t1", "mid_rate": 1.5}]),
                true,
                Some("currency_pair,rate_timestamp"),
            )
            .await
            .expect("insert works");
        store
            .insert(
                "fx_rates",
                json!({"currency_pair": "USD/AUD", "rate_timestamp": "t1", "mid_rate": 1.6}),
                true,
                Some("currency_pair,rate_timestamp"),
            )
            .await
            .expect("upsert works");

        let rows = store.rows("fx_rates");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["mid_rate"], 1.6);
        assert!(rows[0]["id"].is_string());
        assert_eq!(store.writes_to("fx_rates").len(), 2);
    }

    #[tokio::test]
    async fn test_update_delete_and_rpc() {
        let store = store();
        let updated = store
            .update(
                "bookings",
                json!({"currency": "ZAR"}),
                &[("id".to_string(), "eq.b2".to_string())],
            )
            .await
            .expect("update works");
        assert_eq!(updated[0]["currency"], "ZAR");

        let removed = store
            .delete("bookings", &[("id".to_string(), "not.is.null".to_string())])
            .await
            .expect("delete works");
        assert_eq!(removed.len(), 3);
        assert!(store.rows("bookings").is_empty());

        store.set_rpc_response("refresh", json!({"status": "ok"}));
        let result = store.rpc("refresh", json!({})).await.expect("rpc works");
        assert_eq!(result["status"], "ok");
        assert_eq!(store.rpc_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = store();
        store.fail_table("bookings");
        let err = store
            .select(SelectQuery::new("bookings", "*"))
            .await
            .expect_err("should fail");
        assert!(matches!(err, RowStoreError::Status { status: 500, .. }));
    }
}
