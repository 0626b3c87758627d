//! Lenient accessors for rows returned by the row store.
//!
//! Numeric columns may arrive as JSON numbers or strings depending on the
//! column type, so every accessor accepts both.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::str::FromStr;

pub type Row = Map<String, Value>;

pub fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

pub fn value_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                Decimal::from_str(&n.to_string())
                    .ok()
                    .or_else(|| n.as_f64().and_then(Decimal::from_f64))
            }
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

pub fn value_date(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?.trim();
    if raw.len() >= 10 {
        if let Ok(date) = NaiveDate::parse_from_str(&raw[..10], "%Y-%m-%d") {
            return Some(date);
        }
    }
    None
}

pub fn value_datetime(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    value_date(value).and_then(|d| d.and_hms_opt(0, 0, 0)).map(|n| n.and_utc())
}

/// Accessors over a single row object.
pub trait RowExt {
    fn field(&self, key: &str) -> Option<&Value>;

    fn f64_or_zero(&self, key: &str) -> f64 {
        self.opt_f64(key).unwrap_or(0.0)
    }

    fn opt_f64(&self, key: &str) -> Option<f64> {
        self.field(key).and_then(value_f64)
    }

    fn i64_or_zero(&self, key: &str) -> i64 {
        self.opt_f64(key).map(|v| v as i64).unwrap_or(0)
    }

    fn opt_decimal(&self, key: &str) -> Option<Decimal> {
        self.field(key).and_then(value_decimal)
    }

    fn text(&self, key: &str) -> String {
        self.opt_text(key).unwrap_or_default()
    }

    fn opt_text(&self, key: &str) -> Option<String> {
        match self.field(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }

    fn opt_date(&self, key: &str) -> Option<NaiveDate> {
        self.field(key).and_then(value_date)
    }

    fn opt_datetime(&self, key: &str) -> Option<DateTime<Utc>> {
        self.field(key).and_then(value_datetime)
    }
}

impl RowExt for Row {
    fn field(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}

impl RowExt for Value {
    fn field(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

// ── serde helpers for typed records ───────────────────────────────────

pub fn de_opt_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_decimal))
}

pub fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_f64))
}

pub fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_opt_f64(deserializer)?.unwrap_or(0.0))
}

pub fn de_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_opt_f64(deserializer)?.map(|v| v as i64).unwrap_or(0))
}

pub fn de_opt_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_date))
}

pub fn de_opt_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_datetime))
}

/// Stringifies ids that may come back as numbers or UUID strings.
pub fn de_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// Accepts a JSON list, a JSON-encoded list string, or a comma separated string.
pub fn de_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(|v| string_list(&v)).unwrap_or_default())
}

pub fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.starts_with('[') {
                if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
                    return string_list(&parsed);
                }
            }
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Lenient decimal column, rendered as a JSON number.
pub mod decimal {
    use super::*;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        rust_decimal::serde::float::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        Ok(de_opt_decimal(deserializer)?.unwrap_or_default())
    }
}

/// Lenient optional decimal column, rendered as a JSON number or null.
pub mod opt_decimal {
    use super::*;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(
        value: &Option<Decimal>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        rust_decimal::serde::float_option::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Decimal>, D::Error> {
        de_opt_decimal(deserializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_columns_accept_strings() {
        let row = json!({"amount": "125.50", "count": 3, "flag": null});
        assert_eq!(row.f64_or_zero("amount"), 125.5);
        assert_eq!(row.i64_or_zero("count"), 3);
        assert_eq!(row.opt_f64("flag"), None);
        assert_eq!(row.opt_decimal("amount"), Some(Decimal::new(12550, 2)));
    }

    #[test]
    fn test_dates_and_timestamps() {
        let row = json!({
            "period_start": "2026-01-01",
            "created_at": "2026-02-18T10:15:00+00:00",
            "naive": "2026-02-18T10:15:00"
        });
        assert_eq!(
            row.opt_date("period_start"),
            NaiveDate::from_ymd_opt(2026, 1, 1)
        );
        assert!(row.opt_datetime("created_at").is_some());
        assert!(row.opt_datetime("naive").is_some());
        assert_eq!(
            row.opt_date("created_at"),
            NaiveDate::from_ymd_opt(2026, 2, 18)
        );
    }

    #[test]
    fn test_string_list_variants() {
        assert_eq!(string_list(&json!(["a", " b ", ""])), vec!["a", "b"]);
        assert_eq!(string_list(&json!("[\"x\",\"y\"]")), vec!["x", "y"]);
        assert_eq!(string_list(&json!("x, y")), vec!["x", "y"]);
        assert!(string_list(&json!(null)).is_empty());
    }

    #[test]
    fn test_decimal_modules_read_strings_and_write_numbers() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Amounts {
            #[serde(with = "decimal", default)]
            total: Decimal,
            #[serde(with = "opt_decimal", default)]
            rate: Option<Decimal>,
        }

        let parsed: Amounts =
            serde_json::from_value(json!({"total": "10.25", "rate": null})).expect("parses");
        assert_eq!(parsed.total, Decimal::new(1025, 2));
        assert_eq!(parsed.rate, None);

        let out = serde_json::to_value(&parsed).expect("serializes");
        assert_eq!(out["total"], json!(10.25));
        assert!(out["rate"].is_null());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(1234.567, 2), 1234.57);
    }
}
