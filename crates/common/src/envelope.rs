//! Uniform `{data, pagination, meta}` response envelope.

use chrono::{NaiveDate, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32, total_items: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_items.div_ceil(u64::from(page_size))
        };
        Self {
            page,
            page_size,
            total_items,
            total_pages,
        }
    }
}

/// Provenance block attached to every successful response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub as_of_date: String,
    pub source: String,
    pub time_window: String,
    pub calculation_version: String,
    pub currency: Option<String>,
    pub data_status: Option<String>,
    pub is_stale: Option<bool>,
    pub degraded: Option<bool>,
    pub generated_at: Option<String>,
}

impl Meta {
    /// Meta stamped with today's date.
    pub fn new(source: impl Into<String>, time_window: impl Into<String>, version: &str) -> Self {
        Self::as_of(Utc::now().date_naive(), source, time_window, version)
    }

    pub fn as_of(
        as_of: NaiveDate,
        source: impl Into<String>,
        time_window: impl Into<String>,
        version: &str,
    ) -> Self {
        Self {
            as_of_date: as_of.to_string(),
            source: source.into(),
            time_window: time_window.into(),
            calculation_version: version.to_string(),
            currency: None,
            data_status: None,
            is_stale: None,
            degraded: None,
            generated_at: None,
        }
    }

    pub fn with_currency(mut self, currency: Option<String>) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_status(mut self, data_status: &str, is_stale: bool, degraded: bool) -> Self {
        self.data_status = Some(data_status.to_string());
        self.is_stale = Some(is_stale);
        self.degraded = Some(degraded);
        self
    }

    pub fn with_generated_at(mut self, generated_at: Option<String>) -> Self {
        self.generated_at = generated_at;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub data: T,
    pub pagination: Option<Pagination>,
    pub meta: Meta,
}

impl<T> Envelope<T> {
    pub fn new(data: T, meta: Meta) -> Self {
        Self {
            data,
            pagination: None,
            meta,
        }
    }

    pub fn paged(data: T, pagination: Pagination, meta: Meta) -> Self {
        Self {
            data,
            pagination: Some(pagination),
            meta,
        }
    }
}

/// Slice an in-memory list into the requested page. Page numbers start at 1.
pub fn paginate_list<T: Clone>(items: &[T], page: u32, page_size: u32) -> (Vec<T>, Pagination) {
    let pagination = Pagination::new(page, page_size, items.len() as u64);
    let start = (page.saturating_sub(1) as usize).saturating_mul(page_size as usize);
    let page_items = items
        .iter()
        .skip(start)
        .take(page_size as usize)
        .cloned()
        .collect();
    (page_items, pagination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(Pagination::new(1, 25, 51).total_pages, 3);
        assert_eq!(Pagination::new(1, 25, 50).total_pages, 2);
        assert_eq!(Pagination::new(1, 25, 0).total_pages, 0);
    }

    #[test]
    fn test_paginate_list_second_page() {
        let items: Vec<u32> = (1..=7).collect();
        let (page, pagination) = paginate_list(&items, 2, 3);
        assert_eq!(page, vec![4, 5, 6]);
        assert_eq!(pagination.total_items, 7);
        assert_eq!(pagination.total_pages, 3);

        let (past_end, _) = paginate_list(&items, 5, 3);
        assert!(past_end.is_empty());
    }

    #[test]
    fn test_envelope_serializes_camel_case_with_null_pagination() {
        let meta = Meta::as_of(
            NaiveDate::from_ymd_opt(2026, 2, 18).expect("valid date"),
            "system",
            "now",
            "v1",
        );
        let envelope = Envelope::new(serde_json::json!({"status": "ok"}), meta);
        let value = serde_json::to_value(&envelope).expect("serializes");

        assert!(value["pagination"].is_null());
        assert_eq!(value["meta"]["asOfDate"], "2026-02-18");
        assert_eq!(value["meta"]["calculationVersion"], "v1");
        assert!(value["meta"]["currency"].is_null());
    }
}
