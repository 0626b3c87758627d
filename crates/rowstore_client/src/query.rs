//! Query description shared by every row store implementation.

/// `(column, "op.value")`, e.g. `("currency_code", "eq.AUD")`.
pub type Filter = (String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountMode {
    #[default]
    None,
    Exact,
    Planned,
}

impl CountMode {
    pub fn prefer_header(self) -> Option<&'static str> {
        match self {
            CountMode::None => None,
            CountMode::Exact => Some("count=exact"),
            CountMode::Planned => Some("count=planned"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub table: String,
    pub select: String,
    pub filters: Vec<Filter>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order: Option<String>,
    pub count: CountMode,
}

impl SelectQuery {
    pub fn new(table: &str, select: &str) -> Self {
        Self {
            table: table.to_string(),
            select: select.to_string(),
            filters: Vec::new(),
            limit: None,
            offset: None,
            order: None,
            count: CountMode::None,
        }
    }

    pub fn filter(mut self, column: &str, expr: impl Into<String>) -> Self {
        self.filters.push((column.to_string(), expr.into()));
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn eq(self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filter(column, format!("eq.{value}"))
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn order(mut self, order: &str) -> Self {
        self.order = Some(order.to_string());
        self
    }

    pub fn count(mut self, count: CountMode) -> Self {
        self.count = count;
        self
    }

    /// Page-based limit/offset with 1-based pages.
    pub fn page(self, page: u32, page_size: u32) -> Self {
        let offset = u64::from(page.saturating_sub(1)) * u64::from(page_size);
        self.limit(u64::from(page_size)).offset(offset)
    }

    /// Query string pairs in PostgREST order: select, filters, limit, offset, order.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.select.clone())];
        params.extend(self.filters.iter().cloned());
        if let Some(limit) = self.limit {
            params.push(("limit".into(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".into(), offset.to_string()));
        }
        if let Some(order) = &self.order {
            params.push(("order".into(), order.clone()));
        }
        params
    }
}

/// `in.(...)` filter with every value double-quoted. `None` when no usable value remains.
pub fn in_filter<I, S>(values: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let quoted: Vec<String> = values
        .into_iter()
        .map(|v| v.as_ref().trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    if quoted.is_empty() {
        None
    } else {
        Some(format!("in.({})", quoted.join(",")))
    }
}

/// Escape `ilike` wildcards so user input matches literally.
pub fn ilike_escape(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_follow_builder_order() {
        let query = SelectQuery::new("fx_rates", "*")
            .eq("currency_pair", "USD/AUD")
            .page(3, 25)
            .order("rate_timestamp.desc");
        assert_eq!(
            query.params(),
            vec![
                ("select".to_string(), "*".to_string()),
                ("currency_pair".to_string(), "eq.USD/AUD".to_string()),
                ("limit".to_string(), "25".to_string()),
                ("offset".to_string(), "50".to_string()),
                ("order".to_string(), "rate_timestamp.desc".to_string()),
            ]
        );
    }

    #[test]
    fn test_in_filter_quotes_and_skips_blanks() {
        assert_eq!(
            in_filter(["a", " ", "b\"c"]),
            Some("in.(\"a\",\"b\\\"c\")".to_string())
        );
        assert_eq!(in_filter(Vec::<String>::new()), None);
    }

    #[test]
    fn test_ilike_escape() {
        assert_eq!(ilike_escape("50%_off"), "50\\%\\_off");
    }
}
