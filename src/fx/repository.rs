//! Row store access for rates, exposure, signals, the ledger and intelligence.

use chrono::{DateTime, Duration, Utc};
use rowstore_client::{decode_rows, rpc_status_object, CountMode, Filter, RowStore, SelectQuery};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::types::{
    pair_uses_supported_currencies, supported_pairs, FxExposure, FxHolding, FxIntelligenceItem,
    FxInvoicePressure, FxRate, FxSignal, FxTransaction, RunRecord, TARGET_CURRENCIES,
};
use common::{Error, Result};

const RATE_COLUMNS: &str = "id,currency_pair,rate_timestamp,bid_rate,ask_rate,mid_rate,source,created_at";
const SIGNAL_COLUMNS: &str = "id,currency_code,signal_type,signal_strength,current_rate,avg_30d_rate,\
exposure_amount,recommended_amount,reasoning,generated_at,expires_at,was_acted_on,run_id,confidence,\
reason_summary,trend_tags,source_links,exposure_30d_amount,invoice_pressure_30d,invoice_pressure_60d,\
invoice_pressure_90d,metadata,created_at,updated_at";
const TRANSACTION_COLUMNS: &str = "id,currency_code,transaction_type,transaction_date,amount,\
exchange_rate,usd_equivalent,balance_after,supplier_invoice_id,signal_id,reference_number,notes,\
entered_by,created_at,updated_at";
const HOLDING_COLUMNS: &str = "id,currency_code,balance_amount,avg_purchase_rate,total_purchased,\
total_spent,last_transaction_date,last_reconciled_at,notes,created_at,updated_at";
const INTELLIGENCE_COLUMNS: &str = "id,run_id,currency_code,source_type,source_title,source_url,\
source_publisher,source_credibility_score,published_at,risk_direction,confidence,trend_tags,summary,\
raw_payload,created_at";

/// Page request shared by the paginated list calls.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub limit: u64,
    pub offset: u64,
    pub include_totals: bool,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32, include_totals: bool) -> Self {
        Self {
            limit: u64::from(page_size.max(1)),
            offset: u64::from(page.saturating_sub(1)) * u64::from(page_size),
            include_totals,
        }
    }

    fn count_mode(&self) -> CountMode {
        if self.include_totals {
            CountMode::Exact
        } else {
            CountMode::Planned
        }
    }

    /// Store total when reported, else what the page proves exists.
    fn total(&self, reported: Option<u64>, returned: usize) -> u64 {
        reported.unwrap_or(self.offset + returned as u64)
    }
}

fn eq(column: &str, value: &str) -> Filter {
    (column.to_string(), format!("eq.{value}"))
}

fn first_row(rows: Vec<Map<String, Value>>, table: &str) -> Result<Map<String, Value>> {
    rows.into_iter()
        .next()
        .ok_or_else(|| Error::Upstream(format!("{table} insert returned no rows")))
}

#[derive(Clone)]
pub struct FxRepository {
    store: Arc<dyn RowStore>,
}

impl FxRepository {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    pub async fn upsert_rates(&self, rows: Vec<Value>) -> Result<Vec<FxRate>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let inserted = self
            .store
            .insert(
                "fx_rates",
                Value::Array(rows),
                true,
                Some("currency_pair,rate_timestamp,source"),
            )
            .await?;
        Ok(decode_rows(inserted)?)
    }

    pub async fn list_latest_rates(&self, page: PageRequest) -> Result<(Vec<FxRate>, u64)> {
        let pairs = supported_pairs().join(",");
        let query = SelectQuery::new("fx_rates", RATE_COLUMNS)
            .filter("currency_pair", format!("in.({pairs})"))
            .order("rate_timestamp.desc")
            .limit(page.limit)
            .offset(page.offset)
            .count(page.count_mode());
        let (rows, total) = self.store.select(query).await?;
        let records: Vec<FxRate> = decode_rows(rows)?;
        let filtered: Vec<FxRate> = records
            .into_iter()
            .filter(|r| pair_uses_supported_currencies(r.currency_pair.as_deref()))
            .take(page.limit as usize)
            .collect();
        let total = page.total(total, filtered.len());
        Ok((filtered, total))
    }

    pub async fn list_recent_rates_for_pair(
        &self,
        currency_pair: &str,
        days_back: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<FxRate>> {
        let since = now - Duration::days(days_back.max(1));
        let query = SelectQuery::new("fx_rates", RATE_COLUMNS)
            .eq("currency_pair", currency_pair)
            .filter("rate_timestamp", format!("gte.{}", since.to_rfc3339()))
            .order("rate_timestamp.desc")
            .limit(500);
        let (rows, _) = self.store.select(query).await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn list_exposure(&self) -> Result<Vec<FxExposure>> {
        let query = SelectQuery::new(
            "mv_fx_exposure",
            "currency_code,confirmed_30d,confirmed_60d,confirmed_90d,estimated_30d,estimated_60d,\
estimated_90d,current_holdings,net_exposure",
        )
        .filter("currency_code", "in.(ZAR,USD,AUD,NZD)");
        let (rows, _) = self.store.select(query).await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn list_invoice_pressure(&self) -> Result<Vec<FxInvoicePressure>> {
        let query = SelectQuery::new(
            "fx_invoice_pressure_v1",
            "currency_code,due_7d_amount,due_30d_amount,due_60d_amount,due_90d_amount,\
invoices_due_30d_count,next_due_date",
        )
        .order("currency_code.asc")
        .limit(20);
        let (rows, _) = self.store.select(query).await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn create_signal_run(&self, payload: Value) -> Result<RunRecord> {
        self.create_run("fx_signal_runs", payload).await
    }

    pub async fn update_signal_run(&self, run_id: &str, payload: Value) -> Result<()> {
        self.store
            .update("fx_signal_runs", payload, &[eq("id", run_id)])
            .await?;
        Ok(())
    }

    pub async fn insert_signals(&self, rows: Vec<Value>) -> Result<Vec<FxSignal>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let created = self
            .store
            .insert("fx_signals", Value::Array(rows), false, None)
            .await?;
        Ok(decode_rows(created)?)
    }

    /// Signals for the target currencies, or one of them when `currency_code` names it.
    pub async fn list_signals(
        &self,
        page: PageRequest,
        currency_code: Option<&str>,
    ) -> Result<(Vec<FxSignal>, u64)> {
        let mut filter = ("currency_code".to_string(), "in.(AUD,NZD,ZAR)".to_string());
        if let Some(code) = currency_code {
            let normalized = code.trim().to_uppercase();
            if TARGET_CURRENCIES.contains(&normalized.as_str()) {
                filter = eq("currency_code", &normalized);
            }
        }
        let query = SelectQuery::new("fx_signals", SIGNAL_COLUMNS)
            .filters([filter])
            .order("generated_at.desc")
            .limit(page.limit)
            .offset(page.offset)
            .count(page.count_mode());
        let (rows, total) = self.store.select(query).await?;
        let signals: Vec<FxSignal> = decode_rows(rows)?;
        let total = page.total(total, signals.len());
        Ok((signals, total))
    }

    pub async fn create_transaction(&self, payload: Value) -> Result<FxTransaction> {
        let rows = self
            .store
            .insert("fx_transactions", payload, false, None)
            .await?;
        let row = first_row(rows, "fx_transactions")?;
        Ok(serde_json::from_value(Value::Object(row))?)
    }

    pub async fn list_transactions(
        &self,
        page: PageRequest,
        currency_code: Option<&str>,
        transaction_type: Option<&str>,
    ) -> Result<(Vec<FxTransaction>, u64)> {
        let mut query = SelectQuery::new("fx_transactions", TRANSACTION_COLUMNS)
            .order("transaction_date.desc,created_at.desc")
            .limit(page.limit)
            .offset(page.offset)
            .count(page.count_mode());
        if let Some(code) = currency_code {
            query = query.eq("currency_code", code.trim().to_uppercase());
        }
        if let Some(kind) = transaction_type {
            query = query.eq("transaction_type", kind.trim().to_uppercase());
        }
        let (rows, total) = self.store.select(query).await?;
        let transactions: Vec<FxTransaction> = decode_rows(rows)?;
        let total = page.total(total, transactions.len());
        Ok((transactions, total))
    }

    pub async fn list_holdings(&self, currency_code: Option<&str>) -> Result<Vec<FxHolding>> {
        let mut query = SelectQuery::new("fx_holdings", HOLDING_COLUMNS)
            .order("currency_code.asc")
            .limit(20);
        if let Some(code) = currency_code {
            query = query.eq("currency_code", code.trim().to_uppercase());
        }
        let (rows, _) = self.store.select(query).await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn create_intelligence_run(&self, payload: Value) -> Result<RunRecord> {
        self.create_run("fx_intelligence_runs", payload).await
    }

    pub async fn update_intelligence_run(&self, run_id: &str, payload: Value) -> Result<()> {
        self.store
            .update("fx_intelligence_runs", payload, &[eq("id", run_id)])
            .await?;
        Ok(())
    }

    pub async fn insert_intelligence_items(
        &self,
        rows: Vec<Value>,
    ) -> Result<Vec<FxIntelligenceItem>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let inserted = self
            .store
            .insert(
                "fx_intelligence_items",
                Value::Array(rows),
                true,
                Some("run_id,source_url"),
            )
            .await?;
        Ok(decode_rows(inserted)?)
    }

    pub async fn list_intelligence(
        &self,
        page: PageRequest,
        currency_code: Option<&str>,
    ) -> Result<(Vec<FxIntelligenceItem>, u64)> {
        let mut query = SelectQuery::new("fx_intelligence_items", INTELLIGENCE_COLUMNS)
            .order("published_at.desc,created_at.desc")
            .limit(page.limit)
            .offset(page.offset)
            .count(page.count_mode());
        if let Some(code) = currency_code {
            query = query.eq("currency_code", code.trim().to_uppercase());
        }
        let (rows, total) = self.store.select(query).await?;
        let items: Vec<FxIntelligenceItem> = decode_rows(rows)?;
        let total = page.total(total, items.len());
        Ok((items, total))
    }

    pub async fn refresh_fx_exposure(&self) -> Result<Map<String, Value>> {
        let result = self.store.rpc("refresh_fx_exposure_v1", Value::Object(Map::new())).await?;
        Ok(rpc_status_object(result))
    }

    /// Returns the new log id, empty when the store echoed nothing back.
    pub async fn create_sync_log(&self, payload: Value) -> Result<String> {
        let rows = self.store.insert("sync_logs", payload, false, None).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("id"))
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default())
    }

    pub async fn update_sync_log(&self, log_id: &str, payload: Value) -> Result<()> {
        self.store
            .update("sync_logs", payload, &[eq("id", log_id)])
            .await?;
        Ok(())
    }

    async fn create_run(&self, table: &str, payload: Value) -> Result<RunRecord> {
        let rows = self.store.insert(table, payload, false, None).await?;
        let row = first_row(rows, table)?;
        Ok(serde_json::from_value(Value::Object(row))?)
    }
}
