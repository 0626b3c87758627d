//! Row store access for AI output tables and the context views feeding generation.

use chrono::NaiveDate;
use common::row::Row;
use common::Result;
use rowstore_client::{CountMode, Filter, RowStore, SelectQuery};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

use super::types::{FeedFilters, HistoryFilters, RecommendationFilters};

pub const MAX_CONTEXT_ROWS: u32 = 500;
const EMPLOYEE_CHUNK_SIZE: usize = 100;

const EVENT_COLUMNS: &str = "id,insight_type,domain,severity,status,entity_type,entity_id,title,\
summary,recommended_action,priority,confidence,evidence,generated_at,model_name,model_tier,\
tokens_used,latency_ms,run_id,created_at,updated_at";
const RECOMMENDATION_COLUMNS: &str = "id,insight_event_id,domain,status,entity_type,entity_id,\
title,summary,recommended_action,priority,confidence,owner_user_id,due_date,resolution_note,\
evidence,generated_at,model_name,model_tier,tokens_used,latency_ms,run_id,completed_at,created_at,\
updated_at";
const BRIEFING_COLUMNS: &str = "id,briefing_date,title,summary,highlights,top_actions,confidence,\
evidence,generated_at,model_name,model_tier,tokens_used,latency_ms,run_id,updated_at";

/// Output tables, children first so foreign keys never block a purge.
pub const AI_OUTPUT_TABLES: [&str; 3] = [
    "ai_recommendation_queue",
    "ai_insight_events",
    "ai_briefings_daily",
];

fn eq(column: &str, value: impl std::fmt::Display) -> Filter {
    (column.to_string(), format!("eq.{value}"))
}

fn count_mode(include_totals: bool) -> CountMode {
    if include_totals {
        CountMode::Exact
    } else {
        CountMode::Planned
    }
}

#[derive(Clone)]
pub struct AiInsightsRepository {
    store: Arc<dyn RowStore>,
}

impl AiInsightsRepository {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    pub async fn list_insight_events(&self, filters: &FeedFilters) -> Result<(Vec<Row>, u64)> {
        let mut query_filters = Vec::new();
        if let Some(domain) = filters.domain {
            query_filters.push(eq("domain", domain.as_str()));
        }
        if let Some(kind) = filters.insight_type {
            query_filters.push(eq("insight_type", kind.as_str()));
        }
        if let Some(severity) = filters.severity {
            query_filters.push(eq("severity", severity.as_str()));
        }
        if let Some(status) = filters.status {
            query_filters.push(eq("status", status.as_str()));
        }
        if let Some(entity_type) = &filters.entity_type {
            query_filters.push(eq("entity_type", entity_type));
        }
        if let Some(entity_id) = &filters.entity_id {
            query_filters.push(eq("entity_id", entity_id));
        }
        let query = SelectQuery::new("ai_insight_events", EVENT_COLUMNS)
            .filters(query_filters)
            .page(filters.page, filters.page_size)
            .order("created_at.desc")
            .count(count_mode(filters.include_totals));
        let (rows, total) = self.store.select(query).await?;
        Ok((rows, total.unwrap_or(0)))
    }

    pub async fn list_insight_history(&self, filters: &HistoryFilters) -> Result<(Vec<Row>, u64)> {
        let mut query_filters = Vec::new();
        if let Some(domain) = filters.domain {
            query_filters.push(eq("domain", domain.as_str()));
        }
        if let Some(kind) = filters.insight_type {
            query_filters.push(eq("insight_type", kind.as_str()));
        }
        if let Some(status) = filters.status {
            query_filters.push(eq("status", status.as_str()));
        }
        if let Some(from) = filters.date_from {
            query_filters.push(("created_at".into(), format!("gte.{from}T00:00:00")));
        }
        if let Some(to) = filters.date_to {
            query_filters.push(("created_at".into(), format!("lte.{to}T23:59:59")));
        }
        let query = SelectQuery::new("ai_insight_events", EVENT_COLUMNS)
            .filters(query_filters)
            .page(filters.page, filters.page_size)
            .order("created_at.desc")
            .count(count_mode(filters.include_totals));
        let (rows, total) = self.store.select(query).await?;
        Ok((rows, total.unwrap_or(0)))
    }

    pub async fn list_recommendations(
        &self,
        filters: &RecommendationFilters,
    ) -> Result<(Vec<Row>, u64)> {
        let mut query_filters = Vec::new();
        if let Some(domain) = filters.domain {
            query_filters.push(eq("domain", domain.as_str()));
        }
        if let Some(status) = filters.status {
            query_filters.push(eq("status", status.as_str()));
        }
        if let Some(owner) = &filters.owner_user_id {
            query_filters.push(eq("owner_user_id", owner));
        }
        if let Some(entity_type) = &filters.entity_type {
            query_filters.push(eq("entity_type", entity_type));
        }
        if let Some(entity_id) = &filters.entity_id {
            query_filters.push(eq("entity_id", entity_id));
        }
        if let Some(min) = filters.priority_min {
            query_filters.push(("priority".into(), format!("gte.{min}")));
        }
        if let Some(max) = filters.priority_max {
            query_filters.push(("priority".into(), format!("lte.{max}")));
        }
        let query = SelectQuery::new("ai_recommendation_queue", RECOMMENDATION_COLUMNS)
            .filters(query_filters)
            .page(filters.page, filters.page_size)
            .order("priority.asc,created_at.desc")
            .count(count_mode(filters.include_totals));
        let (rows, total) = self.store.select(query).await?;
        Ok((rows, total.unwrap_or(0)))
    }

    pub async fn get_latest_briefing(&self, briefing_date: Option<NaiveDate>) -> Result<Option<Row>> {
        let mut query = SelectQuery::new("ai_briefings_daily", BRIEFING_COLUMNS)
            .order("briefing_date.desc")
            .limit(1);
        if let Some(date) = briefing_date {
            query = query.filter("briefing_date", format!("eq.{date}"));
        }
        let (rows, _) = self.store.select(query).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn list_entity_insights(
        &self,
        entity_type: &str,
        entity_id: &str,
        limit: u32,
    ) -> Result<Vec<Row>> {
        let query = SelectQuery::new("ai_insight_events", EVENT_COLUMNS)
            .filter("entity_type", format!("eq.{entity_type}"))
            .filter("entity_id", format!("eq.{entity_id}"))
            .order("created_at.desc")
            .limit(u64::from(limit));
        let (rows, _) = self.store.select(query).await?;
        Ok(rows)
    }

    pub async fn get_recommendation(&self, recommendation_id: &str) -> Result<Option<Row>> {
        let query = SelectQuery::new("ai_recommendation_queue", RECOMMENDATION_COLUMNS)
            .filter("id", format!("eq.{recommendation_id}"))
            .limit(1);
        let (rows, _) = self.store.select(query).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn update_recommendation(
        &self,
        recommendation_id: &str,
        payload: Value,
    ) -> Result<Option<Row>> {
        let rows = self
            .store
            .update(
                "ai_recommendation_queue",
                payload,
                &[eq("id", recommendation_id)],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn insert_insight_events(&self, rows: Vec<Value>) -> Result<Vec<Row>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .insert("ai_insight_events", Value::Array(rows), false, None)
            .await?)
    }

    pub async fn insert_recommendations(&self, rows: Vec<Value>) -> Result<Vec<Row>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .insert("ai_recommendation_queue", Value::Array(rows), false, None)
            .await?)
    }

    pub async fn upsert_daily_briefing(&self, row: Value) -> Result<Option<Row>> {
        let rows = self
            .store
            .insert("ai_briefings_daily", row, true, Some("briefing_date"))
            .await?;
        Ok(rows.into_iter().next())
    }

    // ── Context views ─────────────────────────────────────────────────

    pub async fn list_command_center_context(&self) -> Result<Vec<Row>> {
        let query = SelectQuery::new("ai_context_command_center_v1", "*")
            .order("as_of_date.desc")
            .limit(1);
        Ok(self.store.select(query).await?.0)
    }

    pub async fn list_travel_consultant_context(&self, limit: u32) -> Result<Vec<Row>> {
        let query = SelectQuery::new("ai_context_travel_consultant_v1", "*")
            .order("as_of_period_start.desc")
            .limit(u64::from(limit.min(MAX_CONTEXT_ROWS)));
        Ok(self.store.select(query).await?.0)
    }

    pub async fn list_consultant_benchmarks_context(&self) -> Result<Vec<Row>> {
        let query = SelectQuery::new("ai_context_consultant_benchmarks_v1", "*")
            .order("period_type.asc")
            .limit(50);
        Ok(self.store.select(query).await?.0)
    }

    pub async fn list_company_metrics_context(&self) -> Result<Vec<Row>> {
        let query = SelectQuery::new("ai_context_company_metrics_v1", "*")
            .order("period_type.asc")
            .limit(50);
        Ok(self.store.select(query).await?.0)
    }

    pub async fn list_itinerary_health_context(&self, limit: u32) -> Result<Vec<Row>> {
        let query = SelectQuery::new("ai_context_itinerary_health_v1", "*")
            .order("period_start.desc")
            .limit(u64::from(limit.min(MAX_CONTEXT_ROWS)));
        Ok(self.store.select(query).await?.0)
    }

    /// Subset of `employee_ids` that still exist, checked in chunks of 100.
    pub async fn list_existing_employee_ids(&self, employee_ids: &[String]) -> Result<HashSet<String>> {
        let ids: BTreeSet<&str> = employee_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !id.is_empty())
            .collect();
        let ids: Vec<&str> = ids.into_iter().collect();
        let mut existing = HashSet::new();
        for chunk in ids.chunks(EMPLOYEE_CHUNK_SIZE) {
            let query = SelectQuery::new("employees", "id")
                .filter("id", format!("in.({})", chunk.join(",")))
                .limit(chunk.len() as u64);
            let (rows, _) = self.store.select(query).await?;
            existing.extend(
                rows.iter()
                    .filter_map(|row| row.get("id"))
                    .filter(|id| !id.is_null())
                    .map(|id| match id {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    }),
            );
        }
        debug!(requested = ids.len(), existing = existing.len(), "employee existence check");
        Ok(existing)
    }

    // ── Maintenance ───────────────────────────────────────────────────

    pub async fn count_rows(&self, table: &str) -> Result<u64> {
        let query = SelectQuery::new(table, "id").limit(1).count(CountMode::Exact);
        let (_, total) = self.store.select(query).await?;
        Ok(total.unwrap_or(0))
    }

    /// Delete every row of `table`; the filter exists because bulk deletes need one.
    pub async fn purge_table(&self, table: &str) -> Result<usize> {
        let removed = self
            .store
            .delete(table, &[("id".to_string(), "not.is.null".to_string())])
            .await?;
        Ok(removed.len())
    }

    /// Refresh the consultant, itinerary and AI context materialized views.
    pub async fn refresh_rollups(&self) -> Result<Map<String, Value>> {
        let result = self
            .store
            .rpc("refresh_consultant_ai_rollups_v1", Value::Object(Map::new()))
            .await?;
        Ok(rowstore_client::rpc_status_object(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowstore_client::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_existing_employee_ids_chunks_requests() {
        let store = Arc::new(MemoryStore::new());
        store.seed("employees", (0..150).map(|i| json!({"id": format!("emp-{i:03}")})));
        let repo = AiInsightsRepository::new(store.clone());

        let mut requested: Vec<String> = (0..140).map(|i| format!("emp-{i:03}")).collect();
        requested.push("ghost".into());
        requested.push(String::new());
        let existing = repo
            .list_existing_employee_ids(&requested)
            .await
            .expect("lookup");

        assert_eq!(existing.len(), 140);
        assert!(!existing.contains("ghost"));
        assert_eq!(
            store.selects().iter().filter(|q| q.table == "employees").count(),
            2
        );
    }

    #[tokio::test]
    async fn test_recommendation_filters_map_to_query() {
        let store = Arc::new(MemoryStore::new().with_rows(
            "ai_recommendation_queue",
            [
                json!({"id": "a", "priority": 1, "status": "new", "created_at": "2026-02-01T00:00:00+00:00"}),
                json!({"id": "b", "priority": 4, "status": "new", "created_at": "2026-02-02T00:00:00+00:00"}),
                json!({"id": "c", "priority": 2, "status": "resolved", "created_at": "2026-02-03T00:00:00+00:00"}),
            ],
        ));
        let repo = AiInsightsRepository::new(store);
        let filters: RecommendationFilters =
            serde_json::from_value(json!({"status": "new", "priority_max": 3})).expect("filters");

        let (rows, total) = repo.list_recommendations(&filters).await.expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "a");
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_purge_and_count() {
        let store = Arc::new(
            MemoryStore::new().with_rows("ai_insight_events", [json!({"id": "1"}), json!({"id": "2"})]),
        );
        let repo = AiInsightsRepository::new(store);
        assert_eq!(repo.count_rows("ai_insight_events").await.expect("count"), 2);
        assert_eq!(repo.purge_table("ai_insight_events").await.expect("purge"), 2);
        assert_eq!(repo.count_rows("ai_insight_events").await.expect("count"), 0);
    }
}
