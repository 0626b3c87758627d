use chrono::NaiveDate;
use common::row::{Row, RowExt};
use common::Result;
use rowstore_client::{decode_rows, ilike_escape, in_filter, RowStore, SelectQuery};
use std::collections::HashSet;
use std::sync::Arc;

use super::types::{
    AffinityRow, SearchEntityType, TradeItineraryRow, TradeRollupRow, TradeSearchRow,
};

const MAX_QUERY_ROWS: u64 = 5000;

const AGENT_ROLLUP_COLUMNS: &str = "period_start,period_end,agent_id,agent_external_id,agent_name,\
agent_email,agency_id,agency_external_id,agency_name,leads_count,converted_leads_count,\
traveled_itineraries_count,gross_amount,gross_profit_amount";
const AGENCY_ROLLUP_COLUMNS: &str = "period_start,period_end,agency_id,agency_external_id,\
agency_name,leads_count,converted_leads_count,traveled_itineraries_count,gross_amount,\
gross_profit_amount,active_agents_count";
const AFFINITY_COLUMNS: &str = "period_start,agent_id,employee_id,employee_external_id,\
employee_first_name,employee_last_name,converted_leads_count,closed_won_itineraries_count";
const ITINERARY_COLUMNS: &str = "id,itinerary_number,itinerary_name,itinerary_status,\
travel_start_date,travel_end_date,gross_amount,gross_profit";
const SEARCH_COLUMNS: &str = "entity_type,entity_id,entity_external_id,display_name,email,\
agency_name,iata_code,host_identifier,rank_score";

/// How an agent's itineraries are located: by resolved contact ids when the
/// agent's external id maps to contacts, else by the raw external id.
enum ContactScope {
    Ids(String),
    ExternalId(String),
}

impl ContactScope {
    fn apply(&self, query: SelectQuery) -> SelectQuery {
        match self {
            ContactScope::Ids(filter) => query.filter("primary_contact_id", filter.clone()),
            ContactScope::ExternalId(external_id) => {
                query.eq("primary_contact_external_id", external_id)
            }
        }
    }
}

#[derive(Clone)]
pub struct TravelTradeRepository {
    store: Arc<dyn RowStore>,
}

impl TravelTradeRepository {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    async fn first(&self, query: SelectQuery) -> Result<Option<Row>> {
        let (rows, _) = self.store.select(query.limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<Row>> {
        self.first(
            SelectQuery::new("travel_agents", "id,external_id,first_name,last_name,email,agency_id")
                .eq("id", agent_id),
        )
        .await
    }

    pub async fn get_agency(&self, agency_id: &str) -> Result<Option<Row>> {
        self.first(
            SelectQuery::new(
                "travel_agencies",
                "id,external_id,agency_name,iata_code,host_identifier",
            )
            .eq("id", agency_id),
        )
        .await
    }

    fn period_window(table: &str, columns: &str, start: NaiveDate, end: NaiveDate) -> SelectQuery {
        SelectQuery::new(table, columns)
            .filter("period_start", format!("gte.{start}"))
            .filter("period_start", format!("lte.{end}"))
            .order("period_start.asc")
            .limit(MAX_QUERY_ROWS)
    }

    /// Agent months, optionally narrowed to one agent or one agency.
    pub async fn list_agent_rollup(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        agent_id: Option<&str>,
        agency_id: Option<&str>,
    ) -> Result<Vec<TradeRollupRow>> {
        let mut query =
            Self::period_window("travel_agent_monthly_rollup", AGENT_ROLLUP_COLUMNS, start, end);
        if let Some(agent_id) = agent_id {
            query = query.eq("agent_id", agent_id);
        }
        if let Some(agency_id) = agency_id {
            query = query.eq("agency_id", agency_id);
        }
        let (rows, _) = self.store.select(query).await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn list_agency_rollup(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        agency_id: Option<&str>,
    ) -> Result<Vec<TradeRollupRow>> {
        let mut query =
            Self::period_window("travel_agency_monthly_rollup", AGENCY_ROLLUP_COLUMNS, start, end);
        if let Some(agency_id) = agency_id {
            query = query.eq("agency_id", agency_id);
        }
        let (rows, _) = self.store.select(query).await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn list_affinity_rows(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        agent_id: &str,
    ) -> Result<Vec<AffinityRow>> {
        let query = Self::period_window(
            "travel_agent_consultant_affinity_monthly_rollup",
            AFFINITY_COLUMNS,
            start,
            end,
        )
        .eq("agent_id", agent_id);
        let (rows, _) = self.store.select(query).await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn list_open_status_values(&self) -> Result<Vec<String>> {
        let query = SelectQuery::new(
            "itinerary_status_reference",
            "status_value,pipeline_bucket,is_filter_out",
        )
        .eq("is_filter_out", "false")
        .filter("pipeline_bucket", "in.(open,holding)")
        .order("status_value.asc")
        .limit(MAX_QUERY_ROWS);
        let (rows, _) = self.store.select(query).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.opt_text("status_value"))
            .filter(|value| !value.is_empty())
            .collect())
    }

    async fn contact_scope(&self, contact_external_id: &str) -> Result<Option<ContactScope>> {
        let external_id = contact_external_id.trim();
        if external_id.is_empty() {
            return Ok(Some(ContactScope::ExternalId(String::new())));
        }
        let query = SelectQuery::new("contacts", "id").eq("external_id", external_id).limit(10);
        let (rows, _) = self.store.select(query).await?;
        let ids: Vec<String> = rows
            .iter()
            .filter_map(|row| row.opt_text("id"))
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            return Ok(Some(ContactScope::ExternalId(external_id.to_string())));
        }
        Ok(in_filter(&ids).map(ContactScope::Ids))
    }

    /// Files in Traveling status whose travel window spans `as_of`.
    pub async fn list_current_traveling_itineraries(
        &self,
        contact_external_id: &str,
        as_of: NaiveDate,
        limit: u64,
    ) -> Result<Vec<TradeItineraryRow>> {
        let Some(scope) = self.contact_scope(contact_external_id).await? else {
            return Ok(Vec::new());
        };
        let query = scope
            .apply(SelectQuery::new("itineraries", ITINERARY_COLUMNS))
            .filter("travel_start_date", format!("lte.{as_of}"))
            .filter("travel_end_date", format!("gte.{as_of}"))
            .eq("itinerary_status", "Traveling")
            .order("travel_start_date.asc")
            .limit(limit);
        let (rows, _) = self.store.select(query).await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn list_top_open_itineraries(
        &self,
        contact_external_id: &str,
        open_status_values: &[String],
        limit: u64,
    ) -> Result<Vec<TradeItineraryRow>> {
        let Some(status_filter) = in_filter(open_status_values) else {
            return Ok(Vec::new());
        };
        let Some(scope) = self.contact_scope(contact_external_id).await? else {
            return Ok(Vec::new());
        };
        let query = scope
            .apply(SelectQuery::new("itineraries", ITINERARY_COLUMNS))
            .filter("itinerary_status", status_filter)
            .order("gross_profit.desc.nullslast")
            .limit(limit);
        let (rows, _) = self.store.select(query).await?;
        Ok(decode_rows(rows)?)
    }

    /// Merges full-text and substring matches, full-text hits winning on
    /// duplicates, then ranks by score and display name.
    pub async fn search(
        &self,
        raw_query: &str,
        entity_type: SearchEntityType,
        limit: u32,
    ) -> Result<Vec<TradeSearchRow>> {
        let normalized = raw_query.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        let scoped = |query: SelectQuery| match entity_type.as_filter() {
            Some(kind) => query.eq("entity_type", kind),
            None => query,
        };
        let base = || {
            SelectQuery::new("travel_trade_search_index", SEARCH_COLUMNS)
                .order("rank_score.desc")
                .limit(u64::from(limit))
        };

        let ilike = scoped(base().filter(
            "search_text",
            format!("ilike.*{}*", ilike_escape(&normalized)),
        ));
        let fts = scoped(base().filter("search_text", format!("wfts.{normalized}")));
        let (fts_rows, _) = self.store.select(fts).await?;
        let (ilike_rows, _) = self.store.select(ilike).await?;

        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut merged: Vec<TradeSearchRow> = Vec::new();
        for row in decode_rows::<TradeSearchRow>(fts_rows)?
            .into_iter()
            .chain(decode_rows::<TradeSearchRow>(ilike_rows)?)
        {
            if seen.insert((row.entity_type.clone(), row.entity_id.clone())) {
                merged.push(row);
            }
        }
        merged.sort_by(|a, b| {
            b.rank_score
                .total_cmp(&a.rank_score)
                .then_with(|| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()))
        });
        merged.truncate(limit as usize);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowstore_client::MemoryStore;
    use serde_json::json;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[tokio::test]
    async fn test_search_merges_and_ranks() {
        let store = Arc::new(MemoryStore::new().with_rows(
            "travel_trade_search_index",
            [
                json!({"entity_type": "agent", "entity_id": "a1", "display_name": "Zoe Acme", "search_text": "zoe acme travel", "rank_score": 0.5}),
                json!({"entity_type": "agency", "entity_id": "g1", "display_name": "Acme Travel", "search_text": "acme travel", "rank_score": 0.5}),
                json!({"entity_type": "agency", "entity_id": "g2", "display_name": "Other", "search_text": "other", "rank_score": 0.9}),
                json!({"entity_type": "agent", "entity_id": "a2", "display_name": "Acmeville", "search_text": "acmeville tours", "rank_score": 0.8}),
            ],
        ));
        let repo = TravelTradeRepository::new(store);
        let rows = repo
            .search("  acme  ", SearchEntityType::All, 10)
            .await
            .expect("search");
        let ids: Vec<&str> = rows.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "g1", "a1"]);

        let agents = repo
            .search("acme", SearchEntityType::Agent, 1)
            .await
            .expect("search");
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].entity_id, "a2");
        assert!(repo.search("   ", SearchEntityType::All, 5).await.expect("search").is_empty());
    }

    #[tokio::test]
    async fn test_traveling_itineraries_resolve_contacts() {
        let store = Arc::new(
            MemoryStore::new()
                .with_rows("contacts", [json!({"id": "c-1", "external_id": "EXT1"})])
                .with_rows(
                    "itineraries",
                    [
                        json!({"id": "i1", "primary_contact_id": "c-1", "itinerary_status": "Traveling",
                               "travel_start_date": "2026-03-01", "travel_end_date": "2026-03-20"}),
                        json!({"id": "i2", "primary_contact_id": "c-9", "itinerary_status": "Traveling",
                               "travel_start_date": "2026-03-01", "travel_end_date": "2026-03-20"}),
                        json!({"id": "i3", "primary_contact_external_id": "EXT2", "itinerary_status": "Traveling",
                               "travel_start_date": "2026-03-01", "travel_end_date": "2026-03-20"}),
                    ],
                ),
        );
        let repo = TravelTradeRepository::new(store);
        let by_contact = repo
            .list_current_traveling_itineraries("EXT1", ymd(2026, 3, 10), 10)
            .await
            .expect("rows");
        assert_eq!(by_contact.len(), 1);
        assert_eq!(by_contact[0].id, "i1");

        let by_external = repo
            .list_current_traveling_itineraries("EXT2", ymd(2026, 3, 10), 10)
            .await
            .expect("rows");
        assert_eq!(by_external[0].id, "i3");

        let none_open = repo
            .list_top_open_itineraries("EXT1", &[], 5)
            .await
            .expect("rows");
        assert!(none_open.is_empty());
    }
}
