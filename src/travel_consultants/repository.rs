//! Row store access for consultant rollups, employees and itinerary snapshots.

use chrono::NaiveDate;
use common::row::{Row, RowExt};
use common::Result;
use rowstore_client::{in_filter, RowStore, SelectQuery};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

const MAX_QUERY_ROWS: u64 = 5000;
const EMPLOYEE_CHUNK_SIZE: usize = 100;

const LEADERBOARD_COLUMNS: &str = "period_start,period_end,employee_id,employee_external_id,\
first_name,last_name,email,itinerary_count,pax_count,booked_revenue_amount,commission_income_amount,\
margin_amount,margin_pct,avg_booking_value_amount";
const PROFILE_COLUMNS: &str = "period_start,period_end,employee_id,employee_external_id,first_name,\
last_name,email,itinerary_count,pax_count,booked_revenue_amount,net_amount,commission_income_amount,\
margin_amount,margin_pct,avg_number_of_days,avg_number_of_nights";
const FUNNEL_COLUMNS: &str = "period_start,period_end,employee_id,employee_external_id,first_name,\
last_name,email,lead_count,closed_won_count,closed_lost_count,booked_revenue_amount,\
median_speed_to_book_days";
const COMPENSATION_COLUMNS: &str = "period_start,period_end,employee_id,employee_external_id,\
first_name,last_name,email,salary_annual_amount,salary_monthly_amount,commission_rate,\
commission_income_amount,estimated_commission_amount,estimated_total_pay_amount";
const SNAPSHOT_COLUMNS: &str = "id,itinerary_number,itinerary_name,itinerary_status,primary_country,\
travel_start_date,travel_end_date,gross_amount,pax_count,close_date,created_at";

#[derive(Clone)]
pub struct TravelConsultantsRepository {
    store: Arc<dyn RowStore>,
}

impl TravelConsultantsRepository {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    pub async fn get_employee(&self, employee_id: &str) -> Result<Option<Row>> {
        let query = SelectQuery::new("employees", "id,external_id,first_name,last_name,email")
            .eq("id", employee_id)
            .eq("analysis_disabled", "false")
            .limit(1);
        let (rows, _) = self.store.select(query).await?;
        Ok(rows.into_iter().next())
    }

    /// Ids from `employee_ids` that exist and are not excluded from analysis.
    pub async fn list_active_employee_ids(&self, employee_ids: &[String]) -> Result<HashSet<String>> {
        let ids: BTreeSet<&str> = employee_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !id.is_empty())
            .collect();
        let ids: Vec<&str> = ids.into_iter().collect();
        let mut active = HashSet::new();
        for chunk in ids.chunks(EMPLOYEE_CHUNK_SIZE) {
            let query = SelectQuery::new("employees", "id")
                .filter("id", format!("in.({})", chunk.join(",")))
                .eq("analysis_disabled", "false")
                .limit(chunk.len() as u64);
            let (rows, _) = self.store.select(query).await?;
            active.extend(rows.iter().filter_map(|row| row.opt_text("id")));
        }
        Ok(active)
    }

    async fn list_period_rows(
        &self,
        table: &str,
        columns: &str,
        start: NaiveDate,
        end: NaiveDate,
        employee_id: Option<&str>,
    ) -> Result<Vec<Row>> {
        let mut query = SelectQuery::new(table, columns)
            .filter("period_start", format!("gte.{start}"))
            .filter("period_start", format!("lte.{end}"));
        if let Some(employee_id) = employee_id {
            query = query.eq("employee_id", employee_id);
        }
        let (rows, _) = self
            .store
            .select(query.order("period_start.asc").limit(MAX_QUERY_ROWS))
            .await?;
        Ok(rows)
    }

    pub async fn list_leaderboard_monthly(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        employee_id: Option<&str>,
    ) -> Result<Vec<Row>> {
        self.list_period_rows(
            "mv_travel_consultant_leaderboard_monthly",
            LEADERBOARD_COLUMNS,
            start,
            end,
            employee_id,
        )
        .await
    }

    pub async fn list_profile_monthly(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        employee_id: Option<&str>,
    ) -> Result<Vec<Row>> {
        self.list_period_rows(
            "mv_travel_consultant_profile_monthly",
            PROFILE_COLUMNS,
            start,
            end,
            employee_id,
        )
        .await
    }

    pub async fn list_funnel_monthly(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        employee_id: Option<&str>,
    ) -> Result<Vec<Row>> {
        self.list_period_rows(
            "mv_travel_consultant_funnel_monthly",
            FUNNEL_COLUMNS,
            start,
            end,
            employee_id,
        )
        .await
    }

    pub async fn list_compensation_monthly(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        employee_id: Option<&str>,
    ) -> Result<Vec<Row>> {
        self.list_period_rows(
            "mv_travel_consultant_compensation_monthly",
            COMPENSATION_COLUMNS,
            start,
            end,
            employee_id,
        )
        .await
    }

    async fn list_status_values(&self, bucket_filter: &str) -> Result<Vec<String>> {
        let query = SelectQuery::new(
            "itinerary_status_reference",
            "status_value,pipeline_bucket,is_filter_out",
        )
        .eq("is_filter_out", "false")
        .filter("pipeline_bucket", bucket_filter)
        .order("status_value.asc")
        .limit(MAX_QUERY_ROWS);
        let (rows, _) = self.store.select(query).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.opt_text("status_value"))
            .filter(|value| !value.is_empty())
            .collect())
    }

    pub async fn list_open_status_values(&self) -> Result<Vec<String>> {
        self.list_status_values("in.(open,holding)").await
    }

    pub async fn list_closed_won_status_values(&self) -> Result<Vec<String>> {
        self.list_status_values("eq.closed_won").await
    }

    /// Files strictly in Traveling status whose travel window spans `as_of`.
    pub async fn list_current_traveling_itineraries(
        &self,
        employee_id: &str,
        as_of: NaiveDate,
        limit: u64,
    ) -> Result<Vec<Row>> {
        let query = SelectQuery::new("itineraries", SNAPSHOT_COLUMNS)
            .eq("employee_id", employee_id)
            .filter("travel_start_date", format!("lte.{as_of}"))
            .filter("travel_end_date", format!("gte.{as_of}"))
            .eq("itinerary_status", "Traveling")
            .order("travel_start_date.asc")
            .limit(limit);
        let (rows, _) = self.store.select(query).await?;
        Ok(rows)
    }

    pub async fn list_top_open_itineraries(
        &self,
        employee_id: &str,
        open_status_values: &[String],
        limit: u64,
    ) -> Result<Vec<Row>> {
        let Some(status_filter) = in_filter(open_status_values) else {
            return Ok(Vec::new());
        };
        let query = SelectQuery::new("itineraries", SNAPSHOT_COLUMNS)
            .eq("employee_id", employee_id)
            .filter("itinerary_status", status_filter)
            .order("gross_amount.desc.nullslast")
            .limit(limit);
        let (mut rows, _) = self.store.select(query).await?;
        rows.truncate(limit as usize);
        Ok(rows)
    }

    pub async fn list_closed_won_itineraries_by_travel_period(
        &self,
        employee_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        closed_won_status_values: &[String],
    ) -> Result<Vec<Row>> {
        let mut query = SelectQuery::new(
            "itineraries",
            "id,itinerary_status,created_at,close_date,travel_start_date,travel_end_date,\
gross_profit,pax_count,number_of_nights",
        )
        .eq("employee_id", employee_id)
        .filter("travel_end_date", format!("gte.{start}"))
        .filter("travel_end_date", format!("lte.{end}"));
        if let Some(status_filter) = in_filter(closed_won_status_values) {
            query = query.filter("itinerary_status", status_filter);
        }
        let (rows, _) = self
            .store
            .select(query.order("travel_end_date.asc").limit(MAX_QUERY_ROWS))
            .await?;
        Ok(rows)
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
    async fn test_period_rows_respect_window_and_employee() {
        let store = Arc::new(MemoryStore::new().with_rows(
            "mv_travel_consultant_leaderboard_monthly",
            vec![
                json!({"period_start": "2025-12-01", "employee_id": "e1", "booked_revenue_amount": 10}),
                json!({"period_start": "2026-01-01", "employee_id": "e1", "booked_revenue_amount": 20}),
                json!({"period_start": "2026-01-01", "employee_id": "e2", "booked_revenue_amount": 30}),
            ],
        ));
        let repo = TravelConsultantsRepository::new(store);

        let all = repo
            .list_leaderboard_monthly(ymd(2026, 1, 1), ymd(2026, 1, 31), None)
            .await
            .expect("rows");
        assert_eq!(all.len(), 2);

        let one = repo
            .list_leaderboard_monthly(ymd(2025, 1, 1), ymd(2026, 12, 31), Some("e1"))
            .await
            .expect("rows");
        assert_eq!(one.len(), 2);
        assert_eq!(one[0].text("period_start"), "2025-12-01");
    }

    #[tokio::test]
    async fn test_disabled_employees_are_hidden() {
        let store = Arc::new(MemoryStore::new().with_rows(
            "employees",
            vec![
                json!({"id": "e1", "first_name": "Ana", "analysis_disabled": false}),
                json!({"id": "e2", "first_name": "Ben", "analysis_disabled": true}),
            ],
        ));
        let repo = TravelConsultantsRepository::new(store);

        assert!(repo.get_employee("e1").await.expect("lookup").is_some());
        assert!(repo.get_employee("e2").await.expect("lookup").is_none());
        let active = repo
            .list_active_employee_ids(&["e1".into(), "e2".into(), String::new()])
            .await
            .expect("lookup");
        assert_eq!(active, HashSet::from(["e1".to_string()]));
    }

    #[tokio::test]
    async fn test_top_open_itineraries_need_status_values() {
        let store = Arc::new(MemoryStore::new().with_rows(
            "itineraries",
            vec![
                json!({"id": "i1", "employee_id": "e1", "itinerary_status": "Quoted", "gross_amount": 500}),
                json!({"id": "i2", "employee_id": "e1", "itinerary_status": "Quoted", "gross_amount": 900}),
                json!({"id": "i3", "employee_id": "e1", "itinerary_status": "Cancelled", "gross_amount": 9000}),
            ],
        ));
        let repo = TravelConsultantsRepository::new(store);

        assert!(repo
            .list_top_open_itineraries("e1", &[], 5)
            .await
            .expect("rows")
            .is_empty());
        let rows = repo
            .list_top_open_itineraries("e1", &["Quoted".to_string()], 5)
            .await
            .expect("rows");
        let ids: Vec<String> = rows.iter().map(|r| r.text("id")).collect();
        assert_eq!(ids, vec!["i2", "i1"]);
    }
}
