//! Row store access for the itinerary revenue, deposit, channel and stage rollups.

use chrono::NaiveDate;
use common::row::Row;
use common::Result;
use rowstore_client::{decode_rows, RowStore, SelectQuery};
use std::sync::Arc;

use super::types::{DepositTrendPoint, Grain, PipelineStageRow};

const MAX_QUERY_ROWS: u64 = 10_000;

const REVENUE_COLUMNS: &str = "period_start,period_end,pipeline_bucket,pipeline_category,\
itinerary_count,pax_count,gross_amount,commission_income_amount,margin_amount,commission_amount,\
trade_commission_amount";
const DEPOSIT_COLUMNS: &str = "period_start,period_end,closed_itinerary_count,closed_gross_amount,\
deposit_received_amount,target_deposit_amount,deposit_gap_amount,deposit_coverage_ratio";
const CONSORTIA_COLUMNS: &str = "period_start,period_end,consortia,itinerary_count,pax_count,\
gross_amount,commission_income_amount,margin_amount";
const AGENCY_COLUMNS: &str = "agency_name,itinerary_count,pax_count,gross_amount,\
commission_income_amount,net_amount,trade_commission_amount";
const ACTUALS_COLUMNS: &str = "period_start,itinerary_count,pax_count,gross_amount,\
commission_income_amount,margin_amount,trade_commission_amount,margin_pct,avg_gross_per_itinerary,\
avg_commission_income_per_itinerary,avg_gross_per_pax,avg_commission_income_per_pax,\
avg_number_of_days,avg_number_of_nights";
const STAGE_COLUMNS: &str =
    "period_start,period_end,stage,itinerary_count,gross_amount,net_amount,pax_count";

#[derive(Clone)]
pub struct ItineraryRevenueRepository {
    store: Arc<dyn RowStore>,
}

impl ItineraryRevenueRepository {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    fn window(table: &str, columns: &str, start: NaiveDate, end: NaiveDate) -> SelectQuery {
        SelectQuery::new(table, columns)
            .filter("period_start", format!("gte.{start}"))
            .filter("period_start", format!("lte.{end}"))
            .order("period_start.asc")
            .limit(MAX_QUERY_ROWS)
    }

    async fn rows(&self, query: SelectQuery) -> Result<Vec<Row>> {
        Ok(self.store.select(query).await?.0)
    }

    pub async fn list_revenue_outlook(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        grain: Grain,
    ) -> Result<Vec<Row>> {
        let table = match grain {
            Grain::Weekly => "mv_itinerary_revenue_weekly",
            Grain::Monthly => "mv_itinerary_revenue_monthly",
        };
        self.rows(Self::window(table, REVENUE_COLUMNS, start, end)).await
    }

    pub async fn list_deposit_trends(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DepositTrendPoint>> {
        let rows = self
            .rows(Self::window("mv_itinerary_deposit_monthly", DEPOSIT_COLUMNS, start, end))
            .await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn list_consortia_channels(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Row>> {
        self.rows(Self::window("mv_itinerary_consortia_monthly", CONSORTIA_COLUMNS, start, end))
            .await
    }

    pub async fn list_trade_agency_channels(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Row>> {
        self.rows(Self::window("mv_itinerary_trade_agency_monthly", AGENCY_COLUMNS, start, end))
            .await
    }

    /// Closed-won monthly revenue only.
    pub async fn list_actuals_yoy(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Row>> {
        let query = Self::window("mv_itinerary_revenue_monthly", ACTUALS_COLUMNS, start, end)
            .eq("pipeline_bucket", "closed_won");
        self.rows(query).await
    }

    pub async fn list_actuals_consortia_channels(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Row>> {
        self.rows(Self::window(
            "mv_itinerary_consortia_actuals_monthly",
            CONSORTIA_COLUMNS,
            start,
            end,
        ))
        .await
    }

    pub async fn list_actuals_trade_agency_channels(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Row>> {
        self.rows(Self::window(
            "mv_itinerary_trade_agency_actuals_monthly",
            AGENCY_COLUMNS,
            start,
            end,
        ))
        .await
    }

    pub async fn list_stage_trends(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PipelineStageRow>> {
        let rows = self
            .rows(Self::window("mv_itinerary_pipeline_stages", STAGE_COLUMNS, start, end))
            .await?;
        Ok(decode_rows(rows)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::row::RowExt;
    use rowstore_client::MemoryStore;
    use serde_json::json;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[tokio::test]
    async fn test_grain_selects_view() {
        let store = Arc::new(
            MemoryStore::new()
                .with_rows("mv_itinerary_revenue_monthly", [json!({"period_start": "2026-01-01", "gross_amount": 1})])
                .with_rows("mv_itinerary_revenue_weekly", [json!({"period_start": "2026-01-05", "gross_amount": 2})]),
        );
        let repo = ItineraryRevenueRepository::new(store);
        let weekly = repo
            .list_revenue_outlook(ymd(2026, 1, 1), ymd(2026, 12, 31), Grain::Weekly)
            .await
            .expect("rows");
        assert_eq!(weekly.len(), 1);
        assert_eq!(weekly[0].f64_or_zero("gross_amount"), 2.0);
    }

    #[tokio::test]
    async fn test_actuals_keep_closed_won_only() {
        let store = Arc::new(MemoryStore::new().with_rows(
            "mv_itinerary_revenue_monthly",
            [
                json!({"period_start": "2026-01-01", "pipeline_bucket": "closed_won", "gross_amount": 10}),
                json!({"period_start": "2026-01-01", "pipeline_bucket": "open", "gross_amount": 99}),
            ],
        ));
        let repo = ItineraryRevenueRepository::new(store);
        let rows = repo
            .list_actuals_yoy(ymd(2026, 1, 1), ymd(2026, 12, 31))
            .await
            .expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].f64_or_zero("gross_amount"), 10.0);
    }

    #[tokio::test]
    async fn test_stage_rows_decode_leniently() {
        let store = Arc::new(MemoryStore::new().with_rows(
            "mv_itinerary_pipeline_stages",
            [json!({"period_start": "2026-02-01", "period_end": "2026-02-28", "stage": "Traveled",
                    "itinerary_count": "3", "gross_amount": null})],
        ));
        let repo = ItineraryRevenueRepository::new(store);
        let rows = repo
            .list_stage_trends(ymd(2026, 1, 1), ymd(2026, 12, 31))
            .await
            .expect("rows");
        assert_eq!(rows[0].itinerary_count, 3.0);
        assert_eq!(rows[0].gross_amount, 0.0);
        assert!(rows[0].is_confirmed());
    }
}
