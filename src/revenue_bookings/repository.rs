use chrono::NaiveDate;
use common::Result;
use rowstore_client::{decode_rows, CountMode, RowStore, SelectQuery};
use std::sync::Arc;

use super::types::{
    BookingRecord, CustomerPaymentRecord, ItineraryTrendRecord, LeadFlowRecord,
    SupplierInvoiceRecord,
};

const LEDGER_ROW_LIMIT: u64 = 3_000;
const TREND_ROW_LIMIT: u64 = 10_000;

const PAYMENT_COLUMNS: &str = "id,itinerary_id,payment_date,amount,currency_code,payment_status";
const INVOICE_COLUMNS: &str = "id,supplier_id,invoice_date,due_date,total_amount,paid_amount,\
currency_code,paid_date";
const TREND_COLUMNS: &str =
    "period_start,created_count,closed_count,travel_start_count,travel_end_count";
const LEAD_FLOW_COLUMNS: &str = "period_start,created_count,closed_won_count,closed_lost_count";

/// Limit/offset for a 1-based page, with an exact count only when totals are wanted.
#[derive(Debug, Clone, Copy)]
pub struct BookingPage {
    pub page: u32,
    pub page_size: u32,
    pub include_totals: bool,
}

impl BookingPage {
    pub fn new(page: u32, page_size: u32, include_totals: bool) -> Self {
        Self {
            page,
            page_size,
            include_totals,
        }
    }

    fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    fn count_mode(&self) -> CountMode {
        if self.include_totals {
            CountMode::Exact
        } else {
            CountMode::None
        }
    }
}

#[derive(Clone)]
pub struct RevenueBookingsRepository {
    store: Arc<dyn RowStore>,
}

impl RevenueBookingsRepository {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    /// Non-deleted bookings, newest service start first. The total falls back
    /// to what the page proves exists when the store reports none.
    pub async fn list_bookings(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        currency_code: Option<&str>,
        page: BookingPage,
    ) -> Result<(Vec<BookingRecord>, u64)> {
        let mut query = SelectQuery::new("bookings", "*").eq("is_deleted", "false");
        if let Some(start) = start {
            query = query.filter("service_start_date", format!("gte.{start}"));
        }
        if let Some(end) = end {
            query = query.filter("service_start_date", format!("lte.{end}"));
        }
        if let Some(currency) = currency_code {
            query = query.eq("currency_code", currency);
        }
        let query = query
            .order("service_start_date.desc")
            .page(page.page, page.page_size)
            .count(page.count_mode());
        let (rows, total) = self.store.select(query).await?;
        let records: Vec<BookingRecord> = decode_rows(rows)?;
        let total = total.unwrap_or(page.offset() + records.len() as u64);
        Ok((records, total))
    }

    pub async fn get_booking_by_id(&self, booking_id: &str) -> Result<Option<BookingRecord>> {
        let query = SelectQuery::new("bookings", "*").eq("id", booking_id).limit(1);
        let (rows, _) = self.store.select(query).await?;
        let records: Vec<BookingRecord> = decode_rows(rows)?;
        Ok(records.into_iter().next())
    }

    pub async fn list_customer_payments(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        currency_code: Option<&str>,
    ) -> Result<Vec<CustomerPaymentRecord>> {
        let mut query = SelectQuery::new("customer_payments", PAYMENT_COLUMNS)
            .filter("payment_date", format!("gte.{start}"))
            .filter("payment_date", format!("lte.{end}"));
        if let Some(currency) = currency_code {
            query = query.eq("currency_code", currency);
        }
        let (rows, _) = self.store.select(query.limit(LEDGER_ROW_LIMIT)).await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn list_supplier_invoices(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        currency_code: Option<&str>,
    ) -> Result<Vec<SupplierInvoiceRecord>> {
        let mut query = SelectQuery::new("supplier_invoices", INVOICE_COLUMNS)
            .filter("invoice_date", format!("gte.{start}"))
            .filter("invoice_date", format!("lte.{end}"));
        if let Some(currency) = currency_code {
            query = query.eq("currency_code", currency);
        }
        let (rows, _) = self.store.select(query.limit(LEDGER_ROW_LIMIT)).await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn list_itinerary_trends(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ItineraryTrendRecord>> {
        let query = SelectQuery::new("mv_itinerary_trends", TREND_COLUMNS)
            .filter("period_start", format!("gte.{start}"))
            .filter("period_start", format!("lte.{end}"))
            .order("period_start.asc")
            .limit(TREND_ROW_LIMIT);
        let (rows, _) = self.store.select(query).await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn list_itinerary_lead_flow(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LeadFlowRecord>> {
        let query = SelectQuery::new("mv_itinerary_lead_flow_monthly", LEAD_FLOW_COLUMNS)
            .filter("period_start", format!("gte.{start}"))
            .filter("period_start", format!("lte.{end}"))
            .order("period_start.asc")
            .limit(TREND_ROW_LIMIT);
        let (rows, _) = self.store.select(query).await?;
        Ok(decode_rows(rows)?)
    }
}
