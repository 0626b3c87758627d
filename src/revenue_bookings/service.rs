//! Booking lookups, cash movement rollups and the naive booking forecast.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{instrument, warn};

use common::envelope::Pagination;
use common::row::round_to;
use common::time::{add_months, month_start};
use common::{Error, Result};

use super::repository::{BookingPage, RevenueBookingsRepository};
use super::types::{
    BookingDetail, BookingForecastPoint, BookingListFilters, BookingRecord, BookingSummary,
    CashFlowSummary, CashFlowTimeseriesPoint, CustomerPaymentRecord, DepositSummary,
    ItineraryTrendPoint, ItineraryTrendsResponse, ItineraryTrendsSummary, LeadFlowPoint,
    LeadFlowResponse, LeadFlowSummary, PaymentOutSummary, SupplierInvoiceRecord,
};

const FORECAST_SAMPLE_SIZE: u32 = 1_000;

/// Per-currency accumulator that reports currencies in first-seen order.
struct CurrencyTotals<T> {
    entries: Vec<(String, T)>,
}

impl<T: Default> CurrencyTotals<T> {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn entry(&mut self, currency: &str) -> &mut T {
        let index = match self.entries.iter().position(|(code, _)| code == currency) {
            Some(index) => index,
            None => {
                self.entries.push((currency.to_string(), T::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].1
    }

    fn into_entries(self) -> impl Iterator<Item = (String, T)> {
        self.entries.into_iter()
    }
}

/// Cash in is every customer payment, cash out is what suppliers were paid.
pub fn cashflow_summary(
    payments: &[CustomerPaymentRecord],
    invoices: &[SupplierInvoiceRecord],
) -> Vec<CashFlowSummary> {
    let mut totals: CurrencyTotals<(Decimal, Decimal)> = CurrencyTotals::new();
    for payment in payments {
        if let (Some(currency), Some(amount)) = (payment.currency_code.as_deref(), payment.amount) {
            totals.entry(currency).0 += amount;
        }
    }
    for invoice in invoices {
        if let Some(currency) = invoice.currency_code.as_deref() {
            totals.entry(currency).1 += invoice.paid_amount.unwrap_or_default();
        }
    }
    totals
        .into_entries()
        .map(|(currency_code, (cash_in, cash_out))| CashFlowSummary {
            currency_code,
            cash_in_total: cash_in,
            cash_out_total: cash_out,
            net_cash_total: cash_in - cash_out,
        })
        .collect()
}

/// Daily buckets: payments land on their payment date, supplier payouts on their paid date.
pub fn cashflow_timeseries(
    payments: &[CustomerPaymentRecord],
    invoices: &[SupplierInvoiceRecord],
) -> Vec<CashFlowTimeseriesPoint> {
    let mut buckets: BTreeMap<NaiveDate, (Decimal, Decimal)> = BTreeMap::new();
    for payment in payments {
        if let (Some(day), Some(amount)) = (payment.payment_date, payment.amount) {
            buckets.entry(day).or_default().0 += amount;
        }
    }
    for invoice in invoices {
        if invoice.currency_code.is_none() {
            continue;
        }
        if let (Some(day), Some(amount)) = (invoice.paid_date, invoice.paid_amount) {
            buckets.entry(day).or_default().1 += amount;
        }
    }
    buckets
        .into_iter()
        .map(|(period_start, (cash_in, cash_out))| CashFlowTimeseriesPoint {
            period_start,
            cash_in,
            cash_out,
            net_cash: cash_in - cash_out,
        })
        .collect()
}

/// Flat projection at the mean monthly booking count. Confidence shrinks with
/// the coefficient of variation and stays inside 0.2..=0.9.
pub fn forecast_bookings(
    bookings: &[BookingRecord],
    lookback_months: u32,
    horizon_months: u32,
) -> Vec<BookingForecastPoint> {
    let mut monthly: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    for start in bookings.iter().filter_map(|b| b.service_start_date) {
        *monthly.entry(month_start(start)).or_default() += 1;
    }
    let skip = monthly.len().saturating_sub(lookback_months as usize);
    let history: Vec<(NaiveDate, f64)> = monthly
        .into_iter()
        .skip(skip)
        .map(|(month, count)| (month, f64::from(count)))
        .collect();
    let Some(&(last_month, _)) = history.last() else {
        return Vec::new();
    };

    let n = history.len() as f64;
    let mean = history.iter().map(|(_, c)| c).sum::<f64>() / n;
    let spread = if history.len() > 1 {
        (history.iter().map(|(_, c)| (c - mean).powi(2)).sum::<f64>() / n).sqrt()
    } else {
        0.0
    };
    let confidence = if mean > 0.0 {
        (1.0 - spread / mean).clamp(0.2, 0.9)
    } else {
        0.3
    };
    let projected = mean.round_ties_even() as i64;

    (1..=horizon_months as i32)
        .map(|offset| BookingForecastPoint {
            period_start: add_months(last_month, offset),
            projected_bookings: projected,
            confidence,
        })
        .collect()
}

fn conversion(won: i64, lost: i64) -> f64 {
    let closed = won + lost;
    if closed == 0 {
        0.0
    } else {
        round_to(won as f64 / closed as f64, 4)
    }
}

#[derive(Clone)]
pub struct RevenueBookingsService {
    repository: RevenueBookingsRepository,
}

impl RevenueBookingsService {
    pub fn new(repository: RevenueBookingsRepository) -> Self {
        Self { repository }
    }

    pub async fn list_bookings(
        &self,
        filters: &BookingListFilters,
    ) -> Result<(Vec<BookingSummary>, Pagination)> {
        let page = BookingPage::new(filters.page, filters.page_size, true);
        let (records, total) = self
            .repository
            .list_bookings(
                filters.start_date,
                filters.end_date,
                filters.currency_code.as_deref(),
                page,
            )
            .await?;
        let summaries = records.iter().map(BookingSummary::from).collect();
        Ok((summaries, Pagination::new(filters.page, filters.page_size, total)))
    }

    pub async fn get_booking(&self, booking_id: &str) -> Result<BookingDetail> {
        self.repository
            .get_booking_by_id(booking_id)
            .await?
            .map(|record| BookingDetail::from(&record))
            .ok_or_else(|| Error::not_found("Booking not found"))
    }

    async fn ledgers(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        currency_code: Option<&str>,
    ) -> Result<(Vec<CustomerPaymentRecord>, Vec<SupplierInvoiceRecord>)> {
        let payments = self
            .repository
            .list_customer_payments(start, end, currency_code)
            .await?;
        let invoices = self
            .repository
            .list_supplier_invoices(start, end, currency_code)
            .await?;
        Ok((payments, invoices))
    }

    pub async fn get_cashflow_summary(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        currency_code: Option<&str>,
    ) -> Result<Vec<CashFlowSummary>> {
        let (payments, invoices) = self.ledgers(start, end, currency_code).await?;
        Ok(cashflow_summary(&payments, &invoices))
    }

    pub async fn get_cashflow_timeseries(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        currency_code: Option<&str>,
    ) -> Result<Vec<CashFlowTimeseriesPoint>> {
        let (payments, invoices) = self.ledgers(start, end, currency_code).await?;
        Ok(cashflow_timeseries(&payments, &invoices))
    }

    /// Every recorded customer payment counts as a received deposit.
    pub async fn get_deposit_summary(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        currency_code: Option<&str>,
    ) -> Result<Vec<DepositSummary>> {
        let payments = self
            .repository
            .list_customer_payments(start, end, currency_code)
            .await?;
        let mut totals: CurrencyTotals<Decimal> = CurrencyTotals::new();
        for payment in &payments {
            if let (Some(currency), Some(amount)) = (payment.currency_code.as_deref(), payment.amount)
            {
                *totals.entry(currency) += amount;
            }
        }
        Ok(totals
            .into_entries()
            .map(|(currency_code, amount)| DepositSummary {
                currency_code,
                total_deposits: amount,
                received_deposits: amount,
                outstanding_deposits: Decimal::ZERO,
            })
            .collect())
    }

    pub async fn get_payments_out_summary(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        currency_code: Option<&str>,
    ) -> Result<Vec<PaymentOutSummary>> {
        let invoices = self
            .repository
            .list_supplier_invoices(start, end, currency_code)
            .await?;
        let mut totals: CurrencyTotals<(Decimal, Decimal)> = CurrencyTotals::new();
        for invoice in &invoices {
            let (Some(currency), Some(total)) = (invoice.currency_code.as_deref(), invoice.total_amount)
            else {
                continue;
            };
            let entry = totals.entry(currency);
            entry.0 += total;
            entry.1 += invoice.paid_amount.unwrap_or_default();
        }
        Ok(totals
            .into_entries()
            .map(|(currency_code, (total, paid))| PaymentOutSummary {
                currency_code,
                total_invoices: total,
                paid_amount: paid,
                outstanding_amount: total - paid,
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_booking_forecasts(
        &self,
        lookback_months: u32,
        horizon_months: u32,
    ) -> Result<Vec<BookingForecastPoint>> {
        let page = BookingPage::new(1, FORECAST_SAMPLE_SIZE, false);
        let (records, _) = self.repository.list_bookings(None, None, None, page).await?;
        Ok(forecast_bookings(&records, lookback_months, horizon_months))
    }

    /// Missing or broken trend views yield an empty response instead of an error.
    pub async fn get_itinerary_trends(&self, start: NaiveDate, end: NaiveDate) -> ItineraryTrendsResponse {
        let records = match self.repository.list_itinerary_trends(start, end).await {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "itinerary trends unavailable");
                return ItineraryTrendsResponse::default();
            }
        };
        let timeline: Vec<ItineraryTrendPoint> = records
            .into_iter()
            .map(|r| ItineraryTrendPoint {
                period_start: r.period_start,
                created_count: r.created_count,
                closed_count: r.closed_count,
                travel_start_count: r.travel_start_count,
                travel_end_count: r.travel_end_count,
            })
            .collect();
        let summary = ItineraryTrendsSummary {
            created_itineraries: timeline.iter().map(|p| p.created_count).sum(),
            closed_itineraries: timeline.iter().map(|p| p.closed_count).sum(),
            travel_start_itineraries: timeline.iter().map(|p| p.travel_start_count).sum(),
            travel_end_itineraries: timeline.iter().map(|p| p.travel_end_count).sum(),
        };
        ItineraryTrendsResponse { summary, timeline }
    }

    pub async fn get_itinerary_lead_flow(&self, start: NaiveDate, end: NaiveDate) -> LeadFlowResponse {
        let records = match self.repository.list_itinerary_lead_flow(start, end).await {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "itinerary lead flow unavailable");
                return LeadFlowResponse::default();
            }
        };
        let timeline: Vec<LeadFlowPoint> = records
            .into_iter()
            .map(|r| LeadFlowPoint {
                period_start: r.period_start,
                created_count: r.created_count,
                closed_won_count: r.closed_won_count,
                closed_lost_count: r.closed_lost_count,
                conversion_rate: conversion(r.closed_won_count, r.closed_lost_count),
            })
            .collect();
        let won: i64 = timeline.iter().map(|p| p.closed_won_count).sum();
        let lost: i64 = timeline.iter().map(|p| p.closed_lost_count).sum();
        let summary = LeadFlowSummary {
            created_itineraries: timeline.iter().map(|p| p.created_count).sum(),
            closed_won_itineraries: won,
            closed_lost_itineraries: lost,
            conversion_rate: conversion(won, lost),
        };
        LeadFlowResponse { summary, timeline }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowstore_client::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn payment(day: Option<NaiveDate>, amount: Option<Decimal>, currency: Option<&str>) -> CustomerPaymentRecord {
        CustomerPaymentRecord {
            id: "p".into(),
            payment_date: day,
            amount,
            currency_code: currency.map(str::to_string),
            ..Default::default()
        }
    }

    fn invoice(
        paid_date: Option<NaiveDate>,
        total: Option<Decimal>,
        paid: Option<Decimal>,
        currency: Option<&str>,
    ) -> SupplierInvoiceRecord {
        SupplierInvoiceRecord {
            id: "i".into(),
            paid_date,
            total_amount: total,
            paid_amount: paid,
            currency_code: currency.map(str::to_string),
            ..Default::default()
        }
    }

    fn booking_on(day: NaiveDate) -> BookingRecord {
        BookingRecord {
            id: day.to_string(),
            service_start_date: Some(day),
            ..Default::default()
        }
    }

    fn service(store: MemoryStore) -> RevenueBookingsService {
        RevenueBookingsService::new(RevenueBookingsRepository::new(Arc::new(store)))
    }

    #[test]
    fn test_cashflow_summary_per_currency() {
        let payments = vec![
            payment(Some(ymd(2026, 1, 2)), Some(Decimal::from(100)), Some("USD")),
            payment(Some(ymd(2026, 1, 3)), Some(Decimal::from(50)), Some("ZAR")),
            payment(Some(ymd(2026, 1, 3)), Some(Decimal::from(25)), Some("USD")),
            payment(Some(ymd(2026, 1, 3)), None, Some("USD")),
        ];
        let invoices = vec![
            invoice(None, Some(Decimal::from(80)), Some(Decimal::from(40)), Some("USD")),
            invoice(None, Some(Decimal::from(10)), None, Some("GBP")),
        ];
        let summary = cashflow_summary(&payments, &invoices);
        let codes: Vec<&str> = summary.iter().map(|s| s.currency_code.as_str()).collect();
        assert_eq!(codes, vec!["USD", "ZAR", "GBP"]);
        assert_eq!(summary[0].cash_in_total, Decimal::from(125));
        assert_eq!(summary[0].cash_out_total, Decimal::from(40));
        assert_eq!(summary[0].net_cash_total, Decimal::from(85));
        assert_eq!(summary[2].cash_out_total, Decimal::ZERO);
    }

    #[test]
    fn test_cashflow_timeseries_buckets_by_day() {
        let payments = vec![
            payment(Some(ymd(2026, 1, 5)), Some(Decimal::from(100)), None),
            payment(None, Some(Decimal::from(999)), Some("USD")),
        ];
        let invoices = vec![
            invoice(Some(ymd(2026, 1, 2)), Some(Decimal::from(30)), Some(Decimal::from(30)), Some("USD")),
            invoice(Some(ymd(2026, 1, 5)), Some(Decimal::from(30)), Some(Decimal::from(20)), Some("USD")),
            invoice(Some(ymd(2026, 1, 6)), Some(Decimal::from(30)), Some(Decimal::from(5)), None),
        ];
        let points = cashflow_timeseries(&payments, &invoices);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].period_start, ymd(2026, 1, 2));
        assert_eq!(points[0].net_cash, Decimal::from(-30));
        assert_eq!(points[1].cash_in, Decimal::from(100));
        assert_eq!(points[1].net_cash, Decimal::from(80));
    }

    #[test]
    fn test_forecast_uses_last_months_only() {
        let mut bookings = vec![booking_on(ymd(2025, 1, 10))];
        for _ in 0..4 {
            bookings.push(booking_on(ymd(2025, 11, 3)));
        }
        for _ in 0..4 {
            bookings.push(booking_on(ymd(2025, 12, 20)));
        }
        let points = forecast_bookings(&bookings, 2, 3);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].period_start, ymd(2026, 1, 1));
        assert_eq!(points[2].period_start, ymd(2026, 3, 1));
        assert!(points.iter().all(|p| p.projected_bookings == 4));
        assert_eq!(points[0].confidence, 0.9);
    }

    #[test]
    fn test_forecast_confidence_floor_and_single_month() {
        let mut bookings = vec![booking_on(ymd(2026, 1, 1))];
        for _ in 0..9 {
            bookings.push(booking_on(ymd(2026, 2, 1)));
        }
        let volatile = forecast_bookings(&bookings, 12, 1);
        assert_eq!(volatile[0].projected_bookings, 5);
        assert!((volatile[0].confidence - 0.2).abs() < 1e-9);

        let single = forecast_bookings(&[booking_on(ymd(2026, 2, 14))], 12, 1);
        assert_eq!(single[0].confidence, 0.9);
        assert_eq!(single[0].projected_bookings, 1);
        assert!(forecast_bookings(&[], 12, 3).is_empty());
    }

    #[tokio::test]
    async fn test_get_booking_not_found() {
        let err = service(MemoryStore::new())
            .get_booking("missing")
            .await
            .expect_err("absent booking");
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.to_string(), "Booking not found");
    }

    #[tokio::test]
    async fn test_payments_out_and_deposits() {
        let store = MemoryStore::new()
            .with_rows(
                "supplier_invoices",
                [
                    json!({"id": "i1", "invoice_date": "2026-01-10", "total_amount": 100, "paid_amount": 60, "currency_code": "USD"}),
                    json!({"id": "i2", "invoice_date": "2026-01-11", "total_amount": 50, "paid_amount": null, "currency_code": "USD"}),
                    json!({"id": "i3", "invoice_date": "2026-01-12", "total_amount": null, "paid_amount": 7, "currency_code": "USD"}),
                ],
            )
            .with_rows(
                "customer_payments",
                [
                    json!({"id": "p1", "payment_date": "2026-01-10", "amount": "12.50", "currency_code": "USD"}),
                    json!({"id": "p2", "payment_date": "2026-01-11", "amount": 7.5, "currency_code": "USD"}),
                ],
            );
        let svc = service(store);
        let out = svc
            .get_payments_out_summary(ymd(2026, 1, 1), ymd(2026, 1, 31), None)
            .await
            .expect("summary");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].total_invoices, Decimal::from(150));
        assert_eq!(out[0].paid_amount, Decimal::from(60));
        assert_eq!(out[0].outstanding_amount, Decimal::from(90));

        let deposits = svc
            .get_deposit_summary(ymd(2026, 1, 1), ymd(2026, 1, 31), Some("USD"))
            .await
            .expect("deposits");
        assert_eq!(deposits[0].total_deposits, Decimal::from(20));
        assert_eq!(deposits[0].received_deposits, Decimal::from(20));
        assert_eq!(deposits[0].outstanding_deposits, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_lead_flow_conversion_and_totals() {
        let store = MemoryStore::new().with_rows(
            "mv_itinerary_lead_flow_monthly",
            [
                json!({"period_start": "2026-01-01", "created_count": 10, "closed_won_count": 2, "closed_lost_count": 1}),
                json!({"period_start": "2026-02-01", "created_count": 5, "closed_won_count": 0, "closed_lost_count": 0}),
            ],
        );
        let flow = service(store)
            .get_itinerary_lead_flow(ymd(2026, 1, 1), ymd(2026, 12, 31))
            .await;
        assert_eq!(flow.timeline[0].conversion_rate, 0.6667);
        assert_eq!(flow.timeline[1].conversion_rate, 0.0);
        assert_eq!(flow.summary.created_itineraries, 15);
        assert_eq!(flow.summary.conversion_rate, 0.6667);
    }

    #[tokio::test]
    async fn test_trend_views_degrade_to_empty() {
        let store = MemoryStore::new();
        store.fail_table("mv_itinerary_trends");
        store.fail_table("mv_itinerary_lead_flow_monthly");
        let svc = service(store);
        let trends = svc.get_itinerary_trends(ymd(2026, 1, 1), ymd(2026, 12, 31)).await;
        assert!(trends.timeline.is_empty());
        assert_eq!(trends.summary.created_itineraries, 0);
        let flow = svc.get_itinerary_lead_flow(ymd(2026, 1, 1), ymd(2026, 12, 31)).await;
        assert_eq!(flow, LeadFlowResponse::default());
    }

    #[tokio::test]
    async fn test_list_bookings_paginates_with_totals() {
        let store = MemoryStore::new().with_rows(
            "bookings",
            (1..=3).map(|d| json!({"id": format!("b{d}"), "is_deleted": false, "service_start_date": format!("2026-0{d}-01")})),
        );
        let filters: BookingListFilters =
            serde_json::from_value(json!({"page": 2, "page_size": 2})).expect("filters");
        let (items, pagination) = service(store).list_bookings(&filters).await.expect("list");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "b1");
        assert_eq!(pagination.total_items, 3);
        assert_eq!(pagination.total_pages, 2);
    }
}
