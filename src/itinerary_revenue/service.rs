//! Itinerary revenue outlook, conversion projections, channels and actuals.
//!
//! Forward views blend on-books revenue with open pipeline weighted by a
//! lookback close ratio, then lay a seasonal model over the last 24 months of
//! closed-won history.

use chrono::{Datelike, Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

use common::row::{round_to, Row, RowExt};
use common::time::{
    month_end, parse_forward_time_window_at, parse_time_window_at, today, MONTH_LABELS,
};
use common::Result;

use super::repository::ItineraryRevenueRepository;
use super::types::{
    ActualsFigures, ActualsMonthPoint, ActualsYearSummary, ActualsYoyResponse, ChannelPoint,
    ChannelsResponse, ConversionPoint, ConversionResponse, DepositsResponse, Grain, OutlookPoint,
    OutlookResponse, OutlookSummary, PipelineStageRow, TradeDirectBreakdown, TradeDirectFigures,
    TradeDirectMonthPoint,
};

const TARGET_UPLIFT: f64 = 1.12;
const LOOKBACK_WINDOW: &str = "12m";
const HISTORY_DAYS: i64 = 730;
const CHANNEL_LIMIT: usize = 10;
const DIRECT_CONSORTIA: [&str; 4] = ["not applicable", "n/a", "na", "not_applicable"];

fn pipeline_bucket(row: &Row) -> String {
    row.text("pipeline_bucket").to_lowercase()
}

fn is_open(bucket: &str) -> bool {
    bucket == "open" || bucket == "holding"
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator != 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Half stage-based, half bucket-based close ratio, bounded to 0.1..0.9.
pub fn blended_close_ratio(stages: &[PipelineStageRow], revenue: &[Row]) -> f64 {
    let quoted: f64 = stages.iter().filter(|s| s.is_quoted()).map(|s| s.itinerary_count).sum();
    let confirmed: f64 = stages
        .iter()
        .filter(|s| s.is_confirmed())
        .map(|s| s.itinerary_count)
        .sum();
    let stage_ratio = (quoted + confirmed > 0.0).then(|| confirmed / (quoted + confirmed));

    let (mut won, mut open) = (0.0, 0.0);
    for row in revenue {
        let bucket = pipeline_bucket(row);
        if bucket == "closed_won" {
            won += row.f64_or_zero("itinerary_count");
        } else if is_open(&bucket) {
            open += row.f64_or_zero("itinerary_count");
        }
    }
    let bucket_ratio = (won + open > 0.0).then(|| won / (won + open));

    let blended = match (stage_ratio, bucket_ratio) {
        (Some(stage), Some(bucket)) => stage * 0.5 + bucket * 0.5,
        (Some(stage), None) => stage,
        (None, Some(bucket)) => bucket,
        (None, None) => 0.0,
    };
    round_to(blended.clamp(0.1, 0.9), 4)
}

/// `(expected, best, worst)` close ratios from monthly quoted/confirmed spread.
pub fn close_ratio_scenarios(stages: &[PipelineStageRow], base: f64) -> (f64, f64, f64) {
    let mut by_period: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for stage in stages {
        let Some(period) = stage.period_start else {
            continue;
        };
        let entry = by_period.entry(period).or_default();
        if stage.is_quoted() {
            entry.0 += stage.itinerary_count;
        } else if stage.is_confirmed() {
            entry.1 += stage.itinerary_count;
        }
    }
    let mut monthly: Vec<f64> = by_period
        .values()
        .filter(|(quoted, confirmed)| quoted + confirmed > 0.0)
        .map(|(quoted, confirmed)| confirmed / (quoted + confirmed))
        .collect();
    if monthly.is_empty() {
        return (base, base, base);
    }
    monthly.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let last = (monthly.len() - 1) as f64;
    let p25 = monthly[(last * 0.25) as usize];
    let p75 = monthly[(last * 0.75) as usize];
    (
        round_to(base, 4),
        round_to(base.max(p75), 4),
        round_to(base.min(p25), 4),
    )
}

/// Commission income as a share of closed-won gross, clamped to 0..1.
pub fn commission_income_yield(revenue: &[Row]) -> f64 {
    let (mut gross, mut income) = (0.0, 0.0);
    for row in revenue.iter().filter(|r| pipeline_bucket(r) == "closed_won") {
        gross += row.f64_or_zero("gross_amount");
        income += row.f64_or_zero("commission_income_amount");
    }
    if gross <= 0.0 {
        return 0.0;
    }
    (income / gross).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Measures {
    gross: f64,
    income: f64,
    pax: f64,
}

impl Measures {
    fn from_row(row: &Row) -> Self {
        Self {
            gross: row.f64_or_zero("gross_amount"),
            income: row.f64_or_zero("commission_income_amount"),
            pax: row.f64_or_zero("pax_count"),
        }
    }

    fn add(self, other: Self) -> Self {
        Self {
            gross: self.gross + other.gross,
            income: self.income + other.income,
            pax: self.pax + other.pax,
        }
    }

    fn scale(self, factor: f64) -> Self {
        Self {
            gross: self.gross * factor,
            income: self.income * factor,
            pax: self.pax * factor,
        }
    }

    fn mean<'a>(items: impl IntoIterator<Item = &'a Measures>) -> Option<Self> {
        let (sum, count) = items
            .into_iter()
            .fold((Self::default(), 0usize), |(sum, n), m| (sum.add(*m), n + 1));
        (count > 0).then(|| sum.scale(1.0 / count as f64))
    }

    /// Last year's value per component when positive, else the forecast, then uplifted.
    fn target(forecast: Self, last_year: Option<Self>) -> Self {
        let pick = |ly: Option<f64>, fc: f64| match ly {
            Some(value) if value > 0.0 => value * TARGET_UPLIFT,
            _ => fc * TARGET_UPLIFT,
        };
        Self {
            gross: pick(last_year.map(|m| m.gross), forecast.gross),
            income: pick(last_year.map(|m| m.income), forecast.income),
            pax: pick(last_year.map(|m| m.pax), forecast.pax),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct HistoryMonth {
    won: Measures,
    open_income: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PeriodForecast {
    forecast: Measures,
    target: Measures,
}

/// Seasonal forecast and growth target per forecast period.
///
/// Every period is modelled; without history the averages are zero.
fn historical_forecast_model(
    history: &[Row],
    close_ratio: f64,
    periods: &[NaiveDate],
) -> HashMap<NaiveDate, PeriodForecast> {
    let mut monthly: BTreeMap<NaiveDate, HistoryMonth> = BTreeMap::new();
    for row in history {
        let Some(period) = row.opt_date("period_start") else {
            continue;
        };
        let bucket = pipeline_bucket(row);
        let month = monthly.entry(period).or_default();
        if bucket == "closed_won" {
            month.won = month.won.add(Measures::from_row(row));
        } else if is_open(&bucket) {
            month.open_income += row.f64_or_zero("commission_income_amount");
        }
    }
    let ordered: Vec<(&NaiveDate, &HistoryMonth)> = monthly.iter().collect();
    let trailing = &ordered[ordered.len().saturating_sub(12)..];
    let trailing_avg = Measures::mean(trailing.iter().map(|(_, m)| &m.won)).unwrap_or_default();

    let historical_ratios: Vec<f64> = trailing
        .iter()
        .filter(|(_, m)| m.won.income + m.open_income > 0.0)
        .map(|(_, m)| m.won.income / (m.won.income + m.open_income))
        .collect();
    let avg_historical_close = if historical_ratios.is_empty() {
        close_ratio
    } else {
        historical_ratios.iter().sum::<f64>() / historical_ratios.len() as f64
    };
    let close_factor = if avg_historical_close > 0.0 {
        (close_ratio / avg_historical_close).clamp(0.8, 1.2)
    } else {
        1.0
    };

    let mut seasonal: HashMap<u32, Vec<Measures>> = HashMap::new();
    for (period, month) in &ordered[ordered.len().saturating_sub(24)..] {
        seasonal.entry(period.month()).or_default().push(month.won);
    }

    periods
        .iter()
        .map(|period| {
            let seasonal_avg = seasonal
                .get(&period.month())
                .and_then(|samples| Measures::mean(samples))
                .unwrap_or(trailing_avg);
            let forecast = seasonal_avg
                .scale(0.7)
                .add(trailing_avg.scale(0.3))
                .scale(close_factor);
            let last_year = NaiveDate::from_ymd_opt(period.year() - 1, period.month(), 1)
                .and_then(|key| monthly.get(&key))
                .map(|m| m.won);
            let target = Measures::target(forecast, last_year);
            (*period, PeriodForecast { forecast, target })
        })
        .collect()
}

#[derive(Debug, Default)]
struct OutlookBucket {
    on_books: Measures,
    potential_raw: Measures,
    potential_weighted: Measures,
}

fn build_outlook_timeline(rows: &[Row], close_ratio: f64, history: &[Row]) -> Vec<OutlookPoint> {
    let mut by_period: BTreeMap<(NaiveDate, NaiveDate), OutlookBucket> = BTreeMap::new();
    for row in rows {
        let Some(start) = row.opt_date("period_start") else {
            continue;
        };
        let end = row.opt_date("period_end").unwrap_or(start);
        let measures = Measures::from_row(row);
        let bucket = pipeline_bucket(row);
        let entry = by_period.entry((start, end)).or_default();
        if bucket == "closed_won" {
            entry.on_books = entry.on_books.add(measures);
        } else if is_open(&bucket) {
            entry.potential_raw = entry.potential_raw.add(measures);
            entry.potential_weighted = entry.potential_weighted.add(measures.scale(close_ratio));
        }
    }

    let periods: Vec<NaiveDate> = by_period.keys().map(|(start, _)| *start).collect();
    let model = historical_forecast_model(history, close_ratio, &periods);

    by_period
        .into_iter()
        .map(|((period_start, period_end), values)| {
            let expected = values.on_books.add(values.potential_weighted);
            let margin = expected.gross - expected.income;
            let (forecast, target) = match model.get(&period_start) {
                Some(m) => (m.forecast, m.target),
                None => (expected, expected.scale(TARGET_UPLIFT)),
            };
            OutlookPoint {
                period_start,
                period_end,
                on_books_gross_amount: values.on_books.gross,
                potential_gross_amount: values.potential_raw.gross,
                expected_gross_amount: expected.gross,
                on_books_commission_income_amount: values.on_books.income,
                potential_commission_income_amount: values.potential_raw.income,
                expected_commission_income_amount: expected.income,
                on_books_pax_count: values.on_books.pax.round() as i64,
                potential_pax_count: values.potential_raw.pax,
                expected_pax_count: expected.pax,
                expected_margin_amount: margin,
                expected_margin_pct: ratio(margin, expected.gross),
                forecast_gross_amount: forecast.gross,
                target_gross_amount: target.gross,
                forecast_commission_income_amount: forecast.income,
                target_commission_income_amount: target.income,
                forecast_pax_count: forecast.pax,
                target_pax_count: target.pax,
            }
        })
        .collect()
}

#[derive(Debug, Default)]
struct ConversionBucket {
    period_end: Option<NaiveDate>,
    quoted: f64,
    confirmed: f64,
    quoted_gross: f64,
    confirmed_gross: f64,
}

/// Channel rollup keyed by `label_key`, top entries by gross.
fn rollup_channels(rows: &[Row], label_key: &str) -> Vec<ChannelPoint> {
    let mut order: Vec<String> = Vec::new();
    let mut rollup: HashMap<String, ChannelPoint> = HashMap::new();
    for row in rows {
        let label = row
            .opt_text(label_key)
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "Unassigned".to_string());
        let gross = row.f64_or_zero("gross_amount");
        let margin = row
            .opt_f64("margin_amount")
            .unwrap_or_else(|| gross - row.f64_or_zero("net_amount"));
        let point = rollup.entry(label.clone()).or_insert_with(|| {
            order.push(label.clone());
            ChannelPoint {
                label,
                ..ChannelPoint::default()
            }
        });
        point.itinerary_count += row.i64_or_zero("itinerary_count");
        point.pax_count += row.i64_or_zero("pax_count");
        point.gross_amount += gross;
        point.commission_income_amount += row.f64_or_zero("commission_income_amount");
        point.margin_amount += margin;
        point.trade_commission_amount += row.f64_or_zero("trade_commission_amount");
    }
    let mut points: Vec<ChannelPoint> = order
        .into_iter()
        .filter_map(|label| rollup.remove(&label))
        .collect();
    points.sort_by(|a, b| {
        b.gross_amount
            .partial_cmp(&a.gross_amount)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    points.truncate(CHANNEL_LIMIT);
    points
}

#[derive(Debug, Clone, Copy, Default)]
struct ActualsAccumulator {
    itinerary_count: f64,
    pax_count: f64,
    gross: f64,
    income: f64,
    margin: f64,
    trade_commission: f64,
    days_weighted: f64,
    nights_weighted: f64,
}

impl ActualsAccumulator {
    fn absorb(&mut self, other: &Self) {
        self.itinerary_count += other.itinerary_count;
        self.pax_count += other.pax_count;
        self.gross += other.gross;
        self.income += other.income;
        self.margin += other.margin;
        self.trade_commission += other.trade_commission;
        self.days_weighted += other.days_weighted;
        self.nights_weighted += other.nights_weighted;
    }

    fn figures(&self) -> ActualsFigures {
        ActualsFigures {
            itinerary_count: self.itinerary_count.round() as i64,
            pax_count: self.pax_count.round() as i64,
            gross_amount: self.gross,
            commission_income_amount: self.income,
            margin_amount: self.margin,
            trade_commission_amount: self.trade_commission,
            margin_pct: ratio(self.margin, self.gross),
            avg_gross_per_itinerary: ratio(self.gross, self.itinerary_count),
            avg_commission_income_per_itinerary: ratio(self.income, self.itinerary_count),
            avg_gross_per_pax: ratio(self.gross, self.pax_count),
            avg_commission_income_per_pax: ratio(self.income, self.pax_count),
            avg_number_of_days: ratio(self.days_weighted, self.itinerary_count),
            avg_number_of_nights: ratio(self.nights_weighted, self.itinerary_count),
        }
    }
}

fn build_actuals_yoy(
    rows: &[Row],
    consortia_rows: &[Row],
    first_year: i32,
    current_year: i32,
) -> ActualsYoyResponse {
    let mut by_period: HashMap<(i32, u32), ActualsAccumulator> = HashMap::new();
    for row in rows {
        let Some(period) = row.opt_date("period_start") else {
            continue;
        };
        let itineraries = row.f64_or_zero("itinerary_count");
        let gross = row.f64_or_zero("gross_amount");
        let income = row.f64_or_zero("commission_income_amount");
        let margin = row
            .opt_f64("margin_amount")
            .filter(|m| *m != 0.0)
            .unwrap_or(gross - income);
        by_period
            .entry((period.year(), period.month()))
            .or_default()
            .absorb(&ActualsAccumulator {
                itinerary_count: itineraries,
                pax_count: row.f64_or_zero("pax_count"),
                gross,
                income,
                margin,
                trade_commission: row.f64_or_zero("trade_commission_amount"),
                days_weighted: row.f64_or_zero("avg_number_of_days") * itineraries,
                nights_weighted: row.f64_or_zero("avg_number_of_nights") * itineraries,
            });
    }

    let years: Vec<i32> = (first_year..=current_year).collect();
    let month_values = |year: i32, month: u32| by_period.get(&(year, month)).copied().unwrap_or_default();

    let mut timeline = Vec::with_capacity(years.len() * 12);
    let mut year_summaries = Vec::with_capacity(years.len());
    for &year in &years {
        let mut totals = ActualsAccumulator::default();
        for month in 1..=12 {
            totals.absorb(&month_values(year, month));
        }
        for month in 1..=12u32 {
            let values = month_values(year, month);
            timeline.push(ActualsMonthPoint {
                year,
                month,
                month_label: MONTH_LABELS[(month - 1) as usize].to_string(),
                figures: values.figures(),
                gross_share_of_year_pct: ratio(values.gross, totals.gross),
                itinerary_share_of_year_pct: ratio(values.itinerary_count, totals.itinerary_count),
            });
        }
        year_summaries.push(ActualsYearSummary {
            year,
            figures: totals.figures(),
        });
    }

    ActualsYoyResponse {
        years,
        timeline,
        year_summaries,
        trade_vs_direct: build_trade_vs_direct(consortia_rows, first_year, current_year),
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ChannelSide {
    itineraries: f64,
    pax: f64,
    gross: f64,
    income: f64,
    margin: f64,
}

fn is_direct_consortia(value: &str) -> bool {
    DIRECT_CONSORTIA.contains(&value.trim().to_lowercase().as_str())
}

fn build_trade_vs_direct(rows: &[Row], first_year: i32, current_year: i32) -> TradeDirectBreakdown {
    // [direct, trade]
    let mut by_period: HashMap<NaiveDate, (Option<NaiveDate>, [ChannelSide; 2])> = HashMap::new();
    for row in rows {
        let Some(start) = row.opt_date("period_start") else {
            continue;
        };
        let entry = by_period.entry(start).or_default();
        if let Some(end) = row.opt_date("period_end") {
            entry.0 = Some(end);
        }
        let side = &mut entry.1[usize::from(!is_direct_consortia(&row.text("consortia")))];
        side.itineraries += row.f64_or_zero("itinerary_count");
        side.pax += row.f64_or_zero("pax_count");
        side.gross += row.f64_or_zero("gross_amount");
        side.income += row.f64_or_zero("commission_income_amount");
        side.margin += row.f64_or_zero("margin_amount");
    }

    let mut timeline = Vec::new();
    let mut totals = TradeDirectFigures::default();
    for year in first_year..=current_year {
        for month in 1..=12 {
            let Some(period_start) = NaiveDate::from_ymd_opt(year, month, 1) else {
                continue;
            };
            let (end, [direct, trade]) = by_period.get(&period_start).copied().unwrap_or_default();
            let figures = TradeDirectFigures {
                direct_itinerary_count: direct.itineraries.round() as i64,
                trade_itinerary_count: trade.itineraries.round() as i64,
                direct_pax_count: direct.pax.round() as i64,
                trade_pax_count: trade.pax.round() as i64,
                direct_gross_amount: direct.gross,
                trade_gross_amount: trade.gross,
                direct_commission_income_amount: direct.income,
                trade_commission_income_amount: trade.income,
                direct_margin_amount: direct.margin,
                trade_margin_amount: trade.margin,
            };
            totals.direct_itinerary_count += figures.direct_itinerary_count;
            totals.trade_itinerary_count += figures.trade_itinerary_count;
            totals.direct_pax_count += figures.direct_pax_count;
            totals.trade_pax_count += figures.trade_pax_count;
            totals.direct_gross_amount += figures.direct_gross_amount;
            totals.trade_gross_amount += figures.trade_gross_amount;
            totals.direct_commission_income_amount += figures.direct_commission_income_amount;
            totals.trade_commission_income_amount += figures.trade_commission_income_amount;
            totals.direct_margin_amount += figures.direct_margin_amount;
            totals.trade_margin_amount += figures.trade_margin_amount;
            timeline.push(TradeDirectMonthPoint {
                period_start,
                period_end: end.unwrap_or_else(|| month_end(period_start)),
                figures,
            });
        }
    }
    TradeDirectBreakdown { timeline, totals }
}

#[derive(Clone)]
pub struct ItineraryRevenueService {
    repository: ItineraryRevenueRepository,
}

impl ItineraryRevenueService {
    pub fn new(repository: ItineraryRevenueRepository) -> Self {
        Self { repository }
    }

    async fn lookback(&self, today: NaiveDate) -> Result<(Vec<PipelineStageRow>, Vec<Row>)> {
        let (start, end) = parse_time_window_at(LOOKBACK_WINDOW, today)?;
        let stages = self.repository.list_stage_trends(start, end).await?;
        let revenue = self
            .repository
            .list_revenue_outlook(start, end, Grain::Monthly)
            .await?;
        Ok((stages, revenue))
    }

    pub async fn get_outlook(&self, time_window: &str, grain: Grain) -> Result<OutlookResponse> {
        self.get_outlook_at(time_window, grain, today()).await
    }

    #[instrument(skip(self))]
    pub async fn get_outlook_at(
        &self,
        time_window: &str,
        grain: Grain,
        today: NaiveDate,
    ) -> Result<OutlookResponse> {
        let (start, end) = parse_forward_time_window_at(time_window, today)?;
        let rows = self.repository.list_revenue_outlook(start, end, grain).await?;
        let (stages, lookback_revenue) = self.lookback(today).await?;
        let close_ratio = blended_close_ratio(&stages, &lookback_revenue);
        let history = self
            .repository
            .list_revenue_outlook(
                start - Duration::days(HISTORY_DAYS),
                start - Duration::days(1),
                Grain::Monthly,
            )
            .await?;
        debug!(
            rows = rows.len(),
            history = history.len(),
            close_ratio,
            "building revenue outlook"
        );
        let timeline = build_outlook_timeline(&rows, close_ratio, &history);
        Ok(OutlookResponse {
            summary: OutlookSummary::from_timeline(&timeline),
            timeline,
            close_ratio,
        })
    }

    /// Deposit collection is trailing behavior, so this window looks back.
    pub async fn get_deposits(&self, time_window: &str) -> Result<DepositsResponse> {
        self.get_deposits_at(time_window, today()).await
    }

    pub async fn get_deposits_at(&self, time_window: &str, today: NaiveDate) -> Result<DepositsResponse> {
        let (start, end) = parse_time_window_at(time_window, today)?;
        Ok(DepositsResponse {
            timeline: self.repository.list_deposit_trends(start, end).await?,
        })
    }

    pub async fn get_conversion(&self, time_window: &str) -> Result<ConversionResponse> {
        self.get_conversion_at(time_window, today()).await
    }

    #[instrument(skip(self))]
    pub async fn get_conversion_at(
        &self,
        time_window: &str,
        today: NaiveDate,
    ) -> Result<ConversionResponse> {
        let (start, end) = parse_forward_time_window_at(time_window, today)?;
        let forward = self.repository.list_stage_trends(start, end).await?;
        let (stages, lookback_revenue) = self.lookback(today).await?;
        let base = blended_close_ratio(&stages, &lookback_revenue);
        let (expected, best, worst) = close_ratio_scenarios(&stages, base);
        let income_yield = commission_income_yield(&lookback_revenue);

        let mut by_period: BTreeMap<NaiveDate, ConversionBucket> = BTreeMap::new();
        for row in &forward {
            let Some(period) = row.period_start else {
                continue;
            };
            let bucket = by_period.entry(period).or_default();
            bucket.period_end = row.period_end.or(bucket.period_end);
            if row.is_quoted() {
                bucket.quoted += row.itinerary_count;
                bucket.quoted_gross += row.gross_amount;
            } else if row.is_confirmed() {
                bucket.confirmed += row.itinerary_count;
                bucket.confirmed_gross += row.gross_amount;
            }
        }

        let timeline = by_period
            .into_iter()
            .map(|(period_start, v)| {
                let quoted = v.quoted as i64;
                let confirmed = v.confirmed as i64;
                let projected = |r: f64| round_to((v.confirmed_gross + v.quoted_gross * r) * income_yield, 2);
                ConversionPoint {
                    period_start,
                    period_end: v.period_end.unwrap_or_else(|| month_end(period_start)),
                    quoted_count: quoted,
                    confirmed_count: confirmed,
                    close_ratio: round_to(ratio(confirmed as f64, (quoted + confirmed) as f64), 4),
                    projected_confirmed_count: round_to(quoted as f64 * expected, 2),
                    projected_commission_income_expected: projected(expected),
                    projected_commission_income_best_case: projected(best),
                    projected_commission_income_worst_case: projected(worst),
                }
            })
            .collect();
        Ok(ConversionResponse {
            timeline,
            lookback_close_ratio: expected,
        })
    }

    pub async fn get_channels(&self, time_window: &str) -> Result<ChannelsResponse> {
        self.get_channels_at(time_window, today()).await
    }

    pub async fn get_channels_at(&self, time_window: &str, today: NaiveDate) -> Result<ChannelsResponse> {
        let (start, end) = parse_forward_time_window_at(time_window, today)?;
        let consortia = self.repository.list_consortia_channels(start, end).await?;
        let agencies = self.repository.list_trade_agency_channels(start, end).await?;
        Ok(ChannelsResponse {
            top_consortia: rollup_channels(&consortia, "consortia"),
            top_trade_agencies: rollup_channels(&agencies, "agency_name"),
        })
    }

    pub async fn get_actuals_yoy(&self, years_back: i32) -> Result<ActualsYoyResponse> {
        self.get_actuals_yoy_at(years_back, today()).await
    }

    #[instrument(skip(self))]
    pub async fn get_actuals_yoy_at(&self, years_back: i32, today: NaiveDate) -> Result<ActualsYoyResponse> {
        let current_year = today.year();
        let first_year = current_year - years_back + 1;
        let (start, end) = actuals_bounds(first_year, current_year);
        let rows = self.repository.list_actuals_yoy(start, end).await?;
        let consortia = self.repository.list_actuals_consortia_channels(start, end).await?;
        Ok(build_actuals_yoy(&rows, &consortia, first_year, current_year))
    }

    pub async fn get_actuals_channels(
        &self,
        years_back: i32,
        actuals_year: Option<i32>,
    ) -> Result<ChannelsResponse> {
        self.get_actuals_channels_at(years_back, actuals_year, today()).await
    }

    pub async fn get_actuals_channels_at(
        &self,
        years_back: i32,
        actuals_year: Option<i32>,
        today: NaiveDate,
    ) -> Result<ChannelsResponse> {
        let (start, end) = match actuals_year {
            Some(year) => actuals_bounds(year, year),
            None => actuals_bounds(today.year() - years_back + 1, today.year()),
        };
        let consortia = self.repository.list_actuals_consortia_channels(start, end).await?;
        let agencies = self.repository.list_actuals_trade_agency_channels(start, end).await?;
        Ok(ChannelsResponse {
            top_consortia: rollup_channels(&consortia, "consortia"),
            top_trade_agencies: rollup_channels(&agencies, "agency_name"),
        })
    }
}

fn actuals_bounds(first_year: i32, last_year: i32) -> (NaiveDate, NaiveDate) {
    (
        common::time::year_bounds(first_year).0,
        common::time::year_bounds(last_year).1,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowstore_client::MemoryStore;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => Row::new(),
        }
    }

    fn stage(period: &str, stage: &str, count: f64, gross: f64) -> PipelineStageRow {
        PipelineStageRow {
            period_start: Some(NaiveDate::parse_from_str(period, "%Y-%m-%d").expect("date")),
            period_end: None,
            stage: stage.to_string(),
            itinerary_count: count,
            gross_amount: gross,
            net_amount: 0.0,
            pax_count: 0.0,
        }
    }

    fn service(store: MemoryStore) -> ItineraryRevenueService {
        ItineraryRevenueService::new(ItineraryRevenueRepository::new(Arc::new(store)))
    }

    #[test]
    fn test_close_ratio_blend_and_bounds() {
        let stages = vec![stage("2026-01-01", "Quoted", 6.0, 0.0), stage("2026-01-01", "Traveled", 2.0, 0.0)];
        let revenue = vec![
            row(json!({"pipeline_bucket": "closed_won", "itinerary_count": 3})),
            row(json!({"pipeline_bucket": "HOLDING", "itinerary_count": 1})),
        ];
        // 0.25 stage, 0.75 bucket
        assert_eq!(blended_close_ratio(&stages, &revenue), 0.5);
        assert_eq!(blended_close_ratio(&stages, &[]), 0.25);
        assert_eq!(blended_close_ratio(&[], &[]), 0.1);
        let all_won = vec![row(json!({"pipeline_bucket": "closed_won", "itinerary_count": 9}))];
        assert_eq!(blended_close_ratio(&[], &all_won), 0.9);
    }

    #[test]
    fn test_scenarios_use_quartiles_around_base() {
        let stages = vec![
            stage("2026-01-01", "Quoted", 3.0, 0.0),
            stage("2026-01-01", "Confirmed", 1.0, 0.0),
            stage("2026-02-01", "Quoted", 1.0, 0.0),
            stage("2026-02-01", "Traveling", 1.0, 0.0),
            stage("2026-03-01", "Quoted", 1.0, 0.0),
            stage("2026-03-01", "Traveled", 3.0, 0.0),
        ];
        let (expected, best, worst) = close_ratio_scenarios(&stages, 0.5);
        assert_eq!(expected, 0.5);
        assert_eq!(best, 0.5);
        assert_eq!(worst, 0.25);
        assert_eq!(close_ratio_scenarios(&[], 0.4), (0.4, 0.4, 0.4));
    }

    #[test]
    fn test_channel_rollup_orders_by_gross_and_defaults_label() {
        let rows = vec![
            row(json!({"consortia": "Virtuoso", "gross_amount": 100, "net_amount": 70, "itinerary_count": 1})),
            row(json!({"consortia": null, "gross_amount": 400, "margin_amount": 50})),
            row(json!({"consortia": "Virtuoso", "gross_amount": 350, "margin_amount": 20, "itinerary_count": 2})),
        ];
        let points = rollup_channels(&rows, "consortia");
        assert_eq!(points[0].label, "Virtuoso");
        assert_eq!(points[0].gross_amount, 450.0);
        assert_eq!(points[0].margin_amount, 50.0);
        assert_eq!(points[0].itinerary_count, 3);
        assert_eq!(points[1].label, "Unassigned");
    }

    #[test]
    fn test_direct_consortia_values() {
        assert!(is_direct_consortia(" N/A "));
        assert!(is_direct_consortia("Not Applicable"));
        assert!(is_direct_consortia("not_applicable"));
        assert!(!is_direct_consortia("Virtuoso"));
        assert!(!is_direct_consortia(""));
    }

    #[tokio::test]
    async fn test_outlook_blends_pipeline_and_history() {
        let store = MemoryStore::new().with_rows(
            "mv_itinerary_revenue_monthly",
            [
                json!({"period_start": "2026-03-01", "period_end": "2026-03-31", "pipeline_bucket": "closed_won",
                       "itinerary_count": 3, "gross_amount": 1000, "commission_income_amount": 200, "pax_count": 4}),
                json!({"period_start": "2026-03-01", "period_end": "2026-03-31", "pipeline_bucket": "open",
                       "itinerary_count": 1, "gross_amount": 500, "commission_income_amount": 100, "pax_count": 2}),
                json!({"period_start": "2026-04-01", "period_end": "2026-04-30", "pipeline_bucket": "closed_won",
                       "gross_amount": 800, "commission_income_amount": 160, "pax_count": 2}),
                json!({"period_start": "2025-03-01", "period_end": "2025-03-31", "pipeline_bucket": "closed_won",
                       "gross_amount": 900, "commission_income_amount": 180, "pax_count": 3}),
                json!({"period_start": "2025-03-01", "period_end": "2025-03-31", "pipeline_bucket": "open",
                       "commission_income_amount": 60}),
            ],
        );
        let outlook = service(store)
            .get_outlook_at("3m", Grain::Monthly, ymd(2026, 3, 15))
            .await
            .expect("outlook");

        assert_eq!(outlook.close_ratio, 0.75);
        assert_eq!(outlook.timeline.len(), 2);
        let march = &outlook.timeline[0];
        assert_eq!(march.expected_gross_amount, 1375.0);
        assert_eq!(march.expected_commission_income_amount, 275.0);
        assert_eq!(march.expected_margin_pct, 0.8);
        assert_eq!(march.on_books_pax_count, 4);
        assert_eq!(march.expected_pax_count, 5.5);
        assert!((march.forecast_gross_amount - 900.0).abs() < 1e-9);
        assert!((march.target_gross_amount - 1008.0).abs() < 1e-9);

        let april = &outlook.timeline[1];
        assert!((april.forecast_gross_amount - 900.0).abs() < 1e-9);
        assert!((april.target_gross_amount - 1008.0).abs() < 1e-9);
        assert_eq!(outlook.summary.total_expected_gross_amount, 2175.0);
    }

    #[tokio::test]
    async fn test_outlook_without_history_forecasts_zero() {
        let store = MemoryStore::new().with_rows(
            "mv_itinerary_revenue_monthly",
            [json!({"period_start": "2026-03-01", "period_end": "2026-03-31", "pipeline_bucket": "closed_won",
                    "itinerary_count": 1, "gross_amount": 1000})],
        );
        let outlook = service(store)
            .get_outlook_at("1m", Grain::Monthly, ymd(2026, 3, 15))
            .await
            .expect("outlook");
        let point = &outlook.timeline[0];
        assert_eq!(point.expected_gross_amount, 1000.0);
        assert_eq!(point.forecast_gross_amount, 0.0);
        assert_eq!(point.target_gross_amount, 0.0);
        assert_eq!(point.forecast_commission_income_amount, 0.0);
        assert_eq!(point.target_pax_count, 0.0);
    }

    #[tokio::test]
    async fn test_conversion_projects_income_scenarios() {
        let store = MemoryStore::new()
            .with_rows(
                "mv_itinerary_pipeline_stages",
                [
                    json!({"period_start": "2026-02-01", "period_end": "2026-02-28", "stage": "Quoted", "itinerary_count": 3}),
                    json!({"period_start": "2026-02-01", "period_end": "2026-02-28", "stage": "Traveled", "itinerary_count": 1}),
                    json!({"period_start": "2026-03-01", "period_end": "2026-03-31", "stage": "Quoted",
                           "itinerary_count": 2, "gross_amount": 1000}),
                    json!({"period_start": "2026-03-01", "period_end": "2026-03-31", "stage": "Confirmed",
                           "itinerary_count": 2, "gross_amount": 3000}),
                ],
            )
            .with_rows(
                "mv_itinerary_revenue_monthly",
                [json!({"period_start": "2026-01-01", "pipeline_bucket": "closed_won", "itinerary_count": 1,
                        "gross_amount": 1000, "commission_income_amount": 200})],
            );
        let conversion = service(store)
            .get_conversion_at("3m", ymd(2026, 3, 15))
            .await
            .expect("conversion");

        assert_eq!(conversion.lookback_close_ratio, 0.6875);
        assert_eq!(conversion.timeline.len(), 1);
        let march = &conversion.timeline[0];
        assert_eq!(march.period_end, ymd(2026, 3, 31));
        assert_eq!(march.close_ratio, 0.5);
        assert_eq!(march.projected_confirmed_count, 1.38);
        assert_eq!(march.projected_commission_income_expected, 737.5);
        assert_eq!(march.projected_commission_income_worst_case, 650.0);
    }

    #[tokio::test]
    async fn test_actuals_yoy_buckets_and_trade_split() {
        let store = MemoryStore::new()
            .with_rows(
                "mv_itinerary_revenue_monthly",
                [
                    json!({"period_start": "2025-01-01", "pipeline_bucket": "closed_won", "itinerary_count": 2,
                           "pax_count": 4, "gross_amount": 1000, "commission_income_amount": 200,
                           "margin_amount": null, "avg_number_of_days": 10}),
                    json!({"period_start": "2025-02-01", "pipeline_bucket": "closed_won", "itinerary_count": 2,
                           "gross_amount": 3000, "commission_income_amount": 600, "margin_amount": 2000}),
                ],
            )
            .with_rows(
                "mv_itinerary_consortia_actuals_monthly",
                [
                    json!({"period_start": "2025-01-01", "period_end": "2025-01-31", "consortia": "N/A",
                           "itinerary_count": 1, "gross_amount": 1000}),
                    json!({"period_start": "2025-01-01", "period_end": "2025-01-31", "consortia": "Virtuoso",
                           "itinerary_count": 1, "gross_amount": 500}),
                ],
            );
        let actuals = service(store)
            .get_actuals_yoy_at(2, ymd(2026, 3, 15))
            .await
            .expect("actuals");

        assert_eq!(actuals.years, vec![2025, 2026]);
        assert_eq!(actuals.timeline.len(), 24);
        let january = &actuals.timeline[0];
        assert_eq!(january.month_label, "Jan");
        assert_eq!(january.figures.margin_amount, 800.0);
        assert_eq!(january.figures.avg_number_of_days, 10.0);
        assert_eq!(january.figures.avg_gross_per_pax, 250.0);
        assert_eq!(january.gross_share_of_year_pct, 0.25);
        assert_eq!(january.itinerary_share_of_year_pct, 0.5);

        let summary_2025 = &actuals.year_summaries[0];
        assert_eq!(summary_2025.figures.gross_amount, 4000.0);
        assert_eq!(summary_2025.figures.avg_number_of_days, 5.0);
        assert_eq!(actuals.year_summaries[1].figures.gross_amount, 0.0);

        let split = &actuals.trade_vs_direct;
        assert_eq!(split.timeline.len(), 24);
        assert_eq!(split.timeline[0].figures.direct_gross_amount, 1000.0);
        assert_eq!(split.timeline[0].figures.trade_gross_amount, 500.0);
        assert_eq!(split.timeline[1].period_end, ymd(2025, 2, 28));
        assert_eq!(split.totals.trade_itinerary_count, 1);
    }

    #[tokio::test]
    async fn test_actuals_channels_for_single_year() {
        let store = MemoryStore::new().with_rows(
            "mv_itinerary_trade_agency_actuals_monthly",
            [
                json!({"period_start": "2024-05-01", "agency_name": "Old Co", "gross_amount": 900}),
                json!({"period_start": "2025-05-01", "agency_name": "Wander Co", "gross_amount": 300,
                       "net_amount": 200}),
            ],
        );
        let channels = service(store)
            .get_actuals_channels_at(2, Some(2025), ymd(2026, 3, 15))
            .await
            .expect("channels");
        assert_eq!(channels.top_trade_agencies.len(), 1);
        assert_eq!(channels.top_trade_agencies[0].label, "Wander Co");
        assert_eq!(channels.top_trade_agencies[0].margin_amount, 100.0);
        assert!(channels.top_consortia.is_empty());
    }
}
