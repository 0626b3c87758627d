//! Consultant leaderboard, profile and forecast assembly.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use common::row::{round_to, Row, RowExt};
use common::time::{add_months, month_end, month_start, today, year_bounds, MONTH_LABELS};
use common::{Error, Result};

use super::repository::TravelConsultantsRepository;
use super::types::{
    CompensationImpact, ComparisonContext, ConsultantIdentity, ForecastFilters, ForecastPoint,
    ForecastResponse, ForecastSection, ForecastSummary, FunnelHealth, Highlight, InsightCard,
    KpiCard, LeaderboardDomain, LeaderboardFilters, LeaderboardResponse, LeaderboardRow,
    OperationalItinerary, OperationalSnapshot, PeriodType, ProfileFilters, ProfileResponse, Signal,
    SortBy, SortOrder, ThreeYearMatrix, ThreeYearPerformance, ThreeYearSeries, ThreeYearVariance,
    TrendStory, TrendStoryPoint, YoyMode,
};

pub const GROWTH_TARGET: f64 = 1.12;
const DEFAULT_COMMISSION_RATE: f64 = 0.15;

pub const SECTION_ORDER: [&str; 8] = [
    "heroKpis",
    "trendStory",
    "funnelHealth",
    "operationalSnapshot",
    "forecastAndTarget",
    "compensationImpact",
    "signals",
    "insightCards",
];

/// Resolve the reporting window for a period type relative to `today`.
pub fn resolve_period_window(
    period_type: PeriodType,
    year: Option<i32>,
    month: Option<u32>,
    today: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    match period_type {
        PeriodType::Rolling12 => {
            let current = month_start(today);
            (add_months(current, -11), month_end(current))
        }
        PeriodType::Year => year_bounds(year.unwrap_or(today.year())),
        PeriodType::Monthly => {
            let start = NaiveDate::from_ymd_opt(
                year.unwrap_or(today.year()),
                month.unwrap_or(today.month()),
                1,
            )
            .unwrap_or_else(|| month_start(today));
            (start, month_end(start))
        }
    }
}

fn resolve_baseline_window(
    period_type: PeriodType,
    start: NaiveDate,
    end: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    match period_type {
        PeriodType::Rolling12 => (add_months(start, -12), add_months(end, -12)),
        PeriodType::Year => year_bounds(start.year() - 1),
        PeriodType::Monthly => (add_months(start, -12), same_day_last_year(end)),
    }
}

/// Jan through the current month for this year, Jan through Dec otherwise.
fn resolve_ytd_windows(
    selected_year: Option<i32>,
    today: NaiveDate,
) -> ((NaiveDate, NaiveDate), (NaiveDate, NaiveDate)) {
    let year = selected_year.unwrap_or(today.year());
    let ytd_month = if year == today.year() { today.month() } else { 12 };
    let window = |y: i32| {
        let start = NaiveDate::from_ymd_opt(y, 1, 1).unwrap_or(NaiveDate::MIN);
        let last = NaiveDate::from_ymd_opt(y, ytd_month, 1).unwrap_or(start);
        (start, month_end(last))
    };
    (window(year), window(year - 1))
}

fn same_day_last_year(value: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(value.year() - 1, value.month(), value.day())
        .unwrap_or_else(|| month_end(add_months(value, -12)))
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn sum_by_employee(rows: &[Row], column: &str) -> HashMap<String, f64> {
    let mut totals = HashMap::new();
    for row in rows {
        let employee_id = row.text("employee_id");
        if employee_id.is_empty() {
            continue;
        }
        *totals.entry(employee_id).or_insert(0.0) += row.f64_or_zero(column);
    }
    totals
}

fn sum_by_month(rows: &[Row]) -> HashMap<u32, f64> {
    let mut totals = HashMap::new();
    for row in rows {
        if let Some(period) = row.opt_date("period_start") {
            *totals.entry(period.month()).or_insert(0.0) += row.f64_or_zero("booked_revenue_amount");
        }
    }
    totals
}

fn sum_column(rows: &[Row], column: &str) -> f64 {
    rows.iter().map(|row| row.f64_or_zero(column)).sum()
}

fn sum_count(rows: &[Row], column: &str) -> i64 {
    rows.iter().map(|row| row.i64_or_zero(column)).sum()
}

fn trend(up: bool) -> String {
    let direction = if up { "up" } else { "down" };
    direction.to_string()
}

fn created_date(row: &Row) -> Option<NaiveDate> {
    row.opt_datetime("created_at")
        .map(|ts: DateTime<Utc>| ts.date_naive())
}

#[derive(Debug, Default)]
struct Bucket {
    employee_id: String,
    employee_external_id: String,
    first_name: String,
    last_name: String,
    email: String,
    itinerary_count: i64,
    pax_count: i64,
    booked_revenue_travel: f64,
    booked_revenue_funnel: f64,
    commission_income: f64,
    margin_amount: f64,
    lead_count: i64,
    closed_won_count: i64,
    closed_lost_count: i64,
    speed_samples: Vec<f64>,
}

impl Bucket {
    fn from_row(employee_id: String, row: &Row) -> Self {
        Self {
            employee_id,
            employee_external_id: row.text("employee_external_id"),
            first_name: row.text("first_name"),
            last_name: row.text("last_name"),
            email: row.text("email"),
            ..Self::default()
        }
    }

    fn conversion_rate(&self) -> f64 {
        ratio(self.closed_won_count as f64, self.lead_count as f64)
    }

    fn close_rate(&self) -> f64 {
        ratio(
            self.closed_won_count as f64,
            (self.closed_won_count + self.closed_lost_count) as f64,
        )
    }

    fn booked_revenue(&self, domain: LeaderboardDomain) -> f64 {
        match domain {
            LeaderboardDomain::Funnel => self.booked_revenue_funnel,
            LeaderboardDomain::Travel => self.booked_revenue_travel,
        }
    }

    fn margin_pct(&self) -> f64 {
        ratio(self.margin_amount, self.booked_revenue_travel)
    }

    fn avg_speed_to_book_days(&self) -> Option<f64> {
        let positive: Vec<f64> = self.speed_samples.iter().copied().filter(|v| *v > 0.0).collect();
        mean(&positive)
    }

    fn sort_value(&self, sort_by: SortBy, domain: LeaderboardDomain) -> f64 {
        match sort_by {
            SortBy::BookedRevenue => self.booked_revenue(domain),
            SortBy::ConversionRate => self.conversion_rate(),
            SortBy::CloseRate => self.close_rate(),
            SortBy::MarginPct => self.margin_pct(),
        }
    }
}

fn bucket_mut<'a>(
    order: &mut Vec<String>,
    buckets: &'a mut HashMap<String, Bucket>,
    row: &Row,
) -> Option<&'a mut Bucket> {
    let employee_id = row.text("employee_id");
    if employee_id.is_empty() {
        return None;
    }
    if !buckets.contains_key(&employee_id) {
        order.push(employee_id.clone());
    }
    Some(
        buckets
            .entry(employee_id.clone())
            .or_insert_with(|| Bucket::from_row(employee_id, row)),
    )
}

/// Per-employee buckets in first-seen order.
fn aggregate_leaderboard_rows(travel_rows: &[Row], funnel_rows: &[Row]) -> Vec<Bucket> {
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Bucket> = HashMap::new();
    for row in travel_rows {
        let Some(bucket) = bucket_mut(&mut order, &mut buckets, row) else {
            continue;
        };
        bucket.itinerary_count += row.i64_or_zero("itinerary_count");
        bucket.pax_count += row.i64_or_zero("pax_count");
        bucket.booked_revenue_travel += row.f64_or_zero("booked_revenue_amount");
        bucket.commission_income += row.f64_or_zero("commission_income_amount");
        bucket.margin_amount += row.f64_or_zero("margin_amount");
    }
    for row in funnel_rows {
        let Some(bucket) = bucket_mut(&mut order, &mut buckets, row) else {
            continue;
        };
        bucket.lead_count += row.i64_or_zero("lead_count");
        bucket.closed_won_count += row.i64_or_zero("closed_won_count");
        bucket.closed_lost_count += row.i64_or_zero("closed_lost_count");
        bucket.booked_revenue_funnel += row.f64_or_zero("booked_revenue_amount");
        if let Some(speed) = row.opt_f64("median_speed_to_book_days") {
            bucket.speed_samples.push(speed);
        }
    }
    order
        .into_iter()
        .filter_map(|id| buckets.remove(&id))
        .collect()
}

fn build_leaderboard_highlights(rankings: &[LeaderboardRow]) -> Vec<Highlight> {
    let by = |f: fn(&LeaderboardRow) -> f64| {
        move |a: &&LeaderboardRow, b: &&LeaderboardRow| {
            f(a).partial_cmp(&f(b)).unwrap_or(std::cmp::Ordering::Equal)
        }
    };
    let (Some(top_mover), Some(best_conversion), Some(margin_risk)) = (
        rankings.iter().max_by(by(|r| r.growth_target_variance_pct)),
        rankings.iter().max_by(by(|r| r.conversion_rate)),
        rankings.iter().min_by(by(|r| r.margin_pct)),
    ) else {
        return Vec::new();
    };
    let target_gap_total: f64 = rankings
        .iter()
        .map(|r| r.growth_target_variance_pct)
        .filter(|v| *v < 0.0)
        .sum();
    let pct = |v: f64| round_to(v * 100.0, 1);
    let highlight = |key: &str, title: &str, description: String, direction: &str, strength: &str| {
        Highlight {
            key: key.to_string(),
            title: title.to_string(),
            description,
            trend_direction: direction.to_string(),
            trend_strength: strength.to_string(),
        }
    };
    vec![
        highlight(
            "top_mover",
            "Top Mover",
            format!(
                "{} {} leads target pace ({}%).",
                top_mover.first_name,
                top_mover.last_name,
                pct(top_mover.growth_target_variance_pct)
            ),
            "up",
            "high",
        ),
        highlight(
            "best_conversion",
            "Best Conversion",
            format!(
                "{} {} has strongest conversion ({}%).",
                best_conversion.first_name,
                best_conversion.last_name,
                pct(best_conversion.conversion_rate)
            ),
            "up",
            "medium",
        ),
        highlight(
            "margin_risk",
            "Margin Risk",
            format!(
                "{} {} has the lowest margin ({}%).",
                margin_risk.first_name,
                margin_risk.last_name,
                pct(margin_risk.margin_pct)
            ),
            "down",
            "medium",
        ),
        highlight(
            "target_gap",
            "Team Target Gap",
            format!(
                "Combined negative target variance is {}% across lagging consultants.",
                pct(target_gap_total.abs())
            ),
            if target_gap_total < 0.0 { "down" } else { "up" },
            "medium",
        ),
    ]
}

#[allow(clippy::too_many_arguments)]
fn kpi(
    key: &str,
    display_label: &str,
    description: &str,
    value: f64,
    trend_direction: &str,
    trend_strength: &str,
    is_lagging_indicator: bool,
) -> KpiCard {
    KpiCard {
        key: key.to_string(),
        display_label: display_label.to_string(),
        description: description.to_string(),
        value,
        trend_direction: trend_direction.to_string(),
        trend_strength: trend_strength.to_string(),
        is_lagging_indicator,
    }
}

struct ProfileMetrics {
    booked_revenue: f64,
    conversion_rate: f64,
    close_rate: f64,
    margin_pct: f64,
    avg_gross_profit: f64,
    avg_itinerary_nights: f64,
    avg_group_size: f64,
    avg_lead_time_days: Option<f64>,
    avg_speed_to_close_days: Option<f64>,
    avg_speed_to_book_days: Option<f64>,
}

fn build_hero_kpis(m: &ProfileMetrics, story: &TrendStory) -> Vec<KpiCard> {
    let up_down = |up: bool| if up { "up" } else { "down" };
    let up_flat = |up: bool| if up { "up" } else { "flat" };
    let revenue_strength = if story.yoy_delta_pct.abs() >= 0.1 { "high" } else { "medium" };
    let lead_time = m.avg_lead_time_days.unwrap_or(0.0);
    let speed_to_close = m.avg_speed_to_close_days.unwrap_or(0.0);
    vec![
        kpi(
            "booked_revenue",
            "Booked Revenue",
            "Closed-won realized travel revenue for selected period.",
            round_to(m.booked_revenue, 2),
            up_down(story.yoy_delta_pct >= 0.0),
            revenue_strength,
            false,
        ),
        kpi(
            "conversion_rate",
            "Conversion Rate",
            "Closed won divided by lead count.",
            round_to(m.conversion_rate, 4),
            up_down(m.conversion_rate >= 0.35),
            "medium",
            true,
        ),
        kpi(
            "close_rate",
            "Close Rate",
            "Closed won divided by closed won plus closed lost.",
            round_to(m.close_rate, 4),
            up_down(m.close_rate >= 0.45),
            "medium",
            true,
        ),
        kpi(
            "margin_pct",
            "Margin %",
            "Margin amount divided by booked revenue.",
            round_to(m.margin_pct, 4),
            up_down(m.margin_pct >= 0.2),
            "medium",
            true,
        ),
        kpi(
            "avg_gross_profit",
            "Average Gross Profit",
            "Average gross profit per closed-won itinerary in selected period.",
            round_to(m.avg_gross_profit, 2),
            up_flat(m.avg_gross_profit > 0.0),
            "medium",
            false,
        ),
        kpi(
            "avg_itinerary_nights",
            "Average Itinerary Nights",
            "Weighted average itinerary nights for closed-won travel.",
            round_to(m.avg_itinerary_nights, 1),
            up_flat(m.avg_itinerary_nights >= 6.0),
            "low",
            false,
        ),
        kpi(
            "avg_group_size",
            "Average Group Size",
            "Average passengers per closed-won itinerary.",
            round_to(m.avg_group_size, 1),
            up_flat(m.avg_group_size >= 2.0),
            "low",
            false,
        ),
        kpi(
            "avg_lead_time",
            "Average Lead Time",
            "Average days from lead created to travel start for closed-won itineraries.",
            round_to(lead_time, 1),
            up_down(lead_time >= 30.0),
            "low",
            false,
        ),
        kpi(
            "avg_speed_to_close",
            "Average Speed to Close",
            "Average days from lead created to booking close date.",
            round_to(speed_to_close, 1),
            up_down(speed_to_close <= 45.0),
            "medium",
            true,
        ),
    ]
}

fn signal(key: &str, label: &str, description: String, up: bool, strength: &str) -> Signal {
    Signal {
        key: key.to_string(),
        display_label: label.to_string(),
        description,
        trend_direction: trend(up),
        trend_strength: strength.to_string(),
        is_lagging_indicator: true,
    }
}

fn build_signals(m: &ProfileMetrics, story: &TrendStory) -> Vec<Signal> {
    let pct = |v: f64| round_to(v * 100.0, 1);
    let mut signals = vec![
        signal(
            "growth_target",
            "12% Growth Trajectory",
            format!(
                "Current year-over-year pace is {}% against 12% target.",
                pct(story.yoy_delta_pct)
            ),
            story.yoy_delta_pct >= 0.12,
            if story.yoy_delta_pct.abs() >= 0.12 { "high" } else { "medium" },
        ),
        signal(
            "conversion_health",
            "Conversion Health",
            format!(
                "Conversion rate is {}% for selected period.",
                pct(m.conversion_rate)
            ),
            m.conversion_rate >= 0.35,
            "medium",
        ),
        signal(
            "close_rate",
            "Close Rate Stability",
            format!("Close rate is {}% for selected period.", pct(m.close_rate)),
            m.close_rate >= 0.45,
            "medium",
        ),
        signal(
            "margin_compression",
            "Margin Compression",
            format!("Margin is {}% on current revenue mix.", pct(m.margin_pct)),
            m.margin_pct >= 0.2,
            "medium",
        ),
    ];
    if let Some(days) = m.avg_speed_to_book_days {
        signals.push(signal(
            "speed_to_book",
            "Speed to Book",
            format!("Average speed to book is {} days.", round_to(days, 1)),
            days <= 45.0,
            "medium",
        ));
    }
    signals
}

fn build_insight_cards(signals: &[Signal], first_name: &str, itinerary_count: i64) -> Vec<InsightCard> {
    if signals.is_empty() {
        return Vec::new();
    }
    let mut cards = vec![InsightCard {
        title: "Performance Snapshot".to_string(),
        description: format!(
            "{first_name} handled {itinerary_count} itineraries in scope with current signal mix."
        ),
        trend_direction: "up".to_string(),
        trend_strength: "low".to_string(),
    }];
    cards.extend(signals.iter().take(3).map(|s| InsightCard {
        title: s.display_label.clone(),
        description: s.description.clone(),
        trend_direction: s.trend_direction.clone(),
        trend_strength: s.trend_strength.clone(),
    }));
    cards
}

fn build_compensation_impact(rows: &[Row]) -> CompensationImpact {
    let Some(latest) = rows.last() else {
        return CompensationImpact {
            salary_annual_amount: 0.0,
            salary_period_amount: 0.0,
            commission_rate: DEFAULT_COMMISSION_RATE,
            estimated_commission_amount: 0.0,
            estimated_total_pay_amount: 0.0,
        };
    };
    let commission_rate = latest
        .opt_f64("commission_rate")
        .filter(|rate| *rate != 0.0)
        .unwrap_or(DEFAULT_COMMISSION_RATE);
    CompensationImpact {
        salary_annual_amount: round_to(latest.f64_or_zero("salary_annual_amount"), 2),
        salary_period_amount: round_to(sum_column(rows, "salary_monthly_amount"), 2),
        commission_rate: round_to(commission_rate, 4),
        estimated_commission_amount: round_to(sum_column(rows, "estimated_commission_amount"), 2),
        estimated_total_pay_amount: round_to(sum_column(rows, "estimated_total_pay_amount"), 2),
    }
}

fn build_three_year_matrix(
    key: &str,
    title: &str,
    years: &[i32],
    values: &HashMap<(i32, u32), f64>,
) -> ThreeYearMatrix {
    let series: Vec<ThreeYearSeries> = years
        .iter()
        .map(|&year| {
            let monthly_values: Vec<f64> = (1..=12)
                .map(|month| round_to(values.get(&(year, month)).copied().unwrap_or(0.0), 2))
                .collect();
            let total = round_to(monthly_values.iter().sum(), 2);
            ThreeYearSeries {
                year,
                monthly_values,
                total,
            }
        })
        .collect();
    let variances = series
        .windows(2)
        .map(|pair| {
            let (baseline, current) = (&pair[0], &pair[1]);
            let monthly_variance_pct = current
                .monthly_values
                .iter()
                .zip(&baseline.monthly_values)
                .map(|(cur, base)| round_to(ratio(cur - base, *base), 4))
                .collect();
            ThreeYearVariance {
                label: format!("{} vs {}", current.year, baseline.year),
                monthly_variance_pct,
                total_variance_pct: round_to(
                    ratio(current.total - baseline.total, baseline.total),
                    4,
                ),
            }
        })
        .collect();
    ThreeYearMatrix {
        key: key.to_string(),
        title: title.to_string(),
        metric_label: "revenue".to_string(),
        series,
        variances,
    }
}

fn map_operational_itinerary(row: &Row) -> OperationalItinerary {
    let non_empty = |key: &str| row.opt_text(key).filter(|v| !v.is_empty());
    OperationalItinerary {
        itinerary_id: row.text("id"),
        itinerary_number: row.text("itinerary_number"),
        itinerary_name: non_empty("itinerary_name"),
        itinerary_status: row.text("itinerary_status"),
        primary_country: non_empty("primary_country"),
        travel_start_date: row.opt_date("travel_start_date"),
        travel_end_date: row.opt_date("travel_end_date"),
        gross_amount: row.f64_or_zero("gross_amount"),
        pax_count: row.i64_or_zero("pax_count"),
    }
}

#[derive(Clone)]
pub struct TravelConsultantsService {
    repository: TravelConsultantsRepository,
}

impl TravelConsultantsService {
    pub fn new(repository: TravelConsultantsRepository) -> Self {
        Self { repository }
    }

    pub async fn get_leaderboard(&self, filters: &LeaderboardFilters) -> Result<LeaderboardResponse> {
        self.get_leaderboard_at(filters, today()).await
    }

    pub async fn get_leaderboard_at(
        &self,
        filters: &LeaderboardFilters,
        today: NaiveDate,
    ) -> Result<LeaderboardResponse> {
        let (period_start, period_end) =
            resolve_period_window(filters.period_type, filters.year, filters.month, today);
        let (baseline_start, baseline_end) =
            resolve_baseline_window(filters.period_type, period_start, period_end);
        let ((ytd_start, ytd_end), (ytd_base_start, ytd_base_end)) =
            resolve_ytd_windows(filters.year, today);

        let repo = &self.repository;
        let travel_rows = repo.list_leaderboard_monthly(period_start, period_end, None).await?;
        let funnel_rows = repo.list_funnel_monthly(period_start, period_end, None).await?;
        let baseline_rows = repo
            .list_leaderboard_monthly(baseline_start, baseline_end, None)
            .await?;
        let ytd_rows = repo.list_leaderboard_monthly(ytd_start, ytd_end, None).await?;
        let ytd_baseline_rows = repo
            .list_leaderboard_monthly(ytd_base_start, ytd_base_end, None)
            .await?;

        let baseline_revenue = sum_by_employee(&baseline_rows, "booked_revenue_amount");
        let ytd_revenue = sum_by_employee(&ytd_rows, "booked_revenue_amount");
        let ytd_baseline_revenue = sum_by_employee(&ytd_baseline_rows, "booked_revenue_amount");

        let mut buckets = aggregate_leaderboard_rows(&travel_rows, &funnel_rows);
        let ids: Vec<String> = buckets.iter().map(|b| b.employee_id.clone()).collect();
        let active = repo.list_active_employee_ids(&ids).await?;
        buckets.retain(|b| active.contains(&b.employee_id));

        let domain = filters.domain;
        let sort_by = filters.sort_by;
        buckets.sort_by(|a, b| {
            let ordering = a
                .sort_value(sort_by, domain)
                .partial_cmp(&b.sort_value(sort_by, domain))
                .unwrap_or(std::cmp::Ordering::Equal);
            match filters.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let rankings: Vec<LeaderboardRow> = buckets
            .into_iter()
            .enumerate()
            .map(|(index, bucket)| {
                let booked_revenue = bucket.booked_revenue(domain);
                let baseline = baseline_revenue.get(&bucket.employee_id).copied().unwrap_or(0.0);
                let target = if baseline > 0.0 { baseline * GROWTH_TARGET } else { 0.0 };
                let ytd_current = ytd_revenue.get(&bucket.employee_id).copied().unwrap_or(0.0);
                let ytd_baseline = ytd_baseline_revenue
                    .get(&bucket.employee_id)
                    .copied()
                    .unwrap_or(0.0);
                LeaderboardRow {
                    rank: index as u32 + 1,
                    conversion_rate: bucket.conversion_rate(),
                    close_rate: bucket.close_rate(),
                    margin_pct: bucket.margin_pct(),
                    avg_speed_to_book_days: bucket.avg_speed_to_book_days(),
                    spend_to_book: None,
                    growth_target_variance_pct: round_to(ratio(booked_revenue - target, target), 4),
                    yoy_to_date_variance_pct: round_to(
                        ratio(ytd_current - ytd_baseline, ytd_baseline),
                        4,
                    ),
                    booked_revenue,
                    employee_id: bucket.employee_id,
                    employee_external_id: bucket.employee_external_id,
                    first_name: bucket.first_name,
                    last_name: bucket.last_name,
                    email: bucket.email,
                    itinerary_count: bucket.itinerary_count,
                    pax_count: bucket.pax_count,
                    commission_income: bucket.commission_income,
                    margin_amount: bucket.margin_amount,
                    lead_count: bucket.lead_count,
                    closed_won_count: bucket.closed_won_count,
                    closed_lost_count: bucket.closed_lost_count,
                }
            })
            .collect();
        debug!(
            period_type = filters.period_type.as_str(),
            consultants = rankings.len(),
            "leaderboard assembled"
        );

        Ok(LeaderboardResponse {
            period_start,
            period_end,
            period_type: filters.period_type,
            domain,
            sort_by,
            sort_order: filters.sort_order,
            highlights: build_leaderboard_highlights(&rankings),
            rankings,
        })
    }

    async fn get_employee_identity(&self, employee_id: &str) -> Result<ConsultantIdentity> {
        let row = self
            .repository
            .get_employee(employee_id)
            .await?
            .ok_or_else(|| Error::not_found("Travel consultant not found"))?;
        Ok(ConsultantIdentity {
            employee_id: row.text("id"),
            employee_external_id: row.text("external_id"),
            first_name: row.text("first_name"),
            last_name: row.text("last_name"),
            email: row.text("email"),
        })
    }

    pub async fn get_profile(&self, employee_id: &str, filters: &ProfileFilters) -> Result<ProfileResponse> {
        self.get_profile_at(employee_id, filters, today()).await
    }

    pub async fn get_profile_at(
        &self,
        employee_id: &str,
        filters: &ProfileFilters,
        today: NaiveDate,
    ) -> Result<ProfileResponse> {
        let employee = self.get_employee_identity(employee_id).await?;
        let (period_start, period_end) =
            resolve_period_window(filters.period_type, filters.year, filters.month, today);
        let repo = &self.repository;
        let id = Some(employee_id);
        let profile_rows = repo.list_profile_monthly(period_start, period_end, id).await?;
        let funnel_rows = repo.list_funnel_monthly(period_start, period_end, id).await?;
        let compensation_rows = repo
            .list_compensation_monthly(period_start, period_end, id)
            .await?;
        let closed_won_values = repo.list_closed_won_status_values().await?;
        let closed_won_itineraries = repo
            .list_closed_won_itineraries_by_travel_period(
                employee_id,
                period_start,
                period_end,
                &closed_won_values,
            )
            .await?;

        let booked_revenue = sum_column(&profile_rows, "booked_revenue_amount");
        let commission_income = sum_column(&profile_rows, "commission_income_amount");
        let margin_amount = sum_column(&profile_rows, "margin_amount");
        let itinerary_count = sum_count(&profile_rows, "itinerary_count");
        let pax_count = sum_count(&profile_rows, "pax_count");

        let (nights_total, nights_weight) = profile_rows
            .iter()
            .filter(|row| row.i64_or_zero("itinerary_count") > 0)
            .fold((0.0, 0i64), |(total, weight), row| {
                let count = row.i64_or_zero("itinerary_count");
                (
                    total + row.f64_or_zero("avg_number_of_nights") * count as f64,
                    weight + count,
                )
            });

        let lead_count = sum_count(&funnel_rows, "lead_count");
        let closed_won_count = sum_count(&funnel_rows, "closed_won_count");
        let closed_lost_count = sum_count(&funnel_rows, "closed_lost_count");
        let speed_values: Vec<f64> = funnel_rows
            .iter()
            .filter_map(|row| row.opt_f64("median_speed_to_book_days"))
            .collect();

        let mut lead_times = Vec::new();
        let mut speed_to_close = Vec::new();
        for itinerary in &closed_won_itineraries {
            let Some(created) = created_date(itinerary) else {
                continue;
            };
            if let Some(start) = itinerary.opt_date("travel_start_date") {
                let days = (start - created).num_days();
                if days >= 0 {
                    lead_times.push(days as f64);
                }
            }
            if let Some(closed) = itinerary.opt_date("close_date") {
                let days = (closed - created).num_days();
                if days >= 0 {
                    speed_to_close.push(days as f64);
                }
            }
        }

        let metrics = ProfileMetrics {
            booked_revenue,
            conversion_rate: ratio(closed_won_count as f64, lead_count as f64),
            close_rate: ratio(
                closed_won_count as f64,
                (closed_won_count + closed_lost_count) as f64,
            ),
            margin_pct: ratio(margin_amount, booked_revenue),
            avg_gross_profit: ratio(commission_income, itinerary_count as f64),
            avg_itinerary_nights: ratio(nights_total, nights_weight as f64),
            avg_group_size: ratio(pax_count as f64, itinerary_count as f64),
            avg_lead_time_days: mean(&lead_times),
            avg_speed_to_close_days: mean(&speed_to_close),
            avg_speed_to_book_days: mean(&speed_values),
        };

        let (trend_story, comparison_context) = self
            .build_trend_story(employee_id, period_end, filters.yoy_mode)
            .await?;
        let ytd_variance_pct = self
            .employee_ytd_variance(employee_id, period_end.year(), today)
            .await?;
        let three_year_performance = self
            .build_three_year_performance(employee_id, period_end.year())
            .await?;
        let forecast = self
            .get_forecast_at(employee_id, &ForecastFilters::default(), today)
            .await?;
        let operational_snapshot = self.build_operational_snapshot(employee_id, today).await?;

        let hero_kpis = build_hero_kpis(&metrics, &trend_story);
        let signals = build_signals(&metrics, &trend_story);
        let insight_cards = build_insight_cards(&signals, &employee.first_name, itinerary_count);

        Ok(ProfileResponse {
            section_order: SECTION_ORDER.iter().map(|s| s.to_string()).collect(),
            hero_kpis,
            trend_story,
            three_year_performance,
            ytd_variance_pct: round_to(ytd_variance_pct, 4),
            funnel_health: FunnelHealth {
                lead_count,
                closed_won_count,
                closed_lost_count,
                conversion_rate: round_to(metrics.conversion_rate, 4),
                close_rate: round_to(metrics.close_rate, 4),
                avg_speed_to_book_days: metrics.avg_speed_to_book_days.map(|v| round_to(v, 1)),
            },
            forecast_and_target: ForecastSection {
                timeline: forecast.timeline,
                summary: forecast.summary,
            },
            compensation_impact: build_compensation_impact(&compensation_rows),
            operational_snapshot,
            signals,
            insight_cards,
            comparison_context,
            employee,
        })
    }

    pub async fn get_forecast(&self, employee_id: &str, filters: &ForecastFilters) -> Result<ForecastResponse> {
        self.get_forecast_at(employee_id, filters, today()).await
    }

    /// Seasonal projection from the trailing 24 months, targeting last year × 1.12.
    pub async fn get_forecast_at(
        &self,
        employee_id: &str,
        filters: &ForecastFilters,
        today: NaiveDate,
    ) -> Result<ForecastResponse> {
        let employee = self.get_employee_identity(employee_id).await?;
        let forecast_start = month_start(today);
        let history_start = add_months(forecast_start, -24);
        let history_end = month_end(add_months(forecast_start, -1));
        let history_rows = self
            .repository
            .list_profile_monthly(history_start, history_end, Some(employee_id))
            .await?;
        let revenue_by_period: BTreeMap<NaiveDate, f64> = history_rows
            .iter()
            .filter_map(|row| {
                row.opt_date("period_start")
                    .map(|period| (period, row.f64_or_zero("booked_revenue_amount")))
            })
            .collect();
        let trailing: Vec<f64> = revenue_by_period.values().rev().take(12).copied().collect();
        let trailing_avg = mean(&trailing).unwrap_or(0.0);

        let timeline: Vec<ForecastPoint> = (0..filters.horizon_months as i32)
            .map(|offset| {
                let period_start = add_months(forecast_start, offset);
                let samples: Vec<f64> = revenue_by_period
                    .iter()
                    .filter(|(period, _)| period.month() == period_start.month())
                    .map(|(_, amount)| *amount)
                    .collect();
                let projected = mean(&samples).unwrap_or(trailing_avg);
                let last_year = revenue_by_period
                    .get(&add_months(period_start, -12))
                    .copied()
                    .unwrap_or(0.0);
                let target = if last_year > 0.0 {
                    last_year * GROWTH_TARGET
                } else {
                    projected * GROWTH_TARGET
                };
                ForecastPoint {
                    period_start,
                    period_end: month_end(period_start),
                    projected_revenue_amount: round_to(projected, 2),
                    target_revenue_amount: round_to(target, 2),
                    growth_gap_pct: round_to(ratio(projected - target, target), 4),
                }
            })
            .collect();
        let total_projected: f64 = timeline.iter().map(|p| p.projected_revenue_amount).sum();
        let total_target: f64 = timeline.iter().map(|p| p.target_revenue_amount).sum();
        Ok(ForecastResponse {
            employee,
            timeline,
            summary: ForecastSummary {
                total_projected_revenue_amount: round_to(total_projected, 2),
                total_target_revenue_amount: round_to(total_target, 2),
                total_growth_gap_pct: round_to(ratio(total_projected - total_target, total_target), 4),
            },
        })
    }

    async fn build_trend_story(
        &self,
        employee_id: &str,
        period_end: NaiveDate,
        yoy_mode: YoyMode,
    ) -> Result<(TrendStory, ComparisonContext)> {
        let current_year = period_end.year();
        let (current_start, _) = year_bounds(current_year);
        let (baseline_start, baseline_year_end) = year_bounds(current_year - 1);
        let (current_end, baseline_end, month_limit) = match yoy_mode {
            YoyMode::FullYear => (year_bounds(current_year).1, baseline_year_end, 12),
            YoyMode::SamePeriod => (period_end, same_day_last_year(period_end), period_end.month()),
        };

        let id = Some(employee_id);
        let current_rows = self
            .repository
            .list_profile_monthly(current_start, current_end, id)
            .await?;
        let baseline_rows = self
            .repository
            .list_profile_monthly(baseline_start, baseline_end, id)
            .await?;
        let current_by_month = sum_by_month(&current_rows);
        let baseline_by_month = sum_by_month(&baseline_rows);

        let points: Vec<TrendStoryPoint> = (1..=month_limit)
            .filter_map(|month| {
                let start = NaiveDate::from_ymd_opt(current_year, month, 1)?;
                let current = current_by_month.get(&month).copied().unwrap_or(0.0);
                let baseline = baseline_by_month.get(&month).copied().unwrap_or(0.0);
                Some(TrendStoryPoint {
                    period_start: start,
                    period_end: month_end(start),
                    month_label: MONTH_LABELS[month as usize - 1].to_string(),
                    current_value: round_to(current, 2),
                    baseline_value: round_to(baseline, 2),
                    yoy_delta_pct: round_to(ratio(current - baseline, baseline), 4),
                })
            })
            .collect();
        let current_total: f64 = points.iter().map(|p| p.current_value).sum();
        let baseline_total: f64 = points.iter().map(|p| p.baseline_value).sum();
        let story = TrendStory {
            points,
            current_total: round_to(current_total, 2),
            baseline_total: round_to(baseline_total, 2),
            yoy_delta_pct: round_to(ratio(current_total - baseline_total, baseline_total), 4),
        };
        let context = ComparisonContext {
            current_period: format!("{current_start}..{current_end}"),
            baseline_period: format!("{baseline_start}..{baseline_end}"),
            yoy_mode,
        };
        Ok((story, context))
    }

    async fn employee_ytd_variance(
        &self,
        employee_id: &str,
        year: i32,
        today: NaiveDate,
    ) -> Result<f64> {
        let ((start, end), (base_start, base_end)) = resolve_ytd_windows(Some(year), today);
        let id = Some(employee_id);
        let current = self.repository.list_leaderboard_monthly(start, end, id).await?;
        let baseline = self
            .repository
            .list_leaderboard_monthly(base_start, base_end, id)
            .await?;
        let current_total = sum_column(&current, "booked_revenue_amount");
        let baseline_total = sum_column(&baseline, "booked_revenue_amount");
        Ok(ratio(current_total - baseline_total, baseline_total))
    }

    async fn build_three_year_performance(
        &self,
        employee_id: &str,
        anchor_year: i32,
    ) -> Result<ThreeYearPerformance> {
        let years = [anchor_year - 2, anchor_year - 1, anchor_year];
        let (range_start, _) = year_bounds(years[0]);
        let (_, range_end) = year_bounds(anchor_year);
        let id = Some(employee_id);
        let travel_rows = self
            .repository
            .list_profile_monthly(range_start, range_end, id)
            .await?;
        let funnel_rows = self
            .repository
            .list_funnel_monthly(range_start, range_end, id)
            .await?;

        let by_year_month = |rows: &[Row]| {
            let mut values: HashMap<(i32, u32), f64> = HashMap::new();
            for row in rows {
                let Some(period) = row.opt_date("period_start") else {
                    continue;
                };
                if !years.contains(&period.year()) {
                    continue;
                }
                *values.entry((period.year(), period.month())).or_insert(0.0) +=
                    row.f64_or_zero("booked_revenue_amount");
            }
            values
        };

        Ok(ThreeYearPerformance {
            travel_closed_files: build_three_year_matrix(
                "travel_closed_files",
                "Closed Travel Revenue (Travel Date Basis)",
                &years,
                &by_year_month(&travel_rows),
            ),
            lead_funnel: build_three_year_matrix(
                "lead_funnel",
                "Lead Funnel Revenue (Created/Booked Basis)",
                &years,
                &by_year_month(&funnel_rows),
            ),
        })
    }

    async fn build_operational_snapshot(
        &self,
        employee_id: &str,
        today: NaiveDate,
    ) -> Result<OperationalSnapshot> {
        let open_values = self.repository.list_open_status_values().await?;
        let traveling = self
            .repository
            .list_current_traveling_itineraries(employee_id, today, 10)
            .await?;
        let open = self
            .repository
            .list_top_open_itineraries(employee_id, &open_values, 5)
            .await?;
        Ok(OperationalSnapshot {
            current_traveling_files: traveling.iter().map(map_operational_itinerary).collect(),
            top_open_itineraries: open.iter().map(map_operational_itinerary).collect(),
        })
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

    fn employee(id: &str, first: &str, last: &str) -> serde_json::Value {
        json!({
            "id": id, "external_id": format!("x-{id}"), "first_name": first,
            "last_name": last, "email": format!("{id}@example.com"), "analysis_disabled": false
        })
    }

    fn travel(period: &str, id: &str, first: &str, revenue: f64, margin: f64, itineraries: i64) -> serde_json::Value {
        json!({
            "period_start": period, "employee_id": id, "first_name": first, "last_name": "Guide",
            "itinerary_count": itineraries, "pax_count": itineraries * 2,
            "booked_revenue_amount": revenue, "commission_income_amount": revenue * 0.2,
            "margin_amount": margin
        })
    }

    fn funnel(period: &str, id: &str, leads: i64, won: i64, lost: i64) -> serde_json::Value {
        json!({
            "period_start": period, "employee_id": id, "lead_count": leads,
            "closed_won_count": won, "closed_lost_count": lost,
            "booked_revenue_amount": won as f64 * 1000.0, "median_speed_to_book_days": 20
        })
    }

    fn service(store: MemoryStore) -> TravelConsultantsService {
        TravelConsultantsService::new(TravelConsultantsRepository::new(Arc::new(store)))
    }

    #[test]
    fn test_period_windows() {
        let today = ymd(2026, 2, 18);
        assert_eq!(
            resolve_period_window(PeriodType::Rolling12, None, None, today),
            (ymd(2025, 3, 1), ymd(2026, 2, 28))
        );
        assert_eq!(
            resolve_period_window(PeriodType::Year, Some(2025), None, today),
            (ymd(2025, 1, 1), ymd(2025, 12, 31))
        );
        assert_eq!(
            resolve_period_window(PeriodType::Monthly, None, Some(6), today),
            (ymd(2026, 6, 1), ymd(2026, 6, 30))
        );
        assert_eq!(
            resolve_baseline_window(PeriodType::Monthly, ymd(2024, 2, 1), ymd(2024, 2, 29)),
            (ymd(2023, 2, 1), ymd(2023, 2, 28))
        );
        let (current, baseline) = resolve_ytd_windows(Some(2025), today);
        assert_eq!(current, (ymd(2025, 1, 1), ymd(2025, 12, 31)));
        assert_eq!(baseline, (ymd(2024, 1, 1), ymd(2024, 12, 31)));
    }

    #[tokio::test]
    async fn test_leaderboard_aggregates_and_ranks_active_consultants() {
        let store = MemoryStore::new()
            .with_rows(
                "employees",
                vec![
                    employee("e1", "Ana", "Guide"),
                    employee("e2", "Ben", "Guide"),
                    json!({"id": "e3", "analysis_disabled": true}),
                ],
            )
            .with_rows(
                "mv_travel_consultant_leaderboard_monthly",
                vec![
                    travel("2026-02-01", "e1", "Ana", 56000.0, 11200.0, 4),
                    travel("2026-02-01", "e2", "Ben", 80000.0, 8000.0, 6),
                    travel("2026-02-01", "e3", "Cy", 99000.0, 1000.0, 9),
                    travel("2025-02-01", "e1", "Ana", 50000.0, 0.0, 3),
                ],
            )
            .with_rows(
                "mv_travel_consultant_funnel_monthly",
                vec![funnel("2026-02-01", "e1", 10, 4, 2), funnel("2026-02-01", "e2", 20, 2, 8)],
            );
        let svc = service(store);
        let filters = LeaderboardFilters::new(PeriodType::Monthly, LeaderboardDomain::Travel);

        let board = svc
            .get_leaderboard_at(&filters, ymd(2026, 2, 18))
            .await
            .expect("leaderboard");

        assert_eq!(board.period_start, ymd(2026, 2, 1));
        let ids: Vec<&str> = board.rankings.iter().map(|r| r.employee_id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e1"]);
        let ana = &board.rankings[1];
        assert_eq!(ana.rank, 2);
        assert_eq!(ana.conversion_rate, 0.4);
        assert!((ana.close_rate - 4.0 / 6.0).abs() < 1e-9);
        assert_eq!(ana.margin_pct, 0.2);
        // 56000 against 50000 × 1.12 is exactly on target
        assert_eq!(ana.growth_target_variance_pct, 0.0);
        assert_eq!(ana.yoy_to_date_variance_pct, 0.12);
        assert_eq!(ana.avg_speed_to_book_days, Some(20.0));

        assert_eq!(board.highlights.len(), 4);
        assert_eq!(board.highlights[1].key, "best_conversion");
        assert!(board.highlights[1].description.starts_with("Ana Guide"));
        assert_eq!(board.highlights[2].description, "Ben Guide has the lowest margin (10%).");
    }

    #[tokio::test]
    async fn test_leaderboard_sorts_ascending_by_conversion() {
        let store = MemoryStore::new()
            .with_rows("employees", vec![employee("e1", "Ana", "G"), employee("e2", "Ben", "G")])
            .with_rows(
                "mv_travel_consultant_funnel_monthly",
                vec![funnel("2026-02-01", "e1", 10, 5, 0), funnel("2026-02-01", "e2", 10, 1, 0)],
            );
        let mut filters = LeaderboardFilters::new(PeriodType::Monthly, LeaderboardDomain::Funnel);
        filters.sort_by = SortBy::ConversionRate;
        filters.sort_order = SortOrder::Asc;

        let board = service(store)
            .get_leaderboard_at(&filters, ymd(2026, 2, 18))
            .await
            .expect("leaderboard");
        assert_eq!(board.rankings[0].employee_id, "e2");
        assert_eq!(board.rankings[1].booked_revenue, 5000.0);
    }

    #[tokio::test]
    async fn test_unknown_consultant_is_not_found() {
        let err = service(MemoryStore::new())
            .get_forecast("missing", &ForecastFilters::default())
            .await
            .expect_err("not found");
        assert!(matches!(err, Error::NotFound(ref m) if m == "Travel consultant not found"));
    }

    #[tokio::test]
    async fn test_forecast_uses_seasonal_history_and_growth_target() {
        let store = MemoryStore::new()
            .with_rows("employees", vec![employee("e1", "Ana", "Guide")])
            .with_rows(
                "mv_travel_consultant_profile_monthly",
                vec![
                    json!({"period_start": "2025-03-01", "employee_id": "e1", "booked_revenue_amount": 1000}),
                    json!({"period_start": "2024-03-01", "employee_id": "e1", "booked_revenue_amount": 3000}),
                    json!({"period_start": "2026-01-01", "employee_id": "e1", "booked_revenue_amount": 500}),
                ],
            );
        let filters = ForecastFilters {
            horizon_months: 2,
            currency_code: None,
        };

        let forecast = service(store)
            .get_forecast_at("e1", &filters, ymd(2026, 3, 10))
            .await
            .expect("forecast");

        let march = &forecast.timeline[0];
        assert_eq!(march.period_start, ymd(2026, 3, 1));
        assert_eq!(march.projected_revenue_amount, 2000.0);
        assert_eq!(march.target_revenue_amount, 1120.0);
        // April has no history: trailing average of the three months, target from itself
        let april = &forecast.timeline[1];
        assert_eq!(april.projected_revenue_amount, 1500.0);
        assert_eq!(april.target_revenue_amount, 1680.0);
        assert_eq!(forecast.summary.total_projected_revenue_amount, 3500.0);
        assert_eq!(forecast.employee.employee_external_id, "x-e1");
    }

    #[tokio::test]
    async fn test_profile_assembles_sections() {
        let store = MemoryStore::new()
            .with_rows("employees", vec![employee("e1", "Ana", "Guide")])
            .with_rows(
                "mv_travel_consultant_profile_monthly",
                vec![
                    json!({"period_start": "2026-01-01", "employee_id": "e1", "itinerary_count": 2,
                           "pax_count": 6, "booked_revenue_amount": 10000, "commission_income_amount": 2000,
                           "margin_amount": 2500, "avg_number_of_nights": 8}),
                    json!({"period_start": "2025-01-01", "employee_id": "e1", "itinerary_count": 1,
                           "booked_revenue_amount": 8000}),
                ],
            )
            .with_rows("mv_travel_consultant_funnel_monthly", vec![funnel("2026-01-01", "e1", 10, 4, 4)])
            .with_rows(
                "itinerary_status_reference",
                vec![
                    json!({"status_value": "Quoted", "pipeline_bucket": "open", "is_filter_out": false}),
                    json!({"status_value": "Deposited", "pipeline_bucket": "closed_won", "is_filter_out": false}),
                ],
            )
            .with_rows(
                "itineraries",
                vec![
                    json!({"id": "i1", "employee_id": "e1", "itinerary_status": "Traveling",
                           "travel_start_date": "2026-02-10", "travel_end_date": "2026-02-25",
                           "gross_amount": 4200, "pax_count": 2}),
                    json!({"id": "i2", "employee_id": "e1", "itinerary_status": "Quoted",
                           "gross_amount": 9100, "pax_count": 4, "itinerary_name": ""}),
                    json!({"id": "i3", "employee_id": "e1", "itinerary_status": "Deposited",
                           "created_at": "2025-11-01T09:00:00+00:00", "close_date": "2025-11-21",
                           "travel_start_date": "2026-01-05", "travel_end_date": "2026-01-20"}),
                ],
            );
        let filters = ProfileFilters {
            period_type: PeriodType::Monthly,
            year: Some(2026),
            month: Some(1),
            ..ProfileFilters::default()
        };

        let profile = service(store)
            .get_profile_at("e1", &filters, ymd(2026, 2, 18))
            .await
            .expect("profile");

        assert_eq!(profile.section_order.len(), 8);
        assert_eq!(profile.funnel_health.conversion_rate, 0.4);
        assert_eq!(profile.funnel_health.close_rate, 0.5);
        let kpi = |key: &str| {
            profile
                .hero_kpis
                .iter()
                .find(|k| k.key == key)
                .map(|k| k.value)
                .expect("kpi present")
        };
        assert_eq!(kpi("booked_revenue"), 10000.0);
        assert_eq!(kpi("margin_pct"), 0.25);
        assert_eq!(kpi("avg_gross_profit"), 1000.0);
        assert_eq!(kpi("avg_itinerary_nights"), 8.0);
        assert_eq!(kpi("avg_group_size"), 3.0);
        assert_eq!(kpi("avg_lead_time"), 65.0);
        assert_eq!(kpi("avg_speed_to_close"), 20.0);

        assert_eq!(profile.trend_story.points.len(), 1);
        assert_eq!(profile.trend_story.yoy_delta_pct, 0.25);
        assert_eq!(profile.comparison_context.baseline_period, "2025-01-01..2025-01-31");
        assert_eq!(profile.three_year_performance.travel_closed_files.series.len(), 3);
        assert_eq!(profile.operational_snapshot.current_traveling_files.len(), 1);
        assert_eq!(profile.operational_snapshot.top_open_itineraries[0].itinerary_id, "i2");
        assert_eq!(profile.operational_snapshot.top_open_itineraries[0].itinerary_name, None);
        assert_eq!(profile.signals.len(), 5);
        assert_eq!(profile.insight_cards.len(), 4);
        assert_eq!(profile.compensation_impact.commission_rate, 0.15);
        assert_eq!(profile.forecast_and_target.timeline.len(), 12);
    }
}
