//! Trade partner analytics: agent and agency leaderboards, profiles and search.

use chrono::{Datelike, NaiveDate};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use common::row::{round_to, Row, RowExt};
use common::time::{today, year_bounds, MONTH_LABELS};
use common::{Error, Result};

use super::repository::TravelTradeRepository;
use super::types::{
    AffinityRow, AgencyIdentity, AgencyLeaderboardRow, AgencyProfileResponse, AgencyTopAgent,
    AgentIdentity, AgentLeaderboardRow, AgentProfileResponse, ConsultantAffinity, SortOrder,
    TradeKpis, TradeLeaderboardFilters, TradeLeaderboardResponse, TradeOperationalItinerary,
    TradeProfileFilters, TradeRollupRow, TradeSearchFilters, TradeSearchResponse, TradeSortBy,
    TradeYoyPoint, TradeYoySeries,
};
use crate::travel_consultants::service::resolve_period_window;

const TRAVELING_FILES_LIMIT: u64 = 10;
const TOP_OPEN_LIMIT: u64 = 5;
const YOY_METRICS: [&str; 4] = ["leads", "bookedItineraries", "grossRevenue", "grossProfit"];

fn rate(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        round_to(numerator as f64 / denominator as f64, 4)
    }
}

/// Summed monthly counts and amounts for one agent or agency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeTotals {
    pub leads_count: i64,
    pub converted_leads_count: i64,
    pub booked_itineraries_count: i64,
    pub gross_amount: f64,
    pub gross_profit_amount: f64,
    /// Peak monthly head count rather than a sum.
    pub active_agents_count: i64,
}

impl TradeTotals {
    fn absorb(&mut self, row: &TradeRollupRow) {
        self.leads_count += row.leads_count;
        self.converted_leads_count += row.converted_leads_count;
        self.booked_itineraries_count += row.traveled_itineraries_count;
        self.gross_amount += row.gross_amount;
        self.gross_profit_amount += row.gross_profit_amount;
        self.active_agents_count = self.active_agents_count.max(row.active_agents_count);
    }

    fn sort_value(&self, sort_by: TradeSortBy) -> f64 {
        match sort_by {
            TradeSortBy::Leads => self.leads_count as f64,
            TradeSortBy::ConvertedLeads => self.converted_leads_count as f64,
            TradeSortBy::BookedItineraries => self.booked_itineraries_count as f64,
            TradeSortBy::Gross => self.gross_amount,
            TradeSortBy::GrossProfit => self.gross_profit_amount,
        }
    }

    fn conversion_rate(&self) -> f64 {
        rate(self.converted_leads_count, self.leads_count)
    }

    fn kpis(&self, with_agent_count: bool) -> TradeKpis {
        TradeKpis {
            leads_count: self.leads_count,
            converted_leads_count: self.converted_leads_count,
            booked_itineraries_count: self.booked_itineraries_count,
            gross_amount: round_to(self.gross_amount, 2),
            gross_profit_amount: round_to(self.gross_profit_amount, 2),
            active_agents_count: with_agent_count.then_some(self.active_agents_count),
            conversion_rate: self.conversion_rate(),
        }
    }
}

/// Rollup rows grouped under a key, carrying the first row seen as identity.
struct Grouped {
    first: TradeRollupRow,
    totals: TradeTotals,
}

fn group_rows<'a>(
    rows: &'a [TradeRollupRow],
    key: impl Fn(&'a TradeRollupRow) -> &'a str,
    skip_blank: bool,
) -> Vec<Grouped> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Grouped> = Vec::new();
    for row in rows {
        let id = key(row);
        if skip_blank && id.is_empty() {
            continue;
        }
        let slot = *index.entry(id).or_insert_with(|| {
            groups.push(Grouped {
                first: row.clone(),
                totals: TradeTotals::default(),
            });
            groups.len() - 1
        });
        groups[slot].totals.absorb(row);
    }
    groups
}

/// Primary metric, then gross profit, in the requested direction; name ascending breaks ties.
fn leaderboard_order(
    a: (&TradeTotals, &str),
    b: (&TradeTotals, &str),
    sort_by: TradeSortBy,
    sort_order: SortOrder,
) -> Ordering {
    let metric = a
        .0
        .sort_value(sort_by)
        .total_cmp(&b.0.sort_value(sort_by))
        .then_with(|| a.0.gross_profit_amount.total_cmp(&b.0.gross_profit_amount));
    let metric = match sort_order {
        SortOrder::Desc => metric.reverse(),
        SortOrder::Asc => metric,
    };
    metric.then_with(|| a.1.to_lowercase().cmp(&b.1.to_lowercase()))
}

fn metric_value(row: &TradeRollupRow, metric: &str) -> f64 {
    match metric {
        "leads" => row.leads_count as f64,
        "bookedItineraries" => row.traveled_itineraries_count as f64,
        "grossRevenue" => row.gross_amount,
        _ => row.gross_profit_amount,
    }
}

/// Jan..Dec values for the current and prior calendar year of one metric.
pub fn build_yoy_series(
    metric: &str,
    current_year: i32,
    current_rows: &[TradeRollupRow],
    prior_rows: &[TradeRollupRow],
) -> TradeYoySeries {
    let by_month = |rows: &[TradeRollupRow]| {
        let mut months = [0.0_f64; 12];
        for row in rows {
            if let Some(period) = row.period_start {
                months[period.month0() as usize] += metric_value(row, metric);
            }
        }
        months
    };
    let current = by_month(current_rows);
    let prior = by_month(prior_rows);
    let points: Vec<TradeYoyPoint> = (0..12)
        .map(|i| TradeYoyPoint {
            month: i as u32 + 1,
            month_label: MONTH_LABELS[i].to_string(),
            current_year_value: round_to(current[i], 2),
            prior_year_value: round_to(prior[i], 2),
        })
        .collect();
    let total_current: f64 = points.iter().map(|p| p.current_year_value).sum();
    let total_prior: f64 = points.iter().map(|p| p.prior_year_value).sum();
    let delta = if total_prior != 0.0 {
        (total_current - total_prior) / total_prior
    } else {
        0.0
    };
    TradeYoySeries {
        metric: metric.to_string(),
        current_year,
        prior_year: current_year - 1,
        points,
        total_current_year_value: round_to(total_current, 2),
        total_prior_year_value: round_to(total_prior, 2),
        yoy_delta_pct: round_to(delta, 4),
    }
}

/// Converted leads first, then closed-won files, then name.
pub fn rank_consultants(rows: &[AffinityRow], top_n: usize) -> Vec<ConsultantAffinity> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut consultants: Vec<ConsultantAffinity> = Vec::new();
    for row in rows.iter().filter(|r| !r.employee_id.is_empty()) {
        let slot = *index.entry(row.employee_id.as_str()).or_insert_with(|| {
            consultants.push(ConsultantAffinity {
                employee_id: row.employee_id.clone(),
                employee_external_id: row.employee_external_id.clone(),
                employee_name: format!("{} {}", row.employee_first_name, row.employee_last_name)
                    .trim()
                    .to_string(),
                converted_leads_count: 0,
                closed_won_itineraries_count: 0,
            });
            consultants.len() - 1
        });
        consultants[slot].converted_leads_count += row.converted_leads_count;
        consultants[slot].closed_won_itineraries_count += row.closed_won_itineraries_count;
    }
    consultants.sort_by(|a, b| {
        b.converted_leads_count
            .cmp(&a.converted_leads_count)
            .then_with(|| b.closed_won_itineraries_count.cmp(&a.closed_won_itineraries_count))
            .then_with(|| a.employee_name.cmp(&b.employee_name))
    });
    consultants.truncate(top_n);
    consultants
}

fn agent_name(agent: &Row) -> String {
    let name = format!(
        "{} {}",
        agent.text("first_name").trim(),
        agent.text("last_name").trim()
    );
    let name = name.trim();
    if name.is_empty() {
        "Unnamed Agent".to_string()
    } else {
        name.to_string()
    }
}

#[derive(Clone)]
pub struct TravelTradeService {
    repository: TravelTradeRepository,
}

impl TravelTradeService {
    pub fn new(repository: TravelTradeRepository) -> Self {
        Self { repository }
    }

    async fn yoy_series(
        &self,
        period_end: NaiveDate,
        agent_id: Option<&str>,
        agency_id: Option<&str>,
    ) -> Result<Vec<TradeYoySeries>> {
        let current_year = period_end.year();
        let (cs, ce) = year_bounds(current_year);
        let (ps, pe) = year_bounds(current_year - 1);
        let (current, prior) = match agent_id {
            Some(agent_id) => (
                self.repository.list_agent_rollup(cs, ce, Some(agent_id), None).await?,
                self.repository.list_agent_rollup(ps, pe, Some(agent_id), None).await?,
            ),
            None => (
                self.repository.list_agency_rollup(cs, ce, agency_id).await?,
                self.repository.list_agency_rollup(ps, pe, agency_id).await?,
            ),
        };
        Ok(YOY_METRICS
            .iter()
            .map(|metric| build_yoy_series(metric, current_year, &current, &prior))
            .collect())
    }

    pub async fn agent_leaderboard(
        &self,
        filters: &TradeLeaderboardFilters,
    ) -> Result<TradeLeaderboardResponse<AgentLeaderboardRow>> {
        self.agent_leaderboard_at(filters, today()).await
    }

    pub async fn agent_leaderboard_at(
        &self,
        filters: &TradeLeaderboardFilters,
        today: NaiveDate,
    ) -> Result<TradeLeaderboardResponse<AgentLeaderboardRow>> {
        let (start, end) = resolve_period_window(filters.period_type, filters.year, filters.month, today);
        let rows = self.repository.list_agent_rollup(start, end, None, None).await?;
        let mut groups = group_rows(&rows, |r| r.agent_id.as_str(), true);
        groups.sort_by(|a, b| {
            leaderboard_order(
                (&a.totals, &a.first.agent_name),
                (&b.totals, &b.first.agent_name),
                filters.sort_by,
                filters.sort_order,
            )
        });
        let rankings = groups
            .into_iter()
            .take(filters.top_n as usize)
            .enumerate()
            .map(|(i, g)| AgentLeaderboardRow {
                rank: i as u32 + 1,
                conversion_rate: g.totals.conversion_rate(),
                agent_id: g.first.agent_id,
                agent_external_id: g.first.agent_external_id,
                agent_name: g.first.agent_name,
                agent_email: g.first.agent_email,
                agency_id: g.first.agency_id,
                agency_external_id: g.first.agency_external_id,
                agency_name: g.first.agency_name,
                leads_count: g.totals.leads_count,
                converted_leads_count: g.totals.converted_leads_count,
                booked_itineraries_count: g.totals.booked_itineraries_count,
                gross_amount: round_to(g.totals.gross_amount, 2),
                gross_profit_amount: round_to(g.totals.gross_profit_amount, 2),
            })
            .collect();
        Ok(TradeLeaderboardResponse {
            period_start: start,
            period_end: end,
            period_type: filters.period_type,
            sort_by: filters.sort_by,
            sort_order: filters.sort_order,
            top_n: filters.top_n,
            rankings,
        })
    }

    pub async fn agent_profile(
        &self,
        agent_id: &str,
        filters: &TradeProfileFilters,
    ) -> Result<AgentProfileResponse> {
        self.agent_profile_at(agent_id, filters, today()).await
    }

    pub async fn agent_profile_at(
        &self,
        agent_id: &str,
        filters: &TradeProfileFilters,
        today: NaiveDate,
    ) -> Result<AgentProfileResponse> {
        let agent = self
            .repository
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| Error::not_found("Travel agent not found"))?;
        let agency = self
            .repository
            .get_agency(&agent.text("agency_id"))
            .await?
            .ok_or_else(|| Error::not_found("Travel agency not found for travel agent"))?;

        let (start, end) = resolve_period_window(filters.period_type, filters.year, filters.month, today);
        let rows = self
            .repository
            .list_agent_rollup(start, end, Some(agent_id), None)
            .await?;
        let totals = group_rows(&rows, |r| r.agent_id.as_str(), true)
            .into_iter()
            .find(|g| g.first.agent_id == agent_id)
            .map(|g| g.totals)
            .unwrap_or_default();

        let affinity = self.repository.list_affinity_rows(start, end, agent_id).await?;
        let consultants = rank_consultants(&affinity, filters.top_n as usize);
        let yoy_series = self.yoy_series(end, Some(agent_id), None).await?;

        let external_id = agent.text("external_id");
        let open_statuses = self.repository.list_open_status_values().await?;
        let traveling = self
            .repository
            .list_current_traveling_itineraries(&external_id, today, TRAVELING_FILES_LIMIT)
            .await?;
        let top_open = self
            .repository
            .list_top_open_itineraries(&external_id, &open_statuses, TOP_OPEN_LIMIT)
            .await?;
        debug!(agent_id, months = rows.len(), "built travel agent profile");

        Ok(AgentProfileResponse {
            agent: AgentIdentity {
                agent_id: agent.text("id"),
                agent_external_id: external_id,
                agent_name: agent_name(&agent),
                agent_email: agent.opt_text("email"),
                agency_id: agency.text("id"),
                agency_external_id: agency.text("external_id"),
                agency_name: agency.text("agency_name"),
            },
            period_start: start,
            period_end: end,
            period_type: filters.period_type,
            kpis: totals.kpis(false),
            yoy_series,
            primary_travel_consultants: consultants,
            current_traveling_files: traveling.into_iter().map(TradeOperationalItinerary::from).collect(),
            top_open_itineraries: top_open.into_iter().map(TradeOperationalItinerary::from).collect(),
        })
    }

    pub async fn agency_leaderboard(
        &self,
        filters: &TradeLeaderboardFilters,
    ) -> Result<TradeLeaderboardResponse<AgencyLeaderboardRow>> {
        self.agency_leaderboard_at(filters, today()).await
    }

    pub async fn agency_leaderboard_at(
        &self,
        filters: &TradeLeaderboardFilters,
        today: NaiveDate,
    ) -> Result<TradeLeaderboardResponse<AgencyLeaderboardRow>> {
        let (start, end) = resolve_period_window(filters.period_type, filters.year, filters.month, today);
        let rows = self.repository.list_agency_rollup(start, end, None).await?;
        let mut groups = group_rows(&rows, |r| r.agency_id.as_str(), true);
        groups.sort_by(|a, b| {
            leaderboard_order(
                (&a.totals, &a.first.agency_name),
                (&b.totals, &b.first.agency_name),
                filters.sort_by,
                filters.sort_order,
            )
        });
        let rankings = groups
            .into_iter()
            .take(filters.top_n as usize)
            .enumerate()
            .map(|(i, g)| AgencyLeaderboardRow {
                rank: i as u32 + 1,
                conversion_rate: g.totals.conversion_rate(),
                agency_id: g.first.agency_id,
                agency_external_id: g.first.agency_external_id,
                agency_name: g.first.agency_name,
                leads_count: g.totals.leads_count,
                converted_leads_count: g.totals.converted_leads_count,
                booked_itineraries_count: g.totals.booked_itineraries_count,
                gross_amount: round_to(g.totals.gross_amount, 2),
                gross_profit_amount: round_to(g.totals.gross_profit_amount, 2),
                active_agents_count: g.totals.active_agents_count,
            })
            .collect();
        Ok(TradeLeaderboardResponse {
            period_start: start,
            period_end: end,
            period_type: filters.period_type,
            sort_by: filters.sort_by,
            sort_order: filters.sort_order,
            top_n: filters.top_n,
            rankings,
        })
    }

    pub async fn agency_profile(
        &self,
        agency_id: &str,
        filters: &TradeProfileFilters,
    ) -> Result<AgencyProfileResponse> {
        self.agency_profile_at(agency_id, filters, today()).await
    }

    pub async fn agency_profile_at(
        &self,
        agency_id: &str,
        filters: &TradeProfileFilters,
        today: NaiveDate,
    ) -> Result<AgencyProfileResponse> {
        let agency = self
            .repository
            .get_agency(agency_id)
            .await?
            .ok_or_else(|| Error::not_found("Travel agency not found"))?;
        let (start, end) = resolve_period_window(filters.period_type, filters.year, filters.month, today);
        let rows = self.repository.list_agency_rollup(start, end, Some(agency_id)).await?;
        let totals = group_rows(&rows, |r| r.agency_id.as_str(), true)
            .into_iter()
            .find(|g| g.first.agency_id == agency_id)
            .map(|g| g.totals)
            .unwrap_or_default();
        let yoy_series = self.yoy_series(end, None, Some(agency_id)).await?;

        let agent_rows = self
            .repository
            .list_agent_rollup(start, end, None, Some(agency_id))
            .await?;
        let mut agents = group_rows(&agent_rows, |r| r.agent_id.as_str(), false);
        agents.sort_by(|a, b| {
            b.totals
                .gross_profit_amount
                .total_cmp(&a.totals.gross_profit_amount)
                .then_with(|| b.totals.converted_leads_count.cmp(&a.totals.converted_leads_count))
                .then_with(|| {
                    a.first
                        .agent_name
                        .to_lowercase()
                        .cmp(&b.first.agent_name.to_lowercase())
                })
        });
        let top_agents = agents
            .into_iter()
            .take(filters.top_n as usize)
            .enumerate()
            .map(|(i, g)| AgencyTopAgent {
                rank: i as u32 + 1,
                agent_id: g.first.agent_id,
                agent_external_id: g.first.agent_external_id,
                agent_name: g.first.agent_name,
                agent_email: g.first.agent_email,
                leads_count: g.totals.leads_count,
                converted_leads_count: g.totals.converted_leads_count,
                booked_itineraries_count: g.totals.booked_itineraries_count,
                gross_amount: round_to(g.totals.gross_amount, 2),
                gross_profit_amount: round_to(g.totals.gross_profit_amount, 2),
            })
            .collect();

        Ok(AgencyProfileResponse {
            agency: AgencyIdentity {
                agency_id: agency.text("id"),
                agency_external_id: agency.text("external_id"),
                agency_name: agency.text("agency_name"),
                iata_code: agency.opt_text("iata_code"),
                host_identifier: agency.opt_text("host_identifier"),
            },
            period_start: start,
            period_end: end,
            period_type: filters.period_type,
            kpis: totals.kpis(true),
            yoy_series,
            top_agents,
        })
    }

    pub async fn search(&self, filters: &TradeSearchFilters) -> Result<TradeSearchResponse> {
        let results = self
            .repository
            .search(&filters.q, filters.entity_type, filters.limit)
            .await?;
        Ok(TradeSearchResponse {
            query: filters.q.clone(),
            entity_type: filters.entity_type,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::travel_trade::types::PeriodType;
    use rowstore_client::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn service(store: MemoryStore) -> TravelTradeService {
        TravelTradeService::new(TravelTradeRepository::new(Arc::new(store)))
    }

    fn agent_month(agent: &str, name: &str, month: &str, leads: i64, converted: i64, profit: f64) -> serde_json::Value {
        json!({
            "period_start": month, "agent_id": agent, "agent_name": name, "agency_id": "g1",
            "agency_name": "Acme Travel", "leads_count": leads, "converted_leads_count": converted,
            "traveled_itineraries_count": 1, "gross_amount": profit * 4.0, "gross_profit_amount": profit
        })
    }

    fn trade_store() -> MemoryStore {
        MemoryStore::new()
            .with_rows(
                "travel_agent_monthly_rollup",
                [
                    agent_month("a1", "Ana", "2026-01-01", 10, 2, 100.0),
                    agent_month("a1", "Ana", "2026-02-01", 10, 3, 150.0),
                    agent_month("a2", "Ben", "2026-01-01", 4, 4, 300.0),
                    agent_month("a3", "cal", "2026-01-01", 1, 0, 300.0),
                    agent_month("a1", "Ana", "2025-02-01", 5, 1, 50.0),
                ],
            )
            .with_rows(
                "travel_agency_monthly_rollup",
                [
                    json!({"period_start": "2026-01-01", "agency_id": "g1", "agency_name": "Acme Travel",
                           "leads_count": 20, "converted_leads_count": 5, "gross_profit_amount": 500, "active_agents_count": 3}),
                    json!({"period_start": "2026-02-01", "agency_id": "g1", "agency_name": "Acme Travel",
                           "leads_count": 10, "converted_leads_count": 5, "gross_profit_amount": 150, "active_agents_count": 2}),
                    json!({"period_start": "2026-01-01", "agency_id": "g2", "agency_name": "Beta Tours",
                           "leads_count": 2, "converted_leads_count": 1, "gross_profit_amount": 900, "active_agents_count": 1}),
                ],
            )
            .with_rows(
                "travel_agents",
                [
                    json!({"id": "a1", "external_id": "EXT1", "first_name": "Ana", "last_name": " Silva ", "agency_id": "g1"}),
                    json!({"id": "a9", "external_id": "EXT9", "agency_id": "missing"}),
                ],
            )
            .with_rows(
                "travel_agencies",
                [json!({"id": "g1", "external_id": "AG1", "agency_name": "Acme Travel", "iata_code": "123"})],
            )
            .with_rows(
                "travel_agent_consultant_affinity_monthly_rollup",
                [
                    json!({"period_start": "2026-01-01", "agent_id": "a1", "employee_id": "e1", "employee_first_name": "Zed",
                           "converted_leads_count": 2, "closed_won_itineraries_count": 1}),
                    json!({"period_start": "2026-02-01", "agent_id": "a1", "employee_id": "e2", "employee_first_name": "Amy",
                           "converted_leads_count": 2, "closed_won_itineraries_count": 1}),
                    json!({"period_start": "2026-02-01", "agent_id": "a1", "employee_id": "", "converted_leads_count": 9}),
                ],
            )
    }

    #[tokio::test]
    async fn test_agent_leaderboard_sorts_with_tiebreaks() {
        let board = service(trade_store())
            .agent_leaderboard_at(&TradeLeaderboardFilters::default(), ymd(2026, 6, 1))
            .await
            .expect("leaderboard");
        let names: Vec<&str> = board.rankings.iter().map(|r| r.agent_name.as_str()).collect();
        assert_eq!(names, vec!["Ben", "cal", "Ana"]);
        assert_eq!(board.period_start, ymd(2026, 1, 1));
        let ana = &board.rankings[2];
        assert_eq!(ana.rank, 3);
        assert_eq!(ana.leads_count, 20);
        assert_eq!(ana.conversion_rate, 0.25);
        assert_eq!(ana.gross_profit_amount, 250.0);

        let ascending = TradeLeaderboardFilters {
            sort_by: TradeSortBy::Leads,
            sort_order: SortOrder::Asc,
            top_n: 2,
            ..TradeLeaderboardFilters::default()
        };
        let board = service(trade_store())
            .agent_leaderboard_at(&ascending, ymd(2026, 6, 1))
            .await
            .expect("leaderboard");
        let names: Vec<&str> = board.rankings.iter().map(|r| r.agent_name.as_str()).collect();
        assert_eq!(names, vec!["cal", "Ben"]);
    }

    #[tokio::test]
    async fn test_agent_profile_kpis_yoy_and_consultants() {
        let profile = service(trade_store())
            .agent_profile_at("a1", &TradeProfileFilters::default(), ymd(2026, 6, 1))
            .await
            .expect("profile");
        assert_eq!(profile.agent.agent_name, "Ana Silva");
        assert_eq!(profile.agent.agency_name, "Acme Travel");
        assert_eq!(profile.kpis.leads_count, 20);
        assert_eq!(profile.kpis.active_agents_count, None);
        assert_eq!(profile.yoy_series.len(), 4);
        let leads = &profile.yoy_series[0];
        assert_eq!(leads.metric, "leads");
        assert_eq!(leads.prior_year, 2025);
        assert_eq!(leads.total_current_year_value, 20.0);
        assert_eq!(leads.total_prior_year_value, 5.0);
        assert_eq!(leads.yoy_delta_pct, 3.0);
        assert_eq!(leads.points[1].month_label, "Feb");
        let consultants: Vec<&str> = profile
            .primary_travel_consultants
            .iter()
            .map(|c| c.employee_name.as_str())
            .collect();
        assert_eq!(consultants, vec!["Amy", "Zed"]);
        assert!(profile.current_traveling_files.is_empty());
    }

    #[tokio::test]
    async fn test_profile_not_found_messages() {
        let svc = service(trade_store());
        let filters = TradeProfileFilters::default();
        let missing = svc.agent_profile_at("nope", &filters, ymd(2026, 6, 1)).await.expect_err("missing");
        assert_eq!(missing.to_string(), "Travel agent not found");
        let orphan = svc.agent_profile_at("a9", &filters, ymd(2026, 6, 1)).await.expect_err("orphan");
        assert_eq!(orphan.to_string(), "Travel agency not found for travel agent");
        let agency = svc.agency_profile_at("g9", &filters, ymd(2026, 6, 1)).await.expect_err("agency");
        assert!(matches!(agency, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_agency_leaderboard_and_profile() {
        let svc = service(trade_store());
        let board = svc
            .agency_leaderboard_at(&TradeLeaderboardFilters::default(), ymd(2026, 6, 1))
            .await
            .expect("leaderboard");
        assert_eq!(board.rankings[0].agency_name, "Beta Tours");
        assert_eq!(board.rankings[1].active_agents_count, 3);
        assert_eq!(board.rankings[1].leads_count, 30);

        let filters = TradeProfileFilters {
            period_type: PeriodType::Monthly,
            month: Some(1),
            ..TradeProfileFilters::default()
        };
        let profile = svc
            .agency_profile_at("g1", &filters, ymd(2026, 6, 1))
            .await
            .expect("profile");
        assert_eq!(profile.period_end, ymd(2026, 1, 31));
        assert_eq!(profile.kpis.active_agents_count, Some(3));
        assert_eq!(profile.agency.iata_code.as_deref(), Some("123"));
        let agents: Vec<&str> = profile.top_agents.iter().map(|a| a.agent_id.as_str()).collect();
        assert_eq!(agents, vec!["a2", "a3", "a1"]);
        assert_eq!(profile.top_agents[2].gross_profit_amount, 100.0);
    }

    #[test]
    fn test_yoy_delta_without_prior_is_zero() {
        let rows = vec![TradeRollupRow {
            period_start: Some(ymd(2026, 3, 1)),
            gross_amount: 10.126,
            ..Default::default()
        }];
        let series = build_yoy_series("grossRevenue", 2026, &rows, &[]);
        assert_eq!(series.points[2].current_year_value, 10.13);
        assert_eq!(series.yoy_delta_pct, 0.0);
    }
}
