//! Insight events, the recommendation queue and daily briefings.

use chrono::{DateTime, NaiveDate, Utc};
use common::row::{Row, RowExt};
use common::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightDomain {
    CommandCenter,
    TravelConsultant,
    Itinerary,
    Fx,
    Destination,
    Invoices,
    Platform,
}

impl InsightDomain {
    pub fn as_str(self) -> &'static str {
        match self {
            InsightDomain::CommandCenter => "command_center",
            InsightDomain::TravelConsultant => "travel_consultant",
            InsightDomain::Itinerary => "itinerary",
            InsightDomain::Fx => "fx",
            InsightDomain::Destination => "destination",
            InsightDomain::Invoices => "invoices",
            InsightDomain::Platform => "platform",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Briefing,
    Anomaly,
    Recommendation,
    ForecastNarrative,
    CoachingSignal,
}

impl InsightType {
    pub fn as_str(self) -> &'static str {
        match self {
            InsightType::Briefing => "briefing",
            InsightType::Anomaly => "anomaly",
            InsightType::Recommendation => "recommendation",
            InsightType::ForecastNarrative => "forecast_narrative",
            InsightType::CoachingSignal => "coaching_signal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    New,
    Acknowledged,
    InProgress,
    Resolved,
    Dismissed,
}

impl InsightStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InsightStatus::New => "new",
            InsightStatus::Acknowledged => "acknowledged",
            InsightStatus::InProgress => "in_progress",
            InsightStatus::Resolved => "resolved",
            InsightStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "new" => Some(InsightStatus::New),
            "acknowledged" => Some(InsightStatus::Acknowledged),
            "in_progress" => Some(InsightStatus::InProgress),
            "resolved" => Some(InsightStatus::Resolved),
            "dismissed" => Some(InsightStatus::Dismissed),
            _ => None,
        }
    }

    /// Staying in the same status is always allowed.
    pub fn can_transition_to(self, next: InsightStatus) -> bool {
        use InsightStatus::*;
        self == next
            || matches!(
                (self, next),
                (New, Acknowledged)
                    | (New, Dismissed)
                    | (Acknowledged, InProgress)
                    | (Acknowledged, Dismissed)
                    | (InProgress, Resolved)
                    | (InProgress, Dismissed)
            )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, InsightStatus::Resolved | InsightStatus::Dismissed)
    }
}

// ── Evidence ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceMetric {
    pub key: String,
    pub label: String,
    pub current_value: f64,
    pub baseline_value: Option<f64>,
    pub delta_pct: Option<f64>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub summary: Option<String>,
    pub metrics: Vec<EvidenceMetric>,
    pub source_view_names: Vec<String>,
    pub reference_period: Option<String>,
}

/// Evidence columns hold either a JSON object or its string encoding.
pub fn evidence_object(raw: Option<&Value>) -> Map<String, Value> {
    match raw {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(text)) if !text.trim().is_empty() => {
            match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            }
        }
        _ => Map::new(),
    }
}

/// Look up a camelCase key, falling back to its snake_case spelling.
fn either<'a>(map: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    if map.contains_key(camel) {
        map.get(camel)
    } else {
        map.get(snake)
    }
}

pub fn parse_evidence(raw: Option<&Value>) -> Evidence {
    let map = evidence_object(raw);
    let metrics = map
        .get("metrics")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(Value::as_object)
                .map(|row| EvidenceMetric {
                    key: row.text("key"),
                    label: row.text("label"),
                    current_value: either(row, "currentValue", "current_value")
                        .and_then(common::row::value_f64)
                        .unwrap_or(0.0),
                    baseline_value: either(row, "baselineValue", "baseline_value")
                        .and_then(common::row::value_f64),
                    delta_pct: either(row, "deltaPct", "delta_pct")
                        .and_then(common::row::value_f64),
                    unit: row.opt_text("unit"),
                })
                .collect()
        })
        .unwrap_or_default();
    let source_view_names = match map.get("sourceViewNames") {
        Some(Value::Array(_)) => map.get("sourceViewNames"),
        _ => map.get("source_view_names"),
    }
    .map(common::row::string_list)
    .unwrap_or_default();

    Evidence {
        summary: map.opt_text("summary"),
        metrics,
        source_view_names,
        reference_period: either(&map, "referencePeriod", "reference_period")
            .and_then(|v| v.as_str().map(str::to_string)),
    }
}

// ── Records ───────────────────────────────────────────────────────────

fn timestamp_or_now(row: &Row, key: &str) -> DateTime<Utc> {
    row.opt_datetime(key).unwrap_or_else(Utc::now)
}

fn priority(row: &Row) -> i64 {
    match row.i64_or_zero("priority") {
        0 => 3,
        p => p,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiInsightEvent {
    pub id: String,
    pub insight_type: String,
    pub domain: String,
    pub severity: String,
    pub status: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub title: String,
    pub summary: String,
    pub recommended_action: Option<String>,
    pub priority: i64,
    pub confidence: f64,
    pub evidence: Evidence,
    pub generated_at: DateTime<Utc>,
    pub model_name: Option<String>,
    pub model_tier: Option<String>,
    pub tokens_used: Option<i64>,
    pub latency_ms: Option<i64>,
    pub run_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AiInsightEvent {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.text("id"),
            insight_type: row.text("insight_type"),
            domain: row.text("domain"),
            severity: row.text("severity"),
            status: row.text("status"),
            entity_type: row.opt_text("entity_type"),
            entity_id: row.opt_text("entity_id"),
            title: row.text("title"),
            summary: row.text("summary"),
            recommended_action: row.opt_text("recommended_action"),
            priority: priority(row),
            confidence: row.f64_or_zero("confidence"),
            evidence: parse_evidence(row.get("evidence")),
            generated_at: timestamp_or_now(row, "generated_at"),
            model_name: row.opt_text("model_name"),
            model_tier: row.opt_text("model_tier"),
            tokens_used: row.opt_f64("tokens_used").map(|v| v as i64),
            latency_ms: row.opt_f64("latency_ms").map(|v| v as i64),
            run_id: row.opt_text("run_id"),
            created_at: timestamp_or_now(row, "created_at"),
            updated_at: timestamp_or_now(row, "updated_at"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiRecommendationItem {
    pub id: String,
    pub insight_event_id: Option<String>,
    pub domain: String,
    pub status: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub title: String,
    pub summary: String,
    pub recommended_action: String,
    pub priority: i64,
    pub confidence: f64,
    pub owner_user_id: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub resolution_note: Option<String>,
    pub evidence: Evidence,
    pub generated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AiRecommendationItem {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.text("id"),
            insight_event_id: row.opt_text("insight_event_id").filter(|s| !s.is_empty()),
            domain: row.text("domain"),
            status: row.text("status"),
            entity_type: row.opt_text("entity_type"),
            entity_id: row.opt_text("entity_id"),
            title: row.text("title"),
            summary: row.text("summary"),
            recommended_action: row.text("recommended_action"),
            priority: priority(row),
            confidence: row.f64_or_zero("confidence"),
            owner_user_id: row.opt_text("owner_user_id").filter(|s| !s.is_empty()),
            due_date: row.opt_date("due_date"),
            resolution_note: row.opt_text("resolution_note"),
            evidence: parse_evidence(row.get("evidence")),
            generated_at: timestamp_or_now(row, "generated_at"),
            completed_at: row.opt_datetime("completed_at"),
            updated_at: timestamp_or_now(row, "updated_at"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiBriefingDaily {
    pub id: String,
    pub briefing_date: NaiveDate,
    pub title: String,
    pub summary: String,
    pub highlights: Vec<String>,
    pub top_actions: Vec<String>,
    pub confidence: f64,
    pub evidence: Evidence,
    pub generated_at: DateTime<Utc>,
    pub model_name: Option<String>,
    pub model_tier: Option<String>,
    pub tokens_used: Option<i64>,
    pub latency_ms: Option<i64>,
    pub run_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiEntityInsightsResponse {
    pub entity_type: String,
    pub entity_id: String,
    pub items: Vec<AiInsightEvent>,
}

// ── Filters and requests ──────────────────────────────────────────────

fn default_page() -> u32 {
    1
}
fn default_feed_page_size() -> u32 {
    25
}
fn default_history_page_size() -> u32 {
    50
}

fn check_page(page: u32, page_size: u32, max_page_size: u32) -> Result<(), Error> {
    if page < 1 {
        return Err(Error::validation("page must be at least 1"));
    }
    if page_size < 1 || page_size > max_page_size {
        return Err(Error::validation(format!(
            "page_size must be between 1 and {max_page_size}"
        )));
    }
    Ok(())
}

fn check_len(name: &str, value: &Option<String>, max: usize) -> Result<(), Error> {
    match value {
        Some(v) if v.is_empty() || v.chars().count() > max => Err(Error::validation(format!(
            "{name} must be between 1 and {max} characters"
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedFilters {
    pub domain: Option<InsightDomain>,
    pub insight_type: Option<InsightType>,
    pub severity: Option<Severity>,
    pub status: Option<InsightStatus>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_feed_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub include_totals: bool,
}

impl FeedFilters {
    pub fn validate(&self) -> Result<(), Error> {
        check_page(self.page, self.page_size, 100)?;
        check_len("entity_type", &self.entity_type, 64)?;
        check_len("entity_id", &self.entity_id, 128)
    }
}

impl Default for FeedFilters {
    fn default() -> Self {
        Self {
            domain: None,
            insight_type: None,
            severity: None,
            status: None,
            entity_type: None,
            entity_id: None,
            page: default_page(),
            page_size: default_feed_page_size(),
            include_totals: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationFilters {
    pub domain: Option<InsightDomain>,
    pub status: Option<InsightStatus>,
    pub priority_min: Option<u8>,
    pub priority_max: Option<u8>,
    pub owner_user_id: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_feed_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub include_totals: bool,
}

impl RecommendationFilters {
    pub fn validate(&self) -> Result<(), Error> {
        check_page(self.page, self.page_size, 100)?;
        for bound in [self.priority_min, self.priority_max].into_iter().flatten() {
            if !(1..=5).contains(&bound) {
                return Err(Error::validation("priority must be between 1 and 5"));
            }
        }
        check_len("entity_type", &self.entity_type, 64)?;
        check_len("entity_id", &self.entity_id, 128)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryFilters {
    pub domain: Option<InsightDomain>,
    pub insight_type: Option<InsightType>,
    pub status: Option<InsightStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_history_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub include_totals: bool,
}

impl HistoryFilters {
    pub fn validate(&self) -> Result<(), Error> {
        check_page(self.page, self.page_size, 200)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecommendationUpdateRequest {
    pub status: InsightStatus,
    #[serde(default, alias = "owner_user_id")]
    pub owner_user_id: Option<String>,
    #[serde(default, alias = "resolution_note")]
    pub resolution_note: Option<String>,
}

impl RecommendationUpdateRequest {
    pub fn validate(&self) -> Result<(), Error> {
        if self
            .resolution_note
            .as_ref()
            .is_some_and(|note| note.chars().count() > 2000)
        {
            return Err(Error::validation(
                "resolutionNote must be at most 2000 characters",
            ));
        }
        Ok(())
    }
}
