//! Insight generation: daily briefing, consultant coaching and itinerary health.
//!
//! Every model call carries a deterministic fallback payload, so a run
//! without an API key still produces the same row shapes.

use chrono::Utc;
use llm_client::{schema_instructions, LlmClient, ModelExecution, ModelTier, Operation};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use common::config::Settings;
use common::row::{de_f64, de_i64, de_string, round_to, value_f64, Row, RowExt};
use common::Result;

use super::repository::AiInsightsRepository;
use super::service::{briefing_list_item, clip_text, compact_whitespace, display_float, BriefingItemKind};
use crate::travel_consultants::types::{
    LeaderboardDomain, LeaderboardFilters, LeaderboardRow, PeriodType,
};
use crate::travel_consultants::TravelConsultantsService;

pub const TARGET_CONVERSION_RATE: f64 = 0.35;
pub const TARGET_MARGIN_PCT: f64 = 0.08;
pub const TARGET_GROWTH_PCT: f64 = 0.12;
pub const STRATEGIC_TARGET_CONVERSION_RATE: f64 = 0.35;
pub const STRATEGIC_TARGET_MARGIN_PCT: f64 = 0.20;
pub const STRATEGIC_TARGET_GROWTH_PCT: f64 = 0.12;
const MIN_LEADS_FOR_ACTIONABLE: i64 = 10;
const MIN_ITINERARIES_FOR_ACTIONABLE: i64 = 3;
const BRIEFING_MAX_ITEMS: usize = 6;
const SUMMARY_MAX_LEN: usize = 420;
const ACTION_MAX_LEN: usize = 160;

const BRIEFING_PROMPT: &str = "You are a business command-center analyst. Return compact JSON \
with keys: title, summary, highlights, topActions, confidence.";
const COACHING_PROMPT: &str = "You are a travel consultant performance coach. Return compact JSON \
with keys: title, summary, recommendedAction, severity, priority, confidence.";

const BRIEFING_CONSTRAINTS: [&str; 6] = [
    "Use only facts from context",
    "Prioritize actionable next steps",
    "Do not fabricate source metrics",
    "Return highlights and topActions as plain text string lists only (no JSON objects, no key/value fragments)",
    "Each highlight must be <= 18 words and one sentence",
    "Each top action must be <= 22 words and one sentence",
];
const COACHING_CONSTRAINTS: [&str; 10] = [
    "Use only provided metrics",
    "This is an individual coaching note for one consultant, not a team summary",
    "Summary must begin with consultant full name",
    "Summary must be exactly 2 short sentences and under 45 words total",
    "Sentence 1: core issue or opportunity for this consultant",
    "Sentence 2: one explicit benchmark comparison in format '<metric> X% vs team Y% (target Z%)'",
    "Keep language direct, plain-English, and manager-grade",
    "RecommendedAction must be a single short sentence under 30 words",
    "Use severity low/medium/high/critical",
    "Use priority 1 to 5",
];
const COACHING_FALLBACK_ACTION: &str = "Sales manager and consultant should run a 30-minute \
pipeline review this week, tighten lead qualification on new opportunities, and commit to a \
weekly close-plan checkpoint.";

/// Ratio rendered as a one-decimal percentage, e.g. `0.125` → `12.5`.
fn pct(value: f64) -> String {
    display_float(round_to(value * 100.0, 1))
}

/// Zero means "not provided" for benchmark columns.
fn or_default(value: f64, default: f64) -> f64 {
    if value == 0.0 {
        default
    } else {
        value
    }
}

fn metric(
    key: &str,
    label: &str,
    current: f64,
    baseline: Option<f64>,
    delta: Option<f64>,
    unit: &str,
) -> Value {
    json!({
        "key": key,
        "label": label,
        "currentValue": current,
        "baselineValue": baseline,
        "deltaPct": delta,
        "unit": unit,
    })
}

// ── Consultant context ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeriodSnapshot {
    pub period_type: String,
    pub domain: String,
    #[serde(deserialize_with = "de_f64")]
    pub conversion_rate: f64,
    #[serde(deserialize_with = "de_f64")]
    pub close_rate: f64,
    #[serde(deserialize_with = "de_f64")]
    pub booked_revenue: f64,
    #[serde(deserialize_with = "de_i64")]
    pub lead_count: i64,
    #[serde(deserialize_with = "de_i64")]
    pub closed_won_count: i64,
    #[serde(deserialize_with = "de_i64")]
    pub closed_lost_count: i64,
    #[serde(deserialize_with = "de_f64")]
    pub margin_pct: f64,
}

impl PeriodSnapshot {
    fn from_ranking(period_type: PeriodType, row: Option<&LeaderboardRow>) -> Self {
        let mut snapshot = Self {
            period_type: period_type.as_str().to_string(),
            domain: "travel".to_string(),
            ..Self::default()
        };
        if let Some(row) = row {
            snapshot.conversion_rate = row.conversion_rate;
            snapshot.close_rate = row.close_rate;
            snapshot.booked_revenue = row.booked_revenue;
            snapshot.lead_count = row.lead_count;
            snapshot.closed_won_count = row.closed_won_count;
            snapshot.closed_lost_count = row.closed_lost_count;
            snapshot.margin_pct = row.margin_pct;
        }
        snapshot
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SplitDelta {
    #[serde(deserialize_with = "de_f64")]
    pub conversion_rate_delta: f64,
    #[serde(deserialize_with = "de_f64")]
    pub close_rate_delta: f64,
    #[serde(deserialize_with = "de_f64")]
    pub booked_revenue_delta: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitDeltas {
    pub rolling12: Option<SplitDelta>,
}

/// Team benchmark block attached to every consultant context row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamBenchmarks {
    #[serde(deserialize_with = "de_f64")]
    pub target_conversion_rate: f64,
    #[serde(deserialize_with = "de_f64")]
    pub target_margin_pct: f64,
    #[serde(deserialize_with = "de_f64")]
    pub target_growth_pct: f64,
    #[serde(deserialize_with = "de_f64")]
    pub strategic_target_conversion_rate: f64,
    #[serde(deserialize_with = "de_f64")]
    pub strategic_target_margin_pct: f64,
    #[serde(deserialize_with = "de_f64")]
    pub strategic_target_growth_pct: f64,
    #[serde(deserialize_with = "de_f64")]
    pub team_avg_conversion_rate: f64,
    #[serde(deserialize_with = "de_f64")]
    pub team_avg_margin_pct: f64,
    #[serde(deserialize_with = "de_f64")]
    pub team_avg_close_rate: f64,
    #[serde(deserialize_with = "de_f64")]
    pub team_avg_speed_to_book_days: f64,
    #[serde(deserialize_with = "de_f64")]
    pub team_top_conversion_rate: f64,
    #[serde(deserialize_with = "de_f64")]
    pub team_top_margin_pct: f64,
    #[serde(deserialize_with = "de_f64")]
    pub team_top_close_rate: f64,
    #[serde(deserialize_with = "de_f64")]
    pub team_low_conversion_rate: f64,
    #[serde(deserialize_with = "de_f64")]
    pub team_low_margin_pct: f64,
    #[serde(deserialize_with = "de_f64")]
    pub team_low_close_rate: f64,
    #[serde(deserialize_with = "de_f64")]
    pub team_median_conversion_rate: f64,
    #[serde(deserialize_with = "de_f64")]
    pub team_median_margin_pct: f64,
    #[serde(deserialize_with = "de_f64")]
    pub team_median_close_rate: f64,
    #[serde(rename = "teamP20ConversionRate", deserialize_with = "de_f64")]
    pub team_p20_conversion_rate: f64,
    #[serde(rename = "teamP20MarginPct", deserialize_with = "de_f64")]
    pub team_p20_margin_pct: f64,
    #[serde(rename = "teamP20CloseRate", deserialize_with = "de_f64")]
    pub team_p20_close_rate: f64,
    #[serde(rename = "teamP80ConversionRate", deserialize_with = "de_f64")]
    pub team_p80_conversion_rate: f64,
    #[serde(rename = "teamP80MarginPct", deserialize_with = "de_f64")]
    pub team_p80_margin_pct: f64,
    #[serde(rename = "teamP80CloseRate", deserialize_with = "de_f64")]
    pub team_p80_close_rate: f64,
    #[serde(deserialize_with = "de_f64")]
    pub consultant_count: f64,
}

impl TeamBenchmarks {
    fn defaults() -> Self {
        Self {
            target_conversion_rate: TARGET_CONVERSION_RATE,
            target_margin_pct: TARGET_MARGIN_PCT,
            target_growth_pct: TARGET_GROWTH_PCT,
            strategic_target_conversion_rate: STRATEGIC_TARGET_CONVERSION_RATE,
            strategic_target_margin_pct: STRATEGIC_TARGET_MARGIN_PCT,
            strategic_target_growth_pct: STRATEGIC_TARGET_GROWTH_PCT,
            ..Self::default()
        }
    }

    /// Benchmark view row, snake_case columns, strategic targets defaulted.
    pub fn from_view_row(row: &Row) -> Self {
        let f = |key: &str| row.f64_or_zero(key);
        Self {
            target_conversion_rate: f("target_conversion_rate"),
            target_margin_pct: f("target_margin_pct"),
            target_growth_pct: f("target_growth_pct"),
            strategic_target_conversion_rate: or_default(
                f("strategic_target_conversion_rate"),
                STRATEGIC_TARGET_CONVERSION_RATE,
            ),
            strategic_target_margin_pct: or_default(
                f("strategic_target_margin_pct"),
                STRATEGIC_TARGET_MARGIN_PCT,
            ),
            strategic_target_growth_pct: or_default(
                f("strategic_target_growth_pct"),
                STRATEGIC_TARGET_GROWTH_PCT,
            ),
            team_avg_conversion_rate: f("team_avg_conversion_rate"),
            team_avg_margin_pct: f("team_avg_margin_pct"),
            team_avg_close_rate: f("team_avg_close_rate"),
            team_avg_speed_to_book_days: f("team_avg_speed_to_book_days"),
            team_top_conversion_rate: f("team_top_conversion_rate"),
            team_top_margin_pct: f("team_top_margin_pct"),
            team_top_close_rate: f("team_top_close_rate"),
            team_low_conversion_rate: f("team_low_conversion_rate"),
            team_low_margin_pct: f("team_low_margin_pct"),
            team_low_close_rate: f("team_low_close_rate"),
            team_median_conversion_rate: f("team_median_conversion_rate"),
            team_median_margin_pct: f("team_median_margin_pct"),
            team_median_close_rate: f("team_median_close_rate"),
            team_p20_conversion_rate: f("team_p20_conversion_rate"),
            team_p20_margin_pct: f("team_p20_margin_pct"),
            team_p20_close_rate: f("team_p20_close_rate"),
            team_p80_conversion_rate: f("team_p80_conversion_rate"),
            team_p80_margin_pct: f("team_p80_margin_pct"),
            team_p80_close_rate: f("team_p80_close_rate"),
            consultant_count: f("consultant_count"),
        }
    }

    /// Percentile benchmarks computed from the rankings themselves.
    pub fn from_rankings(rankings: &[LeaderboardRow]) -> Self {
        if rankings.is_empty() {
            return Self::defaults();
        }
        let sorted = |f: fn(&LeaderboardRow) -> f64| {
            let mut values: Vec<f64> = rankings.iter().map(f).collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            values
        };
        let conversion = sorted(|r| r.conversion_rate);
        let margin = sorted(|r| r.margin_pct);
        let close = sorted(|r| r.close_rate);
        let n = rankings.len();
        let low_idx = ((n as f64 * 0.2) as usize).saturating_sub(1);
        let p80_idx = ((n as f64 * 0.8) as usize).saturating_sub(1).min(n - 1);
        let median_idx = n / 2;
        let avg = |values: &[f64]| values.iter().sum::<f64>() / n as f64;
        let speeds: Vec<f64> = rankings
            .iter()
            .filter_map(|r| r.avg_speed_to_book_days)
            .collect();
        let avg_conversion = avg(&conversion);
        let avg_margin = avg(&margin);
        Self {
            target_conversion_rate: TARGET_CONVERSION_RATE.max(avg_conversion * 0.85),
            target_margin_pct: TARGET_MARGIN_PCT.max(avg_margin * 0.85),
            target_growth_pct: TARGET_GROWTH_PCT,
            strategic_target_conversion_rate: STRATEGIC_TARGET_CONVERSION_RATE,
            strategic_target_margin_pct: STRATEGIC_TARGET_MARGIN_PCT,
            strategic_target_growth_pct: STRATEGIC_TARGET_GROWTH_PCT,
            team_avg_conversion_rate: avg_conversion,
            team_avg_margin_pct: avg_margin,
            team_avg_close_rate: avg(&close),
            team_avg_speed_to_book_days: if speeds.is_empty() {
                0.0
            } else {
                speeds.iter().sum::<f64>() / speeds.len() as f64
            },
            team_top_conversion_rate: conversion[n - 1],
            team_top_margin_pct: margin[n - 1],
            team_top_close_rate: close[n - 1],
            team_low_conversion_rate: conversion[low_idx],
            team_low_margin_pct: margin[low_idx],
            team_low_close_rate: close[low_idx],
            team_median_conversion_rate: conversion[median_idx],
            team_median_margin_pct: margin[median_idx],
            team_median_close_rate: close[median_idx],
            team_p20_conversion_rate: conversion[low_idx],
            team_p20_margin_pct: margin[low_idx],
            team_p20_close_rate: close[low_idx],
            team_p80_conversion_rate: conversion[p80_idx],
            team_p80_margin_pct: margin[p80_idx],
            team_p80_close_rate: close[p80_idx],
            consultant_count: n as f64,
        }
    }

    fn action_target_conversion(&self) -> f64 {
        or_default(self.target_conversion_rate, TARGET_CONVERSION_RATE)
    }

    fn action_target_margin(&self) -> f64 {
        or_default(self.target_margin_pct, TARGET_MARGIN_PCT)
    }
}

/// One consultant as seen by the coaching prompt and the actionable rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsultantContext {
    #[serde(deserialize_with = "de_string")]
    pub employee_id: String,
    #[serde(deserialize_with = "de_string")]
    pub employee_external_id: String,
    #[serde(deserialize_with = "de_string")]
    pub first_name: String,
    #[serde(deserialize_with = "de_string")]
    pub last_name: String,
    #[serde(deserialize_with = "de_string")]
    pub email: String,
    #[serde(deserialize_with = "de_i64")]
    pub itinerary_count: i64,
    #[serde(deserialize_with = "de_f64")]
    pub booked_revenue_amount: f64,
    #[serde(deserialize_with = "de_f64")]
    pub commission_income_amount: f64,
    #[serde(deserialize_with = "de_f64")]
    pub margin_pct: f64,
    #[serde(deserialize_with = "de_i64")]
    pub lead_count: i64,
    #[serde(deserialize_with = "de_i64")]
    pub closed_won_count: i64,
    #[serde(deserialize_with = "de_i64")]
    pub closed_lost_count: i64,
    #[serde(deserialize_with = "de_f64")]
    pub conversion_rate: f64,
    #[serde(deserialize_with = "de_f64")]
    pub close_rate: f64,
    #[serde(deserialize_with = "de_f64")]
    pub avg_speed_to_book_days: f64,
    #[serde(deserialize_with = "de_f64")]
    pub growth_target_variance_pct: f64,
    #[serde(deserialize_with = "de_f64")]
    pub yoy_to_date_variance_pct: f64,
    pub as_of_period_start: Option<String>,
    pub as_of_period_end: Option<String>,
    pub snapshot_monthly_travel: Option<PeriodSnapshot>,
    pub snapshot_year_travel: Option<PeriodSnapshot>,
    pub snapshot_rolling12_travel: Option<PeriodSnapshot>,
    pub travel_vs_funnel_split_deltas: Option<SplitDeltas>,
    pub benchmark_context: Option<TeamBenchmarks>,
}

impl ConsultantContext {
    /// `None` (with a warning) when the row does not match the context shape.
    fn from_view_row(row: Row) -> Option<Self> {
        let employee_id = row.get("employee_id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value(Value::Object(row)) {
            Ok(context) => Some(context),
            Err(err) => {
                warn!(%employee_id, error = %err, "skipping malformed consultant context row");
                None
            }
        }
    }

    fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    fn benchmarks(&self) -> TeamBenchmarks {
        self.benchmark_context.clone().unwrap_or_default()
    }

    fn monthly_conversion_rate(&self) -> f64 {
        self.snapshot_monthly_travel
            .as_ref()
            .map_or(0.0, |s| s.conversion_rate)
    }

    /// Volume gate, then a severe gap or at least two risk flags.
    pub fn is_actionable(&self) -> bool {
        let has_volume = self.lead_count >= MIN_LEADS_FOR_ACTIONABLE
            || self.itinerary_count >= MIN_ITINERARIES_FOR_ACTIONABLE;
        if !has_volume {
            return false;
        }
        let benchmarks = self.benchmarks();
        let target_conversion = benchmarks.action_target_conversion();
        let target_margin = benchmarks.action_target_margin();
        let monthly_delta = self.monthly_conversion_rate() - self.conversion_rate;

        let risk_flags = [
            self.conversion_rate < target_conversion,
            self.margin_pct < target_margin,
            self.growth_target_variance_pct < -0.10,
            self.yoy_to_date_variance_pct < -0.10,
            monthly_delta <= -0.05,
        ]
        .into_iter()
        .filter(|flag| *flag)
        .count();

        let severe_gap = self.conversion_rate < target_conversion * 0.6
            || self.margin_pct < target_margin * 0.6;
        severe_gap || risk_flags >= 2
    }
}

// ── Model output shapes ───────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
struct BriefingOutput {
    title: Option<String>,
    summary: Option<String>,
    /// Plain sentences, one per highlight.
    highlights: Option<Value>,
    /// Plain sentences, one per action.
    top_actions: Option<Value>,
    /// 0..1 or one of very high/high/medium/low/very low.
    confidence: Option<Value>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
struct CoachingOutput {
    title: Option<String>,
    summary: Option<String>,
    recommended_action: Option<String>,
    /// low, medium, high or critical.
    severity: Option<String>,
    /// 1 (most urgent) to 5.
    priority: Option<Value>,
    confidence: Option<Value>,
}

fn prompt_with_schema<T: JsonSchema>(base: &str) -> String {
    match schema_instructions::<T>() {
        Ok(schema) => format!("{base}\nJSON schema:\n{schema}"),
        Err(err) => {
            warn!(error = %err, "schema rendering failed; sending bare prompt");
            base.to_string()
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Numbers and numeric strings clamp to 0..1; confidence words map to fixed values.
pub fn coerce_confidence(value: Option<&Value>, fallback: f64) -> f64 {
    let clamp = |v: f64| v.clamp(0.0, 1.0);
    match value {
        Some(Value::Number(n)) => n.as_f64().map_or(clamp(fallback), clamp),
        Some(Value::String(raw)) => {
            let normalized = raw.trim().to_lowercase();
            if let Ok(numeric) = normalized.parse::<f64>() {
                return clamp(numeric);
            }
            match normalized.as_str() {
                "very high" => 0.95,
                "high" => 0.85,
                "medium" => 0.65,
                "low" => 0.45,
                "very low" => 0.30,
                _ => clamp(fallback),
            }
        }
        _ => clamp(fallback),
    }
}

fn normalize_briefing_items(raw: Option<&Value>, fallback: &[String], kind: BriefingItemKind) -> Vec<String> {
    let fallback_values: Vec<Value> = fallback.iter().map(|s| json!(s)).collect();
    let source = raw.and_then(Value::as_array).unwrap_or(&fallback_values);
    let normalized: Vec<String> = source
        .iter()
        .map(|item| briefing_list_item(item, kind))
        .filter(|text| !text.is_empty())
        .take(BRIEFING_MAX_ITEMS)
        .collect();
    if normalized.is_empty() {
        fallback.iter().take(BRIEFING_MAX_ITEMS).cloned().collect()
    } else {
        normalized
    }
}

/// Prefix the consultant's name unless the title already mentions them.
pub fn normalize_consultant_title(title: &str, context: &ConsultantContext) -> String {
    let mut normalized = compact_whitespace(title);
    if normalized.is_empty() {
        normalized = "Performance focus".to_string();
    }
    let lowered = normalized.to_lowercase();
    let first = context.first_name.trim().to_lowercase();
    let last = context.last_name.trim().to_lowercase();
    if (!first.is_empty() && lowered.contains(&first)) || (!last.is_empty() && lowered.contains(&last)) {
        return normalized;
    }
    let full_name = context.full_name();
    let full_name = if full_name.is_empty() {
        "Consultant".to_string()
    } else {
        full_name
    };
    format!("{full_name} - {normalized}")
}

fn metric_context_sentence(context: &ConsultantContext) -> String {
    let benchmarks = context.benchmarks();
    let target_conversion = benchmarks.action_target_conversion();
    let target_margin = benchmarks.action_target_margin();
    let conversion_gap = context.conversion_rate - target_conversion;
    let margin_gap = context.margin_pct - target_margin;
    if conversion_gap <= margin_gap {
        format!(
            "Conversion {}% vs team {}% (target {}%).",
            pct(context.conversion_rate),
            pct(benchmarks.team_avg_conversion_rate),
            pct(target_conversion)
        )
    } else {
        format!(
            "Margin {}% vs team {}% (target {}%).",
            pct(context.margin_pct),
            pct(benchmarks.team_avg_margin_pct),
            pct(target_margin)
        )
    }
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Text up to the first `.`, `!` or `?` that ends a sentence, without the mark.
fn leading_sentence(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        let at_boundary = chars.get(i + 1).map_or(true, |next| next.is_whitespace());
        if matches!(c, '.' | '!' | '?') && at_boundary {
            return chars[..i].iter().collect::<String>().trim().to_string();
        }
    }
    text.trim().to_string()
}

/// First sentence naming the consultant, then one benchmark sentence.
pub fn metric_anchored_summary(summary: &str, context: &ConsultantContext) -> String {
    let mut normalized = compact_whitespace(summary);
    if normalized.is_empty() {
        normalized = consultant_summary(context);
    }
    let normalized = normalized
        .split("Metric context:")
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    let full_name = context.full_name();
    let full_name = if full_name.is_empty() {
        "This consultant".to_string()
    } else {
        full_name
    };

    let mut first_sentence = leading_sentence(&normalized);
    if first_sentence.is_empty() {
        first_sentence = format!("{full_name} needs focused coaching attention this week");
    }
    if !first_sentence.to_lowercase().contains(&full_name.to_lowercase()) {
        first_sentence = if first_sentence.chars().count() > 1 {
            format!("{full_name}: {}", lowercase_first(&first_sentence))
        } else {
            format!("{full_name}: needs focused coaching attention")
        };
    }

    let compact = format!("{first_sentence}. {}", metric_context_sentence(context));
    compact
        .chars()
        .take(SUMMARY_MAX_LEN)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Single sentence, clipped at a word boundary, always ending in a period.
pub fn normalize_recommended_action(action: &str, context: &ConsultantContext) -> String {
    let mut normalized = compact_whitespace(action);
    if normalized.is_empty() {
        let first_name = match context.first_name.trim() {
            "" => "consultant",
            name => name,
        };
        normalized = format!(
            "Within 7 days, run a 30-minute pipeline review with {first_name} and lock one conversion and one margin commitment."
        );
    }
    if normalized.chars().count() > ACTION_MAX_LEN {
        normalized = clip_text(&normalized, ACTION_MAX_LEN);
    }
    if !normalized.ends_with('.') {
        normalized.push('.');
    }
    normalized
}

/// Deterministic two-sentence coaching summary keyed on the weakest metric.
pub fn consultant_summary(context: &ConsultantContext) -> String {
    let rolling = context.snapshot_rolling12_travel.clone().unwrap_or_default();
    let conversion = or_default(rolling.conversion_rate, context.conversion_rate);
    let margin = or_default(rolling.margin_pct, context.margin_pct);
    let delta = context.monthly_conversion_rate() - conversion;
    let trend_note = if delta >= 0.05 {
        "improving month over month"
    } else if delta <= -0.05 {
        "cooling month over month"
    } else {
        "stable month over month"
    };
    let (conversion_pct, margin_pct) = (pct(conversion), pct(margin));
    let growth_pct = pct(context.growth_target_variance_pct);
    let yoy_pct = pct(context.yoy_to_date_variance_pct);

    if conversion < TARGET_CONVERSION_RATE {
        return format!(
            "Conversion is below target at {conversion_pct}% and the sales pace is {trend_note}, \
so lead quality and follow-through need immediate coaching attention. Margin is {margin_pct}% \
with growth variance at {growth_pct}% and YoY at {yoy_pct}%, which suggests tightening \
qualification and weekly close plans to protect outcomes."
        );
    }
    if margin < TARGET_MARGIN_PCT {
        return format!(
            "Conversion remains workable at {conversion_pct}%, but margin is under target at \
{margin_pct}%, which points to discounting or weak package mix. Growth variance is {growth_pct}% \
and YoY is {yoy_pct}% ({trend_note}), so the focus should shift to higher-yield itineraries and \
value-based selling."
        );
    }
    format!(
        "Performance is generally on track with conversion at {conversion_pct}% and margin at \
{margin_pct}%, while growth variance is {growth_pct}% and YoY is {yoy_pct}% ({trend_note}). Use \
this window to reinforce the strongest funnel behaviors and replicate them across current deals."
    )
}

fn consultant_evidence(context: &ConsultantContext) -> Value {
    let benchmarks = context.benchmarks();
    let target_conversion = benchmarks.action_target_conversion();
    let target_margin = benchmarks.action_target_margin();
    let monthly_delta = context.monthly_conversion_rate() - context.conversion_rate;
    let rolling = context.snapshot_rolling12_travel.clone().unwrap_or_default();
    let rolling_leads = if rolling.lead_count != 0 {
        rolling.lead_count
    } else {
        context.lead_count
    };
    let revenue_split = context
        .travel_vs_funnel_split_deltas
        .as_ref()
        .and_then(|split| split.rolling12.as_ref())
        .map_or(0.0, |delta| delta.booked_revenue_delta);
    let g = context.growth_target_variance_pct;
    let y = context.yoy_to_date_variance_pct;
    json!({
        "summary": "Built from Travel Consultant leaderboard canonical rollups (rolling12/monthly/year travel + rolling12 funnel).",
        "metrics": [
            metric("conversion_rate_rolling12_travel", "Conversion rate (rolling12, travel basis)",
                context.conversion_rate, Some(target_conversion),
                Some(context.conversion_rate - target_conversion), "ratio"),
            metric("growth_target_variance_pct_rolling12_travel", "Growth target variance (rolling12, travel basis)",
                g, Some(0.0), Some(g), "ratio"),
            metric("margin_pct_rolling12_travel", "Margin % (rolling12, travel basis)",
                context.margin_pct, Some(target_margin), Some(context.margin_pct - target_margin), "ratio"),
            metric("yoy_to_date_variance_pct_travel", "YoY-to-date variance (travel basis)",
                y, Some(0.0), Some(y), "ratio"),
            metric("conversion_delta_monthly_vs_rolling12_travel", "Conversion delta (monthly vs rolling12, travel basis)",
                monthly_delta, Some(0.0), Some(monthly_delta), "ratio"),
            metric("lead_count_rolling12_funnel_basis", "Lead count (rolling12, funnel basis)",
                rolling_leads as f64, None, None, "count"),
            metric("booked_revenue_rolling12_travel_basis", "Booked revenue (rolling12, travel basis)",
                rolling.booked_revenue, None, None, "currency"),
            metric("booked_revenue_delta_travel_vs_funnel_rolling12", "Booked revenue delta (travel vs funnel, rolling12)",
                revenue_split, Some(0.0), None, "currency"),
        ],
        "sourceViewNames": [
            "mv_travel_consultant_leaderboard_monthly",
            "mv_travel_consultant_funnel_monthly",
            "ai_context_consultant_benchmarks_v1",
        ],
        "referencePeriod": context.as_of_period_start.clone().unwrap_or_default(),
    })
}

struct CommandCenterFallback {
    highlights: Vec<String>,
    top_actions: Vec<String>,
    evidence: Value,
}

const BRIEFING_FALLBACK_TITLE: &str = "Daily operating brief";
const BRIEFING_FALLBACK_SUMMARY: &str =
    "Command center metrics reviewed with focus on cash, conversion, and deposits.";
const BRIEFING_FALLBACK_CONFIDENCE: f64 = 0.84;

fn command_center_fallback(context: &Row, company_metrics: &[Row]) -> CommandCenterFallback {
    let conversion = context.f64_or_zero("lead_conversion_rate_12m");
    let coverage = context.f64_or_zero("avg_deposit_coverage_ratio_6m");
    let net_cash = context.f64_or_zero("net_cash_flow_30d");
    let rolling = company_metrics
        .iter()
        .find(|row| row.text("period_type") == "rolling12" && row.text("domain") == "travel");
    let margin = rolling.map_or(0.0, |row| row.f64_or_zero("weighted_margin_pct"));
    let close = rolling.map_or(0.0, |row| row.f64_or_zero("weighted_close_rate"));

    CommandCenterFallback {
        highlights: vec![
            format!("Lead conversion 12m is {}%.", pct(conversion)),
            format!("Deposit coverage 6m average is {}%.", pct(coverage)),
            format!(
                "Projected 30d net cash flow is {}.",
                display_float(round_to(net_cash, 2))
            ),
            format!(
                "Rolling12 company margin is {}% with close rate {}%.",
                pct(margin),
                pct(close)
            ),
        ],
        top_actions: vec![
            "Prioritize consultant coaching for low-conversion segments.".to_string(),
            "Escalate deposit follow-up on at-risk open itineraries.".to_string(),
            "Review short-horizon cash constraints before large commitments.".to_string(),
        ],
        evidence: json!({
            "summary": "Built from ai_context_command_center_v1 aggregate metrics.",
            "metrics": [
                metric("lead_conversion_rate_12m", "Lead conversion (12m)",
                    conversion, Some(0.35), Some(conversion - 0.35), "ratio"),
                metric("avg_deposit_coverage_ratio_6m", "Deposit coverage (6m avg)",
                    coverage, Some(1.0), Some(coverage - 1.0), "ratio"),
                metric("company_margin_pct_rolling12_travel", "Company margin % (rolling12, travel basis)",
                    margin, Some(STRATEGIC_TARGET_MARGIN_PCT),
                    Some(margin - STRATEGIC_TARGET_MARGIN_PCT), "ratio"),
                metric("company_close_rate_rolling12_travel", "Company close rate (rolling12, travel basis)",
                    close, None, None, "ratio"),
            ],
            "sourceViewNames": ["ai_context_command_center_v1", "ai_context_company_metrics_v1"],
            "referencePeriod": context.text("as_of_date"),
        }),
    }
}

fn model_columns(execution: &ModelExecution) -> [(&'static str, Value); 4] {
    [
        ("model_name", json!(execution.model_name)),
        ("model_tier", json!(execution.model_tier.as_str())),
        ("tokens_used", json!(execution.tokens_used)),
        ("latency_ms", json!(execution.latency_ms)),
    ]
}

fn with_columns(mut row: Value, columns: impl IntoIterator<Item = (&'static str, Value)>) -> Value {
    if let Value::Object(map) = &mut row {
        for (key, value) in columns {
            map.insert(key.to_string(), value);
        }
    }
    row
}

/// Itinerary health anomaly, or `None` when both ratios are healthy.
fn itinerary_health_event(run_id: &str, row: &Row) -> Option<Value> {
    let conversion = row.f64_or_zero("conversion_rate");
    let coverage = row.f64_or_zero("deposit_coverage_ratio");
    if conversion >= 0.30 && coverage >= 0.95 {
        return None;
    }
    let severity = if conversion < 0.2 || coverage < 0.8 {
        "high"
    } else {
        "medium"
    };
    let now = Utc::now().to_rfc3339();
    let period = row.opt_text("period_start").filter(|p| !p.is_empty());
    Some(json!({
        "insight_type": "anomaly",
        "domain": "itinerary",
        "severity": severity,
        "status": "new",
        "entity_type": "itinerary_health",
        "entity_id": period.clone().unwrap_or_else(|| common::time::today().to_string()),
        "title": "Itinerary funnel health needs intervention",
        "summary": format!(
            "Conversion is {}% and deposit coverage is {}% in the latest health window.",
            pct(conversion),
            pct(coverage)
        ),
        "recommended_action": "Review lead qualification and deposit follow-up for near-term departures.",
        "priority": 2,
        "confidence": 0.86,
        "evidence": {
            "summary": "Latest itinerary health context breached configured thresholds.",
            "metrics": [
                metric("conversion_rate", "Lead conversion rate",
                    conversion, Some(0.30), Some(conversion - 0.30), "ratio"),
                metric("deposit_coverage_ratio", "Deposit coverage ratio",
                    coverage, Some(0.95), Some(coverage - 0.95), "ratio"),
            ],
            "sourceViewNames": ["ai_context_itinerary_health_v1"],
            "referencePeriod": period.unwrap_or_default(),
        },
        "source_metrics": {"itineraryHealthContext": row},
        "metadata": {"trigger": "manual", "reason": "threshold_breach"},
        "generated_at": now,
        "model_name": llm_client::types::FALLBACK_MODEL_NAME,
        "model_tier": ModelTier::Fallback.as_str(),
        "tokens_used": 0,
        "latency_ms": 0,
        "run_id": run_id,
        "created_at": now,
        "updated_at": now,
    }))
}

/// Outcome of one generation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRunResult {
    pub run_id: String,
    pub trigger: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_events: usize,
    pub created_recommendations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub briefing_generated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultants_evaluated: Option<usize>,
}

pub struct AiOrchestrationService {
    repository: AiInsightsRepository,
    llm: Arc<LlmClient>,
    settings: Arc<Settings>,
    consultants: Option<TravelConsultantsService>,
}

impl AiOrchestrationService {
    pub fn new(
        repository: AiInsightsRepository,
        llm: Arc<LlmClient>,
        settings: Arc<Settings>,
        consultants: Option<TravelConsultantsService>,
    ) -> Self {
        Self {
            repository,
            llm,
            settings,
            consultants,
        }
    }

    pub fn repository(&self) -> &AiInsightsRepository {
        &self.repository
    }

    #[instrument(skip(self))]
    pub async fn generate_insights(&self, trigger: &str) -> Result<GenerationRunResult> {
        let run_id = Uuid::new_v4().to_string();
        if !self.settings.ai.generation_enabled {
            info!(run_id = %run_id, "AI generation disabled; skipping run");
            return Ok(GenerationRunResult {
                run_id,
                trigger: trigger.to_string(),
                status: "skipped".to_string(),
                reason: Some("AI_GENERATION_ENABLED is false".to_string()),
                created_events: 0,
                created_recommendations: 0,
                briefing_generated: None,
                consultants_evaluated: None,
            });
        }

        let briefing = self.generate_command_center_briefing(&run_id).await?;

        let contexts = self.consultant_context_rows().await?;
        let contexts = self.filter_existing_consultants(contexts).await?;
        let mut pairs = Vec::new();
        for context in contexts.iter().filter(|c| c.is_actionable()) {
            pairs.push(self.consultant_recommendation(&run_id, context).await?);
        }

        let mut standalone = Vec::new();
        let health_rows = self.repository.list_itinerary_health_context(1).await?;
        if let Some(event) = health_rows
            .first()
            .and_then(|row| itinerary_health_event(&run_id, row))
        {
            standalone.push(event);
        }

        let mut created_events = self.repository.insert_insight_events(standalone).await?.len();
        let mut created_recommendations = 0;
        for (event, mut recommendation) in pairs {
            let inserted = self.repository.insert_insight_events(vec![event]).await?;
            if let Some(event_row) = inserted.first() {
                if let Value::Object(map) = &mut recommendation {
                    map.insert(
                        "insight_event_id".into(),
                        event_row.get("id").cloned().unwrap_or(Value::Null),
                    );
                }
                created_events += inserted.len();
            }
            created_recommendations += self
                .repository
                .insert_recommendations(vec![recommendation])
                .await?
                .len();
        }

        info!(
            run_id = %run_id,
            created_events,
            created_recommendations,
            consultants = contexts.len(),
            "insight generation completed"
        );
        Ok(GenerationRunResult {
            run_id,
            trigger: trigger.to_string(),
            status: "completed".to_string(),
            reason: None,
            created_events,
            created_recommendations,
            briefing_generated: Some(briefing.is_some()),
            consultants_evaluated: Some(contexts.len()),
        })
    }

    async fn consultant_context_rows(&self) -> Result<Vec<ConsultantContext>> {
        let max = self.settings.ai.max_consultants_per_run;
        let Some(consultants) = &self.consultants else {
            let rows = self
                .repository
                .list_travel_consultant_context(u32::try_from(max).unwrap_or(u32::MAX))
                .await?;
            return Ok(rows
                .into_iter()
                .filter_map(ConsultantContext::from_view_row)
                .collect());
        };

        let board = |period: PeriodType, domain: LeaderboardDomain| async move {
            let filters = LeaderboardFilters::new(period, domain);
            consultants.get_leaderboard(&filters).await
        };
        let rolling_travel = board(PeriodType::Rolling12, LeaderboardDomain::Travel).await?;
        let rolling_funnel = board(PeriodType::Rolling12, LeaderboardDomain::Funnel).await?;
        let year_travel = board(PeriodType::Year, LeaderboardDomain::Travel).await?;
        let monthly_travel = board(PeriodType::Monthly, LeaderboardDomain::Travel).await?;

        let index = |rows: &[LeaderboardRow]| -> HashMap<String, LeaderboardRow> {
            rows.iter().map(|r| (r.employee_id.clone(), r.clone())).collect()
        };
        let funnel_by_id = index(&rolling_funnel.rankings);
        let year_by_id = index(&year_travel.rankings);
        let monthly_by_id = index(&monthly_travel.rankings);

        let benchmark_rows = self.repository.list_consultant_benchmarks_context().await?;
        let benchmarks = benchmark_rows
            .iter()
            .find(|row| row.text("period_type") == "rolling12" && row.text("domain") == "travel")
            .map(TeamBenchmarks::from_view_row)
            .unwrap_or_else(|| TeamBenchmarks::from_rankings(&rolling_travel.rankings));

        let period_start = rolling_travel.period_start.to_string();
        let period_end = rolling_travel.period_end.to_string();
        Ok(rolling_travel
            .rankings
            .iter()
            .take(max)
            .map(|ranking| {
                let funnel = funnel_by_id.get(&ranking.employee_id);
                ConsultantContext {
                    employee_id: ranking.employee_id.clone(),
                    employee_external_id: ranking.employee_external_id.clone(),
                    first_name: ranking.first_name.clone(),
                    last_name: ranking.last_name.clone(),
                    email: ranking.email.clone(),
                    itinerary_count: ranking.itinerary_count,
                    booked_revenue_amount: ranking.booked_revenue,
                    commission_income_amount: ranking.commission_income,
                    margin_pct: ranking.margin_pct,
                    lead_count: ranking.lead_count,
                    closed_won_count: ranking.closed_won_count,
                    closed_lost_count: ranking.closed_lost_count,
                    conversion_rate: ranking.conversion_rate,
                    close_rate: ranking.close_rate,
                    avg_speed_to_book_days: ranking.avg_speed_to_book_days.unwrap_or(0.0),
                    growth_target_variance_pct: ranking.growth_target_variance_pct,
                    yoy_to_date_variance_pct: ranking.yoy_to_date_variance_pct,
                    as_of_period_start: Some(period_start.clone()),
                    as_of_period_end: Some(period_end.clone()),
                    snapshot_monthly_travel: Some(PeriodSnapshot::from_ranking(
                        PeriodType::Monthly,
                        monthly_by_id.get(&ranking.employee_id),
                    )),
                    snapshot_year_travel: Some(PeriodSnapshot::from_ranking(
                        PeriodType::Year,
                        year_by_id.get(&ranking.employee_id),
                    )),
                    snapshot_rolling12_travel: Some(PeriodSnapshot::from_ranking(
                        PeriodType::Rolling12,
                        Some(ranking),
                    )),
                    travel_vs_funnel_split_deltas: Some(SplitDeltas {
                        rolling12: Some(SplitDelta {
                            conversion_rate_delta: ranking.conversion_rate
                                - funnel.map_or(0.0, |f| f.conversion_rate),
                            close_rate_delta: ranking.close_rate
                                - funnel.map_or(0.0, |f| f.close_rate),
                            booked_revenue_delta: ranking.booked_revenue
                                - funnel.map_or(0.0, |f| f.booked_revenue),
                        }),
                    }),
                    benchmark_context: Some(benchmarks.clone()),
                }
            })
            .collect())
    }

    async fn filter_existing_consultants(
        &self,
        contexts: Vec<ConsultantContext>,
    ) -> Result<Vec<ConsultantContext>> {
        let ids: Vec<String> = contexts
            .iter()
            .map(|c| c.employee_id.clone())
            .filter(|id| !id.is_empty())
            .collect();
        let existing = self.repository.list_existing_employee_ids(&ids).await?;
        Ok(contexts
            .into_iter()
            .filter(|c| !c.employee_id.is_empty() && existing.contains(&c.employee_id))
            .collect())
    }

    async fn generate_command_center_briefing(&self, run_id: &str) -> Result<Option<Row>> {
        let context_rows = self.repository.list_command_center_context().await?;
        let Some(context) = context_rows.first() else {
            return Ok(None);
        };
        let company_metrics = self.repository.list_company_metrics_context().await?;
        let fallback = command_center_fallback(context, &company_metrics);
        let fallback_payload = json!({
            "title": BRIEFING_FALLBACK_TITLE,
            "summary": BRIEFING_FALLBACK_SUMMARY,
            "highlights": fallback.highlights,
            "topActions": fallback.top_actions,
            "confidence": BRIEFING_FALLBACK_CONFIDENCE,
            "evidence": fallback.evidence,
        });
        let execution = self
            .llm
            .generate_json(
                Operation::DailyBriefing,
                ModelTier::Decision,
                &prompt_with_schema::<BriefingOutput>(BRIEFING_PROMPT),
                &json!({
                    "domain": "command_center",
                    "context": context,
                    "companyMetrics": company_metrics,
                    "constraints": BRIEFING_CONSTRAINTS,
                }),
                fallback_payload,
            )
            .await?;
        let output: BriefingOutput =
            serde_json::from_value(execution.payload.clone()).unwrap_or_default();

        let now = Utc::now().to_rfc3339();
        let row = with_columns(
            json!({
                "briefing_date": common::time::today().to_string(),
                "title": non_empty(output.title).unwrap_or_else(|| BRIEFING_FALLBACK_TITLE.to_string()),
                "summary": non_empty(output.summary).unwrap_or_else(|| BRIEFING_FALLBACK_SUMMARY.to_string()),
                "highlights": normalize_briefing_items(
                    output.highlights.as_ref(), &fallback.highlights, BriefingItemKind::Highlight),
                "top_actions": normalize_briefing_items(
                    output.top_actions.as_ref(), &fallback.top_actions, BriefingItemKind::Action),
                "confidence": coerce_confidence(output.confidence.as_ref(), BRIEFING_FALLBACK_CONFIDENCE),
                "evidence": fallback.evidence,
                "generated_at": now,
                "run_id": run_id,
                "updated_at": now,
            }),
            model_columns(&execution),
        );
        self.repository.upsert_daily_briefing(row).await
    }

    async fn consultant_recommendation(
        &self,
        run_id: &str,
        context: &ConsultantContext,
    ) -> Result<(Value, Value)> {
        let first_name = match context.first_name.as_str() {
            "" => "Consultant",
            name => name,
        };
        let severity = if context.conversion_rate < 0.25 || context.growth_target_variance_pct < -0.10 {
            "high"
        } else {
            "medium"
        };
        let fallback_priority: i64 = if severity == "high" { 1 } else { 2 };
        let fallback_title = format!("{first_name} coaching opportunity");
        let fallback_summary = consultant_summary(context);
        let fallback_confidence = 0.82;
        let evidence = consultant_evidence(context);

        let execution = self
            .llm
            .generate_json(
                Operation::ConsultantCoaching,
                ModelTier::Decision,
                &prompt_with_schema::<CoachingOutput>(COACHING_PROMPT),
                &json!({
                    "domain": "travel_consultant",
                    "consultant": context,
                    "constraints": COACHING_CONSTRAINTS,
                }),
                json!({
                    "title": fallback_title,
                    "summary": fallback_summary,
                    "recommendedAction": COACHING_FALLBACK_ACTION,
                    "severity": severity,
                    "priority": fallback_priority,
                    "confidence": fallback_confidence,
                    "evidence": evidence,
                }),
            )
            .await?;
        let output: CoachingOutput =
            serde_json::from_value(execution.payload.clone()).unwrap_or_default();

        let title = normalize_consultant_title(
            &non_empty(output.title).unwrap_or(fallback_title),
            context,
        );
        let summary = metric_anchored_summary(
            &non_empty(output.summary).unwrap_or(fallback_summary),
            context,
        );
        let action = normalize_recommended_action(
            &non_empty(output.recommended_action)
                .unwrap_or_else(|| COACHING_FALLBACK_ACTION.to_string()),
            context,
        );
        let severity = match non_empty(output.severity) {
            Some(s) if matches!(s.as_str(), "low" | "medium" | "high" | "critical") => s,
            Some(_) => "medium".to_string(),
            None => severity.to_string(),
        };
        let priority = output
            .priority
            .as_ref()
            .and_then(value_f64)
            .filter(|p| *p != 0.0)
            .map_or(fallback_priority, |p| p as i64)
            .clamp(1, 5);
        let confidence = coerce_confidence(output.confidence.as_ref(), fallback_confidence);

        let now = Utc::now().to_rfc3339();
        let shared = [
            ("domain", json!("travel_consultant")),
            ("status", json!("new")),
            ("entity_type", json!("employee")),
            ("entity_id", json!(context.employee_id)),
            ("title", json!(title)),
            ("summary", json!(summary)),
            ("recommended_action", json!(action)),
            ("priority", json!(priority)),
            ("confidence", json!(confidence)),
            ("evidence", evidence),
            ("generated_at", json!(now)),
            ("run_id", json!(run_id)),
            ("created_at", json!(now)),
            ("updated_at", json!(now)),
        ];
        let event = with_columns(
            json!({
                "insight_type": "coaching_signal",
                "severity": severity,
                "source_metrics": {"consultantContext": context},
                "metadata": {"trigger": "manual", "reason": "coaching_signal"},
            }),
            shared.clone().into_iter().chain(model_columns(&execution)),
        );
        let recommendation = with_columns(
            json!({}),
            shared.into_iter().chain(model_columns(&execution)),
        );
        Ok((event, recommendation))
    }
}
