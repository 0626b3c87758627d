//! Read side of the AI insight tables plus recommendation status changes.

use chrono::{NaiveDate, Utc};
use common::envelope::Pagination;
use common::row::{Row, RowExt};
use common::{Error, Result};
use serde_json::{json, Map, Value};

use super::repository::AiInsightsRepository;
use super::types::{
    parse_evidence, AiBriefingDaily, AiEntityInsightsResponse, AiInsightEvent,
    AiRecommendationItem, FeedFilters, HistoryFilters, InsightStatus, ItemsResponse,
    RecommendationFilters, RecommendationUpdateRequest,
};

const ENTITY_INSIGHT_LIMIT: u32 = 25;
const BRIEFING_ITEM_MAX_LEN: usize = 170;
const BRIEFING_MAX_ITEMS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BriefingItemKind {
    Highlight,
    Action,
}

pub struct AiInsightsService {
    repository: AiInsightsRepository,
}

impl AiInsightsService {
    pub fn new(repository: AiInsightsRepository) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &AiInsightsRepository {
        &self.repository
    }

    pub async fn get_briefing(&self, briefing_date: Option<NaiveDate>) -> Result<AiBriefingDaily> {
        let row = self
            .repository
            .get_latest_briefing(briefing_date)
            .await?
            .ok_or_else(|| Error::not_found("No AI briefing available"))?;
        Ok(to_briefing(&row))
    }

    pub async fn get_feed(
        &self,
        filters: &FeedFilters,
    ) -> Result<(ItemsResponse<AiInsightEvent>, Pagination)> {
        let (rows, total) = self.repository.list_insight_events(filters).await?;
        let items = rows.iter().map(AiInsightEvent::from_row).collect();
        Ok((
            ItemsResponse { items },
            Pagination::new(filters.page, filters.page_size, total),
        ))
    }

    pub async fn get_history(
        &self,
        filters: &HistoryFilters,
    ) -> Result<(ItemsResponse<AiInsightEvent>, Pagination)> {
        let (rows, total) = self.repository.list_insight_history(filters).await?;
        let items = rows.iter().map(AiInsightEvent::from_row).collect();
        Ok((
            ItemsResponse { items },
            Pagination::new(filters.page, filters.page_size, total),
        ))
    }

    pub async fn get_recommendations(
        &self,
        filters: &RecommendationFilters,
    ) -> Result<(ItemsResponse<AiRecommendationItem>, Pagination)> {
        let (rows, total) = self.repository.list_recommendations(filters).await?;
        let items = rows.iter().map(AiRecommendationItem::from_row).collect();
        Ok((
            ItemsResponse { items },
            Pagination::new(filters.page, filters.page_size, total),
        ))
    }

    pub async fn update_recommendation(
        &self,
        recommendation_id: &str,
        request: RecommendationUpdateRequest,
    ) -> Result<AiRecommendationItem> {
        request.validate()?;
        let existing = self
            .repository
            .get_recommendation(recommendation_id)
            .await?
            .ok_or_else(|| Error::not_found("Recommendation not found"))?;

        let current_raw = existing
            .opt_text("status")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "new".to_string());
        let allowed = InsightStatus::parse(&current_raw)
            .is_some_and(|current| current.can_transition_to(request.status));
        if !allowed {
            return Err(Error::bad_request(format!(
                "Invalid recommendation status transition: {current_raw} -> {}",
                request.status.as_str()
            )));
        }

        let now = Utc::now().to_rfc3339();
        let mut payload = Map::new();
        payload.insert("status".into(), json!(request.status.as_str()));
        payload.insert("updated_at".into(), json!(now));
        if let Some(owner) = request.owner_user_id {
            payload.insert("owner_user_id".into(), json!(owner));
        }
        if let Some(note) = request.resolution_note {
            payload.insert("resolution_note".into(), json!(note));
        }
        if request.status.is_terminal() {
            payload.insert("completed_at".into(), json!(now));
        }

        let updated = self
            .repository
            .update_recommendation(recommendation_id, Value::Object(payload))
            .await?
            .ok_or_else(|| Error::not_found("Recommendation not found"))?;
        Ok(AiRecommendationItem::from_row(&updated))
    }

    pub async fn get_entity_insights(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<AiEntityInsightsResponse> {
        let rows = self
            .repository
            .list_entity_insights(entity_type, entity_id, ENTITY_INSIGHT_LIMIT)
            .await?;
        Ok(AiEntityInsightsResponse {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            items: rows.iter().map(AiInsightEvent::from_row).collect(),
        })
    }
}

fn to_briefing(row: &Row) -> AiBriefingDaily {
    let list = |key: &str, kind: BriefingItemKind| -> Vec<String> {
        row.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| briefing_list_item(item, kind))
                    .filter(|text| !text.is_empty())
                    .take(BRIEFING_MAX_ITEMS)
                    .collect()
            })
            .unwrap_or_default()
    };
    AiBriefingDaily {
        id: row.text("id"),
        briefing_date: row.opt_date("briefing_date").unwrap_or_else(common::time::today),
        title: row.text("title"),
        summary: row.text("summary"),
        highlights: list("highlights", BriefingItemKind::Highlight),
        top_actions: list("top_actions", BriefingItemKind::Action),
        confidence: row.f64_or_zero("confidence"),
        evidence: parse_evidence(row.get("evidence")),
        generated_at: row.opt_datetime("generated_at").unwrap_or_else(Utc::now),
        model_name: row.opt_text("model_name"),
        model_tier: row.opt_text("model_tier"),
        tokens_used: row.opt_f64("tokens_used").map(|v| v as i64),
        latency_ms: row.opt_f64("latency_ms").map(|v| v as i64),
        run_id: row.opt_text("run_id"),
        updated_at: row.opt_datetime("updated_at").unwrap_or_else(Utc::now),
    }
}

pub(crate) fn compact_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse whitespace and clip at a word boundary, appending "..." when cut.
pub fn clip_text(text: &str, max_len: usize) -> String {
    let compact = compact_whitespace(text);
    if compact.chars().count() <= max_len {
        return compact;
    }
    let mut clipped: String = compact.chars().take(max_len).collect();
    clipped = clipped.trim_end().to_string();
    if let Some(idx) = clipped.rfind(' ') {
        clipped.truncate(idx);
    }
    format!("{clipped}...")
}

/// Render a metric value: ratios as percentages, large values with separators.
pub fn format_metric_value(value: &Value, metric: &str) -> String {
    if value.is_null() {
        return String::new();
    }
    let numeric = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    let Some(numeric) = numeric else {
        let raw = match value {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };
        return raw.chars().take(80).collect();
    };
    let metric = metric.to_lowercase();
    if (0.0..=1.5).contains(&numeric)
        && (metric.contains("rate") || metric.contains("ratio") || metric.contains("margin"))
    {
        return format!("{}%", display_float(common::row::round_to(numeric * 100.0, 1)));
    }
    if numeric.abs() >= 1000.0 {
        return thousands(numeric.round() as i64);
    }
    display_float(common::row::round_to(numeric, 2))
}

/// Float text that keeps one decimal for whole numbers ("10.0").
pub fn display_float(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

fn thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        format!("-{out}")
    } else {
        out
    }
}

pub(crate) fn briefing_list_item(item: &Value, kind: BriefingItemKind) -> String {
    match item {
        Value::String(text) => {
            let compact = compact_whitespace(text);
            if compact.is_empty() {
                String::new()
            } else {
                clip_text(&compact, BRIEFING_ITEM_MAX_LEN)
            }
        }
        Value::Object(map) => {
            let field = |key: &str| map.opt_text(key).unwrap_or_default().trim().to_string();
            let note = field("note");
            let metric = field("metric");
            let action = field("action");
            let why = field("why");

            if kind == BriefingItemKind::Highlight {
                let value = format_metric_value(map.get("value").unwrap_or(&Value::Null), &metric);
                let text = match (note.is_empty(), metric.is_empty(), value.is_empty()) {
                    (false, false, false) => Some(format!("{note} ({metric}: {value})")),
                    (false, false, true) => Some(format!("{note} ({metric})")),
                    (false, true, _) => Some(note.clone()),
                    (true, false, _) => Some(metric.clone()),
                    _ => None,
                };
                if let Some(text) = text {
                    return clip_text(&text, BRIEFING_ITEM_MAX_LEN);
                }
            }
            if !action.is_empty() {
                let first_step = map
                    .get("nextSteps")
                    .and_then(Value::as_array)
                    .and_then(|steps| steps.first())
                    .map(|step| match step {
                        Value::String(s) => s.trim().to_string(),
                        other => other.to_string(),
                    })
                    .filter(|s| !s.is_empty());
                return match first_step {
                    Some(step) => clip_text(&format!("{action} Next: {step}"), BRIEFING_ITEM_MAX_LEN),
                    None => clip_text(&action, BRIEFING_ITEM_MAX_LEN),
                };
            }
            if !why.is_empty() {
                return clip_text(&why, BRIEFING_ITEM_MAX_LEN);
            }
            String::new()
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowstore_client::MemoryStore;
    use std::sync::Arc;

    fn service(store: Arc<MemoryStore>) -> AiInsightsService {
        AiInsightsService::new(AiInsightsRepository::new(store))
    }

    #[test]
    fn test_clip_text_breaks_on_words() {
        assert_eq!(clip_text("  short   text ", 20), "short text");
        assert_eq!(clip_text("alpha beta gamma delta", 12), "alpha beta...");
    }

    #[test]
    fn test_metric_formatting() {
        assert_eq!(format_metric_value(&json!(0.315), "Conversion rate"), "31.5%");
        assert_eq!(format_metric_value(&json!(1234567.4), "Revenue"), "1,234,567");
        assert_eq!(format_metric_value(&json!(12.3456), "Leads"), "12.35");
        assert_eq!(format_metric_value(&json!("n/a"), "Leads"), "n/a");
        assert_eq!(format_metric_value(&Value::Null, "Leads"), "");
    }

    #[test]
    fn test_briefing_items_from_objects() {
        let highlight = json!({"note": "Bookings up", "metric": "close rate", "value": 0.42});
        assert_eq!(
            briefing_list_item(&highlight, BriefingItemKind::Highlight),
            "Bookings up (close rate: 42.0%)"
        );
        let action = json!({"action": "Call top agents.", "nextSteps": ["Share deck"]});
        assert_eq!(
            briefing_list_item(&action, BriefingItemKind::Action),
            "Call top agents. Next: Share deck"
        );
        assert_eq!(
            briefing_list_item(&json!({"why": "Margin slipping"}), BriefingItemKind::Action),
            "Margin slipping"
        );
        assert_eq!(briefing_list_item(&json!(42), BriefingItemKind::Action), "");
    }

    #[tokio::test]
    async fn test_missing_briefing_is_not_found() {
        let svc = service(Arc::new(MemoryStore::new()));
        let err = svc.get_briefing(None).await.expect_err("no briefing");
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.to_string(), "No AI briefing available");
    }

    #[tokio::test]
    async fn test_briefing_lists_are_capped() {
        let highlights: Vec<String> = (0..9).map(|i| format!("Item {i}")).collect();
        let store = Arc::new(MemoryStore::new().with_rows(
            "ai_briefings_daily",
            [json!({
                "id": "b1",
                "briefing_date": "2026-02-18",
                "title": "Daily operating brief",
                "highlights": highlights,
                "top_actions": ["", "Act now"],
                "confidence": 0.84,
            })],
        ));
        let briefing = service(store).get_briefing(None).await.expect("briefing");
        assert_eq!(briefing.highlights.len(), 6);
        assert_eq!(briefing.top_actions, vec!["Act now"]);
        assert_eq!(briefing.briefing_date.to_string(), "2026-02-18");
    }

    #[tokio::test]
    async fn test_recommendation_transitions() {
        let store = Arc::new(MemoryStore::new().with_rows(
            "ai_recommendation_queue",
            [json!({"id": "r1", "status": "new", "title": "Follow up", "priority": 2})],
        ));
        let svc = service(store.clone());

        let request = |status: InsightStatus| RecommendationUpdateRequest {
            status,
            owner_user_id: None,
            resolution_note: None,
        };

        let err = svc
            .update_recommendation("r1", request(InsightStatus::Resolved))
            .await
            .expect_err("skip ahead");
        assert_eq!(
            err.to_string(),
            "Invalid recommendation status transition: new -> resolved"
        );

        let updated = svc
            .update_recommendation("r1", request(InsightStatus::Acknowledged))
            .await
            .expect("acknowledge");
        assert_eq!(updated.status, "acknowledged");
        assert!(updated.completed_at.is_none());

        let dismissed = svc
            .update_recommendation("r1", request(InsightStatus::Dismissed))
            .await
            .expect("dismiss");
        assert!(dismissed.completed_at.is_some());

        let err = svc
            .update_recommendation("missing", request(InsightStatus::New))
            .await
            .expect_err("unknown id");
        assert!(matches!(err, Error::NotFound(_)));
    }
}
