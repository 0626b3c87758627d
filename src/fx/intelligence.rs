//! Macro and news context per target currency, summarised by the support model.

use chrono::Utc;
use common::row::{de_opt_decimal, de_string_list};
use common::{Result, Settings};
use llm_client::{LlmClient, ModelTier, Operation};
use market_data_client::{MacroProvider, NewsProvider};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::repository::{FxRepository, PageRequest};
use super::types::{FxIntelligenceItem, FxManualRunResult, IntelligenceRunType};

const TRUSTED_SOURCE_HOSTS: [&str; 10] = [
    "fred.stlouisfed.org",
    "stlouisfed.org",
    "federalreserve.gov",
    "rba.gov.au",
    "rbnz.govt.nz",
    "resbank.co.za",
    "reuters.com",
    "bloomberg.com",
    "ft.com",
    "wsj.com",
];
const RISK_DIRECTIONS: [&str; 4] = ["bullish", "bearish", "neutral", "mixed"];
const MACRO_OBSERVATION_LIMIT: u32 = 5;
const NEWS_ARTICLE_LIMIT: u32 = 10;
const MAX_SYNTHESIS_SOURCES: usize = 12;
const MAX_ITEM_TAGS: usize = 8;

const SYNTHESIS_PROMPT: &str = "You are an FX intelligence summarizer for finance operators. \
Return JSON with keys: summary (string), trendTags (array of max 5 short strings), \
riskDirection (bullish|bearish|neutral|mixed), confidence (0..1). \
Use concise business language and avoid speculation beyond provided sources.";

fn macro_series(currency: &str) -> Option<&'static str> {
    match currency {
        "AUD" => Some("DEXUSAL"),
        "NZD" => Some("DEXUSNZ"),
        "ZAR" => Some("DEXSFUS"),
        _ => None,
    }
}

fn news_keywords(currency: &str) -> String {
    match currency {
        "AUD" => "australian dollar OR RBA OR AUDUSD".into(),
        "NZD" => "new zealand dollar OR RBNZ OR NZDUSD".into(),
        "ZAR" => "south african rand OR SARB OR USDZAR".into(),
        other => other.to_string(),
    }
}

/// 0.90 for known central bank and wire hosts, otherwise 0.55.
pub fn credibility_score(url: &str, publisher: Option<&str>) -> Decimal {
    let haystack = format!("{url} {}", publisher.unwrap_or_default()).to_lowercase();
    if TRUSTED_SOURCE_HOSTS.iter().any(|host| haystack.contains(host)) {
        Decimal::new(90, 2)
    } else {
        Decimal::new(55, 2)
    }
}

/// One macro observation or news article ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceItem {
    pub source_type: &'static str,
    pub title: String,
    pub url: String,
    pub publisher: Option<String>,
    pub credibility: Decimal,
    pub published_at: Option<String>,
    pub raw: Value,
}

/// Drop items without a url or title and keep the first item per url.
pub fn dedupe_sources(items: Vec<SourceItem>) -> Vec<SourceItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| !item.url.trim().is_empty() && !item.title.trim().is_empty())
        .filter(|item| seen.insert(item.url.trim().to_string()))
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Synthesis {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default, deserialize_with = "de_string_list")]
    trend_tags: Vec<String>,
    #[serde(default)]
    risk_direction: Option<String>,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    confidence: Option<Decimal>,
}

pub struct FxIntelligenceService {
    repository: FxRepository,
    llm: Arc<LlmClient>,
    settings: Arc<Settings>,
    macro_provider: Option<Arc<dyn MacroProvider>>,
    news_provider: Option<Arc<dyn NewsProvider>>,
}

impl FxIntelligenceService {
    pub fn new(
        repository: FxRepository,
        llm: Arc<LlmClient>,
        settings: Arc<Settings>,
        macro_provider: Option<Arc<dyn MacroProvider>>,
        news_provider: Option<Arc<dyn NewsProvider>>,
    ) -> Self {
        Self {
            repository,
            llm,
            settings,
            macro_provider,
            news_provider,
        }
    }

    pub async fn list_intelligence(
        &self,
        page: u32,
        page_size: u32,
        include_totals: bool,
        currency_code: Option<&str>,
    ) -> Result<(Vec<FxIntelligenceItem>, u64)> {
        self.repository
            .list_intelligence(PageRequest::new(page, page_size, include_totals), currency_code)
            .await
    }

    #[instrument(skip(self, run_type), fields(run_type = run_type.as_str()))]
    pub async fn run_intelligence(&self, run_type: IntelligenceRunType) -> Result<FxManualRunResult> {
        let run = self
            .repository
            .create_intelligence_run(json!({
                "run_type": run_type.as_str(),
                "status": "running",
                "metadata": {
                    "macroProvider": self.settings.fx.macro_provider,
                    "newsProvider": self.settings.fx.news_provider,
                },
            }))
            .await?;

        match self.collect_and_store(&run.id).await {
            Ok(result) => Ok(result),
            Err(err) => {
                let update = self
                    .repository
                    .update_intelligence_run(
                        &run.id,
                        json!({
                            "status": "failed",
                            "completed_at": Utc::now().to_rfc3339(),
                            "error_message": err.to_string(),
                        }),
                    )
                    .await;
                if let Err(update_err) = update {
                    warn!(run_id = %run.id, error = %update_err, "failed to mark intelligence run failed");
                }
                Err(err)
            }
        }
    }

    async fn collect_and_store(&self, run_id: &str) -> Result<FxManualRunResult> {
        let mut rows = Vec::new();
        let mut total_sources = 0usize;

        for currency in self.settings.fx_target_currencies() {
            let mut sources = self.fetch_macro_items(&currency).await;
            sources.extend(self.fetch_news_items(&currency).await);
            let sources = dedupe_sources(sources);
            total_sources += sources.len();
            if sources.is_empty() {
                debug!(currency, "no intelligence sources");
                continue;
            }

            let synthesis = self.synthesize(&currency, &sources).await?;
            let risk_direction = synthesis
                .risk_direction
                .filter(|d| RISK_DIRECTIONS.contains(&d.as_str()))
                .unwrap_or_else(|| "neutral".to_string());
            let summary = synthesis
                .summary
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| {
                    format!("{currency} intelligence synthesized from current macro and news sources.")
                });
            let tags: Vec<String> = synthesis.trend_tags.into_iter().take(MAX_ITEM_TAGS).collect();

            rows.extend(sources.into_iter().map(|source| {
                json!({
                    "run_id": run_id,
                    "currency_code": currency,
                    "source_type": source.source_type,
                    "source_title": source.title,
                    "source_url": source.url,
                    "source_publisher": source.publisher,
                    "source_credibility_score": source.credibility,
                    "published_at": source.published_at,
                    "risk_direction": risk_direction,
                    "confidence": synthesis.confidence,
                    "trend_tags": tags,
                    "summary": summary,
                    "raw_payload": source.raw,
                })
            }));
        }

        let created = rows.len();
        self.repository.insert_intelligence_items(rows).await?;

        let status = if total_sources >= self.settings.fx.intelligence_min_source_count {
            "success"
        } else {
            "partial"
        };
        self.repository
            .update_intelligence_run(
                run_id,
                json!({
                    "status": status,
                    "completed_at": Utc::now().to_rfc3339(),
                    "source_count": total_sources,
                    "model_name": self.settings.openai.model_support,
                    "model_tier": ModelTier::Support.as_str(),
                }),
            )
            .await?;
        info!(run_id, total_sources, created, status, "FX intelligence run completed");

        Ok(FxManualRunResult {
            run_id: run_id.to_string(),
            status: status.into(),
            records_processed: total_sources,
            records_created: created,
            message: "FX intelligence run completed".into(),
        })
    }

    async fn fetch_macro_items(&self, currency: &str) -> Vec<SourceItem> {
        let (Some(provider), Some(series_id)) = (&self.macro_provider, macro_series(currency)) else {
            return Vec::new();
        };
        let observations = match provider.observations(series_id, MACRO_OBSERVATION_LIMIT).await {
            Ok(observations) => observations,
            Err(err) => {
                warn!(currency, series_id, error = %err, "macro fetch failed");
                return Vec::new();
            }
        };
        observations
            .into_iter()
            .map(|obs| SourceItem {
                source_type: "macro",
                title: format!("FRED {series_id} observation"),
                url: format!("https://fred.stlouisfed.org/series/{series_id}"),
                publisher: Some("FRED".into()),
                credibility: Decimal::new(95, 2),
                published_at: Some(format!("{}T00:00:00+00:00", obs.date)),
                raw: json!({"seriesId": series_id, "date": obs.date, "value": obs.value}),
            })
            .collect()
    }

    async fn fetch_news_items(&self, currency: &str) -> Vec<SourceItem> {
        let Some(provider) = &self.news_provider else {
            return Vec::new();
        };
        let articles = match provider.news(&news_keywords(currency), NEWS_ARTICLE_LIMIT).await {
            Ok(articles) => articles,
            Err(err) => {
                warn!(currency, error = %err, "news fetch failed");
                return Vec::new();
            }
        };
        articles
            .into_iter()
            .map(|article| {
                let publisher = article.source.filter(|s| !s.is_empty());
                SourceItem {
                    source_type: "news",
                    credibility: credibility_score(&article.url, publisher.as_deref()),
                    title: article.title,
                    url: article.url,
                    publisher,
                    published_at: article.published_at,
                    raw: article.raw,
                }
            })
            .collect()
    }

    async fn synthesize(&self, currency: &str, sources: &[SourceItem]) -> Result<Synthesis> {
        let payload = json!({
            "currencyCode": currency,
            "sources": sources
                .iter()
                .take(MAX_SYNTHESIS_SOURCES)
                .map(|s| json!({
                    "title": s.title,
                    "url": s.url,
                    "publisher": s.publisher,
                    "credibilityScore": common::row::decimal_to_f64(s.credibility),
                    "publishedAt": s.published_at,
                }))
                .collect::<Vec<_>>(),
        });
        let fallback = json!({
            "summary": format!("{currency} market context synthesized from validated macro and news sources."),
            "trendTags": ["Market Update"],
            "riskDirection": "neutral",
            "confidence": 0.5,
        });
        let execution = self
            .llm
            .generate_json(
                Operation::LightSummary,
                ModelTier::Support,
                SYNTHESIS_PROMPT,
                &payload,
                fallback,
            )
            .await?;
        Ok(serde_json::from_value(execution.payload).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llm_client::LlmConfig;
    use market_data_client::{NewsArticle, Observation, ProviderError};
    use rowstore_client::{memory::WriteKind, MemoryStore};

    struct FakeMacro;

    #[async_trait]
    impl MacroProvider for FakeMacro {
        async fn observations(
            &self,
            series_id: &str,
            _limit: u32,
        ) -> std::result::Result<Vec<Observation>, ProviderError> {
            if series_id == "DEXSFUS" {
                return Err(ProviderError::Provider("series offline".into()));
            }
            Ok(vec![Observation {
                series_id: series_id.to_string(),
                date: "2026-02-17".into(),
                value: "0.6512".into(),
            }])
        }
    }

    struct FakeNews;

    #[async_trait]
    impl NewsProvider for FakeNews {
        async fn news(
            &self,
            search: &str,
            _limit: u32,
        ) -> std::result::Result<Vec<NewsArticle>, ProviderError> {
            let slug = search.split_whitespace().next().unwrap_or("fx");
            Ok(vec![
                NewsArticle {
                    title: format!("{slug} moves"),
                    url: format!("https://www.reuters.com/markets/{slug}"),
                    source: Some("reuters.com".into()),
                    published_at: Some("2026-02-18T08:00:00Z".into()),
                    raw: json!({"slug": slug}),
                },
                NewsArticle {
                    title: format!("{slug} moves again"),
                    url: format!("https://www.reuters.com/markets/{slug}"),
                    source: Some("reuters.com".into()),
                    published_at: None,
                    raw: json!({}),
                },
            ])
        }
    }

    fn offline_llm(settings: &Settings) -> Arc<LlmClient> {
        let config = LlmConfig::from_settings(&settings.openai, &settings.ai);
        Arc::new(LlmClient::new(config).expect("client builds"))
    }

    fn service(store: Arc<MemoryStore>, min_sources: usize) -> FxIntelligenceService {
        let mut settings = Settings::default();
        settings.fx.intelligence_min_source_count = min_sources;
        let llm = offline_llm(&settings);
        FxIntelligenceService::new(
            FxRepository::new(store),
            llm,
            Arc::new(settings),
            Some(Arc::new(FakeMacro)),
            Some(Arc::new(FakeNews)),
        )
    }

    #[test]
    fn test_credibility_prefers_trusted_hosts() {
        assert_eq!(
            credibility_score("https://www.rba.gov.au/media", None),
            Decimal::new(90, 2)
        );
        assert_eq!(
            credibility_score("https://blog.example.com/post", Some("wsj.com")),
            Decimal::new(90, 2)
        );
        assert_eq!(
            credibility_score("https://blog.example.com/post", None),
            Decimal::new(55, 2)
        );
    }

    #[test]
    fn test_dedupe_keeps_first_per_url() {
        let item = |title: &str, url: &str| SourceItem {
            source_type: "news",
            title: title.into(),
            url: url.into(),
            publisher: None,
            credibility: Decimal::ONE,
            published_at: None,
            raw: Value::Null,
        };
        let deduped = dedupe_sources(vec![
            item("a", "https://x"),
            item("b", "https://x"),
            item("", "https://y"),
            item("c", ""),
            item("d", "https://z"),
        ]);
        let titles: Vec<&str> = deduped.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "d"]);
    }

    #[tokio::test]
    async fn test_run_stores_items_with_fallback_synthesis() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone(), 3);

        let result = svc
            .run_intelligence(IntelligenceRunType::OnDemand)
            .await
            .expect("run completes");

        // AUD and NZD: one macro + one deduped news item each; ZAR: news only.
        assert_eq!(result.records_processed, 5);
        assert_eq!(result.records_created, 5);
        assert_eq!(result.status, "success");
        assert_eq!(result.message, "FX intelligence run completed");

        let items = store.rows("fx_intelligence_items");
        let aud_macro = items
            .iter()
            .find(|row| row["currency_code"] == "AUD" && row["source_type"] == "macro")
            .expect("AUD macro item");
        assert_eq!(aud_macro["source_url"], "https://fred.stlouisfed.org/series/DEXUSAL");
        assert_eq!(aud_macro["published_at"], "2026-02-17T00:00:00+00:00");
        assert_eq!(aud_macro["trend_tags"], json!(["Market Update"]));
        assert_eq!(aud_macro["risk_direction"], "neutral");
        assert_eq!(
            aud_macro["summary"],
            "AUD market context synthesized from validated macro and news sources."
        );

        let update = store
            .writes_to("fx_intelligence_runs")
            .into_iter()
            .filter(|w| w.kind == WriteKind::Update)
            .last()
            .expect("run updated");
        assert_eq!(update.payload["model_tier"], "support");
        assert_eq!(update.payload["source_count"], 5);
    }

    #[tokio::test]
    async fn test_run_is_partial_below_source_threshold() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store, 50);

        let result = svc
            .run_intelligence(IntelligenceRunType::Daily)
            .await
            .expect("run completes");
        assert_eq!(result.status, "partial");
    }

    #[tokio::test]
    async fn test_store_failure_marks_run_failed() {
        let store = Arc::new(MemoryStore::new());
        store.fail_table("fx_intelligence_items");
        let svc = service(store.clone(), 3);

        svc.run_intelligence(IntelligenceRunType::OnDemand)
            .await
            .expect_err("insert fails");

        let failed = store
            .writes_to("fx_intelligence_runs")
            .into_iter()
            .any(|w| w.kind == WriteKind::Update && w.payload["status"] == "failed");
        assert!(failed);
    }
}
