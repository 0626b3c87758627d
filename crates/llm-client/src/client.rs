use crate::types::{
    validate_tier_for_operation, LlmError, ModelExecution, ModelTier, Operation,
    FALLBACK_MODEL_NAME,
};
use common::config::{AiSettings, OpenAiSettings};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model_decision: String,
    pub model_support: String,
    pub max_retries: u32,
    pub timeout: Duration,
    pub allow_support_for_decision: bool,
}

impl LlmConfig {
    pub fn from_settings(openai: &OpenAiSettings, ai: &AiSettings) -> Self {
        Self {
            api_key: openai.api_key.clone().filter(|k| !k.trim().is_empty()),
            base_url: openai.base_url.trim().trim_end_matches('/').to_string(),
            model_decision: openai.model_decision.clone(),
            model_support: openai.model_support.clone(),
            max_retries: openai.max_retries,
            timeout: Duration::from_secs_f64(openai.timeout_seconds.max(1.0)),
            allow_support_for_decision: ai.allow_support_for_decision,
        }
    }
}

pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::ApiError(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn has_api_key(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn model_for_tier(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Decision => &self.config.model_decision,
            ModelTier::Support => &self.config.model_support,
            ModelTier::Fallback => FALLBACK_MODEL_NAME,
        }
    }

    /// Configured model first, then the tier's fallbacks, without repeats.
    pub fn candidate_models(&self, tier: ModelTier) -> Vec<String> {
        let mut candidates = vec![self.model_for_tier(tier).to_string()];
        for model in tier.fallback_models() {
            if !candidates.iter().any(|c| c == model) {
                candidates.push((*model).to_string());
            }
        }
        candidates
    }

    /// Produce a JSON object for `operation`.
    ///
    /// Only the tier policy can fail; a missing key or exhausted candidates
    /// yield `fallback` unchanged.
    #[instrument(skip(self, system_prompt, user_payload, fallback), fields(operation = operation.as_str(), tier = tier.as_str()))]
    pub async fn generate_json(
        &self,
        operation: Operation,
        tier: ModelTier,
        system_prompt: &str,
        user_payload: &Value,
        fallback: Value,
    ) -> Result<ModelExecution, LlmError> {
        validate_tier_for_operation(operation, tier, self.config.allow_support_for_decision)?;

        let Some(api_key) = self.config.api_key.as_deref() else {
            return Ok(ModelExecution::fallback(fallback));
        };

        let user_content = serde_json::to_string(user_payload)?;
        for model in self.candidate_models(tier) {
            match self
                .complete_with_retries(api_key, &model, system_prompt, &user_content)
                .await
            {
                Ok((payload, tokens_used, latency_ms)) => {
                    debug!(model = %model, tokens_used, latency_ms, "model call succeeded");
                    return Ok(ModelExecution {
                        payload,
                        model_name: model,
                        model_tier: tier,
                        tokens_used,
                        latency_ms,
                        used_fallback: false,
                    });
                }
                Err(e) => warn!(model = %model, error = %e, "model candidate exhausted"),
            }
        }

        Ok(ModelExecution::fallback(fallback))
    }

    async fn complete_with_retries(
        &self,
        api_key: &str,
        model: &str,
        system_prompt: &str,
        user_content: &str,
    ) -> Result<(Value, u64, u64), LlmError> {
        let payload = json!({
            "model": model,
            "temperature": 0.1,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_content}
            ]
        });
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut attempt = 0u32;
        loop {
            let started = Instant::now();
            let result = self.complete_once(api_key, &url, &payload).await;
            match result {
                Ok((structured, tokens)) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    return Ok((structured, tokens, latency_ms));
                }
                Err(e) => {
                    if attempt < self.config.max_retries {
                        attempt += 1;
                        sleep(Duration::from_millis(150 * u64::from(attempt))).await;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn complete_once(
        &self,
        api_key: &str,
        url: &str,
        payload: &Value,
    ) -> Result<(Value, u64), LlmError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .header("content-type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::ApiError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| LlmError::ApiError(e.to_string()))?;
        let content = extract_message_content(&response_body)?;
        let structured = parse_json_object(content)?;
        let tokens = response_body
            .pointer("/usage/total_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok((structured, tokens))
    }
}

pub(crate) fn extract_message_content(response_body: &Value) -> Result<&str, LlmError> {
    let choices = response_body
        .get("choices")
        .and_then(Value::as_array)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| LlmError::SchemaValidationFailed("Model response choices missing".into()))?;
    choices[0]
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| LlmError::SchemaValidationFailed("Model response content missing".into()))
}

pub(crate) fn parse_json_object(content: &str) -> Result<Value, LlmError> {
    let parsed: Value = serde_json::from_str(content.trim())?;
    if !parsed.is_object() {
        return Err(LlmError::SchemaValidationFailed(
            "Model response must be a JSON object".into(),
        ));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            api_key: api_key.map(str::to_string),
            base_url: "http://127.0.0.1:9".into(),
            model_decision: "gpt-5.1".into(),
            model_support: "gpt-5-mini".into(),
            max_retries: 0,
            timeout: Duration::from_millis(200),
            allow_support_for_decision: false,
        }
    }

    #[test]
    fn test_candidates_deduplicate_primary() {
        let client = LlmClient::new(config(None)).expect("client builds");
        assert_eq!(
            client.candidate_models(ModelTier::Decision),
            vec!["gpt-5.1", "gpt-5.2", "gpt-5"]
        );
        assert_eq!(
            client.candidate_models(ModelTier::Support),
            vec!["gpt-5-mini", "gpt-5.1", "gpt-5"]
        );
    }

    #[tokio::test]
    async fn test_missing_key_returns_deterministic_fallback() {
        let client = LlmClient::new(config(None)).expect("client builds");
        let result = client
            .generate_json(
                Operation::DailyBriefing,
                ModelTier::Decision,
                "system",
                &json!({"k": 1}),
                json!({"summary": "fallback"}),
            )
            .await
            .expect("fallback is not an error");
        assert!(result.used_fallback);
        assert_eq!(result.model_name, "deterministic-fallback");
        assert_eq!(result.model_tier, ModelTier::Fallback);
        assert_eq!(result.payload["summary"], "fallback");
    }

    #[tokio::test]
    async fn test_policy_checked_before_fallback() {
        let client = LlmClient::new(config(None)).expect("client builds");
        let err = client
            .generate_json(
                Operation::ConsultantCoaching,
                ModelTier::Support,
                "system",
                &json!({}),
                json!({}),
            )
            .await
            .expect_err("policy violation");
        assert!(matches!(err, LlmError::Policy(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_falls_back() {
        let client = LlmClient::new(config(Some("sk-test"))).expect("client builds");
        let result = client
            .generate_json(
                Operation::LightSummary,
                ModelTier::Support,
                "system",
                &json!({}),
                json!({"ok": true}),
            )
            .await
            .expect("falls back");
        assert!(result.used_fallback);
        assert_eq!(result.payload["ok"], true);
    }

    #[test]
    fn test_content_extraction_and_object_check() {
        let body = json!({"choices": [{"message": {"content": "{\"a\": 1}"}}]});
        let content = extract_message_content(&body).expect("content present");
        assert_eq!(parse_json_object(content).expect("object")["a"], 1);

        assert!(extract_message_content(&json!({"choices": []})).is_err());
        assert!(parse_json_object("[1,2]").is_err());
        assert!(parse_json_object("not json").is_err());
    }
}
