use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const FALLBACK_MODEL_NAME: &str = "deterministic-fallback";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Decision,
    Support,
    Fallback,
}

impl ModelTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelTier::Decision => "decision",
            ModelTier::Support => "support",
            ModelTier::Fallback => "fallback",
        }
    }

    /// Newer-lineage models tried after the configured primary.
    pub fn fallback_models(self) -> &'static [&'static str] {
        match self {
            ModelTier::Decision => &["gpt-5.2", "gpt-5.1", "gpt-5"],
            ModelTier::Support => &["gpt-5-mini", "gpt-5.1", "gpt-5"],
            ModelTier::Fallback => &[],
        }
    }
}

/// Kinds of generation work, split into decision-critical and support work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    DailyBriefing,
    Recommendation,
    ConsultantCoaching,
    AnomalyExplanation,
    LabelNormalization,
    MetadataExtraction,
    LightSummary,
}

impl Operation {
    pub fn parse(raw: &str) -> Result<Self, LlmError> {
        match raw.trim() {
            "daily_briefing" => Ok(Operation::DailyBriefing),
            "recommendation" => Ok(Operation::Recommendation),
            "consultant_coaching" => Ok(Operation::ConsultantCoaching),
            "anomaly_explanation" => Ok(Operation::AnomalyExplanation),
            "label_normalization" => Ok(Operation::LabelNormalization),
            "metadata_extraction" => Ok(Operation::MetadataExtraction),
            "light_summary" => Ok(Operation::LightSummary),
            other => Err(LlmError::Policy(format!("Unsupported AI operation: {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::DailyBriefing => "daily_briefing",
            Operation::Recommendation => "recommendation",
            Operation::ConsultantCoaching => "consultant_coaching",
            Operation::AnomalyExplanation => "anomaly_explanation",
            Operation::LabelNormalization => "label_normalization",
            Operation::MetadataExtraction => "metadata_extraction",
            Operation::LightSummary => "light_summary",
        }
    }

    pub fn is_decision_critical(self) -> bool {
        matches!(
            self,
            Operation::DailyBriefing
                | Operation::Recommendation
                | Operation::ConsultantCoaching
                | Operation::AnomalyExplanation
        )
    }
}

pub fn validate_tier_for_operation(
    operation: Operation,
    tier: ModelTier,
    allow_support_for_decision: bool,
) -> Result<(), LlmError> {
    if operation.is_decision_critical() {
        if tier != ModelTier::Decision && !allow_support_for_decision {
            return Err(LlmError::Policy(
                "Decision-critical operations must use the decision model tier".into(),
            ));
        }
        return Ok(());
    }
    if tier == ModelTier::Fallback {
        return Err(LlmError::Policy(
            "Support operation must use support or decision tier".into(),
        ));
    }
    Ok(())
}

/// Outcome of one structured generation, model-backed or fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelExecution {
    pub payload: Value,
    pub model_name: String,
    pub model_tier: ModelTier,
    pub tokens_used: u64,
    pub latency_ms: u64,
    pub used_fallback: bool,
}

impl ModelExecution {
    pub fn fallback(payload: Value) -> Self {
        Self {
            payload,
            model_name: FALLBACK_MODEL_NAME.to_string(),
            model_tier: ModelTier::Fallback,
            tokens_used: 0,
            latency_ms: 0,
            used_fallback: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Timeout")]
    Timeout,
    #[error("Schema validation failed: {0}")]
    SchemaValidationFailed(String),
    #[error("{0}")]
    Policy(String),
}

impl From<LlmError> for common::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Policy(message) => common::Error::BadRequest(message),
            other => common::Error::Upstream(other.to_string()),
        }
    }
}

/// JSON Schema of `T`, pretty printed for inclusion in a system prompt.
pub fn schema_instructions<T: JsonSchema>() -> Result<String, LlmError> {
    let schema = schemars::schema_for!(T);
    Ok(serde_json::to_string_pretty(&schema)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_ops_require_decision_tier() {
        let err = validate_tier_for_operation(Operation::DailyBriefing, ModelTier::Support, false)
            .expect_err("support tier rejected");
        assert!(matches!(err, LlmError::Policy(_)));
        assert!(
            validate_tier_for_operation(Operation::DailyBriefing, ModelTier::Support, true).is_ok()
        );
        assert!(
            validate_tier_for_operation(Operation::Recommendation, ModelTier::Decision, false)
                .is_ok()
        );
    }

    #[test]
    fn test_support_ops_accept_support_or_decision() {
        for tier in [ModelTier::Support, ModelTier::Decision] {
            assert!(validate_tier_for_operation(Operation::LightSummary, tier, false).is_ok());
        }
        assert!(
            validate_tier_for_operation(Operation::LightSummary, ModelTier::Fallback, false)
                .is_err()
        );
    }

    #[test]
    fn test_unknown_operation_is_policy_error() {
        assert!(matches!(
            Operation::parse("write_poem"),
            Err(LlmError::Policy(_))
        ));
        assert_eq!(
            Operation::parse("metadata_extraction").expect("known").as_str(),
            "metadata_extraction"
        );
    }

    #[test]
    fn test_policy_error_maps_to_bad_request() {
        let err: common::Error = LlmError::Policy("nope".into()).into();
        assert_eq!(err.status(), 400);
        let err: common::Error = LlmError::Timeout.into();
        assert_eq!(err.status(), 502);
    }
}
