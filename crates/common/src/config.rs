//! Service configuration types and environment loading.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Currencies the FX desk buys against USD.
pub const FX_TARGET_UNIVERSE: [&str; 3] = ["AUD", "NZD", "ZAR"];

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Listen address for the HTTP server.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Comma separated list of allowed CORS origins.
    #[serde(default = "default_cors_allow_origins")]
    pub cors_allow_origins: String,

    /// Row store endpoint root (without `/rest/v1`).
    #[serde(default)]
    pub supabase_url: String,
    #[serde(default)]
    pub supabase_service_role_key: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,

    #[serde(default)]
    pub openai: OpenAiSettings,
    #[serde(default)]
    pub ai: AiSettings,
    #[serde(default)]
    pub fx: FxSettings,
}

/// Language model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_decision")]
    pub model_decision: String,
    #[serde(default = "default_model_support")]
    pub model_support: String,
    #[serde(default = "default_openai_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_openai_timeout")]
    pub timeout_seconds: f64,
}

/// AI insight generation switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSettings {
    #[serde(default = "default_true")]
    pub generation_enabled: bool,
    #[serde(default)]
    pub allow_support_for_decision: bool,
    #[serde(default = "default_max_consultants")]
    pub max_consultants_per_run: usize,
    #[serde(default)]
    pub manual_run_token: Option<String>,
}

/// FX desk settings: rate provider, ledger policy and intelligence sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxSettings {
    #[serde(default = "default_fx_targets")]
    pub target_currencies: String,
    #[serde(default = "default_fx_base")]
    pub base_currency: String,
    #[serde(default = "default_fx_provider")]
    pub primary_provider: String,
    #[serde(default)]
    pub primary_api_key: Option<String>,
    #[serde(default = "default_fx_base_url")]
    pub primary_base_url: String,
    #[serde(default = "default_fx_retries")]
    pub max_pull_retries: u32,
    /// Latest rate older than this blocks a signal run.
    #[serde(default = "default_fx_stale_minutes")]
    pub stale_after_minutes: i64,
    #[serde(default)]
    pub allow_negative_balance: bool,
    #[serde(default)]
    pub manual_run_token: Option<String>,

    #[serde(default = "default_macro_provider")]
    pub macro_provider: String,
    #[serde(default)]
    pub macro_api_key: Option<String>,
    #[serde(default = "default_macro_base_url")]
    pub macro_base_url: String,
    #[serde(default = "default_news_provider")]
    pub news_provider: String,
    #[serde(default)]
    pub news_api_key: Option<String>,
    #[serde(default = "default_news_base_url")]
    pub news_base_url: String,
    #[serde(default = "default_min_source_count")]
    pub intelligence_min_source_count: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_app_name() -> String {
    "SwainOS Backend".into()
}
fn default_environment() -> String {
    "development".into()
}
fn default_api_prefix() -> String {
    "/api/v1".into()
}
fn default_bind_addr() -> String {
    "0.0.0.0:8000".into()
}
fn default_cors_allow_origins() -> String {
    "http://localhost:3000,http://127.0.0.1:3000".into()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model_decision() -> String {
    "gpt-5.2".into()
}
fn default_model_support() -> String {
    "gpt-5-mini".into()
}
fn default_openai_max_retries() -> u32 {
    2
}
fn default_openai_timeout() -> f64 {
    60.0
}
fn default_max_consultants() -> usize {
    25
}

fn default_fx_targets() -> String {
    "AUD,NZD,ZAR".into()
}
fn default_fx_base() -> String {
    "USD".into()
}
fn default_fx_provider() -> String {
    "twelve_data".into()
}
fn default_fx_base_url() -> String {
    "https://api.twelvedata.com".into()
}
fn default_fx_retries() -> u32 {
    3
}
fn default_fx_stale_minutes() -> i64 {
    1440
}
fn default_macro_provider() -> String {
    "fred".into()
}
fn default_macro_base_url() -> String {
    "https://api.stlouisfed.org/fred".into()
}
fn default_news_provider() -> String {
    "marketaux".into()
}
fn default_news_base_url() -> String {
    "https://api.marketaux.com".into()
}
fn default_min_source_count() -> usize {
    3
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            model_decision: default_model_decision(),
            model_support: default_model_support(),
            max_retries: default_openai_max_retries(),
            timeout_seconds: default_openai_timeout(),
        }
    }
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            generation_enabled: true,
            allow_support_for_decision: false,
            max_consultants_per_run: default_max_consultants(),
            manual_run_token: None,
        }
    }
}

impl Default for FxSettings {
    fn default() -> Self {
        Self {
            target_currencies: default_fx_targets(),
            base_currency: default_fx_base(),
            primary_provider: default_fx_provider(),
            primary_api_key: None,
            primary_base_url: default_fx_base_url(),
            max_pull_retries: default_fx_retries(),
            stale_after_minutes: default_fx_stale_minutes(),
            allow_negative_balance: false,
            manual_run_token: None,
            macro_provider: default_macro_provider(),
            macro_api_key: None,
            macro_base_url: default_macro_base_url(),
            news_provider: default_news_provider(),
            news_api_key: None,
            news_base_url: default_news_base_url(),
            intelligence_min_source_count: default_min_source_count(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            environment: default_environment(),
            api_prefix: default_api_prefix(),
            bind_addr: default_bind_addr(),
            cors_allow_origins: default_cors_allow_origins(),
            supabase_url: String::new(),
            supabase_service_role_key: None,
            supabase_anon_key: None,
            openai: OpenAiSettings::default(),
            ai: AiSettings::default(),
            fx: FxSettings::default(),
        }
    }
}

// ── Env parsing ───────────────────────────────────────────────────────

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

fn parse_number<T: std::str::FromStr>(raw: &str, env_name: &str) -> Result<T, Error> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number")))
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl Settings {
    /// Build settings from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; values missing from the lookup keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).and_then(non_empty);
        let mut settings = Settings::default();

        if let Some(v) = text("APP_NAME") {
            settings.app_name = v;
        }
        if let Some(v) = text("ENVIRONMENT") {
            settings.environment = v;
        }
        if let Some(v) = text("API_PREFIX") {
            settings.api_prefix = v;
        }
        if let Some(v) = text("BIND_ADDR") {
            settings.bind_addr = v;
        }
        if let Some(v) = text("CORS_ALLOW_ORIGINS") {
            settings.cors_allow_origins = v;
        }
        if let Some(v) = text("SUPABASE_URL") {
            settings.supabase_url = v;
        }
        settings.supabase_service_role_key = text("SUPABASE_SERVICE_ROLE_KEY");
        settings.supabase_anon_key = text("SUPABASE_ANON_KEY");

        let openai = &mut settings.openai;
        openai.api_key = text("OPENAI_API_KEY");
        if let Some(v) = text("OPENAI_BASE_URL") {
            openai.base_url = v;
        }
        if let Some(v) = text("OPENAI_MODEL_DECISION") {
            openai.model_decision = v;
        }
        if let Some(v) = text("OPENAI_MODEL_SUPPORT") {
            openai.model_support = v;
        }
        if let Some(v) = text("OPENAI_MAX_RETRIES") {
            openai.max_retries = parse_number(&v, "OPENAI_MAX_RETRIES")?;
        }
        if let Some(v) = text("OPENAI_TIMEOUT_SECONDS") {
            openai.timeout_seconds = parse_number(&v, "OPENAI_TIMEOUT_SECONDS")?;
        }

        let ai = &mut settings.ai;
        if let Some(v) = text("AI_GENERATION_ENABLED") {
            ai.generation_enabled = parse_bool(&v);
        }
        if let Some(v) = text("AI_ALLOW_SUPPORT_FOR_DECISION") {
            ai.allow_support_for_decision = parse_bool(&v);
        }
        if let Some(v) = text("AI_MAX_CONSULTANTS_PER_RUN") {
            ai.max_consultants_per_run = parse_number(&v, "AI_MAX_CONSULTANTS_PER_RUN")?;
        }
        ai.manual_run_token = text("AI_MANUAL_RUN_TOKEN");

        let fx = &mut settings.fx;
        if let Some(v) = text("FX_TARGET_CURRENCIES") {
            fx.target_currencies = v;
        }
        if let Some(v) = text("FX_BASE_CURRENCY") {
            fx.base_currency = v.to_ascii_uppercase();
        }
        if let Some(v) = text("FX_PRIMARY_PROVIDER") {
            fx.primary_provider = v.to_ascii_lowercase();
        }
        fx.primary_api_key = text("FX_PRIMARY_API_KEY");
        if let Some(v) = text("FX_PRIMARY_BASE_URL") {
            fx.primary_base_url = v;
        }
        if let Some(v) = text("FX_MAX_PULL_RETRIES") {
            fx.max_pull_retries = parse_number(&v, "FX_MAX_PULL_RETRIES")?;
        }
        if let Some(v) = text("FX_STALE_AFTER_MINUTES") {
            fx.stale_after_minutes = parse_number(&v, "FX_STALE_AFTER_MINUTES")?;
        }
        if let Some(v) = text("FX_ALLOW_NEGATIVE_BALANCE") {
            fx.allow_negative_balance = parse_bool(&v);
        }
        fx.manual_run_token = text("FX_MANUAL_RUN_TOKEN");
        if let Some(v) = text("FX_MACRO_PROVIDER") {
            fx.macro_provider = v.to_ascii_lowercase();
        }
        fx.macro_api_key = text("FX_MACRO_API_KEY");
        if let Some(v) = text("FX_MACRO_BASE_URL") {
            fx.macro_base_url = v;
        }
        if let Some(v) = text("FX_NEWS_PROVIDER") {
            fx.news_provider = v.to_ascii_lowercase();
        }
        fx.news_api_key = text("FX_NEWS_API_KEY");
        if let Some(v) = text("FX_NEWS_BASE_URL") {
            fx.news_base_url = v;
        }
        if let Some(v) = text("FX_INTELLIGENCE_MIN_SOURCE_COUNT") {
            fx.intelligence_min_source_count =
                parse_number(&v, "FX_INTELLIGENCE_MIN_SOURCE_COUNT")?;
        }

        validate_settings(&settings)?;
        Ok(settings)
    }

    /// Key used for row store requests; the service role key wins over anon.
    pub fn row_store_key(&self) -> Option<&str> {
        self.supabase_service_role_key
            .as_deref()
            .or(self.supabase_anon_key.as_deref())
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allow_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Configured FX targets, restricted to the supported universe.
    pub fn fx_target_currencies(&self) -> Vec<String> {
        let mut targets: Vec<String> = self
            .fx
            .target_currencies
            .split(',')
            .map(|code| code.trim().to_ascii_uppercase())
            .filter(|code| FX_TARGET_UNIVERSE.contains(&code.as_str()))
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }
}

fn validate_settings(settings: &Settings) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if settings.supabase_url.trim().is_empty() {
        issues.push("SUPABASE_URL is required".into());
    }
    if settings.row_store_key().is_none() {
        issues.push("SUPABASE_SERVICE_ROLE_KEY or SUPABASE_ANON_KEY is required".into());
    }
    if !settings.api_prefix.starts_with('/') {
        issues.push("API_PREFIX must start with '/'".into());
    }
    if settings.openai.timeout_seconds <= 0.0 {
        issues.push("OPENAI_TIMEOUT_SECONDS must be > 0".into());
    }
    if settings.fx.stale_after_minutes <= 0 {
        issues.push("FX_STALE_AFTER_MINUTES must be > 0".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(issues.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply_when_env_is_minimal() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("SUPABASE_URL", "https://example.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
        ]))
        .expect("settings should load");

        assert_eq!(settings.app_name, "SwainOS Backend");
        assert_eq!(settings.api_prefix, "/api/v1");
        assert_eq!(settings.openai.model_decision, "gpt-5.2");
        assert_eq!(settings.openai.max_retries, 2);
        assert!(settings.ai.generation_enabled);
        assert_eq!(settings.ai.max_consultants_per_run, 25);
        assert_eq!(settings.row_store_key(), Some("anon"));
        assert_eq!(
            settings.cors_origins(),
            vec!["http://localhost:3000", "http://127.0.0.1:3000"]
        );
    }

    #[test]
    fn test_service_role_key_preferred() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("SUPABASE_URL", "https://example.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("SUPABASE_SERVICE_ROLE_KEY", "service"),
        ]))
        .expect("settings should load");
        assert_eq!(settings.row_store_key(), Some("service"));
    }

    #[test]
    fn test_missing_url_and_key_reported_together() {
        let err = Settings::from_lookup(lookup_from(&[])).expect_err("should fail");
        let message = err.to_string();
        assert!(message.contains("SUPABASE_URL is required"));
        assert!(message.contains("SUPABASE_ANON_KEY"));
    }

    #[test]
    fn test_fx_targets_filtered_and_sorted() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("SUPABASE_URL", "https://example.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("FX_TARGET_CURRENCIES", " zar, EUR ,aud,ZAR"),
            ("AI_GENERATION_ENABLED", "false"),
        ]))
        .expect("settings should load");
        assert_eq!(settings.fx_target_currencies(), vec!["AUD", "ZAR"]);
        assert!(!settings.ai.generation_enabled);
    }

    #[test]
    fn test_bad_number_is_config_error() {
        let err = Settings::from_lookup(lookup_from(&[
            ("SUPABASE_URL", "https://example.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("OPENAI_MAX_RETRIES", "many"),
        ]))
        .expect_err("should fail");
        assert!(matches!(err, Error::Config(_)));
    }
}
