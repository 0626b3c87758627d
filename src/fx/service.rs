//! FX desk operations: rate pulls, signal runs and the transaction ledger.

use chrono::{DateTime, Duration, Utc};
use common::{Error, Result, Settings};
use market_data_client::{ExchangeRateQuote, ProviderError, RateProvider};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::repository::{FxRepository, PageRequest};
use super::signals::{collect_context, score_signal, SignalInputs};
use super::types::{
    FxBackfillResult, FxExposure, FxHolding, FxInvoicePressure, FxManualRunResult, FxRate,
    FxSignal, FxTransaction, FxTransactionCreateRequest, RunType, TransactionType,
    SUPPORTED_CURRENCIES,
};

/// Minimum rate points with a mid price before a currency can be scored.
pub const MIN_SIGNAL_RATE_HISTORY_POINTS: usize = 5;
const SIGNAL_LOOKBACK_DAYS: i64 = 30;
const BACKFILL_INTERVALS: [&str; 3] = ["1day", "1week", "1month"];
const PRIMARY_SOURCE: &str = "twelve_data";

pub struct FxService {
    repository: FxRepository,
    settings: Arc<Settings>,
    rates: Option<Arc<dyn RateProvider>>,
}

impl FxService {
    pub fn new(
        repository: FxRepository,
        settings: Arc<Settings>,
        rates: Option<Arc<dyn RateProvider>>,
    ) -> Self {
        Self {
            repository,
            settings,
            rates,
        }
    }

    pub fn repository(&self) -> &FxRepository {
        &self.repository
    }

    fn target_currencies(&self) -> Vec<String> {
        self.settings.fx_target_currencies()
    }

    fn is_stale(&self, timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match timestamp {
            None => true,
            Some(ts) => ts < now - Duration::minutes(self.settings.fx.stale_after_minutes),
        }
    }

    // ── Reads ─────────────────────────────────────────────────────────

    pub async fn get_rates(
        &self,
        page: u32,
        page_size: u32,
        include_totals: bool,
    ) -> Result<(Vec<FxRate>, u64)> {
        self.repository
            .list_latest_rates(PageRequest::new(page, page_size, include_totals))
            .await
    }

    pub async fn get_latest_rate_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let (rates, _) = self
            .repository
            .list_latest_rates(PageRequest::new(1, 1, false))
            .await?;
        Ok(rates.first().and_then(|r| r.rate_timestamp))
    }

    /// Whether the newest stored rate is older than the staleness window.
    pub async fn rates_are_stale(&self) -> Result<bool> {
        let latest = self.get_latest_rate_timestamp().await?;
        Ok(self.is_stale(latest, Utc::now()))
    }

    pub async fn get_exposure(&self) -> Result<Vec<FxExposure>> {
        self.repository.list_exposure().await
    }

    pub async fn get_invoice_pressure(&self) -> Result<Vec<FxInvoicePressure>> {
        self.repository.list_invoice_pressure().await
    }

    pub async fn get_signals(
        &self,
        page: u32,
        page_size: u32,
        include_totals: bool,
        currency_code: Option<&str>,
    ) -> Result<(Vec<FxSignal>, u64)> {
        self.repository
            .list_signals(PageRequest::new(page, page_size, include_totals), currency_code)
            .await
    }

    pub async fn get_transactions(
        &self,
        page: u32,
        page_size: u32,
        include_totals: bool,
        currency_code: Option<&str>,
        transaction_type: Option<&str>,
    ) -> Result<(Vec<FxTransaction>, u64)> {
        self.repository
            .list_transactions(
                PageRequest::new(page, page_size, include_totals),
                currency_code,
                transaction_type,
            )
            .await
    }

    pub async fn get_holdings(&self, currency_code: Option<&str>) -> Result<Vec<FxHolding>> {
        self.repository.list_holdings(currency_code).await
    }

    // ── Rate pulls ────────────────────────────────────────────────────

    #[instrument(skip(self, run_type), fields(run_type = run_type.as_str()))]
    pub async fn pull_rates(&self, run_type: RunType) -> Result<FxManualRunResult> {
        let sync_log_id = self
            .repository
            .create_sync_log(json!({
                "source_system": self.settings.fx.primary_provider,
                "sync_type": "fx_rates_pull",
                "started_at": Utc::now().to_rfc3339(),
                "status": "running",
            }))
            .await?;

        match self.pull_and_store_rates().await {
            Ok((processed, created)) => {
                if !sync_log_id.is_empty() {
                    self.repository
                        .update_sync_log(
                            &sync_log_id,
                            json!({
                                "completed_at": Utc::now().to_rfc3339(),
                                "records_processed": processed,
                                "records_created": created,
                                "records_updated": 0,
                                "status": "success",
                            }),
                        )
                        .await?;
                }
                info!(processed, created, "FX rates pulled");
                Ok(FxManualRunResult {
                    run_id: if sync_log_id.is_empty() {
                        "n/a".to_string()
                    } else {
                        sync_log_id
                    },
                    status: "success".into(),
                    records_processed: processed,
                    records_created: created,
                    message: "FX rates pulled and exposure refreshed".into(),
                })
            }
            Err(err) => {
                if !sync_log_id.is_empty() {
                    let update = self
                        .repository
                        .update_sync_log(
                            &sync_log_id,
                            json!({
                                "completed_at": Utc::now().to_rfc3339(),
                                "status": "failed",
                                "error_message": err.to_string(),
                            }),
                        )
                        .await;
                    if let Err(update_err) = update {
                        warn!(error = %update_err, "failed to mark sync log failed");
                    }
                }
                Err(err)
            }
        }
    }

    /// Validate the provider policy and return the provider plus the base currency.
    fn primary_provider(&self, missing_key_message: &str) -> Result<(Arc<dyn RateProvider>, String)> {
        let fx = &self.settings.fx;
        if fx.primary_api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(Error::bad_request(missing_key_message));
        }
        if fx.primary_provider.trim().to_lowercase() != PRIMARY_SOURCE {
            return Err(Error::bad_request("Unsupported FX primary provider"));
        }
        let base = fx.base_currency.trim().to_uppercase();
        if base != "USD" {
            return Err(Error::bad_request(
                "FX_BASE_CURRENCY must be USD for the v1 policy",
            ));
        }
        let provider = self
            .rates
            .clone()
            .ok_or_else(|| Error::bad_request(missing_key_message))?;
        Ok((provider, base))
    }

    async fn pull_and_store_rates(&self) -> Result<(usize, usize)> {
        let (provider, base) = self.primary_provider("FX_PRIMARY_API_KEY is required for rate pull")?;
        let targets = self.target_currencies();
        if targets.is_empty() {
            return Err(Error::bad_request(
                "FX_TARGET_CURRENCIES must include AUD, NZD, or ZAR",
            ));
        }

        let mut rows = Vec::with_capacity(targets.len());
        for target in &targets {
            let pair = format!("{base}/{target}");
            let quote = self.fetch_pair(provider.as_ref(), &pair).await?;
            rows.push(json!({
                "currency_pair": pair,
                "rate_timestamp": quote.fetched_at.to_rfc3339(),
                "mid_rate": quote.rate,
                "bid_rate": null,
                "ask_rate": null,
                "source": PRIMARY_SOURCE,
            }));
        }
        if rows.is_empty() {
            return Err(Error::bad_request(
                "Primary FX provider returned no usable rates",
            ));
        }

        let processed = rows.len();
        let created = self.repository.upsert_rates(rows).await?;
        self.repository.refresh_fx_exposure().await?;
        Ok((processed, created.len()))
    }

    async fn fetch_pair(&self, provider: &dyn RateProvider, pair: &str) -> Result<ExchangeRateQuote> {
        let attempts = self.settings.fx.max_pull_retries.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match provider.exchange_rate(pair).await {
                Ok(quote) => return Ok(quote),
                Err(err) if attempt < attempts => {
                    warn!(pair, attempt, error = %err, "rate fetch failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(150 * u64::from(attempt)))
                        .await;
                }
                Err(err) => {
                    return Err(Error::bad_request(format!(
                        "Failed to fetch rate for {pair}: {err}"
                    )))
                }
            }
        }
    }

    /// Historical time-series load for every target pair.
    #[instrument(skip(self))]
    pub async fn backfill_rates(&self, days: u32, interval: &str) -> Result<FxBackfillResult> {
        if !BACKFILL_INTERVALS.contains(&interval) {
            return Err(Error::bad_request(format!(
                "Unsupported backfill interval: {interval}"
            )));
        }
        let (provider, base) =
            self.primary_provider("FX_PRIMARY_API_KEY is required for historical backfill.")?;
        let targets = self.target_currencies();
        if targets.is_empty() {
            return Err(Error::bad_request(
                "FX_TARGET_CURRENCIES must include AUD, NZD, or ZAR.",
            ));
        }

        let outputsize = days.clamp(1, 5000);
        let pairs: Vec<String> = targets.iter().map(|t| format!("{base}/{t}")).collect();
        let mut rows = Vec::new();
        let mut request_errors = Vec::new();

        for pair in &pairs {
            match provider.time_series(pair, interval, outputsize).await {
                Ok(points) => rows.extend(points.into_iter().map(|point| {
                    json!({
                        "currency_pair": pair,
                        "rate_timestamp": point.timestamp.to_rfc3339(),
                        "mid_rate": point.close,
                        "bid_rate": null,
                        "ask_rate": null,
                        "source": PRIMARY_SOURCE,
                    })
                })),
                Err(ProviderError::Provider(message)) => {
                    request_errors.push(format!("{pair}: {message}"));
                }
                Err(other) => return Err(other.into()),
            }
        }

        let rows_prepared = rows.len();
        let inserted = self.repository.upsert_rates(rows).await?;
        let refresh = self.repository.refresh_fx_exposure().await?;
        info!(rows_prepared, rows_upserted = inserted.len(), "FX backfill complete");

        Ok(FxBackfillResult {
            pairs_requested: pairs,
            interval: interval.to_string(),
            days_requested: outputsize,
            request_errors,
            rows_prepared,
            rows_upserted: inserted.len(),
            exposure_refresh: Value::Object(refresh),
        })
    }

    // ── Signal runs ───────────────────────────────────────────────────

    #[instrument(skip(self, run_type), fields(run_type = run_type.as_str()))]
    pub async fn run_signals(&self, run_type: RunType) -> Result<FxManualRunResult> {
        let targets = self.target_currencies();
        let base_currency = self.settings.fx.base_currency.clone();
        let run = self
            .repository
            .create_signal_run(json!({
                "run_type": run_type.as_str(),
                "status": "running",
                "rates_source": self.settings.fx.primary_provider,
                "target_currencies": targets,
                "calculation_version": "v1",
                "metadata": {"baseCurrency": base_currency},
            }))
            .await?;

        match self.execute_signal_run(&run.id, &targets).await {
            Ok(result) => Ok(result),
            Err(err) => {
                let update = self
                    .repository
                    .update_signal_run(
                        &run.id,
                        json!({
                            "status": "failed",
                            "completed_at": Utc::now().to_rfc3339(),
                            "error_message": err.to_string(),
                        }),
                    )
                    .await;
                if let Err(update_err) = update {
                    warn!(run_id = %run.id, error = %update_err, "failed to mark signal run failed");
                }
                Err(err)
            }
        }
    }

    async fn execute_signal_run(&self, run_id: &str, targets: &[String]) -> Result<FxManualRunResult> {
        let base_currency = self.settings.fx.base_currency.clone();
        if targets.is_empty() {
            return Err(Error::bad_request(
                "No supported target currencies configured for signal run",
            ));
        }

        let refresh = self.repository.refresh_fx_exposure().await?;
        let refresh_status = refresh
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        if refresh_status != "ok" {
            return Err(Error::bad_request(
                "Exposure refresh failed before signal generation",
            ));
        }
        let refreshed_at = refresh.get("refreshed_at").cloned().unwrap_or(Value::Null);

        let now = Utc::now();
        let expires_at = now + Duration::hours(24);
        let exposure: HashMap<String, FxExposure> = self
            .repository
            .list_exposure()
            .await?
            .into_iter()
            .filter_map(|row| row.currency_code.clone().map(|code| (code, row)))
            .collect();
        let pressure: HashMap<String, FxInvoicePressure> = self
            .repository
            .list_invoice_pressure()
            .await?
            .into_iter()
            .map(|row| (row.currency_code.clone(), row))
            .collect();

        let mut failures: Vec<String> = Vec::new();
        let mut recent: HashMap<String, Vec<FxRate>> = HashMap::new();
        for currency in targets {
            let rates = self
                .repository
                .list_recent_rates_for_pair(&format!("USD/{currency}"), SIGNAL_LOOKBACK_DAYS, now)
                .await?;
            let valid: Vec<&FxRate> = rates.iter().filter(|r| r.mid_rate.is_some()).collect();
            if valid.len() < MIN_SIGNAL_RATE_HISTORY_POINTS {
                failures.push(format!(
                    "{currency}: insufficient rate history ({} points)",
                    valid.len()
                ));
            }
            let latest = valid.first().and_then(|r| r.rate_timestamp);
            if self.is_stale(latest, now) {
                failures.push(format!("{currency}: stale or missing latest rate"));
            }
            match exposure.get(currency) {
                None => failures.push(format!("{currency}: missing exposure row")),
                Some(row) if row.net_exposure.is_none() => {
                    failures.push(format!("{currency}: missing net exposure"))
                }
                Some(_) => {}
            }
            recent.insert(currency.clone(), rates);
        }

        if !failures.is_empty() {
            warn!(run_id, ?failures, "signal run prerequisites failed");
            self.repository
                .update_signal_run(
                    run_id,
                    json!({
                        "status": "skipped",
                        "completed_at": Utc::now().to_rfc3339(),
                        "records_processed": 0,
                        "signals_generated": 0,
                        "metadata": {
                            "baseCurrency": base_currency,
                            "refreshedAt": refreshed_at,
                            "prerequisiteFailures": failures,
                        },
                    }),
                )
                .await?;
            return Ok(FxManualRunResult {
                run_id: run_id.to_string(),
                status: "skipped".into(),
                records_processed: 0,
                records_created: 0,
                message: "Signal run skipped due to failed prerequisites".into(),
            });
        }

        let mut rows = Vec::with_capacity(targets.len());
        for currency in targets {
            let inputs = SignalInputs::from_sources(
                currency,
                recent.get(currency).map(Vec::as_slice).unwrap_or_default(),
                exposure.get(currency),
                pressure.get(currency),
            );
            let score = score_signal(&inputs);
            let (intelligence, _) = self
                .repository
                .list_intelligence(PageRequest::new(1, 5, false), Some(currency))
                .await?;
            let (trend_tags, source_links) = collect_context(
                intelligence
                    .iter()
                    .map(|item| (item.trend_tags.as_slice(), item.source_url.as_str())),
            );

            rows.push(json!({
                "currency_code": currency,
                "signal_type": score.signal_type,
                "signal_strength": score.signal_strength,
                "current_rate": inputs.current_rate,
                "avg_30d_rate": inputs.avg_30d_rate,
                "exposure_amount": inputs.exposure_amount,
                "recommended_amount": score.recommended_amount,
                "reasoning": score.reasoning,
                "generated_at": now.to_rfc3339(),
                "expires_at": expires_at.to_rfc3339(),
                "was_acted_on": false,
                "run_id": run_id,
                "confidence": score.confidence,
                "reason_summary": score.reason_summary,
                "trend_tags": trend_tags,
                "source_links": source_links,
                "exposure_30d_amount": inputs.exposure_30d_amount,
                "invoice_pressure_30d": inputs.invoice_pressure_30d,
                "invoice_pressure_60d": inputs.invoice_pressure_60d,
                "invoice_pressure_90d": inputs.invoice_pressure_90d,
                "metadata": {
                    "gapPct": common::row::decimal_to_f64(score.gap_pct),
                    "baseCurrency": base_currency,
                },
            }));
        }

        let processed = rows.len();
        let created = self.repository.insert_signals(rows).await?;
        self.repository
            .update_signal_run(
                run_id,
                json!({
                    "status": "success",
                    "completed_at": Utc::now().to_rfc3339(),
                    "records_processed": processed,
                    "signals_generated": created.len(),
                    "metadata": {
                        "baseCurrency": base_currency,
                        "refreshedAt": refreshed_at,
                        "prerequisiteFailures": [],
                    },
                }),
            )
            .await?;
        info!(run_id, processed, "FX signals generated");

        Ok(FxManualRunResult {
            run_id: run_id.to_string(),
            status: "success".into(),
            records_processed: processed,
            records_created: created.len(),
            message: "FX signals generated".into(),
        })
    }

    // ── Ledger ────────────────────────────────────────────────────────

    pub async fn create_transaction(
        &self,
        request: FxTransactionCreateRequest,
    ) -> Result<FxTransaction> {
        request.validate()?;
        let currency = request.currency_code.trim().to_uppercase();
        if !SUPPORTED_CURRENCIES.contains(&currency.as_str()) {
            return Err(Error::bad_request(
                "Unsupported currency code for FX ledger. Allowed: USD, AUD, NZD, ZAR",
            ));
        }

        let mut amount = request.amount;
        match request.transaction_type {
            TransactionType::Buy if amount <= Decimal::ZERO => {
                return Err(Error::bad_request(
                    "BUY transactions must have a positive amount",
                ));
            }
            TransactionType::Spend => amount = -amount.abs(),
            TransactionType::Adjustment if amount.is_zero() => {
                return Err(Error::bad_request(
                    "ADJUSTMENT transaction amount cannot be zero",
                ));
            }
            _ => {}
        }

        if request.transaction_type == TransactionType::Spend
            && !self.settings.fx.allow_negative_balance
        {
            let holdings = self.repository.list_holdings(Some(&currency)).await?;
            let balance = match holdings.first() {
                Some(holding) => holding.balance_amount,
                None => Some(Decimal::ZERO),
            };
            if balance.is_some_and(|b| b + amount < Decimal::ZERO) {
                return Err(Error::bad_request(format!(
                    "Insufficient {currency} balance for SPEND transaction"
                )));
            }
        }

        let usd_equivalent = match (request.usd_equivalent, request.exchange_rate) {
            (Some(usd), _) => Some(usd),
            (None, Some(rate)) if rate.is_zero() => {
                return Err(Error::bad_request("Exchange rate cannot be zero"));
            }
            (None, Some(rate)) => Some(amount.abs() / rate),
            (None, None) => None,
        };

        self.repository
            .create_transaction(json!({
                "currency_code": currency,
                "transaction_type": request.transaction_type.as_str(),
                "transaction_date": request.transaction_date.to_string(),
                "amount": amount,
                "exchange_rate": request.exchange_rate,
                "usd_equivalent": usd_equivalent,
                "supplier_invoice_id": request.supplier_invoice_id,
                "signal_id": request.signal_id,
                "reference_number": request.reference_number,
                "notes": request.notes,
                "entered_by": request.entered_by,
            }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use market_data_client::SeriesPoint;
    use rowstore_client::{memory::WriteKind, MemoryStore};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeRates {
        rate: Option<Decimal>,
        calls: AtomicU32,
    }

    impl FakeRates {
        fn quoting(rate: Decimal) -> Arc<Self> {
            Arc::new(Self {
                rate: Some(rate),
                calls: AtomicU32::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                rate: None,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl RateProvider for FakeRates {
        async fn exchange_rate(&self, symbol: &str) -> std::result::Result<ExchangeRateQuote, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.rate {
                Some(rate) => Ok(ExchangeRateQuote {
                    symbol: symbol.to_string(),
                    rate,
                    fetched_at: Utc::now(),
                }),
                None => Err(ProviderError::Provider("quota exceeded".into())),
            }
        }

        async fn time_series(
            &self,
            symbol: &str,
            _interval: &str,
            outputsize: u32,
        ) -> std::result::Result<Vec<SeriesPoint>, ProviderError> {
            if symbol == "USD/ZAR" {
                return Err(ProviderError::Provider("symbol not available".into()));
            }
            let rate = self.rate.unwrap_or(Decimal::ONE);
            Ok((0..outputsize.min(3))
                .map(|i| SeriesPoint {
                    timestamp: Utc::now() - Duration::days(i64::from(i)),
                    close: rate,
                })
                .collect())
        }
    }

    fn settings_with_key() -> Settings {
        let mut settings = Settings::default();
        settings.fx.primary_api_key = Some("test-key".into());
        settings.fx.max_pull_retries = 1;
        settings
    }

    fn service(
        store: Arc<MemoryStore>,
        settings: Settings,
        rates: Option<Arc<dyn RateProvider>>,
    ) -> FxService {
        FxService::new(FxRepository::new(store), Arc::new(settings), rates)
    }

    fn last_update(store: &MemoryStore, table: &str) -> Value {
        store
            .writes_to(table)
            .into_iter()
            .filter(|w| w.kind == WriteKind::Update)
            .last()
            .map(|w| w.payload)
            .unwrap_or(Value::Null)
    }

    fn seed_signal_inputs(store: &MemoryStore, points: usize) {
        seed_signal_inputs_aged(store, points, Duration::zero());
    }

    /// Hourly rates whose newest point is `age` old.
    fn seed_signal_inputs_aged(store: &MemoryStore, points: usize, age: Duration) {
        let now = Utc::now() - age;
        for currency in ["AUD", "NZD", "ZAR"] {
            store.seed(
                "fx_rates",
                (0..points).map(|i| {
                    json!({
                        "currency_pair": format!("USD/{currency}"),
                        "rate_timestamp": (now - Duration::hours(i as i64)).to_rfc3339(),
                        "mid_rate": 1.5 + (i as f64) * 0.01,
                        "source": "twelve_data",
                    })
                }),
            );
            store.seed(
                "mv_fx_exposure",
                [json!({"currency_code": currency, "net_exposure": 10000, "confirmed_30d": 4000})],
            );
        }
    }

    #[tokio::test]
    async fn test_pull_rates_upserts_and_closes_sync_log() {
        let store = Arc::new(MemoryStore::new());
        let provider = FakeRates::quoting(Decimal::new(15, 1));
        let svc = service(store.clone(), settings_with_key(), Some(provider.clone()));

        let result = svc.pull_rates(RunType::Manual).await.expect("pull succeeds");

        assert_eq!(result.status, "success");
        assert_eq!(result.records_processed, 3);
        assert_eq!(result.message, "FX rates pulled and exposure refreshed");
        assert_ne!(result.run_id, "n/a");
        assert_eq!(store.rows("fx_rates").len(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert!(store
            .rpc_calls()
            .iter()
            .any(|(name, _)| name == "refresh_fx_exposure_v1"));
        assert_eq!(last_update(&store, "sync_logs")["status"], "success");
    }

    #[tokio::test]
    async fn test_pull_rates_without_key_marks_log_failed() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone(), Settings::default(), None);

        let err = svc.pull_rates(RunType::Manual).await.expect_err("missing key");

        assert_eq!(err.to_string(), "FX_PRIMARY_API_KEY is required for rate pull");
        let update = last_update(&store, "sync_logs");
        assert_eq!(update["status"], "failed");
        assert_eq!(
            update["error_message"],
            "FX_PRIMARY_API_KEY is required for rate pull"
        );
        assert!(store.rows("fx_rates").is_empty());
    }

    #[tokio::test]
    async fn test_pull_rates_reports_failing_pair() {
        let store = Arc::new(MemoryStore::new());
        let mut settings = settings_with_key();
        settings.fx.max_pull_retries = 2;
        let provider = FakeRates::failing();
        let svc = service(store.clone(), settings, Some(provider.clone()));

        let err = svc.pull_rates(RunType::Scheduled).await.expect_err("fetch fails");

        assert!(err
            .to_string()
            .starts_with("Failed to fetch rate for USD/AUD:"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_pull_rates_rejects_non_usd_base() {
        let store = Arc::new(MemoryStore::new());
        let mut settings = settings_with_key();
        settings.fx.base_currency = "EUR".into();
        let svc = service(store, settings, Some(FakeRates::quoting(Decimal::ONE)));

        let err = svc.pull_rates(RunType::Manual).await.expect_err("policy");
        assert_eq!(err.to_string(), "FX_BASE_CURRENCY must be USD for the v1 policy");
    }

    #[tokio::test]
    async fn test_backfill_collects_provider_errors() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(
            store.clone(),
            settings_with_key(),
            Some(FakeRates::quoting(Decimal::new(16, 1))),
        );

        let result = svc.backfill_rates(30, "1day").await.expect("backfill");

        assert_eq!(result.pairs_requested, vec!["USD/AUD", "USD/NZD", "USD/ZAR"]);
        assert_eq!(result.request_errors, vec!["USD/ZAR: symbol not available"]);
        assert_eq!(result.rows_prepared, 6);
        assert_eq!(result.rows_upserted, 6);
        assert_eq!(result.exposure_refresh["status"], "ok");

        let err = svc.backfill_rates(30, "1hour").await.expect_err("bad interval");
        assert!(err.to_string().contains("1hour"));
    }

    #[tokio::test]
    async fn test_run_signals_skips_without_history() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone(), Settings::default(), None);

        let result = svc.run_signals(RunType::Manual).await.expect("run completes");

        assert_eq!(result.status, "skipped");
        assert_eq!(result.records_created, 0);
        let update = last_update(&store, "fx_signal_runs");
        let failures = update["metadata"]["prerequisiteFailures"]
            .as_array()
            .expect("failures listed");
        assert!(failures
            .iter()
            .any(|f| f == "AUD: insufficient rate history (0 points)"));
        assert!(failures.iter().any(|f| f == "NZD: missing exposure row"));
        assert!(store.rows("fx_signals").is_empty());
    }

    #[tokio::test]
    async fn test_run_signals_generates_one_signal_per_currency() {
        let store = Arc::new(MemoryStore::new());
        seed_signal_inputs(&store, 6);
        store.seed(
            "fx_intelligence_items",
            [json!({
                "currency_code": "AUD",
                "source_url": "https://example.com/rba",
                "trend_tags": ["RBA hold"],
                "summary": "steady",
                "created_at": Utc::now().to_rfc3339(),
            })],
        );
        let svc = service(store.clone(), Settings::default(), None);

        let result = svc.run_signals(RunType::Manual).await.expect("run completes");

        assert_eq!(result.status, "success");
        assert_eq!(result.records_processed, 3);
        assert_eq!(result.message, "FX signals generated");
        let signals = store.rows("fx_signals");
        assert_eq!(signals.len(), 3);
        let aud = signals
            .iter()
            .find(|s| s["currency_code"] == "AUD")
            .expect("AUD signal");
        assert_eq!(aud["trend_tags"], json!(["RBA hold"]));
        assert_eq!(aud["source_links"], json!(["https://example.com/rba"]));
        assert_eq!(aud["run_id"], json!(result.run_id));
        assert_eq!(last_update(&store, "fx_signal_runs")["status"], "success");
    }

    #[tokio::test]
    async fn test_run_signals_skips_on_stale_latest_rate() {
        let store = Arc::new(MemoryStore::new());
        seed_signal_inputs_aged(&store, 6, Duration::hours(3));
        let mut settings = Settings::default();
        settings.fx.stale_after_minutes = 60;
        let svc = service(store.clone(), settings, None);

        let result = svc.run_signals(RunType::Manual).await.expect("run completes");

        assert_eq!(result.status, "skipped");
        let update = last_update(&store, "fx_signal_runs");
        let failures = update["metadata"]["prerequisiteFailures"]
            .as_array()
            .expect("failures listed");
        assert_eq!(failures.len(), 3);
        for currency in ["AUD", "NZD", "ZAR"] {
            let expected = format!("{currency}: stale or missing latest rate");
            assert!(failures.iter().any(|f| f == expected.as_str()), "{expected}");
        }
        assert!(store.rows("fx_signals").is_empty());
    }

    #[tokio::test]
    async fn test_run_signals_fails_when_refresh_reports_error() {
        let store = Arc::new(MemoryStore::new());
        store.set_rpc_response("refresh_fx_exposure_v1", json!({"status": "error"}));
        let svc = service(store.clone(), Settings::default(), None);

        let err = svc.run_signals(RunType::Manual).await.expect_err("refresh fails");

        assert_eq!(
            err.to_string(),
            "Exposure refresh failed before signal generation"
        );
        assert_eq!(last_update(&store, "fx_signal_runs")["status"], "failed");
    }

    fn transaction(currency: &str, kind: TransactionType, amount: Decimal) -> FxTransactionCreateRequest {
        FxTransactionCreateRequest {
            currency_code: currency.into(),
            transaction_type: kind,
            transaction_date: chrono::NaiveDate::from_ymd_opt(2026, 2, 18).expect("valid date"),
            amount,
            exchange_rate: None,
            usd_equivalent: None,
            supplier_invoice_id: None,
            signal_id: None,
            reference_number: None,
            notes: None,
            entered_by: None,
        }
    }

    #[tokio::test]
    async fn test_spend_requires_sufficient_balance() {
        let store = Arc::new(MemoryStore::new().with_rows(
            "fx_holdings",
            [json!({"currency_code": "AUD", "balance_amount": "100.00"})],
        ));
        let svc = service(store.clone(), Settings::default(), None);

        let err = svc
            .create_transaction(transaction("aud", TransactionType::Spend, Decimal::new(250, 0)))
            .await
            .expect_err("insufficient");
        assert_eq!(err.to_string(), "Insufficient AUD balance for SPEND transaction");

        let created = svc
            .create_transaction(transaction("AUD", TransactionType::Spend, Decimal::new(40, 0)))
            .await
            .expect("spend fits");
        assert_eq!(created.amount, Decimal::new(-40, 0));
        assert_eq!(created.transaction_type, TransactionType::Spend);
    }

    #[tokio::test]
    async fn test_spend_without_holdings_row_counts_as_zero_balance() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone(), Settings::default(), None);

        let err = svc
            .create_transaction(transaction("ZAR", TransactionType::Spend, Decimal::ONE))
            .await
            .expect_err("no balance");
        assert_eq!(err.to_string(), "Insufficient ZAR balance for SPEND transaction");
        assert!(store.rows("fx_transactions").is_empty());
    }

    #[tokio::test]
    async fn test_spend_past_balance_when_negative_allowed() {
        let store = Arc::new(MemoryStore::new().with_rows(
            "fx_holdings",
            [json!({"currency_code": "AUD", "balance_amount": "100.00"})],
        ));
        let mut settings = Settings::default();
        settings.fx.allow_negative_balance = true;
        let svc = service(store.clone(), settings, None);

        let created = svc
            .create_transaction(transaction("AUD", TransactionType::Spend, Decimal::new(250, 0)))
            .await
            .expect("overdraft allowed");
        assert_eq!(created.amount, Decimal::new(-250, 0));
        assert_eq!(store.rows("fx_transactions").len(), 1);
    }

    #[tokio::test]
    async fn test_buy_derives_usd_equivalent() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone(), Settings::default(), None);

        let mut request = transaction("NZD", TransactionType::Buy, Decimal::new(1650, 0));
        request.exchange_rate = Some(Decimal::new(165, 2));
        let created = svc.create_transaction(request).await.expect("buy");

        assert_eq!(created.usd_equivalent, Some(Decimal::new(1000, 0)));
        assert_eq!(created.transaction_date, chrono::NaiveDate::from_ymd_opt(2026, 2, 18));

        let mut request = transaction("AUD", TransactionType::Buy, Decimal::new(100, 0));
        request.exchange_rate = Some(Decimal::new(3, 0));
        let created = svc.create_transaction(request).await.expect("buy");
        let usd = created.usd_equivalent.expect("derived");
        assert_ne!(usd, usd.round_dp(6));
        assert_eq!(usd.round_dp(6), Decimal::new(33_333_333, 6));
    }

    #[tokio::test]
    async fn test_ledger_rejections() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone(), Settings::default(), None);

        let err = svc
            .create_transaction(transaction("EUR", TransactionType::Buy, Decimal::ONE))
            .await
            .expect_err("unsupported");
        assert_eq!(
            err.to_string(),
            "Unsupported currency code for FX ledger. Allowed: USD, AUD, NZD, ZAR"
        );

        let err = svc
            .create_transaction(transaction("AUD", TransactionType::Buy, Decimal::ZERO))
            .await
            .expect_err("zero buy");
        assert_eq!(err.to_string(), "BUY transactions must have a positive amount");

        let err = svc
            .create_transaction(transaction("AUD", TransactionType::Adjustment, Decimal::ZERO))
            .await
            .expect_err("zero adjustment");
        assert_eq!(err.to_string(), "ADJUSTMENT transaction amount cannot be zero");

        let mut request = transaction("AUD", TransactionType::Buy, Decimal::TEN);
        request.exchange_rate = Some(Decimal::ZERO);
        let err = svc.create_transaction(request).await.expect_err("zero rate");
        assert_eq!(err.to_string(), "Exchange rate cannot be zero");

        assert!(store.rows("fx_transactions").is_empty());
    }
}
