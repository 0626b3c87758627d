//! Shared service graph used by the HTTP server and the CLI.

use std::sync::Arc;

use common::{Error, Result, Settings};
use llm_client::{LlmClient, LlmConfig};
use market_data_client::{
    FredClient, MacroProvider, MarketauxClient, NewsProvider, RateProvider, TwelveDataClient,
};
use rowstore_client::{RowStore, SupabaseClient};
use tracing::{info, warn};

use crate::ai_insights::{AiInsightsRepository, AiInsightsService, AiOrchestrationService};
use crate::fx::{FxIntelligenceService, FxRepository, FxService};
use crate::itinerary_revenue::{ItineraryRevenueRepository, ItineraryRevenueService};
use crate::revenue_bookings::{RevenueBookingsRepository, RevenueBookingsService};
use crate::travel_consultants::{TravelConsultantsRepository, TravelConsultantsService};
use crate::travel_trade::{TravelTradeRepository, TravelTradeService};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub fx: Arc<FxService>,
    pub fx_intelligence: Arc<FxIntelligenceService>,
    pub ai_insights: Arc<AiInsightsService>,
    pub ai_orchestration: Arc<AiOrchestrationService>,
    pub itinerary_revenue: Arc<ItineraryRevenueService>,
    pub revenue_bookings: RevenueBookingsService,
    pub travel_consultants: Arc<TravelConsultantsService>,
    pub travel_trade: TravelTradeService,
}

impl AppState {
    /// Connect to the configured row store and wire every service.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let key = settings
            .row_store_key()
            .ok_or_else(|| Error::Config("a Supabase API key is required".into()))?;
        let store: Arc<dyn RowStore> = Arc::new(SupabaseClient::new(&settings.supabase_url, key)?);
        let providers = MarketProviders::from_settings(&settings)?;
        Self::with_store(settings, store, providers)
    }

    pub fn with_store(
        settings: Settings,
        store: Arc<dyn RowStore>,
        providers: MarketProviders,
    ) -> Result<Self> {
        let settings = Arc::new(settings);
        let llm = Arc::new(LlmClient::new(LlmConfig::from_settings(
            &settings.openai,
            &settings.ai,
        ))?);
        if !llm.has_api_key() {
            warn!("OPENAI_API_KEY not set; AI outputs will use deterministic fallbacks");
        }

        let fx_repository = FxRepository::new(store.clone());
        let ai_repository = AiInsightsRepository::new(store.clone());
        let consultants_service =
            || TravelConsultantsService::new(TravelConsultantsRepository::new(store.clone()));

        Ok(Self {
            fx: Arc::new(FxService::new(
                fx_repository.clone(),
                settings.clone(),
                providers.rates,
            )),
            fx_intelligence: Arc::new(FxIntelligenceService::new(
                fx_repository,
                llm.clone(),
                settings.clone(),
                providers.macro_data,
                providers.news,
            )),
            ai_insights: Arc::new(AiInsightsService::new(ai_repository.clone())),
            ai_orchestration: Arc::new(AiOrchestrationService::new(
                ai_repository,
                llm,
                settings.clone(),
                Some(consultants_service()),
            )),
            itinerary_revenue: Arc::new(ItineraryRevenueService::new(
                ItineraryRevenueRepository::new(store.clone()),
            )),
            revenue_bookings: RevenueBookingsService::new(RevenueBookingsRepository::new(
                store.clone(),
            )),
            travel_consultants: Arc::new(consultants_service()),
            travel_trade: TravelTradeService::new(TravelTradeRepository::new(store.clone())),
            settings,
        })
    }
}

/// External market data clients. A provider without an API key stays unset
/// and the services degrade around it.
#[derive(Default, Clone)]
pub struct MarketProviders {
    pub rates: Option<Arc<dyn RateProvider>>,
    pub macro_data: Option<Arc<dyn MacroProvider>>,
    pub news: Option<Arc<dyn NewsProvider>>,
}

impl MarketProviders {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let fx = &settings.fx;
        let mut providers = Self::default();

        if let Some(key) = fx.primary_api_key.as_deref() {
            if fx.primary_provider == "twelve_data" {
                providers.rates = Some(Arc::new(TwelveDataClient::new(&fx.primary_base_url, key)?));
            } else {
                warn!(provider = %fx.primary_provider, "unsupported FX rate provider");
            }
        }
        if let Some(key) = fx.macro_api_key.as_deref() {
            if fx.macro_provider == "fred" {
                providers.macro_data = Some(Arc::new(FredClient::new(&fx.macro_base_url, key)?));
            } else {
                warn!(provider = %fx.macro_provider, "unsupported FX macro provider");
            }
        }
        if let Some(key) = fx.news_api_key.as_deref() {
            if fx.news_provider == "marketaux" {
                providers.news = Some(Arc::new(MarketauxClient::new(&fx.news_base_url, key)?));
            } else {
                warn!(provider = %fx.news_provider, "unsupported FX news provider");
            }
        }

        info!(
            rates = providers.rates.is_some(),
            macro_data = providers.macro_data.is_some(),
            news = providers.news.is_some(),
            "market data providers configured"
        );
        Ok(providers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowstore_client::MemoryStore;

    #[test]
    fn test_providers_stay_unset_without_keys() {
        let providers = MarketProviders::from_settings(&Settings::default()).expect("providers");
        assert!(providers.rates.is_none());
        assert!(providers.macro_data.is_none());
        assert!(providers.news.is_none());
    }

    #[test]
    fn test_unknown_rate_provider_is_skipped() {
        let mut settings = Settings::default();
        settings.fx.primary_api_key = Some("key".into());
        settings.fx.primary_provider = "other".into();
        let providers = MarketProviders::from_settings(&settings).expect("providers");
        assert!(providers.rates.is_none());
    }

    #[test]
    fn test_with_store_wires_services() {
        let store: Arc<dyn RowStore> = Arc::new(MemoryStore::new());
        let state = AppState::with_store(Settings::default(), store, MarketProviders::default())
            .expect("state");
        assert_eq!(state.settings.api_prefix, Settings::default().api_prefix);
    }
}
