//! Request extraction: validated query strings, JSON bodies and run tokens.

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{request::Parts, HeaderMap},
};
use common::Error;
use serde::de::DeserializeOwned;

use super::error::ApiError;
use crate::ai_insights::types::{FeedFilters, HistoryFilters, RecommendationFilters};
use crate::itinerary_revenue::types::ItineraryRevenueFilters;
use crate::revenue_bookings::types::{
    BookingForecastFilters, BookingListFilters, CashFlowFilters, TrendWindowFilters,
};
use crate::travel_consultants::types::{ForecastFilters, LeaderboardFilters, ProfileFilters};
use crate::travel_trade::types::{TradeLeaderboardFilters, TradeProfileFilters, TradeSearchFilters};

/// Range checks that run after a query string deserializes.
pub trait Validate {
    fn validate(&self) -> Result<(), Error> {
        Ok(())
    }
}

macro_rules! delegate_validate {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Validate for $ty {
                fn validate(&self) -> Result<(), Error> {
                    <$ty>::validate(self)
                }
            }
        )+
    };
}

delegate_validate!(
    FeedFilters,
    RecommendationFilters,
    HistoryFilters,
    ItineraryRevenueFilters,
    BookingListFilters,
    CashFlowFilters,
    BookingForecastFilters,
    LeaderboardFilters,
    ProfileFilters,
    ForecastFilters,
    TradeLeaderboardFilters,
    TradeProfileFilters,
    TradeSearchFilters,
);

impl Validate for TrendWindowFilters {}

/// Query string extractor. Malformed or out-of-range parameters are
/// rejected with 422 `validation_error`.
#[derive(Debug, Clone)]
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError(Error::validation(rejection.body_text())))?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Decode a JSON request body; shape errors become 422.
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|err| ApiError(Error::validation(format!("Invalid request body: {err}"))))
}

/// Like [`decode_body`], but an empty body yields the defaults.
pub fn decode_optional_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    decode_body(body)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// FX run endpoints stay open until a token is configured.
pub fn check_fx_run_token(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    match expected {
        None => Ok(()),
        Some(expected) if header_value(headers, "x-fx-run-token") == Some(expected) => Ok(()),
        Some(_) => Err(ApiError(Error::bad_request("Invalid manual run token"))),
    }
}

/// The AI run endpoint is closed until a token is configured.
pub fn check_ai_run_token(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let expected =
        expected.ok_or_else(|| ApiError(Error::bad_request("Manual AI run endpoint is disabled")))?;
    if header_value(headers, "x-ai-run-token") != Some(expected) {
        return Err(ApiError(Error::bad_request("Invalid manual run token")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use crate::fx::types::FxRunRequest;
    use crate::fx::types::RunType;

    #[test]
    fn test_optional_body_defaults_when_empty() {
        let request: FxRunRequest = decode_optional_body(b"  ").expect("default");
        assert_eq!(request.run_type, RunType::Manual);
        let request: FxRunRequest =
            decode_optional_body(br#"{"runType":"scheduled"}"#).expect("parsed");
        assert_eq!(request.run_type, RunType::Scheduled);
    }

    #[test]
    fn test_unknown_body_field_is_validation_error() {
        let err = decode_optional_body::<FxRunRequest>(br#"{"mode":"x"}"#).expect_err("rejected");
        assert_eq!(err.0.code(), "validation_error");
    }

    #[test]
    fn test_fx_token_only_enforced_when_configured() {
        let mut headers = HeaderMap::new();
        assert!(check_fx_run_token(&headers, None).is_ok());
        assert!(check_fx_run_token(&headers, Some("secret")).is_err());
        headers.insert("x-fx-run-token", HeaderValue::from_static("secret"));
        assert!(check_fx_run_token(&headers, Some("secret")).is_ok());
    }

    #[test]
    fn test_ai_token_disabled_without_configuration() {
        let headers = HeaderMap::new();
        let err = check_ai_run_token(&headers, None).expect_err("disabled");
        assert_eq!(err.0.to_string(), "Manual AI run endpoint is disabled");
        let err = check_ai_run_token(&headers, Some("secret")).expect_err("mismatch");
        assert_eq!(err.0.to_string(), "Invalid manual run token");
    }
}
